mod cli;
mod confirm;
mod logging;

use crate::cli::{Cli, Command};
use crate::confirm::TerminalConfirm;
use clap::Parser;
use miette::IntoDiagnostic;
use shelf_backup::{Exporter, Guard, Outcome};
use shelf_config::Config;
use shelf_covers::{CoverCache, CoverOptions, Pass};
use shelf_remote::{HttpSource, SourceHandle};
use shelf_storage::BackendHandle;
use shelf_storage::backend::LocalBackend;
use shelf_store::{Database, Repository, SyncFlag};
use std::path::PathBuf;
use std::sync::Arc;

/// Render an error tree, every layer and location included, as a diagnostic.
fn report<E>(err: exn::Exn<E>) -> miette::Report
where
    E: std::error::Error + Send + Sync + 'static,
{
    miette::miette!("{err:?}")
}

#[tokio::main]
async fn main() -> miette::Result<()> {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref()).map_err(report)?;
    logging::init(&config.log.level);

    match cli.command {
        Command::Covers => covers(&config).await,
        Command::Flag => flag(&config).await,
        Command::Export { directory, name } => export(&config, directory, name).await,
        Command::Import { source, yes } => {
            let db = open_store(&config).await?;
            let guard = guard(&config, &db, yes);
            finish(&db, guard.import(&source).await.map_err(report)?).await
        },
        Command::Reset { yes } => {
            let db = open_store(&config).await?;
            let guard = guard(&config, &db, yes);
            finish(&db, guard.reset().await.map_err(report)?).await
        },
        Command::Restore { yes } => {
            let db = open_store(&config).await?;
            let guard = guard(&config, &db, yes);
            finish(&db, guard.restore().await.map_err(report)?).await
        },
    }
}

async fn open_store(config: &Config) -> miette::Result<Database> {
    if let Some(parent) = config.store.path.parent() {
        tokio::fs::create_dir_all(parent).await.into_diagnostic()?;
    }
    Database::connect(&config.store.path).await.map_err(report)
}

async fn covers(config: &Config) -> miette::Result<()> {
    let db = open_store(config).await?;
    let backend: BackendHandle = Arc::new(LocalBackend::new("covers", &config.covers.directory).map_err(report)?);
    let source: SourceHandle = Arc::new(HttpSource::new(&config.covers.user_agent).map_err(report)?);
    let options = CoverOptions { retry_delay: config.covers.retry_delay(), concurrency: config.covers.concurrency };
    let cache = CoverCache::new(Repository::from(&db), SyncFlag::from(&db), backend, source, options);

    let pass = cache.reconcile_all().await.map_err(report);
    db.close().await;
    match pass? {
        Pass::Skipped => println!("A cover pass is already running."),
        Pass::Completed(summary) => {
            for failure in &summary.failed {
                tracing::warn!(entry = %failure.id, error = ?failure.error, "Cover still missing");
            }
            println!(
                "Checked {} entries: {} downloaded ({} on retry), {} relinked, {} still missing.",
                summary.checked,
                summary.downloaded,
                summary.recovered_on_retry,
                summary.relinked,
                summary.remaining_stale
            );
            if let Some(notice) = summary.notice {
                println!("{notice}");
            }
        },
    }
    Ok(())
}

async fn flag(config: &Config) -> miette::Result<()> {
    let db = open_store(config).await?;
    let state = SyncFlag::from(&db).read().await.map_err(report);
    db.close().await;
    println!("{}", state?);
    Ok(())
}

async fn export(config: &Config, directory: PathBuf, name: Option<String>) -> miette::Result<()> {
    let directory = std::path::absolute(directory).into_diagnostic()?;
    let destination: BackendHandle = Arc::new(LocalBackend::new("export", &directory).map_err(report)?);
    let db = open_store(config).await?;
    let mut exporter = Exporter::new(db.clone());
    if let Some(dir) = &config.export.staging_dir {
        exporter = exporter.with_staging_dir(dir);
    }
    let name = name.unwrap_or_else(|| config.export.file_name.clone());

    let exported = exporter.export(&destination, &name).await.map_err(report);
    db.close().await;
    let exported = exported?;
    println!("Exported {} ({} bytes).", exported.destination.display(), exported.bytes);
    Ok(())
}

fn guard(config: &Config, db: &Database, yes: bool) -> Guard<TerminalConfirm> {
    Guard::new(db.clone(), config.store.path.clone(), config.store.trash.clone(), TerminalConfirm::new(yes))
}

async fn finish(db: &Database, outcome: Outcome) -> miette::Result<()> {
    db.close().await;
    match outcome {
        Outcome::RestartRequired => println!("Done. Start shelf again to use the library."),
        Outcome::Cancelled => println!("Cancelled; nothing was changed."),
    }
    Ok(())
}
