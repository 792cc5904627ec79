use crate::error::{ErrorKind, Result};
use crate::files::{check_store_file, copy_file, exists, move_store, remove_store, same_file, sidecar};
use async_trait::async_trait;
use shelf_remote::Url;
use shelf_store::Database;
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::path::{Path, PathBuf};
use tokio::sync::watch;
use tracing::instrument;

/// A yes/no question put to the user before anything destructive happens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub title: String,
    pub message: String,
    /// Label of the confirming button.
    pub action_label: String,
    /// Style the confirming action as dangerous.
    pub danger: bool,
}

/// The user confirmation surface.
#[async_trait]
pub trait Confirm: Send + Sync {
    /// Returns `true` only on explicit confirmation.
    async fn confirm(&self, prompt: &Prompt) -> bool;
}

/// Answers every prompt the same way, for non-interactive use.
#[derive(Debug, Clone, Copy)]
pub struct Assume(pub bool);

#[async_trait]
impl Confirm for Assume {
    async fn confirm(&self, _prompt: &Prompt) -> bool {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Reset,
    Import,
    Restore,
}
impl Display for Operation {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(match self {
            Self::Reset => "reset",
            Self::Import => "import",
            Self::Restore => "restore",
        })
    }
}

/// Where the guard is in an operation.
///
/// `Success` and `Failure` are terminal: the live store has been closed and
/// the application must restart before anything else touches it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Idle,
    ConfirmPending(Operation),
    Executing(Operation),
    Success(Operation),
    Failure(Operation),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Done; the store must be reopened by restarting the application.
    RestartRequired,
    /// The user declined. Nothing was touched.
    Cancelled,
}

/// Where an import comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportSource(PathBuf);
impl ImportSource {
    /// Accepts a plain path or a `file://` URI. Other URI schemes (content
    /// providers, remote URLs) aren't readable as files.
    pub fn parse(source: &str) -> Result<Self> {
        let source = source.trim();
        if source.is_empty() {
            exn::bail!(ErrorKind::UnsupportedSource(source.to_string()));
        }
        // A single-letter "scheme" is a Windows drive letter, not a URI.
        match Url::parse(source) {
            Ok(url) if url.scheme().len() > 1 => {
                if url.scheme() != "file" {
                    exn::bail!(ErrorKind::UnsupportedSource(source.to_string()));
                }
                let path = url.to_file_path().map_err(|()| ErrorKind::UnsupportedSource(source.to_string()))?;
                Ok(Self(path))
            },
            _ => Ok(Self(PathBuf::from(source))),
        }
    }

    pub fn path(&self) -> &Path {
        &self.0
    }
}

/// Replaces or wipes the live store, with a confirmation in front of every
/// destructive step.
///
/// The guard owns the live [`Database`] handle and closes it before touching
/// any file, so sidecar files are checkpointed away and nothing else writes
/// to the store mid-operation. Once an operation has run, the guard is spent.
pub struct Guard<C> {
    db: Database,
    store: PathBuf,
    trash: PathBuf,
    confirm: C,
    state: watch::Sender<State>,
}

impl<C: Confirm> Guard<C> {
    pub fn new(db: Database, store: impl Into<PathBuf>, trash: impl Into<PathBuf>, confirm: C) -> Self {
        Self {
            db,
            store: store.into(),
            trash: trash.into(),
            confirm,
            state: watch::Sender::new(State::Idle),
        }
    }

    pub fn state(&self) -> State {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<State> {
        self.state.subscribe()
    }

    pub fn trash_path(&self) -> &Path {
        &self.trash
    }

    fn ensure_idle(&self) -> Result<()> {
        match self.state() {
            State::Idle => Ok(()),
            State::Success(_) | State::Failure(_) => exn::bail!(ErrorKind::InvalidState("restart required")),
            State::ConfirmPending(_) | State::Executing(_) => {
                exn::bail!(ErrorKind::InvalidState("another operation is in progress"))
            },
        }
    }

    /// Ask, then run `work` with the live store closed.
    async fn run<F>(&self, operation: Operation, prompt: Prompt, work: F) -> Result<Outcome>
    where
        F: Future<Output = Result<()>>,
    {
        // Claim the guard atomically; the earlier idle check only fails fast.
        let claimed = self.state.send_if_modified(|state| match state {
            State::Idle => {
                *state = State::ConfirmPending(operation);
                true
            },
            _ => false,
        });
        if !claimed {
            self.ensure_idle()?;
            exn::bail!(ErrorKind::InvalidState("another operation is in progress"));
        }
        if !self.confirm.confirm(&prompt).await {
            tracing::info!(%operation, "Declined");
            self.state.send_replace(State::Idle);
            return Ok(Outcome::Cancelled);
        }

        self.state.send_replace(State::Executing(operation));
        tracing::info!(%operation, "Closing live store");
        self.db.close().await;
        match work.await {
            Ok(()) => {
                self.state.send_replace(State::Success(operation));
                tracing::info!(%operation, "Completed; restart required");
                Ok(Outcome::RestartRequired)
            },
            Err(e) => {
                self.state.send_replace(State::Failure(operation));
                tracing::warn!(%operation, error = ?e, "Failed");
                Err(e)
            },
        }
    }

    /// Move the live store into the trash slot, replacing whatever was
    /// trashed before. The application starts with an empty library next time.
    #[instrument(skip(self))]
    pub async fn reset(&self) -> Result<Outcome> {
        self.ensure_idle()?;
        let prompt = Prompt {
            title: "Reset library?".to_string(),
            message: "Your library will be moved to the trash, replacing any earlier reset. \
                      The app restarts afterwards."
                .to_string(),
            action_label: "Reset".to_string(),
            danger: true,
        };
        self.run(Operation::Reset, prompt, async {
            remove_store(&self.trash).await?;
            move_store(&self.store, &self.trash).await
        })
        .await
    }

    /// Replace the live store with a copy of `source`.
    ///
    /// The source is checked before asking. Once confirmed, the live store is
    /// deleted first and the source copied in second; there is no copy of the
    /// old store to fall back on if the second step fails.
    #[instrument(skip(self))]
    pub async fn import(&self, source: &str) -> Result<Outcome> {
        self.ensure_idle()?;
        let source = ImportSource::parse(source)?;
        if same_file(source.path(), &self.store).await {
            exn::bail!(ErrorKind::InvalidState("the import source is the live library"));
        }
        check_store_file(source.path()).await?;

        let prompt = Prompt {
            title: "Import library?".to_string(),
            message: format!(
                "Your current library will be deleted and replaced with {}. This can't be undone. \
                 The app restarts afterwards.",
                source.path().display()
            ),
            action_label: "Import".to_string(),
            danger: true,
        };
        self.run(Operation::Import, prompt, async {
            remove_store(&self.store).await?;
            let bytes = copy_file(source.path(), &self.store).await?;
            tracing::info!(bytes, "Imported store copied into place");
            Ok(())
        })
        .await
    }

    /// Swap the trashed store back into the live slot. The current live store
    /// takes its place in the trash, so a restore can itself be undone.
    #[instrument(skip(self))]
    pub async fn restore(&self) -> Result<Outcome> {
        self.ensure_idle()?;
        if !exists(&self.trash).await? {
            exn::bail!(ErrorKind::NotFound(self.trash.clone()));
        }
        let prompt = Prompt {
            title: "Restore previous library?".to_string(),
            message: "Your current library will be swapped with the one from the last reset. \
                      The app restarts afterwards."
                .to_string(),
            action_label: "Restore".to_string(),
            danger: true,
        };
        self.run(Operation::Restore, prompt, async {
            if exists(&self.store).await? {
                let swap = sidecar(&self.trash, ".swap");
                move_store(&self.store, &swap).await?;
                move_store(&self.trash, &self.store).await?;
                move_store(&swap, &self.trash).await
            } else {
                move_store(&self.trash, &self.store).await
            }
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::sync::Mutex;

    /// Records every prompt and answers with a fixed value.
    struct Recorder {
        answer: bool,
        prompts: Mutex<Vec<Prompt>>,
    }
    impl Recorder {
        fn answering(answer: bool) -> Self {
            Self { answer, prompts: Mutex::new(Vec::new()) }
        }
    }
    #[async_trait]
    impl Confirm for Recorder {
        async fn confirm(&self, prompt: &Prompt) -> bool {
            self.prompts.lock().unwrap().push(prompt.clone());
            self.answer
        }
    }

    struct Fixture {
        dir: tempfile::TempDir,
        store: PathBuf,
        trash: PathBuf,
    }

    async fn fixture() -> (Fixture, Database) {
        let dir = tempfile::tempdir().unwrap();
        let store = dir.path().join("library.db");
        let trash = dir.path().join("trash").join("library.db");
        let db = Database::connect(&store).await.unwrap();
        (Fixture { dir, store, trash }, db)
    }

    #[rstest]
    #[case("/data/backup.db", "/data/backup.db")]
    #[case("file:///data/backup.db", "/data/backup.db")]
    #[case("file:///data/my%20backup.db", "/data/my backup.db")]
    #[case("relative/backup.db", "relative/backup.db")]
    fn test_parse_source(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(ImportSource::parse(input).unwrap().path(), Path::new(expected));
    }

    #[rstest]
    #[case("content://com.android.providers/document/42")]
    #[case("https://example.org/backup.db")]
    #[case("")]
    fn test_unsupported_source(#[case] input: &str) {
        let err = ImportSource::parse(input).unwrap_err();
        assert!(matches!(&*err, ErrorKind::UnsupportedSource(_)));
    }

    #[tokio::test]
    async fn test_declined_reset_touches_nothing() {
        let (f, db) = fixture().await;
        let guard = Guard::new(db.clone(), &f.store, &f.trash, Recorder::answering(false));
        assert_eq!(guard.reset().await.unwrap(), Outcome::Cancelled);
        assert_eq!(guard.state(), State::Idle);
        assert!(!db.is_closed());
        assert!(f.store.exists());

        let prompts = guard.confirm.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].danger);
    }

    #[tokio::test]
    async fn test_reset_moves_store_to_trash() {
        let (f, db) = fixture().await;
        let guard = Guard::new(db.clone(), &f.store, &f.trash, Assume(true));
        assert_eq!(guard.reset().await.unwrap(), Outcome::RestartRequired);
        assert_eq!(guard.state(), State::Success(Operation::Reset));
        assert!(db.is_closed());
        assert!(!f.store.exists());
        assert!(f.trash.exists());

        let err = guard.reset().await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidState(_)));
    }

    #[tokio::test]
    async fn test_import_rejects_bad_source_before_asking() {
        let (f, db) = fixture().await;
        let bogus = f.dir.path().join("notes.txt");
        std::fs::write(&bogus, b"hello").unwrap();
        let guard = Guard::new(db, &f.store, &f.trash, Recorder::answering(true));

        let err = guard.import(bogus.to_str().unwrap()).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotADatabase(_)));
        let err = guard.import("content://provider/doc/1").await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::UnsupportedSource(_)));
        let err = guard.import(f.store.to_str().unwrap()).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidState(_)));

        assert!(guard.confirm.prompts.lock().unwrap().is_empty());
        assert_eq!(guard.state(), State::Idle);
        assert!(f.store.exists());
    }

    #[tokio::test]
    async fn test_restore_with_empty_trash() {
        let (f, db) = fixture().await;
        let guard = Guard::new(db, &f.store, &f.trash, Assume(true));
        let err = guard.restore().await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound(_)));
        assert_eq!(guard.state(), State::Idle);
    }

    #[tokio::test]
    async fn test_failure_is_terminal() {
        let (f, db) = fixture().await;
        // The trash slot's parent is a file, so the move can't happen.
        let blocker = f.dir.path().join("blocker");
        std::fs::write(&blocker, b"").unwrap();
        let guard = Guard::new(db, &f.store, blocker.join("library.db"), Assume(true));
        assert!(guard.reset().await.is_err());
        assert_eq!(guard.state(), State::Failure(Operation::Reset));
        assert!(f.store.exists());
    }
}
