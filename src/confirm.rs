use async_trait::async_trait;
use shelf_backup::{Confirm, Prompt};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

/// Asks on the terminal, unless `--yes` already answered.
pub struct TerminalConfirm {
    assume_yes: bool,
}
impl TerminalConfirm {
    pub fn new(assume_yes: bool) -> Self {
        Self { assume_yes }
    }

    async fn ask(prompt: &Prompt) -> std::io::Result<bool> {
        let mut stderr = tokio::io::stderr();
        let warning = if prompt.danger { " (destructive)" } else { "" };
        let text = format!(
            "{}{warning}\n{}\nType \"{}\" to continue: ",
            prompt.title, prompt.message, prompt.action_label
        );
        stderr.write_all(text.as_bytes()).await?;
        stderr.flush().await?;

        let mut line = String::new();
        BufReader::new(tokio::io::stdin()).read_line(&mut line).await?;
        Ok(accepts(&line, &prompt.action_label))
    }
}

#[async_trait]
impl Confirm for TerminalConfirm {
    async fn confirm(&self, prompt: &Prompt) -> bool {
        if self.assume_yes {
            return true;
        }
        match Self::ask(prompt).await {
            Ok(answer) => answer,
            Err(e) => {
                tracing::warn!(error = %e, "Couldn't read an answer; treating as declined");
                false
            },
        }
    }
}

/// Only the action label itself confirms. Anything else, including EOF, declines.
fn accepts(answer: &str, action_label: &str) -> bool {
    answer.trim().eq_ignore_ascii_case(action_label)
}
