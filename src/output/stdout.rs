use async_trait::async_trait;
use tokio::io::{AsyncWriteExt, Stdout};
use tokio::sync::Mutex;

use super::{OutgoingMessage, Output, OutputError};

/// Prints each message on the process's standard output.
pub struct StdoutOutput {
    out: Mutex<Stdout>,
}

impl StdoutOutput {
    pub fn new() -> Self {
        Self {
            out: Mutex::new(tokio::io::stdout()),
        }
    }
}

impl Default for StdoutOutput {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Output for StdoutOutput {
    fn name(&self) -> &'static str {
        "stdout"
    }

    async fn write(&self, message: &OutgoingMessage) -> Result<usize, OutputError> {
        let mut out = self.out.lock().await;
        out.write_all(message.body.as_bytes()).await?;
        if !message.body.ends_with('\n') {
            out.write_all(b"\n").await?;
        }
        out.flush().await?;
        Ok(message.body.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_reports_body_length() {
        let output = StdoutOutput::new();
        let written = output.write(&OutgoingMessage::new("hello")).await.unwrap();
        assert_eq!(written, 5);
    }

    #[test]
    fn test_no_routing() {
        let output = StdoutOutput::new();
        assert_eq!(output.route(&serde_json::json!({ "to": "x" })).unwrap(), None);
    }
}
