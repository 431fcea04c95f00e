// Operator confirmation before irreversible deletion.
// The console gate asks for a random challenge ("Yes-<token>") and gives up after a wall-clock timeout.

use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, Stderr, Stdin};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::error::{CollectorError, Result};

#[async_trait]
pub trait ConfirmationGate: Send + Sync {
    /// `Ok(())` only when the operator explicitly approved deleting `ticker_symbols` on `server`.
    async fn confirm(&self, ticker_symbols: &[String], server: &str, timeout: Duration)
    -> Result<()>;
}

/// Approves everything. For automation that already decided to delete.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysApprove;

#[async_trait]
impl ConfirmationGate for AlwaysApprove {
    async fn confirm(&self, ticker_symbols: &[String], server: &str, _timeout: Duration) -> Result<()> {
        info!(symbols = ?ticker_symbols, server, "destructive action pre-approved");
        Ok(())
    }
}

pub struct PromptConfirmation<R, W> {
    io: Mutex<(R, W)>,
    fixed_token: Option<u32>,
}

impl PromptConfirmation<BufReader<Stdin>, Stderr> {
    /// Prompts on stderr, reads the answer from stdin.
    pub fn console() -> Self {
        Self::new(BufReader::new(tokio::io::stdin()), tokio::io::stderr())
    }
}

impl<R, W> PromptConfirmation<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            io: Mutex::new((reader, writer)),
            fixed_token: None,
        }
    }

    /// Uses `token` instead of a random challenge.
    pub fn with_fixed_token(mut self, token: u32) -> Self {
        self.fixed_token = Some(token);
        self
    }

    pub fn into_inner(self) -> (R, W) {
        self.io.into_inner()
    }
}

#[async_trait]
impl<R, W> ConfirmationGate for PromptConfirmation<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    async fn confirm(
        &self,
        ticker_symbols: &[String],
        server: &str,
        timeout: Duration,
    ) -> Result<()> {
        let token = self
            .fixed_token
            .unwrap_or_else(|| rand::thread_rng().gen_range(1..=99_999));
        let expected = format!("Yes-{}", token);

        let mut io = self.io.lock().await;
        let (reader, writer) = &mut *io;

        let prompt = format!(
            "\nWARNING: this permanently deletes all metrics, models and data of {} company(ies) \
             with ticker symbols {:?} on {}.\nType {} within {}s to proceed: ",
            ticker_symbols.len(),
            ticker_symbols,
            server,
            expected,
            timeout.as_secs()
        );
        writer.write_all(prompt.as_bytes()).await?;
        writer.flush().await?;

        let mut answer = String::new();
        match tokio::time::timeout(timeout, reader.read_line(&mut answer)).await {
            Err(_) => {
                warn!(timeout_secs = timeout.as_secs(), "no confirmation before timeout");
                Err(CollectorError::WarningPromptTimeout {
                    timeout_secs: timeout.as_secs(),
                })
            }
            Ok(Err(e)) => Err(e.into()),
            Ok(Ok(_)) if answer.trim() == expected => {
                info!(symbols = ?ticker_symbols, server, "destructive action confirmed");
                Ok(())
            }
            Ok(Ok(_)) => {
                warn!("operator declined destructive action");
                Err(CollectorError::UserAbortedOperation)
            }
        }
    }
}
