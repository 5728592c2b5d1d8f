use std::io::Read;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use freightdesk_core::api::RetryPolicy;
use freightdesk_core::{ApiError, CarrierEndpoint, CarrierId, CarrierSession};
use serde_json::Value;
use tokio::task::JoinHandle;

use super::explain;

fn read_body(path: Option<&Path>) -> Result<Value> {
    let contents = match path {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?,
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read payload from stdin")?;
            buf
        }
    };
    serde_json::from_str(&contents).context("Payload is not valid JSON")
}

pub async fn run(
    session: &CarrierSession,
    carrier: CarrierId,
    endpoint: CarrierEndpoint,
    body: Option<&Path>,
) -> Result<()> {
    let body = read_body(body)?;
    let response = session.send(carrier, endpoint, &body).await.map_err(explain)?;
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

pub async fn pdf(session: &CarrierSession, carrier: CarrierId, body: &Path, out: &Path) -> Result<()> {
    let body = read_body(Some(body))?;
    let bytes = session.download_bol_pdf(carrier, &body).await.map_err(explain)?;
    std::fs::write(out, &bytes).with_context(|| format!("Failed to write {}", out.display()))?;
    eprintln!("Wrote {} bytes to {}", bytes.len(), out.display());
    Ok(())
}

/// Retry hook that counts down to the retry instant on stderr.
///
/// At most one countdown runs at a time: a new retry replaces the previous
/// countdown, and [`RetryReporter::finish`] stops whatever is left.
#[derive(Clone, Default)]
pub struct RetryReporter {
    countdown: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl RetryReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn report(&self, error: &ApiError, attempt: u32, retry_after: Option<DateTime<Utc>>) {
        let wait = match retry_after {
            Some(at) => (at - Utc::now()).to_std().unwrap_or(Duration::ZERO),
            None => RetryPolicy::backoff_delay(attempt.saturating_sub(1)),
        };
        eprintln!("{} - retry {} in {}s", error, attempt, wait.as_secs());
        self.start_countdown(wait.as_secs());
    }

    /// Replace the running countdown, handing back the one it replaced
    fn start_countdown(&self, seconds: u64) -> Option<JoinHandle<()>> {
        let mut countdown = self.countdown.lock().unwrap_or_else(PoisonError::into_inner);
        let previous = countdown.take();
        if let Some(ref handle) = previous {
            handle.abort();
        }
        if seconds > 1 {
            *countdown = Some(tokio::spawn(async move {
                for remaining in (1..seconds).rev() {
                    tokio::time::sleep(Duration::from_secs(1)).await;
                    eprint!("\rRetrying in {:>3}s", remaining);
                }
                eprintln!();
            }));
        }
        previous
    }

    /// Stop any countdown still running
    pub fn finish(&self) {
        if let Some(handle) = self
            .countdown
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            handle.abort();
        }
    }
}
