//! Master ↔ worker messages.
//!
//! # Wire Format
//! One JSON object per line on the worker's stdout:
//! ```text
//! {"cmd":"notifyRequest","pid":12345}
//! ```
//! Unknown `cmd` values parse as `IpcMessage::Other` and are ignored.
//!
//! # Design Decisions
//! - Sending never blocks the response path: `try_send` into a bounded queue,
//!   drained by a writer task
//! - Delivery is best-effort; a full queue or a vanished parent drops messages
//! - The parent closing the worker's stdin means "drain and exit"

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

use crate::observability::metrics;

/// Environment variable carrying the worker index; its presence marks a worker.
pub const WORKER_INDEX_ENV: &str = "HTTP_FRONT_WORKER_INDEX";

const IPC_QUEUE_CAPACITY: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "cmd")]
pub enum IpcMessage {
    /// One request finished in worker `pid`.
    #[serde(rename = "notifyRequest")]
    NotifyRequest { pid: u32 },

    /// Any other command, reserved for the host framework.
    #[serde(other)]
    Other,
}

impl IpcMessage {
    /// Parse one line. Lines that are not JSON objects with a `cmd` yield `None`.
    pub fn parse(line: &str) -> Option<Self> {
        serde_json::from_str(line.trim()).ok()
    }

    pub fn pid(&self) -> Option<u32> {
        match self {
            Self::NotifyRequest { pid } => Some(*pid),
            Self::Other => None,
        }
    }
}

/// Worker-side, non-blocking sender of request notifications.
#[derive(Debug, Clone)]
pub struct IpcNotifier {
    tx: mpsc::Sender<IpcMessage>,
    pid: u32,
}

impl IpcNotifier {
    /// Notifier plus the receiving end of its queue.
    pub fn channel(capacity: usize, pid: u32) -> (Self, mpsc::Receiver<IpcMessage>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx, pid }, rx)
    }

    /// Notifier whose messages are written to this process's stdout.
    pub fn connect_parent() -> Self {
        Self::connect_writer(tokio::io::stdout(), std::process::id())
    }

    /// Notifier whose messages are written as lines to `writer` by a background task.
    pub fn connect_writer<W>(mut writer: W, pid: u32) -> Self
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (notifier, mut rx) = Self::channel(IPC_QUEUE_CAPACITY, pid);

        tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                let Ok(mut line) = serde_json::to_vec(&message) else {
                    continue;
                };
                line.push(b'\n');
                if let Err(e) = writer.write_all(&line).await {
                    tracing::debug!(error = %e, "Parent IPC pipe closed");
                    break;
                }
                if rx.is_empty() {
                    let _ = writer.flush().await;
                }
            }
        });

        notifier
    }

    /// Fire-and-forget `notifyRequest`.
    pub fn notify_request(&self) {
        match self.tx.try_send(IpcMessage::NotifyRequest { pid: self.pid }) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::trace!("IPC queue full, dropping notifyRequest");
                metrics::record_ipc_dropped("full");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                metrics::record_ipc_dropped("closed");
            }
        }
    }
}

/// Resolves once the parent closes this process's stdin (or dies).
pub async fn parent_closed() {
    let mut stdin = tokio::io::stdin();
    let mut buf = [0u8; 256];
    loop {
        match stdin.read(&mut buf).await {
            Ok(0) | Err(_) => return,
            Ok(_) => continue,
        }
    }
}
