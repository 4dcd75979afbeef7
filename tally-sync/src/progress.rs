//! Progress bus: typed events from the engine to whatever is watching.
//!
//! Producers never block. The channel sink drops events once the
//! consumer goes away, the tracing sink folds them into the normal log
//! stream, and the null sink is for headless runs and tests.

use std::fmt::Display;

use tokio::sync::mpsc;
use tracing::error;
use tracing::info;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStatus {
    Syncing,
    Synced,
    SyncError,
}

impl Display for SyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncStatus::Syncing => write!(f, "syncing"),
            SyncStatus::Synced => write!(f, "synced"),
            SyncStatus::SyncError => write!(f, "sync_error"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    Log {
        company: String,
        level: LogLevel,
        message: String,
    },
    Progress {
        company: String,
        pct: f32,
        label: String,
    },
    Status {
        company: String,
        status: SyncStatus,
    },
    Done {
        company: String,
        success: bool,
    },
    AllDone,
    SchedulerUpdated {
        company: String,
    },
}

/// Non-blocking event consumer seam. The engine takes one of these; the
/// UI, a file logger and the null sink all implement it.
pub trait ProgressSink: Send + Sync {
    fn emit(&self, event: ProgressEvent);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl ProgressSink for NullSink {
    fn emit(&self, _event: ProgressEvent) {}
}

/// Folds progress events into the tracing stream.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl ProgressSink for TracingSink {
    fn emit(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::Log {
                company,
                level,
                message,
            } => match level {
                LogLevel::Info => info!("[{company}] {message}"),
                LogLevel::Warning => warn!("[{company}] {message}"),
                LogLevel::Error => error!("[{company}] {message}"),
            },
            ProgressEvent::Progress {
                company,
                pct,
                label,
            } => info!("[{company}] {pct:.0}% {label}"),
            ProgressEvent::Status { company, status } => info!("[{company}] status: {status}"),
            ProgressEvent::Done { company, success } => {
                info!("[{company}] done, success={success}");
            }
            ProgressEvent::AllDone => info!("all companies done"),
            ProgressEvent::SchedulerUpdated { company } => {
                info!("[{company}] schedule updated");
            }
        }
    }
}

/// Multi-producer channel sink; the single consumer drains the receiver
/// at its own pace.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    sender: mpsc::UnboundedSender<ProgressEvent>,
}

impl ChannelSink {
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ProgressEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl ProgressSink for ChannelSink {
    fn emit(&self, event: ProgressEvent) {
        // A closed receiver means the consumer shut down; events are
        // dropped rather than blocking any producer.
        let _ = self.sender.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn channel_sink_delivers_in_order() {
        let (sink, mut receiver) = ChannelSink::new();
        sink.emit(ProgressEvent::Status {
            company: "Demo Co".into(),
            status: SyncStatus::Syncing,
        });
        sink.emit(ProgressEvent::Done {
            company: "Demo Co".into(),
            success: true,
        });
        sink.emit(ProgressEvent::AllDone);

        assert_eq!(
            receiver.try_recv().expect("first"),
            ProgressEvent::Status {
                company: "Demo Co".into(),
                status: SyncStatus::Syncing,
            }
        );
        assert_eq!(
            receiver.try_recv().expect("second"),
            ProgressEvent::Done {
                company: "Demo Co".into(),
                success: true,
            }
        );
        assert_eq!(receiver.try_recv().expect("third"), ProgressEvent::AllDone);
    }

    #[test]
    fn emits_after_consumer_drop_are_silently_discarded() {
        let (sink, receiver) = ChannelSink::new();
        drop(receiver);
        sink.emit(ProgressEvent::AllDone);
    }
}
