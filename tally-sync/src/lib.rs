#![deny(clippy::print_stdout, clippy::print_stderr)]

//! Sync engine: the watermark-driven incremental / chunked-snapshot
//! state machine, the per-tenant voucher fan-out and the progress bus.

use thiserror::Error;

mod chunks;
mod engine;
mod progress;
mod registry;
mod upstream;

pub use chunks::Chunk;
pub use chunks::generate_chunks;
pub use engine::ChunkOutcome;
pub use engine::KindOutcome;
pub use engine::RunReport;
pub use engine::SyncConfig;
pub use engine::SyncEngine;
pub use progress::ChannelSink;
pub use progress::LogLevel;
pub use progress::NullSink;
pub use progress::ProgressEvent;
pub use progress::ProgressSink;
pub use progress::SyncStatus;
pub use progress::TracingSink;
pub use registry::RuntimeKey;
pub use registry::SyncRuntime;
pub use registry::register_runtime;
pub use registry::runtime;
pub use registry::unregister_runtime;
pub use upstream::Upstream;

pub type SyncResult<T> = Result<T, SyncError>;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Upstream(#[from] tally_upstream::UpstreamError),
    #[error(transparent)]
    Warehouse(#[from] tally_warehouse::WarehouseError),
}
