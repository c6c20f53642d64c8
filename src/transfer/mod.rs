//! Frame transfer
//!
//! Moves rendered projections out of the GPU, per output per frame:
//!
//! ```text
//! SELECT ──► READBACK ──► COPY ──► HANDOFF
//! (view)     (ring)       (pool)   (sink worker)
//! ```
//!
//! Texture-sharing outputs skip readback and receive the GPU texture.

pub mod output;
pub mod readback;
pub mod repack;
pub mod sink;
pub mod staging;
pub mod worker;

pub use output::{OutputId, OutputKind, OutputManager};
pub use readback::{PaddedRows, ReadbackRing};
pub use repack::PixelFormat;
pub use sink::{FrameSink, TransportError};
pub use staging::{FrameBuffer, StagingPool, StagingRecycler};
pub use worker::{SinkStats, SinkWorker};

/// Errors raised while moving frames between the GPU and sinks.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("no readback buffer free")]
    RingFull,
    #[error("staging pool exhausted ({capacity} buffers in flight)")]
    PoolExhausted { capacity: usize },
    #[error("frame size mismatch: expected {expected} bytes, got {actual}")]
    SizeMismatch { expected: usize, actual: usize },
    #[error("sink queue full")]
    QueueFull,
    #[error("sink worker for '{0}' is gone")]
    WorkerGone(String),
    #[error("{} view is preview only and cannot be sent to outputs", .0.display_name())]
    ViewNotTransferable(crate::projection::ViewSelection),
    #[error("failed to spawn sink worker: {0}")]
    WorkerSpawn(#[from] std::io::Error),
}
