//! Outbound frame transports
//!
//! - NDI for network video (readback path, runtime loaded on demand)
//! - PNG sequences for offline rendering (readback path)
//! - GPU texture sharing (zero-copy path)

pub mod ndi;
pub mod ndi_ffi;
pub mod png_sequence;
pub mod texture_share;

pub use ndi::NdiSink;
pub use png_sequence::PngSequenceSink;
pub use texture_share::{platform_technology_name, GpuTextureMirror, MirrorHandle, TextureSharer};
