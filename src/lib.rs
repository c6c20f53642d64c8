//! Domecast
//!
//! Real-time fulldome projection: a scene is captured into a cube map from
//! the origin, reprojected to an equirectangular panorama and then to a
//! fisheye domemaster (plus a skybox cross preview), and the results are
//! streamed to outputs such as NDI or PNG sequences.
//!
//! # Modules
//!
//! - `projection` - Cube capture, reprojection passes and the per-frame pipeline
//! - `transfer` - GPU readback ring, staging pool and per-output sink workers
//! - `network` - Output transports (NDI, PNG sequence, GPU texture sharing)
//! - `scene` - The trait external content implements
//! - `demo` - Built-in sky sphere scene
//! - `settings` - XML settings persistence
//! - `telemetry` - Logging setup and frame/transfer statistics
//! - `gpu_context` - Device and surface setup

pub mod demo;
pub mod gpu_context;
pub mod network;
pub mod projection;
pub mod scene;
pub mod settings;
pub mod shaders;
pub mod telemetry;
pub mod transfer;

pub use gpu_context::{GpuContext, GpuInitError, WindowGpuContext};
pub use projection::{
    FrameReport, PassOutcome, PipelineConfig, ProjectionControls, ProjectionError, ProjectionPipeline, ViewSelection,
};
pub use scene::{SceneRenderer, SceneView};
pub use settings::{DomeSettings, OutputConfig, OutputType, SettingsError};
pub use transfer::{FrameBuffer, FrameSink, OutputManager, PixelFormat, TransferError, TransportError};
