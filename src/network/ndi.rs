//! NDI output sink
//!
//! Publishes frames as an NDI source discoverable on the local network.
//! When the NDI runtime cannot be loaded the sink stays uninitialized and
//! every frame offered to it is dropped.

use std::ffi::CString;
use std::sync::{Arc, OnceLock};

use super::ndi_ffi::{
    NDIlib_FourCC_video_type_e, NDIlib_frame_format_type_e, NDIlib_send_create_t, NDIlib_send_instance_t,
    NDIlib_video_frame_v2_t, NdiLibrary, NDILIB_SEND_TIMECODE_SYNTHESIZE,
};
use crate::transfer::{FrameBuffer, FrameSink, PixelFormat, TransportError};

static NDI_LIBRARY: OnceLock<Option<Arc<NdiLibrary>>> = OnceLock::new();

/// Load the NDI runtime once per process.
fn ndi_library() -> Option<Arc<NdiLibrary>> {
    NDI_LIBRARY
        .get_or_init(|| match NdiLibrary::load() {
            Ok(library) => {
                tracing::info!(
                    "NDI: Library initialized from {} (version: {})",
                    library.path().display(),
                    library.version()
                );
                Some(Arc::new(library))
            }
            Err(e) => {
                tracing::warn!("NDI: runtime not available ({}); NDI outputs are disabled", e);
                None
            }
        })
        .clone()
}

/// Whether the NDI runtime is installed and initialized.
pub fn is_available() -> bool {
    ndi_library().is_some()
}

fn fourcc(format: PixelFormat) -> NDIlib_FourCC_video_type_e {
    match format {
        PixelFormat::Bgra8 => NDIlib_FourCC_video_type_e::BGRA,
        PixelFormat::Rgba8 => NDIlib_FourCC_video_type_e::RGBA,
    }
}

/// NDI sender for the readback path.
pub struct NdiSink {
    name: String,
    library: Option<Arc<NdiLibrary>>,
    sender: NDIlib_send_instance_t,
    frame_rate: u32,
    format: PixelFormat,
}

// The sender handle is only used from the owning worker thread
unsafe impl Send for NdiSink {}

impl NdiSink {
    /// Create an NDI source named `name` clocked at `frame_rate`.
    pub fn try_new(name: &str, frame_rate: u32) -> Result<Self, TransportError> {
        let library = ndi_library().ok_or(TransportError::NotInitialized)?;

        if !library.is_supported_cpu() {
            return Err(TransportError::CreateFailed("CPU not supported by NDI".into()));
        }

        let c_name = CString::new(name).map_err(|_| TransportError::InvalidName)?;
        let settings = NDIlib_send_create_t {
            p_ndi_name: c_name.as_ptr(),
            ..Default::default()
        };

        let sender = unsafe { library.send_create(&settings) };
        if sender.is_null() {
            return Err(TransportError::CreateFailed(format!("NDIlib_send_create returned null for '{}'", name)));
        }

        tracing::info!("NDI Sender: Created sender '{}' at {}fps", name, frame_rate);
        Ok(Self {
            name: name.to_string(),
            library: Some(library),
            sender,
            frame_rate: frame_rate.max(1),
            format: PixelFormat::Bgra8,
        })
    }

    /// Like [`NdiSink::try_new`], but returns an uninitialized sink on failure
    /// so the output can stay configured.
    pub fn new(name: &str, frame_rate: u32) -> Self {
        match Self::try_new(name, frame_rate) {
            Ok(sink) => sink,
            Err(e) => {
                tracing::warn!("NDI Sender '{}': {}", name, e);
                Self {
                    name: name.to_string(),
                    library: None,
                    sender: std::ptr::null_mut(),
                    frame_rate: frame_rate.max(1),
                    format: PixelFormat::Bgra8,
                }
            }
        }
    }

    /// Pixel order handed to NDI. Defaults to BGRA.
    pub fn with_pixel_format(mut self, format: PixelFormat) -> Self {
        self.format = format;
        self
    }

    /// Number of connected receivers.
    pub fn connection_count(&self) -> i32 {
        match &self.library {
            Some(library) if !self.sender.is_null() => unsafe { library.connections(self.sender) },
            _ => 0,
        }
    }
}

impl FrameSink for NdiSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn preferred_format(&self) -> PixelFormat {
        self.format
    }

    fn is_ready(&self) -> bool {
        self.library.is_some() && !self.sender.is_null()
    }

    fn send(&mut self, frame: &FrameBuffer) -> Result<(), TransportError> {
        let Some(library) = &self.library else {
            return Err(TransportError::NotInitialized);
        };
        if self.sender.is_null() {
            return Err(TransportError::NotInitialized);
        }

        let expected = frame.expected_len();
        if frame.data.len() != expected {
            return Err(TransportError::DataSize {
                expected,
                actual: frame.data.len(),
            });
        }

        let video_frame = NDIlib_video_frame_v2_t {
            xres: frame.width as i32,
            yres: frame.height as i32,
            FourCC: fourcc(frame.format),
            frame_rate_N: self.frame_rate as i32,
            frame_rate_D: 1,
            picture_aspect_ratio: frame.width as f32 / frame.height.max(1) as f32,
            frame_format_type: NDIlib_frame_format_type_e::Progressive,
            timecode: NDILIB_SEND_TIMECODE_SYNTHESIZE,
            p_data: frame.data.as_ptr() as *mut u8,
            line_stride_in_bytes: frame.stride_bytes as i32,
            p_metadata: std::ptr::null(),
            timestamp: 0,
        };

        // Synchronous send: NDI is done with the data when this returns
        unsafe { library.send_video(self.sender, &video_frame) };
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(library) = &self.library {
            if !self.sender.is_null() {
                tracing::info!("NDI Sender: Destroying sender '{}'", self.name);
                unsafe { library.send_destroy(self.sender) };
                self.sender = std::ptr::null_mut();
            }
        }
    }
}

impl Drop for NdiSink {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fourcc_follows_pixel_format() {
        assert_eq!(fourcc(PixelFormat::Bgra8), NDIlib_FourCC_video_type_e::BGRA);
        assert_eq!(fourcc(PixelFormat::Rgba8), NDIlib_FourCC_video_type_e::RGBA);
    }

    #[test]
    fn test_uninitialized_sink_rejects_frames() {
        let mut sink = NdiSink {
            name: "offline".into(),
            library: None,
            sender: std::ptr::null_mut(),
            frame_rate: 30,
            format: PixelFormat::Bgra8,
        };
        assert!(!sink.is_ready());
        assert_eq!(sink.connection_count(), 0);
        assert_eq!(sink.preferred_format(), PixelFormat::Bgra8);
        let mut sink = sink.with_pixel_format(PixelFormat::Rgba8);
        assert_eq!(sink.preferred_format(), PixelFormat::Rgba8);

        let mut pool = crate::transfer::StagingPool::new(2);
        let frame = pool.acquire(2, 2).unwrap();
        assert!(matches!(sink.send(&frame), Err(TransportError::NotInitialized)));
        sink.stop();
    }
}
