//! Numbered PNG frame output for offline domemaster rendering

use std::path::{Path, PathBuf};

use crate::transfer::{FrameBuffer, FrameSink, PixelFormat, TransportError};

/// Writes each frame to `<dir>/<prefix>_<index>.png`.
pub struct PngSequenceSink {
    name: String,
    directory: PathBuf,
    prefix: String,
    next_index: u64,
}

impl PngSequenceSink {
    /// Create the sink, creating `directory` if needed.
    pub fn new(name: &str, directory: impl Into<PathBuf>) -> Result<Self, TransportError> {
        let directory = directory.into();
        std::fs::create_dir_all(&directory)?;
        tracing::info!("PNG sequence '{}': writing to {}", name, directory.display());

        Ok(Self {
            name: name.to_string(),
            directory,
            prefix: sanitize(name),
            next_index: 0,
        })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Path the frame with `index` is written to.
    pub fn frame_path(&self, index: u64) -> PathBuf {
        self.directory.join(format!("{}_{:06}.png", self.prefix, index))
    }

    pub fn frames_written(&self) -> u64 {
        self.next_index
    }
}

fn sanitize(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    if cleaned.is_empty() {
        "frame".to_string()
    } else {
        cleaned
    }
}

impl FrameSink for PngSequenceSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn preferred_format(&self) -> PixelFormat {
        PixelFormat::Rgba8
    }

    fn send(&mut self, frame: &FrameBuffer) -> Result<(), TransportError> {
        let expected = frame.expected_len();
        if frame.data.len() != expected {
            return Err(TransportError::DataSize {
                expected,
                actual: frame.data.len(),
            });
        }

        let path = self.frame_path(self.next_index);
        image::save_buffer_with_format(
            &path,
            &frame.data,
            frame.width,
            frame.height,
            image::ExtendedColorType::Rgba8,
            image::ImageFormat::Png,
        )?;
        self.next_index += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transfer::StagingPool;

    fn temp_dir(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!("domecast-png-{}-{}", tag, std::process::id()))
    }

    #[test]
    fn test_writes_numbered_frames() {
        let dir = temp_dir("frames");
        let mut sink = PngSequenceSink::new("dome master", &dir).unwrap();

        let mut pool = StagingPool::new(2);
        let mut frame = pool.acquire(3, 2).unwrap();
        for pixel in frame.data.chunks_exact_mut(4) {
            pixel.copy_from_slice(&[255, 0, 0, 255]);
        }
        sink.send(&frame).unwrap();
        sink.send(&frame).unwrap();

        assert_eq!(sink.frames_written(), 2);
        let first = sink.frame_path(0);
        assert!(first.ends_with("dome_master_000000.png"));

        let decoded = image::open(&first).unwrap().to_rgba8();
        assert_eq!(decoded.dimensions(), (3, 2));
        assert_eq!(decoded.get_pixel(2, 1).0, [255, 0, 0, 255]);
        assert!(sink.frame_path(1).exists());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_rejects_short_frame() {
        let dir = temp_dir("short");
        let mut sink = PngSequenceSink::new("short", &dir).unwrap();
        let mut pool = StagingPool::new(2);
        let mut frame = pool.acquire(2, 2).unwrap();
        frame.data.truncate(4);

        assert!(matches!(sink.send(&frame), Err(TransportError::DataSize { expected: 16, actual: 4 })));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_sanitize() {
        assert_eq!(sanitize("a b/c"), "a_b_c");
        assert_eq!(sanitize(""), "frame");
    }
}
