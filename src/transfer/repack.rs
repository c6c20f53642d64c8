//! Row unpadding and channel-order repacking
//!
//! Both operations split the frame into `N = available_parallelism()`
//! contiguous ranges and process them on the rayon pool.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::TransferError;

/// Byte order of one pixel in a frame buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PixelFormat {
    /// R, G, B, A. The render targets' native order.
    #[default]
    Rgba8,
    /// B, G, R, A. Expected by most video transports.
    Bgra8,
}

impl PixelFormat {
    pub const fn bytes_per_pixel(self) -> usize {
        4
    }

    pub fn label(self) -> &'static str {
        match self {
            PixelFormat::Rgba8 => "RGBA",
            PixelFormat::Bgra8 => "BGRA",
        }
    }
}

/// Number of parallel ranges a frame is split into.
pub fn parallel_parts() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Items per part when `count` items are split into `parts` contiguous ranges.
fn part_len(count: usize, parts: usize) -> usize {
    count.div_ceil(parts.max(1)).max(1)
}

/// Copy `height` rows of `row_bytes` out of a buffer with `src_stride`-byte
/// rows into the tightly packed `dst`.
pub fn unpad_rows(
    src: &[u8],
    src_stride: usize,
    row_bytes: usize,
    height: usize,
    dst: &mut [u8],
) -> Result<(), TransferError> {
    if row_bytes == 0 || height == 0 {
        return Ok(());
    }
    let required = (height - 1) * src_stride + row_bytes;
    if src.len() < required || src_stride < row_bytes {
        return Err(TransferError::SizeMismatch {
            expected: required,
            actual: src.len(),
        });
    }
    if dst.len() != row_bytes * height {
        return Err(TransferError::SizeMismatch {
            expected: row_bytes * height,
            actual: dst.len(),
        });
    }

    let rows_per_part = part_len(height, parallel_parts());
    dst.par_chunks_mut(rows_per_part * row_bytes)
        .enumerate()
        .for_each(|(part, chunk)| {
            for (i, row) in chunk.chunks_mut(row_bytes).enumerate() {
                let start = (part * rows_per_part + i) * src_stride;
                row.copy_from_slice(&src[start..start + row_bytes]);
            }
        });
    Ok(())
}

/// Reorder every pixel of `data` from `from` to `to` in place.
pub fn convert_in_place(data: &mut [u8], from: PixelFormat, to: PixelFormat) {
    if from == to {
        return;
    }
    // Both conversions swap the R and B channels
    let pixels = data.len() / 4;
    let pixels_per_part = part_len(pixels, parallel_parts());
    data[..pixels * 4]
        .par_chunks_mut(pixels_per_part * 4)
        .for_each(|chunk| {
            for pixel in chunk.chunks_exact_mut(4) {
                pixel.swap(0, 2);
            }
        });
}
