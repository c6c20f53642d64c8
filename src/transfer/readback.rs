//! GPU to CPU readback ring
//!
//! Triple-buffered async readback so the render loop never stalls on the
//! GPU in the common case:
//! 1. Frame N: copy the target into buffer A
//! 2. Frame N+1: copy into buffer B, start mapping A
//! 3. Frame N+2: copy into buffer C, read A if mapped, map B
//!
//! Only when every buffer is still in flight does [`ReadbackRing::process`]
//! block on the device, and frames are always delivered in capture order.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use super::TransferError;

/// Number of readback buffers per output.
pub const RING_SIZE: usize = 3;

const MAP_WAITING: u8 = 0;
const MAP_DONE: u8 = 1;
const MAP_FAILED: u8 = 2;

/// Row layout of a readback buffer. wgpu requires each copied row to start
/// on a 256-byte boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaddedRows {
    pub width: u32,
    pub height: u32,
    /// Actual pixel bytes per row
    pub unpadded_bytes_per_row: u32,
    /// Row pitch in the buffer
    pub padded_bytes_per_row: u32,
}

impl PaddedRows {
    pub fn new(width: u32, height: u32) -> Self {
        let unpadded_bytes_per_row = width * 4;
        let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        Self {
            width,
            height,
            unpadded_bytes_per_row,
            padded_bytes_per_row: unpadded_bytes_per_row.div_ceil(align) * align,
        }
    }

    pub fn buffer_size(&self) -> u64 {
        self.padded_bytes_per_row as u64 * self.height as u64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SlotState {
    /// Free for a new capture
    Available,
    /// Copy recorded, map not started
    Pending,
    /// map_async called, waiting for the callback
    Mapping,
    /// Mapped and readable
    Ready,
    /// Mapping failed; the frame is lost
    Failed,
}

struct ReadbackSlot {
    buffer: wgpu::Buffer,
    state: SlotState,
    /// Written by the map callback
    map_status: Arc<AtomicU8>,
    sequence: u64,
}

/// A mapped frame borrowed from the ring for the duration of the callback.
pub struct ReadbackFrame<'a> {
    pub data: &'a [u8],
    pub layout: PaddedRows,
    pub sequence: u64,
}

/// What one call to [`ReadbackRing::process`] did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadbackSummary {
    pub delivered: u32,
    pub dropped: u32,
    /// True when the ring was full and the device was waited on
    pub waited: bool,
}

pub struct ReadbackRing {
    slots: Vec<ReadbackSlot>,
    layout: PaddedRows,
    next_sequence: u64,
}

impl ReadbackRing {
    pub fn new(device: &wgpu::Device, label: &str, width: u32, height: u32) -> Self {
        let layout = PaddedRows::new(width.max(1), height.max(1));
        let slots = (0..RING_SIZE)
            .map(|i| ReadbackSlot {
                buffer: device.create_buffer(&wgpu::BufferDescriptor {
                    label: Some(&format!("{} Readback {}", label, i)),
                    size: layout.buffer_size(),
                    usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
                    mapped_at_creation: false,
                }),
                state: SlotState::Available,
                map_status: Arc::new(AtomicU8::new(MAP_WAITING)),
                sequence: 0,
            })
            .collect();

        Self {
            slots,
            layout,
            next_sequence: 0,
        }
    }

    pub fn layout(&self) -> PaddedRows {
        self.layout
    }

    pub fn matches(&self, width: u32, height: u32) -> bool {
        self.layout.width == width && self.layout.height == height
    }

    pub fn has_free_slot(&self) -> bool {
        self.slots.iter().any(|s| s.state == SlotState::Available)
    }

    /// Frames captured but not yet delivered or dropped.
    pub fn in_flight(&self) -> usize {
        self.slots.iter().filter(|s| s.state != SlotState::Available).count()
    }

    /// Record a copy of mip 0 of `texture` into a free buffer.
    ///
    /// Returns the frame's sequence number, or [`TransferError::RingFull`]
    /// when no buffer is free.
    pub fn capture(&mut self, encoder: &mut wgpu::CommandEncoder, texture: &wgpu::Texture) -> Result<u64, TransferError> {
        let Some(slot) = self.slots.iter_mut().find(|s| s.state == SlotState::Available) else {
            return Err(TransferError::RingFull);
        };

        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &slot.buffer,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(self.layout.padded_bytes_per_row),
                    rows_per_image: Some(self.layout.height),
                },
            },
            wgpu::Extent3d {
                width: self.layout.width,
                height: self.layout.height,
                depth_or_array_layers: 1,
            },
        );

        slot.sequence = self.next_sequence;
        slot.state = SlotState::Pending;
        self.next_sequence += 1;
        Ok(slot.sequence)
    }

    /// Advance mapping and hand finished frames to `on_frame` in capture order.
    ///
    /// Must be called after the encoder holding the copies was submitted.
    /// Non-blocking unless no buffer would be free for the next capture.
    pub fn process(&mut self, device: &wgpu::Device, mut on_frame: impl FnMut(ReadbackFrame<'_>)) -> ReadbackSummary {
        let mut summary = ReadbackSummary::default();

        let _ = device.poll(wgpu::Maintain::Poll);
        self.advance();
        self.deliver(&mut on_frame, &mut summary);

        if !self.has_free_slot() {
            summary.waited = true;
            let _ = device.poll(wgpu::Maintain::Wait);
            self.advance();
            self.deliver(&mut on_frame, &mut summary);
        }

        summary
    }

    fn advance(&mut self) {
        for slot in &mut self.slots {
            match slot.state {
                SlotState::Pending => {
                    let status = Arc::clone(&slot.map_status);
                    status.store(MAP_WAITING, Ordering::Release);
                    slot.buffer.slice(..).map_async(wgpu::MapMode::Read, move |result| {
                        let value = if result.is_ok() { MAP_DONE } else { MAP_FAILED };
                        status.store(value, Ordering::Release);
                    });
                    slot.state = SlotState::Mapping;
                }
                SlotState::Mapping => match slot.map_status.load(Ordering::Acquire) {
                    MAP_DONE => slot.state = SlotState::Ready,
                    MAP_FAILED => slot.state = SlotState::Failed,
                    _ => {}
                },
                SlotState::Available | SlotState::Ready | SlotState::Failed => {}
            }
        }
    }

    fn deliver(&mut self, on_frame: &mut impl FnMut(ReadbackFrame<'_>), summary: &mut ReadbackSummary) {
        loop {
            // Oldest frame still in the ring
            let Some(index) = self
                .slots
                .iter()
                .enumerate()
                .filter(|(_, s)| s.state != SlotState::Available)
                .min_by_key(|(_, s)| s.sequence)
                .map(|(i, _)| i)
            else {
                return;
            };

            let slot = &mut self.slots[index];
            match slot.state {
                SlotState::Ready => {
                    {
                        let data = slot.buffer.slice(..).get_mapped_range();
                        on_frame(ReadbackFrame {
                            data: &data[..],
                            layout: self.layout,
                            sequence: slot.sequence,
                        });
                    }
                    slot.buffer.unmap();
                    slot.state = SlotState::Available;
                    summary.delivered += 1;
                }
                SlotState::Failed => {
                    tracing::warn!(sequence = slot.sequence, "Readback: buffer map failed, frame dropped");
                    slot.state = SlotState::Available;
                    summary.dropped += 1;
                }
                // Later frames wait behind this one
                _ => return,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bytes_per_row_alignment() {
        // 1920 * 4 = 7680 is already a multiple of 256
        let layout = PaddedRows::new(1920, 1080);
        assert_eq!(layout.padded_bytes_per_row, 7680);
        assert_eq!(layout.buffer_size(), 7680 * 1080);

        // 100 * 4 = 400 rounds up to 512
        let layout = PaddedRows::new(100, 10);
        assert_eq!(layout.unpadded_bytes_per_row, 400);
        assert_eq!(layout.padded_bytes_per_row, 512);
    }
}
