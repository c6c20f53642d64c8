//! Pooled CPU frame buffers
//!
//! Each output owns a small pool of tightly packed frame buffers. A buffer
//! moves by ownership from the render thread to the sink worker and comes
//! back through the pool's return channel once sent. Buffers are only
//! reallocated when the frame size changes; stale buffers returned after a
//! size change are dropped.

use crossbeam_channel::{Receiver, Sender};

use super::repack::PixelFormat;
use super::TransferError;

/// Minimum number of buffers rotating per output
pub const MIN_POOL_BUFFERS: usize = 2;

/// One CPU-side frame.
#[derive(Debug)]
pub struct FrameBuffer {
    /// Tightly packed pixel rows
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    /// Bytes per row (`width * 4`)
    pub stride_bytes: u32,
    /// Submission order of the frame, starting at 0 per output
    pub sequence: u64,
    generation: u64,
}

impl FrameBuffer {
    fn new(width: u32, height: u32, generation: u64) -> Self {
        let stride_bytes = width * 4;
        Self {
            data: vec![0; stride_bytes as usize * height as usize],
            width,
            height,
            format: PixelFormat::Rgba8,
            stride_bytes,
            sequence: 0,
            generation,
        }
    }

    /// Total bytes of pixel data expected for the frame's dimensions.
    pub fn expected_len(&self) -> usize {
        self.stride_bytes as usize * self.height as usize
    }
}

/// Returns buffers to their pool from any thread.
#[derive(Debug, Clone)]
pub struct StagingRecycler {
    tx: Sender<FrameBuffer>,
}

impl StagingRecycler {
    pub fn recycle(&self, buffer: FrameBuffer) {
        // The pool may already be gone during shutdown
        let _ = self.tx.send(buffer);
    }
}

#[derive(Debug)]
pub struct StagingPool {
    free: Vec<FrameBuffer>,
    return_tx: Sender<FrameBuffer>,
    return_rx: Receiver<FrameBuffer>,
    capacity: usize,
    /// Buffers of the current generation in existence
    allocated: usize,
    generation: u64,
    width: u32,
    height: u32,
}

impl StagingPool {
    pub fn new(capacity: usize) -> Self {
        let (return_tx, return_rx) = crossbeam_channel::unbounded();
        Self {
            free: Vec::new(),
            return_tx,
            return_rx,
            capacity: capacity.max(MIN_POOL_BUFFERS),
            allocated: 0,
            generation: 0,
            width: 0,
            height: 0,
        }
    }

    pub fn recycler(&self) -> StagingRecycler {
        StagingRecycler {
            tx: self.return_tx.clone(),
        }
    }

    /// Take a buffer sized for `width x height`.
    ///
    /// Fails with [`TransferError::PoolExhausted`] when every buffer is in
    /// flight.
    pub fn acquire(&mut self, width: u32, height: u32) -> Result<FrameBuffer, TransferError> {
        if (width, height) != (self.width, self.height) {
            self.free.clear();
            self.allocated = 0;
            self.generation += 1;
            self.width = width;
            self.height = height;
        }

        while let Ok(buffer) = self.return_rx.try_recv() {
            if buffer.generation == self.generation {
                self.free.push(buffer);
            }
        }

        if let Some(mut buffer) = self.free.pop() {
            buffer.format = PixelFormat::Rgba8;
            return Ok(buffer);
        }

        if self.allocated < self.capacity {
            self.allocated += 1;
            tracing::debug!(
                width,
                height,
                allocated = self.allocated,
                "Staging pool: allocated frame buffer"
            );
            return Ok(FrameBuffer::new(width, height, self.generation));
        }

        Err(TransferError::PoolExhausted {
            capacity: self.capacity,
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Buffers of the current size allocated so far.
    pub fn allocated(&self) -> usize {
        self.allocated
    }
}
