//! Per-sink worker thread
//!
//! Frames reach the sink through a bounded FIFO channel, so at most one send
//! is in flight per sink and frames are sent in the order they were
//! submitted. A full queue drops the newest frame instead of blocking the
//! render thread.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use crossbeam_channel::{Sender, TrySendError};

use super::repack::convert_in_place;
use super::sink::FrameSink;
use super::staging::{FrameBuffer, StagingRecycler};
use super::TransferError;

/// Frames that may wait for a busy sink.
pub const DEFAULT_QUEUE_DEPTH: usize = 2;

/// Counters shared between a worker and the render thread.
#[derive(Debug, Default)]
pub struct SinkStats {
    sent: AtomicU64,
    dropped: AtomicU64,
    failed: AtomicU64,
    last_send_us: AtomicU64,
}

impl SinkStats {
    pub fn sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    pub fn last_send_ms(&self) -> f64 {
        self.last_send_us.load(Ordering::Relaxed) as f64 / 1000.0
    }

    pub(crate) fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }
}

pub struct SinkWorker {
    name: String,
    frame_tx: Option<Sender<FrameBuffer>>,
    handle: Option<JoinHandle<()>>,
    stats: Arc<SinkStats>,
    recycler: StagingRecycler,
}

impl SinkWorker {
    /// Start a worker thread that owns `sink` until the worker finishes.
    pub fn spawn(
        mut sink: Box<dyn FrameSink>,
        recycler: StagingRecycler,
        queue_depth: usize,
    ) -> Result<Self, TransferError> {
        let name = sink.name().to_string();
        let stats = Arc::new(SinkStats::default());
        let (frame_tx, frame_rx) = crossbeam_channel::bounded::<FrameBuffer>(queue_depth.max(1));

        let thread_stats = Arc::clone(&stats);
        let thread_recycler = recycler.clone();
        let thread_name = name.clone();

        let handle = thread::Builder::new()
            .name(format!("sink-{}", name))
            .spawn(move || {
                tracing::info!("Sink '{}': worker started", thread_name);

                for mut frame in frame_rx.iter() {
                    if !sink.is_ready() {
                        thread_stats.record_dropped();
                        thread_recycler.recycle(frame);
                        continue;
                    }

                    let format = sink.preferred_format();
                    convert_in_place(&mut frame.data, frame.format, format);
                    frame.format = format;

                    let start = Instant::now();
                    match sink.send(&frame) {
                        Ok(()) => {
                            let count = thread_stats.sent.fetch_add(1, Ordering::Relaxed) + 1;
                            if count == 1 || count % 300 == 0 {
                                tracing::info!(
                                    "Sink '{}': sent {} frames ({}x{})",
                                    thread_name,
                                    count,
                                    frame.width,
                                    frame.height
                                );
                            }
                        }
                        Err(e) => {
                            let failed = thread_stats.failed.fetch_add(1, Ordering::Relaxed) + 1;
                            if failed == 1 || failed % 300 == 0 {
                                tracing::warn!("Sink '{}': failed to send frame: {}", thread_name, e);
                            }
                        }
                    }
                    thread_stats
                        .last_send_us
                        .store(start.elapsed().as_micros() as u64, Ordering::Relaxed);

                    thread_recycler.recycle(frame);
                }

                sink.stop();
                tracing::info!("Sink '{}': worker stopped", thread_name);
            })?;

        Ok(Self {
            name,
            frame_tx: Some(frame_tx),
            handle: Some(handle),
            stats,
            recycler,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stats(&self) -> &Arc<SinkStats> {
        &self.stats
    }

    /// Queue a frame for the sink without blocking.
    ///
    /// When the queue is full the frame goes back to its pool and is counted
    /// as dropped.
    pub fn submit(&self, frame: FrameBuffer) -> Result<(), TransferError> {
        let Some(tx) = &self.frame_tx else {
            self.recycler.recycle(frame);
            return Err(TransferError::WorkerGone(self.name.clone()));
        };

        match tx.try_send(frame) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(frame)) => {
                self.stats.record_dropped();
                self.recycler.recycle(frame);
                tracing::debug!("Sink '{}': frame dropped (sink busy)", self.name);
                Err(TransferError::QueueFull)
            }
            Err(TrySendError::Disconnected(frame)) => {
                self.recycler.recycle(frame);
                Err(TransferError::WorkerGone(self.name.clone()))
            }
        }
    }

    /// Close the queue and wait for queued frames to be sent.
    pub fn finish(mut self) {
        self.frame_tx = None;
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!("Sink '{}': worker panicked", self.name);
            }
        }
    }
}

impl Drop for SinkWorker {
    fn drop(&mut self) {
        self.frame_tx = None;

        // Join in the background so the render thread never blocks on a
        // slow transport
        if let Some(handle) = self.handle.take() {
            std::thread::spawn(move || {
                let _ = handle.join();
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transfer::repack::PixelFormat;
    use crate::transfer::sink::TransportError;
    use crate::transfer::staging::StagingPool;
    use parking_lot::Mutex;
    use rand::Rng;
    use std::time::Duration;

    struct RecordingSink {
        received: Arc<Mutex<Vec<(u64, [u8; 4])>>>,
        format: PixelFormat,
        ready: bool,
        jitter: bool,
    }

    impl FrameSink for RecordingSink {
        fn name(&self) -> &str {
            "recording"
        }

        fn preferred_format(&self) -> PixelFormat {
            self.format
        }

        fn is_ready(&self) -> bool {
            self.ready
        }

        fn send(&mut self, frame: &FrameBuffer) -> Result<(), TransportError> {
            if self.jitter {
                let delay = rand::rng().random_range(0..3);
                std::thread::sleep(Duration::from_millis(delay));
            }
            let first = [frame.data[0], frame.data[1], frame.data[2], frame.data[3]];
            self.received.lock().push((frame.sequence, first));
            Ok(())
        }
    }

    fn recording_sink(format: PixelFormat, ready: bool, jitter: bool) -> (RecordingSink, Arc<Mutex<Vec<(u64, [u8; 4])>>>) {
        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = RecordingSink {
            received: Arc::clone(&received),
            format,
            ready,
            jitter,
        };
        (sink, received)
    }

    #[test]
    fn test_frames_arrive_in_submission_order() {
        let frames = 40;
        let mut pool = StagingPool::new(frames);
        let (sink, received) = recording_sink(PixelFormat::Rgba8, true, true);
        let worker = SinkWorker::spawn(Box::new(sink), pool.recycler(), frames).unwrap();

        for sequence in 0..frames as u64 {
            let mut frame = pool.acquire(2, 2).unwrap();
            frame.sequence = sequence;
            worker.submit(frame).unwrap();
            if sequence % 7 == 0 {
                std::thread::sleep(Duration::from_millis(1));
            }
        }
        let stats = Arc::clone(worker.stats());
        worker.finish();

        let sequences: Vec<u64> = received.lock().iter().map(|(s, _)| *s).collect();
        assert_eq!(sequences, (0..frames as u64).collect::<Vec<_>>());
        assert_eq!(stats.sent(), frames as u64);
        assert_eq!(stats.dropped(), 0);
    }

    #[test]
    fn test_frames_are_repacked_to_preferred_format() {
        let mut pool = StagingPool::new(2);
        let (sink, received) = recording_sink(PixelFormat::Bgra8, true, false);
        let worker = SinkWorker::spawn(Box::new(sink), pool.recycler(), 2).unwrap();

        let mut frame = pool.acquire(1, 1).unwrap();
        frame.data.copy_from_slice(&[10, 20, 30, 255]);
        worker.submit(frame).unwrap();
        worker.finish();

        assert_eq!(received.lock()[0].1, [30, 20, 10, 255]);
    }

    #[test]
    fn test_not_ready_sink_drops_frames() {
        let mut pool = StagingPool::new(2);
        let (sink, received) = recording_sink(PixelFormat::Rgba8, false, false);
        let worker = SinkWorker::spawn(Box::new(sink), pool.recycler(), 2).unwrap();

        worker.submit(pool.acquire(1, 1).unwrap()).unwrap();
        let stats = Arc::clone(worker.stats());
        worker.finish();

        assert!(received.lock().is_empty());
        assert_eq!(stats.dropped(), 1);
        // The buffer came back to the pool
        assert!(pool.acquire(1, 1).is_ok());
        assert!(pool.acquire(1, 1).is_ok());
    }
}
