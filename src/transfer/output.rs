//! Output registry and per-frame transfer driver
//!
//! Every output selects its own projection. Buffer outputs read it back
//! through a [`ReadbackRing`] into pooled frame buffers for their sink
//! worker; texture outputs hand the GPU texture to a [`TextureSharer`].
//! Which path an output takes is fixed when it is registered.

use crate::network::texture_share::TextureSharer;
use crate::projection::{RenderTarget, TargetSource, ViewSelection};
use crate::telemetry::TransferStats;

use super::readback::ReadbackRing;
use super::repack::unpad_rows;
use super::sink::FrameSink;
use super::staging::StagingPool;
use super::worker::{SinkWorker, DEFAULT_QUEUE_DEPTH};
use super::TransferError;

/// Frame buffers per buffer output
const POOL_BUFFERS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OutputId(u64);

/// How an output receives frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputKind {
    /// CPU readback into frame buffers
    Buffer,
    /// Zero-copy GPU texture
    Texture,
}

struct BufferOutput {
    worker: SinkWorker,
    pool: StagingPool,
    ring: Option<ReadbackRing>,
    next_sequence: u64,
}

enum Transport {
    Buffer(BufferOutput),
    Texture(Box<dyn TextureSharer>),
}

struct Output {
    id: OutputId,
    name: String,
    view: ViewSelection,
    enabled: bool,
    transport: Transport,
    /// Frames with no target to read (stage skipped, disabled or not run)
    skipped: u64,
}

impl Output {
    fn kind(&self) -> OutputKind {
        match self.transport {
            Transport::Buffer(_) => OutputKind::Buffer,
            Transport::Texture(_) => OutputKind::Texture,
        }
    }

    fn park(&mut self) {
        if let Transport::Buffer(buffer) = &mut self.transport {
            buffer.discard_ring();
        }
    }
}

impl BufferOutput {
    /// Release the readback ring. Frames still in flight are counted as dropped.
    fn discard_ring(&mut self) {
        if let Some(ring) = self.ring.take() {
            for _ in 0..ring.in_flight() {
                self.worker.stats().record_dropped();
            }
        }
    }
}

/// SELECT: the target an output with `view` reads this frame.
///
/// Preview-only views never reach the source.
fn select_target(source: &dyn TargetSource, view: ViewSelection) -> Option<&RenderTarget> {
    if !view.is_transferable() {
        return None;
    }
    source.target(view)
}

fn check_transferable(view: ViewSelection) -> Result<(), TransferError> {
    if view.is_transferable() {
        Ok(())
    } else {
        Err(TransferError::ViewNotTransferable(view))
    }
}

#[derive(Default)]
pub struct OutputManager {
    outputs: Vec<Output>,
    next_id: u64,
    paused: bool,
}

impl OutputManager {
    pub fn new() -> Self {
        Self::default()
    }

    // ─── Registration ────────────────────────────────────────────────

    /// Register a readback output. Its sink moves onto a worker thread.
    pub fn add_sink(&mut self, view: ViewSelection, sink: Box<dyn FrameSink>) -> Result<OutputId, TransferError> {
        check_transferable(view)?;
        let name = sink.name().to_string();
        let pool = StagingPool::new(POOL_BUFFERS);
        let worker = SinkWorker::spawn(sink, pool.recycler(), DEFAULT_QUEUE_DEPTH)?;

        let transport = Transport::Buffer(BufferOutput {
            worker,
            pool,
            ring: None,
            next_sequence: 0,
        });
        Ok(self.register(name, view, transport))
    }

    /// Register a zero-copy texture output.
    pub fn add_texture_sharer(
        &mut self,
        view: ViewSelection,
        sharer: Box<dyn TextureSharer>,
    ) -> Result<OutputId, TransferError> {
        check_transferable(view)?;
        let name = sharer.name().to_string();
        Ok(self.register(name, view, Transport::Texture(sharer)))
    }

    fn register(&mut self, name: String, view: ViewSelection, transport: Transport) -> OutputId {
        let id = OutputId(self.next_id);
        self.next_id += 1;
        tracing::info!(output = %name, view = view.display_name(), "Output registered");
        self.outputs.push(Output {
            id,
            name,
            view,
            enabled: true,
            transport,
            skipped: 0,
        });
        id
    }

    /// Remove an output. Its worker finishes in the background.
    pub fn remove(&mut self, id: OutputId) -> bool {
        let Some(index) = self.outputs.iter().position(|o| o.id == id) else {
            return false;
        };
        let mut output = self.outputs.remove(index);
        if let Transport::Texture(sharer) = &mut output.transport {
            sharer.stop();
        }
        tracing::info!(output = %output.name, "Output removed");
        true
    }

    // ─── Control ─────────────────────────────────────────────────────

    /// Change the projection an output receives. Returns `Ok(false)` for an
    /// unknown output.
    pub fn set_view(&mut self, id: OutputId, view: ViewSelection) -> Result<bool, TransferError> {
        check_transferable(view)?;
        Ok(match self.output_mut(id) {
            Some(output) => {
                output.view = view;
                true
            }
            None => false,
        })
    }

    /// Enable or disable an output. A disabled output releases its readback
    /// buffers and receives nothing.
    pub fn set_enabled(&mut self, id: OutputId, enabled: bool) -> bool {
        match self.output_mut(id) {
            Some(output) => {
                output.enabled = enabled;
                if !enabled {
                    output.park();
                }
                true
            }
            None => false,
        }
    }

    /// Stop delivering to every output, keeping their configuration.
    pub fn pause(&mut self) {
        self.paused = true;
        for output in &mut self.outputs {
            output.park();
        }
        tracing::info!("Outputs paused");
    }

    /// Resume delivery to the outputs that are enabled.
    pub fn resume(&mut self) {
        self.paused = false;
        tracing::info!("Outputs resumed");
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn is_enabled(&self, id: OutputId) -> bool {
        self.outputs.iter().any(|o| o.id == id && o.enabled)
    }

    pub fn kind(&self, id: OutputId) -> Option<OutputKind> {
        self.outputs.iter().find(|o| o.id == id).map(Output::kind)
    }

    pub fn len(&self) -> usize {
        self.outputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }

    fn output_mut(&mut self, id: OutputId) -> Option<&mut Output> {
        self.outputs.iter_mut().find(|o| o.id == id)
    }

    fn active(&self) -> impl Iterator<Item = &Output> {
        let paused = self.paused;
        self.outputs.iter().filter(move |o| o.enabled && !paused)
    }

    /// Projections the active outputs read this frame.
    pub fn needed_views(&self) -> Vec<ViewSelection> {
        let mut views: Vec<ViewSelection> = Vec::new();
        for output in self.active() {
            if !views.contains(&output.view) {
                views.push(output.view);
            }
        }
        views
    }

    // ─── Per-frame transfer ──────────────────────────────────────────

    /// SELECT and READBACK: record copies of each active output's projection.
    ///
    /// Call after the projections were encoded, before submitting `encoder`.
    pub fn capture(&mut self, device: &wgpu::Device, encoder: &mut wgpu::CommandEncoder, source: &dyn TargetSource) {
        if self.paused {
            return;
        }

        for output in self.outputs.iter_mut().filter(|o| o.enabled) {
            let Some(target) = select_target(source, output.view) else {
                output.skipped += 1;
                continue;
            };
            let (width, height) = target.size();

            match &mut output.transport {
                Transport::Buffer(buffer) => {
                    let stale = buffer.ring.as_ref().is_some_and(|r| !r.matches(width, height));
                    if stale {
                        tracing::info!(output = %output.name, width, height, "Readback ring resized");
                        buffer.discard_ring();
                    }
                    let ring = buffer
                        .ring
                        .get_or_insert_with(|| ReadbackRing::new(device, &output.name, width, height));
                    if ring.capture(encoder, target.texture()).is_err() {
                        buffer.worker.stats().record_dropped();
                    }
                }
                Transport::Texture(sharer) => {
                    if let Err(e) = sharer.publish_texture(device, encoder, target.texture(), width, height) {
                        tracing::debug!(output = %output.name, "Texture publish failed: {}", e);
                    }
                }
            }
        }
    }

    /// COPY and HANDOFF: move finished readbacks into frame buffers and
    /// queue them on each sink's worker.
    ///
    /// Call after submitting the encoder passed to [`OutputManager::capture`].
    pub fn process(&mut self, device: &wgpu::Device) {
        for output in &mut self.outputs {
            let Transport::Buffer(buffer) = &mut output.transport else {
                continue;
            };
            let BufferOutput {
                worker,
                pool,
                ring,
                next_sequence,
            } = buffer;
            let Some(ring) = ring.as_mut() else {
                continue;
            };

            let summary = ring.process(device, |frame| {
                let layout = frame.layout;
                let mut staging = match pool.acquire(layout.width, layout.height) {
                    Ok(staging) => staging,
                    Err(e) => {
                        tracing::debug!(output = %output.name, "Frame dropped: {}", e);
                        worker.stats().record_dropped();
                        return;
                    }
                };

                if let Err(e) = unpad_rows(
                    frame.data,
                    layout.padded_bytes_per_row as usize,
                    layout.unpadded_bytes_per_row as usize,
                    layout.height as usize,
                    &mut staging.data,
                ) {
                    tracing::warn!(output = %output.name, "Frame dropped: {}", e);
                    worker.stats().record_dropped();
                    pool.recycler().recycle(staging);
                    return;
                }

                staging.sequence = *next_sequence;
                *next_sequence += 1;
                // Full queues are counted by the worker
                let _ = worker.submit(staging);
            });

            for _ in 0..summary.dropped {
                worker.stats().record_dropped();
            }
        }
    }

    // ─── Statistics and shutdown ─────────────────────────────────────

    pub fn stats(&self) -> Vec<TransferStats> {
        self.outputs
            .iter()
            .map(|output| {
                let (frames_sent, frames_dropped, frames_failed, last_send_ms) = match &output.transport {
                    Transport::Buffer(buffer) => {
                        let stats = buffer.worker.stats();
                        (stats.sent(), stats.dropped(), stats.failed(), stats.last_send_ms())
                    }
                    Transport::Texture(sharer) => (sharer.frames_published(), 0, 0, 0.0),
                };
                TransferStats {
                    name: output.name.clone(),
                    view: output.view,
                    enabled: output.enabled,
                    frames_sent,
                    frames_dropped: frames_dropped + output.skipped,
                    frames_failed,
                    last_send_ms,
                }
            })
            .collect()
    }

    /// Stop every output, waiting for queued frames to be sent.
    pub fn shutdown(&mut self) {
        for output in self.outputs.drain(..) {
            match output.transport {
                Transport::Buffer(mut buffer) => {
                    buffer.discard_ring();
                    buffer.worker.finish();
                }
                Transport::Texture(mut sharer) => sharer.stop(),
            }
        }
        tracing::info!("Outputs shut down");
    }
}

impl Drop for OutputManager {
    fn drop(&mut self) {
        for output in &mut self.outputs {
            if let Transport::Texture(sharer) = &mut output.transport {
                sharer.stop();
            }
        }
    }
}
