// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! The render loop: drives the voice engine against an output sink.
//!
//! Everything the loop reads per block lives in [`RenderState`] and is read
//! without locks. The compiled pattern is published as a whole through an
//! [`ArcSwap`], so the loop always sees one consistent timeline.

use std::sync::{
    atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering},
    Arc,
};

use arc_swap::{ArcSwap, Guard};
use tracing::{info, warn};

use crate::audio::{AudioError, OutputBackend, OutputSink};
use crate::bank::SampleBank;
use crate::engine::{clamp_gain, StereoBlock, VoiceEngine};
use crate::events::EventSink;
use crate::pattern::CompiledPattern;

/// State shared between control threads and the render thread.
pub struct RenderState {
    pattern: ArcSwap<CompiledPattern>,
    /// Master gain, as f32 bits.
    volume: AtomicU32,
    /// Set while a render thread owns playback.
    running: AtomicBool,
    /// Sample position reached by the last written block.
    cursor: AtomicU64,
}

impl RenderState {
    pub fn new(pattern: CompiledPattern, volume: f32) -> RenderState {
        RenderState {
            pattern: ArcSwap::from_pointee(pattern),
            volume: AtomicU32::new(clamp_gain(volume).to_bits()),
            running: AtomicBool::new(false),
            cursor: AtomicU64::new(0),
        }
    }

    /// Replaces the timeline. The render thread picks it up at its next block.
    pub fn publish(&self, pattern: CompiledPattern) {
        self.pattern.store(Arc::new(pattern));
    }

    pub fn pattern(&self) -> Arc<CompiledPattern> {
        self.pattern.load_full()
    }

    /// Sets the master gain, clamped to [0, 1].
    pub fn set_volume(&self, volume: f32) {
        self.volume
            .store(clamp_gain(volume).to_bits(), Ordering::Relaxed);
    }

    pub fn volume(&self) -> f32 {
        f32::from_bits(self.volume.load(Ordering::Relaxed))
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub(crate) fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::Release);
    }

    pub fn cursor(&self) -> u64 {
        self.cursor.load(Ordering::Acquire)
    }
}

/// Stops and releases the sink however the loop exits.
struct SinkGuard(Box<dyn OutputSink>);

impl Drop for SinkGuard {
    fn drop(&mut self) {
        if let Err(e) = self.0.stop() {
            warn!(error = %e, "Error while stopping output");
        }
        self.0.release();
    }
}

/// Block size for a sink: the configured hint, raised to the sink's minimum.
pub fn block_frames(hint: usize, sink_min: usize) -> usize {
    hint.max(1).max(sink_min)
}

/// Runs the render loop on the calling thread until `stop` is set or the sink
/// fails. Each run gets its own `stop` flag.
pub fn run(
    state: &RenderState,
    stop: &AtomicBool,
    bank: Arc<SampleBank>,
    backend: &dyn OutputBackend,
    sample_rate: u32,
    block_hint: usize,
    events: &dyn EventSink,
) -> Result<(), AudioError> {
    let mut sink = SinkGuard(backend.open(sample_rate, block_hint)?);
    let frames = block_frames(block_hint, sink.0.min_buffer_frames());

    let mut engine = VoiceEngine::new(bank, state.pattern(), sample_rate);
    engine.set_master_gain(state.volume());
    state.cursor.store(0, Ordering::Release);

    let mut block = StereoBlock::new(frames);
    let mut interleaved = Vec::with_capacity(frames * 2);

    sink.0.start()?;
    info!(device = %backend, sample_rate, frames, "Render loop started");
    events.transport(true);

    while !stop.load(Ordering::Acquire) {
        let current = state.pattern.load();
        if !Arc::ptr_eq(&*current, engine.pattern()) {
            engine.load_pattern(Guard::into_inner(current));
        }
        engine.set_master_gain(state.volume());

        engine.render_block(&mut block, events);
        block.interleave_into(&mut interleaved);
        sink.0.write(&interleaved)?;

        state.cursor.store(engine.cursor(), Ordering::Release);
    }

    info!(position = engine.cursor(), "Render loop stopped");
    Ok(())
}

/// Renders `frames` frames without an output device, returning interleaved
/// stereo. Uses the same engine and block cadence as live playback.
pub fn render_offline(
    pattern: Arc<CompiledPattern>,
    bank: Arc<SampleBank>,
    sample_rate: u32,
    volume: f32,
    frames: usize,
    block_frames: usize,
    events: &dyn EventSink,
) -> Vec<f32> {
    let block_frames = block_frames.max(1);
    let mut engine = VoiceEngine::new(bank, pattern, sample_rate);
    engine.set_master_gain(volume);

    let mut out = Vec::with_capacity(frames * 2);
    let mut block = StereoBlock::new(block_frames);
    let mut interleaved = Vec::with_capacity(block_frames * 2);

    let mut remaining = frames;
    while remaining > 0 {
        let n = remaining.min(block_frames);
        block.clear(n);
        engine.render_block(&mut block, events);
        block.interleave_into(&mut interleaved);
        out.extend_from_slice(&interleaved);
        remaining -= n;
    }
    out
}
