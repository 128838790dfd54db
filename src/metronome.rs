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

//! The engine context and its control surface.
//!
//! A [`Metronome`] owns the sample bank, the current pattern and tempo, and
//! the render thread. All control methods take `&self` and may be called from
//! any thread.

use std::{
    io,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
};

use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::audio::thread_priority::{configure_render_thread_priority, RenderPriority};
use crate::audio::{AudioError, OutputBackend};
use crate::bank::SampleBank;
use crate::events::{EventSink, NullSink};
use crate::pattern::{CompiledPattern, Step};
use crate::render::{self, RenderState};

pub const DEFAULT_SAMPLE_RATE: u32 = 48000;
pub const DEFAULT_BLOCK_SIZE: usize = 1024;
pub const DEFAULT_TEMPO: f64 = 120.0;

const RENDER_THREAD_NAME: &str = "pulso-render";

/// Errors from the control surface.
#[derive(Debug, thiserror::Error)]
pub enum ControlError {
    #[error("cannot reconfigure while playing")]
    Running,
    #[error("unable to spawn render thread: {0}")]
    Spawn(#[from] io::Error),
}

/// Settings only control threads touch. Recompiles happen under this lock so
/// the last change always wins.
struct Settings {
    sample_rate: u32,
    block_size: usize,
    steps: Vec<Step>,
}

/// A spawned render thread and the flag that stops it.
struct RenderThread {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<Result<(), AudioError>>,
}

pub struct Metronome {
    bank: Arc<SampleBank>,
    backend: Arc<dyn OutputBackend>,
    events: Arc<dyn EventSink>,
    priority: RenderPriority,
    state: Arc<RenderState>,
    /// Tempo in bpm, as f64 bits.
    tempo: AtomicU64,
    settings: Mutex<Settings>,
    thread: Mutex<Option<RenderThread>>,
}

impl Metronome {
    /// Creates an idle metronome with an empty pattern at the default tempo,
    /// sample rate and block size.
    pub fn new(bank: Arc<SampleBank>, backend: Arc<dyn OutputBackend>) -> Metronome {
        Metronome {
            bank,
            backend,
            events: Arc::new(NullSink),
            priority: RenderPriority::resolve(None, None),
            state: Arc::new(RenderState::new(
                CompiledPattern::empty(DEFAULT_SAMPLE_RATE),
                1.0,
            )),
            tempo: AtomicU64::new(DEFAULT_TEMPO.to_bits()),
            settings: Mutex::new(Settings {
                sample_rate: DEFAULT_SAMPLE_RATE,
                block_size: DEFAULT_BLOCK_SIZE,
                steps: Vec::new(),
            }),
            thread: Mutex::new(None),
        }
    }

    /// Sends onset and transport notifications to `events`.
    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Metronome {
        self.events = events;
        self
    }

    pub fn with_priority(mut self, priority: RenderPriority) -> Metronome {
        self.priority = priority;
        self
    }

    /// Sets the output sample rate and the preferred block size. A zero
    /// value keeps the current setting. Not allowed during playback.
    pub fn configure(&self, sample_rate: u32, block_size_hint: usize) -> Result<(), ControlError> {
        let mut settings = self.settings.lock();
        if self.state.is_running() {
            return Err(ControlError::Running);
        }

        if sample_rate == 0 {
            warn!(
                sample_rate = settings.sample_rate,
                "Ignoring sample rate of 0, keeping the current one"
            );
        } else {
            settings.sample_rate = sample_rate;
        }

        if block_size_hint == 0 {
            warn!(
                block_size = settings.block_size,
                "Ignoring block size of 0, keeping the current one"
            );
        } else {
            settings.block_size = block_size_hint;
        }

        info!(
            sample_rate = settings.sample_rate,
            block_size = settings.block_size,
            "Configured"
        );
        self.recompile(&settings);
        Ok(())
    }

    /// Sets the tempo in beats per minute and restarts the cycle.
    pub fn set_tempo(&self, bpm: f64) {
        let settings = self.settings.lock();
        self.tempo.store(bpm.to_bits(), Ordering::Relaxed);
        self.recompile(&settings);
    }

    /// Replaces the pattern and restarts the cycle.
    pub fn set_pattern(&self, steps: Vec<Step>) {
        let mut settings = self.settings.lock();
        settings.steps = steps;
        self.recompile(&settings);
    }

    /// Sets the master gain, clamped to [0, 1]. Applies to onsets realized
    /// from the next block on.
    pub fn set_volume(&self, volume: f32) {
        self.state.set_volume(volume);
    }

    fn recompile(&self, settings: &Settings) {
        let pattern = CompiledPattern::compile(self.tempo(), &settings.steps, settings.sample_rate);
        self.state.publish(pattern);
    }

    /// Starts the render thread. Does nothing if already playing.
    pub fn start(&self) -> Result<(), ControlError> {
        // The running flag is only raised with this lock held.
        let mut thread = self.thread.lock();
        let alive = thread
            .as_ref()
            .is_some_and(|running| !running.handle.is_finished());
        if alive && self.state.is_running() {
            debug!("Already playing");
            return Ok(());
        }

        // A previous run that ended on its own (sink failure, panic) is still
        // waiting to be joined.
        if let Some(stale) = thread.take() {
            match stale.handle.join() {
                Ok(Err(e)) => warn!(error = %e, "Previous playback ended with an error"),
                Err(_) => {
                    self.state.set_running(false);
                    warn!("Previous render thread panicked");
                }
                Ok(Ok(())) => {}
            }
        }

        let (sample_rate, block_size) = {
            let settings = self.settings.lock();
            (settings.sample_rate, settings.block_size)
        };

        let stop = Arc::new(AtomicBool::new(false));
        let state = self.state.clone();
        let bank = self.bank.clone();
        let backend = self.backend.clone();
        let events = self.events.clone();
        let priority = self.priority;

        self.state.set_running(true);
        let spawned = {
            let stop = stop.clone();
            thread::Builder::new()
                .name(RENDER_THREAD_NAME.to_string())
                .spawn(move || {
                    configure_render_thread_priority(priority);
                    let result = render::run(
                        &state,
                        &stop,
                        bank,
                        backend.as_ref(),
                        sample_rate,
                        block_size,
                        events.as_ref(),
                    );
                    if let Err(e) = &result {
                        error!(error = %e, "Playback stopped");
                    }
                    state.set_running(false);
                    events.transport(false);
                    result
                })
        };

        match spawned {
            Ok(handle) => {
                info!(device = %self.backend, tempo = self.tempo(), "Playback started");
                *thread = Some(RenderThread { stop, handle });
                Ok(())
            }
            Err(e) => {
                self.state.set_running(false);
                Err(ControlError::Spawn(e))
            }
        }
    }

    /// Stops playback and waits for the render thread to exit. Returns the
    /// error that ended playback, if any. Does nothing when idle.
    pub fn stop(&self) -> Result<(), AudioError> {
        let mut thread = self.thread.lock();
        let Some(running) = thread.take() else {
            return Ok(());
        };

        running.stop.store(true, Ordering::Release);
        match running.handle.join() {
            Ok(result) => {
                info!(position = self.position_samples(), "Playback stopped");
                result
            }
            Err(_) => {
                self.state.set_running(false);
                Err(AudioError::Playback(String::from(
                    "render thread panicked",
                )))
            }
        }
    }

    pub fn tempo(&self) -> f64 {
        f64::from_bits(self.tempo.load(Ordering::Relaxed))
    }

    pub fn volume(&self) -> f32 {
        self.state.volume()
    }

    pub fn is_running(&self) -> bool {
        self.state.is_running()
    }

    /// Samples rendered since playback (or the current pattern) started.
    pub fn position_samples(&self) -> u64 {
        self.state.cursor()
    }

    /// The current compiled pattern.
    pub fn pattern(&self) -> Arc<CompiledPattern> {
        self.state.pattern()
    }

    pub fn sample_rate(&self) -> u32 {
        self.settings.lock().sample_rate
    }

    pub fn block_size(&self) -> usize {
        self.settings.lock().block_size
    }

    pub fn steps(&self) -> Vec<Step> {
        self.settings.lock().steps.clone()
    }
}

impl Drop for Metronome {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            warn!(error = %e, "Playback ended with an error");
        }
    }
}
