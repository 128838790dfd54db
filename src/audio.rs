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
use std::{fmt, sync::Arc};

use crate::config;

pub mod cpal;
pub mod mock;
pub mod thread_priority;

/// Errors raised by output sinks.
#[derive(Debug, thiserror::Error)]
pub enum AudioError {
    #[error("no default output device available")]
    NoDevice,
    #[error("no output device found with name {0}")]
    DeviceNotFound(String),
    #[error("unable to initialize output device: {0}")]
    DeviceInit(String),
    #[error("unsupported output sample format {0}")]
    UnsupportedFormat(String),
    #[error("unable to create output stream: {0}")]
    StreamCreate(String),
    #[error("playback error: {0}")]
    Playback(String),
    #[error("output stream disconnected")]
    Disconnected,
    #[error("output stream error: {0}")]
    Stream(String),
}

/// An open audio output. Lives on the render thread.
pub trait OutputSink {
    /// Smallest block, in frames, the sink can be fed without underrunning.
    /// 0 when the sink has no preference.
    fn min_buffer_frames(&self) -> usize;

    /// Starts consuming audio.
    fn start(&mut self) -> Result<(), AudioError>;

    /// Writes interleaved stereo samples, blocking until the sink has room.
    fn write(&mut self, samples: &[f32]) -> Result<(), AudioError>;

    /// Stops consuming audio. The sink may be started again.
    fn stop(&mut self) -> Result<(), AudioError>;

    /// Frees the underlying device resources. Nothing may be called afterwards.
    fn release(&mut self);
}

/// Opens output sinks. Sinks are opened on the render thread, so the backend
/// is the part that crosses threads.
pub trait OutputBackend: fmt::Display + Send + Sync {
    /// Opens a stereo sink at the given rate. `block_hint` is the block size
    /// the render loop would like to use, in frames.
    fn open(&self, sample_rate: u32, block_hint: usize) -> Result<Box<dyn OutputSink>, AudioError>;
}

/// Picks the backend named by the configuration. Device names starting with
/// `mock` get a mock backend.
pub fn get_backend(config: &config::Audio) -> Result<Arc<dyn OutputBackend>, AudioError> {
    let device = config.device();
    if device.starts_with("mock") {
        return Ok(Arc::new(mock::MockBackend::for_session(device)));
    }

    Ok(Arc::new(cpal::CpalBackend::new(device)))
}

/// Lists output devices known to cpal.
pub fn list_devices() -> Result<Vec<cpal::DeviceInfo>, AudioError> {
    cpal::list_devices()
}
