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
use serde::Deserialize;

use crate::audio::thread_priority::RenderPriority;
use crate::metronome::{DEFAULT_BLOCK_SIZE, DEFAULT_SAMPLE_RATE};

const DEFAULT_DEVICE: &str = "default";

/// A YAML representation of the audio configuration.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct Audio {
    /// The output device. "default" for the host default, "mock..." for a mock.
    device: Option<String>,

    /// Output sample rate in Hz (default: 48000).
    sample_rate: Option<u32>,

    /// Minimum render block in frames (default: 1024). The sink may raise it.
    block_size: Option<usize>,

    /// Render thread priority, 0-99. Falls back to PULSO_THREAD_PRIORITY.
    thread_priority: Option<u8>,

    /// Request SCHED_FIFO on unix. Falls back to !PULSO_DISABLE_RT_AUDIO.
    realtime: Option<bool>,
}

impl Audio {
    /// New will create a new Audio configuration.
    pub fn new(device: &str) -> Audio {
        Audio {
            device: Some(device.to_string()),
            ..Default::default()
        }
    }

    /// Returns the device from the configuration.
    pub fn device(&self) -> &str {
        self.device.as_deref().unwrap_or(DEFAULT_DEVICE)
    }

    /// Returns the sample rate (default: 48000).
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate.unwrap_or(DEFAULT_SAMPLE_RATE)
    }

    /// Returns the block size (default: 1024).
    pub fn block_size(&self) -> usize {
        self.block_size.unwrap_or(DEFAULT_BLOCK_SIZE)
    }

    /// Returns the render thread scheduling settings.
    pub fn render_priority(&self) -> RenderPriority {
        RenderPriority::resolve(self.thread_priority, self.realtime)
    }
}
