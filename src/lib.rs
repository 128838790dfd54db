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

//! A sample-accurate rhythmic pattern player.
//!
//! A pattern of steps is compiled into a cyclic onset timeline, and a
//! dedicated render thread turns that timeline into stereo audio block by
//! block, reporting each onset as it is realized.

pub mod audio;
pub mod bank;
pub mod config;
pub mod engine;
pub mod events;
pub mod metronome;
pub mod pattern;
pub mod pcm;
pub mod render;
#[cfg(test)]
mod testutil;

pub use bank::{AssetSource, DirectoryAssets, Role, SampleBank};
pub use events::{ChannelSink, EventSink, Notification, NullSink, OnsetEvent};
pub use metronome::{ControlError, Metronome};
pub use pattern::{CompiledPattern, Onset, Step, StepRole};
