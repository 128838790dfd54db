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

//! The voice engine: turns the compiled timeline into mixed stereo blocks.
//!
//! Each call to [`VoiceEngine::render_block`] covers the sample range
//! `[cursor, cursor + frames)`. Onsets whose next occurrence falls in that
//! range become voices, and every live voice (including ones started in an
//! earlier block) is mixed additively into the block.

pub mod block;
pub mod voice;

use std::sync::Arc;

use tracing::debug;

use crate::bank::SampleBank;
use crate::events::{EventSink, OnsetEvent};
use crate::pattern::CompiledPattern;

pub use block::StereoBlock;
pub use voice::Voice;

/// Voice storage reserved up front so spawning rarely allocates.
const INITIAL_VOICE_CAPACITY: usize = 64;

pub struct VoiceEngine {
    sample_rate: u32,
    bank: Arc<SampleBank>,
    pattern: Arc<CompiledPattern>,
    /// Absolute sample position of the next block.
    cursor: u64,
    /// Index of the next onset not yet realized.
    next_onset: usize,
    master_gain: f32,
    voices: Vec<Voice>,
}

impl VoiceEngine {
    pub fn new(bank: Arc<SampleBank>, pattern: Arc<CompiledPattern>, sample_rate: u32) -> Self {
        VoiceEngine {
            sample_rate,
            bank,
            pattern,
            cursor: 0,
            next_onset: 0,
            master_gain: 1.0,
            voices: Vec::with_capacity(INITIAL_VOICE_CAPACITY),
        }
    }

    /// Switches to a new timeline, restarting the cycle from its beginning.
    /// Voices already sounding are left to ring out.
    pub fn load_pattern(&mut self, pattern: Arc<CompiledPattern>) {
        debug!(
            cycle_length = pattern.cycle_length(),
            onsets = pattern.onsets().len(),
            ringing = self.voices.len(),
            "Loading pattern"
        );
        self.pattern = pattern;
        self.cursor = 0;
        self.next_onset = 0;
    }

    /// Sets the gain applied to voices spawned from now on. Clamped to [0, 1].
    pub fn set_master_gain(&mut self, gain: f32) {
        self.master_gain = clamp_gain(gain);
    }

    pub fn master_gain(&self) -> f32 {
        self.master_gain
    }

    pub fn pattern(&self) -> &Arc<CompiledPattern> {
        &self.pattern
    }

    /// Absolute sample position of the next block.
    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    pub fn active_voices(&self) -> usize {
        self.voices.len()
    }

    /// Renders `block.len()` frames into `block`, realizing every onset that
    /// falls inside it and reporting each one to `events`.
    pub fn render_block(&mut self, block: &mut StereoBlock, events: &dyn EventSink) {
        let frames = block.len();
        block.clear(frames);
        if frames == 0 {
            return;
        }

        self.spawn_onsets(frames as u64, events);

        let bank = &self.bank;
        self.voices
            .retain_mut(|voice| voice.mix_into(bank.pcm(voice.role()), block));

        self.cursor = self.cursor.saturating_add(frames as u64);
    }

    fn spawn_onsets(&mut self, frames: u64, events: &dyn EventSink) {
        let pattern = Arc::clone(&self.pattern);
        let onsets = pattern.onsets();
        if onsets.is_empty() {
            return;
        }
        if self.next_onset >= onsets.len() {
            self.next_onset = 0;
        }

        let cycle = pattern.cycle_length();
        let start = self.cursor;
        let end = start.saturating_add(frames);

        // Earliest time the next candidate may be realized at. Moves past each
        // realized onset so a wrapped index looks at the following cycle
        // instead of finding the same occurrence again.
        let mut floor = start;
        loop {
            let onset = &onsets[self.next_onset];
            let at = next_occurrence(onset.when, cycle, floor);
            if at >= end {
                break;
            }

            let offset = (at - start) as usize;
            let role = onset.role;
            if let Some(voice) = Voice::new(
                role,
                onset.pan,
                self.bank.pcm(role).len(),
                self.sample_rate,
                self.bank.base_gain(role) * self.master_gain,
                offset,
            ) {
                self.voices.push(voice);
            }

            events.onset(OnsetEvent {
                bar: 0,
                section: onset.section,
                k: onset.k,
                time_ms: pattern.time_ms(onset.when),
            });

            self.next_onset += 1;
            if self.next_onset == onsets.len() {
                self.next_onset = 0;
                // The next candidate belongs to the cycle after this one.
                floor = at - onset.when + cycle;
            } else {
                floor = at;
            }
        }
    }
}

/// First time `>= floor` at which an onset at cycle offset `when` recurs.
fn next_occurrence(when: u64, cycle: u64, floor: u64) -> u64 {
    let base = floor / cycle * cycle;
    let mut at = base.saturating_add(when);
    while at < floor {
        at = at.saturating_add(cycle);
    }
    at
}

/// Clamps a gain into [0, 1], mapping NaN to silence.
pub fn clamp_gain(gain: f32) -> f32 {
    if gain.is_nan() {
        0.0
    } else {
        gain.clamp(0.0, 1.0)
    }
}
