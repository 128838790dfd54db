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

//! Compiles a tempo and a list of steps into a cyclic onset timeline.

use serde::Deserialize;
use tracing::debug;

use crate::bank::Role;

/// What a step plays.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub enum StepRole {
    /// Takes time, makes no sound.
    Silence,
    /// Triggers the given role.
    Sound(Role),
}

impl StepRole {
    /// Parses a step role name. `silence` (or `rest`) is silent, everything
    /// else resolves to a sounding role.
    pub fn parse(name: &str) -> StepRole {
        match name.trim().to_ascii_lowercase().as_str() {
            "silence" | "rest" => StepRole::Silence,
            other => StepRole::Sound(Role::resolve(other)),
        }
    }
}

impl Default for StepRole {
    fn default() -> Self {
        StepRole::Sound(Role::FILLER)
    }
}

impl From<String> for StepRole {
    fn from(name: String) -> Self {
        StepRole::parse(&name)
    }
}

impl From<Role> for StepRole {
    fn from(role: Role) -> Self {
        StepRole::Sound(role)
    }
}

/// One entry of an input pattern.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct Step {
    /// Duration in eighth notes.
    #[serde(alias = "durEighths", alias = "dureighths")]
    pub dur_eighths: f64,
    #[serde(default)]
    pub role: StepRole,
    /// Stereo position, -1 (left) to 1 (right).
    #[serde(default)]
    pub pan: f32,
    /// Reporting only.
    #[serde(default, alias = "sectionIdx", alias = "sectionidx")]
    pub section: i32,
    /// Reporting only.
    #[serde(default)]
    pub k: i32,
}

impl Step {
    /// Creates a centered step with zeroed reporting identifiers.
    pub fn new(dur_eighths: f64, role: impl Into<StepRole>) -> Step {
        Step {
            dur_eighths,
            role: role.into(),
            pan: 0.0,
            section: 0,
            k: 0,
        }
    }

    /// A silent step.
    pub fn rest(dur_eighths: f64) -> Step {
        Step::new(dur_eighths, StepRole::Silence)
    }

    pub fn with_pan(mut self, pan: f32) -> Step {
        self.pan = pan;
        self
    }

    pub fn with_ids(mut self, section: i32, k: i32) -> Step {
        self.section = section;
        self.k = k;
        self
    }
}

/// A scheduled sound inside one cycle.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Onset {
    /// Sample offset within the cycle, always below the cycle length.
    pub when: u64,
    pub role: Role,
    pub pan: f32,
    pub section: i32,
    pub k: i32,
}

/// An immutable compiled pattern. Published to the render thread as a whole.
#[derive(Clone, Debug, PartialEq)]
pub struct CompiledPattern {
    onsets: Vec<Onset>,
    cycle_length: u64,
    eighth_samples: u64,
    sample_rate: u32,
    tempo: f64,
}

impl CompiledPattern {
    /// Compiles the steps at the given tempo and sample rate.
    ///
    /// Degenerate input never fails: a non-positive or non-finite tempo gives
    /// a one-sample eighth note, every step lasts at least one sample and an
    /// empty pattern is a silent one-sample cycle.
    pub fn compile(tempo: f64, steps: &[Step], sample_rate: u32) -> CompiledPattern {
        let eighth_samples = eighth_note_samples(tempo, sample_rate);

        let mut onsets = Vec::with_capacity(steps.len());
        let mut position: u64 = 0;
        for step in steps {
            let duration = step_samples(step.dur_eighths, eighth_samples);
            if let StepRole::Sound(role) = step.role {
                onsets.push(Onset {
                    when: position,
                    role,
                    pan: step.pan,
                    section: step.section,
                    k: step.k,
                });
            }
            position = position.saturating_add(duration);
        }

        // Positions only grow, but keep the ordering explicit. The sort is
        // stable so equal offsets stay in input order.
        onsets.sort_by_key(|onset| onset.when);

        let cycle_length = position.max(1);
        debug!(
            tempo,
            sample_rate,
            eighth_samples,
            cycle_length,
            onsets = onsets.len(),
            "Compiled pattern"
        );

        CompiledPattern {
            onsets,
            cycle_length,
            eighth_samples,
            sample_rate,
            tempo,
        }
    }

    /// A pattern with no onsets.
    pub fn empty(sample_rate: u32) -> CompiledPattern {
        CompiledPattern::compile(0.0, &[], sample_rate)
    }

    pub fn onsets(&self) -> &[Onset] {
        &self.onsets
    }

    /// Cycle length in samples, at least 1.
    pub fn cycle_length(&self) -> u64 {
        self.cycle_length
    }

    pub fn eighth_samples(&self) -> u64 {
        self.eighth_samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn tempo(&self) -> f64 {
        self.tempo
    }

    /// Converts a cycle offset into milliseconds.
    pub fn time_ms(&self, when: u64) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        (when % self.cycle_length) as f64 * 1000.0 / self.sample_rate as f64
    }
}

/// `round(0.5 * 60 / bpm * sample_rate)`, at least 1.
pub fn eighth_note_samples(tempo: f64, sample_rate: u32) -> u64 {
    let samples = (0.5 * 60.0 / tempo * sample_rate as f64).round();
    if samples.is_finite() && samples >= 1.0 {
        samples as u64
    } else {
        1
    }
}

fn step_samples(dur_eighths: f64, eighth_samples: u64) -> u64 {
    let samples = (dur_eighths * eighth_samples as f64).round();
    if samples.is_finite() && samples >= 1.0 {
        samples as u64
    } else {
        1
    }
}
