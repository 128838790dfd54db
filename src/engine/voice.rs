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

//! A single sounding onset.

use std::f64::consts::FRAC_PI_4;

use crate::bank::Role;

use super::block::StereoBlock;

/// Longest a voice may play, in seconds.
const MAX_VOICE_SECONDS: f64 = 0.100;

/// Fade bounds, in samples.
const MIN_FADE: usize = 8;
const MAX_FADE: usize = 32;

/// Scale from 16-bit PCM to float.
const PCM_SCALE: f32 = 1.0 / 32768.0;

/// Constant-power pan law. Returns `(left, right)` gains for `gain` placed at
/// `pan` (-1 is hard left, 1 hard right). Out-of-range pans are clamped.
pub fn pan_gains(pan: f32, gain: f32) -> (f32, f32) {
    let pan = if pan.is_nan() { 0.0 } else { pan.clamp(-1.0, 1.0) };
    let theta = (pan as f64 + 1.0) * FRAC_PI_4;
    let gain = gain as f64;
    ((gain * theta.cos()) as f32, (gain * theta.sin()) as f32)
}

/// Playback length cap for a sample rate.
pub fn max_voice_samples(sample_rate: u32) -> usize {
    (MAX_VOICE_SECONDS * sample_rate as f64).round() as usize
}

/// Fade length for a voice of the given effective length.
pub fn fade_samples(len: usize) -> usize {
    (len / 16).clamp(MIN_FADE, MAX_FADE)
}

/// Playback state for one realized onset.
#[derive(Clone, Debug)]
pub struct Voice {
    role: Role,
    /// Effective length, in samples.
    len: usize,
    /// Read position into the role's buffer.
    pos: usize,
    fade: usize,
    gain_left: f32,
    gain_right: f32,
    /// Where the next unplayed sample lands relative to the current block.
    /// Negative once the voice has carried over from an earlier block.
    start_in_block: i64,
}

impl Voice {
    /// Creates a voice for an onset landing `start_in_block` samples into the
    /// current block. Returns `None` when there is nothing to play.
    pub fn new(
        role: Role,
        pan: f32,
        buffer_len: usize,
        sample_rate: u32,
        gain: f32,
        start_in_block: usize,
    ) -> Option<Voice> {
        let len = buffer_len.min(max_voice_samples(sample_rate));
        if len == 0 {
            return None;
        }

        let (gain_left, gain_right) = pan_gains(pan, gain);
        Some(Voice {
            role,
            len,
            pos: 0,
            fade: fade_samples(len),
            gain_left,
            gain_right,
            start_in_block: start_in_block as i64,
        })
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn gains(&self) -> (f32, f32) {
        (self.gain_left, self.gain_right)
    }

    pub fn is_finished(&self) -> bool {
        self.pos >= self.len
    }

    /// Linear fade in and out. On voices shorter than two fades the fade-in
    /// wins where the ramps overlap.
    fn envelope(&self, pos: usize) -> f32 {
        let fade = self.fade as f32;
        if pos < self.fade {
            pos as f32 / fade
        } else if pos + self.fade > self.len {
            self.len.saturating_sub(pos) as f32 / fade
        } else {
            1.0
        }
    }

    /// Adds this voice's share of the block into `block` and moves it on to
    /// the next block. Returns false once the voice has played out.
    pub fn mix_into(&mut self, pcm: &[i16], block: &mut StereoBlock) -> bool {
        let frames = block.len();
        let dest = self.start_in_block.max(0) as usize;

        if dest < frames && !self.is_finished() {
            let count = (frames - dest).min(self.len - self.pos);
            let Some(source) = pcm.get(self.pos..self.pos + count) else {
                // The buffer no longer backs this voice.
                self.pos = self.len;
                return false;
            };

            let left = &mut block.left[dest..dest + count];
            let right = &mut block.right[dest..dest + count];
            for (i, sample) in source.iter().enumerate() {
                let value = *sample as f32 * PCM_SCALE * self.envelope(self.pos + i);
                left[i] += value * self.gain_left;
                right[i] += value * self.gain_right;
            }
            self.pos += count;
        }

        self.start_in_block -= frames as i64;
        !self.is_finished()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pan_center() {
        let (l, r) = pan_gains(0.0, 0.8);
        let expected = 0.8 * std::f32::consts::FRAC_1_SQRT_2;
        assert!((l - r).abs() < 1e-6);
        assert!((l - expected).abs() < 1e-6);
    }

    #[test]
    fn test_pan_hard_right_and_left() {
        let (l, r) = pan_gains(1.0, 0.9);
        assert!(l.abs() < 1e-6);
        assert!((r - 0.9).abs() < 1e-6);

        let (l, r) = pan_gains(-1.0, 0.9);
        assert!((l - 0.9).abs() < 1e-6);
        assert!(r.abs() < 1e-6);
    }

    #[test]
    fn test_pan_is_clamped() {
        assert_eq!(pan_gains(5.0, 1.0), pan_gains(1.0, 1.0));
        assert_eq!(pan_gains(-5.0, 1.0), pan_gains(-1.0, 1.0));
        assert_eq!(pan_gains(f32::NAN, 1.0), pan_gains(0.0, 1.0));
    }

    #[test]
    fn test_pan_is_constant_power() {
        for pan in [-0.75f32, -0.3, 0.1, 0.6] {
            let (l, r) = pan_gains(pan, 1.0);
            assert!((l * l + r * r - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn test_length_cap_and_fade() {
        assert_eq!(max_voice_samples(48000), 4800);
        assert_eq!(max_voice_samples(44100), 4410);
        assert_eq!(fade_samples(4800), 32);
        assert_eq!(fade_samples(256), 16);
        assert_eq!(fade_samples(10), 8);

        let voice = Voice::new(Role::Click, 0.0, 100_000, 48000, 1.0, 0).unwrap();
        assert_eq!(voice.len(), 4800);
        assert!(Voice::new(Role::Click, 0.0, 0, 48000, 1.0, 0).is_none());
    }

    #[test]
    fn test_envelope_ramps() {
        let voice = Voice::new(Role::Click, 0.0, 1000, 48000, 1.0, 0).unwrap();
        // 1000 / 16 = 62, clamped to 32.
        assert_eq!(voice.envelope(0), 0.0);
        assert_eq!(voice.envelope(16), 0.5);
        assert_eq!(voice.envelope(32), 1.0);
        assert_eq!(voice.envelope(500), 1.0);
        assert_eq!(voice.envelope(1000 - 16), 0.5);
        assert_eq!(voice.envelope(999), 1.0 / 32.0);
    }

    #[test]
    fn test_short_voice_envelope() {
        // Fade is clamped up to 8, so the ramps overlap on a 10 sample voice.
        let voice = Voice::new(Role::Click, 0.0, 10, 48000, 1.0, 0).unwrap();
        assert_eq!(voice.envelope(0), 0.0);
        assert_eq!(voice.envelope(7), 0.875);
        assert_eq!(voice.envelope(8), 0.25);
        assert_eq!(voice.envelope(9), 0.125);
    }

    #[test]
    fn test_voice_gains_follow_pan() {
        let voice = Voice::new(Role::Cencerro, 1.0, 100, 48000, 0.85, 0).unwrap();
        let (l, r) = voice.gains();
        assert!(l.abs() < 1e-6);
        assert!((r - 0.85).abs() < 1e-6);

        let voice = Voice::new(Role::Cencerro, 0.0, 100, 48000, 0.5, 0).unwrap();
        assert_eq!(voice.gains(), pan_gains(0.0, 0.5));
    }

    #[test]
    fn test_mix_carries_over_and_finishes() {
        let pcm = vec![i16::MAX; 300];
        let mut voice = Voice::new(Role::Click, 1.0, pcm.len(), 48000, 1.0, 200).unwrap();

        let mut block = StereoBlock::new(256);
        assert!(voice.mix_into(&pcm, &mut block));
        assert!(block.right[..200].iter().all(|s| *s == 0.0));
        assert!(block.right[201..].iter().all(|s| *s > 0.0));
        assert!(block.left.iter().all(|s| s.abs() < 1e-6));

        // 56 samples played, 244 left, all of which fit in the next block.
        block.clear(256);
        assert!(!voice.mix_into(&pcm, &mut block));
        assert!(block.right[..243].iter().all(|s| *s > 0.0));
        assert!(block.right[244..].iter().all(|s| *s == 0.0));
        assert!(voice.is_finished());
    }
}
