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

/// Planar stereo output for one render block.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StereoBlock {
    pub left: Vec<f32>,
    pub right: Vec<f32>,
}

impl StereoBlock {
    /// Creates a silent block of the given length.
    pub fn new(frames: usize) -> StereoBlock {
        StereoBlock {
            left: vec![0.0; frames],
            right: vec![0.0; frames],
        }
    }

    /// Frames per channel.
    pub fn len(&self) -> usize {
        self.left.len()
    }

    pub fn is_empty(&self) -> bool {
        self.left.is_empty()
    }

    /// Resizes the block if needed and zeroes it.
    pub fn clear(&mut self, frames: usize) {
        self.left.clear();
        self.left.resize(frames, 0.0);
        self.right.clear();
        self.right.resize(frames, 0.0);
    }

    /// Writes the block as interleaved L/R pairs into `out`, which is resized
    /// to twice the frame count.
    pub fn interleave_into(&self, out: &mut Vec<f32>) {
        out.clear();
        out.reserve(self.len() * 2);
        for (l, r) in self.left.iter().zip(self.right.iter()) {
            out.push(*l);
            out.push(*r);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clear_resizes_and_zeroes() {
        let mut block = StereoBlock::new(2);
        block.left[0] = 1.0;
        block.right[1] = -1.0;
        block.clear(4);
        assert_eq!(block, StereoBlock::new(4));
    }

    #[test]
    fn test_interleave() {
        let block = StereoBlock {
            left: vec![1.0, 2.0, 3.0],
            right: vec![-1.0, -2.0, -3.0],
        };
        let mut out = vec![9.0; 10];
        block.interleave_into(&mut out);
        assert_eq!(out, vec![1.0, -1.0, 2.0, -2.0, 3.0, -3.0]);
    }
}
