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

//! Decoder for RIFF/WAVE containers holding signed 16-bit linear PCM.
//!
//! Only the payload chunk is located; the format chunk is not interpreted.
//! Multi-channel payloads come back as the raw interleaved shorts.

use tracing::{debug, warn};

/// Size of the outer RIFF header (`RIFF`, size, `WAVE`).
const RIFF_HEADER_LEN: usize = 12;

/// Size of a chunk header (4-byte tag + 4-byte little-endian size).
const CHUNK_HEADER_LEN: usize = 8;

/// Payload offset assumed when no `data` chunk can be found.
const FALLBACK_PAYLOAD_OFFSET: usize = 44;

/// Error type for container decoding.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum PcmError {
    #[error("container truncated: payload at {offset} needs {needed} bytes, buffer holds {len}")]
    Truncated {
        offset: usize,
        needed: usize,
        len: usize,
    },
}

/// Location of the sample payload inside a container.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Payload {
    offset: usize,
    size: usize,
}

/// Decodes a container into 16-bit samples. Never fails: malformed input
/// yields an empty buffer so the role simply plays silence.
pub fn decode(bytes: &[u8]) -> Vec<i16> {
    match try_decode(bytes) {
        Ok(samples) => samples,
        Err(e) => {
            warn!(error = %e, bytes = bytes.len(), "Unable to decode PCM container, using silence");
            Vec::new()
        }
    }
}

/// Decodes a container, reporting why it could not be read.
pub fn try_decode(bytes: &[u8]) -> Result<Vec<i16>, PcmError> {
    let payload = find_payload(bytes)?;
    let end = payload
        .offset
        .checked_add(payload.size)
        .filter(|end| *end <= bytes.len())
        .ok_or(PcmError::Truncated {
            offset: payload.offset,
            needed: payload.size,
            len: bytes.len(),
        })?;

    Ok(bytes[payload.offset..end]
        .chunks_exact(2)
        .map(|c| i16::from_le_bytes([c[0], c[1]]))
        .collect())
}

/// Walks the chunk list looking for `data`. Falls back to the canonical
/// 44-byte header layout when the walk runs off the end of the buffer.
fn find_payload(bytes: &[u8]) -> Result<Payload, PcmError> {
    let mut pos = RIFF_HEADER_LEN;

    while pos + CHUNK_HEADER_LEN <= bytes.len() {
        let tag = &bytes[pos..pos + 4];
        let size = read_u32_le(bytes, pos + 4) as usize;

        if tag == b"data" {
            return Ok(Payload {
                offset: pos + CHUNK_HEADER_LEN,
                size,
            });
        }

        // Chunks are word aligned; odd sizes carry one pad byte.
        pos = match pos
            .checked_add(CHUNK_HEADER_LEN)
            .and_then(|p| p.checked_add(size))
            .and_then(|p| p.checked_add(size & 1))
        {
            Some(next) => next,
            None => break,
        };
    }

    if bytes.len() < FALLBACK_PAYLOAD_OFFSET {
        return Err(PcmError::Truncated {
            offset: FALLBACK_PAYLOAD_OFFSET,
            needed: 0,
            len: bytes.len(),
        });
    }

    debug!(bytes = bytes.len(), "No data chunk found, assuming 44-byte header");
    Ok(Payload {
        offset: FALLBACK_PAYLOAD_OFFSET,
        size: bytes.len() - FALLBACK_PAYLOAD_OFFSET,
    })
}

fn read_u32_le(data: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        data[offset],
        data[offset + 1],
        data[offset + 2],
        data[offset + 3],
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{pcm_bytes, wav_bytes};

    #[test]
    fn test_decode_mono() {
        let wav = wav_bytes(1, 48000, &[0, 1000, -1000, i16::MAX, i16::MIN]);
        assert_eq!(decode(&wav), vec![0, 1000, -1000, i16::MAX, i16::MIN]);
    }

    #[test]
    fn test_decode_stereo_is_left_interleaved() {
        let wav = wav_bytes(2, 44100, &[100, 200, -100, -200]);
        assert_eq!(decode(&wav), vec![100, 200, -100, -200]);
    }

    #[test]
    fn test_skips_unknown_chunks_with_padding() {
        let mut wav = Vec::new();
        wav.extend(b"RIFF");
        wav.extend(0u32.to_le_bytes());
        wav.extend(b"WAVE");
        // Odd-sized chunk followed by its pad byte.
        wav.extend(b"LIST");
        wav.extend(3u32.to_le_bytes());
        wav.extend([1, 2, 3, 0]);
        wav.extend(b"data");
        wav.extend(4u32.to_le_bytes());
        wav.extend(pcm_bytes(&[7, -7]));

        assert_eq!(decode(&wav), vec![7, -7]);
    }

    #[test]
    fn test_fallback_to_fixed_header() {
        // No recognizable chunk tags at all: everything after byte 44 is payload.
        let mut bytes = vec![0xAAu8; FALLBACK_PAYLOAD_OFFSET];
        bytes.extend(pcm_bytes(&[5, 6, 7]));

        assert_eq!(decode(&bytes), vec![5, 6, 7]);
    }

    #[test]
    fn test_truncated_payload_is_silent() {
        let mut wav = wav_bytes(1, 48000, &[1, 2, 3, 4]);
        wav.truncate(wav.len() - 3);

        assert!(matches!(
            try_decode(&wav),
            Err(PcmError::Truncated { .. })
        ));
        assert!(decode(&wav).is_empty());
    }

    #[test]
    fn test_short_buffer_is_silent() {
        assert!(decode(&[]).is_empty());
        assert!(decode(b"RIFF").is_empty());
        assert!(decode(&[0u8; 20]).is_empty());
    }

    #[test]
    fn test_odd_payload_drops_trailing_byte() {
        let mut wav = Vec::new();
        wav.extend(b"RIFF");
        wav.extend(0u32.to_le_bytes());
        wav.extend(b"WAVE");
        wav.extend(b"data");
        wav.extend(3u32.to_le_bytes());
        wav.extend([0x10, 0x00, 0x7f]);

        assert_eq!(decode(&wav), vec![0x10]);
    }

    #[test]
    fn test_decodes_hound_output() {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 48000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = std::io::Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for s in [3i16, -3, 300, -300] {
                writer.write_sample(s).unwrap();
            }
            writer.finalize().unwrap();
        }

        assert_eq!(decode(cursor.get_ref()), vec![3, -3, 300, -300]);
    }
}
