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
use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
    thread,
    time::Duration,
};

use parking_lot::Mutex;
use tracing::{info, span, Level};

use super::{AudioError, OutputBackend, OutputSink};

/// State shared between a mock backend and the sinks it opens.
#[derive(Default)]
struct Shared {
    samples: Mutex<Vec<f32>>,
    writes: AtomicUsize,
    opens: AtomicUsize,
    releases: AtomicUsize,
    playing: AtomicBool,
}

/// A mock output. Doesn't play anything; records what it was given.
#[derive(Clone)]
pub struct MockBackend {
    name: String,
    min_buffer_frames: usize,
    /// Sleep for the duration of each written block, like a real device would.
    paced: bool,
    /// Fail every write after this many have succeeded.
    fail_after: Option<usize>,
    /// Keep at most this many samples.
    record_limit: usize,
    shared: Arc<Shared>,
}

impl MockBackend {
    /// Creates a paced mock backend.
    pub fn new(name: &str) -> MockBackend {
        MockBackend {
            name: name.to_string(),
            min_buffer_frames: 0,
            paced: true,
            fail_after: None,
            record_limit: usize::MAX,
            shared: Arc::new(Shared::default()),
        }
    }

    /// A paced mock that records nothing, for sessions that select a mock
    /// device. Long runs stay at constant memory.
    pub fn for_session(name: &str) -> MockBackend {
        MockBackend::new(name).with_record_limit(0)
    }

    pub fn with_min_buffer_frames(mut self, frames: usize) -> MockBackend {
        self.min_buffer_frames = frames;
        self
    }

    pub fn with_pacing(mut self, paced: bool) -> MockBackend {
        self.paced = paced;
        self
    }

    pub fn with_failure_after(mut self, writes: usize) -> MockBackend {
        self.fail_after = Some(writes);
        self
    }

    pub fn with_record_limit(mut self, samples: usize) -> MockBackend {
        self.record_limit = samples;
        self
    }

    /// Everything written so far, interleaved.
    pub fn samples(&self) -> Vec<f32> {
        self.shared.samples.lock().clone()
    }

    /// Number of successful writes.
    pub fn writes(&self) -> usize {
        self.shared.writes.load(Ordering::Relaxed)
    }

    pub fn opens(&self) -> usize {
        self.shared.opens.load(Ordering::Relaxed)
    }

    pub fn releases(&self) -> usize {
        self.shared.releases.load(Ordering::Relaxed)
    }

    /// Returns true between a sink's start and stop.
    pub fn is_playing(&self) -> bool {
        self.shared.playing.load(Ordering::Relaxed)
    }
}

impl fmt::Display for MockBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (Mock)", self.name)
    }
}

impl OutputBackend for MockBackend {
    fn open(&self, sample_rate: u32, block_hint: usize) -> Result<Box<dyn OutputSink>, AudioError> {
        let span = span!(Level::INFO, "open output (mock)");
        let _enter = span.enter();

        if sample_rate == 0 {
            return Err(AudioError::DeviceInit(String::from("sample rate is 0")));
        }

        self.shared.opens.fetch_add(1, Ordering::Relaxed);
        info!(device = self.name, sample_rate, block_hint, "Opened output stream");

        Ok(Box::new(MockSink {
            backend: self.clone(),
            sample_rate,
            released: false,
        }))
    }
}

struct MockSink {
    backend: MockBackend,
    sample_rate: u32,
    released: bool,
}

impl OutputSink for MockSink {
    fn min_buffer_frames(&self) -> usize {
        self.backend.min_buffer_frames
    }

    fn start(&mut self) -> Result<(), AudioError> {
        self.backend.shared.playing.store(true, Ordering::Relaxed);
        Ok(())
    }

    fn write(&mut self, samples: &[f32]) -> Result<(), AudioError> {
        if self.released {
            return Err(AudioError::Disconnected);
        }

        let shared = &self.backend.shared;
        if let Some(limit) = self.backend.fail_after {
            if shared.writes.load(Ordering::Relaxed) >= limit {
                return Err(AudioError::Playback(String::from("mock device failure")));
            }
        }

        {
            let mut recorded = shared.samples.lock();
            let room = self.backend.record_limit.saturating_sub(recorded.len());
            recorded.extend_from_slice(&samples[..room.min(samples.len())]);
        }
        shared.writes.fetch_add(1, Ordering::Relaxed);

        if self.backend.paced {
            let frames = samples.len() / 2;
            thread::sleep(Duration::from_secs_f64(
                frames as f64 / self.sample_rate as f64,
            ));
        }
        Ok(())
    }

    fn stop(&mut self) -> Result<(), AudioError> {
        self.backend.shared.playing.store(false, Ordering::Relaxed);
        Ok(())
    }

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.backend.shared.releases.fetch_add(1, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_mock_keeps_nothing() {
        let backend = MockBackend::for_session("mock").with_pacing(false);
        let mut sink = backend.open(48000, 4).unwrap();
        sink.start().unwrap();
        for _ in 0..100 {
            sink.write(&[0.5; 512]).unwrap();
        }
        assert_eq!(backend.writes(), 100);
        assert!(backend.samples().is_empty());
    }

    #[test]
    fn test_records_writes() {
        let backend = MockBackend::new("mock").with_pacing(false);
        let mut sink = backend.open(48000, 4).unwrap();
        sink.start().unwrap();
        assert!(backend.is_playing());
        sink.write(&[0.1, 0.2]).unwrap();
        sink.write(&[0.3, 0.4]).unwrap();
        sink.stop().unwrap();
        sink.release();
        sink.release();

        assert_eq!(backend.samples(), vec![0.1, 0.2, 0.3, 0.4]);
        assert_eq!(backend.writes(), 2);
        assert_eq!(backend.opens(), 1);
        assert_eq!(backend.releases(), 1);
        assert!(!backend.is_playing());
        assert!(sink.write(&[0.0, 0.0]).is_err());
    }

    #[test]
    fn test_fails_after_writes() {
        let backend = MockBackend::new("mock").with_pacing(false).with_failure_after(1);
        let mut sink = backend.open(48000, 4).unwrap();
        assert!(sink.write(&[0.0; 8]).is_ok());
        assert!(matches!(
            sink.write(&[0.0; 8]),
            Err(AudioError::Playback(_))
        ));
    }

    #[test]
    fn test_record_limit() {
        let backend = MockBackend::new("mock").with_pacing(false).with_record_limit(3);
        let mut sink = backend.open(48000, 4).unwrap();
        sink.write(&[1.0, 2.0]).unwrap();
        sink.write(&[3.0, 4.0]).unwrap();
        assert_eq!(backend.samples(), vec![1.0, 2.0, 3.0]);
        assert_eq!(backend.writes(), 2);
    }
}
