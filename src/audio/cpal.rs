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
use std::{fmt, sync::Arc, time::Duration};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::{Receiver, SendTimeoutError, Sender};
use parking_lot::Mutex;
use tracing::{error, info, span, Level};

use super::{AudioError, OutputBackend, OutputSink};

/// Blocks queued between the render thread and the device callback. The
/// blocking write waits once this many are pending.
const QUEUED_BLOCKS: usize = 2;

/// How long a write may wait on a stalled device before giving up.
const WRITE_TIMEOUT: Duration = Duration::from_secs(2);

/// Name used to ask for the host's default output device.
const DEFAULT_DEVICE: &str = "default";

/// An output device as seen by `pulso devices`.
#[derive(Clone, Debug)]
pub struct DeviceInfo {
    pub name: String,
    pub host: String,
    pub max_channels: u16,
}

impl fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (Channels={}) ({})",
            self.name, self.max_channels, self.host
        )
    }
}

#[allow(deprecated)]
fn device_name(device: &cpal::Device) -> String {
    device
        .name()
        .unwrap_or_else(|_| String::from("<unknown device>"))
}

/// Lists output devices across every available host.
pub fn list_devices() -> Result<Vec<DeviceInfo>, AudioError> {
    let mut devices = Vec::new();
    for host_id in cpal::available_hosts() {
        let host = match cpal::host_from_id(host_id) {
            Ok(host) => host,
            Err(e) => {
                error!(err = e.to_string(), host = host_id.name(), "Unable to open host");
                continue;
            }
        };

        let host_devices = match host.output_devices() {
            Ok(host_devices) => host_devices,
            Err(e) => {
                error!(
                    err = e.to_string(),
                    host = host_id.name(),
                    "Unable to list devices for host"
                );
                continue;
            }
        };

        for device in host_devices {
            let max_channels = match device.supported_output_configs() {
                Ok(configs) => configs.map(|config| config.channels()).max().unwrap_or(0),
                Err(_) => continue,
            };

            if max_channels > 0 {
                devices.push(DeviceInfo {
                    name: device_name(&device),
                    host: host_id.name().to_string(),
                    max_channels,
                });
            }
        }
    }

    devices.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(devices)
}

/// Opens cpal output streams on a named device, or the host default.
pub struct CpalBackend {
    device: String,
}

impl CpalBackend {
    pub fn new(device: &str) -> CpalBackend {
        CpalBackend {
            device: device.trim().to_string(),
        }
    }

    fn find_device(&self) -> Result<cpal::Device, AudioError> {
        let host = cpal::default_host();
        if self.device.is_empty() || self.device == DEFAULT_DEVICE {
            return host.default_output_device().ok_or(AudioError::NoDevice);
        }

        host.output_devices()
            .map_err(|e| AudioError::DeviceInit(e.to_string()))?
            .find(|device| device_name(device).trim() == self.device)
            .ok_or_else(|| AudioError::DeviceNotFound(self.device.clone()))
    }
}

impl fmt::Display for CpalBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (cpal)", self.device)
    }
}

impl OutputBackend for CpalBackend {
    fn open(&self, sample_rate: u32, block_hint: usize) -> Result<Box<dyn OutputSink>, AudioError> {
        let span = span!(Level::INFO, "open output (cpal)");
        let _enter = span.enter();

        let device = self.find_device()?;
        let supported = device
            .default_output_config()
            .map_err(|e| AudioError::DeviceInit(e.to_string()))?;

        let sample_format = supported.sample_format();
        let min_buffer_frames = match supported.buffer_size() {
            cpal::SupportedBufferSize::Range { min, .. } => *min as usize,
            cpal::SupportedBufferSize::Unknown => 0,
        };

        let mut config: cpal::StreamConfig = supported.into();
        config.sample_rate = sample_rate;
        let channels = config.channels as usize;

        let (block_tx, block_rx) = crossbeam_channel::bounded(QUEUED_BLOCKS);
        let (recycle_tx, recycle_rx) = crossbeam_channel::bounded(QUEUED_BLOCKS + 2);
        let failure = Arc::new(Mutex::new(None));
        let feed = Feed {
            blocks: block_rx,
            recycle: recycle_tx,
            current: Vec::new(),
            pos: 0,
        };

        let stream = match sample_format {
            cpal::SampleFormat::F32 => {
                build_stream::<f32>(&device, &config, channels, feed, failure.clone())
            }
            cpal::SampleFormat::I16 => {
                build_stream::<i16>(&device, &config, channels, feed, failure.clone())
            }
            cpal::SampleFormat::I32 => {
                build_stream::<i32>(&device, &config, channels, feed, failure.clone())
            }
            cpal::SampleFormat::U16 => {
                build_stream::<u16>(&device, &config, channels, feed, failure.clone())
            }
            other => return Err(AudioError::UnsupportedFormat(format!("{:?}", other))),
        }?;

        info!(
            device = device_name(&device),
            sample_rate,
            channels,
            format = format!("{:?}", sample_format),
            min_buffer_frames,
            block_hint,
            "Opened output stream"
        );

        Ok(Box::new(CpalSink {
            stream: Some(stream),
            blocks: block_tx,
            recycled: recycle_rx,
            failure,
            min_buffer_frames,
        }))
    }
}

/// Callback-side end of the block queue.
struct Feed {
    blocks: Receiver<Vec<f32>>,
    recycle: Sender<Vec<f32>>,
    current: Vec<f32>,
    pos: usize,
}

impl Feed {
    /// Next interleaved stereo pair, or `None` on underrun.
    fn next_frame(&mut self) -> Option<(f32, f32)> {
        while self.pos + 2 > self.current.len() {
            let next = self.blocks.try_recv().ok()?;
            let used = std::mem::replace(&mut self.current, next);
            // Hand the old allocation back to the writer; drop it if nobody wants it.
            let _ = self.recycle.try_send(used);
            self.pos = 0;
        }

        let frame = (self.current[self.pos], self.current[self.pos + 1]);
        self.pos += 2;
        Some(frame)
    }

    fn fill<T>(&mut self, data: &mut [T], channels: usize)
    where
        T: cpal::Sample + cpal::FromSample<f32>,
    {
        for frame in data.chunks_mut(channels) {
            let (left, right) = self.next_frame().unwrap_or((0.0, 0.0));
            for (i, sample) in frame.iter_mut().enumerate() {
                let value = match (i, channels) {
                    (0, 1) => (left + right) * 0.5,
                    (0, _) => left,
                    (1, _) => right,
                    _ => 0.0,
                };
                *sample = T::from_sample(value);
            }
        }
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    channels: usize,
    mut feed: Feed,
    failure: Arc<Mutex<Option<String>>>,
) -> Result<cpal::Stream, AudioError>
where
    T: cpal::SizedSample + cpal::FromSample<f32>,
{
    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| feed.fill(data, channels),
            move |err| {
                error!("CPAL output stream error: {}", err);
                *failure.lock() = Some(err.to_string());
            },
            None,
        )
        .map_err(|e| AudioError::StreamCreate(e.to_string()))
}

/// Render-thread end of a cpal stream.
struct CpalSink {
    stream: Option<cpal::Stream>,
    blocks: Sender<Vec<f32>>,
    recycled: Receiver<Vec<f32>>,
    failure: Arc<Mutex<Option<String>>>,
    min_buffer_frames: usize,
}

impl CpalSink {
    fn stream(&self) -> Result<&cpal::Stream, AudioError> {
        self.stream.as_ref().ok_or(AudioError::Disconnected)
    }

    fn check_failure(&self) -> Result<(), AudioError> {
        match self.failure.lock().as_ref() {
            Some(message) => Err(AudioError::Stream(message.clone())),
            None => Ok(()),
        }
    }
}

impl OutputSink for CpalSink {
    fn min_buffer_frames(&self) -> usize {
        self.min_buffer_frames
    }

    fn start(&mut self) -> Result<(), AudioError> {
        self.stream()?
            .play()
            .map_err(|e| AudioError::Playback(e.to_string()))
    }

    fn write(&mut self, samples: &[f32]) -> Result<(), AudioError> {
        self.check_failure()?;

        let mut buffer = self.recycled.try_recv().unwrap_or_default();
        buffer.clear();
        buffer.extend_from_slice(samples);

        match self.blocks.send_timeout(buffer, WRITE_TIMEOUT) {
            Ok(()) => Ok(()),
            Err(SendTimeoutError::Timeout(_)) => Err(AudioError::Playback(String::from(
                "timed out waiting for the output device",
            ))),
            Err(SendTimeoutError::Disconnected(_)) => Err(AudioError::Disconnected),
        }
    }

    fn stop(&mut self) -> Result<(), AudioError> {
        self.stream()?
            .pause()
            .map_err(|e| AudioError::Playback(e.to_string()))
    }

    fn release(&mut self) {
        self.stream = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed() -> (Feed, Sender<Vec<f32>>, Receiver<Vec<f32>>) {
        let (block_tx, block_rx) = crossbeam_channel::bounded(4);
        let (recycle_tx, recycle_rx) = crossbeam_channel::bounded(4);
        (
            Feed {
                blocks: block_rx,
                recycle: recycle_tx,
                current: Vec::new(),
                pos: 0,
            },
            block_tx,
            recycle_rx,
        )
    }

    #[test]
    fn test_feed_underrun_is_silent() {
        let (mut feed, _tx, _recycled) = feed();
        let mut data = [1.0f32; 4];
        feed.fill(&mut data, 2);
        assert_eq!(data, [0.0; 4]);
    }

    #[test]
    fn test_feed_spans_blocks_and_recycles() {
        let (mut feed, tx, recycled) = feed();
        tx.send(vec![0.1, 0.2, 0.3, 0.4]).unwrap();
        tx.send(vec![0.5, 0.6]).unwrap();

        let mut data = [0.0f32; 8];
        feed.fill(&mut data, 2);
        assert_eq!(data, [0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.0, 0.0]);
        assert_eq!(recycled.try_recv().unwrap().len(), 0);
        assert_eq!(recycled.try_recv().unwrap(), vec![0.1, 0.2, 0.3, 0.4]);
    }

    #[test]
    fn test_feed_channel_layouts() {
        let (mut feed, tx, _recycled) = feed();
        tx.send(vec![0.2, 0.4, 1.0, -1.0]).unwrap();

        let mut mono = [0.0f32; 1];
        feed.fill(&mut mono, 1);
        assert!((mono[0] - 0.3).abs() < 1e-6);

        let mut quad = [9.0f32; 4];
        feed.fill(&mut quad, 4);
        assert_eq!(quad, [1.0, -1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_feed_converts_to_integer_formats() {
        let (mut feed, tx, _recycled) = feed();
        tx.send(vec![0.0, 1.0]).unwrap();
        let mut data = [0i16; 2];
        feed.fill(&mut data, 2);
        assert_eq!(data[0], 0);
        assert_eq!(data[1], i16::MAX);
    }
}
