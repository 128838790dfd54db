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

//! Onset notifications sent from the render thread to listeners.

use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam_channel::{Receiver, Sender, TrySendError};

/// Reported whenever an onset is realized.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OnsetEvent {
    /// Always 0. Kept because listeners of the tick stream expect the field.
    pub bar: i32,
    pub section: i32,
    pub k: i32,
    /// Position of the onset within the cycle, in milliseconds.
    pub time_ms: f64,
}

/// Receives notifications from the render thread. Implementations are called
/// on the real-time path and must not block.
pub trait EventSink: Send + Sync {
    /// An onset was realized.
    fn onset(&self, event: OnsetEvent);

    /// Playback started (`true`) or stopped (`false`).
    fn transport(&self, _playing: bool) {}
}

impl<F> EventSink for F
where
    F: Fn(OnsetEvent) + Send + Sync,
{
    fn onset(&self, event: OnsetEvent) {
        self(event)
    }
}

/// Discards everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn onset(&self, _event: OnsetEvent) {}
}

/// Anything a [`ChannelSink`] forwards.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Notification {
    Onset(OnsetEvent),
    Transport { playing: bool },
}

/// Forwards notifications into a bounded channel. When the channel is full the
/// notification is dropped and counted instead of stalling the render thread.
pub struct ChannelSink {
    sender: Sender<Notification>,
    dropped: AtomicU64,
}

impl ChannelSink {
    /// Creates a sink and the receiving end of its channel.
    pub fn bounded(capacity: usize) -> (ChannelSink, Receiver<Notification>) {
        let (sender, receiver) = crossbeam_channel::bounded(capacity);
        (
            ChannelSink {
                sender,
                dropped: AtomicU64::new(0),
            },
            receiver,
        )
    }

    /// Number of notifications dropped because the channel was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn send(&self, notification: Notification) {
        match self.sender.try_send(notification) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
            // Nobody is listening anymore.
            Err(TrySendError::Disconnected(_)) => {}
        }
    }
}

impl EventSink for ChannelSink {
    fn onset(&self, event: OnsetEvent) {
        self.send(Notification::Onset(event));
    }

    fn transport(&self, playing: bool) {
        self.send(Notification::Transport { playing });
    }
}
