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
use thread_priority::{set_current_thread_priority, ThreadPriority, ThreadPriorityValue};
use tracing::{info, warn};

/// Default priority for the render thread when nothing else is configured.
const DEFAULT_RENDER_THREAD_PRIORITY: u8 = 70;

const THREAD_PRIORITY_ENV: &str = "PULSO_THREAD_PRIORITY";
const DISABLE_RT_ENV: &str = "PULSO_DISABLE_RT_AUDIO";

/// Scheduling settings for the render thread, resolved before it is spawned.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RenderPriority {
    /// Cross-platform priority, 0-99.
    pub priority: u8,
    /// Try SCHED_FIFO on unix.
    pub realtime: bool,
}

impl Default for RenderPriority {
    fn default() -> Self {
        RenderPriority {
            priority: DEFAULT_RENDER_THREAD_PRIORITY,
            realtime: true,
        }
    }
}

impl RenderPriority {
    /// Resolves the settings. Explicit values win, then PULSO_THREAD_PRIORITY
    /// and PULSO_DISABLE_RT_AUDIO, then the defaults.
    pub fn resolve(priority: Option<u8>, realtime: Option<bool>) -> RenderPriority {
        RenderPriority {
            priority: priority
                .filter(|p| *p < 100)
                .or_else(env_priority)
                .unwrap_or(DEFAULT_RENDER_THREAD_PRIORITY),
            realtime: realtime.unwrap_or_else(|| !env_flag(DISABLE_RT_ENV)),
        }
    }
}

fn env_priority() -> Option<u8> {
    std::env::var(THREAD_PRIORITY_ENV)
        .ok()
        .and_then(|v| v.trim().parse::<u8>().ok())
        .filter(|n| *n < 100)
}

pub(crate) fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .ok()
        .map(|v| {
            v == "1"
                || v.eq_ignore_ascii_case("true")
                || v.eq_ignore_ascii_case("yes")
                || v.eq_ignore_ascii_case("on")
        })
        .unwrap_or(false)
}

/// Raises the priority of the calling thread. Failures are logged and
/// otherwise ignored; playback still works at normal priority.
pub fn configure_render_thread_priority(settings: RenderPriority) {
    let value = match ThreadPriorityValue::try_from(settings.priority) {
        Ok(value) => value,
        Err(e) => {
            warn!(priority = settings.priority, error = ?e, "Invalid render thread priority");
            return;
        }
    };

    let tp = ThreadPriority::Crossplatform(value);
    if let Err(e) = set_current_thread_priority(tp) {
        warn!(error = ?e, "Failed to raise render thread priority");
    }

    #[cfg(unix)]
    if settings.realtime {
        use thread_priority::unix::{
            set_thread_priority_and_policy, thread_native_id, RealtimeThreadSchedulePolicy,
            ThreadSchedulePolicy,
        };
        let tid = thread_native_id();
        match set_thread_priority_and_policy(
            tid,
            tp,
            ThreadSchedulePolicy::Realtime(RealtimeThreadSchedulePolicy::Fifo),
        ) {
            Ok(()) => {
                info!("Enabled RT SCHED_FIFO for render thread");
            }
            Err(e) => {
                warn!(
                    error = %e,
                    "Failed to set RT SCHED_FIFO for render thread"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use serial_test::serial;

    use super::*;

    /// Runs `f` with the given variables set, restoring them afterwards.
    fn with_env<F: FnOnce()>(vars: &[(&str, &str)], f: F) {
        let original: Vec<(String, Option<String>)> = vars
            .iter()
            .map(|(name, _)| (name.to_string(), std::env::var(name).ok()))
            .collect();
        for (name, value) in vars {
            std::env::set_var(name, value);
        }

        f();

        for (name, value) in original {
            match value {
                Some(val) => std::env::set_var(&name, val),
                None => std::env::remove_var(&name),
            }
        }
    }

    #[test]
    #[serial]
    fn test_env_overrides_defaults() {
        with_env(&[(THREAD_PRIORITY_ENV, "55"), (DISABLE_RT_ENV, "1")], || {
            assert_eq!(
                RenderPriority::resolve(None, None),
                RenderPriority {
                    priority: 55,
                    realtime: false
                }
            );
            // Explicit values still win over the environment.
            assert_eq!(
                RenderPriority::resolve(Some(20), Some(true)),
                RenderPriority {
                    priority: 20,
                    realtime: true
                }
            );
        });
    }

    #[test]
    #[serial]
    fn test_invalid_env_falls_back() {
        with_env(&[(THREAD_PRIORITY_ENV, "120"), (DISABLE_RT_ENV, "no")], || {
            assert_eq!(RenderPriority::resolve(None, None), RenderPriority::default());
        });
        with_env(&[(THREAD_PRIORITY_ENV, "fast")], || {
            assert_eq!(
                RenderPriority::resolve(None, Some(true)).priority,
                DEFAULT_RENDER_THREAD_PRIORITY
            );
        });
    }

    #[test]
    #[serial]
    fn test_env_flag_values() {
        for value in ["1", "true", "YES", "on"] {
            with_env(&[(DISABLE_RT_ENV, value)], || assert!(env_flag(DISABLE_RT_ENV)));
        }
        for value in ["0", "false", ""] {
            with_env(&[(DISABLE_RT_ENV, value)], || assert!(!env_flag(DISABLE_RT_ENV)));
        }
    }

    #[test]
    #[serial]
    fn test_explicit_settings_win() {
        let settings = RenderPriority::resolve(Some(42), Some(false));
        assert_eq!(
            settings,
            RenderPriority {
                priority: 42,
                realtime: false
            }
        );
    }

    #[test]
    #[serial]
    fn test_out_of_range_priority_is_ignored() {
        let settings = RenderPriority::resolve(Some(150), Some(true));
        assert!(settings.priority < 100);
    }
}
