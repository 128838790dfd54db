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

//! Session files: device settings, sample locations, tempo, volume and pattern.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use ::config::{Config, File, FileFormat};
use duration_string::DurationString;
use serde::Deserialize;
use tracing::info;

use crate::bank::SampleBank;
use crate::events::EventSink;
use crate::metronome::{Metronome, DEFAULT_TEMPO};
use crate::pattern::{CompiledPattern, Step};

pub mod audio;
pub mod error;
pub mod samples;

pub use self::audio::Audio;
pub use self::error::ConfigError;
pub use self::samples::Samples;

fn default_tempo() -> f64 {
    DEFAULT_TEMPO
}

fn default_volume() -> f32 {
    1.0
}

/// A YAML representation of a playback session.
#[derive(Deserialize, Clone, Debug)]
pub struct Session {
    #[serde(default)]
    audio: Audio,

    #[serde(default)]
    samples: Samples,

    /// Tempo in beats per minute.
    #[serde(default = "default_tempo")]
    tempo: f64,

    /// Master gain, 0 to 1.
    #[serde(default = "default_volume")]
    volume: f32,

    #[serde(default)]
    pattern: Vec<Step>,

    /// Directory relative paths are resolved against.
    #[serde(skip)]
    base_dir: PathBuf,
}

impl Session {
    /// Loads a session file. Relative sample paths resolve against the
    /// file's directory.
    pub fn load(path: &Path) -> Result<Session, ConfigError> {
        let mut session: Session = Config::builder()
            .add_source(File::from(path))
            .build()?
            .try_deserialize()?;
        session.base_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();

        info!(
            path = %path.display(),
            tempo = session.tempo,
            steps = session.pattern.len(),
            "Loaded session"
        );
        Ok(session)
    }

    /// Parses a session from YAML text.
    pub fn from_yaml(yaml: &str, base_dir: &Path) -> Result<Session, ConfigError> {
        let mut session: Session = Config::builder()
            .add_source(File::from_str(yaml, FileFormat::Yaml))
            .build()?
            .try_deserialize()?;
        session.base_dir = base_dir.to_path_buf();
        Ok(session)
    }

    pub fn audio(&self) -> &Audio {
        &self.audio
    }

    pub fn samples(&self) -> &Samples {
        &self.samples
    }

    pub fn tempo(&self) -> f64 {
        self.tempo
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn pattern(&self) -> &[Step] {
        &self.pattern
    }

    /// Compiles the session's pattern at its tempo and sample rate.
    pub fn compile(&self) -> CompiledPattern {
        CompiledPattern::compile(self.tempo, &self.pattern, self.audio.sample_rate())
    }

    /// Loads and decodes the role sounds.
    pub fn load_bank(&self) -> SampleBank {
        SampleBank::load(&self.samples.assets(&self.base_dir))
    }

    /// Builds a configured, idle metronome for this session.
    pub fn metronome(&self, events: Arc<dyn EventSink>) -> Result<Metronome, ConfigError> {
        let backend = crate::audio::get_backend(&self.audio)?;
        let metronome = Metronome::new(Arc::new(self.load_bank()), backend)
            .with_events(events)
            .with_priority(self.audio.render_priority());

        metronome.configure(self.audio.sample_rate(), self.audio.block_size())?;
        metronome.set_tempo(self.tempo);
        metronome.set_volume(self.volume);
        metronome.set_pattern(self.pattern.clone());
        Ok(metronome)
    }
}

/// Parses a duration such as `30s` or `1m30s`.
pub fn parse_duration(value: &str) -> Result<Duration, ConfigError> {
    DurationString::from_string(value.to_string())
        .map(Into::into)
        .map_err(|e| ConfigError::Duration(value.to_string(), e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bank::Role;
    use crate::events::NullSink;
    use crate::pattern::StepRole;
    use crate::testutil::wav_bytes;

    #[test]
    fn test_parse_session() {
        let yaml = r#"
            audio:
              device: mock-device
              sample_rate: 44100
            tempo: 90
            volume: 0.5
            pattern:
              - { dur_eighths: 1, role: cajon_grave, pan: -0.5, section: 1, k: 0 }
              - { durEighths: 0.5, role: silence }
              - { dur_eighths: 0.5, role: clave, sectionIdx: 2, k: 3 }
              - { dur_eighths: 2 }
        "#;

        let session = Session::from_yaml(yaml, Path::new("/tmp")).unwrap();
        assert_eq!(session.audio().device(), "mock-device");
        assert_eq!(session.audio().sample_rate(), 44100);
        assert_eq!(session.tempo(), 90.0);
        assert_eq!(session.volume(), 0.5);

        let steps = session.pattern();
        assert_eq!(steps.len(), 4);
        assert_eq!(
            steps[0],
            Step::new(1.0, Role::CajonGrave).with_pan(-0.5).with_ids(1, 0)
        );
        assert_eq!(steps[1].dur_eighths, 0.5);
        assert_eq!(steps[1].role, StepRole::Silence);
        assert_eq!(steps[2].role, StepRole::Sound(Role::Click));
        assert_eq!((steps[2].section, steps[2].k), (2, 3));
        assert_eq!(steps[3].role, StepRole::Sound(Role::FILLER));

        let pattern = session.compile();
        assert_eq!(pattern.onsets().len(), 3);
        assert_eq!(pattern.sample_rate(), 44100);
    }

    #[test]
    fn test_empty_session_defaults() {
        let session = Session::from_yaml("{}", Path::new(".")).unwrap();
        assert_eq!(session.tempo(), 120.0);
        assert_eq!(session.volume(), 1.0);
        assert!(session.pattern().is_empty());
        assert_eq!(session.audio().device(), "default");
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("sounds")).unwrap();
        std::fs::write(
            dir.path().join("sounds").join("click.wav"),
            wav_bytes(1, 48000, &[1000; 64]),
        )
        .unwrap();

        let path = dir.path().join("session.yaml");
        std::fs::write(
            &path,
            r#"
audio:
  device: mock
samples:
  directory: sounds
tempo: 100
pattern:
  - { dur_eighths: 1, role: click }
"#,
        )
        .unwrap();

        let session = Session::load(&path).unwrap();
        let bank = session.load_bank();
        assert_eq!(bank.pcm(Role::Click).len(), 64);
        assert!(bank.pcm(Role::CajonGrave).is_empty());

        let metronome = session.metronome(Arc::new(NullSink)).unwrap();
        assert_eq!(metronome.tempo(), 100.0);
        assert_eq!(metronome.pattern().onsets().len(), 1);
        assert!(!metronome.is_running());
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            Session::load(Path::new("/does/not/exist.yaml")),
            Err(ConfigError::Load(_))
        ));
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_duration("1m").unwrap(), Duration::from_secs(60));
        assert!(matches!(
            parse_duration("soon"),
            Err(ConfigError::Duration(_, _))
        ));
    }
}
