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
use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;
use tracing::warn;

use crate::bank::{DirectoryAssets, Role};

const DEFAULT_SAMPLES_DIRECTORY: &str = "samples";

/// A YAML representation of where the role sounds live.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct Samples {
    /// Directory holding `<role>.wav` files, relative to the session file.
    directory: Option<String>,

    /// Per-role file overrides, relative to the directory.
    #[serde(default)]
    files: HashMap<String, String>,
}

impl Samples {
    /// Returns the configured directory (default: "samples").
    pub fn directory(&self) -> &str {
        self.directory.as_deref().unwrap_or(DEFAULT_SAMPLES_DIRECTORY)
    }

    /// Builds the asset source, resolving the directory against `base`.
    pub fn assets(&self, base: &Path) -> DirectoryAssets {
        let mut assets = DirectoryAssets::new(base.join(self.directory()));
        for (name, file) in self.files.iter() {
            match Role::from_id(name) {
                Some(role) => assets = assets.with_override(role, file),
                None => warn!(role = name, file, "Ignoring file for unknown role"),
            }
        }
        assets
    }
}

#[cfg(test)]
mod tests {
    use ::config::{Config, File, FileFormat};

    use super::*;

    #[test]
    fn test_assets_paths() {
        let yaml = r#"
            directory: sounds
            files:
              click: hi.wav
              triangle: tri.wav
        "#;

        let samples: Samples = Config::builder()
            .add_source(File::from_str(yaml, FileFormat::Yaml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        let assets = samples.assets(Path::new("/base"));
        assert_eq!(assets.directory(), Path::new("/base/sounds"));
        assert_eq!(
            assets.path_for(Role::Click),
            Path::new("/base/sounds/hi.wav")
        );
        assert_eq!(
            assets.path_for(Role::Cencerro),
            Path::new("/base/sounds/cencerro.wav")
        );
    }

    #[test]
    fn test_default_directory() {
        let samples = Samples::default();
        assert_eq!(samples.directory(), "samples");
    }
}
