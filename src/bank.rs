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

//! Timbre roles and the immutable bank of decoded sounds behind them.
//!
//! The bank is loaded once, at initialization, and then shared read-only with
//! the render thread.

use std::collections::HashMap;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::pcm;

/// A percussive timbre. Each role maps to exactly one sound and one base gain.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Role {
    /// Low cajón stroke.
    CajonGrave,
    /// Soft cajón fill stroke. Unknown role names fall back to this one.
    CajonRelleno,
    /// High cajón slap.
    CajonAgudo,
    /// Cowbell.
    Cencerro,
    /// Plain click.
    Click,
}

impl Role {
    /// Number of roles.
    pub const COUNT: usize = 5;

    /// All roles, in bank order.
    pub const ALL: [Role; Role::COUNT] = [
        Role::CajonGrave,
        Role::CajonRelleno,
        Role::CajonAgudo,
        Role::Cencerro,
        Role::Click,
    ];

    /// The role used for anything that isn't recognized.
    pub const FILLER: Role = Role::CajonRelleno;

    /// Stable identifier, also used as the asset file stem.
    pub fn id(self) -> &'static str {
        match self {
            Role::CajonGrave => "cajon_grave",
            Role::CajonRelleno => "cajon_relleno",
            Role::CajonAgudo => "cajon_agudo",
            Role::Cencerro => "cencerro",
            Role::Click => "click",
        }
    }

    /// Static gain applied to every voice of this role.
    pub fn base_gain(self) -> f32 {
        match self {
            Role::CajonGrave => 1.0,
            Role::CajonRelleno => 0.8,
            Role::CajonAgudo => 0.9,
            Role::Cencerro => 0.85,
            Role::Click => 1.0,
        }
    }

    /// Looks up a role by identifier. The older bridge names (`clave`,
    /// `accent`, `normal`, `pulse`) are accepted too.
    pub fn from_id(id: &str) -> Option<Role> {
        match id.trim().to_ascii_lowercase().as_str() {
            "cajon_grave" => Some(Role::CajonGrave),
            "cajon_relleno" | "normal" | "pulse" => Some(Role::CajonRelleno),
            "cajon_agudo" | "accent" => Some(Role::CajonAgudo),
            "cencerro" => Some(Role::Cencerro),
            "click" | "clave" => Some(Role::Click),
            _ => None,
        }
    }

    /// Resolves a role name, using the filler role for unknown names.
    pub fn resolve(id: &str) -> Role {
        Role::from_id(id).unwrap_or_else(|| {
            debug!(role = id, fallback = Role::FILLER.id(), "Unknown role");
            Role::FILLER
        })
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// Supplies raw container bytes for each role.
pub trait AssetSource {
    /// Loads the sound file for the given role.
    fn load(&self, role: Role) -> io::Result<Vec<u8>>;
}

impl AssetSource for HashMap<Role, Vec<u8>> {
    fn load(&self, role: Role) -> io::Result<Vec<u8>> {
        self.get(&role).cloned().ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("no asset for {}", role))
        })
    }
}

/// Reads `<directory>/<role-id>.wav`, or an explicit per-role path.
#[derive(Clone, Debug)]
pub struct DirectoryAssets {
    directory: PathBuf,
    overrides: HashMap<Role, PathBuf>,
}

impl DirectoryAssets {
    /// Creates a directory-backed asset source.
    pub fn new(directory: impl Into<PathBuf>) -> DirectoryAssets {
        DirectoryAssets {
            directory: directory.into(),
            overrides: HashMap::new(),
        }
    }

    /// Uses `path` for `role` instead of the default file name. Relative paths
    /// are resolved against the asset directory.
    pub fn with_override(mut self, role: Role, path: impl Into<PathBuf>) -> DirectoryAssets {
        self.overrides.insert(role, path.into());
        self
    }

    /// Returns the path that will be read for the role.
    pub fn path_for(&self, role: Role) -> PathBuf {
        match self.overrides.get(&role) {
            Some(path) => self.directory.join(path),
            None => self.directory.join(format!("{}.wav", role.id())),
        }
    }

    /// Returns the asset directory.
    pub fn directory(&self) -> &Path {
        &self.directory
    }
}

impl AssetSource for DirectoryAssets {
    fn load(&self, role: Role) -> io::Result<Vec<u8>> {
        std::fs::read(self.path_for(role))
    }
}

/// Decoded sound and gain for a single role.
#[derive(Clone, Debug)]
struct BankEntry {
    pcm: Vec<i16>,
    gain: f32,
}

/// Role → sound mapping, immutable after loading.
#[derive(Clone, Debug)]
pub struct SampleBank {
    entries: [BankEntry; Role::COUNT],
}

impl Default for SampleBank {
    /// Every role silent, at its base gain.
    fn default() -> Self {
        SampleBank {
            entries: Role::ALL.map(|role| BankEntry {
                pcm: Vec::new(),
                gain: role.base_gain(),
            }),
        }
    }
}

impl SampleBank {
    /// Loads and decodes every role from the asset source. Roles that fail
    /// to load or decode are left silent.
    pub fn load(assets: &dyn AssetSource) -> SampleBank {
        let mut bank = SampleBank::default();
        for role in Role::ALL {
            let pcm = match assets.load(role) {
                Ok(bytes) => pcm::decode(&bytes),
                Err(e) => {
                    warn!(role = role.id(), error = %e, "Unable to load sound, role will be silent");
                    Vec::new()
                }
            };
            bank.entries[role.index()].pcm = pcm;
        }

        info!(
            roles = Role::COUNT,
            memory_kb = bank.memory_size() / 1024,
            "Sample bank loaded"
        );
        bank
    }

    /// Builds a bank directly from decoded samples. Missing roles are silent.
    pub fn from_samples(samples: HashMap<Role, Vec<i16>>) -> SampleBank {
        let mut bank = SampleBank::default();
        for (role, pcm) in samples {
            bank.entries[role.index()].pcm = pcm;
        }
        bank
    }

    /// The decoded samples for a role.
    pub fn pcm(&self, role: Role) -> &[i16] {
        &self.entries[role.index()].pcm
    }

    /// The static gain voices of a role are scaled by.
    pub fn base_gain(&self, role: Role) -> f32 {
        self.entries[role.index()].gain
    }

    /// Memory used by the decoded samples, in bytes.
    pub fn memory_size(&self) -> usize {
        self.entries
            .iter()
            .map(|e| e.pcm.len() * std::mem::size_of::<i16>())
            .sum()
    }
}
