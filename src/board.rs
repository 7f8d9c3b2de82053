//! Board profiles - per-board upload settings supplied by the caller.
//!
//! The baud rate of a board is configuration, not protocol: the host
//! application owns the table and hands one [`BoardProfile`] to each upload.
//! [`BoardTable::builtin`] covers the common Optiboot boards; tables can
//! also be loaded from JSON:
//!
//! ```
//! use stk500_uploader::board::BoardTable;
//!
//! let table = BoardTable::from_json(r#"{
//!     "uno": { "baud_rate": 115200 },
//!     "custom": { "baud_rate": 19200, "page_size": 64, "signature": [30, 147, 11] }
//! }"#).unwrap();
//!
//! let custom = table.get("custom").unwrap();
//! assert_eq!(custom.name, "custom");
//! assert_eq!(custom.page_size, 64);
//! ```

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Flash page size of the ATmega328P family, in bytes.
pub const DEFAULT_PAGE_SIZE: usize = 128;

/// Bootloader protocol spoken by a board.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolVariant {
    #[default]
    Stk500v1,
}

/// Upload settings for one board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardProfile {
    /// Board identifier (e.g. `"uno"`).
    #[serde(default)]
    pub name: String,
    /// Bootloader baud rate.
    pub baud_rate: u32,
    /// Flash page size in bytes; larger records are split to fit.
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(default)]
    pub protocol: ProtocolVariant,
    /// Expected device signature; checked before programming when set.
    #[serde(default)]
    pub signature: Option<[u8; 3]>,
}

fn default_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}

impl BoardProfile {
    pub fn new(name: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            name: name.into(),
            baud_rate,
            page_size: DEFAULT_PAGE_SIZE,
            protocol: ProtocolVariant::Stk500v1,
            signature: None,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_signature(mut self, signature: [u8; 3]) -> Self {
        self.signature = Some(signature);
        self
    }

    /// Arduino Uno (Optiboot, 115200 baud).
    pub fn uno() -> Self {
        Self::new("uno", 115_200)
    }

    /// Arduino Nano with the new bootloader (115200 baud).
    pub fn nano() -> Self {
        Self::new("nano", 115_200)
    }

    /// Arduino Nano with the old bootloader (57600 baud).
    pub fn nano_old() -> Self {
        Self::new("nano-old", 57_600)
    }

    /// Arduino Duemilanove / Diecimila with ATmega328 (57600 baud).
    pub fn duemilanove() -> Self {
        Self::new("duemilanove", 57_600)
    }

    /// Arduino Pro Mini 3.3V / 8 MHz (57600 baud).
    pub fn pro_mini_8mhz() -> Self {
        Self::new("pro-mini-8mhz", 57_600)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.baud_rate == 0 {
            return Err(ConfigError::Invalid(format!(
                "board '{}': baud_rate must be non-zero",
                self.name
            )));
        }
        if self.page_size == 0 {
            return Err(ConfigError::Invalid(format!(
                "board '{}': page_size must be non-zero",
                self.name
            )));
        }
        Ok(())
    }
}

/// Board id to profile lookup.
#[derive(Debug, Clone, Default)]
pub struct BoardTable {
    boards: HashMap<String, BoardProfile>,
}

impl BoardTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Table with the built-in presets.
    pub fn builtin() -> Self {
        let mut table = Self::new();
        for profile in [
            BoardProfile::uno(),
            BoardProfile::nano(),
            BoardProfile::nano_old(),
            BoardProfile::duemilanove(),
            BoardProfile::pro_mini_8mhz(),
        ] {
            table.insert(profile);
        }
        table
    }

    /// Parse a JSON object of `id -> profile`.
    ///
    /// A profile without a `name` takes its key as name.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let raw: HashMap<String, BoardProfile> = serde_json::from_str(json)?;
        let mut table = Self::new();
        for (id, mut profile) in raw {
            if profile.name.is_empty() {
                profile.name = id.clone();
            }
            profile.validate()?;
            table.boards.insert(id, profile);
        }
        Ok(table)
    }

    /// Serialize the table back to JSON.
    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(&self.boards)?)
    }

    /// Add or replace a profile under its own name.
    pub fn insert(&mut self, profile: BoardProfile) {
        self.boards.insert(profile.name.clone(), profile);
    }

    /// Merge `other` into this table, replacing entries with the same id.
    pub fn extend(&mut self, other: BoardTable) {
        self.boards.extend(other.boards);
    }

    pub fn get(&self, id: &str) -> Option<&BoardProfile> {
        self.boards.get(id)
    }

    /// Like [`get`](Self::get), but an unknown id is an error.
    pub fn require(&self, id: &str) -> Result<&BoardProfile, ConfigError> {
        self.get(id)
            .ok_or_else(|| ConfigError::UnknownBoard(id.to_string()))
    }

    pub fn len(&self) -> usize {
        self.boards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.boards.is_empty()
    }

    /// Known board ids, sorted.
    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.boards.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }
}
