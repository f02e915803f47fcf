//! Logical cache partitions and their versioned storage names.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// One of the five logical cache stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Partition {
    Static,
    Assets,
    Api,
    Business,
    Dynamic,
}

impl Partition {
    pub const ALL: [Partition; 5] =
        [Partition::Static, Partition::Assets, Partition::Api, Partition::Business, Partition::Dynamic];

    /// Partitions holding data that goes stale quickly.
    pub const DYNAMIC: [Partition; 3] = [Partition::Api, Partition::Business, Partition::Dynamic];

    pub fn as_str(self) -> &'static str {
        match self {
            Partition::Static => "static",
            Partition::Assets => "assets",
            Partition::Api => "api",
            Partition::Business => "business",
            Partition::Dynamic => "dynamic",
        }
    }

    /// Storage name for this partition under a cache version.
    pub fn versioned(self, version: &str) -> String {
        format!("{}-{}", self.as_str(), version)
    }

    /// Recover the logical partition from a storage name, if it is one of ours.
    pub fn from_storage_name(name: &str) -> Option<Partition> {
        let (prefix, version) = name.split_once('-')?;
        if version.is_empty() {
            return None;
        }
        prefix.parse().ok()
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Partition {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "static" => Ok(Partition::Static),
            "assets" => Ok(Partition::Assets),
            "api" => Ok(Partition::Api),
            "business" => Ok(Partition::Business),
            "dynamic" => Ok(Partition::Dynamic),
            other => Err(format!("unknown partition: {other}")),
        }
    }
}
