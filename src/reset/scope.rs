//! Map partitions and the scope an operation runs over.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Coordinates of the recognised Deep Desert grid (A1 through I9).
static GRID_COORDINATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-I][1-9]$").expect("valid grid pattern"));

/// Image types that are referenced through the link tables. Only these are ever
/// pruned as orphans.
pub const LINKABLE_IMAGE_TYPES: [&str; 2] = ["poi_screenshot", "comment_image"];

/// A map partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MapType {
    DeepDesert,
    HaggaBasin,
}

impl MapType {
    pub const ALL: [MapType; 2] = [MapType::DeepDesert, MapType::HaggaBasin];

    /// SQL-compatible string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DeepDesert => "deep_desert",
            Self::HaggaBasin => "hagga_basin",
        }
    }
}

impl std::fmt::Display for MapType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MapType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "deep_desert" => Ok(Self::DeepDesert),
            "hagga_basin" => Ok(Self::HaggaBasin),
            _ => Err(format!("unknown map type: {s}")),
        }
    }
}

/// One partition, or every partition at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MapScope {
    Single(MapType),
    Combined,
}

impl MapScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Single(map) => map.as_str(),
            Self::Combined => "combined",
        }
    }

    /// The partition to filter POIs by, or `None` for every POI.
    pub fn map_type(&self) -> Option<MapType> {
        match self {
            Self::Single(map) => Some(*map),
            Self::Combined => None,
        }
    }

    /// Grid squares only exist for the Deep Desert.
    pub fn includes_grid(&self) -> bool {
        matches!(self, Self::Single(MapType::DeepDesert) | Self::Combined)
    }

    /// Whether a grid square with `coordinate` belongs to this scope. A combined
    /// scope takes every square; a Deep Desert scope only the recognised grid.
    pub fn owns_grid_square(&self, coordinate: &str) -> bool {
        match self {
            Self::Combined => true,
            Self::Single(MapType::DeepDesert) => is_grid_coordinate(coordinate),
            Self::Single(MapType::HaggaBasin) => false,
        }
    }
}

impl std::fmt::Display for MapScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MapScope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "combined" => Ok(Self::Combined),
            other => other.parse::<MapType>().map(Self::Single),
        }
    }
}

impl From<MapType> for MapScope {
    fn from(map: MapType) -> Self {
        Self::Single(map)
    }
}

pub fn is_grid_coordinate(coordinate: &str) -> bool {
    GRID_COORDINATE.is_match(coordinate)
}
