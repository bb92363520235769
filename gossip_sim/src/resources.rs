use std::{
    fs, io,
    path::{Path, PathBuf},
    sync::Arc,
};

use bevy::prelude::*;
use serde::Deserialize;
use thiserror::Error;

use crate::archetype_config::load_with_env_paths;
use crate::social::DEFAULT_RELATIONSHIP_EDGE_THRESHOLD;
use crate::spread::SpreadSettings;

pub const BUILTIN_GOSSIP_CONFIG: &str = include_str!("data/gossip_config.json");

/// Tunables for the gossip engine.
#[derive(Resource, Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct GossipConfig {
    pub seed: u64,
    /// Probability an exposed crew member believes rather than denies.
    pub believe_chance: f32,
    pub relationship_edge_threshold: f32,
    /// Relationship weight used when neither side has a score for the other.
    pub default_relationship_weight: f32,
    /// Effect scaling at zero spread.
    pub spread_floor: f32,
    /// Share of the primary scaling applied to cascade effects.
    pub cascade_factor: f32,
    pub max_active_instances: usize,
    pub triggers_enabled: bool,
}

impl Default for GossipConfig {
    fn default() -> Self {
        Self {
            seed: 0x5eed_c0de,
            believe_chance: 0.7,
            relationship_edge_threshold: DEFAULT_RELATIONSHIP_EDGE_THRESHOLD,
            default_relationship_weight: 0.5,
            spread_floor: 0.5,
            cascade_factor: 0.5,
            max_active_instances: 64,
            triggers_enabled: true,
        }
    }
}

impl GossipConfig {
    pub fn builtin() -> Arc<Self> {
        Arc::new(
            Self::from_json_str(BUILTIN_GOSSIP_CONFIG)
                .expect("builtin gossip config should validate"),
        )
    }

    pub fn from_json_str(json: &str) -> Result<Self, GossipConfigError> {
        let config: GossipConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, GossipConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| GossipConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&contents)
    }

    pub fn spread_settings(&self) -> SpreadSettings {
        SpreadSettings {
            believe_chance: self.believe_chance,
            default_relationship_weight: self.default_relationship_weight,
        }
    }

    fn validate(&self) -> Result<(), GossipConfigError> {
        let probabilities = [
            ("believe_chance", self.believe_chance),
            ("spread_floor", self.spread_floor),
            ("cascade_factor", self.cascade_factor),
        ];
        for (field, value) in probabilities {
            if !(0.0..=1.0).contains(&value) {
                return Err(GossipConfigError::OutOfRange { field, value });
            }
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum GossipConfigError {
    #[error("failed to parse gossip config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("failed to read gossip config from {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("gossip config field {field} = {value} is outside [0, 1]")]
    OutOfRange { field: &'static str, value: f32 },
}

#[derive(Resource, Debug, Clone)]
pub struct GossipConfigMetadata {
    path: Option<PathBuf>,
}

impl GossipConfigMetadata {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self { path }
    }

    pub fn path(&self) -> Option<&PathBuf> {
        self.path.as_ref()
    }
}

pub fn load_gossip_config_from_env() -> (Arc<GossipConfig>, GossipConfigMetadata) {
    load_with_env_paths(
        "GOSSIP_CONFIG_PATH",
        "gossip_config",
        GossipConfig::builtin,
        GossipConfig::from_file,
        GossipConfigMetadata::new,
    )
}

/// Tracks total simulation ticks elapsed.
#[derive(Resource, Default, Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimulationTick(pub u64);
