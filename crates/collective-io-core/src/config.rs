// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Layered configuration: defaults, then an optional TOML file, then `CIO_*`
//! environment variables. Layers are merged as JSON before deserialising.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value as J;

use crate::registry::DEFAULT_CAPACITY;

/// Prefix of the environment overlay
pub const ENV_PREFIX: &str = "CIO";

/// Exit/abort code used when the group has to be torn down
pub const DEFAULT_ABORT_CODE: i32 = -1;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct IoConfig {
    /// Concurrent distributed handles per group
    pub registry_capacity: usize,
    /// Rank that performs the real I/O
    pub coordinator: usize,
    /// Turn interception on as part of `join`
    pub enable_on_join: bool,
    /// Join lazily on the first intercepted open
    pub join_on_first_open: bool,
    /// Check every distributed operation against the coordinator's
    pub verify_lockstep: bool,
    /// Code handed to the substrate when the group is aborted
    pub abort_code: i32,
}

impl Default for IoConfig {
    fn default() -> Self {
        Self {
            registry_capacity: DEFAULT_CAPACITY,
            coordinator: 0,
            enable_on_join: true,
            join_on_first_open: false,
            verify_lockstep: false,
            abort_code: DEFAULT_ABORT_CODE,
        }
    }
}

impl IoConfig {
    /// Load defaults, the TOML file at `path` (when given) and the process
    /// environment, in that order of precedence.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(path) => {
                let content = std::fs::read_to_string(path)
                    .with_context(|| format!("reading config file {:?}", path))?;
                Some(parse_toml_to_json(&content).with_context(|| format!("parsing {:?}", path))?)
            }
            None => None,
        };
        Self::from_layers(file, env_overlay_from(None)?)
    }

    /// Resolve the configuration from an optional file layer and an env layer
    pub fn from_layers(file: Option<J>, env: J) -> Result<Self> {
        let mut merged = serde_json::to_value(IoConfig::default())?;
        if let Some(file) = file {
            merge_two_json(&mut merged, file);
        }
        merge_two_json(&mut merged, env);

        let config: IoConfig =
            serde_json::from_value(merged).context("deserializing collective I/O config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.registry_capacity == 0 {
            anyhow::bail!("registry-capacity must be at least 1");
        }
        if u32::try_from(self.registry_capacity).is_err() {
            anyhow::bail!("registry-capacity {} is too large", self.registry_capacity);
        }
        Ok(())
    }
}

/// Parse TOML text into a JSON layer
pub fn parse_toml_to_json(toml_str: &str) -> Result<J> {
    let toml: toml::Value = toml_str.parse::<toml::Value>()?;
    Ok(serde_json::to_value(toml)?)
}

/// Deep-merge `layer` into `base`. Objects merge recursively, everything else
/// replaces, and a null layer keeps the base value.
pub fn merge_two_json(base: &mut J, layer: J) {
    match (base, layer) {
        (J::Object(a), J::Object(b)) => {
            for (k, v) in b {
                merge_two_json(a.entry(k).or_insert(J::Null), v);
            }
        }
        (_, J::Null) => {}
        (a, b) => *a = b,
    }
}

/// Build the environment layer from `CIO_*` variables.
///
/// `CIO_REGISTRY_CAPACITY=8` becomes `{"registry-capacity": 8}`. Values that parse
/// as scalars keep their type, anything else stays a string. `source` replaces
/// the process environment when given.
pub fn env_overlay_from(source: Option<::config::Map<String, String>>) -> Result<J> {
    let built = ::config::Config::builder()
        .add_source(
            ::config::Environment::with_prefix(ENV_PREFIX)
                .convert_case(::config::Case::Kebab)
                .try_parsing(true)
                .source(source),
        )
        .build()
        .context("reading CIO_* environment")?;

    Ok(serde_json::to_value(
        built.try_deserialize::<serde_json::Map<String, J>>()?,
    )?)
}
