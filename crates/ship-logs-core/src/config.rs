// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The `custom.shipLogs` block of a service manifest.
//!
//! ```yaml
//! custom:
//!   shipLogs:
//!     collectorUrl: https://collectors.example.com/receiver/v1/http/abc
//!     filterPattern: "?ERROR ?WARN"
//!     role: arn:aws:iam::123456789012:role/log-shipper
//!     function:
//!       name: ${self:service}-log-shipper
//!       memorySize: 256
//! ```
//!
//! Options are read once per deploy. `SHIP_LOGS_COLLECTOR_URL`, `SHIP_LOGS_ARN`,
//! `SHIP_LOGS_FILTER_PATTERN` and `SHIP_LOGS_ROLE` override the manifest.

use std::path::Path;

use figment::{
    providers::{Env, Format, Yaml},
    Figment,
};
use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};
use tracing::warn;

use crate::error::ShipLogsError;

pub const CONFIG_KEY: &str = "custom.shipLogs";
pub const ENV_PREFIX: &str = "SHIP_LOGS_";

/// CloudWatch Logs matches every event when the pattern is empty.
pub const DEFAULT_FILTER_PATTERN: &str = "";

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default)]
pub struct ShipLogsConfig {
    /// Endpoint the shipping function forwards log events to
    #[serde(rename = "collectorUrl", deserialize_with = "deserialize_optional_string")]
    pub collector_url: Option<String>,
    /// Existing destination; no shipping function is generated when set
    #[serde(deserialize_with = "deserialize_optional_string")]
    pub arn: Option<String>,
    #[serde(rename = "filterPattern", deserialize_with = "deserialize_optional_string")]
    pub filter_pattern: Option<String>,
    /// Execution role of the generated shipping function
    #[serde(deserialize_with = "deserialize_optional_string")]
    pub role: Option<String>,
    /// Merged over the generated shipping function descriptor
    #[serde(rename = "function")]
    pub function_overrides: Option<Value>,
}

impl ShipLogsConfig {
    /// Loads the configuration from a manifest file, then applies environment overrides.
    pub fn from_manifest(path: &Path) -> Result<Self, ShipLogsError> {
        Self::from_figment(Figment::from(Yaml::file(path)))
    }

    /// Loads the configuration from the `custom.shipLogs` section of an already
    /// assembled manifest.
    pub fn from_figment(manifest: Figment) -> Result<Self, ShipLogsError> {
        let mut config: ShipLogsConfig = manifest
            .focus(CONFIG_KEY)
            .extract()
            .map_err(|e| ShipLogsError::InvalidConfig(e.to_string()))?;

        let overrides: EnvOverrides = Figment::from(
            Env::prefixed(ENV_PREFIX).only(&["collector_url", "arn", "filter_pattern", "role"]),
        )
        .extract()
        .map_err(|e| ShipLogsError::InvalidConfig(e.to_string()))?;
        config.apply_env(overrides);

        config.validate()?;
        Ok(config)
    }

    fn apply_env(&mut self, overrides: EnvOverrides) {
        merge_option(&mut self.collector_url, overrides.collector_url);
        merge_option(&mut self.arn, overrides.arn);
        merge_option(&mut self.filter_pattern, overrides.filter_pattern);
        merge_option(&mut self.role, overrides.role);
    }

    pub fn validate(&self) -> Result<(), ShipLogsError> {
        if self.collector_url.is_none() && self.arn.is_none() {
            return Err(ShipLogsError::MissingCollectorUrl);
        }

        match &self.function_overrides {
            None | Some(Value::Object(_)) => Ok(()),
            Some(other) => Err(ShipLogsError::InvalidConfig(format!(
                "custom.shipLogs.function must be a mapping of overrides, got: {other}"
            ))),
        }
    }

    /// Pattern every generated subscription filter uses.
    pub fn filter_pattern(&self) -> &str {
        self.filter_pattern
            .as_deref()
            .unwrap_or(DEFAULT_FILTER_PATTERN)
    }

    pub fn overrides(&self) -> Option<&Map<String, Value>> {
        self.function_overrides.as_ref().and_then(Value::as_object)
    }

    /// Whether an existing destination replaces the generated shipping function.
    pub fn uses_existing_destination(&self) -> bool {
        self.arn.is_some()
    }
}

/// `SHIP_LOGS_*` variables, keyed the way figment emits them.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct EnvOverrides {
    #[serde(deserialize_with = "deserialize_optional_string")]
    collector_url: Option<String>,
    #[serde(deserialize_with = "deserialize_optional_string")]
    arn: Option<String>,
    #[serde(deserialize_with = "deserialize_optional_string")]
    filter_pattern: Option<String>,
    #[serde(deserialize_with = "deserialize_optional_string")]
    role: Option<String>,
}

fn merge_option(target: &mut Option<String>, source: Option<String>) {
    if source.is_some() {
        *target = source;
    }
}

/// Accepts strings and numbers, treats blank strings and null as unset, and
/// ignores any other value (manifests commonly use `false` to disable an option).
/// Environment values made only of digits arrive as numbers.
pub fn deserialize_optional_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                Ok(None)
            } else {
                Ok(Some(trimmed.to_string()))
            }
        }
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => {
            warn!(
                "Failed to parse value, expected a string, got: {}, ignoring",
                other
            );
            Ok(None)
        }
    }
}
