// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Collaborators owned by the deployment host: its function registry and the
//! region/account it deploys into.

use std::collections::BTreeMap;
use std::path::Path;

use figment::{
    providers::{Format, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::error::ShipLogsError;

pub const DEFAULT_REGION: &str = "us-east-1";

/// Deployment descriptor of a single function, as declared under `functions`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FunctionDescriptor {
    /// Deployed function name, when it differs from the registry key
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub handler: String,
    pub events: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    /// Everything else the host understands (memorySize, timeout, ...)
    #[serde(flatten)]
    pub properties: Map<String, Value>,
}

impl FunctionDescriptor {
    /// Shallow merge: every override replaces the top-level field of the same name.
    pub fn apply_overrides(&mut self, overrides: &Map<String, Value>) -> Result<(), ShipLogsError> {
        let mut merged = serde_json::to_value(&*self)
            .map_err(|e| ShipLogsError::InvalidConfig(format!("function overrides: {e}")))?;
        if let Value::Object(fields) = &mut merged {
            for (key, value) in overrides {
                fields.insert(key.clone(), value.clone());
            }
        }
        *self = serde_json::from_value(merged)
            .map_err(|e| ShipLogsError::InvalidConfig(format!("function overrides: {e}")))?;
        Ok(())
    }
}

/// The host's mutable mapping of function key to descriptor.
pub trait FunctionRegistry {
    fn function_names(&self) -> Vec<String>;

    fn contains_function(&self, key: &str) -> bool {
        self.function_names().iter().any(|name| name == key)
    }

    fn insert_function(&mut self, key: String, descriptor: FunctionDescriptor);
}

/// Region and account a deploy targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployContext {
    pub region: String,
    pub account_id: Option<String>,
}

impl Default for DeployContext {
    fn default() -> Self {
        Self::new(DEFAULT_REGION)
    }
}

impl DeployContext {
    pub fn new(region: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            account_id: None,
        }
    }

    #[must_use]
    pub fn with_account_id(mut self, account_id: impl Into<String>) -> Self {
        self.account_id = Some(account_id.into());
        self
    }

    pub fn url_suffix(&self) -> &'static str {
        if self.region.starts_with("cn-") {
            "amazonaws.com.cn"
        } else {
            "amazonaws.com"
        }
    }

    /// Service principal CloudWatch Logs uses to invoke destinations in this region.
    pub fn log_principal(&self) -> String {
        format!("logs.{}.{}", self.region, self.url_suffix())
    }

    /// The deploying account, or a reference CloudFormation resolves at deploy time.
    pub fn source_account(&self) -> Value {
        match &self.account_id {
            Some(account_id) => Value::String(account_id.clone()),
            None => json!({ "Ref": "AWS::AccountId" }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default)]
pub struct ProviderSettings {
    pub region: Option<String>,
}

/// In-memory view of a service manifest, acting as the function registry.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default)]
pub struct Service {
    pub service: String,
    pub provider: ProviderSettings,
    pub functions: BTreeMap<String, FunctionDescriptor>,
}

impl Service {
    pub fn from_manifest(path: &Path) -> Result<Self, ShipLogsError> {
        Self::from_figment(&Figment::from(Yaml::file(path)))
    }

    pub fn from_figment(manifest: &Figment) -> Result<Self, ShipLogsError> {
        manifest
            .extract()
            .map_err(|e| ShipLogsError::InvalidConfig(e.to_string()))
    }

    pub fn deploy_context(&self) -> DeployContext {
        DeployContext::new(
            self.provider
                .region
                .clone()
                .unwrap_or_else(|| DEFAULT_REGION.to_string()),
        )
    }

    /// The `functions` mapping, including anything registered during the deploy.
    pub fn functions_to_json_pretty(&self) -> Result<String, ShipLogsError> {
        serde_json::to_string_pretty(&self.functions)
            .map_err(|e| ShipLogsError::InvalidConfig(e.to_string()))
    }
}

impl FunctionRegistry for Service {
    fn function_names(&self) -> Vec<String> {
        self.functions.keys().cloned().collect()
    }

    fn contains_function(&self, key: &str) -> bool {
        self.functions.contains_key(key)
    }

    fn insert_function(&mut self, key: String, descriptor: FunctionDescriptor) {
        self.functions.insert(key, descriptor);
    }
}
