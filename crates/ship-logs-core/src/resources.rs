// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Compiled template access and the resource bodies merged into it.

use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::error::ShipLogsError;

pub const RESOURCES_KEY: &str = "Resources";
pub const PERMISSION_TYPE: &str = "AWS::Lambda::Permission";
pub const SUBSCRIPTION_FILTER_TYPE: &str = "AWS::Logs::SubscriptionFilter";
pub const INVOKE_ACTION: &str = "lambda:InvokeFunction";

pub fn fn_ref(logical_id: &str) -> Value {
    json!({ "Ref": logical_id })
}

pub fn fn_get_att(logical_id: &str, attribute: &str) -> Value {
    json!({ "Fn::GetAtt": [logical_id, attribute] })
}

/// Access to the host's resource map.
///
/// `merge` replaces whole top-level entries and either applies every entry or
/// none of them.
pub trait ResourceStore {
    fn get(&self, logical_id: &str) -> Option<&Value>;

    fn has(&self, logical_id: &str) -> bool {
        self.get(logical_id).is_some()
    }

    fn merge(&mut self, resources: Map<String, Value>) -> Result<(), ShipLogsError>;
}

impl ResourceStore for Map<String, Value> {
    fn get(&self, logical_id: &str) -> Option<&Value> {
        Map::get(self, logical_id)
    }

    fn merge(&mut self, resources: Map<String, Value>) -> Result<(), ShipLogsError> {
        for (logical_id, resource) in resources {
            self.insert(logical_id, resource);
        }
        Ok(())
    }
}

/// A compiled CloudFormation template.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledTemplate {
    body: Value,
}

impl Default for CompiledTemplate {
    fn default() -> Self {
        Self {
            body: json!({
                "AWSTemplateFormatVersion": "2010-09-09",
                "Resources": {}
            }),
        }
    }
}

impl CompiledTemplate {
    pub fn from_value(body: Value) -> Result<Self, ShipLogsError> {
        if !body.is_object() {
            return Err(ShipLogsError::Synthesis(
                "compiled template must be a JSON object".to_string(),
            ));
        }
        Ok(Self { body })
    }

    pub fn from_json_str(raw: &str) -> Result<Self, ShipLogsError> {
        let body = serde_json::from_str(raw).map_err(|e| {
            ShipLogsError::Synthesis(format!("compiled template is not valid JSON: {e}"))
        })?;
        Self::from_value(body)
    }

    pub fn resources(&self) -> Option<&Map<String, Value>> {
        self.body.get(RESOURCES_KEY).and_then(Value::as_object)
    }

    pub fn as_value(&self) -> &Value {
        &self.body
    }

    pub fn to_json_pretty(&self) -> Result<String, ShipLogsError> {
        serde_json::to_string_pretty(&self.body)
            .map_err(|e| ShipLogsError::Synthesis(e.to_string()))
    }
}

impl ResourceStore for CompiledTemplate {
    fn get(&self, logical_id: &str) -> Option<&Value> {
        self.resources()?.get(logical_id)
    }

    fn merge(&mut self, resources: Map<String, Value>) -> Result<(), ShipLogsError> {
        let body = self.body.as_object_mut().ok_or_else(|| {
            ShipLogsError::Synthesis("compiled template must be a JSON object".to_string())
        })?;
        let existing = body
            .entry(RESOURCES_KEY)
            .or_insert_with(|| Value::Object(Map::new()))
            .as_object_mut()
            .ok_or_else(|| {
                ShipLogsError::Synthesis(format!(
                    "compiled template {RESOURCES_KEY} must be a JSON object"
                ))
            })?;

        existing.merge(resources)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Resource<P> {
    #[serde(rename = "Type")]
    pub resource_type: &'static str,
    pub properties: P,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
}

impl<P: Serialize> Resource<P> {
    pub fn to_value(&self) -> Result<Value, ShipLogsError> {
        serde_json::to_value(self).map_err(|e| {
            ShipLogsError::Synthesis(format!("failed to serialize {}: {e}", self.resource_type))
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct PermissionProperties {
    pub function_name: Value,
    pub action: String,
    pub principal: String,
    pub source_arn: Value,
    pub source_account: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct SubscriptionFilterProperties {
    pub destination_arn: Value,
    pub filter_pattern: String,
    pub log_group_name: Value,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_intrinsic_functions() {
        assert_eq!(fn_ref("MockFnLogGroup"), json!({ "Ref": "MockFnLogGroup" }));
        assert_eq!(
            fn_get_att("MockFnLogGroup", "Arn"),
            json!({ "Fn::GetAtt": ["MockFnLogGroup", "Arn"] })
        );
    }

    #[test]
    fn test_merge_replaces_whole_entries() {
        let mut template = CompiledTemplate::from_value(json!({
            "Resources": {
                "Unrelated": { "Type": "AWS::S3::Bucket" },
                "MockFnSubscriptionFilter": {
                    "Type": "AWS::Logs::SubscriptionFilter",
                    "Properties": { "Stale": true, "FilterPattern": "old" }
                }
            }
        }))
        .unwrap();

        let mut update = Map::new();
        update.insert(
            "MockFnSubscriptionFilter".to_string(),
            json!({ "Type": "AWS::Logs::SubscriptionFilter", "Properties": { "FilterPattern": "" } }),
        );
        template.merge(update).unwrap();

        assert_eq!(
            template.get("MockFnSubscriptionFilter"),
            Some(&json!({ "Type": "AWS::Logs::SubscriptionFilter", "Properties": { "FilterPattern": "" } }))
        );
        assert_eq!(
            template.get("Unrelated"),
            Some(&json!({ "Type": "AWS::S3::Bucket" }))
        );
    }

    #[test]
    fn test_merge_creates_missing_resources_section() {
        let mut template =
            CompiledTemplate::from_value(json!({ "AWSTemplateFormatVersion": "2010-09-09" }))
                .unwrap();
        assert!(!template.has("A"));

        let mut update = Map::new();
        update.insert("A".to_string(), json!({ "Type": "AWS::SNS::Topic" }));
        template.merge(update).unwrap();

        assert!(template.has("A"));
        assert_eq!(template.resources().unwrap().len(), 1);
    }

    #[test]
    fn test_merge_into_malformed_resources_fails() {
        let mut template = CompiledTemplate::from_value(json!({ "Resources": "oops" })).unwrap();
        let mut update = Map::new();
        update.insert("A".to_string(), json!({}));
        assert!(matches!(
            template.merge(update),
            Err(ShipLogsError::Synthesis(_))
        ));
        assert_eq!(template.as_value(), &json!({ "Resources": "oops" }));
    }

    #[test]
    fn test_template_must_be_an_object() {
        assert!(CompiledTemplate::from_json_str("[]").is_err());
        assert!(CompiledTemplate::from_json_str("{ not json").is_err());
        assert!(CompiledTemplate::from_json_str(r#"{"Resources": {}}"#).is_ok());
    }

    #[test]
    fn test_resource_serialization_layout() {
        let filter = Resource {
            resource_type: SUBSCRIPTION_FILTER_TYPE,
            properties: SubscriptionFilterProperties {
                destination_arn: json!("arn:aws:lambda:us-east-1:123456789012:function:shipper"),
                filter_pattern: String::new(),
                log_group_name: fn_ref("MockFnLogGroup"),
            },
            depends_on: vec!["MockFnInvokePermission".to_string()],
        };

        assert_eq!(
            filter.to_value().unwrap(),
            json!({
                "Type": "AWS::Logs::SubscriptionFilter",
                "Properties": {
                    "DestinationArn": "arn:aws:lambda:us-east-1:123456789012:function:shipper",
                    "FilterPattern": "",
                    "LogGroupName": { "Ref": "MockFnLogGroup" }
                },
                "DependsOn": ["MockFnInvokePermission"]
            })
        );
    }
}
