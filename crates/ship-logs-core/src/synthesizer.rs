// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Builds the subscription filter and invoke permission of every function and
//! merges them into the compiled template.
//!
//! Each function gets its own permission, scoped by `SourceArn` to that
//! function's log group, and its filter depends on it:
//!
//! ```text
//! MockFnInvokePermission   <- DependsOn --  MockFnSubscriptionFilter
//!   SourceArn: MockFnLogGroup.Arn             LogGroupName: Ref MockFnLogGroup
//!   FunctionName: <destination>               DestinationArn: <destination>
//! ```

use std::collections::{BTreeMap, BTreeSet};

use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::artifact::SHIPPING_FUNCTION_KEY;
use crate::config::ShipLogsConfig;
use crate::error::ShipLogsError;
use crate::host::DeployContext;
use crate::naming::LogicalIds;
use crate::resources::{
    fn_get_att, fn_ref, PermissionProperties, Resource, ResourceStore,
    SubscriptionFilterProperties, INVOKE_ACTION, PERMISSION_TYPE, SUBSCRIPTION_FILTER_TYPE,
};

/// Fields every function's permission shares. Each function gets its own copy.
#[derive(Debug, Clone)]
struct PermissionTemplate {
    function_name: Value,
    principal: String,
    source_account: Value,
}

impl PermissionTemplate {
    fn instantiate(&self, ids: &LogicalIds) -> Resource<PermissionProperties> {
        Resource {
            resource_type: PERMISSION_TYPE,
            properties: PermissionProperties {
                function_name: self.function_name.clone(),
                action: INVOKE_ACTION.to_string(),
                principal: self.principal.clone(),
                source_arn: fn_get_att(&ids.log_group, "Arn"),
                source_account: self.source_account.clone(),
            },
            depends_on: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResourceSynthesizer {
    context: DeployContext,
}

impl ResourceSynthesizer {
    pub fn new(context: DeployContext) -> Self {
        Self { context }
    }

    /// The configured destination, or the generated shipping function's ARN.
    pub fn destination_arn(&self, config: &ShipLogsConfig) -> Result<Value, ShipLogsError> {
        destination(config, &shipping_function_ids()?)
    }

    /// Builds every resource for `function_names` without touching any store.
    ///
    /// The generated shipping function is skipped. Fails if two functions would
    /// share logical ids.
    pub fn build(
        &self,
        function_names: &[String],
        config: &ShipLogsConfig,
    ) -> Result<Map<String, Value>, ShipLogsError> {
        self.build_with(function_names, config, &shipping_function_ids()?)
    }

    fn build_with(
        &self,
        function_names: &[String],
        config: &ShipLogsConfig,
        shipping: &LogicalIds,
    ) -> Result<Map<String, Value>, ShipLogsError> {
        let destination_arn = destination(config, shipping)?;
        let template = PermissionTemplate {
            function_name: destination_arn.clone(),
            principal: self.context.log_principal(),
            source_account: self.context.source_account(),
        };
        let filter_pattern = config.filter_pattern();

        // normalized prefix -> raw function name that claimed it
        let mut claimed: BTreeMap<String, &str> = BTreeMap::new();
        let shipping_function_generated = !config.uses_existing_destination();
        if shipping_function_generated {
            claimed.insert(shipping.prefix.clone(), SHIPPING_FUNCTION_KEY);
        }

        let mut seen = BTreeSet::new();
        let mut resources = Map::new();
        for name in function_names {
            if !seen.insert(name.as_str()) {
                continue;
            }
            if shipping_function_generated && name == SHIPPING_FUNCTION_KEY {
                continue;
            }

            let ids = LogicalIds::for_function(name)?;
            if let Some(first) = claimed.get(&ids.prefix) {
                return Err(ShipLogsError::NameCollision {
                    first: (*first).to_string(),
                    second: name.clone(),
                    logical_id: ids.prefix,
                });
            }
            debug!("Subscribing log group {} of function {}", ids.log_group, name);

            let permission = template.instantiate(&ids);
            let filter = Resource {
                resource_type: SUBSCRIPTION_FILTER_TYPE,
                properties: SubscriptionFilterProperties {
                    destination_arn: destination_arn.clone(),
                    filter_pattern: filter_pattern.to_string(),
                    log_group_name: fn_ref(&ids.log_group),
                },
                depends_on: vec![ids.permission.clone()],
            };

            resources.insert(ids.permission.clone(), permission.to_value()?);
            resources.insert(ids.filter.clone(), filter.to_value()?);
            claimed.insert(ids.prefix, name);
        }

        Ok(resources)
    }

    /// Builds the resources and merges them into `store`. Nothing is merged
    /// unless every function could be processed.
    ///
    /// Returns the number of functions whose logs are now shipped.
    pub fn synthesize(
        &self,
        function_names: &[String],
        config: &ShipLogsConfig,
        store: &mut dyn ResourceStore,
    ) -> Result<usize, ShipLogsError> {
        let shipping = shipping_function_ids()?;
        let resources = self.build_with(function_names, config, &shipping)?;
        let subscribed = resources.len() / 2;

        if !config.uses_existing_destination() && !store.has(&shipping.function) {
            warn!(
                "Destination function {} is not in the compiled template yet",
                shipping.function
            );
        }
        for log_group in resources
            .values()
            .filter_map(|resource| resource.pointer("/Properties/LogGroupName/Ref"))
            .filter_map(Value::as_str)
        {
            if !store.has(log_group) {
                debug!("Log group {} is not in the compiled template yet", log_group);
            }
        }

        store.merge(resources)?;
        info!(
            "Added log subscription filters for {} function(s) in {}",
            subscribed, self.context.region
        );
        Ok(subscribed)
    }
}

fn shipping_function_ids() -> Result<LogicalIds, ShipLogsError> {
    LogicalIds::for_function(SHIPPING_FUNCTION_KEY)
}

fn destination(config: &ShipLogsConfig, shipping: &LogicalIds) -> Result<Value, ShipLogsError> {
    match (&config.arn, &config.collector_url) {
        (Some(arn), _) => Ok(Value::String(arn.clone())),
        (None, Some(_)) => Ok(fn_get_att(&shipping.function, "Arn")),
        (None, None) => Err(ShipLogsError::MissingCollectorUrl),
    }
}
