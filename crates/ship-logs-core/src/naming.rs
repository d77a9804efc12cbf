// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Logical id derivation for function scoped resources.
//!
//! CloudFormation logical ids must be alphanumeric. Function names in a
//! service manifest commonly contain dashes and underscores, so every
//! non-alphanumeric character is treated as a word boundary, each word gets
//! an uppercase first letter and the words are concatenated. Names that start
//! with a digit get a `Fn` prefix so every id starts with an uppercase letter:
//!
//! ```
//! use ship_logs_core::naming::{normalize, LogicalIds};
//!
//! assert_eq!(normalize("mock-fn_2").unwrap(), "MockFn2");
//!
//! let ids = LogicalIds::for_function("mock-fn").unwrap();
//! assert_eq!(ids.log_group, "MockFnLogGroup");
//! assert_eq!(ids.filter, "MockFnSubscriptionFilter");
//! assert_eq!(ids.permission, "MockFnInvokePermission");
//! ```

use crate::error::ShipLogsError;

pub const LOG_GROUP_SUFFIX: &str = "LogGroup";
pub const SUBSCRIPTION_FILTER_SUFFIX: &str = "SubscriptionFilter";
pub const INVOKE_PERMISSION_SUFFIX: &str = "InvokePermission";
pub const LAMBDA_FUNCTION_SUFFIX: &str = "LambdaFunction";
pub const DIGIT_PREFIX: &str = "Fn";

/// Converts a raw function name into a fragment usable as a logical id prefix.
///
/// Fails with [`ShipLogsError::InvalidName`] when the name is empty or has no
/// alphanumeric characters at all.
pub fn normalize(raw_name: &str) -> Result<String, ShipLogsError> {
    let mut normalized = String::with_capacity(raw_name.len());
    for word in raw_name
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|word| !word.is_empty())
    {
        let mut chars = word.chars();
        if let Some(first) = chars.next() {
            normalized.push(first.to_ascii_uppercase());
            normalized.push_str(chars.as_str());
        }
    }

    match normalized.chars().next() {
        None => Err(ShipLogsError::InvalidName(raw_name.to_string())),
        Some(first) if first.is_ascii_digit() => Ok(format!("{DIGIT_PREFIX}{normalized}")),
        Some(_) => Ok(normalized),
    }
}

/// Logical ids of the resources that belong to one function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogicalIds {
    /// Normalized function name every other id is derived from
    pub prefix: String,
    pub log_group: String,
    pub filter: String,
    pub permission: String,
    /// Id the host gives the function resource itself
    pub function: String,
}

impl LogicalIds {
    pub fn for_function(name: &str) -> Result<Self, ShipLogsError> {
        let prefix = normalize(name)?;
        Ok(Self {
            log_group: format!("{prefix}{LOG_GROUP_SUFFIX}"),
            filter: format!("{prefix}{SUBSCRIPTION_FILTER_SUFFIX}"),
            permission: format!("{prefix}{INVOKE_PERMISSION_SUFFIX}"),
            function: format!("{prefix}{LAMBDA_FUNCTION_SUFFIX}"),
            prefix,
        })
    }
}
