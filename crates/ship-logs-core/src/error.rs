// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::path::PathBuf;

use crate::lifecycle::Stage;

/// Errors that can occur while augmenting a deployment with log shipping
#[derive(Debug, thiserror::Error)]
pub enum ShipLogsError {
    #[error("Missing required option 'collectorUrl' in custom.shipLogs (set it, or set 'arn' to use an existing destination)")]
    MissingCollectorUrl,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid function name {0:?}: cannot derive a logical id from it")]
    InvalidName(String),

    #[error("Functions {first:?} and {second:?} both normalize to logical id prefix {logical_id:?}")]
    NameCollision {
        first: String,
        second: String,
        logical_id: String,
    },

    #[error("Failed to write log shipping handler to {}: {source}", path.display())]
    ArtifactWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to remove staged log shipping handler at {}: {source}", path.display())]
    ArtifactCleanup {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to synthesize log shipping resources: {0}")]
    Synthesis(String),

    #[error("Cannot enter stage {to:?} from stage {from:?}")]
    InvalidStage { from: Stage, to: Stage },
}

impl ShipLogsError {
    /// Whether the error must abort the deploy. Cleanup failures are only reported.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, ShipLogsError::ArtifactCleanup { .. })
    }
}
