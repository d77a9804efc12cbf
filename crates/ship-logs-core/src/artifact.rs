// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Staging of the shipping function's handler source.
//!
//! The handler is written to `<service path>/sumologicShipping/handler.js` before
//! the host packages the service, and removed once the deploy is over.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::config::ShipLogsConfig;
use crate::error::ShipLogsError;
use crate::host::FunctionDescriptor;

/// Registry key of the generated shipping function.
pub const SHIPPING_FUNCTION_KEY: &str = "sumologicShipping";
pub const HANDLER_FILE_NAME: &str = "handler.js";
pub const COLLECTOR_URL_PLACEHOLDER: &str = "%collectorUrl%";

/// Source of the shipping function, with [`COLLECTOR_URL_PLACEHOLDER`] in place of the URL.
pub const HANDLER_TEMPLATE: &str = include_str!("../templates/handler.js");

pub fn render_handler(template_source: &str, collector_url: &str) -> String {
    template_source.replace(COLLECTOR_URL_PLACEHOLDER, collector_url)
}

/// Writes the rendered handler into `destination_dir`, creating it if needed.
pub fn stage(
    template_source: &str,
    collector_url: &str,
    destination_dir: &Path,
) -> Result<PathBuf, ShipLogsError> {
    fs::create_dir_all(destination_dir).map_err(|source| ShipLogsError::ArtifactWrite {
        path: destination_dir.to_path_buf(),
        source,
    })?;

    let handler_path = destination_dir.join(HANDLER_FILE_NAME);
    fs::write(&handler_path, render_handler(template_source, collector_url)).map_err(
        |source| ShipLogsError::ArtifactWrite {
            path: handler_path.clone(),
            source,
        },
    )?;

    info!("Staged log shipping handler at {}", handler_path.display());
    Ok(handler_path)
}

/// Removes the staged handler and its directory. Both being absent already is fine.
pub fn unstage(destination_dir: &Path) -> Result<(), ShipLogsError> {
    let handler_path = destination_dir.join(HANDLER_FILE_NAME);
    ignore_missing(fs::remove_file(&handler_path), &handler_path)?;
    ignore_missing(fs::remove_dir(destination_dir), destination_dir)?;
    debug!("Removed staged log shipping handler from {}", destination_dir.display());
    Ok(())
}

fn ignore_missing(result: io::Result<()>, path: &Path) -> Result<(), ShipLogsError> {
    match result {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(ShipLogsError::ArtifactCleanup {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Descriptor of the generated shipping function, or `None` when an existing
/// destination is configured.
pub fn shipping_function(
    config: &ShipLogsConfig,
) -> Result<Option<FunctionDescriptor>, ShipLogsError> {
    if config.uses_existing_destination() {
        return Ok(None);
    }

    let mut descriptor = FunctionDescriptor {
        handler: format!("{SHIPPING_FUNCTION_KEY}/handler.handler"),
        role: config.role.clone(),
        ..Default::default()
    };
    if let Some(overrides) = config.overrides() {
        descriptor.apply_overrides(overrides)?;
    }
    Ok(Some(descriptor))
}

/// Stages into and cleans up a fixed directory under the service path.
#[derive(Debug, Clone)]
pub struct ArtifactStager {
    staging_dir: PathBuf,
}

impl ArtifactStager {
    pub fn new(service_path: impl AsRef<Path>) -> Self {
        Self {
            staging_dir: service_path.as_ref().join(SHIPPING_FUNCTION_KEY),
        }
    }

    pub fn staging_dir(&self) -> &Path {
        &self.staging_dir
    }

    pub fn handler_path(&self) -> PathBuf {
        self.staging_dir.join(HANDLER_FILE_NAME)
    }

    pub fn stage(&self, template_source: &str, collector_url: &str) -> Result<PathBuf, ShipLogsError> {
        stage(template_source, collector_url, &self.staging_dir)
    }

    pub fn unstage(&self) -> Result<(), ShipLogsError> {
        unstage(&self.staging_dir)
    }
}
