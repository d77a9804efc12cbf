// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use std::{env, fs, path::PathBuf, process};

use anyhow::{bail, Context};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use ship_logs_core::{
    CompiledTemplate, DeployContext, LifecycleOrchestrator, Service, ShipLogsConfig,
};

const DEFAULT_MANIFEST: &str = "serverless.yml";
const DEFAULT_TEMPLATE: &str = ".serverless/cloudformation-template-update-stack.json";
const DEFAULT_FUNCTIONS_OUTPUT: &str = ".serverless/ship-logs-functions.json";

/// `package` runs before the host packages and deploys the service, `cleanup`
/// once the deploy has finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Package,
    Cleanup,
}

impl Command {
    fn from_args(mut args: impl Iterator<Item = String>) -> anyhow::Result<Self> {
        match args.next().as_deref() {
            None | Some("package") => Ok(Command::Package),
            Some("cleanup") => Ok(Command::Cleanup),
            Some(other) => bail!("unknown command {other}, expected package or cleanup"),
        }
    }
}

#[derive(Debug, PartialEq)]
struct Settings {
    service_path: PathBuf,
    manifest: PathBuf,
    template: PathBuf,
    output: PathBuf,
    functions_output: PathBuf,
    log_level: String,
}

impl Settings {
    fn from_env() -> Self {
        let service_path = env::var("SHIP_LOGS_SERVICE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("."));
        let manifest = env::var("SHIP_LOGS_MANIFEST")
            .map(PathBuf::from)
            .unwrap_or_else(|_| service_path.join(DEFAULT_MANIFEST));
        let template = env::var("SHIP_LOGS_TEMPLATE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| service_path.join(DEFAULT_TEMPLATE));
        // the template is augmented in place unless told otherwise
        let output = env::var("SHIP_LOGS_OUTPUT")
            .map(PathBuf::from)
            .unwrap_or_else(|_| template.clone());
        let functions_output = env::var("SHIP_LOGS_FUNCTIONS_OUTPUT")
            .map(PathBuf::from)
            .unwrap_or_else(|_| service_path.join(DEFAULT_FUNCTIONS_OUTPUT));
        let log_level = env::var("SHIP_LOGS_LOG_LEVEL")
            .map(|val| val.to_lowercase())
            .unwrap_or_else(|_| "info".to_string());

        Self {
            service_path,
            manifest,
            template,
            output,
            functions_output,
            log_level,
        }
    }
}

pub fn main() {
    let settings = Settings::from_env();

    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_new(&settings.log_level).unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_level(true)
        .with_thread_names(false)
        .with_thread_ids(false)
        .with_line_number(false)
        .with_file(false)
        .with_target(true)
        .without_time()
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("setting default subscriber failed: {e}");
    }

    debug!("Logging subsystem enabled");

    let outcome = Command::from_args(env::args().skip(1)).and_then(|command| match command {
        Command::Package => package(&settings),
        Command::Cleanup => cleanup(&settings),
    });
    if let Err(e) = outcome {
        error!("Log shipping setup failed: {e:#}");
        process::exit(1);
    }
}

/// Registers the shipping function, stages its handler and augments the
/// template. The handler stays staged for the host to package; the updated
/// function registry is written next to the template.
fn package(settings: &Settings) -> anyhow::Result<()> {
    let config = ShipLogsConfig::from_manifest(&settings.manifest)
        .with_context(|| format!("reading custom.shipLogs from {}", settings.manifest.display()))?;
    let mut service = Service::from_manifest(&settings.manifest)
        .with_context(|| format!("reading functions from {}", settings.manifest.display()))?;

    let raw = fs::read_to_string(&settings.template)
        .with_context(|| format!("reading compiled template {}", settings.template.display()))?;
    let mut template = CompiledTemplate::from_json_str(&raw)
        .with_context(|| format!("parsing compiled template {}", settings.template.display()))?;

    let mut orchestrator = LifecycleOrchestrator::new(
        config,
        &settings.service_path,
        service.deploy_context(),
    );
    let subscribed = orchestrator.prepare(&mut service, &mut template)?;

    if let Err(e) = write_outputs(settings, &service, &template) {
        if let Err(cleanup_error) = orchestrator.clean_up() {
            warn!("{}", cleanup_error);
        }
        return Err(e);
    }

    info!(
        "Shipping logs of {} function(s), template written to {}, functions written to {}",
        subscribed,
        settings.output.display(),
        settings.functions_output.display()
    );
    Ok(())
}

fn write_outputs(
    settings: &Settings,
    service: &Service,
    template: &CompiledTemplate,
) -> anyhow::Result<()> {
    for (path, contents) in [
        (&settings.output, template.to_json_pretty()?),
        (&settings.functions_output, service.functions_to_json_pretty()?),
    ] {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating directory {}", parent.display()))?;
        }
        fs::write(path, contents).with_context(|| format!("writing {}", path.display()))?;
    }
    Ok(())
}

/// Removes the handler staged by `package`.
fn cleanup(settings: &Settings) -> anyhow::Result<()> {
    let config = ShipLogsConfig::from_manifest(&settings.manifest)
        .with_context(|| format!("reading custom.shipLogs from {}", settings.manifest.display()))?;
    let mut orchestrator =
        LifecycleOrchestrator::new(config, &settings.service_path, DeployContext::default());
    orchestrator.clean_up()?;
    info!("Removed staged log shipping handler");
    Ok(())
}
