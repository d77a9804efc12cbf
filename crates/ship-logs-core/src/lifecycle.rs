// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Sequencing of the deploy stages the host drives.

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::artifact::{shipping_function, ArtifactStager, HANDLER_TEMPLATE, SHIPPING_FUNCTION_KEY};
use crate::config::ShipLogsConfig;
use crate::error::ShipLogsError;
use crate::host::{DeployContext, FunctionRegistry};
use crate::resources::ResourceStore;
use crate::synthesizer::ResourceSynthesizer;

/// Deploy stages, in the order the host enters them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Idle,
    /// The shipping function is registered with the host.
    ProviderConfigured,
    /// The handler source is staged for packaging.
    ArtifactsCreated,
    /// Filters and permissions are merged into the compiled template.
    EventsCompiled,
    Deployed,
    /// The staged handler is removed. Reachable from every other stage.
    CleanedUp,
}

#[derive(Debug)]
pub struct LifecycleOrchestrator {
    config: ShipLogsConfig,
    stager: ArtifactStager,
    synthesizer: ResourceSynthesizer,
    handler_template: String,
    stage: Stage,
}

impl LifecycleOrchestrator {
    pub fn new(config: ShipLogsConfig, service_path: impl AsRef<Path>, context: DeployContext) -> Self {
        Self {
            config,
            stager: ArtifactStager::new(service_path),
            synthesizer: ResourceSynthesizer::new(context),
            handler_template: HANDLER_TEMPLATE.to_string(),
            stage: Stage::Idle,
        }
    }

    #[must_use]
    pub fn with_handler_template(mut self, template_source: impl Into<String>) -> Self {
        self.handler_template = template_source.into();
        self
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn stager(&self) -> &ArtifactStager {
        &self.stager
    }

    fn enter(&mut self, next: Stage) -> Result<(), ShipLogsError> {
        if next <= self.stage {
            return Err(ShipLogsError::InvalidStage {
                from: self.stage,
                to: next,
            });
        }
        debug!("Entering stage {:?}", next);
        self.stage = next;
        Ok(())
    }

    /// Registers the shipping function with the host, unless an existing
    /// destination is configured.
    pub fn configure_provider(
        &mut self,
        registry: &mut dyn FunctionRegistry,
    ) -> Result<(), ShipLogsError> {
        self.enter(Stage::ProviderConfigured)?;
        self.register_shipping_function(registry)
    }

    /// Stages the handler source and registers the shipping function if the
    /// provider stage did not. Returns `None` when an existing destination is
    /// configured.
    pub fn create_artifacts(
        &mut self,
        registry: &mut dyn FunctionRegistry,
    ) -> Result<Option<PathBuf>, ShipLogsError> {
        self.enter(Stage::ArtifactsCreated)?;
        if self.config.uses_existing_destination() {
            return Ok(None);
        }
        let collector_url = self
            .config
            .collector_url
            .as_deref()
            .ok_or(ShipLogsError::MissingCollectorUrl)?;
        let handler_path = self.stager.stage(&self.handler_template, collector_url)?;
        if !registry.contains_function(SHIPPING_FUNCTION_KEY) {
            self.register_shipping_function(registry)?;
        }
        Ok(Some(handler_path))
    }

    /// Fails without touching `store` when the generated shipping function is
    /// not registered, since every filter would target it.
    pub fn compile_events(
        &mut self,
        registry: &dyn FunctionRegistry,
        store: &mut dyn ResourceStore,
    ) -> Result<usize, ShipLogsError> {
        self.enter(Stage::EventsCompiled)?;
        if !self.config.uses_existing_destination()
            && !registry.contains_function(SHIPPING_FUNCTION_KEY)
        {
            return Err(ShipLogsError::Synthesis(format!(
                "log shipping function {SHIPPING_FUNCTION_KEY} is not registered"
            )));
        }
        self.synthesizer
            .synthesize(&registry.function_names(), &self.config, store)
    }

    pub fn mark_deployed(&mut self) -> Result<(), ShipLogsError> {
        self.enter(Stage::Deployed)
    }

    /// Removes the staged handler. Failures are not fatal to the deploy.
    pub fn clean_up(&mut self) -> Result<(), ShipLogsError> {
        self.enter(Stage::CleanedUp)?;
        if self.config.uses_existing_destination() {
            return Ok(());
        }
        self.stager.unstage()
    }

    /// Runs the stages up to and including event compilation, leaving the staged
    /// handler in place for the host to package. On failure the handler is
    /// removed before the error is returned.
    pub fn prepare<R, S>(&mut self, registry: &mut R, store: &mut S) -> Result<usize, ShipLogsError>
    where
        R: FunctionRegistry,
        S: ResourceStore,
    {
        let outcome = self.prepare_stages(registry, store);
        if outcome.is_err() {
            self.clean_up_logged();
        }
        outcome
    }

    /// Drives every stage in order. `deploy` runs between compilation and the
    /// deployed stage. The staged handler is removed whatever the outcome, and a
    /// cleanup failure is only logged.
    ///
    /// Returns the number of functions whose logs are shipped.
    pub fn run<R, S, D, E>(&mut self, registry: &mut R, store: &mut S, deploy: D) -> Result<usize, E>
    where
        R: FunctionRegistry,
        S: ResourceStore,
        D: FnOnce(&S) -> Result<(), E>,
        E: From<ShipLogsError>,
    {
        let outcome = self.run_stages(registry, store, deploy);
        self.clean_up_logged();
        outcome
    }

    fn run_stages<R, S, D, E>(&mut self, registry: &mut R, store: &mut S, deploy: D) -> Result<usize, E>
    where
        R: FunctionRegistry,
        S: ResourceStore,
        D: FnOnce(&S) -> Result<(), E>,
        E: From<ShipLogsError>,
    {
        let subscribed = self.prepare_stages(registry, store)?;
        deploy(&*store)?;
        self.mark_deployed()?;
        Ok(subscribed)
    }

    fn prepare_stages<R, S>(&mut self, registry: &mut R, store: &mut S) -> Result<usize, ShipLogsError>
    where
        R: FunctionRegistry,
        S: ResourceStore,
    {
        self.configure_provider(&mut *registry)?;
        self.create_artifacts(&mut *registry)?;
        self.compile_events(&*registry, &mut *store)
    }

    fn register_shipping_function(
        &self,
        registry: &mut dyn FunctionRegistry,
    ) -> Result<(), ShipLogsError> {
        match shipping_function(&self.config)? {
            Some(descriptor) => {
                info!("Registering log shipping function {}", SHIPPING_FUNCTION_KEY);
                registry.insert_function(SHIPPING_FUNCTION_KEY.to_string(), descriptor);
            }
            None => debug!("Using existing log destination, no shipping function registered"),
        }
        Ok(())
    }

    fn clean_up_logged(&mut self) {
        if let Err(e) = self.clean_up() {
            warn!("{}", e);
        }
    }
}
