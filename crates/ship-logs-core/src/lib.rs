// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Streams every function's CloudWatch logs to an external collector.
//!
//! The crate hooks into the stages of a deploy (see [`lifecycle::Stage`]):
//! it registers and stages a small shipping function, then adds a
//! subscription filter and an invoke permission for every other function to
//! the compiled template, and removes the staged handler once the deploy is
//! over.

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod artifact;
pub mod config;
pub mod error;
pub mod host;
pub mod lifecycle;
pub mod naming;
pub mod resources;
pub mod synthesizer;

pub use config::ShipLogsConfig;
pub use error::ShipLogsError;
pub use host::{DeployContext, FunctionDescriptor, FunctionRegistry, Service};
pub use lifecycle::{LifecycleOrchestrator, Stage};
pub use resources::{CompiledTemplate, ResourceStore};
pub use synthesizer::ResourceSynthesizer;
