// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::path::Path;

use serde_json::{json, Value};
use ship_logs_core::{
    artifact::SHIPPING_FUNCTION_KEY, CompiledTemplate, FunctionRegistry, LifecycleOrchestrator,
    ResourceStore, Service, ShipLogsConfig, ShipLogsError, Stage,
};

const MANIFEST: &str = r#"
service: orders
provider:
  name: aws
  region: us-east-1
custom:
  shipLogs:
    collectorUrl: https://not-real.not-really-sumologic.com/12345
    function:
      name: orders-log-shipper
      memorySize: 256
functions:
  mock-fn:
    handler: src/handler.main
  mock-fn_2:
    handler: src/handler.other
"#;

fn compiled_template() -> CompiledTemplate {
    CompiledTemplate::from_value(json!({
        "AWSTemplateFormatVersion": "2010-09-09",
        "Resources": {
            "ServerlessDeploymentBucket": { "Type": "AWS::S3::Bucket" },
            "MockFnLogGroup": {
                "Type": "AWS::Logs::LogGroup",
                "Properties": { "LogGroupName": "/aws/lambda/orders-dev-mock-fn" }
            },
            "MockFn2LogGroup": {
                "Type": "AWS::Logs::LogGroup",
                "Properties": { "LogGroupName": "/aws/lambda/orders-dev-mock-fn_2" }
            }
        }
    }))
    .unwrap()
}

fn filter_keys(template: &CompiledTemplate) -> Vec<String> {
    template
        .resources()
        .unwrap()
        .iter()
        .filter(|(_, resource)| resource["Type"] == "AWS::Logs::SubscriptionFilter")
        .map(|(key, _)| key.clone())
        .collect()
}

#[test]
fn test_deploy_from_manifest() {
    figment::Jail::expect_with(|jail| {
        jail.clear_env();
        jail.create_file("serverless.yml", MANIFEST)?;
        let manifest = Path::new("serverless.yml");

        let config = ShipLogsConfig::from_manifest(manifest).unwrap();
        let mut service = Service::from_manifest(manifest).unwrap();
        let mut template = compiled_template();
        let service_path = jail.directory().to_path_buf();
        let mut orchestrator =
            LifecycleOrchestrator::new(config, &service_path, service.deploy_context());

        let mut staged_handler = None;
        let subscribed = orchestrator
            .run(&mut service, &mut template, |_| {
                let handler = service_path.join("sumologicShipping/handler.js");
                staged_handler = Some(std::fs::read_to_string(handler).unwrap());
                Ok::<(), ShipLogsError>(())
            })
            .unwrap();

        assert_eq!(subscribed, 2);
        assert_eq!(orchestrator.stage(), Stage::CleanedUp);
        assert!(staged_handler
            .unwrap()
            .contains("https://not-real.not-really-sumologic.com/12345"));
        assert!(!service_path.join(SHIPPING_FUNCTION_KEY).exists());

        let shipper = &service.functions[SHIPPING_FUNCTION_KEY];
        assert_eq!(shipper.name.as_deref(), Some("orders-log-shipper"));
        assert_eq!(shipper.handler, "sumologicShipping/handler.handler");
        assert_eq!(shipper.properties.get("memorySize"), Some(&json!(256)));

        let resources = template.resources().unwrap();
        assert_eq!(resources.len(), 3 + 4);
        for key in [
            "MockFnSubscriptionFilter",
            "MockFnInvokePermission",
            "MockFn2SubscriptionFilter",
            "MockFn2InvokePermission",
        ] {
            assert!(template.has(key), "missing {key}");
        }
        assert!(!resources
            .keys()
            .any(|key| key.starts_with("SumologicShipping")));
        Ok(())
    });
}

#[test]
fn test_existing_destination_skips_shipping_function() {
    figment::Jail::expect_with(|jail| {
        jail.clear_env();
        jail.create_file("serverless.yml", MANIFEST)?;
        jail.set_env(
            "SHIP_LOGS_ARN",
            "arn:aws:lambda:us-east-1:123456789012:function:mock-log-fn",
        );
        let manifest = Path::new("serverless.yml");

        let config = ShipLogsConfig::from_manifest(manifest).unwrap();
        let mut service = Service::from_manifest(manifest).unwrap();
        let mut template = compiled_template();
        let service_path = jail.directory().to_path_buf();
        let mut orchestrator =
            LifecycleOrchestrator::new(config, &service_path, service.deploy_context());

        orchestrator
            .run(&mut service, &mut template, |_| Ok::<(), ShipLogsError>(()))
            .unwrap();

        assert_eq!(
            service.function_names(),
            vec!["mock-fn".to_string(), "mock-fn_2".to_string()]
        );
        assert!(!service_path.join(SHIPPING_FUNCTION_KEY).exists());
        for key in filter_keys(&template) {
            assert_eq!(
                template.get(&key).unwrap()["Properties"]["DestinationArn"],
                json!("arn:aws:lambda:us-east-1:123456789012:function:mock-log-fn")
            );
        }
        Ok(())
    });
}

#[test]
fn test_collision_leaves_template_untouched_and_cleans_up() {
    figment::Jail::expect_with(|jail| {
        jail.clear_env();
        jail.create_file(
            "serverless.yml",
            r#"
custom:
  shipLogs:
    collectorUrl: https://collector.example.com
functions:
  mock-fn: {}
  mock_fn: {}
"#,
        )?;
        let manifest = Path::new("serverless.yml");

        let config = ShipLogsConfig::from_manifest(manifest).unwrap();
        let mut service = Service::from_manifest(manifest).unwrap();
        let mut template = compiled_template();
        let before = template.clone();
        let service_path = jail.directory().to_path_buf();
        let mut orchestrator =
            LifecycleOrchestrator::new(config, &service_path, service.deploy_context());

        let mut deployed = false;
        let result = orchestrator.run(&mut service, &mut template, |_| {
            deployed = true;
            Ok::<(), ShipLogsError>(())
        });

        assert!(matches!(result, Err(ShipLogsError::NameCollision { .. })));
        assert!(!deployed);
        assert_eq!(template, before);
        assert!(!service_path.join(SHIPPING_FUNCTION_KEY).exists());
        Ok(())
    });
}

#[test]
fn test_redeploy_produces_identical_template() {
    let config = ShipLogsConfig {
        collector_url: Some("https://collector.example.com".to_string()),
        ..Default::default()
    };
    let dir = tempfile::tempdir().unwrap();

    let deploy = |template: &mut CompiledTemplate| -> Value {
        let mut service = Service::default();
        service.insert_function("mock-fn".to_string(), Default::default());
        service.insert_function("mock-fn_2".to_string(), Default::default());
        let mut orchestrator =
            LifecycleOrchestrator::new(config.clone(), dir.path(), service.deploy_context());
        orchestrator
            .run(&mut service, template, |_| Ok::<(), ShipLogsError>(()))
            .unwrap();
        template.as_value().clone()
    };

    let first = deploy(&mut compiled_template());
    let mut redeployed = CompiledTemplate::from_value(first.clone()).unwrap();
    let second = deploy(&mut redeployed);

    assert_eq!(
        serde_json::to_string(&first).unwrap(),
        serde_json::to_string(&second).unwrap()
    );
}
