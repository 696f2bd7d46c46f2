//! Test utilities for unit testing reconcilers
//!
//! This module provides helpers for creating test data and setting up test scenarios.

use std::collections::BTreeMap;

use crds::constants::DEFAULT_REPOSITORY_NAME;
use crds::*;
use fleet_client::{
    Artifact, Chart, ChartMetadata, HelmChart, HelmChartStatus, HelmReleaseStatus, MockChartLoader,
    MockFleetClient,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

use crate::config::FleetConfig;
use crate::reconciler::Reconciler;

pub const SYSTEM_NAMESPACE: &str = "fleet-system";

/// Reconciler backed by mocks; the returned mocks share state with it
pub fn create_test_reconciler() -> (Reconciler, MockFleetClient, MockChartLoader) {
    create_test_reconciler_with_config(FleetConfig::default())
}

pub fn create_test_reconciler_with_config(config: FleetConfig) -> (Reconciler, MockFleetClient, MockChartLoader) {
    let client = MockFleetClient::new();
    let charts = MockChartLoader::new();
    let reconciler = Reconciler::new(client.clone(), charts.clone(), config);
    (reconciler, client, charts)
}

fn test_metadata(name: &str, namespace: &str) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: Some(namespace.to_string()),
        uid: Some(format!("{namespace}-{name}-uid")),
        generation: Some(1),
        ..Default::default()
    }
}

fn helm_spec(chart_name: &str) -> TemplateSpecCommon {
    TemplateSpecCommon {
        helm: HelmSpec {
            chart_name: Some(chart_name.to_string()),
            chart_version: Some("0.1.0".to_string()),
            chart_ref: None,
        },
        ..Default::default()
    }
}

/// Helper to create a test ClusterTemplate pointing at a chart name
pub fn create_test_cluster_template(name: &str, namespace: &str, chart_name: &str) -> ClusterTemplate {
    ClusterTemplate {
        metadata: test_metadata(name, namespace),
        spec: ClusterTemplateSpec {
            template: helm_spec(chart_name),
        },
        status: None,
    }
}

/// Helper to create a ServiceTemplate already marked valid
pub fn create_valid_service_template(name: &str, namespace: &str) -> ServiceTemplate {
    ServiceTemplate {
        metadata: test_metadata(name, namespace),
        spec: ServiceTemplateSpec {
            template: helm_spec(name),
        },
        status: Some(valid_status(name, namespace, Providers::default())),
    }
}

/// Helper to create a ProviderTemplate already marked valid
pub fn create_valid_provider_template(name: &str, namespace: &str, providers: Providers) -> ProviderTemplate {
    ProviderTemplate {
        metadata: test_metadata(name, namespace),
        spec: ProviderTemplateSpec {
            template: helm_spec(name),
        },
        status: Some(valid_status(name, namespace, providers)),
    }
}

/// Helper to create a ClusterTemplate already marked valid
pub fn create_valid_cluster_template(name: &str, namespace: &str, providers: Providers) -> ClusterTemplate {
    ClusterTemplate {
        metadata: test_metadata(name, namespace),
        spec: ClusterTemplateSpec {
            template: helm_spec(name),
        },
        status: Some(valid_status(name, namespace, providers)),
    }
}

/// Status of a template whose chart is the HelmChart of the same name
pub fn valid_status(name: &str, namespace: &str, providers: Providers) -> TemplateStatus {
    TemplateStatus {
        valid: true,
        chart_ref: Some(ChartReference::helm_chart(name, namespace)),
        config: Some(serde_json::json!({})),
        providers,
        observed_generation: Some(1),
        ..Default::default()
    }
}

pub fn infrastructure_providers(providers: &[&str]) -> Providers {
    Providers {
        infrastructure: providers.iter().map(|p| p.to_string()).collect(),
        ..Default::default()
    }
}

/// Helper to create a generated HelmChart whose artifact is ready at `url`
pub fn create_ready_helm_chart(name: &str, namespace: &str, chart: &str, url: &str) -> HelmChart {
    let mut helm_chart = HelmChart::generated(name, namespace, chart, Some("0.1.0"), DEFAULT_REPOSITORY_NAME, None);
    helm_chart.metadata.generation = Some(1);
    helm_chart.status = Some(HelmChartStatus {
        observed_generation: Some(1),
        conditions: vec![Condition::new(READY_CONDITION, CONDITION_TRUE, SUCCEEDED_REASON, "pulled")],
        artifact: Some(Artifact {
            url: url.to_string(),
            revision: "0.1.0".to_string(),
            ..Default::default()
        }),
    });
    helm_chart
}

/// Helper to create a parsed chart with the given annotations
pub fn create_test_chart(name: &str, annotations: &[(&str, &str)]) -> Chart {
    Chart {
        metadata: ChartMetadata {
            api_version: "v2".to_string(),
            name: name.to_string(),
            version: "0.1.0".to_string(),
            description: Some(format!("{name} chart")),
            annotations: annotations
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<BTreeMap<_, _>>(),
            ..Default::default()
        },
        values: serde_json::json!({"replicas": 1}),
        ..Default::default()
    }
}

/// Helper to create a test Management named `name`
pub fn create_test_management(name: &str, spec: ManagementSpec) -> Management {
    Management {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            uid: Some(format!("{name}-uid")),
            generation: Some(1),
            ..Default::default()
        },
        spec,
        status: None,
    }
}

/// Helper to create a test ManagedCluster
pub fn create_test_managed_cluster(name: &str, namespace: &str, template: &str) -> ManagedCluster {
    ManagedCluster {
        metadata: test_metadata(name, namespace),
        spec: ManagedClusterSpec {
            template: template.to_string(),
            config: None,
            dry_run: false,
            services: Vec::new(),
        },
        status: None,
    }
}

pub fn ready_release_status() -> HelmReleaseStatus {
    HelmReleaseStatus {
        observed_generation: Some(1),
        conditions: vec![Condition::new(
            READY_CONDITION,
            CONDITION_TRUE,
            SUCCEEDED_REASON,
            "Helm install succeeded",
        )],
    }
}

/// Set a deletion timestamp, as the API server does on delete
pub fn mark_deleted(meta: &mut ObjectMeta) {
    meta.deletion_timestamp =
        Some(serde_json::from_value(serde_json::json!("2026-01-01T00:00:00Z")).expect("valid timestamp"));
}
