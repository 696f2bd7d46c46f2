//! Unit tests for Management reconciler

#[cfg(test)]
mod tests {
    use super::super::*;
    use crate::test_utils::*;
    use crds::{ChartReference, Component, Core, ManagementSpec, ProviderTemplate};
    use fleet_client::{DependencyReference, FleetClientTrait, MockFleetClient};

    fn default_core() -> Option<Core> {
        Some(Core {
            platform: Component::new("fleet"),
            capi: Component::new("cluster-api"),
        })
    }

    /// Management with finalizer and defaults, as left by the first pass
    fn ready_management(client: &MockFleetClient, providers: &[&str]) -> Management {
        let mut management = create_test_management(
            MANAGEMENT_NAME,
            ManagementSpec {
                core: default_core(),
                providers: providers.iter().map(|p| Component::new(*p)).collect(),
            },
        );
        management.metadata.finalizers = Some(vec![MANAGEMENT_FINALIZER.to_string()]);
        client.add_management(management)
    }

    fn add_valid(client: &MockFleetClient, name: &str, providers: Providers) -> ProviderTemplate {
        client.add_provider_template(create_valid_provider_template(name, SYSTEM_NAMESPACE, providers))
    }

    fn add_core_templates(client: &MockFleetClient) {
        add_valid(client, "fleet", Providers::default());
        add_valid(client, "cluster-api", Providers::default());
    }

    #[tokio::test]
    async fn test_first_pass_adds_finalizer_and_defaults() {
        let (reconciler, client, _) = create_test_reconciler();
        let management = client.add_management(create_test_management(MANAGEMENT_NAME, ManagementSpec::default()));

        reconciler.reconcile_management(&management).await.unwrap();

        let stored = client.management(MANAGEMENT_NAME).unwrap();
        assert_eq!(stored.spec.core, default_core());
        assert_eq!(stored.metadata.finalizers, Some(vec![MANAGEMENT_FINALIZER.to_string()]));
        assert_eq!(client.operations(), vec!["update Management fleet"]);
        assert!(client.helm_releases().is_empty());
    }

    #[tokio::test]
    async fn test_ignores_other_management_names() {
        let (reconciler, client, _) = create_test_reconciler();
        let management = client.add_management(create_test_management("second", ManagementSpec::default()));

        reconciler.reconcile_management(&management).await.unwrap();

        assert!(client.operations().is_empty());
        assert!(client.management("second").unwrap().spec.core.is_none());
    }

    #[tokio::test]
    async fn test_requires_cert_manager() {
        let (reconciler, client, _) = create_test_reconciler();
        add_core_templates(&client);
        let management = ready_management(&client, &[]);

        let err = reconciler.reconcile_management(&management).await.unwrap_err();

        assert!(matches!(err, ControllerError::CertManagerMissing(_)), "got {err:?}");
        assert!(client.helm_releases().is_empty());
    }

    #[tokio::test]
    async fn test_installs_components_in_dependency_order() {
        let (reconciler, client, _) = create_test_reconciler();
        client.add_api_group(CERT_MANAGER_API);
        add_core_templates(&client);
        add_valid(&client, "cluster-api-provider-aws", infrastructure_providers(&["aws"]));
        add_valid(
            &client,
            PROVIDER_SVELTOS_NAME,
            Providers {
                infrastructure: vec!["aws".to_string()],
                bootstrap: vec!["k0s".to_string()],
                ..Default::default()
            },
        );
        let management = ready_management(&client, &["cluster-api-provider-aws", PROVIDER_SVELTOS_NAME]);

        let action = reconciler.reconcile_management(&management).await.unwrap();
        assert_eq!(action, Action::await_change());

        let platform = client.helm_release(SYSTEM_NAMESPACE, "fleet").unwrap();
        assert!(platform.spec.depends_on.is_empty());
        assert_eq!(
            platform.spec.values,
            Some(json!({"admissionWebhook": {"enabled": true}, "cluster-api-operator": {"enabled": true}}))
        );
        assert_eq!(platform.spec.chart_ref, Some(ChartReference::helm_chart("fleet", SYSTEM_NAMESPACE)));

        let capi = client.helm_release(SYSTEM_NAMESPACE, "cluster-api").unwrap();
        assert_eq!(
            capi.spec.depends_on,
            vec![DependencyReference {
                name: "fleet".to_string(),
                namespace: None
            }]
        );

        let aws = client.helm_release(SYSTEM_NAMESPACE, "cluster-api-provider-aws").unwrap();
        assert_eq!(aws.spec.depends_on[0].name, "cluster-api");
        assert_eq!(aws.spec.target_namespace, None);

        let sveltos = client.helm_release(SYSTEM_NAMESPACE, PROVIDER_SVELTOS_NAME).unwrap();
        assert_eq!(sveltos.spec.depends_on[0].name, "cluster-api");
        assert_eq!(sveltos.spec.target_namespace.as_deref(), Some(PROVIDER_SVELTOS_TARGET_NAMESPACE));
        assert!(sveltos.spec.install.unwrap().create_namespace);

        let status = client.management(MANAGEMENT_NAME).unwrap().status.unwrap();
        assert_eq!(status.observed_generation, Some(1));
        assert_eq!(status.components.len(), 4);
        assert!(status.components.values().all(|c| c.success && c.error.is_none()));
        // Additive, duplicates kept
        assert_eq!(status.available_providers.infrastructure, vec!["aws", "aws"]);
        assert_eq!(status.available_providers.bootstrap, vec!["k0s"]);
    }

    #[tokio::test]
    async fn test_component_failures_are_isolated() {
        let (reconciler, client, _) = create_test_reconciler();
        client.add_api_group(CERT_MANAGER_API);
        add_core_templates(&client);
        let mut p1 = create_valid_provider_template("p1", SYSTEM_NAMESPACE, infrastructure_providers(&["p1"]));
        p1.status.as_mut().unwrap().valid = false;
        client.add_provider_template(p1);
        add_valid(&client, "p2", infrastructure_providers(&["p2"]));
        let management = ready_management(&client, &["p1", "p2", "p3"]);

        let err = reconciler.reconcile_management(&management).await.unwrap_err();

        let ControllerError::Aggregate(messages) = err else {
            panic!("expected aggregate error");
        };
        assert_eq!(
            messages,
            vec![
                "Template fleet-system/p1 is not marked as valid",
                "Failed to get Template fleet-system/p3: ProviderTemplate fleet-system/p3 not found",
            ]
        );

        // p2 is installed despite p1 and p3
        assert!(client.helm_release(SYSTEM_NAMESPACE, "p2").is_some());
        assert!(client.helm_release(SYSTEM_NAMESPACE, "p1").is_none());

        let status = client.management(MANAGEMENT_NAME).unwrap().status.unwrap();
        let p1 = &status.components["p1"];
        assert!(!p1.success);
        assert_eq!(p1.error.as_deref(), Some("Template fleet-system/p1 is not marked as valid"));
        assert!(status.components["p2"].success);
        assert!(!status.components["p3"].success);
        assert_eq!(status.available_providers.infrastructure, vec!["p2"]);
    }

    #[tokio::test]
    async fn test_release_errors_are_reported_per_component() {
        let (reconciler, client, _) = create_test_reconciler();
        client.add_api_group(CERT_MANAGER_API);
        add_core_templates(&client);
        client.fail_release("cluster-api", "dependency timeout");
        let management = ready_management(&client, &[]);

        let err = reconciler.reconcile_management(&management).await.unwrap_err();

        assert_eq!(
            err.to_string(),
            "error reconciling HelmRelease fleet-system/cluster-api: Invalid request: dependency timeout"
        );
        let status = client.management(MANAGEMENT_NAME).unwrap().status.unwrap();
        assert!(status.components["fleet"].success);
        assert!(!status.components["cluster-api"].success);
    }

    #[tokio::test]
    async fn test_reconcile_is_idempotent() {
        let (reconciler, client, _) = create_test_reconciler();
        client.add_api_group(CERT_MANAGER_API);
        add_core_templates(&client);
        let management = ready_management(&client, &[]);
        reconciler.reconcile_management(&management).await.unwrap();
        let operations = client.operations();
        assert_eq!(
            operations,
            vec![
                "create HelmRelease fleet-system/fleet",
                "create HelmRelease fleet-system/cluster-api",
                "update_status Management fleet",
            ]
        );

        let stored = client.get_management(MANAGEMENT_NAME).await.unwrap().unwrap();
        reconciler.reconcile_management(&stored).await.unwrap();

        assert_eq!(client.operations(), operations);
    }

    #[tokio::test]
    async fn test_deletion_tears_down_platform() {
        let (reconciler, client, _) = create_test_reconciler();
        client.add_api_group(CERT_MANAGER_API);
        add_core_templates(&client);
        let management = ready_management(&client, &[]);
        reconciler.reconcile_management(&management).await.unwrap();

        let mut deleting = client.management(MANAGEMENT_NAME).unwrap();
        mark_deleted(&mut deleting.metadata);
        let before = client.operations().len();
        reconciler.reconcile_management(&deleting).await.unwrap();

        assert_eq!(
            client.operations()[before..].to_vec(),
            vec![
                "suspend HelmRelease fleet-system/fleet",
                "delete_all_of HelmRelease",
                "delete_all_of HelmChart",
                "delete_all_of HelmRepository",
                "update Management fleet",
            ]
        );
        assert!(client.helm_releases().is_empty());
    }

    #[test]
    fn test_cert_manager_values() {
        let merged = with_cert_manager_values(Some(&json!({
            "admissionWebhook": {"enabled": false, "port": 9443},
            "cluster-api-operator": {"enabled": false},
            "replicas": 2
        })))
        .unwrap();
        assert_eq!(
            merged,
            json!({
                "admissionWebhook": {"enabled": true, "port": 9443},
                "cluster-api-operator": {"enabled": false},
                "replicas": 2
            })
        );

        assert_eq!(
            with_cert_manager_values(None).unwrap(),
            json!({"admissionWebhook": {"enabled": true}, "cluster-api-operator": {"enabled": true}})
        );
    }

    #[test]
    fn test_cert_manager_values_reject_non_object_config() {
        let err = with_cert_manager_values(Some(&json!(["replicas", 2]))).unwrap_err();
        assert!(matches!(err, ControllerError::InvalidConfig(_)), "got {err:?}");
        assert!(with_cert_manager_values(Some(&Value::Null)).is_ok());
    }

    #[tokio::test]
    async fn test_non_object_platform_config_fails_platform_only() {
        let (reconciler, client, _) = create_test_reconciler();
        client.add_api_group(CERT_MANAGER_API);
        add_core_templates(&client);
        let mut management = create_test_management(
            MANAGEMENT_NAME,
            ManagementSpec {
                core: default_core(),
                providers: vec![],
            },
        );
        management.metadata.finalizers = Some(vec![MANAGEMENT_FINALIZER.to_string()]);
        management.spec.core.as_mut().unwrap().platform.config = Some(json!("replicas=2"));
        let management = client.add_management(management);

        let err = reconciler.reconcile_management(&management).await.unwrap_err();

        let ControllerError::Aggregate(messages) = err else {
            panic!("expected aggregate error");
        };
        assert_eq!(
            messages,
            vec!["Invalid configuration: platform config must be an object, got \"replicas=2\""]
        );
        assert!(client.helm_release(SYSTEM_NAMESPACE, "fleet").is_none());
        assert!(client.helm_release(SYSTEM_NAMESPACE, "cluster-api").is_some());
        let status = client.management(MANAGEMENT_NAME).unwrap().status.unwrap();
        assert!(!status.components["fleet"].success);
        assert!(status.components["cluster-api"].success);
    }

    #[test]
    fn test_wrapped_components_order() {
        let spec = ManagementSpec {
            core: default_core(),
            providers: vec![Component::new("k0smotron")],
        };
        let components = wrapped_components(&spec);
        let order: Vec<(&str, Option<&str>)> = components
            .iter()
            .map(|c| (c.template.as_str(), c.depends_on.as_deref()))
            .collect();
        assert_eq!(
            order,
            vec![("fleet", None), ("cluster-api", Some("fleet")), ("k0smotron", Some("cluster-api"))]
        );
        assert!(wrapped_components(&ManagementSpec::default()).is_empty());
    }
}
