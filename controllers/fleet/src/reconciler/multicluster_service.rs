//! MultiClusterService reconciliation
//!
//! The kind is served and watched so manifests apply cleanly; services are
//! not fanned out to matching clusters yet.

use crds::MultiClusterService;
use kube::ResourceExt;
use kube_runtime::controller::Action;
use tracing::info;

use super::Reconciler;
use crate::error::ControllerError;

impl Reconciler {
    /// Reconcile a MultiClusterService. Only logs the object.
    pub async fn reconcile_multicluster_service(
        &self,
        service: &MultiClusterService,
    ) -> Result<Action, ControllerError> {
        info!(
            "MultiClusterService {} selects {:?} with {} services (priority {}), not reconciled",
            service.name_any(),
            service.spec.cluster_selector.match_labels,
            service.spec.services.len(),
            service.spec.priority
        );
        Ok(Action::await_change())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::*;
    use crds::MultiClusterServiceSpec;

    #[tokio::test]
    async fn test_multicluster_service_is_left_untouched() {
        let (reconciler, client, _) = create_test_reconciler();
        let service = MultiClusterService::new(
            "global-ingress",
            MultiClusterServiceSpec {
                cluster_selector: Default::default(),
                services: vec![],
                priority: 100,
                stop_on_conflict: false,
            },
        );

        let action = reconciler.reconcile_multicluster_service(&service).await.unwrap();

        assert_eq!(action, Action::await_change());
        assert!(client.operations().is_empty());
    }
}
