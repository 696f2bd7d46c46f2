//! Unit tests for reconcile_helpers module

#[cfg(test)]
mod tests {
    use super::super::*;
    use crds::{HELM_CHART_READY_CONDITION, HELM_RELEASE_READY_CONDITION, TEMPLATE_READY_CONDITION};

    fn condition(type_: &str, status: &str, message: &str) -> Condition {
        Condition::new(type_, status, SUCCEEDED_REASON, message)
    }

    #[test]
    fn test_finalizer_add_and_remove() {
        let mut meta = ObjectMeta::default();
        assert!(!has_finalizer(&meta, "a/b"));
        assert!(add_finalizer(&mut meta, "a/b"));
        assert!(!add_finalizer(&mut meta, "a/b"), "adding twice is a no-op");
        assert!(has_finalizer(&meta, "a/b"));
        assert!(remove_finalizer(&mut meta, "a/b"));
        assert!(!remove_finalizer(&mut meta, "a/b"));
        assert_eq!(meta.finalizers, Some(vec![]));
    }

    #[test]
    fn test_status_needs_update() {
        assert!(status_needs_update(None, &1));
        assert!(status_needs_update(Some(&1), &2));
        assert!(!status_needs_update(Some(&2), &2));
    }

    #[test]
    fn test_aggregate_ready_all_true() {
        let ready = aggregate_ready(
            &[
                condition(TEMPLATE_READY_CONDITION, CONDITION_TRUE, "Template is valid"),
                condition(HELM_CHART_READY_CONDITION, CONDITION_TRUE, "Helm chart is valid"),
                condition(READY_CONDITION, CONDITION_FALSE, "stale"),
            ],
            "ManagedCluster is ready",
        );
        assert_eq!(ready.status, CONDITION_TRUE);
        assert_eq!(ready.reason, SUCCEEDED_REASON);
        assert_eq!(ready.message, "ManagedCluster is ready");
    }

    #[test]
    fn test_aggregate_ready_false_wins_over_unknown() {
        let ready = aggregate_ready(
            &[
                condition(TEMPLATE_READY_CONDITION, CONDITION_FALSE, "provided template is not found"),
                condition(HELM_CHART_READY_CONDITION, CONDITION_UNKNOWN, "Helm Chart is not yet ready"),
                condition(HELM_RELEASE_READY_CONDITION, CONDITION_FALSE, "install failed"),
            ],
            "ready",
        );
        assert_eq!(ready.status, CONDITION_FALSE);
        assert_eq!(ready.reason, FAILED_REASON);
        assert_eq!(ready.message, "provided template is not found. install failed");
    }

    #[test]
    fn test_aggregate_ready_unknown() {
        let ready = aggregate_ready(
            &[
                condition(TEMPLATE_READY_CONDITION, CONDITION_TRUE, "Template is valid"),
                condition(HELM_RELEASE_READY_CONDITION, CONDITION_UNKNOWN, "HelmRelease is not yet ready"),
            ],
            "ready",
        );
        assert_eq!(ready.status, CONDITION_UNKNOWN);
        assert_eq!(ready.reason, PROGRESSING_REASON);
        assert_eq!(ready.message, "HelmRelease is not yet ready");
    }
}
