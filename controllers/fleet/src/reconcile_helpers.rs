//! Helper functions for common reconciliation patterns
//!
//! Finalizer bookkeeping, owner references, the aggregate Ready condition
//! and the skip-unchanged-status check shared by all reconcilers.

use crds::{
    Condition, CONDITION_FALSE, CONDITION_TRUE, CONDITION_UNKNOWN, FAILED_REASON, PROGRESSING_REASON,
    READY_CONDITION, SUCCEEDED_REASON,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use kube::Resource;

use crate::error::ControllerError;

pub fn has_finalizer(meta: &ObjectMeta, finalizer: &str) -> bool {
    meta.finalizers
        .as_ref()
        .is_some_and(|f| f.iter().any(|x| x == finalizer))
}

/// Add `finalizer` if missing. Returns true when the metadata changed.
pub fn add_finalizer(meta: &mut ObjectMeta, finalizer: &str) -> bool {
    if has_finalizer(meta, finalizer) {
        return false;
    }
    meta.finalizers.get_or_insert_with(Vec::new).push(finalizer.to_string());
    true
}

/// Remove `finalizer` if present. Returns true when the metadata changed.
pub fn remove_finalizer(meta: &mut ObjectMeta, finalizer: &str) -> bool {
    let Some(finalizers) = meta.finalizers.as_mut() else {
        return false;
    };
    let before = finalizers.len();
    finalizers.retain(|f| f != finalizer);
    before != finalizers.len()
}

pub fn is_being_deleted(meta: &ObjectMeta) -> bool {
    meta.deletion_timestamp.is_some()
}

/// Controller owner reference pointing at `owner`
pub fn owner_reference<K: Resource<DynamicType = ()>>(owner: &K) -> Result<OwnerReference, ControllerError> {
    owner
        .controller_owner_ref(&())
        .ok_or(ControllerError::MissingMetadata("uid"))
}

/// Name and namespace of a namespaced object
pub fn name_and_namespace(meta: &ObjectMeta) -> Result<(&str, &str), ControllerError> {
    let name = meta.name.as_deref().ok_or(ControllerError::MissingMetadata("name"))?;
    let namespace = meta
        .namespace
        .as_deref()
        .ok_or(ControllerError::MissingMetadata("namespace"))?;
    Ok((name, namespace))
}

/// Whether a status write would change anything
pub fn status_needs_update<S: PartialEq>(current: Option<&S>, desired: &S) -> bool {
    current != Some(desired)
}

/// Derive the aggregate Ready condition from every other condition.
///
/// Any False makes Ready False, otherwise any Unknown makes it Unknown.
/// Messages of the offending conditions are joined with ". ".
pub fn aggregate_ready(conditions: &[Condition], ready_message: &str) -> Condition {
    let messages = |status: &str| -> Vec<&str> {
        conditions
            .iter()
            .filter(|c| c.type_ != READY_CONDITION && c.status == status)
            .map(|c| c.message.as_str())
            .collect()
    };

    let failed = messages(CONDITION_FALSE);
    if !failed.is_empty() {
        return Condition::new(READY_CONDITION, CONDITION_FALSE, FAILED_REASON, failed.join(". "));
    }
    let unknown = messages(CONDITION_UNKNOWN);
    if !unknown.is_empty() {
        return Condition::new(READY_CONDITION, CONDITION_UNKNOWN, PROGRESSING_REASON, unknown.join(". "));
    }
    Condition::new(READY_CONDITION, CONDITION_TRUE, SUCCEEDED_REASON, ready_message)
}

#[cfg(test)]
#[path = "reconcile_helpers_test.rs"]
mod reconcile_helpers_test;
