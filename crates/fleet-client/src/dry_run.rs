//! Client-only install simulation
//!
//! Runs the checks Helm performs before rendering an install, without
//! contacting the cluster: release name, installability, vendored
//! dependencies and the values against `values.schema.json`.

use serde_json::{Map, Value};

use crate::chart::Chart;
use crate::error::FleetError;

const MAX_RELEASE_NAME_LENGTH: usize = 53;

/// Simulate `helm install --dry-run --client-only`
pub fn simulate_install(
    chart: &Chart,
    release_name: &str,
    namespace: &str,
    values: Option<&Value>,
) -> Result<(), FleetError> {
    validate_release_name(release_name)?;
    if namespace.is_empty() {
        return Err(FleetError::DryRun("release namespace is required".to_string()));
    }
    chart.validate()?;
    if chart.is_library() {
        return Err(FleetError::DryRun("library charts are not installable".to_string()));
    }

    let missing: Vec<&str> = chart
        .metadata
        .dependencies
        .iter()
        .filter(|d| !chart.subcharts.contains(&d.name))
        .map(|d| d.name.as_str())
        .collect();
    if !missing.is_empty() {
        return Err(FleetError::DryRun(format!(
            "found in Chart.yaml, but missing in charts/ directory: {}",
            missing.join(", ")
        )));
    }

    let overrides = match values {
        None | Some(Value::Null) => Map::new(),
        Some(Value::Object(map)) => map.clone(),
        Some(other) => {
            return Err(FleetError::DryRun(format!(
                "values must be a map, got {}",
                type_name(other)
            )));
        }
    };
    let merged = coalesce(chart.values.clone(), Value::Object(overrides));

    if let Some(schema) = &chart.schema {
        let mut errors = Vec::new();
        validate_against_schema(schema, &merged, "", &mut errors);
        if !errors.is_empty() {
            return Err(FleetError::DryRun(format!(
                "values don't meet the specifications of the schema(s) in the following chart(s):\n{}:\n- {}",
                chart.metadata.name,
                errors.join("\n- ")
            )));
        }
    }
    Ok(())
}

fn validate_release_name(name: &str) -> Result<(), FleetError> {
    if name.is_empty() {
        return Err(FleetError::DryRun("no release name provided".to_string()));
    }
    if name.len() > MAX_RELEASE_NAME_LENGTH {
        return Err(FleetError::DryRun(format!(
            "release name {name:?} exceeds max length of {MAX_RELEASE_NAME_LENGTH}"
        )));
    }
    let label_ok = |label: &str| {
        !label.is_empty()
            && label.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
            && !label.starts_with('-')
            && !label.ends_with('-')
    };
    if !name.split('.').all(label_ok) {
        return Err(FleetError::DryRun(format!(
            "invalid release name {name:?}: must be a valid DNS-1123 subdomain"
        )));
    }
    Ok(())
}

/// Deep-merge `overrides` into `base`. A null override deletes the key.
pub fn coalesce(base: Value, overrides: Value) -> Value {
    match (base, overrides) {
        (Value::Object(mut base), Value::Object(overrides)) => {
            for (key, value) in overrides {
                if value.is_null() {
                    base.remove(&key);
                    continue;
                }
                let merged = match base.remove(&key) {
                    Some(existing) => coalesce(existing, value),
                    None => value,
                };
                base.insert(key, merged);
            }
            Value::Object(base)
        }
        (_, overrides) => overrides,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn type_matches(expected: &str, value: &Value) -> bool {
    let actual = type_name(value);
    expected == actual || (expected == "number" && actual == "integer")
}

/// Validate `value` against the subset of JSON schema charts use in practice:
/// `type`, `required`, `properties`, `items` and `enum`.
fn validate_against_schema(schema: &Value, value: &Value, path: &str, errors: &mut Vec<String>) {
    let Some(schema) = schema.as_object() else {
        return;
    };
    let at = if path.is_empty() { "(root)" } else { path };

    if let Some(expected) = schema.get("type") {
        let allowed: Vec<&str> = match expected {
            Value::String(t) => vec![t.as_str()],
            Value::Array(ts) => ts.iter().filter_map(Value::as_str).collect(),
            _ => Vec::new(),
        };
        if !allowed.is_empty() && !allowed.iter().any(|t| type_matches(t, value)) {
            errors.push(format!(
                "{at}: Invalid type. Expected: {}, given: {}",
                allowed.join(" or "),
                type_name(value)
            ));
            return;
        }
    }

    if let Some(Value::Array(options)) = schema.get("enum") {
        if !options.contains(value) {
            errors.push(format!("{at}: must be one of the enum values"));
        }
    }

    if let Value::Object(map) = value {
        if let Some(Value::Array(required)) = schema.get("required") {
            for key in required.iter().filter_map(Value::as_str) {
                if !map.contains_key(key) {
                    errors.push(format!("{at}: {key} is required"));
                }
            }
        }
        if let Some(Value::Object(properties)) = schema.get("properties") {
            for (key, sub_schema) in properties {
                if let Some(sub_value) = map.get(key) {
                    let sub_path = if path.is_empty() { key.clone() } else { format!("{path}.{key}") };
                    validate_against_schema(sub_schema, sub_value, &sub_path, errors);
                }
            }
        }
    }

    if let (Value::Array(items), Some(item_schema)) = (value, schema.get("items")) {
        for (i, item) in items.iter().enumerate() {
            validate_against_schema(item_schema, item, &format!("{path}.{i}"), errors);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chart::{ChartDependency, ChartMetadata};
    use serde_json::json;

    fn chart() -> Chart {
        Chart {
            metadata: ChartMetadata {
                api_version: "v2".into(),
                name: "aws-standalone".into(),
                version: "0.1.0".into(),
                ..Default::default()
            },
            values: json!({"controlPlane": {"replicas": 1, "type": "t3.small"}, "region": "us-east-1"}),
            ..Default::default()
        }
    }

    #[test]
    fn accepts_valid_chart_and_values() {
        simulate_install(&chart(), "dev-cluster", "default", Some(&json!({"region": "eu-west-1"}))).unwrap();
    }

    #[test]
    fn rejects_invalid_release_names() {
        let long = "a".repeat(54);
        for name in ["", "Bad_Name", "-edge", long.as_str()] {
            assert!(simulate_install(&chart(), name, "default", None).is_err(), "{name}");
        }
    }

    #[test]
    fn rejects_library_chart() {
        let mut lib = chart();
        lib.metadata.chart_type = Some("library".into());
        let err = simulate_install(&lib, "dev", "default", None).unwrap_err();
        assert_eq!(err.to_string(), "library charts are not installable");
    }

    #[test]
    fn rejects_missing_dependencies() {
        let mut with_deps = chart();
        with_deps.metadata.dependencies.push(ChartDependency {
            name: "cert-manager".into(),
            ..Default::default()
        });
        let err = simulate_install(&with_deps, "dev", "default", None).unwrap_err();
        assert!(err.to_string().contains("cert-manager"));

        with_deps.subcharts.insert("cert-manager".into());
        simulate_install(&with_deps, "dev", "default", None).unwrap();
    }

    #[test]
    fn rejects_non_object_values() {
        let err = simulate_install(&chart(), "dev", "default", Some(&json!([1, 2]))).unwrap_err();
        assert!(err.to_string().contains("array"));
    }

    #[test]
    fn validates_merged_values_against_schema() {
        let mut with_schema = chart();
        with_schema.schema = Some(json!({
            "type": "object",
            "required": ["region"],
            "properties": {
                "region": {"type": "string", "enum": ["us-east-1", "eu-west-1"]},
                "controlPlane": {
                    "type": "object",
                    "properties": {"replicas": {"type": "integer"}}
                }
            }
        }));
        simulate_install(&with_schema, "dev", "default", None).unwrap();

        let err = simulate_install(
            &with_schema,
            "dev",
            "default",
            Some(&json!({"controlPlane": {"replicas": "three"}, "region": "mars-1"})),
        )
        .unwrap_err()
        .to_string();
        assert!(err.contains("controlPlane.replicas: Invalid type"));
        assert!(err.contains("region: must be one of the enum values"));

        let err = simulate_install(&with_schema, "dev", "default", Some(&json!({"region": null})))
            .unwrap_err()
            .to_string();
        assert!(err.contains("region is required"));
    }

    #[test]
    fn coalesce_merges_nested_maps() {
        let merged = coalesce(
            json!({"a": {"b": 1, "c": 2}, "d": 3}),
            json!({"a": {"c": 5}, "d": null}),
        );
        assert_eq!(merged, json!({"a": {"b": 1, "c": 5}}));
    }
}
