//! Helm chart archives
//!
//! Parses the gzipped tarball served as a HelmChart artifact into a [`Chart`]
//! and performs Helm's structural metadata validation.

use std::collections::{BTreeMap, BTreeSet};
use std::io::Read;

use flate2::read::GzDecoder;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::FleetError;

const MAX_CHART_NAME_LENGTH: usize = 250;

/// Contents of `Chart.yaml`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ChartMetadata {
    #[serde(default)]
    pub api_version: String,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub version: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_version: Option<String>,

    /// "application" (default) or "library"
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub chart_type: Option<String>,

    #[serde(default)]
    pub annotations: BTreeMap<String, String>,

    #[serde(default)]
    pub dependencies: Vec<ChartDependency>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ChartDependency {
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub version: String,

    #[serde(default)]
    pub repository: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
}

/// A loaded chart
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Chart {
    pub metadata: ChartMetadata,
    /// Default values, always a JSON object
    pub values: serde_json::Value,
    /// `values.schema.json`, when shipped
    pub schema: Option<serde_json::Value>,
    /// Paths under `templates/`
    pub templates: Vec<String>,
    /// Names of charts vendored under `charts/`
    pub subcharts: BTreeSet<String>,
}

impl Chart {
    /// Load a chart from a `.tgz` archive
    pub fn from_archive(bytes: &[u8]) -> Result<Self, FleetError> {
        let mut archive = tar::Archive::new(GzDecoder::new(bytes));
        let mut chart_yaml: Option<String> = None;
        let mut values_yaml: Option<String> = None;
        let mut schema_json: Option<String> = None;
        let mut templates = Vec::new();
        let mut subcharts = BTreeSet::new();

        for entry in archive.entries()? {
            let mut entry = entry?;
            let path: Vec<String> = entry
                .path()?
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect();
            // Every file sits below the chart's top-level directory
            let Some((_, rel)) = path.split_first() else {
                continue;
            };
            match rel {
                [file] if file == "Chart.yaml" => chart_yaml = Some(read_string(&mut entry)?),
                [file] if file == "values.yaml" => values_yaml = Some(read_string(&mut entry)?),
                [file] if file == "values.schema.json" => schema_json = Some(read_string(&mut entry)?),
                [dir, rest @ ..] if dir == "templates" && !rest.is_empty() => {
                    if entry.header().entry_type().is_file() {
                        templates.push(rest.join("/"));
                    }
                }
                [dir, archive_name] if dir == "charts" && archive_name.ends_with(".tgz") => {
                    let mut nested = Vec::new();
                    entry.read_to_end(&mut nested)?;
                    subcharts.insert(Chart::from_archive(&nested)?.metadata.name);
                }
                [dir, sub, file] if dir == "charts" && file == "Chart.yaml" => {
                    subcharts.insert(sub.clone());
                }
                _ => {}
            }
        }

        let chart_yaml = chart_yaml
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| FleetError::InvalidChart("chart metadata is empty".to_string()))?;
        let metadata: ChartMetadata = serde_yaml::from_str(&chart_yaml)?;

        let values = match values_yaml {
            Some(raw) => match serde_yaml::from_str::<serde_json::Value>(&raw)? {
                serde_json::Value::Null => serde_json::Value::Object(serde_json::Map::new()),
                obj @ serde_json::Value::Object(_) => obj,
                _ => {
                    return Err(FleetError::InvalidChart(
                        "values.yaml must contain a map".to_string(),
                    ));
                }
            },
            None => serde_json::Value::Object(serde_json::Map::new()),
        };
        let schema: Option<serde_json::Value> = schema_json
            .map(|raw| serde_json::from_str(&raw))
            .transpose()?;

        Ok(Chart {
            metadata,
            values,
            schema,
            templates,
            subcharts,
        })
    }

    pub fn is_library(&self) -> bool {
        self.metadata.chart_type.as_deref() == Some("library")
    }

    /// Structural validation of the chart metadata
    pub fn validate(&self) -> Result<(), FleetError> {
        let md = &self.metadata;
        let invalid = |msg: String| Err(FleetError::InvalidChart(msg));

        if md.api_version.is_empty() {
            return invalid("validation: chart.metadata.apiVersion is required".to_string());
        }
        if md.name.is_empty() {
            return invalid("validation: chart.metadata.name is required".to_string());
        }
        if md.name.len() > MAX_CHART_NAME_LENGTH || md.name.contains(['/', '\\']) || md.name.contains("..") {
            return invalid(format!("validation: chart.metadata.name {:?} is invalid", md.name));
        }
        if md.version.is_empty() {
            return invalid("validation: chart.metadata.version is required".to_string());
        }
        if !is_semver(&md.version) {
            return invalid(format!("validation: chart.metadata.version {:?} is invalid", md.version));
        }
        match md.chart_type.as_deref() {
            None | Some("" | "application" | "library") => {}
            Some(other) => return invalid(format!("validation: chart.metadata.type {other:?} must be application or library")),
        }
        if md.dependencies.iter().any(|d| d.name.is_empty()) {
            return invalid("validation: dependencies must have a name".to_string());
        }
        Ok(())
    }
}

fn read_string(reader: &mut impl Read) -> Result<String, FleetError> {
    let mut out = String::new();
    reader.read_to_string(&mut out)?;
    Ok(out)
}

/// Lenient semantic version check: `v?MAJOR[.MINOR[.PATCH]][-pre][+build]`
fn is_semver(version: &str) -> bool {
    let version = version.strip_prefix('v').unwrap_or(version);
    let core = version.split(['+', '-']).next().unwrap_or_default();
    let parts: Vec<&str> = core.split('.').collect();
    (1..=3).contains(&parts.len())
        && parts
            .iter()
            .all(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_digit()))
}

/// Verify an artifact against its `sha256:<hex>` digest
pub fn verify_digest(bytes: &[u8], digest: Option<&str>) -> Result<(), FleetError> {
    let Some(digest) = digest else {
        return Ok(());
    };
    let Some(expected) = digest.strip_prefix("sha256:") else {
        // Other algorithms are not verified
        return Ok(());
    };
    let actual = format!("{:x}", Sha256::digest(bytes));
    if actual.eq_ignore_ascii_case(expected) {
        Ok(())
    } else {
        Err(FleetError::InvalidChart(format!(
            "artifact digest mismatch: expected sha256:{expected}, got sha256:{actual}"
        )))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::GzEncoder;

    /// Build a gzipped chart archive from (path, contents) pairs
    pub(crate) fn archive(files: &[(&str, &str)]) -> Vec<u8> {
        let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
        for (path, contents) in files {
            let mut header = tar::Header::new_gnu();
            header.set_size(contents.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, path, contents.as_bytes()).unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap()
    }

    const CHART_YAML: &str = "apiVersion: v2\nname: demo\nversion: 0.1.0\ndescription: Demo chart\nannotations:\n  fleet.microscaler.io/type: cluster\n";

    #[test]
    fn from_archive_reads_metadata_values_and_templates() {
        let bytes = archive(&[
            ("demo/Chart.yaml", CHART_YAML),
            ("demo/values.yaml", "replicas: 2\n"),
            ("demo/templates/deployment.yaml", "kind: Deployment\n"),
        ]);
        let chart = Chart::from_archive(&bytes).unwrap();
        assert_eq!(chart.metadata.name, "demo");
        assert_eq!(chart.metadata.description.as_deref(), Some("Demo chart"));
        assert_eq!(chart.values, serde_json::json!({"replicas": 2}));
        assert_eq!(chart.templates, vec!["deployment.yaml"]);
        chart.validate().unwrap();
    }

    #[test]
    fn from_archive_collects_vendored_subcharts() {
        let sub = archive(&[("dep/Chart.yaml", "apiVersion: v2\nname: dep\nversion: 1.0.0\n")]);
        let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
        for (path, data) in [("demo/Chart.yaml", CHART_YAML.as_bytes()), ("demo/charts/dep-1.0.0.tgz", sub.as_slice())] {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, path, data).unwrap();
        }
        let bytes = builder.into_inner().unwrap().finish().unwrap();

        let chart = Chart::from_archive(&bytes).unwrap();
        assert!(chart.subcharts.contains("dep"));
    }

    #[test]
    fn from_archive_without_chart_yaml_fails() {
        let bytes = archive(&[("demo/values.yaml", "a: 1\n")]);
        let err = Chart::from_archive(&bytes).unwrap_err();
        assert_eq!(err.to_string(), "chart metadata is empty");
    }

    #[test]
    fn validate_rejects_bad_version_and_type() {
        let mut chart = Chart {
            metadata: ChartMetadata {
                api_version: "v2".into(),
                name: "demo".into(),
                version: "not-a-version".into(),
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(chart.validate().unwrap_err().to_string().contains("version"));

        chart.metadata.version = "1.2.3-rc.1".into();
        chart.metadata.chart_type = Some("plugin".into());
        assert!(chart.validate().unwrap_err().to_string().contains("type"));
    }

    #[test]
    fn semver_check_is_lenient() {
        assert!(is_semver("1.2.3"));
        assert!(is_semver("v1.2"));
        assert!(is_semver("0.1.0+build.5"));
        assert!(!is_semver("1.2.3.4"));
        assert!(!is_semver("latest"));
    }

    #[test]
    fn verify_digest_detects_mismatch() {
        let bytes = b"chart";
        let good = format!("sha256:{:x}", Sha256::digest(bytes));
        verify_digest(bytes, Some(&good)).unwrap();
        verify_digest(bytes, None).unwrap();
        assert!(verify_digest(bytes, Some("sha256:deadbeef")).is_err());
    }
}
