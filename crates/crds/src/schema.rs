//! Schema overrides for free-form fields

use schemars::{json_schema, Schema, SchemaGenerator};

/// Arbitrary JSON object (chart values), kept verbatim by the API server
pub fn preserve_unknown_fields(_: &mut SchemaGenerator) -> Schema {
    json_schema!({
        "type": "object",
        "x-kubernetes-preserve-unknown-fields": true,
        "nullable": true
    })
}
