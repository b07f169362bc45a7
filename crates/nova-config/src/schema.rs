use schemars::schema::{RootSchema, Schema};
use schemars::schema_for;
use serde_json::json;

use crate::{NovaConfig, KNOWN_LANGUAGE_IDS};

/// JSON schema for `nova.toml`.
///
/// This schema is intended for editor tooling (TOML JSON schema integration) and CI validation.
#[must_use]
pub fn json_schema() -> RootSchema {
    let mut schema = schema_for!(NovaConfig);
    apply_semantic_constraints(&mut schema);
    schema
}

fn apply_semantic_constraints(schema: &mut RootSchema) {
    // Unknown languages are only warnings at load time, so the schema lists the known ids as
    // examples instead of an enum.
    set_property(
        schema,
        "SyncConfig",
        "language_priority",
        schema_from_json(json!({
            "description": "Order in which declared target languages decide a module's type. The first entry a target declares wins.",
            "type": "array",
            "items": { "type": "string", "examples": KNOWN_LANGUAGE_IDS },
            "uniqueItems": true,
            "default": KNOWN_LANGUAGE_IDS,
        })),
    );

    push_all_of(
        schema,
        schema_from_json(json!({
            "if": {
                "required": ["sync"],
                "properties": {
                    "sync": {
                        "required": ["project_name"],
                        "properties": { "project_name": { "type": "string" } }
                    }
                }
            },
            "then": {
                "properties": {
                    "sync": {
                        "properties": { "project_name": { "minLength": 1 } }
                    }
                }
            }
        })),
    );
}

fn push_all_of(root: &mut RootSchema, schema: Schema) {
    let subschemas = root.schema.subschemas();
    subschemas.all_of.get_or_insert_with(Vec::new).push(schema);
}

fn schema_from_json(value: serde_json::Value) -> Schema {
    serde_json::from_value(value).expect("valid json schema")
}

fn set_property(
    schema: &mut RootSchema,
    definition_name: &str,
    property_name: &str,
    property_schema: Schema,
) {
    let Some(definition) = schema.definitions.get_mut(definition_name) else {
        return;
    };

    let Schema::Object(obj) = definition else {
        return;
    };

    obj.object()
        .properties
        .insert(property_name.to_string(), property_schema);
}
