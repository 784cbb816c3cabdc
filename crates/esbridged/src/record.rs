//! Validation of incoming update requests against the fixed wire schema.

use anyhow::Context;
use jsonschema::Validator;
use serde_json::{json, Value};

use esbridge_elastic::{UpdateRequest, FIELD_CONFIG};

/// Why a raw payload was dropped.
#[derive(Debug)]
pub enum RecordError {
    /// Not decodable as UTF-8 JSON.
    Malformed,
    /// Decoded, but violates the update-request schema. Carries every
    /// violation, not just the first.
    Invalid(Vec<String>),
}

/// Precompiled schema for incoming update requests.
///
/// The wire format is fixed: `_index`, `_id` and `_source` and nothing
/// else, with `_source` keys restricted to the updatable field set.
pub struct RecordValidator {
    schema: Validator,
}

impl RecordValidator {
    pub fn new() -> anyhow::Result<Self> {
        let mut fields = serde_json::Map::new();
        for (field, _) in FIELD_CONFIG {
            fields.insert((*field).to_string(), json!({"type": ["number", "string"]}));
        }
        let schema = json!({
            "type": "object",
            "additionalProperties": false,
            "required": ["_index", "_id", "_source"],
            "properties": {
                "_index": {"type": "string", "minLength": 1},
                "_id": {"type": ["integer", "string"]},
                "_source": {
                    "type": "object",
                    "additionalProperties": false,
                    "minProperties": 1,
                    "properties": fields,
                }
            }
        });
        let schema = jsonschema::validator_for(&schema)
            .map_err(|error| anyhow::anyhow!("{error}"))
            .context("update request schema failed to compile")?;
        Ok(Self { schema })
    }

    /// Decode and validate one raw payload into a typed request.
    pub fn parse(&self, payload: &[u8]) -> Result<UpdateRequest, RecordError> {
        let value: Value = serde_json::from_slice(payload).map_err(|_| RecordError::Malformed)?;

        let violations: Vec<String> = self
            .schema
            .iter_errors(&value)
            .map(|error| error.to_string())
            .collect();
        if !violations.is_empty() {
            return Err(RecordError::Invalid(violations));
        }

        serde_json::from_value(value).map_err(|error| RecordError::Invalid(vec![error.to_string()]))
    }
}
