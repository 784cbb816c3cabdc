//! Scripted-update bulk actions built from validated update requests.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Document type carried on every bulk action. Newer Elasticsearch versions
/// deprecate typed indices; if the target clusters drop type support this
/// needs to become configurable rather than silently disappear.
pub const DOC_TYPE: &str = "page";

/// Name of the server-side scripted update that suppresses insignificant
/// writes, and the script language it is registered under.
pub const NOOP_SCRIPT: &str = "super_detect_noop";
pub const NOOP_SCRIPT_LANG: &str = "native";

/// Fields we accept updates for, found in the `_source` field of incoming
/// messages, and their handler policy for the noop script.
pub const FIELD_CONFIG: &[(&str, &str)] = &[("popularity_score", "within 20%")];

/// A validated partial-document update request.
///
/// `id` stays an opaque JSON token (string or integer on the wire) and is
/// passed through to the bulk action uncoerced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateRequest {
    #[serde(rename = "_index")]
    pub index: String,
    #[serde(rename = "_id")]
    pub id: Value,
    #[serde(rename = "_source")]
    pub source: Map<String, Value>,
}

/// Transform an update request into an (action, body) pair for the bulk API.
///
/// The body invokes the noop script with a handler map restricted to the
/// fields actually present in `_source`.
pub fn expand_action(request: &UpdateRequest) -> (Value, Value) {
    let action = json!({
        "update": {
            "_index": &request.index,
            "_type": DOC_TYPE,
            "_id": &request.id,
        }
    });

    let handlers: Map<String, Value> = FIELD_CONFIG
        .iter()
        .filter(|(field, _)| request.source.contains_key(*field))
        .map(|(field, policy)| (field.to_string(), Value::from(*policy)))
        .collect();
    let body = json!({
        "script": {
            "inline": NOOP_SCRIPT,
            "lang": NOOP_SCRIPT_LANG,
            "params": {
                "handlers": handlers,
                "source": &request.source,
            }
        }
    });

    (action, body)
}

/// Encode a slice of requests as an NDJSON `_bulk` request body.
pub fn encode_bulk(requests: &[UpdateRequest]) -> String {
    let mut body = String::new();
    for request in requests {
        let (action, source) = expand_action(request);
        body.push_str(&action.to_string());
        body.push('\n');
        body.push_str(&source.to_string());
        body.push('\n');
    }
    body
}
