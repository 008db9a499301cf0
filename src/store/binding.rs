//! Query text parsing and parameter binding
//!
//! Query text is a JSON aggregation pipeline (extended JSON is accepted). A
//! single JSON object is taken as a `$match` filter. Any string value that
//! is exactly a parameter name such as `"@ids"` is replaced by the bound value.

use mongodb::bson::{Bson, Document, doc};
use serde_json::Value;

use crate::error::FetchError;
use crate::export::QuerySpec;

/// Parse the query text and substitute its parameters
pub fn bind_pipeline(query: &QuerySpec) -> Result<Vec<Document>, FetchError> {
    let json: Value = serde_json::from_str(query.text())
        .map_err(|e| FetchError::InvalidQuery(format!("query is not valid JSON: {e}")))?;

    let stages = match json {
        Value::Array(stages) => stages,
        Value::Object(filter) => vec![serde_json::json!({ "$match": Value::Object(filter) })],
        other => {
            return Err(FetchError::InvalidQuery(format!(
                "expected a pipeline array or a filter object, found {other}"
            )));
        }
    };

    stages
        .into_iter()
        .map(|stage| {
            let bson = Bson::try_from(stage)
                .map_err(|e| FetchError::InvalidQuery(format!("invalid stage: {e}")))?;
            match substitute(bson, query)? {
                Bson::Document(stage) => Ok(stage),
                other => Err(FetchError::InvalidQuery(format!(
                    "pipeline stage must be an object, found {other}"
                ))),
            }
        })
        .collect()
}

fn substitute(value: Bson, query: &QuerySpec) -> Result<Bson, FetchError> {
    match value {
        Bson::String(s) if is_param_name(&s) => query
            .param(&s)
            .cloned()
            .ok_or(FetchError::UnboundParameter(s)),
        Bson::Array(items) => items
            .into_iter()
            .map(|item| substitute(item, query))
            .collect::<Result<Vec<_>, _>>()
            .map(Bson::Array),
        Bson::Document(doc) => {
            let mut out = doc! {};
            for (key, item) in doc {
                out.insert(key, substitute(item, query)?);
            }
            Ok(Bson::Document(out))
        }
        other => Ok(other),
    }
}

/// `@` followed by an identifier, e.g. `@ids` or `@since_ts`
fn is_param_name(s: &str) -> bool {
    let Some(name) = s.strip_prefix('@') else {
        return false;
    };
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
