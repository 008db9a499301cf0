//! Output rows and plain-text rendering of document values.

use mongodb::bson::{Bson, Document};

/// One output row before CSV formatting
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportRow {
    /// Single-column value from the scalar export
    Scalar(String),
    /// Identifier plus auxiliary fields, in projection order
    Record { id: String, fields: Vec<String> },
}

impl ExportRow {
    /// Identifier of a record row
    pub fn id(&self) -> Option<&str> {
        match self {
            ExportRow::Scalar(_) => None,
            ExportRow::Record { id, .. } => Some(id),
        }
    }

    /// Fields in output order
    pub fn into_fields(self) -> Vec<String> {
        match self {
            ExportRow::Scalar(value) => vec![value],
            ExportRow::Record { id, mut fields } => {
                fields.insert(0, id);
                fields
            }
        }
    }
}

/// Resolve a dotted path such as `address.city` inside a document.
pub fn lookup_path<'a>(doc: &'a Document, path: &str) -> Option<&'a Bson> {
    let mut parts = path.split('.');
    let mut current = doc.get(parts.next()?)?;
    for part in parts {
        current = match current {
            Bson::Document(inner) => inner.get(part)?,
            Bson::Array(items) => items.get(part.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Render a value as plain text for a CSV cell.
///
/// Null and missing values become the empty string. Nested documents and
/// arrays are written as relaxed extended JSON.
pub fn bson_to_text(value: &Bson) -> String {
    match value {
        Bson::String(s) => s.clone(),
        Bson::Int32(n) => n.to_string(),
        Bson::Int64(n) => n.to_string(),
        Bson::Double(f) => f.to_string(),
        Bson::Boolean(b) => b.to_string(),
        Bson::Null | Bson::Undefined => String::new(),
        Bson::ObjectId(oid) => oid.to_hex(),
        Bson::DateTime(dt) => dt
            .try_to_rfc3339_string()
            .unwrap_or_else(|_| dt.timestamp_millis().to_string()),
        Bson::Decimal128(d) => d.to_string(),
        Bson::Document(_) | Bson::Array(_) => value.clone().into_relaxed_extjson().to_string(),
        other => other.to_string(),
    }
}

/// Text of an optional value, empty when absent
pub fn optional_text(value: Option<&Bson>) -> String {
    value.map(bson_to_text).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson::doc;

    #[test]
    fn test_record_fields_start_with_id() {
        let row = ExportRow::Record {
            id: "X1".into(),
            fields: vec!["a".into(), String::new()],
        };
        assert_eq!(row.id(), Some("X1"));
        assert_eq!(row.into_fields(), vec!["X1", "a", ""]);
        assert_eq!(ExportRow::Scalar("v".into()).into_fields(), vec!["v"]);
    }

    #[test]
    fn test_lookup_path() {
        let doc = doc! {
            "id": "A",
            "address": { "city": "Oslo", "lines": ["1 Main St", "Apt 2"] },
        };
        assert_eq!(lookup_path(&doc, "id"), Some(&Bson::String("A".into())));
        assert_eq!(
            lookup_path(&doc, "address.city"),
            Some(&Bson::String("Oslo".into()))
        );
        assert_eq!(
            lookup_path(&doc, "address.lines.1"),
            Some(&Bson::String("Apt 2".into()))
        );
        assert!(lookup_path(&doc, "address.zip").is_none());
        assert!(lookup_path(&doc, "id.deeper").is_none());
    }

    #[test]
    fn test_plain_text_conversion() {
        assert_eq!(bson_to_text(&Bson::String("test".into())), "test");
        assert_eq!(bson_to_text(&Bson::Int32(42)), "42");
        assert_eq!(bson_to_text(&Bson::Int64(100)), "100");
        assert_eq!(bson_to_text(&Bson::Boolean(true)), "true");
        assert_eq!(bson_to_text(&Bson::Null), "");
        assert_eq!(optional_text(None), "");
        assert_eq!(
            bson_to_text(&Bson::Document(doc! { "a": 1 })),
            r#"{"a":1}"#
        );
    }
}
