//! Column projection for the identifier export
//!
//! A projection is the ordered list of output columns. The first column is
//! the identifier; the rest are auxiliary fields copied as plain text.

use mongodb::bson::Document;
use serde_json::{Map, Value, json};

use crate::config::ColumnConfig;
use crate::error::{ConfigError, Result};

use super::query::IDS_PARAM;
use super::row::{ExportRow, lookup_path, optional_text};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Projection {
    columns: Vec<ColumnConfig>,
}

impl Projection {
    pub fn new(columns: Vec<ColumnConfig>) -> Result<Self> {
        if columns.is_empty() {
            return Err(ConfigError::MissingField("projection.columns".into()).into());
        }
        Ok(Self { columns })
    }

    pub fn headers(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.header.clone()).collect()
    }

    pub fn width(&self) -> usize {
        self.columns.len()
    }

    pub fn id_field(&self) -> &str {
        &self.columns[0].field
    }

    /// Project a document; `None` when it has no usable identifier
    pub fn project(&self, doc: &Document) -> Option<ExportRow> {
        let id = optional_text(lookup_path(doc, self.id_field()));
        if id.trim().is_empty() {
            return None;
        }

        let fields = self.columns[1..]
            .iter()
            .map(|c| optional_text(lookup_path(doc, &c.field)))
            .collect();

        Some(ExportRow::Record { id, fields })
    }

    /// Row for an identifier the store did not return
    pub fn placeholder(&self, id: &str) -> ExportRow {
        ExportRow::Record {
            id: id.to_string(),
            fields: vec![String::new(); self.width() - 1],
        }
    }

    /// Default batch query: match on the uppercased identifier, keep only projected fields
    pub fn default_ids_query(&self) -> String {
        let id_path = format!("${}", self.id_field());

        let mut project = Map::new();
        project.insert("_id".to_string(), json!(0));
        for column in &self.columns {
            project.insert(column.field.clone(), json!(1));
        }

        json!([
            { "$match": { "$expr": { "$in": [
                { "$toUpper": { "$toString": id_path } },
                IDS_PARAM
            ] } } },
            { "$project": Value::Object(project) }
        ])
        .to_string()
    }
}
