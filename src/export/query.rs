//! Query definitions handed to the store.

use mongodb::bson::Bson;

/// Name of the parameter carrying one batch of normalized identifiers.
pub const IDS_PARAM: &str = "@ids";

/// A query text plus its named parameters.
///
/// The text is opaque to the export engine; only the store adapter knows how
/// to interpret it and where the parameters go. Built once and never mutated.
#[derive(Debug, Clone, PartialEq)]
pub struct QuerySpec {
    text: String,
    params: Vec<QueryParam>,
}

/// A named query parameter, e.g. `@ids` bound to an array of identifiers.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryParam {
    pub name: String,
    pub value: Bson,
}

impl QuerySpec {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            params: Vec::new(),
        }
    }

    /// Bind a parameter. Binding the same name twice keeps the later value.
    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<Bson>) -> Self {
        let name = name.into();
        let value = value.into();
        match self.params.iter_mut().find(|p| p.name == name) {
            Some(existing) => existing.value = value,
            None => self.params.push(QueryParam { name, value }),
        }
        self
    }

    /// Query for one identifier batch, binding the ids under [`IDS_PARAM`].
    pub fn for_ids(text: impl Into<String>, ids: &[String]) -> Self {
        let values: Vec<Bson> = ids.iter().cloned().map(Bson::String).collect();
        Self::new(text).with_param(IDS_PARAM, Bson::Array(values))
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn params(&self) -> &[QueryParam] {
        &self.params
    }

    pub fn param(&self, name: &str) -> Option<&Bson> {
        self.params.iter().find(|p| p.name == name).map(|p| &p.value)
    }
}
