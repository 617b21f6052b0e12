//! Extraction schemas: the fixed, named and typed fields a model is asked to
//! populate for one kind of document.

use thiserror::Error;

/// Scalar type of an extracted field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Number,
    /// ISO 8601 calendar date (`YYYY-MM-DD`), carried as text.
    Date,
}

impl FieldKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Number => "number",
            Self::Date => "date",
        }
    }
}

/// One named field of an [`ExtractionSchema`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    /// Human label as printed on the paper form.
    pub label: &'static str,
    pub kind: FieldKind,
    /// Extraction hint rendered into the model instructions.
    pub hint: &'static str,
}

impl FieldSpec {
    pub const fn text(name: &'static str, label: &'static str, hint: &'static str) -> Self {
        Self {
            name,
            label,
            kind: FieldKind::Text,
            hint,
        }
    }

    pub const fn number(name: &'static str, label: &'static str, hint: &'static str) -> Self {
        Self {
            name,
            label,
            kind: FieldKind::Number,
            hint,
        }
    }

    pub const fn date(name: &'static str, label: &'static str, hint: &'static str) -> Self {
        Self {
            name,
            label,
            kind: FieldKind::Date,
            hint,
        }
    }
}

/// Ordered, compile-time-known set of fields for one domain.
///
/// `confidence` is never part of the schema; every result carries it
/// separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractionSchema {
    fields: &'static [FieldSpec],
}

impl ExtractionSchema {
    pub const fn new(fields: &'static [FieldSpec]) -> Self {
        Self { fields }
    }

    pub fn fields(&self) -> &'static [FieldSpec] {
        self.fields
    }

    pub fn field(&self, name: &str) -> Option<&'static FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> {
        self.fields.iter().map(|f| f.name)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum SchemaError {
    #[error("unknown field: {0}")]
    UnknownField(String),

    #[error("field {field} expects a {expected} value")]
    KindMismatch { field: String, expected: &'static str },

    #[error("field {field}: {input:?} is not a number")]
    InvalidNumber { field: String, input: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIELDS: &[FieldSpec] = &[
        FieldSpec::text("name", "Name", ""),
        FieldSpec::number("price", "Price", "digits only"),
    ];

    #[test]
    fn lookup_by_name() {
        let schema = ExtractionSchema::new(FIELDS);
        assert_eq!(schema.len(), 2);
        assert_eq!(schema.field("price").map(|f| f.kind), Some(FieldKind::Number));
        assert!(schema.field("confidence").is_none());
    }

    #[test]
    fn names_keep_declaration_order() {
        let schema = ExtractionSchema::new(FIELDS);
        assert_eq!(schema.names().collect::<Vec<_>>(), vec!["name", "price"]);
    }
}
