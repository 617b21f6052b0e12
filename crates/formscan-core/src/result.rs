//! Extraction results: the model's structured guess about one document.
//!
//! A result always carries every field of its schema. Replies from the model
//! are conformed to the schema here (missing keys filled, unknown keys
//! dropped, numbers coerced) so nothing downstream ever sees a partial
//! object.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{NaiveDate, Utc};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::fence::strip_fences;
use crate::schema::{ExtractionSchema, FieldKind, FieldSpec, SchemaError};

/// Scalar value of one field. Dates are carried as ISO text.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Number(f64),
    Text(String),
}

impl FieldValue {
    /// Value used when nothing was extracted: empty text, zero, or today's date.
    pub fn empty(kind: FieldKind, today: NaiveDate) -> Self {
        match kind {
            FieldKind::Text => Self::Text(String::new()),
            FieldKind::Number => Self::Number(0.0),
            FieldKind::Date => Self::Text(iso_date(today)),
        }
    }

    /// Parse text typed by a user into a value of the given kind.
    ///
    /// An empty number reads as zero.
    pub fn parse(field: &str, kind: FieldKind, input: &str) -> Result<Self, SchemaError> {
        let trimmed = input.trim();
        match kind {
            FieldKind::Text | FieldKind::Date => Ok(Self::Text(trimmed.to_string())),
            FieldKind::Number if trimmed.is_empty() => Ok(Self::Number(0.0)),
            FieldKind::Number => {
                parse_number(trimmed)
                    .map(Self::Number)
                    .ok_or_else(|| SchemaError::InvalidNumber {
                        field: field.to_string(),
                        input: input.to_string(),
                    })
            }
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            Self::Number(_) => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Text(_) => None,
        }
    }

    /// Text that is empty after trimming. Numbers are never blank.
    pub fn is_blank(&self) -> bool {
        matches!(self, Self::Text(s) if s.trim().is_empty())
    }

    pub fn matches_kind(&self, kind: FieldKind) -> bool {
        match self {
            Self::Number(_) => kind == FieldKind::Number,
            Self::Text(_) => kind != FieldKind::Number,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => write!(f, "{}", *n as i64),
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<f64> for FieldValue {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

pub(crate) fn iso_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Read a number the way it tends to be printed on forms and labels.
///
/// Currency markers and digit-group separators are skipped:
/// `"\u{20b9} 5,00,000"` → 500000, `"Rs. 1,200.50"` → 1200.5, `"Qty: 12 pcs"` → 12.
/// A space only separates groups of exactly three digits (`"1 200 000"`).
pub fn parse_number(input: &str) -> Option<f64> {
    let first_digit = input.find(|c: char| c.is_ascii_digit())?;
    // A dot right before the digits is a decimal point unless it ends an
    // abbreviation such as "Rs.".
    let prefix = &input[..first_digit];
    let start = match prefix.strip_suffix('.') {
        Some(before) if !before.ends_with(|c: char| c.is_alphabetic()) => first_digit - 1,
        _ => first_digit,
    };
    let negative = input[..start].trim_end().ends_with('-');

    let chars: Vec<char> = input[start..].chars().collect();
    let mut digits = String::new();
    for (i, &c) in chars.iter().enumerate() {
        match c {
            '0'..='9' | '.' => digits.push(c),
            ',' | '_' | '\'' => {}
            ' ' | '\u{a0}' if is_thousands_group(&chars[i + 1..]) => {}
            _ => break,
        }
    }

    let digits = digits.trim_end_matches('.');
    let value: f64 = if digits.starts_with('.') {
        format!("0{digits}").parse().ok()?
    } else {
        digits.parse().ok()?
    };
    Some(if negative { -value } else { value })
}

/// Exactly three digits, then the end or a non-digit.
fn is_thousands_group(rest: &[char]) -> bool {
    rest.len() >= 3
        && rest[..3].iter().all(char::is_ascii_digit)
        && rest.get(3).is_none_or(|c| !c.is_ascii_digit())
}

/// Why a model reply could not be read as an [`ExtractionResult`].
#[derive(Debug, Error)]
pub enum ReplyError {
    #[error("reply is empty after removing code fences")]
    Blank,

    #[error("reply is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("reply is a JSON {0}, expected an object")]
    NotAnObject(&'static str),

    #[error("field {field}: expected {expected}, found JSON {found}")]
    FieldShape {
        field: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("field {field}: {value:?} is not a number")]
    InvalidNumber { field: String, value: String },
}

/// One document's extracted fields plus the model's self-reported confidence.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtractionResult {
    #[serde(flatten)]
    fields: BTreeMap<String, FieldValue>,
    confidence: f32,
}

impl ExtractionResult {
    /// The zero-confidence result substituted whenever extraction fails.
    pub fn fallback(schema: &ExtractionSchema, today: NaiveDate) -> Self {
        let fields = schema
            .fields()
            .iter()
            .map(|f| (f.name.to_string(), FieldValue::empty(f.kind, today)))
            .collect();
        Self {
            fields,
            confidence: 0.0,
        }
    }

    /// [`fallback`](Self::fallback) dated with the current UTC day.
    pub fn fallback_now(schema: &ExtractionSchema) -> Self {
        Self::fallback(schema, Utc::now().date_naive())
    }

    /// Parse a raw model reply, fenced or not.
    pub fn from_reply(
        schema: &ExtractionSchema,
        body: &str,
        today: NaiveDate,
    ) -> Result<Self, ReplyError> {
        let cleaned = strip_fences(body);
        if cleaned.is_empty() {
            return Err(ReplyError::Blank);
        }
        let value: Value = serde_json::from_str(&cleaned)?;
        Self::from_json(schema, &value, today)
    }

    /// Conform an already-parsed JSON object to `schema`.
    pub fn from_json(
        schema: &ExtractionSchema,
        value: &Value,
        today: NaiveDate,
    ) -> Result<Self, ReplyError> {
        let Value::Object(map) = value else {
            return Err(ReplyError::NotAnObject(json_type(value)));
        };

        let mut fields = BTreeMap::new();
        for spec in schema.fields() {
            let v = match map.get(spec.name) {
                None | Some(Value::Null) => FieldValue::empty(spec.kind, today),
                Some(raw) => coerce(spec, raw)?,
            };
            fields.insert(spec.name.to_string(), v);
        }

        let confidence = match map.get("confidence") {
            None | Some(Value::Null) => 0.0,
            Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
            Some(Value::String(s)) => parse_number(s).unwrap_or(0.0),
            Some(other) => {
                return Err(ReplyError::FieldShape {
                    field: "confidence".into(),
                    expected: "number",
                    found: json_type(other),
                });
            }
        };

        Ok(Self {
            fields,
            confidence: normalize_confidence(confidence),
        })
    }

    /// Advisory only; shown to the user, never used for decisions.
    pub fn confidence(&self) -> f32 {
        self.confidence
    }

    /// Confidence as a whole percentage for display.
    pub fn confidence_percent(&self) -> u8 {
        (self.confidence * 100.0).round() as u8
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(FieldValue::as_text)
    }

    pub fn number(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(FieldValue::as_number)
    }

    /// Fields in name order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Override one field. The value must match the field's kind.
    pub fn set(
        &mut self,
        schema: &ExtractionSchema,
        name: &str,
        value: FieldValue,
    ) -> Result<(), SchemaError> {
        let spec = schema
            .field(name)
            .ok_or_else(|| SchemaError::UnknownField(name.to_string()))?;
        if !value.matches_kind(spec.kind) {
            return Err(SchemaError::KindMismatch {
                field: name.to_string(),
                expected: spec.kind.as_str(),
            });
        }
        self.fields.insert(name.to_string(), value);
        Ok(())
    }

    /// True when the keys are exactly the schema's fields, each of the right kind.
    pub fn conforms_to(&self, schema: &ExtractionSchema) -> bool {
        self.fields.len() == schema.len()
            && schema.fields().iter().all(|spec| {
                self.fields
                    .get(spec.name)
                    .is_some_and(|v| v.matches_kind(spec.kind))
            })
    }
}

fn coerce(spec: &FieldSpec, raw: &Value) -> Result<FieldValue, ReplyError> {
    match (spec.kind, raw) {
        (FieldKind::Text | FieldKind::Date, Value::String(s)) => Ok(FieldValue::Text(s.trim().to_string())),
        (FieldKind::Text | FieldKind::Date, Value::Number(n)) => Ok(FieldValue::Text(n.to_string())),
        (FieldKind::Number, Value::Number(n)) => Ok(FieldValue::Number(n.as_f64().unwrap_or(0.0))),
        (FieldKind::Number, Value::String(s)) if s.trim().is_empty() => Ok(FieldValue::Number(0.0)),
        (FieldKind::Number, Value::String(s)) => {
            parse_number(s)
                .map(FieldValue::Number)
                .ok_or_else(|| ReplyError::InvalidNumber {
                    field: spec.name.to_string(),
                    value: s.clone(),
                })
        }
        (kind, other) => Err(ReplyError::FieldShape {
            field: spec.name.to_string(),
            expected: kind.as_str(),
            found: json_type(other),
        }),
    }
}

/// Clamp to [0, 1]. Values in (1, 100] are read as percentages.
/// Values from 2 up to 100 are percentages; anything else is clamped to [0, 1].
fn normalize_confidence(raw: f64) -> f32 {
    let scaled = if (2.0..=100.0).contains(&raw) { raw / 100.0 } else { raw };
    scaled.clamp(0.0, 1.0) as f32
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
