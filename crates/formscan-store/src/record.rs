use std::cmp::Ordering;
use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use formscan_core::FieldValue;
use serde::Serialize;

/// Field values of one record, keyed by record field name.
pub type Fields = BTreeMap<String, FieldValue>;

/// Pseudo-field that orders by insertion time.
pub const CREATED_AT: &str = "createdAt";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredRecord {
    pub id: String,
    #[serde(flatten)]
    pub fields: Fields,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    /// Insertion sequence; breaks `created_at` ties.
    #[serde(skip)]
    pub(crate) seq: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub field: String,
    pub direction: Direction,
}

impl Default for OrderBy {
    /// Newest first.
    fn default() -> Self {
        Self::desc(CREATED_AT)
    }
}

impl OrderBy {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: Direction::Asc,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: Direction::Desc,
        }
    }

    pub(crate) fn sorted(&self, records: &[StoredRecord]) -> Vec<StoredRecord> {
        let mut out = records.to_vec();
        out.sort_by(|a, b| {
            let ord = self.compare(a, b);
            match self.direction {
                Direction::Asc => ord,
                Direction::Desc => ord.reverse(),
            }
        });
        out
    }

    fn compare(&self, a: &StoredRecord, b: &StoredRecord) -> Ordering {
        let primary = if self.field == CREATED_AT {
            a.created_at.cmp(&b.created_at)
        } else {
            compare_values(a.fields.get(&self.field), b.fields.get(&self.field))
        };
        primary.then(a.seq.cmp(&b.seq))
    }
}

/// Numbers before text; missing values sort first.
fn compare_values(a: Option<&FieldValue>, b: Option<&FieldValue>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(FieldValue::Number(x)), Some(FieldValue::Number(y))) => x.total_cmp(y),
        (Some(FieldValue::Number(_)), Some(FieldValue::Text(_))) => Ordering::Less,
        (Some(FieldValue::Text(_)), Some(FieldValue::Number(_))) => Ordering::Greater,
        (Some(FieldValue::Text(x)), Some(FieldValue::Text(y))) => x.to_lowercase().cmp(&y.to_lowercase()),
    }
}
