//! Record drafts: confirmed extractions remapped onto a record's own fields.

use std::collections::{BTreeMap, HashSet};

use chrono::NaiveDate;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::profile::{DomainProfile, IdentifierPolicy};
use crate::result::{ExtractionResult, FieldValue, iso_date};
use crate::schema::FieldKind;

const ID_MIN: u32 = 1000;
const ID_MAX: u32 = 9999;
const ID_SPACE: usize = (ID_MAX - ID_MIN + 1) as usize;

#[derive(Debug, Error, PartialEq)]
pub enum DraftError {
    #[error("every {0}-#### identifier has been issued")]
    IdentifiersExhausted(String),
}

/// Issues short `PREFIX-####` identifiers, never the same one twice.
pub struct IdentifierMinter {
    issued: HashSet<String>,
    rng: StdRng,
}

impl Default for IdentifierMinter {
    fn default() -> Self {
        Self::new()
    }
}

impl IdentifierMinter {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    /// Deterministic sequence, for tests and reproducible runs.
    pub fn seeded(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        Self {
            issued: HashSet::new(),
            rng,
        }
    }

    /// Mark an identifier as taken, e.g. one already present in the Record Store.
    pub fn reserve(&mut self, id: impl Into<String>) {
        self.issued.insert(id.into());
    }

    pub fn issued(&self) -> usize {
        self.issued.len()
    }

    pub fn mint(&mut self, prefix: &str) -> Result<String, DraftError> {
        let taken = self
            .issued
            .iter()
            .filter(|id| id.strip_prefix(prefix).is_some_and(|rest| rest.starts_with('-')))
            .count();
        if taken >= ID_SPACE {
            return Err(DraftError::IdentifiersExhausted(prefix.to_string()));
        }

        // Random probing first; once the space gets crowded walk forward from a
        // random start so minting stays bounded.
        let mut n = self.rng.gen_range(ID_MIN..=ID_MAX);
        for _ in 0..32 {
            let id = format!("{prefix}-{n}");
            if !self.issued.contains(&id) {
                self.issued.insert(id.clone());
                return Ok(id);
            }
            n = self.rng.gen_range(ID_MIN..=ID_MAX);
        }
        for step in 0..ID_SPACE as u32 {
            let candidate = ID_MIN + (n - ID_MIN + step) % ID_SPACE as u32;
            let id = format!("{prefix}-{candidate}");
            if !self.issued.contains(&id) {
                self.issued.insert(id.clone());
                return Ok(id);
            }
        }
        Err(DraftError::IdentifiersExhausted(prefix.to_string()))
    }
}

/// Provisional, unsaved record values derived from a confirmed extraction.
///
/// Never persisted directly: it pre-fills the record form, and only a
/// submitted form reaches the Record Store.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordDraft {
    #[serde(skip)]
    profile: &'static str,
    #[serde(flatten)]
    fields: BTreeMap<String, FieldValue>,
}

impl RecordDraft {
    /// Build the draft for a confirmed result.
    ///
    /// Fields are renamed per the profile's mapping, blank dates become
    /// `today`, and the profile's identifier is minted if its policy asks.
    pub fn from_confirmed(
        profile: &DomainProfile,
        result: &ExtractionResult,
        minter: &mut IdentifierMinter,
        today: NaiveDate,
    ) -> Result<Self, DraftError> {
        let mapping = &profile.draft;
        let mut fields = BTreeMap::new();

        for spec in profile.schema.fields() {
            let value = match result.get(spec.name) {
                Some(v) if spec.kind == FieldKind::Date && mapping.fill_blank_dates && v.is_blank() => {
                    FieldValue::Text(iso_date(today))
                }
                Some(v) => v.clone(),
                None => FieldValue::empty(spec.kind, today),
            };
            fields.insert(mapping.target(spec.name).to_string(), value);
        }

        if let Some(id) = mapping.identifier {
            let needed = match id.policy {
                IdentifierPolicy::Always => true,
                IdentifierPolicy::WhenBlank => fields.get(id.field).is_none_or(FieldValue::is_blank),
            };
            if needed {
                let minted = minter.mint(id.prefix)?;
                debug!(profile = profile.name, field = id.field, id = %minted, "minted identifier");
                fields.insert(id.field.to_string(), FieldValue::Text(minted));
            }
        }

        Ok(Self {
            profile: profile.name,
            fields,
        })
    }

    /// Name of the profile this draft belongs to.
    pub fn profile(&self) -> &'static str {
        self.profile
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(FieldValue::as_text)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn into_fields(self) -> BTreeMap<String, FieldValue> {
        self.fields
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::{DraftMapping, EMPLOYEE, INVENTORY};
    use serde_json::json;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 19).unwrap()
    }

    fn is_emp_code(id: &str) -> bool {
        id.len() == 8
            && id.starts_with("EMP-")
            && id[4..].chars().all(|c| c.is_ascii_digit())
    }

    #[test]
    fn employee_draft_has_every_field_and_fresh_id() {
        let result = ExtractionResult::fallback(&EMPLOYEE.schema, today());
        let mut minter = IdentifierMinter::seeded(7);
        let draft = RecordDraft::from_confirmed(&EMPLOYEE, &result, &mut minter, today()).unwrap();

        for field in EMPLOYEE.draft_fields() {
            assert!(draft.get(field).is_some(), "missing {field}");
        }
        assert!(is_emp_code(draft.text("employeeId").unwrap()));
        assert_eq!(draft.profile(), "employee");
    }

    #[test]
    fn identifiers_unique_across_confirmations() {
        let result = ExtractionResult::fallback(&EMPLOYEE.schema, today());
        let mut minter = IdentifierMinter::seeded(1);
        let mut seen = HashSet::new();
        for _ in 0..500 {
            let draft =
                RecordDraft::from_confirmed(&EMPLOYEE, &result, &mut minter, today()).unwrap();
            let id = draft.text("employeeId").unwrap().to_string();
            assert!(is_emp_code(&id));
            assert!(seen.insert(id), "identifier repeated");
        }
    }

    #[test]
    fn minter_exhausts_cleanly() {
        let mut minter = IdentifierMinter::seeded(3);
        for _ in 0..ID_SPACE {
            minter.mint("T").unwrap();
        }
        assert_eq!(
            minter.mint("T"),
            Err(DraftError::IdentifiersExhausted("T".into()))
        );
        // Other prefixes are unaffected.
        assert!(minter.mint("EMP").is_ok());
    }

    #[test]
    fn reserved_identifiers_are_skipped() {
        let mut minter = IdentifierMinter::seeded(11);
        for n in ID_MIN..ID_MAX {
            minter.reserve(format!("EMP-{n}"));
        }
        assert_eq!(minter.mint("EMP").unwrap(), format!("EMP-{ID_MAX}"));
    }

    #[test]
    fn blank_join_date_defaults_to_today() {
        let value = json!({"fullName": "Asha Rao", "joinDate": ""});
        let result = ExtractionResult::from_json(&EMPLOYEE.schema, &value, today()).unwrap();
        let mut minter = IdentifierMinter::seeded(5);
        let draft = RecordDraft::from_confirmed(&EMPLOYEE, &result, &mut minter, today()).unwrap();
        assert_eq!(draft.text("joinDate"), Some("2026-10-19"));
    }

    #[test]
    fn extracted_sku_is_kept() {
        let value = json!({"name": "Stapler", "sku": "ST-220"});
        let result = ExtractionResult::from_json(&INVENTORY.schema, &value, today()).unwrap();
        let mut minter = IdentifierMinter::seeded(5);
        let draft = RecordDraft::from_confirmed(&INVENTORY, &result, &mut minter, today()).unwrap();
        assert_eq!(draft.text("sku"), Some("ST-220"));
        assert_eq!(minter.issued(), 0);
    }

    #[test]
    fn blank_sku_is_generated() {
        let result = ExtractionResult::fallback(&INVENTORY.schema, today());
        let mut minter = IdentifierMinter::seeded(5);
        let draft = RecordDraft::from_confirmed(&INVENTORY, &result, &mut minter, today()).unwrap();
        assert!(draft.text("sku").unwrap().starts_with("SKU-"));
    }

    #[test]
    fn renames_apply() {
        let profile = DomainProfile {
            draft: DraftMapping {
                renames: &[("quantity", "stock")],
                identifier: None,
                fill_blank_dates: false,
            },
            ..INVENTORY
        };
        let result = ExtractionResult::fallback(&profile.schema, today());
        let mut minter = IdentifierMinter::seeded(5);
        let draft = RecordDraft::from_confirmed(&profile, &result, &mut minter, today()).unwrap();
        assert!(draft.get("quantity").is_none());
        assert_eq!(draft.get("stock"), Some(&FieldValue::Number(0.0)));
    }

    #[test]
    fn serializes_without_profile() {
        let result = ExtractionResult::fallback(&INVENTORY.schema, today());
        let mut minter = IdentifierMinter::seeded(5);
        let draft = RecordDraft::from_confirmed(&INVENTORY, &result, &mut minter, today()).unwrap();
        let json = serde_json::to_value(&draft).unwrap();
        assert!(json.get("profile").is_none());
        assert_eq!(json["price"], json!(0.0));
    }
}
