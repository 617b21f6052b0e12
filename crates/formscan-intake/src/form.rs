//! Record form: the editable, validated step between a draft and the store.

use chrono::NaiveDate;
use formscan_core::{
    Check, DomainProfile, DraftError, ExtractionResult, FieldKind, FieldValue, FormRule,
    IdentifierMinter, RecordDraft, SchemaError,
};
use formscan_store::{Fields, RecordStore, StoreError, StoredRecord};
use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;
use tracing::{debug, info};

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid email regex"));

/// One failed form rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    pub field: &'static str,
    pub message: &'static str,
}

#[derive(Debug, Error)]
pub enum FormError {
    #[error("{} field(s) failed validation", .0.len())]
    Invalid(Vec<Violation>),

    #[error(transparent)]
    Field(#[from] SchemaError),

    #[error(transparent)]
    Draft(#[from] DraftError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Values of one record being created or edited.
#[derive(Debug, Clone)]
pub struct RecordForm {
    profile: &'static DomainProfile,
    record_id: Option<String>,
    fields: Fields,
}

impl RecordForm {
    /// Empty form for manual entry, with a fresh identifier and today's dates.
    pub fn blank(
        profile: &'static DomainProfile,
        minter: &mut IdentifierMinter,
        today: NaiveDate,
    ) -> Result<Self, FormError> {
        let empty = ExtractionResult::fallback(&profile.schema, today);
        let draft = RecordDraft::from_confirmed(profile, &empty, minter, today)?;
        Ok(Self::prefilled(profile, draft))
    }

    /// New-record form pre-filled from a confirmed draft.
    pub fn prefilled(profile: &'static DomainProfile, draft: RecordDraft) -> Self {
        Self {
            profile,
            record_id: None,
            fields: draft.into_fields(),
        }
    }

    /// Form for changing a record already in the store.
    pub fn editing(profile: &'static DomainProfile, id: impl Into<String>, fields: Fields) -> Self {
        Self {
            profile,
            record_id: Some(id.into()),
            fields,
        }
    }

    pub fn from_record(profile: &'static DomainProfile, record: &StoredRecord) -> Self {
        Self::editing(profile, record.id.clone(), record.fields.clone())
    }

    pub fn profile(&self) -> &'static DomainProfile {
        self.profile
    }

    pub fn record_id(&self) -> Option<&str> {
        self.record_id.as_deref()
    }

    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.fields.get(field)
    }

    pub fn fields(&self) -> &Fields {
        &self.fields
    }

    /// Kind of a record field; generated identifiers are text.
    fn kind_of(&self, field: &str) -> Option<FieldKind> {
        let draft = &self.profile.draft;
        if let Some(spec) = self
            .profile
            .schema
            .fields()
            .iter()
            .find(|spec| draft.target(spec.name) == field)
        {
            return Some(spec.kind);
        }
        draft
            .identifier
            .filter(|id| id.field == field)
            .map(|_| FieldKind::Text)
    }

    /// Replace one field with user-typed text.
    pub fn set(&mut self, field: &str, input: &str) -> Result<(), FormError> {
        let kind = self
            .kind_of(field)
            .ok_or_else(|| SchemaError::UnknownField(field.to_string()))?;
        let value = FieldValue::parse(field, kind, input)?;
        self.fields.insert(field.to_string(), value);
        Ok(())
    }

    /// Every rule the current values break, in rule order.
    pub fn violations(&self) -> Vec<Violation> {
        self.profile
            .form_rules
            .iter()
            .filter(|rule| !passes(rule, self.fields.get(rule.field)))
            .map(|rule| Violation {
                field: rule.field,
                message: rule.message,
            })
            .collect()
    }

    pub fn validate(&self) -> Result<(), FormError> {
        let violations = self.violations();
        if violations.is_empty() {
            Ok(())
        } else {
            debug!(profile = self.profile.name, count = violations.len(), "form invalid");
            Err(FormError::Invalid(violations))
        }
    }

    /// Validate, then create the record (or update the one being edited).
    /// Returns the record id.
    pub async fn submit<S: RecordStore + ?Sized>(&self, store: &S) -> Result<String, FormError> {
        self.validate()?;
        let collection = self.profile.collection;
        match &self.record_id {
            Some(id) => {
                store.update(collection, id, self.fields.clone()).await?;
                Ok(id.clone())
            }
            None => {
                let id = store.create(collection, self.fields.clone()).await?;
                info!(profile = self.profile.name, collection, id = %id, "record submitted");
                Ok(id)
            }
        }
    }
}

fn passes(rule: &FormRule, value: Option<&FieldValue>) -> bool {
    let Some(value) = value else {
        return false;
    };
    match rule.check {
        Check::Required => !value.is_blank(),
        Check::MinLength(n) => value
            .as_text()
            .is_some_and(|s| s.trim().chars().count() >= n),
        Check::Email => value.as_text().is_some_and(|s| EMAIL_RE.is_match(s.trim())),
        Check::OneOf(allowed) => value.as_text().is_some_and(|s| allowed.contains(&s.trim())),
        Check::AtLeast(min) => value.as_number().is_some_and(|n| n >= min),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use formscan_core::{EMPLOYEE, INVENTORY};
    use formscan_store::{MemoryStore, OrderBy};
    use futures::StreamExt;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()
    }

    fn employee_draft(email: &str) -> RecordDraft {
        let body = format!(
            r#"{{"fullName":"Asha Rao","email":"{email}","department":"Engineering",
               "designation":"SDE2","salary":1200000,"joinDate":"2024-03-01","confidence":0.9}}"#
        );
        let result = ExtractionResult::from_reply(&EMPLOYEE.schema, &body, today()).unwrap();
        RecordDraft::from_confirmed(&EMPLOYEE, &result, &mut IdentifierMinter::seeded(1), today())
            .unwrap()
    }

    fn fields_of(violations: Vec<Violation>) -> Vec<&'static str> {
        violations.into_iter().map(|v| v.field).collect()
    }

    #[test]
    fn complete_employee_is_valid() {
        let form = RecordForm::prefilled(&EMPLOYEE, employee_draft("asha@example.com"));
        assert!(form.validate().is_ok());
    }

    #[test]
    fn blank_email_is_flagged() {
        let form = RecordForm::prefilled(&EMPLOYEE, employee_draft(""));
        assert_eq!(fields_of(form.violations()), vec!["email"]);
    }

    #[test]
    fn blank_employee_form_lists_every_missing_field() {
        let form = RecordForm::blank(&EMPLOYEE, &mut IdentifierMinter::new(), today()).unwrap();
        assert_eq!(
            fields_of(form.violations()),
            vec!["fullName", "email", "department", "designation", "salary"]
        );
        assert_eq!(form.get("joinDate"), Some(&FieldValue::from("2024-03-01")));
    }

    #[test]
    fn department_must_be_known() {
        let mut form = RecordForm::prefilled(&EMPLOYEE, employee_draft("asha@example.com"));
        form.set("department", "Skunkworks").unwrap();
        let Err(FormError::Invalid(v)) = form.validate() else {
            panic!("expected invalid form");
        };
        assert_eq!(v[0].message, "Unknown department");
    }

    #[test]
    fn set_parses_by_kind() {
        let mut form = RecordForm::prefilled(&EMPLOYEE, employee_draft("asha@example.com"));
        form.set("salary", "Rs. 9,00,000").unwrap();
        assert_eq!(form.get("salary"), Some(&FieldValue::Number(900_000.0)));

        form.set("employeeId", "EMP-0042").unwrap();
        assert_eq!(form.get("employeeId"), Some(&FieldValue::from("EMP-0042")));

        assert!(matches!(
            form.set("salary", "lots"),
            Err(FormError::Field(SchemaError::InvalidNumber { .. }))
        ));
        assert!(matches!(
            form.set("nickname", "Ash"),
            Err(FormError::Field(SchemaError::UnknownField(_)))
        ));
    }

    #[test]
    fn inventory_allows_zero_stock_but_not_negative() {
        let mut form = RecordForm::blank(&INVENTORY, &mut IdentifierMinter::new(), today()).unwrap();
        form.set("name", "Gel Pen").unwrap();
        form.set("category", "Stationery").unwrap();
        assert!(form.validate().is_ok());

        form.set("quantity", "-3").unwrap();
        assert_eq!(fields_of(form.violations()), vec!["quantity"]);
    }

    #[tokio::test]
    async fn invalid_form_never_reaches_the_store() {
        let store = MemoryStore::new();
        let form = RecordForm::prefilled(&EMPLOYEE, employee_draft(""));
        assert!(matches!(form.submit(&store).await, Err(FormError::Invalid(_))));
        assert!(store.is_empty("employees"));
    }

    #[tokio::test]
    async fn submit_creates_then_updates() {
        let store = MemoryStore::new();
        let mut stream = store.subscribe("employees", OrderBy::default());
        assert!(stream.next().await.unwrap().is_empty());

        let form = RecordForm::prefilled(&EMPLOYEE, employee_draft("asha@example.com"));
        let id = form.submit(&store).await.unwrap();

        let snapshot = stream.next().await.unwrap();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].id, id);
        assert_eq!(snapshot[0].fields.get("fullName"), Some(&FieldValue::from("Asha Rao")));

        let mut edit = RecordForm::from_record(&EMPLOYEE, &snapshot[0]);
        edit.set("designation", "SDE3").unwrap();
        assert_eq!(edit.submit(&store).await.unwrap(), id);

        let snapshot = stream.next().await.unwrap();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].fields.get("designation"), Some(&FieldValue::from("SDE3")));
    }

    #[tokio::test]
    async fn editing_a_missing_record_fails() {
        let store = MemoryStore::new();
        let blank = RecordForm::blank(&INVENTORY, &mut IdentifierMinter::new(), Utc::now().date_naive())
            .unwrap();
        let mut form = RecordForm::editing(&INVENTORY, "nope", blank.fields().clone());
        form.set("name", "Stapler").unwrap();
        form.set("category", "Stationery").unwrap();
        assert!(matches!(
            form.submit(&store).await,
            Err(FormError::Store(StoreError::NotFound { .. }))
        ));
    }
}
