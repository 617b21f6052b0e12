//! Core types for OCR-assisted record intake: field schemas, domain profiles,
//! extraction results and record drafts.

pub mod draft;
pub mod fence;
pub mod profile;
pub mod result;
pub mod schema;

pub use draft::{DraftError, IdentifierMinter, RecordDraft};
pub use fence::strip_fences;
pub use profile::{
    Check, DEPARTMENTS, DomainProfile, DraftMapping, EMPLOYEE, FormRule, INVENTORY,
    IdentifierPolicy, IdentifierSpec,
};
pub use result::{ExtractionResult, FieldValue, ReplyError};
pub use schema::{ExtractionSchema, FieldKind, FieldSpec, SchemaError};
