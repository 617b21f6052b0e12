//! Domain profiles: one value per kind of paper document the pipeline reads.
//!
//! A profile carries everything that differs between the employee enrollment
//! form and the inventory label: the extraction schema, the instruction
//! rules sent to the model, how a confirmed result becomes a record draft,
//! the target collection and the form validation rules. The pipeline itself
//! is shared.

use crate::schema::{ExtractionSchema, FieldSpec};

/// Departments accepted by the employee record form.
pub const DEPARTMENTS: &[&str] = &[
    "Engineering",
    "Human Resources",
    "Sales",
    "Marketing",
    "Finance",
    "Operations",
];

/// When a draft gets a generated identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentifierPolicy {
    /// The field is never asked of the model; always generate.
    Always,
    /// Keep the extracted value; generate only if it came back blank.
    WhenBlank,
}

/// Client-side identifier synthesized on confirmation, e.g. `EMP-4821`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdentifierSpec {
    /// Draft field that receives the identifier.
    pub field: &'static str,
    pub prefix: &'static str,
    pub policy: IdentifierPolicy,
}

/// How a confirmed extraction maps onto the target record's field names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DraftMapping {
    /// `(extraction field, record field)` pairs; unlisted fields keep their name.
    pub renames: &'static [(&'static str, &'static str)],
    pub identifier: Option<IdentifierSpec>,
    /// Replace blank date fields with today's date.
    pub fill_blank_dates: bool,
}

impl DraftMapping {
    /// Record field name for an extraction field.
    pub fn target(&self, source: &'static str) -> &'static str {
        self.renames
            .iter()
            .find(|(from, _)| *from == source)
            .map(|(_, to)| *to)
            .unwrap_or(source)
    }
}

/// A single validation check of the record form.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Check {
    /// Non-blank text.
    Required,
    /// Text with at least this many characters after trimming.
    MinLength(usize),
    /// Well-formed e-mail address.
    Email,
    /// Text equal to one of the listed values.
    OneOf(&'static [&'static str]),
    /// Number greater than or equal to the bound.
    AtLeast(f64),
}

/// Validation rule for one record field, with the message shown on failure.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FormRule {
    pub field: &'static str,
    pub check: Check,
    pub message: &'static str,
}

/// Everything domain-specific about one intake flow.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DomainProfile {
    pub name: &'static str,
    /// What the document is called in the instructions.
    pub document: &'static str,
    /// Who the model should act as.
    pub persona: &'static str,
    pub schema: ExtractionSchema,
    /// Extra instruction lines appended after the field list.
    pub rules: &'static [&'static str],
    pub draft: DraftMapping,
    /// Record Store collection that confirmed records are created in.
    pub collection: &'static str,
    pub form_rules: &'static [FormRule],
}

const COMMON_RULES: &[&str] = &[
    "If handwritten text is ambiguous, infer from context.",
    "If a field is completely missing or illegible, return an empty string (text) or 0 (number).",
    "Set confidence between 0 and 1 based on how legible the document is.",
    "Do not return Markdown code blocks, just the JSON object.",
];

const EMPLOYEE_FIELDS: &[FieldSpec] = &[
    FieldSpec::text("fullName", "Full Name", "Look for \"Full Name\"."),
    FieldSpec::text("email", "Email", "Look for \"Email Address\"."),
    FieldSpec::text("department", "Department", "Look for \"Department\"."),
    FieldSpec::text(
        "designation",
        "Role",
        "Look for \"Job Role\" or \"Designation\".",
    ),
    FieldSpec::number(
        "salary",
        "Salary",
        "Look for \"Annual Salary\" or \"CTC\". Return only the number (e.g., 500000). \
         Remove currency symbols like \u{20b9}, Rs, INR, or commas.",
    ),
    FieldSpec::date(
        "joinDate",
        "Join Date",
        "Look for \"Join Date\". Convert ANY date format found (e.g., \"12th Jan 2024\", \
         \"12/01/2024\") into strict ISO format \"YYYY-MM-DD\".",
    ),
];

const EMPLOYEE_FORM: &[FormRule] = &[
    FormRule {
        field: "fullName",
        check: Check::MinLength(2),
        message: "Name is required",
    },
    FormRule {
        field: "email",
        check: Check::Email,
        message: "Invalid email",
    },
    FormRule {
        field: "employeeId",
        check: Check::MinLength(3),
        message: "ID required",
    },
    FormRule {
        field: "department",
        check: Check::OneOf(DEPARTMENTS),
        message: "Unknown department",
    },
    FormRule {
        field: "designation",
        check: Check::MinLength(2),
        message: "Role required",
    },
    FormRule {
        field: "salary",
        check: Check::AtLeast(1.0),
        message: "Salary must be positive",
    },
    FormRule {
        field: "joinDate",
        check: Check::Required,
        message: "Date required",
    },
];

/// Employee enrollment form.
pub const EMPLOYEE: DomainProfile = DomainProfile {
    name: "employee",
    document: "Employee Enrollment Form",
    persona: "an advanced OCR AI for Indian HR documents",
    schema: ExtractionSchema::new(EMPLOYEE_FIELDS),
    rules: COMMON_RULES,
    draft: DraftMapping {
        renames: &[],
        identifier: Some(IdentifierSpec {
            field: "employeeId",
            prefix: "EMP",
            policy: IdentifierPolicy::Always,
        }),
        fill_blank_dates: true,
    },
    collection: "employees",
    form_rules: EMPLOYEE_FORM,
};

const INVENTORY_FIELDS: &[FieldSpec] = &[
    FieldSpec::text(
        "name",
        "Product Name",
        "Look for the product title or item description.",
    ),
    FieldSpec::text(
        "sku",
        "SKU",
        "Look for \"SKU\", \"Item Code\" or \"Part No\".",
    ),
    FieldSpec::text(
        "category",
        "Category",
        "Infer a short category (e.g., Electronics, Stationery) if none is printed.",
    ),
    FieldSpec::text(
        "supplier",
        "Supplier",
        "Look for \"Supplier\", \"Vendor\", \"Manufacturer\" or the seller on an invoice.",
    ),
    FieldSpec::number(
        "price",
        "Price",
        "Look for \"MRP\", \"Unit Price\" or \"Rate\". Return only the number. \
         Remove currency symbols like \u{20b9}, Rs, INR, or commas.",
    ),
    FieldSpec::number(
        "quantity",
        "Quantity",
        "Look for \"Qty\" or \"Quantity\". Return a whole number.",
    ),
];

const INVENTORY_FORM: &[FormRule] = &[
    FormRule {
        field: "name",
        check: Check::MinLength(2),
        message: "Product name is required",
    },
    FormRule {
        field: "sku",
        check: Check::MinLength(3),
        message: "SKU required",
    },
    FormRule {
        field: "category",
        check: Check::Required,
        message: "Category required",
    },
    FormRule {
        field: "price",
        check: Check::AtLeast(0.0),
        message: "Price cannot be negative",
    },
    FormRule {
        field: "quantity",
        check: Check::AtLeast(0.0),
        message: "Quantity cannot be negative",
    },
];

/// Product label or supplier invoice line.
pub const INVENTORY: DomainProfile = DomainProfile {
    name: "inventory",
    document: "Product Label / Invoice",
    persona: "an advanced OCR AI for retail inventory documents",
    schema: ExtractionSchema::new(INVENTORY_FIELDS),
    rules: COMMON_RULES,
    draft: DraftMapping {
        renames: &[],
        identifier: Some(IdentifierSpec {
            field: "sku",
            prefix: "SKU",
            policy: IdentifierPolicy::WhenBlank,
        }),
        fill_blank_dates: true,
    },
    collection: "inventory",
    form_rules: INVENTORY_FORM,
};

const BUILT_IN: &[DomainProfile] = &[EMPLOYEE, INVENTORY];

impl DomainProfile {
    /// All built-in profiles.
    pub fn all() -> &'static [DomainProfile] {
        BUILT_IN
    }

    pub fn by_name(name: &str) -> Option<&'static DomainProfile> {
        Self::all()
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(name.trim()))
    }

    /// Record field names a confirmed draft will carry, in schema order with
    /// the generated identifier (if it is not already a schema field) first.
    pub fn draft_fields(&self) -> Vec<&'static str> {
        let mut names = Vec::with_capacity(self.schema.len() + 1);
        if let Some(id) = self.draft.identifier
            && self.schema.field(id.field).is_none()
        {
            names.push(id.field);
        }
        names.extend(self.schema.names().map(|n| self.draft.target(n)));
        names
    }
}
