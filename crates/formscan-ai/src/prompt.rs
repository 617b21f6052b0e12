//! Instruction and response-schema rendering for a [`DomainProfile`].

use formscan_core::{DomainProfile, ExtractionSchema, FieldKind};
use serde_json::{Map, Value, json};

const CONFIDENCE_DESCRIPTION: &str = "Confidence score 0-1 based on legibility";

/// Instructions sent alongside an inline image.
pub fn image_instructions(profile: &DomainProfile) -> String {
    format!(
        "You are {persona}. Analyze this {document} image.\n\
         \n\
         Extract the following fields into strict JSON:\n\
         {fields}\n\
         \n\
         Rules:\n\
         {rules}",
        persona = profile.persona,
        document = profile.document,
        fields = field_list(profile),
        rules = rule_list(profile),
    )
}

/// Instructions for the text overload, where recognition already happened
/// elsewhere and only the raw text is available.
pub fn text_instructions(profile: &DomainProfile, raw_text: &str) -> String {
    format!(
        "You are {persona}. The text below was recognised from a scanned {document}; \
         it may contain recognition mistakes, broken lines and stray characters.\n\
         \n\
         Extract the following fields into strict JSON:\n\
         {fields}\n\
         \n\
         Rules:\n\
         {rules}\n\
         \n\
         Source text:\n\
         {raw_text}",
        persona = profile.persona,
        document = profile.document,
        fields = field_list(profile),
        rules = rule_list(profile),
        raw_text = raw_text.trim(),
    )
}

fn field_list(profile: &DomainProfile) -> String {
    profile
        .schema
        .fields()
        .iter()
        .enumerate()
        .map(|(i, f)| format!("{}. **{}** (`{}`): {}", i + 1, f.label, f.name, f.hint))
        .collect::<Vec<_>>()
        .join("\n")
}

fn rule_list(profile: &DomainProfile) -> String {
    profile
        .rules
        .iter()
        .map(|r| format!("- {r}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// JSON schema (in the model API's OpenAPI subset) for a structured reply.
///
/// Every field plus `confidence` is listed; all schema fields are required.
pub fn response_schema(schema: &ExtractionSchema) -> Value {
    let mut properties = Map::new();
    for field in schema.fields() {
        let property = match field.kind {
            FieldKind::Text => json!({ "type": "STRING" }),
            FieldKind::Number => json!({ "type": "NUMBER" }),
            FieldKind::Date => json!({ "type": "STRING", "description": "ISO date YYYY-MM-DD" }),
        };
        properties.insert(field.name.to_string(), property);
    }
    properties.insert(
        "confidence".to_string(),
        json!({ "type": "NUMBER", "description": CONFIDENCE_DESCRIPTION }),
    );

    let required: Vec<&str> = schema.names().collect();
    json!({
        "type": "OBJECT",
        "properties": properties,
        "required": required,
    })
}
