//! Terminal rendering of profiles, reviewed extractions and form errors.

use formscan_core::{DomainProfile, ExtractionResult};
use formscan_intake::Violation;

// ── Profiles ──

pub fn print_profile(profile: &DomainProfile) {
    println!("=== {} ===", profile.name);
    println!("{} -> {}", profile.document, profile.collection);
    for spec in profile.schema.fields() {
        println!("  {:<14} {:<8} {}", spec.name, spec.kind.as_str(), spec.label);
    }
    if let Some(id) = profile.draft.identifier {
        println!("  {:<14} {:<8} generated as {}-####", id.field, "text", id.prefix);
    }
    println!();
}

// ── Review ──

/// Vertical card of one extraction, in schema order.
pub fn print_review(profile: &DomainProfile, result: &ExtractionResult, notice: Option<&str>) {
    println!("=== {} ===", profile.document);
    println!("Confidence: {}%", result.confidence_percent());
    if let Some(notice) = notice {
        println!("! {notice}");
    }
    println!();
    for spec in profile.schema.fields() {
        let value = result.get(spec.name).map(ToString::to_string).unwrap_or_default();
        let shown = if value.is_empty() { "-" } else { value.as_str() };
        println!("  {:<14} {}", spec.label, shown);
    }
    println!();
}

// ── Validation ──

pub fn print_violations(violations: &[Violation]) {
    eprintln!("The record form has {} problem(s):", violations.len());
    for v in violations {
        eprintln!("  {:<14} {}", v.field, v.message);
    }
}
