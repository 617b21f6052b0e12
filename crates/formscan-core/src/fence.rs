//! Markdown fence removal for model replies.

/// Remove ```` ```json ```` / ```` ``` ```` markers wherever they appear and trim.
///
/// Models asked for raw JSON still wrap it in a fenced block often enough
/// that every reply goes through this before parsing. Applying it twice is
/// the same as applying it once.
pub fn strip_fences(body: &str) -> String {
    body.replace("```json", "")
        .replace("```JSON", "")
        .replace("```", "")
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unwraps_json_fence() {
        let body = "```json\n{\"a\": 1}\n```";
        assert_eq!(strip_fences(body), "{\"a\": 1}");
    }

    #[test]
    fn unwraps_bare_fence() {
        assert_eq!(strip_fences("```\n{}\n```\n"), "{}");
    }

    #[test]
    fn clean_body_untouched() {
        assert_eq!(strip_fences("  {\"a\": 1} "), "{\"a\": 1}");
    }

    #[test]
    fn idempotent() {
        let once = strip_fences("```json\n{\"name\": \"x\"}\n```");
        assert_eq!(strip_fences(&once), once);
    }
}
