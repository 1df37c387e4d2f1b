//! Pulling a JSON object out of free-form model output.

/// Locate the JSON object inside `text`: first `{` through last `}`.
///
/// Markdown fences and prose around the object fall outside those bounds.
/// Returns `None` when no object bounds exist.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let trimmed = text.trim();
    match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(start), Some(end)) if end > start => Some(&trimmed[start..=end]),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_object() {
        assert_eq!(extract_json_object(" {\"a\": 1} "), Some("{\"a\": 1}"));
    }

    #[test]
    fn json_fence() {
        let text = "Here you go:\n```json\n{\"user_name\": \"Alice\"}\n```\nDone.";
        assert_eq!(extract_json_object(text), Some("{\"user_name\": \"Alice\"}"));
    }

    #[test]
    fn plain_fence() {
        let text = "```\n{\"x\": true}\n```";
        assert_eq!(extract_json_object(text), Some("{\"x\": true}"));
    }

    #[test]
    fn object_inside_prose() {
        let text = "The parameters are {\"a\": {\"b\": 2}} as requested.";
        assert_eq!(extract_json_object(text), Some("{\"a\": {\"b\": 2}}"));
    }

    #[test]
    fn spans_first_open_to_last_close() {
        let text = "```json\n{\"a\": 1}\n```\nAlternatively {\"a\": 2}";
        assert_eq!(
            extract_json_object(text),
            Some("{\"a\": 1}\n```\nAlternatively {\"a\": 2}")
        );
    }

    #[test]
    fn no_object() {
        assert_eq!(extract_json_object("no json here"), None);
        assert_eq!(extract_json_object("} backwards {"), None);
    }
}
