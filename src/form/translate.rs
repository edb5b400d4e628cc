//! Maps backend error text onto the messages shown in the form.

const INVALID_CREDENTIALS_PREFIX: &str = "invalid notion credentials: ";
const DETECTION_PREFIX: &str = "property detection failed: ";

/// Substring-matches a backend message; unmatched messages pass through.
pub fn translate_backend_error(message: Option<&str>) -> String {
    let Some(message) = message.map(str::trim).filter(|message| !message.is_empty()) else {
        return "Please paste a conversation before sending.".to_string();
    };
    let lowered = message.to_lowercase();

    if lowered.contains("not configured") {
        return "Notion is not configured yet. Add your API key and database ID in the settings.".to_string();
    }

    if lowered.contains("content is required") {
        return "Please paste a conversation before sending.".to_string();
    }
    if lowered.contains("api key and database id are required") {
        return "Both the Notion API key and the database ID are required.".to_string();
    }

    if lowered.contains("invalid notion credentials") || lowered.contains("invalid credentials") {
        return format!("Invalid Notion credentials: {}", detail_after(message, INVALID_CREDENTIALS_PREFIX));
    }

    if lowered.contains("no property") || lowered.contains("title property") {
        return "The Notion database has no title property. Add one and try again.".to_string();
    }

    if lowered.contains("property detection") {
        return format!(
            "Could not detect the database properties: {}",
            detail_after(message, DETECTION_PREFIX)
        );
    }

    message.to_string()
}

/// Text following an ASCII `prefix`, matched case-insensitively on the
/// original message; the whole message when the prefix is absent.
fn detail_after<'a>(message: &'a str, prefix: &str) -> &'a str {
    message
        .char_indices()
        .map(|(start, _)| start)
        .find(|&start| {
            message
                .get(start..start + prefix.len())
                .is_some_and(|candidate| candidate.eq_ignore_ascii_case(prefix))
        })
        .map_or(message, |start| &message[start + prefix.len()..])
}

#[cfg(test)]
mod tests {
    use super::translate_backend_error;

    #[test]
    fn known_messages_are_rewritten() {
        assert!(translate_backend_error(Some(
            "Notion is not configured. Please configure your credentials first."
        ))
        .starts_with("Notion is not configured yet"));
        assert_eq!(
            translate_backend_error(Some("Chat content is required")),
            "Please paste a conversation before sending."
        );
        assert_eq!(
            translate_backend_error(Some("API key and database ID are required")),
            "Both the Notion API key and the database ID are required."
        );
        assert_eq!(
            translate_backend_error(Some("Invalid Notion credentials: API token is invalid.")),
            "Invalid Notion credentials: API token is invalid."
        );
        assert!(translate_backend_error(Some(
            "No property of type 'title' found in the database. Please create a title property."
        ))
        .contains("no title property"));
    }

    #[test]
    fn detail_survives_case_mappings_that_change_width() {
        assert_eq!(
            translate_backend_error(Some("\u{212A}: invalid notion credentials: token \u{130}\u{130} rejected")),
            "Invalid Notion credentials: token \u{130}\u{130} rejected"
        );
        assert_eq!(
            translate_backend_error(Some("Property detection failed: \u{1E9E}tatus")),
            "Could not detect the database properties: \u{1E9E}tatus"
        );
    }

    #[test]
    fn form_messages_naming_properties_pass_through() {
        for message in [
            "Required properties are missing: Content, API key",
            "The following properties do not exist in Notion: Content",
        ] {
            assert_eq!(translate_backend_error(Some(message)), message);
        }
    }

    #[test]
    fn empty_and_unknown_messages() {
        assert_eq!(translate_backend_error(None), "Please paste a conversation before sending.");
        assert_eq!(translate_backend_error(Some("  ")), "Please paste a conversation before sending.");
        assert_eq!(translate_backend_error(Some("Rate limited")), "Rate limited");
    }
}
