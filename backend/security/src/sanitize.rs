//! Input sanitization for text destined for display or storage.
//!
//! This is a best-effort textual filter, not an HTML parser. It removes the
//! obvious active-content carriers (script-like blocks, inline event
//! handlers, script URL schemes) and bounds the length. Treat it as one
//! heuristic layer; it is not a security boundary on its own.

use once_cell::sync::Lazy;
use regex::Regex;

/// Limit for commands and command-adjacent text.
pub const MAX_COMMAND_CHARS: usize = 10_000;
/// Limit for file content.
pub const MAX_CONTENT_CHARS: usize = 1_000_000;

static BLOCK_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?is)<script\b.*?</script\s*>|<iframe\b.*?</iframe\s*>|<object\b.*?</object\s*>|<embed\b.*?</embed\s*>",
    )
    .unwrap()
});

/// Opening or self-closing tags left behind without a matching close.
static OPEN_TAG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)</?(script|iframe|object|embed)\b[^>]*>").unwrap());

static EVENT_HANDLER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)\s+on[a-z]+\s*=\s*("[^"]*"|'[^']*'|[^\s>]+)"#).unwrap()
});

static SCRIPT_SCHEME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(javascript|vbscript)\s*:").unwrap());

/// Strip active content and truncate to `max_chars` characters.
pub fn sanitize(input: &str, max_chars: usize) -> String {
    let cleaned = BLOCK_RE.replace_all(input, "");
    let cleaned = OPEN_TAG_RE.replace_all(&cleaned, "");
    let cleaned = EVENT_HANDLER_RE.replace_all(&cleaned, "");
    let cleaned = SCRIPT_SCHEME_RE.replace_all(&cleaned, "");
    truncate_chars(&cleaned, max_chars)
}

pub fn sanitize_command(input: &str) -> String {
    sanitize(input, MAX_COMMAND_CHARS)
}

pub fn sanitize_content(input: &str) -> String {
    sanitize(input, MAX_CONTENT_CHARS)
}

fn truncate_chars(input: &str, max_chars: usize) -> String {
    match input.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => input[..byte_idx].to_string(),
        None => input.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_script_blocks() {
        let out = sanitize_content("before<SCRIPT type='x'>alert(1)</script >after");
        assert_eq!(out, "beforeafter");
    }

    #[test]
    fn strips_unclosed_embeds_and_iframes() {
        let out = sanitize_content(r#"<iframe src="https://evil">text<embed src=x>"#);
        assert!(!out.to_lowercase().contains("<iframe"));
        assert!(!out.to_lowercase().contains("<embed"));
        assert!(out.contains("text"));
    }

    #[test]
    fn strips_event_handlers_and_script_schemes() {
        let out = sanitize_content(r#"<a href="javascript:steal()" onclick="go()">x</a>"#);
        assert!(!out.contains("onclick"));
        assert!(!out.to_lowercase().contains("javascript:"));
        assert!(out.contains(">x</a>"));
    }

    #[test]
    fn truncates_on_char_boundaries() {
        let input = "é".repeat(20);
        let out = sanitize(&input, 5);
        assert_eq!(out.chars().count(), 5);
    }

    #[test]
    fn command_limit_is_ten_thousand_chars() {
        let long = "a".repeat(MAX_COMMAND_CHARS + 50);
        assert_eq!(sanitize_command(&long).len(), MAX_COMMAND_CHARS);
    }

    #[test]
    fn plain_commands_pass_through() {
        assert_eq!(sanitize_command("git log --oneline"), "git log --oneline");
    }
}
