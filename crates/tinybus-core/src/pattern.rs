//! Pattern matching and address parsing
//!
//! Addresses use two forms:
//! - `module.action` for requests
//! - `module:event` for events, subscriptions and routes
//!
//! Patterns may contain `*`, which matches any run of characters (including
//! none, and including separators). Every other character matches itself,
//! case-sensitively, and a pattern must cover the whole text.

/// Separator found while parsing an address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Separator {
    /// `.`, a request address.
    Action,
    /// `:`, an event address.
    Event,
    /// Bare module name.
    None,
}

/// A parsed `module<sep>member` address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Address<'a> {
    /// Module name.
    pub module: &'a str,
    /// Action or event name; empty for a bare module name.
    pub member: &'a str,
    /// Which separator split the address.
    pub separator: Separator,
}

/// Check whether `pattern` matches the whole of `text`.
pub fn matches(pattern: &str, text: &str) -> bool {
    match_bytes(pattern.as_bytes(), text.as_bytes())
}

fn match_bytes(mut pattern: &[u8], mut text: &[u8]) -> bool {
    while let (Some(&p), Some(&t)) = (pattern.first(), text.first()) {
        if p == b'*' {
            let rest = skip_stars(pattern);
            if rest.is_empty() {
                return true;
            }
            // Each recursion consumes one star run, so depth is bounded by
            // the pattern, not the text.
            return (0..text.len()).any(|split| match_bytes(rest, &text[split..]));
        }
        if p != t {
            return false;
        }
        pattern = &pattern[1..];
        text = &text[1..];
    }
    skip_stars(pattern).is_empty() && text.is_empty()
}

fn skip_stars(pattern: &[u8]) -> &[u8] {
    let stars = pattern.iter().take_while(|&&b| b == b'*').count();
    &pattern[stars..]
}

/// Split an address on its first `.` or `:`.
///
/// Returns `None` when the module segment is longer than `max_name_len`.
/// The member segment is truncated to `max_name_len` instead.
pub fn parse(pattern: &str, max_name_len: usize) -> Option<Address<'_>> {
    let Some(index) = pattern.find(['.', ':']) else {
        return Some(Address {
            module: truncate(pattern, max_name_len),
            member: "",
            separator: Separator::None,
        });
    };

    let module = &pattern[..index];
    if module.len() > max_name_len {
        return None;
    }
    let separator = if pattern.as_bytes()[index] == b'.' {
        Separator::Action
    } else {
        Separator::Event
    };
    Some(Address {
        module,
        member: truncate(&pattern[index + 1..], max_name_len),
        separator,
    })
}

/// Cut `text` to at most `max_len` bytes, on a character boundary.
pub fn truncate(text: &str, max_len: usize) -> &str {
    if text.len() <= max_len {
        return text;
    }
    let mut end = max_len;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

/// Build the `source:event` key that subscriptions and routes match against.
pub fn event_key(source: &str, event: &str, max_pattern_len: usize) -> String {
    let key = format!("{}:{}", source, event);
    truncate(&key, max_pattern_len).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_patterns() {
        assert!(matches("led1:on", "led1:on"));
        assert!(!matches("led1:on", "led1:off"));
        assert!(!matches("led1", "led10"));
        assert!(!matches("LED1", "led1"));
        assert!(matches("", ""));
        assert!(!matches("", "x"));
    }

    #[test]
    fn test_star_matches_everything() {
        assert!(matches("*", ""));
        assert!(matches("*", "btn1:short_press"));
        assert!(matches("***", "anything.at:all"));
    }

    #[test]
    fn test_infix_star() {
        assert!(matches("a*c", "abc"));
        assert!(matches("a*c", "ac"));
        assert!(!matches("a*c", "ab"));
        assert!(matches("a*c", "a.b:c"));
    }

    #[test]
    fn test_subscription_shapes() {
        assert!(matches("btn*:short_press", "btn1:short_press"));
        assert!(matches("btn*:short_press", "btn2:short_press"));
        assert!(!matches("btn*:short_press", "led1:short_press"));
        assert!(!matches("btn*:short_press", "btn1:long_press"));
        assert!(matches("*:event1", "any:event1"));
        assert!(!matches("*:event1", "any:event2"));
        assert!(matches("src1:*", "src1:test_event"));
    }

    #[test]
    fn test_question_mark_is_literal() {
        assert!(!matches("led?", "led1"));
        assert!(matches("led?", "led?"));
    }

    #[test]
    fn test_pathological_stars() {
        let text = "a".repeat(40);
        assert!(!matches("*a*a*a*a*a*b", &text));
        assert!(matches("*a*a*a*a*a*", &text));
    }

    #[test]
    fn test_parse_request() {
        let addr = parse("led1.blink", 15).expect("Should parse");
        assert_eq!(addr.module, "led1");
        assert_eq!(addr.member, "blink");
        assert_eq!(addr.separator, Separator::Action);
    }

    #[test]
    fn test_parse_event_and_bare() {
        let addr = parse("btn1:long_press", 15).expect("Should parse");
        assert_eq!(addr.separator, Separator::Event);
        assert_eq!(addr.member, "long_press");

        let addr = parse("btn1", 15).expect("Should parse");
        assert_eq!(addr.module, "btn1");
        assert_eq!(addr.member, "");
        assert_eq!(addr.separator, Separator::None);
    }

    #[test]
    fn test_parse_splits_on_first_separator() {
        let addr = parse("a:b.c", 15).expect("Should parse");
        assert_eq!(addr.module, "a");
        assert_eq!(addr.member, "b.c");
        assert_eq!(addr.separator, Separator::Event);
    }

    #[test]
    fn test_parse_rejects_long_module() {
        assert!(parse("a_very_long_module_name.on", 15).is_none());
        let addr = parse("led.an_action_name_that_is_long", 15).expect("Should parse");
        assert_eq!(addr.member, "an_action_name_");
    }

    #[test]
    fn test_truncate_char_boundary() {
        assert_eq!(truncate("short", 15), "short");
        assert_eq!(truncate("abcdef", 3), "abc");
        assert_eq!(truncate("aé", 2), "a");
    }

    #[test]
    fn test_event_key() {
        assert_eq!(event_key("btn1", "short_press", 31), "btn1:short_press");
        assert_eq!(event_key("btn1", "short_press", 8), "btn1:sho");
    }
}
