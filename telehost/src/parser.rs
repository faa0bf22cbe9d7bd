//! Command parsing
//!
//! Turns raw message text into a prefix and a token sequence.

/// A message that looks like a command invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCommand {
    /// The prefix that matched
    pub prefix: String,

    /// Whitespace-separated tokens after the prefix, never empty
    pub tokens: Vec<String>,
}

/// Parse `text` against `prefixes`.
///
/// Prefixes are tried in order and the first one that `text` starts with is
/// used, even if a later, longer prefix would also match. Returns `None` when
/// no prefix matches or nothing but whitespace follows it.
pub fn parse<S: AsRef<str>>(text: &str, prefixes: &[S]) -> Option<ParsedCommand> {
    let prefix = prefixes
        .iter()
        .map(AsRef::as_ref)
        .find(|p| !p.is_empty() && text.starts_with(p))?;

    let rest = text[prefix.len()..].trim();
    if rest.is_empty() {
        return None;
    }

    let tokens: Vec<String> = rest.split_whitespace().map(str::to_string).collect();
    if tokens.is_empty() {
        return None;
    }

    Some(ParsedCommand {
        prefix: prefix.to_string(),
        tokens,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_basic() {
        let parsed = parse(".ping now", &["."]).unwrap();
        assert_eq!(parsed.prefix, ".");
        assert_eq!(parsed.tokens, vec!["ping", "now"]);
    }

    #[test]
    fn test_parse_collapses_whitespace() {
        let parsed = parse(".google   search \t cats\n", &["."]).unwrap();
        assert_eq!(parsed.tokens, vec!["google", "search", "cats"]);
    }

    #[test]
    fn test_parse_without_prefix() {
        for text in ["ping", " .ping", "", "hello . world"] {
            assert!(parse(text, &[".", "!"]).is_none(), "{text:?} should not parse");
        }
    }

    #[test]
    fn test_parse_prefix_only() {
        assert!(parse(".", &["."]).is_none());
        assert!(parse(".   ", &["."]).is_none());
    }

    #[test]
    fn test_parse_first_match_wins() {
        // "!" comes first, so "!!" never gets a chance
        let parsed = parse("!!ping", &["!", "!!"]).unwrap();
        assert_eq!(parsed.prefix, "!");
        assert_eq!(parsed.tokens, vec!["!ping"]);

        let parsed = parse("!!ping", &["!!", "!"]).unwrap();
        assert_eq!(parsed.prefix, "!!");
        assert_eq!(parsed.tokens, vec!["ping"]);
    }

    #[test]
    fn test_parse_multibyte_prefix() {
        let parsed = parse("。help", &[".", "。"]).unwrap();
        assert_eq!(parsed.prefix, "。");
        assert_eq!(parsed.tokens, vec!["help"]);
    }
}
