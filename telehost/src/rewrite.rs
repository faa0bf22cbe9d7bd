//! Alias expansion into message text

use crate::message::Message;
use crate::parser::parse;
use crate::registry::CommandEntry;
use thiserror::Error;

/// The message no longer matches the alias it was resolved to
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RewriteError {
    #[error("Message is no longer a command")]
    NotACommand,

    #[error("Message does not start with alias {key:?}")]
    KeyMismatch { key: String },
}

/// The expansion to splice in, if `entry` calls for a rewrite
pub fn expansion(entry: &CommandEntry) -> Option<&str> {
    match (&entry.original, &entry.alias_final) {
        (Some(original), Some(expansion)) if expansion != original => Some(expansion),
        _ => None,
    }
}

/// Rewrite `message` so that the alias `key` at its start is replaced by
/// `expansion`, keeping whatever the user typed after the alias.
///
/// `.g cats` with alias `g` -> `google search` becomes
/// `.google search cats`. The input message is left untouched; the result
/// is a copy with only its text changed.
pub fn rewrite<S: AsRef<str>>(
    message: &Message,
    key: &str,
    expansion: &str,
    prefixes: &[S],
) -> Result<Message, RewriteError> {
    let parsed = parse(&message.text, prefixes).ok_or(RewriteError::NotACommand)?;

    let key_tokens: Vec<&str> = key.split_whitespace().collect();
    let matches = parsed.tokens.len() >= key_tokens.len()
        && parsed
            .tokens
            .iter()
            .zip(&key_tokens)
            .all(|(typed, expected)| typed == expected);
    if key_tokens.is_empty() || !matches {
        return Err(RewriteError::KeyMismatch {
            key: key.to_string(),
        });
    }

    let tokens: Vec<&str> = expansion
        .split_whitespace()
        .chain(parsed.tokens[key_tokens.len()..].iter().map(String::as_str))
        .collect();

    Ok(message.with_text(format!("{}{}", parsed.prefix, tokens.join(" "))))
}

#[cfg(test)]
mod tests {
    use super::*;

    const PREFIXES: &[&str] = &["."];

    #[test]
    fn test_rewrite_preserves_trailing_arguments() {
        let msg = Message::outgoing(1, 1, ".g cats");
        let out = rewrite(&msg, "g", "google search", PREFIXES).unwrap();
        assert_eq!(out.text, ".google search cats");
        assert_eq!(msg.text, ".g cats");
        assert_eq!(out.id, msg.id);
    }

    #[test]
    fn test_rewrite_multi_word_alias() {
        let msg = Message::outgoing(1, 1, ".foo bar  baz qux");
        let out = rewrite(&msg, "foo bar", "echo fixed", PREFIXES).unwrap();
        assert_eq!(out.text, ".echo fixed baz qux");
    }

    #[test]
    fn test_rewrite_without_trailing_arguments() {
        let msg = Message::outgoing(1, 1, ".g");
        let out = rewrite(&msg, "g", "google search", PREFIXES).unwrap();
        assert_eq!(out.text, ".google search");
    }

    #[test]
    fn test_rewrite_keeps_matched_prefix() {
        let msg = Message::outgoing(1, 1, "。g cats");
        let out = rewrite(&msg, "g", "google search", &[".", "。"]).unwrap();
        assert_eq!(out.text, "。google search cats");
    }

    #[test]
    fn test_rewrite_detects_changed_message() {
        let msg = Message::outgoing(1, 1, ".h cats");
        assert_eq!(
            rewrite(&msg, "g", "google search", PREFIXES),
            Err(RewriteError::KeyMismatch { key: "g".into() })
        );

        let msg = Message::outgoing(1, 1, ".foo");
        assert!(rewrite(&msg, "foo bar", "echo", PREFIXES).is_err());

        let msg = Message::outgoing(1, 1, "g cats");
        assert_eq!(
            rewrite(&msg, "g", "google search", PREFIXES),
            Err(RewriteError::NotACommand)
        );
    }
}
