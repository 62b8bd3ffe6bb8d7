use std::sync::LazyLock;

use regex::Regex;

use crate::token::TokenKind;

/// Rewrites the matched text of a token. Returning `None` drops the token; the lexer still moves
/// past the matched text.
pub type Transform = fn(&str) -> Option<String>;

#[derive(Debug, Clone)]
pub struct Rule {
    pub kind: TokenKind,
    pattern: Regex,
    transform: Option<Transform>,
}

impl Rule {
    /// Build a rule from a regular expression. The pattern is anchored, so it only ever matches
    /// at the lexer's current position.
    pub fn new(kind: TokenKind, pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            kind,
            pattern: Regex::new(&format!("^(?:{pattern})"))?,
            transform: None,
        })
    }

    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = Some(transform);
        self
    }

    /// A rule whose matches are consumed without producing tokens.
    pub fn discard(kind: TokenKind, pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self::new(kind, pattern)?.with_transform(|_| None))
    }

    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }

    pub(crate) fn find<'a>(&self, rest: &'a str) -> Option<&'a str> {
        self.pattern.find(rest).map(|m| m.as_str())
    }

    pub(crate) fn apply(&self, text: &str) -> Option<String> {
        match self.transform {
            Some(transform) => transform(text),
            None => Some(text.to_string()),
        }
    }
}

static DEFAULT_RULES: LazyLock<Vec<Rule>> = LazyLock::new(|| {
    // Order matters: `**` has to be tried before `*`.
    [
        (TokenKind::Whitespace, r"\s+"),
        (TokenKind::Number, r"(?:[0-9]+\.?[0-9]*|\.[0-9]+)(?:[eE][+-]?[0-9]+)?"),
        (TokenKind::Identifier, r"[A-Za-z_][A-Za-z0-9_]*"),
        (TokenKind::Caret, r"\*\*"),
        (TokenKind::Caret, r"\^"),
        (TokenKind::Star, r"\*"),
        (TokenKind::Slash, r"/"),
        (TokenKind::Percent, r"%"),
        (TokenKind::Plus, r"\+"),
        (TokenKind::Minus, r"-"),
        (TokenKind::Equals, r"="),
        (TokenKind::OpenParen, r"\("),
        (TokenKind::CloseParen, r"\)"),
        (TokenKind::Comma, r","),
        (TokenKind::Semicolon, r";"),
    ]
    .into_iter()
    .map(|(kind, pattern)| {
        let rule = match kind {
            TokenKind::Whitespace => Rule::discard(kind, pattern),
            _ => Rule::new(kind, pattern),
        }
        .expect("built-in lexer pattern compiles");

        match kind {
            TokenKind::Caret => rule.with_transform(|_| Some("^".to_string())),
            _ => rule,
        }
    })
    .collect()
});

/// The rule list for the expression grammar.
pub fn default_rules() -> &'static [Rule] {
    &DEFAULT_RULES
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn patterns_are_anchored() {
        let rule = Rule::new(TokenKind::Number, "[0-9]+").unwrap();
        assert_eq!(rule.find("12ab"), Some("12"));
        assert_eq!(rule.find("ab12"), None);
        assert_eq!(rule.pattern(), "^(?:[0-9]+)");
    }

    #[test]
    fn transforms() {
        let upper = Rule::new(TokenKind::Identifier, "[a-z]+")
            .unwrap()
            .with_transform(|text| Some(text.to_uppercase()));
        assert_eq!(upper.apply("abc"), Some("ABC".to_string()));

        let ws = Rule::discard(TokenKind::Whitespace, r"\s+").unwrap();
        assert_eq!(ws.apply("  "), None);
    }

    #[test]
    fn invalid_pattern_is_reported() {
        assert!(Rule::new(TokenKind::Number, "(").is_err());
    }
}
