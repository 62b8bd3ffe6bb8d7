mod rules;

use log::trace;
pub use rules::{default_rules, Rule, Transform};

use crate::error::LexError;
use crate::token::{Span, Token};

/// Tokenize `text` with an ordered rule list. `None` is rejected up front instead of being
/// treated as an empty string.
pub fn lex<'source>(
    text: impl Into<Option<&'source str>>,
    rules: &[Rule],
) -> Result<Vec<Token>, LexError> {
    let text = text.into().ok_or(LexError::MissingInput)?;
    Lexer::new(text, rules).collect()
}

/// Walks the source one token at a time. At every position the rules are tried in order and the
/// first one that matches there wins, even when a later rule would match more text.
pub struct Lexer<'rules, 'source> {
    rules: &'rules [Rule],
    source: &'source str,
    position: usize,
}

impl<'rules, 'source> Lexer<'rules, 'source> {
    pub fn new(source: &'source str, rules: &'rules [Rule]) -> Self {
        Self {
            rules,
            source,
            position: 0,
        }
    }

    fn no_match(&mut self) -> LexError {
        let offset = self.position;
        let found = self.source[offset..]
            .chars()
            .next()
            .expect("not at the end of the source");

        // Nothing after a failure is meaningful, so stop here.
        self.position = self.source.len();

        LexError::NoMatch {
            found,
            offset,
            text: self.source.to_string(),
            span: (offset, found.len_utf8()).into(),
        }
    }
}

impl<'rules, 'source> Iterator for Lexer<'rules, 'source> {
    type Item = Result<Token, LexError>;

    fn next(&mut self) -> Option<Self::Item> {
        'tokens: loop {
            if self.position >= self.source.len() {
                return None;
            }

            let source = self.source;
            let rest = &source[self.position..];
            for rule in self.rules {
                let Some(found) = rule.find(rest) else {
                    continue;
                };

                let start = self.position;
                if found.is_empty() {
                    self.position = self.source.len();
                    return Some(Err(LexError::EmptyMatch {
                        rule: rule.kind,
                        text: self.source.to_string(),
                        span: (start, 0).into(),
                    }));
                }

                self.position += found.len();
                let span = Span::new(start, self.position);
                match rule.apply(found) {
                    Some(text) => {
                        trace!("lexed {} {text:?} at {}..{}", rule.kind, span.start, span.end);
                        return Some(Ok(Token {
                            kind: rule.kind,
                            text,
                            span,
                        }));
                    }
                    None => continue 'tokens,
                }
            }

            return Some(Err(self.no_match()));
        }
    }
}
