#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// The smallest span covering both `self` and `other`.
    pub fn to(self, other: Span) -> Self {
        Self {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.end - self.start
    }
}

impl From<Span> for miette::SourceSpan {
    fn from(span: Span) -> Self {
        (span.start, span.len()).into()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub span: Span,
}

impl Token {
    /// True when no whitespace (or any other discarded text) separates `self` from `next`.
    pub fn touches(&self, next: &Token) -> bool {
        self.span.end == next.span.start
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum TokenKind {
    // Discarded by the default rules, but a custom rule list may keep it
    Whitespace,

    // Punctuation
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Caret,
    Equals,
    OpenParen,
    CloseParen,
    Comma,
    Semicolon,

    // Identifiers
    Identifier,

    // Literals
    Number,
}

impl std::fmt::Display for TokenKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TokenKind::Whitespace => "whitespace",
            TokenKind::Plus => "'+'",
            TokenKind::Minus => "'-'",
            TokenKind::Star => "'*'",
            TokenKind::Slash => "'/'",
            TokenKind::Percent => "'%'",
            TokenKind::Caret => "'^'",
            TokenKind::Equals => "'='",
            TokenKind::OpenParen => "'('",
            TokenKind::CloseParen => "')'",
            TokenKind::Comma => "','",
            TokenKind::Semicolon => "';'",
            TokenKind::Identifier => "identifier",
            TokenKind::Number => "number",
        };

        f.write_str(name)
    }
}
