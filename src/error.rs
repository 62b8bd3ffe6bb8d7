use miette::{Diagnostic, SourceSpan};
use thiserror::Error;

use crate::token::{Span, TokenKind};

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Any failure raised by the public operations. Each stage keeps its own error type, so callers
/// can tell a bad rule list from bad input from a failed evaluation.
#[derive(Debug, Diagnostic, Error)]
pub enum Error {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Lex(#[from] LexError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Eval(#[from] EvalError),
}

#[derive(Debug, Diagnostic, Error)]
pub enum LexError {
    #[error("no input text to tokenize")]
    #[diagnostic(code(expr_interpreter::lexer::missing_input))]
    MissingInput,

    #[error("lexer rule for {rule} matched an empty string")]
    #[diagnostic(
        code(expr_interpreter::lexer::empty_match),
        help("every rule pattern must consume at least one character")
    )]
    EmptyMatch {
        rule: TokenKind,
        #[source_code]
        text: String,
        #[label("rule for {rule} matched nothing here")]
        span: SourceSpan,
    },

    #[error("unexpected character {found:?} at offset {offset}")]
    #[diagnostic(code(expr_interpreter::lexer::no_match))]
    NoMatch {
        found: char,
        offset: usize,
        #[source_code]
        text: String,
        #[label("no token rule matches here")]
        span: SourceSpan,
    },
}

impl LexError {
    pub fn offset(&self) -> Option<usize> {
        match self {
            LexError::MissingInput => None,
            LexError::EmptyMatch { span, .. } => Some(span.offset()),
            LexError::NoMatch { offset, .. } => Some(*offset),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ParseErrorKind {
    #[error("no expression found")]
    EmptyInput,
    #[error("operator is missing its right-hand operand")]
    DanglingOperator,
    #[error("two operators in a row")]
    SuccessiveOperators,
    #[error("unclosed parenthesis")]
    UnclosedParenthesis,
    #[error("closing parenthesis without a matching '('")]
    UnmatchedParenthesis,
    #[error("assignment to non-lvalue")]
    AssignmentToNonLvalue,
    #[error("missing operator between operands")]
    MissingOperator,
    #[error("statements must be separated by ';'")]
    MissingSemicolon,
    #[error("unexpected token")]
    UnexpectedToken,
    #[error("unexpected end of input")]
    UnexpectedEndOfInput,
    #[error("malformed number")]
    MalformedNumber,
    #[error("expression is nested too deeply")]
    NestingTooDeep,
}

impl ParseErrorKind {
    fn label(&self) -> &'static str {
        match self {
            ParseErrorKind::EmptyInput => "expected an expression",
            ParseErrorKind::DanglingOperator => "expected an operand after this operator",
            ParseErrorKind::SuccessiveOperators => "expected an operand, found an operator",
            ParseErrorKind::UnclosedParenthesis => "this parenthesis is never closed",
            ParseErrorKind::UnmatchedParenthesis => "nothing to close here",
            ParseErrorKind::AssignmentToNonLvalue => "only a variable name can be assigned to",
            ParseErrorKind::MissingOperator => "implicit multiplication is not supported",
            ParseErrorKind::MissingSemicolon => "expected ';' before this statement",
            ParseErrorKind::UnexpectedToken => "unexpected token",
            ParseErrorKind::UnexpectedEndOfInput => "input ends here",
            ParseErrorKind::MalformedNumber => "not a valid number",
            ParseErrorKind::NestingTooDeep => "nesting limit reached here",
        }
    }
}

#[derive(Debug, Diagnostic, Error)]
#[error("{kind}")]
#[diagnostic(code(expr_interpreter::parser))]
pub struct ParseError {
    pub kind: ParseErrorKind,
    /// The offending source text. Empty when the input ended early.
    pub text: String,
    /// Byte offset of `text` in the source.
    pub offset: usize,
    #[source_code]
    source_code: String,
    #[label("{hint}")]
    span: SourceSpan,
    hint: &'static str,
}

impl ParseError {
    pub(crate) fn new(kind: ParseErrorKind, source: &str, span: Span) -> Self {
        Self {
            kind,
            text: source[span.start..span.end].to_string(),
            offset: span.start,
            source_code: source.to_string(),
            span: span.into(),
            hint: kind.label(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Diagnostic, Error)]
pub enum EvalError {
    #[error("nothing to evaluate, no expression has been parsed")]
    #[diagnostic(code(expr_interpreter::eval::no_expression))]
    NoExpression,

    #[error("unresolved variable '{name}'")]
    #[diagnostic(
        code(expr_interpreter::eval::unresolved_variable),
        help("pass a value for it, assign it first, or install a variable miss handler")
    )]
    UnresolvedVariable { name: String },

    #[error("unknown function '{name}'")]
    #[diagnostic(code(expr_interpreter::eval::unknown_function))]
    UnknownFunction { name: String },

    #[error("function '{name}' expects {expected} argument(s), got {found}")]
    #[diagnostic(code(expr_interpreter::eval::arity_mismatch))]
    ArityMismatch {
        name: String,
        expected: usize,
        found: usize,
    },

    #[error("invalid assignment target '{target}'")]
    #[diagnostic(code(expr_interpreter::eval::invalid_assignment_target))]
    InvalidAssignmentTarget { target: String },
}
