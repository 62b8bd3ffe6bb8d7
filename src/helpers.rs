use crate::{ast::Operator, token::TokenKind};

impl Operator {
    /// The operator a binary token folds into. `-` and `/` fold into `+` and `*`, with the
    /// right-hand side wrapped in a negation or reciprocal.
    pub(crate) fn family(op: TokenKind) -> Self {
        match op {
            TokenKind::Plus | TokenKind::Minus => Self::Add,
            TokenKind::Star | TokenKind::Slash => Self::Mul,
            TokenKind::Percent => Self::Mod,
            TokenKind::Caret => Self::Pow,

            _ => unreachable!(),
        }
    }
}

impl TokenKind {
    // For easier matching
    pub(crate) fn is_binary_operator(&self) -> bool {
        matches!(
            self,
            TokenKind::Plus
                | TokenKind::Minus
                | TokenKind::Star
                | TokenKind::Slash
                | TokenKind::Percent
                | TokenKind::Caret
        )
    }

    /// Tokens that open an operand on their own, without a sign in front.
    pub(crate) fn starts_operand(&self) -> bool {
        matches!(
            self,
            TokenKind::Number | TokenKind::Identifier | TokenKind::OpenParen
        )
    }
}
