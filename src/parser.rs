use log::debug;

use crate::ast::{Expression, Name, Node, Operator, TokenTree};
use crate::error::{Error, ParseError, ParseErrorKind};
use crate::lexer::{self, Rule};
use crate::token::{Span, Token, TokenKind};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Options {
    /// Require `;` between statements. Otherwise whitespace alone also separates them.
    pub force_semicolon: bool,
}

pub struct Parser<'source> {
    source: &'source str,
    tokens: Vec<Token>,
    position: usize,
    statement_start: usize,
    open_parens: Vec<Span>,
    depth: usize,
    options: Options,
}

impl<'source> Parser<'source> {
    pub fn new(source: &'source str, options: Options) -> Result<Self, Error> {
        Self::with_rules(source, lexer::default_rules(), options)
    }

    /// Tokenize with a custom rule list. Whitespace tokens, if the rules keep any, are skipped.
    pub fn with_rules(source: &'source str, rules: &[Rule], options: Options) -> Result<Self, Error> {
        let tokens = lexer::lex(source, rules)?
            .into_iter()
            .filter(|token| token.kind != TokenKind::Whitespace)
            .collect();

        Ok(Self {
            source,
            tokens,
            position: 0,
            statement_start: 0,
            open_parens: Vec::new(),
            depth: 0,
            options,
        })
    }

    pub fn parse(&mut self) -> Result<Node, ParseError> {
        let mut statements = Vec::new();

        loop {
            while self.next_if(TokenKind::Semicolon).is_some() {}
            if self.peek().is_none() {
                break;
            }

            statements.push(self.parse_statement()?);

            // Anything after a statement has to start the next one
            let Some(token) = self.peek() else {
                break;
            };
            match token.kind {
                TokenKind::Semicolon => continue,
                TokenKind::CloseParen => {
                    return Err(self.error(ParseErrorKind::UnmatchedParenthesis, token.span))
                }
                kind if kind.starts_operand() && self.touches_previous(token) => {
                    return Err(self.error(ParseErrorKind::MissingOperator, token.span))
                }
                _ if self.options.force_semicolon => {
                    return Err(self.error(ParseErrorKind::MissingSemicolon, token.span))
                }
                kind if kind.starts_operand() => continue,
                _ => return Err(self.error(ParseErrorKind::UnexpectedToken, token.span)),
            }
        }

        let (Some(first), Some(last)) = (statements.first(), statements.last()) else {
            let everything = Span::new(0, self.source.len());
            return Err(self.error(ParseErrorKind::EmptyInput, everything));
        };
        let span = first.span.to(last.span);

        debug!("parsed {} statement(s)", statements.len());
        Ok(Node::new(Expression::Block(statements), span))
    }

    fn parse_statement(&mut self) -> Result<Node, ParseError> {
        self.statement_start = self.position;

        let lhs = self.parse_expression_within(0)?;
        if self.next_if(TokenKind::Equals).is_none() {
            return Ok(lhs);
        }

        if !matches!(lhs.node, Expression::Variable(_)) {
            return Err(self.error(ParseErrorKind::AssignmentToNonLvalue, lhs.span));
        }

        let value = self.parse_expression_within(0)?;
        let span = lhs.span.to(value.span);
        if self.peek().is_some_and(|t| t.kind == TokenKind::Equals) {
            // `a = b = 1`: the second target is an assignment, not a variable
            return Err(self.error(ParseErrorKind::AssignmentToNonLvalue, span));
        }

        Ok(Node::new(
            Expression::Assignment {
                target: Box::new(lhs),
                value: Box::new(value),
            },
            span,
        ))
    }

    /// Every parenthesis, sign, call argument and right operand goes one level deeper. The
    /// limit keeps the recursive passes over the tree within the stack.
    fn parse_expression_within(&mut self, min_bp: u8) -> Result<Node, ParseError> {
        if self.depth >= MAX_NESTING_DEPTH {
            let span = self.peek().map_or_else(|| self.end_of_input(), |t| t.span);
            return Err(self.error(ParseErrorKind::NestingTooDeep, span));
        }

        self.depth += 1;
        let result = self.parse_binary_expression(min_bp);
        self.depth -= 1;
        result
    }

    fn parse_binary_expression(&mut self, min_bp: u8) -> Result<Node, ParseError> {
        let mut lhs = self.parse_operand()?;
        // The operator of `lhs` when this loop built it, so further `+`/`*` can extend it in place
        let mut chain = None;

        while let Some(op) = self.peek() {
            let Some((l_bp, r_bp)) = infix_binding_power(op.kind) else {
                break;
            };
            if l_bp < min_bp {
                break;
            }

            let (kind, op_span) = (op.kind, op.span);
            self.position += 1;

            let rhs = self.parse_expression_within(r_bp)?;
            lhs = combine(lhs, kind, op_span, rhs, &mut chain);
        }

        Ok(lhs)
    }

    fn parse_operand(&mut self) -> Result<Node, ParseError> {
        let Some(token) = self.peek().cloned() else {
            return Err(self.missing_operand(None));
        };

        match token.kind {
            TokenKind::Number => {
                self.position += 1;
                let value = token
                    .text
                    .parse::<f64>()
                    .map_err(|_| self.error(ParseErrorKind::MalformedNumber, token.span))?;
                Ok(Node::number(value, token.span))
            }
            TokenKind::Identifier => {
                self.position += 1;
                let name = Name(token.text);
                if let Some(open) = self.next_if(TokenKind::OpenParen) {
                    return self.parse_call(name, token.span, open);
                }
                Ok(Node::new(Expression::Variable(name), token.span))
            }
            TokenKind::OpenParen => {
                self.position += 1;
                self.open_parens.push(token.span);
                let inner = self.parse_expression_within(0)?;
                let close = self.expect_close_paren(token.span)?;
                self.open_parens.pop();

                Ok(TokenTree::new(inner.node, token.span.to(close)))
            }
            TokenKind::Minus if self.unary_minus_allowed(&token) => {
                self.position += 1;
                let operand = self.parse_expression_within(PREFIX_BINDING_POWER)?;
                let span = token.span.to(operand.span);
                Ok(Node::new(
                    Expression::Operation {
                        op: Operator::Sub,
                        operands: vec![operand],
                    },
                    span,
                ))
            }
            _ => Err(self.missing_operand(Some(&token))),
        }
    }

    fn parse_call(&mut self, name: Name, name_span: Span, open: Span) -> Result<Node, ParseError> {
        self.open_parens.push(open);

        let mut args = Vec::new();
        if self.peek().is_some_and(|t| t.kind != TokenKind::CloseParen) {
            loop {
                args.push(self.parse_expression_within(0)?);
                if self.next_if(TokenKind::Comma).is_none() {
                    break;
                }
            }
        }

        let close = self.expect_close_paren(open)?;
        self.open_parens.pop();

        Ok(Node::new(
            Expression::FunctionCall { name, args },
            name_span.to(close),
        ))
    }

    fn expect_close_paren(&mut self, open: Span) -> Result<Span, ParseError> {
        match self.peek() {
            Some(token) if token.kind == TokenKind::CloseParen => {
                let span = token.span;
                self.position += 1;
                Ok(span)
            }
            Some(token) if token.kind.starts_operand() && self.touches_previous(token) => {
                Err(self.error(ParseErrorKind::MissingOperator, token.span))
            }
            Some(token) => Err(self.error(ParseErrorKind::UnexpectedToken, token.span)),
            None => Err(self.error(ParseErrorKind::UnclosedParenthesis, open)),
        }
    }

    /// A leading `-` is a sign at the start of a statement and after `(`, `,` or `=`. After a
    /// binary operator it only counts as a sign when it is written against its operand, so
    /// `1 + -2` parses while `1 + - 2` is two operators in a row.
    fn unary_minus_allowed(&self, minus: &Token) -> bool {
        if self.position == self.statement_start {
            return true;
        }

        match self.previous().map(|t| t.kind) {
            None
            | Some(
                TokenKind::OpenParen
                | TokenKind::Comma
                | TokenKind::Equals
                | TokenKind::Semicolon,
            ) => true,
            Some(kind) if kind.is_binary_operator() => self
                .tokens
                .get(self.position + 1)
                .is_some_and(|next| minus.touches(next)),
            Some(_) => false,
        }
    }

    /// Explain why no operand could be parsed at the current position.
    fn missing_operand(&self, found: Option<&Token>) -> ParseError {
        let after_operator = self
            .previous()
            .filter(|t| t.kind.is_binary_operator() || t.kind == TokenKind::Equals);

        match (found, after_operator) {
            (None, Some(op)) => self.error(ParseErrorKind::DanglingOperator, op.span),
            (None, None) => match self.open_parens.last() {
                Some(open) => self.error(ParseErrorKind::UnclosedParenthesis, *open),
                None => self.error(ParseErrorKind::UnexpectedEndOfInput, self.end_of_input()),
            },
            (Some(token), Some(op)) => match token.kind {
                TokenKind::CloseParen | TokenKind::Comma | TokenKind::Semicolon => {
                    self.error(ParseErrorKind::DanglingOperator, op.span)
                }
                kind if kind.is_binary_operator() || kind == TokenKind::Equals => {
                    self.error(ParseErrorKind::SuccessiveOperators, token.span)
                }
                _ => self.error(ParseErrorKind::UnexpectedToken, token.span),
            },
            (Some(token), None) => {
                if token.kind == TokenKind::CloseParen && self.open_parens.is_empty() {
                    self.error(ParseErrorKind::UnmatchedParenthesis, token.span)
                } else {
                    self.error(ParseErrorKind::UnexpectedToken, token.span)
                }
            }
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.position)
    }

    fn previous(&self) -> Option<&Token> {
        self.position
            .checked_sub(1)
            .and_then(|index| self.tokens.get(index))
    }

    fn next_if(&mut self, kind: TokenKind) -> Option<Span> {
        let span = self.peek().filter(|t| t.kind == kind)?.span;
        self.position += 1;
        Some(span)
    }

    fn touches_previous(&self, token: &Token) -> bool {
        self.previous().is_some_and(|previous| previous.touches(token))
    }

    fn end_of_input(&self) -> Span {
        Span::new(self.source.len(), self.source.len())
    }

    fn error(&self, kind: ParseErrorKind, span: Span) -> ParseError {
        ParseError::new(kind, self.source, span)
    }
}

/// Fold `lhs <op> rhs` into the tree. Chains of `+`/`-` and `*`/`/` collect into one
/// multi-operand node, with `-` and `/` turned into a negated or reciprocal operand.
fn combine(
    mut lhs: Node,
    op: TokenKind,
    op_span: Span,
    rhs: Node,
    chain: &mut Option<Operator>,
) -> Node {
    let family = Operator::family(op);
    let rhs = match op {
        TokenKind::Minus => unary(Operator::Sub, op_span, rhs),
        TokenKind::Slash => unary(Operator::Div, op_span, rhs),
        _ => rhs,
    };
    let span = lhs.span.to(rhs.span);

    if *chain == Some(family) {
        if let Expression::Operation { operands, .. } = &mut lhs.node {
            operands.push(rhs);
            lhs.span = span;
            return lhs;
        }
    }

    *chain = family.is_commutative().then_some(family);
    Node::new(
        Expression::Operation {
            op: family,
            operands: vec![lhs, rhs],
        },
        span,
    )
}

fn unary(op: Operator, op_span: Span, operand: Node) -> Node {
    let span = op_span.to(operand.span);
    Node::new(
        Expression::Operation {
            op,
            operands: vec![operand],
        },
        span,
    )
}

const PREFIX_BINDING_POWER: u8 = 5;

pub const MAX_NESTING_DEPTH: usize = 128;

fn infix_binding_power(kind: TokenKind) -> Option<(u8, u8)> {
    Some(match kind {
        TokenKind::Plus | TokenKind::Minus => (1, 2),
        TokenKind::Star | TokenKind::Slash | TokenKind::Percent => (3, 4),
        TokenKind::Caret => (8, 7), // Right associative

        _ => return None,
    })
}
