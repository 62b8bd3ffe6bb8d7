use std::collections::BTreeSet;
use std::fmt;

use crate::token::Span;

/// A node together with the source text it was parsed from. Spans are not part of equality, so a
/// rewritten tree compares equal to one parsed from equivalent text.
#[derive(Debug, Clone)]
pub struct TokenTree<T> {
    pub node: T,
    pub span: Span,
}

impl<T> TokenTree<T> {
    pub fn new(node: T, span: Span) -> Self {
        Self { node, span }
    }
}

impl<T: PartialEq> PartialEq for TokenTree<T> {
    fn eq(&self, other: &Self) -> bool {
        self.node == other.node
    }
}

pub type Node = TokenTree<Expression>;

#[derive(Debug, PartialEq, Eq, Hash, Clone, PartialOrd, Ord)]
pub struct Name(pub String);

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, PartialEq, Clone)]
pub enum Expression {
    Number(f64),
    Variable(Name),
    Operation {
        op: Operator,
        operands: Vec<Node>,
    },
    Assignment {
        target: Box<Node>,
        value: Box<Node>,
    },
    FunctionCall {
        name: Name,
        args: Vec<Node>,
    },
    /// Statements in source order; the value of the block is the value of the last one.
    Block(Vec<Node>),
}

/// Arithmetic operators.
///
/// `Add` and `Mul` take any number of operands. With a single operand `Sub` is a negation and
/// `Div` a reciprocal, which is how the parser spells `a - b` (`Add(a, Sub(b))`) and `a / b`
/// (`Mul(a, Div(b))`). `Mod` folds to the left and `Pow` to the right.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub enum Operator {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
}

impl Operator {
    pub fn is_commutative(self) -> bool {
        matches!(self, Operator::Add | Operator::Mul)
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Operator::Add => "+",
            Operator::Sub => "-",
            Operator::Mul => "*",
            Operator::Div => "/",
            Operator::Mod => "%",
            Operator::Pow => "^",
        }
    }
}

impl Node {
    pub fn number(value: f64, span: Span) -> Self {
        Self::new(Expression::Number(value), span)
    }

    pub fn as_number(&self) -> Option<f64> {
        match self.node {
            Expression::Number(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_constant(&self) -> bool {
        self.as_number().is_some()
    }

    /// Number of nodes in the tree, this one included.
    pub fn node_count(&self) -> usize {
        1 + match &self.node {
            Expression::Number(_) | Expression::Variable(_) => 0,
            Expression::Operation { operands: nodes, .. }
            | Expression::FunctionCall { args: nodes, .. }
            | Expression::Block(nodes) => nodes.iter().map(Node::node_count).sum(),
            Expression::Assignment { target, value } => target.node_count() + value.node_count(),
        }
    }

    /// Names of every variable the tree reads or assigns.
    pub fn variables(&self) -> BTreeSet<String> {
        let mut names = BTreeSet::new();
        self.collect_variables(&mut names);
        names
    }

    fn collect_variables(&self, names: &mut BTreeSet<String>) {
        match &self.node {
            Expression::Number(_) => {}
            Expression::Variable(name) => {
                names.insert(name.0.clone());
            }
            Expression::Operation { operands: nodes, .. }
            | Expression::FunctionCall { args: nodes, .. }
            | Expression::Block(nodes) => {
                for node in nodes {
                    node.collect_variables(names);
                }
            }
            Expression::Assignment { target, value } => {
                target.collect_variables(names);
                value.collect_variables(names);
            }
        }
    }
}

// Prints a fully parenthesized expression. Trees built by the parser print back to text that
// parses to an equal tree.
impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.node {
            Expression::Number(value) if value.is_sign_negative() => write!(f, "({value})"),
            Expression::Number(value) => write!(f, "{value}"),
            Expression::Variable(name) => write!(f, "{name}"),
            Expression::Operation { op, operands } => match (op, operands.as_slice()) {
                (Operator::Sub, [operand]) => write!(f, "(-{operand})"),
                (Operator::Div, [operand]) => write!(f, "(1 / {operand})"),
                (op, operands) => {
                    f.write_str("(")?;
                    for (i, operand) in operands.iter().enumerate() {
                        if i == 0 {
                            write!(f, "{operand}")?;
                            continue;
                        }

                        // `a + -b` came from `a - b`, and `a * 1/b` from `a / b`
                        match (op, inverse_operand(operand)) {
                            (Operator::Add, Some((Operator::Sub, inner))) => {
                                write!(f, " - {inner}")?
                            }
                            (Operator::Mul, Some((Operator::Div, inner))) => {
                                write!(f, " / {inner}")?
                            }
                            _ => write!(f, " {} {operand}", op.symbol())?,
                        }
                    }
                    f.write_str(")")
                }
            },
            Expression::Assignment { target, value } => write!(f, "{target} = {value}"),
            Expression::FunctionCall { name, args } => {
                write!(f, "{name}(")?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                f.write_str(")")
            }
            Expression::Block(statements) => {
                for (i, statement) in statements.iter().enumerate() {
                    if i > 0 {
                        f.write_str("; ")?;
                    }
                    write!(f, "{statement}")?;
                }
                Ok(())
            }
        }
    }
}

/// The operator and operand of a single-operand `Sub` or `Div`.
fn inverse_operand(node: &Node) -> Option<(Operator, &Node)> {
    match &node.node {
        Expression::Operation {
            op: op @ (Operator::Sub | Operator::Div),
            operands,
        } if operands.len() == 1 => Some((*op, &operands[0])),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn var(name: &str) -> Node {
        Node::new(Expression::Variable(Name(name.to_string())), Span::default())
    }

    fn num(value: f64) -> Node {
        Node::number(value, Span::default())
    }

    fn op(op: Operator, operands: Vec<Node>) -> Node {
        Node::new(Expression::Operation { op, operands }, Span::default())
    }

    #[test]
    fn equality_ignores_spans() {
        assert_eq!(Node::number(1.0, Span::new(0, 1)), Node::number(1.0, Span::new(4, 9)));
        assert_ne!(num(1.0), num(2.0));
    }

    #[test]
    fn counts_and_variables() {
        let tree = Node::new(
            Expression::Block(vec![
                Node::new(
                    Expression::Assignment {
                        target: Box::new(var("a")),
                        value: Box::new(op(Operator::Add, vec![var("b"), num(1.0)])),
                    },
                    Span::default(),
                ),
                op(Operator::Mul, vec![var("a"), var("c")]),
            ]),
            Span::default(),
        );

        assert_eq!(tree.node_count(), 9);
        assert_eq!(
            tree.variables().into_iter().collect::<Vec<_>>(),
            vec!["a", "b", "c"]
        );
    }

    #[test]
    fn display() {
        let tree = op(
            Operator::Add,
            vec![
                var("a"),
                op(Operator::Sub, vec![num(2.0)]),
                op(Operator::Mul, vec![var("b"), op(Operator::Div, vec![var("c")])]),
            ],
        );
        assert_eq!(tree.to_string(), "(a - 2 + (b / c))");

        let negative_base = op(Operator::Pow, vec![num(-2.0), num(2.0)]);
        assert_eq!(negative_base.to_string(), "((-2) ^ 2)");
        let negated_base = op(Operator::Pow, vec![op(Operator::Sub, vec![num(2.0)]), var("a")]);
        assert_eq!(negated_base.to_string(), "((-2) ^ a)");
        assert_eq!(op(Operator::Div, vec![var("a")]).to_string(), "(1 / a)");
    }
}
