use crate::ast::Operator;

impl Operator {
    /// Apply the operator to already evaluated operands. The evaluator, the compiler and the
    /// optimizer all go through here, so they cannot disagree on a result.
    pub fn apply(self, operands: &[f64]) -> f64 {
        match self {
            Operator::Add => operands.iter().fold(0.0, |acc, value| acc + value),
            Operator::Mul => operands.iter().fold(1.0, |acc, value| acc * value),
            Operator::Sub => match operands {
                [value] => -value,
                [first, rest @ ..] => rest.iter().fold(*first, |acc, value| acc - value),
                [] => f64::NAN,
            },
            Operator::Div => match operands {
                [value] => 1.0 / value,
                [first, rest @ ..] => rest.iter().fold(*first, |acc, value| acc / value),
                [] => f64::NAN,
            },
            Operator::Mod => match operands {
                [first, rest @ ..] => rest.iter().fold(*first, |acc, value| modulo(acc, *value)),
                [] => f64::NAN,
            },
            Operator::Pow => operands
                .iter()
                .rev()
                .copied()
                .reduce(|exponent, base| base.powf(exponent))
                .unwrap_or(f64::NAN),
        }
    }
}

/// Remainder of the operands truncated toward zero. The sign follows the dividend, and a zero
/// divisor gives NaN.
pub fn modulo(lhs: f64, rhs: f64) -> f64 {
    lhs.trunc() % rhs.trunc()
}
