use log::debug;

use crate::{ast::*, stdlib::FunctionTable, token::Span};

/// Apply optimizations to the AST
/// At the moment, we only do constant folding. Function calls whose arguments are all constant
/// are folded with `functions` as it is now; calls that would fail are left for the evaluator.
pub fn optimize(program: Node, functions: &FunctionTable) -> Node {
    let before = program.node_count();
    let optimized = optimize_expression(program, functions);
    debug!(
        "optimized {before} node(s) down to {}",
        optimized.node_count()
    );
    optimized
}

fn optimize_expression(expression: Node, functions: &FunctionTable) -> Node {
    let span = expression.span;
    match expression.node {
        Expression::Operation { op, operands } => {
            optimize_operation(op, operands, span, functions)
        }
        Expression::FunctionCall { name, args } => {
            optimize_function_call(name, args, span, functions)
        }
        Expression::Assignment { target, value } => {
            // Only the value is rewritten, and only when the target really is a variable
            if !matches!(target.node, Expression::Variable(_)) {
                return Node::new(Expression::Assignment { target, value }, span);
            }

            Node::new(
                Expression::Assignment {
                    target,
                    value: Box::new(optimize_expression(*value, functions)),
                },
                span,
            )
        }
        Expression::Block(statements) => Node::new(
            Expression::Block(
                statements
                    .into_iter()
                    .map(|statement| optimize_expression(statement, functions))
                    .collect(),
            ),
            span,
        ),

        // No optimization to be done
        Expression::Number(value) => Node::number(value, span),
        Expression::Variable(name) => Node::new(Expression::Variable(name), span),
    }
}

fn optimize_operation(
    op: Operator,
    operands: Vec<Node>,
    span: Span,
    functions: &FunctionTable,
) -> Node {
    let operands: Vec<Node> = operands
        .into_iter()
        .map(|operand| optimize_expression(operand, functions))
        .collect();

    if let Some(values) = constant_values(&operands) {
        return Node::number(op.apply(&values), span);
    }

    if !op.is_commutative() {
        return Node::new(Expression::Operation { op, operands }, span);
    }

    // Tainted operands keep their relative order, the constants collapse into one trailing value
    let (constants, mut tainted): (Vec<Node>, Vec<Node>) =
        operands.into_iter().partition(Node::is_constant);
    if let Some(values) = constant_values(&constants).filter(|values| !values.is_empty()) {
        let folded_span = constants
            .iter()
            .map(|constant| constant.span)
            .reduce(Span::to)
            .unwrap_or(span);
        tainted.push(Node::number(op.apply(&values), folded_span));
    }

    Node::new(
        Expression::Operation {
            op,
            operands: tainted,
        },
        span,
    )
}

fn optimize_function_call(
    name: Name,
    args: Vec<Node>,
    span: Span,
    functions: &FunctionTable,
) -> Node {
    let args: Vec<Node> = args
        .into_iter()
        .map(|arg| optimize_expression(arg, functions))
        .collect();

    let folded = constant_values(&args).and_then(|values| {
        let function = functions.resolve(&name.0)?;
        function.invoke(&name.0, &values).ok()
    });

    match folded {
        Some(value) => Node::number(value, span),
        None => Node::new(Expression::FunctionCall { name, args }, span),
    }
}

fn constant_values(nodes: &[Node]) -> Option<Vec<f64>> {
    nodes.iter().map(Node::as_number).collect()
}
