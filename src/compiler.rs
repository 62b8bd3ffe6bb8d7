use std::fmt;
use std::sync::Arc;

use log::debug;

use crate::{
    ast::{Expression, Name, Node, Operator},
    error::EvalError,
    evaluator::{MissHandler, Variables},
    stdlib::{Function, FunctionTable},
};

type Compiled = Box<dyn Fn(&mut Environment<'_>) -> Result<f64, EvalError> + Send + Sync>;

fn compiled<F>(f: F) -> Compiled
where
    F: Fn(&mut Environment<'_>) -> Result<f64, EvalError> + Send + Sync + 'static,
{
    Box::new(f)
}

/// Name resolution for a single call of a compiled expression.
struct Environment<'a> {
    overrides: Option<&'a Variables>,
    /// Values assigned while running this call. Dropped when it returns.
    locals: Variables,
    defaults: &'a Variables,
    miss_handler: Option<&'a MissHandler>,
}

impl Environment<'_> {
    fn lookup(&self, name: &str) -> Result<f64, EvalError> {
        self.overrides
            .and_then(|overrides| overrides.get(name))
            .or_else(|| self.locals.get(name))
            .or_else(|| self.defaults.get(name))
            .copied()
            .or_else(|| self.miss_handler.and_then(|handler| handler(name)))
            .ok_or_else(|| EvalError::UnresolvedVariable {
                name: name.to_string(),
            })
    }
}

/// An expression turned into a tree of closures. Cloning is cheap and clones share the tree, and
/// calls never touch the evaluator it came from, so it can be handed to other threads.
#[derive(Clone)]
pub struct CompiledExpression {
    root: Arc<Compiled>,
    defaults: Arc<Variables>,
    miss_handler: Option<MissHandler>,
}

impl CompiledExpression {
    /// Run the expression. Lookups try `overrides`, then values assigned earlier in this call,
    /// then the variables captured at compile time, then the miss handler.
    pub fn call(&self, overrides: Option<&Variables>) -> Result<f64, EvalError> {
        let mut env = Environment {
            overrides,
            locals: Variables::new(),
            defaults: &self.defaults,
            miss_handler: self.miss_handler.as_ref(),
        };
        (self.root)(&mut env)
    }
}

impl fmt::Debug for CompiledExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledExpression")
            .field("defaults", &self.defaults)
            .field("miss_handler", &self.miss_handler.is_some())
            .finish_non_exhaustive()
    }
}

/// Compile `program` against a snapshot of `variables` and `functions`.
pub fn compile(
    program: &Node,
    variables: &Variables,
    functions: &FunctionTable,
    miss_handler: Option<MissHandler>,
) -> Result<CompiledExpression, EvalError> {
    let compiler = Compiler { functions };
    let root = compiler.compile_expression(program)?;
    debug!(
        "compiled {} node(s) with {} captured variable(s)",
        program.node_count(),
        variables.len()
    );

    Ok(CompiledExpression {
        root: Arc::new(root),
        defaults: Arc::new(variables.clone()),
        miss_handler,
    })
}

struct Compiler<'a> {
    functions: &'a FunctionTable,
}

impl Compiler<'_> {
    fn compile_expression(&self, expression: &Node) -> Result<Compiled, EvalError> {
        Ok(match &expression.node {
            Expression::Number(value) => {
                let value = *value;
                compiled(move |_| Ok(value))
            }
            Expression::Variable(name) => {
                let name = name.0.clone();
                compiled(move |env| env.lookup(&name))
            }
            Expression::Operation { op, operands } => {
                let operands = self.compile_expression_list(operands)?;
                compile_operation(*op, operands)
            }
            Expression::Assignment { target, value } => {
                let Expression::Variable(Name(name)) = &target.node else {
                    return Err(EvalError::InvalidAssignmentTarget {
                        target: target.to_string(),
                    });
                };

                let name = name.clone();
                let value = self.compile_expression(value)?;
                compiled(move |env| {
                    let value = value(env)?;
                    env.locals.insert(name.clone(), value);
                    Ok(value)
                })
            }
            Expression::FunctionCall { name, args } => {
                let args = self.compile_expression_list(args)?;
                self.compile_function_call(&name.0, args)
            }
            Expression::Block(statements) => {
                let statements = self.compile_expression_list(statements)?;
                compiled(move |env| {
                    let mut last = f64::NAN;
                    for statement in &statements {
                        last = statement(env)?;
                    }
                    Ok(last)
                })
            }
        })
    }

    fn compile_expression_list(&self, expressions: &[Node]) -> Result<Vec<Compiled>, EvalError> {
        expressions
            .iter()
            .map(|expression| self.compile_expression(expression))
            .collect()
    }

    fn compile_function_call(&self, name: &str, args: Vec<Compiled>) -> Compiled {
        let name = name.to_string();
        let Some(function) = self.functions.resolve(&name).cloned() else {
            debug!("function '{name}' is unknown at compile time");
            return compiled(move |env| {
                evaluate_all(&args, env)?;
                Err(EvalError::UnknownFunction { name: name.clone() })
            });
        };

        compile_call(name, function, args)
    }
}

fn compile_call(name: String, function: Function, args: Vec<Compiled>) -> Compiled {
    compiled(move |env| {
        let values = evaluate_all(&args, env)?;
        function.invoke(&name, &values)
    })
}

/// The common one and two operand shapes get their own closures so they skip the operand `Vec`.
fn compile_operation(op: Operator, operands: Vec<Compiled>) -> Compiled {
    let operands = match <[Compiled; 2]>::try_from(operands) {
        Ok([lhs, rhs]) => return compiled(move |env| Ok(op.apply(&[lhs(env)?, rhs(env)?]))),
        Err(operands) => operands,
    };
    let operands = match <[Compiled; 1]>::try_from(operands) {
        Ok([operand]) => return compiled(move |env| Ok(op.apply(&[operand(env)?]))),
        Err(operands) => operands,
    };

    compiled(move |env| {
        let values = evaluate_all(&operands, env)?;
        Ok(op.apply(&values))
    })
}

fn evaluate_all(
    expressions: &[Compiled],
    env: &mut Environment<'_>,
) -> Result<Vec<f64>, EvalError> {
    expressions.iter().map(|expression| expression(env)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{Options, Parser};
    use crate::token::Span;

    fn parse(input: &str) -> Node {
        Parser::new(input, Options::default())
            .unwrap()
            .parse()
            .unwrap()
    }

    fn run(
        input: &str,
        variables: &Variables,
        overrides: Option<&Variables>,
    ) -> Result<f64, EvalError> {
        compile(&parse(input), variables, &FunctionTable::new(), None)
            .unwrap()
            .call(overrides)
    }

    #[test]
    fn operand_shapes() {
        let none = Variables::new();
        assert_eq!(run("-3", &none, None), Ok(-3.0));
        assert_eq!(run("2 ^ 10", &none, None), Ok(1024.0));
        assert_eq!(run("1 + 2 + 3 - 4", &none, None), Ok(2.0));
        assert_eq!(run("2 * 3 / 4 % 1", &none, None), Ok(0.0));
        assert_eq!(run("sqrt(9) * floor(2.5)", &none, None), Ok(6.0));
    }

    #[test]
    fn lookup_order() {
        let defaults = Variables::from([("a".to_string(), 1.0), ("b".to_string(), 2.0)]);
        let overrides = Variables::from([("b".to_string(), 20.0)]);

        assert_eq!(run("a + b", &defaults, None), Ok(3.0));
        assert_eq!(run("a + b", &defaults, Some(&overrides)), Ok(21.0));
        assert_eq!(run("a = 5; a + b", &defaults, Some(&overrides)), Ok(25.0));
        assert_eq!(run("b = 5; b", &defaults, Some(&overrides)), Ok(20.0));
        assert_eq!(
            run("c", &defaults, None),
            Err(EvalError::UnresolvedVariable {
                name: "c".to_string()
            })
        );
    }

    #[test]
    fn assignments_stay_inside_one_call() {
        let none = Variables::new();
        let compiled = compile(&parse("y = 1 + x; y"), &none, &FunctionTable::new(), None).unwrap();

        let x = Variables::from([("x".to_string(), 1.0)]);
        assert_eq!(compiled.call(Some(&x)), Ok(2.0));
        assert_eq!(
            compiled.call(None),
            Err(EvalError::UnresolvedVariable {
                name: "x".to_string()
            })
        );

        let defaults = Variables::from([("n".to_string(), 0.0)]);
        let counter = compile(&parse("n = n + 1; n"), &defaults, &FunctionTable::new(), None).unwrap();
        assert_eq!(counter.call(None), Ok(1.0));
        assert_eq!(counter.call(None), Ok(1.0));
    }

    #[test]
    fn functions_are_captured() {
        let mut functions = FunctionTable::new();
        functions.register("twice", Function::unary(|x| x * 2.0));

        let compiled = compile(&parse("twice(4)"), &Variables::new(), &functions, None).unwrap();
        functions.register("twice", Function::unary(|x| x * 3.0));
        assert_eq!(compiled.call(None), Ok(8.0));

        let unknown = compile(&parse("later(1)"), &Variables::new(), &functions, None).unwrap();
        functions.register("later", Function::unary(|x| x));
        assert_eq!(
            unknown.call(None),
            Err(EvalError::UnknownFunction {
                name: "later".to_string()
            })
        );
    }

    #[test]
    fn miss_handler() {
        let handler: MissHandler = Arc::new(|name: &str| (name == "n").then_some(7.0));
        let compiled = compile(
            &parse("n * 2"),
            &Variables::new(),
            &FunctionTable::new(),
            Some(handler),
        )
        .unwrap();
        assert_eq!(compiled.call(None), Ok(14.0));
    }

    #[test]
    fn invalid_assignment_target() {
        let tree = Node::new(
            Expression::Assignment {
                target: Box::new(Node::number(1.0, Span::default())),
                value: Box::new(Node::number(2.0, Span::default())),
            },
            Span::default(),
        );
        assert!(matches!(
            compile(&tree, &Variables::new(), &FunctionTable::new(), None),
            Err(EvalError::InvalidAssignmentTarget { .. })
        ));
    }

    #[test]
    fn shared_between_threads() {
        let compiled = compile(
            &parse("x ^ 2"),
            &Variables::new(),
            &FunctionTable::new(),
            None,
        )
        .unwrap();

        let handles: Vec<_> = (0..4)
            .map(|i| {
                let compiled = compiled.clone();
                std::thread::spawn(move || {
                    let overrides = Variables::from([("x".to_string(), i as f64)]);
                    compiled.call(Some(&overrides))
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(results, vec![Ok(0.0), Ok(1.0), Ok(4.0), Ok(9.0)]);
    }
}
