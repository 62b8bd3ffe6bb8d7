use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use log::debug;

use crate::{
    ast::{Expression, Node},
    compiler::{self, CompiledExpression},
    error::{EvalError, Result},
    optimizer,
    parser::{Options, Parser},
    stdlib::{Function, FunctionTable},
};

pub type Variables = HashMap<String, f64>;

/// Called with the name of a variable that neither the per-call overrides nor the persistent
/// store know about. Returning `None` makes the lookup fail.
pub type MissHandler = Arc<dyn Fn(&str) -> Option<f64> + Send + Sync>;

/// Holds the current AST together with the state that survives between evaluations: assigned
/// variables, user functions and the miss handler. Parsing a new expression keeps all of it.
#[derive(Default)]
pub struct Evaluator {
    options: Options,
    ast: Option<Node>,
    variables: Variables,
    functions: FunctionTable,
    miss_handler: Option<MissHandler>,
}

impl Evaluator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: Options) -> Self {
        Self {
            options,
            ..Self::default()
        }
    }

    /// Parse `text` and make it the current expression. On failure the previous one is kept.
    pub fn parse(&mut self, text: &str) -> Result<&mut Self> {
        let ast = Parser::new(text, self.options)?.parse()?;
        debug!("parsed expression of {} node(s)", ast.node_count());

        self.ast = Some(ast);
        Ok(self)
    }

    /// Evaluate the current expression. Names are looked up in `overrides` first, then in the
    /// persistent store, then through the miss handler. Assignments always go to the persistent
    /// store, so an override hides an assigned value from the rest of the expression.
    pub fn evaluate(&mut self, overrides: Option<&Variables>) -> Result<f64> {
        let Some(ast) = &self.ast else {
            return Err(EvalError::NoExpression.into());
        };

        let mut scope = Scope {
            overrides,
            variables: &mut self.variables,
            functions: &self.functions,
            miss_handler: self.miss_handler.as_ref(),
        };
        Ok(scope.evaluate(ast)?)
    }

    /// Replace the current expression with its constant folded equivalent.
    pub fn optimize(&mut self) -> &mut Self {
        if let Some(ast) = self.ast.take() {
            self.ast = Some(optimizer::optimize(ast, &self.functions));
        }
        self
    }

    /// Turn the current expression into a reusable closure. Variables and user functions are
    /// captured as they are now; later changes to this evaluator do not reach the result.
    pub fn compile(&self) -> Result<CompiledExpression> {
        let ast = self.ast.as_ref().ok_or(EvalError::NoExpression)?;
        Ok(compiler::compile(
            ast,
            &self.variables,
            &self.functions,
            self.miss_handler.clone(),
        )?)
    }

    /// Register a user function, shadowing any built-in of the same name. Returns the user
    /// function previously registered under `name`, if any.
    pub fn register_function(
        &mut self,
        name: impl Into<String>,
        function: Function,
    ) -> Option<Function> {
        self.functions.register(name, function)
    }

    pub fn set_variable_miss_handler<F>(&mut self, handler: F) -> &mut Self
    where
        F: Fn(&str) -> Option<f64> + Send + Sync + 'static,
    {
        self.miss_handler = Some(Arc::new(handler));
        self
    }

    pub fn clear_variable_miss_handler(&mut self) -> &mut Self {
        self.miss_handler = None;
        self
    }

    pub fn set_variable(&mut self, name: impl Into<String>, value: f64) -> Option<f64> {
        self.variables.insert(name.into(), value)
    }

    pub fn variables(&self) -> &Variables {
        &self.variables
    }

    pub fn ast(&self) -> Option<&Node> {
        self.ast.as_ref()
    }

    /// Names of the variables the current expression reads or assigns.
    pub fn list_variables(&self) -> BTreeSet<String> {
        self.ast.as_ref().map(Node::variables).unwrap_or_default()
    }

    pub fn ast_node_count(&self) -> usize {
        self.ast.as_ref().map_or(0, Node::node_count)
    }
}

impl fmt::Debug for Evaluator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Evaluator")
            .field("options", &self.options)
            .field("ast", &self.ast)
            .field("variables", &self.variables)
            .field("functions", &self.functions)
            .field("miss_handler", &self.miss_handler.is_some())
            .finish()
    }
}

struct Scope<'a> {
    overrides: Option<&'a Variables>,
    variables: &'a mut Variables,
    functions: &'a FunctionTable,
    miss_handler: Option<&'a MissHandler>,
}

impl Scope<'_> {
    fn evaluate(&mut self, node: &Node) -> Result<f64, EvalError> {
        match &node.node {
            Expression::Number(value) => Ok(*value),
            Expression::Variable(name) => self.lookup(&name.0),
            Expression::Operation { op, operands } => {
                let values = self.evaluate_all(operands)?;
                Ok(op.apply(&values))
            }
            Expression::Assignment { target, value } => {
                let Expression::Variable(name) = &target.node else {
                    return Err(EvalError::InvalidAssignmentTarget {
                        target: target.to_string(),
                    });
                };

                let value = self.evaluate(value)?;
                self.variables.insert(name.0.clone(), value);
                Ok(value)
            }
            Expression::FunctionCall { name, args } => {
                let values = self.evaluate_all(args)?;
                let function =
                    self.functions
                        .resolve(&name.0)
                        .ok_or_else(|| EvalError::UnknownFunction {
                            name: name.0.clone(),
                        })?;
                function.invoke(&name.0, &values)
            }
            Expression::Block(statements) => {
                let mut last = f64::NAN;
                for statement in statements {
                    last = self.evaluate(statement)?;
                }
                Ok(last)
            }
        }
    }

    fn evaluate_all(&mut self, nodes: &[Node]) -> Result<Vec<f64>, EvalError> {
        nodes.iter().map(|node| self.evaluate(node)).collect()
    }

    fn lookup(&self, name: &str) -> Result<f64, EvalError> {
        self.overrides
            .and_then(|overrides| overrides.get(name))
            .or_else(|| self.variables.get(name))
            .copied()
            .or_else(|| self.miss_handler.and_then(|handler| handler(name)))
            .ok_or_else(|| EvalError::UnresolvedVariable {
                name: name.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Name, TokenTree};
    use crate::error::Error;
    use crate::token::Span;

    fn eval(input: &str) -> f64 {
        Evaluator::new().parse(input).unwrap().evaluate(None).unwrap()
    }

    #[test]
    fn arithmetic() {
        assert_eq!(eval("1 + 2 * 3"), 7.0);
        assert_eq!(eval("10 % 4 * 2"), 4.0);
        assert_eq!(eval("-7.5 % 2"), -1.0);
        assert_eq!(eval("-2 ^ 2"), -4.0);
        assert_eq!(eval("2 ** -1"), 0.5);
        assert_eq!(eval("1e3 / .5"), 2000.0);
        assert!(eval("1 % 0").is_nan());
    }

    #[test]
    fn builtins() {
        assert_eq!(eval("sqrt(16) + floor(2.7) + ceil(0.2)"), 7.0);
        assert_eq!(eval("theta(3) + theta(-3)"), 1.0);
        assert_eq!(eval("pi()"), std::f64::consts::PI);
        assert_eq!(eval("log10(100) + log2(8) + log(exp(0))"), 5.0);
    }

    #[test]
    fn assignments_persist() {
        let mut evaluator = Evaluator::new();
        assert_eq!(evaluator.parse("a = 2; b = a * 3").unwrap().evaluate(None).unwrap(), 6.0);
        assert_eq!(evaluator.variables().get("b"), Some(&6.0));

        assert_eq!(evaluator.parse("a + b").unwrap().evaluate(None).unwrap(), 8.0);
    }

    #[test]
    fn overrides_shadow_the_store() {
        let mut evaluator = Evaluator::new();
        evaluator.set_variable("x", 10.0);
        let overrides = Variables::from([("x".to_string(), 1.0)]);

        evaluator.parse("x = x + 5; x").unwrap();
        assert_eq!(evaluator.evaluate(Some(&overrides)).unwrap(), 1.0);
        assert_eq!(evaluator.variables().get("x"), Some(&6.0));
        assert_eq!(overrides.get("x"), Some(&1.0));
    }

    #[test]
    fn failures_keep_earlier_assignments() {
        let mut evaluator = Evaluator::new();
        let err = evaluator
            .parse("a = 1; b = nope; c = 3")
            .unwrap()
            .evaluate(None)
            .unwrap_err();

        assert!(matches!(
            err,
            Error::Eval(EvalError::UnresolvedVariable { ref name }) if name == "nope"
        ));
        assert_eq!(evaluator.variables().get("a"), Some(&1.0));
        assert!(!evaluator.variables().contains_key("c"));
    }

    #[test]
    fn miss_handler() {
        let mut evaluator = Evaluator::new();
        evaluator.set_variable_miss_handler(|name| (name == "answer").then_some(42.0));
        evaluator.parse("answer / 2").unwrap();
        assert_eq!(evaluator.evaluate(None).unwrap(), 21.0);

        evaluator.parse("question").unwrap();
        assert!(evaluator.evaluate(None).is_err());

        evaluator.clear_variable_miss_handler().parse("answer").unwrap();
        assert!(evaluator.evaluate(None).is_err());
    }

    #[test]
    fn functions() {
        let mut evaluator = Evaluator::new();
        evaluator.register_function("sum", Function::variadic(|args| args.iter().sum()));
        evaluator.register_function("sin", Function::unary(|x| x + 1.0));

        assert_eq!(evaluator.parse("sum(1, 2, 3) + sin(0)").unwrap().evaluate(None).unwrap(), 7.0);

        let err = evaluator.parse("cos(1, 2)").unwrap().evaluate(None).unwrap_err();
        assert!(matches!(err, Error::Eval(EvalError::ArityMismatch { expected: 1, found: 2, .. })));

        let err = evaluator.parse("nope(1)").unwrap().evaluate(None).unwrap_err();
        assert!(matches!(err, Error::Eval(EvalError::UnknownFunction { .. })));
    }

    #[test]
    fn failed_parse_keeps_previous_expression() {
        let mut evaluator = Evaluator::new();
        evaluator.parse("1 + 1").unwrap();
        assert!(matches!(evaluator.parse("1 +"), Err(Error::Parse(_))));
        assert_eq!(evaluator.evaluate(None).unwrap(), 2.0);
    }

    #[test]
    fn nothing_parsed() {
        let mut evaluator = Evaluator::new();
        assert!(matches!(
            evaluator.evaluate(None),
            Err(Error::Eval(EvalError::NoExpression))
        ));
        assert!(evaluator.compile().is_err());
        assert_eq!(evaluator.ast_node_count(), 0);
        assert!(evaluator.list_variables().is_empty());
    }

    #[test]
    fn introspection() {
        let mut evaluator = Evaluator::new();
        evaluator.parse("y = x * 2 + sin(z)").unwrap();
        assert_eq!(
            evaluator.list_variables().into_iter().collect::<Vec<_>>(),
            vec!["x", "y", "z"]
        );
        // block, assignment, y, add, mul, x, 2, sin, z
        assert_eq!(evaluator.ast_node_count(), 9);

        evaluator.parse("1 + 2 * 3").unwrap().optimize();
        assert_eq!(evaluator.ast_node_count(), 2);
        assert_eq!(evaluator.ast().unwrap().to_string(), "7");
    }

    #[test]
    fn rejects_non_variable_targets() {
        let tree = Node::new(
            Expression::Assignment {
                target: Box::new(Node::number(3.0, Span::default())),
                value: Box::new(Node::number(4.0, Span::default())),
            },
            Span::default(),
        );
        let mut variables = Variables::new();
        let mut scope = Scope {
            overrides: None,
            variables: &mut variables,
            functions: &FunctionTable::new(),
            miss_handler: None,
        };
        assert_eq!(
            scope.evaluate(&tree),
            Err(EvalError::InvalidAssignmentTarget {
                target: "3".to_string()
            })
        );

        let good = TokenTree::new(
            Expression::Assignment {
                target: Box::new(Node::new(
                    Expression::Variable(Name("a".to_string())),
                    Span::default(),
                )),
                value: Box::new(Node::number(4.0, Span::default())),
            },
            Span::default(),
        );
        assert_eq!(scope.evaluate(&good), Ok(4.0));
    }
}
