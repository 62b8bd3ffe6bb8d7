use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::EvalError;

mod math;

pub type NativeFunction = dyn Fn(&[f64]) -> f64 + Send + Sync;

/// A callable exposed to expressions, either built in or registered by the host.
#[derive(Clone)]
pub struct Function {
    arity: Option<usize>,
    call: Arc<NativeFunction>,
}

impl Function {
    /// A function that must be called with exactly `arity` arguments.
    pub fn new<F>(arity: usize, call: F) -> Self
    where
        F: Fn(&[f64]) -> f64 + Send + Sync + 'static,
    {
        Self {
            arity: Some(arity),
            call: Arc::new(call),
        }
    }

    /// A function that accepts any number of arguments.
    pub fn variadic<F>(call: F) -> Self
    where
        F: Fn(&[f64]) -> f64 + Send + Sync + 'static,
    {
        Self {
            arity: None,
            call: Arc::new(call),
        }
    }

    pub fn unary(call: fn(f64) -> f64) -> Self {
        Self::new(1, move |args| call(args[0]))
    }

    pub fn arity(&self) -> Option<usize> {
        self.arity
    }

    /// Call the function, checking the argument count first. `name` only feeds the error.
    pub fn invoke(&self, name: &str, args: &[f64]) -> Result<f64, EvalError> {
        match self.arity {
            Some(expected) if expected != args.len() => Err(EvalError::ArityMismatch {
                name: name.to_string(),
                expected,
                found: args.len(),
            }),
            _ => Ok((self.call)(args)),
        }
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Function")
            .field("arity", &self.arity)
            .finish_non_exhaustive()
    }
}

pub fn lookup_builtin(name: &str) -> Option<&'static Function> {
    math::MATH.get(name)
}

/// User functions layered over the built-in table. Entries registered here shadow built-ins of
/// the same name.
#[derive(Debug, Clone, Default)]
pub struct FunctionTable {
    user: HashMap<String, Function>,
}

impl FunctionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, function: Function) -> Option<Function> {
        self.user.insert(name.into(), function)
    }

    pub fn resolve(&self, name: &str) -> Option<&Function> {
        self.user.get(name).or_else(|| lookup_builtin(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_functions_shadow_builtins() {
        let mut table = FunctionTable::new();
        let sin = table.resolve("sin").unwrap();
        assert_eq!(sin.invoke("sin", &[0.0]), Ok(0.0));

        assert!(table.register("sin", Function::unary(|x| x * 10.0)).is_none());
        assert_eq!(table.resolve("sin").unwrap().invoke("sin", &[4.0]), Ok(40.0));
        assert!(table.resolve("nope").is_none());
    }

    #[test]
    fn arity_is_checked() {
        let pi = lookup_builtin("pi").unwrap();
        assert_eq!(
            pi.invoke("pi", &[1.0]),
            Err(EvalError::ArityMismatch {
                name: "pi".to_string(),
                expected: 0,
                found: 1
            })
        );

        let sum = Function::variadic(|args| args.iter().sum());
        assert_eq!(sum.arity(), None);
        assert_eq!(sum.invoke("sum", &[1.0, 2.0, 3.0]), Ok(6.0));
        assert_eq!(sum.invoke("sum", &[]), Ok(0.0));
    }
}
