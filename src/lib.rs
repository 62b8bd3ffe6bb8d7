pub mod ast;
pub mod compiler;
pub mod error;
pub mod evaluator;
mod helpers;
pub mod lexer;
pub mod math;
pub mod optimizer;
pub mod parser;
pub mod stdlib;
pub mod token;

pub use compiler::CompiledExpression;
pub use error::{Error, EvalError, LexError, ParseError, ParseErrorKind, Result};
pub use evaluator::{Evaluator, MissHandler, Variables};
pub use parser::Options;
pub use stdlib::{Function, FunctionTable};
