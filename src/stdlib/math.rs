use std::collections::HashMap;
use std::f64::consts::PI;
use std::sync::LazyLock;

use super::Function;

pub(super) static MATH: LazyLock<HashMap<&'static str, Function>> = LazyLock::new(|| {
    let mut math = HashMap::new();

    // Functions
    math.insert("acos", Function::unary(f64::acos));
    math.insert("asin", Function::unary(f64::asin));
    math.insert("atan", Function::unary(f64::atan));
    math.insert("ceil", Function::unary(f64::ceil));
    math.insert("cos", Function::unary(f64::cos));
    math.insert("cosh", Function::unary(f64::cosh));
    math.insert("exp", Function::unary(f64::exp));
    math.insert("floor", Function::unary(f64::floor));
    math.insert("log", Function::unary(f64::ln));
    math.insert("log10", Function::unary(f64::log10));
    math.insert("log2", Function::unary(f64::log2));
    math.insert("sin", Function::unary(f64::sin));
    math.insert("sinh", Function::unary(f64::sinh));
    math.insert("sqrt", Function::unary(f64::sqrt));
    math.insert("tan", Function::unary(f64::tan));
    math.insert("theta", Function::unary(theta));

    // Constants
    math.insert("pi", Function::new(0, |_| PI));

    math
});

/// Heaviside step: 1 for positive input, 0 otherwise (NaN included).
fn theta(x: f64) -> f64 {
    if x > 0.0 {
        1.0
    } else {
        0.0
    }
}
