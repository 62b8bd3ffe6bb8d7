use clap::Parser;
use expr_interpreter::{lexer, Evaluator, Options, Variables};
use miette::LabeledSpan;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Input {
    /// The expression to evaluate
    expression: String,

    /// Give a variable a value, as NAME=VALUE. Can be repeated.
    #[clap(long = "var", value_parser = parse_variable)]
    variables: Vec<(String, f64)>,

    /// Require statements to be separated by ';'
    #[clap(long, default_value = "false")]
    force_semicolon: bool,

    /// Fold constant subexpressions before evaluating.
    #[clap(long, default_value = "false")]
    optimize: bool,

    /// Evaluate through a compiled closure instead of walking the AST.
    #[clap(long, default_value = "false")]
    compile: bool,

    /// Debug the lexer, printing out each token. Does not parse or evaluate the expression.
    #[clap(long, default_value = "false")]
    debug_lexer: bool,

    /// Debug the parser, printing out the AST. Does not evaluate the expression.
    #[clap(long, default_value = "false")]
    debug_parser: bool,
}

fn main() {
    let Input {
        expression,
        variables,
        force_semicolon,
        optimize,
        compile,
        debug_lexer,
        debug_parser,
    } = Input::parse();

    let options = Options { force_semicolon };

    if debug_lexer {
        run_debug_lexer(&expression);
        return;
    }

    if debug_parser {
        run_debug_parser(&expression, options, optimize);
        return;
    }

    let variables: Variables = variables.into_iter().collect();
    match run(&expression, options, &variables, optimize, compile) {
        Ok(value) => println!("{value}"),
        Err(e) => {
            eprintln!("{:?}", miette::Report::new(e));
            std::process::exit(1);
        }
    }
}

fn run(
    expression: &str,
    options: Options,
    variables: &Variables,
    optimize: bool,
    compile: bool,
) -> expr_interpreter::Result<f64> {
    let mut evaluator = Evaluator::with_options(options);
    evaluator.parse(expression)?;
    if optimize {
        evaluator.optimize();
    }

    if compile {
        return Ok(evaluator.compile()?.call(Some(variables))?);
    }
    evaluator.evaluate(Some(variables))
}

fn run_debug_lexer(source: &str) {
    for token in lexer::Lexer::new(source, lexer::default_rules()) {
        match token {
            Ok(t) => {
                let kind = format!("{:?}({:?})", t.kind, t.text);
                let diag = miette::miette!(
                    labels = vec![LabeledSpan::at(t.span.start..t.span.end, kind)],
                    severity = miette::Severity::Advice,
                    "found a token",
                )
                .with_source_code(source.to_string());
                eprintln!("{:?}", diag);
            }
            Err(e) => {
                eprintln!("{:?}", miette::Report::new(e));
                std::process::exit(1);
            }
        }
    }
}

fn run_debug_parser(source: &str, options: Options, optimize: bool) {
    let mut evaluator = Evaluator::with_options(options);
    if let Err(e) = evaluator.parse(source) {
        eprintln!("{:?}", miette::Report::new(e));
        std::process::exit(1);
    }
    if optimize {
        evaluator.optimize();
    }

    if let Some(ast) = evaluator.ast() {
        println!("{ast}");
        dbg!(ast);
    }
}

fn parse_variable(input: &str) -> Result<(String, f64), String> {
    let (name, value) = input
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=VALUE, got '{input}'"))?;
    let value = value
        .trim()
        .parse::<f64>()
        .map_err(|e| format!("invalid value for '{name}': {e}"))?;

    Ok((name.trim().to_string(), value))
}
