use std::collections::HashMap;
use valuecalc::formula::{
    DisplayKind, EvalError, FormulaError, FunctionName, display_tokens, parse_formula,
};

fn eval(formula: &str) -> f64 {
    let no_vars = |_: &str| None;
    parse_formula(formula).unwrap().evaluate(&no_vars).unwrap()
}

fn eval_with(formula: &str, vars: &[(&str, f64)]) -> Result<f64, EvalError> {
    let vars: HashMap<&str, f64> = vars.iter().copied().collect();
    let lookup = |name: &str| vars.get(name).copied();
    parse_formula(formula).unwrap().evaluate(&lookup)
}

#[test]
fn test_precedence() {
    assert_eq!(eval("1 + 2 * 3"), 7.0);
    assert_eq!(eval("(1 + 2) * 3"), 9.0);
    assert_eq!(eval("10 - 4 - 3"), 3.0);
    assert_eq!(eval("24 / 4 / 3"), 2.0);
    assert_eq!(eval("2 * 3 ^ 2"), 18.0);
}

#[test]
fn test_power_operators() {
    assert_eq!(eval("2 ^ 3 ^ 2"), 512.0);
    assert_eq!(eval("2 ** 3"), 8.0);
    assert_eq!(eval("-2 ^ 2"), -4.0);
    assert_eq!(eval("2 ^ -1"), 0.5);
}

#[test]
fn test_unary_signs() {
    assert_eq!(eval("-3 + 5"), 2.0);
    assert_eq!(eval("+3 - -2"), 5.0);
    assert_eq!(eval("4 * -(1 + 1)"), -8.0);
}

#[test]
fn test_number_forms() {
    assert_eq!(eval("1e3"), 1000.0);
    assert_eq!(eval("2.5E-1 * 4"), 1.0);
    assert_eq!(eval(".5 + 0.5"), 1.0);
}

#[test]
fn test_functions() {
    assert_eq!(eval("MIN(3, 1, 2)"), 1.0);
    assert_eq!(eval("max(3, 1, 2)"), 3.0);
    assert_eq!(eval("SUM(1, 2, 3, 4)"), 10.0);
    assert_eq!(eval("AVG(2, 4)"), 3.0);
    assert_eq!(eval("ABS(-7)"), 7.0);
    assert_eq!(eval("ROUND(2.346, 2)"), 2.35);
    assert_eq!(eval("ROUND(2.5)"), 3.0);
    assert_eq!(eval("SQRT(16) + 1"), 5.0);
}

#[test]
fn test_variables() {
    let expr = parse_formula("Load * PUE + Load / Hours").unwrap();
    assert_eq!(expr.variables(), vec!["Load", "PUE", "Hours"]);
    assert!(parse_formula("MAX(1, 2)").unwrap().variables().is_empty());

    assert_eq!(
        eval_with("Load * PUE", &[("Load", 100.0), ("PUE", 1.5)]),
        Ok(150.0)
    );
}

#[test]
fn test_evaluation_errors() {
    assert_eq!(
        eval_with("Load * 2", &[]),
        Err(EvalError::UndefinedVariable("Load".to_string()))
    );
    assert_eq!(
        eval_with("1 / (Load - 1)", &[("Load", 1.0)]),
        Err(EvalError::DivisionByZero)
    );
}

#[test]
fn test_parse_errors() {
    assert_eq!(parse_formula("2 +"), Err(FormulaError::UnexpectedEnd));
    assert_eq!(parse_formula(""), Err(FormulaError::UnexpectedEnd));
    assert_eq!(parse_formula("(1 + 2"), Err(FormulaError::UnexpectedEnd));
    assert_eq!(
        parse_formula("2 $ 3"),
        Err(FormulaError::UnexpectedToken {
            found: "$".to_string(),
            position: 2
        })
    );
    assert_eq!(
        parse_formula("1 2"),
        Err(FormulaError::UnexpectedToken {
            found: "2".to_string(),
            position: 2
        })
    );
    assert_eq!(
        parse_formula("FOO(1)"),
        Err(FormulaError::UnknownFunction {
            name: "FOO".to_string(),
            position: 0
        })
    );
    assert_eq!(
        parse_formula("1.2.3"),
        Err(FormulaError::InvalidNumber {
            text: "1.2.3".to_string(),
            position: 0
        })
    );
}

#[test]
fn test_arity_errors() {
    assert_eq!(
        parse_formula("SQRT(1, 2)"),
        Err(FormulaError::Arity {
            function: FunctionName::Sqrt,
            expected: "1",
            found: 2
        })
    );
    assert!(matches!(
        parse_formula("MIN()"),
        Err(FormulaError::Arity { found: 0, .. })
    ));
}

#[test]
fn test_display_tokens() {
    let tokens = display_tokens("(Total Cost + 12.5) * PUE");
    let kinds: Vec<(DisplayKind, &str)> = tokens.iter().map(|t| (t.kind, t.text.as_str())).collect();
    assert_eq!(
        kinds,
        vec![
            (DisplayKind::Operator, "("),
            (DisplayKind::Name, "Total Cost"),
            (DisplayKind::Operator, "+"),
            (DisplayKind::Number, "12.5"),
            (DisplayKind::Operator, ")"),
            (DisplayKind::Operator, "*"),
            (DisplayKind::Name, "PUE"),
        ]
    );
}

#[test]
fn test_nesting_limit() {
    let nested = |depth: usize| format!("{}1{}", "(".repeat(depth), ")".repeat(depth));
    assert_eq!(eval(&nested(200)), 1.0);

    assert_eq!(
        parse_formula(&nested(300)),
        Err(FormulaError::TooDeep { position: 256 })
    );
    assert!(matches!(
        parse_formula(&nested(200_000)),
        Err(FormulaError::TooDeep { .. })
    ));
    assert!(matches!(
        parse_formula(&format!("{}1", "-".repeat(100_000))),
        Err(FormulaError::TooDeep { .. })
    ));
    assert!(matches!(
        parse_formula(&vec!["2"; 1_000].join(" ^ ")),
        Err(FormulaError::TooDeep { .. })
    ));
}
