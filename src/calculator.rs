use crate::formula::{BinaryOp, EvalError, Expr, FormulaError, FunctionName, parse_formula};
use crate::leveling::{LevelError, LevelManager, LevelReport};
use crate::parameter::Parameter;
use crate::references::ReferenceScanner;
use crate::units::Unit;
use log::{debug, info};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CalcError {
    #[error(transparent)]
    Level(#[from] LevelError),

    #[error("formula for {name}: {source}")]
    Formula {
        name: String,
        #[source]
        source: FormulaError,
    },

    #[error("evaluating {name}: {source}")]
    Evaluation {
        name: String,
        #[source]
        source: EvalError,
    },

    #[error("unknown target: {0}")]
    UnknownTarget(String),
}

/// Values produced by a calculation run.
#[derive(Clone, Debug, Default, Serialize, PartialEq)]
pub struct Evaluation {
    /// Every parameter that received a value, inputs included.
    pub values: BTreeMap<String, f64>,
    /// Declared or inferred unit per parameter.
    pub units: BTreeMap<String, String>,
    /// Formula parameters in the order they were evaluated.
    pub order: Vec<String>,
    pub levels: BTreeMap<String, u32>,
}

impl Evaluation {
    pub fn get(&self, name: &str) -> Option<f64> {
        self.values.get(name).copied()
    }

    /// Values for the requested targets, in request order.
    pub fn targets(&self, targets: &[String]) -> Result<Vec<f64>, CalcError> {
        targets
            .iter()
            .map(|t| {
                self.get(t)
                    .ok_or_else(|| CalcError::UnknownTarget(t.clone()))
            })
            .collect()
    }
}

/// Evaluates formula parameters in level order.
#[derive(Clone, Debug)]
pub struct Calculator {
    parameters: Vec<Parameter>,
    inputs: BTreeMap<String, f64>,
    levels: LevelManager,
}

// Placeholder identifier for the parameter at `index` of the leveled list.
// Padded so text around the name cannot run into the slot.
fn slot_name(index: usize) -> String {
    format!(" __p{} ", index)
}

fn slot_index(ident: &str) -> Option<usize> {
    ident.trim().strip_prefix("__p")?.parse().ok()
}

// Replaces every parameter name with its slot. Built-in function names used
// as calls stay as they are.
fn slot_formula(formula: &str, scanner: &ReferenceScanner<'_>, names: &[&str]) -> String {
    let mut occurrences = scanner.occurrences(formula);
    occurrences.sort_by_key(|r| r.span.start);

    let mut out = String::with_capacity(formula.len() + 8 * occurrences.len());
    let mut cursor = 0;
    for reference in occurrences {
        if reference.is_call(formula) {
            continue;
        }
        let Some(index) = names.iter().position(|n| *n == reference.name) else {
            continue;
        };
        out.push_str(&formula[cursor..reference.span.start]);
        out.push_str(&slot_name(index));
        cursor = reference.span.end;
    }
    out.push_str(&formula[cursor..]);
    out
}

impl Calculator {
    pub fn new(parameters: Vec<Parameter>, inputs: BTreeMap<String, f64>) -> Self {
        Calculator {
            parameters,
            inputs,
            levels: LevelManager::new(),
        }
    }

    pub fn with_level_manager(mut self, levels: LevelManager) -> Self {
        self.levels = levels;
        self
    }

    /// Evaluates every formula parameter.
    pub fn evaluate_all(&self) -> Result<Evaluation, CalcError> {
        self.evaluate(&[])
    }

    /// Evaluates the formulas the targets depend on.
    ///
    /// # Arguments
    /// * `targets` - Parameter names to compute; an empty slice means every formula
    ///
    /// # Returns
    /// * `Ok(Evaluation)` - Values, units and levels of everything computed
    /// * `Err(CalcError)` - Leveling failed, a formula did not parse or evaluate,
    ///   or a target is not a parameter
    ///
    /// # Examples
    /// ```
    /// use std::collections::BTreeMap;
    /// use valuecalc::{Calculator, Parameter};
    ///
    /// let params = vec![
    ///     Parameter::input("Load", 500.0).with_unit("kW"),
    ///     Parameter::formula("Peak", "Load * 1.2"),
    /// ];
    /// let evaluation = Calculator::new(params, BTreeMap::new())
    ///     .evaluate(&["Peak".to_string()])
    ///     .unwrap();
    /// assert_eq!(evaluation.get("Peak"), Some(600.0));
    /// assert_eq!(evaluation.units["Peak"], "kW");
    /// ```
    pub fn evaluate(&self, targets: &[String]) -> Result<Evaluation, CalcError> {
        let report = self.levels.level(self.parameters.clone())?;
        let params = &report.parameters;

        let needed = needed_formulas(&report, targets)?;
        let names: Vec<&str> = params.iter().map(|p| p.name.as_str()).collect();
        let scanner = ReferenceScanner::new(names.iter().copied());

        let mut values: Vec<Option<f64>> = params
            .iter()
            .map(|p| {
                if p.is_formula() {
                    None
                } else {
                    self.input_value(p)
                }
            })
            .collect();
        let mut units: Vec<Option<String>> = params.iter().map(|p| p.unit.clone()).collect();
        let mut dims: Vec<Option<Unit>> = params
            .iter()
            .map(|p| p.unit.as_deref().and_then(Unit::parse))
            .collect();
        let mut order = Vec::new();

        for (i, param) in params.iter().enumerate() {
            let formula = match (&param.formula, param.is_formula()) {
                (Some(formula), true) if needed.contains(param.name.as_str()) => formula,
                _ => continue,
            };
            let rewritten = slot_formula(formula, &scanner, &names);
            let expr = parse_formula(&rewritten).map_err(|source| CalcError::Formula {
                name: param.name.clone(),
                source: restore_formula_names(source, &names),
            })?;

            let result = {
                let lookup = |ident: &str| match slot_index(ident) {
                    Some(j) => values.get(j).copied().flatten(),
                    None => self.inputs.get(ident).copied(),
                };
                expr.evaluate(&lookup)
            }
            .map_err(|source| CalcError::Evaluation {
                name: param.name.clone(),
                source: restore_eval_names(source, &names),
            })?;

            if !result.is_finite() {
                return Err(CalcError::Evaluation {
                    name: param.name.clone(),
                    source: EvalError::NonFinite(param.name.clone()),
                });
            }
            debug!("{} = {} (level {})", param.name, result, param.level);
            values[i] = Some(result);
            if units[i].is_none() {
                dims[i] = infer_unit(&expr, &dims);
                units[i] = dims[i].as_ref().map(Unit::to_string);
            }
            order.push(param.name.clone());
        }
        info!(
            "evaluated {} formulas across {} levels",
            order.len(),
            report.max_level()
        );

        let mut evaluation = Evaluation {
            order,
            ..Evaluation::default()
        };
        for (i, param) in params.iter().enumerate() {
            if let Some(value) = values[i] {
                evaluation.values.insert(param.name.clone(), value);
            }
            if let Some(unit) = &units[i] {
                evaluation.units.insert(param.name.clone(), unit.clone());
            }
            evaluation.levels.insert(param.name.clone(), param.level);
        }
        Ok(evaluation)
    }

    // Explicit inputs win over the parameter's stored value.
    fn input_value(&self, param: &Parameter) -> Option<f64> {
        self.inputs
            .get(&param.name)
            .or_else(|| {
                let lowered = param.name.to_lowercase();
                self.inputs
                    .iter()
                    .find(|(k, _)| k.to_lowercase() == lowered)
                    .map(|(_, v)| v)
            })
            .copied()
            .or(param.value)
    }
}

// Names of the formulas the targets depend on, targets included.
fn needed_formulas<'r>(
    report: &'r LevelReport,
    targets: &[String],
) -> Result<BTreeSet<&'r str>, CalcError> {
    if targets.is_empty() {
        return Ok(report
            .parameters
            .iter()
            .filter(|p| p.is_formula())
            .map(|p| p.name.as_str())
            .collect());
    }

    let mut needed = BTreeSet::new();
    let mut stack: Vec<&str> = Vec::new();
    for target in targets {
        let param = report
            .parameters
            .iter()
            .find(|p| p.name == *target)
            .ok_or_else(|| CalcError::UnknownTarget(target.clone()))?;
        stack.push(param.name.as_str());
    }
    while let Some(name) = stack.pop() {
        if !needed.insert(name) {
            continue;
        }
        if let Some(deps) = report.dependencies.get(name) {
            stack.extend(deps.iter().map(String::as_str));
        }
    }
    Ok(needed)
}

// Slot identifiers back to the parameter names they stand for.
fn restore_name(ident: String, names: &[&str]) -> String {
    slot_index(&ident)
        .and_then(|i| names.get(i))
        .map(|n| n.to_string())
        .unwrap_or(ident)
}

fn restore_eval_names(err: EvalError, names: &[&str]) -> EvalError {
    match err {
        EvalError::UndefinedVariable(ident) => {
            EvalError::UndefinedVariable(restore_name(ident, names))
        }
        other => other,
    }
}

fn restore_formula_names(err: FormulaError, names: &[&str]) -> FormulaError {
    match err {
        FormulaError::UnexpectedToken { found, position } => FormulaError::UnexpectedToken {
            found: restore_name(found, names),
            position,
        },
        FormulaError::UnknownFunction { name, position } => FormulaError::UnknownFunction {
            name: restore_name(name, names),
            position,
        },
        other => other,
    }
}

// Units that cannot be combined, such as kW + h.
struct Conflict;

/// Unit of a formula's result, derived from the units of what it references.
///
/// Products and quotients compose units; sums and the aggregate functions
/// need matching ones. Any mismatch leaves the result without a unit.
fn infer_unit(expr: &Expr, units: &[Option<Unit>]) -> Option<Unit> {
    unit_of(expr, units)
        .ok()
        .flatten()
        .filter(|u| !u.is_dimensionless())
}

fn unit_of(expr: &Expr, units: &[Option<Unit>]) -> Result<Option<Unit>, Conflict> {
    match expr {
        Expr::Number(_) => Ok(None),
        Expr::Variable(ident) => Ok(slot_index(ident).and_then(|j| units.get(j).cloned().flatten())),
        Expr::Unary { operand, .. } => unit_of(operand, units),
        Expr::Binary { op, lhs, rhs } => {
            let left = unit_of(lhs, units)?;
            match op {
                BinaryOp::Add | BinaryOp::Subtract => matching(left, unit_of(rhs, units)?),
                BinaryOp::Multiply => Ok(match (left, unit_of(rhs, units)?) {
                    (Some(a), Some(b)) => Some(a.multiply(&b)),
                    (a, b) => a.or(b),
                }),
                BinaryOp::Divide => Ok(match (left, unit_of(rhs, units)?) {
                    (Some(a), Some(b)) => Some(a.divide(&b)),
                    (None, Some(b)) => Some(b.powi(-1)),
                    (a, None) => a,
                }),
                BinaryOp::Power => match (left, rhs.as_ref()) {
                    (None, _) => Ok(None),
                    (Some(base), Expr::Number(n)) if n.fract() == 0.0 => {
                        Ok(Some(base.powi(*n as i32)))
                    }
                    (Some(_), _) => Err(Conflict),
                },
            }
        }
        Expr::Call { function, args } => match function {
            FunctionName::Sqrt => match args.first().map(|a| unit_of(a, units)).transpose()? {
                Some(Some(u)) => u.sqrt().map(Some).ok_or(Conflict),
                _ => Ok(None),
            },
            _ => args
                .iter()
                .try_fold(None, |acc, arg| matching(acc, unit_of(arg, units)?)),
        },
    }
}

fn matching(a: Option<Unit>, b: Option<Unit>) -> Result<Option<Unit>, Conflict> {
    match (a, b) {
        (Some(a), Some(b)) if a != b => Err(Conflict),
        (a, b) => Ok(a.or(b)),
    }
}
