use crate::parameter::{
    CalculationItem, FORMULA_LEVEL, GroupedParameters, Parameter, ParameterKind,
};
use crate::references::{ReferenceScanner, find_parameter_index};
use log::{debug, warn};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

/// Pass cap used when none is configured.
pub const DEFAULT_MAX_PASSES: usize = 100;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LevelError {
    #[error("duplicate parameter name: {0}")]
    DuplicateName(String),

    #[error("circular reference: {}", .path.join(" -> "))]
    Cycle { path: Vec<String> },

    #[error("parameter levels did not settle within {passes} passes")]
    NonConvergence { passes: usize },
}

/// Outcome of leveling a parameter set.
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct LevelReport {
    /// Parameters in ascending level order; ties keep their input order.
    pub parameters: Vec<Parameter>,
    /// Number of passes run, including the final pass that changed nothing.
    pub passes: usize,
    /// Formula name to the names of the parameters it references.
    pub dependencies: BTreeMap<String, Vec<String>>,
}

impl LevelReport {
    pub fn level_of(&self, name: &str) -> Option<u32> {
        self.parameters
            .iter()
            .find(|p| p.name == name)
            .map(|p| p.level)
    }

    pub fn max_level(&self) -> u32 {
        self.parameters.iter().map(|p| p.level).max().unwrap_or(0)
    }

    /// Parameters grouped by level, lowest level first.
    pub fn by_level(&self) -> BTreeMap<u32, Vec<&Parameter>> {
        let mut levels: BTreeMap<u32, Vec<&Parameter>> = BTreeMap::new();
        for param in &self.parameters {
            levels.entry(param.level).or_default().push(param);
        }
        levels
    }
}

/// Assigns dependency levels to parameters.
///
/// A formula parameter's level is one more than the highest level among the
/// parameters its formula mentions, or 2 when it mentions none. Inputs and
/// company parameters sit at level 1.
#[derive(Clone, Debug)]
pub struct LevelManager {
    max_passes: usize,
}

impl Default for LevelManager {
    fn default() -> Self {
        LevelManager {
            max_passes: DEFAULT_MAX_PASSES,
        }
    }
}

impl LevelManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_passes(max_passes: usize) -> Self {
        LevelManager {
            max_passes: max_passes.max(1),
        }
    }

    pub fn max_passes(&self) -> usize {
        self.max_passes
    }

    /// Builds the parameter set from grouped rows and explicit calculations, then levels it.
    pub fn level_groups(
        &self,
        grouped: &GroupedParameters,
        calculations: &[CalculationItem],
    ) -> Result<LevelReport, LevelError> {
        let params = build_parameter_set(grouped, calculations)?;
        self.level(params)
    }

    /// Assign levels to a flat parameter list
    ///
    /// Names must be unique ignoring case. References are resolved first and
    /// checked for cycles, then formula levels are raised pass by pass until a
    /// pass changes nothing.
    ///
    /// # Arguments
    /// * `params` - Parameters in definition order; their current levels are ignored
    ///
    /// # Returns
    /// * `Ok(LevelReport)` - Parameters sorted by level, pass count and dependency edges
    /// * `Err(LevelError)` - Duplicate name, circular reference, or levels still
    ///   changing after `max_passes` passes
    ///
    /// # Examples
    /// ```
    /// use valuecalc::leveling::LevelManager;
    /// use valuecalc::parameter::Parameter;
    ///
    /// let report = LevelManager::new()
    ///     .level(vec![
    ///         Parameter::formula("Annual Energy", "Facility Load * 8760"),
    ///         Parameter::formula("Facility Load", "IT Load * 1.4"),
    ///         Parameter::input("IT Load", 800.0),
    ///     ])
    ///     .unwrap();
    /// assert_eq!(report.level_of("IT Load"), Some(1));
    /// assert_eq!(report.level_of("Facility Load"), Some(2));
    /// assert_eq!(report.level_of("Annual Energy"), Some(3));
    /// ```
    pub fn level(&self, mut params: Vec<Parameter>) -> Result<LevelReport, LevelError> {
        let mut seen = BTreeSet::new();
        for param in &params {
            if !seen.insert(param.name.to_lowercase()) {
                return Err(LevelError::DuplicateName(param.name.clone()));
            }
        }

        for param in params.iter_mut() {
            param.level = param.kind.initial_level();
        }

        let deps = resolve_dependencies(&params);
        if let Some(path) = find_cycle(&deps) {
            let path: Vec<String> = path.into_iter().map(|i| params[i].name.clone()).collect();
            warn!("circular reference between parameters: {}", path.join(" -> "));
            return Err(LevelError::Cycle { path });
        }

        let formulas: Vec<usize> = (0..params.len())
            .filter(|&i| params[i].is_formula() && params[i].formula.is_some())
            .collect();

        let mut passes = 0;
        loop {
            if passes == self.max_passes {
                warn!(
                    "parameter levels still changing after {} passes",
                    self.max_passes
                );
                return Err(LevelError::NonConvergence { passes });
            }
            passes += 1;

            let mut changed = false;
            for &i in &formulas {
                let highest = deps[i].iter().map(|&j| params[j].level).max().unwrap_or(0);
                let level = if highest > 0 {
                    highest + 1
                } else {
                    FORMULA_LEVEL
                };
                if params[i].level != level {
                    params[i].level = level;
                    changed = true;
                }
            }

            if !changed {
                break;
            }
        }
        debug!("leveled {} parameters in {} passes", params.len(), passes);

        let dependencies = formulas
            .iter()
            .map(|&i| {
                let names = deps[i].iter().map(|&j| params[j].name.clone()).collect();
                (params[i].name.clone(), names)
            })
            .collect();

        params.sort_by_key(|p| p.level);

        Ok(LevelReport {
            parameters: params,
            passes,
            dependencies,
        })
    }
}

/// Flattens grouped rows and explicit calculations into one parameter list.
///
/// Calculations with an empty name or formula are skipped. An explicit
/// calculation sharing its name with a formula row replaces that row's
/// formula; any other repeated name is an error.
///
/// # Arguments
/// * `grouped` - Admin rows by category, in file order
/// * `calculations` - The solution's explicit calculation list
///
/// # Returns
/// * `Result<Vec<Parameter>, LevelError>` - Classified parameters at their initial levels
pub fn build_parameter_set(
    grouped: &GroupedParameters,
    calculations: &[CalculationItem],
) -> Result<Vec<Parameter>, LevelError> {
    let mut params: Vec<Parameter> = Vec::with_capacity(grouped.len() + calculations.len());

    for (category, items) in grouped.iter() {
        for item in items {
            let param = item.to_parameter(category);
            if contains_name(&params, &param.name) {
                return Err(LevelError::DuplicateName(param.name));
            }
            params.push(param);
        }
    }

    for calc in calculations.iter().filter(|c| c.is_complete()) {
        let param = calc.to_parameter();
        match params
            .iter_mut()
            .find(|p| p.name.to_lowercase() == param.name.to_lowercase())
        {
            Some(existing) if existing.kind == ParameterKind::Formula => {
                existing.formula = param.formula;
                if param.unit.is_some() {
                    existing.unit = param.unit;
                }
            }
            Some(_) => return Err(LevelError::DuplicateName(param.name)),
            None => params.push(param),
        }
    }

    Ok(params)
}

/// Levels a parameter list with the default pass cap.
pub fn assign_levels(params: Vec<Parameter>) -> Result<Vec<Parameter>, LevelError> {
    LevelManager::new().level(params).map(|report| report.parameters)
}

fn contains_name(params: &[Parameter], name: &str) -> bool {
    let lowered = name.to_lowercase();
    params.iter().any(|p| p.name.to_lowercase() == lowered)
}

// For each parameter, the indices of the parameters its formula references.
fn resolve_dependencies(params: &[Parameter]) -> Vec<Vec<usize>> {
    let scanner = ReferenceScanner::for_parameters(params);
    params
        .iter()
        .map(|param| match (&param.kind, &param.formula) {
            (ParameterKind::Formula, Some(formula)) => {
                let mut refs: Vec<usize> = Vec::new();
                for reference in scanner.occurrences(formula) {
                    if reference.is_call(formula) {
                        continue;
                    }
                    if let Some(j) = find_parameter_index(reference.name, params) {
                        if !refs.contains(&j) {
                            refs.push(j);
                        }
                    }
                }
                refs
            }
            _ => Vec::new(),
        })
        .collect()
}

#[derive(Clone, Copy, PartialEq)]
enum Mark {
    Unvisited,
    OnPath,
    Done,
}

/// Depth-first search over the reference graph. Returns the first cycle found
/// as a path that starts and ends at the same parameter.
fn find_cycle(deps: &[Vec<usize>]) -> Option<Vec<usize>> {
    let mut marks = vec![Mark::Unvisited; deps.len()];

    for root in 0..deps.len() {
        if marks[root] != Mark::Unvisited {
            continue;
        }
        // (node, index of the next dependency to look at)
        let mut work_stack: Vec<(usize, usize)> = vec![(root, 0)];
        marks[root] = Mark::OnPath;

        while let Some(top) = work_stack.len().checked_sub(1) {
            let (node, next) = work_stack[top];
            if let Some(&dep) = deps[node].get(next) {
                work_stack[top].1 += 1;
                match marks[dep] {
                    Mark::Unvisited => {
                        marks[dep] = Mark::OnPath;
                        work_stack.push((dep, 0));
                    }
                    Mark::OnPath => {
                        let start = work_stack
                            .iter()
                            .position(|&(n, _)| n == dep)
                            .unwrap_or(0);
                        let mut path: Vec<usize> =
                            work_stack[start..].iter().map(|&(n, _)| n).collect();
                        path.push(dep);
                        return Some(path);
                    }
                    Mark::Done => {}
                }
            } else {
                marks[node] = Mark::Done;
                work_stack.pop();
            }
        }
    }
    None
}
