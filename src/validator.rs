use crate::calculator::{CalcError, Calculator};
use crate::leveling::LevelManager;
use crate::naming::{clean_formula, clean_parameter_name, name_mapping};
use crate::parameter::{
    CalculationItem, GroupedParameters, Parameter, ParameterKind, SourceItem, classify,
};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One parameter of a validation request, under its cleaned name.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct RequestParameter {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ParameterKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formula: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Everything needed to compute a candidate calculation against a solution's parameters.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
pub struct ValidationRequest {
    pub inputs: BTreeMap<String, f64>,
    pub parameters: Vec<RequestParameter>,
    pub target: Vec<String>,
}

struct Unified<'a> {
    name: &'a str,
    kind: ParameterKind,
    item: Option<&'a SourceItem>,
    formula: Option<&'a str>,
    unit: Option<&'a str>,
    description: Option<&'a str>,
}

impl ValidationRequest {
    pub fn build(grouped: &GroupedParameters, candidate: Option<&CalculationItem>) -> Self {
        let candidate = candidate.filter(|c| c.is_complete());
        let mut unified: Vec<Unified<'_>> = Vec::new();

        for (category, items) in grouped.iter() {
            for item in items {
                let kind = classify(category, item);
                // The candidate supersedes a stored calculation of the same name.
                if let Some(c) = candidate {
                    if kind == ParameterKind::Formula
                        && clean_parameter_name(&item.name) == clean_parameter_name(&c.name)
                    {
                        continue;
                    }
                }
                unified.push(Unified {
                    name: &item.name,
                    kind,
                    item: Some(item),
                    formula: item.formula.as_deref(),
                    unit: item.units.as_deref(),
                    description: item.description.as_deref(),
                });
            }
        }
        if let Some(c) = candidate {
            unified.push(Unified {
                name: &c.name,
                kind: ParameterKind::Formula,
                item: None,
                formula: Some(&c.formula),
                unit: c.units.as_deref(),
                description: c.description.as_deref(),
            });
        }

        let mapping = name_mapping(unified.iter().map(|u| u.name));
        let mut request = ValidationRequest::default();

        for u in &unified {
            let clean = clean_parameter_name(u.name);
            let filtered = u.item.is_some_and(SourceItem::is_filter);
            match u.kind {
                ParameterKind::Input | ParameterKind::Company => {
                    if filtered {
                        continue;
                    }
                    let value = u.item.and_then(SourceItem::resolved_value);
                    if let Some(value) = value {
                        request.inputs.insert(clean.clone(), value);
                    }
                    request.parameters.push(RequestParameter {
                        name: clean,
                        kind: u.kind,
                        value: value.filter(|_| u.kind == ParameterKind::Company),
                        formula: None,
                        unit: u.unit.map(str::to_string),
                        description: u.description.map(str::to_string),
                    });
                }
                ParameterKind::Formula => {
                    let Some(formula) = u.formula.filter(|f| !f.trim().is_empty()) else {
                        continue;
                    };
                    request.parameters.push(RequestParameter {
                        name: clean,
                        kind: ParameterKind::Formula,
                        value: None,
                        formula: Some(clean_formula(formula, &mapping)),
                        unit: u.unit.map(str::to_string),
                        description: u.description.map(str::to_string),
                    });
                }
            }
        }

        if let Some(c) = candidate {
            request.target.push(clean_parameter_name(&c.name));
        }
        debug!(
            "validation request: {} inputs, {} parameters, targets {:?}",
            request.inputs.len(),
            request.parameters.len(),
            request.target
        );
        request
    }

    pub fn to_parameters(&self) -> Vec<Parameter> {
        self.parameters
            .iter()
            .map(|p| Parameter {
                name: p.name.clone(),
                kind: p.kind,
                level: p.kind.initial_level(),
                category: String::new(),
                formula: p.formula.clone(),
                unit: p.unit.clone(),
                value: p.value,
            })
            .collect()
    }

    /// Computes every target, keyed by its cleaned name.
    pub fn run(&self, levels: &LevelManager) -> Result<BTreeMap<String, f64>, CalcError> {
        let evaluation = Calculator::new(self.to_parameters(), self.inputs.clone())
            .with_level_manager(levels.clone())
            .evaluate(&self.target)?;
        let values = evaluation.targets(&self.target)?;
        Ok(self.target.iter().cloned().zip(values).collect())
    }
}

/// Computes a candidate calculation against the solution's parameters.
///
/// # Arguments
/// * `grouped` - The solution's categorized rows
/// * `candidate` - Calculation being edited; replaces a stored one of the same name
/// * `levels` - Leveling settings for the run
///
/// # Returns
/// * `Ok(f64)` - The candidate's value
/// * `Err(CalcError)` - `UnknownTarget` when the candidate has no name or formula,
///   otherwise whatever the calculation run reported
pub fn validate(
    grouped: &GroupedParameters,
    candidate: &CalculationItem,
    levels: &LevelManager,
) -> Result<f64, CalcError> {
    let request = ValidationRequest::build(grouped, Some(candidate));
    let target = request
        .target
        .first()
        .cloned()
        .ok_or_else(|| CalcError::UnknownTarget(candidate.name.clone()))?;
    let results = request.run(levels)?;
    results
        .get(&target)
        .copied()
        .ok_or(CalcError::UnknownTarget(target))
}
