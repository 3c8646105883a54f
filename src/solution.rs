use crate::calculator::{CalcError, Calculator, Evaluation};
use crate::leveling::{LevelError, LevelManager, LevelReport, build_parameter_set};
use crate::naming::{NamingError, check_rename, rename_in_formula};
use crate::parameter::{CalculationItem, GroupedParameters};
use chrono::{DateTime, Utc};
use log::info;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// A configured value calculator: categorized parameters plus calculations.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct Solution {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub groups: GroupedParameters,
    #[serde(default)]
    pub calculations: Vec<CalculationItem>,
    #[serde(default)]
    pub saved_at: Option<DateTime<Utc>>,
}

impl Default for Solution {
    fn default() -> Self {
        Solution::new("Untitled solution")
    }
}

impl Solution {
    pub fn new(name: &str) -> Self {
        Solution {
            id: Uuid::new_v4(),
            name: name.to_string(),
            groups: GroupedParameters::new(),
            calculations: Vec::new(),
            saved_at: None,
        }
    }

    pub fn parameter_names(&self) -> Vec<&str> {
        self.groups
            .iter()
            .flat_map(|(_, items)| items.iter().map(|i| i.name.as_str()))
            .chain(self.calculations.iter().map(|c| c.name.as_str()))
            .collect()
    }

    pub fn levels(&self, levels: &LevelManager) -> Result<LevelReport, LevelError> {
        levels.level_groups(&self.groups, &self.calculations)
    }

    /// Runs the calculator over the solution; `inputs` override stored values.
    pub fn evaluate(
        &self,
        inputs: BTreeMap<String, f64>,
        targets: &[String],
        levels: &LevelManager,
    ) -> Result<Evaluation, CalcError> {
        let params = build_parameter_set(&self.groups, &self.calculations)?;
        Calculator::new(params, inputs)
            .with_level_manager(levels.clone())
            .evaluate(targets)
    }

    /// Renames a parameter and rewrites every formula that mentions it.
    pub fn rename_parameter(&mut self, old: &str, new: &str) -> Result<(), NamingError> {
        let names: Vec<String> = self.parameter_names().into_iter().map(str::to_string).collect();
        let name_refs: Vec<&str> = names.iter().map(String::as_str).collect();
        let existing = check_rename(&name_refs, old, new)?.to_string();
        let new = new.trim();

        for item in self.groups.items_mut() {
            if item.name == existing {
                item.name = new.to_string();
            }
            if let Some(formula) = item.formula.as_mut() {
                *formula = rename_in_formula(formula, &name_refs, &existing, new);
            }
        }
        for calc in self.calculations.iter_mut() {
            if calc.name == existing {
                calc.name = new.to_string();
            }
            calc.formula = rename_in_formula(&calc.formula, &name_refs, &existing, new);
        }
        info!("solution {}: renamed {} to {}", self.id, existing, new);
        Ok(())
    }
}
