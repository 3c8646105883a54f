use serde::de::{self, MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Level assigned to every non-formula parameter.
pub const INPUT_LEVEL: u32 = 1;

/// Starting level of a formula parameter before leveling re-derives it.
pub const FORMULA_LEVEL: u32 = 2;

/// How a parameter obtains its value.
#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum ParameterKind {
    /// Entered by the user of the calculator.
    #[serde(alias = "USER")]
    Input,
    /// Fixed by the company configuring the solution.
    Company,
    /// Derived from other parameters through a formula.
    #[serde(alias = "CALCULATION")]
    Formula,
}

impl ParameterKind {
    pub fn initial_level(self) -> u32 {
        match self {
            ParameterKind::Formula => FORMULA_LEVEL,
            ParameterKind::Input | ParameterKind::Company => INPUT_LEVEL,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ParameterKind::Input => "INPUT",
            ParameterKind::Company => "COMPANY",
            ParameterKind::Formula => "FORMULA",
        }
    }
}

impl fmt::Display for ParameterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named parameter of a solution, as seen by the leveling engine.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct Parameter {
    pub name: String,
    pub kind: ParameterKind,
    #[serde(default)]
    pub level: u32,
    #[serde(default)]
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formula: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
}

impl Parameter {
    pub fn input(name: &str, value: f64) -> Self {
        Parameter {
            name: name.to_string(),
            kind: ParameterKind::Input,
            level: INPUT_LEVEL,
            category: "general".to_string(),
            formula: None,
            unit: None,
            value: Some(value),
        }
    }

    pub fn company(name: &str, value: f64) -> Self {
        Parameter {
            kind: ParameterKind::Company,
            ..Parameter::input(name, value)
        }
    }

    pub fn formula(name: &str, formula: &str) -> Self {
        Parameter {
            name: name.to_string(),
            kind: ParameterKind::Formula,
            level: FORMULA_LEVEL,
            category: "calculations".to_string(),
            formula: Some(formula.to_string()),
            unit: None,
            value: None,
        }
    }

    pub fn with_unit(mut self, unit: &str) -> Self {
        self.unit = Some(unit.to_string());
        self
    }

    pub fn is_formula(&self) -> bool {
        self.kind == ParameterKind::Formula
    }
}

/// Numeric field that the admin screens store either as a number or as text.
///
/// Human-readable formats accept the bare number or string; binary snapshots
/// store it tagged.
#[derive(Clone, Debug, PartialEq)]
pub enum RawValue {
    Number(f64),
    Text(String),
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum RawValueUntagged {
    Number(f64),
    Text(String),
}

#[derive(Serialize, Deserialize)]
enum RawValueTagged {
    Number(f64),
    Text(String),
}

impl Serialize for RawValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match (serializer.is_human_readable(), self) {
            (true, RawValue::Number(n)) => RawValueUntagged::Number(*n).serialize(serializer),
            (true, RawValue::Text(s)) => RawValueUntagged::Text(s.clone()).serialize(serializer),
            (false, RawValue::Number(n)) => RawValueTagged::Number(*n).serialize(serializer),
            (false, RawValue::Text(s)) => RawValueTagged::Text(s.clone()).serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for RawValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            Ok(match RawValueUntagged::deserialize(deserializer)? {
                RawValueUntagged::Number(n) => RawValue::Number(n),
                RawValueUntagged::Text(s) => RawValue::Text(s),
            })
        } else {
            Ok(match RawValueTagged::deserialize(deserializer)? {
                RawValueTagged::Number(n) => RawValue::Number(n),
                RawValueTagged::Text(s) => RawValue::Text(s),
            })
        }
    }
}

impl RawValue {
    /// Parses the value, treating blank or non-numeric text as absent.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            RawValue::Number(n) if n.is_finite() => Some(*n),
            RawValue::Number(_) => None,
            RawValue::Text(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
        }
    }
}

/// The `user_interface` field: either a bare type string or `{ "type": ... }`.
#[derive(Clone, Debug, PartialEq)]
pub enum UserInterface {
    Plain(String),
    Detailed { kind: Option<String>, is_advanced: bool },
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum UserInterfaceUntagged {
    Plain(String),
    Detailed {
        #[serde(rename = "type", default)]
        kind: Option<String>,
        #[serde(default)]
        is_advanced: bool,
    },
}

#[derive(Serialize, Deserialize)]
enum UserInterfaceTagged {
    Plain(String),
    Detailed { kind: Option<String>, is_advanced: bool },
}

impl Serialize for UserInterface {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let (kind, is_advanced) = match self {
            UserInterface::Plain(kind) => {
                return if serializer.is_human_readable() {
                    UserInterfaceUntagged::Plain(kind.clone()).serialize(serializer)
                } else {
                    UserInterfaceTagged::Plain(kind.clone()).serialize(serializer)
                };
            }
            UserInterface::Detailed { kind, is_advanced } => (kind.clone(), *is_advanced),
        };
        if serializer.is_human_readable() {
            UserInterfaceUntagged::Detailed { kind, is_advanced }.serialize(serializer)
        } else {
            UserInterfaceTagged::Detailed { kind, is_advanced }.serialize(serializer)
        }
    }
}

impl<'de> Deserialize<'de> for UserInterface {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            Ok(match UserInterfaceUntagged::deserialize(deserializer)? {
                UserInterfaceUntagged::Plain(kind) => UserInterface::Plain(kind),
                UserInterfaceUntagged::Detailed { kind, is_advanced } => {
                    UserInterface::Detailed { kind, is_advanced }
                }
            })
        } else {
            Ok(match UserInterfaceTagged::deserialize(deserializer)? {
                UserInterfaceTagged::Plain(kind) => UserInterface::Plain(kind),
                UserInterfaceTagged::Detailed { kind, is_advanced } => {
                    UserInterface::Detailed { kind, is_advanced }
                }
            })
        }
    }
}

impl UserInterface {
    pub fn kind(&self) -> &str {
        match self {
            UserInterface::Plain(kind) => kind,
            UserInterface::Detailed { kind, .. } => kind.as_deref().unwrap_or("input"),
        }
    }

    /// `static` and `not_viewable` parameters are provided by the company.
    pub fn is_company_provided(&self) -> bool {
        matches!(self.kind(), "static" | "not_viewable")
    }
}

/// A parameter row as stored for a solution, before classification.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct SourceItem {
    pub name: String,
    #[serde(default)]
    pub user_interface: Option<UserInterface>,
    #[serde(default)]
    pub display_type: Option<String>,
    #[serde(default)]
    pub formula: Option<String>,
    #[serde(default)]
    pub value: Option<RawValue>,
    #[serde(default)]
    pub test_value: Option<RawValue>,
    #[serde(default, alias = "unit")]
    pub units: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl SourceItem {
    /// `value` when it parses, otherwise `test_value`.
    pub fn resolved_value(&self) -> Option<f64> {
        self.value
            .as_ref()
            .and_then(RawValue::as_f64)
            .or_else(|| self.test_value.as_ref().and_then(RawValue::as_f64))
    }

    pub fn is_filter(&self) -> bool {
        self.display_type.as_deref() == Some("filter")
    }

    fn ui_kind(&self) -> UserInterface {
        self.user_interface
            .clone()
            .unwrap_or_else(|| UserInterface::Plain("input".to_string()))
    }
}

/// An explicit calculation attached to a solution.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct CalculationItem {
    pub name: String,
    pub formula: String,
    #[serde(default, alias = "unit")]
    pub units: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// Decides the kind of a parameter from the category it is listed under.
pub fn classify(category: &str, item: &SourceItem) -> ParameterKind {
    match category.to_lowercase().as_str() {
        "calculations" => ParameterKind::Formula,
        "global" | "general" => {
            if item.ui_kind().is_company_provided() {
                ParameterKind::Company
            } else {
                ParameterKind::Input
            }
        }
        _ => ParameterKind::Company,
    }
}

impl SourceItem {
    pub fn to_parameter(&self, category: &str) -> Parameter {
        let kind = classify(category, self);
        let formula = match kind {
            ParameterKind::Formula => self.formula.clone().filter(|f| !f.trim().is_empty()),
            _ => None,
        };
        Parameter {
            name: self.name.clone(),
            kind,
            level: kind.initial_level(),
            category: category.to_lowercase(),
            formula,
            unit: self.units.clone().filter(|u| !u.is_empty()),
            value: match kind {
                ParameterKind::Formula => None,
                _ => self.resolved_value(),
            },
        }
    }
}

impl CalculationItem {
    pub fn is_complete(&self) -> bool {
        !self.name.trim().is_empty() && !self.formula.trim().is_empty()
    }

    pub fn to_parameter(&self) -> Parameter {
        Parameter {
            unit: self.units.clone().filter(|u| !u.is_empty()),
            ..Parameter::formula(&self.name, &self.formula)
        }
    }
}

/// Parameter rows grouped by category, in the order the categories were listed.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct GroupedParameters {
    groups: Vec<(String, Vec<SourceItem>)>,
}

impl GroupedParameters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends items to a category, creating it at the end if it is new.
    pub fn insert(&mut self, category: &str, items: Vec<SourceItem>) {
        match self.groups.iter_mut().find(|(name, _)| name == category) {
            Some((_, existing)) => existing.extend(items),
            None => self.groups.push((category.to_string(), items)),
        }
    }

    pub fn push(&mut self, category: &str, item: SourceItem) {
        self.insert(category, vec![item]);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[SourceItem])> {
        self.groups
            .iter()
            .map(|(name, items)| (name.as_str(), items.as_slice()))
    }

    pub fn items_mut(&mut self) -> impl Iterator<Item = &mut SourceItem> {
        self.groups.iter_mut().flat_map(|(_, items)| items.iter_mut())
    }

    pub fn len(&self) -> usize {
        self.groups.iter().map(|(_, items)| items.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Serialize for GroupedParameters {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap;
        let mut map = serializer.serialize_map(Some(self.groups.len()))?;
        for (name, items) in &self.groups {
            map.serialize_entry(name, items)?;
        }
        map.end()
    }
}

struct GroupedVisitor;

impl<'de> Visitor<'de> for GroupedVisitor {
    type Value = GroupedParameters;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a map of category names to parameter lists")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
        let mut grouped = GroupedParameters::new();
        while let Some((name, items)) = access.next_entry::<String, Vec<SourceItem>>()? {
            if name.is_empty() {
                return Err(de::Error::custom("category name cannot be empty"));
            }
            grouped.insert(&name, items);
        }
        Ok(grouped)
    }
}

impl<'de> Deserialize<'de> for GroupedParameters {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(GroupedVisitor)
    }
}
