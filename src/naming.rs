use crate::parameter::Parameter;
use crate::references::ReferenceScanner;
use lazy_static::lazy_static;
use log::debug;
use regex::Regex;
use std::collections::BTreeMap;
use thiserror::Error;

lazy_static! {
    static ref SEPARATOR_REGEX: Regex = Regex::new(r"[\s,]+").unwrap();
    static ref UNDERSCORE_RUN_REGEX: Regex = Regex::new(r"_+").unwrap();
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NamingError {
    #[error("parameter name cannot be empty")]
    EmptyName,

    #[error("unknown parameter: {0}")]
    UnknownParameter(String),

    #[error("a parameter named {0} already exists")]
    NameTaken(String),
}

/// Turns a display name into an identifier the formula parser accepts:
/// `" Total  Cost, USD "` becomes `"Total_Cost_USD"`.
pub fn clean_parameter_name(name: &str) -> String {
    let name = SEPARATOR_REGEX.replace_all(name.trim(), "_");
    let name = UNDERSCORE_RUN_REGEX.replace_all(&name, "_");
    name.trim_matches('_').to_string()
}

/// Original name to cleaned name for every parameter.
pub fn name_mapping<'a, I>(names: I) -> BTreeMap<String, String>
where
    I: IntoIterator<Item = &'a str>,
{
    names
        .into_iter()
        .map(|name| (name.to_string(), clean_parameter_name(name)))
        .collect()
}

/// Rewrites every known name in `formula` to its cleaned form.
pub fn clean_formula(formula: &str, mapping: &BTreeMap<String, String>) -> String {
    let scanner = ReferenceScanner::new(mapping.keys().map(String::as_str));
    rewrite_references(formula, &scanner, |name| mapping.get(name).cloned())
}

/// Replaces occurrences found by `scanner` with whatever `replacement` returns
/// for their name; names mapped to `None` are left untouched.
pub fn rewrite_references<F>(formula: &str, scanner: &ReferenceScanner<'_>, replacement: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    let mut occurrences = scanner.occurrences(formula);
    occurrences.sort_by_key(|r| r.span.start);

    let mut out = String::with_capacity(formula.len());
    let mut cursor = 0;
    for reference in occurrences {
        if let Some(new_text) = replacement(reference.name) {
            out.push_str(&formula[cursor..reference.span.start]);
            out.push_str(&new_text);
            cursor = reference.span.end;
        }
    }
    out.push_str(&formula[cursor..]);
    out
}

/// Renames `old` to `new` in a formula, leaving longer names that merely
/// contain `old` alone. `names` must list every name the formula may mention.
pub fn rename_in_formula(formula: &str, names: &[&str], old: &str, new: &str) -> String {
    let scanner = ReferenceScanner::new(names.iter().copied());
    let old_lower = old.to_lowercase();
    rewrite_references(formula, &scanner, |name| {
        (name.to_lowercase() == old_lower).then(|| new.to_string())
    })
}

/// Checks that `new` can replace `old` among `names`, returning the exact
/// spelling of `old` as stored.
pub fn check_rename<'a>(names: &[&'a str], old: &str, new: &str) -> Result<&'a str, NamingError> {
    let new = new.trim();
    if new.is_empty() {
        return Err(NamingError::EmptyName);
    }
    let existing = names
        .iter()
        .find(|n| **n == old)
        .or_else(|| names.iter().find(|n| n.to_lowercase() == old.to_lowercase()))
        .copied()
        .ok_or_else(|| NamingError::UnknownParameter(old.to_string()))?;

    let collides = names
        .iter()
        .any(|n| *n != existing && n.to_lowercase() == new.to_lowercase());
    if collides {
        return Err(NamingError::NameTaken(new.to_string()));
    }
    Ok(existing)
}

/// Renames a parameter and every mention of it in the other formulas.
///
/// # Arguments
/// * `params` - Every parameter of the solution
/// * `old` - Current name, matched exactly first and then ignoring case
/// * `new` - Replacement name, trimmed
///
/// # Returns
/// * `Err(NamingError)` - `new` is blank, `old` is unknown, or `new` is taken
pub fn rename_parameter(params: &mut [Parameter], old: &str, new: &str) -> Result<(), NamingError> {
    let names: Vec<String> = params.iter().map(|p| p.name.clone()).collect();
    let name_refs: Vec<&str> = names.iter().map(String::as_str).collect();
    let existing = check_rename(&name_refs, old, new)?.to_string();
    let new = new.trim();

    let mut rewritten = 0;
    for param in params.iter_mut() {
        if param.name == existing {
            param.name = new.to_string();
        }
        if let Some(formula) = param.formula.as_mut() {
            let updated = rename_in_formula(formula, &name_refs, &existing, new);
            if updated != *formula {
                *formula = updated;
                rewritten += 1;
            }
        }
    }
    debug!("renamed {} to {}, {} formulas rewritten", existing, new, rewritten);
    Ok(())
}
