use crate::formula::FunctionName;
use crate::parameter::Parameter;
use std::ops::Range;

/// Characters that may not touch a name whose edge is itself a word character.
pub fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

// One char in, one char out, so char indices stay aligned with the source text.
fn fold(c: char) -> char {
    c.to_lowercase().next().unwrap_or(c)
}

/// A match of a known parameter name inside a formula.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Reference<'a> {
    pub name: &'a str,
    /// Byte range of the occurrence in the scanned formula.
    pub span: Range<usize>,
}

impl Reference<'_> {
    /// True when the occurrence spells a built-in function applied to an
    /// argument list, as `Max` does in `MAX(Max, 3)`.
    pub fn is_call(&self, formula: &str) -> bool {
        FunctionName::from_name(self.name).is_some()
            && formula[self.span.end..].trim_start().starts_with('(')
    }
}

/// Finds occurrences of a fixed set of parameter names inside formula text.
///
/// Names are matched case-insensitively and tried longest first. Once a longer
/// name has claimed a stretch of the formula, shorter names can no longer match
/// inside it, so `Power` is not reported from inside `Power Cost`.
#[derive(Clone, Debug)]
pub struct ReferenceScanner<'a> {
    names: Vec<(&'a str, Vec<char>)>,
}

impl<'a> ReferenceScanner<'a> {
    pub fn new<I>(names: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut seen: Vec<Vec<char>> = Vec::new();
        let mut entries = Vec::new();
        for name in names {
            if name.trim().is_empty() {
                continue;
            }
            let folded: Vec<char> = name.chars().map(fold).collect();
            if seen.contains(&folded) {
                continue;
            }
            seen.push(folded.clone());
            entries.push((name, folded));
        }
        // Stable, so equal-length names keep their listing order.
        entries.sort_by(|a, b| b.1.len().cmp(&a.1.len()));
        ReferenceScanner { names: entries }
    }

    pub fn for_parameters(params: &'a [Parameter]) -> Self {
        Self::new(params.iter().map(|p| p.name.as_str()))
    }

    /// Every occurrence of every known name, in the order names were tried.
    pub fn occurrences(&self, formula: &str) -> Vec<Reference<'a>> {
        let chars: Vec<(usize, char)> = formula.char_indices().collect();
        let folded: Vec<char> = chars.iter().map(|&(_, c)| fold(c)).collect();
        let mut claimed = vec![false; chars.len()];
        let mut found = Vec::new();

        for (name, pattern) in &self.names {
            for range in find_matches(&folded, pattern, &claimed) {
                claimed[range.clone()].iter_mut().for_each(|c| *c = true);
                let start = chars[range.start].0;
                let end = chars
                    .get(range.end)
                    .map(|&(offset, _)| offset)
                    .unwrap_or(formula.len());
                found.push(Reference {
                    name: *name,
                    span: start..end,
                });
            }
        }
        found
    }

    /// The distinct names referenced by a formula, longest names first.
    pub fn scan(&self, formula: &str) -> Vec<&'a str> {
        let mut names: Vec<&'a str> = Vec::new();
        for reference in self.occurrences(formula) {
            if !names.contains(&reference.name) {
                names.push(reference.name);
            }
        }
        names
    }
}

// Non-overlapping matches of `pattern` in `text`, as char index ranges.
fn find_matches(text: &[char], pattern: &[char], claimed: &[bool]) -> Vec<Range<usize>> {
    let mut matches = Vec::new();
    let (n, m) = (text.len(), pattern.len());
    if m == 0 || m > n {
        return matches;
    }
    let needs_left = is_word_char(pattern[0]);
    let needs_right = is_word_char(pattern[m - 1]);

    let mut i = 0;
    while i + m <= n {
        let window = i..i + m;
        let hit = text[window.clone()] == *pattern
            && !claimed[window.clone()].iter().any(|&c| c)
            && !(needs_left && i > 0 && is_word_char(text[i - 1]))
            && !(needs_right && i + m < n && is_word_char(text[i + m]));
        if hit {
            matches.push(window);
            i += m;
        } else {
            i += 1;
        }
    }
    matches
}

/// Names from `names` that occur in `formula`
///
/// # Examples
/// ```
/// use valuecalc::references::extract_references;
///
/// let names = ["Power", "Power Cost", "Hours"];
/// let found = extract_references("power cost * HOURS", &names);
/// assert_eq!(found, vec!["Power Cost".to_string(), "Hours".to_string()]);
/// ```
pub fn extract_references(formula: &str, names: &[&str]) -> Vec<String> {
    ReferenceScanner::new(names.iter().copied())
        .scan(formula)
        .into_iter()
        .map(str::to_string)
        .collect()
}

/// Byte spans of each whole-word occurrence of `name` in `formula`.
pub fn reference_spans(formula: &str, name: &str) -> Vec<Range<usize>> {
    ReferenceScanner::new([name])
        .occurrences(formula)
        .into_iter()
        .map(|r| r.span)
        .collect()
}

/// Exact lookup, falling back to a case-insensitive match.
pub fn find_parameter<'p>(name: &str, params: &'p [Parameter]) -> Option<&'p Parameter> {
    find_parameter_index(name, params).map(|i| &params[i])
}

pub fn find_parameter_index(name: &str, params: &[Parameter]) -> Option<usize> {
    params.iter().position(|p| p.name == name).or_else(|| {
        let lowered = name.to_lowercase();
        params.iter().position(|p| p.name.to_lowercase() == lowered)
    })
}
