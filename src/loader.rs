use crate::saving;
use crate::solution::Solution;
use log::{info, warn};
use std::collections::BTreeMap;
use std::error::Error;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Load a solution definition from a JSON file
///
/// The file holds `{ "name": ..., "groups": { category: [rows] }, "calculations": [...] }`.
/// Category order in the file is kept.
///
/// # Examples
/// ```no_run
/// use valuecalc::loader::from_json;
///
/// match from_json("solution.json") {
///     Ok(solution) => println!("Loaded {} calculations", solution.calculations.len()),
///     Err(e) => eprintln!("Error loading solution: {}", e),
/// }
/// ```
pub fn from_json(filepath: impl AsRef<Path>) -> Result<Solution, Box<dyn Error>> {
    let file = File::open(filepath.as_ref())?;
    let solution: Solution = serde_json::from_reader(BufReader::new(file))?;
    info!(
        "loaded solution '{}' with {} parameters from {}",
        solution.name,
        solution.groups.len() + solution.calculations.len(),
        filepath.as_ref().display()
    );
    Ok(solution)
}

/// Load calculator inputs from a CSV file of `name,value` rows
///
/// A first row whose value column is not numeric is taken as a header.
/// Rows with a blank name are skipped; any other non-numeric value is an error.
///
/// # Arguments
/// * `filepath` - Path to the CSV sheet
///
/// # Returns
/// * `Result<BTreeMap<String, f64>, Box<dyn Error>>` - Input values by parameter name
pub fn inputs_from_csv(filepath: impl AsRef<Path>) -> Result<BTreeMap<String, f64>, Box<dyn Error>> {
    let file = File::open(filepath)?;
    let reader = BufReader::new(file);
    let lines: Vec<String> = reader.lines().collect::<Result<_, _>>()?;
    inputs_from_lines(&lines)
}

pub fn inputs_from_csv_str(content: &str) -> Result<BTreeMap<String, f64>, Box<dyn Error>> {
    let lines: Vec<String> = content.lines().map(str::to_string).collect();
    inputs_from_lines(&lines)
}

fn inputs_from_lines(lines: &[String]) -> Result<BTreeMap<String, f64>, Box<dyn Error>> {
    let mut inputs = BTreeMap::new();

    for (r, line) in lines.iter().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let fields = parse_csv_row(line)?;
        if fields.len() < 2 {
            return Err(format!("line {}: expected name,value", r + 1).into());
        }
        let name = fields[0].trim();
        let value_str = fields[1].trim();
        if name.is_empty() {
            warn!("line {}: blank parameter name skipped", r + 1);
            continue;
        }

        match value_str.parse::<f64>() {
            Ok(value) => {
                inputs.insert(name.to_string(), value);
            }
            Err(_) if r == 0 => continue, // header row
            Err(_) => {
                return Err(format!("line {}: '{}' is not a number", r + 1, value_str).into());
            }
        }
    }

    Ok(inputs)
}

// Parse a CSV row into a vector of strings
fn parse_csv_row(line: &str) -> Result<Vec<String>, Box<dyn Error>> {
    let mut result = Vec::new();
    let mut current_field = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' => {
                if in_quotes && chars.peek() == Some(&'"') {
                    // Doubled quote inside a quoted field
                    current_field.push('"');
                    chars.next();
                } else {
                    in_quotes = !in_quotes;
                }
            }
            ',' if !in_quotes => {
                result.push(std::mem::take(&mut current_field));
            }
            _ => current_field.push(c),
        }
    }

    if in_quotes {
        return Err("unterminated quoted field".into());
    }
    result.push(current_field);

    Ok(result)
}

/// Detect file type and load the solution in the matching format
///
/// `.json` files are solution definitions, `.gz` files are snapshots written by
/// [`saving::save_solution`].
pub fn load_solution(filepath: impl AsRef<Path>) -> Result<Solution, Box<dyn Error>> {
    let path = filepath.as_ref();
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_lowercase());

    match extension.as_deref() {
        Some("json") => from_json(path),
        Some("gz") | Some("bin") => Ok(saving::load_solution(path)?),
        Some(ext) => Err(format!("Unsupported file extension: {}", ext).into()),
        None => Err("File has no extension".into()),
    }
}
