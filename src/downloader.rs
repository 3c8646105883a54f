use crate::leveling::LevelReport;
use crate::parameter::Parameter;
use std::error::Error;

const HEADERS: [&str; 7] = ["name", "kind", "level", "category", "unit", "formula", "value"];

fn row(param: &Parameter) -> [String; 7] {
    [
        param.name.clone(),
        param.kind.to_string(),
        param.level.to_string(),
        param.category.clone(),
        param.unit.clone().unwrap_or_default(),
        param.formula.clone().unwrap_or_default(),
        param.value.map(|v| v.to_string()).unwrap_or_default(),
    ]
}

fn escape_csv(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// Convert a leveled parameter table to CSV
///
/// One row per parameter, in level order, under a
/// `name,kind,level,category,unit,formula,value` header. Fields containing
/// commas, quotes or newlines are quoted.
///
/// # Examples
/// ```
/// use valuecalc::downloader::to_csv;
/// use valuecalc::leveling::LevelManager;
/// use valuecalc::parameter::Parameter;
///
/// let report = LevelManager::new()
///     .level(vec![Parameter::input("Load", 2.0), Parameter::formula("Double", "Load * 2")])
///     .unwrap();
/// let csv = to_csv(&report).unwrap();
/// assert!(csv.starts_with("name,kind,level"));
/// ```
pub fn to_csv(report: &LevelReport) -> Result<String, Box<dyn Error>> {
    let mut csv_content = HEADERS.join(",");
    csv_content.push('\n');

    for param in &report.parameters {
        let fields: Vec<String> = row(param).iter().map(|f| escape_csv(f)).collect();
        csv_content.push_str(&fields.join(","));
        csv_content.push('\n');
    }

    Ok(csv_content)
}

/// Convert a leveled parameter table to XLSX
///
/// Same columns as [`to_csv`]; levels and values are written as numbers.
pub fn to_xlsx(report: &LevelReport) -> Result<Vec<u8>, Box<dyn Error>> {
    use rust_xlsxwriter::{Format, Workbook};

    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    worksheet.set_name("Parameters")?;

    let bold = Format::new().set_bold();
    for (c, header) in HEADERS.iter().enumerate() {
        worksheet.write_string_with_format(0, c as u16, *header, &bold)?;
    }

    for (r, param) in report.parameters.iter().enumerate() {
        let r = (r + 1) as u32;
        worksheet.write_string(r, 0, &param.name)?;
        worksheet.write_string(r, 1, param.kind.as_str())?;
        worksheet.write_number(r, 2, param.level as f64)?;
        worksheet.write_string(r, 3, &param.category)?;
        if let Some(unit) = &param.unit {
            worksheet.write_string(r, 4, unit)?;
        }
        if let Some(formula) = &param.formula {
            worksheet.write_string(r, 5, formula)?;
        }
        if let Some(value) = param.value {
            worksheet.write_number(r, 6, value)?;
        }
    }

    let buffer = workbook.save_to_buffer()?;

    Ok(buffer)
}
