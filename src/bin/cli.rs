#![cfg(not(tarpaulin_include))]

use clap::{Parser, Subcommand, ValueEnum};
use log::info;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Instant;
use valuecalc::cooling::{self, CapexInput, CoolingType, OpexInput};
use valuecalc::leveling::{DEFAULT_MAX_PASSES, LevelManager};
use valuecalc::parameter::CalculationItem;
use valuecalc::{downloader, loader, saving, validator};

#[derive(Parser, Debug)]
#[command(name = "valuecalc", about = "Level and evaluate value calculator solutions")]
struct Cli {
    /// Upper bound on leveling passes before giving up
    #[arg(long, global = true, env = "VALUECALC_MAX_PASSES", default_value_t = DEFAULT_MAX_PASSES)]
    max_passes: usize,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print every parameter with its level
    Levels {
        solution: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// Evaluate formula parameters
    Calculate {
        solution: PathBuf,
        /// Parameters to report; all formulas when omitted
        #[arg(long = "target")]
        targets: Vec<String>,
        /// CSV sheet of name,value rows
        #[arg(long)]
        inputs: Option<PathBuf>,
        /// Single input override, NAME=VALUE
        #[arg(long = "set", value_parser = parse_assignment)]
        assignments: Vec<(String, f64)>,
    },
    /// Compute a candidate calculation against the solution's parameters
    Validate {
        solution: PathBuf,
        #[arg(long)]
        name: String,
        #[arg(long)]
        formula: String,
        #[arg(long)]
        units: Option<String>,
    },
    /// Rename a parameter and rewrite the formulas that mention it
    Rename {
        solution: PathBuf,
        old_name: String,
        new_name: String,
        /// Snapshot to write; defaults to the input path with a .gz extension
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Export the leveled parameter table
    Export {
        solution: PathBuf,
        #[arg(long, value_enum, default_value_t = ExportFormat::Csv)]
        format: ExportFormat,
        #[arg(long)]
        output: PathBuf,
    },
    /// Write a compressed snapshot of a solution
    Snapshot { solution: PathBuf, output: PathBuf },
    /// Built-in cooling cost estimates
    Cooling {
        #[command(subcommand)]
        command: CoolingCommand,
    },
}

#[derive(Subcommand, Debug)]
enum CoolingCommand {
    Capex {
        #[arg(long = "type")]
        cooling_type: String,
        #[command(flatten)]
        input: CoolingArgs,
    },
    Compare {
        #[command(flatten)]
        input: CoolingArgs,
    },
    /// Operating cost over the planned years
    Opex {
        #[arg(long = "type")]
        cooling_type: String,
        #[command(flatten)]
        input: CoolingArgs,
        #[arg(long)]
        first_year: i32,
        #[arg(long, default_value_t = 10)]
        years: u32,
        /// Annualised partial PUE
        #[arg(long)]
        ppue: f64,
        /// Share of capacity in use, 0 to 1
        #[arg(long, default_value_t = 1.0)]
        utilisation: f64,
        /// Flat USD/kWh instead of the country forecast
        #[arg(long)]
        electricity_price: Option<f64>,
        /// USD per litre
        #[arg(long)]
        water_price: Option<f64>,
    },
}

#[derive(clap::Args, Debug)]
struct CoolingArgs {
    /// Data hall design capacity in MW
    #[arg(long)]
    capacity: f64,
    #[arg(long)]
    base_year: i32,
    #[arg(long)]
    country: String,
    #[arg(long)]
    reference_year: Option<i32>,
}

impl From<CoolingArgs> for CapexInput {
    fn from(args: CoolingArgs) -> Self {
        CapexInput {
            data_hall_design_capacity_mw: args.capacity,
            base_year: args.base_year,
            country: args.country,
            reference_year: args.reference_year,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum ExportFormat {
    Csv,
    Xlsx,
}

fn parse_assignment(s: &str) -> Result<(String, f64), String> {
    let (name, value) = s
        .rsplit_once('=')
        .ok_or_else(|| format!("expected NAME=VALUE, got {}", s))?;
    let value = value
        .trim()
        .parse::<f64>()
        .map_err(|e| format!("{}: {}", value, e))?;
    Ok((name.trim().to_string(), value))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let start_time = Instant::now();
    let cli = Cli::parse();
    let levels = LevelManager::with_max_passes(cli.max_passes);

    match cli.command {
        Command::Levels { solution, json } => {
            let solution = loader::load_solution(&solution)?;
            let report = solution.levels(&levels)?;
            if json {
                print_json(&report)?;
            } else {
                for (level, params) in report.by_level() {
                    println!("Level {}", level);
                    for param in params {
                        match &param.formula {
                            Some(formula) => println!("  {} = {}", param.name, formula),
                            None => println!("  {} ({})", param.name, param.kind),
                        }
                    }
                }
            }
        }
        Command::Calculate {
            solution,
            targets,
            inputs,
            assignments,
        } => {
            let solution = loader::load_solution(&solution)?;
            let mut values: BTreeMap<String, f64> = match inputs {
                Some(path) => loader::inputs_from_csv(path)?,
                None => BTreeMap::new(),
            };
            values.extend(assignments);

            let evaluation = solution.evaluate(values, &targets, &levels)?;
            let names = if targets.is_empty() {
                evaluation.order.clone()
            } else {
                targets
            };
            for (name, value) in names.iter().zip(evaluation.targets(&names)?) {
                match evaluation.units.get(name) {
                    Some(unit) => println!("{} = {} {}", name, value, unit),
                    None => println!("{} = {}", name, value),
                }
            }
        }
        Command::Validate {
            solution,
            name,
            formula,
            units,
        } => {
            let solution = loader::load_solution(&solution)?;
            let candidate = CalculationItem {
                name,
                formula,
                units,
                description: None,
            };
            let value = validator::validate(&solution.groups, &candidate, &levels)?;
            println!("{} = {}", candidate.name, value);
        }
        Command::Rename {
            solution: path,
            old_name,
            new_name,
            output,
        } => {
            let mut solution = loader::load_solution(&path)?;
            solution.rename_parameter(&old_name, &new_name)?;
            let output = output.unwrap_or_else(|| path.with_extension("gz"));
            saving::save_solution(&mut solution, &output)?;
            println!("Renamed {} to {}, saved {}", old_name, new_name, output.display());
        }
        Command::Export {
            solution,
            format,
            output,
        } => {
            let solution = loader::load_solution(&solution)?;
            let report = solution.levels(&levels)?;
            match format {
                ExportFormat::Csv => std::fs::write(&output, downloader::to_csv(&report)?)?,
                ExportFormat::Xlsx => std::fs::write(&output, downloader::to_xlsx(&report)?)?,
            }
            info!("exported {} parameters", report.parameters.len());
        }
        Command::Snapshot { solution, output } => {
            let mut solution = loader::load_solution(&solution)?;
            saving::save_solution(&mut solution, &output)?;
        }
        Command::Cooling { command } => match command {
            CoolingCommand::Capex {
                cooling_type,
                input,
            } => {
                let cooling_type = CoolingType::from_name(&cooling_type)?;
                print_json(&cooling::estimate_capex(cooling_type, &input.into())?)?;
            }
            CoolingCommand::Compare { input } => {
                print_json(&cooling::compare(&input.into())?)?;
            }
            CoolingCommand::Opex {
                cooling_type,
                input,
                first_year,
                years,
                ppue,
                utilisation,
                electricity_price,
                water_price,
            } => {
                let cooling_type = CoolingType::from_name(&cooling_type)?;
                let input = OpexInput {
                    capex: input.into(),
                    first_year_of_operation: first_year,
                    planned_years_of_operation: years,
                    annualised_ppue: ppue,
                    percentage_of_utilisation: utilisation,
                    electricity_price_per_kwh: electricity_price,
                    water_price_per_litre: water_price,
                };
                print_json(&cooling::estimate_opex(cooling_type, &input)?)?;
            }
        },
    }

    info!("done in {:.1}s", start_time.elapsed().as_secs_f64());
    Ok(())
}
