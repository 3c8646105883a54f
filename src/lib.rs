/*!
# Value Calculator Engine

Parameter dependency leveling and formula evaluation for configurable value
calculators, such as the data-center cooling cost calculators this crate was
written for.

## Overview

A solution is a set of named parameters grouped by category. Inputs are
supplied by the user, company parameters are fixed by the vendor, and formula
parameters are arithmetic expressions over other parameters by name. Names are
free text ("Total Cost ($/kWh)"), so references are found by case-insensitive
whole-word matching, longest name first.

Before anything is computed every parameter gets a level: inputs and company
parameters sit at level 1, and a formula sits one above the highest level it
references (2 when it references nothing). Evaluating in ascending level order
guarantees every reference already has a value.

## Modules

- **parameter**: parameter kinds, admin rows and category grouping
- **references**: name matching inside formula text
- **leveling**: level assignment, cycle detection and ordering
- **naming**: identifier cleaning and rename propagation
- **formula**: formula parser and evaluator
- **calculator**: level-ordered evaluation with unit inference
- **validator**: checks a candidate calculation against a solution
- **units**: unit composition for inferred formula units
- **cooling**: built-in cooling CAPEX, OPEX and TCO estimates
- **solution**: the persisted calculator definition
- **saving**: gzip-compressed bincode snapshots
- **loader**: JSON solutions and CSV input sheets
- **downloader**: CSV and XLSX export of leveled parameters
- **config**: server and CLI options
- **app**: HTTP API (`web` feature)

## REST API Endpoints

- `GET/PUT /api/solution` - Read or replace the solution
- `POST /api/levels` - Level the solution or a posted parameter list
- `POST /api/calculate` - Evaluate targets with user inputs
- `POST /api/validate` - Compute a candidate calculation
- `POST /api/rename` - Rename a parameter everywhere
- `POST /api/cooling/capex`, `/api/cooling/compare`, `/api/cooling/opex` - Cooling estimates
- `POST /api/save`, `/api/export`, `/api/load` - Snapshots
- `GET /api/export/csv`, `/api/export/xlsx` - Parameter table export
*/

pub mod calculator;
pub mod config;
pub mod cooling;
pub mod downloader;
pub mod formula;
pub mod leveling;
pub mod loader;
pub mod naming;
pub mod parameter;
pub mod references;
pub mod saving;
pub mod solution;
pub mod units;
pub mod validator;

#[cfg(feature = "web")]
pub mod app;

pub use calculator::{CalcError, Calculator, Evaluation};
pub use config::Config;
pub use leveling::{LevelError, LevelManager, LevelReport, assign_levels};
pub use parameter::{CalculationItem, GroupedParameters, Parameter, ParameterKind, SourceItem};
pub use solution::Solution;
