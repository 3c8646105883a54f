//! Fixed CAPEX and total-cost-of-ownership estimates for the two built-in
//! cooling solutions, their comparison, and an operating cost (OPEX) model
//! driven by forecast electricity rates.

use chrono::Datelike;
use log::debug;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Straight-line depreciation period for cooling equipment.
pub const ASSET_LIFE_YEARS: f64 = 25.0;

/// Years of operation covered by the lifetime OPEX estimate.
pub const OPEX_YEARS: f64 = 10.0;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoolingError {
    #[error("unsupported country: {0} (supported: USA, Singapore, UK, UAE)")]
    UnsupportedCountry(String),

    #[error("unsupported cooling type: {0}")]
    UnsupportedCoolingType(String),

    #[error("data hall capacity must be a non-negative number of MW")]
    InvalidCapacity,

    #[error("utilisation must be between 0 and 1, got {0}")]
    InvalidUtilisation(f64),

    #[error("annualised pPUE must be a positive number, got {0}")]
    InvalidPpue(f64),
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CoolingType {
    AirCooling,
    ChassisImmersion,
}

impl CoolingType {
    pub fn from_name(name: &str) -> Result<Self, CoolingError> {
        match name.trim().to_lowercase().as_str() {
            "air_cooling" | "air" => Ok(CoolingType::AirCooling),
            "chassis_immersion" | "immersion" => Ok(CoolingType::ChassisImmersion),
            _ => Err(CoolingError::UnsupportedCoolingType(name.to_string())),
        }
    }

    /// USD per kW of nameplate power.
    fn country_multiplier(self, country: &str) -> Result<f64, CoolingError> {
        let multiplier = match (self, country) {
            (CoolingType::AirCooling, "USA") => 3849.0,
            (CoolingType::AirCooling, "Singapore") => 3527.0,
            (CoolingType::AirCooling, "UK") => 4952.0,
            (CoolingType::AirCooling, "UAE") => 3433.0,
            (CoolingType::ChassisImmersion, "USA") => 4620.0,
            (CoolingType::ChassisImmersion, "Singapore") => 4232.0,
            (CoolingType::ChassisImmersion, "UK") => 5942.0,
            (CoolingType::ChassisImmersion, "UAE") => 4120.0,
            _ => return Err(CoolingError::UnsupportedCountry(country.to_string())),
        };
        Ok(multiplier)
    }

    /// Share of CAPEX spent on operation each year.
    fn annual_opex_rate(self) -> f64 {
        match self {
            CoolingType::AirCooling => 0.10,
            CoolingType::ChassisImmersion => 0.08,
        }
    }

    fn inflation_factor(self, base_year: i32, reference_year: i32) -> f64 {
        match self {
            CoolingType::AirCooling => air_cooling_inflation(base_year, reference_year),
            CoolingType::ChassisImmersion => uk_capex_inflation(base_year),
        }
    }
}

impl fmt::Display for CoolingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoolingType::AirCooling => f.write_str("air_cooling"),
            CoolingType::ChassisImmersion => f.write_str("chassis_immersion"),
        }
    }
}

const AIR_COOLING_INFLATION: [(i32, f64); 6] = [
    (2020, 1.0),
    (2021, 1.045),
    (2022, 1.092),
    (2023, 1.125),
    (2024, 1.158),
    (2025, 1.190),
];

const UK_CAPEX_INFLATION: [f64; 28] = [
    1.0, 1.02, 1.04, 1.06, 1.08, 1.10, 1.13, 1.15, 1.17, 1.20, 1.22, 1.24, 1.27, 1.29, 1.32,
    1.35, 1.37, 1.40, 1.43, 1.46, 1.49, 1.52, 1.55, 1.58, 1.61, 1.64, 1.67, 1.70,
];
const UK_CAPEX_FIRST_YEAR: i32 = 2023;

// No adjustment for current or future base years, or years outside the table.
fn air_cooling_inflation(base_year: i32, reference_year: i32) -> f64 {
    if base_year >= reference_year {
        return 1.0;
    }
    AIR_COOLING_INFLATION
        .iter()
        .find(|(year, _)| *year == base_year)
        .map(|(_, factor)| *factor)
        .unwrap_or(1.0)
}

// Clamped to the first and last year of the table.
fn uk_capex_inflation(base_year: i32) -> f64 {
    let last = UK_CAPEX_INFLATION.len() as i32 - 1;
    let index = (base_year - UK_CAPEX_FIRST_YEAR).clamp(0, last) as usize;
    UK_CAPEX_INFLATION[index]
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct CapexInput {
    pub data_hall_design_capacity_mw: f64,
    pub base_year: i32,
    pub country: String,
    /// Year costs are brought forward to; defaults to the current year.
    #[serde(default)]
    pub reference_year: Option<i32>,
}

impl CapexInput {
    fn reference_year(&self) -> i32 {
        self.reference_year
            .unwrap_or_else(|| chrono::Utc::now().year())
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct CapexEstimate {
    pub cooling_type: CoolingType,
    pub cooling_equipment_capex: f64,
    pub total_capex_excl_it: f64,
    pub annual_cooling_capex: f64,
    pub opex_lifetime: f64,
    pub total_cost_ownership_excl_it: f64,
    pub nameplate_power_kw: f64,
    pub country_multiplier: f64,
    pub inflation_factor: f64,
    pub base_capex_before_inflation: f64,
}

/// Cooling equipment CAPEX and a flat TCO estimate for one solution
///
/// # Arguments
/// * `cooling_type` - Solution to price
/// * `input` - Capacity in MW, base year and country
///
/// # Returns
/// * `Ok(CapexEstimate)` - Money values rounded to cents, with the multiplier and
///   inflation factor used
/// * `Err(CoolingError)` - Unsupported country or negative capacity
///
/// # Examples
/// ```
/// use valuecalc::cooling::{CapexInput, CoolingType, estimate_capex};
///
/// let input = CapexInput {
///     data_hall_design_capacity_mw: 2.0,
///     base_year: 2025,
///     country: "UK".to_string(),
///     reference_year: Some(2025),
/// };
/// let estimate = estimate_capex(CoolingType::AirCooling, &input).unwrap();
/// assert_eq!(estimate.cooling_equipment_capex, 9_904_000.0);
/// ```
pub fn estimate_capex(
    cooling_type: CoolingType,
    input: &CapexInput,
) -> Result<CapexEstimate, CoolingError> {
    let capacity = input.data_hall_design_capacity_mw;
    if !capacity.is_finite() || capacity < 0.0 {
        return Err(CoolingError::InvalidCapacity);
    }

    let country_multiplier = cooling_type.country_multiplier(input.country.trim())?;
    let nameplate_power_kw = capacity * 1000.0;
    let base_capex = country_multiplier * nameplate_power_kw;
    let inflation_factor = cooling_type.inflation_factor(input.base_year, input.reference_year());
    let capex = base_capex * inflation_factor;
    let opex_lifetime = capex * cooling_type.annual_opex_rate() * OPEX_YEARS;

    debug!(
        "{} capex for {} MW in {}: {:.2}",
        cooling_type, capacity, input.country, capex
    );

    Ok(CapexEstimate {
        cooling_type,
        cooling_equipment_capex: round2(capex),
        total_capex_excl_it: round2(capex),
        annual_cooling_capex: round2(capex / ASSET_LIFE_YEARS),
        opex_lifetime: round2(opex_lifetime),
        total_cost_ownership_excl_it: round2(capex + opex_lifetime),
        nameplate_power_kw,
        country_multiplier,
        inflation_factor,
        base_capex_before_inflation: round2(base_capex),
    })
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Savings {
    pub cooling_equipment_capex_difference: f64,
    pub total_cost_ownership_difference: f64,
    pub opex_lifetime_difference: f64,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Comparison {
    pub air_cooling: CapexEstimate,
    pub chassis_immersion: CapexEstimate,
    /// Air cooling minus chassis immersion; positive means immersion is cheaper.
    pub savings: Savings,
    pub recommendation: CoolingType,
}

/// Prices both solutions for the same input and recommends the one with the
/// lower total cost of ownership.
pub fn compare(input: &CapexInput) -> Result<Comparison, CoolingError> {
    let air = estimate_capex(CoolingType::AirCooling, input)?;
    let immersion = estimate_capex(CoolingType::ChassisImmersion, input)?;

    let savings = Savings {
        cooling_equipment_capex_difference: round2(
            air.cooling_equipment_capex - immersion.cooling_equipment_capex,
        ),
        total_cost_ownership_difference: round2(
            air.total_cost_ownership_excl_it - immersion.total_cost_ownership_excl_it,
        ),
        opex_lifetime_difference: round2(air.opex_lifetime - immersion.opex_lifetime),
    };
    let recommendation = if savings.total_cost_ownership_difference > 0.0 {
        CoolingType::ChassisImmersion
    } else {
        CoolingType::AirCooling
    };

    Ok(Comparison {
        air_cooling: air,
        chassis_immersion: immersion,
        savings,
        recommendation,
    })
}

/// First year of the electricity rate forecast.
pub const RATE_FIRST_YEAR: i32 = 2023;

// USD per kWh, one entry per year from RATE_FIRST_YEAR to 2050.
const USA_RATES: [f64; 28] = [
    0.122, 0.124, 0.122, 0.120, 0.120, 0.120, 0.121, 0.123, 0.126, 0.130, 0.133, 0.138, 0.143,
    0.146, 0.150, 0.155, 0.160, 0.165, 0.170, 0.175, 0.179, 0.183, 0.188, 0.192, 0.196, 0.200,
    0.204, 0.208,
];
const SINGAPORE_RATES: [f64; 28] = [
    0.146, 0.139, 0.137, 0.131, 0.131, 0.131, 0.131, 0.131, 0.134, 0.137, 0.139, 0.142, 0.145,
    0.148, 0.151, 0.154, 0.157, 0.160, 0.163, 0.167, 0.170, 0.173, 0.177, 0.180, 0.184, 0.188,
    0.191, 0.195,
];
const UK_RATES: [f64; 28] = [
    0.167, 0.161, 0.180, 0.170, 0.170, 0.170, 0.174, 0.161, 0.164, 0.168, 0.171, 0.174, 0.178,
    0.182, 0.185, 0.189, 0.193, 0.197, 0.200, 0.204, 0.209, 0.213, 0.217, 0.221, 0.226, 0.230,
    0.235, 0.240,
];
const UAE_RATES: [f64; 28] = [
    0.120, 0.122, 0.125, 0.127, 0.130, 0.132, 0.135, 0.138, 0.141, 0.143, 0.146, 0.149, 0.152,
    0.155, 0.158, 0.162, 0.165, 0.168, 0.171, 0.175, 0.178, 0.182, 0.186, 0.189, 0.193, 0.197,
    0.201, 0.205,
];

/// Default water price in USD per litre.
pub const DEFAULT_WATER_PRICE_PER_LITRE: f64 = 0.00134;

/// Yearly cooling maintenance as a share of cooling CAPEX.
pub const MAINTENANCE_RATE: f64 = 0.08;

const HOURS_PER_YEAR: f64 = 365.0 * 24.0;

/// Forecast electricity rate for a country and year.
///
/// Years before the forecast use its first year; years after it use its last.
///
/// # Examples
/// ```
/// use valuecalc::cooling::electricity_rate;
///
/// assert_eq!(electricity_rate("USA", 2025), Ok(0.122));
/// assert_eq!(electricity_rate("USA", 2075), Ok(0.208));
/// assert!(electricity_rate("France", 2025).is_err());
/// ```
pub fn electricity_rate(country: &str, year: i32) -> Result<f64, CoolingError> {
    let rates = match country {
        "USA" => &USA_RATES,
        "Singapore" => &SINGAPORE_RATES,
        "UK" => &UK_RATES,
        "UAE" => &UAE_RATES,
        _ => return Err(CoolingError::UnsupportedCountry(country.to_string())),
    };
    let last = rates.len() as i32 - 1;
    let index = (year - RATE_FIRST_YEAR).clamp(0, last) as usize;
    Ok(rates[index])
}

impl CoolingType {
    /// Power drawn for a kW of capacity at the given utilisation, cooling
    /// fans or pumps included.
    fn power_draw_kw(self, capacity_kw: f64, utilisation: f64) -> f64 {
        match self {
            // 70% of design capacity reaches IT, 30% goes to fans.
            CoolingType::AirCooling => capacity_kw * 0.7 * utilisation + capacity_kw * 0.3,
            // 90% reaches IT; pumps take 1% of the 1% fan budget.
            CoolingType::ChassisImmersion => {
                capacity_kw * 0.9 * utilisation + capacity_kw * 0.01 * 0.01
            }
        }
    }

    /// Litres of water used per kWh.
    fn water_use_per_kwh(self) -> f64 {
        match self {
            CoolingType::AirCooling => 2.0,
            CoolingType::ChassisImmersion => 0.026,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct OpexInput {
    /// Sizing and pricing of the cooling equipment; its estimate drives maintenance.
    #[serde(flatten)]
    pub capex: CapexInput,
    pub first_year_of_operation: i32,
    pub planned_years_of_operation: u32,
    pub annualised_ppue: f64,
    /// Share of design capacity in use, 0 to 1.
    pub percentage_of_utilisation: f64,
    /// Flat rate replacing the forecast for every year.
    #[serde(default)]
    pub electricity_price_per_kwh: Option<f64>,
    #[serde(default)]
    pub water_price_per_litre: Option<f64>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct OpexEstimate {
    pub cooling_type: CoolingType,
    pub cooling_equipment_capex: f64,
    pub annual_energy_kwh: f64,
    pub first_year_electricity_rate: f64,
    pub annual_energy_cost: f64,
    pub annual_water_cost: f64,
    pub annual_maintenance_cost: f64,
    /// Energy, water and maintenance in the first year of operation.
    pub annual_cooling_opex: f64,
    pub energy_cost_over_lifetime: f64,
    pub total_opex_over_lifetime: f64,
}

/// Operating cost of a cooling solution over its planned years.
///
/// Energy is priced year by year from the forecast for `country` (or the flat
/// `electricity_price_per_kwh`), scaled by the annualised pPUE. Water and
/// maintenance are the same every year; maintenance is a fixed share of the
/// cooling CAPEX that [`estimate_capex`] gives for the same input.
///
/// # Arguments
/// * `cooling_type` - Solution to cost
/// * `input` - Capacity, location, operating years, pPUE and utilisation
///
/// # Returns
/// * `Ok(OpexEstimate)` - Annual breakdown and lifetime totals, rounded to cents
/// * `Err(CoolingError)` - Unsupported country or out-of-range input
///
/// # Examples
/// ```
/// use valuecalc::cooling::{CapexInput, CoolingType, OpexInput, estimate_opex};
///
/// let input = OpexInput {
///     capex: CapexInput {
///         data_hall_design_capacity_mw: 1.0,
///         base_year: 2025,
///         country: "USA".to_string(),
///         reference_year: Some(2025),
///     },
///     first_year_of_operation: 2025,
///     planned_years_of_operation: 10,
///     annualised_ppue: 1.2,
///     percentage_of_utilisation: 1.0,
///     electricity_price_per_kwh: None,
///     water_price_per_litre: None,
/// };
/// let opex = estimate_opex(CoolingType::AirCooling, &input).unwrap();
/// assert_eq!(opex.annual_energy_kwh, 8_760_000.0);
/// ```
pub fn estimate_opex(cooling_type: CoolingType, input: &OpexInput) -> Result<OpexEstimate, CoolingError> {
    let utilisation = input.percentage_of_utilisation;
    if !(0.0..=1.0).contains(&utilisation) {
        return Err(CoolingError::InvalidUtilisation(utilisation));
    }
    let ppue = input.annualised_ppue;
    if !ppue.is_finite() || ppue <= 0.0 {
        return Err(CoolingError::InvalidPpue(ppue));
    }

    let capex = estimate_capex(cooling_type, &input.capex)?;
    let country = input.capex.country.trim();
    let flat_rate = input.electricity_price_per_kwh.filter(|p| *p > 0.0);
    let rate_for = |year: i32| match flat_rate {
        Some(price) => Ok(price),
        None => electricity_rate(country, year),
    };

    let capacity_kw = input.capex.data_hall_design_capacity_mw * 1000.0;
    let annual_energy_kwh = cooling_type.power_draw_kw(capacity_kw, utilisation) * HOURS_PER_YEAR;
    let energy_cost_in = |year: i32| rate_for(year).map(|rate| annual_energy_kwh * ppue * rate);

    let first_year = input.first_year_of_operation;
    let first_year_electricity_rate = rate_for(first_year)?;
    let annual_energy_cost = energy_cost_in(first_year)?;
    let mut energy_cost_over_lifetime = 0.0;
    for offset in 0..input.planned_years_of_operation as i32 {
        energy_cost_over_lifetime += energy_cost_in(first_year + offset)?;
    }

    let water_price = input
        .water_price_per_litre
        .unwrap_or(DEFAULT_WATER_PRICE_PER_LITRE);
    let annual_water_cost = annual_energy_kwh * cooling_type.water_use_per_kwh() * water_price;
    let annual_maintenance_cost = capex.cooling_equipment_capex * MAINTENANCE_RATE;

    let years = f64::from(input.planned_years_of_operation);
    let total_opex_over_lifetime =
        energy_cost_over_lifetime + (annual_water_cost + annual_maintenance_cost) * years;

    debug!(
        "{} opex over {} years from {}: {:.2}",
        cooling_type, input.planned_years_of_operation, first_year, total_opex_over_lifetime
    );

    Ok(OpexEstimate {
        cooling_type,
        cooling_equipment_capex: capex.cooling_equipment_capex,
        annual_energy_kwh,
        first_year_electricity_rate,
        annual_energy_cost: round2(annual_energy_cost),
        annual_water_cost: round2(annual_water_cost),
        annual_maintenance_cost: round2(annual_maintenance_cost),
        annual_cooling_opex: round2(annual_energy_cost + annual_water_cost + annual_maintenance_cost),
        energy_cost_over_lifetime: round2(energy_cost_over_lifetime),
        total_opex_over_lifetime: round2(total_opex_over_lifetime),
    })
}
