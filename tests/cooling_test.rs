use valuecalc::cooling::{
    CapexInput, CoolingError, CoolingType, OpexInput, compare, electricity_rate, estimate_capex,
    estimate_opex,
};

fn input(capacity: f64, base_year: i32, country: &str) -> CapexInput {
    CapexInput {
        data_hall_design_capacity_mw: capacity,
        base_year,
        country: country.to_string(),
        reference_year: Some(2025),
    }
}

fn assert_close(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < 0.01,
        "expected {}, got {}",
        expected,
        actual
    );
}

#[test]
fn test_air_cooling_estimate() {
    let estimate = estimate_capex(CoolingType::AirCooling, &input(1.0, 2025, "USA")).unwrap();
    assert_eq!(estimate.nameplate_power_kw, 1000.0);
    assert_eq!(estimate.country_multiplier, 3849.0);
    assert_eq!(estimate.inflation_factor, 1.0);
    assert_close(estimate.cooling_equipment_capex, 3_849_000.0);
    assert_close(estimate.total_capex_excl_it, 3_849_000.0);
    assert_close(estimate.annual_cooling_capex, 153_960.0);
    assert_close(estimate.opex_lifetime, 3_849_000.0);
    assert_close(estimate.total_cost_ownership_excl_it, 7_698_000.0);
}

#[test]
fn test_air_cooling_inflation() {
    let older = estimate_capex(CoolingType::AirCooling, &input(1.0, 2022, "USA")).unwrap();
    assert_eq!(older.inflation_factor, 1.092);
    assert_close(older.cooling_equipment_capex, 4_203_108.0);
    assert_close(older.base_capex_before_inflation, 3_849_000.0);

    let outside_table = estimate_capex(CoolingType::AirCooling, &input(1.0, 2019, "USA")).unwrap();
    assert_eq!(outside_table.inflation_factor, 1.0);

    let future = estimate_capex(CoolingType::AirCooling, &input(1.0, 2030, "USA")).unwrap();
    assert_eq!(future.inflation_factor, 1.0);
}

#[test]
fn test_immersion_inflation_is_clamped() {
    let factor = |year| {
        estimate_capex(CoolingType::ChassisImmersion, &input(1.0, year, "UK"))
            .unwrap()
            .inflation_factor
    };
    assert_eq!(factor(2000), 1.0);
    assert_eq!(factor(2023), 1.0);
    assert_eq!(factor(2025), 1.04);
    assert_eq!(factor(2050), 1.70);
    assert_eq!(factor(2090), 1.70);
}

#[test]
fn test_immersion_estimate() {
    let estimate =
        estimate_capex(CoolingType::ChassisImmersion, &input(1.0, 2025, "USA")).unwrap();
    assert_close(estimate.cooling_equipment_capex, 4_804_800.0);
    assert_close(estimate.opex_lifetime, 3_843_840.0);
    assert_close(estimate.total_cost_ownership_excl_it, 8_648_640.0);
}

#[test]
fn test_compare() {
    let comparison = compare(&input(1.0, 2025, "USA")).unwrap();
    assert_close(comparison.savings.cooling_equipment_capex_difference, -955_800.0);
    assert_close(comparison.savings.total_cost_ownership_difference, -950_640.0);
    assert_close(comparison.savings.opex_lifetime_difference, 5_160.0);
    assert_eq!(comparison.recommendation, CoolingType::AirCooling);
}

#[test]
fn test_compare_recommends_immersion_when_cheaper() {
    // A 2023 base year inflates air cooling by 12.5% and immersion not at all.
    let mut cheap_immersion = input(2.0, 2023, "UAE");
    cheap_immersion.reference_year = Some(2030);
    let comparison = compare(&cheap_immersion).unwrap();
    assert!(comparison.savings.total_cost_ownership_difference > 0.0);
    assert_eq!(comparison.recommendation, CoolingType::ChassisImmersion);
}

#[test]
fn test_errors() {
    assert_eq!(
        estimate_capex(CoolingType::AirCooling, &input(1.0, 2025, "France")).unwrap_err(),
        CoolingError::UnsupportedCountry("France".to_string())
    );
    assert_eq!(
        compare(&input(-1.0, 2025, "UK")).unwrap_err(),
        CoolingError::InvalidCapacity
    );
    assert_eq!(
        CoolingType::from_name("liquid").unwrap_err(),
        CoolingError::UnsupportedCoolingType("liquid".to_string())
    );
    assert_eq!(CoolingType::from_name("Immersion"), Ok(CoolingType::ChassisImmersion));
}

#[test]
fn test_reference_year_is_optional_in_json() {
    let input: CapexInput = serde_json::from_str(
        r#"{"data_hall_design_capacity_mw": 1.5, "base_year": 2024, "country": "Singapore"}"#,
    )
    .unwrap();
    assert_eq!(input.reference_year, None);
    let estimate = estimate_capex(CoolingType::ChassisImmersion, &input).unwrap();
    assert_eq!(estimate.nameplate_power_kw, 1500.0);
}

fn opex_input(first_year: i32, years: u32, ppue: f64, utilisation: f64) -> OpexInput {
    OpexInput {
        capex: input(1.0, 2025, "USA"),
        first_year_of_operation: first_year,
        planned_years_of_operation: years,
        annualised_ppue: ppue,
        percentage_of_utilisation: utilisation,
        electricity_price_per_kwh: None,
        water_price_per_litre: None,
    }
}

#[test]
fn test_electricity_rates() {
    assert_eq!(electricity_rate("UK", 2023), Ok(0.167));
    assert_eq!(electricity_rate("Singapore", 2030), Ok(0.131));
    assert_eq!(electricity_rate("UAE", 2050), Ok(0.205));
    assert_eq!(electricity_rate("UAE", 2051), Ok(0.205));
    assert_eq!(electricity_rate("USA", 2019), Ok(0.122));
}

#[test]
fn test_air_cooling_opex() {
    let opex = estimate_opex(CoolingType::AirCooling, &opex_input(2025, 2, 1.2, 1.0)).unwrap();
    assert_eq!(opex.annual_energy_kwh, 8_760_000.0);
    assert_eq!(opex.first_year_electricity_rate, 0.122);
    assert_close(opex.annual_energy_cost, 1_282_464.0);
    assert_close(opex.annual_water_cost, 23_476.8);
    assert_close(opex.annual_maintenance_cost, 307_920.0);
    assert_close(opex.annual_cooling_opex, 1_613_860.8);
    // 2025 at 0.122, then 2026 at 0.120
    assert_close(opex.energy_cost_over_lifetime, 2_543_904.0);
    assert_close(opex.total_opex_over_lifetime, 3_206_697.6);
}

#[test]
fn test_opex_beyond_forecast_uses_last_year() {
    let opex = estimate_opex(CoolingType::AirCooling, &opex_input(2050, 3, 1.2, 1.0)).unwrap();
    assert_close(opex.energy_cost_over_lifetime, 8_760_000.0 * 1.2 * 0.208 * 3.0);
}

#[test]
fn test_immersion_opex() {
    let opex =
        estimate_opex(CoolingType::ChassisImmersion, &opex_input(2025, 1, 1.1, 0.5)).unwrap();
    assert_close(opex.annual_energy_kwh, 3_942_876.0);
    assert_close(opex.annual_energy_cost, 529_133.96);
    assert_close(opex.annual_water_cost, 137.37);
    assert_close(opex.annual_maintenance_cost, 384_384.0);
    assert_close(opex.cooling_equipment_capex, 4_804_800.0);
}

#[test]
fn test_opex_price_overrides() {
    let mut flat = opex_input(2025, 5, 1.2, 1.0);
    flat.electricity_price_per_kwh = Some(0.1);
    flat.water_price_per_litre = Some(0.0);
    let opex = estimate_opex(CoolingType::AirCooling, &flat).unwrap();
    assert_eq!(opex.first_year_electricity_rate, 0.1);
    assert_close(opex.energy_cost_over_lifetime, 5_256_000.0);
    assert_eq!(opex.annual_water_cost, 0.0);

    // A zero price means "use the forecast".
    flat.electricity_price_per_kwh = Some(0.0);
    let opex = estimate_opex(CoolingType::AirCooling, &flat).unwrap();
    assert_eq!(opex.first_year_electricity_rate, 0.122);
}

#[test]
fn test_opex_errors() {
    assert_eq!(
        estimate_opex(CoolingType::AirCooling, &opex_input(2025, 10, 1.2, 1.5)).unwrap_err(),
        CoolingError::InvalidUtilisation(1.5)
    );
    assert_eq!(
        estimate_opex(CoolingType::AirCooling, &opex_input(2025, 10, 0.0, 1.0)).unwrap_err(),
        CoolingError::InvalidPpue(0.0)
    );
    let mut abroad = opex_input(2025, 10, 1.2, 1.0);
    abroad.capex.country = "France".to_string();
    assert_eq!(
        estimate_opex(CoolingType::ChassisImmersion, &abroad).unwrap_err(),
        CoolingError::UnsupportedCountry("France".to_string())
    );
}

#[test]
fn test_opex_input_from_flat_json() {
    let input: OpexInput = serde_json::from_str(
        r#"{"data_hall_design_capacity_mw": 2, "base_year": 2024, "country": "UK",
            "first_year_of_operation": 2026, "planned_years_of_operation": 15,
            "annualised_ppue": 1.05, "percentage_of_utilisation": 0.8}"#,
    )
    .unwrap();
    assert_eq!(input.capex.country, "UK");
    assert_eq!(input.planned_years_of_operation, 15);
    assert_eq!(input.electricity_price_per_kwh, None);
}
