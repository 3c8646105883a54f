use valuecalc::naming::{
    NamingError, check_rename, clean_formula, clean_parameter_name, name_mapping, rename_in_formula,
};
use valuecalc::parameter::Parameter;
use valuecalc::references::{
    ReferenceScanner, extract_references, find_parameter, reference_spans,
};

#[test]
fn test_extract_is_case_insensitive() {
    let refs = extract_references("it load * pue", &["IT Load", "PUE", "Unused"]);
    assert_eq!(refs, vec!["IT Load".to_string(), "PUE".to_string()]);
}

#[test]
fn test_longer_name_masks_shorter() {
    let names = ["Cost", "Cost per kW", "kW"];
    assert_eq!(
        extract_references("Cost per kW * 2", &names),
        vec!["Cost per kW".to_string()]
    );
    assert_eq!(
        extract_references("Cost per kW * kW + Cost", &names),
        vec!["Cost per kW".to_string(), "Cost".to_string(), "kW".to_string()]
    );
}

#[test]
fn test_word_boundaries() {
    let names = ["Load", "A"];
    assert!(extract_references("Overload * 2", &names).is_empty());
    assert!(extract_references("Load_Factor + Area", &names).is_empty());
    assert_eq!(extract_references("(Load)/A", &names), vec!["Load", "A"]);
}

#[test]
fn test_punctuation_edges_need_no_boundary() {
    let names = ["Cost ($/kWh)", "Energy"];
    assert_eq!(
        extract_references("Energy*Cost ($/kWh)2", &names),
        vec!["Cost ($/kWh)".to_string(), "Energy".to_string()]
    );
}

#[test]
fn test_occurrence_spans() {
    let scanner = ReferenceScanner::new(["Load", "Fan Load"]);
    let formula = "Fan Load + load";
    let mut spans: Vec<(&str, std::ops::Range<usize>)> = scanner
        .occurrences(formula)
        .into_iter()
        .map(|r| (r.name, r.span))
        .collect();
    spans.sort_by_key(|(_, span)| span.start);
    assert_eq!(spans, vec![("Fan Load", 0..8), ("Load", 11..15)]);
}

#[test]
fn test_reference_spans_with_multibyte_text() {
    assert_eq!(reference_spans("Δt × Δt", "Δt"), vec![0..3, 7..10]);
    assert_eq!(reference_spans("Rate*2+rate", "Rate"), vec![0..4, 7..11]);
    assert!(reference_spans("Rates", "Rate").is_empty());
}

#[test]
fn test_find_parameter_prefers_exact_match() {
    let params = vec![Parameter::input("load", 1.0), Parameter::input("Load", 2.0)];
    assert_eq!(find_parameter("Load", &params).and_then(|p| p.value), Some(2.0));
    assert_eq!(find_parameter("LOAD", &params).and_then(|p| p.value), Some(1.0));
    assert!(find_parameter("Other", &params).is_none());
}

#[test]
fn test_clean_parameter_name() {
    assert_eq!(clean_parameter_name(" Total  Cost, USD "), "Total_Cost_USD");
    assert_eq!(clean_parameter_name("__a__b__"), "a_b");
    assert_eq!(clean_parameter_name("PUE"), "PUE");
}

#[test]
fn test_clean_formula_replaces_longest_first() {
    let mapping = name_mapping(["Power Cost", "Power", "Total Power Cost"]);
    assert_eq!(
        clean_formula("Total Power Cost - Power Cost * Power", &mapping),
        "Total_Power_Cost - Power_Cost * Power"
    );
}

#[test]
fn test_rename_in_formula_leaves_longer_names() {
    let names = ["Power", "Power Cost"];
    assert_eq!(
        rename_in_formula("Power Cost * power / Power", &names, "Power", "Load"),
        "Power Cost * Load / Load"
    );
}

#[test]
fn test_check_rename_rules() {
    let names = ["Load", "Cost"];
    assert_eq!(check_rename(&names, "load", "Demand"), Ok("Load"));
    assert_eq!(check_rename(&names, "Load", "LOAD"), Ok("Load"));
    assert_eq!(check_rename(&names, "Load", "  "), Err(NamingError::EmptyName));
    assert_eq!(
        check_rename(&names, "Missing", "X"),
        Err(NamingError::UnknownParameter("Missing".to_string()))
    );
    assert_eq!(
        check_rename(&names, "Load", "cost"),
        Err(NamingError::NameTaken("cost".to_string()))
    );
}
