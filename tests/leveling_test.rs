use valuecalc::leveling::{LevelError, LevelManager, assign_levels, build_parameter_set};
use valuecalc::naming::rename_parameter;
use valuecalc::parameter::{
    CalculationItem, GroupedParameters, Parameter, ParameterKind, RawValue, SourceItem,
    UserInterface,
};

fn level_of(params: &[Parameter], name: &str) -> u32 {
    params
        .iter()
        .find(|p| p.name == name)
        .map(|p| p.level)
        .unwrap_or_else(|| panic!("no parameter named {}", name))
}

fn cooling_set() -> Vec<Parameter> {
    vec![
        Parameter::input("IT Load", 1000.0),
        Parameter::company("Power Cost", 0.12),
        Parameter::formula("Annual Energy", "IT Load * 8760"),
        Parameter::formula("Annual Power Cost", "Annual Energy * Power Cost"),
        Parameter::formula("Ten Year Cost", "Annual Power Cost * 10"),
    ]
}

#[test]
fn test_inputs_and_company_sit_at_level_one() {
    let params = assign_levels(cooling_set()).unwrap();
    assert_eq!(level_of(&params, "IT Load"), 1);
    assert_eq!(level_of(&params, "Power Cost"), 1);
}

#[test]
fn test_chain_levels() {
    let params = assign_levels(cooling_set()).unwrap();
    assert_eq!(level_of(&params, "Annual Energy"), 2);
    assert_eq!(level_of(&params, "Annual Power Cost"), 3);
    assert_eq!(level_of(&params, "Ten Year Cost"), 4);
}

#[test]
fn test_formula_without_references_is_level_two() {
    let params = assign_levels(vec![
        Parameter::formula("Hours", "24 * 365"),
        Parameter::formula("Empty", "  "),
    ])
    .unwrap();
    assert_eq!(level_of(&params, "Hours"), 2);
    assert_eq!(level_of(&params, "Empty"), 2);
}

#[test]
fn test_formula_without_text_keeps_level_two() {
    let mut param = Parameter::formula("Pending", "");
    param.formula = None;
    let params = assign_levels(vec![Parameter::input("A", 1.0), param]).unwrap();
    assert_eq!(level_of(&params, "Pending"), 2);
}

#[test]
fn test_every_formula_exceeds_its_references() {
    let report = LevelManager::new()
        .level(vec![
            Parameter::formula("D", "B + C"),
            Parameter::formula("C", "A * 2"),
            Parameter::formula("B", "A + C"),
            Parameter::input("A", 1.0),
            Parameter::formula("E", "D - A"),
        ])
        .unwrap();

    for (name, refs) in &report.dependencies {
        let level = report.level_of(name).unwrap();
        for r in refs {
            assert!(
                level > report.level_of(r).unwrap(),
                "{} (level {}) must exceed {}",
                name,
                level,
                r
            );
        }
    }
    assert_eq!(report.level_of("C"), Some(2));
    assert_eq!(report.level_of("B"), Some(3));
    assert_eq!(report.level_of("D"), Some(4));
    assert_eq!(report.level_of("E"), Some(5));
}

#[test]
fn test_unreferenced_parameter_changes_nothing() {
    let before = assign_levels(cooling_set()).unwrap();

    let mut extended = cooling_set();
    extended.push(Parameter::input("Unused", 3.0));
    extended.push(Parameter::formula("Also Unused", "Unused * 2"));
    let after = assign_levels(extended).unwrap();

    for param in &before {
        assert_eq!(level_of(&after, &param.name), param.level);
    }
}

#[test]
fn test_rename_keeps_levels() {
    let mut params = cooling_set();
    let before = assign_levels(params.clone()).unwrap();

    rename_parameter(&mut params, "Annual Energy", "Yearly Energy").unwrap();
    let after = assign_levels(params.clone()).unwrap();

    assert_eq!(level_of(&after, "Yearly Energy"), level_of(&before, "Annual Energy"));
    assert_eq!(level_of(&after, "Ten Year Cost"), level_of(&before, "Ten Year Cost"));
    let cost = params.iter().find(|p| p.name == "Annual Power Cost").unwrap();
    assert_eq!(cost.formula.as_deref(), Some("Yearly Energy * Power Cost"));
}

// F1..Fn where Fi = F(i-1) + 1, listed last link first, over input F0.
fn reverse_chain(length: usize) -> Vec<Parameter> {
    let mut params = Vec::new();
    for i in (1..=length).rev() {
        params.push(Parameter::formula(&format!("F{}", i), &format!("F{} + 1", i - 1)));
    }
    params.push(Parameter::input("F0", 0.0));
    params
}

#[test]
fn test_reverse_chain_against_default_pass_cap() {
    let report = LevelManager::new().level(reverse_chain(100)).unwrap();
    assert_eq!(report.level_of("F100"), Some(101));
    assert_eq!(report.passes, 100);

    let err = LevelManager::new().level(reverse_chain(101)).unwrap_err();
    assert_eq!(err, LevelError::NonConvergence { passes: 100 });
}

#[test]
fn test_reverse_chain_beyond_pass_cap() {
    let mut params = Vec::new();
    for i in (1..=10).rev() {
        params.push(Parameter::formula(&format!("F{}", i), &format!("F{} + 1", i - 1)));
    }
    params.push(Parameter::input("F0", 0.0));

    let err = LevelManager::with_max_passes(3).level(params.clone()).unwrap_err();
    assert_eq!(err, LevelError::NonConvergence { passes: 3 });

    let report = LevelManager::new().level(params).unwrap();
    assert_eq!(report.level_of("F10"), Some(11));
    assert!(report.passes <= 11);
}

#[test]
fn test_forward_chain_settles_in_two_passes() {
    let mut params = vec![Parameter::input("F0", 0.0)];
    for i in 1..=10 {
        params.push(Parameter::formula(&format!("F{}", i), &format!("F{} + 1", i - 1)));
    }
    let report = LevelManager::with_max_passes(2).level(params).unwrap();
    assert_eq!(report.passes, 2);
    assert_eq!(report.max_level(), 11);
}

#[test]
fn test_cycle_is_reported_with_path() {
    let err = assign_levels(vec![
        Parameter::input("Base", 1.0),
        Parameter::formula("A", "B + Base"),
        Parameter::formula("B", "C * 2"),
        Parameter::formula("C", "A - 1"),
    ])
    .unwrap_err();

    match err {
        LevelError::Cycle { path } => {
            assert_eq!(path.first(), path.last());
            assert_eq!(path.len(), 4);
            for name in ["A", "B", "C"] {
                assert!(path.iter().any(|p| p == name));
            }
        }
        other => panic!("expected cycle, got {:?}", other),
    }
}

#[test]
fn test_self_reference_is_a_cycle() {
    let err = assign_levels(vec![Parameter::formula("Total", "Total + 1")]).unwrap_err();
    assert_eq!(
        err,
        LevelError::Cycle {
            path: vec!["Total".to_string(), "Total".to_string()]
        }
    );
}

#[test]
fn test_sorted_by_level_with_stable_ties() {
    let params = assign_levels(vec![
        Parameter::formula("Z", "W + X"),
        Parameter::input("Y", 1.0),
        Parameter::formula("W", "Y * 3"),
        Parameter::input("X", 2.0),
        Parameter::formula("V", "X * 3"),
    ])
    .unwrap();
    let names: Vec<&str> = params.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["Y", "X", "W", "V", "Z"]);
}

#[test]
fn test_references_resolve_case_insensitively() {
    let params = assign_levels(vec![
        Parameter::input("Rack Count", 20.0),
        Parameter::formula("Racks Doubled", "rack count * 2"),
        Parameter::formula("Racks Quadrupled", "RACKS DOUBLED * 2"),
    ])
    .unwrap();
    assert_eq!(level_of(&params, "Racks Quadrupled"), 3);
}

#[test]
fn test_shorter_name_inside_longer_name_is_not_a_reference() {
    let report = LevelManager::new()
        .level(vec![
            Parameter::formula("Power", "Power Cost * 2"),
            Parameter::input("Power Cost", 0.1),
        ])
        .unwrap();
    assert_eq!(report.dependencies["Power"], vec!["Power Cost".to_string()]);
    assert_eq!(report.level_of("Power"), Some(2));
}

#[test]
fn test_levels_are_reset_before_leveling() {
    let mut stale = Parameter::formula("Doubled", "Load * 2");
    stale.level = 40;
    let mut input = Parameter::input("Load", 1.0);
    input.level = 7;
    let params = assign_levels(vec![stale, input]).unwrap();
    assert_eq!(level_of(&params, "Load"), 1);
    assert_eq!(level_of(&params, "Doubled"), 2);
}

fn item(name: &str) -> SourceItem {
    SourceItem {
        name: name.to_string(),
        ..SourceItem::default()
    }
}

#[test]
fn test_build_parameter_set_classifies_groups() {
    let mut grouped = GroupedParameters::new();
    grouped.push(
        "General",
        SourceItem {
            value: Some(RawValue::Text("250".to_string())),
            ..item("Capacity")
        },
    );
    grouped.push(
        "general",
        SourceItem {
            user_interface: Some(UserInterface::Plain("static".to_string())),
            value: Some(RawValue::Number(0.9)),
            ..item("Efficiency")
        },
    );
    grouped.push(
        "Cooling",
        SourceItem {
            test_value: Some(RawValue::Number(4.5)),
            ..item("Fan Power")
        },
    );
    grouped.push(
        "Calculations",
        SourceItem {
            formula: Some("Capacity * Efficiency".to_string()),
            ..item("Effective Capacity")
        },
    );
    let calculations = vec![
        CalculationItem {
            name: "Fan Share".to_string(),
            formula: "Fan Power / Effective Capacity".to_string(),
            ..CalculationItem::default()
        },
        CalculationItem {
            name: "".to_string(),
            formula: "1 + 1".to_string(),
            ..CalculationItem::default()
        },
    ];

    let params = build_parameter_set(&grouped, &calculations).unwrap();
    let kinds: Vec<(&str, ParameterKind, u32)> = params
        .iter()
        .map(|p| (p.name.as_str(), p.kind, p.level))
        .collect();
    assert_eq!(
        kinds,
        vec![
            ("Capacity", ParameterKind::Input, 1),
            ("Efficiency", ParameterKind::Company, 1),
            ("Fan Power", ParameterKind::Company, 1),
            ("Effective Capacity", ParameterKind::Formula, 2),
            ("Fan Share", ParameterKind::Formula, 2),
        ]
    );
    assert_eq!(params[0].value, Some(250.0));
    assert_eq!(params[0].category, "general");
    assert_eq!(params[2].value, Some(4.5));

    let report = LevelManager::new().level_groups(&grouped, &calculations).unwrap();
    assert_eq!(report.level_of("Fan Share"), Some(3));
}

#[test]
fn test_duplicate_names_are_rejected() {
    let mut grouped = GroupedParameters::new();
    grouped.push("general", item("Load"));
    grouped.push("cooling", item("load"));
    assert_eq!(
        build_parameter_set(&grouped, &[]).unwrap_err(),
        LevelError::DuplicateName("load".to_string())
    );

    let mut grouped = GroupedParameters::new();
    grouped.push("general", item("Load"));
    let calculations = vec![CalculationItem {
        name: "Load".to_string(),
        formula: "2".to_string(),
        ..CalculationItem::default()
    }];
    assert!(matches!(
        build_parameter_set(&grouped, &calculations),
        Err(LevelError::DuplicateName(_))
    ));
}

#[test]
fn test_calculation_replaces_formula_row_of_same_name() {
    let mut grouped = GroupedParameters::new();
    grouped.push("general", item("Load"));
    grouped.push(
        "calculations",
        SourceItem {
            formula: Some("Load".to_string()),
            ..item("Doubled")
        },
    );
    let calculations = vec![CalculationItem {
        name: "Doubled".to_string(),
        formula: "Load * 2".to_string(),
        units: Some("kW".to_string()),
        ..CalculationItem::default()
    }];

    let params = build_parameter_set(&grouped, &calculations).unwrap();
    assert_eq!(params.len(), 2);
    assert_eq!(params[1].formula.as_deref(), Some("Load * 2"));
    assert_eq!(params[1].unit.as_deref(), Some("kW"));
}

#[test]
fn test_by_level_groups() {
    let report = LevelManager::new().level(cooling_set()).unwrap();
    let groups = report.by_level();
    assert_eq!(groups.keys().copied().collect::<Vec<_>>(), vec![1, 2, 3, 4]);
    assert_eq!(groups[&1].len(), 2);
}

#[test]
fn test_pass_cap_is_at_least_one() {
    assert_eq!(LevelManager::with_max_passes(0).max_passes(), 1);
    assert_eq!(LevelManager::new().max_passes(), 100);
}

#[test]
fn test_duplicate_names_in_a_flat_list() {
    let err = LevelManager::new()
        .level(vec![
            Parameter::input("A", 1.0),
            Parameter::formula("A", "A + 1"),
        ])
        .unwrap_err();
    assert_eq!(err, LevelError::DuplicateName("A".to_string()));

    let err = assign_levels(vec![
        Parameter::input("Load", 1.0),
        Parameter::company("Spare", 2.0),
        Parameter::formula("LOAD", "Spare * 2"),
    ])
    .unwrap_err();
    assert_eq!(err, LevelError::DuplicateName("LOAD".to_string()));
}

#[test]
fn test_function_call_is_not_a_reference() {
    let report = LevelManager::new()
        .level(vec![
            Parameter::input("A", 1.0),
            Parameter::input("B", 2.0),
            Parameter::formula("Sum", "SUM(A, B)"),
            Parameter::formula("Doubled", "Sum * 2"),
        ])
        .unwrap();
    assert_eq!(report.level_of("Sum"), Some(2));
    assert_eq!(report.level_of("Doubled"), Some(3));
    assert_eq!(report.dependencies["Sum"], vec!["A".to_string(), "B".to_string()]);
}
