use super::*;

fn fingerprint() -> PatternFingerprint {
    PatternFingerprint {
        naming_convention: NamingConvention::SnakeCase,
        avg_nesting: 0.5,
        max_nesting: 1,
        complexity: 1.0,
        documentation_ratio: Some(1.0),
        has_error_handling: true,
        imports: vec!["os".to_string()],
        line_count: 8,
        naming_samples: vec!["load_user".to_string()],
        indentation: Indentation::Spaces(4),
        max_line_length: 60,
        prints: false,
        logs: true,
    }
}

fn analyze(candidate: &PatternFingerprint, neighbors: &[PatternFingerprint]) -> Vec<Deviation> {
    let refs: Vec<&PatternFingerprint> = neighbors.iter().collect();
    DifferenceAnalyzer::default().analyze(candidate, &refs)
}

fn attributes(deviations: &[Deviation]) -> Vec<Attribute> {
    deviations.iter().map(|d| d.attribute).collect()
}

#[test]
fn matching_candidate_has_no_deviations() {
    let neighbors = vec![fingerprint(); 5];
    assert!(analyze(&fingerprint(), &neighbors).is_empty());
}

#[test]
fn no_neighbors_means_no_norm() {
    let mut candidate = fingerprint();
    candidate.naming_convention = NamingConvention::CamelCase;
    candidate.has_error_handling = false;
    assert!(analyze(&candidate, &[]).is_empty());
}

#[test]
fn naming_mismatch_against_majority() {
    let mut candidate = fingerprint();
    candidate.naming_convention = NamingConvention::CamelCase;
    candidate.naming_samples = vec!["calculateTotal".to_string(), "itemList".to_string()];

    let deviations = analyze(&candidate, &vec![fingerprint(); 3]);
    assert_eq!(attributes(&deviations), vec![Attribute::NamingConvention]);

    let naming = &deviations[0];
    assert_eq!(naming.observed, "camelCase");
    assert_eq!(naming.expected, "snake_case");
    assert_eq!(naming.category(), Category::Style);
    assert_eq!(naming.severity(), Severity::Medium);
    assert!(naming.message.contains("calculateTotal"));
    assert!(naming.suggested_fix.contains("`calculate_total`"));
}

#[test]
fn naming_without_strict_majority_is_not_a_norm() {
    let mut camel = fingerprint();
    camel.naming_convention = NamingConvention::CamelCase;
    let mut unknown = fingerprint();
    unknown.naming_convention = NamingConvention::Unknown;

    let mut candidate = fingerprint();
    candidate.naming_convention = NamingConvention::PascalCase;

    // 2 snake vs 2 camel: no majority
    let split = vec![fingerprint(), fingerprint(), camel.clone(), camel.clone()];
    assert!(analyze(&candidate, &split).is_empty());

    // unknown neighbors do not count toward the majority
    let mostly_unknown = vec![fingerprint(), unknown.clone(), unknown.clone(), unknown];
    assert_eq!(
        attributes(&analyze(&candidate, &mostly_unknown)),
        vec![Attribute::NamingConvention]
    );

    // an unknown candidate never deviates
    let mut silent = fingerprint();
    silent.naming_convention = NamingConvention::Unknown;
    assert!(analyze(&silent, &vec![fingerprint(); 3]).is_empty());
}

#[test]
fn missing_error_handling_is_high_severity() {
    let mut candidate = fingerprint();
    candidate.has_error_handling = false;

    let deviations = analyze(&candidate, &vec![fingerprint(); 4]);
    assert_eq!(attributes(&deviations), vec![Attribute::ErrorHandling]);
    assert_eq!(deviations[0].category(), Category::BestPractice);
    assert_eq!(deviations[0].severity(), Severity::High);
}

#[test]
fn error_handling_needs_consensus() {
    let mut candidate = fingerprint();
    candidate.has_error_handling = false;

    let mut bare = fingerprint();
    bare.has_error_handling = false;

    // 3 of 5 is below the 0.8 consensus
    let neighbors = vec![
        fingerprint(),
        fingerprint(),
        fingerprint(),
        bare.clone(),
        bare,
    ];
    assert!(analyze(&candidate, &neighbors).is_empty());
}

#[test]
fn numeric_deviations_are_directional() {
    let mut simpler = fingerprint();
    simpler.complexity = 0.1;
    simpler.avg_nesting = 0.0;
    assert!(analyze(&simpler, &vec![fingerprint(); 3]).is_empty());

    let mut tangled = fingerprint();
    tangled.complexity = 3.0;
    tangled.avg_nesting = 2.5;
    tangled.max_nesting = 4;
    let deviations = analyze(&tangled, &vec![fingerprint(); 3]);
    assert_eq!(
        attributes(&deviations),
        vec![Attribute::Complexity, Attribute::NestingDepth]
    );
    assert_eq!(deviations[0].severity(), Severity::Medium);
    assert_eq!(deviations[1].severity(), Severity::Low);
    assert_eq!(deviations[1].category(), Category::Structure);
}

#[test]
fn tolerance_floor_covers_zero_variance() {
    let mut candidate = fingerprint();
    // within the 0.5 floor even though neighbors have no spread
    candidate.complexity = 1.4;
    assert!(analyze(&candidate, &vec![fingerprint(); 3]).is_empty());

    candidate.complexity = 1.6;
    assert_eq!(
        attributes(&analyze(&candidate, &vec![fingerprint(); 3])),
        vec![Attribute::Complexity]
    );
}

#[test]
fn spread_neighbors_widen_tolerance() {
    let mut low = fingerprint();
    low.complexity = 1.0;
    let mut high = fingerprint();
    high.complexity = 5.0;

    // mean 3, population sigma 2, tolerance 2
    let neighbors = vec![low, high];
    let mut candidate = fingerprint();
    candidate.complexity = 4.9;
    assert!(analyze(&candidate, &neighbors).is_empty());

    candidate.complexity = 5.1;
    assert_eq!(
        attributes(&analyze(&candidate, &neighbors)),
        vec![Attribute::Complexity]
    );
}

#[test]
fn documentation_only_flags_below_norm() {
    let mut candidate = fingerprint();
    candidate.documentation_ratio = Some(0.0);
    let deviations = analyze(&candidate, &vec![fingerprint(); 3]);
    assert_eq!(attributes(&deviations), vec![Attribute::DocumentationRatio]);
    assert_eq!(deviations[0].severity(), Severity::Low);
    assert_eq!(deviations[0].category(), Category::Maintainability);

    let mut undocumented = fingerprint();
    undocumented.documentation_ratio = Some(0.0);
    let mut better = fingerprint();
    better.documentation_ratio = Some(1.0);
    assert!(analyze(&better, &vec![undocumented; 3]).is_empty());

    let mut module = fingerprint();
    module.documentation_ratio = None;
    assert!(analyze(&module, &vec![fingerprint(); 3]).is_empty());
}

#[test]
fn unusual_imports_are_reported() {
    let mut candidate = fingerprint();
    candidate.imports = vec!["os".to_string(), "pickle".to_string()];

    let deviations = analyze(&candidate, &vec![fingerprint(); 2]);
    assert_eq!(attributes(&deviations), vec![Attribute::Imports]);
    assert_eq!(deviations[0].observed, "pickle");

    let mut importless = fingerprint();
    importless.imports.clear();
    assert!(analyze(&candidate, &vec![importless; 2]).is_empty());
}

#[test]
fn deviation_order_follows_attributes() {
    let mut candidate = fingerprint();
    candidate.naming_convention = NamingConvention::CamelCase;
    candidate.has_error_handling = false;
    candidate.documentation_ratio = Some(0.0);

    let deviations = analyze(&candidate, &vec![fingerprint(); 3]);
    assert_eq!(
        attributes(&deviations),
        vec![
            Attribute::NamingConvention,
            Attribute::DocumentationRatio,
            Attribute::ErrorHandling
        ]
    );
    assert_eq!(deviations, analyze(&candidate, &vec![fingerprint(); 3]));
}

#[test]
fn attribute_labels_and_keywords() {
    assert_eq!(
        Attribute::parse("naming-convention"),
        Some(Attribute::NamingConvention)
    );
    assert_eq!(Attribute::parse("Error Handling"), Some(Attribute::ErrorHandling));
    assert_eq!(Attribute::parse("docs"), Some(Attribute::DocumentationRatio));
    assert_eq!(Attribute::parse("Line Length"), Some(Attribute::LineLength));
    assert_eq!(Attribute::parse("print"), Some(Attribute::Logging));
    assert_eq!(Attribute::parse("vibes"), None);

    assert!(Attribute::ErrorHandling.mentioned_in("Wrap the request in try/except"));
    assert!(Attribute::NamingConvention.mentioned_in("Use snake_case for function names"));
    assert!(!Attribute::Imports.mentioned_in("Use snake_case for function names"));
}

#[test]
fn indentation_mismatch_against_majority() {
    let mut candidate = fingerprint();
    candidate.indentation = Indentation::Tabs;

    let deviations = analyze(&candidate, &vec![fingerprint(); 3]);
    assert_eq!(attributes(&deviations), vec![Attribute::Indentation]);
    let indentation = &deviations[0];
    assert_eq!(indentation.observed, "tabs");
    assert_eq!(indentation.expected, "4 spaces");
    assert_eq!(indentation.category(), Category::Style);
    assert_eq!(indentation.severity(), Severity::Low);
    assert_eq!(indentation.suggested_fix, "Re-indent the code with 4 spaces");
}

#[test]
fn indentation_needs_a_known_majority() {
    let mut candidate = fingerprint();
    candidate.indentation = Indentation::Spaces(2);

    let mut tabs = fingerprint();
    tabs.indentation = Indentation::Tabs;
    let split = vec![fingerprint(), fingerprint(), tabs.clone(), tabs];
    assert!(analyze(&candidate, &split).is_empty());

    let mut flat = fingerprint();
    flat.indentation = Indentation::Unknown;
    let mostly_flat = vec![flat.clone(), flat, fingerprint()];
    assert_eq!(
        attributes(&analyze(&candidate, &mostly_flat)),
        vec![Attribute::Indentation]
    );

    candidate.indentation = Indentation::Unknown;
    assert!(analyze(&candidate, &vec![fingerprint(); 3]).is_empty());
}

#[test]
fn long_lines_beyond_the_floor() {
    let mut candidate = fingerprint();
    candidate.max_line_length = 75;
    assert!(analyze(&candidate, &vec![fingerprint(); 3]).is_empty());

    candidate.max_line_length = 130;
    let deviations = analyze(&candidate, &vec![fingerprint(); 3]);
    assert_eq!(attributes(&deviations), vec![Attribute::LineLength]);
    let long = &deviations[0];
    assert_eq!(long.observed, "130");
    assert_eq!(long.expected, "60");
    assert_eq!(long.severity(), Severity::Low);
    assert_eq!(long.suggested_fix, "Wrap lines to stay within 60 characters");
}

#[test]
fn printing_where_neighbors_log() {
    let mut candidate = fingerprint();
    candidate.prints = true;
    candidate.logs = false;

    let deviations = analyze(&candidate, &vec![fingerprint(); 3]);
    assert_eq!(attributes(&deviations), vec![Attribute::Logging]);
    assert_eq!(deviations[0].category(), Category::BestPractice);
    assert_eq!(deviations[0].severity(), Severity::Medium);
    assert_eq!(deviations[0].expected, "a logger in 3 of 3 similar units");

    let mut printer = fingerprint();
    printer.prints = true;
    assert!(analyze(&candidate, &[fingerprint(), printer]).is_empty());

    let mut silent = fingerprint();
    silent.logs = false;
    assert!(analyze(&candidate, &vec![silent; 3]).is_empty());

    candidate.logs = true;
    assert!(analyze(&candidate, &vec![fingerprint(); 3]).is_empty());
}
