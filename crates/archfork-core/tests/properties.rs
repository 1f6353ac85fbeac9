//! Behavioural properties of evaluation, forking and comparison.

use std::collections::HashSet;

use archfork_core::graph::{cycle_evaluation_status, fork, toggle_service};
use archfork_core::{
    compare, evaluate, get_evaluated_rules, Arrangement, ContainerVersion, EvaluationStatus,
    ExternalService, Rule, RuleStatus, SequentialIds, ServiceType, Severity,
};

fn service(id: &str, metrics: &[&str], status: EvaluationStatus) -> ExternalService {
    ExternalService {
        id: id.to_string(),
        name: format!("{} service", id),
        service_type: ServiceType::Database,
        contract_metrics: metrics.iter().map(|m| m.to_string()).collect(),
        is_experimental: false,
        evaluation_status: status,
    }
}

fn rule(matcher: &str, severity: Severity) -> Rule {
    Rule {
        id: format!("rule-{}", matcher.to_lowercase()),
        description: format!("Evidence for {}", matcher),
        severity,
        matcher: matcher.to_string(),
    }
}

fn arrangement(id: &str, rules: Vec<Rule>, services: Vec<ExternalService>) -> Arrangement {
    Arrangement {
        id: id.to_string(),
        name: format!("Arrangement {}", id),
        container: ContainerVersion {
            id: format!("ctr-{}", id),
            version_label: "v1.0".to_string(),
            hypothesis: "Initial hypothesis".to_string(),
            active_rules: rules,
        },
        services,
        parent_id: None,
        created_at: chrono::Utc::now(),
    }
}

// ─────────────────────────────────────────────────────────────
// Rule evaluation
// ─────────────────────────────────────────────────────────────

#[test]
fn cost_matcher_ignores_case() {
    let services = [
        service("a", &["Cost Reduced 45%"], EvaluationStatus::Validated),
        service("b", &["HIGH OPEX COST"], EvaluationStatus::Validated),
    ];
    let er = evaluate(&rule("cost", Severity::Warning), &services);
    assert_eq!(er.matching_services, vec!["a service", "b service"]);
    assert_eq!(er.status, RuleStatus::Satisfied);
}

#[test]
fn absence_of_evidence_by_severity() {
    let services = [service("a", &["Throughput 5k rps"], EvaluationStatus::Validated)];
    let critical = evaluate(&rule("DR", Severity::Critical), &services);
    let warning = evaluate(&rule("DR", Severity::Warning), &services);
    assert_eq!(critical.status, RuleStatus::Violated);
    assert_eq!(warning.status, RuleStatus::NotEvaluable);
    assert!(critical.matching_services.is_empty());
}

#[test]
fn uncertain_blocks_and_conflict_dominates() {
    let blocked = [
        service("a", &["DR RTO 48h"], EvaluationStatus::Validated),
        service("b", &["DR RPO 1h"], EvaluationStatus::Uncertain),
    ];
    assert_eq!(
        evaluate(&rule("DR", Severity::Critical), &blocked).status,
        RuleStatus::NotEvaluable
    );

    let tainted = [
        service("a", &["DR RTO 48h"], EvaluationStatus::Validated),
        service("b", &["DR drills quarterly"], EvaluationStatus::Conflict),
        service("c", &["DR RPO 1h"], EvaluationStatus::Uncertain),
    ];
    assert_eq!(
        evaluate(&rule("DR", Severity::Warning), &tainted).status,
        RuleStatus::Violated
    );
}

#[test]
fn dr_rule_scenarios() {
    let dr = rule("DR", Severity::Critical);

    let validated = arrangement(
        "ok",
        vec![dr.clone()],
        vec![service("db", &["DR RTO 48h"], EvaluationStatus::Validated)],
    );
    let er = &get_evaluated_rules(&validated)[0];
    assert_eq!(er.status, RuleStatus::Satisfied);
    assert_eq!(er.matching_services, vec!["db service"]);

    let conflicted = arrangement(
        "bad",
        vec![dr.clone()],
        vec![service("db", &["DR RTO 48h"], EvaluationStatus::Conflict)],
    );
    assert_eq!(get_evaluated_rules(&conflicted)[0].status, RuleStatus::Violated);

    let missing = arrangement(
        "none",
        vec![dr],
        vec![service("db", &["Multi-AZ"], EvaluationStatus::Validated)],
    );
    let er = &get_evaluated_rules(&missing)[0];
    assert_eq!(er.status, RuleStatus::Violated);
    assert!(er.matching_services.is_empty());
}

#[test]
fn evaluation_leaves_inputs_untouched() {
    let r = rule("DR", Severity::Critical);
    let services = vec![service("db", &["DR RTO 48h"], EvaluationStatus::Conflict)];
    let before = (r.clone(), services.clone());
    let first = evaluate(&r, &services);
    let second = evaluate(&r, &services);
    assert_eq!(first, second);
    assert_eq!((r, services), before);
}

// ─────────────────────────────────────────────────────────────
// Version graph
// ─────────────────────────────────────────────────────────────

#[test]
fn fork_isolation_both_ways() {
    let base = vec![arrangement(
        "arr-1",
        vec![rule("DR", Severity::Critical)],
        vec![service("db", &["DR RTO 48h"], EvaluationStatus::Validated)],
    )];
    let mut ids = SequentialIds::after(&base);
    let (forked, fork_id) = fork(&base, "arr-1", &mut ids).unwrap();

    let child_edit = cycle_evaluation_status(&forked, &fork_id, "db");
    let parent = child_edit.iter().find(|a| a.id == "arr-1").unwrap();
    let child = child_edit.iter().find(|a| a.id == fork_id).unwrap();
    assert_eq!(parent.services[0].evaluation_status, EvaluationStatus::Validated);
    assert_eq!(child.services[0].evaluation_status, EvaluationStatus::Conflict);

    let parent_edit = cycle_evaluation_status(&forked, "arr-1", "db");
    let parent = parent_edit.iter().find(|a| a.id == "arr-1").unwrap();
    let child = parent_edit.iter().find(|a| a.id == fork_id).unwrap();
    assert_eq!(parent.services[0].evaluation_status, EvaluationStatus::Conflict);
    assert_eq!(child.services[0].evaluation_status, EvaluationStatus::Validated);
}

#[test]
fn status_cycle_closes_after_three_steps() {
    for start in [
        EvaluationStatus::Validated,
        EvaluationStatus::Uncertain,
        EvaluationStatus::Conflict,
    ] {
        let mut arrangements = vec![arrangement("arr-1", vec![], vec![service("db", &[], start)])];
        let mut seen = HashSet::new();
        for _ in 0..3 {
            arrangements = cycle_evaluation_status(&arrangements, "arr-1", "db");
            seen.insert(arrangements[0].services[0].evaluation_status);
        }
        assert_eq!(arrangements[0].services[0].evaluation_status, start);
        assert_eq!(seen.len(), 3);
    }
}

#[test]
fn toggle_removes_then_restores_fresh_instance() {
    let catalog = vec![service("db", &["DR RTO 48h"], EvaluationStatus::Uncertain)];
    let mut arrangements = vec![arrangement("arr-1", vec![], vec![catalog[0].instantiate()])];

    // Diverge the arrangement's copy from the template before removing it.
    arrangements = cycle_evaluation_status(&arrangements, "arr-1", "db");
    assert_eq!(arrangements[0].services[0].evaluation_status, EvaluationStatus::Validated);

    arrangements = toggle_service(&arrangements, "arr-1", "db", &catalog);
    assert!(arrangements[0].services.is_empty());

    arrangements = toggle_service(&arrangements, "arr-1", "db", &catalog);
    assert_eq!(arrangements[0].services, catalog);
    assert_eq!(catalog[0].evaluation_status, EvaluationStatus::Uncertain);
}

// ─────────────────────────────────────────────────────────────
// Comparison
// ─────────────────────────────────────────────────────────────

#[test]
fn comparison_partitions_are_disjoint() {
    let a = arrangement(
        "a",
        vec![rule("DR", Severity::Critical)],
        vec![
            service("s1", &["DR"], EvaluationStatus::Validated),
            service("s2", &[], EvaluationStatus::Validated),
            service("s3", &[], EvaluationStatus::Conflict),
        ],
    );
    let b = arrangement(
        "b",
        vec![rule("cost", Severity::Warning)],
        vec![
            service("s2", &[], EvaluationStatus::Uncertain),
            service("s4", &[], EvaluationStatus::Validated),
        ],
    );
    let cmp = compare(&a, Some(&b));

    let ids = |v: &[ExternalService]| v.iter().map(|s| s.id.clone()).collect::<HashSet<_>>();
    let only_a = ids(&cmp.unique_to_a);
    let only_b = ids(&cmp.unique_to_b);
    let common = ids(&cmp.common);

    assert!(only_a.is_disjoint(&only_b));
    assert!(only_a.is_disjoint(&common));
    assert_eq!(only_a, HashSet::from(["s1".to_string(), "s3".to_string()]));
    assert_eq!(only_b, HashSet::from(["s4".to_string()]));
    assert_eq!(common, HashSet::from(["s2".to_string()]));

    assert_eq!(cmp.evaluated_rules_a[0].rule.matcher, "DR");
    assert_eq!(cmp.evaluated_rules_b[0].rule.matcher, "cost");
}
