use crate::{Arrangement, EvaluatedRule, EvaluationStatus, ExternalService, Rule, RuleStatus, Severity};

/// Whether any of the service's contract metrics contains `matcher`, ignoring case.
pub fn service_matches(service: &ExternalService, matcher: &str) -> bool {
    let needle = matcher.to_lowercase();
    service
        .contract_metrics
        .iter()
        .any(|m| m.to_lowercase().contains(&needle))
}

/// Evaluate one rule against the services of one arrangement.
///
/// Services whose metrics mention the matcher are the evidence. With no
/// evidence a CRITICAL rule is violated and a WARNING rule cannot be judged.
/// Otherwise any CONFLICT violates the rule, any UNCERTAIN blocks a verdict,
/// and only all-VALIDATED evidence satisfies it.
pub fn evaluate(rule: &Rule, services: &[ExternalService]) -> EvaluatedRule {
    let relevant: Vec<&ExternalService> = services
        .iter()
        .filter(|s| service_matches(s, &rule.matcher))
        .collect();

    let status = if relevant.is_empty() {
        match rule.severity {
            Severity::Critical => RuleStatus::Violated,
            Severity::Warning => RuleStatus::NotEvaluable,
        }
    } else if relevant
        .iter()
        .any(|s| s.evaluation_status == EvaluationStatus::Conflict)
    {
        RuleStatus::Violated
    } else if relevant
        .iter()
        .any(|s| s.evaluation_status == EvaluationStatus::Uncertain)
    {
        RuleStatus::NotEvaluable
    } else {
        RuleStatus::Satisfied
    };

    EvaluatedRule {
        rule: rule.clone(),
        status,
        matching_services: relevant.iter().map(|s| s.name.clone()).collect(),
    }
}

/// Evaluate every active rule of the arrangement's container, in rule order.
pub fn get_evaluated_rules(arrangement: &Arrangement) -> Vec<EvaluatedRule> {
    tracing::debug!(
        arrangement = %arrangement.id,
        rules = arrangement.container.active_rules.len(),
        services = arrangement.services.len(),
        "evaluating rules"
    );
    arrangement
        .container
        .active_rules
        .iter()
        .map(|rule| evaluate(rule, &arrangement.services))
        .collect()
}
