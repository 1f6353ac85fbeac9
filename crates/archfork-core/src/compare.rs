use std::collections::HashSet;

use serde::Serialize;

use crate::evaluate::get_evaluated_rules;
use crate::{Arrangement, EvaluatedRule, ExternalService};

/// Side-by-side view of two arrangements.
///
/// `common` holds A's copies; status divergence between the two sides shows
/// up through the independent rule evaluations.
#[derive(Debug, Clone, Serialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Comparison {
    pub unique_to_a: Vec<ExternalService>,
    pub unique_to_b: Vec<ExternalService>,
    pub common: Vec<ExternalService>,
    pub evaluated_rules_a: Vec<EvaluatedRule>,
    pub evaluated_rules_b: Vec<EvaluatedRule>,
}

impl Comparison {
    pub fn is_empty(&self) -> bool {
        self.unique_to_a.is_empty()
            && self.unique_to_b.is_empty()
            && self.common.is_empty()
            && self.evaluated_rules_a.is_empty()
            && self.evaluated_rules_b.is_empty()
    }
}

/// Compare `a` against `b`. With no `b` selected yet, everything is empty.
pub fn compare(a: &Arrangement, b: Option<&Arrangement>) -> Comparison {
    let Some(b) = b else {
        return Comparison::default();
    };

    let ids_a: HashSet<&str> = a.services.iter().map(|s| s.id.as_str()).collect();
    let ids_b: HashSet<&str> = b.services.iter().map(|s| s.id.as_str()).collect();

    let (common, unique_to_a): (Vec<ExternalService>, Vec<ExternalService>) = a
        .services
        .iter()
        .cloned()
        .partition(|s| ids_b.contains(s.id.as_str()));

    let unique_to_b = b
        .services
        .iter()
        .filter(|s| !ids_a.contains(s.id.as_str()))
        .cloned()
        .collect();

    tracing::debug!(a = %a.id, b = %b.id, "comparing arrangements");

    Comparison {
        unique_to_a,
        unique_to_b,
        common,
        evaluated_rules_a: get_evaluated_rules(a),
        evaluated_rules_b: get_evaluated_rules(b),
    }
}
