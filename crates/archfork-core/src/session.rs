use crate::compare::{compare, Comparison};
use crate::error::{CoreError, Result};
use crate::evaluate::get_evaluated_rules;
use crate::feed::validate_seed;
use crate::graph;
use crate::ids::IdAllocator;
use crate::store::SessionSnapshot;
use crate::{find_arrangement, Arrangement, EvaluatedRule, ExternalService};

/// Owner of the arrangement collection for one editing session.
///
/// Edits replace the whole collection with the result of the matching
/// [`graph`] operation, so a reader holding an earlier `arrangements()`
/// slice never observes a half-applied change.
pub struct Session {
    arrangements: Vec<Arrangement>,
    active_id: String,
    catalog: Vec<ExternalService>,
    ids: Box<dyn IdAllocator + Send>,
}

impl Session {
    /// Start a session from seed arrangements. The first arrangement is active.
    pub fn new(
        arrangements: Vec<Arrangement>,
        catalog: Vec<ExternalService>,
        ids: Box<dyn IdAllocator + Send>,
    ) -> Result<Self> {
        validate_seed(&arrangements)?;
        let active_id = arrangements[0].id.clone();
        Ok(Session {
            arrangements,
            active_id,
            catalog,
            ids,
        })
    }

    /// Resume a stored session. A stale active id falls back to the first arrangement.
    pub fn from_snapshot(
        snapshot: SessionSnapshot,
        catalog: Vec<ExternalService>,
        ids: Box<dyn IdAllocator + Send>,
    ) -> Result<Self> {
        let mut session = Session::new(snapshot.arrangements, catalog, ids)?;
        session.select(&snapshot.active_id);
        Ok(session)
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            arrangements: self.arrangements.clone(),
            active_id: self.active_id.clone(),
        }
    }

    pub fn arrangements(&self) -> &[Arrangement] {
        &self.arrangements
    }

    pub fn catalog(&self) -> &[ExternalService] {
        &self.catalog
    }

    pub fn arrangement(&self, id: &str) -> Option<&Arrangement> {
        find_arrangement(&self.arrangements, id)
    }

    pub fn active_id(&self) -> &str {
        &self.active_id
    }

    pub fn active(&self) -> &Arrangement {
        // active_id always names an arrangement: it is set from the collection
        // and arrangements are never removed.
        self.arrangement(&self.active_id)
            .unwrap_or(&self.arrangements[0])
    }

    /// Make `id` the active arrangement. Returns false (and changes nothing) for unknown ids.
    pub fn select(&mut self, id: &str) -> bool {
        if self.arrangement(id).is_none() {
            tracing::warn!(arrangement = %id, "cannot select unknown arrangement");
            return false;
        }
        self.active_id = id.to_string();
        true
    }

    /// Fork `source_id` and make the fork active.
    pub fn fork(&mut self, source_id: &str) -> Result<String> {
        let (next, id) = graph::fork(&self.arrangements, source_id, self.ids.as_mut())?;
        self.arrangements = next;
        self.active_id = id.clone();
        Ok(id)
    }

    pub fn fork_active(&mut self) -> Result<String> {
        let source = self.active_id.clone();
        self.fork(&source)
    }

    pub fn toggle_active_service(&mut self, service_id: &str) {
        self.arrangements =
            graph::toggle_service(&self.arrangements, &self.active_id, service_id, &self.catalog);
    }

    pub fn update_active_hypothesis(&mut self, text: &str) {
        self.arrangements = graph::update_hypothesis(&self.arrangements, &self.active_id, text);
    }

    pub fn cycle_active_status(&mut self, service_id: &str) {
        self.arrangements =
            graph::cycle_evaluation_status(&self.arrangements, &self.active_id, service_id);
    }

    pub fn evaluated_rules(&self, id: &str) -> Result<Vec<EvaluatedRule>> {
        self.arrangement(id)
            .map(get_evaluated_rules)
            .ok_or_else(|| CoreError::ArrangementNotFound { id: id.to_string() })
    }

    /// Compare arrangement `a` against `b`. An unknown `b` is treated as "not chosen yet".
    pub fn compare(&self, a: &str, b: Option<&str>) -> Result<Comparison> {
        let left = self
            .arrangement(a)
            .ok_or_else(|| CoreError::ArrangementNotFound { id: a.to_string() })?;
        let right = b.and_then(|id| self.arrangement(id));
        Ok(compare(left, right))
    }
}
