//! Version graph operations.
//!
//! Every operation takes the current arrangement collection and returns a
//! complete new one. Arrangements already in the input are never modified;
//! the target arrangement is rebuilt and swapped in. Unknown arrangement or
//! service ids leave the collection unchanged.

use chrono::Utc;

use crate::error::{CoreError, Result};
use crate::ids::IdAllocator;
use crate::{find_arrangement, Arrangement, ExternalService};

/// Rebuild the arrangement `id` with `edit`, keeping every other arrangement as is.
/// `edit` returning `None` means "nothing to change".
fn replace_arrangement<F>(arrangements: &[Arrangement], id: &str, edit: F) -> Vec<Arrangement>
where
    F: FnOnce(&Arrangement) -> Option<Arrangement>,
{
    let Some(pos) = arrangements.iter().position(|a| a.id == id) else {
        tracing::warn!(arrangement = %id, "arrangement not found, ignoring edit");
        return arrangements.to_vec();
    };
    let mut next = arrangements.to_vec();
    if let Some(replacement) = edit(&arrangements[pos]) {
        next[pos] = replacement;
    }
    next
}

fn allocate_unique(arrangements: &[Arrangement], ids: &mut dyn IdAllocator, prefix: &str) -> String {
    loop {
        let id = ids.next_id(prefix);
        let taken = arrangements
            .iter()
            .any(|a| a.id == id || a.container.id == id);
        if !taken {
            return id;
        }
    }
}

/// Fork `source_id` into a new arrangement and append it to the collection.
///
/// Returns the new collection and the id of the fork, which becomes the
/// active arrangement for the caller.
pub fn fork(
    arrangements: &[Arrangement],
    source_id: &str,
    ids: &mut dyn IdAllocator,
) -> Result<(Vec<Arrangement>, String)> {
    let source = find_arrangement(arrangements, source_id).ok_or_else(|| {
        CoreError::ArrangementNotFound {
            id: source_id.to_string(),
        }
    })?;

    let id = allocate_unique(arrangements, ids, "arr");
    let container_id = allocate_unique(arrangements, ids, "ctr");

    let forked = Arrangement {
        id: id.clone(),
        name: format!("{} (fork)", source.name),
        container: source.container.fork_copy(container_id),
        services: source.services.iter().map(ExternalService::instantiate).collect(),
        parent_id: Some(source.id.clone()),
        created_at: Utc::now(),
    };

    tracing::info!(
        source = %source.id,
        fork = %forked.id,
        label = %forked.container.version_label,
        "forked arrangement"
    );

    let mut next = arrangements.to_vec();
    next.push(forked);
    Ok((next, id))
}

/// Remove `service_id` from the arrangement if present, otherwise add a fresh
/// instance of the matching catalog template.
pub fn toggle_service(
    arrangements: &[Arrangement],
    arrangement_id: &str,
    service_id: &str,
    catalog: &[ExternalService],
) -> Vec<Arrangement> {
    replace_arrangement(arrangements, arrangement_id, |current| {
        let mut updated = current.clone();
        if current.has_service(service_id) {
            updated.services.retain(|s| s.id != service_id);
            tracing::info!(arrangement = %arrangement_id, service = %service_id, "removed service");
        } else {
            let Some(template) = catalog.iter().find(|s| s.id == service_id) else {
                tracing::warn!(service = %service_id, "service not in catalog, ignoring toggle");
                return None;
            };
            updated.services.push(template.instantiate());
            tracing::info!(arrangement = %arrangement_id, service = %service_id, "added service");
        }
        Some(updated)
    })
}

/// Replace the hypothesis text of the arrangement's container.
pub fn update_hypothesis(arrangements: &[Arrangement], arrangement_id: &str, text: &str) -> Vec<Arrangement> {
    replace_arrangement(arrangements, arrangement_id, |current| {
        let mut updated = current.clone();
        updated.container.hypothesis = text.to_string();
        Some(updated)
    })
}

/// Advance one service's evaluation status: VALIDATED -> CONFLICT -> UNCERTAIN -> VALIDATED.
pub fn cycle_evaluation_status(
    arrangements: &[Arrangement],
    arrangement_id: &str,
    service_id: &str,
) -> Vec<Arrangement> {
    replace_arrangement(arrangements, arrangement_id, |current| {
        let mut updated = current.clone();
        let Some(service) = updated.services.iter_mut().find(|s| s.id == service_id) else {
            tracing::warn!(arrangement = %arrangement_id, service = %service_id, "service not in arrangement");
            return None;
        };
        let from = service.evaluation_status;
        service.evaluation_status = from.next();
        tracing::info!(
            arrangement = %arrangement_id,
            service = %service_id,
            from = from.as_str(),
            to = service.evaluation_status.as_str(),
            "cycled evaluation status"
        );
        Some(updated)
    })
}
