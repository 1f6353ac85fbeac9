//! Loading of the external seed and catalog feeds.
//!
//! Malformed data is rejected here, at load time, so evaluation never sees it.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use crate::error::{CoreError, Result};
use crate::{Arrangement, ExternalService, Rule};

/// Parse and validate a seed feed: a JSON array of arrangements.
pub fn load_seed(raw: &str) -> Result<Vec<Arrangement>> {
    let arrangements: Vec<Arrangement> = serde_json::from_str(raw)?;
    validate_seed(&arrangements)?;
    tracing::info!(arrangements = arrangements.len(), "loaded seed feed");
    Ok(arrangements)
}

/// Parse and validate a catalog feed: a JSON array of service templates.
pub fn load_catalog(raw: &str) -> Result<Vec<ExternalService>> {
    let catalog: Vec<ExternalService> = serde_json::from_str(raw)?;
    validate_services(&catalog, "catalog")?;
    tracing::info!(services = catalog.len(), "loaded service catalog");
    Ok(catalog)
}

/// JSON schema of a seed feed, for tools that author one.
pub fn seed_schema() -> Result<serde_json::Value> {
    Ok(serde_json::to_value(schemars::schema_for!(Vec<Arrangement>))?)
}

/// JSON schema of a catalog feed.
pub fn catalog_schema() -> Result<serde_json::Value> {
    Ok(serde_json::to_value(schemars::schema_for!(Vec<ExternalService>))?)
}

pub fn load_seed_file(path: &Path) -> Result<Vec<Arrangement>> {
    load_seed(&fs::read_to_string(path)?)
}

pub fn load_catalog_file(path: &Path) -> Result<Vec<ExternalService>> {
    load_catalog(&fs::read_to_string(path)?)
}

pub fn validate_seed(arrangements: &[Arrangement]) -> Result<()> {
    if arrangements.is_empty() {
        return Err(CoreError::invalid_feed("seed must contain at least one arrangement"));
    }

    let mut ids = HashSet::new();
    for arr in arrangements {
        if !ids.insert(arr.id.as_str()) {
            return Err(CoreError::invalid_feed(format!("duplicate arrangement id '{}'", arr.id)));
        }
    }

    for arr in arrangements {
        if let Some(pid) = &arr.parent_id {
            if !ids.contains(pid.as_str()) {
                return Err(CoreError::invalid_feed(format!(
                    "arrangement '{}' references unknown parent '{}'",
                    arr.id, pid
                )));
            }
        }
        validate_rules(&arr.container.active_rules, &arr.id)?;
        validate_services(&arr.services, &format!("arrangement '{}'", arr.id))?;
    }
    Ok(())
}

fn validate_rules(rules: &[Rule], owner: &str) -> Result<()> {
    let mut ids = HashSet::new();
    for rule in rules {
        if rule.matcher.trim().is_empty() {
            return Err(CoreError::invalid_feed(format!(
                "rule '{}' in arrangement '{}' has an empty matcher",
                rule.id, owner
            )));
        }
        if !ids.insert(rule.id.as_str()) {
            return Err(CoreError::invalid_feed(format!(
                "duplicate rule id '{}' in arrangement '{}'",
                rule.id, owner
            )));
        }
    }
    Ok(())
}

fn validate_services(services: &[ExternalService], owner: &str) -> Result<()> {
    let mut ids = HashSet::new();
    for svc in services {
        if svc.id.trim().is_empty() {
            return Err(CoreError::invalid_feed(format!("service with empty id in {}", owner)));
        }
        if !ids.insert(svc.id.as_str()) {
            return Err(CoreError::invalid_feed(format!(
                "duplicate service id '{}' in {}",
                svc.id, owner
            )));
        }
    }
    Ok(())
}
