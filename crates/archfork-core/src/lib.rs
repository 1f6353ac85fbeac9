pub mod compare;
pub mod error;
pub mod evaluate;
pub mod feed;
pub mod graph;
pub mod ids;
pub mod lineage;
pub mod session;
pub mod store;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

pub use compare::{compare, Comparison};
pub use error::{CoreError, Result};
pub use evaluate::{evaluate, get_evaluated_rules};
pub use ids::{IdAllocator, SequentialIds, UuidIds};
pub use session::Session;

/// Hypothesis text given to every freshly forked container.
pub const HYPOTHESIS_PLACEHOLDER: &str =
    "New hypothesis: describe what this arrangement is meant to prove.";

/// Suffix appended to a container's version label when it is forked.
pub const FORK_LABEL_SUFFIX: &str = ".1";

// --- Types ---

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, schemars::JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServiceType {
    Database,
    Api,
    Queue,
    Auth,
}

/// Evidence state of a service, always set by a human reviewer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, schemars::JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EvaluationStatus {
    Validated,
    Uncertain,
    Conflict,
}

impl EvaluationStatus {
    /// Next state in the review cycle: VALIDATED -> CONFLICT -> UNCERTAIN -> VALIDATED.
    pub fn next(self) -> Self {
        match self {
            EvaluationStatus::Validated => EvaluationStatus::Conflict,
            EvaluationStatus::Conflict => EvaluationStatus::Uncertain,
            EvaluationStatus::Uncertain => EvaluationStatus::Validated,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EvaluationStatus::Validated => "VALIDATED",
            EvaluationStatus::Uncertain => "UNCERTAIN",
            EvaluationStatus::Conflict => "CONFLICT",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, schemars::JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Critical,
    Warning,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, schemars::JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RuleStatus {
    Satisfied,
    Violated,
    NotEvaluable,
}

impl RuleStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RuleStatus::Satisfied => "SATISFIED",
            RuleStatus::Violated => "VIOLATED",
            RuleStatus::NotEvaluable => "NOT_EVALUABLE",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExternalService {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub service_type: ServiceType,
    /// Free-text capability claims, e.g. "DR RTO 48h". Rule matchers search these.
    #[serde(default)]
    pub contract_metrics: Vec<String>,
    #[serde(default)]
    pub is_experimental: bool,
    pub evaluation_status: EvaluationStatus,
}

impl ExternalService {
    /// Instantiate an independent copy of this service, e.g. from a catalog
    /// template or while forking an arrangement.
    pub fn instantiate(&self) -> Self {
        ExternalService {
            id: self.id.clone(),
            name: self.name.clone(),
            service_type: self.service_type,
            contract_metrics: self.contract_metrics.clone(),
            is_experimental: self.is_experimental,
            evaluation_status: self.evaluation_status,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Rule {
    pub id: String,
    pub description: String,
    pub severity: Severity,
    /// Case-insensitive substring searched for in service contract metrics.
    pub matcher: String,
}

/// A rule together with its verdict against one service set. Always derived, never stored.
#[derive(Debug, Clone, Serialize, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct EvaluatedRule {
    #[serde(flatten)]
    pub rule: Rule,
    pub status: RuleStatus,
    pub matching_services: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ContainerVersion {
    pub id: String,
    pub version_label: String,
    #[serde(default)]
    pub hypothesis: String,
    #[serde(default)]
    pub active_rules: Vec<Rule>,
}

impl ContainerVersion {
    /// Copy this container for a fork: new id, derived label, placeholder hypothesis.
    /// Rules are carried over as independent values.
    pub fn fork_copy(&self, new_id: String) -> Self {
        ContainerVersion {
            id: new_id,
            version_label: format!("{}{}", self.version_label, FORK_LABEL_SUFFIX),
            hypothesis: HYPOTHESIS_PLACEHOLDER.to_string(),
            active_rules: self.active_rules.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Arrangement {
    pub id: String,
    pub name: String,
    pub container: ContainerVersion,
    #[serde(default)]
    pub services: Vec<ExternalService>,
    /// Arrangement this one was forked from. Set once, at fork time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl Arrangement {
    pub fn service(&self, service_id: &str) -> Option<&ExternalService> {
        self.services.iter().find(|s| s.id == service_id)
    }

    pub fn has_service(&self, service_id: &str) -> bool {
        self.service(service_id).is_some()
    }
}

/// Find an arrangement by id in a collection.
pub fn find_arrangement<'a>(arrangements: &'a [Arrangement], id: &str) -> Option<&'a Arrangement> {
    arrangements.iter().find(|a| a.id == id)
}

// --- Settings ---

/// Resolve the global data directory (~/.archfork/).
pub fn data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".archfork")
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum IdStrategy {
    #[default]
    Sequential,
    Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catalog_path: Option<PathBuf>,
    #[serde(default)]
    pub id_strategy: IdStrategy,
}

impl Settings {
    /// Apply `ARCHFORK_SEED` / `ARCHFORK_CATALOG` overrides on top of the file values.
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(seed) = std::env::var_os("ARCHFORK_SEED") {
            self.seed_path = Some(PathBuf::from(seed));
        }
        if let Some(catalog) = std::env::var_os("ARCHFORK_CATALOG") {
            self.catalog_path = Some(PathBuf::from(catalog));
        }
        self
    }

    /// Build the id allocator this configuration asks for, continuing after
    /// any ids already present in `arrangements`.
    pub fn id_allocator(&self, arrangements: &[Arrangement]) -> Box<dyn IdAllocator + Send> {
        match self.id_strategy {
            IdStrategy::Sequential => Box::new(SequentialIds::after(arrangements)),
            IdStrategy::Uuid => Box::new(UuidIds),
        }
    }
}

fn settings_path() -> PathBuf {
    data_dir().join("settings.json")
}

/// Read `~/.archfork/settings.json`. Missing or unreadable settings fall back to defaults.
pub fn read_settings() -> Settings {
    let path = settings_path();
    if !path.exists() {
        return Settings::default();
    }
    match fs::read_to_string(&path) {
        Ok(raw) => parse_settings(&raw),
        Err(e) => {
            tracing::warn!(path = %path.display(), "cannot read settings, using defaults: {}", e);
            Settings::default()
        }
    }
}

/// Parse settings JSON, warning and falling back to defaults when it is malformed.
pub fn parse_settings(raw: &str) -> Settings {
    serde_json::from_str(raw).unwrap_or_else(|e| {
        tracing::warn!("malformed settings.json, using defaults: {}", e);
        Settings::default()
    })
}

pub fn write_settings(settings: &Settings) -> Result<()> {
    let dir = data_dir();
    fs::create_dir_all(&dir)?;
    let json = serde_json::to_string_pretty(settings)?;
    fs::write(settings_path(), json)?;
    Ok(())
}
