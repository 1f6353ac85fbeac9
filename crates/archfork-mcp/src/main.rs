use archfork_core::store::SessionStore;
use archfork_core::{lineage, Arrangement, Comparison, EvaluatedRule, Session, Settings};
use rmcp::{
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::{CallToolResult, Content, ServerCapabilities, ServerInfo},
    schemars, tool, tool_handler, tool_router, ErrorData as McpError, ServerHandler, ServiceExt,
};
use serde::Deserialize;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

// --- Request types ---

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct ArrangementRequest {
    /// ID of the arrangement (e.g. "arr-2"). Defaults to the active arrangement.
    id: Option<String>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct SelectRequest {
    /// ID of the arrangement to make active
    id: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct ForkRequest {
    /// ID of the arrangement to fork. Defaults to the active arrangement.
    source_id: Option<String>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct ServiceRequest {
    /// ID of the service (e.g. "svc-postgres"). For toggle_service, adding requires the ID to exist in the catalog.
    service_id: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct HypothesisRequest {
    /// New hypothesis text for the active arrangement's container
    text: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct CompareRequest {
    /// Left-hand arrangement. Defaults to the active arrangement.
    a: Option<String>,
    /// Right-hand arrangement. Omit to get an empty comparison.
    b: Option<String>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "lowercase")]
enum FeedKind {
    Seed,
    Catalog,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct FeedSchemaRequest {
    /// Which feed: "seed" (arrangements) or "catalog" (service templates)
    feed: FeedKind,
}

// --- Server ---

#[derive(Clone)]
pub struct ArchforkServer {
    session: Arc<Mutex<Session>>,
    store: SessionStore,
    tool_router: ToolRouter<Self>,
}

impl ArchforkServer {
    fn lock(&self) -> Result<MutexGuard<'_, Session>, McpError> {
        self.session
            .lock()
            .map_err(|_| McpError::internal_error("session lock poisoned", None))
    }

    /// Persist after an edit. The edit itself has already been applied.
    fn persist(&self, session: &Session) -> Option<String> {
        match self.store.save(&session.snapshot()) {
            Ok(()) => None,
            Err(e) => {
                tracing::warn!("failed to save session: {}", e);
                Some(format!("\n(warning: session not saved: {})", e))
            }
        }
    }
}

#[tool_router]
impl ArchforkServer {
    pub fn new(session: Session, store: SessionStore) -> Self {
        Self {
            session: Arc::new(Mutex::new(session)),
            store,
            tool_router: Self::tool_router(),
        }
    }

    #[tool(description = "List all arrangements. The active one is marked with '*'.")]
    fn list_arrangements(&self) -> Result<CallToolResult, McpError> {
        let session = self.lock()?;
        let text = session
            .arrangements()
            .iter()
            .map(|a| arrangement_line(a, a.id == session.active_id()))
            .collect::<Vec<_>>()
            .join("\n");
        Ok(CallToolResult::success(vec![Content::text(text)]))
    }

    #[tool(
        description = "Get the full JSON of an arrangement together with its freshly evaluated rules. Returns {arrangement: {id, name, parentId?, createdAt, container: {id, versionLabel, hypothesis, activeRules}, services: [...]}, evaluatedRules: [{id, description, severity, matcher, status, matchingServices}]}."
    )]
    fn get_arrangement(
        &self,
        Parameters(req): Parameters<ArrangementRequest>,
    ) -> Result<CallToolResult, McpError> {
        let session = self.lock()?;
        let id = req.id.unwrap_or_else(|| session.active_id().to_string());
        let Some(arrangement) = session.arrangement(&id) else {
            return Ok(CallToolResult::error(vec![Content::text(format!(
                "Arrangement '{}' not found",
                id
            ))]));
        };
        let val = serde_json::json!({
            "arrangement": arrangement,
            "evaluatedRules": archfork_core::get_evaluated_rules(arrangement),
        });
        let json = serde_json::to_string_pretty(&val)
            .unwrap_or_else(|e| format!("Serialization error: {}", e));
        Ok(CallToolResult::success(vec![Content::text(json)]))
    }

    #[tool(description = "Make an arrangement the active one. Edits always apply to the active arrangement.")]
    fn select_arrangement(
        &self,
        Parameters(req): Parameters<SelectRequest>,
    ) -> Result<CallToolResult, McpError> {
        let mut session = self.lock()?;
        if !session.select(&req.id) {
            return Ok(CallToolResult::error(vec![Content::text(format!(
                "Arrangement '{}' not found",
                req.id
            ))]));
        }
        let warning = self.persist(&session).unwrap_or_default();
        Ok(CallToolResult::success(vec![Content::text(format!(
            "Active arrangement is now {}{}",
            req.id, warning
        ))]))
    }

    #[tool(
        description = "Evaluate every rule of an arrangement against its current services. Verdicts: SATISFIED, VIOLATED, NOT_EVALUABLE. Evidence states are never resolved automatically; use cycle_evaluation_status to record a judgment."
    )]
    fn evaluate_rules(
        &self,
        Parameters(req): Parameters<ArrangementRequest>,
    ) -> Result<CallToolResult, McpError> {
        let session = self.lock()?;
        let id = req.id.unwrap_or_else(|| session.active_id().to_string());
        match session.evaluated_rules(&id) {
            Ok(rules) => Ok(CallToolResult::success(vec![Content::text(render_rules(&rules))])),
            Err(e) => Ok(CallToolResult::error(vec![Content::text(e.to_string())])),
        }
    }

    #[tool(description = "List the service catalog. Services present in the active arrangement are marked with '+'.")]
    fn list_catalog(&self) -> Result<CallToolResult, McpError> {
        let session = self.lock()?;
        if session.catalog().is_empty() {
            return Ok(CallToolResult::success(vec![Content::text(
                "Catalog is empty. Configure catalogPath in ~/.archfork/settings.json.",
            )]));
        }
        let active = session.active();
        let text = session
            .catalog()
            .iter()
            .map(|s| {
                format!(
                    "{} {} \"{}\" ({:?}{}) metrics: {}",
                    if active.has_service(&s.id) { "+" } else { " " },
                    s.id,
                    s.name,
                    s.service_type,
                    if s.is_experimental { ", experimental" } else { "" },
                    s.contract_metrics.join("; ")
                )
            })
            .collect::<Vec<_>>()
            .join("\n");
        Ok(CallToolResult::success(vec![Content::text(text)]))
    }

    #[tool(
        description = "Fork an arrangement. The fork gets independent copies of every service and the container, a derived version label (e.g. v1.0 -> v1.0.1), a placeholder hypothesis, and becomes the active arrangement."
    )]
    fn fork_arrangement(
        &self,
        Parameters(req): Parameters<ForkRequest>,
    ) -> Result<CallToolResult, McpError> {
        let mut session = self.lock()?;
        let source = req
            .source_id
            .unwrap_or_else(|| session.active_id().to_string());
        match session.fork(&source) {
            Ok(id) => {
                let warning = self.persist(&session).unwrap_or_default();
                let label = session
                    .arrangement(&id)
                    .map(|a| a.container.version_label.clone())
                    .unwrap_or_default();
                Ok(CallToolResult::success(vec![Content::text(format!(
                    "Forked {} into {} ({}). {} is now active.{}",
                    source, id, label, id, warning
                ))]))
            }
            Err(e) => Ok(CallToolResult::error(vec![Content::text(e.to_string())])),
        }
    }

    #[tool(
        description = "Add or remove a service on the active arrangement. Present services are removed; absent ones are added as a fresh copy of the catalog entry."
    )]
    fn toggle_service(
        &self,
        Parameters(req): Parameters<ServiceRequest>,
    ) -> Result<CallToolResult, McpError> {
        let mut session = self.lock()?;
        let had = session.active().has_service(&req.service_id);
        session.toggle_active_service(&req.service_id);
        let has = session.active().has_service(&req.service_id);

        let outcome = match (had, has) {
            (true, false) => format!("Removed {} from {}", req.service_id, session.active_id()),
            (false, true) => format!("Added {} to {}", req.service_id, session.active_id()),
            _ => {
                return Ok(CallToolResult::error(vec![Content::text(format!(
                    "Service '{}' is not in the catalog",
                    req.service_id
                ))]));
            }
        };
        let warning = self.persist(&session).unwrap_or_default();
        Ok(CallToolResult::success(vec![Content::text(format!("{}{}", outcome, warning))]))
    }

    #[tool(description = "Replace the hypothesis text of the active arrangement's container")]
    fn update_hypothesis(
        &self,
        Parameters(req): Parameters<HypothesisRequest>,
    ) -> Result<CallToolResult, McpError> {
        let mut session = self.lock()?;
        session.update_active_hypothesis(&req.text);
        let warning = self.persist(&session).unwrap_or_default();
        Ok(CallToolResult::success(vec![Content::text(format!(
            "Updated hypothesis of {}{}",
            session.active_id(),
            warning
        ))]))
    }

    #[tool(
        description = "Advance a service's evaluation status on the active arrangement: VALIDATED -> CONFLICT -> UNCERTAIN -> VALIDATED"
    )]
    fn cycle_evaluation_status(
        &self,
        Parameters(req): Parameters<ServiceRequest>,
    ) -> Result<CallToolResult, McpError> {
        let mut session = self.lock()?;
        if !session.active().has_service(&req.service_id) {
            return Ok(CallToolResult::error(vec![Content::text(format!(
                "Service '{}' is not part of {}",
                req.service_id,
                session.active_id()
            ))]));
        }
        session.cycle_active_status(&req.service_id);
        let status = session
            .active()
            .service(&req.service_id)
            .map(|s| s.evaluation_status.as_str())
            .unwrap_or("unknown");
        let warning = self.persist(&session).unwrap_or_default();
        Ok(CallToolResult::success(vec![Content::text(format!(
            "{} is now {}{}",
            req.service_id, status, warning
        ))]))
    }

    #[tool(
        description = "Compare two arrangements: services only in A, only in B, in both (A's copy, with status differences noted), and each side's rule verdicts evaluated independently."
    )]
    fn compare_arrangements(
        &self,
        Parameters(req): Parameters<CompareRequest>,
    ) -> Result<CallToolResult, McpError> {
        let session = self.lock()?;
        let a = req.a.unwrap_or_else(|| session.active_id().to_string());
        let cmp = match session.compare(&a, req.b.as_deref()) {
            Ok(cmp) => cmp,
            Err(e) => return Ok(CallToolResult::error(vec![Content::text(e.to_string())])),
        };
        let b = req.b.as_deref().and_then(|id| session.arrangement(id));
        let text = comparison_report(&a, req.b.as_deref(), b, &cmp);
        Ok(CallToolResult::success(vec![Content::text(text)]))
    }

    #[tool(description = "Show where an arrangement sits in the fork forest: its ancestors (nearest first) and direct forks")]
    fn get_lineage(
        &self,
        Parameters(req): Parameters<ArrangementRequest>,
    ) -> Result<CallToolResult, McpError> {
        let session = self.lock()?;
        let id = req.id.unwrap_or_else(|| session.active_id().to_string());
        let all = session.arrangements();
        let Some(target) = session.arrangement(&id) else {
            return Ok(CallToolResult::error(vec![Content::text(format!(
                "Arrangement '{}' not found",
                id
            ))]));
        };

        let mut lines = vec![arrangement_line(target, target.id == session.active_id())];
        lines.push(format!("Depth: {}", lineage::lineage_depth(all, &id)));

        let ancestors = lineage::ancestors(all, &id);
        if !ancestors.is_empty() {
            lines.push(format!("Ancestors ({}):", ancestors.len()));
            lines.extend(ancestors.iter().map(|a| format!("  - {} \"{}\"", a.id, a.name)));
        }
        let children = lineage::children(all, &id);
        if !children.is_empty() {
            lines.push(format!("Forks ({}):", children.len()));
            lines.extend(children.iter().map(|a| format!("  - {} \"{}\"", a.id, a.name)));
        }
        Ok(CallToolResult::success(vec![Content::text(lines.join("\n"))]))
    }

    #[tool(description = "Get the JSON schema of the seed or catalog feed, for authoring new feed files")]
    fn get_feed_schema(
        &self,
        Parameters(req): Parameters<FeedSchemaRequest>,
    ) -> Result<CallToolResult, McpError> {
        let schema = match req.feed {
            FeedKind::Seed => archfork_core::feed::seed_schema(),
            FeedKind::Catalog => archfork_core::feed::catalog_schema(),
        }
        .map_err(|e| McpError::internal_error(e.to_string(), None))?;
        let json = serde_json::to_string_pretty(&schema)
            .map_err(|e| McpError::internal_error(e.to_string(), None))?;
        Ok(CallToolResult::success(vec![Content::text(json)]))
    }
}

#[tool_handler]
impl ServerHandler for ArchforkServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(INSTRUCTIONS.into()),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}

// --- Helpers ---

fn arrangement_line(a: &Arrangement, active: bool) -> String {
    let mut line = format!(
        "{} {} \"{}\" {} ({} services",
        if active { "*" } else { " " },
        a.id,
        a.name,
        a.container.version_label,
        a.services.len()
    );
    if let Some(pid) = &a.parent_id {
        line.push_str(&format!(", parent={}", pid));
    }
    line.push(')');
    line
}

fn render_rules(rules: &[EvaluatedRule]) -> String {
    if rules.is_empty() {
        return "No active rules.".to_string();
    }
    rules
        .iter()
        .map(|er| {
            let evidence = if er.matching_services.is_empty() {
                "no evidence".to_string()
            } else {
                er.matching_services.join(", ")
            };
            format!(
                "[{}] {} ({:?}) \"{}\" matcher=\"{}\" | {}",
                er.status.as_str(),
                er.rule.id,
                er.rule.severity,
                er.rule.description,
                er.rule.matcher,
                evidence
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// `b_id` is what the caller asked for; `b` is `None` when it names no arrangement.
fn comparison_report(a_id: &str, b_id: Option<&str>, b: Option<&Arrangement>, cmp: &Comparison) -> String {
    match (b_id, b) {
        (_, Some(b)) => render_comparison(a_id, b, cmp),
        (Some(id), None) => format!("Arrangement '{}' not found; nothing to compare against.", id),
        (None, None) => "No comparison target selected. Pass b to compare.".to_string(),
    }
}

fn render_comparison(a_id: &str, b: &Arrangement, cmp: &Comparison) -> String {
    let mut sections: Vec<String> = Vec::new();

    if !cmp.unique_to_a.is_empty() {
        let mut lines = vec![format!("Only in {} ({}):", a_id, cmp.unique_to_a.len())];
        for s in &cmp.unique_to_a {
            lines.push(format!("  - {} \"{}\" {}", s.id, s.name, s.evaluation_status.as_str()));
        }
        sections.push(lines.join("\n"));
    }

    if !cmp.unique_to_b.is_empty() {
        let mut lines = vec![format!("Only in {} ({}):", b.id, cmp.unique_to_b.len())];
        for s in &cmp.unique_to_b {
            lines.push(format!("  - {} \"{}\" {}", s.id, s.name, s.evaluation_status.as_str()));
        }
        sections.push(lines.join("\n"));
    }

    if !cmp.common.is_empty() {
        let mut lines = vec![format!("In both ({}):", cmp.common.len())];
        for s in &cmp.common {
            let mut detail = format!("  - {} \"{}\" {}", s.id, s.name, s.evaluation_status.as_str());
            if let Some(other) = b.service(&s.id) {
                if other.evaluation_status != s.evaluation_status {
                    detail.push_str(&format!(" (in {}: {})", b.id, other.evaluation_status.as_str()));
                }
            }
            lines.push(detail);
        }
        sections.push(lines.join("\n"));
    }

    sections.push(format!("Rules of {}:\n{}", a_id, render_rules(&cmp.evaluated_rules_a)));
    sections.push(format!("Rules of {}:\n{}", b.id, render_rules(&cmp.evaluated_rules_b)));

    sections.join("\n\n")
}

const INSTRUCTIONS: &str = r#"archfork records competing architecture hypotheses as arrangements of external services and evaluates declarative rules against each arrangement's evidence.

Concepts:
- An arrangement = one container version (version label, hypothesis, active rules) + a set of services.
- Each service carries contract metrics (free text) and an evaluation status: VALIDATED, UNCERTAIN or CONFLICT. Statuses are human judgments; never change them without the user's say-so.
- A rule matches services whose metrics contain its matcher (case-insensitive substring). CRITICAL rules without evidence are VIOLATED; WARNING rules without evidence are NOT_EVALUABLE. Any CONFLICT evidence violates a rule; any UNCERTAIN evidence makes it NOT_EVALUABLE.

Workflow:
1. `list_arrangements` and `evaluate_rules` to see where things stand.
2. `fork_arrangement` before exploring an alternative; edits only ever touch the active arrangement.
3. `toggle_service` (see `list_catalog`), `cycle_evaluation_status` and `update_hypothesis` to edit.
4. `compare_arrangements` to contrast two snapshots.

`get_feed_schema` describes the seed and catalog file formats.
"#;

const DEFAULT_LOG_FILTER: &str = "archfork_mcp=info,archfork_core=info";

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    // stdout carries the MCP transport; logs go to stderr.
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_ansi(false)
                .compact(),
        )
        .init();
}

/// Resume the stored session, or start a new one from the seed feed.
fn bootstrap(settings: &Settings, store: &SessionStore) -> Result<Session, Box<dyn std::error::Error>> {
    let catalog = match &settings.catalog_path {
        Some(path) => archfork_core::feed::load_catalog_file(path)?,
        None => {
            tracing::warn!("no catalog configured, toggle_service can only remove services");
            Vec::new()
        }
    };

    if let Some(snapshot) = store.load()? {
        let ids = settings.id_allocator(&snapshot.arrangements);
        return Ok(Session::from_snapshot(snapshot, catalog, ids)?);
    }

    let seed_path = settings.seed_path.as_deref().ok_or(
        "no seed feed configured: set seedPath in ~/.archfork/settings.json or ARCHFORK_SEED",
    )?;
    let arrangements = archfork_core::feed::load_seed_file(seed_path)?;
    let ids = settings.id_allocator(&arrangements);
    let session = Session::new(arrangements, catalog, ids)?;
    store.save(&session.snapshot())?;
    Ok(session)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();

    let store = SessionStore::default();

    // `archfork-mcp reset` discards the stored session so the next start reloads the seed.
    if std::env::args().nth(1).as_deref() == Some("reset") {
        store.clear()?;
        tracing::info!(path = %store.path().display(), "cleared stored session");
        return Ok(());
    }

    let settings = archfork_core::read_settings().with_env_overrides();
    let session = bootstrap(&settings, &store)?;
    tracing::info!(active = %session.active_id(), "archfork-mcp ready");

    let service = ArchforkServer::new(session, store)
        .serve(rmcp::transport::io::stdio())
        .await
        .inspect_err(|e| tracing::error!("MCP server error: {}", e))?;
    service.waiting().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use archfork_core::SequentialIds;

    fn session() -> Session {
        let arrangements = archfork_core::feed::load_seed(
            r#"[{
                "id": "arr-1",
                "name": "Cloud first",
                "container": {
                    "id": "ctr-1",
                    "versionLabel": "v1.0",
                    "activeRules": [
                        { "id": "r-dr", "description": "Disaster recovery", "severity": "CRITICAL", "matcher": "DR" },
                        { "id": "r-cost", "description": "Cost", "severity": "WARNING", "matcher": "cost" }
                    ]
                },
                "services": [
                    { "id": "svc-db", "name": "Aurora", "type": "DATABASE",
                      "contractMetrics": ["DR RTO 48h"], "evaluationStatus": "VALIDATED" }
                ]
            }]"#,
        )
        .unwrap();
        let ids = Box::new(SequentialIds::after(&arrangements));
        Session::new(arrangements, vec![], ids).unwrap()
    }

    #[test]
    fn rules_report_lists_verdicts_and_evidence() {
        let s = session();
        let text = render_rules(&s.evaluated_rules("arr-1").unwrap());
        assert!(text.contains("[SATISFIED] r-dr"));
        assert!(text.contains("Aurora"));
        assert!(text.contains("[NOT_EVALUABLE] r-cost"));
        assert!(text.contains("no evidence"));
    }

    #[test]
    fn comparison_report_notes_status_divergence() {
        let mut s = session();
        let fork_id = s.fork_active().unwrap();
        s.cycle_active_status("svc-db");
        let cmp = s.compare("arr-1", Some(&fork_id)).unwrap();
        let b = s.arrangement(&fork_id).unwrap();
        let text = render_comparison("arr-1", b, &cmp);
        assert!(text.contains("In both (1):"));
        assert!(text.contains(&format!("(in {}: CONFLICT)", fork_id)));
        assert!(text.contains("[VIOLATED] r-dr"));
    }

    #[test]
    fn comparison_with_unknown_target_names_it() {
        let s = session();
        let cmp = s.compare("arr-1", Some("arr-404")).unwrap();
        let text = comparison_report("arr-1", Some("arr-404"), s.arrangement("arr-404"), &cmp);
        assert!(text.contains("'arr-404' not found"));
        assert!(!text.contains("No comparison target selected"));

        let cmp = s.compare("arr-1", None).unwrap();
        let text = comparison_report("arr-1", None, None, &cmp);
        assert!(text.starts_with("No comparison target selected"));
    }

    #[test]
    fn default_log_filter_covers_both_crates() {
        assert!(EnvFilter::try_new(DEFAULT_LOG_FILTER).is_ok());
        assert!(DEFAULT_LOG_FILTER.contains("archfork_core=info"));
        assert!(DEFAULT_LOG_FILTER.contains("archfork_mcp=info"));
    }

    #[test]
    fn arrangement_line_marks_active_and_parent() {
        let mut s = session();
        let fork_id = s.fork_active().unwrap();
        let line = arrangement_line(s.active(), true);
        assert!(line.starts_with(&format!("* {}", fork_id)));
        assert!(line.contains("v1.0.1"));
        assert!(line.contains("parent=arr-1"));
    }
}
