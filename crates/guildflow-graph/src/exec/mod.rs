//! Node execution.
//!
//! Each executable node kind has one async routine. A routine validates its
//! payload, resolves names against the session's local records, performs its
//! platform calls one at a time in list order, then reports what happened.
//! The engine stamps `executed_at` only when the routine completed and no item
//! failed; partial progress is written back into the node payload either way.

mod channels;
mod delete;
mod members;
mod messages;
mod roles;
mod session;

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use chrono::Utc;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use tracing::{debug, info, warn};

use guildflow_core::config::EngineConfig;
use guildflow_core::error::{GuildflowError, Result};
use guildflow_core::event::{EngineEvent, EventBus};
use guildflow_core::traits::{GuildClient, ResourceStore, SessionStore};
use guildflow_core::types::{ResourceKind, ResourceRecord, Session};

use crate::dynamic::ResolveContext;
use crate::node::NodeData;
use crate::resources::{resources_before, ResourceCatalog};
use crate::store::GraphStore;

/// One item of a batch that failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemFailure {
    pub item: String,
    pub error: String,
}

/// Outcome of executing one node.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExecutionReport {
    pub node_id: String,
    /// Whether the node is now marked executed.
    pub executed: bool,
    /// Items that succeeded during this run.
    pub succeeded: usize,
    pub failures: Vec<ItemFailure>,
    /// Local records written during this run.
    pub created: Vec<ResourceRecord>,
    /// Output handle a branching node activated.
    pub activated_handle: Option<String>,
    /// Nodes reachable through the activated handle.
    pub activated_targets: Vec<String>,
    /// Flag keys written to the session.
    pub flags_written: Vec<String>,
    pub elapsed_ms: u64,
}

impl ExecutionReport {
    fn new(node_id: &str) -> Self {
        Self {
            node_id: node_id.to_string(),
            ..Default::default()
        }
    }
}

/// Runs workflow nodes against a session.
pub struct Engine {
    client: Arc<dyn GuildClient>,
    resources: Arc<dyn ResourceStore>,
    sessions: Arc<dyn SessionStore>,
    events: Arc<EventBus>,
    rng: Mutex<StdRng>,
    member_page_size: u64,
}

impl Engine {
    pub fn new(
        client: Arc<dyn GuildClient>,
        resources: Arc<dyn ResourceStore>,
        sessions: Arc<dyn SessionStore>,
    ) -> Self {
        Self::with_config(client, resources, sessions, &EngineConfig::default())
    }

    pub fn with_config(
        client: Arc<dyn GuildClient>,
        resources: Arc<dyn ResourceStore>,
        sessions: Arc<dyn SessionStore>,
        config: &EngineConfig,
    ) -> Self {
        let rng = match config.shuffle_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            client,
            resources,
            sessions,
            events: Arc::new(EventBus::new(config.event_capacity)),
            rng: Mutex::new(rng),
            member_page_size: config.member_page_size,
        }
    }

    /// Reseed the shuffle RNG so runs are reproducible.
    pub fn with_seed(self, seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
            ..self
        }
    }

    pub fn with_events(self, events: Arc<EventBus>) -> Self {
        Self { events, ..self }
    }

    pub fn events(&self) -> Arc<EventBus> {
        Arc::clone(&self.events)
    }

    /// Execute one node.
    ///
    /// Validation and fail-fast resolution problems come back as `Err` and
    /// leave the node untouched. Per-item platform failures are listed in the
    /// report and leave the node re-runnable.
    pub async fn execute(
        &self,
        store: &mut GraphStore,
        session: &mut Session,
        node_id: &str,
    ) -> Result<ExecutionReport> {
        let start = Instant::now();
        let state = store.snapshot();
        let node = state
            .node(node_id)
            .ok_or_else(|| GuildflowError::NodeNotFound(node_id.to_string()))?;

        if !node.data.is_executable() {
            return Err(GuildflowError::NotExecutable {
                node_id: node_id.to_string(),
                kind: node.type_name().to_string(),
            });
        }
        if node.is_executed() {
            return Err(GuildflowError::AlreadyExecuted(node_id.to_string()));
        }

        info!(node_id, node_type = node.type_name(), session = %session.id, "Executing node");
        self.events.publish(EngineEvent::NodeStarted {
            node_id: node_id.to_string(),
        });

        let mut run = NodeRun {
            engine: self,
            session,
            node_id,
            catalog: resources_before(node_id, &state.nodes, &state.edges),
            report: ExecutionReport::new(node_id),
        };

        let mut data = node.data.clone();
        let complete = match &mut data {
            NodeData::Memo(_) => false,
            NodeData::ManualStep(_) => true,
            NodeData::RecordCombination(d) => {
                debug!(node_id, pairs = d.pairs.len(), "Finalizing pairing log");
                true
            }
            NodeData::CreateCategory(d) => channels::create_category(&mut run, d).await?,
            NodeData::CreateRole(d) => roles::create_roles(&mut run, d).await?,
            NodeData::CreateChannel(d) => channels::create_channels(&mut run, d).await?,
            NodeData::DeleteRole(d) => {
                delete::delete_resources(&mut run, ResourceKind::Role, d).await?
            }
            NodeData::DeleteChannel(d) => {
                delete::delete_resources(&mut run, ResourceKind::Channel, d).await?
            }
            NodeData::DeleteCategory(d) => {
                delete::delete_resources(&mut run, ResourceKind::Category, d).await?
            }
            NodeData::ChangeChannelPermission(d) => channels::change_permissions(&mut run, d).await?,
            NodeData::SendMessage(d) => messages::send_messages(&mut run, d).await?,
            NodeData::AddRoleToMembers(d) => members::add_role_to_members(&mut run, d).await?,
            NodeData::SetGameFlag(d) => session::set_flag(&mut run, d).await?,
            NodeData::SelectBranch(d) => session::select_branch(&mut run, d).await?,
            NodeData::ConditionalBranch(d) => session::conditional_branch(&mut run, d).await?,
            NodeData::ShuffleAssign(d) => session::shuffle_assign(&mut run, d).await?,
        };

        let mut report = run.report;
        report.executed = complete && report.failures.is_empty();
        if let Some(handle) = &report.activated_handle {
            report.activated_targets = state
                .targets_from(node_id, handle)
                .into_iter()
                .map(str::to_string)
                .collect();
        }

        store.commit_execution(node_id, data, report.executed.then(Utc::now))?;
        report.elapsed_ms = start.elapsed().as_millis() as u64;

        if report.executed {
            self.events.publish(EngineEvent::NodeExecuted {
                node_id: node_id.to_string(),
            });
            info!(
                node_id,
                succeeded = report.succeeded,
                elapsed_ms = report.elapsed_ms,
                "Node executed"
            );
        } else {
            warn!(
                node_id,
                succeeded = report.succeeded,
                failed = report.failures.len(),
                "Node left incomplete"
            );
        }
        Ok(report)
    }
}

/// Per-execution state shared by the node routines.
pub(crate) struct NodeRun<'a> {
    engine: &'a Engine,
    session: &'a mut Session,
    node_id: &'a str,
    catalog: ResourceCatalog,
    report: ExecutionReport,
}

impl NodeRun<'_> {
    fn client(&self) -> &dyn GuildClient {
        self.engine.client.as_ref()
    }

    fn store(&self) -> &dyn ResourceStore {
        self.engine.resources.as_ref()
    }

    fn guild_id(&self) -> String {
        self.session.guild_id.clone()
    }

    fn item_ok(&mut self, item: &str) {
        self.report.succeeded += 1;
        self.engine.events.publish(EngineEvent::ItemSucceeded {
            node_id: self.node_id.to_string(),
            item: item.to_string(),
        });
    }

    fn item_failed(&mut self, item: &str, error: &GuildflowError) {
        warn!(node_id = self.node_id, item, error = %error, "Item failed");
        self.engine.events.publish(EngineEvent::ItemFailed {
            node_id: self.node_id.to_string(),
            item: item.to_string(),
            error: error.to_string(),
        });
        self.report.failures.push(ItemFailure {
            item: item.to_string(),
            error: error.to_string(),
        });
    }

    fn progress(&self, current: usize, total: usize) {
        self.engine.events.publish(EngineEvent::Progress {
            node_id: self.node_id.to_string(),
            current,
            total,
        });
    }

    /// Record a created resource locally. A failed write counts as a failed item.
    async fn record(&mut self, item: &str, record: ResourceRecord) -> bool {
        let session_id = self.session.id.clone();
        let result = self.store().upsert_resource(&session_id, record.clone()).await;
        match result {
            Ok(()) => {
                self.report.created.push(record);
                true
            }
            Err(e) => {
                self.item_failed(item, &e);
                false
            }
        }
    }

    async fn records(&self, kind: ResourceKind) -> Result<Vec<ResourceRecord>> {
        self.store().list_resources(&self.session.id, kind).await
    }

    /// Names with a local record of `kind`.
    async fn recorded_names(&self, kind: ResourceKind) -> Result<HashSet<String>> {
        Ok(self.records(kind).await?.into_iter().map(|r| r.name).collect())
    }

    /// Map names to record ids, failing with every unknown name at once.
    async fn resolve_names(
        &self,
        kind: ResourceKind,
        names: &[String],
    ) -> Result<Vec<String>> {
        if names.is_empty() {
            return Ok(vec![]);
        }
        let by_name: HashMap<String, String> = self
            .records(kind)
            .await?
            .into_iter()
            .map(|r| (r.name, r.id))
            .collect();

        let mut ids = Vec::with_capacity(names.len());
        let mut missing = Vec::new();
        for name in names {
            match by_name.get(name.trim()) {
                Some(id) => ids.push(id.clone()),
                None => missing.push(name.clone()),
            }
        }
        if !missing.is_empty() {
            return Err(GuildflowError::Unresolved {
                kind,
                names: missing,
            });
        }
        Ok(ids)
    }

    /// Context for dynamic values: names produced upstream that have a local
    /// record, plus the session's name and flags.
    async fn resolve_context(&self) -> Result<ResolveContext> {
        let roles: HashMap<String, String> = self
            .records(ResourceKind::Role)
            .await?
            .into_iter()
            .filter(|r| self.catalog.has_role(&r.name))
            .map(|r| (r.name, r.id))
            .collect();
        let channels: HashMap<String, String> = self
            .records(ResourceKind::Channel)
            .await?
            .into_iter()
            .filter(|r| self.catalog.has_channel(&r.name))
            .map(|r| (r.name, r.id))
            .collect();

        Ok(ResolveContext {
            session_name: Some(self.session.name.clone()),
            roles,
            channels,
            game_flags: self.session.game_flags.clone(),
        })
    }

    /// Write flags into the session and persist the whole map.
    async fn write_flags(&mut self, flags: Vec<(String, String)>) -> Result<()> {
        if flags.is_empty() {
            return Ok(());
        }
        let keys: Vec<String> = flags.iter().map(|(k, _)| k.clone()).collect();
        for (key, value) in flags {
            debug!(node_id = self.node_id, key = %key, value = %value, "Setting flag");
            self.session.game_flags.insert(key, value);
        }
        self.engine
            .sessions
            .save_flags(&self.session.id, &self.session.game_flags)
            .await?;

        self.engine.events.publish(EngineEvent::FlagsChanged {
            session_id: self.session.id.to_string(),
            keys: keys.clone(),
        });
        self.report.flags_written.extend(keys);
        Ok(())
    }
}

/// Trimmed, non-blank entries of a name list, with their original positions.
pub(crate) fn valid_names(names: &[String]) -> Vec<(usize, String)> {
    names
        .iter()
        .enumerate()
        .filter_map(|(i, n)| {
            let trimmed = n.trim();
            (!trimmed.is_empty()).then(|| (i, trimmed.to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_names_keep_positions() {
        let names = vec!["GM".to_string(), "  ".into(), " Player ".into()];
        assert_eq!(
            valid_names(&names),
            vec![(0, "GM".to_string()), (2, "Player".to_string())]
        );
    }

    #[test]
    fn test_report_starts_empty() {
        let report = ExecutionReport::new("n1");
        assert_eq!(report.node_id, "n1");
        assert!(!report.executed);
        assert!(report.failures.is_empty());
    }
}
