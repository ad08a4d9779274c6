use std::path::Path;
use std::sync::Arc;

use guildflow_core::traits::{ResourceStore, SessionStore};
use guildflow_core::types::{ResourceKind, Session};
use guildflow_graph::node::NodeData;
use guildflow_graph::{Engine, WorkflowDocument};
use guildflow_store::SqliteStore;
use guildflow_test_utils::{Call, MockGuildClient, TempWorkspace};

const WORKFLOW: &str = r#"{
  "version": 2,
  "nodes": [
    { "id": "roles", "type": "createRole", "data": { "roleNames": ["GM", "Player"] } },
    {
      "id": "channels",
      "type": "createChannel",
      "data": {
        "channels": [
          { "name": "table", "type": "text", "writerRoles": ["GM"], "readerRoles": ["Player"] }
        ]
      }
    },
    { "id": "note", "type": "memo", "data": { "text": "Run roles first" } }
  ],
  "edges": [
    { "id": "e1", "source": "roles", "target": "channels" }
  ]
}"#;

struct Setup {
    client: Arc<MockGuildClient>,
    db: Arc<SqliteStore>,
    engine: Engine,
    session: Session,
}

async fn setup(client: MockGuildClient) -> Setup {
    let client = Arc::new(client);
    let db = Arc::new(SqliteStore::in_memory().unwrap());
    let engine = Engine::new(client.clone(), db.clone(), db.clone()).with_seed(1);
    let session = Session::new("Friday game", "guild-1");
    db.save_session(&session).await.unwrap();
    Setup {
        client,
        db,
        engine,
        session,
    }
}

impl Setup {
    /// Load the document, run one node, and save whatever it produced.
    async fn run(&mut self, path: &Path, node_id: &str) -> guildflow_graph::ExecutionReport {
        let mut store = WorkflowDocument::load(path).unwrap().into_store().unwrap();
        let report = self
            .engine
            .execute(&mut store, &mut self.session, node_id)
            .await
            .unwrap();
        WorkflowDocument::from_state(store.state()).save(path).unwrap();
        report
    }
}

#[tokio::test]
async fn test_workflow_runs_across_saves() {
    let ws = TempWorkspace::new();
    let path = ws.write("game.json", WORKFLOW);
    let mut s = setup(MockGuildClient::new()).await;

    assert!(s.run(&path, "roles").await.executed);
    assert!(s.run(&path, "channels").await.executed);

    let doc = WorkflowDocument::load(&path).unwrap();
    assert!(doc.nodes.iter().filter(|n| n.id != "note").all(|n| n.executed_at.is_some()));
    assert!(doc.nodes.iter().any(|n| n.id == "note" && n.executed_at.is_none()));

    let channels = s
        .db
        .list_resources(&s.session.id, ResourceKind::Channel)
        .await
        .unwrap();
    assert_eq!(channels.len(), 1);
    let roles = s
        .db
        .list_resources(&s.session.id, ResourceKind::Role)
        .await
        .unwrap();
    let id_of = |name: &str| roles.iter().find(|r| r.name == name).unwrap().id.clone();
    assert_eq!(channels[0].writer_role_ids, vec![id_of("GM")]);
    assert_eq!(channels[0].reader_role_ids, vec![id_of("Player")]);
}

#[tokio::test]
async fn test_partial_progress_survives_reload() {
    let ws = TempWorkspace::new();
    let path = ws.write("game.json", WORKFLOW);
    let client = MockGuildClient::new();
    client.fail_times("Player", 1);
    let mut s = setup(client).await;

    let first = s.run(&path, "roles").await;
    assert!(!first.executed);

    let doc = WorkflowDocument::load(&path).unwrap();
    let roles = doc.nodes.iter().find(|n| n.id == "roles").unwrap();
    assert!(roles.executed_at.is_none());
    let NodeData::CreateRole(data) = &roles.data else {
        panic!("roles node changed type");
    };
    assert_eq!(data.created.len(), 1);
    assert_eq!(data.created[0].name, "GM");

    assert!(s.run(&path, "roles").await.executed);
    let creates: Vec<_> = s
        .client
        .calls()
        .into_iter()
        .filter_map(|c| match c {
            Call::CreateRole { name } => Some(name),
            _ => None,
        })
        .collect();
    assert_eq!(creates, vec!["GM", "Player", "Player"]);
}

#[tokio::test]
async fn test_reset_clears_saved_results() {
    let ws = TempWorkspace::new();
    let path = ws.write("game.json", WORKFLOW);
    let mut s = setup(MockGuildClient::new()).await;
    s.run(&path, "roles").await;

    let mut store = WorkflowDocument::load(&path).unwrap().into_store().unwrap();
    store.reset_execution();
    WorkflowDocument::from_state(store.state()).save(&path).unwrap();

    let doc = WorkflowDocument::load(&path).unwrap();
    let roles = doc.nodes.iter().find(|n| n.id == "roles").unwrap();
    assert!(roles.executed_at.is_none());
    assert_eq!(
        roles.data,
        NodeData::CreateRole(guildflow_graph::node::CreateRoleData {
            role_names: vec!["GM".into(), "Player".into()],
            created: vec![],
        })
    );
}
