use std::sync::Arc;

use guildflow_core::error::GuildflowError;
use guildflow_core::event::EngineEvent;
use guildflow_core::traits::SessionStore;
use guildflow_core::types::{ChannelType, ResourceKind, ResourceRecord, Session};
use guildflow_graph::condition::{Condition, ConditionList, ConditionOperator};
use guildflow_graph::node::*;
use guildflow_graph::{DynamicValue, Engine, GraphStore, Node};
use guildflow_test_utils::{bot, member, Call, MemoryStore, MockGuildClient};

struct Harness {
    client: Arc<MockGuildClient>,
    store: Arc<MemoryStore>,
    engine: Engine,
    graph: GraphStore,
    session: Session,
}

async fn harness(client: MockGuildClient) -> Harness {
    let client = Arc::new(client);
    let store = Arc::new(MemoryStore::new());
    let engine = Engine::new(client.clone(), store.clone(), store.clone()).with_seed(7);
    let session = Session::new("Friday game", "guild-1");
    store.save_session(&session).await.unwrap();
    Harness {
        client,
        store,
        engine,
        graph: GraphStore::new(),
        session,
    }
}

impl Harness {
    fn add(&mut self, node: Node) {
        self.graph.add_node(node).unwrap();
    }

    fn connect(&mut self, source: &str, target: &str) {
        self.graph.connect(source, target, None).unwrap();
    }

    async fn run(&mut self, node_id: &str) -> guildflow_core::Result<guildflow_graph::ExecutionReport> {
        self.engine
            .execute(&mut self.graph, &mut self.session, node_id)
            .await
    }

    fn records(&self, kind: ResourceKind) -> Vec<ResourceRecord> {
        self.store
            .all(&self.session.id)
            .into_iter()
            .filter(|r| r.kind == kind)
            .collect()
    }

    fn seed(&self, record: ResourceRecord) {
        self.store.insert(&self.session.id, record);
    }

    fn executed(&self, node_id: &str) -> bool {
        self.graph.node(node_id).unwrap().is_executed()
    }
}

fn roles(id: &str, names: &[&str]) -> Node {
    Node::new(
        id,
        NodeData::CreateRole(CreateRoleData {
            role_names: names.iter().map(|s| s.to_string()).collect(),
            created: vec![],
        }),
    )
}

fn delete(id: &str, data: fn(DeleteResourcesData) -> NodeData, names: &[&str]) -> Node {
    Node::new(
        id,
        data(DeleteResourcesData {
            names: names.iter().map(|s| s.to_string()).collect(),
            deleted: vec![],
        }),
    )
}

#[tokio::test]
async fn test_duplicate_role_names_create_twice_record_once() {
    let mut h = harness(MockGuildClient::new()).await;
    h.add(roles("roles", &["GM", "Player", "Player"]));

    let report = h.run("roles").await.unwrap();

    assert!(report.executed);
    assert_eq!(report.succeeded, 3);
    assert_eq!(h.client.count(|c| matches!(c, Call::CreateRole { .. })), 3);
    let mut names: Vec<_> = h
        .records(ResourceKind::Role)
        .into_iter()
        .map(|r| r.name)
        .collect();
    names.sort();
    assert_eq!(names, vec!["GM", "Player"]);
    assert!(h.executed("roles"));
}

#[tokio::test]
async fn test_partial_failure_retries_only_failed_items() {
    let client = MockGuildClient::new();
    client.fail_times("Player", 1);
    let mut h = harness(client).await;
    h.add(roles("roles", &["GM", "Player", "Spectator"]));

    let first = h.run("roles").await.unwrap();
    assert!(!first.executed);
    assert_eq!(first.succeeded, 2);
    assert_eq!(first.failures.len(), 1);
    assert_eq!(first.failures[0].item, "Player");
    assert!(!h.executed("roles"));

    let second = h.run("roles").await.unwrap();
    assert!(second.executed);
    assert_eq!(second.succeeded, 1);
    // Only the failed name was retried.
    let created: Vec<_> = h
        .client
        .calls()
        .into_iter()
        .filter_map(|c| match c {
            Call::CreateRole { name } => Some(name),
            _ => None,
        })
        .collect();
    assert_eq!(created, vec!["GM", "Player", "Spectator", "Player"]);
    assert_eq!(h.records(ResourceKind::Role).len(), 3);
}

#[tokio::test]
async fn test_executed_node_refuses_to_rerun() {
    let mut h = harness(MockGuildClient::new()).await;
    h.add(roles("roles", &["GM"]));
    h.run("roles").await.unwrap();
    assert!(matches!(
        h.run("roles").await,
        Err(GuildflowError::AlreadyExecuted(_))
    ));
}

#[tokio::test]
async fn test_blank_names_are_a_validation_error() {
    let mut h = harness(MockGuildClient::new()).await;
    h.add(roles("roles", &["  ", ""]));
    let err = h.run("roles").await.unwrap_err();
    assert!(err.is_validation());
    assert!(h.client.calls().is_empty());
}

#[tokio::test]
async fn test_memo_not_executable() {
    let mut h = harness(MockGuildClient::new()).await;
    h.add(Node::new("memo", NodeData::Memo(MemoData::default())));
    assert!(matches!(
        h.run("memo").await,
        Err(GuildflowError::NotExecutable { .. })
    ));
}

#[tokio::test]
async fn test_delete_fails_fast_on_unknown_names() {
    let mut h = harness(MockGuildClient::new()).await;
    h.seed(ResourceRecord::role("1", "GM"));
    h.add(delete("del", NodeData::DeleteRole, &["GM", "Ghost", "Phantom"]));

    let err = h.run("del").await.unwrap_err();
    assert_eq!(err.to_string(), "Unresolved role names: Ghost, Phantom");
    assert!(h.client.calls().is_empty());
    assert_eq!(h.records(ResourceKind::Role).len(), 1);
}

#[tokio::test]
async fn test_delete_tracks_progress_across_retries() {
    let client = MockGuildClient::new();
    client.fail_times("11", 1);
    let mut h = harness(client).await;
    h.seed(ResourceRecord::channel("10", "lobby", ChannelType::Text, None));
    h.seed(ResourceRecord::channel("11", "graveyard", ChannelType::Text, None));
    h.add(delete("del", NodeData::DeleteChannel, &["lobby", "graveyard", "lobby"]));

    let first = h.run("del").await.unwrap();
    assert!(!first.executed);
    assert_eq!(first.succeeded, 1);
    assert_eq!(h.records(ResourceKind::Channel).len(), 1);

    let second = h.run("del").await.unwrap();
    assert!(second.executed);
    assert!(h.records(ResourceKind::Channel).is_empty());
    assert_eq!(h.client.count(|c| matches!(c, Call::DeleteChannel { id } if id == "10")), 1);
}

#[tokio::test]
async fn test_create_channels_under_category_with_roles() {
    let mut h = harness(MockGuildClient::new()).await;
    h.add(Node::new(
        "cat",
        NodeData::CreateCategory(CreateCategoryData {
            category_name: "Game".into(),
            created: None,
        }),
    ));
    h.add(roles("roles", &["GM", "Player"]));
    h.add(Node::new(
        "channels",
        NodeData::CreateChannel(CreateChannelData {
            channels: vec![
                ChannelItem {
                    name: "table".into(),
                    channel_type: ChannelType::Text,
                    writer_roles: vec!["GM".into()],
                    reader_roles: vec!["Player".into()],
                },
                ChannelItem {
                    name: "voice".into(),
                    channel_type: ChannelType::Voice,
                    ..Default::default()
                },
            ],
            category_name: Some("Game".into()),
            created: vec![],
        }),
    ));
    h.connect("cat", "channels");
    h.connect("roles", "channels");

    h.run("cat").await.unwrap();
    h.run("roles").await.unwrap();
    let report = h.run("channels").await.unwrap();
    assert!(report.executed);
    assert_eq!(report.created.len(), 2);

    let category = &h.records(ResourceKind::Category)[0];
    let gm = h
        .records(ResourceKind::Role)
        .into_iter()
        .find(|r| r.name == "GM")
        .unwrap();
    let table = h
        .records(ResourceKind::Channel)
        .into_iter()
        .find(|r| r.name == "table")
        .unwrap();
    assert_eq!(table.parent_id.as_deref(), Some(category.id.as_str()));
    assert_eq!(table.writer_role_ids, vec![gm.id]);
    assert_eq!(table.reader_role_ids.len(), 1);
}

#[tokio::test]
async fn test_create_channel_unknown_role_aborts() {
    let mut h = harness(MockGuildClient::new()).await;
    h.add(Node::new(
        "channels",
        NodeData::CreateChannel(CreateChannelData {
            channels: vec![ChannelItem {
                name: "table".into(),
                writer_roles: vec!["Nobody".into()],
                ..Default::default()
            }],
            category_name: None,
            created: vec![],
        }),
    ));
    let err = h.run("channels").await.unwrap_err();
    assert!(matches!(err, GuildflowError::Unresolved { kind: ResourceKind::Role, .. }));
    assert!(h.client.calls().is_empty());
}

#[tokio::test]
async fn test_permission_change_is_absolute() {
    let mut h = harness(MockGuildClient::new()).await;
    h.seed(ResourceRecord::role("1", "GM"));
    h.seed(ResourceRecord::role("2", "Player"));
    let mut lobby = ResourceRecord::channel("10", "lobby", ChannelType::Text, None);
    lobby.writer_role_ids = vec!["2".into()];
    lobby.reader_role_ids = vec!["1".into()];
    h.seed(lobby);
    h.add(Node::new(
        "perm",
        NodeData::ChangeChannelPermission(ChangePermissionData {
            channel: DynamicValue::literal("lobby"),
            writer_roles: vec!["GM".into()],
            reader_roles: vec![],
        }),
    ));

    let report = h.run("perm").await.unwrap();
    assert!(report.executed);
    assert_eq!(
        h.client.calls(),
        vec![Call::SetPermissions {
            channel_id: "10".into(),
            writer_role_ids: vec!["1".into()],
            reader_role_ids: vec![],
        }]
    );
    let lobby = &h.records(ResourceKind::Channel)[0];
    assert_eq!(lobby.writer_role_ids, vec!["1"]);
    assert!(lobby.reader_role_ids.is_empty());
}

#[tokio::test]
async fn test_permission_change_reports_all_unknown_roles_at_once() {
    let mut h = harness(MockGuildClient::new()).await;
    h.seed(ResourceRecord::role("1", "GM"));
    h.seed(ResourceRecord::role("2", "Player"));
    h.seed(ResourceRecord::channel("10", "lobby", ChannelType::Text, None));
    h.add(Node::new(
        "bad",
        NodeData::ChangeChannelPermission(ChangePermissionData {
            channel: DynamicValue::literal("lobby"),
            writer_roles: vec!["GM".into(), "Ghost".into()],
            reader_roles: vec!["Phantom".into()],
        }),
    ));
    h.add(Node::new(
        "good",
        NodeData::ChangeChannelPermission(ChangePermissionData {
            channel: DynamicValue::literal("lobby"),
            writer_roles: vec!["Player".into()],
            reader_roles: vec!["GM".into(), "Player".into()],
        }),
    ));

    let err = h.run("bad").await.unwrap_err();
    assert_eq!(err.to_string(), "Unresolved role names: Ghost, Phantom");
    assert!(h.client.calls().is_empty());

    assert!(h.run("good").await.unwrap().executed);
    assert_eq!(
        h.client.calls(),
        vec![Call::SetPermissions {
            channel_id: "10".into(),
            writer_role_ids: vec!["2".into()],
            reader_role_ids: vec!["1".into(), "2".into()],
        }]
    );
}

#[tokio::test]
async fn test_send_message_aborts_on_any_unknown_channel() {
    let mut h = harness(MockGuildClient::new()).await;
    h.seed(ResourceRecord::channel("10", "lobby", ChannelType::Text, None));
    h.add(Node::new(
        "msg",
        NodeData::SendMessage(SendMessageData {
            channels: vec![DynamicValue::literal("lobby"), DynamicValue::literal("attic")],
            messages: vec![MessageBlock {
                content: "hello".into(),
                attachments: vec![],
            }],
        }),
    ));
    let err = h.run("msg").await.unwrap_err();
    assert!(matches!(err, GuildflowError::Unresolved { kind: ResourceKind::Channel, .. }));
    assert!(h.client.calls().is_empty());
}

#[tokio::test]
async fn test_send_every_block_to_every_channel() {
    let mut h = harness(MockGuildClient::new()).await;
    h.add(Node::new(
        "channels",
        NodeData::CreateChannel(CreateChannelData {
            channels: vec![
                ChannelItem { name: "a".into(), ..Default::default() },
                ChannelItem { name: "b".into(), ..Default::default() },
            ],
            category_name: None,
            created: vec![],
        }),
    ));
    h.add(Node::new(
        "msg",
        NodeData::SendMessage(SendMessageData {
            channels: vec![DynamicValue::channel("a"), DynamicValue::channel("b")],
            messages: vec![
                MessageBlock { content: "one".into(), attachments: vec![] },
                MessageBlock { content: "   ".into(), attachments: vec![] },
                MessageBlock { content: "two".into(), attachments: vec![] },
            ],
        }),
    ));
    h.connect("channels", "msg");
    h.run("channels").await.unwrap();

    let report = h.run("msg").await.unwrap();
    assert!(report.executed);
    assert_eq!(report.succeeded, 4);
    let sent: Vec<_> = h
        .client
        .calls()
        .into_iter()
        .filter_map(|c| match c {
            Call::SendMessage { content, .. } => Some(content),
            _ => None,
        })
        .collect();
    assert_eq!(sent, vec!["one", "two", "one", "two"]);
}

#[tokio::test]
async fn test_channel_ref_not_upstream_is_unresolved() {
    let mut h = harness(MockGuildClient::new()).await;
    h.seed(ResourceRecord::channel("10", "lobby", ChannelType::Text, None));
    h.add(Node::new(
        "msg",
        NodeData::SendMessage(SendMessageData {
            channels: vec![DynamicValue::channel("lobby")],
            messages: vec![MessageBlock { content: "hi".into(), attachments: vec![] }],
        }),
    ));
    let err = h.run("msg").await.unwrap_err();
    assert_eq!(err.to_string(), "Unresolved channel names: #lobby");
}

#[tokio::test]
async fn test_add_role_pages_through_members() {
    let client = MockGuildClient::new().with_members(vec![
        member("u1", &["verified"]),
        bot("u2"),
        member("u3", &[]),
        member("u4", &["verified", "player"]),
        member("u5", &["verified"]),
    ]);
    let mut h = harness(client).await;
    h.engine = Engine::with_config(
        h.client.clone(),
        h.store.clone(),
        h.store.clone(),
        &guildflow_core::config::EngineConfig {
            member_page_size: 2,
            ..Default::default()
        },
    );
    h.seed(ResourceRecord::role("player", "Player"));
    h.seed(ResourceRecord::role("verified", "Verified"));
    h.add(Node::new(
        "grant",
        NodeData::AddRoleToMembers(AddRoleToMembersData {
            role_name: "Player".into(),
            member_role_name: Some("Verified".into()),
            assigned: vec![],
        }),
    ));

    let report = h.run("grant").await.unwrap();
    assert!(report.executed);
    let granted: Vec<_> = h
        .client
        .calls()
        .into_iter()
        .filter_map(|c| match c {
            Call::AddRole { user_id, .. } => Some(user_id),
            _ => None,
        })
        .collect();
    assert_eq!(granted, vec!["u1", "u5"]);
    assert_eq!(h.client.count(|c| matches!(c, Call::ListMembers { .. })), 3);
    match &h.graph.node("grant").unwrap().data {
        NodeData::AddRoleToMembers(d) => assert_eq!(d.assigned, vec!["u1", "u4", "u5"]),
        _ => unreachable!(),
    }
}

#[tokio::test]
async fn test_set_flag_resolves_and_persists() {
    let mut h = harness(MockGuildClient::new()).await;
    h.add(Node::new(
        "flag",
        NodeData::SetGameFlag(SetGameFlagData {
            flag_key: "title".into(),
            value: DynamicValue::SessionName,
        }),
    ));
    let mut rx = h.engine.events().subscribe();

    let report = h.run("flag").await.unwrap();
    assert_eq!(report.flags_written, vec!["title"]);
    assert_eq!(h.session.game_flags["title"], "Friday game");
    let stored = h.store.load_session(&h.session.id).await.unwrap().unwrap();
    assert_eq!(stored.game_flags["title"], "Friday game");

    let mut saw_flags = false;
    while let Ok(event) = rx.try_recv() {
        if let EngineEvent::FlagsChanged { keys, .. } = event {
            assert_eq!(keys, vec!["title"]);
            saw_flags = true;
        }
    }
    assert!(saw_flags);
}

fn branch(has_default: bool) -> Node {
    Node::new(
        "branch",
        NodeData::ConditionalBranch(ConditionalBranchData {
            conditions: ConditionList::new(vec![
                Condition::new("c1", "team", ConditionOperator::Equals, "B"),
                Condition::new("c2", "role", ConditionOperator::Equals, "detective"),
                Condition::new("c3", "team", ConditionOperator::Equals, "A"),
            ])
            .unwrap(),
            has_default,
            matched: None,
        }),
    )
}

#[tokio::test]
async fn test_conditional_branch_first_match_activates_handle() {
    let mut h = harness(MockGuildClient::new()).await;
    h.session.game_flags.insert("team".into(), "A".into());
    h.session.game_flags.insert("role".into(), "detective".into());
    h.add(branch(true));
    h.add(Node::new("detective", NodeData::ManualStep(ManualStepData::default())));
    h.add(Node::new("team-a", NodeData::ManualStep(ManualStepData::default())));
    h.graph.connect("branch", "detective", Some("c2")).unwrap();
    h.graph.connect("branch", "team-a", Some("c3")).unwrap();

    let report = h.run("branch").await.unwrap();
    assert!(report.executed);
    assert_eq!(report.activated_handle.as_deref(), Some("c2"));
    assert_eq!(report.activated_targets, vec!["detective"]);
}

#[tokio::test]
async fn test_conditional_branch_default_and_no_match() {
    let mut h = harness(MockGuildClient::new()).await;
    h.add(branch(true));
    let report = h.run("branch").await.unwrap();
    assert_eq!(report.activated_handle.as_deref(), Some("default"));

    let mut h = harness(MockGuildClient::new()).await;
    h.add(branch(false));
    let report = h.run("branch").await.unwrap();
    assert!(!report.executed);
    assert!(report.activated_handle.is_none());
    assert!(!h.executed("branch"));
}

#[tokio::test]
async fn test_select_branch_requires_choice() {
    let mut h = harness(MockGuildClient::new()).await;
    h.add(Node::new(
        "select",
        NodeData::SelectBranch(SelectBranchData {
            options: BranchOptions::new(vec![
                BranchOption { id: "a".into(), label: "Murder".into() },
                BranchOption { id: "b".into(), label: "Heist".into() },
            ])
            .unwrap(),
            flag_key: Some("scenario".into()),
            selected: None,
        }),
    ));
    assert!(h.run("select").await.unwrap_err().is_validation());

    guildflow_graph::edit::select_option(&mut h.graph, "select", "b").unwrap();
    let report = h.run("select").await.unwrap();
    assert!(report.executed);
    assert_eq!(report.activated_handle.as_deref(), Some("b"));
    assert_eq!(h.session.game_flags["scenario"], "Heist");
    assert!(guildflow_graph::edit::select_option(&mut h.graph, "select", "a").is_err());
}

#[tokio::test]
async fn test_shuffle_assign_writes_prefixed_flags() {
    let mut h = harness(MockGuildClient::new()).await;
    h.add(Node::new(
        "shuffle",
        NodeData::ShuffleAssign(ShuffleAssignData {
            items: vec!["knife".into(), "rope".into(), "candle".into()],
            targets: vec!["alice".into(), "bob".into()],
            prefix: "item".into(),
            result: None,
        }),
    ));

    let report = h.run("shuffle").await.unwrap();
    assert!(report.executed);
    let mut keys = report.flags_written.clone();
    keys.sort();
    assert_eq!(keys, vec!["item_alice", "item_bob"]);

    let total: usize = ["item_alice", "item_bob"]
        .iter()
        .map(|k| h.session.game_flags[*k].split(", ").count())
        .sum();
    assert_eq!(total, 3);
    match &h.graph.node("shuffle").unwrap().data {
        NodeData::ShuffleAssign(d) => assert_eq!(d.result.as_ref().unwrap().len(), 2),
        _ => unreachable!(),
    }
}

#[tokio::test]
async fn test_record_combination_finalizes_log() {
    let mut h = harness(MockGuildClient::new()).await;
    h.add(Node::new(
        "combo",
        NodeData::RecordCombination(RecordCombinationData {
            config: Default::default(),
            source_options: vec![],
            target_options: vec![],
            pairs: vec![],
        }),
    ));
    h.add(Node::new("manual", NodeData::ManualStep(ManualStepData::default())));
    assert!(h.run("combo").await.unwrap().executed);
    assert!(h.run("manual").await.unwrap().executed);
}

#[tokio::test]
async fn test_progress_events_published() {
    let mut h = harness(MockGuildClient::new()).await;
    h.add(roles("roles", &["GM", "Player"]));
    let mut rx = h.engine.events().subscribe();
    h.run("roles").await.unwrap();

    let mut progress = vec![];
    while let Ok(event) = rx.try_recv() {
        if let EngineEvent::Progress { current, total, .. } = event {
            progress.push((current, total));
        }
    }
    assert_eq!(progress, vec![(1, 2), (2, 2)]);
}

#[tokio::test]
async fn test_lost_role_record_is_written_on_retry() {
    let mut h = harness(MockGuildClient::new()).await;
    h.store.fail_upserts(1);
    h.add(roles("roles", &["GM", "Player"]));

    let first = h.run("roles").await.unwrap();
    assert!(!first.executed);
    assert_eq!(first.failures.len(), 1);
    assert_eq!(first.failures[0].item, "GM");
    assert_eq!(h.records(ResourceKind::Role).len(), 1);

    let second = h.run("roles").await.unwrap();
    assert!(second.executed);
    assert_eq!(second.succeeded, 1);
    assert_eq!(h.client.count(|c| matches!(c, Call::CreateRole { .. })), 2);

    let gm = h
        .records(ResourceKind::Role)
        .into_iter()
        .find(|r| r.name == "GM")
        .unwrap();
    match &h.graph.node("roles").unwrap().data {
        NodeData::CreateRole(d) => assert_eq!(d.created[0].id, gm.id),
        other => panic!("unexpected payload {:?}", other),
    }
}

#[tokio::test]
async fn test_repeated_record_failure_keeps_node_open() {
    let mut h = harness(MockGuildClient::new()).await;
    h.store.fail_upserts(2);
    h.add(roles("roles", &["GM"]));

    assert!(!h.run("roles").await.unwrap().executed);
    let second = h.run("roles").await.unwrap();
    assert!(!second.executed);
    assert_eq!(second.failures.len(), 1);
    assert!(!h.executed("roles"));

    assert!(h.run("roles").await.unwrap().executed);
    assert_eq!(h.records(ResourceKind::Role).len(), 1);
    assert_eq!(h.client.count(|c| matches!(c, Call::CreateRole { .. })), 1);
}

#[tokio::test]
async fn test_lost_category_and_channel_records_are_written_on_retry() {
    let mut h = harness(MockGuildClient::new()).await;
    h.add(Node::new(
        "cat",
        NodeData::CreateCategory(CreateCategoryData {
            category_name: "Game".into(),
            created: None,
        }),
    ));
    h.add(Node::new(
        "channels",
        NodeData::CreateChannel(CreateChannelData {
            channels: vec![ChannelItem {
                name: "table".into(),
                channel_type: ChannelType::Voice,
                ..Default::default()
            }],
            category_name: Some("Game".into()),
            created: vec![],
        }),
    ));
    h.connect("cat", "channels");

    h.store.fail_upserts(1);
    assert!(!h.run("cat").await.unwrap().executed);
    assert!(h.records(ResourceKind::Category).is_empty());
    assert!(h.run("cat").await.unwrap().executed);
    let category = h.records(ResourceKind::Category).remove(0);

    h.store.fail_upserts(1);
    assert!(!h.run("channels").await.unwrap().executed);
    assert!(h.records(ResourceKind::Channel).is_empty());
    assert!(h.run("channels").await.unwrap().executed);

    let table = h.records(ResourceKind::Channel).remove(0);
    assert_eq!(table.channel_type, Some(ChannelType::Voice));
    assert_eq!(table.parent_id, Some(category.id));
    assert_eq!(h.client.count(|c| matches!(c, Call::CreateCategory { .. })), 1);
    assert_eq!(h.client.count(|c| matches!(c, Call::CreateChannel { .. })), 1);
}
