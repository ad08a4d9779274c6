use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use guildflow_core::error::GuildflowError;
use guildflow_core::types::{Attachment, ChannelType};

use crate::combination::{CombinationConfig, PairOption, RecordedPair};
use crate::condition::ConditionList;
use crate::dynamic::DynamicValue;
use crate::shuffle::Assignment;

/// A node in the workflow graph.
///
/// The `type` tag and `data` payload come from [`NodeData`]. A node with
/// `executed_at` set is complete and will not run again until the graph is
/// reset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    /// Unique identifier for this node.
    pub id: String,
    #[serde(flatten)]
    pub data: NodeData,
    /// Canvas position, kept only so documents round-trip.
    #[serde(default)]
    pub position: Position,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Node {
    /// Create a new node at the origin.
    pub fn new(id: impl Into<String>, data: NodeData) -> Self {
        Self {
            id: id.into(),
            data,
            position: Position::default(),
            executed_at: None,
        }
    }

    /// Set the canvas position.
    pub fn at(mut self, x: f64, y: f64) -> Self {
        self.position = Position { x, y };
        self
    }

    pub fn is_executed(&self) -> bool {
        self.executed_at.is_some()
    }

    pub fn type_name(&self) -> &'static str {
        self.data.type_name()
    }
}

/// Per-type node payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum NodeData {
    Memo(MemoData),
    ManualStep(ManualStepData),
    CreateCategory(CreateCategoryData),
    DeleteCategory(DeleteResourcesData),
    CreateRole(CreateRoleData),
    DeleteRole(DeleteResourcesData),
    CreateChannel(CreateChannelData),
    DeleteChannel(DeleteResourcesData),
    ChangeChannelPermission(ChangePermissionData),
    SendMessage(SendMessageData),
    AddRoleToMembers(AddRoleToMembersData),
    SetGameFlag(SetGameFlagData),
    ConditionalBranch(ConditionalBranchData),
    SelectBranch(SelectBranchData),
    ShuffleAssign(ShuffleAssignData),
    RecordCombination(RecordCombinationData),
}

impl NodeData {
    /// The serialized `type` tag.
    pub fn type_name(&self) -> &'static str {
        match self {
            NodeData::Memo(_) => "memo",
            NodeData::ManualStep(_) => "manualStep",
            NodeData::CreateCategory(_) => "createCategory",
            NodeData::DeleteCategory(_) => "deleteCategory",
            NodeData::CreateRole(_) => "createRole",
            NodeData::DeleteRole(_) => "deleteRole",
            NodeData::CreateChannel(_) => "createChannel",
            NodeData::DeleteChannel(_) => "deleteChannel",
            NodeData::ChangeChannelPermission(_) => "changeChannelPermission",
            NodeData::SendMessage(_) => "sendMessage",
            NodeData::AddRoleToMembers(_) => "addRoleToMembers",
            NodeData::SetGameFlag(_) => "setGameFlag",
            NodeData::ConditionalBranch(_) => "conditionalBranch",
            NodeData::SelectBranch(_) => "selectBranch",
            NodeData::ShuffleAssign(_) => "shuffleAssign",
            NodeData::RecordCombination(_) => "recordCombination",
        }
    }

    pub fn is_executable(&self) -> bool {
        !matches!(self, NodeData::Memo(_))
    }

    /// Drop everything a previous execution wrote into the payload.
    ///
    /// Recorded pairs are operator input, not results, and are kept.
    pub fn clear_results(&mut self) {
        match self {
            NodeData::CreateCategory(d) => d.created = None,
            NodeData::CreateRole(d) => d.created.clear(),
            NodeData::CreateChannel(d) => d.created.clear(),
            NodeData::DeleteCategory(d) | NodeData::DeleteRole(d) | NodeData::DeleteChannel(d) => {
                d.deleted.clear()
            }
            NodeData::AddRoleToMembers(d) => d.assigned.clear(),
            NodeData::ConditionalBranch(d) => d.matched = None,
            NodeData::ShuffleAssign(d) => d.result = None,
            NodeData::Memo(_)
            | NodeData::ManualStep(_)
            | NodeData::ChangeChannelPermission(_)
            | NodeData::SendMessage(_)
            | NodeData::SetGameFlag(_)
            | NodeData::SelectBranch(_)
            | NodeData::RecordCombination(_) => {}
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoData {
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ManualStepData {
    #[serde(default)]
    pub instructions: String,
}

/// One item a create node has already produced, by position in its list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedEntry {
    pub index: usize,
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCategoryData {
    pub category_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<CreatedEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRoleData {
    pub role_names: Vec<String>,
    #[serde(default)]
    pub created: Vec<CreatedEntry>,
}

/// Payload shared by the delete-role, delete-channel and delete-category nodes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteResourcesData {
    pub names: Vec<String>,
    /// Names already deleted by an earlier, partially failed run.
    #[serde(default)]
    pub deleted: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelItem {
    pub name: String,
    #[serde(rename = "type", default)]
    pub channel_type: ChannelType,
    #[serde(default)]
    pub writer_roles: Vec<String>,
    #[serde(default)]
    pub reader_roles: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateChannelData {
    pub channels: Vec<ChannelItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_name: Option<String>,
    #[serde(default)]
    pub created: Vec<CreatedEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePermissionData {
    pub channel: DynamicValue,
    #[serde(default)]
    pub writer_roles: Vec<String>,
    #[serde(default)]
    pub reader_roles: Vec<String>,
}

/// One message: text plus up to [`MAX_ATTACHMENTS`] files.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageBlock {
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

pub const MAX_ATTACHMENTS: usize = 4;

impl MessageBlock {
    pub fn is_empty(&self) -> bool {
        self.content.trim().is_empty() && self.attachments.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SendMessageData {
    pub channels: Vec<DynamicValue>,
    pub messages: Vec<MessageBlock>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddRoleToMembersData {
    /// Role to grant.
    pub role_name: String,
    /// Only members holding this role are affected. Unset = every human member.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub member_role_name: Option<String>,
    /// User ids already granted the role.
    #[serde(default)]
    pub assigned: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetGameFlagData {
    pub flag_key: String,
    pub value: DynamicValue,
}

/// Which output of a conditional branch fired.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum BranchMatch {
    #[serde(rename_all = "camelCase")]
    Condition { condition_id: String },
    Default,
}

pub const DEFAULT_HANDLE: &str = "default";

impl BranchMatch {
    /// Source handle of the edges this match activates.
    pub fn handle(&self) -> &str {
        match self {
            BranchMatch::Condition { condition_id } => condition_id,
            BranchMatch::Default => DEFAULT_HANDLE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConditionalBranchData {
    pub conditions: ConditionList,
    #[serde(default)]
    pub has_default: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched: Option<BranchMatch>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchOption {
    pub id: String,
    pub label: String,
}

/// Options of a select-branch node; at least two.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<BranchOption>", into = "Vec<BranchOption>")]
pub struct BranchOptions(Vec<BranchOption>);

pub const MIN_BRANCH_OPTIONS: usize = 2;

impl BranchOptions {
    pub fn new(options: Vec<BranchOption>) -> Result<Self, GuildflowError> {
        Self::try_from(options)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, BranchOption> {
        self.0.iter()
    }

    pub fn get(&self, id: &str) -> Option<&BranchOption> {
        self.0.iter().find(|o| o.id == id)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl TryFrom<Vec<BranchOption>> for BranchOptions {
    type Error = GuildflowError;

    fn try_from(options: Vec<BranchOption>) -> Result<Self, Self::Error> {
        if options.len() < MIN_BRANCH_OPTIONS {
            return Err(GuildflowError::Validation(format!(
                "a select branch needs at least {} options, got {}",
                MIN_BRANCH_OPTIONS,
                options.len()
            )));
        }
        Ok(Self(options))
    }
}

impl From<BranchOptions> for Vec<BranchOption> {
    fn from(options: BranchOptions) -> Self {
        options.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectBranchData {
    pub options: BranchOptions,
    /// Flag written with the chosen label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flag_key: Option<String>,
    /// Chosen option id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShuffleAssignData {
    pub items: Vec<String>,
    pub targets: Vec<String>,
    pub prefix: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Vec<Assignment>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordCombinationData {
    pub config: CombinationConfig,
    pub source_options: Vec<PairOption>,
    /// Only used in different-set mode; same-set pairs draw both sides from
    /// `source_options`.
    #[serde(default)]
    pub target_options: Vec<PairOption>,
    #[serde(default)]
    pub pairs: Vec<RecordedPair>,
}

impl RecordCombinationData {
    /// Options the target side is picked from.
    pub fn target_pool(&self) -> &[PairOption] {
        match self.config.mode {
            crate::combination::CombinationMode::SameSet => &self.source_options,
            crate::combination::CombinationMode::DifferentSet => &self.target_options,
        }
    }
}
