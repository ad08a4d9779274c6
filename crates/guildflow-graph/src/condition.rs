use serde::{Deserialize, Serialize};

use guildflow_core::error::GuildflowError;
use guildflow_core::types::FlagMap;

/// A single predicate on a session flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    pub id: String,
    pub flag_key: String,
    pub operator: ConditionOperator,
    #[serde(default)]
    pub value: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConditionOperator {
    Equals,
    NotEquals,
    Contains,
    Exists,
    NotExists,
}

impl Condition {
    pub fn new(
        id: impl Into<String>,
        flag_key: impl Into<String>,
        operator: ConditionOperator,
        value: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            flag_key: flag_key.into(),
            operator,
            value: value.into(),
        }
    }
}

/// Evaluate one condition against the current flags.
///
/// A missing flag never equals or contains anything, and always counts as
/// "not equal".
pub fn evaluate_condition(condition: &Condition, flags: &FlagMap) -> bool {
    let current = flags.get(&condition.flag_key);
    match condition.operator {
        ConditionOperator::Equals => current.is_some_and(|v| *v == condition.value),
        ConditionOperator::NotEquals => current.map_or(true, |v| *v != condition.value),
        ConditionOperator::Contains => {
            current.is_some_and(|v| v.contains(condition.value.as_str()))
        }
        ConditionOperator::Exists => current.is_some(),
        ConditionOperator::NotExists => current.is_none(),
    }
}

/// Id of the first condition, in list order, that holds.
pub fn evaluate_conditions<'a>(conditions: &'a [Condition], flags: &FlagMap) -> Option<&'a str> {
    conditions
        .iter()
        .find(|c| evaluate_condition(c, flags))
        .map(|c| c.id.as_str())
}

/// Ordered, non-empty list of conditions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Condition>", into = "Vec<Condition>")]
pub struct ConditionList(Vec<Condition>);

impl ConditionList {
    pub fn new(conditions: Vec<Condition>) -> Result<Self, GuildflowError> {
        Self::try_from(conditions)
    }

    pub fn as_slice(&self) -> &[Condition] {
        &self.0
    }

    /// Id of the first matching condition.
    pub fn first_match(&self, flags: &FlagMap) -> Option<&str> {
        evaluate_conditions(&self.0, flags)
    }
}

impl TryFrom<Vec<Condition>> for ConditionList {
    type Error = GuildflowError;

    fn try_from(conditions: Vec<Condition>) -> Result<Self, Self::Error> {
        if conditions.is_empty() {
            return Err(GuildflowError::Validation(
                "a conditional branch needs at least one condition".into(),
            ));
        }
        Ok(Self(conditions))
    }
}

impl From<ConditionList> for Vec<Condition> {
    fn from(list: ConditionList) -> Self {
        list.0
    }
}
