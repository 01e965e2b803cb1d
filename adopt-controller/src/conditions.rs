//! Status conditions of an adopted resource.
//!
//! Conditions are keyed by [`ConditionType`] and stored in a fixed slot per
//! type, so a resource can never carry two entries of the same type. On the
//! wire they serialize as a list ordered by type.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The conditions this controller owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ConditionType {
    /// The resource was accepted and is under management.
    Adopted,
    /// The node endpoint answered the connectivity probe.
    Connected,
    /// Link monitoring is set up. Absent when link monitoring is disabled.
    LinkReady,
    /// The remote registry reflects this resource. Absent when sync is disabled.
    RemoteSync,
}

impl ConditionType {
    fn index(self) -> usize {
        match self {
            Self::Adopted => 0,
            Self::Connected => 1,
            Self::LinkReady => 2,
            Self::RemoteSync => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Adopted => "Adopted",
            Self::Connected => "Connected",
            Self::LinkReady => "LinkReady",
            Self::RemoteSync => "RemoteSync",
        }
    }
}

impl std::fmt::Display for ConditionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Condition status following Kubernetes conventions
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConditionStatus {
    True,
    False,
    #[default]
    Unknown,
}

/// How bad a false condition is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// A single status condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    #[serde(rename = "type")]
    pub type_: ConditionType,
    pub status: ConditionStatus,
    /// Only set on non-true conditions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reason: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
    /// Moves only when `status` changes.
    pub last_transition_time: DateTime<Utc>,
}

impl Condition {
    pub fn is_true(&self) -> bool {
        self.status == ConditionStatus::True
    }
}

/// The condition ledger of one resource.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<Condition>", into = "Vec<Condition>")]
pub struct Conditions {
    slots: [Option<Condition>; 4],
}

impl Conditions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a condition true, dropping any reason and message.
    pub fn set_true(&mut self, type_: ConditionType) {
        self.set(type_, ConditionStatus::True, None, String::new(), String::new());
    }

    /// Mark a condition false with a machine-readable reason.
    pub fn set_false(
        &mut self,
        type_: ConditionType,
        reason: impl Into<String>,
        severity: Severity,
        message: impl Into<String>,
    ) {
        self.set(
            type_,
            ConditionStatus::False,
            Some(severity),
            reason.into(),
            message.into(),
        );
    }

    /// Remove a condition entirely ("not applicable").
    pub fn clear(&mut self, type_: ConditionType) -> Option<Condition> {
        self.slots[type_.index()].take()
    }

    pub fn get(&self, type_: ConditionType) -> Option<&Condition> {
        self.slots[type_.index()].as_ref()
    }

    pub fn is_true(&self, type_: ConditionType) -> bool {
        self.get(type_).is_some_and(Condition::is_true)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Condition> {
        self.slots.iter().flatten()
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }

    fn set(
        &mut self,
        type_: ConditionType,
        status: ConditionStatus,
        severity: Option<Severity>,
        reason: String,
        message: String,
    ) {
        let slot = &mut self.slots[type_.index()];
        let last_transition_time = match slot {
            Some(prev) if prev.status == status => prev.last_transition_time,
            _ => Utc::now(),
        };
        *slot = Some(Condition {
            type_,
            status,
            severity,
            reason,
            message,
            last_transition_time,
        });
    }
}

impl From<Vec<Condition>> for Conditions {
    fn from(list: Vec<Condition>) -> Self {
        let mut conditions = Conditions::default();
        for condition in list {
            let index = condition.type_.index();
            conditions.slots[index] = Some(condition);
        }
        conditions
    }
}

impl From<Conditions> for Vec<Condition> {
    fn from(conditions: Conditions) -> Self {
        conditions.slots.into_iter().flatten().collect()
    }
}
