use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Paused,
    Completed,
    Overdue,
}

impl TaskStatus {
    /// Parse status from a tag like "in_progress" or "PAUSED"
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag.to_lowercase().replace('-', "_").as_str() {
            "pending" => Some(Self::Pending),
            "in_progress" | "running" => Some(Self::InProgress),
            "paused" => Some(Self::Paused),
            "completed" | "done" => Some(Self::Completed),
            "overdue" => Some(Self::Overdue),
            _ => None,
        }
    }

    /// Convert status to its stable tag
    pub fn to_tag(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Overdue => "overdue",
        }
    }

    /// Whether `start` is a valid transition from this status
    pub fn can_start(&self) -> bool {
        matches!(self, Self::Pending | Self::Paused | Self::Overdue)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_tag())
    }
}

/// Unit of a repeat rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepeatKind {
    #[default]
    None,
    Daily,
    Weekly,
    Monthly,
    Yearly,
    /// Every `interval` days
    Custom,
}

impl RepeatKind {
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag.to_lowercase().as_str() {
            "none" => Some(Self::None),
            "daily" => Some(Self::Daily),
            "weekly" => Some(Self::Weekly),
            "monthly" => Some(Self::Monthly),
            "yearly" => Some(Self::Yearly),
            "custom" => Some(Self::Custom),
            _ => None,
        }
    }

    pub fn to_tag(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
            Self::Yearly => "yearly",
            Self::Custom => "custom",
        }
    }
}

/// Repeat policy plus the interval it is applied with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepeatRule {
    pub kind: RepeatKind,
    pub interval: u32,
}

impl RepeatRule {
    pub const NONE: RepeatRule = RepeatRule {
        kind: RepeatKind::None,
        interval: 1,
    };

    pub fn new(kind: RepeatKind, interval: u32) -> Self {
        Self { kind, interval }
    }

    pub fn is_repeating(&self) -> bool {
        self.kind != RepeatKind::None
    }
}

impl Default for RepeatRule {
    fn default() -> Self {
        Self::NONE
    }
}

/// Task priority, ordered low < medium < high
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Priority {
    #[default]
    Low = 0,
    Medium = 1,
    High = 2,
}

impl Priority {
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag.to_lowercase().as_str() {
            "0" | "low" => Some(Self::Low),
            "1" | "medium" | "med" => Some(Self::Medium),
            "2" | "high" => Some(Self::High),
            _ => None,
        }
    }

    pub fn to_tag(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl From<Priority> for u8 {
    fn from(priority: Priority) -> Self {
        priority as u8
    }
}

impl TryFrom<u8> for Priority {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Low),
            1 => Ok(Self::Medium),
            2 => Ok(Self::High),
            other => Err(format!("priority out of range: {}", other)),
        }
    }
}
