//! Core type definitions for the evolution subsystem.
//!
//! Defines the closed set of [`TraitId`]s, the [`SenderClass`] of a turn, the
//! run-record and goal state enums, and the record structs that mirror the
//! database tables.

use serde::{Deserialize, Serialize};

use crate::error::EvolveError;

/// The fixed set of registered personality traits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraitId {
    Formality,
    Verbosity,
    Enthusiasm,
    Humor,
    Empathy,
    TechnicalDepth,
    Creativity,
    Assertiveness,
    Patience,
    Curiosity,
}

impl TraitId {
    pub const ALL: [TraitId; 10] = [
        Self::Formality,
        Self::Verbosity,
        Self::Enthusiasm,
        Self::Humor,
        Self::Empathy,
        Self::TechnicalDepth,
        Self::Creativity,
        Self::Assertiveness,
        Self::Patience,
        Self::Curiosity,
    ];

    /// SQL-compatible string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Formality => "formality",
            Self::Verbosity => "verbosity",
            Self::Enthusiasm => "enthusiasm",
            Self::Humor => "humor",
            Self::Empathy => "empathy",
            Self::TechnicalDepth => "technical_depth",
            Self::Creativity => "creativity",
            Self::Assertiveness => "assertiveness",
            Self::Patience => "patience",
            Self::Curiosity => "curiosity",
        }
    }
}

impl std::fmt::Display for TraitId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TraitId {
    type Err = EvolveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| EvolveError::UnknownTrait(s.to_string()))
    }
}

/// What drove a trait mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraitCause {
    /// Live nudge from a single conversational turn.
    Turn,
    /// Batched adjustment from a nightly consolidation run.
    Consolidation,
}

impl TraitCause {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Turn => "turn",
            Self::Consolidation => "consolidation",
        }
    }
}

impl std::str::FromStr for TraitCause {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "turn" => Ok(Self::Turn),
            "consolidation" => Ok(Self::Consolidation),
            _ => Err(format!("unknown trait cause: {s}")),
        }
    }
}

/// An immutable audit record of one trait mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraitHistoryEntry {
    pub id: i64,
    pub trait_id: TraitId,
    pub old_value: f64,
    pub new_value: f64,
    pub cause: TraitCause,
    pub created_at: String,
}

/// Who produced a conversational turn. Each class has its own baseline weight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SenderClass {
    /// The primary user who owns this assistant.
    Operator,
    /// Another agent or relayed source (e.g. a federated social feed).
    Federated,
    /// Automated or system-generated messages.
    System,
}

impl SenderClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Operator => "operator",
            Self::Federated => "federated",
            Self::System => "system",
        }
    }
}

impl std::fmt::Display for SenderClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SenderClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "operator" => Ok(Self::Operator),
            "federated" => Ok(Self::Federated),
            "system" => Ok(Self::System),
            _ => Err(format!("unknown sender class: {s}")),
        }
    }
}

/// Scores attached to a turn, both in `[0.0, 1.0]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TurnScore {
    pub importance: f64,
    pub emotional_weight: f64,
}

impl TurnScore {
    /// Fallback used when a turn cannot be scored.
    pub const NEUTRAL: TurnScore = TurnScore {
        importance: 0.5,
        emotional_weight: 0.5,
    };
}

/// A turn as received from ingress, before it is scored and persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTurn {
    pub sender: String,
    pub sender_class: SenderClass,
    pub platform: String,
    pub content: String,
    /// Set when the turn is a refusal or error message rather than real content.
    #[serde(default)]
    pub is_rejection: bool,
}

/// A persisted conversational turn, matching the `conversation_turns` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub id: i64,
    pub sender: String,
    pub sender_class: SenderClass,
    pub platform: String,
    pub content: String,
    pub is_rejection: bool,
    pub importance: f64,
    pub emotional_weight: f64,
    pub created_at: String,
}

/// Where a knowledge entry came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KnowledgeSource {
    /// Summarized by the language model from conversation alone.
    Model,
    /// Produced by the external topic-research flow.
    Research,
}

impl KnowledgeSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Model => "model",
            Self::Research => "research",
        }
    }
}

impl std::str::FromStr for KnowledgeSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "model" => Ok(Self::Model),
            "research" => Ok(Self::Research),
            _ => Err(format!("unknown knowledge source: {s}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeEntry {
    /// UUID v7 primary key.
    pub id: String,
    pub topic: String,
    pub content: String,
    pub source: KnowledgeSource,
    /// Consolidation run that produced this entry, if any.
    pub run_date: Option<String>,
    pub created_at: String,
}

/// State of a per-day consolidation slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Claimed,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Claimed => "claimed",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RunStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "claimed" => Ok(Self::Claimed),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("unknown run status: {s}")),
        }
    }
}

/// A trait delta that a consolidation run actually applied.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AppliedDelta {
    pub trait_id: TraitId,
    pub delta: f64,
    pub old_value: f64,
    pub new_value: f64,
}

/// The audit record of one day's consolidation, matching `consolidation_runs`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    /// Local calendar date, `YYYY-MM-DD`. Unique.
    pub run_date: String,
    pub status: RunStatus,
    pub turns_processed: usize,
    pub trait_deltas: Vec<AppliedDelta>,
    pub knowledge_ids: Vec<String>,
    /// Highest turn id this run consolidated. The next run starts after it.
    pub last_turn_id: i64,
    pub error: Option<String>,
    pub started_at: String,
    pub finished_at: Option<String>,
}

/// What a goal measures progress against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalMetric {
    ConversationCount,
    KnowledgeTopicCount,
    ConsolidationCount,
}

impl GoalMetric {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ConversationCount => "conversation_count",
            Self::KnowledgeTopicCount => "knowledge_topic_count",
            Self::ConsolidationCount => "consolidation_count",
        }
    }
}

impl std::fmt::Display for GoalMetric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for GoalMetric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "conversation_count" => Ok(Self::ConversationCount),
            "knowledge_topic_count" => Ok(Self::KnowledgeTopicCount),
            "consolidation_count" => Ok(Self::ConsolidationCount),
            _ => Err(format!("unknown goal metric: {s}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalStatus {
    Active,
    Completed,
}

impl GoalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Completed => "completed",
        }
    }
}

impl std::str::FromStr for GoalStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "completed" => Ok(Self::Completed),
            _ => Err(format!("unknown goal status: {s}")),
        }
    }
}

/// A long-running goal, matching the `goals` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Goal {
    pub id: String,
    pub description: String,
    pub metric: GoalMetric,
    pub target: f64,
    /// Percent complete, `0..=100`. Never decreases while active.
    pub progress: u8,
    pub status: GoalStatus,
    pub predecessor_id: Option<String>,
    pub created_at: String,
    pub completed_at: Option<String>,
}

/// A goal to be created (seed or successor).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewGoal {
    pub description: String,
    pub metric: GoalMetric,
    pub target: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trait_ids_round_trip_through_strings() {
        for t in TraitId::ALL {
            assert_eq!(t.as_str().parse::<TraitId>().unwrap(), t);
        }
    }

    #[test]
    fn unknown_trait_is_rejected() {
        let err = "charisma".parse::<TraitId>().unwrap_err();
        assert!(matches!(err, EvolveError::UnknownTrait(ref s) if s == "charisma"));
    }

    #[test]
    fn sender_class_parses() {
        assert_eq!("federated".parse::<SenderClass>().unwrap(), SenderClass::Federated);
        assert!("admin".parse::<SenderClass>().is_err());
    }
}
