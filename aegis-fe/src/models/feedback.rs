//! Feedback record and classification types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use uuid::Uuid;

/// Overall tone of a piece of feedback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Sentiment {
    Positive,
    Neutral,
    Negative,
}

impl Sentiment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sentiment::Positive => "POSITIVE",
            Sentiment::Neutral => "NEUTRAL",
            Sentiment::Negative => "NEGATIVE",
        }
    }

    /// Case-insensitive parse of the stored/wire label
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "POSITIVE" => Some(Sentiment::Positive),
            "NEUTRAL" => Some(Sentiment::Neutral),
            "NEGATIVE" => Some(Sentiment::Negative),
            _ => None,
        }
    }
}

impl fmt::Display for Sentiment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Closed topic taxonomy
///
/// Declaration order is the routing priority: the first topic of a
/// classification decides its [`Department`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Topic {
    Billing,
    Technical,
    #[serde(rename = "UX")]
    Ux,
    Security,
    General,
}

impl Topic {
    pub const ALL: [Topic; 5] = [
        Topic::Billing,
        Topic::Technical,
        Topic::Ux,
        Topic::Security,
        Topic::General,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::Billing => "Billing",
            Topic::Technical => "Technical",
            Topic::Ux => "UX",
            Topic::Security => "Security",
            Topic::General => "General",
        }
    }

    /// Case-insensitive match against the taxonomy labels
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        Self::ALL
            .into_iter()
            .find(|topic| topic.as_str().eq_ignore_ascii_case(value))
    }

    pub fn department(&self) -> Department {
        match self {
            Topic::Billing => Department::Finance,
            Topic::Technical => Department::Engineering,
            Topic::Ux => Department::Product,
            Topic::Security => Department::InfoSec,
            Topic::General => Department::Support,
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which classifier produced the values currently stored on a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClassificationSource {
    Ai,
    Fallback,
}

impl ClassificationSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClassificationSource::Ai => "ai",
            ClassificationSource::Fallback => "fallback",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "ai" => Some(ClassificationSource::Ai),
            "fallback" => Some(ClassificationSource::Fallback),
            _ => None,
        }
    }
}

impl fmt::Display for ClassificationSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Routing destination derived from topics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Department {
    #[serde(rename = "Customer Success - Finance")]
    Finance,
    #[serde(rename = "Engineering - Core")]
    Engineering,
    #[serde(rename = "Product - Design")]
    Product,
    #[serde(rename = "InfoSec - Priority")]
    InfoSec,
    #[serde(rename = "Customer Support - Triage")]
    Support,
}

impl Department {
    const ALL: [Department; 5] = [
        Department::Finance,
        Department::Engineering,
        Department::Product,
        Department::InfoSec,
        Department::Support,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Department::Finance => "Customer Success - Finance",
            Department::Engineering => "Engineering - Core",
            Department::Product => "Product - Design",
            Department::InfoSec => "InfoSec - Priority",
            Department::Support => "Customer Support - Triage",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|d| d.as_str() == value)
    }

    /// Department for a topic set (first topic in taxonomy order)
    pub fn for_topics(topics: &BTreeSet<Topic>) -> Self {
        topics
            .iter()
            .next()
            .map(Topic::department)
            .unwrap_or(Department::Support)
    }
}

impl fmt::Display for Department {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output of either classifier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub sentiment: Sentiment,
    pub topics: BTreeSet<Topic>,
    pub urgent: bool,
}

impl Classification {
    pub fn department(&self) -> Department {
        Department::for_topics(&self.topics)
    }
}

/// The single persisted entity
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeedbackRecord {
    pub id: Uuid,
    pub raw_content: String,
    pub sanitized_content: String,
    pub fingerprint: String,
    pub sentiment: Sentiment,
    pub topics: BTreeSet<Topic>,
    pub urgent: bool,
    pub source: ClassificationSource,
    /// Concrete engine behind the stored values (e.g. "heuristic", "groq")
    pub provider: String,
    pub department: Department,
    pub needs_review: bool,
    pub resolved: bool,
    pub resolution_note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FeedbackRecord {
    /// Classification currently stored on the record
    pub fn classification(&self) -> Classification {
        Classification {
            sentiment: self.sentiment,
            topics: self.topics.clone(),
            urgent: self.urgent,
        }
    }
}

/// Values for a record about to be created by the race commit
#[derive(Debug, Clone)]
pub struct NewFeedback {
    pub raw_content: String,
    pub sanitized_content: String,
    pub fingerprint: String,
    pub classification: Classification,
    pub source: ClassificationSource,
    pub provider: String,
    /// Set when the AI's own urgency flag contradicted the urgency rule
    pub needs_review: bool,
}

impl NewFeedback {
    pub fn into_record(self, now: DateTime<Utc>) -> FeedbackRecord {
        let department = self.classification.department();
        FeedbackRecord {
            id: Uuid::new_v4(),
            raw_content: self.raw_content,
            sanitized_content: self.sanitized_content,
            fingerprint: self.fingerprint,
            sentiment: self.classification.sentiment,
            topics: self.classification.topics,
            urgent: self.classification.urgent,
            source: self.source,
            provider: self.provider,
            department,
            needs_review: self.needs_review,
            resolved: false,
            resolution_note: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Reconciliation write: replaces the fallback classification with the AI one
#[derive(Debug, Clone)]
pub struct AiUpgrade {
    pub classification: Classification,
    pub provider: String,
    pub needs_review: bool,
}

/// Aggregate counters for the admin surface
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FeedbackStats {
    pub total: i64,
    pub urgent: i64,
    pub fallback: i64,
    pub ai: i64,
    pub resolved: i64,
    pub needs_review: i64,
}
