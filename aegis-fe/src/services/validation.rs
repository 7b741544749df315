//! Strict decoding of AI completion output
//!
//! A completion is either decoded into a fully validated [`AiVerdict`] or
//! rejected with a typed [`SchemaError`]. Nothing from a rejected completion
//! is ever used.
//!
//! Expected shape:
//! `{"sentiment": "POSITIVE"|"NEUTRAL"|"NEGATIVE", "topics": [<taxonomy label>, ...], "urgent": bool}`
//! (`is_urgent` is accepted as an alias for `urgent`).

use crate::models::{Classification, Sentiment, Topic};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use thiserror::Error;

use super::heuristic;

/// Reasons a completion fails the schema
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("Malformed JSON: {0}")]
    Malformed(String),

    #[error("Completion is not a JSON object")]
    NotAnObject,

    #[error("Missing field: {0}")]
    MissingField(&'static str),

    #[error("Field '{field}' has wrong type (expected {expected})")]
    WrongType {
        field: &'static str,
        expected: &'static str,
    },

    #[error("Unknown sentiment: {0}")]
    UnknownSentiment(String),

    #[error("Topic outside taxonomy: {0}")]
    UnknownTopic(String),

    #[error("Topic list is empty")]
    EmptyTopics,
}

/// A schema-valid AI classification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AiVerdict {
    pub sentiment: Sentiment,
    pub topics: BTreeSet<Topic>,
    /// The model's own urgency opinion
    pub reported_urgent: bool,
}

impl AiVerdict {
    /// Classification to store for `text`
    ///
    /// `urgent` comes from the shared urgency rule applied to the AI
    /// sentiment. The second value is true when the model's own flag
    /// disagrees with the rule.
    pub fn into_classification(self, text: &str) -> (Classification, bool) {
        let urgent = heuristic::derive_urgency(self.sentiment, text);
        let disagreement = urgent != self.reported_urgent;
        (
            Classification {
                sentiment: self.sentiment,
                topics: self.topics,
                urgent,
            },
            disagreement,
        )
    }
}

/// Decode and validate a raw completion body
pub fn validate_completion(raw: &str) -> Result<AiVerdict, SchemaError> {
    let value: Value =
        serde_json::from_str(raw.trim()).map_err(|e| SchemaError::Malformed(e.to_string()))?;
    let object = value.as_object().ok_or(SchemaError::NotAnObject)?;

    Ok(AiVerdict {
        sentiment: decode_sentiment(object)?,
        topics: decode_topics(object)?,
        reported_urgent: decode_urgent(object)?,
    })
}

fn decode_sentiment(object: &Map<String, Value>) -> Result<Sentiment, SchemaError> {
    let raw = object
        .get("sentiment")
        .ok_or(SchemaError::MissingField("sentiment"))?
        .as_str()
        .ok_or(SchemaError::WrongType {
            field: "sentiment",
            expected: "string",
        })?;

    Sentiment::parse(raw).ok_or_else(|| SchemaError::UnknownSentiment(raw.to_string()))
}

fn decode_topics(object: &Map<String, Value>) -> Result<BTreeSet<Topic>, SchemaError> {
    let items = object
        .get("topics")
        .ok_or(SchemaError::MissingField("topics"))?
        .as_array()
        .ok_or(SchemaError::WrongType {
            field: "topics",
            expected: "array of strings",
        })?;

    let mut topics = BTreeSet::new();
    for item in items {
        let label = item.as_str().ok_or(SchemaError::WrongType {
            field: "topics",
            expected: "array of strings",
        })?;
        let topic = Topic::parse(label).ok_or_else(|| SchemaError::UnknownTopic(label.to_string()))?;
        topics.insert(topic);
    }

    if topics.is_empty() {
        return Err(SchemaError::EmptyTopics);
    }
    Ok(topics)
}

fn decode_urgent(object: &Map<String, Value>) -> Result<bool, SchemaError> {
    object
        .get("urgent")
        .or_else(|| object.get("is_urgent"))
        .ok_or(SchemaError::MissingField("urgent"))?
        .as_bool()
        .ok_or(SchemaError::WrongType {
            field: "urgent",
            expected: "boolean",
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_completion() {
        let verdict =
            validate_completion(r#"{"sentiment": "NEGATIVE", "topics": ["Billing"], "urgent": true}"#)
                .unwrap();
        assert_eq!(verdict.sentiment, Sentiment::Negative);
        assert_eq!(verdict.topics, [Topic::Billing].into_iter().collect());
        assert!(verdict.reported_urgent);
    }

    #[test]
    fn test_alias_and_case_tolerance() {
        let verdict =
            validate_completion(r#"{"sentiment": "positive", "topics": ["ux", "General"], "is_urgent": false}"#)
                .unwrap();
        assert_eq!(verdict.sentiment, Sentiment::Positive);
        assert_eq!(verdict.topics.len(), 2);
    }

    #[test]
    fn test_malformed_json_rejected() {
        assert!(matches!(
            validate_completion("{sentiment: NEGATIVE"),
            Err(SchemaError::Malformed(_))
        ));
        assert_eq!(validate_completion("[1, 2]"), Err(SchemaError::NotAnObject));
    }

    #[test]
    fn test_missing_fields_rejected() {
        assert_eq!(
            validate_completion(r#"{"sentiment": "POSITIVE"}"#),
            Err(SchemaError::MissingField("topics"))
        );
        assert_eq!(
            validate_completion(r#"{"sentiment": "POSITIVE", "topics": ["General"]}"#),
            Err(SchemaError::MissingField("urgent"))
        );
    }

    #[test]
    fn test_wrong_types_rejected() {
        assert!(matches!(
            validate_completion(r#"{"sentiment": "POSITIVE", "topics": "NotAList", "urgent": true}"#),
            Err(SchemaError::WrongType { field: "topics", .. })
        ));
        assert!(matches!(
            validate_completion(r#"{"sentiment": "POSITIVE", "topics": ["General"], "urgent": "yes"}"#),
            Err(SchemaError::WrongType { field: "urgent", .. })
        ));
        assert!(matches!(
            validate_completion(r#"{"sentiment": 1, "topics": ["General"], "urgent": true}"#),
            Err(SchemaError::WrongType { field: "sentiment", .. })
        ));
    }

    #[test]
    fn test_enum_and_taxonomy_enforced() {
        assert_eq!(
            validate_completion(r#"{"sentiment": "SUPER_HAPPY", "topics": ["General"], "urgent": false}"#),
            Err(SchemaError::UnknownSentiment("SUPER_HAPPY".into()))
        );
        assert_eq!(
            validate_completion(r#"{"sentiment": "NEUTRAL", "topics": ["Shipping"], "urgent": false}"#),
            Err(SchemaError::UnknownTopic("Shipping".into()))
        );
        assert_eq!(
            validate_completion(r#"{"sentiment": "NEUTRAL", "topics": [], "urgent": false}"#),
            Err(SchemaError::EmptyTopics)
        );
    }

    #[test]
    fn test_urgency_recomputed_from_rule() {
        let verdict = AiVerdict {
            sentiment: Sentiment::Negative,
            topics: [Topic::Billing].into_iter().collect(),
            reported_urgent: true,
        };

        let (classification, disagreement) = verdict.clone().into_classification("This looks like fraud");
        assert!(classification.urgent);
        assert!(!disagreement);

        let (classification, disagreement) = verdict.into_classification("Charged twice");
        assert!(!classification.urgent);
        assert!(disagreement);
    }
}
