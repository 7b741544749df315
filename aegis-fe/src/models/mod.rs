//! Data models for the feedback engine

pub mod feedback;

pub use feedback::{
    AiUpgrade, Classification, ClassificationSource, Department, FeedbackRecord, FeedbackStats,
    NewFeedback, Sentiment, Topic,
};
