//! Deterministic fallback classifier
//!
//! Lexicon sentiment scoring, keyword topic detection and the urgency rule.
//! Synchronous, allocation-light and bounded by input length, so it always
//! finishes well inside the race deadline.
//!
//! [`derive_urgency`] is shared with the AI path: the stored `urgent` flag is
//! always recomputed from the stored sentiment and the sanitized text,
//! whichever classifier produced the sentiment.

use crate::models::{Classification, Sentiment, Topic};
use std::collections::BTreeSet;

/// Provider label for heuristic results
pub const HEURISTIC_PROVIDER: &str = "heuristic";

/// Compound score at or beyond which sentiment is non-neutral
const SENTIMENT_THRESHOLD: f64 = 0.05;

/// Normalization constant for the compound score
const NORMALIZATION_ALPHA: f64 = 15.0;

/// Valence multiplier applied to words following a negator
const NEGATION_SCALAR: f64 = -0.74;

/// Tokens after a negator that it still affects
const NEGATION_WINDOW: usize = 2;

const INTENSIFIER_BOOST: f64 = 0.293;
const EXCLAMATION_BOOST: f64 = 0.292;
const MAX_EXCLAMATIONS: usize = 4;

const NEGATORS: &[&str] = &[
    "not", "no", "never", "dont", "doesnt", "didnt", "isnt", "wasnt", "arent", "cant",
    "cannot", "wont", "nothing", "without", "hardly",
];

const INTENSIFIERS: &[&str] = &[
    "very", "extremely", "really", "so", "super", "incredibly", "absolutely", "totally",
    "completely", "too", "utterly",
];

const BILLING_KEYWORDS: &[&str] = &[
    "charge", "charged", "charges", "charging", "overcharged", "credit", "card", "refund",
    "refunds", "refunded", "bill", "billed", "billing", "invoice", "invoices", "cost", "costs",
    "price", "pricing", "payment", "payments", "subscription", "fee", "fees",
];

const TECHNICAL_KEYWORDS: &[&str] = &[
    "bug", "bugs", "buggy", "crash", "crashed", "crashes", "crashing", "error", "errors", "fail",
    "failed", "fails", "failing", "failure", "slow", "login", "app", "down", "outage", "broken",
    "freeze", "freezes", "frozen", "timeout", "loading", "server",
];

const UX_KEYWORDS: &[&str] = &[
    "ugly", "confusing", "confused", "hard", "color", "colors", "colour", "button", "buttons",
    "nav", "navigation", "interface", "design", "layout", "menu", "font", "ui", "ux",
    "usability",
];

const SECURITY_KEYWORDS: &[&str] = &[
    "password", "passwords", "hacked", "hack", "hacker", "breach", "suspicious", "auth",
    "authentication", "phishing", "stolen", "unauthorized", "2fa", "mfa",
];

/// Presence alone makes feedback urgent
const RISK_KEYWORDS: &[&str] = &[
    "lawsuit", "lawsuits", "sue", "suing", "lawyer", "attorney", "illegal", "gdpr", "emergency",
    "fraud", "fraudulent", "police", "danger", "dangerous", "injury", "injured",
];

/// Makes NEGATIVE feedback urgent
const ESCALATION_KEYWORDS: &[&str] = &[
    "hate", "furious", "unacceptable", "worst", "scam", "disgusting", "outraged", "terrible",
    "horrible",
];

/// Classify sanitized text
pub fn classify(text: &str) -> Classification {
    let tokens = tokenize(text);
    let sentiment = sentiment_from_score(compound_score(text, &tokens));

    Classification {
        sentiment,
        topics: topics_from_tokens(&tokens),
        urgent: urgency_from_tokens(sentiment, &tokens),
    }
}

/// Urgency rule shared by both classifiers
///
/// Urgent iff a risk keyword is present, or the sentiment is NEGATIVE and an
/// escalation keyword is present.
pub fn derive_urgency(sentiment: Sentiment, text: &str) -> bool {
    urgency_from_tokens(sentiment, &tokenize(text))
}

fn sentiment_from_score(score: f64) -> Sentiment {
    if score >= SENTIMENT_THRESHOLD {
        Sentiment::Positive
    } else if score <= -SENTIMENT_THRESHOLD {
        Sentiment::Negative
    } else {
        Sentiment::Neutral
    }
}

fn urgency_from_tokens(sentiment: Sentiment, tokens: &[String]) -> bool {
    let risk = tokens.iter().any(|t| RISK_KEYWORDS.contains(&t.as_str()));
    let escalation = sentiment == Sentiment::Negative
        && tokens.iter().any(|t| ESCALATION_KEYWORDS.contains(&t.as_str()));
    risk || escalation
}

fn topics_from_tokens(tokens: &[String]) -> BTreeSet<Topic> {
    let table: [(Topic, &[&str]); 4] = [
        (Topic::Billing, BILLING_KEYWORDS),
        (Topic::Technical, TECHNICAL_KEYWORDS),
        (Topic::Ux, UX_KEYWORDS),
        (Topic::Security, SECURITY_KEYWORDS),
    ];

    let mut topics: BTreeSet<Topic> = table
        .iter()
        .filter(|(_, words)| tokens.iter().any(|t| words.contains(&t.as_str())))
        .map(|(topic, _)| *topic)
        .collect();

    if topics.is_empty() {
        topics.insert(Topic::General);
    }
    topics
}

fn compound_score(text: &str, tokens: &[String]) -> f64 {
    let mut sum = 0.0;
    let mut negation_left = 0usize;
    let mut boost = 0.0;

    for token in tokens {
        let word = token.as_str();

        if NEGATORS.contains(&word) {
            negation_left = NEGATION_WINDOW;
            continue;
        }
        if INTENSIFIERS.contains(&word) {
            boost += INTENSIFIER_BOOST;
            continue;
        }

        if let Some(base) = valence(word) {
            let mut value = base + boost * base.signum();
            if negation_left > 0 {
                value *= NEGATION_SCALAR;
            }
            sum += value;
        }

        boost = 0.0;
        negation_left = negation_left.saturating_sub(1);
    }

    if sum != 0.0 {
        let exclamations = text.matches('!').count().min(MAX_EXCLAMATIONS) as f64;
        sum += exclamations * EXCLAMATION_BOOST * sum.signum();
    }

    let normalized = sum / (sum * sum + NORMALIZATION_ALPHA).sqrt();
    normalized.clamp(-1.0, 1.0)
}

/// Lowercase word tokens with apostrophes removed ("don't" -> "dont")
fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !(c.is_alphanumeric() || c == '\''))
        .map(|t| t.replace('\'', "").to_lowercase())
        .filter(|t| !t.is_empty())
        .collect()
}

fn valence(word: &str) -> Option<f64> {
    let value = match word {
        // positive
        "great" => 3.1,
        "excellent" => 3.2,
        "best" => 3.2,
        "love" | "loved" | "loving" => 3.2,
        "awesome" => 3.1,
        "amazing" => 2.8,
        "wonderful" => 2.7,
        "perfect" => 2.7,
        "happy" => 2.7,
        "beautiful" => 2.9,
        "fantastic" => 2.6,
        "impressive" | "impressed" => 2.2,
        "friendly" => 2.2,
        "glad" => 2.0,
        "good" => 1.9,
        "easy" => 1.9,
        "thanks" | "thank" => 1.9,
        "pleased" => 1.9,
        "helpful" => 1.8,
        "nice" => 1.8,
        "satisfied" => 1.8,
        "appreciate" | "appreciated" => 1.8,
        "reliable" => 1.8,
        "intuitive" => 1.6,
        "recommend" => 1.5,
        "smooth" => 1.2,
        "fast" | "quick" => 1.0,
        "working" | "works" => 0.6,
        // negative
        "worst" => -3.1,
        "hate" | "hated" => -2.7,
        "furious" => -2.7,
        "illegal" => -2.6,
        "horrible" => -2.5,
        "bad" => -2.5,
        "fraud" | "fraudulent" => -2.5,
        "danger" => -2.4,
        "fail" | "failed" | "fails" | "failure" => -2.3,
        "angry" => -2.3,
        "ugly" => -2.3,
        "scam" => -2.2,
        "terrible" => -2.1,
        "dangerous" => -2.1,
        "poor" => -2.1,
        "wrong" => -2.1,
        "awful" => -2.0,
        "frustrated" | "frustrating" => -2.0,
        "unacceptable" => -2.0,
        "rude" => -2.0,
        "stolen" => -2.0,
        "garbage" => -2.0,
        "disappointed" | "disappointing" => -1.9,
        "ridiculous" => -1.9,
        "broken" => -1.8,
        "useless" => -1.8,
        "hacked" => -1.8,
        "overcharged" => -1.8,
        "annoying" => -1.7,
        "crash" | "crashed" | "crashes" | "crashing" => -1.7,
        "problem" | "problems" => -1.7,
        "emergency" => -1.6,
        "lawsuit" => -1.5,
        "sucks" => -1.5,
        "buggy" => -1.5,
        "error" | "errors" => -1.4,
        "confusing" => -1.3,
        "suspicious" => -1.3,
        "lost" => -1.3,
        "slow" => -1.0,
        "bug" | "bugs" => -1.0,
        "issue" | "issues" => -0.8,
        "expensive" => -0.9,
        _ => return None,
    };
    Some(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sentiment_score(text: &str) -> f64 {
        compound_score(text, &tokenize(text))
    }

    fn detect_topics(text: &str) -> BTreeSet<Topic> {
        topics_from_tokens(&tokenize(text))
    }

    #[test]
    fn test_great_service_is_positive_general() {
        let result = classify("Great service!");
        assert_eq!(result.sentiment, Sentiment::Positive);
        assert_eq!(result.topics, [Topic::General].into_iter().collect());
        assert!(!result.urgent);
    }

    #[test]
    fn test_negative_billing() {
        let result = classify("I was overcharged on my credit card and the refund never came");
        assert_eq!(result.sentiment, Sentiment::Negative);
        assert!(result.topics.contains(&Topic::Billing));
        assert!(!result.topics.contains(&Topic::General));
    }

    #[test]
    fn test_negation_flips_polarity() {
        assert!(sentiment_score("The app is good") > 0.0);
        assert!(sentiment_score("The app is not good") < 0.0);
        assert!(sentiment_score("The app isn't working") < 0.0);
    }

    #[test]
    fn test_intensifier_and_exclamation_strengthen() {
        let plain = sentiment_score("good");
        let intensified = sentiment_score("very good");
        let exclaimed = sentiment_score("good!!");
        assert!(intensified > plain);
        assert!(exclaimed > plain);
    }

    #[test]
    fn test_neutral_without_lexicon_hits() {
        assert_eq!(classify("Where do I change my email address").sentiment, Sentiment::Neutral);
    }

    #[test]
    fn test_multi_label_topics() {
        let topics = detect_topics("Login button is ugly and my password was hacked");
        assert!(topics.contains(&Topic::Technical));
        assert!(topics.contains(&Topic::Ux));
        assert!(topics.contains(&Topic::Security));
    }

    #[test]
    fn test_whole_word_matching() {
        // "happy" must not match "app", "issue" must not match "sue"
        let result = classify("I am happy there is no issue");
        assert!(!result.topics.contains(&Topic::Technical));
        assert!(!result.urgent);
    }

    #[test]
    fn test_risk_keyword_is_urgent() {
        let result = classify("The system is down! Lawsuit incoming!");
        assert!(result.urgent);
        assert!(result.topics.contains(&Topic::Technical));
    }

    #[test]
    fn test_escalation_requires_negative_sentiment() {
        assert!(derive_urgency(Sentiment::Negative, "This is the worst"));
        assert!(!derive_urgency(Sentiment::Positive, "This is the worst"));
        assert!(!derive_urgency(Sentiment::Neutral, "I hate to ask, but"));
    }

    #[test]
    fn test_urgency_is_deterministic_per_sentiment() {
        let text = "Possible fraud on my account";
        for sentiment in [Sentiment::Positive, Sentiment::Neutral, Sentiment::Negative] {
            assert_eq!(derive_urgency(sentiment, text), derive_urgency(sentiment, text));
            assert!(derive_urgency(sentiment, text));
        }
    }

    #[test]
    fn test_score_is_bounded() {
        let score = sentiment_score("worst worst worst horrible awful hate hate hate!!!!!!");
        assert!((-1.0..=1.0).contains(&score));
        assert!(score < -0.9);
    }
}
