//! Topic-pattern matching and subscriptions (spec §3, §4.4).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::error::Result;

use super::message::Message;

/// How a matched handler is invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryMode {
    /// Runs synchronously on the publisher's thread; the publisher blocks.
    Inline,
    /// Wrapped as a priority job and dispatched on the bus's worker pool.
    Worker,
}

/// A segment of a parsed topic pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    /// `*` — matches exactly one segment.
    One,
    /// `**` — matches zero or more trailing segments; only legal as the
    /// final segment of a pattern.
    Tail,
}

/// A parsed, matchable topic pattern. Segment-wise, case-sensitive.
#[derive(Debug, Clone)]
pub struct TopicPattern {
    raw: String,
    segments: Vec<Segment>,
}

impl TopicPattern {
    pub fn parse(pattern: &str) -> Self {
        let segments = pattern
            .split('/')
            .map(|s| match s {
                "*" => Segment::One,
                "**" => Segment::Tail,
                other => Segment::Literal(other.to_string()),
            })
            .collect();
        Self {
            raw: pattern.to_string(),
            segments,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Does `topic` match this pattern?
    pub fn matches(&self, topic: &str) -> bool {
        let topic_segments: Vec<&str> = topic.split('/').collect();
        Self::match_segments(&self.segments, &topic_segments)
    }

    fn match_segments(pattern: &[Segment], topic: &[&str]) -> bool {
        match pattern.first() {
            None => topic.is_empty(),
            Some(Segment::Tail) => true,
            Some(Segment::One) => {
                !topic.is_empty() && Self::match_segments(&pattern[1..], &topic[1..])
            }
            Some(Segment::Literal(lit)) => {
                !topic.is_empty() && topic[0] == lit && Self::match_segments(&pattern[1..], &topic[1..])
            }
        }
    }
}

/// A predicate invoked before dispatch; `false` skips the subscription
/// without counting it as an error (spec §4.4 "Filters").
pub type Filter = Arc<dyn Fn(&Message) -> bool + Send + Sync>;

/// A notification-style bus handler: observes the message, reports failure
/// via `Result` (an `Err` is counted but does not affect other subscribers).
pub type Handler = Arc<dyn Fn(&Message) -> Result<()> + Send + Sync>;

static NEXT_SUBSCRIPTION_ID: AtomicU64 = AtomicU64::new(1);

/// A single topic subscription.
pub struct Subscription {
    pub id: String,
    pub pattern: TopicPattern,
    pub handler: Handler,
    pub filter: Option<Filter>,
    pub delivery_mode: DeliveryMode,
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("pattern", &self.pattern.as_str())
            .field("delivery_mode", &self.delivery_mode)
            .finish()
    }
}

impl Subscription {
    pub fn new(
        pattern: &str,
        handler: Handler,
        delivery_mode: DeliveryMode,
        filter: Option<Filter>,
    ) -> Self {
        let seq = NEXT_SUBSCRIPTION_ID.fetch_add(1, Ordering::Relaxed);
        Self {
            id: format!("sub-{seq}"),
            pattern: TopicPattern::parse(pattern),
            handler,
            filter,
            delivery_mode,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_segments_match_exactly() {
        let p = TopicPattern::parse("orders/created");
        assert!(p.matches("orders/created"));
        assert!(!p.matches("orders/updated"));
        assert!(!p.matches("orders/created/extra"));
    }

    #[test]
    fn single_wildcard_matches_exactly_one_segment() {
        let p = TopicPattern::parse("orders/*/created");
        assert!(p.matches("orders/123/created"));
        assert!(!p.matches("orders/created"));
        assert!(!p.matches("orders/123/456/created"));
    }

    #[test]
    fn tail_wildcard_matches_zero_or_more_trailing_segments() {
        let p = TopicPattern::parse("orders/**");
        assert!(p.matches("orders"));
        assert!(p.matches("orders/created"));
        assert!(p.matches("orders/created/extra/more"));
        assert!(!p.matches("shipments/created"));
    }

    #[test]
    fn matching_is_case_sensitive() {
        let p = TopicPattern::parse("Orders/Created");
        assert!(!p.matches("orders/created"));
    }
}
