//! Broker topology shared by every jobwire process.
//!
//! One durable topic exchange (`jobs`), queues bound with `job.*`, and a
//! per-channel prefetch of 20. These values are the wire contract with the
//! broker; changing the exchange type or durability requires deleting the
//! exchange on the broker first, otherwise redeclaration is refused.

use crate::channel::{ExchangeKind, ExchangeSpec};

/// Name of the exchange all jobs are published to.
pub const JOBS_EXCHANGE: &str = "jobs";

/// Binding pattern used by job consumers.
pub const JOB_BINDING_PATTERN: &str = "job.*";

/// Routing key used for newly submitted jobs.
pub const JOB_CREATE_ROUTING_KEY: &str = "job.create";

/// Maximum number of unacknowledged deliveries per consumer channel.
pub const DEFAULT_PREFETCH: u16 = 20;

/// The `jobs` exchange as declared at startup.
pub fn jobs_exchange() -> ExchangeSpec {
    ExchangeSpec::durable(JOBS_EXCHANGE, ExchangeKind::Topic)
}

/// AMQP topic matching.
///
/// Routing keys and patterns are dot-delimited words. In a pattern, `*`
/// matches exactly one word and `#` matches zero or more words.
///
/// ```
/// use jobwire_broker::topology::topic_matches;
///
/// assert!(topic_matches("job.*", "job.create"));
/// assert!(!topic_matches("job.*", "job.create.retry"));
/// assert!(topic_matches("job.#", "job.create.retry"));
/// ```
pub fn topic_matches(pattern: &str, routing_key: &str) -> bool {
    let pattern = words(pattern);
    let key = words(routing_key);
    match_words(&pattern, &key)
}

fn words(s: &str) -> Vec<&str> {
    if s.is_empty() {
        Vec::new()
    } else {
        s.split('.').collect()
    }
}

fn match_words(pattern: &[&str], key: &[&str]) -> bool {
    match pattern.split_first() {
        None => key.is_empty(),
        Some((&"#", rest)) => {
            // Collapse runs of `#`; they are equivalent to a single one.
            if rest.first() == Some(&"#") {
                return match_words(rest, key);
            }
            (0..=key.len()).any(|skip| match_words(rest, &key[skip..]))
        }
        Some((&"*", rest)) => !key.is_empty() && match_words(rest, &key[1..]),
        Some((word, rest)) => key.first() == Some(word) && match_words(rest, &key[1..]),
    }
}
