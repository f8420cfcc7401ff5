//! Topic name and topic filter validation.
//!
//! Topic names are concrete publish destinations and may not contain
//! wildcards. Topic filters are subscription patterns where `+` matches one
//! level and `#` matches the remaining levels.

use crate::error::ProtocolError;

const MAX_TOPIC_LEN: usize = u16::MAX as usize;

fn invalid(topic: &str, reason: &'static str) -> ProtocolError {
    ProtocolError::InvalidTopic {
        topic: topic.to_string(),
        reason,
    }
}

fn check_common(topic: &str) -> Result<(), ProtocolError> {
    if topic.is_empty() {
        return Err(invalid(topic, "empty"));
    }
    if topic.len() > MAX_TOPIC_LEN {
        return Err(ProtocolError::StringTooLong(topic.len()));
    }
    if topic.contains('\0') {
        return Err(invalid(topic, "contains NUL"));
    }
    Ok(())
}

/// Validate a topic name used for PUBLISH.
pub fn validate_topic_name(topic: &str) -> Result<(), ProtocolError> {
    check_common(topic)?;
    if topic.contains(['+', '#']) {
        return Err(invalid(topic, "wildcards are not allowed in topic names"));
    }
    Ok(())
}

/// Validate a topic filter used for SUBSCRIBE / UNSUBSCRIBE.
pub fn validate_topic_filter(filter: &str) -> Result<(), ProtocolError> {
    check_common(filter)?;

    let mut levels = filter.split('/').peekable();
    while let Some(level) = levels.next() {
        let last = levels.peek().is_none();
        match level {
            "#" if !last => return Err(invalid(filter, "'#' must be the last level")),
            "#" | "+" => {}
            _ if level.contains(['+', '#']) => {
                return Err(invalid(filter, "wildcard must occupy a whole level"));
            }
            _ => {}
        }
    }
    Ok(())
}
