use std::fmt;
use thiserror::Error;

/// Key selecting the handler for a message; compared case-sensitively
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MessageTypeKey(String);

impl MessageTypeKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageTypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MessageTypeKey {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TopicError {
    #[error("Malformed topic '{topic}': {reason}")]
    Malformed { topic: String, reason: String },
}

/// Topic split into its `<prefix>/<deviceId>/<messageType>` segments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedTopic {
    pub topic: String,
    pub prefix: String,
    pub device_id: String,
    pub message_type: MessageTypeKey,
}

/// Parser for three-segment device topics.
///
/// The delimiter and an optional required prefix come from deployment
/// configuration. Anything that is not exactly three non-empty segments is
/// rejected.
#[derive(Debug, Clone)]
pub struct TopicParser {
    delimiter: char,
    expected_prefix: Option<String>,
}

impl Default for TopicParser {
    fn default() -> Self {
        Self {
            delimiter: '/',
            expected_prefix: None,
        }
    }
}

impl TopicParser {
    pub fn new(delimiter: char, expected_prefix: Option<String>) -> Self {
        Self {
            delimiter,
            expected_prefix: expected_prefix.filter(|p| !p.trim().is_empty()),
        }
    }

    /// Parse a topic in the format `{prefix}/{device_id}/{message_type}`
    ///
    /// # Examples
    /// ```
    /// use ingestion_worker::domain::TopicParser;
    ///
    /// let parsed = TopicParser::default().parse("v2x/R328328/SSW").unwrap();
    /// assert_eq!(parsed.device_id, "R328328");
    /// assert_eq!(parsed.message_type.as_str(), "SSW");
    /// ```
    pub fn parse(&self, topic: &str) -> Result<ParsedTopic, TopicError> {
        let malformed = |reason: String| TopicError::Malformed {
            topic: topic.to_string(),
            reason,
        };

        let parts: Vec<&str> = topic.split(self.delimiter).map(str::trim).collect();
        if parts.len() != 3 {
            return Err(malformed(format!(
                "expected 3 segments separated by '{}', found {}",
                self.delimiter,
                parts.len()
            )));
        }

        for (name, segment) in ["prefix", "device ID", "message type"].iter().zip(&parts) {
            if segment.is_empty() {
                return Err(malformed(format!("{} cannot be empty", name)));
            }
            if segment.contains(['+', '#']) {
                return Err(malformed(format!("{} contains a wildcard", name)));
            }
        }

        if let Some(expected) = &self.expected_prefix {
            if parts[0] != expected {
                return Err(malformed(format!(
                    "prefix '{}' does not match '{}'",
                    parts[0], expected
                )));
            }
        }

        Ok(ParsedTopic {
            topic: topic.to_string(),
            prefix: parts[0].to_string(),
            device_id: parts[1].to_string(),
            message_type: MessageTypeKey::new(parts[2]),
        })
    }
}
