//! One karma ledger record and its line format:
//! `<RFC 3339 UTC timestamp>|<persona>|<delta>|<new_total>|<reason>`.
//!
//! `reason` is the remainder of the line, so it may contain `|` but never a newline.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{LedgerError, LedgerResult};

const FIELD_SEPARATOR: char = '|';

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub timestamp: DateTime<Utc>,
    pub persona: String,
    pub delta: i64,
    pub running_total: i64,
    pub reason: String,
}

impl LedgerEntry {
    /// Entry stamped with the current wall-clock time (second precision, as persisted).
    pub fn now(
        persona: impl Into<String>,
        delta: i64,
        running_total: i64,
        reason: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        let timestamp = DateTime::from_timestamp(now.timestamp(), 0).unwrap_or(now);
        Self {
            timestamp,
            persona: persona.into(),
            delta,
            running_total,
            reason: reason.into(),
        }
    }

    /// Serialized line, without the trailing newline.
    pub fn to_line(&self) -> String {
        format!(
            "{}|{}|{}|{}|{}",
            self.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
            self.persona,
            self.delta,
            self.running_total,
            self.reason
        )
    }

    /// Parses one persisted line. Returns `None` for malformed input.
    pub fn parse_line(line: &str) -> Option<Self> {
        let line = line.trim_end_matches(['\r', '\n']);
        let mut fields = line.splitn(5, FIELD_SEPARATOR);
        let timestamp = DateTime::parse_from_rfc3339(fields.next()?.trim())
            .ok()?
            .with_timezone(&Utc);
        let persona = fields.next()?;
        if persona.is_empty() {
            return None;
        }
        let delta = fields.next()?.trim().parse().ok()?;
        let running_total = fields.next()?.trim().parse().ok()?;
        let reason = fields.next()?;
        Some(Self {
            timestamp,
            persona: persona.to_string(),
            delta,
            running_total,
            reason: reason.to_string(),
        })
    }
}

impl fmt::Display for LedgerEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}  {:<16} {:>+6} => {:>6}  {}",
            self.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
            self.persona,
            self.delta,
            self.running_total,
            self.reason
        )
    }
}

/// Rejects values that would break the line format.
pub(crate) fn validate_fields(persona: &str, reason: &str) -> LedgerResult<()> {
    if persona.is_empty() {
        return Err(LedgerError::InvalidField {
            field: "persona",
            detail: "must not be empty".to_string(),
        });
    }
    if persona.contains([FIELD_SEPARATOR, '\n', '\r']) {
        return Err(LedgerError::InvalidField {
            field: "persona",
            detail: format!("'{}' contains a separator or newline", persona.escape_debug()),
        });
    }
    if reason.contains(['\n', '\r']) {
        return Err(LedgerError::InvalidField {
            field: "reason",
            detail: "must not contain a newline".to_string(),
        });
    }
    Ok(())
}
