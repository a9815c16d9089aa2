//! Karma Ledger: durable append-only log of reputation deltas plus a per-persona cache of
//! running totals.
//!
//! The log is the source of truth. The cache is hydrated by one full replay on first use and
//! then updated only after a write has been made durable, so a failed append never leaves the
//! cache ahead of the log.

mod entry;
mod log;
mod ring;

pub use entry::LedgerEntry;
pub use log::{FileLedgerLog, LedgerLog};
use ring::RingBuffer;

use std::collections::{HashMap, HashSet};
use std::io::Write;
use std::path::PathBuf;
use tracing::{debug, info, warn};

use crate::error::{LedgerError, LedgerResult};

/// Default location of the karma log.
pub const DEFAULT_LEDGER_PATH: &str = "./data/karma.log";

/// Default bound on distinct personas held in the cache.
pub const DEFAULT_CACHE_CAPACITY: usize = 1024;

/// How a successful `record` was stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    /// Appended to the durable log, then cached.
    Persisted,
    /// No durable log is configured; only the cache was updated.
    CacheOnly,
}

/// Counters from the last replay.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayStats {
    pub lines: usize,
    pub applied: usize,
    pub skipped: usize,
    /// Distinct personas left out of the cache because it was full.
    pub overflowed: usize,
}

pub struct KarmaLedger {
    log: Option<Box<dyn LedgerLog>>,
    cache: HashMap<String, i64>,
    /// Personas in the log that did not fit in the cache at hydration.
    overflow: HashSet<String>,
    capacity: usize,
    loaded: bool,
    replay_stats: ReplayStats,
}

impl KarmaLedger {
    /// Ledger backed by a text file at `path`. Nothing is read until the first query.
    pub fn open(path: impl Into<PathBuf>, capacity: usize) -> Self {
        Self::with_log(FileLedgerLog::new(path), capacity)
    }

    pub fn with_log(log: impl LedgerLog + 'static, capacity: usize) -> Self {
        Self {
            log: Some(Box::new(log)),
            cache: HashMap::new(),
            overflow: HashSet::new(),
            capacity,
            loaded: false,
            replay_stats: ReplayStats::default(),
        }
    }

    /// Ledger with no durable backing; every write reports [`RecordOutcome::CacheOnly`].
    pub fn in_memory(capacity: usize) -> Self {
        Self {
            log: None,
            cache: HashMap::new(),
            overflow: HashSet::new(),
            capacity,
            loaded: true,
            replay_stats: ReplayStats::default(),
        }
    }

    /// Current running total for `persona`, or `None` if it has no entries.
    /// Personas that did not fit in the cache at hydration report `CapacityExceeded`.
    pub fn get_total(&mut self, persona: &str) -> LedgerResult<Option<i64>> {
        self.ensure_loaded()?;
        self.check_overflow(persona)?;
        Ok(self.cache.get(persona).copied())
    }

    /// Appends an entry and, once it is durable, caches `new_total` for `persona`.
    ///
    /// `new_total` is trusted as given. A mismatch with `cached + delta` is logged, not corrected.
    pub fn record(
        &mut self,
        persona: &str,
        delta: i64,
        new_total: i64,
        reason: &str,
    ) -> LedgerResult<RecordOutcome> {
        entry::validate_fields(persona, reason)?;
        self.ensure_loaded()?;
        self.check_overflow(persona)?;

        match self.cache.get(persona) {
            Some(&previous) => {
                let expected = previous.saturating_add(delta);
                if expected != new_total {
                    warn!(
                        target: "persona::ledger",
                        persona,
                        previous,
                        delta,
                        new_total,
                        expected,
                        "Caller-supplied total disagrees with cached total + delta"
                    );
                }
            }
            None if self.cache.len() >= self.capacity => {
                return Err(LedgerError::CapacityExceeded {
                    persona: persona.to_string(),
                    capacity: self.capacity,
                });
            }
            None => {}
        }

        let entry = LedgerEntry::now(persona, delta, new_total, reason);
        let outcome = match self.log.as_mut() {
            Some(log) => {
                log.append(&entry.to_line())
                    .map_err(|source| LedgerError::NotPersisted {
                        persona: persona.to_string(),
                        source,
                    })?;
                RecordOutcome::Persisted
            }
            None => RecordOutcome::CacheOnly,
        };
        self.cache.insert(persona.to_string(), new_total);
        debug!(
            target: "persona::ledger",
            persona,
            delta,
            new_total,
            outcome = ?outcome,
            "Karma recorded"
        );
        Ok(outcome)
    }

    /// Applies `delta` to the cached total (0 for an unseen persona) and records the result.
    pub fn adjust(
        &mut self,
        persona: &str,
        delta: i64,
        reason: &str,
    ) -> LedgerResult<(i64, RecordOutcome)> {
        let current = self.get_total(persona)?.unwrap_or(0);
        let new_total = current.saturating_add(delta);
        let outcome = self.record(persona, delta, new_total, reason)?;
        Ok((new_total, outcome))
    }

    /// The most recent `max_entries` entries (optionally for one persona), oldest first.
    /// Replays the whole log; diagnostic use only.
    pub fn recent(
        &self,
        persona_filter: Option<&str>,
        max_entries: usize,
    ) -> LedgerResult<Vec<LedgerEntry>> {
        let mut ring = RingBuffer::new(max_entries);
        for entry in self.replay()?.0 {
            if persona_filter.map_or(true, |p| entry.persona == p) {
                ring.push(entry);
            }
        }
        Ok(ring.into_vec())
    }

    /// Renders [`Self::recent`] to `out`, one entry per line. Returns the number of entries written.
    pub fn print<W: Write>(
        &self,
        out: &mut W,
        persona_filter: Option<&str>,
        max_entries: usize,
    ) -> LedgerResult<usize> {
        let entries = self.recent(persona_filter, max_entries)?;
        writeln!(
            out,
            "karma ledger ({}): {} entr{}{}",
            self.describe(),
            entries.len(),
            if entries.len() == 1 { "y" } else { "ies" },
            persona_filter
                .map(|p| format!(" for '{p}'"))
                .unwrap_or_default()
        )?;
        for entry in &entries {
            writeln!(out, "{entry}")?;
        }
        Ok(entries.len())
    }

    /// Drops the cache and replays the log again.
    pub fn reload(&mut self) -> LedgerResult<()> {
        if self.log.is_none() {
            return Ok(());
        }
        self.loaded = false;
        self.cache.clear();
        self.overflow.clear();
        self.ensure_loaded()
    }

    /// Personas currently cached, sorted.
    pub fn cached_personas(&self) -> Vec<&str> {
        let mut personas: Vec<&str> = self.cache.keys().map(String::as_str).collect();
        personas.sort_unstable();
        personas
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn replay_stats(&self) -> ReplayStats {
        self.replay_stats
    }

    fn describe(&self) -> String {
        self.log
            .as_ref()
            .map_or_else(|| "in-memory".to_string(), |log| log.describe())
    }

    fn ensure_loaded(&mut self) -> LedgerResult<()> {
        if self.loaded {
            return Ok(());
        }
        let (entries, mut stats) = self.replay()?;
        let mut cache: HashMap<String, i64> = HashMap::new();
        let mut overflow = HashSet::new();
        for entry in entries {
            if !cache.contains_key(&entry.persona) && cache.len() >= self.capacity {
                overflow.insert(entry.persona);
                continue;
            }
            cache.insert(entry.persona, entry.running_total);
            stats.applied += 1;
        }
        stats.overflowed = overflow.len();
        if !overflow.is_empty() {
            warn!(
                target: "persona::ledger",
                capacity = self.capacity,
                overflowed = stats.overflowed,
                "Ledger holds more personas than the cache; extra personas are unavailable"
            );
        }
        info!(
            target: "persona::ledger",
            log = %self.describe(),
            lines = stats.lines,
            applied = stats.applied,
            skipped = stats.skipped,
            personas = cache.len(),
            "Karma ledger hydrated"
        );
        self.cache = cache;
        self.overflow = overflow;
        self.replay_stats = stats;
        self.loaded = true;
        Ok(())
    }

    fn check_overflow(&self, persona: &str) -> LedgerResult<()> {
        if self.overflow.contains(persona) {
            return Err(LedgerError::CapacityExceeded {
                persona: persona.to_string(),
                capacity: self.capacity,
            });
        }
        Ok(())
    }

    /// Parses every line of the log. Malformed lines are skipped and counted.
    fn replay(&self) -> LedgerResult<(Vec<LedgerEntry>, ReplayStats)> {
        let mut stats = ReplayStats::default();
        let Some(log) = self.log.as_ref() else {
            return Ok((Vec::new(), stats));
        };
        let mut entries = Vec::new();
        for (index, line) in log.read_lines()?.iter().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            stats.lines += 1;
            match LedgerEntry::parse_line(line) {
                Some(entry) => entries.push(entry),
                None => {
                    stats.skipped += 1;
                    warn!(
                        target: "persona::ledger",
                        line = index + 1,
                        log = %log.describe(),
                        "Skipping malformed ledger line"
                    );
                }
            }
        }
        Ok((entries, stats))
    }
}
