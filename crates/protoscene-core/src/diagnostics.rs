// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Bounded diagnostic log for problems that are reported rather than returned.
//!
//! Skipped internal routes, unresolvable IS targets and failed EXTERNPROTO
//! resolutions do not fail the operation that hit them. They are written
//! here (and to `tracing`) so embedders and tests can see them.

use std::collections::VecDeque;

/// Diagnostic severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    /// Informational.
    Info,
    /// Something was skipped; the operation carried on.
    Warn,
    /// Something failed outright.
    Error,
}

/// What a diagnostic is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticSource {
    /// Internal route re-created on an instance.
    Route,
    /// IS mapping wired on an instance.
    IsMapping,
    /// Event delivery.
    Event,
    /// EXTERNPROTO resolution.
    Resolution,
}

/// Identifier for a diagnostic entry.
pub type DiagnosticId = u64;

/// One logged problem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// Stable identifier.
    pub id: DiagnosticId,
    /// Severity.
    pub severity: Severity,
    /// Subsystem.
    pub source: DiagnosticSource,
    /// Human readable message.
    pub message: String,
    /// How many consecutive times this exact message was reported.
    pub repeats: u32,
}

/// In-memory diagnostic queue holding at most `capacity` entries.
///
/// The oldest entry is dropped when full. A report identical to the newest
/// entry bumps its `repeats` instead of adding a line.
#[derive(Debug, Clone)]
pub struct Diagnostics {
    entries: VecDeque<Diagnostic>,
    capacity: usize,
    next_id: DiagnosticId,
}

impl Diagnostics {
    /// Empty log; a zero capacity is treated as one.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            capacity: capacity.max(1),
            next_id: 1,
        }
    }

    /// Records a diagnostic and returns its id.
    pub fn push(
        &mut self,
        severity: Severity,
        source: DiagnosticSource,
        message: impl Into<String>,
    ) -> DiagnosticId {
        let message = message.into();
        if let Some(last) = self.entries.back_mut() {
            if last.severity == severity && last.source == source && last.message == message {
                last.repeats = last.repeats.saturating_add(1);
                return last.id;
            }
        }
        let id = self.next_id;
        self.next_id += 1;
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(Diagnostic {
            id,
            severity,
            source,
            message,
            repeats: 1,
        });
        id
    }

    /// Entries oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter()
    }

    /// Entries from `source`, oldest first.
    pub fn from_source(&self, source: DiagnosticSource) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter().filter(move |d| d.source == source)
    }

    /// Removes and returns every entry.
    pub fn drain(&mut self) -> Vec<Diagnostic> {
        self.entries.drain(..).collect()
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// `true` when nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeats_collapse_and_capacity_evicts_oldest() {
        let mut log = Diagnostics::new(2);
        let first = log.push(Severity::Warn, DiagnosticSource::Route, "a");
        assert_eq!(log.push(Severity::Warn, DiagnosticSource::Route, "a"), first);
        log.push(Severity::Warn, DiagnosticSource::Route, "b");
        log.push(Severity::Error, DiagnosticSource::Resolution, "c");

        let messages: Vec<_> = log.iter().map(|d| d.message.as_str()).collect();
        assert_eq!(messages, ["b", "c"]);
        assert_eq!(log.from_source(DiagnosticSource::Resolution).count(), 1);
        assert_eq!(log.drain().len(), 2);
        assert!(log.is_empty());
    }
}
