//! State transition history tracking.
//!
//! Every committed transition is recorded with a timestamp. History is
//! serializable so applications can persist it from their own state-change
//! handlers; the engine itself never persists anything.

use super::state::StateId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Serializable snapshot of a state identity.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateRecord {
    pub label: String,
    /// Parameter type names, in order.
    pub signature: Vec<String>,
}

impl From<&StateId> for StateRecord {
    fn from(id: &StateId) -> Self {
        Self {
            label: id.label().to_string(),
            signature: id.signature().iter().map(|t| t.name().to_string()).collect(),
        }
    }
}

/// Record of a single state transition.
///
/// Activation is recorded with `from: None` and no label.
///
/// # Example
///
/// ```rust
/// use stagehand::core::{StateId, StateTransition};
/// use chrono::Utc;
///
/// let transition = StateTransition {
///     from: Some((&StateId::new("Pending")).into()),
///     to: (&StateId::new("Running")).into(),
///     label: Some("Start".to_string()),
///     timestamp: Utc::now(),
/// };
/// assert_eq!(transition.to.label, "Running");
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StateTransition {
    pub from: Option<StateRecord>,
    pub to: StateRecord,
    pub label: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Ordered history of state transitions.
///
/// `record` returns a new history with the transition added; `push` appends
/// in place. A history built with [`with_limit`](Self::with_limit) keeps only
/// the most recent transitions.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct StateHistory {
    transitions: Vec<StateTransition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    limit: Option<usize>,
}

impl StateHistory {
    pub fn new() -> Self {
        Self {
            transitions: Vec::new(),
            limit: None,
        }
    }

    /// History that retains at most `limit` transitions.
    pub fn with_limit(limit: usize) -> Self {
        Self {
            transitions: Vec::new(),
            limit: Some(limit),
        }
    }

    pub fn limit(&self) -> Option<usize> {
        self.limit
    }

    /// Record a transition, returning a new history.
    pub fn record(&self, transition: StateTransition) -> Self {
        let mut history = self.clone();
        history.push(transition);
        history
    }

    /// Append a transition, dropping the oldest ones beyond the limit.
    pub fn push(&mut self, transition: StateTransition) {
        self.transitions.push(transition);
        if let Some(limit) = self.limit {
            let excess = self.transitions.len().saturating_sub(limit);
            if excess > 0 {
                self.transitions.drain(..excess);
            }
        }
    }

    /// Get the path of states traversed.
    ///
    /// Returns the first recorded source (if any), then the target of each
    /// transition.
    pub fn get_path(&self) -> Vec<&StateRecord> {
        let mut path = Vec::new();
        if let Some(from) = self.transitions.first().and_then(|t| t.from.as_ref()) {
            path.push(from);
        }
        for transition in &self.transitions {
            path.push(&transition.to);
        }
        path
    }

    /// Time between the first and last recorded transitions.
    pub fn duration(&self) -> Option<Duration> {
        if let (Some(first), Some(last)) = (self.transitions.first(), self.transitions.last()) {
            let duration = last.timestamp.signed_duration_since(first.timestamp);
            duration.to_std().ok()
        } else {
            None
        }
    }

    pub fn transitions(&self) -> &[StateTransition] {
        &self.transitions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(from: Option<&str>, to: &str, timestamp: DateTime<Utc>) -> StateTransition {
        StateTransition {
            from: from.map(|label| (&StateId::new(label)).into()),
            to: (&StateId::new(to)).into(),
            label: from.map(|_| format!("To {to}")),
            timestamp,
        }
    }

    #[test]
    fn new_history_is_empty() {
        let history = StateHistory::new();
        assert_eq!(history.transitions().len(), 0);
        assert!(history.get_path().is_empty());
        assert!(history.duration().is_none());
    }

    #[test]
    fn record_is_immutable() {
        let history = StateHistory::new();
        let new_history = history.record(step(Some("Initial"), "Processing", Utc::now()));

        assert_eq!(history.transitions().len(), 0);
        assert_eq!(new_history.transitions().len(), 1);
    }

    #[test]
    fn get_path_starts_at_activation() {
        let history = StateHistory::new()
            .record(step(None, "Initial", Utc::now()))
            .record(step(Some("Initial"), "Processing", Utc::now()))
            .record(step(Some("Processing"), "Complete", Utc::now()));

        let labels: Vec<&str> = history.get_path().iter().map(|s| s.label.as_str()).collect();
        assert_eq!(labels, vec!["Initial", "Processing", "Complete"]);
    }

    #[test]
    fn get_path_includes_first_source() {
        let history = StateHistory::new().record(step(Some("A"), "B", Utc::now()));

        let labels: Vec<&str> = history.get_path().iter().map(|s| s.label.as_str()).collect();
        assert_eq!(labels, vec!["A", "B"]);
    }

    #[test]
    fn duration_calculates_elapsed_time() {
        let start = Utc::now();
        let history = StateHistory::new()
            .record(step(None, "A", start))
            .record(step(Some("A"), "B", start + chrono::Duration::milliseconds(25)));

        assert_eq!(history.duration(), Some(Duration::from_millis(25)));
    }

    #[test]
    fn push_appends_in_place() {
        let mut history = StateHistory::new();
        history.push(step(None, "A", Utc::now()));
        history.push(step(Some("A"), "B", Utc::now()));

        assert_eq!(history.transitions().len(), 2);
        assert_eq!(history.limit(), None);
    }

    #[test]
    fn limit_keeps_most_recent() {
        let mut history = StateHistory::with_limit(2);
        history.push(step(None, "A", Utc::now()));
        history.push(step(Some("A"), "B", Utc::now()));
        history.push(step(Some("B"), "C", Utc::now()));

        let labels: Vec<&str> = history.get_path().iter().map(|s| s.label.as_str()).collect();
        assert_eq!(labels, vec!["A", "B", "C"]);
        assert_eq!(history.transitions().len(), 2);
        assert_eq!(history.transitions()[0].to.label, "B");
    }

    #[test]
    fn zero_limit_keeps_nothing() {
        let history = StateHistory::with_limit(0).record(step(None, "A", Utc::now()));
        assert!(history.transitions().is_empty());
    }

    #[test]
    fn record_captures_signature_names() {
        let record = StateRecord::from(&StateId::of::<(u32, bool)>("Busy"));
        assert_eq!(record.signature, vec!["u32".to_string(), "bool".to_string()]);
    }

    #[test]
    fn history_serializes_correctly() {
        let history = StateHistory::new().record(step(Some("Initial"), "Processing", Utc::now()));

        let json = serde_json::to_string(&history).unwrap();
        let deserialized: StateHistory = serde_json::from_str(&json).unwrap();

        assert_eq!(deserialized.transitions().len(), 1);
        assert_eq!(deserialized.transitions()[0].to, history.transitions()[0].to);
    }
}
