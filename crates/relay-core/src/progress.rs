//! Progress tracking for long-running handlers.

use std::sync::{PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::CoreError;

/// Serializable view of a [`Progress`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub current: f64,
    pub total: f64,
    pub percentage: f64,
    pub status: Option<String>,
    pub metadata: Map<String, Value>,
    pub is_complete: bool,
}

#[derive(Debug, Default)]
struct State {
    current: f64,
    status: Option<String>,
    metadata: Map<String, Value>,
}

/// Counter bounded to `[0, total]` with a status line and merged metadata.
#[derive(Debug)]
pub struct Progress {
    total: f64,
    state: RwLock<State>,
}

impl Default for Progress {
    fn default() -> Self {
        Self {
            total: 100.0,
            state: RwLock::new(State::default()),
        }
    }
}

impl Progress {
    /// Create a tracker for `total` units of work.
    ///
    /// # Errors
    /// Returns error if `total` is not a positive finite number.
    pub fn new(total: f64) -> Result<Self, CoreError> {
        if !total.is_finite() || total <= 0.0 {
            return Err(CoreError::InvalidTotal(total));
        }
        Ok(Self {
            total,
            state: RwLock::new(State::default()),
        })
    }

    /// Set the current value.
    ///
    /// The value is clamped to `[0, total]`; NaN counts as 0. `status`
    /// replaces the previous status only when given. `metadata` is merged
    /// key by key into what was recorded before.
    pub fn update(&self, value: f64, status: Option<&str>, metadata: Option<Map<String, Value>>) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        Self::apply(&mut state, self.total, value, status, metadata);
    }

    /// Advance the current value by `delta`.
    pub fn increment(&self, delta: f64, status: Option<&str>, metadata: Option<Map<String, Value>>) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let value = state.current + delta;
        Self::apply(&mut state, self.total, value, status, metadata);
    }

    fn apply(
        state: &mut State,
        total: f64,
        value: f64,
        status: Option<&str>,
        metadata: Option<Map<String, Value>>,
    ) {
        state.current = if value.is_nan() { 0.0 } else { value.clamp(0.0, total) };
        if let Some(status) = status {
            state.status = Some(status.to_string());
        }
        if let Some(patch) = metadata {
            state.metadata.extend(patch);
        }
    }

    /// Back to zero with no status or metadata.
    pub fn reset(&self) {
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = State::default();
    }

    #[must_use]
    pub fn current(&self) -> f64 {
        self.state.read().unwrap_or_else(PoisonError::into_inner).current
    }

    #[must_use]
    pub const fn total(&self) -> f64 {
        self.total
    }

    #[must_use]
    pub fn status(&self) -> Option<String> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .status
            .clone()
    }

    #[must_use]
    pub fn metadata(&self) -> Map<String, Value> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .metadata
            .clone()
    }

    #[must_use]
    pub fn percentage(&self) -> f64 {
        self.current() / self.total * 100.0
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.current() >= self.total
    }

    /// Every field plus the derived percentage and completion flag.
    #[must_use]
    pub fn snapshot(&self) -> ProgressSnapshot {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        ProgressSnapshot {
            current: state.current,
            total: self.total,
            percentage: state.current / self.total * 100.0,
            status: state.status.clone(),
            metadata: state.metadata.clone(),
            is_complete: state.current >= self.total,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn meta(value: Value) -> Option<Map<String, Value>> {
        value.as_object().cloned()
    }

    #[test]
    fn test_update() {
        let progress = Progress::new(100.0).unwrap();
        progress.update(50.0, Some("Processing"), meta(json!({"step": "analysis"})));
        assert!((progress.current() - 50.0).abs() < f64::EPSILON);
        assert_eq!(progress.status().as_deref(), Some("Processing"));
        assert_eq!(progress.metadata(), meta(json!({"step": "analysis"})).unwrap());
    }

    #[test]
    fn test_increment_merges_metadata() {
        let progress = Progress::new(100.0).unwrap();
        progress.update(40.0, Some("Starting"), meta(json!({"step": "load", "file": "a.txt"})));
        progress.increment(10.0, Some("Moving forward"), meta(json!({"step": "next"})));

        assert!((progress.current() - 50.0).abs() < f64::EPSILON);
        assert_eq!(progress.status().as_deref(), Some("Moving forward"));
        assert_eq!(
            progress.metadata(),
            meta(json!({"step": "next", "file": "a.txt"})).unwrap()
        );
    }

    #[test]
    fn test_status_kept_when_not_given() {
        let progress = Progress::default();
        progress.update(10.0, Some("Working"), None);
        progress.increment(5.0, None, None);
        assert_eq!(progress.status().as_deref(), Some("Working"));
    }

    #[test]
    fn test_clamps_to_bounds() {
        let progress = Progress::new(100.0).unwrap();
        progress.update(150.0, None, None);
        assert!((progress.current() - 100.0).abs() < f64::EPSILON);
        assert!(progress.is_complete());

        progress.update(-5.0, None, None);
        assert!(progress.current().abs() < f64::EPSILON);

        progress.update(f64::NAN, None, None);
        assert!(progress.current().abs() < f64::EPSILON);

        progress.update(90.0, None, None);
        progress.increment(1_000.0, None, None);
        assert!((progress.current() - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_percentage_and_completion() {
        let progress = Progress::new(100.0).unwrap();
        assert!(!progress.is_complete());
        progress.update(75.0, None, None);
        assert!((progress.percentage() - 75.0).abs() < f64::EPSILON);

        let small = Progress::new(8.0).unwrap();
        small.update(2.0, None, None);
        assert!((small.percentage() - 25.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_reset() {
        let progress = Progress::new(100.0).unwrap();
        progress.update(50.0, Some("Processing"), meta(json!({"step": "analysis"})));
        progress.reset();
        assert!(progress.current().abs() < f64::EPSILON);
        assert_eq!(progress.status(), None);
        assert!(progress.metadata().is_empty());
    }

    #[test]
    fn test_rejects_invalid_total() {
        assert_eq!(Progress::new(0.0).unwrap_err(), CoreError::InvalidTotal(0.0));
        assert!(Progress::new(-1.0).is_err());
        assert!(Progress::new(f64::INFINITY).is_err());
    }

    #[test]
    fn test_snapshot() {
        let progress = Progress::new(100.0).unwrap();
        progress.update(50.0, Some("Processing"), meta(json!({"step": "analysis"})));
        assert_eq!(
            serde_json::to_value(progress.snapshot()).unwrap(),
            json!({
                "current": 50.0,
                "total": 100.0,
                "percentage": 50.0,
                "status": "Processing",
                "metadata": {"step": "analysis"},
                "is_complete": false,
            })
        );
    }
}
