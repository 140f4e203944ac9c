//! Partial-failure accumulation for per-zone batch stages.

use std::fmt;

/// A zone that was skipped, with the reason.
#[derive(Debug, Clone, PartialEq)]
pub struct ZoneFailure {
    /// Zone identifier.
    pub zone_id: String,
    /// Human-readable reason.
    pub reason: String,
}

/// Result of running one stage over many zones.
///
/// Per-zone errors never abort the stage; they are folded into `failed`
/// while successful outputs accumulate in `succeeded`.
#[derive(Debug)]
pub struct BatchOutcome<T> {
    /// Outputs of zones that completed.
    pub succeeded: Vec<T>,
    /// Zones that were skipped.
    pub failed: Vec<ZoneFailure>,
}

impl<T> Default for BatchOutcome<T> {
    fn default() -> Self {
        Self {
            succeeded: Vec::new(),
            failed: Vec::new(),
        }
    }
}

impl<T> BatchOutcome<T> {
    /// Folds one zone's result into the outcome.
    pub fn record<E: fmt::Display>(mut self, zone_id: &str, result: Result<T, E>) -> Self {
        match result {
            Ok(value) => self.succeeded.push(value),
            Err(e) => self.failed.push(ZoneFailure {
                zone_id: zone_id.to_string(),
                reason: e.to_string(),
            }),
        }
        self
    }

    /// Builds an outcome from `(zone_id, result)` pairs.
    pub fn from_results<E, I>(results: I) -> Self
    where
        E: fmt::Display,
        I: IntoIterator<Item = (String, Result<T, E>)>,
    {
        results
            .into_iter()
            .fold(Self::default(), |acc, (id, r)| acc.record(&id, r))
    }

    /// Number of zones attempted.
    pub fn attempted(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fold_keeps_going_after_failures() {
        let results = vec![
            ("Z-0001".to_string(), Ok(1)),
            ("Z-0002".to_string(), Err("timeout")),
            ("Z-0003".to_string(), Ok(3)),
        ];
        let outcome = BatchOutcome::from_results(results);
        assert_eq!(outcome.succeeded, vec![1, 3]);
        assert_eq!(outcome.failed.len(), 1);
        assert_eq!(outcome.failed[0].zone_id, "Z-0002");
        assert_eq!(outcome.failed[0].reason, "timeout");
        assert_eq!(outcome.attempted(), 3);
    }
}
