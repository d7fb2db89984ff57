//! Structured results of a sandboxed call.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// What happened when a candidate was executed. Exactly one variant applies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExecutionOutcome {
    Success {
        value: Value,
    },
    RuntimeFailure {
        message: String,
        #[serde(default)]
        trace: String,
    },
    SyntaxFailure {
        message: String,
    },
    Timeout {
        #[serde(with = "duration_ms")]
        elapsed: Duration,
    },
}

impl ExecutionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ExecutionOutcome::Success { .. })
    }

    /// The returned value, if the call succeeded.
    pub fn value(&self) -> Option<&Value> {
        match self {
            ExecutionOutcome::Success { value } => Some(value),
            _ => None,
        }
    }

    /// Short description used in issue text.
    pub fn summary(&self) -> String {
        match self {
            ExecutionOutcome::Success { value } => value.to_string(),
            ExecutionOutcome::RuntimeFailure { message, .. } => message.clone(),
            ExecutionOutcome::SyntaxFailure { message } => message.clone(),
            ExecutionOutcome::Timeout { elapsed } => {
                format!("timed out after {}ms", elapsed.as_millis())
            }
        }
    }
}

/// An outcome plus the diagnostics collected alongside it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Execution {
    pub outcome: ExecutionOutcome,
    /// Captured candidate stdout; never part of the return value.
    #[serde(default)]
    pub stdout: String,
    /// Per-call durations, one per timing repetition. Empty unless timing was
    /// requested and the call succeeded.
    #[serde(default, with = "duration_ms_vec")]
    pub timings: Vec<Duration>,
    /// Peak traced allocation of one call, in bytes. Only set when memory
    /// measurement was requested and the call succeeded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peak_memory: Option<u64>,
}

impl Execution {
    pub fn from_outcome(outcome: ExecutionOutcome) -> Self {
        Self {
            outcome,
            stdout: String::new(),
            timings: Vec::new(),
            peak_memory: None,
        }
    }

    /// Median of the per-call durations.
    pub fn median_timing(&self) -> Option<Duration> {
        median(&self.timings)
    }
}

/// Median of a set of durations; the mean of the middle pair for even counts.
pub fn median(durations: &[Duration]) -> Option<Duration> {
    if durations.is_empty() {
        return None;
    }
    let mut sorted = durations.to_vec();
    sorted.sort();
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 1 {
        Some(sorted[mid])
    } else {
        Some((sorted[mid - 1] + sorted[mid]) / 2)
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

mod duration_ms_vec {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(v: &[Duration], s: S) -> Result<S::Ok, S::Error> {
        let ms: Vec<f64> = v.iter().map(|d| d.as_secs_f64() * 1_000.0).collect();
        ms.serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<Duration>, D::Error> {
        let ms = Vec::<f64>::deserialize(d)?;
        Ok(ms
            .into_iter()
            .filter(|m| m.is_finite() && *m >= 0.0)
            .map(|m| Duration::from_secs_f64(m / 1_000.0))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_outcome_serializes_tagged() {
        let outcome = ExecutionOutcome::Timeout {
            elapsed: Duration::from_millis(250),
        };
        assert_eq!(
            serde_json::to_value(&outcome).unwrap(),
            json!({"status": "timeout", "elapsed": 250})
        );
    }

    #[test]
    fn test_summary() {
        let ok = ExecutionOutcome::Success { value: json!(3) };
        assert_eq!(ok.summary(), "3");
        assert_eq!(ok.value(), Some(&json!(3)));
        let slow = ExecutionOutcome::Timeout {
            elapsed: Duration::from_millis(200),
        };
        assert_eq!(slow.summary(), "timed out after 200ms");
        assert!(slow.value().is_none());
    }

    #[test]
    fn test_median() {
        let ms = |v: u64| Duration::from_millis(v);
        assert_eq!(median(&[]), None);
        assert_eq!(median(&[ms(5), ms(1), ms(3)]), Some(ms(3)));
        assert_eq!(median(&[ms(4), ms(1), ms(2), ms(3)]), Some(Duration::from_micros(2_500)));
    }
}
