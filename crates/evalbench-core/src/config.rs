//! Benchmark configuration.
//!
//! Every section has serde defaults, so a TOML file only needs the keys it
//! overrides:
//!
//! ```toml
//! [sandbox]
//! python = "python3.11"
//!
//! [tolerance]
//! rtol = 1e-6
//!
//! [performance]
//! repetitions = 7
//!
//! [memory]
//! case_budget_ms = 2000
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::compare::Tolerance;
use crate::domain::error::{BenchError, Result};
use crate::sandbox::SandboxConfig;

/// Settings for the correctness grader.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CorrectnessConfig {
    /// Wall-clock budget for one test case (milliseconds).
    pub case_budget_ms: u64,
    /// Upper bound on concurrently running sandboxes.
    pub max_concurrency: usize,
}

impl Default for CorrectnessConfig {
    fn default() -> Self {
        Self {
            case_budget_ms: 5_000,
            max_concurrency: 4,
        }
    }
}

/// Settings for the performance grader.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PerformanceConfig {
    /// Wall-clock budget for one call (milliseconds).
    pub case_budget_ms: u64,
    /// Timing repetitions per test case; the median is used.
    pub repetitions: u32,
    /// Exponent `k` in `score = (optimal / candidate) ^ k`.
    pub decay_exponent: f64,
    /// Above this fraction of failed cases the score is capped.
    pub max_failure_fraction: f64,
    /// Cap applied when too many cases fail.
    pub failure_score_cap: f64,
    /// Upper bound on concurrently graded solutions. Timings are noisier
    /// under contention, so the default is sequential.
    pub max_concurrency: usize,
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            case_budget_ms: 5_000,
            repetitions: 5,
            decay_exponent: 1.0,
            max_failure_fraction: 0.5,
            failure_score_cap: 0.1,
            max_concurrency: 1,
        }
    }
}

/// Settings for the memory grader.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MemoryConfig {
    /// Wall-clock budget for one call (milliseconds).
    pub case_budget_ms: u64,
    /// Above this fraction of failed cases the score is capped.
    pub max_failure_fraction: f64,
    /// Cap applied when too many cases fail.
    pub failure_score_cap: f64,
    pub max_concurrency: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            case_budget_ms: 5_000,
            max_failure_fraction: 0.5,
            failure_score_cap: 0.1,
            max_concurrency: 2,
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BenchConfig {
    pub sandbox: SandboxConfig,
    pub tolerance: Tolerance,
    pub correctness: CorrectnessConfig,
    pub performance: PerformanceConfig,
    pub memory: MemoryConfig,
}

impl BenchConfig {
    /// Parse from TOML text and validate.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: BenchConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        self.sandbox
            .validate()
            .map_err(|e| BenchError::InvalidConfig(e.to_string()))?;

        if !self.tolerance.is_valid() {
            return Err(BenchError::InvalidConfig(
                "tolerance rtol/atol must be finite and non-negative".into(),
            ));
        }
        if self.correctness.case_budget_ms == 0
            || self.performance.case_budget_ms == 0
            || self.memory.case_budget_ms == 0
        {
            return Err(BenchError::InvalidConfig(
                "case_budget_ms must be positive".into(),
            ));
        }
        if self.correctness.max_concurrency == 0
            || self.performance.max_concurrency == 0
            || self.memory.max_concurrency == 0
        {
            return Err(BenchError::InvalidConfig(
                "max_concurrency must be at least 1".into(),
            ));
        }

        let perf = &self.performance;
        if perf.repetitions == 0 {
            return Err(BenchError::InvalidConfig(
                "performance.repetitions must be at least 1".into(),
            ));
        }
        if !(perf.decay_exponent.is_finite() && perf.decay_exponent > 0.0) {
            return Err(BenchError::InvalidConfig(
                "performance.decay_exponent must be positive".into(),
            ));
        }
        let memory = &self.memory;
        for (name, value) in [
            ("performance.max_failure_fraction", perf.max_failure_fraction),
            ("performance.failure_score_cap", perf.failure_score_cap),
            ("memory.max_failure_fraction", memory.max_failure_fraction),
            ("memory.failure_score_cap", memory.failure_score_cap),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(BenchError::InvalidConfig(format!(
                    "{name} must be within [0, 1]"
                )));
            }
        }
        Ok(())
    }
}
