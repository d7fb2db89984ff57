//! Per-call memo of reference-solution measurements.
//!
//! Relative graders compare every candidate against the problem's
//! `optimal_solution` on the same inputs. The reference is measured once per
//! (problem, input) within a single `grade` call and reused for every
//! candidate of that problem.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use serde_json::Value;

use crate::domain::ProblemDefinition;

/// What the reference solution did on one input.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ReferenceRun<M> {
    Measured(M),
    /// Description of the reference's failure, used in issue text.
    Failed(String),
}

type Key = (String, String);

/// Reference measurements keyed by problem id and serialized arguments.
#[derive(Debug)]
pub(crate) struct ReferenceCache<M> {
    runs: Mutex<HashMap<Key, ReferenceRun<M>>>,
}

impl<M> Default for ReferenceCache<M> {
    fn default() -> Self {
        Self {
            runs: Mutex::new(HashMap::new()),
        }
    }
}

impl<M: Clone> ReferenceCache<M> {
    pub(crate) fn key(problem: &ProblemDefinition, args: &[Value]) -> Key {
        (
            problem.identifier.clone(),
            Value::from(args.to_vec()).to_string(),
        )
    }

    pub(crate) fn get(&self, key: &Key) -> Option<ReferenceRun<M>> {
        self.runs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    /// Store `run` unless another task stored one first; returns the kept run
    /// so every candidate sees the same reference.
    pub(crate) fn insert(&self, key: Key, run: ReferenceRun<M>) -> ReferenceRun<M> {
        self.runs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(key)
            .or_insert(run)
            .clone()
    }

    pub(crate) fn len(&self) -> usize {
        self.runs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
