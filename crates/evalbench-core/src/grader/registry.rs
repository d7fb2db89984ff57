//! Grader lookup by stable id.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use super::{
    CorrectnessGrader, Grader, HalsteadGrader, HumanLikeGrader, MemoryGrader, PerformanceGrader,
};
use crate::compare::Comparator;
use crate::config::BenchConfig;
use crate::domain::{BenchError, Result};
use crate::sandbox::Sandbox;

/// Maps grader ids to grader instances.
#[derive(Clone, Default)]
pub struct GraderRegistry {
    graders: BTreeMap<String, Arc<dyn Grader>>,
}

impl GraderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every built-in grader: `correctness`, `performance`,
    /// `memory`, `halstead` and `humanlikeness`.
    pub fn with_builtin(config: &BenchConfig) -> Self {
        let sandbox = Sandbox::new(config.sandbox.clone());
        let comparator = Comparator::new(config.tolerance);

        let mut registry = Self::new();
        registry.register(Arc::new(CorrectnessGrader::new(
            sandbox.clone(),
            comparator,
            config.correctness.clone(),
        )));
        registry.register(Arc::new(PerformanceGrader::new(
            sandbox.clone(),
            comparator,
            config.performance.clone(),
        )));
        registry.register(Arc::new(MemoryGrader::new(
            sandbox,
            comparator,
            config.memory.clone(),
        )));
        registry.register(Arc::new(HalsteadGrader::new()));
        registry.register(Arc::new(HumanLikeGrader::new()));
        registry
    }

    /// Add a grader, returning the one it replaced under the same id.
    pub fn register(&mut self, grader: Arc<dyn Grader>) -> Option<Arc<dyn Grader>> {
        self.graders.insert(grader.identifier().to_string(), grader)
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn Grader>> {
        self.graders.get(id).cloned()
    }

    /// Look up graders in request order. Unknown ids are an error.
    pub fn resolve<S: AsRef<str>>(&self, ids: &[S]) -> Result<Vec<Arc<dyn Grader>>> {
        ids.iter()
            .map(|id| {
                let id = id.as_ref();
                self.get(id)
                    .ok_or_else(|| BenchError::UnknownGrader(id.to_string()))
            })
            .collect()
    }

    /// Registered ids, sorted.
    pub fn identifiers(&self) -> Vec<&str> {
        self.graders.keys().map(String::as_str).collect()
    }
}

impl fmt::Debug for GraderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GraderRegistry")
            .field("graders", &self.identifiers())
            .finish()
    }
}
