//! Halstead grading: static difficulty of the candidate source.
//!
//! Python source is split into operators (punctuation, arithmetic and
//! comparison symbols, keywords) and operands (names, numbers, strings).
//! Difficulty is `(n1 / 2) * (N2 / n2)`, with `n1` distinct operators, `N2`
//! total operands and `n2` distinct operands. The score compares the
//! candidate with the problem's optimal solution:
//! `min(1, optimal difficulty / candidate difficulty)`.

use std::collections::HashSet;
use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;

use super::{grade_source_against_optimal, optimal_source, Grader};
use crate::domain::{GradingOutput, LlmSolution, ProblemDefinition, Result};

pub const HALSTEAD: &str = "halstead";

const KEYWORD_OPERATORS: &[&str] = &[
    "and", "as", "assert", "async", "await", "break", "class", "continue", "def", "del", "elif",
    "else", "except", "finally", "for", "from", "global", "if", "import", "in", "is", "lambda",
    "nonlocal", "not", "or", "pass", "raise", "return", "try", "while", "with", "yield",
];

fn token_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(concat!(
            r##"(?P<string>(?:[rRbBuUfF]{1,2})?(?:'''(?s:.*?)'''|"""(?s:.*?)"""|'(?:\\.|[^'\\\n])*'|"(?:\\.|[^"\\\n])*"))"##,
            r##"|(?P<comment>#[^\n]*)"##,
            r##"|(?P<number>0[xXoObB][0-9a-fA-F_]+|\d[\d_]*(?:\.[\d_]*)?(?:[eE][+-]?\d+)?[jJ]?|\.\d[\d_]*(?:[eE][+-]?\d+)?[jJ]?)"##,
            r##"|(?P<name>[_\p{L}][_\p{L}\p{N}]*)"##,
            r##"|(?P<op>\*\*=|//=|>>=|<<=|->|:=|\*\*|//|<<|>>|<=|>=|==|!=|[-+*/%@&|^]=|[-+*/%@&|^~<>=.,:;()\[\]{}])"##,
        ))
        .expect("static regex")
    })
}

/// Operator and operand counts of a source text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HalsteadCounts {
    pub distinct_operators: usize,
    pub distinct_operands: usize,
    pub total_operators: usize,
    pub total_operands: usize,
}

impl HalsteadCounts {
    pub fn of(source: &str) -> Self {
        let mut operators = HashSet::new();
        let mut operands = HashSet::new();
        let mut counts = Self::default();

        for caps in token_pattern().captures_iter(source) {
            if let Some(op) = caps.name("op") {
                operators.insert(op.as_str());
                counts.total_operators += 1;
            } else if let Some(name) = caps.name("name") {
                let name = name.as_str();
                if KEYWORD_OPERATORS.contains(&name) {
                    operators.insert(name);
                    counts.total_operators += 1;
                } else {
                    operands.insert(name);
                    counts.total_operands += 1;
                }
            } else if let Some(literal) = caps.name("number").or_else(|| caps.name("string")) {
                operands.insert(literal.as_str());
                counts.total_operands += 1;
            }
        }

        counts.distinct_operators = operators.len();
        counts.distinct_operands = operands.len();
        counts
    }

    /// `(n1 / 2) * (N2 / n2)`; zero when there are no operands.
    pub fn difficulty(&self) -> f64 {
        if self.distinct_operands == 0 {
            return 0.0;
        }
        (self.distinct_operators as f64 / 2.0)
            * (self.total_operands as f64 / self.distinct_operands as f64)
    }
}

pub fn halstead_difficulty(source: &str) -> f64 {
    HalsteadCounts::of(source).difficulty()
}

fn relative_difficulty(candidate: f64, optimal: f64) -> f64 {
    if candidate <= optimal {
        1.0
    } else {
        optimal / candidate
    }
}

/// Scores how much harder to follow the candidate is than the reference.
#[derive(Debug, Clone, Copy, Default)]
pub struct HalsteadGrader;

impl HalsteadGrader {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Grader for HalsteadGrader {
    fn identifier(&self) -> &str {
        HALSTEAD
    }

    fn can_grade(&self, problems: &[ProblemDefinition]) -> bool {
        problems.iter().all(|p| optimal_source(p).is_some())
    }

    async fn grade(
        &self,
        problems: &[ProblemDefinition],
        solutions: &[LlmSolution],
    ) -> Result<GradingOutput> {
        grade_source_against_optimal(HALSTEAD, problems, solutions, |candidate, optimal| {
            relative_difficulty(halstead_difficulty(candidate), halstead_difficulty(optimal))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_simple_function() {
        let counts = HalsteadCounts::of("def add(a, b):\n    return a + b\n");
        // operators: def ( , ) : return +
        assert_eq!(counts.distinct_operators, 7);
        assert_eq!(counts.total_operators, 7);
        // operands: add a b a b
        assert_eq!(counts.distinct_operands, 3);
        assert_eq!(counts.total_operands, 5);
        let expected = (7.0 / 2.0) * (5.0 / 3.0);
        assert!((counts.difficulty() - expected).abs() < 1e-12);
    }

    #[test]
    fn test_strings_and_comments() {
        let counts = HalsteadCounts::of("x = 'a # not a comment'  # comment with + and -\n");
        assert_eq!(counts.total_operators, 1);
        assert_eq!(counts.total_operands, 2);
    }

    #[test]
    fn test_multi_char_operators_are_single_tokens() {
        let counts = HalsteadCounts::of("x **= 2\ny //= 3\n");
        assert_eq!(counts.distinct_operators, 2);
        assert_eq!(counts.total_operands, 4);
    }

    #[test]
    fn test_empty_source_has_zero_difficulty() {
        assert_eq!(halstead_difficulty(""), 0.0);
        assert_eq!(halstead_difficulty("# only a comment\n"), 0.0);
    }

    #[test]
    fn test_relative_difficulty() {
        assert_eq!(relative_difficulty(2.0, 4.0), 1.0);
        assert_eq!(relative_difficulty(0.0, 0.0), 1.0);
        assert!((relative_difficulty(8.0, 4.0) - 0.5).abs() < 1e-12);
    }
}
