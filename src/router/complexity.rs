//! Task complexity analysis.
//!
//! Turns request text into a four-axis [`ComplexityScore`] using vocabulary
//! hits and a handful of structural signals. The analyzer holds only
//! immutable data, so one instance can serve concurrent requests.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::constraints::RequestContext;

const REASONING_KEYWORDS: &[&str] = &[
    "analyze", "explain", "reason", "logic", "because", "therefore", "conclude", "infer",
    "deduce", "argue", "justify", "prove",
];

const KNOWLEDGE_KEYWORDS: &[&str] = &[
    "history", "science", "literature", "mathematics", "physics", "chemistry", "biology",
    "geography", "philosophy", "psychology", "economics", "politics", "law", "medicine",
    "technology",
];

const COMPUTATION_KEYWORDS: &[&str] = &[
    "calculate", "compute", "solve", "equation", "formula", "algorithm", "programming", "code",
    "debug", "optimize", "data", "statistics",
];

const COORDINATION_KEYWORDS: &[&str] = &[
    "plan", "schedule", "organize", "coordinate", "manage", "workflow", "steps", "process",
    "sequence", "timeline", "project", "task",
];

const QUESTION_TERMS: &[&str] = &["why", "how", "what if", "suppose"];
const KNOWLEDGE_MARKERS: &[&str] = &["research", "study", "theory", "concept"];
const MATH_OPERATORS: &[char] = &['+', '-', '*', '/', '=', '<', '>', '%'];
const CODE_TERMS: &[&str] = &["function", "variable", "loop", "condition", "array", "object"];
const SEQUENTIAL_TERMS: &[&str] = &["first", "second", "third", "next", "then", "finally", "step"];
const INTEGRATION_TERMS: &[&str] = &["coordinate", "collaborate", "integrate", "combine", "merge"];

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .map(|p| Regex::new(p).expect("built-in complexity pattern must compile"))
        .collect()
}

static LOGICAL_CONNECTIVES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        r"if.*then",
        r"because.*therefore",
        r"since.*thus",
        r"given.*conclude",
    ])
});

static HIGH_COMPLEXITY_SIGNALS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        r"multi-step|multiple steps",
        r"complex|complicated|sophisticated",
        r"detailed analysis|in-depth",
        r"comprehensive|thorough",
        r"advanced|expert level",
    ])
});

static NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+").expect("number pattern must compile"));

static PROPER_NOUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[A-Z][a-z]+\b").expect("proper noun pattern must compile"));

/// Three-way classification of a complexity total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComplexityLevel {
    Low,
    Medium,
    High,
}

impl ComplexityLevel {
    /// Classify a total score: LOW below 0.4, MEDIUM below 0.7, HIGH otherwise.
    pub fn from_total(total: f64) -> Self {
        if total < 0.4 {
            ComplexityLevel::Low
        } else if total < 0.7 {
            ComplexityLevel::Medium
        } else {
            ComplexityLevel::High
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ComplexityLevel::Low => "low",
            ComplexityLevel::Medium => "medium",
            ComplexityLevel::High => "high",
        }
    }

    /// Dense index for counter arrays.
    pub(crate) fn index(&self) -> usize {
        match self {
            ComplexityLevel::Low => 0,
            ComplexityLevel::Medium => 1,
            ComplexityLevel::High => 2,
        }
    }
}

impl fmt::Display for ComplexityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Four independent complexity axes, each in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ComplexityScore {
    pub reasoning: f64,
    pub knowledge: f64,
    pub computation: f64,
    pub coordination: f64,
}

impl ComplexityScore {
    /// Build a score, clamping each axis into `[0, 1]`.
    pub fn new(reasoning: f64, knowledge: f64, computation: f64, coordination: f64) -> Self {
        Self {
            reasoning: clamp_unit(reasoning),
            knowledge: clamp_unit(knowledge),
            computation: clamp_unit(computation),
            coordination: clamp_unit(coordination),
        }
    }

    /// Unweighted mean of the four axes.
    pub fn total_score(&self) -> f64 {
        (self.reasoning + self.knowledge + self.computation + self.coordination) / 4.0
    }

    pub fn complexity_level(&self) -> ComplexityLevel {
        ComplexityLevel::from_total(self.total_score())
    }
}

fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Caller hint about overall task difficulty.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComplexityHint {
    High,
    Low,
}

impl ComplexityHint {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "high" | "complex" | "advanced" => Some(Self::High),
            "low" | "simple" | "basic" => Some(Self::Low),
            _ => None,
        }
    }

    fn modifier(&self) -> f64 {
        match self {
            ComplexityHint::High => 1.5,
            ComplexityHint::Low => 0.7,
        }
    }
}

/// Caller hint about the subject area, boosting one axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Domain {
    /// academic, research, technical
    Scholarly,
    /// programming, math, engineering
    Quantitative,
}

impl Domain {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "academic" | "research" | "technical" => Some(Self::Scholarly),
            "programming" | "math" | "engineering" => Some(Self::Quantitative),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Axis {
    Reasoning,
    Knowledge,
    Computation,
    Coordination,
}

/// Heuristic complexity analyzer.
#[derive(Debug, Default, Clone, Copy)]
pub struct ComplexityAnalyzer;

impl ComplexityAnalyzer {
    pub fn new() -> Self {
        Self
    }

    /// Analyze `content`, applying any hints in `context`.
    ///
    /// Pure and deterministic: identical inputs give bit-identical scores.
    pub fn analyze(&self, content: &str, context: &RequestContext) -> ComplexityScore {
        let lower = content.to_lowercase();

        let shared = length_modifier(content) * pattern_modifier(&lower);
        let axis = |base: f64, which: Axis| base * shared * context_modifier(context, which);

        let score = ComplexityScore::new(
            axis(reasoning_base(&lower), Axis::Reasoning),
            axis(knowledge_base(content, &lower), Axis::Knowledge),
            axis(computation_base(&lower), Axis::Computation),
            axis(coordination_base(&lower), Axis::Coordination),
        );

        tracing::debug!(
            reasoning = score.reasoning,
            knowledge = score.knowledge,
            computation = score.computation,
            coordination = score.coordination,
            total = score.total_score(),
            level = %score.complexity_level(),
            "Complexity analysis"
        );

        score
    }
}

fn count_hits(text: &str, vocabulary: &[&str]) -> usize {
    vocabulary.iter().filter(|term| text.contains(*term)).count()
}

fn contains_any(text: &str, vocabulary: &[&str]) -> bool {
    vocabulary.iter().any(|term| text.contains(term))
}

fn reasoning_base(lower: &str) -> f64 {
    let mut score = (count_hits(lower, REASONING_KEYWORDS) as f64 * 0.1).min(0.5);
    score += LOGICAL_CONNECTIVES
        .iter()
        .filter(|re| re.is_match(lower))
        .count() as f64
        * 0.2;
    score += count_hits(lower, QUESTION_TERMS) as f64 * 0.15;
    score.min(1.0)
}

/// Proper nouns are counted on the original casing.
fn knowledge_base(original: &str, lower: &str) -> f64 {
    let mut score = (count_hits(lower, KNOWLEDGE_KEYWORDS) as f64 * 0.1).min(0.6);
    if contains_any(lower, KNOWLEDGE_MARKERS) {
        score += 0.2;
    }
    if PROPER_NOUN.find_iter(original).count() > 3 {
        score += 0.2;
    }
    score.min(1.0)
}

fn computation_base(lower: &str) -> f64 {
    let mut score = (count_hits(lower, COMPUTATION_KEYWORDS) as f64 * 0.15).min(0.5);
    if NUMBER.find_iter(lower).count() > 2 {
        score += 0.2;
    }
    if lower.contains(MATH_OPERATORS) {
        score += 0.2;
    }
    if contains_any(lower, CODE_TERMS) {
        score += 0.3;
    }
    score.min(1.0)
}

fn coordination_base(lower: &str) -> f64 {
    let mut score = (count_hits(lower, COORDINATION_KEYWORDS) as f64 * 0.1).min(0.4);
    if count_hits(lower, SEQUENTIAL_TERMS) > 2 {
        score += 0.3;
    }
    if contains_any(lower, INTEGRATION_TERMS) {
        score += 0.3;
    }
    score.min(1.0)
}

fn length_modifier(content: &str) -> f64 {
    match content.split_whitespace().count() {
        n if n < 10 => 0.8,
        n if n < 50 => 1.0,
        n if n < 200 => 1.2,
        _ => 1.4,
    }
}

fn pattern_modifier(lower: &str) -> f64 {
    let hits = HIGH_COMPLEXITY_SIGNALS
        .iter()
        .filter(|re| re.is_match(lower))
        .count();
    (1.0 + hits as f64 * 0.2).min(2.0)
}

fn context_modifier(context: &RequestContext, axis: Axis) -> f64 {
    let mut modifier = context.complexity_hint.map_or(1.0, |h| h.modifier());
    match (context.domain, axis) {
        (Some(Domain::Scholarly), Axis::Knowledge) => modifier *= 1.3,
        (Some(Domain::Quantitative), Axis::Computation) => modifier *= 1.4,
        _ => {}
    }
    modifier
}
