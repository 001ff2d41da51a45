use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;

/// How strongly a matched signal indicates active data collection.
///
/// Ordered: `None < Low < Medium < High < Critical`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum TelemetryRisk {
    #[default]
    None,
    Low,
    Medium,
    High,
    Critical,
}

impl TelemetryRisk {
    /// Base confidence assigned to a match of this tier before boosts.
    pub fn base_confidence(self) -> f64 {
        match self {
            Self::Critical => 0.95,
            Self::High => 0.85,
            Self::Medium => 0.70,
            Self::Low => 0.50,
            Self::None => 0.30,
        }
    }
}

impl fmt::Display for TelemetryRisk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::None => "none",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternCategory {
    FunctionCall,
    Assignment,
    Import,
    ConfigAccess,
    Semantic,
    Combination,
}

/// One detection instance produced by the pattern engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternMatch {
    /// Identifier of the pattern (or combination rule) that produced the match
    pub pattern: String,
    pub matched_text: String,
    /// Full text of the line the match sits on
    pub context: String,
    pub risk: TelemetryRisk,
    pub category: PatternCategory,
    /// 1-based
    pub line: usize,
    /// 1-based byte column
    pub column: usize,
    pub confidence: f64,
    pub snippet: String,
}

impl PatternMatch {
    /// Byte range of the matched text within its line.
    pub fn span(&self) -> Range<usize> {
        let start = self.column.saturating_sub(1);
        start..start + self.matched_text.len()
    }

    /// Whether both matches cover some of the same text.
    pub fn overlaps(&self, other: &PatternMatch) -> bool {
        let (a, b) = (self.span(), other.span());
        self.line == other.line && a.start < b.end && b.start < a.end
    }
}

/// Meta-pattern asserting a risk tier once enough weaker signals co-occur in one unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CombinationRule {
    pub name: String,
    /// Substrings searched for in each match's pattern identifier
    pub constituents: Vec<String>,
    pub threshold: usize,
    pub risk: TelemetryRisk,
    pub description: String,
}

impl CombinationRule {
    pub fn new(
        name: &str,
        constituents: &[&str],
        threshold: usize,
        risk: TelemetryRisk,
        description: &str,
    ) -> Self {
        Self {
            name: name.to_string(),
            constituents: constituents.iter().map(|c| c.to_string()).collect(),
            threshold,
            risk,
            description: description.to_string(),
        }
    }

    pub fn qualifies(&self, m: &PatternMatch) -> bool {
        m.category != PatternCategory::Combination
            && self.constituents.iter().any(|c| m.pattern.contains(c.as_str()))
    }
}

/// Per-tier tally over a set of matches.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskSummary {
    pub highest: TelemetryRisk,
    pub critical: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
}

impl RiskSummary {
    pub fn from_matches(matches: &[PatternMatch]) -> Self {
        let mut summary = Self::default();
        for m in matches {
            summary.highest = summary.highest.max(m.risk);
            match m.risk {
                TelemetryRisk::Critical => summary.critical += 1,
                TelemetryRisk::High => summary.high += 1,
                TelemetryRisk::Medium => summary.medium += 1,
                TelemetryRisk::Low => summary.low += 1,
                TelemetryRisk::None => {}
            }
        }
        summary
    }

    pub fn total(&self) -> usize {
        self.critical + self.high + self.medium + self.low
    }
}
