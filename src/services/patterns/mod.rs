//! Layered telemetry pattern analysis.
//!
//! [`PatternEngine::analyze`] runs four layers over one content unit (a file or
//! a text blob):
//!
//! 1. context regexes per line ([`tables::ContextPattern`])
//! 2. semantic keywords, substring-matched on the lower-cased line
//! 3. combination rules over the unit's raw matches, overlapping hits counted once
//! 4. exclusion filtering on each match's context line
//!
//! Matches come out in line order, then declaration order; synthetic
//! combination matches follow the raw ones in rule order.

pub mod tables;

pub use tables::{ContextPattern, PatternTables};

use crate::models::{PatternCategory, PatternMatch, RiskSummary, TelemetryRisk};
use anyhow::{Context, Result};
use camino::Utf8Path;
use std::sync::Arc;

const FUNCTION_CALL_BOOST: f64 = 0.05;
const COMBINATION_BOOST: f64 = 0.10;
const LONG_MATCH_BOOST: f64 = 0.05;
const LONG_MATCH_CHARS: usize = 20;
const COMBINATION_FLOOR: f64 = 0.9;

/// Confidence for a match: tier base plus category and length boosts, clamped to 1.0.
pub fn confidence(risk: TelemetryRisk, category: PatternCategory, matched_text: &str) -> f64 {
    let mut score = risk.base_confidence();
    match category {
        PatternCategory::FunctionCall => score += FUNCTION_CALL_BOOST,
        PatternCategory::Combination => score += COMBINATION_BOOST,
        _ => {}
    }
    if matched_text.chars().count() > LONG_MATCH_CHARS {
        score += LONG_MATCH_BOOST;
    }
    score.min(1.0)
}

/// Cheap to clone; clones share the same tables.
#[derive(Debug, Clone)]
pub struct PatternEngine {
    tables: Arc<PatternTables>,
}

impl PatternEngine {
    pub fn new(tables: PatternTables) -> Self {
        Self {
            tables: Arc::new(tables),
        }
    }

    /// Built-in tables plus the tracked service's naming variants.
    pub fn with_service_variants(variants: &[String]) -> Self {
        Self::new(PatternTables::builtin().with_service_variants(variants))
    }

    pub fn tables(&self) -> &PatternTables {
        &self.tables
    }

    pub fn analyze(&self, content: &str, unit_id: &str) -> Vec<PatternMatch> {
        if self.tables.is_excluded_unit(unit_id) {
            tracing::debug!(unit = unit_id, "Skipping excluded unit");
            return Vec::new();
        }

        let lines: Vec<&str> = content.lines().collect();
        let mut matches = Vec::new();

        for (idx, line) in lines.iter().enumerate() {
            self.scan_line(&lines, idx, line, &mut matches);
        }

        let synthetic = self.evaluate_combinations(&matches);
        matches.extend(synthetic);

        let before = matches.len();
        matches.retain(|m| !self.tables.is_excluded_line(&m.context));
        if before != matches.len() {
            tracing::trace!(unit = unit_id, dropped = before - matches.len(), "Excluded matches");
        }

        matches
    }

    /// Read a file (lossy UTF-8) and analyze it with its path as the unit id.
    pub fn analyze_file(&self, path: &Utf8Path) -> Result<Vec<PatternMatch>> {
        let bytes = std::fs::read(path).with_context(|| format!("Failed to read {}", path))?;
        let content = String::from_utf8_lossy(&bytes);
        Ok(self.analyze(&content, path.as_str()))
    }

    /// Highest tier found in `content`, `None` when nothing matched.
    pub fn highest_risk(&self, content: &str, unit_id: &str) -> TelemetryRisk {
        RiskSummary::from_matches(&self.analyze(content, unit_id)).highest
    }

    fn scan_line(&self, lines: &[&str], idx: usize, line: &str, out: &mut Vec<PatternMatch>) {
        for pattern in &self.tables.context {
            if let Some(found) = pattern.regex.find(line) {
                out.push(build_match(
                    pattern.id,
                    found.as_str(),
                    pattern.risk,
                    pattern.category,
                    lines,
                    idx,
                    found.start(),
                ));
            }
        }

        // ASCII lower-casing keeps byte offsets aligned with `line`.
        let lower = line.to_ascii_lowercase();
        for (keyword, risk) in &self.tables.semantic {
            if let Some(pos) = lower.find(keyword.as_str()) {
                let text = line.get(pos..pos + keyword.len()).unwrap_or(keyword);
                out.push(build_match(
                    &format!("semantic:{}", keyword),
                    text,
                    *risk,
                    PatternCategory::Semantic,
                    lines,
                    idx,
                    pos,
                ));
            }
        }
    }

    fn evaluate_combinations(&self, raw: &[PatternMatch]) -> Vec<PatternMatch> {
        let mut synthetic = Vec::new();

        for rule in &self.tables.combinations {
            if rule.threshold == 0 {
                continue;
            }

            // overlapping hits on the same text are one signal
            let mut counted: Vec<&PatternMatch> = Vec::new();
            let mut anchor = None;
            for m in raw.iter().filter(|m| rule.qualifies(m)) {
                if counted.iter().any(|c| c.overlaps(m)) {
                    continue;
                }
                counted.push(m);
                if counted.len() == rule.threshold {
                    anchor = Some(m);
                    break;
                }
            }

            if let Some(anchor) = anchor {
                tracing::debug!(rule = %rule.name, line = anchor.line, "Combination rule fired");
                let confidence = confidence(rule.risk, PatternCategory::Combination, &rule.name)
                    .max(COMBINATION_FLOOR)
                    .min(1.0);

                synthetic.push(PatternMatch {
                    pattern: rule.name.clone(),
                    matched_text: rule.name.clone(),
                    context: anchor.context.clone(),
                    risk: rule.risk,
                    category: PatternCategory::Combination,
                    line: anchor.line,
                    column: anchor.column,
                    confidence,
                    snippet: anchor.snippet.clone(),
                });
            }
        }

        synthetic
    }
}

impl Default for PatternEngine {
    fn default() -> Self {
        Self::new(PatternTables::builtin())
    }
}

fn build_match(
    pattern: &str,
    matched_text: &str,
    risk: TelemetryRisk,
    category: PatternCategory,
    lines: &[&str],
    idx: usize,
    byte_offset: usize,
) -> PatternMatch {
    let first = idx.saturating_sub(1);
    let last = (idx + 1).min(lines.len().saturating_sub(1));

    PatternMatch {
        pattern: pattern.to_string(),
        matched_text: matched_text.to_string(),
        context: lines[idx].to_string(),
        risk,
        category,
        line: idx + 1,
        column: byte_offset + 1,
        confidence: confidence(risk, category, matched_text),
        snippet: lines[first..=last].join("\n"),
    }
}
