//! Static detection tables: context regexes, semantic keywords, combination
//! rules and exclusions.
//!
//! Built once (usually at startup) and shared read-only by every
//! [`PatternEngine`](super::PatternEngine) clone.

use crate::models::{CombinationRule, PatternCategory, TelemetryRisk};
use indexmap::IndexMap;
use regex::Regex;

/// A regular expression tied to a category and risk tier.
#[derive(Debug, Clone)]
pub struct ContextPattern {
    pub id: &'static str,
    pub category: PatternCategory,
    pub risk: TelemetryRisk,
    pub regex: Regex,
}

impl ContextPattern {
    fn new(id: &'static str, category: PatternCategory, risk: TelemetryRisk, pattern: &str) -> Self {
        Self {
            id,
            category,
            risk,
            regex: Regex::new(pattern).expect("Invalid context pattern regex"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PatternTables {
    pub context: Vec<ContextPattern>,
    /// Lower-cased keyword → tier, kept in declaration order
    pub semantic: IndexMap<String, TelemetryRisk>,
    pub combinations: Vec<CombinationRule>,
    /// Applied to each match's context line
    pub line_exclusions: Vec<Regex>,
    /// Applied to the unit id; a hit drops every match in the unit
    pub unit_exclusion: Regex,
}

impl PatternTables {
    pub fn builtin() -> Self {
        use PatternCategory::*;
        use TelemetryRisk::*;

        let context = vec![
            ContextPattern::new(
                "call.telemetry_send",
                FunctionCall,
                Critical,
                r"(?i)\b(?:send|post|publish|log)_?telemetry\w*\s*\(",
            ),
            ContextPattern::new(
                "call.track_event",
                FunctionCall,
                Critical,
                r"(?i)\b(?:track_?event|analytics\.track)\s*\(",
            ),
            ContextPattern::new(
                "call.report_usage",
                FunctionCall,
                High,
                r"(?i)\breport_?usage\w*\s*\(",
            ),
            ContextPattern::new(
                "assign.machine_identifier",
                Assignment,
                High,
                r"(?i)\b(?:machine|device|installation)_?id\s*[:=]",
            ),
            ContextPattern::new(
                "assign.telemetry_flag",
                Assignment,
                Medium,
                r#"(?i)\btelemetry\w*\s*[:=]\s*(?:true|1|on|"on")"#,
            ),
            ContextPattern::new(
                "import.telemetry_module",
                Import,
                Medium,
                r"(?i)^\s*(?:import|from|use)\b.*telemetry",
            ),
            ContextPattern::new(
                "import.analytics_require",
                Import,
                Medium,
                r#"(?i)\brequire\s*\(\s*['"][^'"]*(?:analytics|telemetry)[^'"]*['"]\s*\)"#,
            ),
            ContextPattern::new(
                "config.telemetry_key",
                ConfigAccess,
                Medium,
                r#"(?i)['"](?:telemetry|analytics)\.[\w.]+['"]"#,
            ),
            ContextPattern::new(
                "config.env_telemetry",
                ConfigAccess,
                Low,
                r"(?i)\b(?:process\.env|env::var|getenv|os\.environ)\W+\w*telemetry",
            ),
        ];

        let semantic: IndexMap<String, TelemetryRisk> = [
            ("telemetryreporter", Critical),
            ("sendtelemetry", Critical),
            ("trackevent", Critical),
            ("analytics.track", Critical),
            ("machineid", High),
            ("machine_id", High),
            ("deviceid", High),
            ("device_id", High),
            ("installationid", High),
            ("sqmid", High),
            ("usagedata", Medium),
            ("usage_stats", Medium),
            ("localstorage.setitem", Medium),
            ("globalstate.update", Medium),
            ("performance.now", Low),
            ("performance.mark", Low),
            ("startuptimer", Low),
        ]
        .into_iter()
        .map(|(k, r)| (k.to_string(), r))
        .collect();

        let combinations = vec![
            CombinationRule::new(
                "identity_with_transport",
                &["machine", "device", "installation", "telemetry_send", "track_event"],
                2,
                Critical,
                "Device identifiers collected alongside a telemetry transport",
            ),
            CombinationRule::new(
                "usage_persistence",
                &["usage", "localstorage", "globalstate"],
                2,
                High,
                "Usage data written to persistent local storage",
            ),
            CombinationRule::new(
                "instrumentation_cluster",
                &["performance", "startuptimer", "report_usage"],
                3,
                Medium,
                "Timing instrumentation feeding usage reports",
            ),
        ];

        let line_exclusions = [
            r"^\s*(?://|#|/\*|\*|--|<!--)",
            r"(?i)\b(?:disable|opt[-_ ]?out|no[-_]?track|do\s+not\s+track)\w*.{0,40}?(?:telemetry|tracking|analytics)",
            r"(?i)(?:telemetry|tracking|analytics)\w*.{0,40}?\b(?:disabled?|opt[-_ ]?out)\b",
            r#"(?i)telemetry\w*\s*[:=]\s*(?:false|0|off|"off")"#,
            r"(?i)(?:\bmock|\bstub|\bfake|jest\.fn|\bsinon\b|\bdescribe\s*\(|\bit\s*\()",
        ]
        .iter()
        .map(|p| Regex::new(p).expect("Invalid exclusion regex"))
        .collect();

        let unit_exclusion = Regex::new(
            r"(?i)(?:^|[/\\._-])(?:test|tests|spec|specs|mock|mocks|__tests__|__mocks__)(?:[/\\._-]|$)",
        )
        .expect("Invalid unit exclusion regex");

        Self {
            context,
            semantic,
            combinations,
            line_exclusions,
            unit_exclusion,
        }
    }

    /// Append the tracked service's naming variants as High semantic keywords.
    ///
    /// Keywords already present keep their original tier.
    pub fn with_service_variants(mut self, variants: &[String]) -> Self {
        for variant in variants {
            let key = variant.trim().to_ascii_lowercase();
            if !key.is_empty() {
                self.semantic.entry(key).or_insert(TelemetryRisk::High);
            }
        }
        self
    }

    pub fn is_excluded_line(&self, line: &str) -> bool {
        self.line_exclusions.iter().any(|re| re.is_match(line))
    }

    pub fn is_excluded_unit(&self, unit_id: &str) -> bool {
        self.unit_exclusion.is_match(unit_id)
    }
}

impl Default for PatternTables {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_patterns() {
        let tables = PatternTables::builtin();
        let hit = |id: &str, line: &str| {
            tables
                .context
                .iter()
                .find(|p| p.id == id)
                .map(|p| p.regex.is_match(line))
                .unwrap_or(false)
        };

        assert!(hit("call.telemetry_send", "client.sendTelemetry(payload);"));
        assert!(hit("call.track_event", "analytics.track('opened')"));
        assert!(hit("assign.machine_identifier", "let machineId = read();"));
        assert!(hit("assign.telemetry_flag", "telemetryEnabled = true"));
        assert!(hit("import.telemetry_module", "import { client } from './telemetry';"));
        assert!(hit("import.analytics_require", "const a = require('beacon-analytics');"));
        assert!(hit("config.telemetry_key", "get(\"telemetry.enableCrashReporter\")"));
        assert!(hit("config.env_telemetry", "process.env.APP_TELEMETRY"));
        assert!(!hit("call.telemetry_send", "const telemetry = 1;"));
    }

    #[test]
    fn test_line_exclusions() {
        let tables = PatternTables::builtin();
        assert!(tables.is_excluded_line("// uses telemetryReporter for debug"));
        assert!(tables.is_excluded_line("   # machine_id = 1"));
        assert!(tables.is_excluded_line("setting.disableTelemetry(true)"));
        assert!(tables.is_excluded_line("telemetryEnabled = false"));
        assert!(tables.is_excluded_line("const reporter = jest.fn();"));
        assert!(!tables.is_excluded_line("reporter.sendTelemetry(event);"));
    }

    #[test]
    fn test_unit_exclusions() {
        let tables = PatternTables::builtin();
        assert!(tables.is_excluded_unit("src/reporter.test.ts"));
        assert!(tables.is_excluded_unit("tests/reporter.rs"));
        assert!(tables.is_excluded_unit("spec/reporter_spec.rb"));
        assert!(tables.is_excluded_unit("lib/__mocks__/client.js"));
        assert!(!tables.is_excluded_unit("src/contest.rs"));
        assert!(!tables.is_excluded_unit("src/reporter.ts"));
    }

    #[test]
    fn test_service_variants_appended_as_high() {
        let tables = PatternTables::builtin()
            .with_service_variants(&["Beacon".to_string(), "machineid".to_string()]);
        assert_eq!(tables.semantic.get("beacon"), Some(&TelemetryRisk::High));
        assert_eq!(tables.semantic.last().map(|(k, _)| k.as_str()), Some("beacon"));
        // existing keyword keeps its tier and position
        assert_eq!(tables.semantic.get_index_of("machineid"), Some(4));
    }
}
