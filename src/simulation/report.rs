use super::config::{RunConfig, ValidationScope};
use super::persona::PersonaTag;
use super::stats::{ACTIONS_FAILED, ACTIONS_SKIPPED, ACTIONS_TIMED_OUT, DAYS_COMPLETED, USERS_CREATED};
use crate::core::{ActionKind, ValidationResult};
use std::collections::BTreeMap;
use std::fmt::Write;
use std::time::Duration;

const RULE: &str = "============================================================";
const MAX_VIOLATIONS_SHOWN: usize = 5;

/// What the report's header describes
pub enum ReportHeader<'a> {
    /// A simulated run, told by its configuration
    Run(&'a RunConfig),
    /// A validate-only pass over a cohort rebuilt from leftover accounts
    ValidateOnly {
        scope: &'a ValidationScope,
        personas: BTreeMap<PersonaTag, usize>,
    },
}

impl ReportHeader<'_> {
    /// Prefix for the error log files
    pub fn log_label(&self) -> &'static str {
        match self {
            ReportHeader::Run(config) => config.mode.as_str(),
            ReportHeader::ValidateOnly { .. } => "validate",
        }
    }

    fn write(&self, out: &mut String) {
        match self {
            ReportHeader::Run(config) => {
                let _ = writeln!(out, "SIMULATION REPORT: {} (run {})", config.mode, config.run_id);
                let _ = writeln!(out, "{}", RULE);
                let persona = config
                    .persona_override
                    .map(|p| p.as_str().to_string())
                    .unwrap_or_else(|| "mixed".to_string());
                let _ = writeln!(
                    out,
                    "users: {}  days: {}  workers: {}  persona: {}  seed: {}",
                    config.total_users, config.days, config.workers, persona, config.seed
                );
            }
            ReportHeader::ValidateOnly { scope, personas } => {
                let _ = writeln!(out, "SIMULATION REPORT: validate-only ({})", scope);
                let _ = writeln!(out, "{}", RULE);
                let users: usize = personas.values().sum();
                let mix = if personas.is_empty() {
                    "none".to_string()
                } else {
                    personas
                        .iter()
                        .map(|(tag, count)| format!("{}={}", tag, count))
                        .collect::<Vec<_>>()
                        .join(" ")
                };
                let _ = writeln!(out, "users: {}  personas: {}", users, mix);
            }
        }
    }
}

/// Render the end-of-run summary. Pure; the caller decides where it goes.
pub fn render(
    header: &ReportHeader<'_>,
    stats: &BTreeMap<String, u64>,
    error_count: usize,
    validations: &[ValidationResult],
    elapsed: Duration,
) -> String {
    let count = |key: &str| stats.get(key).copied().unwrap_or(0);
    let mut out = String::new();

    let _ = writeln!(out, "{}", RULE);
    header.write(&mut out);
    let _ = writeln!(out, "elapsed: {:.2}s", elapsed.as_secs_f64());

    let _ = writeln!(out);
    let _ = writeln!(out, "Activity");
    let _ = writeln!(out, "  {:<24} {:>8}", USERS_CREATED, count(USERS_CREATED));
    let _ = writeln!(out, "  {:<24} {:>8}", DAYS_COMPLETED, count(DAYS_COMPLETED));
    for kind in ActionKind::ALL {
        let _ = writeln!(out, "  {:<24} {:>8}", kind.success_key(), count(kind.success_key()));
    }

    let _ = writeln!(out);
    let _ = writeln!(out, "Failures");
    let _ = writeln!(out, "  {:<24} {:>8}", ACTIONS_FAILED, count(ACTIONS_FAILED));
    let _ = writeln!(out, "  {:<24} {:>8}", ACTIONS_SKIPPED, count(ACTIONS_SKIPPED));
    let _ = writeln!(out, "  {:<24} {:>8}", ACTIONS_TIMED_OUT, count(ACTIONS_TIMED_OUT));
    let _ = writeln!(out, "  {:<24} {:>8}", "error_records", error_count);

    let _ = writeln!(out);
    let _ = writeln!(out, "Validation");
    for result in validations {
        let status = if result.pass { "PASS" } else { "FAIL" };
        let _ = writeln!(out, "  [{}] {:<16} {}", status, result.name, result.summary);
        for violation in result.violations.iter().take(MAX_VIOLATIONS_SHOWN) {
            let _ = writeln!(out, "         - {}", violation);
        }
        if result.violations.len() > MAX_VIOLATIONS_SHOWN {
            let _ = writeln!(
                out,
                "         ... and {} more",
                result.violations.len() - MAX_VIOLATIONS_SHOWN
            );
        }
    }

    let passed = validations.iter().filter(|r| r.pass).count();
    let _ = writeln!(out, "{}", RULE);
    let _ = writeln!(out, "{}/{} validators passed", passed, validations.len());
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_includes_counts_and_verdicts() {
        let config = RunConfig::resolve("smoke").unwrap();
        let stats = BTreeMap::from([
            (USERS_CREATED.to_string(), 10),
            ("sets_logged".to_string(), 42),
        ]);
        let validations = vec![
            ValidationResult::from_violations("data_integrity", 100, vec![]),
            ValidationResult::from_violations(
                "concurrency",
                100,
                (0..7).map(|i| format!("violation {}", i)).collect(),
            ),
        ];

        let text = render(
            &ReportHeader::Run(&config),
            &stats,
            3,
            &validations,
            Duration::from_millis(1500),
        );

        assert!(text.contains("SIMULATION REPORT: smoke"));
        assert!(text.contains("elapsed: 1.50s"));
        assert!(text.lines().any(|l| l.contains("users_created") && l.ends_with("10")));
        assert!(text.lines().any(|l| l.contains("sets_logged") && l.ends_with("42")));
        assert!(text.lines().any(|l| l.contains("error_records") && l.ends_with('3')));
        assert!(text.contains("[PASS] data_integrity"));
        assert!(text.contains("[FAIL] concurrency"));
        assert!(text.contains("... and 2 more"));
        assert!(text.contains("1/2 validators passed"));
    }

    #[test]
    fn test_validate_only_header_describes_rebuilt_cohort() {
        let scope = ValidationScope::default().run("7f45ce28");
        let header = ReportHeader::ValidateOnly {
            scope: &scope,
            personas: BTreeMap::from([(PersonaTag::Normal, 12), (PersonaTag::Power, 3)]),
        };

        let text = render(&header, &BTreeMap::new(), 0, &[], Duration::ZERO);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines[1],
            "SIMULATION REPORT: validate-only (scope sim.repstack.test run 7f45ce28)"
        );
        assert_eq!(lines[3], "users: 15  personas: normal=12 power=3");
        assert!(!text.contains("days:"));
        assert_eq!(header.log_label(), "validate");
    }
}
