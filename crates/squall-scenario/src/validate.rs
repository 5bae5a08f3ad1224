use crate::{Action, Diagnostic, Scenario, Severity, ValidationError, API_VERSION};
use std::collections::BTreeSet;

/// Extension point for deployment-specific checks run alongside the built-in
/// rules.
pub trait ScenarioRule {
    fn name(&self) -> &str;
    fn apply(&self, scenario: &Scenario) -> Vec<Diagnostic>;
}

pub fn validate(scenario: &Scenario, extra_rules: &[&dyn ScenarioRule]) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();

    diagnostics.extend(rule_api_version(scenario));
    diagnostics.extend(rule_timeout_covers_duration(scenario));
    diagnostics.extend(rule_phase_budget(scenario));
    diagnostics.extend(rule_phase_names_unique(scenario));
    diagnostics.extend(rule_phase_duration_positive(scenario));
    diagnostics.extend(rule_action_targets(scenario));
    diagnostics.extend(rule_assertion_kinds(scenario));
    diagnostics.extend(rule_phase_has_oracle(scenario));

    for rule in extra_rules {
        diagnostics.extend(rule.apply(scenario));
    }

    diagnostics
}

pub fn validate_or_raise(
    scenario: &Scenario,
    extra_rules: &[&dyn ScenarioRule],
) -> Result<Vec<Diagnostic>, ValidationError> {
    let diagnostics = validate(scenario, extra_rules);
    if diagnostics.iter().any(Diagnostic::is_error) {
        return Err(ValidationError::new(diagnostics));
    }
    Ok(diagnostics)
}

fn rule_api_version(scenario: &Scenario) -> Vec<Diagnostic> {
    if scenario.api_version == API_VERSION {
        Vec::new()
    } else {
        vec![Diagnostic::new(
            "api_version",
            Severity::Error,
            format!(
                "unsupported api version '{}'; this engine accepts '{}'",
                scenario.api_version, API_VERSION
            ),
        )]
    }
}

fn rule_timeout_covers_duration(scenario: &Scenario) -> Vec<Diagnostic> {
    if scenario.timeout.millis >= scenario.duration.millis {
        Vec::new()
    } else {
        vec![Diagnostic::new(
            "timeout_covers_duration",
            Severity::Error,
            format!(
                "timeout {} is shorter than declared duration {}",
                scenario.timeout.raw, scenario.duration.raw
            ),
        )]
    }
}

fn rule_phase_budget(scenario: &Scenario) -> Vec<Diagnostic> {
    let declared: u64 = scenario
        .phases
        .iter()
        .map(|phase| phase.duration.millis)
        .sum();
    if declared <= scenario.duration.millis {
        Vec::new()
    } else {
        vec![Diagnostic::new(
            "phase_budget",
            Severity::Error,
            format!(
                "phase durations sum to {declared}ms which exceeds the scenario duration {}",
                scenario.duration.raw
            ),
        )]
    }
}

fn rule_phase_names_unique(scenario: &Scenario) -> Vec<Diagnostic> {
    let mut seen = BTreeSet::new();
    let mut diagnostics = Vec::new();
    for phase in &scenario.phases {
        if !seen.insert(phase.name.as_str()) {
            diagnostics.push(
                Diagnostic::new(
                    "phase_names_unique",
                    Severity::Error,
                    format!("phase name '{}' is declared more than once", phase.name),
                )
                .with_phase(phase.name.clone()),
            );
        }
    }
    diagnostics
}

fn rule_phase_duration_positive(scenario: &Scenario) -> Vec<Diagnostic> {
    scenario
        .phases
        .iter()
        .filter(|phase| phase.duration.is_zero())
        .map(|phase| {
            Diagnostic::new(
                "phase_duration_positive",
                Severity::Error,
                "phase duration must be greater than zero",
            )
            .with_phase(phase.name.clone())
        })
        .collect()
}

fn rule_action_targets(scenario: &Scenario) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    for phase in &scenario.phases {
        for action in phase
            .actions
            .iter()
            .chain(phase.parallel_actions.iter().map(|p| &p.action))
        {
            diagnostics.extend(check_action_target(action, Some(&phase.name)));
        }
    }
    for action in &scenario.rollback.actions {
        diagnostics.extend(check_action_target(action, None));
    }
    diagnostics
}

fn check_action_target(action: &Action, phase: Option<&str>) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    if action.service.trim().is_empty() {
        diagnostics.push(Diagnostic::new(
            "action_targets",
            Severity::Error,
            "action is missing a target service",
        ));
    }
    if action.kind.trim().is_empty() {
        diagnostics.push(Diagnostic::new(
            "action_targets",
            Severity::Error,
            format!("action on '{}' is missing a kind", action.service),
        ));
    }
    match phase {
        Some(name) => diagnostics
            .into_iter()
            .map(|d| d.with_phase(name.to_string()))
            .collect(),
        None => diagnostics,
    }
}

fn rule_assertion_kinds(scenario: &Scenario) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    for phase in &scenario.phases {
        for assertion in &phase.assertions {
            if assertion.kind.trim().is_empty() {
                diagnostics.push(
                    Diagnostic::new(
                        "assertion_kinds",
                        Severity::Error,
                        "assertion is missing a kind",
                    )
                    .with_phase(phase.name.clone()),
                );
            }
        }
    }
    diagnostics
}

// An injection phase with no assertions has no oracle; flagged, not fatal.
fn rule_phase_has_oracle(scenario: &Scenario) -> Vec<Diagnostic> {
    scenario
        .phases
        .iter()
        .filter(|phase| {
            phase.assertions.is_empty()
                && (!phase.actions.is_empty() || !phase.parallel_actions.is_empty())
        })
        .map(|phase| {
            Diagnostic::new(
                "phase_has_oracle",
                Severity::Warning,
                "phase injects chaos but declares no assertions",
            )
            .with_phase(phase.name.clone())
        })
        .collect()
}
