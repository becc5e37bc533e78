//! Built-in titration protocol.
//!
//! Provides the default ACE-inhibitor ladder and rule set used when no
//! protocol file is configured.

use crate::{
    ActionKind, ActionPolicy, ConditionalRule, Dose, DosingLadder, Ingredient, Medication,
    Protocol, Result, Rule, RuleWithActions, TitrationTarget,
};
use once_cell::sync::OnceCell;
use std::sync::Arc;

/// Cached default protocol - built once and reused across all titrators
static DEFAULT_PROTOCOL: OnceCell<Protocol> = OnceCell::new();

const ACE_INHIBITOR: &str = "ACE inhibitor";

/// Get a reference to the cached default protocol
pub fn get_default_protocol() -> Result<&'static Protocol> {
    DEFAULT_PROTOCOL.get_or_try_init(build_default_protocol)
}

/// Builds the default ACE-inhibitor protocol
///
/// **Note**: For production use, prefer `get_default_protocol()` which returns a
/// cached reference. This function is retained for testing and customisation.
pub fn build_default_protocol() -> Result<Protocol> {
    let ladder = Arc::new(build_default_ladder()?);

    // ========================================================================
    // Initiation: contraindications to starting the class
    // ========================================================================

    let initiation_rules = vec![
        RuleWithActions::contraindication(Rule::new("angioedema", "eq", true)?)
            .with_label("History of angioedema"),
        RuleWithActions::contraindication(Rule::new("potassium", "gt", 5.5)?)
            .with_label("Potassium above 5.5 mmol/L"),
        RuleWithActions::contraindication(Rule::new("systolic_bp", "lt", 100)?)
            .with_label("Systolic BP below 100 mmHg"),
    ];

    // ========================================================================
    // Titration
    // ========================================================================

    let angioedema = RuleWithActions::class_limiting(Rule::new("angioedema", "eq", true)?)
        .with_label("History of angioedema");

    let severe_hyperkalaemia = RuleWithActions::class_limiting(Rule::new("potassium", "gt", 6.0)?)
        .with_label("Potassium above 6.0 mmol/L");

    let hypotension = RuleWithActions::titration_limiting(Rule::new("systolic_bp", "lt", 100)?)
        .with_label("Systolic BP below 100 mmHg");

    let hyperkalaemia = RuleWithActions::titration_limiting(Rule::new("potassium", "gt", 5.5)?)
        .with_label("Potassium above 5.5 mmol/L");

    let renal_decline = RuleWithActions::condition_titration_limiting(ConditionalRule::new(
        Rule::new("creatinine_rise_percent", "gte", 30)?,
        Rule::new("egfr", "lt", 30)?,
    ))
    .with_label("Creatinine rise of 30% or more with eGFR below 30");

    // Dry cough: stop only when it is troublesome, otherwise hold the dose
    let troublesome_cough = RuleWithActions::new(
        Rule::new("cough_severity", "in", vec!["severe", "intolerable"])?,
        ActionPolicy::new(
            vec![ActionKind::Stop.into(), ActionKind::ReportReaction.into()],
            vec![ActionKind::Continue.into()],
        ),
    );
    let dry_cough = RuleWithActions::non_limiting(Rule::new("cough", "eq", "dry")?)
        .with_additional_actions(vec![troublesome_cough.into()], vec![])
        .with_label("Dry cough");

    let titration_rules = vec![
        angioedema,
        severe_hyperkalaemia,
        hypotension,
        hyperkalaemia,
        renal_decline,
        dry_cough,
    ];

    let protocol = Protocol::new("ACE inhibitors", ladder)
        .with_phase_rules(initiation_rules, titration_rules)
        .with_titration_target(TitrationTarget::max_tolerated());

    tracing::debug!("Built default protocol '{}'", protocol.name);
    Ok(protocol)
}

fn build_default_ladder() -> Result<DosingLadder> {
    let subladder = |name: &str, doses: &[f64]| {
        let ingredient = Ingredient::new(name.to_lowercase(), ACE_INHIBITOR);
        let steps: Vec<Medication> = doses
            .iter()
            .map(|d| Medication::new(name, Dose::mg(*d), ingredient.clone()))
            .collect();
        (name.to_string(), steps)
    };

    DosingLadder::new(
        vec![
            subladder("Ramipril", &[1.25, 2.5, 5.0, 10.0]),
            subladder("Lisinopril", &[2.5, 5.0, 10.0, 20.0]),
            subladder("Perindopril", &[2.0, 4.0, 6.0, 8.0]),
        ],
        true,
    )
}
