//! Protocol files: a ladder, its rules and phase defaults in TOML.
//!
//! ```toml
//! name = "ACE inhibitors"
//!
//! [[ladder]]
//! name = "Ramipril"
//! ingredient = "ramipril"
//! drug_class = "ACE inhibitor"
//! doses = [1.25, 2.5, 5, 10]
//!
//! [[rules]]
//! kind = "class_limiting"
//! parameter = "angioedema"
//! operation = "eq"
//! threshold = true
//!
//! [titration_target]
//! kind = "max_tolerated"
//! ```
//!
//! Branch entries in `when_satisfied` / `when_not_satisfied` are either action
//! names or nested rule tables.

use crate::{
    ActionKind, ActionSpec, Dose, DosingLadder, Error, Ingredient, Medication, Protocol, Result,
    Rule, RuleWithActions, TitrationTarget, TopStepPolicy, Value,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

/// Top-level protocol file
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProtocolFile {
    pub name: String,

    #[serde(default = "default_single_class")]
    pub single_class: bool,

    pub ladder: Vec<LadderEntry>,

    #[serde(default)]
    pub rules: Option<Vec<RuleEntry>>,

    #[serde(default)]
    pub initiation_rules: Option<Vec<RuleEntry>>,

    #[serde(default)]
    pub titration_rules: Option<Vec<RuleEntry>>,

    #[serde(default)]
    pub titration_target: Option<RuleEntry>,

    #[serde(default = "default_initiation_actions")]
    pub initiation_actions: Vec<ActionKind>,

    #[serde(default = "default_titration_actions")]
    pub titration_actions: Vec<ActionKind>,

    #[serde(default)]
    pub top_step: TopStepPolicy,
}

/// One medication's dose steps
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LadderEntry {
    pub name: String,
    pub ingredient: String,
    pub drug_class: String,
    #[serde(default = "default_unit")]
    pub unit: String,
    pub doses: Vec<f64>,
}

/// Which action policy a rule carries
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RuleKind {
    Contraindication,
    ClassLimiting,
    TitrationLimiting,
    NonLimiting,
    MaxTolerated,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConditionEntry {
    pub parameter: String,
    pub operation: String,
    pub threshold: Value,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RuleEntry {
    pub kind: RuleKind,
    pub parameter: Option<String>,
    pub operation: Option<String>,
    pub threshold: Option<Value>,
    pub condition: Option<ConditionEntry>,
    pub label: Option<String>,
    #[serde(default)]
    pub when_satisfied: Vec<ActionEntry>,
    #[serde(default)]
    pub when_not_satisfied: Vec<ActionEntry>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ActionEntry {
    Action(ActionKind),
    Rule(Box<RuleEntry>),
}

fn default_single_class() -> bool {
    true
}

fn default_unit() -> String {
    "mg".to_string()
}

fn default_initiation_actions() -> Vec<ActionKind> {
    vec![ActionKind::Start]
}

fn default_titration_actions() -> Vec<ActionKind> {
    vec![ActionKind::StepUp]
}

impl ProtocolFile {
    pub fn parse(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Build the protocol, validating through the core constructors
    pub fn into_protocol(self) -> Result<Protocol> {
        let ladder = Arc::new(build_ladder(&self.ladder, self.single_class)?);

        let mut protocol = Protocol::new(self.name, ladder.clone())
            .with_initiation_actions(self.initiation_actions)
            .with_titration_actions(self.titration_actions)
            .with_top_step_policy(self.top_step);

        match (self.rules, self.initiation_rules, self.titration_rules) {
            (Some(rules), None, None) => {
                protocol = protocol.with_rules(build_rules(rules, &ladder)?);
            }
            (None, Some(initiation), Some(titration)) => {
                protocol = protocol.with_phase_rules(
                    build_rules(initiation, &ladder)?,
                    build_rules(titration, &ladder)?,
                );
            }
            // Left unset; the titrator reports MissingConfiguration
            (None, None, None) => {}
            (Some(_), _, _) => {
                return Err(Error::Protocol(format!(
                    "protocol '{}' sets `rules` together with phase rules",
                    protocol.name
                )))
            }
            (None, initiation, _) => {
                let missing = if initiation.is_some() {
                    "titration_rules"
                } else {
                    "initiation_rules"
                };
                return Err(Error::Protocol(format!(
                    "protocol '{}' is missing `{}`",
                    protocol.name, missing
                )));
            }
        }

        if let Some(target) = self.titration_target {
            let plain_max_tolerated = target.kind == RuleKind::MaxTolerated
                && target.parameter.is_none()
                && target.operation.is_none()
                && target.threshold.is_none()
                && target.condition.is_none()
                && target.label.is_none()
                && target.when_satisfied.is_empty()
                && target.when_not_satisfied.is_empty();
            let target = if plain_max_tolerated {
                TitrationTarget::max_tolerated()
            } else {
                TitrationTarget::Rule(Arc::new(build_rule(target, &ladder)?))
            };
            protocol = protocol.with_titration_target(target);
        }

        Ok(protocol)
    }
}

/// Parse and build a protocol from TOML text
pub fn parse_protocol(contents: &str) -> Result<Protocol> {
    ProtocolFile::parse(contents)?.into_protocol()
}

/// Load a protocol from a TOML file
pub fn load_protocol(path: &Path) -> Result<Protocol> {
    let contents = std::fs::read_to_string(path)?;
    let protocol = parse_protocol(&contents)?;
    tracing::info!("Loaded protocol '{}' from {:?}", protocol.name, path);
    Ok(protocol)
}

fn build_ladder(entries: &[LadderEntry], single_class: bool) -> Result<DosingLadder> {
    let subladders = entries.iter().map(|entry| {
        let ingredient = Ingredient::new(&entry.ingredient, &entry.drug_class);
        let steps: Vec<Medication> = entry
            .doses
            .iter()
            .map(|amount| {
                Medication::new(&entry.name, Dose::new(*amount, &entry.unit), ingredient.clone())
            })
            .collect();
        (entry.name.clone(), steps)
    });
    DosingLadder::new(subladders, single_class)
}

fn build_rules(entries: Vec<RuleEntry>, ladder: &Arc<DosingLadder>) -> Result<Vec<RuleWithActions>> {
    entries
        .into_iter()
        .map(|entry| build_rule(entry, ladder))
        .collect()
}

fn build_rule(entry: RuleEntry, ladder: &Arc<DosingLadder>) -> Result<RuleWithActions> {
    let mut rule = match entry.kind {
        RuleKind::Contraindication => RuleWithActions::contraindication(comparison(&entry)?),
        RuleKind::ClassLimiting => RuleWithActions::class_limiting(comparison(&entry)?),
        RuleKind::TitrationLimiting => RuleWithActions::titration_limiting(comparison(&entry)?),
        RuleKind::NonLimiting => RuleWithActions::non_limiting(comparison(&entry)?),
        RuleKind::MaxTolerated => {
            if entry.parameter.is_some() || entry.operation.is_some() || entry.threshold.is_some()
            {
                return Err(Error::Protocol(
                    "max_tolerated rule takes no `parameter`, `operation` or `threshold`"
                        .to_string(),
                ));
            }
            RuleWithActions::max_tolerated(ladder.clone(), None)
        }
    };

    if let Some(condition) = entry.condition {
        rule = rule.with_gate(Rule::new(
            condition.parameter,
            &condition.operation,
            condition.threshold,
        )?);
    }
    if let Some(label) = entry.label {
        rule = rule.with_label(label);
    }

    let when_satisfied = build_actions(entry.when_satisfied, ladder)?;
    let when_not_satisfied = build_actions(entry.when_not_satisfied, ladder)?;
    Ok(rule.with_additional_actions(when_satisfied, when_not_satisfied))
}

fn build_actions(entries: Vec<ActionEntry>, ladder: &Arc<DosingLadder>) -> Result<Vec<ActionSpec>> {
    entries
        .into_iter()
        .map(|entry| match entry {
            ActionEntry::Action(kind) => Ok(ActionSpec::Action(kind)),
            ActionEntry::Rule(rule) => Ok(build_rule(*rule, ladder)?.into()),
        })
        .collect()
}

fn comparison(entry: &RuleEntry) -> Result<Rule> {
    match (&entry.parameter, &entry.operation, &entry.threshold) {
        (Some(parameter), Some(operation), Some(threshold)) => {
            Rule::new(parameter.clone(), operation, threshold.clone())
        }
        _ => Err(Error::Protocol(format!(
            "{:?} rule needs `parameter`, `operation` and `threshold`",
            entry.kind
        ))),
    }
}
