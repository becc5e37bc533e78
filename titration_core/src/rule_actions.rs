//! Rules bound to recommended actions.
//!
//! A [`RuleWithActions`] layers two independent pieces over a base predicate:
//! an optional gate (condition rule) and an [`ActionPolicy`] holding the
//! satisfied and unsatisfied branches. Evaluation runs gate, then predicate,
//! then picks the branch and expands it.
//!
//! Branch entries may themselves be rules. Expansion evaluates each nested
//! rule against the same patient and splices its resolved actions in place,
//! always into a new vector.

use crate::{
    ActionKind, ConditionalRule, DosingLadder, EvaluationResult, Medication, Patient, Result,
    Rule,
};
use std::fmt;
use std::sync::Arc;

/// One entry in an action branch
#[derive(Clone, Debug, PartialEq)]
pub enum ActionSpec {
    Action(ActionKind),
    Rule(Box<RuleWithActions>),
}

impl From<ActionKind> for ActionSpec {
    fn from(kind: ActionKind) -> Self {
        ActionSpec::Action(kind)
    }
}

impl From<RuleWithActions> for ActionSpec {
    fn from(rule: RuleWithActions) -> Self {
        ActionSpec::Rule(Box::new(rule))
    }
}

/// Actions recommended when a rule is or is not satisfied
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ActionPolicy {
    pub when_satisfied: Vec<ActionSpec>,
    pub when_not_satisfied: Vec<ActionSpec>,
}

impl ActionPolicy {
    pub fn new(when_satisfied: Vec<ActionSpec>, when_not_satisfied: Vec<ActionSpec>) -> Self {
        Self {
            when_satisfied,
            when_not_satisfied,
        }
    }

    fn satisfied(kinds: &[ActionKind]) -> Self {
        Self::new(kinds.iter().copied().map(ActionSpec::from).collect(), Vec::new())
    }

    /// Rules that rule out starting the drug class
    pub fn contraindication() -> Self {
        Self::satisfied(&[ActionKind::DoNotStart])
    }

    /// Rules whose satisfaction rules out the whole drug class
    pub fn class_limiting() -> Self {
        Self::satisfied(&[ActionKind::Stop, ActionKind::ReportReaction])
    }

    /// Rules whose satisfaction blocks further titration
    pub fn titration_limiting() -> Self {
        Self::satisfied(&[
            ActionKind::Continue,
            ActionKind::StepDown,
            ActionKind::MarkMaxDose,
        ])
    }

    pub fn max_tolerated() -> Self {
        Self::satisfied(&[ActionKind::Continue])
    }

    /// Append extra entries after the existing ones in each branch
    pub fn with_additional(
        mut self,
        when_satisfied: Vec<ActionSpec>,
        when_not_satisfied: Vec<ActionSpec>,
    ) -> Self {
        self.when_satisfied.extend(when_satisfied);
        self.when_not_satisfied.extend(when_not_satisfied);
        self
    }

    pub fn branch(&self, is_satisfied: bool) -> &[ActionSpec] {
        if is_satisfied {
            &self.when_satisfied
        } else {
            &self.when_not_satisfied
        }
    }
}

/// Satisfied when the current medication sits at the patient's recorded
/// maximum tolerated dose
#[derive(Clone, Debug, PartialEq)]
pub struct MaxTolerated {
    ladder: Arc<DosingLadder>,
    current_medication: Option<Medication>,
}

impl MaxTolerated {
    /// `current_medication` of `None` is resolved from the patient on each
    /// evaluation
    pub fn new(ladder: Arc<DosingLadder>, current_medication: Option<Medication>) -> Self {
        Self {
            ladder,
            current_medication,
        }
    }

    pub fn is_satisfied(&self, patient: &Patient) -> Result<bool> {
        let current = match &self.current_medication {
            Some(medication) => Some(medication.clone()),
            None => self.ladder.current_medication_for_patient(patient)?,
        };
        let Some(current) = current else {
            return Ok(false);
        };

        Ok(patient
            .max_tolerated
            .get(&current.name)
            .is_some_and(|max| max.dose == current.dose))
    }
}

impl fmt::Display for MaxTolerated {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.current_medication {
            Some(medication) => write!(f, "{} is max tolerated", medication),
            None => f.write_str("current dose is max tolerated"),
        }
    }
}

/// The base comparison a [`RuleWithActions`] evaluates
#[derive(Clone, Debug, PartialEq)]
pub enum Predicate {
    Compare(Rule),
    MaxTolerated(MaxTolerated),
}

impl Predicate {
    fn is_satisfied(&self, patient: &Patient) -> Result<bool> {
        match self {
            Predicate::Compare(rule) => rule.is_satisfied(patient),
            Predicate::MaxTolerated(max) => max.is_satisfied(patient),
        }
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::Compare(rule) => write!(f, "{}", rule),
            Predicate::MaxTolerated(max) => write!(f, "{}", max),
        }
    }
}

/// A gated predicate with satisfied/unsatisfied action branches
#[derive(Clone, Debug, PartialEq)]
pub struct RuleWithActions {
    gate: Option<Rule>,
    predicate: Predicate,
    policy: ActionPolicy,
    label: Option<String>,
}

impl RuleWithActions {
    pub fn new(rule: Rule, policy: ActionPolicy) -> Self {
        Self {
            gate: None,
            predicate: Predicate::Compare(rule),
            policy,
            label: None,
        }
    }

    /// A conditional rule with actions: the condition becomes the gate
    pub fn conditional(rule: ConditionalRule, policy: ActionPolicy) -> Self {
        Self::new(rule.rule, policy).with_gate(rule.condition)
    }

    /// Satisfied → DoNotStart
    pub fn contraindication(rule: Rule) -> Self {
        Self::new(rule, ActionPolicy::contraindication())
    }

    /// Satisfied → Stop, ReportReaction
    pub fn class_limiting(rule: Rule) -> Self {
        Self::new(rule, ActionPolicy::class_limiting())
    }

    /// Satisfied → Continue, StepDown, MarkMaxDose
    pub fn titration_limiting(rule: Rule) -> Self {
        Self::new(rule, ActionPolicy::titration_limiting())
    }

    pub fn non_limiting(rule: Rule) -> Self {
        Self::new(rule, ActionPolicy::default())
    }

    /// Gated titration-limiting rule
    pub fn condition_titration_limiting(rule: ConditionalRule) -> Self {
        Self::conditional(rule, ActionPolicy::titration_limiting())
    }

    /// Satisfied → Continue
    pub fn max_tolerated(ladder: Arc<DosingLadder>, current_medication: Option<Medication>) -> Self {
        Self {
            gate: None,
            predicate: Predicate::MaxTolerated(MaxTolerated::new(ladder, current_medication)),
            policy: ActionPolicy::max_tolerated(),
            label: None,
        }
    }

    pub fn with_gate(mut self, condition: Rule) -> Self {
        self.gate = Some(condition);
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Append actions after this rule's existing branches
    pub fn with_additional_actions(
        mut self,
        when_satisfied: Vec<ActionSpec>,
        when_not_satisfied: Vec<ActionSpec>,
    ) -> Self {
        self.policy = self.policy.with_additional(when_satisfied, when_not_satisfied);
        self
    }

    pub fn gate(&self) -> Option<&Rule> {
        self.gate.as_ref()
    }

    pub fn predicate(&self) -> &Predicate {
        &self.predicate
    }

    pub fn policy(&self) -> &ActionPolicy {
        &self.policy
    }

    /// Configured label, or the rendered rule
    pub fn label(&self) -> String {
        self.label.clone().unwrap_or_else(|| self.to_string())
    }

    /// Gate first; the predicate is skipped when the gate fails
    pub fn is_satisfied(&self, patient: &Patient) -> Result<bool> {
        if let Some(gate) = &self.gate {
            if !gate.is_satisfied(patient)? {
                return Ok(false);
            }
        }
        self.predicate.is_satisfied(patient)
    }

    pub fn evaluate(&self, patient: &Patient) -> Result<EvaluationResult> {
        let is_satisfied = self.is_satisfied(patient)?;
        let recommended_actions = expand(self.policy.branch(is_satisfied), patient)?;

        tracing::debug!(
            "Rule `{}` satisfied={} -> {:?}",
            self.label(),
            is_satisfied,
            recommended_actions
        );

        Ok(EvaluationResult {
            rule: self.label(),
            is_satisfied,
            recommended_actions,
        })
    }
}

impl fmt::Display for RuleWithActions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.gate {
            Some(gate) => write!(f, "{} if {}", self.predicate, gate),
            None => write!(f, "{}", self.predicate),
        }
    }
}

/// Resolve a branch into concrete action kinds, preserving order and
/// duplicates
fn expand(specs: &[ActionSpec], patient: &Patient) -> Result<Vec<ActionKind>> {
    let mut actions = Vec::with_capacity(specs.len());
    for spec in specs {
        match spec {
            ActionSpec::Action(kind) => actions.push(*kind),
            ActionSpec::Rule(rule) => actions.extend(rule.evaluate(patient)?.recommended_actions),
        }
    }
    Ok(actions)
}
