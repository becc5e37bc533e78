//! Titration engine: turns a patient and a protocol into recommended actions.
//!
//! ## Evaluation
//!
//! 1. **Current medication**: resolved once from the ladder at construction.
//!    No medication on the ladder means the patient is being initiated.
//!
//! 2. **Rules**: the protocol's rules for the current phase plus the
//!    titration-target rule are evaluated against the patient.
//!
//! 3. **Recommendation**:
//!    - No rule satisfied → the phase default (Start when initiating,
//!      StepUp when titrating)
//!    - Otherwise → the de-duplicated union of every satisfied rule's
//!      expanded actions

use crate::{
    Action, ActionKind, DosingLadder, Error, Ingredient, Medication, Patient, Result,
    RuleWithActions,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

/// Builds a titration-target rule against the ladder and current medication
pub type TargetBuilder = fn(Arc<DosingLadder>, Option<Medication>) -> RuleWithActions;

/// Rule marking the point where titration should stop
#[derive(Clone, Debug)]
pub enum TitrationTarget {
    /// A ready-made rule
    Rule(Arc<RuleWithActions>),
    /// A rule instantiated per titrator
    Build(TargetBuilder),
}

impl TitrationTarget {
    /// Stop titrating at the patient's recorded maximum tolerated dose
    pub fn max_tolerated() -> Self {
        TitrationTarget::Build(RuleWithActions::max_tolerated)
    }

    fn resolve(
        &self,
        ladder: &Arc<DosingLadder>,
        current_medication: Option<&Medication>,
    ) -> Arc<RuleWithActions> {
        match self {
            TitrationTarget::Rule(rule) => rule.clone(),
            TitrationTarget::Build(build) => {
                Arc::new(build(ladder.clone(), current_medication.cloned()))
            }
        }
    }
}

/// What to recommend when titrating with nothing blocking advancement but
/// the current medication already at its highest step
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TopStepPolicy {
    /// Replace StepUp with Continue
    #[default]
    Hold,
    /// Fail the evaluation with `OutOfRange`
    Fail,
}

/// Titrator configuration for one class of drugs.
///
/// Either `rules` or both `initiation_rules` and `titration_rules` must be
/// set. Protocols are immutable once built and can be shared between
/// titrators and threads.
#[derive(Clone, Debug)]
pub struct Protocol {
    pub name: String,
    pub ladder: Arc<DosingLadder>,
    pub rules: Option<Vec<Arc<RuleWithActions>>>,
    pub initiation_rules: Option<Vec<Arc<RuleWithActions>>>,
    pub titration_rules: Option<Vec<Arc<RuleWithActions>>>,
    pub titration_target: Option<TitrationTarget>,
    pub initiation_actions: Vec<ActionKind>,
    pub titration_actions: Vec<ActionKind>,
    pub top_step: TopStepPolicy,
}

impl Protocol {
    /// A protocol with no rules yet and the default phase actions
    pub fn new(name: impl Into<String>, ladder: Arc<DosingLadder>) -> Self {
        Self {
            name: name.into(),
            ladder,
            rules: None,
            initiation_rules: None,
            titration_rules: None,
            titration_target: None,
            initiation_actions: vec![ActionKind::Start],
            titration_actions: vec![ActionKind::StepUp],
            top_step: TopStepPolicy::default(),
        }
    }

    /// Same rules in both phases
    pub fn with_rules(mut self, rules: Vec<RuleWithActions>) -> Self {
        self.rules = Some(rules.into_iter().map(Arc::new).collect());
        self
    }

    pub fn with_phase_rules(
        mut self,
        initiation_rules: Vec<RuleWithActions>,
        titration_rules: Vec<RuleWithActions>,
    ) -> Self {
        self.initiation_rules = Some(initiation_rules.into_iter().map(Arc::new).collect());
        self.titration_rules = Some(titration_rules.into_iter().map(Arc::new).collect());
        self
    }

    pub fn with_titration_target(mut self, target: TitrationTarget) -> Self {
        self.titration_target = Some(target);
        self
    }

    pub fn with_initiation_actions(mut self, actions: Vec<ActionKind>) -> Self {
        self.initiation_actions = actions;
        self
    }

    pub fn with_titration_actions(mut self, actions: Vec<ActionKind>) -> Self {
        self.titration_actions = actions;
        self
    }

    pub fn with_top_step_policy(mut self, policy: TopStepPolicy) -> Self {
        self.top_step = policy;
        self
    }

    /// Number of configured rules across both phases.
    ///
    /// Fails with [`Error::MissingConfiguration`] exactly when a
    /// [`Titrator`] could not be built for this protocol.
    pub fn rule_count(&self) -> Result<usize> {
        if let Some(rules) = &self.rules {
            return Ok(rules.len());
        }
        Ok(self.phase_rules(true)?.len() + self.phase_rules(false)?.len())
    }

    /// Configured rules for a phase
    fn phase_rules(&self, initiating: bool) -> Result<&[Arc<RuleWithActions>]> {
        if let Some(rules) = &self.rules {
            return Ok(rules.as_slice());
        }
        match (&self.initiation_rules, &self.titration_rules) {
            (Some(initiation), Some(titration)) => {
                Ok(if initiating { initiation.as_slice() } else { titration.as_slice() })
            }
            _ => Err(Error::MissingConfiguration(format!(
                "protocol '{}' needs `rules` or both `initiation_rules` and `titration_rules`",
                self.name
            ))),
        }
    }
}

/// Outcome of one titrator evaluation
#[derive(Clone, Debug, PartialEq)]
pub struct Evaluation {
    /// True when no rule was satisfied
    pub can_advance: bool,
    pub satisfied_rules: Vec<Arc<RuleWithActions>>,
    pub recommended_actions: Vec<Action>,
}

impl Evaluation {
    pub fn action_kinds(&self) -> Vec<ActionKind> {
        self.recommended_actions.iter().map(Action::kind).collect()
    }
}

/// Per-patient titration session
#[derive(Debug)]
pub struct Titrator<'a> {
    protocol: &'a Protocol,
    patient: &'a Patient,
    current_medication: Option<Medication>,
    titration_target: Option<Arc<RuleWithActions>>,
    rules: Vec<Arc<RuleWithActions>>,
}

impl<'a> Titrator<'a> {
    /// Resolve the patient's current medication and assemble the rule set.
    ///
    /// Fails with [`Error::MultipleActiveMedications`] or
    /// [`Error::MissingConfiguration`].
    pub fn new(protocol: &'a Protocol, patient: &'a Patient) -> Result<Self> {
        let current_medication = protocol.ladder.current_medication_for_patient(patient)?;
        let initiating = current_medication.is_none();

        let titration_target = protocol
            .titration_target
            .as_ref()
            .map(|target| target.resolve(&protocol.ladder, current_medication.as_ref()));

        let mut rules = protocol.phase_rules(initiating)?.to_vec();
        rules.extend(titration_target.iter().cloned());

        tracing::debug!(
            "Titrator for protocol '{}': current medication {:?}, {} rules",
            protocol.name,
            current_medication.as_ref().map(|m| m.to_string()),
            rules.len()
        );

        Ok(Self {
            protocol,
            patient,
            current_medication,
            titration_target,
            rules,
        })
    }

    pub fn patient(&self) -> &Patient {
        self.patient
    }

    pub fn protocol(&self) -> &Protocol {
        self.protocol
    }

    pub fn current_medication(&self) -> Option<&Medication> {
        self.current_medication.as_ref()
    }

    pub fn current_ingredient(&self) -> Option<&Ingredient> {
        self.current_medication.as_ref().map(|m| &m.ingredient)
    }

    pub fn titration_target(&self) -> Option<&Arc<RuleWithActions>> {
        self.titration_target.as_ref()
    }

    /// Effective rules: phase rules followed by the titration target
    pub fn rules(&self) -> &[Arc<RuleWithActions>] {
        &self.rules
    }

    pub fn is_initiating(&self) -> bool {
        self.current_medication.is_none()
    }

    pub fn is_titrating(&self) -> bool {
        !self.is_initiating()
    }

    /// Evaluate every rule and recommend actions.
    ///
    /// Does not modify the patient; repeated calls give equal results.
    pub fn evaluate(&self) -> Result<Evaluation> {
        let mut satisfied_rules = Vec::new();
        let mut satisfied_actions = Vec::new();

        for rule in &self.rules {
            let result = rule.evaluate(self.patient)?;
            if result.is_satisfied {
                satisfied_rules.push(rule.clone());
                satisfied_actions.extend(result.recommended_actions);
            }
        }

        let can_advance = satisfied_rules.is_empty();
        let kinds = if can_advance {
            self.default_actions()?
        } else {
            let mut seen = HashSet::new();
            satisfied_actions
                .into_iter()
                .filter(|kind| seen.insert(*kind))
                .collect()
        };

        tracing::info!(
            "Protocol '{}': {} of {} rules satisfied, recommending {:?}",
            self.protocol.name,
            satisfied_rules.len(),
            self.rules.len(),
            kinds
        );

        let recommended_actions = kinds
            .into_iter()
            .map(|kind| {
                kind.instantiate(
                    self.protocol.ladder.clone(),
                    self.current_medication.clone(),
                )
            })
            .collect();

        Ok(Evaluation {
            can_advance,
            satisfied_rules,
            recommended_actions,
        })
    }

    /// Phase default actions, with the top-step policy applied
    fn default_actions(&self) -> Result<Vec<ActionKind>> {
        let Some(current) = &self.current_medication else {
            return Ok(self.protocol.initiation_actions.clone());
        };

        let actions = &self.protocol.titration_actions;
        let ladder = &self.protocol.ladder;
        if !actions.contains(&ActionKind::StepUp) || !ladder.is_at_highest_step(current)? {
            return Ok(actions.clone());
        }

        match self.protocol.top_step {
            TopStepPolicy::Fail => {
                ladder.next_step_up(current)?;
                Ok(actions.clone())
            }
            TopStepPolicy::Hold => {
                tracing::info!("{} is at the highest step, holding dose", current);
                let mut seen = HashSet::new();
                Ok(actions
                    .iter()
                    .map(|kind| match kind {
                        ActionKind::StepUp => ActionKind::Continue,
                        other => *other,
                    })
                    .filter(|kind| seen.insert(*kind))
                    .collect())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ConditionalRule, Dose, Rule, Value};

    fn drug_a_ladder() -> Arc<DosingLadder> {
        Arc::new(crate::ladder::tests::drug_a_ladder())
    }

    fn drug_a(dose: f64) -> Medication {
        let ladder = crate::ladder::tests::drug_a_ladder();
        ladder.subladder("DrugA").unwrap()[0].at_dose(Dose::mg(dose))
    }

    fn rule(parameter: &str, op: &str, threshold: impl Into<Value>) -> Rule {
        Rule::new(parameter, op, threshold).unwrap()
    }

    fn protocol() -> Protocol {
        Protocol::new("test", drug_a_ladder())
            .with_rules(vec![
                RuleWithActions::class_limiting(rule("angioedema", "eq", true)),
                RuleWithActions::titration_limiting(rule("systolic_bp", "lt", 100)),
                RuleWithActions::condition_titration_limiting(ConditionalRule::new(
                    rule("creatinine_rise_percent", "gte", 30),
                    rule("egfr", "lt", 30),
                )),
            ])
            .with_titration_target(TitrationTarget::max_tolerated())
    }

    fn patient() -> Patient {
        Patient::default()
            .with_attribute("angioedema", false)
            .with_attribute("systolic_bp", 135)
    }

    #[test]
    fn test_scenario_step_up_when_nothing_blocks() {
        let protocol = protocol();
        let patient = patient().with_medication(drug_a(10.0));
        let titrator = Titrator::new(&protocol, &patient).unwrap();

        assert!(titrator.is_titrating());
        let evaluation = titrator.evaluate().unwrap();
        assert!(evaluation.can_advance);
        assert!(evaluation.satisfied_rules.is_empty());
        assert_eq!(evaluation.action_kinds(), vec![ActionKind::StepUp]);
        assert_eq!(
            evaluation.recommended_actions[0].suggest().unwrap(),
            "Increase DrugA to DrugA 20mg."
        );
    }

    #[test]
    fn test_scenario_start_when_initiating() {
        let protocol = protocol();
        let patient = patient();
        let titrator = Titrator::new(&protocol, &patient).unwrap();

        assert!(titrator.is_initiating());
        assert_eq!(titrator.current_ingredient(), None);
        let evaluation = titrator.evaluate().unwrap();
        assert!(evaluation.can_advance);
        assert_eq!(evaluation.action_kinds(), vec![ActionKind::Start]);
        assert_eq!(
            evaluation.recommended_actions[0].suggest().unwrap(),
            "Start DrugA 5mg, or DrugB 2mg."
        );
    }

    #[test]
    fn test_scenario_class_limiting_rule() {
        let protocol = protocol();
        let patient = patient()
            .with_attribute("angioedema", true)
            .with_medication(drug_a(10.0));
        let evaluation = Titrator::new(&protocol, &patient).unwrap().evaluate().unwrap();

        assert!(!evaluation.can_advance);
        assert_eq!(evaluation.satisfied_rules.len(), 1);
        assert_eq!(
            evaluation.action_kinds(),
            vec![ActionKind::Stop, ActionKind::ReportReaction]
        );
        for action in &evaluation.recommended_actions {
            assert_eq!(action.current_medication(), Some(&drug_a(10.0)));
        }
    }

    #[test]
    fn test_scenario_max_tolerated() {
        let protocol = protocol();
        let patient = patient()
            .with_medication(drug_a(10.0))
            .with_max_tolerated(drug_a(10.0));
        let titrator = Titrator::new(&protocol, &patient).unwrap();
        let evaluation = titrator.evaluate().unwrap();

        assert!(!evaluation.can_advance);
        assert_eq!(evaluation.action_kinds(), vec![ActionKind::Continue]);
        assert!(Arc::ptr_eq(
            &evaluation.satisfied_rules[0],
            titrator.titration_target().unwrap()
        ));
    }

    #[test]
    fn test_scenario_top_step_holds_by_default() {
        let protocol = protocol();
        let patient = patient().with_medication(drug_a(20.0));
        let evaluation = Titrator::new(&protocol, &patient).unwrap().evaluate().unwrap();

        assert!(evaluation.can_advance);
        assert_eq!(evaluation.action_kinds(), vec![ActionKind::Continue]);
        assert_eq!(
            evaluation.recommended_actions[0].suggest().unwrap(),
            "Continue DrugA 20mg."
        );
    }

    #[test]
    fn test_scenario_top_step_fail_policy_raises_out_of_range() {
        let protocol = protocol().with_top_step_policy(TopStepPolicy::Fail);
        let patient = patient().with_medication(drug_a(20.0));
        let titrator = Titrator::new(&protocol, &patient).unwrap();

        assert!(matches!(
            titrator.evaluate(),
            Err(Error::OutOfRange { direction: "up", .. })
        ));
    }

    #[test]
    fn test_union_deduplicates_across_rules() {
        let protocol = protocol();
        let patient = patient()
            .with_attribute("systolic_bp", 95)
            .with_attribute("egfr", 20)
            .with_attribute("creatinine_rise_percent", 40)
            .with_medication(drug_a(10.0))
            .with_max_tolerated(drug_a(10.0));
        let evaluation = Titrator::new(&protocol, &patient).unwrap().evaluate().unwrap();

        assert_eq!(evaluation.satisfied_rules.len(), 3);
        assert_eq!(
            evaluation.action_kinds(),
            vec![ActionKind::Continue, ActionKind::StepDown, ActionKind::MarkMaxDose]
        );
    }

    #[test]
    fn test_evaluate_is_deterministic() {
        let protocol = protocol();
        let patient = patient()
            .with_attribute("angioedema", true)
            .with_attribute("systolic_bp", 90)
            .with_medication(drug_a(10.0));
        let titrator = Titrator::new(&protocol, &patient).unwrap();

        let first = titrator.evaluate().unwrap();
        let second = titrator.evaluate().unwrap();
        assert_eq!(first, second);
        assert_eq!(patient.reactions.len(), 0);
    }

    #[test]
    fn test_missing_configuration() {
        let protocol = Protocol::new("empty", drug_a_ladder());
        let patient = patient();
        assert!(matches!(
            Titrator::new(&protocol, &patient),
            Err(Error::MissingConfiguration(_))
        ));

        let mut half = Protocol::new("half", drug_a_ladder()).with_phase_rules(vec![], vec![]);
        half.titration_rules = None;
        assert!(matches!(
            Titrator::new(&half, &patient),
            Err(Error::MissingConfiguration(_))
        ));
    }

    #[test]
    fn test_rule_count_agrees_with_titrator() {
        let empty = Protocol::new("empty", drug_a_ladder());
        assert!(matches!(empty.rule_count(), Err(Error::MissingConfiguration(_))));

        let shared = Protocol::new("shared", drug_a_ladder())
            .with_rules(vec![RuleWithActions::titration_limiting(rule("systolic_bp", "lt", 100))]);
        assert_eq!(shared.rule_count().unwrap(), 1);

        let phased = Protocol::new("phased", drug_a_ladder()).with_phase_rules(
            vec![RuleWithActions::contraindication(rule("angioedema", "eq", true))],
            vec![
                RuleWithActions::class_limiting(rule("angioedema", "eq", true)),
                RuleWithActions::titration_limiting(rule("systolic_bp", "lt", 100)),
            ],
        );
        assert_eq!(phased.rule_count().unwrap(), 3);
    }

    #[test]
    fn test_phase_rules_follow_current_medication() {
        let protocol = Protocol::new("phased", drug_a_ladder()).with_phase_rules(
            vec![RuleWithActions::contraindication(rule("pregnant", "eq", "yes"))],
            vec![RuleWithActions::titration_limiting(rule("systolic_bp", "lt", 100))],
        );

        let initiating = patient().with_attribute("pregnant", "yes");
        let evaluation = Titrator::new(&protocol, &initiating).unwrap().evaluate().unwrap();
        assert_eq!(evaluation.action_kinds(), vec![ActionKind::DoNotStart]);

        let titrating = patient()
            .with_attribute("pregnant", "yes")
            .with_medication(drug_a(5.0));
        let titrator = Titrator::new(&protocol, &titrating).unwrap();
        assert_eq!(titrator.rules().len(), 1);
        assert_eq!(titrator.evaluate().unwrap().action_kinds(), vec![ActionKind::StepUp]);
    }

    #[test]
    fn test_multiple_active_medications_fail_construction() {
        let protocol = protocol();
        let ladder = drug_a_ladder();
        let patient = patient()
            .with_medication(drug_a(5.0))
            .with_medication(ladder.subladder("DrugB").unwrap()[0].clone());
        assert!(matches!(
            Titrator::new(&protocol, &patient),
            Err(Error::MultipleActiveMedications(_))
        ));
    }

    #[test]
    fn test_missing_mandatory_attribute_propagates() {
        let protocol = protocol();
        let patient = Patient::default().with_medication(drug_a(5.0));
        let titrator = Titrator::new(&protocol, &patient).unwrap();
        assert!(matches!(titrator.evaluate(), Err(Error::MissingAttribute(_))));
    }

    #[test]
    fn test_report_reaction_is_explicit() {
        let protocol = protocol();
        let mut patient = patient()
            .with_attribute("angioedema", true)
            .with_medication(drug_a(10.0));

        let evaluation = Titrator::new(&protocol, &patient).unwrap().evaluate().unwrap();
        assert!(patient.reactions.is_empty());

        for action in &evaluation.recommended_actions {
            action.perform_with(&mut patient, "angioedema").unwrap();
        }
        assert_eq!(patient.reactions.len(), 1);
        assert_eq!(patient.reactions[0].ingredient.name, "druga");
    }

    #[test]
    fn test_protocol_shared_across_threads() {
        let protocol = Arc::new(protocol());
        let patients = vec![
            patient().with_medication(drug_a(5.0)),
            patient().with_attribute("angioedema", true).with_medication(drug_a(10.0)),
            patient(),
        ];

        let results: Vec<Vec<ActionKind>> = std::thread::scope(|scope| {
            let handles: Vec<_> = patients
                .iter()
                .map(|patient| {
                    let protocol = Arc::clone(&protocol);
                    scope.spawn(move || {
                        Titrator::new(&protocol, patient)
                            .unwrap()
                            .evaluate()
                            .unwrap()
                            .action_kinds()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(results[0], vec![ActionKind::StepUp]);
        assert_eq!(results[1], vec![ActionKind::Stop, ActionKind::ReportReaction]);
        assert_eq!(results[2], vec![ActionKind::Start]);
    }
}
