//! Recommended medication actions.
//!
//! An [`ActionKind`] is what rules are configured with; an [`Action`] is that
//! kind bound to the ladder and current medication of one evaluation.

use crate::{DosingLadder, Error, Medication, Patient, Reaction, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// The kinds of action a rule can recommend
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Start,
    DoNotStart,
    StepUp,
    StepDown,
    Continue,
    Stop,
    MarkMaxDose,
    ReportReaction,
}

impl ActionKind {
    pub fn name(&self) -> &'static str {
        match self {
            ActionKind::Start => "start",
            ActionKind::DoNotStart => "do_not_start",
            ActionKind::StepUp => "step_up",
            ActionKind::StepDown => "step_down",
            ActionKind::Continue => "continue",
            ActionKind::Stop => "stop",
            ActionKind::MarkMaxDose => "mark_max_dose",
            ActionKind::ReportReaction => "report_reaction",
        }
    }

    /// Bind this kind to an evaluation context
    pub fn instantiate(
        self,
        ladder: Arc<DosingLadder>,
        current_medication: Option<Medication>,
    ) -> Action {
        Action::new(self, ladder, current_medication)
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// An action kind bound to a ladder and the patient's current medication
#[derive(Clone, Debug, PartialEq)]
pub struct Action {
    kind: ActionKind,
    ladder: Arc<DosingLadder>,
    current_medication: Option<Medication>,
}

impl Action {
    pub fn new(
        kind: ActionKind,
        ladder: Arc<DosingLadder>,
        current_medication: Option<Medication>,
    ) -> Self {
        Self {
            kind,
            ladder,
            current_medication,
        }
    }

    pub fn kind(&self) -> ActionKind {
        self.kind
    }

    pub fn current_medication(&self) -> Option<&Medication> {
        self.current_medication.as_ref()
    }

    fn medication(&self) -> Result<&Medication> {
        self.current_medication
            .as_ref()
            .ok_or(Error::NoCurrentMedication(self.kind.name()))
    }

    /// Human-readable recommendation
    pub fn suggest(&self) -> Result<String> {
        let text = match self.kind {
            ActionKind::Start => {
                let options: Vec<String> =
                    self.buttons().iter().map(|m| m.to_string()).collect();
                match options.split_last() {
                    Some((last, [])) => format!("Start {}.", last),
                    Some((last, rest)) => format!("Start {}, or {}.", rest.join(", "), last),
                    None => "Start a medication.".to_string(),
                }
            }
            ActionKind::DoNotStart => match self.ladder.drug_class() {
                Some(class) => format!("Do not start a new {} medication.", class),
                None => "Do not start a new medication.".to_string(),
            },
            ActionKind::StepUp => {
                let medication = self.medication()?;
                let next = self.ladder.next_step_up(medication)?;
                format!("Increase {} to {}.", medication.name, next)
            }
            ActionKind::StepDown => {
                let medication = self.medication()?;
                let next = self.ladder.next_step_down(medication)?;
                format!("Decrease {} to {}.", medication.name, next)
            }
            ActionKind::Continue => format!("Continue {}.", self.medication()?),
            ActionKind::Stop => format!("Stop {}.", self.medication()?.name),
            ActionKind::MarkMaxDose => {
                format!("Mark {} as maximum tolerated dose.", self.medication()?)
            }
            ActionKind::ReportReaction => {
                format!("File an adverse reaction to {}.", self.medication()?.name)
            }
        };
        Ok(text)
    }

    /// Perform the action's side effect, if any
    pub fn perform(&self, patient: &mut Patient) -> Result<Option<Reaction>> {
        self.perform_with(patient, "reaction")
    }

    /// Like [`Action::perform`] with an explicit reaction description.
    ///
    /// Only `ReportReaction` touches the patient: it appends a reaction
    /// against the current ingredient and returns it.
    pub fn perform_with(&self, patient: &mut Patient, description: &str) -> Result<Option<Reaction>> {
        match self.kind {
            ActionKind::ReportReaction => {
                let ingredient = self.medication()?.ingredient.clone();
                Ok(Some(patient.report_reaction(ingredient, description)))
            }
            _ => Ok(None),
        }
    }

    /// Selectable options; `Start` offers each sub-ladder's lowest step
    pub fn buttons(&self) -> Vec<Medication> {
        match self.kind {
            ActionKind::Start => self.ladder.lowest_steps().into_iter().cloned().collect(),
            _ => Vec::new(),
        }
    }
}
