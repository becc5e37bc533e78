//! Dosing ladders: ordered dose steps per medication.
//!
//! A ladder holds one sub-ladder per medication of a drug class. Each
//! sub-ladder is a strictly ascending sequence of doses of one ingredient,
//! and all sub-ladders have the same number of steps.

use crate::{DrugClass, Error, Ingredient, Medication, Patient, Result};
use std::cmp::Ordering;

/// Dose steps for a single medication
#[derive(Clone, Debug, PartialEq)]
pub struct SubLadder {
    pub name: String,
    pub steps: Vec<Medication>,
}

impl SubLadder {
    fn ingredient(&self) -> Option<&Ingredient> {
        self.steps.first().map(|m| &m.ingredient)
    }
}

/// Ordered per-medication dose step sequences
#[derive(Clone, Debug, PartialEq)]
pub struct DosingLadder {
    subladders: Vec<SubLadder>,
    single_class: bool,
}

impl DosingLadder {
    /// Build a ladder from `(medication name, ascending steps)` pairs.
    ///
    /// Sub-ladder order is preserved. Fails with [`Error::InvalidLadder`]
    /// listing every violated invariant.
    pub fn new<I, S>(ladder: I, single_class: bool) -> Result<Self>
    where
        I: IntoIterator<Item = (S, Vec<Medication>)>,
        S: Into<String>,
    {
        let subladders = ladder
            .into_iter()
            .map(|(name, steps)| SubLadder {
                name: name.into(),
                steps,
            })
            .collect();

        let ladder = Self {
            subladders,
            single_class,
        };

        let errors = ladder.validate();
        if !errors.is_empty() {
            return Err(Error::InvalidLadder(errors.join("; ")));
        }

        tracing::debug!(
            "Built dosing ladder with {} sub-ladders of {} steps",
            ladder.subladders.len(),
            ladder.step_count()
        );
        Ok(ladder)
    }

    /// Collect all invariant violations
    fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.subladders.is_empty() {
            errors.push("ladder has no sub-ladders".to_string());
            return errors;
        }

        for (i, sub) in self.subladders.iter().enumerate() {
            if self.subladders[..i].iter().any(|s| s.name == sub.name) {
                errors.push(format!("duplicate sub-ladder '{}'", sub.name));
            }

            let Some(ingredient) = sub.ingredient() else {
                errors.push(format!("sub-ladder '{}' has no steps", sub.name));
                continue;
            };

            if sub.steps.iter().any(|m| &m.ingredient != ingredient) {
                errors.push(format!(
                    "sub-ladder '{}' mixes ingredients",
                    sub.name
                ));
            }

            for pair in sub.steps.windows(2) {
                if pair[0].dose.partial_cmp(&pair[1].dose) != Some(Ordering::Less) {
                    errors.push(format!(
                        "sub-ladder '{}' is not strictly ascending at {} -> {}",
                        sub.name, pair[0].dose, pair[1].dose
                    ));
                }
            }
        }

        let step_count = self.subladders[0].steps.len();
        if let Some(sub) = self
            .subladders
            .iter()
            .find(|s| s.steps.len() != step_count)
        {
            errors.push(format!(
                "sub-ladder '{}' has {} steps, expected {}",
                sub.name,
                sub.steps.len(),
                step_count
            ));
        }

        if self.single_class {
            let classes: Vec<&DrugClass> = self
                .subladders
                .iter()
                .filter_map(|s| s.ingredient())
                .map(|i| &i.drug_class)
                .collect();
            if classes.windows(2).any(|pair| pair[0] != pair[1]) {
                errors.push("single-class ladder mixes drug classes".to_string());
            }
        }

        errors
    }

    pub fn subladders(&self) -> &[SubLadder] {
        &self.subladders
    }

    /// Number of steps in every sub-ladder
    pub fn step_count(&self) -> usize {
        self.subladders.first().map_or(0, |s| s.steps.len())
    }

    /// Drug class shared by all sub-ladders, if single-class
    pub fn drug_class(&self) -> Option<&DrugClass> {
        if !self.single_class {
            return None;
        }
        self.subladders
            .first()
            .and_then(|s| s.ingredient())
            .map(|i| &i.drug_class)
    }

    /// First step's ingredient per sub-ladder
    pub fn ingredients(&self) -> Vec<&Ingredient> {
        self.subladders
            .iter()
            .filter_map(|s| s.ingredient())
            .collect()
    }

    /// Look up a sub-ladder by medication or ingredient name
    pub fn subladder(&self, name: &str) -> Result<&[Medication]> {
        self.subladders
            .iter()
            .find(|s| s.name == name)
            .or_else(|| {
                self.subladders
                    .iter()
                    .find(|s| s.ingredient().is_some_and(|i| i.name == name))
            })
            .map(|s| s.steps.as_slice())
            .ok_or_else(|| Error::UnknownMedication(name.to_string()))
    }

    /// Index of the step whose dose matches `medication` exactly
    pub fn current_step_index(&self, medication: &Medication) -> Result<usize> {
        self.subladder(&medication.name)?
            .iter()
            .position(|step| step.dose == medication.dose)
            .ok_or_else(|| Error::DoseNotOnLadder {
                medication: medication.name.clone(),
                dose: medication.dose.to_string(),
            })
    }

    pub fn is_at_lowest_step(&self, medication: &Medication) -> Result<bool> {
        Ok(self.lowest_step(&medication.name)?.dose == medication.dose)
    }

    pub fn is_at_highest_step(&self, medication: &Medication) -> Result<bool> {
        Ok(self.highest_step(&medication.name)?.dose == medication.dose)
    }

    /// Next dose up; fails with [`Error::OutOfRange`] at the top step
    pub fn next_step_up(&self, medication: &Medication) -> Result<&Medication> {
        let index = self.current_step_index(medication)?;
        self.subladder(&medication.name)?
            .get(index + 1)
            .ok_or_else(|| Error::OutOfRange {
                medication: medication.name.clone(),
                dose: medication.dose.to_string(),
                direction: "up",
            })
    }

    /// Next dose down; fails with [`Error::OutOfRange`] at the bottom step
    pub fn next_step_down(&self, medication: &Medication) -> Result<&Medication> {
        let index = self.current_step_index(medication)?;
        index
            .checked_sub(1)
            .and_then(|i| self.subladder(&medication.name).ok()?.get(i))
            .ok_or_else(|| Error::OutOfRange {
                medication: medication.name.clone(),
                dose: medication.dose.to_string(),
                direction: "down",
            })
    }

    pub fn lowest_step(&self, name: &str) -> Result<&Medication> {
        self.subladder(name)?
            .first()
            .ok_or_else(|| Error::UnknownMedication(name.to_string()))
    }

    pub fn highest_step(&self, name: &str) -> Result<&Medication> {
        self.subladder(name)?
            .last()
            .ok_or_else(|| Error::UnknownMedication(name.to_string()))
    }

    /// Lowest step of every sub-ladder, in ladder order
    pub fn lowest_steps(&self) -> Vec<&Medication> {
        self.subladders
            .iter()
            .filter_map(|s| s.steps.first())
            .collect()
    }

    /// Highest step of every sub-ladder, in ladder order
    pub fn highest_steps(&self) -> Vec<&Medication> {
        self.subladders
            .iter()
            .filter_map(|s| s.steps.last())
            .collect()
    }

    /// The patient's active medication on this ladder, if any.
    ///
    /// Fails with [`Error::MultipleActiveMedications`] if the patient takes
    /// more than one medication whose ingredient belongs to this ladder.
    pub fn current_medication_for_patient(&self, patient: &Patient) -> Result<Option<Medication>> {
        let ingredients = self.ingredients();
        let matching: Vec<&Medication> = patient
            .medications
            .iter()
            .filter(|m| ingredients.contains(&&m.ingredient))
            .collect();

        match matching.as_slice() {
            [] => Ok(None),
            [medication] => Ok(Some((*medication).clone())),
            _ => Err(Error::MultipleActiveMedications(
                matching.iter().map(|m| m.to_string()).collect(),
            )),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::Dose;

    pub(crate) fn drug(name: &str, class: &str, doses: &[f64]) -> (String, Vec<Medication>) {
        let ingredient = Ingredient::new(name.to_lowercase(), class);
        let steps = doses
            .iter()
            .map(|d| Medication::new(name, Dose::mg(*d), ingredient.clone()))
            .collect();
        (name.to_string(), steps)
    }

    pub(crate) fn drug_a_ladder() -> DosingLadder {
        DosingLadder::new(
            vec![
                drug("DrugA", "ClassX", &[5.0, 10.0, 20.0]),
                drug("DrugB", "ClassX", &[2.0, 4.0, 8.0]),
            ],
            true,
        )
        .unwrap()
    }

    fn step(ladder: &DosingLadder, name: &str, i: usize) -> Medication {
        ladder.subladder(name).unwrap()[i].clone()
    }

    #[test]
    fn test_ingredients_in_ladder_order() {
        let ladder = drug_a_ladder();
        let names: Vec<_> = ladder.ingredients().iter().map(|i| i.name.clone()).collect();
        assert_eq!(names, vec!["druga", "drugb"]);
        assert_eq!(ladder.drug_class(), Some(&DrugClass("ClassX".into())));
        assert_eq!(ladder.step_count(), 3);
    }

    #[test]
    fn test_subladder_lookup_by_ingredient_name() {
        let ladder = drug_a_ladder();
        assert_eq!(ladder.subladder("drugb").unwrap().len(), 3);
        assert!(matches!(
            ladder.subladder("DrugZ"),
            Err(Error::UnknownMedication(_))
        ));
    }

    #[test]
    fn test_step_navigation() {
        let ladder = drug_a_ladder();
        let mid = step(&ladder, "DrugA", 1);

        assert_eq!(ladder.current_step_index(&mid).unwrap(), 1);
        assert_eq!(ladder.next_step_up(&mid).unwrap().dose, Dose::mg(20.0));
        assert_eq!(ladder.next_step_down(&mid).unwrap().dose, Dose::mg(5.0));

        let down = ladder.next_step_down(&mid).unwrap().clone();
        assert_eq!(ladder.next_step_up(&down).unwrap(), &mid);
    }

    #[test]
    fn test_step_up_at_top_is_out_of_range() {
        let ladder = drug_a_ladder();
        let top = step(&ladder, "DrugA", 2);
        assert!(ladder.is_at_highest_step(&top).unwrap());
        assert!(matches!(
            ladder.next_step_up(&top),
            Err(Error::OutOfRange { direction: "up", .. })
        ));
    }

    #[test]
    fn test_step_down_at_bottom_is_out_of_range() {
        let ladder = drug_a_ladder();
        let bottom = step(&ladder, "DrugA", 0);
        assert!(ladder.is_at_lowest_step(&bottom).unwrap());
        assert!(matches!(
            ladder.next_step_down(&bottom),
            Err(Error::OutOfRange { direction: "down", .. })
        ));
    }

    #[test]
    fn test_dose_not_on_ladder() {
        let ladder = drug_a_ladder();
        let off = step(&ladder, "DrugA", 0).at_dose(Dose::mg(7.5));
        assert!(matches!(
            ladder.current_step_index(&off),
            Err(Error::DoseNotOnLadder { .. })
        ));
    }

    #[test]
    fn test_lowest_and_highest_steps() {
        let ladder = drug_a_ladder();
        let lowest: Vec<_> = ladder.lowest_steps().iter().map(|m| m.to_string()).collect();
        let highest: Vec<_> = ladder.highest_steps().iter().map(|m| m.to_string()).collect();
        assert_eq!(lowest, vec!["DrugA 5mg", "DrugB 2mg"]);
        assert_eq!(highest, vec!["DrugA 20mg", "DrugB 8mg"]);
    }

    #[test]
    fn test_current_medication_for_patient() {
        let ladder = drug_a_ladder();
        let other = Medication::new("Aspirin", Dose::mg(75.0), Ingredient::new("aspirin", "NSAID"));

        let patient = Patient::default().with_medication(other.clone());
        assert_eq!(ladder.current_medication_for_patient(&patient).unwrap(), None);

        let on_a = step(&ladder, "DrugA", 1);
        let patient = Patient::default()
            .with_medication(other)
            .with_medication(on_a.clone());
        assert_eq!(
            ladder.current_medication_for_patient(&patient).unwrap(),
            Some(on_a)
        );
    }

    #[test]
    fn test_multiple_active_medications() {
        let ladder = drug_a_ladder();
        let patient = Patient::default()
            .with_medication(step(&ladder, "DrugA", 0))
            .with_medication(step(&ladder, "DrugB", 0));
        assert!(matches!(
            ladder.current_medication_for_patient(&patient),
            Err(Error::MultipleActiveMedications(meds)) if meds.len() == 2
        ));
    }

    #[test]
    fn test_rejects_unsorted_subladder() {
        let result = DosingLadder::new(vec![drug("DrugA", "ClassX", &[10.0, 5.0, 20.0])], true);
        assert!(matches!(result, Err(Error::InvalidLadder(msg)) if msg.contains("ascending")));
    }

    #[test]
    fn test_rejects_duplicate_dose() {
        let result = DosingLadder::new(vec![drug("DrugA", "ClassX", &[5.0, 5.0, 20.0])], true);
        assert!(matches!(result, Err(Error::InvalidLadder(_))));
    }

    #[test]
    fn test_rejects_unequal_step_counts() {
        let result = DosingLadder::new(
            vec![
                drug("DrugA", "ClassX", &[5.0, 10.0, 20.0]),
                drug("DrugB", "ClassX", &[2.0, 4.0]),
            ],
            true,
        );
        assert!(matches!(result, Err(Error::InvalidLadder(msg)) if msg.contains("DrugB")));
    }

    #[test]
    fn test_rejects_mixed_classes_only_when_single_class() {
        let subladders = vec![
            drug("DrugA", "ClassX", &[5.0, 10.0]),
            drug("DrugC", "ClassY", &[1.0, 2.0]),
        ];
        assert!(DosingLadder::new(subladders.clone(), true).is_err());

        let ladder = DosingLadder::new(subladders, false).unwrap();
        assert_eq!(ladder.drug_class(), None);
    }

    #[test]
    fn test_rejects_mixed_ingredients() {
        let (name, mut steps) = drug("DrugA", "ClassX", &[5.0, 10.0]);
        steps[1].ingredient = Ingredient::new("other", "ClassX");
        let result = DosingLadder::new(vec![(name, steps)], true);
        assert!(matches!(result, Err(Error::InvalidLadder(msg)) if msg.contains("mixes ingredients")));
    }

    #[test]
    fn test_rejects_empty_ladder() {
        let result = DosingLadder::new(Vec::<(String, Vec<Medication>)>::new(), true);
        assert!(matches!(result, Err(Error::InvalidLadder(_))));
    }
}
