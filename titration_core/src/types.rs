//! Core domain types for the titration engine.
//!
//! This module defines the fundamental types used throughout the system:
//! - Drug classes, ingredients, doses and medications
//! - Attribute values compared by rules
//! - The patient record and its reaction log

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use uuid::Uuid;

// ============================================================================
// Medication Types
// ============================================================================

/// Pharmacological class an ingredient belongs to (e.g. "ACE inhibitor")
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct DrugClass(pub String);

impl fmt::Display for DrugClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Active ingredient of a medication
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Ingredient {
    pub name: String,
    pub drug_class: DrugClass,
}

impl Ingredient {
    pub fn new(name: impl Into<String>, drug_class: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            drug_class: DrugClass(drug_class.into()),
        }
    }
}

impl fmt::Display for Ingredient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// A dose amount with its unit.
///
/// Doses are only ordered against doses of the same unit.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Dose {
    pub amount: f64,
    pub unit: String,
}

impl Dose {
    pub fn new(amount: f64, unit: impl Into<String>) -> Self {
        Self {
            amount,
            unit: unit.into(),
        }
    }

    /// Dose in milligrams
    pub fn mg(amount: f64) -> Self {
        Self::new(amount, "mg")
    }
}

impl PartialOrd for Dose {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        if self.unit != other.unit {
            return None;
        }
        self.amount.partial_cmp(&other.amount)
    }
}

impl fmt::Display for Dose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.amount, self.unit)
    }
}

/// A medication at a specific dose
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Medication {
    pub name: String,
    pub dose: Dose,
    pub ingredient: Ingredient,
}

impl Medication {
    pub fn new(name: impl Into<String>, dose: Dose, ingredient: Ingredient) -> Self {
        Self {
            name: name.into(),
            dose,
            ingredient,
        }
    }

    /// Same medication at a different dose
    pub fn at_dose(&self, dose: Dose) -> Self {
        Self {
            name: self.name.clone(),
            dose,
            ingredient: self.ingredient.clone(),
        }
    }
}

impl fmt::Display for Medication {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.name, self.dose)
    }
}

// ============================================================================
// Attribute Values
// ============================================================================

/// A patient attribute or rule threshold.
///
/// Numbers compare with numbers and text with text; any other pairing is
/// unordered.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Number(f64),
    Text(String),
    List(Vec<Value>),
}

impl Value {
    pub fn is_bool(&self) -> bool {
        matches!(self, Value::Bool(_))
    }

    /// Membership test with `self` as the container
    pub fn contains(&self, item: &Value) -> bool {
        match (self, item) {
            (Value::List(items), _) => items.contains(item),
            (Value::Text(haystack), Value::Text(needle)) => haystack.contains(needle.as_str()),
            _ => false,
        }
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => a.partial_cmp(b),
            (Value::Text(a), Value::Text(b)) => a.partial_cmp(b),
            (Value::Bool(a), Value::Bool(b)) => a.partial_cmp(b),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{}", b),
            Value::Number(n) => write!(f, "{}", n),
            Value::Text(s) => write!(f, "{}", s),
            Value::List(items) => {
                let rendered: Vec<String> = items.iter().map(|v| v.to_string()).collect();
                write!(f, "[{}]", rendered.join(", "))
            }
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Number(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Number(f64::from(value))
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(values: Vec<T>) -> Self {
        Value::List(values.into_iter().map(Into::into).collect())
    }
}

// ============================================================================
// Patient Record
// ============================================================================

/// An adverse reaction filed against an ingredient
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Reaction {
    pub id: Uuid,
    pub ingredient: Ingredient,
    pub description: String,
    pub reported_at: DateTime<Utc>,
}

/// The patient record rules are evaluated against
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Patient {
    /// Named attributes (e.g. `systolic_bp`, `angioedema`)
    #[serde(default)]
    pub attributes: BTreeMap<String, Value>,

    /// Active medications, in prescription order
    #[serde(default)]
    pub medications: Vec<Medication>,

    /// Maximum tolerated medication keyed by medication name
    #[serde(default)]
    pub max_tolerated: HashMap<String, Medication>,

    #[serde(default)]
    pub reactions: Vec<Reaction>,
}

impl Patient {
    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    pub fn set_attribute(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.attributes.insert(name.into(), value.into());
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set_attribute(name, value);
        self
    }

    pub fn with_medication(mut self, medication: Medication) -> Self {
        self.medications.push(medication);
        self
    }

    /// Record `medication` as the maximum tolerated dose for its name
    pub fn with_max_tolerated(mut self, medication: Medication) -> Self {
        self.max_tolerated
            .insert(medication.name.clone(), medication);
        self
    }

    /// Append a reaction to the log and return a copy of the entry
    pub fn report_reaction(
        &mut self,
        ingredient: Ingredient,
        description: impl Into<String>,
    ) -> Reaction {
        let reaction = Reaction {
            id: Uuid::new_v4(),
            ingredient,
            description: description.into(),
            reported_at: Utc::now(),
        };
        tracing::info!(
            "Filed adverse reaction to {}: {}",
            reaction.ingredient,
            reaction.description
        );
        self.reactions.push(reaction.clone());
        reaction
    }
}
