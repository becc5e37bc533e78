//! Atomic rules comparing one patient attribute to a threshold.

use crate::{ActionKind, Error, Patient, Result, Value};
use std::fmt;
use std::str::FromStr;

/// Comparison applied by a [`Rule`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operator {
    Gt,
    Gte,
    Lt,
    Lte,
    Eq,
    Neq,
    /// Membership of the patient value inside the threshold
    In,
}

impl Operator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Gt => "gt",
            Operator::Gte => "gte",
            Operator::Lt => "lt",
            Operator::Lte => "lte",
            Operator::Eq => "eq",
            Operator::Neq => "neq",
            Operator::In => "in",
        }
    }

    /// Apply the operator to a patient value and a threshold.
    ///
    /// `In` takes the threshold as the container, so its arguments run the
    /// other way round from every other operator.
    // FIXME: the reversed order for `in` is kept for compatibility with
    // existing protocols; do not copy it into new operators.
    pub fn apply(&self, patient_value: &Value, threshold: &Value) -> bool {
        match self {
            Operator::Gt => patient_value > threshold,
            Operator::Gte => patient_value >= threshold,
            Operator::Lt => patient_value < threshold,
            Operator::Lte => patient_value <= threshold,
            Operator::Eq => patient_value == threshold,
            Operator::Neq => patient_value != threshold,
            Operator::In => threshold.contains(patient_value),
        }
    }
}

impl FromStr for Operator {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "gt" => Ok(Operator::Gt),
            "gte" => Ok(Operator::Gte),
            "lt" => Ok(Operator::Lt),
            "lte" => Ok(Operator::Lte),
            "eq" => Ok(Operator::Eq),
            "neq" => Ok(Operator::Neq),
            "in" => Ok(Operator::In),
            other => Err(Error::InvalidOperator(other.to_string())),
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of evaluating a rule against one patient
#[derive(Clone, Debug, PartialEq)]
pub struct EvaluationResult {
    /// Rendering of the rule that produced this result
    pub rule: String,
    pub is_satisfied: bool,
    /// Fully expanded actions for the selected branch (empty for bare rules)
    pub recommended_actions: Vec<ActionKind>,
}

impl EvaluationResult {
    pub(crate) fn bare(rule: impl fmt::Display, is_satisfied: bool) -> Self {
        Self {
            rule: rule.to_string(),
            is_satisfied,
            recommended_actions: Vec::new(),
        }
    }
}

/// Predicate comparing a named patient attribute to a threshold
#[derive(Clone, Debug, PartialEq)]
pub struct Rule {
    pub parameter: String,
    pub operator: Operator,
    pub threshold: Value,
}

impl Rule {
    /// Build a rule from an operator name.
    ///
    /// Fails with [`Error::InvalidOperator`] for anything outside
    /// gt/gte/lt/lte/eq/neq/in.
    pub fn new(
        parameter: impl Into<String>,
        operation: &str,
        threshold: impl Into<Value>,
    ) -> Result<Self> {
        Ok(Self::with_operator(parameter, operation.parse()?, threshold))
    }

    pub fn with_operator(
        parameter: impl Into<String>,
        operator: Operator,
        threshold: impl Into<Value>,
    ) -> Self {
        Self {
            parameter: parameter.into(),
            operator,
            threshold: threshold.into(),
        }
    }

    /// Whether the comparison holds for `patient`.
    ///
    /// An absent attribute is an error when the threshold is boolean (the
    /// attribute is mandatory) and not-satisfied otherwise.
    pub fn is_satisfied(&self, patient: &Patient) -> Result<bool> {
        let Some(value) = patient.attribute(&self.parameter) else {
            if self.threshold.is_bool() {
                return Err(Error::MissingAttribute(self.parameter.clone()));
            }
            tracing::debug!("Attribute `{}` absent, treating as not satisfied", self.parameter);
            return Ok(false);
        };

        let satisfied = self.operator.apply(value, &self.threshold);
        if !satisfied
            && self.operator != Operator::In
            && value.partial_cmp(&self.threshold).is_none()
        {
            tracing::debug!(
                "Attribute `{}` = {} is not comparable with {}",
                self.parameter,
                value,
                self.threshold
            );
        }
        Ok(satisfied)
    }

    pub fn evaluate(&self, patient: &Patient) -> Result<EvaluationResult> {
        Ok(EvaluationResult::bare(self, self.is_satisfied(patient)?))
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.parameter, self.operator, self.threshold)
    }
}

/// A rule evaluated only when its condition holds
#[derive(Clone, Debug, PartialEq)]
pub struct ConditionalRule {
    pub rule: Rule,
    pub condition: Rule,
}

impl ConditionalRule {
    pub fn new(rule: Rule, condition: Rule) -> Self {
        Self { rule, condition }
    }

    /// Condition first; the primary comparison is skipped when it fails
    pub fn is_satisfied(&self, patient: &Patient) -> Result<bool> {
        if !self.condition.is_satisfied(patient)? {
            return Ok(false);
        }
        self.rule.is_satisfied(patient)
    }

    pub fn evaluate(&self, patient: &Patient) -> Result<EvaluationResult> {
        Ok(EvaluationResult::bare(self, self.is_satisfied(patient)?))
    }
}

impl fmt::Display for ConditionalRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} if {}", self.rule, self.condition)
    }
}
