#![forbid(unsafe_code)]

//! Core domain model and decision logic for medication titration.
//!
//! This crate provides:
//! - Domain types (medications, doses, patient records)
//! - Dosing ladders
//! - Rules, conditional rules and rules with actions
//! - The titrator that turns rule outcomes into recommended actions
//! - Protocol files, the built-in protocol and configuration

pub mod types;
pub mod error;
pub mod ladder;
pub mod rule;
pub mod action;
pub mod rule_actions;
pub mod titrator;
pub mod protocol;
pub mod catalog;
pub mod config;
pub mod logging;
pub mod record;

// Re-export commonly used types
pub use error::{Error, Result};
pub use types::*;
pub use ladder::{DosingLadder, SubLadder};
pub use rule::{ConditionalRule, EvaluationResult, Operator, Rule};
pub use action::{Action, ActionKind};
pub use rule_actions::{ActionPolicy, ActionSpec, MaxTolerated, Predicate, RuleWithActions};
pub use titrator::{Evaluation, Protocol, TargetBuilder, TitrationTarget, Titrator, TopStepPolicy};
pub use protocol::{load_protocol, parse_protocol, ProtocolFile};
pub use catalog::{build_default_protocol, get_default_protocol};
pub use config::Config;
