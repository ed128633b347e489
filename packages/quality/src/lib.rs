#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Quality assessment, validation rules, and reprocessing decisions.
//!
//! Three pure services consumed by the stage framework:
//!
//! - the [`assess::QualityAssessor`] maps a geocode result to a quality
//!   tier and review priority;
//! - the [`rules::ValidationEngine`] runs a registry of independent rules
//!   and collects flags;
//! - the [`skip`] decider compares a cached record against a stage's skip
//!   rules to short-circuit reprocessing.

pub mod assess;
pub mod rules;
pub mod skip;

pub use assess::{Assessment, AssessmentInput, QualityAssessor};
pub use rules::{RuleHit, ValidationContext, ValidationEngine};
pub use skip::{SkipDecision, SkipRules};
