//! Determinism analysis for JVM code destined for a deterministic sandbox.
//!
//! Classes are registered in a [`ClassHierarchy`], references discovered while
//! walking them are collected in a [`ReferenceMap`], and every class or member
//! reached from the analyzed unit is judged by the [`DeterminismGate`].
//! [`RuntimeCostLedger`] meters an execution against an [`ExecutionProfile`].

pub mod analysis;
pub mod cost;
pub mod descriptor;
pub mod error;
pub mod hierarchy;
pub mod ir;
pub mod loader;
pub mod logging;
pub mod member;
pub mod policy;
pub mod references;
pub mod report;

pub use analysis::{AnalysisConfiguration, AnalysisReport, Analyzer};
pub use cost::{CostKind, CostSummary, ExecutionProfile, RuntimeCostLedger};
pub use error::{ClassificationFailure, FailureReason};
pub use hierarchy::ClassHierarchy;
pub use ir::{ClassRepresentation, Determinism, Member};
pub use member::DeterminismMarkers;
pub use policy::{DeterminismGate, Policy};
pub use references::{ClassReference, EntityReference, MemberReference, ReferenceMap, SourceLocation};
