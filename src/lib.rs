//! Normalization and analysis of yearly secondary-school admissions results.
//!
//! The pipeline runs leaf-first: [`loader`] turns raw per-applicant tables
//! into typed records using the rules in [`columns`], [`reshape`] pivots the
//! five choice slots into one row per (applicant, priority), and
//! [`analyzer`] derives admissions KPIs for any selection of those rows.
//! Planned seats come from [`capacity`]. Every stage is a pure function of
//! its inputs.

pub mod analyzer;
pub mod breakdown;
pub mod capacity;
pub mod columns;
pub mod error;
pub mod loader;
pub mod logging;
pub mod models;
pub mod reasons;
pub mod reference;
pub mod reshape;
pub mod sources;
pub mod validation;

pub use analyzer::{calculate_kpis, compute_scoped, KpiResult, KpiScope, OutcomeStats};
pub use capacity::CapacityTable;
pub use error::AnalysisError;
pub use loader::{load_year, YearData};
pub use models::{AnalysisRequest, ApplicantRecord, Choice, RawTable, ScalarValue};
pub use reasons::ReasonCategory;
pub use reference::{FieldCatalog, SchoolReference};
pub use reshape::{ChoiceTable, Reshaper};
