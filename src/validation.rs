//! Data-quality checks. Findings are reported, never fixed up.

use crate::analyzer::calculate_kpis;
use crate::breakdown::group_by_school;
use crate::capacity::CapacityTable;
use crate::models::{ApplicantRecord, Choice};
use crate::reference::SchoolReference;
use serde::Serialize;
use std::collections::BTreeSet;
use tracing::warn;

/// Fullness above this share of planned seats is reported.
pub const FULLNESS_TOLERANCE: f64 = 110.0;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MultipleAdmission {
    /// Position of the record in the slice passed in, matching the applicant
    /// id `Reshaper::reshape` assigns to the same slice.
    pub applicant_id: usize,
    /// 1-based slots flagged admitted.
    pub admitted_slots: Vec<usize>,
}

/// Applicants whose raw record flags more than one slot as admitted.
pub fn count_multiple_admissions(records: &[ApplicantRecord]) -> Vec<MultipleAdmission> {
    records
        .iter()
        .enumerate()
        .filter(|(_, record)| record.admitted_slots() > 1)
        .map(|(applicant_id, record)| MultipleAdmission {
            applicant_id,
            admitted_slots: record
                .slots
                .iter()
                .enumerate()
                .filter(|(_, slot)| slot.admitted)
                .map(|(i, _)| i + 1)
                .collect(),
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverfullSchool {
    pub institution_id: String,
    pub school_name: String,
    pub admitted: usize,
    pub planned_capacity: u32,
    pub fullness_rate: f64,
}

/// Compare each school's admissions, over all its fields, with the seats
/// planned for `round`. Schools without capacity data are skipped.
pub fn capacity_sanity_check(
    choices: &[Choice],
    capacity: &CapacityTable,
    reference: &SchoolReference,
    round: u32,
) -> Vec<OverfullSchool> {
    let mut findings = Vec::new();

    for (institution_id, rows) in group_by_school(choices) {
        let field_codes: BTreeSet<&str> = rows.iter().map(|c| c.field_code.as_str()).collect();
        let planned = match capacity.school_total(reference, &institution_id, field_codes, round) {
            Some(seats) if seats > 0 => seats,
            _ => continue,
        };

        let kpi = calculate_kpis(&rows, Some(planned));
        if kpi.fullness_rate > FULLNESS_TOLERANCE {
            let school_name = rows.first().map(|c| c.school_name.clone()).unwrap_or_default();
            warn!(
                school = %school_name,
                admitted = kpi.total_admitted,
                capacity = planned,
                fullness = kpi.fullness_rate,
                "school admitted beyond planned capacity"
            );
            findings.push(OverfullSchool {
                institution_id,
                school_name,
                admitted: kpi.total_admitted,
                planned_capacity: planned,
                fullness_rate: kpi.fullness_rate,
            });
        }
    }

    findings
}
