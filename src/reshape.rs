use crate::error::{AnalysisError, Result};
use crate::models::{ApplicantRecord, Choice, GradeLevel, NOT_ADMITTED, REASON_NOT_STATED, SLOT_COUNT};
use crate::reasons::ReasonCategory;
use crate::reference::{FieldCatalog, SchoolReference};
use serde::Serialize;
use std::collections::HashMap;
use tracing::{debug, warn};

/// Long-format result of one reshape pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ChoiceTable {
    pub choices: Vec<Choice>,
    /// Applicants flagged admitted at more than one slot, ascending.
    pub multiple_admissions: Vec<usize>,
}

impl ChoiceTable {
    pub fn len(&self) -> usize {
        self.choices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.choices.is_empty()
    }

    /// All choices of one applicant, in priority order.
    pub fn applicant(&self, applicant_id: usize) -> Vec<&Choice> {
        let mut rows: Vec<&Choice> = self
            .choices
            .iter()
            .filter(|c| c.applicant_id == applicant_id)
            .collect();
        rows.sort_by_key(|c| c.priority);
        rows
    }
}

pub struct Reshaper<'a> {
    pub schools: &'a SchoolReference,
    pub fields: &'a FieldCatalog,
}

impl<'a> Reshaper<'a> {
    pub fn new(schools: &'a SchoolReference, fields: &'a FieldCatalog) -> Self {
        Self { schools, fields }
    }

    /// Pivot the five choice slots into one row per (applicant, priority)
    /// and point every row at the place its applicant was admitted.
    pub fn reshape(&self, records: &[ApplicantRecord]) -> ChoiceTable {
        let mut choices = Vec::new();
        for slot in 1..=SLOT_COUNT {
            let slot_rows = self.slot_choices(records, slot);
            debug!(slot, rows = slot_rows.len(), "slot reshaped");
            choices.extend(slot_rows);
        }

        // Slots are concatenated in priority order, so the first admitted row seen wins
        let mut accepted: HashMap<usize, (String, String)> = HashMap::new();
        let mut admitted_counts: HashMap<usize, usize> = HashMap::new();
        for choice in choices.iter().filter(|c| c.admitted) {
            *admitted_counts.entry(choice.applicant_id).or_insert(0) += 1;
            accepted.entry(choice.applicant_id).or_insert_with(|| {
                (
                    choice.school_name.clone(),
                    format!("{} ({})", choice.school_name, choice.field_label),
                )
            });
        }

        for choice in choices.iter_mut() {
            if let Some((school, detail)) = accepted.get(&choice.applicant_id) {
                choice.accepted_school_name = school.clone();
                choice.accepted_detail = detail.clone();
            }
        }

        let mut multiple_admissions: Vec<usize> = admitted_counts
            .into_iter()
            .filter(|(_, count)| *count > 1)
            .map(|(applicant, _)| applicant)
            .collect();
        multiple_admissions.sort_unstable();
        if !multiple_admissions.is_empty() {
            warn!(
                applicants = multiple_admissions.len(),
                "applicants admitted at more than one choice; keeping the highest priority"
            );
        }

        debug!(
            applicants = records.len(),
            choices = choices.len(),
            "long format built"
        );
        ChoiceTable {
            choices,
            multiple_admissions,
        }
    }

    /// Choices of a single priority slot, without the admission cross-reference.
    pub fn reshape_slot(&self, records: &[ApplicantRecord], slot: usize) -> Result<Vec<Choice>> {
        if !(1..=SLOT_COUNT).contains(&slot) {
            return Err(AnalysisError::InvalidSlot(slot));
        }
        Ok(self.slot_choices(records, slot))
    }

    fn slot_choices(&self, records: &[ApplicantRecord], slot: usize) -> Vec<Choice> {
        records
            .iter()
            .enumerate()
            .filter_map(|(applicant_id, record)| {
                let fields = &record.slots[slot - 1];
                let institution_id = fields.institution_id.as_ref()?;
                let field_code = fields.field_code.as_ref()?;
                let reason = fields
                    .reason
                    .as_deref()
                    .map(str::trim)
                    .filter(|r| !r.is_empty())
                    .unwrap_or(REASON_NOT_STATED)
                    .to_string();
                let reason_category = ReasonCategory::classify(&reason);

                Some(Choice {
                    applicant_id,
                    priority: slot as u8,
                    round: record.round,
                    institution_id: institution_id.clone(),
                    school_name: self.schools.resolve_name(institution_id),
                    field_code: field_code.clone(),
                    field_name: self.fields.resolve_name(field_code),
                    field_label: self.fields.label(field_code),
                    grade_level: GradeLevel::from_field_code(field_code),
                    admitted: fields.admitted,
                    is_exempt: record.is_exempt(),
                    total_points: record.total_points(),
                    reason,
                    reason_category,
                    gave_up: reason_category == ReasonCategory::Withdrew,
                    accepted_school_name: NOT_ADMITTED.to_string(),
                    accepted_detail: NOT_ADMITTED.to_string(),
                })
            })
            .collect()
    }
}
