use crate::error::{AnalysisError, Result};
use crate::models::CapacityRecord;
use crate::reference::{normalize_id, SchoolReference};
use std::collections::HashMap;

/// Planned seats keyed by (institution id, field code, round).
#[derive(Debug, Clone, Default)]
pub struct CapacityTable {
    seats: HashMap<(String, String, u32), u32>,
}

impl CapacityTable {
    pub fn from_records(records: &[CapacityRecord]) -> Result<Self> {
        let mut table = CapacityTable::default();
        for record in records {
            table.insert(record)?;
        }
        Ok(table)
    }

    /// Add a record. Rows sharing a key are summed, since one field may be
    /// split across several classes of the same institution.
    pub fn insert(&mut self, record: &CapacityRecord) -> Result<()> {
        let institution = normalize_id(&record.institution_id);
        let field = record.field_code.trim().to_string();
        if institution.is_empty() {
            return Err(AnalysisError::EmptyCapacityKey("institution id"));
        }
        if field.is_empty() {
            return Err(AnalysisError::EmptyCapacityKey("field code"));
        }
        let seats = self.seats.entry((institution, field, record.round)).or_insert(0);
        *seats = seats.saturating_add(record.planned_seats);
        Ok(())
    }

    /// Seats by institution-level id.
    pub fn get(&self, institution_id: &str, field_code: &str, round: u32) -> Option<u32> {
        self.seats
            .get(&(institution_id.to_string(), field_code.trim().to_string(), round))
            .copied()
    }

    /// Seats for the id carried by student data, translating facility ids to
    /// their institution first.
    pub fn lookup(&self, reference: &SchoolReference, facility_id: &str, field_code: &str, round: u32) -> Option<u32> {
        let institution = reference.institution_for(&normalize_id(facility_id));
        self.get(&institution, field_code, round)
    }

    /// Total seats over several fields of one school; `None` when none of
    /// them has a capacity entry.
    pub fn school_total<'f, I>(&self, reference: &SchoolReference, facility_id: &str, field_codes: I, round: u32) -> Option<u32>
    where
        I: IntoIterator<Item = &'f str>,
    {
        let found: Vec<u32> = field_codes
            .into_iter()
            .filter_map(|code| self.lookup(reference, facility_id, code, round))
            .collect();
        if found.is_empty() {
            None
        } else {
            Some(found.iter().sum())
        }
    }

    pub fn len(&self) -> usize {
        self.seats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seats.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SchoolRecord;

    fn record(institution: &str, field: &str, round: u32, seats: u32) -> CapacityRecord {
        CapacityRecord {
            institution_id: institution.into(),
            field_code: field.into(),
            round,
            planned_seats: seats,
        }
    }

    fn reference() -> SchoolReference {
        SchoolReference::from_records(&[SchoolRecord {
            institution_id: "691013489".into(),
            facility_id: "108013051".into(),
            name: "Gymnázium".into(),
            ..Default::default()
        }])
    }

    #[test]
    fn split_classes_are_summed() {
        let table = CapacityTable::from_records(&[
            record("691013489", "79-41-K/41", 1, 30),
            record("691013489", "79-41-K/41 ", 1, 15),
            record("691013489", "79-41-K/41", 2, 4),
        ])
        .unwrap();
        assert_eq!(table.get("691013489", "79-41-K/41", 1), Some(45));
        assert_eq!(table.get("691013489", "79-41-K/41", 2), Some(4));
    }

    #[test]
    fn oversized_seat_counts_saturate() {
        let table = CapacityTable::from_records(&[
            record("691013489", "79-41-K/41", 1, u32::MAX),
            record("691013489", "79-41-K/41", 1, 1),
        ])
        .unwrap();
        assert_eq!(table.get("691013489", "79-41-K/41", 1), Some(u32::MAX));
    }

    #[test]
    fn facility_ids_are_translated() {
        let table = CapacityTable::from_records(&[record("691013489", "79-41-K/41", 1, 30)]).unwrap();
        let reference = reference();
        assert_eq!(table.lookup(&reference, "108013051", "79-41-K/41", 1), Some(30));
        assert_eq!(table.lookup(&reference, "691013489", "79-41-K/41", 1), Some(30));
        assert_eq!(table.lookup(&reference, "108013051", "79-41-K/81", 1), None);
    }

    #[test]
    fn unknown_facility_is_tried_as_institution() {
        let table = CapacityTable::from_records(&[record("600000001", "63-41-M/02", 1, 60)]).unwrap();
        assert_eq!(table.lookup(&SchoolReference::default(), "600000001", "63-41-M/02", 1), Some(60));
    }

    #[test]
    fn school_total_over_fields() {
        let table = CapacityTable::from_records(&[
            record("691013489", "79-41-K/41", 1, 30),
            record("691013489", "79-41-K/81", 1, 30),
        ])
        .unwrap();
        let reference = reference();
        let codes = ["79-41-K/41", "79-41-K/81", "18-20-M/01"];
        assert_eq!(table.school_total(&reference, "108013051", codes, 1), Some(60));
        assert_eq!(table.school_total(&reference, "108013051", ["18-20-M/01"], 1), None);
    }

    #[test]
    fn empty_keys_are_rejected() {
        assert!(matches!(
            CapacityTable::from_records(&[record(" ", "79-41-K/41", 1, 30)]),
            Err(AnalysisError::EmptyCapacityKey("institution id"))
        ));
        assert!(CapacityTable::from_records(&[record("1", "", 1, 30)]).is_err());
    }
}
