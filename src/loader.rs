use crate::columns::{self, SlotColumn};
use crate::models::{AnalysisRequest, ApplicantRecord, RawTable, ScalarValue, SlotFields, NULL_VALUE, SLOT_COUNT};
use crate::reference::normalize_id;
use tracing::debug;

/// All applicant records of one year, concatenated over its source tables.
#[derive(Debug, Clone, Default)]
pub struct YearData {
    pub records: Vec<ApplicantRecord>,
    /// Source labels no normalization rule recognised, in first-seen order.
    pub unrecognized_columns: Vec<String>,
}

impl YearData {
    /// Records of the requested round (all rounds when none is requested).
    pub fn select(&self, request: &AnalysisRequest) -> Vec<ApplicantRecord> {
        self.records
            .iter()
            .filter(|record| match request.round {
                Some(round) => record.round == Some(round),
                None => true,
            })
            .cloned()
            .collect()
    }
}

/// Column positions of the canonical fields inside one normalized table.
struct ColumnLayout {
    round: Option<usize>,
    year: Option<usize>,
    language: Option<usize>,
    math: Option<usize>,
    slots: [[Option<usize>; 4]; SLOT_COUNT],
}

impl ColumnLayout {
    fn from_table(table: &RawTable) -> Self {
        let mut slots = [[None; 4]; SLOT_COUNT];
        for (slot, columns_of_slot) in slots.iter_mut().enumerate() {
            for (i, column) in SlotColumn::ALL.iter().enumerate() {
                columns_of_slot[i] = table.column_index(&columns::slot_column(slot + 1, *column));
            }
        }
        Self {
            round: table.column_index(columns::ROUND),
            year: table.column_index(columns::YEAR),
            language: table.column_index(columns::LANGUAGE_SCORE),
            math: table.column_index(columns::MATH_SCORE),
            slots,
        }
    }
}

/// Normalize, type and concatenate every source table of one year.
pub fn load_year(tables: &[RawTable]) -> YearData {
    let mut data = YearData::default();

    for (index, table) in tables.iter().enumerate() {
        for label in &table.columns {
            if !columns::is_recognized(label) && !data.unrecognized_columns.contains(label) {
                data.unrecognized_columns.push(label.clone());
            }
        }

        let normalized = normalize_table(table);
        let layout = ColumnLayout::from_table(&normalized);
        let before = data.records.len();
        for row in 0..normalized.rows.len() {
            data.records.push(read_record(&normalized, &layout, row));
        }

        debug!(
            table = index,
            columns = table.columns.len(),
            rows = data.records.len() - before,
            "applicant table loaded"
        );
    }

    data
}

/// Copy of the table with canonical, de-duplicated column names.
pub fn normalize_table(table: &RawTable) -> RawTable {
    RawTable {
        columns: columns::normalize_columns(&table.columns),
        rows: table.rows.clone(),
    }
}

fn read_record(table: &RawTable, layout: &ColumnLayout, row: usize) -> ApplicantRecord {
    let cell = |column: Option<usize>| column.map(|c| table.cell(row, c)).unwrap_or(&NULL_VALUE);

    let mut record = ApplicantRecord {
        round: coerce_round(cell(layout.round)),
        year: cell(layout.year).as_text().map(|y| normalize_id(&y)),
        language_pct: cell(layout.language).as_number(),
        math_pct: cell(layout.math).as_number(),
        ..Default::default()
    };

    for (slot, columns_of_slot) in layout.slots.iter().enumerate() {
        record.slots[slot] = SlotFields {
            institution_id: coerce_id(cell(columns_of_slot[0])),
            field_code: cell(columns_of_slot[1]).as_text(),
            admitted: coerce_admitted(cell(columns_of_slot[2])),
            reason: cell(columns_of_slot[3]).as_text(),
        };
    }

    record
}

fn coerce_round(value: &ScalarValue) -> Option<u32> {
    value
        .as_number()
        .filter(|n| *n >= 0.0 && n.fract() == 0.0)
        .map(|n| n as u32)
}

/// Ids must be numeric; anything else counts as missing.
fn coerce_id(value: &ScalarValue) -> Option<String> {
    value
        .as_number()
        .filter(|n| n.fract() == 0.0)
        .map(|n| normalize_id(&n.to_string()))
}

/// 2024 exports carry booleans, 2025 exports 1 = admitted / 2 = not admitted.
fn coerce_admitted(value: &ScalarValue) -> bool {
    match value {
        ScalarValue::Bool(b) => *b,
        ScalarValue::Text(s) if s.trim().eq_ignore_ascii_case("true") => true,
        other => other.as_number() == Some(1.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> ScalarValue {
        ScalarValue::Text(s.to_string())
    }

    fn table() -> RawTable {
        let mut table = RawTable::new(
            [
                "kolo",
                "čjl_procentní_skór",
                "ma_procentni_skor",
                "ss1_redizo",
                "ss1_kkov",
                "ss1_prijat",
                "ss1_duvod_neprijeti",
                "ss1_kkov_text",
                "poznamka",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        );
        table.push_row(vec![
            ScalarValue::Number(1.0),
            ScalarValue::Number(80.0),
            text("60,5"),
            ScalarValue::Number(600001.0),
            text(" 79-41-K/41 "),
            ScalarValue::Bool(true),
            ScalarValue::Null,
            text("ignored"),
            text("x"),
        ]);
        table.push_row(vec![
            text("2"),
            text("n/a"),
            ScalarValue::Number(55.0),
            text("abc"),
            text("79-41-K/41"),
            ScalarValue::Number(2.0),
            text(" pro_nedostacujici_kapacitu "),
            ScalarValue::Null,
            ScalarValue::Null,
        ]);
        table
    }

    #[test]
    fn coerces_types() {
        let data = load_year(&[table()]);
        assert_eq!(data.records.len(), 2);

        let first = &data.records[0];
        assert_eq!(first.round, Some(1));
        assert_eq!(first.language_pct, Some(80.0));
        assert_eq!(first.math_pct, Some(60.5));
        assert_eq!(first.slots[0].institution_id.as_deref(), Some("600001"));
        assert_eq!(first.slots[0].field_code.as_deref(), Some("79-41-K/41"));
        assert!(first.slots[0].admitted);
        assert_eq!(first.slots[0].reason, None);
        assert_eq!(first.slots[1], SlotFields::default());

        let second = &data.records[1];
        assert_eq!(second.round, Some(2));
        assert_eq!(second.language_pct, None);
        assert_eq!(second.slots[0].institution_id, None);
        assert!(!second.slots[0].admitted);
        assert_eq!(second.slots[0].reason.as_deref(), Some("pro_nedostacujici_kapacitu"));
    }

    #[test]
    fn duplicate_column_reads_first_occurrence() {
        let normalized = normalize_table(&table());
        assert_eq!(normalized.columns[4], "slot1_field");
        assert_eq!(normalized.columns[7], "slot1_field_dup_1");
    }

    #[test]
    fn reports_unrecognized_columns() {
        let data = load_year(&[table(), table()]);
        assert_eq!(data.records.len(), 4);
        assert_eq!(data.unrecognized_columns, vec!["poznamka".to_string()]);
    }

    #[test]
    fn selects_round() {
        let data = load_year(&[table()]);
        let request = AnalysisRequest {
            year: "2025".into(),
            round: Some(2),
        };
        assert_eq!(data.select(&request).len(), 1);
        let request = AnalysisRequest {
            year: "2025".into(),
            round: None,
        };
        assert_eq!(data.select(&request).len(), 2);
    }
}
