use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of ranked choice slots on an application form.
pub const SLOT_COUNT: usize = 5;

/// Placeholder reason for rows whose source left the reason blank.
pub const REASON_NOT_STATED: &str = "Neuvedeno";

/// Placeholder for applicants admitted nowhere among their choices.
pub const NOT_ADMITTED: &str = "Nepřijat / neznámá";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub year: String,
    pub rounds: Vec<u32>,
    // Data source configuration
    pub data_directory: Option<String>,
    pub school_reference_file: Option<String>,
    pub field_map_file: Option<String>,
    pub output_directory: Option<String>,
    // Selection, as institution ids / field codes
    pub schools_of_interest: Option<Vec<String>>,
    pub fields_of_interest: Option<Vec<String>>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            year: "2025".to_string(),
            rounds: vec![1],
            data_directory: Some("data-source".to_string()),
            school_reference_file: Some("skoly.csv".to_string()),
            field_map_file: Some("kkov_map.json".to_string()),
            output_directory: Some("output".to_string()),
            schools_of_interest: None,
            fields_of_interest: None,
        }
    }
}

impl Config {
    pub fn load_from_file(file_path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(file_path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save_to_file(&self, file_path: &str) -> anyhow::Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(file_path, content)?;
        Ok(())
    }
}

/// Explicit parameters of one analysis pass.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AnalysisRequest {
    pub year: String,
    /// `None` keeps every round.
    pub round: Option<u32>,
}

/// Value of cells that are missing from a row.
pub static NULL_VALUE: ScalarValue = ScalarValue::Null;

/// A single cell of a raw source table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScalarValue {
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
}

impl ScalarValue {
    pub fn is_null(&self) -> bool {
        match self {
            ScalarValue::Null => true,
            ScalarValue::Text(s) => s.trim().is_empty(),
            ScalarValue::Number(n) => n.is_nan(),
            ScalarValue::Bool(_) => false,
        }
    }

    /// Numeric view of the cell; unparseable text is treated as missing.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            ScalarValue::Number(n) if n.is_finite() => Some(*n),
            ScalarValue::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            ScalarValue::Text(s) => s.trim().replace(',', ".").parse::<f64>().ok().filter(|n| n.is_finite()),
            _ => None,
        }
    }

    /// Trimmed text view of the cell. Whole numbers print without a fraction.
    pub fn as_text(&self) -> Option<String> {
        match self {
            ScalarValue::Null => None,
            ScalarValue::Bool(b) => Some(b.to_string()),
            ScalarValue::Number(n) if n.is_nan() => None,
            ScalarValue::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => Some(format!("{}", *n as i64)),
            ScalarValue::Number(n) => Some(n.to_string()),
            ScalarValue::Text(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    None
                } else {
                    Some(trimmed.to_string())
                }
            }
        }
    }
}

/// A raw per-applicant table as supplied by the file-loading side: ordered
/// column labels plus rows of cells aligned with them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<ScalarValue>>,
}

impl RawTable {
    pub fn new(columns: Vec<String>) -> Self {
        Self { columns, rows: Vec::new() }
    }

    pub fn push_row(&mut self, row: Vec<ScalarValue>) {
        self.rows.push(row);
    }

    /// Index of the first column with exactly this label.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn cell(&self, row: usize, column: usize) -> &ScalarValue {
        self.rows
            .get(row)
            .and_then(|r| r.get(column))
            .unwrap_or(&NULL_VALUE)
    }
}

/// One priority slot of an applicant record after type coercion.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SlotFields {
    pub institution_id: Option<String>,
    pub field_code: Option<String>,
    pub admitted: bool,
    pub reason: Option<String>,
}

/// Wide applicant record, one per source row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApplicantRecord {
    pub round: Option<u32>,
    pub year: Option<String>,
    pub language_pct: Option<f64>,
    pub math_pct: Option<f64>,
    pub slots: [SlotFields; SLOT_COUNT],
}

impl ApplicantRecord {
    /// Language test waived: math score present, language score absent.
    pub fn is_exempt(&self) -> bool {
        self.language_pct.is_none() && self.math_pct.is_some()
    }

    /// Equal-weight composite of both percentile scores, clamped to 0..=100.
    pub fn total_points(&self) -> f64 {
        let language = self.language_pct.unwrap_or(0.0);
        let math = self.math_pct.unwrap_or(0.0);
        (language * 0.5 + math * 0.5).clamp(0.0, 100.0)
    }

    pub fn admitted_slots(&self) -> usize {
        self.slots.iter().filter(|s| s.admitted).count()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum GradeLevel {
    /// Entry into the 8-year track (field code ends with `/81`).
    Fifth,
    /// Entry into the 6-year track (field code ends with `/61`).
    Seventh,
    /// Standard 4-year programmes and vocational fields.
    Ninth,
}

impl GradeLevel {
    pub fn from_field_code(code: &str) -> Self {
        if code.ends_with("/81") {
            GradeLevel::Fifth
        } else if code.ends_with("/61") {
            GradeLevel::Seventh
        } else {
            GradeLevel::Ninth
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            GradeLevel::Fifth => "5. (8leté)",
            GradeLevel::Seventh => "7. (6leté)",
            GradeLevel::Ninth => "9. (4leté/obory)",
        }
    }
}

impl fmt::Display for GradeLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Long-format row: one applicant's choice at one priority.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Choice {
    pub applicant_id: usize,
    pub priority: u8,
    pub round: Option<u32>,
    pub institution_id: String,
    pub school_name: String,
    pub field_code: String,
    pub field_name: String,
    pub field_label: String,
    pub grade_level: GradeLevel,
    pub admitted: bool,
    pub is_exempt: bool,
    pub total_points: f64,
    pub reason: String,
    pub reason_category: crate::reasons::ReasonCategory,
    pub gave_up: bool,
    pub accepted_school_name: String,
    pub accepted_detail: String,
}

impl Choice {
    pub fn is_regular(&self) -> bool {
        !self.is_exempt
    }
}

/// Planned seats for one (institution, field, round).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapacityRecord {
    pub institution_id: String,
    pub field_code: String,
    pub round: u32,
    pub planned_seats: u32,
}

/// One row of the institution register.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchoolRecord {
    pub institution_id: String,
    pub facility_id: String,
    pub name: String,
    pub display_name: String,
    pub short_name: String,
    pub location: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_text_drops_integer_fraction() {
        assert_eq!(ScalarValue::Number(600012345.0).as_text().as_deref(), Some("600012345"));
        assert_eq!(ScalarValue::Text("  79-41-K/81 ".into()).as_text().as_deref(), Some("79-41-K/81"));
        assert_eq!(ScalarValue::Text("   ".into()).as_text(), None);
    }

    #[test]
    fn scalar_number_accepts_decimal_comma() {
        assert_eq!(ScalarValue::Text("71,5".into()).as_number(), Some(71.5));
        assert_eq!(ScalarValue::Text("n/a".into()).as_number(), None);
        assert_eq!(ScalarValue::Bool(true).as_number(), Some(1.0));
    }

    #[test]
    fn grade_level_follows_code_suffix() {
        assert_eq!(GradeLevel::from_field_code("79-41-K/81"), GradeLevel::Fifth);
        assert_eq!(GradeLevel::from_field_code("79-41-K/61"), GradeLevel::Seventh);
        assert_eq!(GradeLevel::from_field_code("79-41-K/41"), GradeLevel::Ninth);
    }

    #[test]
    fn exemption_and_points() {
        let record = ApplicantRecord {
            language_pct: None,
            math_pct: Some(60.0),
            ..Default::default()
        };
        assert!(record.is_exempt());
        assert_eq!(record.total_points(), 30.0);

        let record = ApplicantRecord {
            language_pct: Some(80.0),
            math_pct: Some(60.0),
            ..Default::default()
        };
        assert!(!record.is_exempt());
        assert_eq!(record.total_points(), 70.0);
    }
}
