//! Column-name normalization across yearly export variants.
//!
//! Exports from different years spell the same column differently, and older
//! files arrive with their diacritics mangled by a wrong code page. Matching
//! runs on an ASCII-only, lowercased key; each rule in [`RULES`] is tried in
//! order and the first hit decides the canonical name. Labels no rule
//! recognises are returned untouched.

use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;

pub const LANGUAGE_SCORE: &str = "language_pct";
pub const MATH_SCORE: &str = "math_pct";
pub const ROUND: &str = "round";
pub const YEAR: &str = "year";

/// Sub-columns of one priority slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlotColumn {
    Institution,
    Field,
    Admitted,
    Reason,
}

impl SlotColumn {
    pub const ALL: [SlotColumn; 4] = [
        SlotColumn::Institution,
        SlotColumn::Field,
        SlotColumn::Admitted,
        SlotColumn::Reason,
    ];

    fn suffix(&self) -> &'static str {
        match self {
            SlotColumn::Institution => "institution",
            SlotColumn::Field => "field",
            SlotColumn::Admitted => "admitted",
            SlotColumn::Reason => "reason",
        }
    }
}

/// Canonical name of a slot sub-column, e.g. `slot2_field`.
pub fn slot_column(slot: usize, column: SlotColumn) -> String {
    format!("slot{}_{}", slot, column.suffix())
}

/// A single normalization rule: returns the canonical name when the cleaned
/// key matches.
pub struct ColumnRule {
    pub description: &'static str,
    pub apply: fn(&str) -> Option<String>,
}

pub static RULES: &[ColumnRule] = &[
    ColumnRule {
        description: "already canonical",
        apply: canonical_identity,
    },
    ColumnRule {
        description: "2025 export score names",
        apply: plain_score_names,
    },
    ColumnRule {
        description: "language percentile score",
        apply: language_score,
    },
    ColumnRule {
        description: "math percentile score",
        apply: math_score,
    },
    ColumnRule {
        description: "priority slot sub-column",
        apply: slot_sub_column,
    },
    ColumnRule {
        description: "admission round",
        apply: round_column,
    },
    ColumnRule {
        description: "admission year",
        apply: year_column,
    },
];

/// Strip non-ASCII characters, trim and lowercase.
pub fn clean_column_key(label: &str) -> String {
    label
        .chars()
        .filter(|c| c.is_ascii())
        .collect::<String>()
        .trim()
        .to_lowercase()
}

/// Canonical name for a raw column label, or the label itself when nothing matches.
pub fn normalize_column_name(label: &str) -> String {
    let key = clean_column_key(label);
    RULES
        .iter()
        .find_map(|rule| (rule.apply)(&key))
        .unwrap_or_else(|| label.to_string())
}

/// Normalize a whole header row. Repeated canonical names keep the first
/// occurrence as-is; later ones get a `_dup_N` suffix.
pub fn normalize_columns(labels: &[String]) -> Vec<String> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    labels
        .iter()
        .map(|label| {
            let name = normalize_column_name(label);
            let count = seen.entry(name.clone()).or_insert(0);
            *count += 1;
            if *count == 1 {
                name
            } else {
                format!("{}_dup_{}", name, *count - 1)
            }
        })
        .collect()
}

/// True when some rule recognises the label.
pub fn is_recognized(label: &str) -> bool {
    let key = clean_column_key(label);
    RULES.iter().any(|rule| (rule.apply)(&key).is_some())
}

fn canonical_names() -> &'static Vec<String> {
    static NAMES: OnceLock<Vec<String>> = OnceLock::new();
    NAMES.get_or_init(|| {
        let mut names = vec![
            LANGUAGE_SCORE.to_string(),
            MATH_SCORE.to_string(),
            ROUND.to_string(),
            YEAR.to_string(),
        ];
        for slot in 1..=crate::models::SLOT_COUNT {
            for column in SlotColumn::ALL {
                names.push(slot_column(slot, column));
            }
        }
        names
    })
}

fn canonical_identity(key: &str) -> Option<String> {
    canonical_names().iter().find(|n| n.as_str() == key).cloned()
}

/// Clean 2025 exports name the scores without the subject abbreviation.
fn plain_score_names(key: &str) -> Option<String> {
    match key {
        "c_procentni_skor" => Some(LANGUAGE_SCORE.to_string()),
        "m_procentni_skor" => Some(MATH_SCORE.to_string()),
        _ => None,
    }
}

fn language_score(key: &str) -> Option<String> {
    (key.contains("jl") && (key.contains("procent") || key.contains("lep"))).then(|| LANGUAGE_SCORE.to_string())
}

fn math_score(key: &str) -> Option<String> {
    (key.contains("ma") && (key.contains("procent") || key.contains("lep"))).then(|| MATH_SCORE.to_string())
}

fn slot_marker() -> &'static Regex {
    static MARKER: OnceLock<Regex> = OnceLock::new();
    MARKER.get_or_init(|| Regex::new(r"s([1-5])").expect("valid slot marker pattern"))
}

fn slot_sub_column(key: &str) -> Option<String> {
    let slot: usize = slot_marker().captures(key)?.get(1)?.as_str().parse().ok()?;

    // "pijat" is "prijat" after the ř has been stripped
    let column = if key.contains("redizo") || key.contains("izo") {
        SlotColumn::Institution
    } else if key.contains("kkov") || key.contains("obor") || key.contains("kd") {
        SlotColumn::Field
    } else if key.contains("prijat") || key.contains("pijat") {
        SlotColumn::Admitted
    } else if key.contains("duvod") {
        SlotColumn::Reason
    } else {
        return None;
    };

    Some(slot_column(slot, column))
}

fn round_column(key: &str) -> Option<String> {
    (key.contains("kolo") || key.contains("round")).then(|| ROUND.to_string())
}

fn year_column(key: &str) -> Option<String> {
    (key.contains("rok") || key.contains("year")).then(|| YEAR.to_string())
}
