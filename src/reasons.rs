use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome reasons recorded against a choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ReasonCategory {
    /// Admitted to a choice the applicant ranked higher.
    HigherPriority,
    /// Met the conditions but the field was full.
    Capacity,
    /// Did not meet the admission conditions.
    FailedConditions,
    /// Gave up the seat after being admitted.
    Withdrew,
    Unspecified,
}

impl ReasonCategory {
    pub const ALL: [ReasonCategory; 5] = [
        ReasonCategory::HigherPriority,
        ReasonCategory::Capacity,
        ReasonCategory::FailedConditions,
        ReasonCategory::Withdrew,
        ReasonCategory::Unspecified,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            ReasonCategory::HigherPriority => "Vyšší priorita",
            ReasonCategory::Capacity => "Kapacita",
            ReasonCategory::FailedConditions => "Nesplnil",
            ReasonCategory::Withdrew => "Vzdal se (u nás)",
            ReasonCategory::Unspecified => "Jiné",
        }
    }

    /// Classify free reason text.
    pub fn classify(reason: &str) -> Self {
        let key = fold_diacritics(reason.trim()).to_lowercase();
        if key.is_empty() {
            return ReasonCategory::Unspecified;
        }
        if let Some((_, category)) = KNOWN_SPELLINGS.iter().find(|(spelling, _)| *spelling == key) {
            return *category;
        }
        PATTERNS
            .iter()
            .find(|(_, needles)| needles.iter().any(|n| key.contains(n)))
            .map(|(category, _)| *category)
            .unwrap_or(ReasonCategory::Unspecified)
    }
}

impl fmt::Display for ReasonCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Raw spellings seen across the yearly exports.
const KNOWN_SPELLINGS: &[(&str, ReasonCategory)] = &[
    ("prijat_na_vyssi_prioritu", ReasonCategory::HigherPriority),
    ("neprijat_pro_nedostatecnou_kapacitu", ReasonCategory::Capacity),
    ("pro_nedostacujici_kapacitu", ReasonCategory::Capacity),
    ("neprijat_pro_nesplneni_podminek", ReasonCategory::FailedConditions),
    ("pro_nesplneni_podminek", ReasonCategory::FailedConditions),
    ("vzdal_se_u_nas", ReasonCategory::Withdrew),
    ("vzdal_se", ReasonCategory::Withdrew),
    ("neuvedeno", ReasonCategory::Unspecified),
];

const PATTERNS: &[(ReasonCategory, &[&str])] = &[
    (ReasonCategory::HigherPriority, &["vyssi_priorit", "vyssi priorit"]),
    (ReasonCategory::Capacity, &["kapacit"]),
    (
        ReasonCategory::FailedConditions,
        &["nespln", "neprosp", "nedosah", "kriteri"],
    ),
    (ReasonCategory::Withdrew, &["vzdal"]),
];

/// Replace Czech accented letters with their ASCII base letter.
pub fn fold_diacritics(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            'á' => 'a',
            'č' => 'c',
            'ď' => 'd',
            'é' | 'ě' => 'e',
            'í' => 'i',
            'ň' => 'n',
            'ó' => 'o',
            'ř' => 'r',
            'š' => 's',
            'ť' => 't',
            'ú' | 'ů' => 'u',
            'ý' => 'y',
            'ž' => 'z',
            'Á' => 'A',
            'Č' => 'C',
            'Ď' => 'D',
            'É' | 'Ě' => 'E',
            'Í' => 'I',
            'Ň' => 'N',
            'Ó' => 'O',
            'Ř' => 'R',
            'Š' => 'S',
            'Ť' => 'T',
            'Ú' | 'Ů' => 'U',
            'Ý' => 'Y',
            'Ž' => 'Z',
            other => other,
        })
        .collect()
}
