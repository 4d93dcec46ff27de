use crate::analyzer::mean;
use crate::models::Choice;
use crate::reasons::ReasonCategory;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct GroupKey {
    pub institution_id: String,
    pub field_code: String,
}

impl GroupKey {
    pub fn of(choice: &Choice) -> Self {
        Self {
            institution_id: choice.institution_id.clone(),
            field_code: choice.field_code.clone(),
        }
    }
}

/// Choices grouped by (institution, field). Rows keep their table order.
pub fn group_by_school_field(choices: &[Choice]) -> BTreeMap<GroupKey, Vec<&Choice>> {
    let mut groups: BTreeMap<GroupKey, Vec<&Choice>> = BTreeMap::new();
    for choice in choices {
        groups.entry(GroupKey::of(choice)).or_default().push(choice);
    }
    groups
}

/// Choices grouped by institution across all its fields.
pub fn group_by_school(choices: &[Choice]) -> BTreeMap<String, Vec<&Choice>> {
    let mut groups: BTreeMap<String, Vec<&Choice>> = BTreeMap::new();
    for choice in choices {
        groups.entry(choice.institution_id.clone()).or_default().push(choice);
    }
    groups
}

#[derive(Debug, Clone, Serialize)]
pub struct RankedChoice<'a> {
    /// 1-based, best score first.
    pub rank: usize,
    /// `rank / group size * 100`, one decimal.
    pub percentile: f64,
    pub choice: &'a Choice,
}

/// Rank a group by points, best first. Equal scores keep their input order.
pub fn rank_group<'a>(rows: &[&'a Choice]) -> Vec<RankedChoice<'a>> {
    let mut sorted: Vec<&Choice> = rows.to_vec();
    sorted.sort_by(|a, b| b.total_points.total_cmp(&a.total_points));

    let n = sorted.len();
    sorted
        .into_iter()
        .enumerate()
        .map(|(i, choice)| RankedChoice {
            rank: i + 1,
            percentile: round1((i + 1) as f64 / n as f64 * 100.0),
            choice,
        })
        .collect()
}

/// Percentile ranking inside every (school, field) group, for comparing
/// groups of different sizes on one axis.
pub fn decile_table(choices: &[Choice]) -> Vec<(GroupKey, Vec<RankedChoice<'_>>)> {
    group_by_school_field(choices)
        .into_iter()
        .map(|(key, rows)| (key, rank_group(&rows)))
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum OutcomeBucket {
    Admitted,
    Rejected(ReasonCategory),
}

impl OutcomeBucket {
    pub fn of(choice: &Choice) -> Self {
        if choice.admitted {
            OutcomeBucket::Admitted
        } else {
            OutcomeBucket::Rejected(choice.reason_category)
        }
    }
}

impl fmt::Display for OutcomeBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutcomeBucket::Admitted => f.write_str("PŘIJAT"),
            OutcomeBucket::Rejected(category) => f.write_str(category.label()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BucketStats {
    pub bucket: OutcomeBucket,
    pub count_regular: usize,
    pub avg_regular: Option<f64>,
    pub count_exempt: usize,
}

impl BucketStats {
    /// `"count / avg"`, with exempt applicants appended when there are any.
    pub fn display_value(&self) -> String {
        let mut value = format!("{} / {:.1}", self.count_regular, self.avg_regular.unwrap_or(0.0));
        if self.count_exempt > 0 {
            value.push_str(&format!(" (+{} ciz)", self.count_exempt));
        }
        value
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupBreakdown {
    pub key: GroupKey,
    pub school_name: String,
    pub field_label: String,
    pub total_count: usize,
    /// Lowest regular admitted score, one decimal.
    pub min_score: Option<f64>,
    pub buckets: Vec<BucketStats>,
}

/// Outcome split of one (school, field) group. Buckets come out admitted
/// first, then by reason category.
pub fn reason_breakdown(key: &GroupKey, rows: &[&Choice]) -> GroupBreakdown {
    let mut by_bucket: BTreeMap<OutcomeBucket, Vec<&Choice>> = BTreeMap::new();
    for choice in rows.iter().copied() {
        by_bucket.entry(OutcomeBucket::of(choice)).or_default().push(choice);
    }

    let buckets = by_bucket
        .into_iter()
        .map(|(bucket, members)| {
            let regular: Vec<f64> = members.iter().filter(|c| c.is_regular()).map(|c| c.total_points).collect();
            BucketStats {
                bucket,
                count_regular: regular.len(),
                avg_regular: mean(&regular).map(round1),
                count_exempt: members.len() - regular.len(),
            }
        })
        .collect();

    let min_score = rows
        .iter()
        .filter(|c| c.admitted && c.is_regular())
        .map(|c| c.total_points)
        .min_by(|a, b| a.total_cmp(b))
        .map(round1);

    GroupBreakdown {
        key: key.clone(),
        school_name: rows.first().map(|c| c.school_name.clone()).unwrap_or_default(),
        field_label: rows.first().map(|c| c.field_label.clone()).unwrap_or_default(),
        total_count: rows.len(),
        min_score,
        buckets,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutflowEntry {
    /// Where the applicants were admitted instead.
    pub destination: String,
    pub count: usize,
    pub avg_points_regular: Option<f64>,
}

/// Where qualified applicants this group turned away (capacity, or a higher
/// choice came through) ended up. Most common destination first.
pub fn outflow(rows: &[&Choice]) -> Vec<OutflowEntry> {
    let mut destinations: BTreeMap<&str, Vec<&Choice>> = BTreeMap::new();
    for choice in rows.iter().copied().filter(|c| {
        !c.admitted
            && matches!(
                c.reason_category,
                ReasonCategory::Capacity | ReasonCategory::HigherPriority
            )
    }) {
        destinations.entry(choice.accepted_detail.as_str()).or_default().push(choice);
    }

    let mut entries: Vec<OutflowEntry> = destinations
        .into_iter()
        .map(|(destination, members)| {
            let regular: Vec<f64> = members.iter().filter(|c| c.is_regular()).map(|c| c.total_points).collect();
            OutflowEntry {
                destination: destination.to_string(),
                count: members.len(),
                avg_points_regular: mean(&regular),
            }
        })
        .collect();
    // BTreeMap order already sorts destinations; stable sort keeps it for ties
    entries.sort_by(|a, b| b.count.cmp(&a.count));
    entries
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{GradeLevel, NOT_ADMITTED, REASON_NOT_STATED};

    fn choice(institution: &str, field: &str, admitted: bool, points: f64, reason: &str) -> Choice {
        let reason_category = ReasonCategory::classify(reason);
        Choice {
            applicant_id: 0,
            priority: 1,
            round: Some(1),
            institution_id: institution.into(),
            school_name: format!("Škola {}", institution),
            field_code: field.into(),
            field_name: field.into(),
            field_label: format!("{} ({})", field, field),
            grade_level: GradeLevel::Ninth,
            admitted,
            is_exempt: false,
            total_points: points,
            reason: reason.into(),
            reason_category,
            gave_up: false,
            accepted_school_name: NOT_ADMITTED.into(),
            accepted_detail: NOT_ADMITTED.into(),
        }
    }

    #[test]
    fn groups_by_explicit_key() {
        let choices = vec![
            choice("2", "A", true, 50.0, REASON_NOT_STATED),
            choice("1", "B", true, 40.0, REASON_NOT_STATED),
            choice("1", "A", false, 30.0, REASON_NOT_STATED),
            choice("1", "B", false, 20.0, REASON_NOT_STATED),
        ];
        let groups = group_by_school_field(&choices);
        let keys: Vec<(&str, &str)> = groups
            .keys()
            .map(|k| (k.institution_id.as_str(), k.field_code.as_str()))
            .collect();
        assert_eq!(keys, vec![("1", "A"), ("1", "B"), ("2", "A")]);
        let b = &groups[&GroupKey {
            institution_id: "1".into(),
            field_code: "B".into(),
        }];
        assert_eq!(b.iter().map(|c| c.total_points).collect::<Vec<_>>(), vec![40.0, 20.0]);

        assert_eq!(group_by_school(&choices)["1"].len(), 3);
    }

    #[test]
    fn ranking_is_stable_and_normalized() {
        let mut choices = vec![
            choice("1", "A", true, 60.0, REASON_NOT_STATED),
            choice("1", "A", true, 80.0, REASON_NOT_STATED),
            choice("1", "A", true, 60.0, REASON_NOT_STATED),
        ];
        choices[0].applicant_id = 10;
        choices[2].applicant_id = 11;
        let rows: Vec<&Choice> = choices.iter().collect();
        let ranked = rank_group(&rows);

        assert_eq!(ranked[0].choice.total_points, 80.0);
        assert_eq!(ranked[1].choice.applicant_id, 10);
        assert_eq!(ranked[2].choice.applicant_id, 11);
        assert_eq!(
            ranked.iter().map(|r| r.percentile).collect::<Vec<_>>(),
            vec![33.3, 66.7, 100.0]
        );
    }

    #[test]
    fn decile_table_covers_every_group() {
        let choices = vec![
            choice("1", "A", true, 60.0, REASON_NOT_STATED),
            choice("2", "A", true, 80.0, REASON_NOT_STATED),
            choice("2", "A", false, 70.0, REASON_NOT_STATED),
        ];
        let table = decile_table(&choices);
        assert_eq!(table.len(), 2);
        assert_eq!(table[0].1[0].percentile, 100.0);
        assert_eq!(table[1].1[1].percentile, 100.0);
    }

    #[test]
    fn reason_breakdown_splits_outcomes() {
        let mut choices = vec![
            choice("1", "A", true, 61.25, REASON_NOT_STATED),
            choice("1", "A", true, 70.0, REASON_NOT_STATED),
            choice("1", "A", false, 55.0, "pro_nedostacujici_kapacitu"),
            choice("1", "A", false, 40.0, "pro_nesplneni_podminek"),
        ];
        choices[3].is_exempt = true;
        let rows: Vec<&Choice> = choices.iter().collect();
        let key = GroupKey::of(&choices[0]);
        let breakdown = reason_breakdown(&key, &rows);

        assert_eq!(breakdown.total_count, 4);
        assert_eq!(breakdown.min_score, Some(61.3));
        assert_eq!(breakdown.buckets[0].bucket, OutcomeBucket::Admitted);
        assert_eq!(breakdown.buckets[0].count_regular, 2);
        assert_eq!(breakdown.buckets[0].avg_regular, Some(65.6));
        assert_eq!(breakdown.buckets[1].bucket, OutcomeBucket::Rejected(ReasonCategory::Capacity));
        let failed = &breakdown.buckets[2];
        assert_eq!(failed.count_regular, 0);
        assert_eq!(failed.count_exempt, 1);
        assert_eq!(failed.display_value(), "0 / 0.0 (+1 ciz)");
    }

    #[test]
    fn outflow_traces_turned_away_applicants() {
        let mut choices = vec![
            choice("1", "A", false, 75.0, "prijat_na_vyssi_prioritu"),
            choice("1", "A", false, 65.0, "prijat_na_vyssi_prioritu"),
            choice("1", "A", false, 55.0, "pro_nedostacujici_kapacitu"),
            choice("1", "A", false, 30.0, "pro_nesplneni_podminek"),
            choice("1", "A", true, 60.0, REASON_NOT_STATED),
        ];
        choices[0].accepted_detail = "Škola 2 (A (A))".into();
        choices[1].accepted_detail = "Škola 2 (A (A))".into();
        choices[2].accepted_detail = "Škola 3 (B (B))".into();
        let rows: Vec<&Choice> = choices.iter().collect();
        let flows = outflow(&rows);

        assert_eq!(flows.len(), 2);
        assert_eq!(flows[0].destination, "Škola 2 (A (A))");
        assert_eq!(flows[0].count, 2);
        assert_eq!(flows[0].avg_points_regular, Some(70.0));
        assert_eq!(flows[1].count, 1);
    }
}
