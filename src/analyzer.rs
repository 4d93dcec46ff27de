use crate::error::{AnalysisError, Result};
use crate::models::Choice;
use crate::reasons::ReasonCategory;
use serde::Serialize;
use std::fmt;

/// Count/average split between regular and exempt applicants.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct OutcomeStats {
    pub count_regular: usize,
    /// Mean score of regular rows; `None` when there are none.
    pub avg_score_regular: Option<f64>,
    pub count_exempt: usize,
    pub total: usize,
}

impl OutcomeStats {
    fn from_rows(rows: &[&Choice]) -> Self {
        let regular: Vec<f64> = rows.iter().filter(|c| c.is_regular()).map(|c| c.total_points).collect();
        Self {
            count_regular: regular.len(),
            avg_score_regular: mean(&regular),
            count_exempt: rows.len() - regular.len(),
            total: rows.len(),
        }
    }
}

/// Admissions metrics for one selection of choices.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct KpiResult {
    pub total_apps: usize,
    pub total_admitted: usize,
    pub gave_up_count: usize,
    pub planned_capacity: Option<u32>,

    pub success_rate: f64,
    pub competition_index: f64,
    pub pure_demand_index: f64,
    pub fullness_rate: f64,
    pub vacant_seats: u32,

    pub min_score: Option<f64>,
    pub avg_admitted: Option<f64>,
    pub admitted_stats: OutcomeStats,
    pub elite_avg: Option<f64>,
    pub bottom_25_avg: Option<f64>,
    pub talent_gap: f64,

    pub p1_loyalty: f64,
    pub interest_p1_pct: f64,
    pub intake_p1_pct: f64,
    pub intake_p3p_pct: f64,
    pub release_rate: f64,
    /// Rows within five points of the cutoff; only meaningful under excess demand.
    pub boundary_density: Option<usize>,

    pub cap_count: usize,
    pub cap_reject_rate: f64,
    pub lost_count: usize,
    pub fail_count: usize,
    pub cap_stats: OutcomeStats,
    pub lost_stats: OutcomeStats,
    pub fail_stats: OutcomeStats,
}

impl KpiResult {
    /// Real demand exceeded the seats on offer.
    pub fn is_oversubscribed(&self) -> bool {
        self.pure_demand_index > 1.0
    }
}

/// What a selection of choices is supposed to cover.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum KpiScope {
    SchoolField {
        institution_id: String,
        field_code: String,
    },
    School {
        institution_id: String,
    },
}

impl KpiScope {
    pub fn contains(&self, choice: &Choice) -> bool {
        match self {
            KpiScope::SchoolField {
                institution_id,
                field_code,
            } => choice.institution_id == *institution_id && choice.field_code == *field_code,
            KpiScope::School { institution_id } => choice.institution_id == *institution_id,
        }
    }
}

impl fmt::Display for KpiScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KpiScope::SchoolField {
                institution_id,
                field_code,
            } => write!(f, "{}/{}", institution_id, field_code),
            KpiScope::School { institution_id } => write!(f, "{}", institution_id),
        }
    }
}

/// KPIs for a selection that must lie entirely inside `scope`.
pub fn compute_scoped(scope: &KpiScope, rows: &[&Choice], planned_capacity: Option<u32>) -> Result<KpiResult> {
    if let Some(stray) = rows.iter().find(|c| !scope.contains(c)) {
        return Err(AnalysisError::ScopeMismatch {
            scope: scope.to_string(),
            found_institution: stray.institution_id.clone(),
            found_field: stray.field_code.clone(),
        });
    }
    Ok(calculate_kpis(rows, planned_capacity))
}

/// Every KPI for the given rows. Exempt applicants count everywhere but are
/// left out of score averages. No ratio ever divides by zero.
pub fn calculate_kpis(rows: &[&Choice], planned_capacity: Option<u32>) -> KpiResult {
    let total_apps = rows.len();
    let admitted: Vec<&Choice> = rows.iter().copied().filter(|c| c.admitted).collect();
    let rejected: Vec<&Choice> = rows.iter().copied().filter(|c| !c.admitted).collect();
    let total_admitted = admitted.len();
    let known_capacity = planned_capacity.filter(|cap| *cap > 0);

    let gave_up_count = rows.iter().filter(|c| c.gave_up).count();
    let cap_count = rows
        .iter()
        .filter(|c| c.reason_category == ReasonCategory::Capacity)
        .count();

    let cap_stats = reason_stats(&rejected, ReasonCategory::Capacity);
    let lost_stats = reason_stats(&rejected, ReasonCategory::HigherPriority);
    let fail_stats = reason_stats(&rejected, ReasonCategory::FailedConditions);

    // Qualified demand against the larger of intake and planned seats
    let demand_denominator = match known_capacity {
        Some(cap) => total_admitted.max(cap as usize),
        None => total_admitted,
    };
    let pure_demand_index = ratio(total_admitted + cap_stats.total, demand_denominator);

    let success_rate = if pure_demand_index <= 1.0 {
        100.0
    } else {
        percent(total_admitted, total_apps)
    };

    let competition_denominator = known_capacity.map(|cap| cap as usize).unwrap_or(total_admitted);
    let competition_index = ratio(total_apps, competition_denominator);

    let fullness_rate = match known_capacity {
        Some(cap) => percent(total_admitted, cap as usize),
        None => 100.0,
    };
    let vacant_seats = planned_capacity
        .map(|cap| cap.saturating_sub(total_admitted as u32))
        .unwrap_or(0);

    // Score statistics over regular applicants only
    let mut regular_admitted_scores: Vec<f64> = admitted
        .iter()
        .filter(|c| c.is_regular())
        .map(|c| c.total_points)
        .collect();
    regular_admitted_scores.sort_by(|a, b| a.total_cmp(b));
    let min_score = regular_admitted_scores.first().copied();
    let admitted_stats = OutcomeStats::from_rows(&admitted);
    let avg_admitted = admitted_stats.avg_score_regular;

    let mut regular_scores: Vec<f64> = rows.iter().filter(|c| c.is_regular()).map(|c| c.total_points).collect();
    regular_scores.sort_by(|a, b| b.total_cmp(a));
    let elite_count = top_count(total_apps, 0.1);
    let elite_avg = mean(&regular_scores[..elite_count.min(regular_scores.len())]);

    let bottom_count = top_count(regular_admitted_scores.len(), 0.25);
    let bottom_25_avg = mean(&regular_admitted_scores[..bottom_count.min(regular_admitted_scores.len())]);

    let talent_gap = match (lost_stats.avg_score_regular, avg_admitted) {
        (Some(lost), Some(kept)) => lost - kept,
        _ => 0.0,
    };

    // Priority structure
    let p1_rows = rows.iter().filter(|c| c.priority == 1).count();
    let p1_admitted = admitted.iter().filter(|c| c.priority == 1).count();
    let p3p_admitted = admitted.iter().filter(|c| c.priority >= 3).count();
    let p1_loyalty = percent(p1_admitted, p1_rows);

    let intake_denominator = known_capacity.map(|cap| cap as usize).unwrap_or(total_apps).max(1);
    let interest_p1_pct = percent(p1_rows, intake_denominator);
    let intake_p1_pct = percent(p1_admitted, intake_denominator);
    let intake_p3p_pct = percent(p3p_admitted, intake_denominator);

    let lost_count = lost_stats.total;
    let release_rate = percent(lost_count, total_admitted + lost_count);

    let boundary_density = match min_score {
        Some(cutoff) if pure_demand_index > 1.0 => Some(
            rows.iter()
                .filter(|c| c.total_points >= cutoff - 5.0 && c.total_points <= cutoff + 5.0)
                .count(),
        ),
        _ => None,
    };

    KpiResult {
        total_apps,
        total_admitted,
        gave_up_count,
        planned_capacity,
        success_rate,
        competition_index,
        pure_demand_index,
        fullness_rate,
        vacant_seats,
        min_score,
        avg_admitted,
        admitted_stats,
        elite_avg,
        bottom_25_avg,
        talent_gap,
        p1_loyalty,
        interest_p1_pct,
        intake_p1_pct,
        intake_p3p_pct,
        release_rate,
        boundary_density,
        cap_count,
        cap_reject_rate: percent(cap_count, total_apps),
        lost_count,
        fail_count: fail_stats.total,
        cap_stats,
        lost_stats,
        fail_stats,
    }
}

fn reason_stats(rejected: &[&Choice], category: ReasonCategory) -> OutcomeStats {
    let rows: Vec<&Choice> = rejected
        .iter()
        .copied()
        .filter(|c| c.reason_category == category)
        .collect();
    OutcomeStats::from_rows(&rows)
}

fn percent(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 * 100.0 / denominator as f64
    }
}

fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

/// `max(1, round(n * share))` with ties rounded to even.
fn top_count(n: usize, share: f64) -> usize {
    ((n as f64 * share).round_ties_even() as usize).max(1)
}

pub(crate) fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}
