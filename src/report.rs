use chrono::{Duration, NaiveDate};
use std::collections::BTreeMap;

/// One attendance row joined with its student, as fetched for the report
/// views. `date` is pre-parsed; rows whose stored date fails to parse are
/// dropped by the fetch layer before aggregation.
#[derive(Debug, Clone)]
pub struct CallRow {
    pub student_name: String,
    pub date: NaiveDate,
    pub status: String,
    pub staff_name: Option<String>,
    pub contact_made: bool,
    pub category: Option<String>,
}

pub const STATUS_PRESENT: &str = "presente";
pub const STATUS_ABSENT: &str = "faltou";

fn absences(rows: &[CallRow]) -> impl Iterator<Item = &CallRow> {
    rows.iter().filter(|r| r.status == STATUS_ABSENT)
}

/// Students ranked by absence count, descending; ties break on name so the
/// ordering is stable across runs.
pub fn absence_ranking(rows: &[CallRow]) -> Vec<(String, i64)> {
    let mut counts: BTreeMap<&str, i64> = BTreeMap::new();
    for row in absences(rows) {
        *counts.entry(row.student_name.as_str()).or_insert(0) += 1;
    }
    let mut ranking: Vec<(String, i64)> = counts
        .into_iter()
        .map(|(name, n)| (name.to_string(), n))
        .collect();
    ranking.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranking
}

/// Absences bucketed per calendar month ("2024-03"), oldest first.
pub fn absences_by_month(rows: &[CallRow]) -> Vec<(String, i64)> {
    let mut buckets: BTreeMap<String, i64> = BTreeMap::new();
    for row in absences(rows) {
        *buckets.entry(row.date.format("%Y-%m").to_string()).or_insert(0) += 1;
    }
    buckets.into_iter().collect()
}

#[derive(Debug, Clone, Default)]
pub struct AbsenceSummary {
    pub by_category: Vec<(String, i64)>,
    pub by_staff: Vec<(String, i64)>,
    pub contacted: i64,
    pub not_contacted: i64,
}

/// Summary counts over absences: per category, per responsible staff, and
/// by whether a guardian contact was made.
pub fn absence_summary(rows: &[CallRow]) -> AbsenceSummary {
    let mut by_category: BTreeMap<String, i64> = BTreeMap::new();
    let mut by_staff: BTreeMap<String, i64> = BTreeMap::new();
    let mut summary = AbsenceSummary::default();

    for row in absences(rows) {
        if let Some(cat) = row.category.as_deref().filter(|c| !c.is_empty()) {
            *by_category.entry(cat.to_string()).or_insert(0) += 1;
        }
        if let Some(staff) = row.staff_name.as_deref().filter(|s| !s.is_empty()) {
            *by_staff.entry(staff.to_string()).or_insert(0) += 1;
        }
        if row.contact_made {
            summary.contacted += 1;
        } else {
            summary.not_contacted += 1;
        }
    }

    summary.by_category = sorted_desc(by_category);
    summary.by_staff = sorted_desc(by_staff);
    summary
}

fn sorted_desc(map: BTreeMap<String, i64>) -> Vec<(String, i64)> {
    let mut v: Vec<(String, i64)> = map.into_iter().collect();
    v.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    v
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alert {
    pub student_name: String,
    pub message: String,
}

/// Flags worrying frequency patterns relative to a reference date: three or
/// more absences within the trailing 7-day window, and absences on
/// consecutive calendar days anywhere in the history.
pub fn detect_absence_patterns(rows: &[CallRow], today: NaiveDate) -> Vec<Alert> {
    let mut by_student: BTreeMap<&str, Vec<NaiveDate>> = BTreeMap::new();
    for row in absences(rows) {
        by_student.entry(row.student_name.as_str()).or_default().push(row.date);
    }

    let window_start = today - Duration::days(7);
    let mut alerts = Vec::new();

    for (name, mut dates) in by_student {
        if dates.len() < 2 {
            continue;
        }
        dates.sort();
        dates.dedup();

        let recent = dates
            .iter()
            .filter(|d| **d >= window_start && **d <= today)
            .count();
        if recent >= 3 {
            alerts.push(Alert {
                student_name: name.to_string(),
                message: format!("{} faltas nos últimos 7 dias", recent),
            });
        }

        let consecutive = dates.windows(2).any(|w| w[1] - w[0] == Duration::days(1));
        if consecutive {
            alerts.push(Alert {
                student_name: name.to_string(),
                message: "Possui faltas em dias consecutivos".to_string(),
            });
        }
    }

    alerts
}
