//! Dashboard aggregation over rows already loaded from the database

use chrono::{Datelike, NaiveDate};
use serde::Serialize;
use std::collections::HashMap;

use crate::entity::goal::GoalStatus;

/// Per-department figures for the dashboard
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DepartmentStats {
    pub department: String,
    pub headcount: u64,
    pub average_salary: f64,
    pub average_score: Option<f64>,
}

/// One month of the score trend
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyScore {
    /// `YYYY-MM`
    pub month: String,
    pub count: u64,
    pub average: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScoreBucket {
    pub score: u8,
    pub count: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GoalCounts {
    pub not_started: u64,
    pub in_progress: u64,
    pub completed: u64,
    pub cancelled: u64,
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Mean rounded to two decimals; `None` for no input
pub fn average_score<I: IntoIterator<Item = f64>>(scores: I) -> Option<f64> {
    let (sum, count) = scores
        .into_iter()
        .fold((0.0, 0u64), |(sum, count), s| (sum + s, count + 1));
    (count > 0).then(|| round2(sum / count as f64))
}

/// Headcount, salary and score per department.
///
/// `assignments` holds `(employee_id, department, salary)` for active rows only;
/// `reviews` holds `(employee_id, score)`. A review counts toward the employee's
/// current department. Sorted by headcount descending, then name.
pub fn department_breakdown(
    assignments: &[(i64, String, f64)],
    reviews: &[(i64, f64)],
) -> Vec<DepartmentStats> {
    let department_of: HashMap<i64, &str> = assignments
        .iter()
        .map(|(employee_id, department, _)| (*employee_id, department.as_str()))
        .collect();

    let mut salaries: HashMap<&str, Vec<f64>> = HashMap::new();
    for (_, department, salary) in assignments {
        salaries.entry(department.as_str()).or_default().push(*salary);
    }

    let mut scores: HashMap<&str, Vec<f64>> = HashMap::new();
    for (employee_id, score) in reviews {
        if let Some(department) = department_of.get(employee_id) {
            scores.entry(*department).or_default().push(*score);
        }
    }

    let mut stats: Vec<DepartmentStats> = salaries
        .into_iter()
        .map(|(department, salaries)| DepartmentStats {
            department: department.to_string(),
            headcount: salaries.len() as u64,
            average_salary: round2(salaries.iter().sum::<f64>() / salaries.len() as f64),
            average_score: scores
                .remove(department)
                .and_then(average_score),
        })
        .collect();

    stats.sort_by(|a, b| {
        b.headcount
            .cmp(&a.headcount)
            .then_with(|| a.department.cmp(&b.department))
    });
    stats
}

fn month_index(date: NaiveDate) -> i32 {
    date.year() * 12 + date.month0() as i32
}

fn month_label(index: i32) -> String {
    format!("{:04}-{:02}", index.div_euclid(12), index.rem_euclid(12) + 1)
}

/// First day of the oldest month covered by a `months`-long trend ending at `today`
pub fn trend_start(months: u32, today: NaiveDate) -> NaiveDate {
    let index = month_index(today) - (months.max(1) as i32 - 1);
    NaiveDate::from_ymd_opt(index.div_euclid(12), index.rem_euclid(12) as u32 + 1, 1)
        .unwrap_or(today)
}

/// Monthly average score for the last `months` months, oldest first.
/// Months without reviews are present with a zero count.
pub fn score_trend(reviews: &[(NaiveDate, f64)], months: u32, today: NaiveDate) -> Vec<MonthlyScore> {
    let last = month_index(today);
    let first = last - (months.max(1) as i32 - 1);

    let mut buckets: HashMap<i32, Vec<f64>> = HashMap::new();
    for (date, score) in reviews {
        let index = month_index(*date);
        if (first..=last).contains(&index) {
            buckets.entry(index).or_default().push(*score);
        }
    }

    (first..=last)
        .map(|index| {
            let scores = buckets.remove(&index).unwrap_or_default();
            MonthlyScore {
                month: month_label(index),
                count: scores.len() as u64,
                average: average_score(scores),
            }
        })
        .collect()
}

/// Review counts per rounded score, 1 through 5
pub fn score_distribution<I: IntoIterator<Item = f64>>(scores: I) -> Vec<ScoreBucket> {
    let mut counts = [0u64; 5];
    for score in scores {
        let bucket = score.round().clamp(1.0, 5.0) as usize;
        counts[bucket - 1] += 1;
    }
    counts
        .iter()
        .enumerate()
        .map(|(i, count)| ScoreBucket {
            score: i as u8 + 1,
            count: *count,
        })
        .collect()
}

/// Goal counts per status; unknown status strings are ignored
pub fn goal_status_counts<'a, I: IntoIterator<Item = &'a str>>(statuses: I) -> GoalCounts {
    let mut counts = GoalCounts::default();
    for status in statuses {
        match status.parse::<GoalStatus>() {
            Ok(GoalStatus::NotStarted) => counts.not_started += 1,
            Ok(GoalStatus::InProgress) => counts.in_progress += 1,
            Ok(GoalStatus::Completed) => counts.completed += 1,
            Ok(GoalStatus::Cancelled) => counts.cancelled += 1,
            Err(e) => tracing::debug!("Skipping goal: {}", e),
        }
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_average_score() {
        assert_eq!(average_score(Vec::new()), None);
        assert_eq!(average_score([4.0]), Some(4.0));
        assert_eq!(average_score([3.0, 4.0, 4.0]), Some(3.67));
    }

    #[test]
    fn test_department_breakdown() {
        let assignments = vec![
            (1, "Sales".to_string(), 4000.0),
            (2, "Engineering".to_string(), 6000.0),
            (3, "Engineering".to_string(), 7000.0),
            (4, "Design".to_string(), 5000.0),
        ];
        let reviews = vec![(2, 4.0), (3, 5.0), (2, 3.0), (99, 1.0)];

        let stats = department_breakdown(&assignments, &reviews);
        let names: Vec<&str> = stats.iter().map(|s| s.department.as_str()).collect();
        assert_eq!(names, ["Engineering", "Design", "Sales"]);

        assert_eq!(stats[0].headcount, 2);
        assert_eq!(stats[0].average_salary, 6500.0);
        assert_eq!(stats[0].average_score, Some(4.0));
        assert_eq!(stats[1].average_score, None);
    }

    #[test]
    fn test_score_trend_fills_empty_months() {
        let reviews = vec![
            (date(2024, 1, 15), 4.0),
            (date(2024, 1, 20), 3.0),
            (date(2024, 3, 2), 5.0),
            (date(2023, 10, 1), 2.0),
        ];
        let trend = score_trend(&reviews, 3, date(2024, 3, 18));

        assert_eq!(trend.len(), 3);
        assert_eq!(trend[0].month, "2024-01");
        assert_eq!(trend[0].count, 2);
        assert_eq!(trend[0].average, Some(3.5));
        assert_eq!(trend[1].month, "2024-02");
        assert_eq!(trend[1].count, 0);
        assert_eq!(trend[1].average, None);
        assert_eq!(trend[2].average, Some(5.0));
    }

    #[test]
    fn test_trend_crosses_year_boundary() {
        let trend = score_trend(&[], 3, date(2024, 1, 31));
        let months: Vec<&str> = trend.iter().map(|m| m.month.as_str()).collect();
        assert_eq!(months, ["2023-11", "2023-12", "2024-01"]);
        assert_eq!(trend_start(3, date(2024, 1, 31)), date(2023, 11, 1));
    }

    #[test]
    fn test_score_distribution() {
        let buckets = score_distribution([1.0, 1.4, 2.5, 4.6, 5.0]);
        let counts: Vec<u64> = buckets.iter().map(|b| b.count).collect();
        assert_eq!(counts, [2, 0, 1, 0, 2]);
        assert_eq!(buckets[4].score, 5);
    }

    #[test]
    fn test_goal_status_counts() {
        let counts = goal_status_counts(["completed", "in_progress", "completed", "bogus"]);
        assert_eq!(counts.completed, 2);
        assert_eq!(counts.in_progress, 1);
        assert_eq!(counts.not_started, 0);
    }
}
