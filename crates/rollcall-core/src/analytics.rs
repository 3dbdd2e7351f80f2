//! Working-hours reconstruction and attendance classification.
//!
//! The ledger stores raw punches; everything here is derived. Per
//! (name, date) group the punches are paired chronologically
//! Punch In -> Punch Out to accumulate worked seconds, an unpaired
//! trailing Punch In contributes nothing, and Sundays are excluded as
//! the hardcoded non-working day.

use crate::ledger::{AttendanceRecord, PunchStatus};
use chrono::{Datelike, Duration, NaiveDate, NaiveTime, Weekday};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Hours required for a Full Day classification (8h30m). Inclusive.
pub const FULL_DAY_HOURS: f64 = 8.5;
/// Hours required for a Half Day classification (4h15m). Inclusive.
pub const HALF_DAY_HOURS: f64 = 4.25;

/// Attendance classification for one person-day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DayStatus {
    #[serde(rename = "Full Day")]
    FullDay,
    #[serde(rename = "Half Day")]
    HalfDay,
    Absent,
}

impl fmt::Display for DayStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DayStatus::FullDay => write!(f, "Full Day"),
            DayStatus::HalfDay => write!(f, "Half Day"),
            DayStatus::Absent => write!(f, "Absent"),
        }
    }
}

/// Classify a worked-seconds total. Thresholds are inclusive: exactly
/// 8.5 hours is a Full Day, exactly 4.25 a Half Day.
pub fn classify(worked_secs: i64) -> DayStatus {
    let hours = worked_secs as f64 / 3600.0;
    if hours >= FULL_DAY_HOURS {
        DayStatus::FullDay
    } else if hours >= HALF_DAY_HOURS {
        DayStatus::HalfDay
    } else {
        DayStatus::Absent
    }
}

/// Derived summary for one (name, date).
#[derive(Debug, Clone, Serialize)]
pub struct DaySummary {
    pub name: String,
    pub date: NaiveDate,
    pub worked_secs: i64,
    pub status: DayStatus,
    /// First Punch In of the day, if any.
    pub first_in: Option<NaiveTime>,
    /// Last paired Punch Out of the day, if any.
    pub last_out: Option<NaiveTime>,
}

impl DaySummary {
    pub fn worked_hours(&self) -> f64 {
        self.worked_secs as f64 / 3600.0
    }
}

/// Render a seconds total as `HH:MM:SS`.
pub fn format_hours(total_secs: i64) -> String {
    let secs = total_secs.max(0);
    format!(
        "{:02}:{:02}:{:02}",
        secs / 3600,
        (secs % 3600) / 60,
        secs % 60
    )
}

/// Reconstruct per-day working intervals from raw ledger records.
///
/// Records may arrive in any order; each (name, date) group is sorted by
/// time before pairing. Sundays are dropped entirely. Output is sorted
/// by (name, date).
pub fn daily_summaries(records: &[AttendanceRecord]) -> Vec<DaySummary> {
    let mut groups: BTreeMap<(String, NaiveDate), Vec<&AttendanceRecord>> = BTreeMap::new();
    for record in records {
        groups
            .entry((record.name.clone(), record.date))
            .or_default()
            .push(record);
    }

    let mut summaries = Vec::with_capacity(groups.len());
    for ((name, date), mut punches) in groups {
        if date.weekday() == Weekday::Sun {
            continue;
        }
        punches.sort_by_key(|r| r.time);

        let mut worked = Duration::zero();
        let mut open_in: Option<NaiveTime> = None;
        let mut first_in: Option<NaiveTime> = None;
        let mut last_out: Option<NaiveTime> = None;

        for punch in punches {
            match punch.status {
                PunchStatus::PunchIn => {
                    if open_in.is_none() {
                        open_in = Some(punch.time);
                        if first_in.is_none() {
                            first_in = Some(punch.time);
                        }
                    }
                }
                PunchStatus::PunchOut => {
                    if let Some(started) = open_in.take() {
                        worked = worked + (punch.time - started);
                        last_out = Some(punch.time);
                    }
                }
            }
        }

        let worked_secs = worked.num_seconds();
        summaries.push(DaySummary {
            name,
            date,
            worked_secs,
            status: classify(worked_secs),
            first_in,
            last_out,
        });
    }

    summaries
}

/// Status distribution across a set of day summaries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub full_day: usize,
    pub half_day: usize,
    pub absent: usize,
}

impl StatusCounts {
    fn bump(&mut self, status: DayStatus) {
        match status {
            DayStatus::FullDay => self.full_day += 1,
            DayStatus::HalfDay => self.half_day += 1,
            DayStatus::Absent => self.absent += 1,
        }
    }
}

pub fn status_distribution(summaries: &[DaySummary]) -> StatusCounts {
    let mut counts = StatusCounts::default();
    for summary in summaries {
        counts.bump(summary.status);
    }
    counts
}

/// Per-month status counts, sorted by month (`YYYY-MM`).
pub fn monthly_trend(summaries: &[DaySummary]) -> Vec<(String, StatusCounts)> {
    let mut months: BTreeMap<String, StatusCounts> = BTreeMap::new();
    for summary in summaries {
        months
            .entry(summary.date.format("%Y-%m").to_string())
            .or_default()
            .bump(summary.status);
    }
    months.into_iter().collect()
}

/// One day in an employee timeline.
#[derive(Debug, Clone, Serialize)]
pub struct TimelineDay {
    pub date: NaiveDate,
    pub worked_secs: i64,
    pub status: DayStatus,
}

/// Daily timeline for one employee across an inclusive date range, with
/// missing days (including skipped Sundays) filled as Absent / zero.
pub fn employee_timeline(
    summaries: &[DaySummary],
    name: &str,
    from: NaiveDate,
    to: NaiveDate,
) -> Vec<TimelineDay> {
    let by_date: BTreeMap<NaiveDate, &DaySummary> = summaries
        .iter()
        .filter(|s| s.name == name)
        .map(|s| (s.date, s))
        .collect();

    let mut timeline = Vec::new();
    let mut day = from;
    while day <= to {
        timeline.push(match by_date.get(&day) {
            Some(s) => TimelineDay {
                date: day,
                worked_secs: s.worked_secs,
                status: s.status,
            },
            None => TimelineDay {
                date: day,
                worked_secs: 0,
                status: DayStatus::Absent,
            },
        });
        day = day + Duration::days(1);
    }
    timeline
}
