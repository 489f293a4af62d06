use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default points for a task when none (or garbage) was supplied.
pub const DEFAULT_TASK_SCORE: i32 = 10;
/// Points granted when a streak hits a multiple of [`STREAK_BONUS_INTERVAL`].
pub const STREAK_BONUS_POINTS: i32 = 10;
pub const STREAK_BONUS_INTERVAL: u32 = 7;

#[derive(Debug, Error)]
#[error("unknown {kind}: {value}")]
pub struct UnknownVariant {
    kind: &'static str,
    value: String,
}

impl UnknownVariant {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberRole {
    Admin,
    Regular,
}

impl MemberRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemberRole::Admin => "admin",
            MemberRole::Regular => "regular",
        }
    }
}

impl fmt::Display for MemberRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MemberRole {
    type Err = UnknownVariant;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(MemberRole::Admin),
            "regular" => Ok(MemberRole::Regular),
            other => Err(UnknownVariant::new("member role", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Open,
    Taken,
    Completed,
    Expired,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Open => "open",
            TaskStatus::Taken => "taken",
            TaskStatus::Completed => "completed",
            TaskStatus::Expired => "expired",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = UnknownVariant;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(TaskStatus::Open),
            "taken" => Ok(TaskStatus::Taken),
            "completed" => Ok(TaskStatus::Completed),
            "expired" => Ok(TaskStatus::Expired),
            other => Err(UnknownVariant::new("task status", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SportKind {
    Weekly,
    Extra,
}

impl SportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SportKind::Weekly => "weekly",
            SportKind::Extra => "extra",
        }
    }
}

impl fmt::Display for SportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SportKind {
    type Err = UnknownVariant;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "weekly" => Ok(SportKind::Weekly),
            "extra" => Ok(SportKind::Extra),
            other => Err(UnknownVariant::new("sport kind", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchoolTaskKind {
    Homework,
    Exam,
    Project,
}

impl SchoolTaskKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SchoolTaskKind::Homework => "homework",
            SchoolTaskKind::Exam => "exam",
            SchoolTaskKind::Project => "project",
        }
    }
}

impl fmt::Display for SchoolTaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SchoolTaskKind {
    type Err = UnknownVariant;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "homework" => Ok(SchoolTaskKind::Homework),
            "exam" => Ok(SchoolTaskKind::Exam),
            "project" => Ok(SchoolTaskKind::Project),
            other => Err(UnknownVariant::new("school task kind", other)),
        }
    }
}

/// Where a ledger entry came from. Fines are stored with positive
/// `points` and negated when summing, see [`ScoreSource::signed_points`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreSource {
    House,
    Sport,
    School,
    StreakBonus,
    Bonus,
    Fine,
}

impl ScoreSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScoreSource::House => "house",
            ScoreSource::Sport => "sport",
            ScoreSource::School => "school",
            ScoreSource::StreakBonus => "streak_bonus",
            ScoreSource::Bonus => "bonus",
            ScoreSource::Fine => "fine",
        }
    }

    /// Only entries that point back at a task row can be reset.
    pub fn is_resettable(&self) -> bool {
        matches!(
            self,
            ScoreSource::House | ScoreSource::Sport | ScoreSource::School
        )
    }

    pub fn signed_points(&self, points: i32) -> i32 {
        match self {
            ScoreSource::Fine => -points,
            _ => points,
        }
    }
}

impl fmt::Display for ScoreSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScoreSource {
    type Err = UnknownVariant;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "house" => Ok(ScoreSource::House),
            "sport" => Ok(ScoreSource::Sport),
            "school" => Ok(ScoreSource::School),
            "streak_bonus" => Ok(ScoreSource::StreakBonus),
            "bonus" => Ok(ScoreSource::Bonus),
            "fine" => Ok(ScoreSource::Fine),
            other => Err(UnknownVariant::new("score source", other)),
        }
    }
}

/// Point values never go negative; garbage input falls back to `default`.
pub fn clamp_points(value: Option<i32>, default: i32) -> i32 {
    value.unwrap_or(default).max(0)
}

/// Clamps each day into `0..=6` and drops duplicates, keeping first
/// occurrence order.
pub fn sanitize_days(days: &[i32]) -> Vec<u8> {
    let mut seen = [false; 7];
    let mut out = Vec::new();
    for &d in days {
        let d = d.clamp(0, 6) as u8;
        if !seen[d as usize] {
            seen[d as usize] = true;
            out.push(d);
        }
    }
    out
}

/// Like [`sanitize_days`], but an empty selection means "no schedule".
pub fn normalize_days(days: &[i32]) -> Option<Vec<u8>> {
    if days.is_empty() {
        None
    } else {
        Some(sanitize_days(days))
    }
}

/// Day-of-week with Sunday as 0, matching how schedules are stored.
pub fn weekday_index(date: NaiveDate) -> u8 {
    date.weekday().num_days_from_sunday() as u8
}

pub fn day_name(day: u8) -> &'static str {
    const DAYS: [&str; 7] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"];
    DAYS.get(day as usize).copied().unwrap_or("?")
}

/// A missing or empty schedule means "any day".
pub fn is_scheduled_on(days: Option<&[u8]>, weekday: u8) -> bool {
    match days {
        None => true,
        Some(d) if d.is_empty() => true,
        Some(d) => d.contains(&weekday),
    }
}

/// Extra activities can be logged any day; weekly ones only on a
/// scheduled day (an empty schedule never matches).
pub fn sport_active_on(kind: SportKind, days: &[u8], weekday: u8) -> bool {
    match kind {
        SportKind::Extra => true,
        SportKind::Weekly => days.contains(&weekday),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_and_status_round_trip() {
        for role in [MemberRole::Admin, MemberRole::Regular] {
            assert_eq!(role.as_str().parse::<MemberRole>().unwrap(), role);
        }
        for status in [
            TaskStatus::Open,
            TaskStatus::Taken,
            TaskStatus::Completed,
            TaskStatus::Expired,
        ] {
            assert_eq!(status.as_str().parse::<TaskStatus>().unwrap(), status);
        }
        assert!("parent".parse::<MemberRole>().is_err());
    }

    #[test]
    fn score_source_round_trip_and_serde() {
        for src in [
            ScoreSource::House,
            ScoreSource::Sport,
            ScoreSource::School,
            ScoreSource::StreakBonus,
            ScoreSource::Bonus,
            ScoreSource::Fine,
        ] {
            assert_eq!(src.as_str().parse::<ScoreSource>().unwrap(), src);
        }
        let json = serde_json::to_string(&ScoreSource::StreakBonus).unwrap();
        assert_eq!(json, "\"streak_bonus\"");
    }

    #[test]
    fn fines_flip_sign_when_summing() {
        assert_eq!(ScoreSource::Fine.signed_points(5), -5);
        assert_eq!(ScoreSource::Bonus.signed_points(5), 5);
        assert_eq!(ScoreSource::House.signed_points(0), 0);
    }

    #[test]
    fn resettable_sources() {
        assert!(ScoreSource::House.is_resettable());
        assert!(ScoreSource::Sport.is_resettable());
        assert!(ScoreSource::School.is_resettable());
        assert!(!ScoreSource::StreakBonus.is_resettable());
        assert!(!ScoreSource::Bonus.is_resettable());
        assert!(!ScoreSource::Fine.is_resettable());
    }

    #[test]
    fn clamp_points_floors_at_zero() {
        assert_eq!(clamp_points(Some(-3), 10), 0);
        assert_eq!(clamp_points(Some(25), 10), 25);
        assert_eq!(clamp_points(None, 10), 10);
        assert_eq!(clamp_points(None, 0), 0);
    }

    #[test]
    fn sanitize_days_clamps_and_dedupes() {
        assert_eq!(sanitize_days(&[1, 1, 3]), vec![1, 3]);
        assert_eq!(sanitize_days(&[-1, 9, 3]), vec![0, 6, 3]);
        assert_eq!(sanitize_days(&[]), Vec::<u8>::new());
    }

    #[test]
    fn normalize_days_maps_empty_to_none() {
        assert_eq!(normalize_days(&[]), None);
        assert_eq!(normalize_days(&[2, 4]), Some(vec![2, 4]));
    }

    #[test]
    fn weekday_index_is_sunday_based() {
        // 2025-06-01 was a Sunday.
        let sun = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
        assert_eq!(weekday_index(sun), 0);
        assert_eq!(weekday_index(sun + chrono::Days::new(1)), 1);
        assert_eq!(weekday_index(sun + chrono::Days::new(6)), 6);
    }

    #[test]
    fn day_names() {
        assert_eq!(day_name(0), "Sun");
        assert_eq!(day_name(6), "Sat");
        assert_eq!(day_name(7), "?");
    }

    #[test]
    fn schedule_matching() {
        assert!(is_scheduled_on(None, 3));
        assert!(is_scheduled_on(Some(&[]), 3));
        assert!(is_scheduled_on(Some(&[1, 3]), 3));
        assert!(!is_scheduled_on(Some(&[1, 3]), 4));
    }

    #[test]
    fn sport_schedule_matching() {
        assert!(sport_active_on(SportKind::Extra, &[], 2));
        assert!(sport_active_on(SportKind::Weekly, &[2, 5], 2));
        assert!(!sport_active_on(SportKind::Weekly, &[2, 5], 3));
        assert!(!sport_active_on(SportKind::Weekly, &[], 2));
    }
}
