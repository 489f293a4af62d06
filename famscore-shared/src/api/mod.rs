use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::domain::{MemberRole, SchoolTaskKind, ScoreSource, SportKind, TaskStatus};

pub mod endpoints;

pub const API_V1_PREFIX: &str = "/api/v1";

/// URL prefix all family-scoped endpoints hang off.
pub fn family_scope(family_id: &str) -> String {
    format!("{}/families/{}", API_V1_PREFIX, endpoints::enc(family_id))
}

// Auth
#[derive(Debug, Serialize, Deserialize)]
pub struct AuthReq {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AuthResp {
    pub token: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct VersionDto {
    pub version: String,
}

// Family
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FamilyDto {
    pub id: String,
    pub name: String,
    pub timezone: String,
    pub show_reset_button: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UpdateFamilySettingsReq {
    pub show_reset_button: bool,
}

// Members
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemberDto {
    pub id: String,
    pub family_id: String,
    pub name: String,
    pub role: MemberRole,
    pub avatar: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct NewMemberReq {
    pub name: String,
    pub role: MemberRole,
    pub avatar: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UpdateMemberReq {
    pub name: String,
    pub role: MemberRole,
    pub avatar: Option<String>,
}

// House tasks
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskDto {
    pub id: String,
    pub family_id: String,
    pub title: String,
    pub description: Option<String>,
    pub deadline: Option<NaiveDate>,
    pub recurring_daily: bool,
    pub scheduled_days: Option<Vec<u8>>,
    pub default_assignee_id: Option<String>,
    pub status: TaskStatus,
    pub score_value: i32,
    /// Member holding the live assignment, when status is `taken`.
    pub assignee_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct NewTaskReq {
    pub title: String,
    pub description: Option<String>,
    pub deadline: Option<NaiveDate>,
    #[serde(default)]
    pub recurring_daily: bool,
    #[serde(default)]
    pub scheduled_days: Vec<i32>,
    pub default_assignee_id: Option<String>,
    pub score_value: Option<i32>,
}

pub type UpdateTaskReq = NewTaskReq;

#[derive(Debug, Serialize, Deserialize)]
pub struct TakeTaskReq {
    pub assignee_id: String,
}

/// Awarded points for a completion, before any streak bonus.
#[derive(Debug, Serialize, Deserialize)]
pub struct CompleteResp {
    pub points: i32,
}

// Sport activities
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SportActivityDto {
    pub id: String,
    pub member_id: String,
    pub title: String,
    pub kind: SportKind,
    pub scheduled_days: Vec<u8>,
    pub score_value: i32,
    pub completed_at: Option<String>, // RFC3339 UTC
}

#[derive(Debug, Serialize, Deserialize)]
pub struct NewSportActivityReq {
    pub member_id: String,
    pub title: String,
    pub kind: SportKind,
    #[serde(default)]
    pub scheduled_days: Vec<i32>,
    pub score_value: Option<i32>,
}

pub type UpdateSportActivityReq = NewSportActivityReq;

/// Optional retarget of an ad hoc activity at completion time.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct CompleteSportReq {
    pub member_id: Option<String>,
}

// School tasks
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchoolTaskDto {
    pub id: String,
    pub member_id: String,
    pub title: String,
    pub kind: SchoolTaskKind,
    pub due_date: NaiveDate,
    pub scheduled_days: Option<Vec<u8>>,
    pub score_value: i32,
    pub completed_at: Option<String>, // RFC3339 UTC
}

#[derive(Debug, Serialize, Deserialize)]
pub struct NewSchoolTaskReq {
    /// Defaults to the acting member when absent.
    pub member_id: Option<String>,
    pub title: String,
    pub kind: SchoolTaskKind,
    pub due_date: NaiveDate,
    #[serde(default)]
    pub scheduled_days: Vec<i32>,
    pub score_value: Option<i32>,
}

pub type UpdateSchoolTaskReq = NewSchoolTaskReq;

// Scores
#[derive(Debug, Serialize, Deserialize)]
pub struct AdjustmentReq {
    pub source: ScoreSource,
    pub points: i32,
    pub description: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ResetReq {
    pub source: ScoreSource,
    pub source_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreEntryDto {
    pub id: String,
    pub member_id: String,
    pub source: ScoreSource,
    pub source_id: Option<String>,
    /// Raw magnitude as stored; fines are negated only when summing.
    pub points: i32,
    pub description: Option<String>,
    pub created_at: String, // RFC3339 UTC
    /// Resolved display label (task title, activity name, or fallback).
    pub title: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ScorePageDto {
    pub entries: Vec<ScoreEntryDto>,
    pub page: u32,
    pub per_page: u32,
    pub total: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LeaderboardPeriod {
    Week,
    Month,
    All,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LeaderboardEntryDto {
    pub member_id: String,
    pub name: String,
    pub avatar: Option<String>,
    pub total: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StreakDto {
    pub member_id: String,
    pub current_streak: i32,
    pub longest_streak: i32,
    pub last_activity_date: Option<NaiveDate>,
}

// Today view
#[derive(Debug, Serialize, Deserialize)]
pub struct TakenTaskDto {
    pub task_id: String,
    pub title: String,
    pub score_value: i32,
    pub deadline: Option<NaiveDate>,
    pub member_id: String,
    pub member_name: String,
    pub taken_at: String, // RFC3339 UTC
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TodayDto {
    pub date: NaiveDate,
    pub open_tasks: Vec<TaskDto>,
    pub taken_tasks: Vec<TakenTaskDto>,
    pub sport_activities: Vec<SportActivityDto>,
    pub school_tasks: Vec<SchoolTaskDto>,
}
