use crate::storage::schema::{
    families, members, school_tasks, scores_log, sessions, sport_activities, task_assignments,
    tasks,
};
use chrono::{NaiveDate, NaiveDateTime};
use diesel::prelude::*;
use famscore_shared::api::{
    FamilyDto, MemberDto, SchoolTaskDto, SportActivityDto, TaskDto,
};
use famscore_shared::domain::UnknownVariant;

#[derive(Debug, Clone, Queryable, Identifiable, Selectable)]
#[diesel(table_name = families)]
pub struct Family {
    pub id: String,
    pub name: String,
    pub show_reset_button: bool,
    pub created_at: NaiveDateTime,
}

#[derive(Insertable)]
#[diesel(table_name = families)]
pub struct NewFamily<'a> {
    pub id: &'a str,
    pub name: &'a str,
    pub show_reset_button: bool,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations, Selectable)]
#[diesel(table_name = members)]
#[diesel(belongs_to(Family, foreign_key = family_id))]
pub struct Member {
    pub id: String,
    pub family_id: String,
    pub name: String,
    pub role: String,
    pub avatar: Option<String>,
    pub created_at: NaiveDateTime,
}

#[derive(Insertable)]
#[diesel(table_name = members)]
pub struct NewMember<'a> {
    pub id: &'a str,
    pub family_id: &'a str,
    pub name: &'a str,
    pub role: &'a str,
    pub avatar: Option<&'a str>,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations, Selectable)]
#[diesel(table_name = tasks)]
#[diesel(belongs_to(Family, foreign_key = family_id))]
pub struct Task {
    pub id: String,
    pub family_id: String,
    pub title: String,
    pub description: Option<String>,
    pub deadline: Option<NaiveDate>,
    pub recurring_daily: bool,
    pub scheduled_days: Option<String>,
    pub default_assignee_id: Option<String>,
    pub status: String,
    pub score_value: i32,
    pub created_by: Option<String>,
    pub created_at: NaiveDateTime,
}

#[derive(Insertable)]
#[diesel(table_name = tasks)]
pub struct NewTask<'a> {
    pub id: &'a str,
    pub family_id: &'a str,
    pub title: &'a str,
    pub description: Option<&'a str>,
    pub deadline: Option<NaiveDate>,
    pub recurring_daily: bool,
    pub scheduled_days: Option<String>,
    pub default_assignee_id: Option<&'a str>,
    pub status: &'a str,
    pub score_value: i32,
    pub created_by: Option<&'a str>,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations, Selectable)]
#[diesel(table_name = task_assignments)]
#[diesel(belongs_to(Task, foreign_key = task_id))]
#[diesel(belongs_to(Member, foreign_key = member_id))]
pub struct TaskAssignment {
    pub id: String,
    pub task_id: String,
    pub member_id: String,
    pub taken_at: NaiveDateTime,
    pub completed_at: Option<NaiveDateTime>,
}

#[derive(Insertable)]
#[diesel(table_name = task_assignments)]
pub struct NewTaskAssignment<'a> {
    pub id: &'a str,
    pub task_id: &'a str,
    pub member_id: &'a str,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations, Selectable)]
#[diesel(table_name = sport_activities)]
#[diesel(belongs_to(Member, foreign_key = member_id))]
pub struct SportActivity {
    pub id: String,
    pub member_id: String,
    pub title: String,
    pub kind: String,
    pub scheduled_days: String,
    pub score_value: i32,
    pub completed_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
}

#[derive(Insertable)]
#[diesel(table_name = sport_activities)]
pub struct NewSportActivity<'a> {
    pub id: &'a str,
    pub member_id: &'a str,
    pub title: &'a str,
    pub kind: &'a str,
    pub scheduled_days: String,
    pub score_value: i32,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations, Selectable)]
#[diesel(table_name = school_tasks)]
#[diesel(belongs_to(Member, foreign_key = member_id))]
pub struct SchoolTask {
    pub id: String,
    pub member_id: String,
    pub title: String,
    pub kind: String,
    pub due_date: NaiveDate,
    pub scheduled_days: Option<String>,
    pub score_value: i32,
    pub completed_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
}

#[derive(Insertable)]
#[diesel(table_name = school_tasks)]
pub struct NewSchoolTask<'a> {
    pub id: &'a str,
    pub member_id: &'a str,
    pub title: &'a str,
    pub kind: &'a str,
    pub due_date: NaiveDate,
    pub scheduled_days: Option<String>,
    pub score_value: i32,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations, Selectable)]
#[diesel(table_name = scores_log)]
#[diesel(belongs_to(Member, foreign_key = member_id))]
pub struct ScoreEntry {
    pub id: String,
    pub member_id: String,
    pub source_kind: String,
    pub source_id: Option<String>,
    pub score_delta: i32,
    pub description: Option<String>,
    pub created_at: NaiveDateTime,
}

#[derive(Insertable)]
#[diesel(table_name = scores_log)]
pub struct NewScoreEntry<'a> {
    pub id: &'a str,
    pub member_id: &'a str,
    pub source_kind: &'a str,
    pub source_id: Option<&'a str>,
    pub score_delta: i32,
    pub description: Option<&'a str>,
}

#[derive(Debug, Clone, Queryable, Identifiable, Selectable)]
#[diesel(table_name = crate::storage::schema::streaks)]
#[diesel(primary_key(member_id))]
pub struct Streak {
    pub member_id: String,
    pub current_streak: i32,
    pub longest_streak: i32,
    pub last_activity_date: Option<NaiveDate>,
}

#[derive(Insertable)]
#[diesel(table_name = crate::storage::schema::streaks)]
pub struct NewStreak<'a> {
    pub member_id: &'a str,
    pub current_streak: i32,
    pub longest_streak: i32,
    pub last_activity_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Queryable, Identifiable, Selectable)]
#[diesel(table_name = sessions)]
#[diesel(primary_key(jti))]
pub struct Session {
    pub jti: String,
    pub username: String,
    pub issued_at: NaiveDateTime,
    pub last_used_at: NaiveDateTime,
}

#[derive(Insertable)]
#[diesel(table_name = sessions)]
pub struct NewSession<'a> {
    pub jti: &'a str,
    pub username: &'a str,
}

/// Weekday sets are stored as JSON arrays (`[0,3,5]`) in TEXT columns.
pub fn days_to_json(days: &[u8]) -> String {
    serde_json::to_string(days).unwrap_or_else(|_| "[]".to_string())
}

pub fn days_from_json(raw: &str) -> Vec<u8> {
    serde_json::from_str(raw).unwrap_or_default()
}

pub fn opt_days_from_json(raw: Option<&str>) -> Option<Vec<u8>> {
    raw.map(days_from_json)
}

pub fn rfc3339(dt: NaiveDateTime) -> String {
    chrono::DateTime::<chrono::Utc>::from_naive_utc_and_offset(dt, chrono::Utc).to_rfc3339()
}

impl Family {
    pub fn to_dto(&self, timezone: &str) -> FamilyDto {
        FamilyDto {
            id: self.id.clone(),
            name: self.name.clone(),
            timezone: timezone.to_string(),
            show_reset_button: self.show_reset_button,
        }
    }
}

impl TryFrom<Member> for MemberDto {
    type Error = UnknownVariant;

    fn try_from(m: Member) -> Result<Self, Self::Error> {
        Ok(MemberDto {
            role: m.role.parse()?,
            id: m.id,
            family_id: m.family_id,
            name: m.name,
            avatar: m.avatar,
        })
    }
}

impl Task {
    /// DTO projection; `assignee_id` is joined in separately when needed.
    pub fn into_dto(self, assignee_id: Option<String>) -> Result<TaskDto, UnknownVariant> {
        Ok(TaskDto {
            status: self.status.parse()?,
            scheduled_days: opt_days_from_json(self.scheduled_days.as_deref()),
            id: self.id,
            family_id: self.family_id,
            title: self.title,
            description: self.description,
            deadline: self.deadline,
            recurring_daily: self.recurring_daily,
            default_assignee_id: self.default_assignee_id,
            score_value: self.score_value,
            assignee_id,
        })
    }
}

impl TryFrom<SportActivity> for SportActivityDto {
    type Error = UnknownVariant;

    fn try_from(a: SportActivity) -> Result<Self, Self::Error> {
        Ok(SportActivityDto {
            kind: a.kind.parse()?,
            scheduled_days: days_from_json(&a.scheduled_days),
            completed_at: a.completed_at.map(rfc3339),
            id: a.id,
            member_id: a.member_id,
            title: a.title,
            score_value: a.score_value,
        })
    }
}

impl TryFrom<SchoolTask> for SchoolTaskDto {
    type Error = UnknownVariant;

    fn try_from(t: SchoolTask) -> Result<Self, Self::Error> {
        Ok(SchoolTaskDto {
            kind: t.kind.parse()?,
            scheduled_days: opt_days_from_json(t.scheduled_days.as_deref()),
            completed_at: t.completed_at.map(rfc3339),
            id: t.id,
            member_id: t.member_id,
            title: t.title,
            due_date: t.due_date,
            score_value: t.score_value,
        })
    }
}
