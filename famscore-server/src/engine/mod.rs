//! Activity lifecycle and scoring rules.
//!
//! Every operation takes the resolved [`Actor`] and re-checks role and
//! family ownership against freshly loaded rows. Multi-step pipelines
//! (take, complete, reset) are written to run inside one transaction;
//! the async wrappers in [`crate::storage`] provide it.

pub mod streak;

use chrono::{Days, NaiveDate, NaiveDateTime};
use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use famscore_shared::api::{
    AdjustmentReq, NewMemberReq, NewSchoolTaskReq, NewSportActivityReq, NewTaskReq, ResetReq,
    UpdateMemberReq, UpdateSchoolTaskReq, UpdateSportActivityReq, UpdateTaskReq,
};
use famscore_shared::domain::{
    self, MemberRole, STREAK_BONUS_POINTS, ScoreSource, SportKind, TaskStatus,
};
use uuid::Uuid;

use crate::storage::models::{
    Family, Member, NewFamily, NewMember, NewSchoolTask, NewScoreEntry, NewSportActivity,
    NewStreak, NewTask, NewTaskAssignment, SchoolTask, ScoreEntry, SportActivity, Streak, Task,
    TaskAssignment, days_to_json,
};
use crate::storage::schema;

/// The caller, resolved from a fresh member row on every request.
#[derive(Debug, Clone)]
pub struct Actor {
    pub member_id: String,
    pub family_id: String,
    pub role: MemberRole,
}

impl Actor {
    pub fn is_admin(&self) -> bool {
        self.role == MemberRole::Admin
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Role or family check failed. Carries no entity detail.
    #[error("Unauthorized")]
    Unauthorized,

    /// Entity missing, in the wrong state, or already finished.
    #[error("{0}")]
    NotFound(String),

    /// Lost race, e.g. two members taking the same task.
    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Validation(String),

    #[error("database error: {0}")]
    Database(#[from] DieselError),
}

fn require_admin(actor: &Actor) -> Result<(), EngineError> {
    if actor.is_admin() {
        Ok(())
    } else {
        Err(EngineError::Unauthorized)
    }
}

fn member_in_family(
    conn: &mut SqliteConnection,
    member_id: &str,
    family_id: &str,
) -> Result<bool, EngineError> {
    use schema::members::dsl as m;
    let count: i64 = m::members
        .filter(m::id.eq(member_id))
        .filter(m::family_id.eq(family_id))
        .count()
        .get_result(conn)?;
    Ok(count > 0)
}

/// Empty strings from forms mean "not set".
fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|s| !s.is_empty())
}

fn append_entry(
    conn: &mut SqliteConnection,
    member_id: &str,
    source: ScoreSource,
    source_id: Option<&str>,
    score_delta: i32,
    description: Option<&str>,
) -> Result<ScoreEntry, EngineError> {
    let id = Uuid::new_v4().to_string();
    let row = NewScoreEntry {
        id: &id,
        member_id,
        source_kind: source.as_str(),
        source_id,
        score_delta,
        description,
    };
    Ok(diesel::insert_into(schema::scores_log::table)
        .values(&row)
        .get_result::<ScoreEntry>(conn)?)
}

/// Advances the member's streak after a scoring completion and appends
/// the streak bonus entry when a bonus boundary is crossed. The bonus
/// entry is written before the streak row is updated so that a failure
/// leaves neither behind.
fn advance_streak(
    conn: &mut SqliteConnection,
    member_id: &str,
    today: NaiveDate,
) -> Result<(), EngineError> {
    use schema::streaks::dsl as s;
    let prior: Option<Streak> = s::streaks
        .filter(s::member_id.eq(member_id))
        .first::<Streak>(conn)
        .optional()?;
    let (current, longest, last) = prior
        .map(|p| (p.current_streak, p.longest_streak, p.last_activity_date))
        .unwrap_or((0, 0, None));
    let up = streak::advance(current, longest, last, today);

    if up.award_bonus {
        append_entry(
            conn,
            member_id,
            ScoreSource::StreakBonus,
            None,
            STREAK_BONUS_POINTS,
            None,
        )?;
    }

    let row = NewStreak {
        member_id,
        current_streak: up.current_streak,
        longest_streak: up.longest_streak,
        last_activity_date: Some(today),
    };
    diesel::insert_into(s::streaks)
        .values(&row)
        .on_conflict(s::member_id)
        .do_update()
        .set((
            s::current_streak.eq(up.current_streak),
            s::longest_streak.eq(up.longest_streak),
            s::last_activity_date.eq(Some(today)),
        ))
        .execute(conn)?;
    Ok(())
}

// ---- family ----

pub fn update_family_settings(
    conn: &mut SqliteConnection,
    actor: &Actor,
    show_reset_button: bool,
) -> Result<Family, EngineError> {
    use schema::families::dsl as f;
    require_admin(actor)?;
    diesel::update(f::families.filter(f::id.eq(&actor.family_id)))
        .set(f::show_reset_button.eq(show_reset_button))
        .get_result::<Family>(conn)
        .optional()?
        .ok_or_else(|| EngineError::NotFound("Family not found".into()))
}

// ---- members ----

pub fn create_member(
    conn: &mut SqliteConnection,
    actor: &Actor,
    req: &NewMemberReq,
) -> Result<Member, EngineError> {
    require_admin(actor)?;
    let id = Uuid::new_v4().to_string();
    let row = NewMember {
        id: &id,
        family_id: &actor.family_id,
        name: &req.name,
        role: req.role.as_str(),
        avatar: non_empty(req.avatar.as_deref()),
    };
    Ok(diesel::insert_into(schema::members::table)
        .values(&row)
        .get_result::<Member>(conn)?)
}

pub fn update_member(
    conn: &mut SqliteConnection,
    actor: &Actor,
    member_id: &str,
    req: &UpdateMemberReq,
) -> Result<Member, EngineError> {
    use schema::members::dsl as m;
    require_admin(actor)?;
    if !member_in_family(conn, member_id, &actor.family_id)? {
        return Err(EngineError::NotFound("Member not found".into()));
    }
    Ok(
        diesel::update(m::members.filter(m::id.eq(member_id)))
            .set((
                m::name.eq(&req.name),
                m::role.eq(req.role.as_str()),
                m::avatar.eq(non_empty(req.avatar.as_deref())),
            ))
            .get_result::<Member>(conn)?,
    )
}

// ---- house tasks ----

pub fn create_task(
    conn: &mut SqliteConnection,
    actor: &Actor,
    today: NaiveDate,
    req: &NewTaskReq,
) -> Result<Task, EngineError> {
    require_admin(actor)?;
    let score_value = domain::clamp_points(req.score_value, domain::DEFAULT_TASK_SCORE);
    let scheduled_days = domain::normalize_days(&req.scheduled_days);
    // A recurring task without a deadline starts its cycle today.
    let deadline = match (req.recurring_daily, req.deadline) {
        (true, None) => Some(today),
        (_, d) => d,
    };
    let default_assignee = non_empty(req.default_assignee_id.as_deref());
    if let Some(assignee) = default_assignee {
        if !member_in_family(conn, assignee, &actor.family_id)? {
            return Err(EngineError::Validation("Invalid assignee".into()));
        }
    }
    let id = Uuid::new_v4().to_string();
    let row = NewTask {
        id: &id,
        family_id: &actor.family_id,
        title: &req.title,
        description: non_empty(req.description.as_deref()),
        deadline,
        recurring_daily: req.recurring_daily,
        scheduled_days: scheduled_days.as_deref().map(days_to_json),
        default_assignee_id: default_assignee,
        status: TaskStatus::Open.as_str(),
        score_value,
        created_by: Some(&actor.member_id),
    };
    Ok(diesel::insert_into(schema::tasks::table)
        .values(&row)
        .get_result::<Task>(conn)?)
}

pub fn update_task(
    conn: &mut SqliteConnection,
    actor: &Actor,
    today: NaiveDate,
    task_id: &str,
    req: &UpdateTaskReq,
) -> Result<Task, EngineError> {
    use schema::tasks::dsl as t;
    require_admin(actor)?;
    let family: Option<String> = t::tasks
        .filter(t::id.eq(task_id))
        .select(t::family_id)
        .first(conn)
        .optional()?;
    if family.as_deref() != Some(actor.family_id.as_str()) {
        return Err(EngineError::NotFound("Task not found".into()));
    }
    let score_value = domain::clamp_points(req.score_value, domain::DEFAULT_TASK_SCORE);
    let scheduled_days = domain::normalize_days(&req.scheduled_days);
    let deadline = match (req.recurring_daily, req.deadline) {
        (true, None) => Some(today),
        (_, d) => d,
    };
    let default_assignee = non_empty(req.default_assignee_id.as_deref());
    if let Some(assignee) = default_assignee {
        if !member_in_family(conn, assignee, &actor.family_id)? {
            return Err(EngineError::Validation("Invalid assignee".into()));
        }
    }
    // Status is never touched here; only the state machine moves it.
    Ok(diesel::update(t::tasks.filter(t::id.eq(task_id)))
        .set((
            t::title.eq(&req.title),
            t::description.eq(non_empty(req.description.as_deref())),
            t::deadline.eq(deadline),
            t::recurring_daily.eq(req.recurring_daily),
            t::scheduled_days.eq(scheduled_days.as_deref().map(days_to_json)),
            t::default_assignee_id.eq(default_assignee),
            t::score_value.eq(score_value),
        ))
        .get_result::<Task>(conn)?)
}

pub fn delete_task(
    conn: &mut SqliteConnection,
    actor: &Actor,
    task_id: &str,
) -> Result<(), EngineError> {
    use schema::task_assignments::dsl as ta;
    use schema::tasks::dsl as t;
    require_admin(actor)?;
    let family: Option<String> = t::tasks
        .filter(t::id.eq(task_id))
        .select(t::family_id)
        .first(conn)
        .optional()?;
    if family.as_deref() != Some(actor.family_id.as_str()) {
        return Err(EngineError::NotFound("Task not found".into()));
    }
    diesel::delete(ta::task_assignments.filter(ta::task_id.eq(task_id))).execute(conn)?;
    diesel::delete(t::tasks.filter(t::id.eq(task_id))).execute(conn)?;
    Ok(())
}

/// Claims an open task for a family member. Any member may take a task
/// for any member of their family. A concurrent second take trips the
/// unique constraint on the assignment and is reported as a conflict.
pub fn take_task(
    conn: &mut SqliteConnection,
    actor: &Actor,
    task_id: &str,
    assignee_id: &str,
) -> Result<(), EngineError> {
    use schema::task_assignments::dsl as ta;
    use schema::tasks::dsl as t;

    if !member_in_family(conn, assignee_id, &actor.family_id)? {
        return Err(EngineError::Validation("Invalid assignee".into()));
    }

    let task: Option<(String, String)> = t::tasks
        .filter(t::id.eq(task_id))
        .select((t::family_id, t::status))
        .first(conn)
        .optional()?;
    let available = matches!(
        &task,
        Some((family, status))
            if family == &actor.family_id && status == TaskStatus::Open.as_str()
    );
    if !available {
        return Err(EngineError::NotFound("Task not available".into()));
    }

    let id = Uuid::new_v4().to_string();
    let row = NewTaskAssignment {
        id: &id,
        task_id,
        member_id: assignee_id,
    };
    match diesel::insert_into(ta::task_assignments)
        .values(&row)
        .execute(conn)
    {
        Err(DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _)) => {
            return Err(EngineError::Conflict("Task already taken".into()));
        }
        other => {
            other?;
        }
    }

    diesel::update(t::tasks.filter(t::id.eq(task_id)))
        .set(t::status.eq(TaskStatus::Taken.as_str()))
        .execute(conn)?;
    Ok(())
}

pub fn release_task(
    conn: &mut SqliteConnection,
    actor: &Actor,
    task_id: &str,
) -> Result<(), EngineError> {
    use schema::task_assignments::dsl as ta;
    use schema::tasks::dsl as t;

    let task: Option<(String, String)> = t::tasks
        .filter(t::id.eq(task_id))
        .select((t::family_id, t::status))
        .first(conn)
        .optional()?;
    let taken = matches!(
        &task,
        Some((family, status))
            if family == &actor.family_id && status == TaskStatus::Taken.as_str()
    );
    if !taken {
        return Err(EngineError::NotFound("Task not available".into()));
    }

    diesel::delete(ta::task_assignments.filter(ta::task_id.eq(task_id))).execute(conn)?;
    diesel::update(t::tasks.filter(t::id.eq(task_id)))
        .set(t::status.eq(TaskStatus::Open.as_str()))
        .execute(conn)?;
    Ok(())
}

/// Completes a taken task: stamps the assignment, moves the task to its
/// next state, appends the ledger entry for the assignee and advances
/// their streak. Recurring tasks loop back to `open` with the deadline
/// set to tomorrow and the assignment discarded; everything else goes
/// terminal. Returns the points awarded.
pub fn complete_task(
    conn: &mut SqliteConnection,
    actor: &Actor,
    now: NaiveDateTime,
    today: NaiveDate,
    task_id: &str,
) -> Result<i32, EngineError> {
    use schema::task_assignments::dsl as ta;
    use schema::tasks::dsl as t;

    let assignment: Option<TaskAssignment> = ta::task_assignments
        .filter(ta::task_id.eq(task_id))
        .first(conn)
        .optional()?;
    let task: Option<Task> = t::tasks.filter(t::id.eq(task_id)).first(conn).optional()?;

    let (Some(assignment), Some(task)) = (assignment, task) else {
        return Err(EngineError::NotFound("Task not found or expired".into()));
    };
    if task.family_id != actor.family_id || task.status == TaskStatus::Expired.as_str() {
        return Err(EngineError::NotFound("Task not found or expired".into()));
    }
    if task.status == TaskStatus::Completed.as_str() || assignment.completed_at.is_some() {
        return Err(EngineError::NotFound("Task already completed".into()));
    }

    diesel::update(ta::task_assignments.filter(ta::task_id.eq(task_id)))
        .set(ta::completed_at.eq(Some(now)))
        .execute(conn)?;

    if task.recurring_daily {
        let tomorrow = today + Days::new(1);
        diesel::update(t::tasks.filter(t::id.eq(task_id)))
            .set((
                t::status.eq(TaskStatus::Open.as_str()),
                t::deadline.eq(Some(tomorrow)),
            ))
            .execute(conn)?;
        diesel::delete(ta::task_assignments.filter(ta::task_id.eq(task_id))).execute(conn)?;
    } else {
        diesel::update(t::tasks.filter(t::id.eq(task_id)))
            .set(t::status.eq(TaskStatus::Completed.as_str()))
            .execute(conn)?;
    }

    append_entry(
        conn,
        &assignment.member_id,
        ScoreSource::House,
        Some(task_id),
        task.score_value,
        None,
    )?;
    advance_streak(conn, &assignment.member_id, today)?;
    Ok(task.score_value)
}

// ---- sport activities ----

pub fn create_sport_activity(
    conn: &mut SqliteConnection,
    actor: &Actor,
    req: &NewSportActivityReq,
) -> Result<SportActivity, EngineError> {
    let allowed = actor.is_admin()
        || (req.kind == SportKind::Extra && req.member_id == actor.member_id);
    if !allowed {
        return Err(EngineError::Unauthorized);
    }
    if !member_in_family(conn, &req.member_id, &actor.family_id)? {
        return Err(EngineError::NotFound("Member not found".into()));
    }
    let days = match req.kind {
        SportKind::Weekly => domain::sanitize_days(&req.scheduled_days),
        SportKind::Extra => Vec::new(),
    };
    let id = Uuid::new_v4().to_string();
    let row = NewSportActivity {
        id: &id,
        member_id: &req.member_id,
        title: &req.title,
        kind: req.kind.as_str(),
        scheduled_days: days_to_json(&days),
        score_value: domain::clamp_points(req.score_value, domain::DEFAULT_TASK_SCORE),
    };
    Ok(diesel::insert_into(schema::sport_activities::table)
        .values(&row)
        .get_result::<SportActivity>(conn)?)
}

pub fn update_sport_activity(
    conn: &mut SqliteConnection,
    actor: &Actor,
    activity_id: &str,
    req: &UpdateSportActivityReq,
) -> Result<SportActivity, EngineError> {
    use schema::sport_activities::dsl as sa;
    require_admin(actor)?;
    let owner: Option<String> = sa::sport_activities
        .filter(sa::id.eq(activity_id))
        .select(sa::member_id)
        .first(conn)
        .optional()?;
    let Some(owner) = owner else {
        return Err(EngineError::NotFound("Activity not found".into()));
    };
    if !member_in_family(conn, &owner, &actor.family_id)? {
        return Err(EngineError::Unauthorized);
    }
    if !member_in_family(conn, &req.member_id, &actor.family_id)? {
        return Err(EngineError::NotFound("Member not found".into()));
    }
    let days = match req.kind {
        SportKind::Weekly => domain::sanitize_days(&req.scheduled_days),
        SportKind::Extra => Vec::new(),
    };
    Ok(
        diesel::update(sa::sport_activities.filter(sa::id.eq(activity_id)))
            .set((
                sa::member_id.eq(&req.member_id),
                sa::title.eq(&req.title),
                sa::kind.eq(req.kind.as_str()),
                sa::scheduled_days.eq(days_to_json(&days)),
                sa::score_value.eq(domain::clamp_points(
                    req.score_value,
                    domain::DEFAULT_TASK_SCORE,
                )),
            ))
            .get_result::<SportActivity>(conn)?,
    )
}

pub fn delete_sport_activity(
    conn: &mut SqliteConnection,
    actor: &Actor,
    activity_id: &str,
) -> Result<(), EngineError> {
    use schema::sport_activities::dsl as sa;
    require_admin(actor)?;
    let owner: Option<String> = sa::sport_activities
        .filter(sa::id.eq(activity_id))
        .select(sa::member_id)
        .first(conn)
        .optional()?;
    let Some(owner) = owner else {
        return Err(EngineError::NotFound("Activity not found".into()));
    };
    if !member_in_family(conn, &owner, &actor.family_id)? {
        return Err(EngineError::Unauthorized);
    }
    diesel::delete(sa::sport_activities.filter(sa::id.eq(activity_id))).execute(conn)?;
    Ok(())
}

/// Completes a sport activity. An ad hoc (`extra`) activity may be
/// retargeted to any family member at completion time; weekly ones
/// always score for their owner.
pub fn complete_sport_activity(
    conn: &mut SqliteConnection,
    actor: &Actor,
    now: NaiveDateTime,
    today: NaiveDate,
    activity_id: &str,
    override_member: Option<&str>,
) -> Result<i32, EngineError> {
    use schema::sport_activities::dsl as sa;

    let activity: Option<SportActivity> = sa::sport_activities
        .filter(sa::id.eq(activity_id))
        .first(conn)
        .optional()?;
    let Some(activity) = activity else {
        return Err(EngineError::NotFound(
            "Activity not found or already completed".into(),
        ));
    };
    if activity.completed_at.is_some() {
        return Err(EngineError::NotFound(
            "Activity not found or already completed".into(),
        ));
    }
    if !member_in_family(conn, &activity.member_id, &actor.family_id)? {
        return Err(EngineError::Unauthorized);
    }

    let target = match non_empty(override_member) {
        Some(member) if member != activity.member_id => {
            if activity.kind != SportKind::Extra.as_str() {
                return Err(EngineError::Validation(
                    "Only extra activities can be reassigned".into(),
                ));
            }
            if !member_in_family(conn, member, &actor.family_id)? {
                return Err(EngineError::NotFound("Member not found".into()));
            }
            member.to_string()
        }
        _ => activity.member_id.clone(),
    };

    diesel::update(sa::sport_activities.filter(sa::id.eq(activity_id)))
        .set((sa::completed_at.eq(Some(now)), sa::member_id.eq(&target)))
        .execute(conn)?;
    append_entry(
        conn,
        &target,
        ScoreSource::Sport,
        Some(activity_id),
        activity.score_value,
        None,
    )?;
    advance_streak(conn, &target, today)?;
    Ok(activity.score_value)
}

// ---- school tasks ----

pub fn create_school_task(
    conn: &mut SqliteConnection,
    actor: &Actor,
    req: &NewSchoolTaskReq,
) -> Result<SchoolTask, EngineError> {
    let target = non_empty(req.member_id.as_deref()).unwrap_or(&actor.member_id);
    if target != actor.member_id && !actor.is_admin() {
        return Err(EngineError::Unauthorized);
    }
    if !member_in_family(conn, target, &actor.family_id)? {
        return Err(EngineError::NotFound("Member not found".into()));
    }
    let days = domain::normalize_days(&req.scheduled_days);
    let id = Uuid::new_v4().to_string();
    let row = NewSchoolTask {
        id: &id,
        member_id: target,
        title: &req.title,
        kind: req.kind.as_str(),
        due_date: req.due_date,
        scheduled_days: days.as_deref().map(days_to_json),
        score_value: domain::clamp_points(req.score_value, domain::DEFAULT_TASK_SCORE),
    };
    Ok(diesel::insert_into(schema::school_tasks::table)
        .values(&row)
        .get_result::<SchoolTask>(conn)?)
}

pub fn update_school_task(
    conn: &mut SqliteConnection,
    actor: &Actor,
    task_id: &str,
    req: &UpdateSchoolTaskReq,
) -> Result<SchoolTask, EngineError> {
    use schema::school_tasks::dsl as st;
    require_admin(actor)?;
    let owner: Option<String> = st::school_tasks
        .filter(st::id.eq(task_id))
        .select(st::member_id)
        .first(conn)
        .optional()?;
    let Some(owner) = owner else {
        return Err(EngineError::NotFound("Task not found".into()));
    };
    if !member_in_family(conn, &owner, &actor.family_id)? {
        return Err(EngineError::Unauthorized);
    }
    // Absent member_id keeps the current owner.
    let target = non_empty(req.member_id.as_deref())
        .map(str::to_string)
        .unwrap_or(owner);
    if !member_in_family(conn, &target, &actor.family_id)? {
        return Err(EngineError::NotFound("Member not found".into()));
    }
    let days = domain::normalize_days(&req.scheduled_days);
    Ok(
        diesel::update(st::school_tasks.filter(st::id.eq(task_id)))
            .set((
                st::member_id.eq(&target),
                st::title.eq(&req.title),
                st::kind.eq(req.kind.as_str()),
                st::due_date.eq(req.due_date),
                st::scheduled_days.eq(days.as_deref().map(days_to_json)),
                st::score_value.eq(domain::clamp_points(
                    req.score_value,
                    domain::DEFAULT_TASK_SCORE,
                )),
            ))
            .get_result::<SchoolTask>(conn)?,
    )
}

pub fn delete_school_task(
    conn: &mut SqliteConnection,
    actor: &Actor,
    task_id: &str,
) -> Result<(), EngineError> {
    use schema::school_tasks::dsl as st;
    require_admin(actor)?;
    let owner: Option<String> = st::school_tasks
        .filter(st::id.eq(task_id))
        .select(st::member_id)
        .first(conn)
        .optional()?;
    let Some(owner) = owner else {
        return Err(EngineError::NotFound("Task not found".into()));
    };
    if !member_in_family(conn, &owner, &actor.family_id)? {
        return Err(EngineError::Unauthorized);
    }
    diesel::delete(st::school_tasks.filter(st::id.eq(task_id))).execute(conn)?;
    Ok(())
}

pub fn complete_school_task(
    conn: &mut SqliteConnection,
    actor: &Actor,
    now: NaiveDateTime,
    today: NaiveDate,
    task_id: &str,
) -> Result<i32, EngineError> {
    use schema::school_tasks::dsl as st;

    let task: Option<SchoolTask> = st::school_tasks
        .filter(st::id.eq(task_id))
        .first(conn)
        .optional()?;
    let Some(task) = task else {
        return Err(EngineError::NotFound(
            "Task not found or already completed".into(),
        ));
    };
    if task.completed_at.is_some() {
        return Err(EngineError::NotFound(
            "Task not found or already completed".into(),
        ));
    }
    if !member_in_family(conn, &task.member_id, &actor.family_id)? {
        return Err(EngineError::Unauthorized);
    }

    diesel::update(st::school_tasks.filter(st::id.eq(task_id)))
        .set(st::completed_at.eq(Some(now)))
        .execute(conn)?;
    append_entry(
        conn,
        &task.member_id,
        ScoreSource::School,
        Some(task_id),
        task.score_value,
        None,
    )?;
    advance_streak(conn, &task.member_id, today)?;
    Ok(task.score_value)
}

// ---- adjustments ----

pub fn add_adjustment(
    conn: &mut SqliteConnection,
    actor: &Actor,
    member_id: &str,
    req: &AdjustmentReq,
) -> Result<ScoreEntry, EngineError> {
    require_admin(actor)?;
    if !matches!(req.source, ScoreSource::Bonus | ScoreSource::Fine) {
        return Err(EngineError::Validation(
            "Adjustment source must be bonus or fine".into(),
        ));
    }
    if req.points <= 0 {
        return Err(EngineError::Validation(
            "Points must be greater than 0".into(),
        ));
    }
    if !member_in_family(conn, member_id, &actor.family_id)? {
        return Err(EngineError::NotFound("Member not found".into()));
    }
    append_entry(
        conn,
        member_id,
        req.source,
        None,
        req.points,
        non_empty(req.description.as_deref()),
    )
}

// ---- reset ----

/// Undoes a completion: deletes the ledger entry and, where possible,
/// reverts the source entity to its incomplete state. Recurring house
/// completions only remove the entry; the task was already regenerated
/// for tomorrow and its assignment discarded. Streaks are deliberately
/// not recomputed.
pub fn reset_score(
    conn: &mut SqliteConnection,
    actor: &Actor,
    entry_id: &str,
    req: &ResetReq,
) -> Result<(), EngineError> {
    use schema::scores_log::dsl as sl;

    let entry: Option<ScoreEntry> = sl::scores_log
        .filter(sl::id.eq(entry_id))
        .first(conn)
        .optional()?;
    let Some(entry) = entry else {
        return Err(EngineError::NotFound("Score not found".into()));
    };
    if !member_in_family(conn, &entry.member_id, &actor.family_id)? {
        return Err(EngineError::Unauthorized);
    }
    // Regular members may only reset while the family allows it.
    if !actor.is_admin() {
        use schema::families::dsl as f;
        let allowed: Option<bool> = f::families
            .filter(f::id.eq(&actor.family_id))
            .select(f::show_reset_button)
            .first(conn)
            .optional()?;
        if !allowed.unwrap_or(false) {
            return Err(EngineError::Unauthorized);
        }
    }
    if entry.source_kind != req.source.as_str() || entry.source_id != req.source_id {
        return Err(EngineError::Validation("Mismatch".into()));
    }
    if !req.source.is_resettable() {
        return Err(EngineError::Validation(
            "Cannot reset bonus or fine entries".into(),
        ));
    }

    match (req.source, entry.source_id.as_deref()) {
        (ScoreSource::House, Some(task_id)) => {
            use schema::task_assignments::dsl as ta;
            use schema::tasks::dsl as t;
            let task: Option<Task> = t::tasks.filter(t::id.eq(task_id)).first(conn).optional()?;
            let Some(task) = task.filter(|t| t.family_id == actor.family_id) else {
                return Err(EngineError::NotFound("Task not found".into()));
            };
            if !task.recurring_daily {
                diesel::update(ta::task_assignments.filter(ta::task_id.eq(task_id)))
                    .set(ta::completed_at.eq(None::<NaiveDateTime>))
                    .execute(conn)?;
                diesel::update(t::tasks.filter(t::id.eq(task_id)))
                    .set(t::status.eq(TaskStatus::Taken.as_str()))
                    .execute(conn)?;
            }
        }
        (ScoreSource::Sport, Some(activity_id)) => {
            use schema::sport_activities::dsl as sa;
            let owner: Option<String> = sa::sport_activities
                .filter(sa::id.eq(activity_id))
                .select(sa::member_id)
                .first(conn)
                .optional()?;
            let Some(owner) = owner else {
                return Err(EngineError::NotFound("Activity not found".into()));
            };
            if !member_in_family(conn, &owner, &actor.family_id)? {
                return Err(EngineError::Unauthorized);
            }
            diesel::update(sa::sport_activities.filter(sa::id.eq(activity_id)))
                .set(sa::completed_at.eq(None::<NaiveDateTime>))
                .execute(conn)?;
        }
        (ScoreSource::School, Some(task_id)) => {
            use schema::school_tasks::dsl as st;
            let owner: Option<String> = st::school_tasks
                .filter(st::id.eq(task_id))
                .select(st::member_id)
                .first(conn)
                .optional()?;
            let Some(owner) = owner else {
                return Err(EngineError::NotFound("Task not found".into()));
            };
            if !member_in_family(conn, &owner, &actor.family_id)? {
                return Err(EngineError::Unauthorized);
            }
            diesel::update(st::school_tasks.filter(st::id.eq(task_id)))
                .set(st::completed_at.eq(None::<NaiveDateTime>))
                .execute(conn)?;
        }
        // Resettable source without a source id: nothing to revert,
        // the entry alone is dropped.
        _ => {}
    }

    diesel::delete(sl::scores_log.filter(sl::id.eq(entry_id))).execute(conn)?;
    Ok(())
}

// ---- seeding ----

/// A member row declared in the server config.
#[derive(Debug, Clone)]
pub struct MemberSeed {
    pub id: String,
    pub name: String,
    pub role: MemberRole,
    pub avatar: Option<String>,
}

/// Upserts the config-declared family and members at startup. The
/// runtime `show_reset_button` flag is left alone so a restart never
/// reverts an admin's toggle.
pub fn seed_family(
    conn: &mut SqliteConnection,
    family_id: &str,
    family_name: &str,
    members: &[MemberSeed],
) -> Result<(), EngineError> {
    use schema::families::dsl as f;
    use schema::members::dsl as m;

    let family = NewFamily {
        id: family_id,
        name: family_name,
        show_reset_button: false,
    };
    diesel::insert_into(f::families)
        .values(&family)
        .on_conflict(f::id)
        .do_update()
        .set(f::name.eq(family_name))
        .execute(conn)?;

    for seed in members {
        let row = NewMember {
            id: &seed.id,
            family_id,
            name: &seed.name,
            role: seed.role.as_str(),
            avatar: seed.avatar.as_deref(),
        };
        diesel::insert_into(m::members)
            .values(&row)
            .on_conflict(m::id)
            .do_update()
            .set((
                m::family_id.eq(family_id),
                m::name.eq(&seed.name),
                m::role.eq(seed.role.as_str()),
                m::avatar.eq(seed.avatar.as_deref()),
            ))
            .execute(conn)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use diesel::Connection;
    use diesel_migrations::MigrationHarness;
    use famscore_shared::api::NewTaskReq;
    use famscore_shared::domain::SchoolTaskKind;

    fn conn() -> SqliteConnection {
        let mut conn = SqliteConnection::establish(":memory:").unwrap();
        conn.run_pending_migrations(crate::storage::MIGRATIONS)
            .unwrap();
        let members = vec![
            MemberSeed {
                id: "anna".into(),
                name: "Anna".into(),
                role: MemberRole::Admin,
                avatar: None,
            },
            MemberSeed {
                id: "ben".into(),
                name: "Ben".into(),
                role: MemberRole::Regular,
                avatar: None,
            },
            MemberSeed {
                id: "caro".into(),
                name: "Caro".into(),
                role: MemberRole::Regular,
                avatar: None,
            },
        ];
        seed_family(&mut conn, "fam", "The Fam", &members).unwrap();
        conn
    }

    fn admin() -> Actor {
        Actor {
            member_id: "anna".into(),
            family_id: "fam".into(),
            role: MemberRole::Admin,
        }
    }

    fn regular(id: &str) -> Actor {
        Actor {
            member_id: id.into(),
            family_id: "fam".into(),
            role: MemberRole::Regular,
        }
    }

    fn d(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    const TODAY: &str = "2025-06-02";

    fn today() -> NaiveDate {
        d(TODAY)
    }

    fn now() -> NaiveDateTime {
        today().and_hms_opt(10, 0, 0).unwrap()
    }

    fn task_req(score: Option<i32>, recurring: bool) -> NewTaskReq {
        NewTaskReq {
            title: "Dishes".into(),
            description: None,
            deadline: None,
            recurring_daily: recurring,
            scheduled_days: vec![],
            default_assignee_id: None,
            score_value: score,
        }
    }

    fn entries(conn: &mut SqliteConnection, member: &str) -> Vec<ScoreEntry> {
        use schema::scores_log::dsl as sl;
        sl::scores_log
            .filter(sl::member_id.eq(member))
            .order(sl::created_at.asc())
            .load(conn)
            .unwrap()
    }

    fn task_row(conn: &mut SqliteConnection, id: &str) -> Task {
        use schema::tasks::dsl as t;
        t::tasks.filter(t::id.eq(id)).first(conn).unwrap()
    }

    fn streak_row(conn: &mut SqliteConnection, member: &str) -> Option<Streak> {
        use schema::streaks::dsl as s;
        s::streaks
            .filter(s::member_id.eq(member))
            .first(conn)
            .optional()
            .unwrap()
    }

    #[test]
    fn create_task_clamps_score_and_defaults_recurring_deadline() {
        let mut conn = conn();
        let task = create_task(&mut conn, &admin(), today(), &task_req(Some(-5), true)).unwrap();
        assert_eq!(task.score_value, 0);
        assert_eq!(task.deadline, Some(today()));
        assert_eq!(task.status, TaskStatus::Open.as_str());

        let task = create_task(&mut conn, &admin(), today(), &task_req(None, false)).unwrap();
        assert_eq!(task.score_value, domain::DEFAULT_TASK_SCORE);
        assert_eq!(task.deadline, None);

        let err = create_task(&mut conn, &regular("ben"), today(), &task_req(None, false));
        assert!(matches!(err, Err(EngineError::Unauthorized)));
    }

    #[test]
    fn take_requires_open_and_reports_lost_races() {
        let mut conn = conn();
        let task = create_task(&mut conn, &admin(), today(), &task_req(Some(10), false)).unwrap();
        take_task(&mut conn, &regular("ben"), &task.id, "ben").unwrap();
        assert_eq!(task_row(&mut conn, &task.id).status, "taken");

        // Already taken: the status check fires first.
        let err = take_task(&mut conn, &regular("caro"), &task.id, "caro");
        assert!(matches!(err, Err(EngineError::NotFound(_))));

        // Race simulation: status flipped back but the assignment row
        // survives, so the unique constraint is the backstop.
        use schema::tasks::dsl as t;
        diesel::update(t::tasks.filter(t::id.eq(&task.id)))
            .set(t::status.eq(TaskStatus::Open.as_str()))
            .execute(&mut conn)
            .unwrap();
        let err = take_task(&mut conn, &regular("caro"), &task.id, "caro");
        match err {
            Err(EngineError::Conflict(msg)) => assert_eq!(msg, "Task already taken"),
            other => panic!("expected conflict, got {other:?}"),
        }
    }

    #[test]
    fn release_returns_task_to_open() {
        let mut conn = conn();
        let task = create_task(&mut conn, &admin(), today(), &task_req(Some(10), false)).unwrap();
        take_task(&mut conn, &regular("ben"), &task.id, "ben").unwrap();
        release_task(&mut conn, &regular("ben"), &task.id).unwrap();
        assert_eq!(task_row(&mut conn, &task.id).status, "open");

        // Releasing an open task has nothing to release.
        let err = release_task(&mut conn, &regular("ben"), &task.id);
        assert!(matches!(err, Err(EngineError::NotFound(_))));
    }

    #[test]
    fn complete_awards_once_and_rejects_double_submission() {
        let mut conn = conn();
        let task = create_task(&mut conn, &admin(), today(), &task_req(Some(10), false)).unwrap();
        take_task(&mut conn, &regular("ben"), &task.id, "ben").unwrap();

        let points = complete_task(&mut conn, &regular("ben"), now(), today(), &task.id).unwrap();
        assert_eq!(points, 10);
        assert_eq!(task_row(&mut conn, &task.id).status, "completed");

        let ledger = entries(&mut conn, "ben");
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger[0].source_kind, "house");
        assert_eq!(ledger[0].source_id.as_deref(), Some(task.id.as_str()));
        assert_eq!(ledger[0].score_delta, 10);

        let streak = streak_row(&mut conn, "ben").unwrap();
        assert_eq!(streak.current_streak, 1);
        assert_eq!(streak.longest_streak, 1);
        assert_eq!(streak.last_activity_date, Some(today()));

        let err = complete_task(&mut conn, &regular("ben"), now(), today(), &task.id);
        assert!(matches!(err, Err(EngineError::NotFound(_))));
        assert_eq!(entries(&mut conn, "ben").len(), 1);
    }

    #[test]
    fn recurring_completion_reopens_for_tomorrow() {
        let mut conn = conn();
        let task = create_task(&mut conn, &admin(), today(), &task_req(Some(5), true)).unwrap();
        take_task(&mut conn, &regular("ben"), &task.id, "ben").unwrap();
        complete_task(&mut conn, &regular("ben"), now(), today(), &task.id).unwrap();

        let row = task_row(&mut conn, &task.id);
        assert_eq!(row.status, "open");
        assert_eq!(row.deadline, Some(today() + Days::new(1)));

        use schema::task_assignments::dsl as ta;
        let lingering: i64 = ta::task_assignments
            .filter(ta::task_id.eq(&task.id))
            .count()
            .get_result(&mut conn)
            .unwrap();
        assert_eq!(lingering, 0);
    }

    #[test]
    fn streak_bonus_fires_once_per_day_at_multiples_of_seven() {
        let mut conn = conn();
        let yesterday = today() - Days::new(1);
        diesel::insert_into(schema::streaks::table)
            .values(&NewStreak {
                member_id: "ben",
                current_streak: 6,
                longest_streak: 6,
                last_activity_date: Some(yesterday),
            })
            .execute(&mut conn)
            .unwrap();

        let task = create_task(&mut conn, &admin(), today(), &task_req(Some(10), false)).unwrap();
        take_task(&mut conn, &regular("ben"), &task.id, "ben").unwrap();
        complete_task(&mut conn, &regular("ben"), now(), today(), &task.id).unwrap();

        let ledger = entries(&mut conn, "ben");
        let bonuses: Vec<_> = ledger
            .iter()
            .filter(|e| e.source_kind == "streak_bonus")
            .collect();
        assert_eq!(bonuses.len(), 1);
        assert_eq!(bonuses[0].score_delta, STREAK_BONUS_POINTS);
        assert_eq!(bonuses[0].source_id, None);
        assert_eq!(streak_row(&mut conn, "ben").unwrap().current_streak, 7);

        // A second completion the same day must not re-award.
        let task2 = create_task(&mut conn, &admin(), today(), &task_req(Some(10), false)).unwrap();
        take_task(&mut conn, &regular("ben"), &task2.id, "ben").unwrap();
        complete_task(&mut conn, &regular("ben"), now(), today(), &task2.id).unwrap();
        let bonuses = entries(&mut conn, "ben")
            .iter()
            .filter(|e| e.source_kind == "streak_bonus")
            .count();
        assert_eq!(bonuses, 1);
        assert_eq!(streak_row(&mut conn, "ben").unwrap().current_streak, 7);
    }

    #[test]
    fn reset_house_restores_taken_and_keeps_streak() {
        let mut conn = conn();
        let task = create_task(&mut conn, &admin(), today(), &task_req(Some(10), false)).unwrap();
        take_task(&mut conn, &regular("ben"), &task.id, "ben").unwrap();
        complete_task(&mut conn, &regular("ben"), now(), today(), &task.id).unwrap();
        let entry = entries(&mut conn, "ben").pop().unwrap();
        let streak_before = streak_row(&mut conn, "ben").unwrap();

        reset_score(
            &mut conn,
            &admin(),
            &entry.id,
            &ResetReq {
                source: ScoreSource::House,
                source_id: Some(task.id.clone()),
            },
        )
        .unwrap();

        assert!(entries(&mut conn, "ben").is_empty());
        assert_eq!(task_row(&mut conn, &task.id).status, "taken");
        use schema::task_assignments::dsl as ta;
        let assignment: TaskAssignment = ta::task_assignments
            .filter(ta::task_id.eq(&task.id))
            .first(&mut conn)
            .unwrap();
        assert_eq!(assignment.completed_at, None);

        // Streaks are deliberately left as they were.
        let streak_after = streak_row(&mut conn, "ben").unwrap();
        assert_eq!(streak_after.current_streak, streak_before.current_streak);
        assert_eq!(streak_after.longest_streak, streak_before.longest_streak);
        assert_eq!(
            streak_after.last_activity_date,
            streak_before.last_activity_date
        );
    }

    #[test]
    fn reset_rejects_mismatch_and_adjustment_entries() {
        let mut conn = conn();
        let task = create_task(&mut conn, &admin(), today(), &task_req(Some(10), false)).unwrap();
        take_task(&mut conn, &regular("ben"), &task.id, "ben").unwrap();
        complete_task(&mut conn, &regular("ben"), now(), today(), &task.id).unwrap();
        let entry = entries(&mut conn, "ben").pop().unwrap();

        let err = reset_score(
            &mut conn,
            &admin(),
            &entry.id,
            &ResetReq {
                source: ScoreSource::Sport,
                source_id: Some(task.id.clone()),
            },
        );
        match err {
            Err(EngineError::Validation(msg)) => assert_eq!(msg, "Mismatch"),
            other => panic!("expected mismatch, got {other:?}"),
        }

        let bonus = add_adjustment(
            &mut conn,
            &admin(),
            "ben",
            &AdjustmentReq {
                source: ScoreSource::Bonus,
                points: 5,
                description: Some("Helped out".into()),
            },
        )
        .unwrap();
        let err = reset_score(
            &mut conn,
            &admin(),
            &bonus.id,
            &ResetReq {
                source: ScoreSource::Bonus,
                source_id: None,
            },
        );
        assert!(matches!(err, Err(EngineError::Validation(_))));
    }

    #[test]
    fn reset_by_regular_member_is_gated_by_family_flag() {
        let mut conn = conn();
        let task = create_task(&mut conn, &admin(), today(), &task_req(Some(10), false)).unwrap();
        take_task(&mut conn, &regular("ben"), &task.id, "ben").unwrap();
        complete_task(&mut conn, &regular("ben"), now(), today(), &task.id).unwrap();
        let entry = entries(&mut conn, "ben").pop().unwrap();
        let req = ResetReq {
            source: ScoreSource::House,
            source_id: Some(task.id.clone()),
        };

        let err = reset_score(&mut conn, &regular("ben"), &entry.id, &req);
        assert!(matches!(err, Err(EngineError::Unauthorized)));

        update_family_settings(&mut conn, &admin(), true).unwrap();
        reset_score(&mut conn, &regular("ben"), &entry.id, &req).unwrap();
        assert!(entries(&mut conn, "ben").is_empty());
    }

    #[test]
    fn adjustments_require_admin_and_positive_points() {
        let mut conn = conn();
        let err = add_adjustment(
            &mut conn,
            &regular("ben"),
            "ben",
            &AdjustmentReq {
                source: ScoreSource::Bonus,
                points: 5,
                description: None,
            },
        );
        assert!(matches!(err, Err(EngineError::Unauthorized)));

        let err = add_adjustment(
            &mut conn,
            &admin(),
            "ben",
            &AdjustmentReq {
                source: ScoreSource::Fine,
                points: 0,
                description: None,
            },
        );
        assert!(matches!(err, Err(EngineError::Validation(_))));

        let err = add_adjustment(
            &mut conn,
            &admin(),
            "ben",
            &AdjustmentReq {
                source: ScoreSource::House,
                points: 5,
                description: None,
            },
        );
        assert!(matches!(err, Err(EngineError::Validation(_))));
    }

    #[test]
    fn ledger_sum_negates_fines() {
        let mut conn = conn();
        let task = create_task(&mut conn, &admin(), today(), &task_req(Some(10), false)).unwrap();
        take_task(&mut conn, &regular("ben"), &task.id, "ben").unwrap();
        complete_task(&mut conn, &regular("ben"), now(), today(), &task.id).unwrap();
        add_adjustment(
            &mut conn,
            &admin(),
            "ben",
            &AdjustmentReq {
                source: ScoreSource::Bonus,
                points: 5,
                description: None,
            },
        )
        .unwrap();
        add_adjustment(
            &mut conn,
            &admin(),
            "ben",
            &AdjustmentReq {
                source: ScoreSource::Fine,
                points: 3,
                description: Some("Muddy boots".into()),
            },
        )
        .unwrap();

        let total: i32 = entries(&mut conn, "ben")
            .iter()
            .map(|e| {
                e.source_kind
                    .parse::<ScoreSource>()
                    .unwrap()
                    .signed_points(e.score_delta)
            })
            .sum();
        assert_eq!(total, 10 + 5 - 3);
    }

    #[test]
    fn sport_authoring_and_retarget_rules() {
        let mut conn = conn();
        // A regular member may author an extra activity for themselves only.
        let extra = create_sport_activity(
            &mut conn,
            &regular("ben"),
            &NewSportActivityReq {
                member_id: "ben".into(),
                title: "Evening run".into(),
                kind: SportKind::Extra,
                scheduled_days: vec![],
                score_value: Some(8),
            },
        )
        .unwrap();
        let err = create_sport_activity(
            &mut conn,
            &regular("ben"),
            &NewSportActivityReq {
                member_id: "caro".into(),
                title: "Swim".into(),
                kind: SportKind::Extra,
                scheduled_days: vec![],
                score_value: None,
            },
        );
        assert!(matches!(err, Err(EngineError::Unauthorized)));
        let err = create_sport_activity(
            &mut conn,
            &regular("ben"),
            &NewSportActivityReq {
                member_id: "ben".into(),
                title: "Soccer".into(),
                kind: SportKind::Weekly,
                scheduled_days: vec![2, 4],
                score_value: None,
            },
        );
        assert!(matches!(err, Err(EngineError::Unauthorized)));

        // Extra activities may be retargeted at completion time.
        let points =
            complete_sport_activity(&mut conn, &regular("ben"), now(), today(), &extra.id, Some("caro"))
                .unwrap();
        assert_eq!(points, 8);
        let ledger = entries(&mut conn, "caro");
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger[0].source_kind, "sport");
        assert!(entries(&mut conn, "ben").is_empty());

        // Weekly activities always score for their owner.
        let weekly = create_sport_activity(
            &mut conn,
            &admin(),
            &NewSportActivityReq {
                member_id: "ben".into(),
                title: "Soccer".into(),
                kind: SportKind::Weekly,
                scheduled_days: vec![2, 4],
                score_value: Some(10),
            },
        )
        .unwrap();
        let err = complete_sport_activity(
            &mut conn,
            &regular("ben"),
            now(),
            today(),
            &weekly.id,
            Some("caro"),
        );
        assert!(matches!(err, Err(EngineError::Validation(_))));
    }

    #[test]
    fn sport_completion_is_single_shot() {
        let mut conn = conn();
        let activity = create_sport_activity(
            &mut conn,
            &admin(),
            &NewSportActivityReq {
                member_id: "ben".into(),
                title: "Soccer".into(),
                kind: SportKind::Weekly,
                scheduled_days: vec![1],
                score_value: Some(6),
            },
        )
        .unwrap();
        complete_sport_activity(&mut conn, &regular("ben"), now(), today(), &activity.id, None)
            .unwrap();
        let err =
            complete_sport_activity(&mut conn, &regular("ben"), now(), today(), &activity.id, None);
        assert!(matches!(err, Err(EngineError::NotFound(_))));
    }

    #[test]
    fn school_tasks_complete_and_reset() {
        let mut conn = conn();
        // Self-authored for oneself; authoring for another member needs admin.
        let school = create_school_task(
            &mut conn,
            &regular("ben"),
            &NewSchoolTaskReq {
                member_id: None,
                title: "Math homework".into(),
                kind: SchoolTaskKind::Homework,
                due_date: today(),
                scheduled_days: vec![],
                score_value: Some(4),
            },
        )
        .unwrap();
        assert_eq!(school.member_id, "ben");
        let err = create_school_task(
            &mut conn,
            &regular("ben"),
            &NewSchoolTaskReq {
                member_id: Some("caro".into()),
                title: "Essay".into(),
                kind: SchoolTaskKind::Project,
                due_date: today(),
                scheduled_days: vec![],
                score_value: None,
            },
        );
        assert!(matches!(err, Err(EngineError::Unauthorized)));

        let points =
            complete_school_task(&mut conn, &regular("ben"), now(), today(), &school.id).unwrap();
        assert_eq!(points, 4);
        let entry = entries(&mut conn, "ben").pop().unwrap();
        assert_eq!(entry.source_kind, "school");

        reset_score(
            &mut conn,
            &admin(),
            &entry.id,
            &ResetReq {
                source: ScoreSource::School,
                source_id: Some(school.id.clone()),
            },
        )
        .unwrap();
        use schema::school_tasks::dsl as st;
        let row: SchoolTask = st::school_tasks
            .filter(st::id.eq(&school.id))
            .first(&mut conn)
            .unwrap();
        assert_eq!(row.completed_at, None);
    }
}
