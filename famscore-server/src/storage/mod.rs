pub mod models;
pub mod schema;

use std::collections::HashMap;

use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool};
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};
use famscore_shared::api::{
    AdjustmentReq, LeaderboardEntryDto, LeaderboardPeriod, MemberDto, NewMemberReq,
    NewSchoolTaskReq, NewSportActivityReq, NewTaskReq, ResetReq, SchoolTaskDto, ScoreEntryDto,
    ScorePageDto, SportActivityDto, StreakDto, TakenTaskDto, TaskDto, TodayDto, UpdateMemberReq,
    UpdateSchoolTaskReq, UpdateSportActivityReq, UpdateTaskReq,
};
use famscore_shared::domain::{self, MemberRole, ScoreSource, UnknownVariant};
use models::{
    Member, NewSession, SchoolTask, ScoreEntry, Session, SportActivity, Streak, Task,
    TaskAssignment, rfc3339,
};

use crate::engine::{self, Actor, EngineError, MemberSeed};

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!();

/// Structured error type for all storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// A business-rule failure bubbled up from the engine.
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// A Diesel ORM error (query failure, constraint violation, etc.)
    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),

    /// Failed to acquire or build a connection from the pool.
    #[error("pool error: {0}")]
    Pool(#[from] diesel::r2d2::PoolError),

    /// A `spawn_blocking` task panicked or was cancelled.
    #[error("task error: {0}")]
    Task(#[from] tokio::task::JoinError),

    /// A database migration failed to apply.
    #[error("migration error: {0}")]
    Migration(String),

    /// A stored value could not be interpreted.
    #[error("invalid stored value: {0}")]
    Corrupt(String),
}

fn bad_enum(e: UnknownVariant) -> StorageError {
    StorageError::Corrupt(e.to_string())
}

#[derive(Clone)]
pub struct Store {
    pool: Pool<ConnectionManager<SqliteConnection>>,
    tz: Tz,
}

impl Store {
    pub async fn connect_sqlite(path: &str, tz: Tz) -> Result<Self, StorageError> {
        let url = path.to_string();
        let manager = ConnectionManager::<SqliteConnection>::new(url);
        let pool = Pool::builder().max_size(8).build(manager)?;

        // Run pending Diesel migrations on startup (auto-init empty DBs)
        {
            let pool_clone = pool.clone();
            tokio::task::spawn_blocking(move || -> Result<(), StorageError> {
                let mut conn = pool_clone.get()?;
                configure_sqlite_conn(&mut conn)?;
                conn.run_pending_migrations(MIGRATIONS)
                    .map_err(|e| StorageError::Migration(e.to_string()))?;
                Ok(())
            })
            .await??;
        }

        Ok(Store { pool, tz })
    }

    /// Current instant (UTC) and calendar day in the family timezone.
    fn dates(&self) -> (NaiveDateTime, NaiveDate) {
        let now = Utc::now();
        (now.naive_utc(), now.with_timezone(&self.tz).date_naive())
    }

    /// UTC instant at which `date` starts in the family timezone.
    fn day_start_utc(&self, date: NaiveDate) -> NaiveDateTime {
        match self.tz.from_local_datetime(&date.and_time(NaiveTime::MIN)) {
            chrono::LocalResult::Single(dt) => dt.naive_utc(),
            chrono::LocalResult::Ambiguous(earliest, _) => earliest.naive_utc(),
            chrono::LocalResult::None => date.and_time(NaiveTime::MIN),
        }
    }

    pub async fn seed_from_config(
        &self,
        family_id: &str,
        family_name: &str,
        members: Vec<MemberSeed>,
    ) -> Result<(), StorageError> {
        let pool = self.pool.clone();
        let family_id = family_id.to_string();
        let family_name = family_name.to_string();
        tokio::task::spawn_blocking(move || -> Result<(), StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            conn.immediate_transaction(|conn| {
                engine::seed_family(conn, &family_id, &family_name, &members)
            })?;
            Ok(())
        })
        .await?
    }

    /// Fresh actor for the request, straight from the member row.
    pub async fn load_actor(&self, member_id: &str) -> Result<Option<Actor>, StorageError> {
        use schema::members::dsl as m;
        let pool = self.pool.clone();
        let member_id = member_id.to_string();
        tokio::task::spawn_blocking(move || -> Result<Option<Actor>, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            let row: Option<Member> = m::members
                .filter(m::id.eq(&member_id))
                .first::<Member>(&mut conn)
                .optional()?;
            let Some(row) = row else { return Ok(None) };
            let role: MemberRole = row.role.parse().map_err(bad_enum)?;
            Ok(Some(Actor {
                member_id: row.id,
                family_id: row.family_id,
                role,
            }))
        })
        .await?
    }

    // ---- family ----

    pub async fn get_family(
        &self,
        family_id: &str,
    ) -> Result<Option<models::Family>, StorageError> {
        use schema::families::dsl as f;
        let pool = self.pool.clone();
        let family_id = family_id.to_string();
        tokio::task::spawn_blocking(move || -> Result<Option<models::Family>, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            Ok(f::families
                .filter(f::id.eq(&family_id))
                .first::<models::Family>(&mut conn)
                .optional()?)
        })
        .await?
    }

    pub async fn update_family_settings(
        &self,
        actor: &Actor,
        show_reset_button: bool,
    ) -> Result<models::Family, StorageError> {
        let pool = self.pool.clone();
        let actor = actor.clone();
        tokio::task::spawn_blocking(move || -> Result<models::Family, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            Ok(conn.immediate_transaction(|conn| {
                engine::update_family_settings(conn, &actor, show_reset_button)
            })?)
        })
        .await?
    }

    // ---- members ----

    pub async fn list_members(&self, family_id: &str) -> Result<Vec<MemberDto>, StorageError> {
        use schema::members::dsl as m;
        let pool = self.pool.clone();
        let family_id = family_id.to_string();
        tokio::task::spawn_blocking(move || -> Result<Vec<MemberDto>, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            let rows: Vec<Member> = m::members
                .filter(m::family_id.eq(&family_id))
                .order(m::name.asc())
                .load::<Member>(&mut conn)?;
            rows.into_iter()
                .map(|r| MemberDto::try_from(r).map_err(bad_enum))
                .collect()
        })
        .await?
    }

    pub async fn get_member(
        &self,
        family_id: &str,
        member_id: &str,
    ) -> Result<Option<MemberDto>, StorageError> {
        use schema::members::dsl as m;
        let pool = self.pool.clone();
        let family_id = family_id.to_string();
        let member_id = member_id.to_string();
        tokio::task::spawn_blocking(move || -> Result<Option<MemberDto>, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            let row: Option<Member> = m::members
                .filter(m::id.eq(&member_id))
                .filter(m::family_id.eq(&family_id))
                .first::<Member>(&mut conn)
                .optional()?;
            row.map(|r| MemberDto::try_from(r).map_err(bad_enum))
                .transpose()
        })
        .await?
    }

    pub async fn create_member(
        &self,
        actor: &Actor,
        req: NewMemberReq,
    ) -> Result<MemberDto, StorageError> {
        let pool = self.pool.clone();
        let actor = actor.clone();
        tokio::task::spawn_blocking(move || -> Result<MemberDto, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            let row =
                conn.immediate_transaction(|conn| engine::create_member(conn, &actor, &req))?;
            MemberDto::try_from(row).map_err(bad_enum)
        })
        .await?
    }

    pub async fn update_member(
        &self,
        actor: &Actor,
        member_id: &str,
        req: UpdateMemberReq,
    ) -> Result<MemberDto, StorageError> {
        let pool = self.pool.clone();
        let actor = actor.clone();
        let member_id = member_id.to_string();
        tokio::task::spawn_blocking(move || -> Result<MemberDto, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            let row = conn.immediate_transaction(|conn| {
                engine::update_member(conn, &actor, &member_id, &req)
            })?;
            MemberDto::try_from(row).map_err(bad_enum)
        })
        .await?
    }

    pub async fn get_member_streak(
        &self,
        family_id: &str,
        member_id: &str,
    ) -> Result<Option<StreakDto>, StorageError> {
        use schema::members::dsl as m;
        use schema::streaks::dsl as s;
        let pool = self.pool.clone();
        let family_id = family_id.to_string();
        let member_id = member_id.to_string();
        tokio::task::spawn_blocking(move || -> Result<Option<StreakDto>, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            let in_family: i64 = m::members
                .filter(m::id.eq(&member_id))
                .filter(m::family_id.eq(&family_id))
                .count()
                .get_result(&mut conn)?;
            if in_family == 0 {
                return Ok(None);
            }
            let row: Option<Streak> = s::streaks
                .filter(s::member_id.eq(&member_id))
                .first::<Streak>(&mut conn)
                .optional()?;
            Ok(Some(match row {
                Some(r) => StreakDto {
                    member_id: r.member_id,
                    current_streak: r.current_streak,
                    longest_streak: r.longest_streak,
                    last_activity_date: r.last_activity_date,
                },
                None => StreakDto {
                    member_id,
                    current_streak: 0,
                    longest_streak: 0,
                    last_activity_date: None,
                },
            }))
        })
        .await?
    }

    // ---- house tasks ----

    pub async fn list_tasks(&self, family_id: &str) -> Result<Vec<TaskDto>, StorageError> {
        use schema::task_assignments as ta;
        use schema::tasks as t;
        let pool = self.pool.clone();
        let family_id = family_id.to_string();
        tokio::task::spawn_blocking(move || -> Result<Vec<TaskDto>, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            let rows: Vec<(Task, Option<String>)> = t::table
                .left_join(
                    ta::table.on(ta::task_id
                        .eq(t::id)
                        .and(ta::completed_at.is_null())),
                )
                .filter(t::family_id.eq(&family_id))
                .order(t::created_at.asc())
                .select((Task::as_select(), ta::member_id.nullable()))
                .load::<(Task, Option<String>)>(&mut conn)?;
            rows.into_iter()
                .map(|(task, assignee)| task.into_dto(assignee).map_err(bad_enum))
                .collect()
        })
        .await?
    }

    pub async fn create_task(
        &self,
        actor: &Actor,
        req: NewTaskReq,
    ) -> Result<TaskDto, StorageError> {
        let (_, today) = self.dates();
        let pool = self.pool.clone();
        let actor = actor.clone();
        tokio::task::spawn_blocking(move || -> Result<TaskDto, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            let row = conn
                .immediate_transaction(|conn| engine::create_task(conn, &actor, today, &req))?;
            row.into_dto(None).map_err(bad_enum)
        })
        .await?
    }

    pub async fn update_task(
        &self,
        actor: &Actor,
        task_id: &str,
        req: UpdateTaskReq,
    ) -> Result<TaskDto, StorageError> {
        use schema::task_assignments::dsl as ta;
        let (_, today) = self.dates();
        let pool = self.pool.clone();
        let actor = actor.clone();
        let task_id = task_id.to_string();
        tokio::task::spawn_blocking(move || -> Result<TaskDto, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            let row = conn.immediate_transaction(|conn| {
                engine::update_task(conn, &actor, today, &task_id, &req)
            })?;
            let assignee: Option<String> = ta::task_assignments
                .filter(ta::task_id.eq(&task_id))
                .filter(ta::completed_at.is_null())
                .select(ta::member_id)
                .first(&mut conn)
                .optional()?;
            row.into_dto(assignee).map_err(bad_enum)
        })
        .await?
    }

    pub async fn delete_task(&self, actor: &Actor, task_id: &str) -> Result<(), StorageError> {
        let pool = self.pool.clone();
        let actor = actor.clone();
        let task_id = task_id.to_string();
        tokio::task::spawn_blocking(move || -> Result<(), StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            conn.immediate_transaction(|conn| engine::delete_task(conn, &actor, &task_id))?;
            Ok(())
        })
        .await?
    }

    pub async fn take_task(
        &self,
        actor: &Actor,
        task_id: &str,
        assignee_id: &str,
    ) -> Result<(), StorageError> {
        let pool = self.pool.clone();
        let actor = actor.clone();
        let task_id = task_id.to_string();
        let assignee_id = assignee_id.to_string();
        tokio::task::spawn_blocking(move || -> Result<(), StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            conn.immediate_transaction(|conn| {
                engine::take_task(conn, &actor, &task_id, &assignee_id)
            })?;
            Ok(())
        })
        .await?
    }

    pub async fn release_task(&self, actor: &Actor, task_id: &str) -> Result<(), StorageError> {
        let pool = self.pool.clone();
        let actor = actor.clone();
        let task_id = task_id.to_string();
        tokio::task::spawn_blocking(move || -> Result<(), StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            conn.immediate_transaction(|conn| engine::release_task(conn, &actor, &task_id))?;
            Ok(())
        })
        .await?
    }

    pub async fn complete_task(&self, actor: &Actor, task_id: &str) -> Result<i32, StorageError> {
        let (now, today) = self.dates();
        let pool = self.pool.clone();
        let actor = actor.clone();
        let task_id = task_id.to_string();
        tokio::task::spawn_blocking(move || -> Result<i32, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            Ok(conn.immediate_transaction(|conn| {
                engine::complete_task(conn, &actor, now, today, &task_id)
            })?)
        })
        .await?
    }

    // ---- sport activities ----

    pub async fn list_sport_activities(
        &self,
        family_id: &str,
    ) -> Result<Vec<SportActivityDto>, StorageError> {
        use schema::members as m;
        use schema::sport_activities as sa;
        let pool = self.pool.clone();
        let family_id = family_id.to_string();
        tokio::task::spawn_blocking(move || -> Result<Vec<SportActivityDto>, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            let rows: Vec<SportActivity> = sa::table
                .inner_join(m::table.on(m::id.eq(sa::member_id)))
                .filter(m::family_id.eq(&family_id))
                .order(sa::created_at.asc())
                .select(SportActivity::as_select())
                .load::<SportActivity>(&mut conn)?;
            rows.into_iter()
                .map(|r| SportActivityDto::try_from(r).map_err(bad_enum))
                .collect()
        })
        .await?
    }

    pub async fn create_sport_activity(
        &self,
        actor: &Actor,
        req: NewSportActivityReq,
    ) -> Result<SportActivityDto, StorageError> {
        let pool = self.pool.clone();
        let actor = actor.clone();
        tokio::task::spawn_blocking(move || -> Result<SportActivityDto, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            let row = conn
                .immediate_transaction(|conn| engine::create_sport_activity(conn, &actor, &req))?;
            SportActivityDto::try_from(row).map_err(bad_enum)
        })
        .await?
    }

    pub async fn update_sport_activity(
        &self,
        actor: &Actor,
        activity_id: &str,
        req: UpdateSportActivityReq,
    ) -> Result<SportActivityDto, StorageError> {
        let pool = self.pool.clone();
        let actor = actor.clone();
        let activity_id = activity_id.to_string();
        tokio::task::spawn_blocking(move || -> Result<SportActivityDto, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            let row = conn.immediate_transaction(|conn| {
                engine::update_sport_activity(conn, &actor, &activity_id, &req)
            })?;
            SportActivityDto::try_from(row).map_err(bad_enum)
        })
        .await?
    }

    pub async fn delete_sport_activity(
        &self,
        actor: &Actor,
        activity_id: &str,
    ) -> Result<(), StorageError> {
        let pool = self.pool.clone();
        let actor = actor.clone();
        let activity_id = activity_id.to_string();
        tokio::task::spawn_blocking(move || -> Result<(), StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            conn.immediate_transaction(|conn| {
                engine::delete_sport_activity(conn, &actor, &activity_id)
            })?;
            Ok(())
        })
        .await?
    }

    pub async fn complete_sport_activity(
        &self,
        actor: &Actor,
        activity_id: &str,
        override_member: Option<String>,
    ) -> Result<i32, StorageError> {
        let (now, today) = self.dates();
        let pool = self.pool.clone();
        let actor = actor.clone();
        let activity_id = activity_id.to_string();
        tokio::task::spawn_blocking(move || -> Result<i32, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            Ok(conn.immediate_transaction(|conn| {
                engine::complete_sport_activity(
                    conn,
                    &actor,
                    now,
                    today,
                    &activity_id,
                    override_member.as_deref(),
                )
            })?)
        })
        .await?
    }

    // ---- school tasks ----

    pub async fn list_school_tasks(
        &self,
        family_id: &str,
    ) -> Result<Vec<SchoolTaskDto>, StorageError> {
        use schema::members as m;
        use schema::school_tasks as st;
        let pool = self.pool.clone();
        let family_id = family_id.to_string();
        tokio::task::spawn_blocking(move || -> Result<Vec<SchoolTaskDto>, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            let rows: Vec<SchoolTask> = st::table
                .inner_join(m::table.on(m::id.eq(st::member_id)))
                .filter(m::family_id.eq(&family_id))
                .order(st::due_date.asc())
                .select(SchoolTask::as_select())
                .load::<SchoolTask>(&mut conn)?;
            rows.into_iter()
                .map(|r| SchoolTaskDto::try_from(r).map_err(bad_enum))
                .collect()
        })
        .await?
    }

    pub async fn create_school_task(
        &self,
        actor: &Actor,
        req: NewSchoolTaskReq,
    ) -> Result<SchoolTaskDto, StorageError> {
        let pool = self.pool.clone();
        let actor = actor.clone();
        tokio::task::spawn_blocking(move || -> Result<SchoolTaskDto, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            let row = conn
                .immediate_transaction(|conn| engine::create_school_task(conn, &actor, &req))?;
            SchoolTaskDto::try_from(row).map_err(bad_enum)
        })
        .await?
    }

    pub async fn update_school_task(
        &self,
        actor: &Actor,
        task_id: &str,
        req: UpdateSchoolTaskReq,
    ) -> Result<SchoolTaskDto, StorageError> {
        let pool = self.pool.clone();
        let actor = actor.clone();
        let task_id = task_id.to_string();
        tokio::task::spawn_blocking(move || -> Result<SchoolTaskDto, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            let row = conn.immediate_transaction(|conn| {
                engine::update_school_task(conn, &actor, &task_id, &req)
            })?;
            SchoolTaskDto::try_from(row).map_err(bad_enum)
        })
        .await?
    }

    pub async fn delete_school_task(
        &self,
        actor: &Actor,
        task_id: &str,
    ) -> Result<(), StorageError> {
        let pool = self.pool.clone();
        let actor = actor.clone();
        let task_id = task_id.to_string();
        tokio::task::spawn_blocking(move || -> Result<(), StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            conn.immediate_transaction(|conn| {
                engine::delete_school_task(conn, &actor, &task_id)
            })?;
            Ok(())
        })
        .await?
    }

    pub async fn complete_school_task(
        &self,
        actor: &Actor,
        task_id: &str,
    ) -> Result<i32, StorageError> {
        let (now, today) = self.dates();
        let pool = self.pool.clone();
        let actor = actor.clone();
        let task_id = task_id.to_string();
        tokio::task::spawn_blocking(move || -> Result<i32, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            Ok(conn.immediate_transaction(|conn| {
                engine::complete_school_task(conn, &actor, now, today, &task_id)
            })?)
        })
        .await?
    }

    // ---- scores ----

    pub async fn add_adjustment(
        &self,
        actor: &Actor,
        member_id: &str,
        req: AdjustmentReq,
    ) -> Result<ScoreEntryDto, StorageError> {
        let pool = self.pool.clone();
        let actor = actor.clone();
        let member_id = member_id.to_string();
        tokio::task::spawn_blocking(move || -> Result<ScoreEntryDto, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            let row = conn.immediate_transaction(|conn| {
                engine::add_adjustment(conn, &actor, &member_id, &req)
            })?;
            let mut dtos = resolve_titles(&mut conn, vec![row])?;
            dtos.pop()
                .ok_or_else(|| StorageError::Corrupt("adjustment entry vanished".into()))
        })
        .await?
    }

    pub async fn reset_score(
        &self,
        actor: &Actor,
        entry_id: &str,
        req: ResetReq,
    ) -> Result<(), StorageError> {
        let pool = self.pool.clone();
        let actor = actor.clone();
        let entry_id = entry_id.to_string();
        tokio::task::spawn_blocking(move || -> Result<(), StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            conn.immediate_transaction(|conn| {
                engine::reset_score(conn, &actor, &entry_id, &req)
            })?;
            Ok(())
        })
        .await?
    }

    /// Paginated ledger history for one member, newest first. Returns
    /// `None` when the member is not part of the family.
    pub async fn member_scores_page(
        &self,
        family_id: &str,
        member_id: &str,
        page: u32,
        per_page: u32,
    ) -> Result<Option<ScorePageDto>, StorageError> {
        use schema::members::dsl as m;
        use schema::scores_log::dsl as sl;
        let pool = self.pool.clone();
        let family_id = family_id.to_string();
        let member_id = member_id.to_string();
        let page = page.max(1);
        let per_page = per_page.clamp(1, 1000);
        let offset = ((page as i64) - 1) * per_page as i64;
        tokio::task::spawn_blocking(move || -> Result<Option<ScorePageDto>, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            let in_family: i64 = m::members
                .filter(m::id.eq(&member_id))
                .filter(m::family_id.eq(&family_id))
                .count()
                .get_result(&mut conn)?;
            if in_family == 0 {
                return Ok(None);
            }
            let total: i64 = sl::scores_log
                .filter(sl::member_id.eq(&member_id))
                .count()
                .get_result(&mut conn)?;
            let rows: Vec<ScoreEntry> = sl::scores_log
                .filter(sl::member_id.eq(&member_id))
                .order(sl::created_at.desc())
                .offset(offset)
                .limit(per_page as i64)
                .load::<ScoreEntry>(&mut conn)?;
            let entries = resolve_titles(&mut conn, rows)?;
            Ok(Some(ScorePageDto {
                entries,
                page,
                per_page,
                total,
            }))
        })
        .await?
    }

    /// Family-wide point totals, highest first. `Week` counts from the
    /// most recent Sunday in the family timezone, `Month` from the 1st.
    pub async fn leaderboard(
        &self,
        family_id: &str,
        period: LeaderboardPeriod,
    ) -> Result<Vec<LeaderboardEntryDto>, StorageError> {
        use schema::members as m;
        use schema::scores_log as sl;
        let (_, today) = self.dates();
        let since = match period {
            LeaderboardPeriod::All => None,
            LeaderboardPeriod::Month => {
                Some(self.day_start_utc(today.with_day(1).unwrap_or(today)))
            }
            LeaderboardPeriod::Week => {
                let back = domain::weekday_index(today) as u64;
                Some(self.day_start_utc(today - chrono::Days::new(back)))
            }
        };
        let pool = self.pool.clone();
        let family_id = family_id.to_string();
        tokio::task::spawn_blocking(move || -> Result<Vec<LeaderboardEntryDto>, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            let members: Vec<Member> = m::table
                .filter(m::family_id.eq(&family_id))
                .load::<Member>(&mut conn)?;

            let mut query = sl::table
                .inner_join(m::table.on(m::id.eq(sl::member_id)))
                .filter(m::family_id.eq(&family_id))
                .into_boxed();
            if let Some(since) = since {
                query = query.filter(sl::created_at.ge(since));
            }
            let rows: Vec<(String, String, i32)> = query
                .select((sl::member_id, sl::source_kind, sl::score_delta))
                .load::<(String, String, i32)>(&mut conn)?;

            let mut totals: HashMap<String, i64> = HashMap::new();
            for (member, kind, delta) in rows {
                let source: ScoreSource = kind.parse().map_err(bad_enum)?;
                *totals.entry(member).or_default() += source.signed_points(delta) as i64;
            }
            let mut out: Vec<LeaderboardEntryDto> = members
                .into_iter()
                .map(|member| LeaderboardEntryDto {
                    total: totals.get(&member.id).copied().unwrap_or(0),
                    member_id: member.id,
                    name: member.name,
                    avatar: member.avatar,
                })
                .collect();
            out.sort_by(|a, b| b.total.cmp(&a.total).then(a.name.cmp(&b.name)));
            Ok(out)
        })
        .await?
    }

    /// Ledger entries across the family from the last seven days,
    /// newest first, capped at 50, with display titles resolved.
    pub async fn recent_activity(
        &self,
        family_id: &str,
    ) -> Result<Vec<ScoreEntryDto>, StorageError> {
        use schema::members as m;
        use schema::scores_log as sl;
        let (now, _) = self.dates();
        let since = now - chrono::Days::new(7);
        let pool = self.pool.clone();
        let family_id = family_id.to_string();
        tokio::task::spawn_blocking(move || -> Result<Vec<ScoreEntryDto>, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            let rows: Vec<ScoreEntry> = sl::table
                .inner_join(m::table.on(m::id.eq(sl::member_id)))
                .filter(m::family_id.eq(&family_id))
                .filter(sl::created_at.ge(since))
                .order(sl::created_at.desc())
                .limit(50)
                .select(ScoreEntry::as_select())
                .load::<ScoreEntry>(&mut conn)?;
            resolve_titles(&mut conn, rows)
        })
        .await?
    }

    /// Everything eligible to show for the family's current day: open
    /// house tasks, live assignments, incomplete sport activities and
    /// school work, each filtered by its weekday rules.
    pub async fn today_view(&self, family_id: &str) -> Result<TodayDto, StorageError> {
        use schema::members as m;
        use schema::school_tasks as st;
        use schema::sport_activities as sa;
        use schema::task_assignments as ta;
        use schema::tasks as t;
        let (_, today) = self.dates();
        let weekday = domain::weekday_index(today);
        let pool = self.pool.clone();
        let family_id = family_id.to_string();
        tokio::task::spawn_blocking(move || -> Result<TodayDto, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;

            let open_rows: Vec<Task> = t::table
                .filter(t::family_id.eq(&family_id))
                .filter(t::status.eq(famscore_shared::domain::TaskStatus::Open.as_str()))
                .filter(t::deadline.ge(today).or(t::deadline.is_null()))
                .load::<Task>(&mut conn)?;
            let mut open_tasks = open_rows
                .into_iter()
                .map(|task| task.into_dto(None).map_err(bad_enum))
                .collect::<Result<Vec<TaskDto>, _>>()?;
            open_tasks.retain(|task| {
                domain::is_scheduled_on(task.scheduled_days.as_deref(), weekday)
            });
            open_tasks.sort_by_key(|task| task.deadline.unwrap_or(NaiveDate::MAX));

            let taken_rows: Vec<(TaskAssignment, Task, String)> = ta::table
                .inner_join(t::table.on(t::id.eq(ta::task_id)))
                .inner_join(m::table.on(m::id.eq(ta::member_id)))
                .filter(ta::completed_at.is_null())
                .filter(t::family_id.eq(&family_id))
                .select((TaskAssignment::as_select(), Task::as_select(), m::name))
                .load::<(TaskAssignment, Task, String)>(&mut conn)?;
            let mut taken_tasks: Vec<TakenTaskDto> = taken_rows
                .into_iter()
                .map(|(assignment, task, member_name)| TakenTaskDto {
                    task_id: task.id,
                    title: task.title,
                    score_value: task.score_value,
                    deadline: task.deadline,
                    member_id: assignment.member_id,
                    member_name,
                    taken_at: rfc3339(assignment.taken_at),
                })
                .collect();
            taken_tasks.sort_by_key(|taken| taken.deadline.unwrap_or(NaiveDate::MAX));

            let sport_rows: Vec<SportActivity> = sa::table
                .inner_join(m::table.on(m::id.eq(sa::member_id)))
                .filter(m::family_id.eq(&family_id))
                .filter(sa::completed_at.is_null())
                .select(SportActivity::as_select())
                .load::<SportActivity>(&mut conn)?;
            let mut sport_activities = sport_rows
                .into_iter()
                .map(|row| SportActivityDto::try_from(row).map_err(bad_enum))
                .collect::<Result<Vec<SportActivityDto>, _>>()?;
            sport_activities.retain(|activity| {
                domain::sport_active_on(activity.kind, &activity.scheduled_days, weekday)
            });
            // Extra activities come first, then weekly ones by their
            // earliest scheduled day.
            sport_activities.sort_by_key(|activity| {
                (
                    activity.kind != famscore_shared::domain::SportKind::Extra,
                    activity.scheduled_days.first().copied().unwrap_or(7),
                )
            });

            let school_rows: Vec<SchoolTask> = st::table
                .inner_join(m::table.on(m::id.eq(st::member_id)))
                .filter(m::family_id.eq(&family_id))
                .filter(st::completed_at.is_null())
                .filter(st::due_date.ge(today))
                .order(st::due_date.asc())
                .select(SchoolTask::as_select())
                .load::<SchoolTask>(&mut conn)?;
            let mut school_tasks = school_rows
                .into_iter()
                .map(|row| SchoolTaskDto::try_from(row).map_err(bad_enum))
                .collect::<Result<Vec<SchoolTaskDto>, _>>()?;
            school_tasks.retain(|task| {
                domain::is_scheduled_on(task.scheduled_days.as_deref(), weekday)
            });

            Ok(TodayDto {
                date: today,
                open_tasks,
                taken_tasks,
                sport_activities,
                school_tasks,
            })
        })
        .await?
    }

    /// Maintenance deletion of one family and every dependent row.
    /// Returns false when no such family exists. Not reachable through
    /// the HTTP surface; only the CLI calls this.
    pub async fn remove_family(&self, family_id: &str) -> Result<bool, StorageError> {
        use schema::families::dsl as f;
        use schema::members::dsl as m;
        use schema::school_tasks::dsl as st;
        use schema::scores_log::dsl as sl;
        use schema::sport_activities::dsl as sa;
        use schema::streaks::dsl as s;
        use schema::task_assignments::dsl as ta;
        use schema::tasks::dsl as t;
        let pool = self.pool.clone();
        let family_id = family_id.to_string();
        tokio::task::spawn_blocking(move || -> Result<bool, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            let removed = conn.immediate_transaction(|conn| {
                let member_ids: Vec<String> = m::members
                    .filter(m::family_id.eq(&family_id))
                    .select(m::id)
                    .load(conn)?;
                let task_ids: Vec<String> = t::tasks
                    .filter(t::family_id.eq(&family_id))
                    .select(t::id)
                    .load(conn)?;

                diesel::delete(ta::task_assignments.filter(ta::task_id.eq_any(&task_ids)))
                    .execute(conn)?;
                diesel::delete(t::tasks.filter(t::family_id.eq(&family_id))).execute(conn)?;
                diesel::delete(sa::sport_activities.filter(sa::member_id.eq_any(&member_ids)))
                    .execute(conn)?;
                diesel::delete(st::school_tasks.filter(st::member_id.eq_any(&member_ids)))
                    .execute(conn)?;
                diesel::delete(sl::scores_log.filter(sl::member_id.eq_any(&member_ids)))
                    .execute(conn)?;
                diesel::delete(s::streaks.filter(s::member_id.eq_any(&member_ids)))
                    .execute(conn)?;
                diesel::delete(m::members.filter(m::family_id.eq(&family_id))).execute(conn)?;
                diesel::delete(f::families.filter(f::id.eq(&family_id))).execute(conn)
            })?;
            Ok(removed > 0)
        })
        .await?
    }

    // ---- sessions (JWT inactivity windows) ----

    pub async fn create_session(&self, jti_: &str, username_: &str) -> Result<(), StorageError> {
        use schema::sessions;
        let pool = self.pool.clone();
        let j = jti_.to_string();
        let u = username_.to_string();
        tokio::task::spawn_blocking(move || -> Result<(), StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            let new = NewSession {
                jti: &j,
                username: &u,
            };
            diesel::insert_into(sessions::table)
                .values(&new)
                .on_conflict_do_nothing()
                .execute(&mut conn)?;
            Ok(())
        })
        .await?
    }

    pub async fn get_session(&self, jti_: &str) -> Result<Option<Session>, StorageError> {
        use schema::sessions::dsl::*;
        let pool = self.pool.clone();
        let j = jti_.to_string();
        tokio::task::spawn_blocking(move || -> Result<Option<Session>, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            Ok(sessions
                .filter(jti.eq(&j))
                .first::<Session>(&mut conn)
                .optional()?)
        })
        .await?
    }

    pub async fn delete_session(&self, jti_: &str) -> Result<bool, StorageError> {
        use schema::sessions::dsl::*;
        let pool = self.pool.clone();
        let j = jti_.to_string();
        tokio::task::spawn_blocking(move || -> Result<bool, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            let deleted = diesel::delete(sessions.filter(jti.eq(&j))).execute(&mut conn)?;
            Ok(deleted > 0)
        })
        .await?
    }

    /// Touch session atomically, but only if it hasn't idled out. The
    /// cutoff check and the `last_used_at` update are one UPDATE so two
    /// concurrent requests cannot race the expiry.
    pub async fn touch_session_with_cutoff(
        &self,
        jti_: &str,
        cutoff: NaiveDateTime,
    ) -> Result<bool, StorageError> {
        use schema::sessions::dsl::*;
        let pool = self.pool.clone();
        let j = jti_.to_string();
        tokio::task::spawn_blocking(move || -> Result<bool, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            let now = Utc::now().naive_utc();
            let updated =
                diesel::update(sessions.filter(jti.eq(&j)).filter(last_used_at.ge(cutoff)))
                    .set(last_used_at.eq(now))
                    .execute(&mut conn)?;
            Ok(updated > 0)
        })
        .await?
    }
}

/// Attaches display titles to raw ledger rows: house/sport/school
/// entries look up their source row's title, streak bonuses get a fixed
/// label, bonus/fine fall back to their description.
fn resolve_titles(
    conn: &mut SqliteConnection,
    rows: Vec<ScoreEntry>,
) -> Result<Vec<ScoreEntryDto>, StorageError> {
    use schema::school_tasks::dsl as st;
    use schema::sport_activities::dsl as sa;
    use schema::tasks::dsl as t;

    let mut house_ids = Vec::new();
    let mut sport_ids = Vec::new();
    let mut school_ids = Vec::new();
    for row in &rows {
        if let Some(source_id) = &row.source_id {
            match row.source_kind.as_str() {
                "house" => house_ids.push(source_id.clone()),
                "sport" => sport_ids.push(source_id.clone()),
                "school" => school_ids.push(source_id.clone()),
                _ => {}
            }
        }
    }

    let mut titles: HashMap<String, String> = HashMap::new();
    if !house_ids.is_empty() {
        let found: Vec<(String, String)> = t::tasks
            .filter(t::id.eq_any(&house_ids))
            .select((t::id, t::title))
            .load(conn)?;
        for (id, title) in found {
            titles.insert(format!("house:{id}"), title);
        }
    }
    if !sport_ids.is_empty() {
        let found: Vec<(String, String)> = sa::sport_activities
            .filter(sa::id.eq_any(&sport_ids))
            .select((sa::id, sa::title))
            .load(conn)?;
        for (id, title) in found {
            titles.insert(format!("sport:{id}"), title);
        }
    }
    if !school_ids.is_empty() {
        let found: Vec<(String, String)> = st::school_tasks
            .filter(st::id.eq_any(&school_ids))
            .select((st::id, st::title))
            .load(conn)?;
        for (id, title) in found {
            titles.insert(format!("school:{id}"), title);
        }
    }

    rows.into_iter()
        .map(|row| {
            let source: ScoreSource = row.source_kind.parse().map_err(bad_enum)?;
            let title = match source {
                ScoreSource::StreakBonus => "Streak bonus".to_string(),
                ScoreSource::Bonus => row.description.clone().unwrap_or_else(|| "Bonus".into()),
                ScoreSource::Fine => row.description.clone().unwrap_or_else(|| "Fine".into()),
                _ => row
                    .source_id
                    .as_ref()
                    .and_then(|id| titles.get(&format!("{}:{}", row.source_kind, id)))
                    .cloned()
                    .unwrap_or_else(|| "Unknown".into()),
            };
            Ok(ScoreEntryDto {
                id: row.id,
                member_id: row.member_id,
                source,
                source_id: row.source_id,
                points: row.score_delta,
                description: row.description,
                created_at: rfc3339(row.created_at),
                title,
            })
        })
        .collect()
}

fn configure_sqlite_conn(conn: &mut SqliteConnection) -> Result<(), diesel::result::Error> {
    // Enable WAL for better read/write concurrency and set a busy timeout
    // Ignore the result rows; Diesel's execute is fine for PRAGMAs
    diesel::sql_query("PRAGMA journal_mode=WAL;").execute(conn)?;
    diesel::sql_query("PRAGMA synchronous=NORMAL;").execute(conn)?;
    diesel::sql_query("PRAGMA busy_timeout=5000;").execute(conn)?;
    Ok(())
}
