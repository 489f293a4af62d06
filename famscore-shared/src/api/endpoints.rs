use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};

use super::{API_V1_PREFIX, family_scope};

fn base_join(base: &str, path: &str) -> String {
    let b = base.trim_end_matches('/');
    let p = path.trim_start_matches('/');
    format!("{}/{}", b, p)
}

pub(crate) fn enc(s: &str) -> String {
    utf8_percent_encode(s, NON_ALPHANUMERIC).to_string()
}

pub fn auth_login(base: &str) -> String {
    base_join(base, &format!("{}/auth/login", API_V1_PREFIX))
}
pub fn version(base: &str) -> String {
    base_join(base, &format!("{}/version", API_V1_PREFIX))
}
pub fn family(base: &str, family_id: &str) -> String {
    base_join(base, &family_scope(family_id))
}
pub fn family_settings(base: &str, family_id: &str) -> String {
    base_join(base, &format!("{}/settings", family_scope(family_id)))
}
pub fn members(base: &str, family_id: &str) -> String {
    base_join(base, &format!("{}/members", family_scope(family_id)))
}
pub fn member(base: &str, family_id: &str, member_id: &str) -> String {
    base_join(
        base,
        &format!("{}/members/{}", family_scope(family_id), enc(member_id)),
    )
}
pub fn member_scores(base: &str, family_id: &str, member_id: &str) -> String {
    base_join(
        base,
        &format!(
            "{}/members/{}/scores",
            family_scope(family_id),
            enc(member_id)
        ),
    )
}
pub fn member_streak(base: &str, family_id: &str, member_id: &str) -> String {
    base_join(
        base,
        &format!(
            "{}/members/{}/streak",
            family_scope(family_id),
            enc(member_id)
        ),
    )
}
pub fn member_adjustments(base: &str, family_id: &str, member_id: &str) -> String {
    base_join(
        base,
        &format!(
            "{}/members/{}/adjustments",
            family_scope(family_id),
            enc(member_id)
        ),
    )
}
pub fn leaderboard(base: &str, family_id: &str) -> String {
    base_join(base, &format!("{}/leaderboard", family_scope(family_id)))
}
pub fn recent_scores(base: &str, family_id: &str) -> String {
    base_join(base, &format!("{}/scores/recent", family_scope(family_id)))
}
pub fn score_reset(base: &str, family_id: &str, entry_id: &str) -> String {
    base_join(
        base,
        &format!(
            "{}/scores/{}/reset",
            family_scope(family_id),
            enc(entry_id)
        ),
    )
}
pub fn today(base: &str, family_id: &str) -> String {
    base_join(base, &format!("{}/today", family_scope(family_id)))
}
pub fn tasks(base: &str, family_id: &str) -> String {
    base_join(base, &format!("{}/tasks", family_scope(family_id)))
}
pub fn task(base: &str, family_id: &str, task_id: &str) -> String {
    base_join(
        base,
        &format!("{}/tasks/{}", family_scope(family_id), enc(task_id)),
    )
}
pub fn task_take(base: &str, family_id: &str, task_id: &str) -> String {
    base_join(
        base,
        &format!("{}/tasks/{}/take", family_scope(family_id), enc(task_id)),
    )
}
pub fn task_release(base: &str, family_id: &str, task_id: &str) -> String {
    base_join(
        base,
        &format!(
            "{}/tasks/{}/release",
            family_scope(family_id),
            enc(task_id)
        ),
    )
}
pub fn task_complete(base: &str, family_id: &str, task_id: &str) -> String {
    base_join(
        base,
        &format!(
            "{}/tasks/{}/complete",
            family_scope(family_id),
            enc(task_id)
        ),
    )
}
pub fn sport_activities(base: &str, family_id: &str) -> String {
    base_join(
        base,
        &format!("{}/sport-activities", family_scope(family_id)),
    )
}
pub fn sport_activity(base: &str, family_id: &str, activity_id: &str) -> String {
    base_join(
        base,
        &format!(
            "{}/sport-activities/{}",
            family_scope(family_id),
            enc(activity_id)
        ),
    )
}
pub fn sport_activity_complete(base: &str, family_id: &str, activity_id: &str) -> String {
    base_join(
        base,
        &format!(
            "{}/sport-activities/{}/complete",
            family_scope(family_id),
            enc(activity_id)
        ),
    )
}
pub fn school_tasks(base: &str, family_id: &str) -> String {
    base_join(base, &format!("{}/school-tasks", family_scope(family_id)))
}
pub fn school_task(base: &str, family_id: &str, task_id: &str) -> String {
    base_join(
        base,
        &format!(
            "{}/school-tasks/{}",
            family_scope(family_id),
            enc(task_id)
        ),
    )
}
pub fn school_task_complete(base: &str, family_id: &str, task_id: &str) -> String {
    base_join(
        base,
        &format!(
            "{}/school-tasks/{}/complete",
            family_scope(family_id),
            enc(task_id)
        ),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_trim_slashes() {
        assert_eq!(
            auth_login("http://x/"),
            "http://x/api/v1/auth/login".to_string()
        );
        assert_eq!(
            today("http://x", "fam1"),
            "http://x/api/v1/families/fam1/today"
        );
    }

    #[test]
    fn path_segments_are_percent_encoded() {
        assert_eq!(
            task("http://x", "fam1", "a/b"),
            "http://x/api/v1/families/fam1/tasks/a%2Fb"
        );
    }
}
