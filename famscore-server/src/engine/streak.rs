use chrono::NaiveDate;
use famscore_shared::domain::STREAK_BONUS_INTERVAL;

/// Result of advancing a streak for one day of activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreakUpdate {
    pub current_streak: i32,
    pub longest_streak: i32,
    /// True when this advance crossed a bonus boundary and a
    /// `streak_bonus` ledger entry must be appended.
    pub award_bonus: bool,
}

/// Pure streak derivation. Callers with no stored row pass `(0, 0, None)`.
///
/// A gap of zero days leaves the streak unchanged, exactly one day
/// increments it, anything else (including clock weirdness putting the
/// last activity in the future) resets to 1. The bonus fires when the
/// new streak is a positive multiple of the interval and this is the
/// first activity recorded today, so repeated completions on the bonus
/// day cannot double-award.
pub fn advance(
    current: i32,
    longest: i32,
    last_activity: Option<NaiveDate>,
    today: NaiveDate,
) -> StreakUpdate {
    let current_streak = match last_activity {
        None => 1,
        Some(last) => match (today - last).num_days() {
            0 => current,
            1 => current + 1,
            _ => 1,
        },
    };
    let longest_streak = longest.max(current_streak);
    let award_bonus = current_streak > 0
        && current_streak % (STREAK_BONUS_INTERVAL as i32) == 0
        && last_activity != Some(today);
    StreakUpdate {
        current_streak,
        longest_streak,
        award_bonus,
    }
}
