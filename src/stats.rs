//! Aggregate counters for dashboards.
//!
//! [`compute`] is a single O(n) pass over the scoped item set. The cache calls
//! it after every mutation that could move a counter and stores the result;
//! read paths only clone the stored value.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::item::{Category, Grade, Item};

/// Items whose interval is at most this many days are still "learning".
pub const LEARNING_THRESHOLD_DAYS: u32 = 21;

/// Items whose interval exceeds this many days count as mastered.
pub const MASTERY_THRESHOLD_DAYS: u32 = 21;

/// Last-grade breakdown over items still in the learning phase.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeBreakdown {
    pub forgot: usize,
    pub hard: usize,
    pub learned: usize,
    pub easy: usize,
}

impl GradeBreakdown {
    fn record(&mut self, grade: Grade) {
        match grade {
            Grade::Forgot => self.forgot += 1,
            Grade::Hard => self.hard += 1,
            Grade::Learned => self.learned += 1,
            Grade::Easy => self.easy += 1,
        }
    }
}

/// Total and learned (reviewed at least once) counts for one category.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryCount {
    pub total: usize,
    pub learned: usize,
}

impl CategoryCount {
    fn record(&mut self, learned: bool) {
        self.total += 1;
        if learned {
            self.learned += 1;
        }
    }
}

/// Progress made during the current day.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TodayProgress {
    /// First successful repetition happened today.
    pub learned: usize,
    /// Reviewed today, excluding newly learned items.
    pub reviewed: usize,
}

/// Aggregate statistics over one owner's active items.
#[allow(missing_docs)]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VocabStats {
    pub total: usize,
    pub due: usize,
    pub new: usize,
    pub grades: GradeBreakdown,
    pub mastered: usize,
    pub categories: BTreeMap<Category, CategoryCount>,
    /// Overlay count; pronunciation items also belong to a primary category.
    pub pronunciation: CategoryCount,
    pub today: TodayProgress,
}

/// Half-open `[start, end)` bounds of the local day containing `now`.
#[must_use]
pub fn day_bounds(now: DateTime<Utc>, day_offset_minutes: i32) -> (DateTime<Utc>, DateTime<Utc>) {
    let offset = Duration::minutes(i64::from(day_offset_minutes));
    let local_midnight = (now + offset).date_naive().and_time(NaiveTime::MIN);
    let start = local_midnight.and_utc() - offset;
    (start, start + Duration::days(1))
}

/// Recomputes every counter from scratch.
///
/// Archived items are excluded from all counters.
pub fn compute<'a, I>(items: I, now: DateTime<Utc>, day_offset_minutes: i32) -> VocabStats
where
    I: IntoIterator<Item = &'a Item>,
{
    let (day_start, day_end) = day_bounds(now, day_offset_minutes);
    let today = |t: Option<DateTime<Utc>>| t.is_some_and(|t| t >= day_start && t < day_end);

    let mut stats = VocabStats::default();
    for category in Category::ALL {
        stats.categories.insert(category, CategoryCount::default());
    }

    for item in items {
        if item.is_archived() {
            continue;
        }
        let s = &item.schedule;
        let learned = item.is_learned();

        stats.total += 1;
        if item.is_due_for_stats(now) {
            stats.due += 1;
        }
        if item.is_new() {
            stats.new += 1;
        }

        if learned && s.interval_days <= LEARNING_THRESHOLD_DAYS {
            if let Some(grade) = s.last_grade {
                stats.grades.record(grade);
            }
        }
        if s.interval_days > MASTERY_THRESHOLD_DAYS {
            stats.mastered += 1;
        }

        stats
            .categories
            .entry(Category::of(item))
            .or_default()
            .record(learned);
        if item.flags.needs_pronunciation_focus {
            stats.pronunciation.record(learned);
        }

        let trusted = !s.last_session.is_some_and(|k| k.is_low_trust());
        if trusted && today(s.last_review) {
            if today(s.first_learned_at) {
                stats.today.learned += 1;
            } else {
                stats.today.reviewed += 1;
            }
        }
    }

    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, ManualClock};
    use crate::item::{Quality, SessionKind};
    use crate::scheduler::apply_review_outcome;

    fn item(text: &str, quality: Quality, now: DateTime<Utc>) -> Item {
        let mut item = Item::new("u1", text, now - Duration::days(30)).unwrap();
        item.quality = quality;
        item
    }

    #[test]
    fn test_due_and_new_scenario() {
        let now = ManualClock::epoch().now();

        let a = item("alpha", Quality::Verified, now);

        let mut b = item("beta", Quality::Verified, now);
        b.schedule.last_review = Some(now - Duration::days(2));
        b.schedule.interval_days = 1;
        b.schedule.next_review = Some(now - Duration::days(1));

        let mut c = item("gamma", Quality::Failed, now);
        c.schedule.last_review = Some(now - Duration::days(5));
        c.schedule.next_review = Some(now - Duration::days(4));

        let stats = compute([&a, &b, &c], now, 0);
        assert_eq!(stats.total, 3);
        assert_eq!(stats.new, 1);
        assert_eq!(stats.due, 1);
    }

    #[test]
    fn test_archived_items_are_excluded() {
        let now = Utc::now();
        let mut archived = item("old", Quality::Verified, now);
        archived.flags.is_passive = true;

        let stats = compute([&archived], now, 0);
        assert_eq!(stats.total, 0);
        assert_eq!(stats.new, 0);
    }

    #[test]
    fn test_grade_breakdown_and_mastered_are_disjoint() {
        let now = Utc::now();
        let mut learning = item("learning", Quality::Verified, now);
        learning.schedule.last_review = Some(now);
        learning.schedule.interval_days = 6;
        learning.schedule.last_grade = Some(Grade::Hard);

        let mut mastered = item("mastered", Quality::Verified, now);
        mastered.schedule.last_review = Some(now);
        mastered.schedule.interval_days = 40;
        mastered.schedule.last_grade = Some(Grade::Easy);

        let stats = compute([&learning, &mastered], now, 0);
        assert_eq!(stats.grades.hard, 1);
        assert_eq!(stats.grades.easy, 0);
        assert_eq!(stats.mastered, 1);
    }

    #[test]
    fn test_category_precedence_and_pronunciation_overlay() {
        let now = Utc::now();
        let mut idiom = item("break the ice", Quality::Verified, now);
        idiom.flags.is_idiom = true;
        idiom.flags.is_phrasal_verb = true;
        idiom.flags.needs_pronunciation_focus = true;

        let plain = item("table", Quality::Verified, now);

        let stats = compute([&idiom, &plain], now, 0);
        assert_eq!(stats.categories[&Category::Idiom].total, 1);
        assert_eq!(stats.categories[&Category::PhrasalVerb].total, 0);
        assert_eq!(stats.categories[&Category::Vocabulary].total, 1);
        assert_eq!(stats.pronunciation.total, 1);
        assert_eq!(stats.pronunciation.learned, 0);
    }

    #[test]
    fn test_today_split_and_low_trust_exclusion() {
        let now = ManualClock::epoch().now();
        let fresh = item("fresh", Quality::Verified, now);
        let newly = apply_review_outcome(&fresh, Grade::Learned, now, SessionKind::Study);

        let mut older = item("older", Quality::Verified, now);
        older.schedule.first_learned_at = Some(now - Duration::days(10));
        let reviewed = apply_review_outcome(&older, Grade::Easy, now, SessionKind::Review);

        let gamed = apply_review_outcome(&fresh, Grade::Easy, now, SessionKind::Minigame);

        let stats = compute([&newly, &reviewed, &gamed], now, 0);
        assert_eq!(stats.today.learned, 1);
        assert_eq!(stats.today.reviewed, 1);
    }

    #[test]
    fn test_day_bounds_respect_offset() {
        // 2024-01-01T12:00:00Z
        let now = ManualClock::epoch().now();
        let (start, end) = day_bounds(now, 0);
        assert_eq!(end - start, Duration::days(1));
        assert!(start <= now && now < end);

        // UTC+14 puts "now" on 2024-01-02 local, which started at 10:00Z.
        let (start, _) = day_bounds(now, 14 * 60);
        assert_eq!(start, now - Duration::hours(2));
    }
}
