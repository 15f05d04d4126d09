//! Spaced-repetition scheduling and derived-field computation.
//!
//! SM-2 variant. Grades map onto SM-2 quality ratings:
//! - `Forgot`: 1 (incorrect)
//! - `Hard`: 3 (correct with serious difficulty)
//! - `Learned`: 4 (correct after hesitation)
//! - `Easy`: 5 (perfect response)
//!
//! Everything here is pure: same input, same output, no clock reads. The
//! review instant is always passed in by the caller.

use chrono::{DateTime, Duration, Utc};

use crate::item::{
    DerivedFields, EligibilityTag, Grade, Item, Quality, SessionKind, DEFAULT_EASE_FACTOR,
};

/// Bumped whenever a derived-field formula changes; `init` repairs stale items.
pub const FORMULA_VERSION: u32 = 3;

/// Minimum ease factor allowed
pub const MIN_EASE_FACTOR: f32 = 1.3;

/// Growth stops at roughly a century. Longer intervals already stored are kept.
pub const MAX_INTERVAL_DAYS: u32 = 36_500;

/// Interval at which mastery's interval component saturates.
const MASTERY_HORIZON_DAYS: u32 = 60;

const HARD_INTERVAL_FACTOR: f32 = 1.2;
const EASY_BONUS: f32 = 1.3;

const fn sm2_quality(grade: Grade) -> i32 {
    match grade {
        Grade::Forgot => 1,
        Grade::Hard => 3,
        Grade::Learned => 4,
        Grade::Easy => 5,
    }
}

/// Computes complexity, mastery and eligibility tags from the item's other fields.
#[must_use]
pub fn compute_derived_fields(item: &Item) -> DerivedFields {
    DerivedFields {
        complexity_score: complexity_score(item),
        mastery_score: mastery_score(item),
        eligibility_tags: eligibility_tags(item),
    }
}

/// Recomputes derived fields in place. Returns true if anything changed.
pub fn refresh_derived(item: &mut Item) -> bool {
    let fresh = compute_derived_fields(item);
    if fresh == item.derived {
        return false;
    }
    item.derived = fresh;
    true
}

fn letter_count(text: &str) -> usize {
    text.chars().filter(|c| c.is_alphabetic()).count()
}

#[allow(clippy::cast_possible_truncation)]
fn complexity_score(item: &Item) -> u8 {
    let words = item.text.split_whitespace().count();
    let letters = letter_count(&item.text);
    let flags = &item.flags;

    let mut score: usize = 1;
    score += words.saturating_sub(1).min(3);
    if letters > 8 {
        score += 1;
    }
    if letters > 14 {
        score += 1;
    }
    if flags.is_idiom {
        score += 2;
    }
    score += usize::from(flags.is_phrasal_verb);
    score += usize::from(flags.is_collocation);
    score += usize::from(flags.is_irregular);
    score += usize::from(flags.needs_pronunciation_focus);
    score += usize::from(!item.prepositions.is_empty());

    score.clamp(1, 10) as u8
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
fn mastery_score(item: &Item) -> u8 {
    let s = &item.schedule;
    if item.quality == Quality::Failed || s.last_review.is_none() {
        return 0;
    }

    let interval_part =
        s.interval_days.min(MASTERY_HORIZON_DAYS) as f32 / MASTERY_HORIZON_DAYS as f32 * 60.0;
    let streak_part = (s.consecutive_correct.min(5) * 6) as f32;
    let ease_part = ((s.ease_factor - MIN_EASE_FACTOR) / (DEFAULT_EASE_FACTOR - MIN_EASE_FACTOR))
        .clamp(0.0, 1.0)
        * 10.0;
    let penalty = (s.forgot_count.min(5) * 4) as f32;

    (interval_part + streak_part + ease_part - penalty)
        .round()
        .clamp(0.0, 100.0) as u8
}

fn eligibility_tags(item: &Item) -> Vec<EligibilityTag> {
    let mut tags = Vec::new();
    let flags = &item.flags;
    let single_word = item.text.split_whitespace().count() == 1;

    if matches!(item.quality, Quality::Verified | Quality::Refined) && !flags.is_passive {
        tags.push(EligibilityTag::Review);
    }
    if single_word
        && letter_count(&item.text) >= 3
        && item.text.chars().all(|c| c.is_alphabetic() || c == '-' || c == '\'')
    {
        tags.push(EligibilityTag::Spelling);
    }
    if !item.meaning.trim().is_empty() {
        tags.push(EligibilityTag::Meaning);
    }
    if item.examples.iter().any(|e| !e.trim().is_empty()) {
        tags.push(EligibilityTag::Context);
    }
    if flags.needs_pronunciation_focus {
        tags.push(EligibilityTag::Pronunciation);
    }
    if flags.is_idiom {
        tags.push(EligibilityTag::Idiom);
    }
    if !item.prepositions.is_empty() {
        tags.push(EligibilityTag::Preposition);
    }
    if flags.is_collocation {
        tags.push(EligibilityTag::Collocation);
    }

    // Pushed in declaration order, so already sorted.
    tags
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
fn next_interval(prev: u32, streak: u32, ease: f32, grade: Grade) -> u32 {
    let candidate = match streak {
        0 => 1,
        1 => match grade {
            Grade::Hard => 3,
            _ => 6,
        },
        _ => {
            let factor = match grade {
                Grade::Hard => HARD_INTERVAL_FACTOR,
                Grade::Easy => ease * EASY_BONUS,
                _ => ease,
            };
            (prev as f32 * factor).round().min(MAX_INTERVAL_DAYS as f32) as u32
        }
    };

    // The cap bounds growth only; an interval already past it is kept.
    candidate.min(MAX_INTERVAL_DAYS).max(prev).max(1)
}

/// Applies a graded review outcome and returns the updated item.
///
/// Contract:
/// - `Forgot` never increases the interval and resets the streak to zero.
/// - Every other grade never decreases the interval.
/// - `next_review == last_review + interval_days`.
#[must_use]
pub fn apply_review_outcome(
    item: &Item,
    grade: Grade,
    reviewed_at: DateTime<Utc>,
    session: SessionKind,
) -> Item {
    let mut next = item.clone();
    let s = &mut next.schedule;
    let prev = s.interval_days;

    if grade == Grade::Forgot {
        s.interval_days = prev.min(1);
        s.ease_factor = (s.ease_factor - 0.2).max(MIN_EASE_FACTOR);
        s.consecutive_correct = 0;
        s.forgot_count = s.forgot_count.saturating_add(1);
    } else {
        s.interval_days = next_interval(prev, s.consecutive_correct, s.ease_factor, grade);

        // EF' = EF + (0.1 - (5-q) * (0.08 + (5-q) * 0.02))
        #[allow(clippy::cast_precision_loss)]
        let miss = (5 - sm2_quality(grade)) as f32;
        s.ease_factor = (s.ease_factor + (0.1 - miss * (0.08 + miss * 0.02))).max(MIN_EASE_FACTOR);
        s.consecutive_correct = s.consecutive_correct.saturating_add(1);
        if s.first_learned_at.is_none() {
            s.first_learned_at = Some(reviewed_at);
        }
    }

    s.last_grade = Some(grade);
    s.review_count = s.review_count.saturating_add(1);
    s.last_review = Some(reviewed_at);
    s.next_review = Some(reviewed_at + Duration::days(i64::from(s.interval_days)));
    s.last_session = Some(session);

    next.updated_at = reviewed_at;
    next.derived = compute_derived_fields(&next);
    next
}

/// Intervals each grade would produce, in `[Forgot, Hard, Learned, Easy]` order.
#[must_use]
pub fn preview_intervals(item: &Item) -> [u32; 4] {
    let at = item.schedule.last_review.unwrap_or(item.updated_at);
    [Grade::Forgot, Grade::Hard, Grade::Learned, Grade::Easy]
        .map(|g| apply_review_outcome(item, g, at, SessionKind::Review).schedule.interval_days)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn verified(text: &str) -> Item {
        let mut item = Item::new("u1", text, Utc::now()).unwrap();
        item.quality = Quality::Verified;
        item
    }

    fn at_streak(streak: u32, interval: u32) -> Item {
        let mut item = verified("meticulous");
        item.schedule.consecutive_correct = streak;
        item.schedule.interval_days = interval;
        item.schedule.last_review = Some(Utc::now() - Duration::days(i64::from(interval)));
        item
    }

    #[test]
    fn test_forgot_resets_streak_and_never_grows_interval() {
        let item = at_streak(5, 30);
        let out = apply_review_outcome(&item, Grade::Forgot, Utc::now(), SessionKind::Review);

        assert_eq!(out.schedule.consecutive_correct, 0);
        assert!(out.schedule.interval_days <= 30);
        assert_eq!(out.schedule.forgot_count, 1);
        assert_eq!(out.schedule.last_grade, Some(Grade::Forgot));
    }

    #[test]
    fn test_forgot_on_fresh_item_keeps_zero_interval() {
        let item = verified("gist");
        let now = Utc::now();
        let out = apply_review_outcome(&item, Grade::Forgot, now, SessionKind::Study);
        assert_eq!(out.schedule.interval_days, 0);
        assert_eq!(out.schedule.next_review, Some(now));
        assert!(out.schedule.first_learned_at.is_none());
    }

    #[test]
    fn test_success_never_decreases_interval() {
        for grade in [Grade::Hard, Grade::Learned, Grade::Easy] {
            for (streak, interval) in [(0, 0), (0, 12), (1, 1), (1, 9), (4, 40)] {
                let item = at_streak(streak, interval);
                let out = apply_review_outcome(&item, grade, Utc::now(), SessionKind::Review);
                assert!(
                    out.schedule.interval_days >= interval,
                    "{grade:?} at streak {streak} shrank {interval} to {}",
                    out.schedule.interval_days
                );
                assert_eq!(out.schedule.consecutive_correct, streak + 1);
            }
        }
    }

    #[test]
    fn test_interval_above_cap_is_not_shortened() {
        for grade in [Grade::Hard, Grade::Learned, Grade::Easy] {
            let item = at_streak(3, 40_000);
            let out = apply_review_outcome(&item, grade, Utc::now(), SessionKind::Review);
            assert_eq!(out.schedule.interval_days, 40_000, "{grade:?}");
        }

        let item = at_streak(3, MAX_INTERVAL_DAYS - 10);
        let out = apply_review_outcome(&item, Grade::Easy, Utc::now(), SessionKind::Review);
        assert_eq!(out.schedule.interval_days, MAX_INTERVAL_DAYS);

        let item = at_streak(3, 40_000);
        let out = apply_review_outcome(&item, Grade::Forgot, Utc::now(), SessionKind::Review);
        assert!(out.schedule.interval_days <= 40_000);
    }

    #[test]
    fn test_next_review_is_last_review_plus_interval() {
        let item = at_streak(3, 10);
        let now = Utc::now();
        let out = apply_review_outcome(&item, Grade::Learned, now, SessionKind::Review);
        let s = &out.schedule;
        assert_eq!(s.last_review, Some(now));
        assert_eq!(
            s.next_review,
            Some(now + Duration::days(i64::from(s.interval_days)))
        );
    }

    #[test]
    fn test_first_and_second_success_intervals() {
        let item = verified("meticulous");
        let first = apply_review_outcome(&item, Grade::Learned, Utc::now(), SessionKind::Study);
        assert_eq!(first.schedule.interval_days, 1);
        assert!(first.schedule.first_learned_at.is_some());

        let second = apply_review_outcome(&first, Grade::Learned, Utc::now(), SessionKind::Review);
        assert_eq!(second.schedule.interval_days, 6);

        let third = apply_review_outcome(&second, Grade::Learned, Utc::now(), SessionKind::Review);
        assert_eq!(third.schedule.interval_days, 15);
    }

    #[test]
    fn test_ease_factor_minimum() {
        let mut item = at_streak(2, 10);
        item.schedule.ease_factor = 1.4;
        let once = apply_review_outcome(&item, Grade::Forgot, Utc::now(), SessionKind::Review);
        let twice = apply_review_outcome(&once, Grade::Forgot, Utc::now(), SessionKind::Review);
        assert!(twice.schedule.ease_factor >= MIN_EASE_FACTOR);
    }

    #[test]
    fn test_derived_fields_are_pure() {
        let mut item = at_streak(3, 14);
        item.meaning = "showing great attention to detail".to_string();
        item.flags.needs_pronunciation_focus = true;

        let a = compute_derived_fields(&item);
        let b = compute_derived_fields(&item);
        assert_eq!(a, b);
    }

    #[test]
    fn test_complexity_bounds() {
        let simple = verified("cat");
        assert_eq!(compute_derived_fields(&simple).complexity_score, 1);

        let mut hard = verified("once in a blue moon every time");
        hard.flags.is_idiom = true;
        hard.flags.is_irregular = true;
        hard.flags.needs_pronunciation_focus = true;
        hard.flags.is_collocation = true;
        hard.prepositions.push("in".to_string());
        let score = compute_derived_fields(&hard).complexity_score;
        assert!(score <= 10);
        assert!(score >= 8);
    }

    #[test]
    fn test_mastery_zero_until_reviewed() {
        let item = verified("gist");
        assert_eq!(compute_derived_fields(&item).mastery_score, 0);

        let reviewed = apply_review_outcome(&item, Grade::Easy, Utc::now(), SessionKind::Study);
        assert!(reviewed.derived.mastery_score > 0);
    }

    #[test]
    fn test_eligibility_tags_sorted_and_gated_by_quality() {
        let mut item = verified("ubiquitous");
        item.meaning = "found everywhere".to_string();
        item.examples.push("Phones are ubiquitous.".to_string());
        let tags = compute_derived_fields(&item).eligibility_tags;

        let mut sorted = tags.clone();
        sorted.sort();
        assert_eq!(tags, sorted);
        assert!(tags.contains(&EligibilityTag::Review));
        assert!(tags.contains(&EligibilityTag::Spelling));
        assert!(tags.contains(&EligibilityTag::Context));

        item.quality = Quality::Raw;
        assert!(!compute_derived_fields(&item)
            .eligibility_tags
            .contains(&EligibilityTag::Review));
    }

    #[test]
    fn test_refresh_derived_reports_change() {
        let mut item = verified("gist");
        assert!(refresh_derived(&mut item));
        assert!(!refresh_derived(&mut item));
    }

    #[test]
    fn test_preview_intervals_ordering() {
        let item = at_streak(4, 20);
        let [forgot, hard, learned, easy] = preview_intervals(&item);
        assert!(forgot <= hard);
        assert!(hard <= learned);
        assert!(learned <= easy);
    }
}
