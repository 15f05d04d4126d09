//! Vocabulary items and their scheduling state.
//!
//! An [`Item`] is a single learnable unit (word or phrase). Its scheduling
//! state lives in [`Schedule`]; the [`DerivedFields`] are pure functions of the
//! rest of the item and are refreshed by [`crate::scheduler`] on every save.
//!
//! "Due" and "New" are derived classifications, never stored: see
//! [`Item::is_due_for_stats`], [`Item::is_due_for_review_queue`] and
//! [`Item::is_new`].

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;

/// Globally unique, never reused item identifier.
///
/// # Examples
///
/// ```
/// use lexiq::ItemId;
///
/// let id = ItemId::new();
/// assert!(!id.is_nil());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(Uuid);

impl ItemId {
    /// Creates a new random item ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates an item ID from an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// Returns true if this is a nil (all zeros) UUID.
    #[must_use]
    pub fn is_nil(&self) -> bool {
        self.0.is_nil()
    }
}

impl Default for ItemId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for ItemId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// Lifecycle stage of an item's content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Quality {
    /// Unverified content (e.g. promoted from raw text).
    #[default]
    Raw,
    /// Ready for scheduling.
    Verified,
    /// Enriched after verification.
    Refined,
    /// Rejected content.
    Failed,
}

/// Speech register of an item.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Register {
    Neutral,
    Formal,
    Casual,
    Slang,
    Academic,
}

/// Graded outcome of a single review.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Grade {
    /// No recall.
    Forgot,
    /// Recalled with serious difficulty.
    Hard,
    /// Recalled normally.
    Learned,
    /// Recalled without hesitation.
    Easy,
}

/// Where a review event came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionKind {
    /// Regular scheduled review session.
    Review,
    /// First-time study of new items.
    Study,
    /// Minigame session. Treated as low-trust by today's counters.
    Minigame,
}

impl SessionKind {
    /// Low-trust sessions never count towards today's progress.
    #[must_use]
    pub const fn is_low_trust(self) -> bool {
        matches!(self, Self::Minigame)
    }
}

/// Classification flags.
#[allow(missing_docs)]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ItemFlags {
    pub is_idiom: bool,
    pub is_phrasal_verb: bool,
    pub is_collocation: bool,
    pub is_standard_phrase: bool,
    pub needs_pronunciation_focus: bool,
    pub is_irregular: bool,
    /// Soft-archived. Archived items are hidden from every view by default.
    pub is_passive: bool,
}

/// Spaced-repetition state.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Schedule {
    #[serde(with = "chrono::serde::ts_milliseconds_option")]
    pub last_review: Option<DateTime<Utc>>,
    /// Set only by a scheduling write.
    #[serde(with = "chrono::serde::ts_milliseconds_option")]
    pub next_review: Option<DateTime<Utc>>,
    pub interval_days: u32,
    pub ease_factor: f32,
    pub consecutive_correct: u32,
    pub last_grade: Option<Grade>,
    pub forgot_count: u32,
    pub review_count: u32,
    /// First successful repetition.
    #[serde(with = "chrono::serde::ts_milliseconds_option")]
    pub first_learned_at: Option<DateTime<Utc>>,
    pub last_session: Option<SessionKind>,
}

/// Default SM-2 ease factor.
pub const DEFAULT_EASE_FACTOR: f32 = 2.5;

impl Default for Schedule {
    fn default() -> Self {
        Self {
            last_review: None,
            next_review: None,
            interval_days: 0,
            ease_factor: DEFAULT_EASE_FACTOR,
            consecutive_correct: 0,
            last_grade: None,
            forgot_count: 0,
            review_count: 0,
            first_learned_at: None,
            last_session: None,
        }
    }
}

/// Activities an item qualifies for. Derived, never edited directly.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EligibilityTag {
    Review,
    Spelling,
    Meaning,
    Context,
    Pronunciation,
    Idiom,
    Preposition,
    Collocation,
}

/// Fields computed from the rest of the item.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DerivedFields {
    /// Inherent difficulty, 1..=10.
    pub complexity_score: u8,
    /// Learning depth, 0..=100.
    pub mastery_score: u8,
    /// Sorted, deduplicated.
    pub eligibility_tags: Vec<EligibilityTag>,
}

/// Primary classification used by statistics and the type filter.
///
/// Variants are declared in precedence order: an item belongs to the first
/// category whose predicate matches.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Category {
    Idiom,
    PhrasalVerb,
    Collocation,
    Phrase,
    Preposition,
    Vocabulary,
}

impl Category {
    /// All categories in precedence order.
    pub const ALL: [Self; 6] = [
        Self::Idiom,
        Self::PhrasalVerb,
        Self::Collocation,
        Self::Phrase,
        Self::Preposition,
        Self::Vocabulary,
    ];

    /// Primary category of an item.
    #[must_use]
    pub fn of(item: &Item) -> Self {
        let f = &item.flags;
        if f.is_idiom {
            Self::Idiom
        } else if f.is_phrasal_verb {
            Self::PhrasalVerb
        } else if f.is_collocation {
            Self::Collocation
        } else if f.is_standard_phrase {
            Self::Phrase
        } else if !item.prepositions.is_empty() {
            Self::Preposition
        } else {
            Self::Vocabulary
        }
    }
}

/// A vocabulary entry.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub id: ItemId,
    pub owner_id: String,
    pub text: String,
    #[serde(default)]
    pub meaning: String,
    #[serde(default)]
    pub examples: Vec<String>,
    #[serde(default)]
    pub prepositions: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub register: Option<Register>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default)]
    pub quality: Quality,
    #[serde(default)]
    pub flags: ItemFlags,
    #[serde(default)]
    pub schedule: Schedule,
    #[serde(default)]
    pub derived: DerivedFields,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub updated_at: DateTime<Utc>,
}

impl Item {
    /// Creates a RAW item owned by `owner_id`.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::EmptyOwner` or `ValidationError::EmptyText`
    /// when either argument is blank.
    pub fn new(
        owner_id: impl Into<String>,
        text: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Result<Self, ValidationError> {
        let owner_id = owner_id.into();
        let text = text.into();
        if owner_id.trim().is_empty() {
            return Err(ValidationError::EmptyOwner);
        }
        if text.trim().is_empty() {
            return Err(ValidationError::EmptyText);
        }

        Ok(Self {
            id: ItemId::new(),
            owner_id,
            text: text.trim().to_string(),
            meaning: String::new(),
            examples: Vec::new(),
            prepositions: Vec::new(),
            register: None,
            source: None,
            quality: Quality::Raw,
            flags: ItemFlags::default(),
            schedule: Schedule::default(),
            derived: DerivedFields::default(),
            created_at,
            updated_at: created_at,
        })
    }

    /// Case-insensitive lookup key for the item's text.
    #[must_use]
    pub fn text_key(&self) -> String {
        normalize_text(&self.text)
    }

    /// Soft-archived items.
    #[must_use]
    pub const fn is_archived(&self) -> bool {
        self.flags.is_passive
    }

    /// Reviewed at least once.
    #[must_use]
    pub const fn is_learned(&self) -> bool {
        self.schedule.last_review.is_some()
    }

    fn has_elapsed(&self, now: DateTime<Utc>) -> bool {
        self.schedule.last_review.is_some()
            && self.schedule.next_review.is_some_and(|next| next <= now)
    }

    /// Due predicate used by statistics: reviewed, next review passed, not FAILED.
    #[must_use]
    pub fn is_due_for_stats(&self, now: DateTime<Utc>) -> bool {
        self.has_elapsed(now) && self.quality != Quality::Failed
    }

    /// Stricter due predicate used by the review queue: also requires VERIFIED.
    #[must_use]
    pub fn is_due_for_review_queue(&self, now: DateTime<Utc>) -> bool {
        self.has_elapsed(now) && self.quality == Quality::Verified
    }

    /// Never reviewed and ready for scheduling.
    #[must_use]
    pub fn is_new(&self) -> bool {
        self.schedule.last_review.is_none() && self.quality == Quality::Verified
    }
}

/// Normalizes text for case-insensitive comparisons and index keys.
#[must_use]
pub fn normalize_text(s: &str) -> String {
    s.trim().to_lowercase()
}
