//! Filtered, sorted, paginated views over the mirror.
//!
//! Evaluation order is fixed:
//! 1. group filter (duplicate detection narrows the candidate pool)
//! 2. predicate filter
//! 3. sort
//! 4. slice
//!
//! Predicates AND across axes and OR within the type axis. Archived items
//! only appear when the type axis asks for [`TypeFilter::Archived`].

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::error::ValidationError;
use crate::index::{IndexEngine, IndexKind};
use crate::item::{normalize_text, Category, Item, Quality, Register};
use crate::stats::LEARNING_THRESHOLD_DAYS;

/// Default page size.
pub const DEFAULT_PAGE_SIZE: usize = 20;

/// Multi-select type axis. Matches if any selected type matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeFilter {
    #[allow(missing_docs)]
    Idiom,
    #[allow(missing_docs)]
    PhrasalVerb,
    #[allow(missing_docs)]
    Collocation,
    #[allow(missing_docs)]
    Phrase,
    /// Items flagged for pronunciation focus.
    Pronunciation,
    /// Items carrying at least one preposition pattern.
    Preposition,
    /// Plain vocabulary: no more specific category applies.
    Vocabulary,
    /// Soft-archived items. Without this, archived items are hidden.
    Archived,
}

impl TypeFilter {
    fn matches(self, item: &Item) -> bool {
        let f = &item.flags;
        match self {
            Self::Idiom => f.is_idiom,
            Self::PhrasalVerb => f.is_phrasal_verb,
            Self::Collocation => f.is_collocation,
            Self::Phrase => f.is_standard_phrase,
            Self::Pronunciation => f.needs_pronunciation_focus,
            Self::Preposition => !item.prepositions.is_empty(),
            Self::Vocabulary => Category::of(item) == Category::Vocabulary,
            Self::Archived => item.is_archived(),
        }
    }
}

/// Learning status axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusFilter {
    /// Never reviewed and verified.
    New,
    /// Next review has passed.
    Due,
    /// Reviewed, interval within the learning threshold.
    Learning,
    /// Interval beyond the learning threshold.
    Mastered,
}

impl StatusFilter {
    fn matches(self, item: &Item, now: DateTime<Utc>) -> bool {
        let interval = item.schedule.interval_days;
        match self {
            Self::New => item.is_new(),
            Self::Due => item.is_due_for_stats(now),
            Self::Learning => item.is_learned() && interval <= LEARNING_THRESHOLD_DAYS,
            Self::Mastered => item.is_learned() && interval > LEARNING_THRESHOLD_DAYS,
        }
    }
}

/// Candidate-pool filters applied before the predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GroupFilter {
    /// Only items whose normalized text occurs more than once. Sorted by
    /// text, then oldest first.
    Duplicates,
}

/// Membership test against an inverted index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Membership {
    /// Referenced by at least one owning record.
    Member,
    /// Not referenced by any owning record.
    NotMember,
}

impl Membership {
    const fn accepts(self, is_member: bool) -> bool {
        match self {
            Self::Member => is_member,
            Self::NotMember => !is_member,
        }
    }
}

/// A list query. Pages are zero-based.
///
/// # Example
/// ```
/// use lexiq::query::{ItemQuery, TypeFilter};
///
/// let query = ItemQuery::new()
///     .page(1)
///     .page_size(10)
///     .text("run")
///     .with_type(TypeFilter::PhrasalVerb);
/// assert!(query.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemQuery {
    page: usize,
    page_size: usize,
    text: Option<String>,
    types: Vec<TypeFilter>,
    quality: Option<Quality>,
    status: Option<StatusFilter>,
    register: Option<Register>,
    source: Option<String>,
    group: Option<GroupFilter>,
    composition: Option<Membership>,
    collection: Option<Membership>,
}

impl Default for ItemQuery {
    fn default() -> Self {
        Self {
            page: 0,
            page_size: DEFAULT_PAGE_SIZE,
            text: None,
            types: Vec::new(),
            quality: None,
            status: None,
            register: None,
            source: None,
            group: None,
            composition: None,
            collection: None,
        }
    }
}

impl ItemQuery {
    /// First page, default size, no filters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[allow(missing_docs)]
    #[must_use]
    pub fn page(mut self, page: usize) -> Self {
        self.page = page;
        self
    }

    #[allow(missing_docs)]
    #[must_use]
    pub fn page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    /// Case-insensitive substring over text and meaning.
    #[must_use]
    pub fn text(mut self, text: impl Into<String>) -> Self {
        let text = normalize_text(&text.into());
        self.text = (!text.is_empty()).then_some(text);
        self
    }

    /// Adds a type to the OR-ed type axis.
    #[must_use]
    pub fn with_type(mut self, filter: TypeFilter) -> Self {
        if !self.types.contains(&filter) {
            self.types.push(filter);
        }
        self
    }

    #[allow(missing_docs)]
    #[must_use]
    pub fn quality(mut self, quality: Quality) -> Self {
        self.quality = Some(quality);
        self
    }

    #[allow(missing_docs)]
    #[must_use]
    pub fn status(mut self, status: StatusFilter) -> Self {
        self.status = Some(status);
        self
    }

    #[allow(missing_docs)]
    #[must_use]
    pub fn register(mut self, register: Register) -> Self {
        self.register = Some(register);
        self
    }

    /// Exact, case-insensitive source match.
    #[must_use]
    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(normalize_text(&source.into()));
        self
    }

    #[allow(missing_docs)]
    #[must_use]
    pub fn group(mut self, group: GroupFilter) -> Self {
        self.group = Some(group);
        self
    }

    /// Filter on composition membership.
    #[must_use]
    pub fn composition(mut self, membership: Membership) -> Self {
        self.composition = Some(membership);
        self
    }

    /// Filter on collection membership.
    #[must_use]
    pub fn collection(mut self, membership: Membership) -> Self {
        self.collection = Some(membership);
        self
    }

    /// Checks the page size.
    ///
    /// # Errors
    ///
    /// `InvalidPageSize` if the page size is zero.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.page_size == 0 {
            return Err(ValidationError::InvalidPageSize);
        }
        Ok(())
    }

    fn matches(&self, item: &Item, index: &IndexEngine, now: DateTime<Utc>) -> bool {
        let wants_archived = self.types.contains(&TypeFilter::Archived);
        if item.is_archived() && !wants_archived {
            return false;
        }
        if !self.types.is_empty() && !self.types.iter().any(|t| t.matches(item)) {
            return false;
        }

        if let Some(text) = &self.text {
            if !item.text_key().contains(text.as_str()) && !item.meaning.to_lowercase().contains(text.as_str()) {
                return false;
            }
        }
        if self.quality.is_some_and(|q| q != item.quality) {
            return false;
        }
        if self.status.is_some_and(|s| !s.matches(item, now)) {
            return false;
        }
        if self.register.is_some_and(|r| item.register != Some(r)) {
            return false;
        }
        if let Some(source) = &self.source {
            if item.source.as_deref().map(normalize_text).as_ref() != Some(source) {
                return false;
            }
        }
        if let Some(m) = self.composition {
            if !m.accepts(index.contains(IndexKind::Composed, &item.id.to_string())) {
                return false;
            }
        }
        if let Some(m) = self.collection {
            if !m.accepts(index.contains(IndexKind::CollectionText, &item.text)) {
                return false;
            }
        }
        true
    }
}

/// One page of results.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryPage {
    /// Items on this page.
    pub items: Vec<Item>,
    /// Matches after filtering, before pagination.
    pub total_count: usize,
}

fn duplicates<'a>(items: Vec<&'a Item>) -> Vec<&'a Item> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for item in &items {
        *counts.entry(item.text_key()).or_default() += 1;
    }
    items
        .into_iter()
        .filter(|i| counts.get(&i.text_key()).is_some_and(|&n| n > 1))
        .collect()
}

/// Runs `query` over `items`. The caller validates the query first.
pub fn execute<'a, I>(items: I, index: &IndexEngine, now: DateTime<Utc>, query: &ItemQuery) -> QueryPage
where
    I: IntoIterator<Item = &'a Item>,
{
    let mut pool: Vec<&Item> = items.into_iter().collect();
    if query.group == Some(GroupFilter::Duplicates) {
        pool = duplicates(pool);
    }

    pool.retain(|item| query.matches(item, index, now));

    match query.group {
        Some(GroupFilter::Duplicates) => {
            pool.sort_by_cached_key(|i| (i.text_key(), i.created_at, i.id));
        }
        None => pool.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id))),
    }

    let total_count = pool.len();
    let start = query.page.saturating_mul(query.page_size);
    let items = pool
        .into_iter()
        .skip(start)
        .take(query.page_size)
        .cloned()
        .collect();

    QueryPage { items, total_count }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn at(minutes: i64) -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap() + Duration::minutes(minutes)
    }

    fn item(text: &str, minutes: i64) -> Item {
        Item::new("u1", text, at(minutes)).unwrap()
    }

    #[test]
    fn test_newest_first_and_zero_based_pages() {
        let items: Vec<Item> = (0..25).map(|n| item(&format!("w{n:02}"), n)).collect();
        let page = execute(&items, &IndexEngine::new(), at(100), &ItemQuery::new().page(2).page_size(10));

        assert_eq!(page.total_count, 25);
        let texts: Vec<&str> = page.items.iter().map(|i| i.text.as_str()).collect();
        assert_eq!(texts, vec!["w04", "w03", "w02", "w01", "w00"]);
    }

    #[test]
    fn test_archived_hidden_unless_requested() {
        let mut archived = item("old", 0);
        archived.flags.is_passive = true;
        let items = vec![archived, item("new", 1)];
        let index = IndexEngine::new();

        assert_eq!(execute(&items, &index, at(5), &ItemQuery::new()).total_count, 1);
        let page = execute(&items, &index, at(5), &ItemQuery::new().with_type(TypeFilter::Archived));
        assert_eq!(page.total_count, 1);
        assert_eq!(page.items[0].text, "old");
    }

    #[test]
    fn test_type_axis_is_or_other_axes_and() {
        let mut idiom = item("break a leg", 0);
        idiom.flags.is_idiom = true;
        idiom.quality = Quality::Verified;
        let mut phrasal = item("give up", 1);
        phrasal.flags.is_phrasal_verb = true;
        let plain = item("gist", 2);
        let items = vec![idiom, phrasal, plain];
        let index = IndexEngine::new();

        let q = ItemQuery::new()
            .with_type(TypeFilter::Idiom)
            .with_type(TypeFilter::PhrasalVerb);
        assert_eq!(execute(&items, &index, at(5), &q).total_count, 2);

        let q = q.quality(Quality::Verified);
        let page = execute(&items, &index, at(5), &q);
        assert_eq!(page.total_count, 1);
        assert_eq!(page.items[0].text, "break a leg");

        let q = ItemQuery::new().with_type(TypeFilter::Vocabulary);
        assert_eq!(execute(&items, &index, at(5), &q).items[0].text, "gist");
    }

    #[test]
    fn test_duplicates_group_first_then_sort_alphabetically() {
        let items = vec![
            item("Gist", 5),
            item("unique", 4),
            item("gist", 1),
            item("apple", 3),
            item("Apple ", 2),
        ];
        let q = ItemQuery::new().group(GroupFilter::Duplicates);
        let page = execute(&items, &IndexEngine::new(), at(10), &q);

        let texts: Vec<&str> = page.items.iter().map(|i| i.text.as_str()).collect();
        assert_eq!(texts, vec!["Apple", "apple", "gist", "Gist"]);
    }

    #[test]
    fn test_membership_filters_use_indices() {
        let a = item("ubiquitous", 0);
        let b = item("gist", 1);
        let mut index = IndexEngine::new();
        index.rebuild(IndexKind::Composed, [a.id.to_string()], |_| true);
        index.rebuild(IndexKind::CollectionText, ["GIST"], |_| true);
        let items = vec![a, b];

        let composed = execute(&items, &index, at(5), &ItemQuery::new().composition(Membership::Member));
        assert_eq!(composed.items[0].text, "ubiquitous");

        let outside = execute(&items, &index, at(5), &ItemQuery::new().collection(Membership::NotMember));
        assert_eq!(outside.total_count, 1);
        assert_eq!(outside.items[0].text, "ubiquitous");
    }

    #[test]
    fn test_text_matches_meaning_too() {
        let mut a = item("gist", 0);
        a.meaning = "The essence of something".to_string();
        let items = vec![a, item("ubiquitous", 1)];
        let page = execute(&items, &IndexEngine::new(), at(5), &ItemQuery::new().text("ESSENCE"));
        assert_eq!(page.total_count, 1);
    }

    #[test]
    fn test_zero_page_size_is_rejected() {
        assert!(matches!(
            ItemQuery::new().page_size(0).validate(),
            Err(ValidationError::InvalidPageSize)
        ));
    }
}
