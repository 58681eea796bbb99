//! Sorting, page requests and computed pages
//!
//! A [`Pageable`] names a zero-based page, a positive page size and an
//! ordered list of [`Sort`] keys. Repositories answer it with a [`Page`],
//! whose navigation flags are derived from the page request and the total
//! number of matching elements.
//!
//! # Example
//!
//! ```rust
//! use dialog_repository::repository::{Pageable, Sort};
//!
//! let pageable = Pageable::new(0, 20, vec![Sort::desc("date"), Sort::asc("_id")]).unwrap();
//! assert_eq!(pageable.offset(), 0);
//!
//! let next = pageable.next();
//! assert_eq!(next.page_number(), 1);
//! assert_eq!(next.offset(), 20);
//! assert_eq!(next.previous_or_first(), pageable);
//! ```

use std::fmt;
use std::num::NonZeroU64;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::store::Document;

/// Direction for ordering results
///
/// # Example
///
/// ```rust
/// use dialog_repository::repository::SortDirection;
///
/// assert_eq!(format!("{}", SortDirection::Asc), "asc");
/// assert_eq!(format!("{}", SortDirection::Desc), "desc");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    /// Sort in ascending order (A-Z, 0-9)
    #[default]
    #[serde(alias = "ASC")]
    Asc,
    /// Sort in descending order (Z-A, 9-0)
    #[serde(alias = "DESC")]
    Desc,
}

impl SortDirection {
    /// Store order marker: `1` ascending, `-1` descending
    pub const fn order(self) -> i64 {
        match self {
            Self::Asc => 1,
            Self::Desc => -1,
        }
    }
}

impl fmt::Display for SortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Asc => write!(f, "asc"),
            Self::Desc => write!(f, "desc"),
        }
    }
}

/// One sort key
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Sort {
    /// Field path to order by
    pub name: String,
    /// Ordering direction
    #[serde(default)]
    pub direction: SortDirection,
}

impl Sort {
    /// Create a sort key
    pub fn new(name: impl Into<String>, direction: SortDirection) -> Self {
        Self {
            name: name.into(),
            direction,
        }
    }

    /// Ascending sort on `name`
    pub fn asc(name: impl Into<String>) -> Self {
        Self::new(name, SortDirection::Asc)
    }

    /// Descending sort on `name`
    pub fn desc(name: impl Into<String>) -> Self {
        Self::new(name, SortDirection::Desc)
    }
}

/// Translate sort keys into a store sort specification
///
/// Earlier keys take priority. An empty list means no ordering is requested
/// and yields `None`.
///
/// # Example
///
/// ```rust
/// use dialog_repository::repository::{sort_document, Sort};
///
/// let spec = sort_document(&[Sort::desc("date"), Sort::asc("_id")]).unwrap();
/// let keys: Vec<_> = spec.keys().cloned().collect();
/// assert_eq!(keys, vec!["date", "_id"]);
/// assert_eq!(spec["date"], -1);
///
/// assert!(sort_document(&[]).is_none());
/// ```
pub fn sort_document(sorts: &[Sort]) -> Option<Document> {
    if sorts.is_empty() {
        return None;
    }
    Some(
        sorts
            .iter()
            .map(|sort| (sort.name.clone(), Value::from(sort.direction.order())))
            .collect(),
    )
}

/// A page size of zero was requested
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("page size must be greater than zero")]
pub struct ZeroPageSize;

/// A request for one page of results
///
/// Immutable: navigation returns new values with the same size and sorts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pageable {
    page_number: u64,
    page_size: NonZeroU64,
    #[serde(default)]
    sorts: Vec<Sort>,
}

impl Pageable {
    /// Create a page request, rejecting a zero page size
    pub fn new(page_number: u64, page_size: u64, sorts: Vec<Sort>) -> Result<Self, ZeroPageSize> {
        let page_size = NonZeroU64::new(page_size).ok_or(ZeroPageSize)?;
        Ok(Self {
            page_number,
            page_size,
            sorts,
        })
    }

    /// Unsorted page request
    pub const fn of(page_number: u64, page_size: NonZeroU64) -> Self {
        Self {
            page_number,
            page_size,
            sorts: Vec::new(),
        }
    }

    /// Replace the sort keys
    #[must_use]
    pub fn with_sorts(mut self, sorts: Vec<Sort>) -> Self {
        self.sorts = sorts;
        self
    }

    /// Zero-based page index
    pub const fn page_number(&self) -> u64 {
        self.page_number
    }

    /// Elements per page
    pub const fn page_size(&self) -> u64 {
        self.page_size.get()
    }

    /// Sort keys, highest priority first
    pub fn sorts(&self) -> &[Sort] {
        &self.sorts
    }

    /// Number of elements before this page
    pub const fn offset(&self) -> u64 {
        self.page_number.saturating_mul(self.page_size.get())
    }

    /// The previous page, or this page when already on the first
    pub fn previous_or_first(&self) -> Self {
        Self {
            page_number: self.page_number.saturating_sub(1),
            page_size: self.page_size,
            sorts: self.sorts.clone(),
        }
    }

    /// The following page
    pub fn next(&self) -> Self {
        Self {
            page_number: self.page_number.saturating_add(1),
            page_size: self.page_size,
            sorts: self.sorts.clone(),
        }
    }
}

/// One page of results with derived navigation flags
///
/// Built by repositories only. For every page:
/// `total_pages = ceil(total_elements / page_size)`,
/// `first = page_number == 0`,
/// `last = page_number == max(total_pages - 1, 0)`,
/// `has_previous = page_number > 0` and
/// `has_next = total_pages > page_number + 1`.
/// A page number past the end yields no elements and is not clamped, so
/// `last` may be `false` there.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    elements: Vec<T>,
    page_number: u64,
    page_size: u64,
    sorts: Vec<Sort>,
    total_elements: u64,
    total_pages: u64,
    first: bool,
    last: bool,
    has_previous: bool,
    has_next: bool,
}

impl<T> Page<T> {
    pub(crate) fn new(mut elements: Vec<T>, total_elements: u64, pageable: &Pageable) -> Self {
        let page_number = pageable.page_number();
        let page_size = pageable.page_size();
        let total_pages = total_elements.div_ceil(page_size);

        if total_pages == 0 {
            elements.clear();
        }
        elements.truncate(usize::try_from(page_size).unwrap_or(usize::MAX));

        Self {
            elements,
            page_number,
            page_size,
            sorts: pageable.sorts().to_vec(),
            total_elements,
            total_pages,
            first: page_number == 0,
            last: page_number == total_pages.saturating_sub(1),
            has_previous: page_number > 0,
            has_next: total_pages > page_number.saturating_add(1),
        }
    }

    pub(crate) fn empty(pageable: &Pageable) -> Self {
        Self::new(Vec::new(), 0, pageable)
    }

    /// Elements on this page
    pub fn elements(&self) -> &[T] {
        &self.elements
    }

    /// Take ownership of the elements
    pub fn into_elements(self) -> Vec<T> {
        self.elements
    }

    pub fn page_number(&self) -> u64 {
        self.page_number
    }

    pub fn page_size(&self) -> u64 {
        self.page_size
    }

    pub fn sorts(&self) -> &[Sort] {
        &self.sorts
    }

    pub fn total_elements(&self) -> u64 {
        self.total_elements
    }

    pub fn total_pages(&self) -> u64 {
        self.total_pages
    }

    pub fn is_first(&self) -> bool {
        self.first
    }

    pub fn is_last(&self) -> bool {
        self.last
    }

    pub fn has_previous(&self) -> bool {
        self.has_previous
    }

    pub fn has_next(&self) -> bool {
        self.has_next
    }

    /// Number of elements on this page
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// The request that produced this page
    pub fn pageable(&self) -> Pageable {
        Pageable {
            page_number: self.page_number,
            page_size: NonZeroU64::new(self.page_size).unwrap_or(NonZeroU64::MIN),
            sorts: self.sorts.clone(),
        }
    }

    /// Convert the elements, keeping the page arithmetic
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            elements: self.elements.into_iter().map(f).collect(),
            page_number: self.page_number,
            page_size: self.page_size,
            sorts: self.sorts,
            total_elements: self.total_elements,
            total_pages: self.total_pages,
            first: self.first,
            last: self.last,
            has_previous: self.has_previous,
            has_next: self.has_next,
        }
    }

    /// Fallible element conversion
    pub fn try_map<U, E>(self, f: impl FnMut(T) -> Result<U, E>) -> Result<Page<U>, E> {
        let elements = self.elements.into_iter().map(f).collect::<Result<Vec<_>, E>>()?;
        Ok(Page {
            elements,
            page_number: self.page_number,
            page_size: self.page_size,
            sorts: self.sorts,
            total_elements: self.total_elements,
            total_pages: self.total_pages,
            first: self.first,
            last: self.last,
            has_previous: self.has_previous,
            has_next: self.has_next,
        })
    }
}
