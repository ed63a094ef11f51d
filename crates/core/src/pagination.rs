//! Cursor pagination contract shared by every list endpoint.
//!
//! A cursor is an id boundary: `afterId` walks forward from an id, `beforeId`
//! walks backward to it. At most one boundary may be given per request.
//! Translating a request into a bounded range query is the store's job;
//! [`paginate_by_id`] does it for stores that keep rows in memory.

use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationErrors};

use crate::error::{DomainError, DomainResult};

pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const MAX_PAGE_SIZE: u32 = 100;

/// Position in an id-ordered result set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginationCursor {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before_id: Option<i64>,
}

/// Which way a validated cursor walks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorDirection {
    /// First page (`after: None`) or the page following `after`.
    Forward { after: Option<i64> },
    /// The page immediately preceding `before`.
    Backward { before: i64 },
}

impl PaginationCursor {
    pub const fn start() -> Self {
        Self {
            after_id: None,
            before_id: None,
        }
    }

    pub const fn after(id: i64) -> Self {
        Self {
            after_id: Some(id),
            before_id: None,
        }
    }

    pub const fn before(id: i64) -> Self {
        Self {
            after_id: None,
            before_id: Some(id),
        }
    }

    pub fn validate(&self) -> DomainResult<()> {
        if self.after_id.is_some() && self.before_id.is_some() {
            return Err(DomainError::validation(
                "at most one of afterId and beforeId may be given",
            ));
        }
        Ok(())
    }

    pub fn direction(&self) -> DomainResult<CursorDirection> {
        self.validate()?;
        Ok(match self.before_id {
            Some(before) => CursorDirection::Backward { before },
            None => CursorDirection::Forward {
                after: self.after_id,
            },
        })
    }
}

/// A validated list request: cursor, bounded page size and an optional
/// free-text filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    cursor: PaginationCursor,
    direction: CursorDirection,
    page_size: u32,
    query: Option<String>,
}

impl PageRequest {
    /// Build a request; `page_size: None` means [`DEFAULT_PAGE_SIZE`].
    pub fn new(cursor: PaginationCursor, page_size: Option<u32>) -> DomainResult<Self> {
        let direction = cursor.direction()?;
        let page_size = page_size.unwrap_or(DEFAULT_PAGE_SIZE);
        if page_size == 0 || page_size > MAX_PAGE_SIZE {
            return Err(DomainError::validation(format!(
                "pageSize must be between 1 and {MAX_PAGE_SIZE}"
            )));
        }

        Ok(Self {
            cursor,
            direction,
            page_size,
            query: None,
        })
    }

    /// Attach a filter. Blank strings mean "no filter".
    pub fn with_query(self, query: Option<String>) -> Self {
        let query = query
            .map(|q| q.trim().to_string())
            .filter(|q| !q.is_empty());
        Self { query, ..self }
    }

    pub fn cursor(&self) -> PaginationCursor {
        self.cursor
    }

    pub fn direction(&self) -> CursorDirection {
        self.direction
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }
}

/// One page of results plus whether more exist on either side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    pub has_next_page: bool,
    pub has_prev_page: bool,
}

impl<T: Validate> Validate for Page<T> {
    fn validate(&self) -> Result<(), ValidationErrors> {
        for item in &self.items {
            item.validate()?;
        }
        Ok(())
    }
}

/// Cut one page out of `items`, which must be sorted by ascending id.
///
/// Items inside the page stay in ascending order for both directions.
pub fn paginate_by_id<T, F>(items: &[T], id_of: F, request: &PageRequest) -> Page<T>
where
    T: Clone,
    F: Fn(&T) -> i64,
{
    let size = request.page_size() as usize;

    let (start, end) = match request.direction() {
        CursorDirection::Forward { after } => {
            let start = match after {
                Some(after) => items.partition_point(|item| id_of(item) <= after),
                None => 0,
            };
            (start, (start + size).min(items.len()))
        }
        CursorDirection::Backward { before } => {
            let end = items.partition_point(|item| id_of(item) < before);
            (end.saturating_sub(size), end)
        }
    };

    Page {
        items: items[start..end].to_vec(),
        has_next_page: end < items.len(),
        has_prev_page: start > 0,
    }
}
