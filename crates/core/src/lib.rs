//! `annotate-core`: domain building blocks shared by every other crate.
//!
//! Nothing in here knows about HTTP, cookies or storage.

pub mod error;
pub mod id;
pub mod pagination;
pub mod value_object;

pub use error::{DomainError, DomainResult};
pub use id::{AnnotatorId, JobId, ProjectId, UnitId};
pub use pagination::{CursorDirection, Page, PageRequest, PaginationCursor, paginate_by_id};
pub use value_object::Email;
