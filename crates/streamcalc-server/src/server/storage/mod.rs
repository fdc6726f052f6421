//! Blog persistence.
//!
//! The blog service talks to its storage through the [`BlogStore`] trait so the
//! backing store is chosen at construction. [`MemoryStore`] is the in-process
//! implementation the server ships with.

mod memory;

pub use memory::MemoryStore;

use core::fmt;
use core::str::FromStr;
use streamcalc_core::{Error, Result, proto::blog::Blog};

/// Number of hexadecimal characters in a rendered [`BlogId`].
pub const BLOG_ID_LEN: usize = 24;

/// A 96-bit record identifier rendered as 24 lowercase hex characters.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlogId(u128);

impl BlogId {
    /// Builds an id from its high 32 and low 64 bits.
    pub const fn from_parts(high: u32, low: u64) -> Self {
        Self(((high as u128) << 64) | low as u128)
    }
}

impl FromStr for BlogId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if s.len() != BLOG_ID_LEN || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(Error::invalid_argument(format!(
                "Cannot parse ID: {s:?} is not {BLOG_ID_LEN} hexadecimal characters"
            )));
        }
        u128::from_str_radix(s, 16)
            .map(Self)
            .map_err(|e| Error::invalid_argument(format!("Cannot parse ID: {e}")))
    }
}

impl fmt::Display for BlogId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:024x}", self.0)
    }
}

/// The editable part of a record.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BlogDraft {
    pub author_id: String,
    pub title: String,
    pub content: String,
}

/// A stored record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlogRecord {
    pub id: BlogId,
    pub author_id: String,
    pub title: String,
    pub content: String,
}

impl BlogRecord {
    pub fn new(id: BlogId, draft: BlogDraft) -> Self {
        Self {
            id,
            author_id: draft.author_id,
            title: draft.title,
            content: draft.content,
        }
    }
}

impl From<Blog> for BlogDraft {
    fn from(blog: Blog) -> Self {
        Self {
            author_id: blog.author_id,
            title: blog.title,
            content: blog.content,
        }
    }
}

impl From<BlogRecord> for Blog {
    fn from(record: BlogRecord) -> Self {
        Self {
            id: record.id.to_string(),
            author_id: record.author_id,
            title: record.title,
            content: record.content,
        }
    }
}

/// Storage collaborator for the blog service.
///
/// Implementations must be safe to share across calls. Absent records are
/// reported as [`Error::NotFound`]; any other failure of the backing store as
/// [`Error::Internal`].
pub trait BlogStore: Send + Sync + 'static {
    /// Stores a new record and returns it with its assigned id.
    fn insert(&self, draft: BlogDraft) -> impl Future<Output = Result<BlogRecord>> + Send;

    fn find_by_id(&self, id: BlogId) -> impl Future<Output = Result<BlogRecord>> + Send;

    /// Replaces every editable field of an existing record.
    fn update(&self, id: BlogId, draft: BlogDraft) -> impl Future<Output = Result<BlogRecord>> + Send;

    fn delete(&self, id: BlogId) -> impl Future<Output = Result<()>> + Send;

    /// Every record, in insertion order.
    fn list_all(&self) -> impl Future<Output = Result<Vec<BlogRecord>>> + Send;
}

pub(crate) fn not_found(id: BlogId) -> Error {
    Error::not_found(format!("Cannot find blog with specified ID: {id}"))
}
