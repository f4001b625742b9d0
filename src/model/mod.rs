//! Domain records exchanged over the REST surface and persisted by storage.
//!
//! Every inventory entity comes as three shapes:
//!
//! - `NewX`: the create payload, also embedded (flattened) in the record
//! - `X`: the persisted record with its id and server-managed columns
//! - `XPatch`: the partial-update payload where `None` keeps the stored value

use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

pub mod heartbeats;
pub mod monitors;
pub mod security;
pub mod status_page;
pub mod topology;

pub use heartbeats::*;
pub use monitors::*;
pub use security::*;
pub use status_page::*;
pub use topology::*;

use crate::search::{SearchDocument, SearchKind};

/// Row id of every persisted record
pub type Id = i64;

pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const MAX_PAGE_SIZE: u32 = 100;

/// A rejected payload, naming the offending field
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.field.is_empty() {
            write!(f, "{}", self.message)
        } else {
            write!(f, "{}: {}", self.field, self.message)
        }
    }
}

impl std::error::Error for ValidationError {}

pub type ValidationResult = Result<(), ValidationError>;

pub trait Validate {
    fn validate(&self) -> ValidationResult;
}

/// A create payload that can absorb a partial update
pub trait Patchable {
    type Patch: Validate + DeserializeOwned + Send + 'static;

    fn apply(&mut self, patch: Self::Patch);
}

/// An inventory record managed through the generic CRUD and search surface
pub trait Entity: Serialize + DeserializeOwned + Clone + Send + Sync + Unpin + 'static {
    type Fields: Validate + Patchable + Serialize + DeserializeOwned + Clone + Send + Sync + 'static;

    /// Name written to the audit trail
    const NAME: &'static str;

    /// Index the record's document is written to, if any
    const SEARCH_KIND: Option<SearchKind> = None;

    fn id(&self) -> Id;

    fn fields(&self) -> &Self::Fields;

    fn fields_mut(&mut self) -> &mut Self::Fields;

    fn search_document(&self) -> Option<SearchDocument> {
        None
    }

    fn apply(&mut self, patch: <Self::Fields as Patchable>::Patch) {
        self.fields_mut().apply(patch);
    }
}

/// PUT body: the create payload plus an optional id that must match the path
#[derive(Debug, Clone, Deserialize)]
pub struct WithId<F> {
    pub id: Option<Id>,
    #[serde(flatten)]
    pub fields: F,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct PageRequest {
    #[serde(default)]
    pub page: u32,
    #[serde(default = "default_page_size")]
    pub size: u32,
}

fn default_page_size() -> u32 {
    DEFAULT_PAGE_SIZE
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 0,
            size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl PageRequest {
    pub fn new(page: u32, size: u32) -> Self {
        Self { page, size }.clamped()
    }

    pub fn clamped(self) -> Self {
        Self {
            page: self.page,
            size: self.size.clamp(1, MAX_PAGE_SIZE),
        }
    }

    pub fn limit(&self) -> i64 {
        i64::from(self.clamped().size)
    }

    pub fn offset(&self) -> i64 {
        i64::from(self.page) * self.limit()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub size: u32,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, total: u64, request: PageRequest) -> Self {
        let request = request.clamped();
        Self {
            items,
            total,
            page: request.page,
            size: request.size,
        }
    }

    pub fn empty(request: PageRequest) -> Self {
        Self::new(Vec::new(), 0, request)
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            page: self.page,
            size: self.size,
        }
    }
}

/// Copies every present patch value onto the target.
///
/// `required` fields are plain on the target, `optional` ones are `Option`.
macro_rules! apply_patch {
    ($target:expr, $patch:expr, required: [$($req:ident),* $(,)?], optional: [$($opt:ident),* $(,)?]) => {{
        let patch = $patch;
        $(
            if let Some(value) = patch.$req {
                $target.$req = value;
            }
        )*
        $(
            if let Some(value) = patch.$opt {
                $target.$opt = Some(value);
            }
        )*
    }};
}

pub(crate) use apply_patch;

pub(crate) mod check {
    //! Field checks shared by the `Validate` impls.

    use super::{ValidationError, ValidationResult};

    pub fn required(field: &str, value: &str, max: usize) -> ValidationResult {
        if value.trim().is_empty() {
            return Err(ValidationError::new(field, "must not be blank"));
        }
        max_len(field, value, max)
    }

    pub fn max_len(field: &str, value: &str, max: usize) -> ValidationResult {
        if value.chars().count() > max {
            return Err(ValidationError::new(
                field,
                format!("must be at most {max} characters"),
            ));
        }
        Ok(())
    }

    pub fn opt_len(field: &str, value: Option<&String>, max: usize) -> ValidationResult {
        value.map_or(Ok(()), |v| max_len(field, v, max))
    }

    pub fn opt_required(field: &str, value: Option<&String>, max: usize) -> ValidationResult {
        value.map_or(Ok(()), |v| required(field, v, max))
    }

    pub fn positive(field: &str, value: i32) -> ValidationResult {
        if value <= 0 {
            return Err(ValidationError::new(field, "must be greater than 0"));
        }
        Ok(())
    }

    pub fn opt_positive(field: &str, value: Option<i32>) -> ValidationResult {
        value.map_or(Ok(()), |v| positive(field, v))
    }

    pub fn non_negative(field: &str, value: i32) -> ValidationResult {
        if value < 0 {
            return Err(ValidationError::new(field, "must not be negative"));
        }
        Ok(())
    }

    pub fn opt_non_negative(field: &str, value: Option<i32>) -> ValidationResult {
        value.map_or(Ok(()), |v| non_negative(field, v))
    }

    pub fn percent(field: &str, value: f64) -> ValidationResult {
        if !(0.0..=100.0).contains(&value) {
            return Err(ValidationError::new(field, "must be between 0 and 100"));
        }
        Ok(())
    }

    pub fn opt_percent(field: &str, value: Option<f64>) -> ValidationResult {
        value.map_or(Ok(()), |v| percent(field, v))
    }

    pub fn opt_percent_i32(field: &str, value: Option<i32>) -> ValidationResult {
        value.map_or(Ok(()), |v| percent(field, f64::from(v)))
    }
}
