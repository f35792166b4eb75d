//! Index query modes and pagination windows.

use crate::backend::encoding::encode_index_value;
use crate::backend::table::{IndexRange, ScanWindow};
use crate::error::{Error, Result};
use crate::types::{Page, Record};
use serde_json::Value;
use std::ops::Bound;

/// Which index values a query selects.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryMode {
    /// Rows whose index value equals the value.
    Only(Value),
    /// Rows above the value; the flag makes the bound inclusive.
    Above(Value, bool),
    /// Rows below the value; the flag makes the bound inclusive.
    Below(Value, bool),
    Range {
        lower: Value,
        upper: Value,
        lower_inclusive: bool,
        upper_inclusive: bool,
    },
}

impl QueryMode {
    pub(crate) fn range(&self) -> Result<IndexRange> {
        Ok(match self {
            Self::Only(value) => IndexRange::only(encode(value)?),
            Self::Above(value, inclusive) => {
                IndexRange::between(bound(value, *inclusive)?, Bound::Unbounded)
            },
            Self::Below(value, inclusive) => {
                IndexRange::between(Bound::Unbounded, bound(value, *inclusive)?)
            },
            Self::Range {
                lower,
                upper,
                lower_inclusive,
                upper_inclusive,
            } => IndexRange::between(bound(lower, *lower_inclusive)?, bound(upper, *upper_inclusive)?),
        })
    }
}

fn encode(value: &Value) -> Result<Vec<u8>> {
    encode_index_value(value)
        .ok_or_else(|| Error::InvalidKey(format!("{value} is not a valid index value")))
}

fn bound(value: &Value, inclusive: bool) -> Result<Bound<Vec<u8>>> {
    let encoded = encode(value)?;
    Ok(if inclusive {
        Bound::Included(encoded)
    } else {
        Bound::Excluded(encoded)
    })
}

/// 1-indexed page of an ordered read.
///
/// The window covers rows `[(number-1)*sz + offset, number*sz + offset)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub number: u64,
    /// Rows per page; `None` uses the store's page size.
    pub sz: Option<u64>,
    pub offset: u64,
}

impl PageRequest {
    pub const fn new(number: u64) -> Self {
        Self {
            number,
            sz: None,
            offset: 0,
        }
    }

    #[must_use]
    pub const fn sz(mut self, sz: u64) -> Self {
        self.sz = Some(sz);
        self
    }

    #[must_use]
    pub const fn offset(mut self, offset: u64) -> Self {
        self.offset = offset;
        self
    }

    pub(crate) fn window(&self, default_sz: u64) -> Result<ScanWindow> {
        if self.number == 0 {
            return Err(Error::InvalidPage(self.number));
        }
        let sz = self.sz.filter(|&sz| sz > 0).unwrap_or(default_sz).max(1);
        let skip = (self.number - 1).saturating_mul(sz).saturating_add(self.offset);
        Ok(ScanWindow {
            skip: usize::try_from(skip).unwrap_or(usize::MAX),
            take: Some(usize::try_from(sz).unwrap_or(usize::MAX)),
        })
    }
}

/// Options for [`Store::index`](super::Store::index).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndexQuery {
    /// `None` selects every row in the index.
    pub mode: Option<QueryMode>,
    pub reverse: bool,
    pub page: Option<PageRequest>,
}

impl IndexQuery {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn only(value: impl Into<Value>) -> Self {
        Self::mode(QueryMode::Only(value.into()))
    }

    pub fn above(value: impl Into<Value>, inclusive: bool) -> Self {
        Self::mode(QueryMode::Above(value.into(), inclusive))
    }

    pub fn below(value: impl Into<Value>, inclusive: bool) -> Self {
        Self::mode(QueryMode::Below(value.into(), inclusive))
    }

    /// Range with both bounds exclusive; use [`QueryMode::Range`] directly
    /// for inclusive bounds.
    pub fn between(lower: impl Into<Value>, upper: impl Into<Value>) -> Self {
        Self::mode(QueryMode::Range {
            lower: lower.into(),
            upper: upper.into(),
            lower_inclusive: false,
            upper_inclusive: false,
        })
    }

    pub fn mode(mode: QueryMode) -> Self {
        Self {
            mode: Some(mode),
            ..Self::default()
        }
    }

    #[must_use]
    pub const fn reverse(mut self, reverse: bool) -> Self {
        self.reverse = reverse;
        self
    }

    #[must_use]
    pub const fn page(mut self, page: PageRequest) -> Self {
        self.page = Some(page);
        self
    }
}

/// Result of an index query: every matched row, or one page of them.
#[derive(Debug, Clone, PartialEq)]
pub enum IndexResult {
    Rows(Vec<Record>),
    Page(Page),
}

impl IndexResult {
    /// The returned rows, whichever shape the result has.
    pub fn records(&self) -> &[Record] {
        match self {
            Self::Rows(records) => records,
            Self::Page(page) => &page.items,
        }
    }

    pub fn into_records(self) -> Vec<Record> {
        match self {
            Self::Rows(records) => records,
            Self::Page(page) => page.items,
        }
    }

    /// Values of the returned rows, in order.
    pub fn values(&self) -> Vec<Value> {
        self.records().iter().map(|record| record.value.clone()).collect()
    }
}

/// Options for [`Store::page`](super::Store::page).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageOptions {
    pub reverse: bool,
    /// Rows per page; `None` uses the store's page size.
    pub sz: Option<u64>,
    pub offset: u64,
}

impl PageOptions {
    pub(crate) const fn request(self, number: u64) -> PageRequest {
        PageRequest {
            number,
            sz: self.sz,
            offset: self.offset,
        }
    }
}
