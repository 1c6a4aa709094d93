// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Keyset pagination: opaque cursors and limit handling.
//!
//! Pages are ordered by `(key, id)` where the key is the idShortPath for
//! elements and the identifier for submodels. The cursor is the base64url
//! form of `key|id` for the last row returned.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::Serialize;

use crate::error::StoreError;
use crate::storage::rows::SqlValue;

/// One page of results plus the cursor for the next, if any.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,
}

impl<T> Page<T> {
    pub fn empty() -> Self {
        Self { items: Vec::new(), cursor: None }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page { items: self.items.into_iter().map(f).collect(), cursor: self.cursor }
    }
}

/// Decoded position of a cursor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cursor {
    pub key: String,
    /// Tie-breaker; a cursor without one resumes strictly after `key`.
    pub id: Option<i64>,
}

impl Cursor {
    pub fn new(key: impl Into<String>, id: i64) -> Self {
        Self { key: key.into(), id: Some(id) }
    }

    pub fn encode(&self) -> String {
        let raw = match self.id {
            Some(id) => format!("{}|{}", self.key, id),
            None => self.key.clone(),
        };
        URL_SAFE_NO_PAD.encode(raw.as_bytes())
    }

    pub fn decode(token: &str) -> Result<Self, StoreError> {
        let bad = || StoreError::BadRequest("malformed cursor".into());
        let bytes = URL_SAFE_NO_PAD.decode(token.trim_end_matches('=').as_bytes()).map_err(|_| bad())?;
        let raw = String::from_utf8(bytes).map_err(|_| bad())?;
        if raw.is_empty() {
            return Err(bad());
        }
        match raw.rsplit_once('|') {
            Some((key, id)) => {
                let id = id.parse::<i64>().map_err(|_| bad())?;
                if key.is_empty() {
                    return Err(bad());
                }
                Ok(Self { key: key.to_string(), id: Some(id) })
            }
            None => Ok(Self { key: raw, id: None }),
        }
    }

    /// `AND (key > ? OR (key = ? AND id > ?))`, or `AND key > ?` without an id.
    pub fn filter(&self, key_column: &str, id_column: &str) -> (String, Vec<SqlValue>) {
        match self.id {
            Some(id) => (
                format!(
                    " AND ({k} > ? OR ({k} = ? AND {i} > ?))",
                    k = key_column,
                    i = id_column
                ),
                vec![SqlValue::text(self.key.clone()), SqlValue::text(self.key.clone()), SqlValue::int(id)],
            ),
            None => (format!(" AND {} > ?", key_column), vec![SqlValue::text(self.key.clone())]),
        }
    }
}

/// How many rows a request wants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageSize {
    Empty,
    All,
    Limit(i64),
}

impl PageSize {
    /// `0` is an empty page, `-1` everything, anything below is BadRequest.
    pub fn from_limit(limit: i64) -> Result<Self, StoreError> {
        match limit {
            0 => Ok(PageSize::Empty),
            -1 => Ok(PageSize::All),
            n if n < -1 => Err(StoreError::BadRequest(format!("limit must be -1 or greater, got {}", n))),
            n => Ok(PageSize::Limit(n)),
        }
    }

    /// `LIMIT` clause fetching one extra row to detect a further page.
    pub fn limit_clause(&self) -> String {
        match self {
            PageSize::Limit(n) => format!(" LIMIT {}", n.saturating_add(1)),
            PageSize::All | PageSize::Empty => String::new(),
        }
    }

    /// Drop the look-ahead row and derive the next cursor from the last kept row.
    pub fn split<T>(&self, mut rows: Vec<T>, cursor_of: impl Fn(&T) -> Cursor) -> (Vec<T>, Option<String>) {
        match self {
            PageSize::Limit(n) if rows.len() as i64 > *n => {
                rows.truncate(*n as usize);
                let next = rows.last().map(|r| cursor_of(r).encode());
                (rows, next)
            }
            PageSize::Empty => (Vec::new(), None),
            _ => (rows, None),
        }
    }
}
