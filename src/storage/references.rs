// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Reference normalizer.
//!
//! A semantic reference is persisted twice:
//!
//! - a JSON **snapshot** row, read on the fast path;
//! - normalized **header + key rows**, one header per nesting depth
//!   (depth 0 is the reference itself, depth 1 its `referredSemanticId`, ...).
//!
//! Reads prefer the snapshot. Rows that have headers but no snapshot (legacy
//! data, partial imports) are resolved in bulk through
//! [`ReferenceStore::read_many`], one query per table, never one per row.

use async_trait::async_trait;
use sqlx::AnyConnection;
use std::collections::{BTreeMap, HashMap};

use super::rows::{
    bind_value, bulk_insert, get_required_i64, get_required_text, placeholders, SqlValue,
    INSERT_CHUNK_SIZE,
};
use crate::error::StoreError;
use crate::model::{Key, KeyType, Reference, ReferenceType};

/// Table set holding one kind of owned reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReferenceTables {
    pub header: &'static str,
    pub keys: &'static str,
    pub snapshot: &'static str,
}

/// Semantic ids of submodel elements.
pub const ELEMENT_SEMANTIC_ID: ReferenceTables = ReferenceTables {
    header: "submodel_element_semantic_id_reference",
    keys: "submodel_element_semantic_id_reference_key",
    snapshot: "submodel_element_semantic_id_payload",
};

/// Semantic ids of submodels.
pub const SUBMODEL_SEMANTIC_ID: ReferenceTables = ReferenceTables {
    header: "submodel_semantic_id_reference",
    keys: "submodel_semantic_id_reference_key",
    snapshot: "submodel_semantic_id_payload",
};

/// One nesting level of a reference chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceLevel {
    pub depth: i64,
    pub reference_type: ReferenceType,
    pub keys: Vec<Key>,
}

/// Flatten a reference and its referred chain into levels.
pub fn normalize(reference: &Reference) -> Vec<ReferenceLevel> {
    let mut levels = Vec::new();
    let mut current = Some(reference);
    let mut depth = 0;
    while let Some(r) = current {
        levels.push(ReferenceLevel {
            depth,
            reference_type: r.reference_type,
            keys: r.keys.clone(),
        });
        current = r.referred_semantic_id.as_deref();
        depth += 1;
    }
    levels
}

/// Rebuild a reference from levels. Levels must be contiguous from depth 0.
pub fn denormalize(mut levels: Vec<ReferenceLevel>) -> Option<Reference> {
    levels.sort_by_key(|l| l.depth);
    let mut result: Option<Reference> = None;
    for level in levels.into_iter().rev() {
        let mut r = Reference {
            reference_type: level.reference_type,
            referred_semantic_id: None,
            keys: level.keys,
        };
        r.referred_semantic_id = result.map(Box::new);
        result = Some(r);
    }
    result
}

/// Rows to write for a batch of owned references, grouped per table.
#[derive(Debug, Default)]
pub struct ReferenceRows {
    pub headers: Vec<Vec<SqlValue>>,
    pub keys: Vec<Vec<SqlValue>>,
    pub snapshots: Vec<Vec<SqlValue>>,
}

impl ReferenceRows {
    pub fn push(&mut self, owner_id: i64, reference: &Reference) -> Result<(), StoreError> {
        for level in normalize(reference) {
            self.headers.push(vec![
                SqlValue::int(owner_id),
                SqlValue::int(level.depth),
                SqlValue::text(level.reference_type.as_str()),
            ]);
            for (position, key) in level.keys.iter().enumerate() {
                self.keys.push(vec![
                    SqlValue::int(owner_id),
                    SqlValue::int(level.depth),
                    SqlValue::int(position as i64),
                    SqlValue::text(key.key_type.as_str()),
                    SqlValue::text(key.value.clone()),
                ]);
            }
        }
        let snapshot = serde_json::to_string(reference)
            .map_err(|e| StoreError::internal("serialize reference snapshot", e))?;
        self.snapshots.push(vec![SqlValue::int(owner_id), SqlValue::text(snapshot)]);
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty() && self.snapshots.is_empty()
    }
}

/// Batched fallback lookup of normalized references.
#[async_trait]
pub trait ReferenceStore: Send + Sync {
    /// Resolve the references owned by `owner_ids` from their key rows.
    /// Owners without header rows are absent from the result.
    async fn read_many(
        &self,
        conn: &mut AnyConnection,
        owner_ids: &[i64],
    ) -> Result<HashMap<i64, Reference>, StoreError>;
}

/// SQL implementation over one [`ReferenceTables`] set.
#[derive(Debug, Clone, Copy)]
pub struct SqlReferenceStore {
    tables: ReferenceTables,
}

impl SqlReferenceStore {
    pub const fn new(tables: ReferenceTables) -> Self {
        Self { tables }
    }

    pub fn tables(&self) -> &ReferenceTables {
        &self.tables
    }

    /// Rows for a single owner's reference.
    pub fn rows(&self, owner_id: i64, reference: &Reference) -> Result<ReferenceRows, StoreError> {
        let mut rows = ReferenceRows::default();
        rows.push(owner_id, reference)?;
        Ok(rows)
    }

    /// Bulk-write headers, keys and snapshots, one statement set per table.
    pub async fn write_many(&self, conn: &mut AnyConnection, rows: ReferenceRows) -> Result<(), StoreError> {
        bulk_insert(conn, self.tables.header, &["owner_id", "depth", "reference_type"], rows.headers).await?;
        bulk_insert(
            conn,
            self.tables.keys,
            &["owner_id", "depth", "position", "key_type", "key_value"],
            rows.keys,
        )
        .await?;
        bulk_insert(conn, self.tables.snapshot, &["owner_id", "snapshot"], rows.snapshots).await?;
        Ok(())
    }

    /// Remove every representation of the owner's reference.
    pub async fn delete(&self, conn: &mut AnyConnection, owner_id: i64) -> Result<(), StoreError> {
        for table in [self.tables.keys, self.tables.header, self.tables.snapshot] {
            sqlx::query(&format!("DELETE FROM {} WHERE owner_id = ?", table))
                .bind(owner_id)
                .execute(&mut *conn)
                .await
                .map_err(|e| StoreError::internal(&format!("delete from {}", table), e))?;
        }
        Ok(())
    }

    /// Replace the owner's reference; `None` just deletes it.
    pub async fn replace(
        &self,
        conn: &mut AnyConnection,
        owner_id: i64,
        reference: Option<&Reference>,
    ) -> Result<(), StoreError> {
        self.delete(conn, owner_id).await?;
        if let Some(reference) = reference {
            let rows = self.rows(owner_id, reference)?;
            self.write_many(conn, rows).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl ReferenceStore for SqlReferenceStore {
    async fn read_many(
        &self,
        conn: &mut AnyConnection,
        owner_ids: &[i64],
    ) -> Result<HashMap<i64, Reference>, StoreError> {
        // (owner, depth) -> level
        let mut levels: BTreeMap<(i64, i64), ReferenceLevel> = BTreeMap::new();

        for chunk in owner_ids.chunks(INSERT_CHUNK_SIZE) {
            let sql = format!(
                "SELECT owner_id, depth, reference_type FROM {} WHERE owner_id IN ({})",
                self.tables.header,
                placeholders(chunk.len())
            );
            let mut query = sqlx::query(&sql);
            for id in chunk {
                query = bind_value(query, SqlValue::int(*id));
            }
            let rows = query
                .fetch_all(&mut *conn)
                .await
                .map_err(|e| StoreError::internal("read reference headers", e))?;
            for row in rows {
                let owner = get_required_i64(&row, "owner_id")?;
                let depth = get_required_i64(&row, "depth")?;
                let type_text = get_required_text(&row, "reference_type")?;
                let reference_type = type_text
                    .parse::<ReferenceType>()
                    .map_err(|e| StoreError::internal("read reference headers", e))?;
                levels.insert((owner, depth), ReferenceLevel { depth, reference_type, keys: Vec::new() });
            }

            let sql = format!(
                "SELECT owner_id, depth, position, key_type, key_value FROM {} WHERE owner_id IN ({}) \
                 ORDER BY owner_id, depth, position",
                self.tables.keys,
                placeholders(chunk.len())
            );
            let mut query = sqlx::query(&sql);
            for id in chunk {
                query = bind_value(query, SqlValue::int(*id));
            }
            let rows = query
                .fetch_all(&mut *conn)
                .await
                .map_err(|e| StoreError::internal("read reference keys", e))?;
            for row in rows {
                let owner = get_required_i64(&row, "owner_id")?;
                let depth = get_required_i64(&row, "depth")?;
                let key_type = get_required_text(&row, "key_type")?
                    .parse::<KeyType>()
                    .map_err(|e| StoreError::internal("read reference keys", e))?;
                let value = get_required_text(&row, "key_value")?;
                if let Some(level) = levels.get_mut(&(owner, depth)) {
                    level.keys.push(Key::new(key_type, value));
                }
            }
        }

        let mut grouped: HashMap<i64, Vec<ReferenceLevel>> = HashMap::new();
        for ((owner, _), level) in levels {
            grouped.entry(owner).or_default().push(level);
        }
        Ok(grouped
            .into_iter()
            .filter_map(|(owner, levels)| denormalize(levels).map(|r| (owner, r)))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nested() -> Reference {
        Reference::model(vec![
            Key::new(KeyType::Submodel, "urn:sm"),
            Key::new(KeyType::Property, "temp"),
        ])
        .with_referred(Reference::global("urn:unit").with_referred(Reference::global("urn:deeper")))
    }

    #[test]
    fn test_normalize_levels() {
        let levels = normalize(&nested());
        assert_eq!(levels.len(), 3);
        assert_eq!(levels[0].depth, 0);
        assert_eq!(levels[0].keys.len(), 2);
        assert_eq!(levels[2].keys[0].value, "urn:deeper");
    }

    #[test]
    fn test_denormalize_inverts_normalize() {
        let r = nested();
        assert_eq!(denormalize(normalize(&r)), Some(r));

        // Order of levels does not matter
        let mut levels = normalize(&nested());
        levels.reverse();
        assert_eq!(denormalize(levels), Some(nested()));

        assert_eq!(denormalize(Vec::new()), None);
    }

    #[test]
    fn test_reference_rows() {
        let mut rows = ReferenceRows::default();
        assert!(rows.is_empty());
        rows.push(7, &nested()).unwrap();
        assert_eq!(rows.headers.len(), 3);
        assert_eq!(rows.keys.len(), 4);
        assert_eq!(rows.snapshots.len(), 1);
        assert_eq!(rows.snapshots[0][0], SqlValue::int(7));
    }
}
