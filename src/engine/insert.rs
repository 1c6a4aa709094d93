// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Batch insertion of element subtrees.
//!
//! Insertion is split into a pure flatten pass and a fixed sequence of bulk
//! statements, so the number of round trips depends on the number of
//! chunks and tables, not on the number of elements.
//!
//! ```text
//!  elements ──flatten──► [PendingNode; n]   (BFS, paths, validation)
//!                              │
//!        1. base rows          │  INSERT ... (chunked), ids correlated by path
//!        2. back-patch         │  UPDATE ... SET parent/root = CASE id WHEN ...
//!        3. side rows          │  one bulk INSERT per side table
//!        4. payload rows       │  one row per element
//!        5. semantic ids       ▼  header, key and snapshot rows
//! ```

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

use sqlx::AnyConnection;
use tracing::debug;

use crate::error::StoreError;
use crate::handlers::base::{self, ELEMENT_COLUMNS, PAYLOAD_COLUMNS, PAYLOAD_TABLE};
use crate::handlers::HandlerRegistry;
use crate::model::{
    AasSubmodelElements, ChildAddressing, DataTypeDefXsd, ModelType, SubmodelElement,
};
use crate::path::{compute_path, validate_id_short};
use crate::storage::references::{ReferenceRows, SqlReferenceStore, ELEMENT_SEMANTIC_ID};
use crate::storage::rows::{
    bind_value, bulk_insert, get_required_i64, get_required_text, placeholders, row_placeholders,
    rows_per_statement, SqlValue, INSERT_CHUNK_SIZE,
};
use crate::storage::Dialect;

/// Item constraints of a SubmodelElementList.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListTyping {
    pub type_value: AasSubmodelElements,
    pub value_type: Option<DataTypeDefXsd>,
}

impl ListTyping {
    fn check(&self, element: &SubmodelElement, path: &str) -> Result<(), StoreError> {
        let model_type = element.model_type();
        if !self.type_value.admits(model_type) {
            return Err(StoreError::BadRequest(format!(
                "list item '{}' is a {} but the list holds {}",
                path, model_type, self.type_value
            )));
        }
        if let (Some(expected), Some(actual)) = (self.value_type, element.value_type()) {
            if expected != actual {
                return Err(StoreError::BadRequest(format!(
                    "list item '{}' has valueType {} but the list requires {}",
                    path, actual, expected
                )));
            }
        }
        Ok(())
    }

    /// Typing carried by a list element, `None` for other variants.
    pub fn of(element: &SubmodelElement) -> Option<Self> {
        match element {
            SubmodelElement::SubmodelElementList(l) => Some(Self {
                type_value: l.type_value_list_element,
                value_type: l.value_type_list_element,
            }),
            _ => None,
        }
    }
}

/// Where the inserted elements attach.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InsertContext {
    /// Existing parent row, `None` for top-level inserts.
    pub parent_id: Option<i64>,
    /// Path of that parent, empty for top-level inserts.
    pub parent_path: String,
    /// Root link of the existing tree being appended to.
    pub root_id: Option<i64>,
    /// Whether the parent addresses its children by index.
    pub positional: bool,
    /// Position of the first inserted element.
    pub start_position: i64,
    /// Set when the parent is a list.
    pub list_typing: Option<ListTyping>,
}

impl InsertContext {
    pub fn top_level(start_position: i64) -> Self {
        Self { start_position, ..Default::default() }
    }
}

/// One element of a flattened batch. Its children are stripped and appear as
/// later nodes pointing back through `parent_index`.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingNode {
    pub element: SubmodelElement,
    pub model_type: ModelType,
    pub id_short: Option<String>,
    pub path: String,
    pub position: i64,
    pub depth: usize,
    /// Index of the parent within the batch, `None` for batch roots.
    pub parent_index: Option<usize>,
    /// Index of the batch root this node hangs under, `None` for batch roots.
    pub root_index: Option<usize>,
}

/// A persisted node of a finished batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertedNode {
    pub id: i64,
    pub path: String,
    pub depth: usize,
}

struct Queued {
    element: SubmodelElement,
    parent_index: Option<usize>,
    root_index: Option<usize>,
    parent_path: String,
    positional: bool,
    position: i64,
    depth: usize,
    list_typing: Option<ListTyping>,
}

/// Breadth-first flatten with validation. Parents always precede their
/// children in the output.
///
/// Fails with `BadRequest` on invalid idShorts or list typing and with
/// `Conflict` when two nodes of the batch compute the same path.
pub fn flatten(elements: Vec<SubmodelElement>, ctx: &InsertContext) -> Result<Vec<PendingNode>, StoreError> {
    let mut queue: VecDeque<Queued> = elements
        .into_iter()
        .enumerate()
        .map(|(i, element)| Queued {
            element,
            parent_index: None,
            root_index: None,
            parent_path: ctx.parent_path.clone(),
            positional: ctx.positional,
            position: ctx.start_position + i as i64,
            depth: 0,
            list_typing: ctx.list_typing,
        })
        .collect();

    let mut nodes: Vec<PendingNode> = Vec::with_capacity(queue.len());
    let mut seen: HashSet<String> = HashSet::new();

    while let Some(mut item) = queue.pop_front() {
        let id_short = item.element.id_short().map(str::to_string);
        let path = if item.positional {
            compute_path(&item.parent_path, true, item.position as usize, "")
        } else {
            let name = id_short.as_deref().ok_or_else(|| {
                StoreError::BadRequest(format!(
                    "element below '{}' needs an idShort",
                    display_parent(&item.parent_path)
                ))
            })?;
            validate_id_short(name)?;
            compute_path(&item.parent_path, false, 0, name)
        };

        if let Some(typing) = &item.list_typing {
            typing.check(&item.element, &path)?;
        }
        if !seen.insert(path.clone()) {
            return Err(StoreError::Conflict(format!("idShortPath '{}' appears twice in the request", path)));
        }

        let index = nodes.len();
        let model_type = item.element.model_type();
        let child_typing = ListTyping::of(&item.element);
        let children = item.element.take_children();
        let child_positional = model_type.child_addressing() == Some(ChildAddressing::Positional);
        let child_root = item.root_index.or(Some(index));

        for (i, child) in children.into_iter().enumerate() {
            queue.push_back(Queued {
                element: child,
                parent_index: Some(index),
                root_index: child_root,
                parent_path: path.clone(),
                positional: child_positional,
                position: i as i64,
                depth: item.depth + 1,
                list_typing: child_typing,
            });
        }

        nodes.push(PendingNode {
            element: item.element,
            model_type,
            id_short,
            path,
            position: item.position,
            depth: item.depth,
            parent_index: item.parent_index,
            root_index: item.root_index,
        });
    }

    Ok(nodes)
}

fn display_parent(parent_path: &str) -> &str {
    if parent_path.is_empty() {
        "<submodel>"
    } else {
        parent_path
    }
}

/// Writes flattened batches through the handler registry.
pub struct BatchInserter<'a> {
    registry: &'a HandlerRegistry,
    dialect: Dialect,
    references: SqlReferenceStore,
}

impl<'a> BatchInserter<'a> {
    pub fn new(registry: &'a HandlerRegistry, dialect: Dialect) -> Self {
        Self {
            registry,
            dialect,
            references: SqlReferenceStore::new(ELEMENT_SEMANTIC_ID),
        }
    }

    pub fn registry(&self) -> &HandlerRegistry {
        self.registry
    }

    /// Persist `elements` (with their subtrees) under `ctx`.
    pub async fn insert(
        &self,
        conn: &mut AnyConnection,
        submodel_pk: i64,
        ctx: &InsertContext,
        elements: Vec<SubmodelElement>,
    ) -> Result<Vec<InsertedNode>, StoreError> {
        let nodes = flatten(elements, ctx)?;
        if nodes.is_empty() {
            return Ok(Vec::new());
        }

        // Side rows are built before any write so lexical errors fail early.
        let mapper = self.registry.mapper();
        let mut side_rows: BTreeMap<&'static str, (&'static [&'static str], Vec<Vec<SqlValue>>)> = BTreeMap::new();
        let mut parts = Vec::with_capacity(nodes.len());
        for node in &nodes {
            let handler = self.registry.get(node.model_type)?;
            parts.push(handler.insert_part(&node.element, mapper)?);
        }

        let ids = self.insert_base_rows(conn, submodel_pk, &nodes).await?;
        self.link_hierarchy(conn, ctx, &nodes, &ids).await?;

        for (part, id) in parts.into_iter().zip(&ids) {
            if let Some(part) = part {
                let mut values = Vec::with_capacity(part.values.len() + 1);
                values.push(SqlValue::int(*id));
                values.extend(part.values);
                side_rows
                    .entry(part.table)
                    .or_insert_with(|| (part.columns, Vec::new()))
                    .1
                    .push(values);
            }
        }
        for (table, (columns, rows)) in side_rows {
            let mut all_columns = Vec::with_capacity(columns.len() + 1);
            all_columns.push("id");
            all_columns.extend_from_slice(columns);
            bulk_insert(conn, table, &all_columns, rows).await?;
        }

        let mut payload_rows = Vec::with_capacity(nodes.len());
        let mut semantic = ReferenceRows::default();
        for (node, id) in nodes.iter().zip(&ids) {
            let meta = node.element.meta();
            let mut row = Vec::with_capacity(PAYLOAD_COLUMNS.len() + 1);
            row.push(SqlValue::int(*id));
            row.extend(base::payload_values(meta)?);
            payload_rows.push(row);
            if let Some(reference) = &meta.semantic_id {
                semantic.push(*id, reference)?;
            }
        }
        let mut payload_columns = vec!["element_id"];
        payload_columns.extend_from_slice(&PAYLOAD_COLUMNS);
        bulk_insert(conn, PAYLOAD_TABLE, &payload_columns, payload_rows).await?;
        if !semantic.is_empty() {
            self.references.write_many(conn, semantic).await?;
        }

        debug!(submodel_pk, elements = nodes.len(), "Batch insert complete");
        Ok(nodes
            .into_iter()
            .zip(ids)
            .map(|(node, id)| InsertedNode { id, path: node.path, depth: node.depth })
            .collect())
    }

    /// Insert base rows with NULL links; return ids in node order.
    async fn insert_base_rows(
        &self,
        conn: &mut AnyConnection,
        submodel_pk: i64,
        nodes: &[PendingNode],
    ) -> Result<Vec<i64>, StoreError> {
        let per_statement = rows_per_statement(ELEMENT_COLUMNS.len());
        let mut by_path: HashMap<String, i64> = HashMap::with_capacity(nodes.len());

        for chunk in nodes.chunks(per_statement) {
            let sql = format!(
                "INSERT INTO submodel_element ({}) VALUES {}",
                ELEMENT_COLUMNS.join(", "),
                row_placeholders(chunk.len(), ELEMENT_COLUMNS.len())
            );

            if self.dialect.supports_returning() {
                let sql = format!("{} RETURNING id, idshort_path", sql);
                let mut query = sqlx::query(&sql);
                for node in chunk {
                    for value in base::element_values(submodel_pk, node.position, node.element.meta(), node.model_type, &node.path) {
                        query = bind_value(query, value);
                    }
                }
                let rows = query
                    .fetch_all(&mut *conn)
                    .await
                    .map_err(|e| StoreError::from_write("insert elements", e))?;
                for row in rows {
                    by_path.insert(get_required_text(&row, "idshort_path")?, get_required_i64(&row, "id")?);
                }
            } else {
                let mut query = sqlx::query(&sql);
                for node in chunk {
                    for value in base::element_values(submodel_pk, node.position, node.element.meta(), node.model_type, &node.path) {
                        query = bind_value(query, value);
                    }
                }
                query
                    .execute(&mut *conn)
                    .await
                    .map_err(|e| StoreError::from_write("insert elements", e))?;

                // The unique (submodel, path) key round-trips the generated ids.
                let sql = format!(
                    "SELECT id, idshort_path FROM submodel_element WHERE submodel_id = ? AND idshort_path IN ({})",
                    placeholders(chunk.len())
                );
                let mut query = sqlx::query(&sql).bind(submodel_pk);
                for node in chunk {
                    query = query.bind(node.path.clone());
                }
                let rows = query
                    .fetch_all(&mut *conn)
                    .await
                    .map_err(|e| StoreError::internal("read back element ids", e))?;
                for row in rows {
                    by_path.insert(get_required_text(&row, "idshort_path")?, get_required_i64(&row, "id")?);
                }
            }
        }

        if by_path.len() != nodes.len() {
            return Err(StoreError::Internal(format!(
                "inserted {} elements but correlated {} ids",
                nodes.len(),
                by_path.len()
            )));
        }
        nodes
            .iter()
            .map(|n| {
                by_path
                    .get(&n.path)
                    .copied()
                    .ok_or_else(|| StoreError::Internal(format!("no id generated for '{}'", n.path)))
            })
            .collect()
    }

    /// Set parent and root links with one CASE update per chunk.
    async fn link_hierarchy(
        &self,
        conn: &mut AnyConnection,
        ctx: &InsertContext,
        nodes: &[PendingNode],
        ids: &[i64],
    ) -> Result<(), StoreError> {
        let mut links: Vec<(i64, Option<i64>, i64)> = Vec::with_capacity(nodes.len());
        for (node, id) in nodes.iter().zip(ids) {
            let parent = match node.parent_index {
                Some(i) => Some(lookup(ids, i)?),
                None => ctx.parent_id,
            };
            let root = match (ctx.root_id, node.root_index) {
                (Some(existing), _) => existing,
                (None, Some(i)) => lookup(ids, i)?,
                (None, None) => *id,
            };
            links.push((*id, parent, root));
        }

        // 5 binds per row: two CASE arms of two binds each plus the IN list.
        let per_statement = rows_per_statement(5).min(INSERT_CHUNK_SIZE);
        let mut statements = 0usize;
        for chunk in links.chunks(per_statement) {
            let arms = vec!["WHEN ? THEN ?"; chunk.len()].join(" ");
            let sql = format!(
                "UPDATE submodel_element SET parent_sme_id = CASE id {arms} END, \
                 root_sme_id = CASE id {arms} END WHERE id IN ({ids})",
                arms = arms,
                ids = placeholders(chunk.len())
            );
            let mut query = sqlx::query(&sql);
            for (id, parent, _) in chunk {
                query = query.bind(*id).bind(*parent);
            }
            for (id, _, root) in chunk {
                query = query.bind(*id).bind(*root);
            }
            for (id, _, _) in chunk {
                query = query.bind(*id);
            }
            query
                .execute(&mut *conn)
                .await
                .map_err(|e| StoreError::internal("link element hierarchy", e))?;
            statements += 1;
        }
        debug!(rows = links.len(), statements, "Hierarchy links written");
        Ok(())
    }
}

fn lookup(ids: &[i64], index: usize) -> Result<i64, StoreError> {
    ids.get(index)
        .copied()
        .ok_or_else(|| StoreError::Internal(format!("batch node {} has no id", index)))
}
