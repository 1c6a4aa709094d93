// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Rebuilding element trees from flat rows.
//!
//! [`load`] runs one joined query for the requested scope and builds every
//! row into a childless element. [`assemble`] then links them through their
//! parent ids without touching the store.

use std::collections::{HashMap, VecDeque};

use sqlx::AnyConnection;
use tracing::{debug, warn};

use super::page::{Cursor, PageSize};
use super::subtree_filter;
use crate::error::StoreError;
use crate::handlers::base::{header_from_row, meta_from_row};
use crate::handlers::HandlerRegistry;
use crate::model::{ModelType, SubmodelElement};
use crate::path::is_direct_child;
use crate::storage::references::{ReferenceStore, SqlReferenceStore, ELEMENT_SEMANTIC_ID};
use crate::storage::rows::{bind_value, get_required_i64, get_required_text, placeholders, SqlValue, INSERT_CHUNK_SIZE};

/// Which rows of a submodel to load.
#[derive(Debug, Clone, Copy)]
pub enum Scope<'a> {
    /// The element at this path and everything below it.
    Subtree(&'a str),
    /// The trees under these top-level element ids.
    Roots(&'a [i64]),
    /// Every element of the submodel.
    All,
}

/// A built element that still needs linking.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedNode {
    pub id: i64,
    pub parent_id: Option<i64>,
    pub root_id: Option<i64>,
    pub position: i64,
    pub path: String,
    pub model_type: ModelType,
    pub element: SubmodelElement,
}

/// Load and build all rows in `scope`. Semantic ids missing their snapshot
/// are resolved from the normalized rows in a single batched lookup.
pub async fn load(
    conn: &mut AnyConnection,
    registry: &HandlerRegistry,
    submodel_pk: i64,
    scope: Scope<'_>,
) -> Result<Vec<LoadedNode>, StoreError> {
    let base = format!("{} WHERE e.submodel_id = ?", registry.select_sql());
    let mut batches: Vec<(String, Vec<SqlValue>)> = Vec::new();
    match scope {
        Scope::Subtree(path) => {
            let (clause, binds) = subtree_filter("e.idshort_path", path);
            batches.push((format!("{}{}", base, clause), binds));
        }
        Scope::Roots(ids) => {
            for chunk in ids.chunks(INSERT_CHUNK_SIZE) {
                batches.push((
                    format!("{} AND e.root_sme_id IN ({})", base, placeholders(chunk.len())),
                    chunk.iter().map(|id| SqlValue::int(*id)).collect(),
                ));
            }
        }
        Scope::All => batches.push((base, Vec::new())),
    }

    let mapper = registry.mapper();
    let mut nodes = Vec::new();
    let mut fallback: Vec<usize> = Vec::new();

    for (sql, binds) in batches {
        let mut query = sqlx::query(&sql).bind(submodel_pk);
        for value in binds {
            query = bind_value(query, value);
        }
        let rows = query
            .fetch_all(&mut *conn)
            .await
            .map_err(|e| StoreError::internal("load elements", e))?;

        for row in &rows {
            let header = header_from_row(row)?;
            let handler = registry.by_code(header.model_type_code)?;
            let (meta, needs_fallback) = meta_from_row(row)?;
            let element = handler.build(meta, row, mapper)?;
            if needs_fallback {
                fallback.push(nodes.len());
            }
            nodes.push(LoadedNode {
                id: header.id,
                parent_id: header.parent_id,
                root_id: header.root_id,
                position: header.position,
                path: header.path,
                model_type: handler.model_type(),
                element,
            });
        }
    }

    if !fallback.is_empty() {
        let ids: Vec<i64> = fallback.iter().map(|i| nodes[*i].id).collect();
        let resolved = SqlReferenceStore::new(ELEMENT_SEMANTIC_ID).read_many(conn, &ids).await?;
        debug!(requested = ids.len(), resolved = resolved.len(), "Semantic id fallback");
        for i in fallback {
            let node = &mut nodes[i];
            node.element.meta_mut().semantic_id = resolved.get(&node.id).cloned();
        }
    }

    Ok(nodes)
}

/// Link loaded nodes into trees and return the roots ordered by (path, id).
///
/// A node whose parent is not among `nodes` becomes a root. Children found
/// under a variant that cannot hold them are dropped.
pub fn assemble(nodes: Vec<LoadedNode>) -> Vec<LoadedNode> {
    let index: HashMap<i64, usize> = nodes.iter().enumerate().map(|(i, n)| (n.id, i)).collect();

    let mut children: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];
    let mut roots: Vec<usize> = Vec::new();
    for (i, node) in nodes.iter().enumerate() {
        match node.parent_id.and_then(|p| index.get(&p)) {
            Some(&parent) if parent != i => children[parent].push(i),
            _ => roots.push(i),
        }
    }
    for list in &mut children {
        list.sort_by(|a, b| (nodes[*a].position, &nodes[*a].path).cmp(&(nodes[*b].position, &nodes[*b].path)));
    }

    // BFS order from the roots; walked backwards, every child is complete
    // before its parent takes it.
    let mut order = Vec::with_capacity(nodes.len());
    let mut queue: VecDeque<usize> = roots.iter().copied().collect();
    while let Some(i) = queue.pop_front() {
        order.push(i);
        queue.extend(children[i].iter().copied());
    }
    if order.len() != nodes.len() {
        warn!(
            loaded = nodes.len(),
            reachable = order.len(),
            "Elements with cyclic parent links skipped"
        );
    }

    let mut slots: Vec<Option<LoadedNode>> = nodes.into_iter().map(Some).collect();
    for &i in order.iter().rev() {
        if children[i].is_empty() {
            continue;
        }
        let kids: Vec<SubmodelElement> = children[i]
            .iter()
            .filter_map(|c| slots[*c].take().map(|n| n.element))
            .collect();
        if let Some(parent) = slots[i].as_mut() {
            if let Err(dropped) = parent.element.set_children(kids) {
                warn!(
                    path = %parent.path,
                    model_type = %parent.model_type,
                    dropped = dropped.len(),
                    "Children under a non-container element dropped"
                );
            }
        }
    }

    let mut out: Vec<LoadedNode> = roots.into_iter().filter_map(|i| slots[i].take()).collect();
    out.sort_by(|a, b| (&a.path, a.id).cmp(&(&b.path, b.id)));
    out
}

/// Attach orphaned direct children of an Entity root as statements.
///
/// Applies only when the first root is an Entity and other roots were
/// returned next to it; anything that is not a direct child stays a root.
pub fn attach_entity_orphans(mut roots: Vec<LoadedNode>) -> Vec<LoadedNode> {
    if roots.len() < 2 || roots[0].model_type != ModelType::Entity {
        return roots;
    }
    let entity_path = roots[0].path.clone();
    let (mut orphans, rest): (Vec<LoadedNode>, Vec<LoadedNode>) = roots
        .drain(1..)
        .partition(|n| is_direct_child(&entity_path, &n.path));
    if orphans.is_empty() {
        roots.extend(rest);
        return roots;
    }

    orphans.sort_by(|a, b| (a.position, &a.path).cmp(&(b.position, &b.path)));
    warn!(path = %entity_path, attached = orphans.len(), "Orphaned entity statements attached");
    let entity = &mut roots[0].element;
    let mut statements = entity.take_children();
    statements.extend(orphans.into_iter().map(|n| n.element));
    // The first root is an Entity, which always accepts statements.
    let _ = entity.set_children(statements);
    roots.extend(rest);
    roots
}

/// Load the element at `path` with its subtree.
pub async fn read_subtree(
    conn: &mut AnyConnection,
    registry: &HandlerRegistry,
    submodel_pk: i64,
    path: &str,
) -> Result<SubmodelElement, StoreError> {
    let nodes = load(conn, registry, submodel_pk, Scope::Subtree(path)).await?;
    let roots = attach_entity_orphans(assemble(nodes));
    roots
        .into_iter()
        .find(|n| n.path == path)
        .map(|n| n.element)
        .ok_or_else(|| StoreError::NotFound(format!("no element at '{}'", path)))
}

/// Every top-level element with its subtree, in (path, id) order.
pub async fn read_forest(
    conn: &mut AnyConnection,
    registry: &HandlerRegistry,
    submodel_pk: i64,
) -> Result<Vec<SubmodelElement>, StoreError> {
    let nodes = load(conn, registry, submodel_pk, Scope::All).await?;
    Ok(assemble(nodes).into_iter().map(|n| n.element).collect())
}

/// A top-level element selected by a page query.
#[derive(Debug, Clone, PartialEq)]
pub struct PagedRoot {
    pub id: i64,
    pub path: String,
    pub model_type: ModelType,
}

/// One page of top-level elements, ordered by (path, id).
pub async fn page_roots(
    conn: &mut AnyConnection,
    submodel_pk: i64,
    size: PageSize,
    cursor: Option<&Cursor>,
) -> Result<(Vec<PagedRoot>, Option<String>), StoreError> {
    if size == PageSize::Empty {
        return Ok((Vec::new(), None));
    }
    let mut sql = String::from(
        "SELECT id, idshort_path, model_type FROM submodel_element \
         WHERE submodel_id = ? AND parent_sme_id IS NULL",
    );
    let mut binds = Vec::new();
    if let Some(cursor) = cursor {
        let (clause, values) = cursor.filter("idshort_path", "id");
        sql.push_str(&clause);
        binds = values;
    }
    sql.push_str(" ORDER BY idshort_path, id");
    sql.push_str(&size.limit_clause());

    let mut query = sqlx::query(&sql).bind(submodel_pk);
    for value in binds {
        query = bind_value(query, value);
    }
    let rows = query
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| StoreError::internal("page top-level elements", e))?;
    let roots = rows
        .iter()
        .map(|row| {
            let code = get_required_i64(row, "model_type")?;
            Ok(PagedRoot {
                id: get_required_i64(row, "id")?,
                path: get_required_text(row, "idshort_path")?,
                model_type: ModelType::from_code(code)
                    .ok_or_else(|| StoreError::Internal(format!("unknown model type code {}", code)))?,
            })
        })
        .collect::<Result<Vec<_>, StoreError>>()?;
    Ok(size.split(roots, |r| Cursor::new(r.path.clone(), r.id)))
}

/// The trees under `root_ids`, in the given order.
pub async fn read_roots(
    conn: &mut AnyConnection,
    registry: &HandlerRegistry,
    submodel_pk: i64,
    root_ids: &[i64],
) -> Result<Vec<SubmodelElement>, StoreError> {
    if root_ids.is_empty() {
        return Ok(Vec::new());
    }
    let nodes = load(conn, registry, submodel_pk, Scope::Roots(root_ids)).await?;
    let mut by_id: HashMap<i64, SubmodelElement> =
        assemble(nodes).into_iter().map(|n| (n.id, n.element)).collect();
    Ok(root_ids.iter().filter_map(|id| by_id.remove(id)).collect())
}
