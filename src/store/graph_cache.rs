//! Graph snapshot cache keyed by (novel, center-or-global, depth).
//!
//! `put` is full-replace inside one transaction: a concurrent reader sees
//! the old snapshot in full or the new one in full, never a mix. Snapshot
//! rows and their edge children are owned by this module and are never
//! patched in place.

use crate::error::{NovelGraphError, Result};
use crate::graph::{GraphData, GraphEdge, GraphNode};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

/// Exact-key lookup. A NULL center ("global" graph) is a distinct key from
/// any concrete character id.
pub fn get_snapshot(
    conn: &Connection,
    novel_id: i64,
    center_character_id: Option<i64>,
    depth: i64,
) -> Result<Option<GraphData>> {
    let found: Option<(i64, String)> = conn
        .query_row(
            "SELECT id, nodes FROM relationship_graphs \
             WHERE novel_id = ?1 AND center_character_id IS ?2 AND depth = ?3",
            params![novel_id, center_character_id, depth],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;

    let (graph_id, nodes_json) = match found {
        Some(row) => row,
        None => return Ok(None),
    };

    let nodes: Vec<GraphNode> = serde_json::from_str(&nodes_json)
        .map_err(|e| NovelGraphError::Parse(format!("Corrupt snapshot node list: {}", e)))?;

    let mut stmt = conn.prepare(
        "SELECT source_id, target_id, source_name, target_name, relation, description, importance \
         FROM relationship_edges WHERE graph_id = ?1 ORDER BY id",
    )?;
    let edges = stmt
        .query_map(params![graph_id], |row| {
            Ok(GraphEdge {
                source_id: row.get(0)?,
                target_id: row.get(1)?,
                source_name: row.get(2)?,
                target_name: row.get(3)?,
                relation: row.get(4)?,
                description: row.get::<_, Option<String>>(5)?.unwrap_or_default(),
                importance: row.get(6)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;

    Ok(Some(GraphData { nodes, edges }))
}

/// Full-replace write. Deletes any snapshot at the same key (with its edge
/// children), then inserts the new snapshot and edges, in one transaction.
pub fn put_snapshot(
    conn: &mut Connection,
    novel_id: i64,
    center_character_id: Option<i64>,
    depth: i64,
    graph: &GraphData,
) -> Result<i64> {
    let nodes_json = serde_json::to_string(&graph.nodes)
        .map_err(|e| NovelGraphError::InvalidInput(format!("Unserializable node list: {}", e)))?;
    let now = Utc::now().to_rfc3339();

    let tx = conn.transaction()?;

    // Explicit child delete first; does not depend on foreign_keys pragma state
    tx.execute(
        "DELETE FROM relationship_edges WHERE graph_id IN \
         (SELECT id FROM relationship_graphs \
          WHERE novel_id = ?1 AND center_character_id IS ?2 AND depth = ?3)",
        params![novel_id, center_character_id, depth],
    )?;
    tx.execute(
        "DELETE FROM relationship_graphs \
         WHERE novel_id = ?1 AND center_character_id IS ?2 AND depth = ?3",
        params![novel_id, center_character_id, depth],
    )?;

    tx.execute(
        "INSERT INTO relationship_graphs (novel_id, center_character_id, depth, nodes, updated_at) \
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![novel_id, center_character_id, depth, nodes_json, now],
    )?;
    let graph_id = tx.last_insert_rowid();

    {
        let mut stmt = tx.prepare(
            "INSERT INTO relationship_edges \
             (graph_id, source_id, target_id, source_name, target_name, relation, description, importance) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        )?;
        for edge in &graph.edges {
            stmt.execute(params![
                graph_id,
                edge.source_id,
                edge.target_id,
                edge.source_name,
                edge.target_name,
                edge.relation,
                edge.description,
                edge.importance,
            ])?;
        }
    }

    tx.commit()?;
    Ok(graph_id)
}
