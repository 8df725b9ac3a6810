//! Relation merging: reconciling newly extracted edges with the stored
//! relation set.
//!
//! Invariant: at most one relationship row per unordered character pair per
//! novel, regardless of how many distinct relation types the text implies.
//! The check covers both orientations and edges staged earlier in the same
//! batch.

use crate::error::Result;
use crate::extraction::PayloadEdge;
use crate::graph::resolver::EntityResolver;
use crate::store::{relationships, Character, Relationship};
use rusqlite::Connection;

/// Supplemental extraction is scoped to characters at or above this
/// importance.
pub const HINT_IMPORTANCE_MIN: i64 = 2;

/// Hint lists are capped to bound prompt size.
pub const MAX_HINT_NAMES: usize = 20;

/// Derived edge score: a base of 0.5 plus 0.1 per endpoint importance
/// point, clamped to 1.0.
pub fn edge_importance(from_importance: i64, to_importance: i64) -> f64 {
    (0.5 + 0.1 * from_importance as f64 + 0.1 * to_importance as f64).min(1.0)
}

/// True when the stored relation set looks too sparse for the roster and a
/// supplemental extraction pass is warranted.
pub fn needs_supplemental(relation_count: usize, character_count: usize) -> bool {
    (relation_count as f64) < 0.5 * (character_count as f64)
}

/// Names to scope a supplemental extraction to: importance >= 2, capped at
/// 20 entries.
pub fn supplemental_hints(roster: &[Character]) -> Vec<String> {
    roster
        .iter()
        .filter(|c| c.importance >= HINT_IMPORTANCE_MIN)
        .map(|c| c.name.clone())
        .take(MAX_HINT_NAMES)
        .collect()
}

fn pair_present(relations: &[Relationship], a: i64, b: i64) -> bool {
    relations.iter().any(|r| r.connects(a, b))
}

/// Merge extracted edges into the stored relation set.
///
/// Resolves both endpoint names (creating characters as needed with the
/// flow's default importance), skips edges whose unordered pair is already
/// connected, and inserts the rest. `relations` is extended with the
/// inserted rows so in-batch duplicates are also caught. Returns the number
/// of rows inserted.
pub fn merge_edges(
    conn: &Connection,
    resolver: &mut EntityResolver,
    relations: &mut Vec<Relationship>,
    edges: &[PayloadEdge],
    default_importance: i64,
) -> Result<usize> {
    let novel_id = resolver.novel_id();
    let mut inserted = 0;

    for edge in edges {
        let source_name = edge.source_name.trim();
        let target_name = edge.target_name.trim();
        if source_name.is_empty() || target_name.is_empty() {
            log::warn!(
                "Skipping extracted edge with empty endpoint ({:?} -> {:?})",
                edge.source_name,
                edge.target_name
            );
            continue;
        }

        let from = resolver.resolve(source_name, default_importance)?;
        let to = resolver.resolve(target_name, default_importance)?;

        if from.id == to.id {
            log::debug!(
                "Skipping edge '{}' -> '{}': both endpoints resolve to character {}",
                source_name,
                target_name,
                from.id
            );
            continue;
        }

        if pair_present(relations, from.id, to.id) {
            log::debug!(
                "Skipping edge {} -> {}: pair already connected",
                from.id,
                to.id
            );
            continue;
        }

        let id = relationships::insert_relationship(
            conn,
            novel_id,
            from.id,
            to.id,
            &edge.relation,
            &edge.description,
            None,
        )?;
        relations.push(Relationship {
            id,
            novel_id,
            from_character_id: from.id,
            to_character_id: to.id,
            relation_type: edge.relation.clone(),
            description: edge.description.clone(),
            first_chapter_id: None,
        });
        inserted += 1;
    }

    Ok(inserted)
}
