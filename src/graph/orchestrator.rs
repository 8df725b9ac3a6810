//! Extraction orchestration: cache lookup, merge vs. force-reanalyze,
//! ego filtering, and snapshot persistence.
//!
//! Request flow: consult the snapshot cache; on a miss (or a forced
//! refresh) recompute under a per-novel lock, narrow to the requested
//! center if any, and write the result back through the cache.

use crate::db::Db;
use crate::error::{NovelGraphError, Result};
use crate::extraction::{ExtractionService, GraphPayload};
use crate::graph::{ego, merge, resolver::EntityResolver, GraphData, GraphEdge, GraphNode};
use crate::store::{characters, graph_cache, novels, relationships, Character, Relationship};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Default importance for characters created during a supplemental
/// extraction pass.
const SUPPLEMENTAL_DEFAULT_IMPORTANCE: i64 = 2;

/// Default importance for characters created during a force-reanalyze pass.
const FORCE_DEFAULT_IMPORTANCE: i64 = 3;

/// A relationship-graph request
#[derive(Debug, Clone)]
pub struct GraphRequest {
    pub novel_id: i64,
    /// Center character for an ego network; `None` asks for the global graph
    pub character_id: Option<i64>,
    pub depth: usize,
    /// Discard stored relations and recompute from source text
    pub force_refresh: bool,
}

/// Per-novel async locks. Recomputation passes for one novel are
/// serialized; the delete-then-reinsert of relationship rows is not
/// race-safe otherwise. Other novels proceed independently.
#[derive(Default)]
struct NovelLocks {
    inner: Mutex<HashMap<i64, Arc<tokio::sync::Mutex<()>>>>,
}

impl NovelLocks {
    fn for_novel(&self, novel_id: i64) -> Arc<tokio::sync::Mutex<()>> {
        let mut map = self.inner.lock().unwrap();
        map.entry(novel_id)
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }
}

/// The relationship graph engine
pub struct GraphEngine {
    db: Db,
    extractor: Arc<dyn ExtractionService>,
    locks: NovelLocks,
}

impl GraphEngine {
    pub fn new(db: Db, extractor: Arc<dyn ExtractionService>) -> Self {
        Self {
            db,
            extractor,
            locks: NovelLocks::default(),
        }
    }

    /// Serve a relationship graph request.
    pub async fn relationship_graph(&self, request: GraphRequest) -> Result<GraphData> {
        let novel_id = request.novel_id;
        let depth = request.depth.max(1);

        let center = self.load_center(novel_id, request.character_id).await?;
        let center_id = center.as_ref().map(|c| c.id);

        if !request.force_refresh {
            if let Some(graph) = self.cached(novel_id, center_id, depth).await? {
                log::info!(
                    "Graph cache hit: novel {}, center {:?}, depth {}",
                    novel_id,
                    center_id,
                    depth
                );
                return Ok(graph);
            }
        }

        let lock = self.locks.for_novel(novel_id);
        let _guard = lock.lock().await;

        // A request that held the lock first may have filled this key
        if !request.force_refresh {
            if let Some(graph) = self.cached(novel_id, center_id, depth).await? {
                return Ok(graph);
            }
        }

        let graph = if request.force_refresh {
            self.force_reanalyze(novel_id).await?
        } else {
            self.merge_pass(novel_id).await?
        };

        let graph = match &center {
            Some(c) => ego::filter_by_center(&graph, &c.name, depth),
            None => graph,
        };

        let persisted = graph.clone();
        self.db
            .with_connection(move |conn| {
                graph_cache::put_snapshot(conn, novel_id, center_id, depth as i64, &persisted)
            })
            .await?;

        Ok(graph)
    }

    /// Validate the novel and the optional center character.
    async fn load_center(
        &self,
        novel_id: i64,
        character_id: Option<i64>,
    ) -> Result<Option<Character>> {
        self.db
            .with_connection(move |conn| {
                novels::get_novel(conn, novel_id)?
                    .ok_or(NovelGraphError::NovelNotFound(novel_id))?;
                match character_id {
                    None => Ok(None),
                    Some(id) => {
                        let character = characters::get_character(conn, id)?
                            .filter(|c| c.novel_id == novel_id)
                            .ok_or(NovelGraphError::CharacterNotFound(id))?;
                        Ok(Some(character))
                    }
                }
            })
            .await
    }

    async fn cached(
        &self,
        novel_id: i64,
        center_id: Option<i64>,
        depth: usize,
    ) -> Result<Option<GraphData>> {
        self.db
            .with_connection(move |conn| {
                graph_cache::get_snapshot(conn, novel_id, center_id, depth as i64)
            })
            .await
    }

    async fn load_stored(&self, novel_id: i64) -> Result<(Vec<Character>, Vec<Relationship>)> {
        self.db
            .with_connection(move |conn| {
                let roster = characters::characters_by_novel(conn, novel_id)?;
                let relations = relationships::relationships_by_novel(conn, novel_id)?;
                Ok((roster, relations))
            })
            .await
    }

    async fn novel_text(&self, novel_id: i64) -> Result<String> {
        self.db
            .with_connection(move |conn| novels::novel_content(conn, novel_id))
            .await
    }

    /// Build the graph from stored data, running a supplemental extraction
    /// first when the relation set looks sparse for the roster.
    async fn merge_pass(&self, novel_id: i64) -> Result<GraphData> {
        let (mut roster, mut relations) = self.load_stored(novel_id).await?;

        if merge::needs_supplemental(relations.len(), roster.len()) {
            let hints = merge::supplemental_hints(&roster);
            if hints.is_empty() {
                log::debug!(
                    "Novel {} relation set is sparse but no characters qualify as hints",
                    novel_id
                );
            } else {
                let text = self.novel_text(novel_id).await?;
                if text.trim().is_empty() {
                    log::warn!("Novel {} has no chapter text; skipping supplemental extraction", novel_id);
                } else {
                    log::info!(
                        "Supplemental extraction for novel {}: {} relations over {} characters",
                        novel_id,
                        relations.len(),
                        roster.len()
                    );
                    match self
                        .extractor
                        .extract_relationships(&text, Some(hints.as_slice()))
                        .await
                    {
                        Ok(payload) => {
                            let (r, rel) = self
                                .apply_extraction(novel_id, payload, SUPPLEMENTAL_DEFAULT_IMPORTANCE)
                                .await?;
                            roster = r;
                            relations = rel;
                        }
                        Err(e) if e.is_extraction_failure() => {
                            // Stored data still answers the request
                            log::warn!(
                                "Supplemental extraction failed for novel {}: {}; using stored relations",
                                novel_id,
                                e
                            );
                        }
                        Err(e) => return Err(e),
                    }
                }
            }
        }

        Ok(build_graph(&roster, &relations))
    }

    /// Discard stored relations and rebuild the set from a full extraction
    /// over the novel text.
    async fn force_reanalyze(&self, novel_id: i64) -> Result<GraphData> {
        let text = self.novel_text(novel_id).await?;
        if text.trim().is_empty() {
            return Err(NovelGraphError::InvalidInput(format!(
                "Novel {} has no chapter text to analyze",
                novel_id
            )));
        }

        let deleted = self
            .db
            .with_connection(move |conn| relationships::delete_relationships(conn, novel_id))
            .await?;
        log::info!(
            "Force refresh: deleted {} stored relations for novel {}",
            deleted,
            novel_id
        );

        match self.extractor.extract_relationships(&text, None).await {
            Ok(payload) => {
                let (roster, relations) = self
                    .apply_extraction(novel_id, payload, FORCE_DEFAULT_IMPORTANCE)
                    .await?;
                Ok(build_graph(&roster, &relations))
            }
            Err(e) if e.is_extraction_failure() => {
                // Relations deleted above are gone; fall back to what remains
                log::error!(
                    "Extraction failed for novel {} after its relations were deleted: {}",
                    novel_id,
                    e
                );
                let (roster, relations) = self.load_stored(novel_id).await?;
                if roster.is_empty() && relations.is_empty() {
                    Err(e)
                } else {
                    Ok(build_graph(&roster, &relations))
                }
            }
            Err(e) => Err(e),
        }
    }

    /// Apply an extraction payload: resolve/create every node, then merge
    /// every edge, as one transaction. Returns the refreshed roster and
    /// relation set.
    async fn apply_extraction(
        &self,
        novel_id: i64,
        payload: GraphPayload,
        default_importance: i64,
    ) -> Result<(Vec<Character>, Vec<Relationship>)> {
        self.db
            .with_connection(move |conn| {
                let tx = conn.transaction()?;
                {
                    let mut resolver = EntityResolver::load(&tx, novel_id)?;
                    let mut relations = relationships::relationships_by_novel(&tx, novel_id)?;

                    for node in &payload.nodes {
                        if node.name.trim().is_empty() {
                            log::warn!("Skipping extracted node with empty name");
                            continue;
                        }
                        resolver.resolve_described(
                            &node.name,
                            &node.description,
                            default_importance,
                        )?;
                    }

                    let inserted = merge::merge_edges(
                        &tx,
                        &mut resolver,
                        &mut relations,
                        &payload.edges,
                        default_importance,
                    )?;
                    log::info!(
                        "Merged extraction for novel {}: {} of {} edges inserted",
                        novel_id,
                        inserted,
                        payload.edges.len()
                    );
                }
                tx.commit()?;

                let roster = characters::characters_by_novel(conn, novel_id)?;
                let relations = relationships::relationships_by_novel(conn, novel_id)?;
                Ok((roster, relations))
            })
            .await
    }
}

/// Materialize a graph from the roster and relation rows. Every roster
/// character appears as a node; edge scores derive from endpoint
/// importance.
fn build_graph(roster: &[Character], relations: &[Relationship]) -> GraphData {
    let by_id: HashMap<i64, &Character> = roster.iter().map(|c| (c.id, c)).collect();

    let nodes = roster
        .iter()
        .map(|c| GraphNode {
            id: c.id,
            name: c.name.clone(),
            description: c.description.clone(),
            importance: c.importance,
        })
        .collect();

    let edges = relations
        .iter()
        .filter_map(|r| {
            let from = by_id.get(&r.from_character_id)?;
            let to = by_id.get(&r.to_character_id)?;
            Some(GraphEdge {
                source_id: from.id,
                target_id: to.id,
                source_name: from.name.clone(),
                target_name: to.name.clone(),
                relation: r.relation_type.clone(),
                description: r.description.clone(),
                importance: merge::edge_importance(from.importance, to.importance),
            })
        })
        .collect();

    GraphData { nodes, edges }
}
