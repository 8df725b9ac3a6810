//! Character roster analysis and detail assembly.
//!
//! The roster pass mirrors the graph engine's cache discipline: an existing
//! roster answers the request unless the caller forces a refresh, in which
//! case profiles are re-extracted from the full text and merged onto the
//! stored rows by exact name.

use crate::db::Db;
use crate::error::{NovelGraphError, Result};
use crate::extraction::ExtractionService;
use crate::store::{characters, novels, relationships, Character};
use serde::Serialize;

/// Analyze the characters of a novel.
///
/// Returns the stored roster when one exists and `force_refresh` is false;
/// otherwise extracts character sketches from the chapter text, updates
/// matching characters, creates the rest, and returns the refreshed roster
/// ordered by importance descending. All mutations commit as one
/// transaction.
pub async fn analyze_characters(
    db: &Db,
    extractor: &dyn ExtractionService,
    novel_id: i64,
    force_refresh: bool,
) -> Result<Vec<Character>> {
    let existing = db
        .with_connection(move |conn| {
            novels::get_novel(conn, novel_id)?.ok_or(NovelGraphError::NovelNotFound(novel_id))?;
            characters::characters_by_importance(conn, novel_id)
        })
        .await?;

    if !force_refresh && !existing.is_empty() {
        log::info!(
            "Using stored roster for novel {} ({} characters)",
            novel_id,
            existing.len()
        );
        return Ok(existing);
    }

    let text = db
        .with_connection(move |conn| novels::novel_content(conn, novel_id))
        .await?;
    if text.trim().is_empty() {
        return Err(NovelGraphError::InvalidInput(format!(
            "Novel {} has no chapter text to analyze",
            novel_id
        )));
    }

    let sketches = extractor.extract_characters(&text).await?;
    log::info!(
        "Extracted {} character sketches for novel {}",
        sketches.len(),
        novel_id
    );

    db.with_connection(move |conn| {
        let mut created = 0;
        let mut updated = 0;

        let tx = conn.transaction()?;
        {
            let roster = characters::characters_by_novel(&tx, novel_id)?;
            let mut seen_in_batch = std::collections::HashSet::new();
            for sketch in &sketches {
                let name = sketch.name.trim();
                if name.is_empty() {
                    log::warn!("Skipping character sketch with empty name");
                    continue;
                }
                if !seen_in_batch.insert(name.to_string()) {
                    log::debug!("Duplicate sketch for '{}' in one response, skipping", name);
                    continue;
                }

                match roster.iter().find(|c| c.name == name) {
                    Some(existing) => {
                        // Keep stored fields the sketch leaves blank
                        let description = if sketch.description.is_empty() {
                            existing.description.as_str()
                        } else {
                            sketch.description.as_str()
                        };
                        let aliases = if sketch.aliases.is_empty() {
                            existing.aliases.clone()
                        } else {
                            sketch.aliases.clone()
                        };
                        characters::update_character_profile(
                            &tx,
                            existing.id,
                            description,
                            &aliases,
                            sketch.importance,
                        )?;
                        updated += 1;
                    }
                    None => {
                        characters::insert_character(
                            &tx,
                            novel_id,
                            name,
                            &sketch.aliases,
                            &sketch.description,
                            sketch.importance,
                        )?;
                        created += 1;
                    }
                }
            }
        }
        tx.commit()?;

        log::info!(
            "Roster analysis for novel {}: {} created, {} updated",
            novel_id,
            created,
            updated
        );
        characters::characters_by_importance(conn, novel_id)
    })
    .await
}

/// Direction of a relation relative to the character being described
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RelationDirection {
    Outgoing,
    Incoming,
}

/// One relation of a character, annotated with the partner
#[derive(Debug, Clone, Serialize)]
pub struct RelatedCharacter {
    pub relationship_id: i64,
    pub character_id: i64,
    pub name: String,
    pub relation_type: String,
    pub description: String,
    pub direction: RelationDirection,
}

/// A character plus its relations in both directions
#[derive(Debug, Clone, Serialize)]
pub struct CharacterDetail {
    pub character: Character,
    pub relations: Vec<RelatedCharacter>,
}

/// Assemble a character's profile with its relations in both directions.
pub async fn character_detail(db: &Db, character_id: i64) -> Result<CharacterDetail> {
    db.with_connection(move |conn| {
        let character = characters::get_character(conn, character_id)?
            .ok_or(NovelGraphError::CharacterNotFound(character_id))?;

        let roster = characters::characters_by_novel(conn, character.novel_id)?;
        let by_id: std::collections::HashMap<i64, &Character> =
            roster.iter().map(|c| (c.id, c)).collect();

        let mut relations = Vec::new();
        for rel in relationships::relationships_by_novel(conn, character.novel_id)? {
            let (partner_id, direction) = if rel.from_character_id == character_id {
                (rel.to_character_id, RelationDirection::Outgoing)
            } else if rel.to_character_id == character_id {
                (rel.from_character_id, RelationDirection::Incoming)
            } else {
                continue;
            };
            if let Some(partner) = by_id.get(&partner_id) {
                relations.push(RelatedCharacter {
                    relationship_id: rel.id,
                    character_id: partner.id,
                    name: partner.name.clone(),
                    relation_type: rel.relation_type.clone(),
                    description: rel.description.clone(),
                    direction,
                });
            }
        }

        Ok(CharacterDetail {
            character,
            relations,
        })
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::migrate::test_support::migrated_db;
    use crate::extraction::{CharacterSketch, GraphPayload};
    use crate::store::novels::{add_chapter, create_novel};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct SketchStub {
        sketches: Vec<CharacterSketch>,
        calls: AtomicUsize,
    }

    impl SketchStub {
        fn returning(sketches: Vec<CharacterSketch>) -> Self {
            Self {
                sketches,
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ExtractionService for SketchStub {
        async fn extract_relationships(
            &self,
            _text: &str,
            _hint_names: Option<&[String]>,
        ) -> Result<GraphPayload> {
            Ok(GraphPayload::default())
        }

        async fn extract_characters(&self, _text: &str) -> Result<Vec<CharacterSketch>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.sketches.clone())
        }
    }

    fn sketch(name: &str, description: &str, importance: i64) -> CharacterSketch {
        CharacterSketch {
            name: name.to_string(),
            aliases: Vec::new(),
            description: description.to_string(),
            importance,
        }
    }

    async fn seed_novel(db: &Db) -> i64 {
        db.with_connection(|conn| {
            let novel_id = create_novel(conn, "The Jade Tower", "Anon", None)?;
            add_chapter(conn, novel_id, 1, "One", "Lin Xi met Qin Yu beneath the tower.")?;
            Ok(novel_id)
        })
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_existing_roster_answers_without_extraction() {
        let (db, _temp) = migrated_db().await;
        let novel_id = seed_novel(&db).await;
        db.with_connection(move |conn| {
            characters::insert_character(conn, novel_id, "Lin Xi", &[], "alchemist", 5)?;
            Ok(())
        })
        .await
        .unwrap();

        let stub = SketchStub::returning(vec![sketch("Ghost", "should not appear", 1)]);
        let roster = analyze_characters(&db, &stub, novel_id, false).await.unwrap();

        assert_eq!(stub.calls(), 0);
        assert_eq!(roster.len(), 1);
        assert_eq!(roster[0].name, "Lin Xi");
    }

    #[tokio::test]
    async fn test_force_refresh_updates_and_creates() {
        let (db, _temp) = migrated_db().await;
        let novel_id = seed_novel(&db).await;
        db.with_connection(move |conn| {
            characters::insert_character(conn, novel_id, "Lin Xi", &[], "alchemist", 2)?;
            Ok(())
        })
        .await
        .unwrap();

        let stub = SketchStub::returning(vec![
            sketch("Lin Xi", "genius alchemist of the Azure Peak", 5),
            sketch("Qin Yu", "sword cultivator", 5),
        ]);
        let roster = analyze_characters(&db, &stub, novel_id, true).await.unwrap();

        assert_eq!(stub.calls(), 1);
        assert_eq!(roster.len(), 2);
        // Ordered by importance descending; updated row kept its id
        let lin_xi = roster.iter().find(|c| c.name == "Lin Xi").unwrap();
        assert_eq!(lin_xi.description, "genius alchemist of the Azure Peak");
        assert_eq!(lin_xi.importance, 5);
        assert!(roster.iter().any(|c| c.name == "Qin Yu"));
    }

    #[tokio::test]
    async fn test_blank_sketch_fields_keep_stored_values() {
        let (db, _temp) = migrated_db().await;
        let novel_id = seed_novel(&db).await;
        db.with_connection(move |conn| {
            characters::insert_character(
                conn,
                novel_id,
                "Lin Xi",
                &["Xi'er".to_string()],
                "alchemist",
                3,
            )?;
            Ok(())
        })
        .await
        .unwrap();

        let stub = SketchStub::returning(vec![sketch("Lin Xi", "", 4)]);
        let roster = analyze_characters(&db, &stub, novel_id, true).await.unwrap();

        let lin_xi = &roster[0];
        assert_eq!(lin_xi.description, "alchemist");
        assert_eq!(lin_xi.aliases, vec!["Xi'er".to_string()]);
        assert_eq!(lin_xi.importance, 4);
    }

    #[tokio::test]
    async fn test_empty_roster_triggers_extraction_without_force() {
        let (db, _temp) = migrated_db().await;
        let novel_id = seed_novel(&db).await;

        let stub = SketchStub::returning(vec![sketch("Qin Yu", "sword cultivator", 4)]);
        let roster = analyze_characters(&db, &stub, novel_id, false).await.unwrap();

        assert_eq!(stub.calls(), 1);
        assert_eq!(roster.len(), 1);
        assert_eq!(roster[0].name, "Qin Yu");
    }

    #[tokio::test]
    async fn test_unknown_novel_is_not_found() {
        let (db, _temp) = migrated_db().await;
        let stub = SketchStub::returning(vec![]);
        let err = analyze_characters(&db, &stub, 404, false).await.unwrap_err();
        assert!(matches!(err, NovelGraphError::NovelNotFound(404)));
    }

    #[tokio::test]
    async fn test_character_detail_includes_both_directions() {
        let (db, _temp) = migrated_db().await;
        let novel_id = seed_novel(&db).await;
        let (a, b, c) = db
            .with_connection(move |conn| {
                let a = characters::insert_character(conn, novel_id, "Lin Xi", &[], "", 5)?;
                let b = characters::insert_character(conn, novel_id, "Qin Yu", &[], "", 5)?;
                let c = characters::insert_character(conn, novel_id, "Old Gu", &[], "", 4)?;
                relationships::insert_relationship(conn, novel_id, a, b, "lovers", "", None)?;
                relationships::insert_relationship(
                    conn,
                    novel_id,
                    c,
                    a,
                    "master and disciple",
                    "",
                    None,
                )?;
                Ok((a, b, c))
            })
            .await
            .unwrap();

        let detail = character_detail(&db, a).await.unwrap();
        assert_eq!(detail.character.name, "Lin Xi");
        assert_eq!(detail.relations.len(), 2);

        let outgoing = detail
            .relations
            .iter()
            .find(|r| r.direction == RelationDirection::Outgoing)
            .unwrap();
        assert_eq!(outgoing.character_id, b);
        assert_eq!(outgoing.relation_type, "lovers");

        let incoming = detail
            .relations
            .iter()
            .find(|r| r.direction == RelationDirection::Incoming)
            .unwrap();
        assert_eq!(incoming.character_id, c);
        assert_eq!(incoming.relation_type, "master and disciple");
    }

    #[tokio::test]
    async fn test_character_detail_not_found() {
        let (db, _temp) = migrated_db().await;
        let err = character_detail(&db, 9999).await.unwrap_err();
        assert!(matches!(err, NovelGraphError::CharacterNotFound(9999)));
    }
}
