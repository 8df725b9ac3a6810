//! Relationship rows. The merger is responsible for the one-row-per-
//! unordered-pair invariant; this module is plain storage.

use super::Relationship;
use crate::error::Result;
use rusqlite::{params, Connection, Row};

fn relationship_from_row(row: &Row) -> rusqlite::Result<Relationship> {
    Ok(Relationship {
        id: row.get(0)?,
        novel_id: row.get(1)?,
        from_character_id: row.get(2)?,
        to_character_id: row.get(3)?,
        relation_type: row.get(4)?,
        description: row.get(5)?,
        first_chapter_id: row.get(6)?,
    })
}

const RELATIONSHIP_COLS: &str = "id, novel_id, from_character_id, to_character_id, \
                                 relation_type, description, first_chapter_id";

pub fn relationships_by_novel(conn: &Connection, novel_id: i64) -> Result<Vec<Relationship>> {
    let sql = format!(
        "SELECT {} FROM relationships WHERE novel_id = ?1 ORDER BY id",
        RELATIONSHIP_COLS
    );
    let mut stmt = conn.prepare(&sql)?;
    let relationships = stmt
        .query_map(params![novel_id], relationship_from_row)?
        .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;
    Ok(relationships)
}

pub fn relationship_count(conn: &Connection, novel_id: i64) -> Result<i64> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM relationships WHERE novel_id = ?1",
        params![novel_id],
        |row| row.get(0),
    )?;
    Ok(count)
}

pub fn insert_relationship(
    conn: &Connection,
    novel_id: i64,
    from_character_id: i64,
    to_character_id: i64,
    relation_type: &str,
    description: &str,
    first_chapter_id: Option<i64>,
) -> Result<i64> {
    conn.execute(
        "INSERT INTO relationships \
         (novel_id, from_character_id, to_character_id, relation_type, description, first_chapter_id) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            novel_id,
            from_character_id,
            to_character_id,
            relation_type,
            description,
            first_chapter_id
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Wholesale removal, the first step of a force-reanalyze pass.
pub fn delete_relationships(conn: &Connection, novel_id: i64) -> Result<usize> {
    let deleted = conn.execute(
        "DELETE FROM relationships WHERE novel_id = ?1",
        params![novel_id],
    )?;
    Ok(deleted)
}

/// Existence check over both orientations of the unordered pair {a, b}.
pub fn pair_exists(conn: &Connection, novel_id: i64, a: i64, b: i64) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM relationships WHERE novel_id = ?1 AND \
         ((from_character_id = ?2 AND to_character_id = ?3) OR \
          (from_character_id = ?3 AND to_character_id = ?2))",
        params![novel_id, a, b],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::migrate::test_support::migrated_db;
    use crate::store::characters::insert_character;
    use crate::store::novels::create_novel;

    async fn seed_pair(db: &crate::db::Db) -> (i64, i64, i64) {
        db.with_connection(|conn| {
            let novel_id = create_novel(conn, "T", "A", None)?;
            let a = insert_character(conn, novel_id, "A", &[], "", 3)?;
            let b = insert_character(conn, novel_id, "B", &[], "", 3)?;
            Ok((novel_id, a, b))
        })
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_insert_and_list() {
        let (db, _temp) = migrated_db().await;
        let (novel_id, a, b) = seed_pair(&db).await;
        db.with_connection(move |conn| {
            insert_relationship(conn, novel_id, a, b, "friend", "childhood friends", None)?;
            let rows = relationships_by_novel(conn, novel_id)?;
            assert_eq!(rows.len(), 1);
            assert_eq!(rows[0].relation_type, "friend");
            assert_eq!(relationship_count(conn, novel_id)?, 1);
            Ok(())
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_pair_exists_is_unordered() {
        let (db, _temp) = migrated_db().await;
        let (novel_id, a, b) = seed_pair(&db).await;
        db.with_connection(move |conn| {
            insert_relationship(conn, novel_id, a, b, "rival", "", None)?;
            assert!(pair_exists(conn, novel_id, a, b)?);
            assert!(pair_exists(conn, novel_id, b, a)?);
            assert!(!pair_exists(conn, novel_id, a, a)?);
            Ok(())
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_delete_relationships_is_scoped_to_novel() {
        let (db, _temp) = migrated_db().await;
        let (novel_id, a, b) = seed_pair(&db).await;
        db.with_connection(move |conn| {
            let other_novel = create_novel(conn, "Other", "A", None)?;
            let c = insert_character(conn, other_novel, "C", &[], "", 3)?;
            let d = insert_character(conn, other_novel, "D", &[], "", 3)?;
            insert_relationship(conn, novel_id, a, b, "friend", "", None)?;
            insert_relationship(conn, other_novel, c, d, "enemy", "", None)?;

            assert_eq!(delete_relationships(conn, novel_id)?, 1);
            assert_eq!(relationship_count(conn, novel_id)?, 0);
            assert_eq!(relationship_count(conn, other_novel)?, 1);
            Ok(())
        })
        .await
        .unwrap();
    }
}
