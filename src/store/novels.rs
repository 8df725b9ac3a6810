//! Novel and chapter access. Chapter ingestion itself lives outside this
//! crate; these helpers exist so analysis passes can read source text and
//! so tests can seed fixtures.

use super::Novel;
use crate::error::Result;
use rusqlite::{params, Connection, OptionalExtension};

pub fn get_novel(conn: &Connection, novel_id: i64) -> Result<Option<Novel>> {
    let novel = conn
        .query_row(
            "SELECT id, title, author, description FROM novels WHERE id = ?1",
            params![novel_id],
            |row| {
                Ok(Novel {
                    id: row.get(0)?,
                    title: row.get(1)?,
                    author: row.get(2)?,
                    description: row.get(3)?,
                })
            },
        )
        .optional()?;
    Ok(novel)
}

pub fn create_novel(
    conn: &Connection,
    title: &str,
    author: &str,
    description: Option<&str>,
) -> Result<i64> {
    conn.execute(
        "INSERT INTO novels (title, author, description) VALUES (?1, ?2, ?3)",
        params![title, author, description],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn add_chapter(
    conn: &Connection,
    novel_id: i64,
    number: i64,
    title: &str,
    content: &str,
) -> Result<i64> {
    conn.execute(
        "INSERT INTO chapters (novel_id, number, title, content, word_count) \
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![novel_id, number, title, content, content.chars().count() as i64],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Full novel text: chapters concatenated in order. Empty string when the
/// novel has no chapters.
pub fn novel_content(conn: &Connection, novel_id: i64) -> Result<String> {
    let mut stmt =
        conn.prepare("SELECT content FROM chapters WHERE novel_id = ?1 ORDER BY number")?;
    let chapters: Vec<String> = stmt
        .query_map(params![novel_id], |row| row.get::<_, String>(0))?
        .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;
    Ok(chapters.join("\n\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::migrate::test_support::migrated_db;

    #[tokio::test]
    async fn test_create_and_get_novel() {
        let (db, _temp) = migrated_db().await;
        db.with_connection(|conn| {
            let id = create_novel(conn, "The Jade Tower", "Anon", Some("a wuxia tale"))?;
            let novel = get_novel(conn, id)?.expect("novel should exist");
            assert_eq!(novel.title, "The Jade Tower");
            assert_eq!(novel.author, "Anon");
            assert!(get_novel(conn, id + 99)?.is_none());
            Ok(())
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_novel_content_ordered_by_chapter_number() {
        let (db, _temp) = migrated_db().await;
        db.with_connection(|conn| {
            let id = create_novel(conn, "T", "A", None)?;
            add_chapter(conn, id, 2, "Two", "second chapter")?;
            add_chapter(conn, id, 1, "One", "first chapter")?;
            let content = novel_content(conn, id)?;
            assert_eq!(content, "first chapter\n\nsecond chapter");
            Ok(())
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_novel_content_empty_without_chapters() {
        let (db, _temp) = migrated_db().await;
        db.with_connection(|conn| {
            let id = create_novel(conn, "T", "A", None)?;
            assert!(novel_content(conn, id)?.is_empty());
            Ok(())
        })
        .await
        .unwrap();
    }
}
