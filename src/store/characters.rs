//! Character roster access. Creation goes through the entity resolver,
//! which is the sole gatekeeper for name uniqueness.

use super::{clamp_importance, Character};
use crate::error::Result;
use rusqlite::{params, Connection, OptionalExtension, Row};

fn character_from_row(row: &Row) -> rusqlite::Result<Character> {
    let aliases_json: String = row.get(3)?;
    Ok(Character {
        id: row.get(0)?,
        novel_id: row.get(1)?,
        name: row.get(2)?,
        // Tolerate hand-edited rows; a malformed alias list is not fatal
        aliases: serde_json::from_str(&aliases_json).unwrap_or_default(),
        description: row.get(4)?,
        importance: row.get(5)?,
        first_appearance: row.get(6)?,
    })
}

const CHARACTER_COLS: &str =
    "id, novel_id, name, aliases, description, importance, first_appearance";

pub fn get_character(conn: &Connection, character_id: i64) -> Result<Option<Character>> {
    let sql = format!("SELECT {} FROM characters WHERE id = ?1", CHARACTER_COLS);
    let character = conn
        .query_row(&sql, params![character_id], character_from_row)
        .optional()?;
    Ok(character)
}

/// Roster in insertion order, the order the resolver matches against.
pub fn characters_by_novel(conn: &Connection, novel_id: i64) -> Result<Vec<Character>> {
    let sql = format!(
        "SELECT {} FROM characters WHERE novel_id = ?1 ORDER BY id",
        CHARACTER_COLS
    );
    let mut stmt = conn.prepare(&sql)?;
    let characters = stmt
        .query_map(params![novel_id], character_from_row)?
        .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;
    Ok(characters)
}

/// Roster ordered by importance descending, for presentation.
pub fn characters_by_importance(conn: &Connection, novel_id: i64) -> Result<Vec<Character>> {
    let sql = format!(
        "SELECT {} FROM characters WHERE novel_id = ?1 ORDER BY importance DESC, id",
        CHARACTER_COLS
    );
    let mut stmt = conn.prepare(&sql)?;
    let characters = stmt
        .query_map(params![novel_id], character_from_row)?
        .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;
    Ok(characters)
}

pub fn character_count(conn: &Connection, novel_id: i64) -> Result<i64> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM characters WHERE novel_id = ?1",
        params![novel_id],
        |row| row.get(0),
    )?;
    Ok(count)
}

pub fn insert_character(
    conn: &Connection,
    novel_id: i64,
    name: &str,
    aliases: &[String],
    description: &str,
    importance: i64,
) -> Result<i64> {
    let aliases_json = serde_json::to_string(aliases)
        .map_err(|e| crate::error::NovelGraphError::InvalidInput(e.to_string()))?;
    conn.execute(
        "INSERT INTO characters (novel_id, name, aliases, description, importance) \
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            novel_id,
            name,
            aliases_json,
            description,
            clamp_importance(importance)
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Update the mutable profile fields of an existing character.
pub fn update_character_profile(
    conn: &Connection,
    character_id: i64,
    description: &str,
    aliases: &[String],
    importance: i64,
) -> Result<()> {
    let aliases_json = serde_json::to_string(aliases)
        .map_err(|e| crate::error::NovelGraphError::InvalidInput(e.to_string()))?;
    conn.execute(
        "UPDATE characters SET description = ?2, aliases = ?3, importance = ?4 WHERE id = ?1",
        params![
            character_id,
            description,
            aliases_json,
            clamp_importance(importance)
        ],
    )?;
    Ok(())
}
