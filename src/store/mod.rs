//! Persistent store: novels, characters, relationships, and the graph
//! snapshot cache. Functions here operate on a borrowed connection so a
//! whole analysis pass can run inside one transaction.

use serde::{Deserialize, Serialize};

pub mod characters;
pub mod graph_cache;
pub mod novels;
pub mod relationships;

/// A novel under analysis
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Novel {
    pub id: i64,
    pub title: String,
    pub author: String,
    pub description: Option<String>,
}

/// A character on the persisted roster.
///
/// Uniqueness per (novel, normalized name) is a resolver convention, not a
/// storage constraint; all creation goes through the entity resolver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Character {
    pub id: i64,
    pub novel_id: i64,
    pub name: String,
    pub aliases: Vec<String>,
    pub description: String,
    pub importance: i64,
    pub first_appearance: Option<i64>,
}

/// A directed relationship row. The merger guarantees at most one row per
/// unordered character pair per novel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Relationship {
    pub id: i64,
    pub novel_id: i64,
    pub from_character_id: i64,
    pub to_character_id: i64,
    pub relation_type: String,
    pub description: String,
    pub first_chapter_id: Option<i64>,
}

impl Relationship {
    /// True if this row connects the unordered pair {a, b}.
    pub fn connects(&self, a: i64, b: i64) -> bool {
        (self.from_character_id == a && self.to_character_id == b)
            || (self.from_character_id == b && self.to_character_id == a)
    }
}

/// Clamp an extracted importance score to the 1-5 scale.
pub(crate) fn clamp_importance(importance: i64) -> i64 {
    importance.clamp(1, 5)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relationship_connects_both_orientations() {
        let rel = Relationship {
            id: 1,
            novel_id: 1,
            from_character_id: 10,
            to_character_id: 20,
            relation_type: "friend".into(),
            description: String::new(),
            first_chapter_id: None,
        };
        assert!(rel.connects(10, 20));
        assert!(rel.connects(20, 10));
        assert!(!rel.connects(10, 30));
    }

    #[test]
    fn test_clamp_importance() {
        assert_eq!(clamp_importance(0), 1);
        assert_eq!(clamp_importance(3), 3);
        assert_eq!(clamp_importance(9), 5);
    }
}
