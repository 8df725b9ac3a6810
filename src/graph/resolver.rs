//! Entity resolution: mapping extracted names onto the stable character
//! roster.
//!
//! Extraction models are inconsistent about punctuation, casing, and
//! honorifics for the same character across calls; without normalization
//! the roster fragments into duplicate nodes per pass. Matching is
//! heuristic by design, not NLP-grade coreference: exact case-insensitive
//! first, then containment, then create.

use crate::error::{NovelGraphError, Result};
use crate::store::{characters, Character};
use rusqlite::Connection;

/// Outcome of matching a candidate name against the roster
#[derive(Debug, PartialEq)]
enum NameMatch {
    Exact(usize),
    /// Indexes of all containment matches; more than one is ambiguous
    Containment(Vec<usize>),
    None,
}

fn first_token(name: &str) -> &str {
    name.split_whitespace().next().unwrap_or(name)
}

fn match_name(roster: &[Character], candidate: &str) -> NameMatch {
    let lowered = candidate.to_lowercase();

    for (idx, character) in roster.iter().enumerate() {
        if character.name.to_lowercase() == lowered {
            return NameMatch::Exact(idx);
        }
    }

    let candidate_token = first_token(candidate).to_lowercase();
    let mut hits = Vec::new();
    for (idx, character) in roster.iter().enumerate() {
        let existing = character.name.to_lowercase();
        if existing.is_empty() {
            continue;
        }
        if lowered.contains(&existing) || first_token(&character.name).to_lowercase() == candidate_token
        {
            hits.push(idx);
        }
    }

    if hits.is_empty() {
        NameMatch::None
    } else {
        NameMatch::Containment(hits)
    }
}

/// Resolves extracted names to persisted characters, creating them when no
/// match is found. The sole gatekeeper for roster uniqueness: one resolver
/// is loaded per analysis pass and sees its own creations, so resolving the
/// same name twice within a pass yields the same character.
pub struct EntityResolver<'c> {
    conn: &'c Connection,
    novel_id: i64,
    roster: Vec<Character>,
}

impl<'c> EntityResolver<'c> {
    /// Load the current roster for a novel
    pub fn load(conn: &'c Connection, novel_id: i64) -> Result<Self> {
        let roster = characters::characters_by_novel(conn, novel_id)?;
        Ok(Self {
            conn,
            novel_id,
            roster,
        })
    }

    pub fn novel_id(&self) -> i64 {
        self.novel_id
    }

    pub fn roster(&self) -> &[Character] {
        &self.roster
    }

    /// Resolve a name, creating a character with an empty description on miss.
    pub fn resolve(&mut self, name: &str, default_importance: i64) -> Result<Character> {
        self.resolve_described(name, "", default_importance)
    }

    /// Resolve a name, creating a character with the given description on
    /// miss. `default_importance` is the flow's creation default (2 for
    /// supplemental extraction, 3 for force-reanalyze).
    pub fn resolve_described(
        &mut self,
        name: &str,
        description: &str,
        default_importance: i64,
    ) -> Result<Character> {
        let name = name.trim();
        if name.is_empty() {
            return Err(NovelGraphError::InvalidInput(
                "Empty character name".to_string(),
            ));
        }

        match match_name(&self.roster, name) {
            NameMatch::Exact(idx) => Ok(self.roster[idx].clone()),
            NameMatch::Containment(hits) => {
                if hits.len() > 1 {
                    let names: Vec<&str> = hits
                        .iter()
                        .map(|&i| self.roster[i].name.as_str())
                        .collect();
                    log::warn!(
                        "Ambiguous match for '{}' in novel {}: candidates [{}], using '{}'",
                        name,
                        self.novel_id,
                        names.join(", "),
                        names[0]
                    );
                }
                Ok(self.roster[hits[0]].clone())
            }
            NameMatch::None => {
                let id = characters::insert_character(
                    self.conn,
                    self.novel_id,
                    name,
                    &[],
                    description,
                    default_importance,
                )?;
                log::info!("Created character '{}' (id {}) in novel {}", name, id, self.novel_id);
                let character = Character {
                    id,
                    novel_id: self.novel_id,
                    name: name.to_string(),
                    aliases: Vec::new(),
                    description: description.to_string(),
                    importance: default_importance.clamp(1, 5),
                    first_appearance: None,
                };
                self.roster.push(character.clone());
                Ok(character)
            }
        }
    }
}
