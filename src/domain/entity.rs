use std::fmt::Display;

use serde::{Deserialize, Serialize};

const ARTIST_PREFIX: &str = "Artist:";
const FIGURE_PREFIX: &str = "Figure:";

/// What kind of subject the classifier recognised in the photo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    /// A music artist
    Artist,
    /// A religious figure (god, prophet, spiritual leader)
    Figure,
    Unknown,
}

impl Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntityKind::Artist => write!(f, "artist"),
            EntityKind::Figure => write!(f, "figure"),
            EntityKind::Unknown => write!(f, "unknown"),
        }
    }
}

/// Represents the subject of one identification session.
///
/// Created once by the classifier (or given directly by the user)
/// and discarded on a new search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentifiedEntity {
    pub name: String,
    pub kind: EntityKind,
}

impl IdentifiedEntity {
    pub fn new(name: impl Into<String>, kind: EntityKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }

    /// search query used to look up tracks for this entity
    pub fn query(&self) -> String {
        build_query(&self.name, self.kind)
    }
}

/// Maps an entity to the text sent to the video search.
pub fn build_query(name: &str, kind: EntityKind) -> String {
    match kind {
        EntityKind::Artist => format!("{name} official audio"),
        EntityKind::Figure => format!("{name} devotional music"),
        EntityKind::Unknown => format!("{name} music"),
    }
}

/// Parses the classifier's structured text reply.
///
/// Only `Artist: <name>` and `Figure: <name>` are recognised, everything else
/// (including the `No match` sentinel and an empty name) is no match.
pub fn parse_classifier_reply(reply: &str) -> Option<IdentifiedEntity> {
    let reply = reply.trim_start();

    let (kind, rest) = if let Some(rest) = reply.strip_prefix(ARTIST_PREFIX) {
        (EntityKind::Artist, rest)
    } else if let Some(rest) = reply.strip_prefix(FIGURE_PREFIX) {
        (EntityKind::Figure, rest)
    } else {
        return None;
    };

    let name = rest.trim();
    if name.is_empty() {
        None
    } else {
        Some(IdentifiedEntity::new(name, kind))
    }
}
