use serde::{Deserialize, Serialize};

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(pub i64);
    };
}

id_newtype!(EntityId);

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A reference to one detail resource taken from a listing page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub identifier_url: String,
}

impl Candidate {
    pub fn new(identifier_url: impl Into<String>) -> Self {
        Self {
            identifier_url: identifier_url.into(),
        }
    }

    /// Parses the numeric id out of the second-to-last `/` segment, so both
    /// `.../pokemon/7/` and `.../pokemon/7/extra` resolve to `7`.
    pub fn entity_id(&self) -> Option<EntityId> {
        let segments: Vec<&str> = self.identifier_url.split('/').collect();
        if segments.len() < 2 {
            return None;
        }
        let id = segments[segments.len() - 2].parse::<i64>().ok()?;
        (id > 0).then_some(EntityId(id))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sprites {
    pub front_image_url: String,
    pub back_image_url: String,
}

/// A named numeric attribute, e.g. a base stat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    pub kind: String,
    pub value: i64,
}

/// A named event attached to the entity, e.g. a learned move.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub kind: String,
    pub extra: String,
}

/// The canonical entity: the unit that is fetched, cached and read back.
///
/// `Entity::default()` is the "no data" value reported when the cache is
/// empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub name: String,
    pub sprites: Sprites,
    pub attributes: Vec<Attribute>,
    pub events: Vec<Event>,
}

impl Entity {
    pub fn is_empty(&self) -> bool {
        self.name.is_empty() && self.attributes.is_empty() && self.events.is_empty()
    }
}

#[cfg(test)]
#[path = "tests/domain_tests.rs"]
mod tests;
