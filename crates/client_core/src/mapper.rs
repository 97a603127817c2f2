//! Translation between wire, canonical and persisted shapes of an entity.
//!
//! All conversions are total: absent wire fields become empty strings, zero
//! or empty collections. Nothing here does I/O or keeps state.

use shared::{
    domain::{Attribute, Candidate, Entity, Event, Sprites},
    protocol::{DetailResponse, ListingResponse, MovePayload, StatPayload},
};
use storage::{StoredAttribute, StoredEntity, StoredEvent, StoredRowSet};

pub trait EntityMapper: Send + Sync {
    /// Listing entries without a url are not candidates and are skipped.
    fn listing_to_candidates(&self, listing: &ListingResponse) -> Vec<Candidate>;
    fn detail_to_entity(&self, detail: &DetailResponse) -> Entity;
    fn entity_to_main_row(&self, entity: &Entity) -> StoredEntity;
    fn attributes_to_rows(&self, attributes: &[Attribute]) -> Vec<StoredAttribute>;
    fn events_to_rows(&self, events: &[Event]) -> Vec<StoredEvent>;
    fn rows_to_entity(&self, rows: &StoredRowSet) -> Entity;
    fn events_from_rows(&self, rows: &[StoredEvent]) -> Vec<Event>;

    fn entity_to_row_set(&self, entity: &Entity) -> StoredRowSet {
        StoredRowSet {
            entity: self.entity_to_main_row(entity),
            attributes: self.attributes_to_rows(&entity.attributes),
            events: self.events_to_rows(&entity.events),
        }
    }
}

/// Mapper for the PokeAPI wire format: stats become attributes and moves
/// become events.
#[derive(Debug, Clone, Copy, Default)]
pub struct PokeApiMapper;

impl PokeApiMapper {
    fn stat_to_attribute(stat: &StatPayload) -> Attribute {
        Attribute {
            kind: stat
                .stat
                .as_ref()
                .and_then(|s| s.name.clone())
                .unwrap_or_default(),
            value: stat.base_stat.unwrap_or_default(),
        }
    }

    fn move_to_event(payload: &MovePayload) -> Event {
        let resource = payload.move_.as_ref();
        Event {
            kind: resource.and_then(|m| m.name.clone()).unwrap_or_default(),
            extra: resource.and_then(|m| m.url.clone()).unwrap_or_default(),
        }
    }
}

impl EntityMapper for PokeApiMapper {
    fn listing_to_candidates(&self, listing: &ListingResponse) -> Vec<Candidate> {
        listing
            .results
            .iter()
            .filter_map(|item| item.url.as_deref())
            .map(Candidate::new)
            .collect()
    }

    fn detail_to_entity(&self, detail: &DetailResponse) -> Entity {
        let sprites = detail.sprites.as_ref();
        Entity {
            name: detail.name.clone().unwrap_or_default(),
            sprites: Sprites {
                front_image_url: sprites
                    .and_then(|s| s.front_default.clone())
                    .unwrap_or_default(),
                back_image_url: sprites
                    .and_then(|s| s.back_default.clone())
                    .unwrap_or_default(),
            },
            attributes: detail.stats.iter().map(Self::stat_to_attribute).collect(),
            events: detail.moves.iter().map(Self::move_to_event).collect(),
        }
    }

    fn entity_to_main_row(&self, entity: &Entity) -> StoredEntity {
        StoredEntity {
            name: entity.name.clone(),
            front_image_url: entity.sprites.front_image_url.clone(),
            back_image_url: entity.sprites.back_image_url.clone(),
        }
    }

    fn attributes_to_rows(&self, attributes: &[Attribute]) -> Vec<StoredAttribute> {
        attributes
            .iter()
            .enumerate()
            .map(|(position, attribute)| StoredAttribute {
                position: position as i64,
                kind: attribute.kind.clone(),
                value: attribute.value,
            })
            .collect()
    }

    fn events_to_rows(&self, events: &[Event]) -> Vec<StoredEvent> {
        events
            .iter()
            .enumerate()
            .map(|(position, event)| StoredEvent {
                position: position as i64,
                kind: event.kind.clone(),
                extra: event.extra.clone(),
            })
            .collect()
    }

    fn rows_to_entity(&self, rows: &StoredRowSet) -> Entity {
        Entity {
            name: rows.entity.name.clone(),
            sprites: Sprites {
                front_image_url: rows.entity.front_image_url.clone(),
                back_image_url: rows.entity.back_image_url.clone(),
            },
            attributes: rows
                .attributes
                .iter()
                .map(|row| Attribute {
                    kind: row.kind.clone(),
                    value: row.value,
                })
                .collect(),
            events: self.events_from_rows(&rows.events),
        }
    }

    fn events_from_rows(&self, rows: &[StoredEvent]) -> Vec<Event> {
        rows.iter()
            .map(|row| Event {
                kind: row.kind.clone(),
                extra: row.extra.clone(),
            })
            .collect()
    }
}

#[cfg(test)]
#[path = "tests/mapper_tests.rs"]
mod tests;
