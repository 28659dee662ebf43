//! In-memory relational store of collection entities.
//!
//! There is no locking primitive: the scheduling model is single-threaded
//! cooperative (see the crate's concurrency notes), so every operation here
//! is a plain synchronous method on `&mut Store`.

pub mod entities;
pub mod snapshot;

use crate::clock::{IdGenerator, now_millis, now_secs};
use crate::{Error, Result};
use entities::{
    Card, CardId, Collection, Deck, DeckConfig, DeckConfigId, DeckId, GlobalConfig, Grave,
    GraveKind, MediaEntry, MediaId, Model, ModelId, Note, NoteId, ReviewLog,
};
use indexmap::IndexMap;
use log::warn;

/// Owns every entity map plus the append-only revlog and grave vectors.
pub struct Store {
    pub collection: Collection,
    pub global_config: GlobalConfig,
    pub decks: IndexMap<DeckId, Deck>,
    pub deck_configs: IndexMap<DeckConfigId, DeckConfig>,
    pub models: IndexMap<ModelId, Model>,
    pub notes: IndexMap<NoteId, Note>,
    pub cards: IndexMap<CardId, Card>,
    pub media: IndexMap<MediaId, MediaEntry>,
    pub revlog: Vec<ReviewLog>,
    pub graves: Vec<Grave>,
    pub usn: i64,
    ids: IdGenerator,
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl Store {
    pub fn new() -> Self {
        let secs = now_secs();
        let ms = now_millis();
        let mut decks = IndexMap::new();
        decks.insert(
            entities::DEFAULT_DECK_ID,
            Deck {
                id: entities::DEFAULT_DECK_ID,
                name: "Default".to_string(),
                description: String::new(),
                config_id: 1,
                collapsed: false,
                modified_secs: secs,
            },
        );
        let mut deck_configs = IndexMap::new();
        deck_configs.insert(
            1,
            DeckConfig {
                id: 1,
                name: "Default".to_string(),
                ..Default::default()
            },
        );
        Self {
            collection: Collection::new(secs, ms),
            global_config: GlobalConfig::default(),
            decks,
            deck_configs,
            models: IndexMap::new(),
            notes: IndexMap::new(),
            cards: IndexMap::new(),
            media: IndexMap::new(),
            revlog: Vec::new(),
            graves: Vec::new(),
            usn: 0,
            ids: IdGenerator::new(),
        }
    }

    pub fn next_id(&mut self) -> i64 {
        self.ids.next(now_millis())
    }

    /// Returns the current `nextPos` and post-increments it. Used by note
    /// creation to materialize a new card's New-queue due position.
    pub fn increment_next_pos(&mut self) -> i64 {
        let pos = self.global_config.next_pos;
        self.global_config.next_pos += 1;
        pos
    }

    fn touch(&mut self) {
        self.collection.modified_ms = now_millis();
    }

    // ---- decks ----

    pub fn get_deck(&self, id: DeckId) -> Result<&Deck> {
        self.decks.get(&id).ok_or_else(|| {
            warn!("deck {id} not found");
            Error::NotFound { kind: "deck", id }
        })
    }

    pub fn add_deck(&mut self, mut deck: Deck) -> DeckId {
        if deck.id == 0 {
            deck.id = self.next_id();
        }
        let id = deck.id;
        self.decks.insert(id, deck);
        self.mirror_decks();
        id
    }

    /// Ensures `name` and every ancestor in its `::` hierarchy exist,
    /// creating any missing deck with default config.
    pub fn ensure_deck_hierarchy(&mut self, name: &str, default_config_id: DeckConfigId) -> DeckId {
        let mut last_id = entities::DEFAULT_DECK_ID;
        for ancestor in Deck::ancestor_chain(name) {
            if let Some(existing) = self.decks.values().find(|d| d.name == ancestor) {
                last_id = existing.id;
                continue;
            }
            let id = self.next_id();
            self.decks.insert(
                id,
                Deck {
                    id,
                    name: ancestor,
                    description: String::new(),
                    config_id: default_config_id,
                    collapsed: false,
                    modified_secs: now_secs(),
                },
            );
            last_id = id;
        }
        self.mirror_decks();
        last_id
    }

    /// Deletes a deck via [`DeckDeletion`]: cards in the deck are removed,
    /// notes left with no remaining cards are removed with them, then the
    /// deck itself is removed.
    pub fn delete_deck(&mut self, id: DeckId) -> Result<()> {
        DeckDeletion::plan(self, id)?.execute(self)
    }

    fn mirror_decks(&mut self) {
        if let Ok(json) = serde_json::to_string(&self.decks) {
            self.collection.decks_json = json;
        }
        if let Ok(json) = serde_json::to_string(&self.deck_configs) {
            self.collection.deck_configs_json = json;
        }
        self.touch();
    }

    // ---- deck configs ----

    pub fn get_deck_config(&self, id: DeckConfigId) -> Result<&DeckConfig> {
        self.deck_configs.get(&id).ok_or_else(|| {
            warn!("deck config {id} not found");
            Error::NotFound {
                kind: "deck_config",
                id,
            }
        })
    }

    pub fn add_deck_config(&mut self, mut config: DeckConfig) -> DeckConfigId {
        if config.id == 0 {
            config.id = self.next_id();
        }
        let id = config.id;
        self.deck_configs.insert(id, config);
        self.mirror_decks();
        id
    }

    // ---- models ----

    pub fn get_model(&self, id: ModelId) -> Result<&Model> {
        self.models.get(&id).ok_or_else(|| {
            warn!("model {id} not found");
            Error::NotFound { kind: "model", id }
        })
    }

    pub fn add_model(&mut self, mut model: Model) -> ModelId {
        if model.id == 0 {
            model.id = self.next_id();
        }
        let id = model.id;
        self.models.insert(id, model);
        if let Ok(json) = serde_json::to_string(&self.models) {
            self.collection.models_json = json;
        }
        self.touch();
        id
    }

    // ---- notes ----

    pub fn get_note(&self, id: NoteId) -> Result<&Note> {
        self.notes.get(&id).ok_or_else(|| {
            warn!("note {id} not found");
            Error::NotFound { kind: "note", id }
        })
    }

    pub fn add_note(&mut self, note: Note) -> NoteId {
        let id = note.id;
        self.notes.insert(id, note);
        self.touch();
        id
    }

    pub fn update_note(&mut self, id: NoteId, patch: impl FnOnce(&mut Note)) -> Result<()> {
        let note = self.notes.get_mut(&id).ok_or_else(|| {
            warn!("note {id} not found");
            Error::NotFound { kind: "note", id }
        })?;
        patch(note);
        note.modified_secs = now_secs();
        note.usn = -1;
        self.touch();
        Ok(())
    }

    pub fn delete_note(&mut self, id: NoteId) -> Result<()> {
        self.get_note(id)?;
        self.notes.shift_remove(&id);
        self.append_grave(id, GraveKind::Note);
        Ok(())
    }

    /// Orphaned notes: notes with no card referencing them. Logged once per
    /// scan, never removed automatically.
    pub fn orphan_note_ids(&self) -> Vec<NoteId> {
        let referenced: std::collections::HashSet<NoteId> =
            self.cards.values().map(|c| c.note_id).collect();
        self.notes
            .keys()
            .filter(|id| !referenced.contains(*id))
            .copied()
            .collect()
    }

    // ---- cards ----

    pub fn get_card(&self, id: CardId) -> Result<&Card> {
        self.cards.get(&id).ok_or_else(|| {
            warn!("card {id} not found");
            Error::NotFound { kind: "card", id }
        })
    }

    pub fn add_card(&mut self, card: Card) -> CardId {
        let id = card.id;
        self.cards.insert(id, card);
        self.touch();
        id
    }

    pub fn update_card(&mut self, id: CardId, patch: impl FnOnce(&mut Card)) -> Result<()> {
        let card = self.cards.get_mut(&id).ok_or_else(|| {
            warn!("card {id} not found");
            Error::NotFound { kind: "card", id }
        })?;
        patch(card);
        card.modified_secs = now_secs();
        card.usn = -1;
        self.touch();
        Ok(())
    }

    pub fn delete_card(&mut self, id: CardId) -> Result<()> {
        self.get_card(id)?;
        self.cards.shift_remove(&id);
        self.append_grave(id, GraveKind::Card);
        Ok(())
    }

    pub fn list_cards_by_deck(&self, deck_id: DeckId) -> Vec<&Card> {
        self.cards.values().filter(|c| c.deck_id == deck_id).collect()
    }

    pub fn list_cards_for_note(&self, note_id: NoteId) -> Vec<CardId> {
        self.cards
            .values()
            .filter(|c| c.note_id == note_id)
            .map(|c| c.id)
            .collect()
    }

    /// Cards whose `note_id` has no matching note. Data corruption; logged
    /// and skipped by scans, never by itself an error.
    pub fn orphan_card_ids(&self) -> Vec<CardId> {
        self.cards
            .values()
            .filter(|c| !self.notes.contains_key(&c.note_id))
            .map(|c| c.id)
            .collect()
    }

    // ---- revlog & graves ----

    pub fn append_revlog(&mut self, entry: ReviewLog) {
        self.revlog.push(entry);
    }

    pub fn revlog_for_card(&self, card_id: CardId) -> impl Iterator<Item = &ReviewLog> {
        self.revlog.iter().filter(move |r| r.card_id == card_id)
    }

    pub fn last_revlog_id_for_card(&self, card_id: CardId) -> Option<i64> {
        self.revlog_for_card(card_id).map(|r| r.id).max()
    }

    fn append_grave(&mut self, original_id: i64, kind: GraveKind) {
        self.usn += 1;
        self.graves.push(Grave {
            usn: self.usn,
            original_id,
            kind,
        });
    }

    /// Adopts the given snapshot-provided `nextPos` if it exceeds the
    /// current value. Imports never move `nextPos` downward.
    pub fn adopt_next_pos_if_greater(&mut self, candidate: i64) {
        if candidate > self.global_config.next_pos {
            self.global_config.next_pos = candidate;
        }
    }

    /// Raises the id generator's floor so imported/restored ids never
    /// collide with newly minted ones.
    pub fn seed_ids_from_existing(&mut self) {
        let max_card = self.cards.keys().copied().max().unwrap_or(0);
        let max_note = self.notes.keys().copied().max().unwrap_or(0);
        let max_model = self.models.keys().copied().max().unwrap_or(0);
        let max_deck = self.decks.keys().copied().max().unwrap_or(0);
        let max_revlog = self.revlog.iter().map(|r| r.id).max().unwrap_or(0);
        let max_media = self.media.keys().copied().max().unwrap_or(0);
        let ceiling = [max_card, max_note, max_model, max_deck, max_revlog, max_media]
            .into_iter()
            .max()
            .unwrap_or(0);
        self.ids.seed_from_max(ceiling);
    }
}

/// Two-phase deck deletion: [`DeckDeletion::plan`] enumerates affected cards
/// and the notes that would be left with no cards, then [`DeckDeletion::execute`]
/// applies that exact plan. Avoids a callback holding a stale borrow of
/// `Store` across the scan-then-mutate steps.
#[derive(Debug, Clone)]
pub struct DeckDeletion {
    deck_id: DeckId,
    card_ids: Vec<CardId>,
    orphaned_note_ids: Vec<NoteId>,
}

impl DeckDeletion {
    /// Builds a deletion plan for `deck_id`. Refuses to plan deletion of the
    /// default deck, which always exists.
    pub fn plan(store: &Store, deck_id: DeckId) -> Result<Self> {
        store.get_deck(deck_id)?;
        if deck_id == entities::DEFAULT_DECK_ID {
            return Err(Error::Validation("the default deck cannot be deleted".to_string()));
        }

        let card_ids: Vec<CardId> = store.list_cards_by_deck(deck_id).iter().map(|c| c.id).collect();
        let card_id_set: std::collections::HashSet<CardId> = card_ids.iter().copied().collect();

        let affected_note_ids: std::collections::HashSet<NoteId> = card_ids
            .iter()
            .filter_map(|id| store.get_card(*id).ok())
            .map(|c| c.note_id)
            .collect();
        let orphaned_note_ids: Vec<NoteId> = affected_note_ids
            .into_iter()
            .filter(|note_id| {
                store
                    .list_cards_for_note(*note_id)
                    .iter()
                    .all(|card_id| card_id_set.contains(card_id))
            })
            .collect();

        Ok(Self { deck_id, card_ids, orphaned_note_ids })
    }

    /// The cards that will be deleted by [`Self::execute`].
    pub fn card_ids(&self) -> &[CardId] {
        &self.card_ids
    }

    /// The notes that will be deleted alongside their last remaining card.
    pub fn orphaned_note_ids(&self) -> &[NoteId] {
        &self.orphaned_note_ids
    }

    /// Applies the plan: deletes every planned card, then every orphaned
    /// note, then the deck itself.
    pub fn execute(self, store: &mut Store) -> Result<()> {
        for card_id in &self.card_ids {
            store.delete_card(*card_id)?;
        }
        for note_id in &self.orphaned_note_ids {
            store.delete_note(*note_id)?;
        }
        store.decks.shift_remove(&self.deck_id);
        store.append_grave(self.deck_id, GraveKind::Deck);
        store.mirror_decks();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_store_has_default_deck() {
        let store = Store::new();
        assert_eq!(store.decks.len(), 1);
        assert!(store.decks.contains_key(&entities::DEFAULT_DECK_ID));
    }

    #[test]
    fn next_pos_increments() {
        let mut store = Store::new();
        assert_eq!(store.increment_next_pos(), 1);
        assert_eq!(store.increment_next_pos(), 2);
    }

    #[test]
    fn ensure_deck_hierarchy_creates_ancestors() {
        let mut store = Store::new();
        store.ensure_deck_hierarchy("A::B::C", 1);
        let names: std::collections::HashSet<_> =
            store.decks.values().map(|d| d.name.clone()).collect();
        assert!(names.contains("A"));
        assert!(names.contains("A::B"));
        assert!(names.contains("A::B::C"));
    }

    #[test]
    fn delete_card_appends_grave() {
        let mut store = Store::new();
        let card = Card::new(store.next_id(), 1, entities::DEFAULT_DECK_ID, 0, now_secs(), 1);
        let id = store.add_card(card);
        store.delete_card(id).unwrap();
        assert_eq!(store.graves.len(), 1);
        assert_eq!(store.graves[0].kind, GraveKind::Card);
    }

    #[test]
    fn orphan_card_detection() {
        let mut store = Store::new();
        let card = Card::new(store.next_id(), 999, entities::DEFAULT_DECK_ID, 0, now_secs(), 1);
        let id = store.add_card(card);
        assert_eq!(store.orphan_card_ids(), vec![id]);
    }

    #[test]
    fn delete_deck_cascades_cards_and_orphaned_notes() {
        let mut store = Store::new();
        let deck_id = store.add_deck(Deck {
            id: 0,
            name: "Doomed".to_string(),
            description: String::new(),
            config_id: 1,
            collapsed: false,
            modified_secs: now_secs(),
        });

        let note_id = store.next_id();
        store.add_note(Note {
            id: note_id,
            guid: "g".to_string(),
            model_id: 1,
            modified_secs: now_secs(),
            usn: -1,
            tags: " ".to_string(),
            flds: "front\u{1f}back".to_string(),
            sort_field: "front".to_string(),
            checksum: 0,
            data: String::new(),
        });
        let card_id = store.next_id();
        store.add_card(Card::new(card_id, note_id, deck_id, 0, now_secs(), 1));

        store.delete_deck(deck_id).unwrap();

        assert!(store.get_deck(deck_id).is_err());
        assert!(store.get_card(card_id).is_err());
        assert!(store.get_note(note_id).is_err(), "note's only card was deleted with the deck");
        assert_eq!(store.graves.iter().filter(|g| g.kind == GraveKind::Deck).count(), 1);
    }

    #[test]
    fn delete_deck_refuses_default_deck() {
        let mut store = Store::new();
        assert!(store.delete_deck(entities::DEFAULT_DECK_ID).is_err());
    }

    #[test]
    fn delete_deck_preserves_note_with_card_in_another_deck() {
        let mut store = Store::new();
        let deck_id = store.add_deck(Deck {
            id: 0,
            name: "Doomed".to_string(),
            description: String::new(),
            config_id: 1,
            collapsed: false,
            modified_secs: now_secs(),
        });

        let note_id = store.next_id();
        store.add_note(Note {
            id: note_id,
            guid: "g".to_string(),
            model_id: 1,
            modified_secs: now_secs(),
            usn: -1,
            tags: " ".to_string(),
            flds: "front\u{1f}back".to_string(),
            sort_field: "front".to_string(),
            checksum: 0,
            data: String::new(),
        });
        let doomed_card = store.next_id();
        store.add_card(Card::new(doomed_card, note_id, deck_id, 0, now_secs(), 1));
        let surviving_card = store.next_id();
        store.add_card(Card::new(surviving_card, note_id, entities::DEFAULT_DECK_ID, 1, now_secs(), 1));

        store.delete_deck(deck_id).unwrap();

        assert!(store.get_card(doomed_card).is_err());
        assert!(store.get_card(surviving_card).is_ok());
        assert!(store.get_note(note_id).is_ok(), "note still has a card in another deck");
    }
}
