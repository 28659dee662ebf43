//! Durable JSON snapshot persistence: the only filesystem surface the
//! [`super::Store`] itself owns.
//!
//! Saves are atomic (write to a sibling temp file, fsync, rename); loads
//! leave the store untouched on any parse failure, matching the teacher's
//! read-with-default-on-missing config pattern adapted to a whole-store
//! snapshot instead of a settings file.

use super::Store;
use super::entities::{
    Card, CardId, Collection, Deck, DeckConfig, DeckConfigId, DeckId, GlobalConfig, Grave,
    MediaEntry, MediaId, Model, ModelId, Note, NoteId, ReviewLog,
};
use crate::Error;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write as _;
use std::path::Path;

pub const SNAPSHOT_VERSION: i64 = 1;

#[derive(Deserialize, Serialize)]
struct SnapshotDoc {
    version: i64,
    col: Collection,
    cards: IndexMap<CardId, Card>,
    notes: IndexMap<NoteId, Note>,
    revlog: Vec<ReviewLog>,
    graves: Vec<Grave>,
    decks: IndexMap<DeckId, Deck>,
    deck_configs: IndexMap<DeckConfigId, DeckConfig>,
    models: IndexMap<ModelId, Model>,
    media: IndexMap<MediaId, MediaEntry>,
    col_config: GlobalConfig,
    usn: i64,
}

impl Store {
    /// Serializes every owned structure to a single JSON document.
    pub fn snapshot_to_json(&self) -> crate::Result<String> {
        let doc = SnapshotDoc {
            version: SNAPSHOT_VERSION,
            col: self.collection.clone(),
            cards: self.cards.clone(),
            notes: self.notes.clone(),
            revlog: self.revlog.clone(),
            graves: self.graves.clone(),
            decks: self.decks.clone(),
            deck_configs: self.deck_configs.clone(),
            models: self.models.clone(),
            media: self.media.clone(),
            col_config: self.global_config.clone(),
            usn: self.usn,
        };
        serde_json::to_string_pretty(&doc)
            .map_err(|e| Error::CorruptSnapshot(format!("failed to serialize snapshot: {e}")))
    }

    /// Replaces the store's contents from a previously saved snapshot.
    /// Leaves `self` unchanged if the JSON is malformed or missing a
    /// required top-level key.
    pub fn restore_from_json(&mut self, s: &str) -> crate::Result<()> {
        let doc: SnapshotDoc = serde_json::from_str(s)
            .map_err(|e| Error::CorruptSnapshot(format!("malformed snapshot: {e}")))?;
        if doc.version != SNAPSHOT_VERSION {
            return Err(Error::UnsupportedSchemaVersion(doc.version));
        }
        self.collection = doc.col;
        self.cards = doc.cards;
        self.notes = doc.notes;
        self.revlog = doc.revlog;
        self.graves = doc.graves;
        self.decks = doc.decks;
        self.deck_configs = doc.deck_configs;
        self.models = doc.models;
        self.media = doc.media;
        self.global_config = doc.col_config;
        self.usn = doc.usn;
        self.seed_ids_from_existing();
        Ok(())
    }

    /// Writes the snapshot atomically: temp file in the same directory,
    /// fsync, then rename over the destination.
    pub fn save_to_path(&self, path: impl AsRef<Path>) -> crate::Result<()> {
        let path = path.as_ref();
        let body = self.snapshot_to_json()?;
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let tmp_path = dir.join(format!(
            ".{}.tmp",
            path.file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("collection")
        ));
        let mut file = File::create(&tmp_path).map_err(|e| Error::IoFailure {
            description: format!("failed to create {}", tmp_path.display()),
            source: e,
        })?;
        file.write_all(body.as_bytes()).map_err(|e| Error::IoFailure {
            description: format!("failed to write {}", tmp_path.display()),
            source: e,
        })?;
        file.sync_all().map_err(|e| Error::IoFailure {
            description: format!("failed to fsync {}", tmp_path.display()),
            source: e,
        })?;
        std::fs::rename(&tmp_path, path).map_err(|e| Error::IoFailure {
            description: format!("failed to rename into {}", path.display()),
            source: e,
        })?;
        Ok(())
    }

    /// Loads a snapshot from `path`. A missing file yields a freshly
    /// initialized store rather than an error.
    pub fn load_from_path(path: impl AsRef<Path>) -> crate::Result<Store> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Store::new());
        }
        let body = std::fs::read_to_string(path).map_err(|e| Error::IoFailure {
            description: format!("failed to read {}", path.display()),
            source: e,
        })?;
        let mut store = Store::new();
        store.restore_from_json(&body)?;
        Ok(store)
    }
}
