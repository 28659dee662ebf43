//! Plain data entities owned by the [`super::Store`].
//!
//! Field names and numeric codes mirror the on-disk archive format (see the
//! crate's `.apkg` importer in [`crate::archive`]) so that entities round-trip
//! through both the JSON snapshot and an imported archive without a
//! translation layer.

use serde::{Deserialize, Serialize};

/// The byte that separates fields within [`Note::flds`].
pub const UNIT_SEPARATOR: char = '\u{1f}';

/// Id of the deck that always exists and cannot be renamed away from its
/// display name's hierarchy root.
pub const DEFAULT_DECK_ID: i64 = 1;

/// Floor below which a card's `factor` is never allowed to drop.
pub const MIN_FACTOR: i32 = 1300;

pub const DEFAULT_FACTOR: i32 = 2500;

pub const DEFAULT_ROLLOVER_HOUR: u32 = 4;

/// Interval, in days, at which a Review card is considered "mature" rather
/// than "young" for statistics purposes.
pub const MATURE_IVL_DAYS: i32 = 21;

pub type CardId = i64;
pub type NoteId = i64;
pub type DeckId = i64;
pub type DeckConfigId = i64;
pub type ModelId = i64;
pub type MediaId = i64;
pub type RevlogId = i64;

/// The single per-collection row. Decks, deck configs, models and the global
/// config are mirrored into its embedded JSON strings after every mutation
/// so that an exported snapshot carries everything an archive consumer would
/// expect to find in the `col` table.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Collection {
    /// Creation time, epoch seconds. Day-index arithmetic is relative to this.
    pub crt: i64,
    /// Last modification time, epoch milliseconds.
    pub modified_ms: i64,
    pub schema_version: i64,
    pub last_sync_ms: i64,
    pub decks_json: String,
    pub deck_configs_json: String,
    pub models_json: String,
    pub config_json: String,
}

impl Collection {
    pub fn new(now_secs: i64, now_ms: i64) -> Self {
        Self {
            crt: now_secs,
            modified_ms: now_ms,
            schema_version: 1,
            last_sync_ms: 0,
            decks_json: "{}".to_string(),
            deck_configs_json: "{}".to_string(),
            models_json: "{}".to_string(),
            config_json: "{}".to_string(),
        }
    }
}

/// Global scheduling and display preferences, distinct from the host-level
/// [`crate::config`] file.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct GlobalConfig {
    pub active_deck_ids: Vec<DeckId>,
    /// Monotonically increasing counter assigned to each new card as its
    /// initial New-queue due position.
    pub next_pos: i64,
    pub sort_field_index: i32,
    pub sort_backwards: bool,
    pub scheduler_version: i32,
    /// Hour (0-23) at which a new scheduling day begins.
    pub rollover_hour: u32,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            active_deck_ids: vec![DEFAULT_DECK_ID],
            next_pos: 1,
            sort_field_index: 0,
            sort_backwards: false,
            scheduler_version: 2,
            rollover_hour: DEFAULT_ROLLOVER_HOUR,
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Deck {
    pub id: DeckId,
    pub name: String,
    pub description: String,
    pub config_id: DeckConfigId,
    pub collapsed: bool,
    pub modified_secs: i64,
}

impl Deck {
    /// Splits `"A::B::C"` into `["A", "A::B", "A::B::C"]`, the set of decks
    /// that must exist for a deeply nested deck name to be valid.
    pub fn ancestor_chain(name: &str) -> Vec<String> {
        let parts: Vec<&str> = name.split("::").collect();
        (1..=parts.len()).map(|n| parts[..n].join("::")).collect()
    }
}

#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
pub enum LeechAction {
    TagOnly = 0,
    Suspend = 1,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct NewCardPolicy {
    /// Learning-step lengths, in minutes.
    pub delays: Vec<f64>,
    /// `[graduating_interval_days, easy_interval_days]`.
    pub ints: [i32; 2],
    pub initial_factor: i32,
    pub per_day: u32,
    pub order: u32,
}

impl Default for NewCardPolicy {
    fn default() -> Self {
        Self {
            delays: vec![1.0, 10.0],
            ints: [1, 4],
            initial_factor: DEFAULT_FACTOR,
            per_day: 20,
            order: 0,
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ReviewPolicy {
    pub per_day: u32,
    /// Factor bonus (×1000 units) added on an Easy review answer.
    pub ease4: i32,
    pub ivl_fct: f64,
    pub max_ivl: i32,
    /// Fraction (0.0-1.0) of the computed interval used as fuzz spread.
    pub fuzz: f64,
}

impl Default for ReviewPolicy {
    fn default() -> Self {
        Self {
            per_day: 200,
            ease4: 150,
            ivl_fct: 1.0,
            max_ivl: 36_500,
            fuzz: 0.05,
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct LapsePolicy {
    /// Relearning-step lengths, in minutes.
    pub delays: Vec<f64>,
    pub mult: f64,
    pub min_int: i32,
    pub leech_action: LeechAction,
    pub leech_fails: u32,
}

impl Default for LapsePolicy {
    fn default() -> Self {
        Self {
            delays: vec![10.0],
            mult: 0.5,
            min_int: 1,
            leech_action: LeechAction::TagOnly,
            leech_fails: 8,
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct DeckConfig {
    pub id: DeckConfigId,
    pub name: String,
    pub new: NewCardPolicy,
    pub review: ReviewPolicy,
    pub lapse: LapsePolicy,
}

#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[repr(u8)]
pub enum ModelType {
    Standard = 0,
    Cloze = 1,
    ImageOcclusion = 2,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ModelField {
    pub name: String,
    pub font: String,
    pub size: u32,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ModelTemplate {
    pub ord: i32,
    pub name: String,
    pub qfmt: String,
    pub afmt: String,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Model {
    pub id: ModelId,
    pub name: String,
    pub model_type: ModelType,
    pub fields: Vec<ModelField>,
    pub templates: Vec<ModelTemplate>,
    pub css: String,
    /// Index into `fields` used for the sort-field cache and checksum.
    pub sort_field_index: usize,
    pub modified_secs: i64,
}

#[derive(Clone, Copy, Debug, Deserialize, Serialize, Eq, PartialEq)]
#[repr(i8)]
pub enum CardType {
    New = 0,
    Learning = 1,
    Review = 2,
    Relearning = 3,
}

#[derive(Clone, Copy, Debug, Deserialize, Serialize, Eq, PartialEq)]
#[repr(i8)]
pub enum Queue {
    UserBuried = -3,
    SchedBuried = -2,
    Suspended = -1,
    New = 0,
    Learning = 1,
    Review = 2,
    DayLearn = 3,
}

#[derive(Clone, Copy, Debug, Deserialize, Serialize, Eq, PartialEq)]
#[repr(u8)]
pub enum Ease {
    Again = 1,
    Hard = 2,
    Good = 3,
    Easy = 4,
}

#[derive(Clone, Copy, Debug, Deserialize, Serialize, Eq, PartialEq)]
#[repr(u8)]
pub enum RevlogType {
    Learn = 0,
    Review = 1,
    Relearn = 2,
    Cram = 3,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Note {
    pub id: NoteId,
    pub guid: String,
    pub model_id: ModelId,
    pub modified_secs: i64,
    pub usn: i64,
    /// Space-surrounded, space-separated tag string, e.g. `" foo bar "`.
    pub tags: String,
    /// Fields joined by [`UNIT_SEPARATOR`].
    pub flds: String,
    pub sort_field: String,
    pub checksum: u32,
    /// Opaque model-specific payload (Image-Occlusion mask geometry JSON).
    pub data: String,
}

impl Note {
    pub fn fields(&self) -> Vec<&str> {
        self.flds.split(UNIT_SEPARATOR).collect()
    }

    pub fn tag_list(&self) -> Vec<&str> {
        self.tags.split_whitespace().collect()
    }

    pub fn encode_tags(tags: &[String]) -> String {
        if tags.is_empty() {
            " ".to_string()
        } else {
            format!(" {} ", tags.join(" "))
        }
    }

    pub fn encode_fields(fields: &[String]) -> String {
        fields.join(&UNIT_SEPARATOR.to_string())
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Card {
    pub id: CardId,
    pub note_id: NoteId,
    pub deck_id: DeckId,
    pub ord: i32,
    pub modified_secs: i64,
    pub usn: i64,
    pub card_type: CardType,
    pub queue: Queue,
    /// New: queue position. Learning/Relearning: epoch seconds. Review:
    /// days-since-collection-creation.
    pub due: i64,
    pub ivl: i32,
    pub factor: i32,
    pub reps: u32,
    pub lapses: u32,
    /// `reps_left * 1000 + steps_total` while in Learning/Relearning.
    pub left: i32,
    pub original_deck_id: DeckId,
    pub original_due: i64,
    pub flags: u32,
    pub data: String,
}

impl Card {
    pub fn new(id: CardId, note_id: NoteId, deck_id: DeckId, ord: i32, now_secs: i64, due: i64) -> Self {
        Self {
            id,
            note_id,
            deck_id,
            ord,
            modified_secs: now_secs,
            usn: -1,
            card_type: CardType::New,
            queue: Queue::New,
            due,
            ivl: 0,
            factor: DEFAULT_FACTOR,
            reps: 0,
            lapses: 0,
            left: 0,
            original_deck_id: 0,
            original_due: 0,
            flags: 0,
            data: String::new(),
        }
    }

    pub fn is_leech(&self, leech_fails: u32) -> bool {
        leech_fails > 0 && self.lapses >= leech_fails
    }

    pub fn is_mature(&self) -> bool {
        self.card_type == CardType::Review && self.ivl >= MATURE_IVL_DAYS
    }
}

/// Encodes `(reps_left, steps_total)` into [`Card::left`].
pub fn encode_left(reps_left: i32, steps_total: i32) -> i32 {
    reps_left * 1000 + steps_total
}

/// Decodes [`Card::left`] back into `(reps_left, steps_total)`.
pub fn decode_left(left: i32) -> (i32, i32) {
    (left / 1000, left % 1000)
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ReviewLog {
    /// Epoch milliseconds; strictly increasing within a single card.
    pub id: RevlogId,
    pub card_id: CardId,
    pub usn: i64,
    pub ease: Ease,
    /// Negative seconds for learning/relearning, positive days for review.
    pub ivl: i64,
    pub last_ivl: i64,
    pub factor: i32,
    /// Response time in milliseconds, clamped to `[0, 60000]`.
    pub time_ms: u32,
    pub revlog_type: RevlogType,
}

#[derive(Clone, Copy, Debug, Deserialize, Serialize, Eq, PartialEq)]
#[repr(u8)]
pub enum GraveKind {
    Card = 0,
    Note = 1,
    Deck = 2,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Grave {
    pub usn: i64,
    pub original_id: i64,
    pub kind: GraveKind,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct MediaEntry {
    pub id: MediaId,
    pub filename: String,
    pub mime: String,
    pub hash_hex: String,
    pub size_bytes: u64,
    pub local_uri: String,
    pub created_secs: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn left_round_trips() {
        assert_eq!(decode_left(encode_left(2, 3)), (2, 3));
        assert_eq!(decode_left(encode_left(0, 1)), (0, 1));
    }

    #[test]
    fn ancestor_chain_expands_hierarchy() {
        assert_eq!(
            Deck::ancestor_chain("A::B::C"),
            vec!["A".to_string(), "A::B".to_string(), "A::B::C".to_string()]
        );
        assert_eq!(Deck::ancestor_chain("Default"), vec!["Default".to_string()]);
    }

    #[test]
    fn note_field_and_tag_encoding() {
        let flds = Note::encode_fields(&["Front".to_string(), "Back".to_string()]);
        assert_eq!(flds, "Front\u{1f}Back");
        assert_eq!(Note::encode_tags(&[]), " ");
        assert_eq!(Note::encode_tags(&["a".to_string(), "b".to_string()]), " a b ");
    }
}
