//! Queue selection, per-deck daily-limit gating, sibling burial, and leech
//! detection. The answer state machine itself lives in [`answer`].

pub mod answer;

use crate::clock::day_index;
use crate::store::entities::{CardId, DeckId, NoteId, Queue};
use crate::store::Store;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};

pub use answer::{answer_card, AnswerOutcome};
pub use crate::store::entities::Ease;

/// Per-deck, per-day review/new counters. Owned by the host, not the Store,
/// since it is derived and resettable state rather than durable data.
#[derive(Default)]
pub struct TodayUsage {
    review_done: HashMap<(DeckId, i64), u32>,
    new_introduced: HashMap<(DeckId, i64), u32>,
}

impl TodayUsage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_review(&mut self, deck_id: DeckId, day: i64) {
        *self.review_done.entry((deck_id, day)).or_insert(0) += 1;
    }

    pub fn record_new(&mut self, deck_id: DeckId, day: i64) {
        *self.new_introduced.entry((deck_id, day)).or_insert(0) += 1;
    }

    pub fn review_remaining(&self, deck_id: DeckId, day: i64, per_day: u32) -> u32 {
        let done = self.review_done.get(&(deck_id, day)).copied().unwrap_or(0);
        per_day.saturating_sub(done)
    }

    pub fn new_remaining(&self, deck_id: DeckId, day: i64, per_day: u32) -> u32 {
        let done = self.new_introduced.get(&(deck_id, day)).copied().unwrap_or(0);
        per_day.saturating_sub(done)
    }

    pub fn clear(&mut self) {
        self.review_done.clear();
        self.new_introduced.clear();
    }
}

/// In-memory-only session bury set; never persisted.
#[derive(Default)]
pub struct BurySession {
    buried_notes: HashSet<NoteId>,
    stashed_queues: HashMap<CardId, Queue>,
}

impl BurySession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `card_id`'s note to the session bury set and stashes the queue
    /// of every other card sharing that note so they can be restored later.
    pub fn bury_siblings(&mut self, store: &mut Store, card_id: CardId) -> crate::Result<()> {
        let note_id = store.get_card(card_id)?.note_id;
        self.buried_notes.insert(note_id);
        let sibling_ids: Vec<CardId> = store
            .list_cards_for_note(note_id)
            .into_iter()
            .filter(|id| *id != card_id)
            .collect();
        for sibling_id in sibling_ids {
            let sibling = store.get_card(sibling_id)?;
            if !matches!(sibling.queue, Queue::UserBuried | Queue::SchedBuried) {
                self.stashed_queues.insert(sibling_id, sibling.queue);
                store.update_card(sibling_id, |c| c.queue = Queue::UserBuried)?;
            }
        }
        Ok(())
    }

    /// Restores every stashed queue and empties the session bury set.
    pub fn clear_buried(&mut self, store: &mut Store) -> crate::Result<()> {
        for (card_id, queue) in self.stashed_queues.drain() {
            if store.get_card(card_id).is_ok() {
                store.update_card(card_id, |c| c.queue = queue)?;
            }
        }
        self.buried_notes.clear();
        Ok(())
    }

    fn is_session_buried(&self, note_id: NoteId) -> bool {
        self.buried_notes.contains(&note_id)
    }
}

fn candidate_cards<'a>(
    store: &'a Store,
    deck_id: Option<DeckId>,
    session: &BurySession,
) -> Vec<&'a crate::store::entities::Card> {
    store
        .cards
        .values()
        .filter(|c| deck_id.is_none_or(|d| c.deck_id == d))
        .filter(|c| !matches!(c.queue, Queue::Suspended | Queue::UserBuried | Queue::SchedBuried))
        .filter(|c| !session.is_session_buried(c.note_id))
        .collect()
}

/// Returns up to `n` cards from the priority-ordered sequence: due Learning
/// first, then due Review (subject to the daily limit when `deck_id` is
/// given), then New (subject to the daily limit).
fn ordered_queue(
    store: &Store,
    deck_id: Option<DeckId>,
    session: &BurySession,
    usage: &TodayUsage,
    now: DateTime<Utc>,
    n: usize,
) -> Vec<CardId> {
    let rollover = store.global_config.rollover_hour;
    let now_secs = now.timestamp();
    let today = day_index(now, store.collection.crt, rollover);
    let candidates = candidate_cards(store, deck_id, session);

    let mut learning: Vec<&crate::store::entities::Card> = candidates
        .iter()
        .filter(|c| matches!(c.queue, Queue::Learning | Queue::DayLearn) && c.due <= now_secs)
        .copied()
        .collect();
    learning.sort_by_key(|c| c.due);

    let mut review: Vec<&crate::store::entities::Card> = candidates
        .iter()
        .filter(|c| c.queue == Queue::Review && c.due <= today)
        .copied()
        .collect();
    review.sort_by_key(|c| c.due);
    if let Some(deck_id) = deck_id {
        let config_id = store.get_deck(deck_id).map(|d| d.config_id).unwrap_or(1);
        let per_day = store
            .get_deck_config(config_id)
            .map(|c| c.review.per_day)
            .unwrap_or(0);
        let remaining = usage.review_remaining(deck_id, today, per_day) as usize;
        review.truncate(remaining);
    }

    let mut new: Vec<&crate::store::entities::Card> = candidates
        .iter()
        .filter(|c| c.queue == Queue::New)
        .copied()
        .collect();
    new.sort_by_key(|c| c.due);
    if let Some(deck_id) = deck_id {
        let config_id = store.get_deck(deck_id).map(|d| d.config_id).unwrap_or(1);
        let per_day = store
            .get_deck_config(config_id)
            .map(|c| c.new.per_day)
            .unwrap_or(0);
        let remaining = usage.new_remaining(deck_id, today, per_day) as usize;
        new.truncate(remaining);
    }

    learning
        .into_iter()
        .chain(review)
        .chain(new)
        .take(n)
        .map(|c| c.id)
        .collect()
}

/// Returns the next card the caller should present, or `None` if every
/// priority queue is empty.
pub fn pick_next(
    store: &Store,
    deck_id: Option<DeckId>,
    session: &BurySession,
    usage: &TodayUsage,
    now: DateTime<Utc>,
) -> Option<CardId> {
    ordered_queue(store, deck_id, session, usage, now, 1).into_iter().next()
}

/// Returns the second card in the same priority ordering `pick_next` uses.
pub fn peek_next(
    store: &Store,
    deck_id: Option<DeckId>,
    session: &BurySession,
    usage: &TodayUsage,
    now: DateTime<Utc>,
) -> Option<CardId> {
    ordered_queue(store, deck_id, session, usage, now, 2).into_iter().nth(1)
}
