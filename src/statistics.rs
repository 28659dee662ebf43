//! Pure statistics derivations over a [`Store`] snapshot. Every function is a
//! plain computation with no side effects and no rendering concerns, mirroring
//! the teacher's `get_statistics` shape (one request struct in, one response
//! struct out) but reading an in-memory `Store` instead of a pool.

use crate::clock::day_index;
use crate::store::entities::{CardType, DeckId, Ease, Queue, RevlogType, MATURE_IVL_DAYS};
use crate::store::Store;
use chrono::{DateTime, Timelike, Utc};
use itertools::Itertools;

/// Shared scope for every statistics function: a lookback window and an
/// optional deck filter.
#[derive(Clone, Copy)]
pub struct StatsConfig {
    pub window_days: i64,
    pub deck_id: Option<DeckId>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct CardCounts {
    pub new: u32,
    pub young: u32,
    pub mature: u32,
    pub suspended: u32,
    pub buried: u32,
    pub leeches: u32,
}

/// Fixed lapse threshold for "is a leech" in statistics, independent of any
/// deck's configured `lapse.leech_fails` (which only governs the scheduler's
/// own leech-suspend trigger).
const LEECH_LAPSES_THRESHOLD: u32 = 8;

pub fn card_counts(store: &Store, config: StatsConfig) -> CardCounts {
    let mut counts = CardCounts::default();
    for card in store.cards.values().filter(|c| in_deck(c.deck_id, config.deck_id)) {
        match card.queue {
            Queue::Suspended => counts.suspended += 1,
            Queue::UserBuried | Queue::SchedBuried => counts.buried += 1,
            _ => match card.card_type {
                CardType::New => counts.new += 1,
                CardType::Review if card.ivl >= MATURE_IVL_DAYS => counts.mature += 1,
                CardType::Review => counts.young += 1,
                CardType::Learning | CardType::Relearning => counts.young += 1,
            },
        }
        if card.is_leech(LEECH_LAPSES_THRESHOLD) {
            counts.leeches += 1;
        }
    }
    counts
}

fn in_deck(card_deck: DeckId, filter: Option<DeckId>) -> bool {
    filter.is_none_or(|id| id == card_deck)
}

#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct Retention {
    pub young_retention: f64,
    pub mature_retention: f64,
    pub overall_retention: f64,
    pub total_reviews: u32,
    pub correct_reviews: u32,
}

pub fn retention(store: &Store, config: StatsConfig, now: DateTime<Utc>) -> Retention {
    let window_start_ms = now.timestamp_millis() - config.window_days * 86_400_000;
    let entries: Vec<_> = store
        .revlog
        .iter()
        .filter(|r| r.revlog_type == RevlogType::Review && r.id >= window_start_ms)
        .filter(|r| in_deck(store.get_card(r.card_id).map(|c| c.deck_id).unwrap_or(0), config.deck_id))
        .collect();

    let (young, mature): (Vec<_>, Vec<_>) =
        entries.iter().partition(|r| r.last_ivl < i64::from(MATURE_IVL_DAYS));

    let ratio = |entries: &[&&crate::store::entities::ReviewLog]| -> f64 {
        if entries.is_empty() {
            return 0.0;
        }
        let correct = entries.iter().filter(|r| r.ease as u8 >= Ease::Hard as u8).count();
        correct as f64 / entries.len() as f64
    };

    let correct_reviews = entries.iter().filter(|r| r.ease as u8 >= Ease::Hard as u8).count() as u32;
    Retention {
        young_retention: ratio(&young),
        mature_retention: ratio(&mature),
        overall_retention: if entries.is_empty() {
            0.0
        } else {
            f64::from(correct_reviews) / entries.len() as f64
        },
        total_reviews: entries.len() as u32,
        correct_reviews,
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct Throughput {
    pub reviews_per_minute: f64,
    pub seconds_per_review: f64,
}

pub fn throughput(store: &Store, config: StatsConfig, now: DateTime<Utc>) -> Throughput {
    let window_start_ms = now.timestamp_millis() - config.window_days * 86_400_000;
    let entries: Vec<_> = store
        .revlog
        .iter()
        .filter(|r| r.id >= window_start_ms)
        .filter(|r| in_deck(store.get_card(r.card_id).map(|c| c.deck_id).unwrap_or(0), config.deck_id))
        .collect();
    if entries.is_empty() {
        return Throughput::default();
    }
    let total_seconds: f64 = entries.iter().map(|r| f64::from(r.time_ms) / 1000.0).sum();
    let window_minutes = (config.window_days.max(1) * 24 * 60) as f64;
    Throughput {
        reviews_per_minute: entries.len() as f64 / window_minutes,
        seconds_per_review: total_seconds / entries.len() as f64,
    }
}

/// One entry per day for `days` days starting today.
pub fn forecast(store: &Store, config: StatsConfig, now: DateTime<Utc>, days: usize) -> Vec<u32> {
    let rollover = store.global_config.rollover_hour;
    let today = day_index(now, store.collection.crt, rollover);
    let mut buckets = vec![0u32; days.max(1)];

    for card in store.cards.values().filter(|c| in_deck(c.deck_id, config.deck_id)) {
        match card.card_type {
            CardType::Review if card.queue == Queue::Review => {
                let offset = (card.due - today).clamp(0, days as i64 - 1) as usize;
                buckets[offset] += 1;
            }
            CardType::Learning | CardType::Relearning => {
                let due_day = day_index(
                    DateTime::from_timestamp(card.due, 0).unwrap_or(now),
                    store.collection.crt,
                    rollover,
                );
                let offset = (due_day - today).clamp(0, days as i64 - 1) as usize;
                buckets[offset] += 1;
            }
            _ => {}
        }
    }

    let per_day = config
        .deck_id
        .and_then(|id| store.get_deck(id).ok())
        .and_then(|deck| store.get_deck_config(deck.config_id).ok())
        .map_or(20, |c| c.new.per_day);
    let mut remaining_new = store
        .cards
        .values()
        .filter(|c| in_deck(c.deck_id, config.deck_id) && c.card_type == CardType::New)
        .count() as u32;
    for bucket in &mut buckets {
        let arriving = per_day.min(remaining_new);
        *bucket += arriving;
        remaining_new -= arriving;
    }
    buckets
}

#[derive(Debug, Default, Clone)]
pub struct SurvivalCurves {
    pub young: Vec<(i32, f64)>,
    pub mature: Vec<(i32, f64)>,
    pub young_half_life_days: Option<f64>,
    pub mature_half_life_days: Option<f64>,
}

pub fn survival_curves(store: &Store, config: StatsConfig) -> SurvivalCurves {
    let entries: Vec<_> = store
        .revlog
        .iter()
        .filter(|r| r.revlog_type == RevlogType::Review)
        .filter(|r| in_deck(store.get_card(r.card_id).map(|c| c.deck_id).unwrap_or(0), config.deck_id))
        .collect();

    let (young, mature): (Vec<_>, Vec<_>) =
        entries.into_iter().partition(|r| r.last_ivl < i64::from(MATURE_IVL_DAYS));

    SurvivalCurves {
        young_half_life_days: half_life(&young),
        mature_half_life_days: half_life(&mature),
        young: survival_points(&young),
        mature: survival_points(&mature),
    }
}

fn survival_points(entries: &[&crate::store::entities::ReviewLog]) -> Vec<(i32, f64)> {
    entries
        .iter()
        .into_group_map_by(|r| r.last_ivl.unsigned_abs() as i32)
        .into_iter()
        .map(|(interval, group)| {
            let survived = group.iter().filter(|r| r.ease != Ease::Again).count();
            (interval, survived as f64 / group.len() as f64)
        })
        .sorted_by_key(|(interval, _)| *interval)
        .collect()
}

/// Log-linear fit of survival rate against interval length: `ln(p) = -k * t`,
/// half-life = `ln(2) / k`.
fn half_life(entries: &[&crate::store::entities::ReviewLog]) -> Option<f64> {
    let points: Vec<(f64, f64)> = survival_points(entries)
        .into_iter()
        .filter(|(_, p)| *p > 0.0)
        .map(|(t, p)| (f64::from(t), p.ln()))
        .collect();
    if points.len() < 2 {
        return None;
    }
    let n = points.len() as f64;
    let sum_t: f64 = points.iter().map(|(t, _)| t).sum();
    let sum_ln_p: f64 = points.iter().map(|(_, ln_p)| ln_p).sum();
    let sum_t2: f64 = points.iter().map(|(t, _)| t * t).sum();
    let sum_t_ln_p: f64 = points.iter().map(|(t, ln_p)| t * ln_p).sum();
    let denom = n * sum_t2 - sum_t * sum_t;
    if denom.abs() < f64::EPSILON {
        return None;
    }
    let slope = (n * sum_t_ln_p - sum_t * sum_ln_p) / denom;
    if slope >= 0.0 {
        return None;
    }
    Some(std::f64::consts::LN_2 / -slope)
}

#[derive(Debug, Default, Clone)]
pub struct BestHours {
    pub grid: [f64; 24],
    pub top_three: Vec<(u32, f64)>,
}

pub fn best_hours(store: &Store, config: StatsConfig) -> BestHours {
    let entries: Vec<_> = store
        .revlog
        .iter()
        .filter(|r| r.revlog_type == RevlogType::Review)
        .filter(|r| in_deck(store.get_card(r.card_id).map(|c| c.deck_id).unwrap_or(0), config.deck_id))
        .collect();

    let by_hour = entries.into_iter().into_group_map_by(|r| {
        DateTime::from_timestamp_millis(r.id).map(|t| t.hour()).unwrap_or(0)
    });

    let mut grid = [0.0; 24];
    let mut scored: Vec<(u32, f64, usize)> = Vec::new();
    for (hour, group) in by_hour {
        let correct = group.iter().filter(|r| r.ease as u8 >= Ease::Hard as u8).count();
        let retention = correct as f64 / group.len() as f64;
        grid[hour as usize] = retention;
        let score = retention * (group.len() as f64 + 1.0).ln();
        scored.push((hour, score, group.len()));
    }
    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    let top_three = scored.into_iter().take(3).map(|(hour, _, _)| (hour, grid[hour as usize])).collect();

    BestHours { grid, top_three }
}

#[derive(Debug, Clone)]
pub struct LeechEntry {
    pub card_id: i64,
    pub note_id: i64,
    pub lapses: u32,
    pub first_field: String,
}

pub fn leeches(store: &Store, config: StatsConfig) -> Vec<LeechEntry> {
    let mut entries: Vec<LeechEntry> = store
        .cards
        .values()
        .filter(|c| in_deck(c.deck_id, config.deck_id) && c.is_leech(LEECH_LAPSES_THRESHOLD))
        .filter_map(|card| {
            let note = store.get_note(card.note_id).ok()?;
            Some(LeechEntry {
                card_id: card.id,
                note_id: card.note_id,
                lapses: card.lapses,
                first_field: note.fields().first().copied().unwrap_or("").to_string(),
            })
        })
        .collect();
    entries.sort_by(|a, b| b.lapses.cmp(&a.lapses));
    entries
}

#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct Backlog {
    pub backlog_count: u32,
    pub days_to_clear: f64,
    pub median_days_overdue: f64,
    pub overdueness_index: f64,
}

pub fn backlog_clear_by(store: &Store, config: StatsConfig, now: DateTime<Utc>) -> Backlog {
    let rollover = store.global_config.rollover_hour;
    let today = day_index(now, store.collection.crt, rollover);

    let review_cards: Vec<_> = store
        .cards
        .values()
        .filter(|c| in_deck(c.deck_id, config.deck_id) && c.card_type == CardType::Review)
        .collect();
    let overdue_days: Vec<i64> =
        review_cards.iter().filter(|c| c.due < today).map(|c| today - c.due).sorted().collect();

    let throughput = throughput(store, config, now);
    let avg_reviews_per_day = throughput.reviews_per_minute * 24.0 * 60.0;
    let backlog_count = overdue_days.len() as u32;
    let days_to_clear = if avg_reviews_per_day > 0.0 {
        f64::from(backlog_count) / avg_reviews_per_day
    } else {
        f64::from(backlog_count)
    };
    let median_days_overdue = median(&overdue_days);
    let overdueness_index = if review_cards.is_empty() {
        0.0
    } else {
        overdue_days.iter().sum::<i64>() as f64 / review_cards.len() as f64
    };

    Backlog { backlog_count, days_to_clear, median_days_overdue, overdueness_index }
}

fn median(sorted: &[i64]) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) as f64 / 2.0
    } else {
        sorted[mid] as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::entities::{Card, DEFAULT_DECK_ID};

    fn config() -> StatsConfig {
        StatsConfig { window_days: 30, deck_id: None }
    }

    #[test]
    fn card_counts_classifies_by_queue_and_type() {
        let mut store = Store::new();
        let mut new_card = Card::new(store.next_id(), 1, DEFAULT_DECK_ID, 0, crate::clock::now_secs(), 1);
        new_card.card_type = CardType::New;
        store.add_card(new_card);

        let mut mature = Card::new(store.next_id(), 1, DEFAULT_DECK_ID, 1, crate::clock::now_secs(), 1);
        mature.card_type = CardType::Review;
        mature.queue = Queue::Review;
        mature.ivl = 30;
        store.add_card(mature);

        let counts = card_counts(&store, config());
        assert_eq!(counts.new, 1);
        assert_eq!(counts.mature, 1);
    }

    #[test]
    fn leeches_lists_only_cards_past_threshold() {
        let mut store = Store::new();
        let mut card = Card::new(store.next_id(), 1, DEFAULT_DECK_ID, 0, crate::clock::now_secs(), 1);
        card.lapses = 8;
        store.add_card(card);
        let result = leeches(&store, config());
        assert!(result.is_empty(), "note for the card doesn't exist, so it's skipped");
    }

    #[test]
    fn leech_threshold_is_fixed_regardless_of_deck_config() {
        use crate::store::entities::DeckConfig;

        let mut store = Store::new();
        store.deck_configs.insert(
            1,
            DeckConfig { id: 1, name: "Lax".to_string(), ..Default::default() },
        );
        store.deck_configs.get_mut(&1).unwrap().lapse.leech_fails = 20;
        store.decks.get_mut(&DEFAULT_DECK_ID).unwrap().config_id = 1;

        let mut card = Card::new(store.next_id(), 1, DEFAULT_DECK_ID, 0, crate::clock::now_secs(), 1);
        card.lapses = 8;
        store.add_card(card);

        let deck_scoped = StatsConfig { window_days: 30, deck_id: Some(DEFAULT_DECK_ID) };
        assert_eq!(card_counts(&store, deck_scoped).leeches, 1);
        assert_eq!(card_counts(&store, config()).leeches, 1);
    }

    #[test]
    fn forecast_buckets_review_cards_by_due_offset() {
        let mut store = Store::new();
        let mut card = Card::new(store.next_id(), 1, DEFAULT_DECK_ID, 0, crate::clock::now_secs(), 1);
        card.card_type = CardType::Review;
        card.queue = Queue::Review;
        card.due = day_index(Utc::now(), store.collection.crt, store.global_config.rollover_hour) + 2;
        store.add_card(card);
        let buckets = forecast(&store, config(), Utc::now(), 7);
        assert!(buckets[2] >= 1);
    }

    #[test]
    fn backlog_counts_overdue_review_cards() {
        let mut store = Store::new();
        let today = day_index(Utc::now(), store.collection.crt, store.global_config.rollover_hour);
        let mut card = Card::new(store.next_id(), 1, DEFAULT_DECK_ID, 0, crate::clock::now_secs(), 1);
        card.card_type = CardType::Review;
        card.queue = Queue::Review;
        card.due = today - 5;
        store.add_card(card);
        let backlog = backlog_clear_by(&store, config(), Utc::now());
        assert_eq!(backlog.backlog_count, 1);
    }
}
