//! The per-ease card state machine and revlog emission.
//!
//! Mirrors the teacher's `schedule()` contract (card + history in, updated
//! card + a new log entry out) but implements the classic New/Learning/
//! Review/Relearning graph instead of FSRS memory-state folding.

use crate::clock::{day_index, now_millis};
use crate::store::entities::{
    decode_left, encode_left, Card, CardId, CardType, DeckConfig, Ease, Queue, ReviewLog,
    RevlogType, MIN_FACTOR,
};
use crate::store::Store;
use crate::Result;
use chrono::{DateTime, Utc};
use log::debug;

pub struct AnswerOutcome {
    pub card: Card,
    pub log: ReviewLog,
    pub became_leech: bool,
}

/// Applies `ease` to `card_id` at `now`, with `response_time_ms` recorded on
/// the revlog entry. `rng` is consulted only for review-interval fuzz.
pub fn answer_card(
    store: &mut Store,
    card_id: CardId,
    ease: Ease,
    response_time_ms: u32,
    now: DateTime<Utc>,
    rng: &mut dyn FnMut() -> f64,
) -> Result<AnswerOutcome> {
    let before = store.get_card(card_id)?.clone();
    let deck = store.get_deck(before.deck_id)?.clone();
    let config = store.get_deck_config(deck.config_id)?.clone();

    let rollover = store.global_config.rollover_hour;
    let today = day_index(now, store.collection.crt, rollover);
    let time_ms = response_time_ms.min(60_000);

    let (mut after, revlog_type) = match before.card_type {
        CardType::New => apply_new(&before, &config, ease, now),
        CardType::Learning => apply_learning(&before, &config, ease, now),
        CardType::Review => apply_review(&before, &config, ease, now, today, rng),
        CardType::Relearning => apply_relearning(&before, &config, ease, now, today),
    };

    let last_ivl = revlog_ivl(&before);
    let ivl = revlog_ivl(&after);

    let id = match store.last_revlog_id_for_card(card_id) {
        Some(prev) if prev >= now_millis() => prev + 1,
        _ => now_millis(),
    };
    let log = ReviewLog {
        id,
        card_id,
        usn: -1,
        ease,
        ivl,
        last_ivl,
        factor: after.factor,
        time_ms,
        revlog_type,
    };

    let mut became_leech = false;
    if before.card_type == CardType::Review && ease == Ease::Again {
        after.lapses += 1;
        let leech_fails = config.lapse.leech_fails;
        if leech_fails > 0 && after.lapses % leech_fails == 0 {
            became_leech = true;
            match config.lapse.leech_action {
                crate::store::entities::LeechAction::TagOnly => {}
                crate::store::entities::LeechAction::Suspend => after.queue = Queue::Suspended,
            }
        }
    }

    debug!(
        "card {card_id} answered {ease:?}: {:?}/{} -> {:?}/{} (ivl {} -> {})",
        before.card_type, before.queue as i8, after.card_type, after.queue as i8, before.ivl, after.ivl
    );

    store.update_card(card_id, |c| *c = after.clone())?;
    store.append_revlog(log.clone());

    Ok(AnswerOutcome { card: after, log, became_leech })
}

fn revlog_ivl(card: &Card) -> i64 {
    match card.card_type {
        CardType::Learning | CardType::Relearning => -(card.due.max(0)),
        _ => i64::from(card.ivl),
    }
}

fn apply_new(card: &Card, config: &DeckConfig, ease: Ease, now: DateTime<Utc>) -> (Card, RevlogType) {
    let mut card = card.clone();
    card.reps += 1;
    match ease {
        Ease::Again => {
            card.card_type = CardType::Learning;
            card.queue = Queue::Learning;
            card.factor = config.new.initial_factor;
            let delay = config.new.delays.first().copied().unwrap_or(1.0);
            card.due = now.timestamp() + (delay * 60.0) as i64;
            card.left = encode_left(config.new.delays.len() as i32, config.new.delays.len() as i32);
        }
        Ease::Good => {
            if config.new.delays.len() > 1 {
                card.card_type = CardType::Learning;
                card.queue = Queue::Learning;
                card.factor = config.new.initial_factor;
                let delay = config.new.delays[1];
                card.due = now.timestamp() + (delay * 60.0) as i64;
                card.left = encode_left(
                    config.new.delays.len() as i32 - 1,
                    config.new.delays.len() as i32,
                );
            } else {
                graduate(&mut card, config.new.ints[0], now);
            }
        }
        Ease::Hard => {
            // Hard on a brand-new card behaves like Again in the classic
            // algorithm: there is no intermediate step defined for it.
            card.card_type = CardType::Learning;
            card.queue = Queue::Learning;
            card.factor = config.new.initial_factor;
            let delay = config.new.delays.first().copied().unwrap_or(1.0);
            card.due = now.timestamp() + (delay * 60.0) as i64;
            card.left = encode_left(config.new.delays.len() as i32, config.new.delays.len() as i32);
        }
        Ease::Easy => {
            graduate(&mut card, config.new.ints[1], now);
            card.factor += config.review.ease4;
        }
    }
    (card, RevlogType::Learn)
}

fn graduate(card: &mut Card, ivl_days: i32, now: DateTime<Utc>) {
    card.card_type = CardType::Review;
    card.queue = Queue::Review;
    card.ivl = ivl_days;
    card.left = 0;
    let _ = now;
}

fn apply_learning(card: &Card, config: &DeckConfig, ease: Ease, now: DateTime<Utc>) -> (Card, RevlogType) {
    let mut card = card.clone();
    card.reps += 1;
    let (reps_left, steps_total) = decode_left(card.left);
    let step_idx = steps_total - reps_left;

    match ease {
        Ease::Again => {
            card.factor = config.new.initial_factor;
            let delay = config.new.delays.first().copied().unwrap_or(1.0);
            card.due = now.timestamp() + (delay * 60.0) as i64;
            card.left = encode_left(config.new.delays.len() as i32, config.new.delays.len() as i32);
        }
        Ease::Hard => {
            let delay = config.new.delays.get(step_idx as usize).copied().unwrap_or(1.0);
            card.due = now.timestamp() + (delay * 60.0) as i64;
        }
        Ease::Good => {
            if (step_idx + 1) < config.new.delays.len() as i32 {
                let next_idx = step_idx + 1;
                let delay = config.new.delays[next_idx as usize];
                card.due = now.timestamp() + (delay * 60.0) as i64;
                card.left = encode_left(steps_total - next_idx, steps_total);
            } else {
                graduate(&mut card, config.new.ints[0], now);
            }
        }
        Ease::Easy => {
            graduate(&mut card, config.new.ints[1], now);
            card.factor += config.review.ease4;
        }
    }
    (card, RevlogType::Learn)
}

fn apply_review(
    card: &Card,
    config: &DeckConfig,
    ease: Ease,
    now: DateTime<Utc>,
    today: i64,
    rng: &mut dyn FnMut() -> f64,
) -> (Card, RevlogType) {
    let mut card = card.clone();
    card.reps += 1;
    let old_ivl = card.ivl;

    if ease == Ease::Again {
        card.factor = (card.factor - 200).max(MIN_FACTOR);
        card.ivl = ((f64::from(old_ivl) * config.lapse.mult).floor() as i32).max(1);
        card.card_type = CardType::Relearning;
        card.queue = Queue::Learning;
        let delay = config.lapse.delays.first().copied().unwrap_or(10.0);
        card.due = now.timestamp() + (delay * 60.0) as i64;
        card.left = encode_left(config.lapse.delays.len() as i32, config.lapse.delays.len() as i32);
        return (card, RevlogType::Review);
    }

    let mut new_ivl = match ease {
        Ease::Hard => {
            card.factor = (card.factor - 150).max(MIN_FACTOR);
            (f64::from(old_ivl) * 1.2 * config.review.ivl_fct).ceil() as i32
        }
        Ease::Good => {
            (f64::from(old_ivl) * (f64::from(card.factor) / 1000.0) * config.review.ivl_fct).ceil() as i32
        }
        Ease::Easy => {
            card.factor += config.review.ease4;
            (f64::from(old_ivl) * (f64::from(card.factor) / 1000.0) * config.review.ivl_fct * 1.3).ceil() as i32
        }
        Ease::Again => unreachable!("handled above"),
    };

    if new_ivl >= 2 {
        let spread = (f64::from(new_ivl) * config.review.fuzz).floor() as i32;
        if spread > 0 {
            let low = new_ivl - spread;
            let high = new_ivl + spread;
            let roll = rng();
            new_ivl = low + ((f64::from(high - low + 1) * roll) as i32).min(high - low);
        }
    }
    new_ivl = new_ivl.min(config.review.max_ivl);
    new_ivl = new_ivl.max(old_ivl + 1);

    card.ivl = new_ivl;
    card.due = today + i64::from(new_ivl);
    (card, RevlogType::Review)
}

fn apply_relearning(card: &Card, config: &DeckConfig, ease: Ease, now: DateTime<Utc>, today: i64) -> (Card, RevlogType) {
    let mut card = card.clone();
    card.reps += 1;
    let (reps_left, steps_total) = decode_left(card.left);
    let step_idx = steps_total - reps_left;

    match ease {
        Ease::Again => {
            let delay = config.lapse.delays.first().copied().unwrap_or(10.0);
            card.due = now.timestamp() + (delay * 60.0) as i64;
            card.left = encode_left(config.lapse.delays.len() as i32, config.lapse.delays.len() as i32);
        }
        Ease::Hard => {
            let delay = config.lapse.delays.get(step_idx as usize).copied().unwrap_or(10.0);
            card.due = now.timestamp() + (delay * 60.0) as i64;
        }
        Ease::Good | Ease::Easy => {
            if (step_idx + 1) < config.lapse.delays.len() as i32 && ease == Ease::Good {
                let next_idx = step_idx + 1;
                let delay = config.lapse.delays[next_idx as usize];
                card.due = now.timestamp() + (delay * 60.0) as i64;
                card.left = encode_left(steps_total - next_idx, steps_total);
            } else {
                card.card_type = CardType::Review;
                card.queue = Queue::Review;
                card.ivl = config.lapse.min_int.max(card.ivl);
                card.left = 0;
                card.due = today + i64::from(card.ivl);
            }
        }
    }
    (card, RevlogType::Relearn)
}
