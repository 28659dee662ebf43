//! End-to-end scenarios exercising the full object graph: a `Collection`
//! built from scratch, notes created against real models, and cards taken
//! through the scheduler exactly as a host application would drive them.

use chrono::Utc;
use collection_core::notes::{self, NotePatch};
use collection_core::scheduler::{answer_card, BurySession, Ease, TodayUsage};
use collection_core::store::entities::{
    CardType, DeckConfig, Model, ModelField, ModelTemplate, ModelType, Queue, DEFAULT_DECK_ID,
};
use collection_core::Collection;
use pretty_assertions::assert_eq;
use std::path::PathBuf;

fn temp_media_dir(label: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "collection_core_scenarios_{label}_{}_{}",
        std::process::id(),
        collection_core::clock::now_millis()
    ));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn basic_model(collection: &mut Collection) -> i64 {
    collection.store.add_model(Model {
        id: 0,
        name: "Basic".to_string(),
        model_type: ModelType::Standard,
        fields: vec![
            ModelField { name: "Front".to_string(), font: "Arial".to_string(), size: 20 },
            ModelField { name: "Back".to_string(), font: "Arial".to_string(), size: 20 },
        ],
        templates: vec![ModelTemplate {
            ord: 0,
            name: "Card 1".to_string(),
            qfmt: "{{Front}}".to_string(),
            afmt: "{{Back}}".to_string(),
        }],
        css: String::new(),
        sort_field_index: 0,
        modified_secs: collection_core::clock::now_secs(),
    })
}

fn cloze_model(collection: &mut Collection) -> i64 {
    collection.store.add_model(Model {
        id: 0,
        name: "Cloze".to_string(),
        model_type: ModelType::Cloze,
        fields: vec![ModelField { name: "Text".to_string(), font: "Arial".to_string(), size: 20 }],
        templates: vec![ModelTemplate {
            ord: 0,
            name: "Cloze".to_string(),
            qfmt: "{{cloze:Text}}".to_string(),
            afmt: "{{cloze:Text}}".to_string(),
        }],
        css: String::new(),
        sort_field_index: 0,
        modified_secs: collection_core::clock::now_secs(),
    })
}

#[test]
fn new_card_graduates_on_easy_with_expected_interval_and_factor() {
    let dir = temp_media_dir("graduate_easy");
    let mut collection = Collection::new(&dir);
    let model_id = basic_model(&mut collection);
    let note_id = notes::create(
        &mut collection.store,
        model_id,
        DEFAULT_DECK_ID,
        vec!["Q".to_string(), "A".to_string()],
        vec![],
        None,
    )
    .unwrap();
    let card_id = collection.store.list_cards_for_note(note_id)[0];

    let mut rng = || 0.5;
    let outcome =
        answer_card(&mut collection.store, card_id, Ease::Easy, 2_500, Utc::now(), &mut rng).unwrap();

    assert_eq!(outcome.card.card_type, CardType::Review);
    assert_eq!(outcome.card.ivl, 4);
    assert_eq!(outcome.card.factor, 2_650);
    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn review_lapse_halves_interval_and_increments_lapses() {
    let dir = temp_media_dir("lapse");
    let mut collection = Collection::new(&dir);
    let model_id = basic_model(&mut collection);
    let note_id = notes::create(
        &mut collection.store,
        model_id,
        DEFAULT_DECK_ID,
        vec!["Q".to_string(), "A".to_string()],
        vec![],
        None,
    )
    .unwrap();
    let card_id = collection.store.list_cards_for_note(note_id)[0];
    collection
        .store
        .update_card(card_id, |c| {
            c.card_type = CardType::Review;
            c.queue = Queue::Review;
            c.ivl = 20;
            c.factor = 2_500;
        })
        .unwrap();

    let mut rng = || 0.5;
    let outcome =
        answer_card(&mut collection.store, card_id, Ease::Again, 3_000, Utc::now(), &mut rng).unwrap();

    assert_eq!(outcome.card.ivl, 10);
    assert_eq!(outcome.card.factor, 2_300);
    assert_eq!(outcome.card.lapses, 1);
    assert!(outcome.log.ivl < 0, "learning/relearning transitions log a negative seconds interval");
    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn cloze_note_produces_one_card_per_distinct_cloze_index() {
    let dir = temp_media_dir("cloze");
    let mut collection = Collection::new(&dir);
    let model_id = cloze_model(&mut collection);
    let note_id = notes::create(
        &mut collection.store,
        model_id,
        DEFAULT_DECK_ID,
        vec!["The capital of {{c1::France}} is {{c2::Paris}}.".to_string()],
        vec![],
        None,
    )
    .unwrap();
    let mut ords: Vec<i32> = collection
        .store
        .list_cards_for_note(note_id)
        .iter()
        .map(|id| collection.store.get_card(*id).unwrap().ord)
        .collect();
    ords.sort_unstable();
    assert_eq!(ords, vec![0, 1]);
    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn media_with_identical_bytes_dedups_to_one_entry() {
    let dir = temp_media_dir("media_dedup");
    let mut collection = Collection::new(&dir);
    let src_a = dir.join("a.jpg");
    let src_b = dir.join("b.jpg");
    std::fs::write(&src_a, b"identical pixels").unwrap();
    std::fs::write(&src_b, b"identical pixels").unwrap();

    let entry_a = collection.media.add(&src_a, Some("a.jpg")).unwrap();
    let entry_b = collection.media.add(&src_b, Some("b.jpg")).unwrap();
    assert_eq!(entry_a.id, entry_b.id);
    assert_eq!(collection.media.entries().len(), 1);
    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn deleting_one_note_preserves_media_still_referenced_by_another() {
    let dir = temp_media_dir("orphan_sweep");
    let mut collection = Collection::new(&dir);
    let model_id = basic_model(&mut collection);
    let src = dir.join("shared.jpg");
    std::fs::write(&src, b"shared content").unwrap();
    collection.media.add(&src, Some("shared.jpg")).unwrap();

    let note_a = notes::create(
        &mut collection.store,
        model_id,
        DEFAULT_DECK_ID,
        vec!["<img src=\"shared.jpg\">".to_string(), "A".to_string()],
        vec![],
        None,
    )
    .unwrap();
    let note_b = notes::create(
        &mut collection.store,
        model_id,
        DEFAULT_DECK_ID,
        vec!["<img src=\"shared.jpg\">".to_string(), "B".to_string()],
        vec![],
        None,
    )
    .unwrap();

    notes::delete(&mut collection.store, note_a, &mut collection.media).unwrap();
    assert_eq!(collection.media.entries().len(), 1, "note_b still references shared.jpg");

    notes::delete(&mut collection.store, note_b, &mut collection.media).unwrap();
    assert_eq!(collection.media.entries().len(), 0);
    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn daily_new_card_limit_is_respected_across_the_queue() {
    let dir = temp_media_dir("daily_limit");
    let mut collection = Collection::new(&dir);
    let model_id = basic_model(&mut collection);
    collection.store.deck_configs.insert(
        1,
        DeckConfig {
            id: 1,
            name: "Default".to_string(),
            ..Default::default()
        },
    );
    collection.store.deck_configs.get_mut(&1).unwrap().new.per_day = 2;

    for i in 0..5 {
        notes::create(
            &mut collection.store,
            model_id,
            DEFAULT_DECK_ID,
            vec![format!("Q{i}"), format!("A{i}")],
            vec![],
            None,
        )
        .unwrap();
    }

    let session = BurySession::new();
    let mut usage = TodayUsage::new();
    let today = collection_core::clock::day_index(
        Utc::now(),
        collection.store.collection.crt,
        collection.store.global_config.rollover_hour,
    );

    let mut seen = std::collections::HashSet::new();
    for _ in 0..2 {
        let next =
            collection_core::scheduler::pick_next(&collection.store, Some(DEFAULT_DECK_ID), &session, &usage, Utc::now())
                .expect("within the daily limit a new card should still be available");
        seen.insert(next);
        usage.record_new(DEFAULT_DECK_ID, today);
    }
    assert_eq!(seen.len(), 2);
    assert!(
        collection_core::scheduler::pick_next(&collection.store, Some(DEFAULT_DECK_ID), &session, &usage, Utc::now())
            .is_none(),
        "a sixth pick should exceed the per-day limit of 2"
    );
    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn revlog_ids_strictly_increase_across_repeated_answers_on_one_card() {
    let dir = temp_media_dir("revlog_monotone");
    let mut collection = Collection::new(&dir);
    let model_id = basic_model(&mut collection);
    let note_id = notes::create(
        &mut collection.store,
        model_id,
        DEFAULT_DECK_ID,
        vec!["Q".to_string(), "A".to_string()],
        vec![],
        None,
    )
    .unwrap();
    let card_id = collection.store.list_cards_for_note(note_id)[0];

    let mut rng = || 0.5;
    let mut last_id = i64::MIN;
    for _ in 0..4 {
        let outcome =
            answer_card(&mut collection.store, card_id, Ease::Good, 1_000, Utc::now(), &mut rng).unwrap();
        assert!(outcome.log.id > last_id);
        last_id = outcome.log.id;
    }
    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn note_field_count_must_match_model_on_update() {
    let dir = temp_media_dir("field_count_invariant");
    let mut collection = Collection::new(&dir);
    let model_id = basic_model(&mut collection);
    let note_id = notes::create(
        &mut collection.store,
        model_id,
        DEFAULT_DECK_ID,
        vec!["Q".to_string(), "A".to_string()],
        vec![],
        None,
    )
    .unwrap();

    let result = notes::update(
        &mut collection.store,
        note_id,
        NotePatch { fields: Some(vec!["only one field".to_string()]), tags: None, data: None },
    );
    assert!(result.is_err());
    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn non_again_review_answers_always_grow_the_interval() {
    let dir = temp_media_dir("monotone_growth");
    let mut collection = Collection::new(&dir);
    let model_id = basic_model(&mut collection);
    let note_id = notes::create(
        &mut collection.store,
        model_id,
        DEFAULT_DECK_ID,
        vec!["Q".to_string(), "A".to_string()],
        vec![],
        None,
    )
    .unwrap();
    let card_id = collection.store.list_cards_for_note(note_id)[0];
    collection
        .store
        .update_card(card_id, |c| {
            c.card_type = CardType::Review;
            c.queue = Queue::Review;
            c.ivl = 15;
            c.factor = 2_500;
        })
        .unwrap();

    for ease in [Ease::Hard, Ease::Good, Ease::Easy] {
        let before_ivl = collection.store.get_card(card_id).unwrap().ivl;
        let mut rng = || 0.9;
        let outcome =
            answer_card(&mut collection.store, card_id, ease, 1_000, Utc::now(), &mut rng).unwrap();
        assert!(outcome.card.ivl > before_ivl, "{ease:?} must grow the interval from {before_ivl}");
    }
    std::fs::remove_dir_all(&dir).ok();
}
