//! Note lifecycle: create, update, change model, delete; and per-model-type
//! card generation.

use crate::clock::now_secs;
use crate::store::entities::{
    Card, CardId, DeckId, ModelId, ModelType, Note, NoteId,
};
use crate::store::Store;
use crate::template::cloze_indices;
use crate::{Error, Result};
use log::debug;
use serde::Deserialize;

/// A `{fields, tags}` tuple supplied by an external note-generation service.
/// The core never learns anything else about that service; this is the only
/// seam it exposes.
pub struct GeneratedNote {
    pub fields: Vec<String>,
    pub tags: Vec<String>,
}

#[derive(Deserialize)]
struct ImageOcclusionData {
    io: ImageOcclusionBody,
}

#[derive(Deserialize)]
struct ImageOcclusionBody {
    mode: String,
    masks: Vec<serde_json::Value>,
}

fn fnv1a32(bytes: &[u8]) -> u32 {
    let mut hash: u32 = 0x811c_9dc5;
    for &b in bytes {
        hash ^= u32::from(b);
        hash = hash.wrapping_mul(0x0100_0193);
    }
    hash
}

fn checksum_of(sort_field: &str) -> u32 {
    fnv1a32(sort_field.as_bytes())
}

/// Creates a note under `model_id` in `deck_id`, validating field count and
/// generating cards per the model's type. `data` carries model-specific
/// payload (Image-Occlusion mask geometry JSON); pass `None` for models that
/// don't use it.
pub fn create(
    store: &mut Store,
    model_id: ModelId,
    deck_id: DeckId,
    fields: Vec<String>,
    tags: Vec<String>,
    data: Option<String>,
) -> Result<NoteId> {
    let model = store.get_model(model_id)?.clone();
    store.get_deck(deck_id)?;
    if fields.len() != model.fields.len() {
        return Err(Error::Validation(format!(
            "note has {} fields but model {} expects {}",
            fields.len(),
            model_id,
            model.fields.len()
        )));
    }

    let now = now_secs();
    let note_id = store.next_id();
    let sort_field = fields
        .get(model.sort_field_index)
        .cloned()
        .unwrap_or_default();
    let note = Note {
        id: note_id,
        guid: format!("{note_id:x}"),
        model_id,
        modified_secs: now,
        usn: -1,
        tags: Note::encode_tags(&tags),
        flds: Note::encode_fields(&fields),
        sort_field: sort_field.clone(),
        checksum: checksum_of(&sort_field),
        data: data.unwrap_or_default(),
    };
    store.add_note(note);

    generate_cards_for_note(store, note_id, deck_id)?;
    Ok(note_id)
}

/// Thin wrapper over [`create`] giving callers a single, stable entry point
/// for AI-generated notes without the core ever needing to know the
/// generation service's request/response shape.
pub fn create_from_generated(
    store: &mut Store,
    model_id: ModelId,
    deck_id: DeckId,
    generated: GeneratedNote,
) -> Result<NoteId> {
    create(store, model_id, deck_id, generated.fields, generated.tags, None)
}

fn generate_cards_for_note(store: &mut Store, note_id: NoteId, deck_id: DeckId) -> Result<()> {
    let note = store.get_note(note_id)?.clone();
    let model = store.get_model(note.model_id)?.clone();

    let ords: Vec<i32> = match model.model_type {
        ModelType::Standard => model.templates.iter().map(|t| t.ord).collect(),
        ModelType::Cloze => {
            let field0 = note.fields().first().copied().unwrap_or("");
            cloze_indices(field0).into_iter().map(|n| n - 1).collect()
        }
        ModelType::ImageOcclusion => image_occlusion_ords(&note.data),
    };

    for ord in ords {
        let card_id = store.next_id();
        let due = store.increment_next_pos();
        let card = Card::new(card_id, note_id, deck_id, ord, now_secs(), due);
        store.add_card(card);
    }
    Ok(())
}

fn image_occlusion_ords(data: &str) -> Vec<i32> {
    match serde_json::from_str::<ImageOcclusionData>(data) {
        Ok(parsed) if parsed.io.mode == "hide-all" => vec![0],
        Ok(parsed) => (0..parsed.io.masks.len() as i32).collect(),
        Err(_) => vec![0],
    }
}

/// A patch applied to an existing note. `fields` replaces all fields when
/// present; `tags` replaces the tag list when present; `data` replaces the
/// model-specific payload (Image-Occlusion mask geometry JSON) when present.
#[derive(Default)]
pub struct NotePatch {
    pub fields: Option<Vec<String>>,
    pub tags: Option<Vec<String>>,
    pub data: Option<String>,
}

/// Updates a note. If fields or `data` changed and the model is Cloze or
/// Image-Occlusion, existing cards are deleted and regenerated from the
/// freshly written note. Standard-model card identity is preserved.
pub fn update(store: &mut Store, note_id: NoteId, patch: NotePatch) -> Result<()> {
    let note = store.get_note(note_id)?.clone();
    let model = store.get_model(note.model_id)?.clone();

    if let Some(fields) = &patch.fields {
        if fields.len() != model.fields.len() {
            return Err(Error::Validation(format!(
                "note {note_id} patch has {} fields but model expects {}",
                fields.len(),
                model.fields.len()
            )));
        }
    }

    let regenerate_trigger = patch.fields.is_some() || patch.data.is_some();
    let deck_id = store
        .list_cards_for_note(note_id)
        .first()
        .and_then(|id| store.get_card(*id).ok())
        .map(|c| c.deck_id)
        .unwrap_or(crate::store::entities::DEFAULT_DECK_ID);

    store.update_note(note_id, |n| {
        if let Some(fields) = patch.fields {
            let sort_field = fields.get(model.sort_field_index).cloned().unwrap_or_default();
            n.checksum = checksum_of(&sort_field);
            n.sort_field = sort_field;
            n.flds = Note::encode_fields(&fields);
        }
        if let Some(tags) = patch.tags {
            n.tags = Note::encode_tags(&tags);
        }
        if let Some(data) = patch.data {
            n.data = data;
        }
    })?;

    let regenerates = matches!(model.model_type, ModelType::Cloze | ModelType::ImageOcclusion);
    if regenerate_trigger && regenerates {
        for card_id in store.list_cards_for_note(note_id) {
            store.delete_card(card_id)?;
        }
        generate_cards_for_note(store, note_id, deck_id)?;
        debug!("regenerated cards for note {note_id} after field/data update");
    }
    Ok(())
}

/// Remaps a note's fields under a new model via `old_index -> new_index`;
/// missing entries in the map become empty fields. Existing cards are
/// deleted and cards are regenerated under the new model.
pub fn change_type(
    store: &mut Store,
    note_id: NoteId,
    new_model_id: ModelId,
    old_to_new_index: &[Option<usize>],
) -> Result<()> {
    let note = store.get_note(note_id)?.clone();
    let new_model = store.get_model(new_model_id)?.clone();
    let deck_id = store
        .list_cards_for_note(note_id)
        .first()
        .and_then(|id| store.get_card(*id).ok())
        .map(|c| c.deck_id)
        .unwrap_or(crate::store::entities::DEFAULT_DECK_ID);

    let old_fields = note.fields();
    let mut new_fields = vec![String::new(); new_model.fields.len()];
    for (old_idx, target) in old_to_new_index.iter().enumerate() {
        if let Some(new_idx) = target {
            if let (Some(value), Some(slot)) = (old_fields.get(old_idx), new_fields.get_mut(*new_idx)) {
                *slot = (*value).to_string();
            }
        }
    }

    for card_id in store.list_cards_for_note(note_id) {
        store.delete_card(card_id)?;
    }

    store.update_note(note_id, |n| {
        n.model_id = new_model_id;
        let sort_field = new_fields.get(new_model.sort_field_index).cloned().unwrap_or_default();
        n.checksum = checksum_of(&sort_field);
        n.sort_field = sort_field;
        n.flds = Note::encode_fields(&new_fields);
    })?;

    generate_cards_for_note(store, note_id, deck_id)?;
    Ok(())
}

/// Deletes a note, all of its cards, and runs a media orphan sweep.
pub fn delete(store: &mut Store, note_id: NoteId, media: &mut crate::media::MediaStore) -> Result<()> {
    let card_ids: Vec<CardId> = store.list_cards_for_note(note_id);
    for card_id in card_ids {
        store.delete_card(card_id)?;
    }
    store.delete_note(note_id)?;
    let fields: Vec<String> = store.notes.values().map(|n| n.flds.clone()).collect();
    media.gc_unused(fields.into_iter());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::entities::{Model, ModelField, ModelTemplate, DEFAULT_DECK_ID};

    fn add_standard_model(store: &mut Store) -> ModelId {
        store.add_model(Model {
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
            modified_secs: now_secs(),
        })
    }

    fn add_cloze_model(store: &mut Store) -> ModelId {
        store.add_model(Model {
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
            modified_secs: now_secs(),
        })
    }

    fn add_image_occlusion_model(store: &mut Store) -> ModelId {
        store.add_model(Model {
            id: 0,
            name: "Image Occlusion".to_string(),
            model_type: ModelType::ImageOcclusion,
            fields: vec![ModelField { name: "Header".to_string(), font: "Arial".to_string(), size: 20 }],
            templates: vec![ModelTemplate {
                ord: 0,
                name: "Card 1".to_string(),
                qfmt: "{{Header}}".to_string(),
                afmt: "{{Header}}".to_string(),
            }],
            css: String::new(),
            sort_field_index: 0,
            modified_secs: now_secs(),
        })
    }

    #[test]
    fn create_with_image_occlusion_data_generates_one_card_per_mask() {
        let mut store = Store::new();
        let model_id = add_image_occlusion_model(&mut store);
        let data = r#"{"io":{"mode":"one-by-one","masks":[{},{},{}]}}"#.to_string();
        let note_id = create(
            &mut store,
            model_id,
            DEFAULT_DECK_ID,
            vec!["header".to_string()],
            vec![],
            Some(data),
        )
        .unwrap();
        assert_eq!(store.list_cards_for_note(note_id).len(), 3);
    }

    #[test]
    fn update_regenerates_image_occlusion_cards_on_data_only_change() {
        let mut store = Store::new();
        let model_id = add_image_occlusion_model(&mut store);
        let note_id = create(
            &mut store,
            model_id,
            DEFAULT_DECK_ID,
            vec!["header".to_string()],
            vec![],
            Some(r#"{"io":{"mode":"one-by-one","masks":[{}]}}"#.to_string()),
        )
        .unwrap();
        assert_eq!(store.list_cards_for_note(note_id).len(), 1);

        update(
            &mut store,
            note_id,
            NotePatch {
                fields: None,
                tags: None,
                data: Some(r#"{"io":{"mode":"one-by-one","masks":[{},{}]}}"#.to_string()),
            },
        )
        .unwrap();
        assert_eq!(store.list_cards_for_note(note_id).len(), 2);
    }

    #[test]
    fn create_validates_field_count() {
        let mut store = Store::new();
        let model_id = add_standard_model(&mut store);
        let err = create(&mut store, model_id, DEFAULT_DECK_ID, vec!["only one".to_string()], vec![], None);
        assert!(err.is_err());
    }

    #[test]
    fn create_standard_generates_one_card_per_template() {
        let mut store = Store::new();
        let model_id = add_standard_model(&mut store);
        let note_id = create(
            &mut store,
            model_id,
            DEFAULT_DECK_ID,
            vec!["Q".to_string(), "A".to_string()],
            vec![],
            None,
        )
        .unwrap();
        assert_eq!(store.list_cards_for_note(note_id).len(), 1);
    }

    #[test]
    fn create_cloze_generates_two_cards() {
        let mut store = Store::new();
        let model_id = add_cloze_model(&mut store);
        let note_id = create(
            &mut store,
            model_id,
            DEFAULT_DECK_ID,
            vec!["The capital of {{c1::France}} is {{c2::Paris}}.".to_string()],
            vec![],
            None,
        )
        .unwrap();
        let cards = store.list_cards_for_note(note_id);
        let mut ords: Vec<i32> = cards.iter().map(|id| store.get_card(*id).unwrap().ord).collect();
        ords.sort_unstable();
        assert_eq!(ords, vec![0, 1]);
    }

    #[test]
    fn update_regenerates_cloze_cards_on_field_change() {
        let mut store = Store::new();
        let model_id = add_cloze_model(&mut store);
        let note_id = create(
            &mut store,
            model_id,
            DEFAULT_DECK_ID,
            vec!["{{c1::one}}".to_string()],
            vec![],
            None,
        )
        .unwrap();
        assert_eq!(store.list_cards_for_note(note_id).len(), 1);
        update(
            &mut store,
            note_id,
            NotePatch {
                fields: Some(vec!["{{c1::one}} {{c2::two}}".to_string()]),
                tags: None,
                data: None,
            },
        )
        .unwrap();
        assert_eq!(store.list_cards_for_note(note_id).len(), 2);
    }

    #[test]
    fn delete_runs_media_orphan_sweep() {
        let mut store = Store::new();
        let model_id = add_standard_model(&mut store);
        let note_id = create(
            &mut store,
            model_id,
            DEFAULT_DECK_ID,
            vec!["Q".to_string(), "A".to_string()],
            vec![],
            None,
        )
        .unwrap();
        let dir = std::env::temp_dir().join(format!("collection_core_notes_test_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let mut media = crate::media::MediaStore::new(&dir);
        delete(&mut store, note_id, &mut media).unwrap();
        assert!(store.get_note(note_id).is_err());
        std::fs::remove_dir_all(&dir).ok();
    }
}
