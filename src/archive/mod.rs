//! `.apkg` import: a ZIP containing an embedded SQLite database plus a media
//! manifest. Read-only — the core never exports this format.

use crate::media::MediaStore;
use crate::store::entities::{
    Card, CardType, Deck, DeckConfig, Grave, GraveKind, LapsePolicy, LeechAction, Model,
    ModelField, ModelTemplate, ModelType, NewCardPolicy, Note, Queue, RevlogType, ReviewLog,
    ReviewPolicy,
};
use crate::store::Store;
use crate::{Error, Result};
use indexmap::IndexMap;
use log::{debug, info, warn};
use rusqlite::Connection;
use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

/// A suspension point offered to the host between long-running steps.
pub struct Progress {
    pub stage: &'static str,
    pub processed: usize,
    pub total: usize,
}

pub enum ControlFlow {
    Continue,
    Cancel,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ImportSummary {
    pub notes: usize,
    pub cards: usize,
    pub revlog: usize,
    pub graves: usize,
    pub media: usize,
}

/// Imports `path` into `store`/`media`. Existing rows with a matching id are
/// overwritten; new rows are inserted. Not transactional: a cancelled or
/// failed import may leave partial data in `store`.
pub fn import_apkg(
    path: &Path,
    store: &mut Store,
    media: &mut MediaStore,
    mut progress: impl FnMut(Progress) -> ControlFlow,
) -> Result<ImportSummary> {
    let file = std::fs::File::open(path).map_err(|e| Error::IoFailure {
        description: format!("failed to open archive {}", path.display()),
        source: e,
    })?;
    let mut zip = zip::ZipArchive::new(file)
        .map_err(|e| Error::BadArchive(format!("not a valid zip file: {e}")))?;

    let db_entry_name = ["collection.anki21", "collection.anki2"]
        .into_iter()
        .find(|name| zip.by_name(name).is_ok())
        .ok_or_else(|| Error::BadArchive("no collection.anki2[1] entry found".to_string()))?;
    info!("archive import: located database entry {db_entry_name}");

    let db_path = std::env::temp_dir().join(format!(
        "collection_core_import_{}_{db_entry_name}",
        std::process::id()
    ));
    {
        let mut entry = zip
            .by_name(db_entry_name)
            .map_err(|e| Error::BadArchive(format!("failed to reopen database entry: {e}")))?;
        let mut bytes = Vec::with_capacity(entry.size() as usize);
        entry.read_to_end(&mut bytes).map_err(|e| Error::IoFailure {
            description: "failed to read database entry from archive".to_string(),
            source: e,
        })?;
        std::fs::write(&db_path, &bytes).map_err(|e| Error::IoFailure {
            description: format!("failed to extract database to {}", db_path.display()),
            source: e,
        })?;
    }
    info!("archive import: database extracted to {}", db_path.display());

    let conn = Connection::open(&db_path)
        .map_err(|e| Error::BadArchive(format!("failed to open extracted database: {e}")))?;

    let mut summary = import_from_connection(&conn, store, &mut progress)?;
    info!(
        "archive import: config parsed, {} notes, {} cards, {} revlog entries, {} graves streamed",
        summary.notes, summary.cards, summary.revlog, summary.graves
    );

    std::fs::remove_file(&db_path).ok();

    summary.media = import_media(&mut zip, media, &mut progress)?;

    store.seed_ids_from_existing();
    Ok(summary)
}

fn import_from_connection(
    conn: &Connection,
    store: &mut Store,
    progress: &mut impl FnMut(Progress) -> ControlFlow,
) -> Result<ImportSummary> {
    import_col_row(conn, store)?;

    let notes = import_notes(conn, store, progress)?;
    let cards = import_cards(conn, store, progress)?;
    let revlog = import_revlog(conn, store, progress)?;
    let graves = import_graves(conn, store)?;
    Ok(ImportSummary { notes, cards, revlog, graves, media: 0 })
}

/// The only `col.ver` schema this importer understands: the classic schema
/// shared by `collection.anki2` and `collection.anki21` exports. Anki's
/// newer schema 18 adds notetype/deck tables this importer never reads, so
/// it is rejected rather than silently misparsed.
const SUPPORTED_COL_SCHEMA_VERSION: i64 = 11;

fn import_col_row(conn: &Connection, store: &mut Store) -> Result<()> {
    let (ver, crt, decks_json, dconf_json, models_json, conf_json): (
        i64,
        i64,
        String,
        String,
        String,
        String,
    ) = conn
        .query_row("SELECT ver, crt, decks, dconf, models, conf FROM col LIMIT 1", [], |row| {
            Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?, row.get(5)?))
        })
        .map_err(|e| Error::BadArchive(format!("failed to read col row: {e}")))?;

    if ver != SUPPORTED_COL_SCHEMA_VERSION {
        return Err(Error::UnsupportedSchemaVersion(ver));
    }

    store.collection.crt = crt;

    let decks = parse_decks_json(&decks_json)?;
    for deck in decks.into_values() {
        store.add_deck(deck);
    }
    let deck_configs = parse_deck_configs_json(&dconf_json)?;
    for config in deck_configs.into_values() {
        store.add_deck_config(config);
    }
    let models = parse_models_json(&models_json)?;
    for model in models.into_values() {
        store.add_model(model);
    }

    if let Ok(conf_value) = serde_json::from_str::<serde_json::Value>(&conf_json) {
        if let Some(candidate) = conf_value.get("nextPos").and_then(serde_json::Value::as_i64) {
            store.adopt_next_pos_if_greater(candidate);
        }
        if let Some(rollover) = conf_value.get("rollover").and_then(serde_json::Value::as_u64) {
            store.global_config.rollover_hour = rollover as u32;
        }
    }
    debug!("archive import: collection config parsed");
    Ok(())
}

fn parse_decks_json(raw: &str) -> Result<IndexMap<i64, Deck>> {
    let value: serde_json::Value = serde_json::from_str(raw)
        .map_err(|e| Error::CorruptJsonConfig(format!("decks: {e}")))?;
    let object = value
        .as_object()
        .ok_or_else(|| Error::CorruptJsonConfig("decks is not a JSON object".to_string()))?;
    let mut decks = IndexMap::new();
    for (key, entry) in object {
        let id = key.parse::<i64>().unwrap_or_default();
        let deck = Deck {
            id,
            name: entry
                .get("name")
                .and_then(serde_json::Value::as_str)
                .unwrap_or("Default")
                .to_string(),
            description: entry
                .get("desc")
                .and_then(serde_json::Value::as_str)
                .unwrap_or("")
                .to_string(),
            config_id: entry.get("conf").and_then(serde_json::Value::as_i64).unwrap_or(1),
            collapsed: entry
                .get("collapsed")
                .and_then(serde_json::Value::as_bool)
                .unwrap_or(false),
            modified_secs: entry.get("mod").and_then(serde_json::Value::as_i64).unwrap_or(0),
        };
        decks.insert(id, deck);
    }
    Ok(decks)
}

fn parse_deck_configs_json(raw: &str) -> Result<IndexMap<i64, DeckConfig>> {
    let value: serde_json::Value = serde_json::from_str(raw)
        .map_err(|e| Error::CorruptJsonConfig(format!("dconf: {e}")))?;
    let object = value
        .as_object()
        .ok_or_else(|| Error::CorruptJsonConfig("dconf is not a JSON object".to_string()))?;
    let mut configs = IndexMap::new();
    for (key, entry) in object {
        let id = key.parse::<i64>().unwrap_or_default();
        let new_obj = entry.get("new");
        let rev_obj = entry.get("rev");
        let lapse_obj = entry.get("lapse");

        let new = NewCardPolicy {
            delays: f64_array(new_obj, "delays", &[1.0, 10.0]),
            ints: {
                let v = i32_array(new_obj, "ints", &[1, 4]);
                [v.first().copied().unwrap_or(1), v.get(1).copied().unwrap_or(4)]
            },
            initial_factor: field_i32(new_obj, "initialFactor", 2500),
            per_day: field_i32(new_obj, "perDay", 20) as u32,
            order: field_i32(new_obj, "order", 0) as u32,
        };
        let review = ReviewPolicy {
            per_day: field_i32(rev_obj, "perDay", 200) as u32,
            // Anki stores `ease4` as a multiplicative easy bonus (default 1.3); this
            // crate's `ease4` is an additive factor bonus in x1000 units, so a bonus
            // of 0.3 over parity becomes 150, matching `ReviewPolicy::default()`.
            ease4: ((field_f64(rev_obj, "ease4", 1.3) - 1.0) * 500.0) as i32,
            ivl_fct: field_f64(rev_obj, "ivlFct", 1.0),
            max_ivl: field_i32(rev_obj, "maxIvl", 36_500),
            fuzz: field_f64(rev_obj, "fuzz", 0.05),
        };
        let lapse = LapsePolicy {
            delays: f64_array(lapse_obj, "delays", &[10.0]),
            mult: field_f64(lapse_obj, "mult", 0.5),
            min_int: field_i32(lapse_obj, "minInt", 1),
            leech_action: if field_i32(lapse_obj, "leechAction", 0) == 1 {
                LeechAction::Suspend
            } else {
                LeechAction::TagOnly
            },
            leech_fails: field_i32(lapse_obj, "leechFails", 8) as u32,
        };

        configs.insert(
            id,
            DeckConfig {
                id,
                name: entry
                    .get("name")
                    .and_then(serde_json::Value::as_str)
                    .unwrap_or("Default")
                    .to_string(),
                new,
                review,
                lapse,
            },
        );
    }
    Ok(configs)
}

fn field_i32(obj: Option<&serde_json::Value>, key: &str, default: i32) -> i32 {
    obj.and_then(|o| o.get(key))
        .and_then(serde_json::Value::as_i64)
        .map_or(default, |v| v as i32)
}

fn field_f64(obj: Option<&serde_json::Value>, key: &str, default: f64) -> f64 {
    obj.and_then(|o| o.get(key)).and_then(serde_json::Value::as_f64).unwrap_or(default)
}

fn f64_array(obj: Option<&serde_json::Value>, key: &str, default: &[f64]) -> Vec<f64> {
    obj.and_then(|o| o.get(key))
        .and_then(serde_json::Value::as_array)
        .map(|arr| arr.iter().filter_map(serde_json::Value::as_f64).collect())
        .filter(|v: &Vec<f64>| !v.is_empty())
        .unwrap_or_else(|| default.to_vec())
}

fn i32_array(obj: Option<&serde_json::Value>, key: &str, default: &[i32]) -> Vec<i32> {
    obj.and_then(|o| o.get(key))
        .and_then(serde_json::Value::as_array)
        .map(|arr| arr.iter().filter_map(|v| v.as_i64().map(|n| n as i32)).collect())
        .filter(|v: &Vec<i32>| !v.is_empty())
        .unwrap_or_else(|| default.to_vec())
}

fn parse_models_json(raw: &str) -> Result<IndexMap<i64, Model>> {
    let value: serde_json::Value = serde_json::from_str(raw)
        .map_err(|e| Error::CorruptJsonConfig(format!("models: {e}")))?;
    let object = value
        .as_object()
        .ok_or_else(|| Error::CorruptJsonConfig("models is not a JSON object".to_string()))?;
    let mut models = IndexMap::new();
    for (key, entry) in object {
        let id = key.parse::<i64>().unwrap_or_default();
        let fields: Vec<ModelField> = entry
            .get("flds")
            .and_then(serde_json::Value::as_array)
            .map(|arr| {
                arr.iter()
                    .map(|f| ModelField {
                        name: f.get("name").and_then(serde_json::Value::as_str).unwrap_or("").to_string(),
                        font: f.get("font").and_then(serde_json::Value::as_str).unwrap_or("Arial").to_string(),
                        size: f.get("size").and_then(serde_json::Value::as_u64).unwrap_or(20) as u32,
                    })
                    .collect()
            })
            .unwrap_or_default();
        let templates: Vec<ModelTemplate> = entry
            .get("tmpls")
            .and_then(serde_json::Value::as_array)
            .map(|arr| {
                arr.iter()
                    .enumerate()
                    .map(|(i, t)| ModelTemplate {
                        ord: t.get("ord").and_then(serde_json::Value::as_i64).unwrap_or(i as i64) as i32,
                        name: t.get("name").and_then(serde_json::Value::as_str).unwrap_or("").to_string(),
                        qfmt: t.get("qfmt").and_then(serde_json::Value::as_str).unwrap_or("").to_string(),
                        afmt: t.get("afmt").and_then(serde_json::Value::as_str).unwrap_or("").to_string(),
                    })
                    .collect()
            })
            .unwrap_or_default();
        let model_type = match entry.get("type").and_then(serde_json::Value::as_i64).unwrap_or(0) {
            1 => ModelType::Cloze,
            2 => ModelType::ImageOcclusion,
            _ => ModelType::Standard,
        };

        models.insert(
            id,
            Model {
                id,
                name: entry.get("name").and_then(serde_json::Value::as_str).unwrap_or("").to_string(),
                model_type,
                fields,
                templates,
                css: entry.get("css").and_then(serde_json::Value::as_str).unwrap_or("").to_string(),
                sort_field_index: entry.get("sortf").and_then(serde_json::Value::as_u64).unwrap_or(0) as usize,
                modified_secs: entry.get("mod").and_then(serde_json::Value::as_i64).unwrap_or(0),
            },
        );
    }
    Ok(models)
}

fn import_notes(
    conn: &Connection,
    store: &mut Store,
    progress: &mut impl FnMut(Progress) -> ControlFlow,
) -> Result<usize> {
    let mut stmt = conn
        .prepare("SELECT id, guid, mid, mod, usn, tags, flds, sfld, csum, data FROM notes ORDER BY id ASC")
        .map_err(|e| Error::BadArchive(format!("failed to prepare notes query: {e}")))?;
    let rows = stmt
        .query_map([], |row| {
            Ok(Note {
                id: row.get(0)?,
                guid: row.get(1)?,
                model_id: row.get(2)?,
                modified_secs: row.get(3)?,
                usn: row.get(4)?,
                tags: row.get(5)?,
                flds: row.get(6)?,
                sort_field: row.get(7)?,
                checksum: {
                    let raw: i64 = row.get(8)?;
                    raw as u32
                },
                data: row.get(9)?,
            })
        })
        .map_err(|e| Error::BadArchive(format!("failed to stream notes: {e}")))?;

    let mut count = 0;
    for (i, row) in rows.enumerate() {
        let note = row.map_err(|e| Error::BadArchive(format!("bad note row: {e}")))?;
        if store.notes.contains_key(&note.id) {
            debug!("archive import: overwriting existing note {}", note.id);
        }
        store.notes.insert(note.id, note);
        count += 1;
        if i % 1000 == 999 {
            if matches!(progress(Progress { stage: "notes", processed: i + 1, total: count }), ControlFlow::Cancel) {
                return Err(Error::Cancelled);
            }
        }
    }
    Ok(count)
}

fn import_cards(
    conn: &Connection,
    store: &mut Store,
    progress: &mut impl FnMut(Progress) -> ControlFlow,
) -> Result<usize> {
    let mut stmt = conn
        .prepare(
            "SELECT id, nid, did, ord, mod, usn, type, queue, due, ivl, factor, reps, lapses, left, odid, odue, flags, data FROM cards ORDER BY id ASC",
        )
        .map_err(|e| Error::BadArchive(format!("failed to prepare cards query: {e}")))?;
    let rows = stmt
        .query_map([], |row| {
            let card_type: i64 = row.get(6)?;
            let queue: i64 = row.get(7)?;
            Ok(Card {
                id: row.get(0)?,
                note_id: row.get(1)?,
                deck_id: row.get(2)?,
                ord: row.get(3)?,
                modified_secs: row.get(4)?,
                usn: row.get(5)?,
                card_type: card_type_from_code(card_type),
                queue: queue_from_code(queue),
                due: row.get(8)?,
                ivl: row.get(9)?,
                factor: row.get(10)?,
                reps: row.get(11)?,
                lapses: row.get(12)?,
                left: row.get(13)?,
                original_deck_id: row.get(14)?,
                original_due: row.get(15)?,
                flags: row.get(16)?,
                data: row.get(17)?,
            })
        })
        .map_err(|e| Error::BadArchive(format!("failed to stream cards: {e}")))?;

    let mut count = 0;
    for (i, row) in rows.enumerate() {
        let card = row.map_err(|e| Error::BadArchive(format!("bad card row: {e}")))?;
        if store.cards.contains_key(&card.id) {
            debug!("archive import: overwriting existing card {}", card.id);
        }
        store.cards.insert(card.id, card);
        count += 1;
        if i % 1000 == 999
            && matches!(progress(Progress { stage: "cards", processed: i + 1, total: count }), ControlFlow::Cancel)
        {
            return Err(Error::Cancelled);
        }
    }
    Ok(count)
}

fn card_type_from_code(code: i64) -> CardType {
    match code {
        1 => CardType::Learning,
        2 => CardType::Review,
        3 => CardType::Relearning,
        _ => CardType::New,
    }
}

fn queue_from_code(code: i64) -> Queue {
    match code {
        -3 => Queue::UserBuried,
        -2 => Queue::SchedBuried,
        -1 => Queue::Suspended,
        1 => Queue::Learning,
        2 => Queue::Review,
        3 => Queue::DayLearn,
        _ => Queue::New,
    }
}

fn revlog_type_from_code(code: i64) -> RevlogType {
    match code {
        1 => RevlogType::Review,
        2 => RevlogType::Relearn,
        3 => RevlogType::Cram,
        _ => RevlogType::Learn,
    }
}

fn import_revlog(
    conn: &Connection,
    store: &mut Store,
    progress: &mut impl FnMut(Progress) -> ControlFlow,
) -> Result<usize> {
    let mut stmt = conn
        .prepare("SELECT id, cid, usn, ease, ivl, lastIvl, factor, time, type FROM revlog ORDER BY id ASC")
        .map_err(|e| Error::BadArchive(format!("failed to prepare revlog query: {e}")))?;
    let rows = stmt
        .query_map([], |row| {
            let ease: i64 = row.get(3)?;
            let revlog_type: i64 = row.get(8)?;
            Ok(ReviewLog {
                id: row.get(0)?,
                card_id: row.get(1)?,
                usn: row.get(2)?,
                ease: ease_from_code(ease),
                ivl: row.get(4)?,
                last_ivl: row.get(5)?,
                factor: row.get(6)?,
                time_ms: {
                    let raw: i64 = row.get(7)?;
                    raw.clamp(0, 60_000) as u32
                },
                revlog_type: revlog_type_from_code(revlog_type),
            })
        })
        .map_err(|e| Error::BadArchive(format!("failed to stream revlog: {e}")))?;

    let mut count = 0;
    let mut existing_ids: std::collections::HashSet<i64> = store.revlog.iter().map(|r| r.id).collect();
    for (i, row) in rows.enumerate() {
        let entry = row.map_err(|e| Error::BadArchive(format!("bad revlog row: {e}")))?;
        if !existing_ids.insert(entry.id) {
            debug!("archive import: overwriting existing revlog entry {}", entry.id);
            store.revlog.retain(|r| r.id != entry.id);
        }
        store.revlog.push(entry);
        count += 1;
        if i % 2000 == 1999
            && matches!(progress(Progress { stage: "revlog", processed: i + 1, total: count }), ControlFlow::Cancel)
        {
            return Err(Error::Cancelled);
        }
    }
    Ok(count)
}

fn ease_from_code(code: i64) -> crate::store::entities::Ease {
    use crate::store::entities::Ease;
    match code {
        2 => Ease::Hard,
        3 => Ease::Good,
        4 => Ease::Easy,
        _ => Ease::Again,
    }
}

fn import_graves(conn: &Connection, store: &mut Store) -> Result<usize> {
    let mut stmt = conn
        .prepare("SELECT usn, oid, type FROM graves")
        .map_err(|e| Error::BadArchive(format!("failed to prepare graves query: {e}")))?;
    let rows = stmt
        .query_map([], |row| {
            let kind: i64 = row.get(2)?;
            Ok(Grave {
                usn: row.get(0)?,
                original_id: row.get(1)?,
                kind: grave_kind_from_code(kind),
            })
        })
        .map_err(|e| Error::BadArchive(format!("failed to stream graves: {e}")))?;

    let mut count = 0;
    for row in rows {
        let grave = row.map_err(|e| Error::BadArchive(format!("bad grave row: {e}")))?;
        store.graves.push(grave);
        count += 1;
    }
    Ok(count)
}

fn grave_kind_from_code(code: i64) -> GraveKind {
    match code {
        1 => GraveKind::Note,
        2 => GraveKind::Deck,
        _ => GraveKind::Card,
    }
}

fn import_media(
    zip: &mut zip::ZipArchive<std::fs::File>,
    media: &mut MediaStore,
    progress: &mut impl FnMut(Progress) -> ControlFlow,
) -> Result<usize> {
    let manifest_text = match zip.by_name("media") {
        Ok(mut entry) => {
            let mut text = String::new();
            entry.read_to_string(&mut text).map_err(|e| Error::IoFailure {
                description: "failed to read media manifest".to_string(),
                source: e,
            })?;
            text
        }
        Err(_) => {
            warn!("archive import: no media manifest present, skipping media");
            return Ok(0);
        }
    };
    let manifest: HashMap<String, String> = serde_json::from_str(&manifest_text)
        .map_err(|e| Error::CorruptJsonConfig(format!("media manifest: {e}")))?;

    let total = manifest.len();
    let mut filenames = Vec::with_capacity(total);
    for (i, (numbered_id, original_name)) in manifest.into_iter().enumerate() {
        let dest = media.dir().join(sanitize_manifest_name(&original_name));
        match zip.by_name(&numbered_id) {
            Ok(mut entry) => {
                if let Some(parent) = dest.parent() {
                    std::fs::create_dir_all(parent).ok();
                }
                let mut bytes = Vec::with_capacity(entry.size() as usize);
                entry.read_to_end(&mut bytes).map_err(|e| Error::IoFailure {
                    description: format!("failed to read media blob {numbered_id}"),
                    source: e,
                })?;
                std::fs::write(&dest, &bytes).map_err(|e| Error::IoFailure {
                    description: format!("failed to write media blob to {}", dest.display()),
                    source: e,
                })?;
                filenames.push(original_name);
            }
            Err(_) => warn!("archive import: media blob {numbered_id} listed in manifest but missing from zip"),
        }
        if i % 200 == 199
            && matches!(progress(Progress { stage: "media", processed: i + 1, total }), ControlFlow::Cancel)
        {
            return Err(Error::Cancelled);
        }
    }

    let registered = media.batch_register_existing(&filenames, |done, total| {
        debug!("archive import: media registration {done}/{total}");
    });
    info!("archive import: registered {} media entries", registered.len());
    Ok(registered.len())
}

fn sanitize_manifest_name(name: &str) -> String {
    Path::new(name)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("media")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_decks_json_reads_name_and_config() {
        let raw = r#"{"1":{"name":"Default","conf":1,"collapsed":false,"mod":100}}"#;
        let decks = parse_decks_json(raw).unwrap();
        assert_eq!(decks.get(&1).unwrap().name, "Default");
    }

    #[test]
    fn parse_deck_configs_json_falls_back_on_missing_fields() {
        let raw = r#"{"1":{"name":"Default","new":{},"rev":{},"lapse":{}}}"#;
        let configs = parse_deck_configs_json(raw).unwrap();
        let config = configs.get(&1).unwrap();
        assert_eq!(config.new.delays, vec![1.0, 10.0]);
        assert_eq!(config.lapse.leech_fails, 8);
    }

    #[test]
    fn parse_models_json_reads_fields_and_templates() {
        let raw = r#"{"2":{"name":"Basic","type":0,"sortf":0,"flds":[{"name":"Front"},{"name":"Back"}],"tmpls":[{"ord":0,"name":"Card 1","qfmt":"{{Front}}","afmt":"{{Back}}"}],"css":""}}"#;
        let models = parse_models_json(raw).unwrap();
        let model = models.get(&2).unwrap();
        assert_eq!(model.fields.len(), 2);
        assert_eq!(model.templates[0].qfmt, "{{Front}}");
    }

    #[test]
    fn corrupt_decks_json_is_reported() {
        let err = parse_decks_json("not json");
        assert!(err.is_err());
    }

    fn col_row_conn(ver: i64) -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE col (ver INTEGER, crt INTEGER, decks TEXT, dconf TEXT, models TEXT, conf TEXT);",
        )
        .unwrap();
        conn.execute(
            "INSERT INTO col (ver, crt, decks, dconf, models, conf) VALUES (?1, 0, '{}', '{}', '{}', '{}')",
            [ver],
        )
        .unwrap();
        conn
    }

    #[test]
    fn import_col_row_accepts_supported_schema_version() {
        let conn = col_row_conn(SUPPORTED_COL_SCHEMA_VERSION);
        let mut store = Store::new();
        assert!(import_col_row(&conn, &mut store).is_ok());
    }

    #[test]
    fn import_col_row_rejects_unsupported_schema_version() {
        let conn = col_row_conn(18);
        let mut store = Store::new();
        let err = import_col_row(&conn, &mut store).unwrap_err();
        assert!(matches!(err, Error::UnsupportedSchemaVersion(18)));
    }
}
