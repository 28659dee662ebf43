//! Content-addressed media store: deduplicates blobs by SHA-256 hash and
//! garbage-collects entries no longer referenced by any note field.

use crate::clock::now_secs;
use crate::store::entities::{MediaEntry, MediaId};
use log::{info, warn};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

pub struct MediaStore {
    dir: PathBuf,
    entries: indexmap::IndexMap<MediaId, MediaEntry>,
    next_id: MediaId,
}

fn sanitize_filename(name: &str) -> String {
    let base = Path::new(name)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("");
    let cleaned: String = base
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '.' || *c == '_' || *c == '-')
        .collect();
    let truncated: String = cleaned.chars().take(255).collect();
    if truncated.is_empty() {
        format!("media-{}", now_secs())
    } else {
        truncated
    }
}

fn guess_mime(filename: &str) -> String {
    let ext = Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "webp" => "image/webp",
        "mp3" => "audio/mpeg",
        "ogg" => "audio/ogg",
        "wav" => "audio/wav",
        "mp4" => "video/mp4",
        _ => "application/octet-stream",
    }
    .to_string()
}

impl MediaStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            entries: indexmap::IndexMap::new(),
            next_id: 1,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn entries(&self) -> &indexmap::IndexMap<MediaId, MediaEntry> {
        &self.entries
    }

    fn mint_id(&mut self) -> MediaId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn find_by_hash(&self, hash: &str) -> Option<&MediaEntry> {
        self.entries.values().find(|e| e.hash_hex == hash)
    }

    /// Copies `source_path`'s content into the media directory (unless an
    /// entry with the same content hash already exists, in which case that
    /// entry is returned and nothing is copied).
    pub fn add(&mut self, source_path: &Path, filename: Option<&str>) -> crate::Result<MediaEntry> {
        let filename = sanitize_filename(
            filename.unwrap_or_else(|| source_path.file_name().and_then(|n| n.to_str()).unwrap_or("")),
        );
        let (hash, size) = match std::fs::read(source_path) {
            Ok(bytes) => (sha256::digest(&bytes), bytes.len() as u64),
            Err(e) => {
                warn!("failed to hash media source {}: {e}; using fallback hash", source_path.display());
                (format!("fallback-{}-{}", filename, now_secs()), 0)
            }
        };
        if let Some(existing) = self.find_by_hash(&hash) {
            return Ok(existing.clone());
        }
        let dest = self.dir.join(&filename);
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent).map_err(|e| crate::Error::IoFailure {
                description: format!("failed to create media dir {}", parent.display()),
                source: e,
            })?;
        }
        if source_path != dest {
            std::fs::copy(source_path, &dest).map_err(|e| crate::Error::IoFailure {
                description: format!("failed to copy media into {}", dest.display()),
                source: e,
            })?;
        }
        let entry = MediaEntry {
            id: self.mint_id(),
            filename: filename.clone(),
            mime: guess_mime(&filename),
            hash_hex: hash,
            size_bytes: size,
            local_uri: dest.display().to_string(),
            created_secs: now_secs(),
        };
        self.entries.insert(entry.id, entry.clone());
        Ok(entry)
    }

    /// Registers a blob already present at `<media_dir>/<filename>`, as used
    /// by archive import after bulk extraction. Returns `None` if the file
    /// is missing.
    pub fn register_existing(&mut self, filename: &str) -> Option<MediaEntry> {
        let filename = sanitize_filename(filename);
        if self.entries.values().any(|e| e.filename == filename) {
            return self.entries.values().find(|e| e.filename == filename).cloned();
        }
        let path = self.dir.join(&filename);
        if !path.exists() {
            return None;
        }
        let (hash, size) = match std::fs::read(&path) {
            Ok(bytes) => (sha256::digest(&bytes), bytes.len() as u64),
            Err(e) => {
                warn!("failed to hash {}: {e}; using fallback hash", path.display());
                (format!("fallback-{}-{}", filename, now_secs()), 0)
            }
        };
        if let Some(existing) = self.find_by_hash(&hash) {
            return Some(existing.clone());
        }
        let entry = MediaEntry {
            id: self.mint_id(),
            filename: filename.clone(),
            mime: guess_mime(&filename),
            hash_hex: hash,
            size_bytes: size,
            local_uri: path.display().to_string(),
            created_secs: now_secs(),
        };
        self.entries.insert(entry.id, entry.clone());
        Some(entry)
    }

    /// Registers many filenames, deduplicating by filename against prior
    /// registrations. `progress` is invoked after each chunk so a host event
    /// loop can remain responsive during a large import.
    pub fn batch_register_existing(
        &mut self,
        filenames: &[String],
        mut progress: impl FnMut(usize, usize),
    ) -> Vec<MediaEntry> {
        const CHUNK: usize = 200;
        let mut registered = Vec::new();
        for (chunk_idx, chunk) in filenames.chunks(CHUNK).enumerate() {
            for filename in chunk {
                if let Some(entry) = self.register_existing(filename) {
                    registered.push(entry);
                }
            }
            progress(((chunk_idx + 1) * CHUNK).min(filenames.len()), filenames.len());
        }
        registered
    }

    pub fn delete(&mut self, id: MediaId) {
        if let Some(entry) = self.entries.shift_remove(&id) {
            let path = self.dir.join(&entry.filename);
            std::fs::remove_file(path).ok();
        }
    }

    /// Scans every note's fields for `<img src="...">` and `[sound:...]`
    /// references; deletes every entry whose filename is unreferenced.
    /// Idempotent: a second run with no intervening changes deletes nothing.
    pub fn gc_unused(&mut self, note_fields: impl Iterator<Item = String>) -> usize {
        let referenced = scan_referenced_filenames(note_fields);
        let orphans: Vec<MediaId> = self
            .entries
            .iter()
            .filter(|(_, e)| !referenced.contains(&e.filename.to_ascii_lowercase()))
            .map(|(id, _)| *id)
            .collect();
        let count = orphans.len();
        for id in orphans {
            self.delete(id);
        }
        if count > 0 {
            info!("media gc removed {count} unused entries");
        }
        count
    }

    /// Resolves `anki-media://<id>`, a bare filename, or an already-absolute
    /// path into a local URI.
    pub fn resolve(&self, src: &str) -> String {
        if let Some(id_str) = src.strip_prefix("anki-media://") {
            if let Ok(id) = id_str.parse::<MediaId>() {
                if let Some(entry) = self.entries.get(&id) {
                    return entry.local_uri.clone();
                }
            }
        }
        if let Some(entry) = self.entries.values().find(|e| e.filename == src) {
            return entry.local_uri.clone();
        }
        self.dir.join(src).display().to_string()
    }
}

fn scan_referenced_filenames(note_fields: impl Iterator<Item = String>) -> HashSet<String> {
    let img_re = fancy_regex::Regex::new(r#"(?i)<img[^>]+src=["']([^"']+)["']"#).unwrap();
    let sound_re = fancy_regex::Regex::new(r"(?i)\[sound:([^\]]+)\]").unwrap();
    let mut referenced = HashSet::new();
    for field in note_fields {
        for cap in img_re.captures_iter(&field).flatten() {
            if let Some(m) = cap.get(1) {
                referenced.insert(m.as_str().to_ascii_lowercase());
            }
        }
        for cap in sound_re.captures_iter(&field).flatten() {
            if let Some(m) = cap.get(1) {
                referenced.insert(m.as_str().to_ascii_lowercase());
            }
        }
    }
    referenced
}
