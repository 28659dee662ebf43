//! In-process collection engine and SM-2 scheduler for a flashcard study
//! application.
//!
//! The crate has no UI, no network, and no global state: every operation
//! takes an explicit [`Collection`] (or one of its subsystem handles) and
//! returns a [`Result`]. See `DESIGN.md` in the repository root for the
//! grounding of each module.

pub mod archive;
pub mod clock;
pub mod config;
pub mod media;
pub mod notes;
pub mod scheduler;
pub mod statistics;
pub mod store;
pub mod template;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Diagnostic, Error)]
#[non_exhaustive]
pub enum Error {
    #[error("no {kind} with id {id}")]
    NotFound { kind: &'static str, id: i64 },

    #[error("{0}")]
    Validation(String),

    #[error("snapshot is corrupt: {0}")]
    CorruptSnapshot(String),

    #[error("archive is invalid: {0}")]
    BadArchive(String),

    #[error("unsupported schema version {0}")]
    UnsupportedSchemaVersion(i64),

    #[error("embedded config is corrupt: {0}")]
    CorruptJsonConfig(String),

    #[error("model {model_id} has no template with ord {ord}")]
    TemplateMissing { model_id: i64, ord: i32 },

    #[error("io failure: {description}")]
    IoFailure {
        description: String,
        #[source]
        source: std::io::Error,
    },

    #[error("operation cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, Error>;

pub use store::Store;

/// Top-level facade bundling the store, media index and id generator that a
/// host embeds as its single collection handle.
pub struct Collection {
    pub store: Store,
    pub media: media::MediaStore,
}

impl Collection {
    pub fn new(media_dir: impl Into<std::path::PathBuf>) -> Self {
        Self {
            store: Store::new(),
            media: media::MediaStore::new(media_dir),
        }
    }
}
