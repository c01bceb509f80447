//! Application services
//!
//! Facades the rest of the application talks to: typed settings over the
//! persisted key/value table, and the notes service that glues store,
//! remote client, and sync triggers together.

pub mod notes;
pub mod settings;

pub use notes::{CaptureDraft, CaptureOutcome, NotesService};
pub use settings::SettingsService;
