use std::sync::Arc;

use crate::codes::extract_codes;
use crate::db::{Admission, Database};
use crate::error::MirrorError;
use crate::settings::Settings;

/// Decides whether an inbound message should be mirrored: first by message
/// identity, then by its extracted code set. The store performs the actual
/// check-then-insert atomically; this layer supplies the current extraction
/// pattern.
pub struct Deduplicator {
    db: Arc<Database>,
    settings: Arc<Settings>,
}

impl Deduplicator {
    pub fn new(db: Arc<Database>, settings: Arc<Settings>) -> Self {
        Self { db, settings }
    }

    /// A message with zero extracted codes is judged by identity alone. A
    /// message whose codes are partially new is accepted; only a fully-known
    /// code set suppresses it as a re-post.
    pub fn admit(
        &self,
        source_chat_id: i64,
        message_id: i64,
        text: &str,
    ) -> Result<Admission, MirrorError> {
        let snapshot = self.settings.snapshot();
        let codes = extract_codes(&snapshot.pattern, text);
        self.db.admit_message(source_chat_id, message_id, &codes)
    }
}
