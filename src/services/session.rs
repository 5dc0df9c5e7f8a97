//! Batch/session manager and session persistence.
//!
//! A large export is sliced into batches. After every state change the
//! session snapshot is written to an injected [`SessionStore`], so an
//! interrupted export can be resumed at whole-batch granularity.
//!
//! ## Design
//!
//! - Storage is a key-value blob contract (`save`/`load`/`clear`)
//! - Stores enforce the staleness TTL when loading; the hash history is
//!   read with [`SessionStore::load_durable`] and never expires
//! - Keys can be scoped per project so projects never share state
//! - Persistence failures are logged and never abort generation
//! - One in-flight generation/download per session (busy guard)
//! - The generated-hash history lives under its own key and survives cancel

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::constants::{HISTORY_KEY, SESSION_KEY};
use crate::models::{Combination, GeneratedHashes, Session, SessionStatus, TraitCatalog, TraitUsageStats};
use crate::services::generator::{
    BatchProgress, BatchRequest, BatchResult, BatchStatus, CancelToken, CombinationGenerator,
    GenerationContext, GenerationInput,
};
use crate::services::quota::initialize_quotas;

/// Key-value blob storage for session state.
pub trait SessionStore {
    /// Stores a JSON blob under `key`, replacing any previous one.
    fn save(&mut self, key: &str, json: &str) -> Result<()>;

    /// Loads the blob under `key` unless it is missing or stale.
    fn load(&mut self, key: &str) -> Result<Option<String>>;

    /// Loads the blob under `key` regardless of its age.
    fn load_durable(&mut self, key: &str) -> Result<Option<String>>;

    /// Removes the blob under `key`; removing a missing blob is not an error.
    fn clear(&mut self, key: &str) -> Result<()>;
}

/// Stored blob plus the time it was saved.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredBlob {
    saved_at: i64,
    payload: String,
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Whether a blob saved at `saved_at` (ms) is older than `ttl`.
fn is_stale(saved_at: i64, ttl: Duration) -> bool {
    u128::try_from(now_millis() - saved_at).is_ok_and(|age| age > ttl.as_millis())
}

/// Session store backed by one JSON file per key.
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    dir: PathBuf,
    ttl: Duration,
}

impl FileSessionStore {
    /// Creates a store in `dir`; the directory is created on first save.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>, ttl: Duration) -> Self {
        Self {
            dir: dir.into(),
            ttl,
        }
    }

    /// Directory holding the blobs.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn blob_path(&self, key: &str) -> Result<PathBuf> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            anyhow::bail!("Invalid session store key: {key}");
        }
        Ok(self.dir.join(format!("{key}.json")))
    }

    fn read_blob(&self, key: &str) -> Result<Option<StoredBlob>> {
        let path = self.blob_path(key)?;
        if !path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&path)
            .context(format!("Failed to read session file: {}", path.display()))?;
        let blob = serde_json::from_str(&content)
            .context(format!("Failed to parse session file: {}", path.display()))?;
        Ok(Some(blob))
    }
}

impl SessionStore for FileSessionStore {
    fn save(&mut self, key: &str, json: &str) -> Result<()> {
        let path = self.blob_path(key)?;
        fs::create_dir_all(&self.dir).context(format!(
            "Failed to create session directory: {}",
            self.dir.display()
        ))?;

        let blob = StoredBlob {
            saved_at: now_millis(),
            payload: json.to_string(),
        };
        let content = serde_json::to_string(&blob).context("Failed to serialize session blob")?;
        let temp_path = path.with_extension("json.tmp");

        fs::write(&temp_path, content).context(format!(
            "Failed to write temp session file: {}",
            temp_path.display()
        ))?;
        fs::rename(&temp_path, &path).context(format!(
            "Failed to rename temp session file to: {}",
            path.display()
        ))?;
        Ok(())
    }

    fn load(&mut self, key: &str) -> Result<Option<String>> {
        let Some(blob) = self.read_blob(key)? else {
            return Ok(None);
        };
        if is_stale(blob.saved_at, self.ttl) {
            tracing::info!("Discarding stale session blob '{}'", key);
            self.clear(key)?;
            return Ok(None);
        }
        Ok(Some(blob.payload))
    }

    fn load_durable(&mut self, key: &str) -> Result<Option<String>> {
        Ok(self.read_blob(key)?.map(|blob| blob.payload))
    }

    fn clear(&mut self, key: &str) -> Result<()> {
        let path = self.blob_path(key)?;
        if path.exists() {
            fs::remove_file(&path)
                .context(format!("Failed to remove session file: {}", path.display()))?;
        }
        Ok(())
    }
}

/// In-memory session store, mainly for tests and embedding.
#[derive(Debug, Clone)]
pub struct MemorySessionStore {
    blobs: HashMap<String, StoredBlob>,
    ttl: Duration,
}

impl MemorySessionStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            blobs: HashMap::new(),
            ttl,
        }
    }

    /// Stores a blob with an explicit save time in milliseconds since the epoch.
    pub fn insert_with_timestamp(&mut self, key: &str, json: &str, saved_at: i64) {
        self.blobs.insert(
            key.to_string(),
            StoredBlob {
                saved_at,
                payload: json.to_string(),
            },
        );
    }

    /// Whether a blob exists under `key`, stale or not.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.blobs.contains_key(key)
    }
}

impl SessionStore for MemorySessionStore {
    fn save(&mut self, key: &str, json: &str) -> Result<()> {
        self.insert_with_timestamp(key, json, now_millis());
        Ok(())
    }

    fn load(&mut self, key: &str) -> Result<Option<String>> {
        let Some(blob) = self.blobs.get(key) else {
            return Ok(None);
        };
        if is_stale(blob.saved_at, self.ttl) {
            self.blobs.remove(key);
            return Ok(None);
        }
        Ok(Some(blob.payload.clone()))
    }

    fn load_durable(&mut self, key: &str) -> Result<Option<String>> {
        Ok(self.blobs.get(key).map(|blob| blob.payload.clone()))
    }

    fn clear(&mut self, key: &str) -> Result<()> {
        self.blobs.remove(key);
        Ok(())
    }
}

/// Parameters of a new session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRequest {
    /// Total combinations to export
    pub total_count: usize,
    /// Combinations per batch
    pub batch_size: usize,
    /// Collection name for metadata
    pub collection_name: String,
    /// Output image edge length in pixels
    pub image_size: u32,
    /// Whether rules are applied
    pub use_rules: bool,
}

/// Drives a session through its batches and persists every transition.
pub struct SessionManager<S: SessionStore> {
    store: S,
    scope: Option<String>,
    session_key: String,
    history_key: String,
    session: Option<Session>,
    history: GeneratedHashes,
    busy: bool,
    cancel: CancelToken,
}

impl<S: SessionStore> SessionManager<S> {
    /// Creates a manager without an active session.
    ///
    /// Call [`SessionManager::restore`] to pick up persisted state.
    pub fn new(store: S) -> Self {
        Self {
            store,
            scope: None,
            session_key: SESSION_KEY.to_string(),
            history_key: HISTORY_KEY.to_string(),
            session: None,
            history: GeneratedHashes::new(),
            busy: false,
            cancel: CancelToken::new(),
        }
    }

    /// Creates a manager whose session and history are kept apart from
    /// every other scope in the same store.
    ///
    /// `scope` becomes part of the store keys, so it must consist of ASCII
    /// alphanumerics, `-` and `_` for a [`FileSessionStore`].
    pub fn scoped(store: S, scope: impl Into<String>) -> Self {
        let scope = scope.into();
        Self {
            store,
            session_key: format!("{SESSION_KEY}-{scope}"),
            history_key: format!("{HISTORY_KEY}-{scope}"),
            scope: Some(scope),
            session: None,
            history: GeneratedHashes::new(),
            busy: false,
            cancel: CancelToken::new(),
        }
    }

    /// Active session, if any.
    #[must_use]
    pub const fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// Scope of the store keys, if any.
    #[must_use]
    pub fn scope(&self) -> Option<&str> {
        self.scope.as_deref()
    }

    /// Store key of the hash history.
    #[must_use]
    pub fn history_key(&self) -> &str {
        &self.history_key
    }

    /// Generated-hash history shared across sessions of this scope.
    #[must_use]
    pub const fn history(&self) -> &GeneratedHashes {
        &self.history
    }

    /// Whether a generation or download is in flight.
    #[must_use]
    pub const fn is_busy(&self) -> bool {
        self.busy
    }

    /// Token that aborts the running batch when tripped.
    #[must_use]
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Underlying store.
    #[must_use]
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Adds externally known hashes (e.g. from a project file) to the history.
    pub fn merge_history(&mut self, hashes: &GeneratedHashes) {
        self.history.extend(hashes.iter().cloned());
    }

    /// Loads persisted history and session.
    ///
    /// A session saved while generating, ready, or downloading comes back
    /// paused. Unreadable state is logged and treated as absent.
    pub fn restore(&mut self) -> Option<&Session> {
        self.history = self.load_history();

        let session = match self.store.load(&self.session_key) {
            Ok(Some(json)) => match serde_json::from_str::<Session>(&json) {
                Ok(session) if session.scope != self.scope => {
                    tracing::warn!(
                        "Ignoring session {} saved for another project",
                        session.id
                    );
                    None
                }
                Ok(session) => Some(session),
                Err(e) => {
                    tracing::warn!("Ignoring corrupt session snapshot: {}", e);
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                tracing::warn!("Failed to load session snapshot: {:#}", e);
                None
            }
        };

        self.session = session.map(|mut session| {
            if session.status.is_in_progress() {
                tracing::info!(
                    "Session {} was interrupted while {}, pausing it",
                    session.id,
                    session.status
                );
                session.status = SessionStatus::Paused;
            }
            session
        });
        self.busy = false;
        self.persist_session();
        self.session.as_ref()
    }

    /// Loads the persisted hash history; failures yield an empty history.
    ///
    /// The history does not expire; only [`SessionManager::clear_history`]
    /// forgets it.
    pub fn load_history(&mut self) -> GeneratedHashes {
        match self.store.load_durable(&self.history_key) {
            Ok(Some(json)) => serde_json::from_str(&json).unwrap_or_else(|e| {
                tracing::warn!("Ignoring corrupt hash history: {}", e);
                GeneratedHashes::new()
            }),
            Ok(None) => GeneratedHashes::new(),
            Err(e) => {
                tracing::warn!("Failed to load hash history: {:#}", e);
                GeneratedHashes::new()
            }
        }
    }

    /// Starts a new session, replacing any previous one.
    ///
    /// Quotas are initialized from the catalog's exact-count layers, rescaled
    /// to the requested total.
    ///
    /// # Errors
    ///
    /// Returns an error for an empty catalog, a zero total or batch size, or
    /// while another operation is in flight.
    pub fn start(&mut self, catalog: &TraitCatalog, request: &SessionRequest) -> Result<&Session> {
        if self.busy {
            anyhow::bail!("Another generation or download is in progress");
        }
        if catalog.non_empty_layers().is_empty() {
            anyhow::bail!("Cannot start a session without layers");
        }
        if request.total_count == 0 {
            anyhow::bail!("Total count must be greater than 0");
        }
        if request.batch_size == 0 {
            anyhow::bail!("Batch size must be greater than 0");
        }
        let total = u32::try_from(request.total_count)
            .context(format!("Total count {} is too large", request.total_count))?;

        let mut session = Session::new(
            request.total_count,
            request.batch_size,
            request.collection_name.clone(),
            request.image_size,
            request.use_rules,
        );
        session.quotas = initialize_quotas(catalog, total);
        session.scope = self.scope.clone();
        tracing::info!(
            "Started session {} ({} combinations in {} batches)",
            session.id,
            session.total_count,
            session.total_batches
        );

        self.cancel.reset();
        self.session = Some(session);
        self.persist_session();
        self.active()
    }

    fn active(&self) -> Result<&Session> {
        self.session
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("No active session"))
    }

    fn active_mut(&mut self) -> Result<&mut Session> {
        self.session
            .as_mut()
            .ok_or_else(|| anyhow::anyhow!("No active session"))
    }

    /// Generates the combinations of the current batch.
    ///
    /// The generation context is rebuilt from the session (quotas, pair
    /// usage), the history, and the caller's usage stats, which are updated
    /// in place. A partial batch still moves the session to `ready`. A
    /// cancelled batch discards the session.
    ///
    /// # Errors
    ///
    /// Returns an error when no session is active, the session is not
    /// waiting for generation, or another operation is in flight.
    pub fn generate_next_batch<F>(
        &mut self,
        generator: &mut CombinationGenerator,
        input: &GenerationInput<'_>,
        usage: &mut TraitUsageStats,
        progress: F,
    ) -> Result<BatchResult>
    where
        F: FnMut(BatchProgress),
    {
        if self.busy {
            anyhow::bail!("Another generation or download is in progress");
        }
        let history = self.history.clone();
        let session = self.active_mut()?;
        match session.status {
            SessionStatus::Generating => {}
            SessionStatus::Completed if !session.is_finished() => {
                session.status = SessionStatus::Generating;
            }
            status => anyhow::bail!("Cannot generate a batch while the session is {status}"),
        }

        let mut context = GenerationContext {
            quotas: session.quotas.clone(),
            pair_usage: session.pair_usage.clone(),
            usage: usage.clone(),
            generated: history,
        };
        context.generated.extend(session.generated_hashes.iter().cloned());

        let request = BatchRequest {
            size: session.current_batch_size(),
            use_rules: session.use_rules,
            respect_quotas: true,
        };
        tracing::info!(
            "Generating batch {}/{} ({} combinations)",
            session.current_batch + 1,
            session.total_batches,
            request.size
        );

        self.busy = true;
        let result = generator.generate_batch(input, &mut context, &request, &self.cancel, progress);
        self.busy = false;

        if result.status == BatchStatus::Cancelled {
            // Usage of combinations accepted before the trip stays recorded.
            *usage = context.usage;
            self.discard_session();
            return Ok(result);
        }

        let new_hashes: Vec<String> = result.combinations.iter().map(Combination::hash).collect();
        self.history.extend(new_hashes.iter().cloned());

        let session = self.active_mut()?;
        session.quotas = context.quotas;
        session.pair_usage = context.pair_usage;
        session.generated_hashes.extend(new_hashes);
        session.current_batch_data = Some(result.combinations.clone());
        session.status = SessionStatus::Ready;
        *usage = context.usage;

        self.persist_session();
        self.persist_history();
        Ok(result)
    }

    /// Marks the current batch as being exported and returns its combinations.
    pub fn begin_download(&mut self) -> Result<Vec<Combination>> {
        if self.busy {
            anyhow::bail!("Another generation or download is in progress");
        }
        let session = self.active_mut()?;
        if session.status != SessionStatus::Ready {
            anyhow::bail!("Cannot export while the session is {}", session.status);
        }
        let combinations = session.current_batch_data.clone().unwrap_or_default();
        session.status = SessionStatus::Downloading;

        self.busy = true;
        self.persist_session();
        Ok(combinations)
    }

    /// Finishes the export of the current batch.
    ///
    /// Success records the batch as completed and advances to the next one;
    /// failure returns to `ready` so the export can be retried.
    pub fn finish_download(&mut self, success: bool) -> Result<&Session> {
        let session = self.active_mut()?;
        if session.status != SessionStatus::Downloading {
            anyhow::bail!("No export in progress (session is {})", session.status);
        }

        if success {
            let batch = session.current_batch;
            if !session.completed_batches.contains(&batch) {
                session.completed_batches.push(batch);
            }
            session.current_batch_data = None;
            session.status = SessionStatus::Completed;
            if !session.is_finished() {
                session.current_batch += 1;
            }
            tracing::info!(
                "Batch {}/{} exported",
                session.completed_batches.len(),
                session.total_batches
            );
        } else {
            session.status = SessionStatus::Ready;
            tracing::warn!("Export of batch {} failed, ready to retry", session.current_batch + 1);
        }

        self.busy = false;
        self.persist_session();
        self.active()
    }

    /// Pauses an in-progress session.
    pub fn pause(&mut self) -> Result<()> {
        let session = self.active_mut()?;
        if !session.status.is_in_progress() {
            anyhow::bail!("Cannot pause a session that is {}", session.status);
        }
        session.status = SessionStatus::Paused;
        self.busy = false;
        self.persist_session();
        Ok(())
    }

    /// Resumes a paused session.
    ///
    /// Goes back to `ready` when the current batch was already generated,
    /// otherwise to `generating`.
    pub fn resume(&mut self) -> Result<SessionStatus> {
        let session = self.active_mut()?;
        if session.status != SessionStatus::Paused {
            anyhow::bail!("Cannot resume a session that is {}", session.status);
        }
        session.status = if session.current_batch_data.is_some() {
            SessionStatus::Ready
        } else {
            SessionStatus::Generating
        };
        let status = session.status;
        self.persist_session();
        Ok(status)
    }

    /// Aborts any running batch and drops the session with its quotas and
    /// pair usage. The hash history is kept.
    pub fn cancel(&mut self) -> Result<()> {
        self.cancel.cancel();
        self.session = None;
        self.busy = false;
        self.store.clear(&self.session_key)
    }

    /// Forgets every generated hash.
    pub fn clear_history(&mut self) -> Result<()> {
        self.history.clear();
        self.store.clear(&self.history_key)
    }

    fn discard_session(&mut self) {
        tracing::info!("Discarding cancelled session");
        self.session = None;
        if let Err(e) = self.store.clear(&self.session_key) {
            tracing::warn!("Failed to clear session snapshot: {:#}", e);
        }
    }

    fn persist_session(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        session.touch();
        let saved = serde_json::to_string(session)
            .context("Failed to serialize session")
            .and_then(|json| self.store.save(&self.session_key, &json));
        if let Err(e) = saved {
            tracing::warn!("Failed to persist session: {:#}", e);
        }
    }

    fn persist_history(&mut self) {
        let saved = serde_json::to_string(&self.history)
            .context("Failed to serialize hash history")
            .and_then(|json| self.store.save(&self.history_key, &json));
        if let Err(e) = saved {
            tracing::warn!("Failed to persist hash history: {:#}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::models::{Item, Layer, RarityMode, RuleSet};
    use crate::services::generator::GenerationOptions;

    const DAY: Duration = Duration::from_secs(24 * 60 * 60);

    fn catalog() -> TraitCatalog {
        TraitCatalog::from_layers(vec![
            Layer::new(
                1,
                "Background",
                (0..4).map(|i| Item::new(10 + i, format!("Bg {i}"))).collect(),
            )
            .unwrap(),
            Layer::new(2, "Eyes", (0..3).map(|i| Item::new(20 + i, format!("Eyes {i}"))).collect())
                .unwrap(),
        ])
        .unwrap()
    }

    fn request(total: usize, batch: usize) -> SessionRequest {
        SessionRequest {
            total_count: total,
            batch_size: batch,
            collection_name: "Test".to_string(),
            image_size: 512,
            use_rules: true,
        }
    }

    #[test]
    fn test_memory_store_ttl() {
        let mut store = MemorySessionStore::new(DAY);
        store.insert_with_timestamp("fresh", "{}", now_millis() - 1000);
        store.insert_with_timestamp("stale", "{}", now_millis() - 25 * 60 * 60 * 1000);

        assert_eq!(store.load("fresh").unwrap().as_deref(), Some("{}"));
        assert_eq!(store.load("stale").unwrap(), None);
        assert!(!store.contains("stale"));
        assert_eq!(store.load("missing").unwrap(), None);
    }

    #[test]
    fn test_file_store_round_trip_and_clear() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = FileSessionStore::new(temp_dir.path().join("sessions"), DAY);

        store.save("traitforge-session", r#"{"a":1}"#).unwrap();
        assert_eq!(
            store.load("traitforge-session").unwrap().as_deref(),
            Some(r#"{"a":1}"#)
        );
        store.clear("traitforge-session").unwrap();
        assert_eq!(store.load("traitforge-session").unwrap(), None);
        store.clear("traitforge-session").unwrap();
    }

    #[test]
    fn test_file_store_rejects_path_keys() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = FileSessionStore::new(temp_dir.path(), DAY);
        assert!(store.save("../escape", "{}").is_err());
        assert!(store.load("a/b").is_err());
    }

    #[test]
    fn test_file_store_drops_stale_blob() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = FileSessionStore::new(temp_dir.path(), DAY);
        let stale = StoredBlob {
            saved_at: now_millis() - 2 * 24 * 60 * 60 * 1000,
            payload: "{}".to_string(),
        };
        let path = temp_dir.path().join("old.json");
        fs::write(&path, serde_json::to_string(&stale).unwrap()).unwrap();

        assert_eq!(store.load("old").unwrap(), None);
        assert!(!path.exists());
    }

    #[test]
    fn test_start_validates_input() {
        let mut manager = SessionManager::new(MemorySessionStore::new(DAY));
        assert!(manager.start(&TraitCatalog::new(), &request(10, 5)).is_err());
        assert!(manager.start(&catalog(), &request(0, 5)).is_err());
        assert!(manager.start(&catalog(), &request(10, 0)).is_err());
        assert!(manager.session().is_none());

        let session = manager.start(&catalog(), &request(10, 4)).unwrap();
        assert_eq!(session.total_batches, 3);
        assert_eq!(session.status, SessionStatus::Generating);
        assert!(manager.store().contains(SESSION_KEY));
    }

    #[test]
    fn test_batch_lifecycle() {
        let catalog = catalog();
        let rules = RuleSet::new();
        let input = GenerationInput {
            catalog: &catalog,
            rules: &rules,
            rarity_mode: RarityMode::Equal,
        };
        let mut generator = CombinationGenerator::new(GenerationOptions::default(), Some(5));
        let mut usage = TraitUsageStats::new();
        let mut manager = SessionManager::new(MemorySessionStore::new(DAY));
        manager.start(&catalog, &request(10, 4)).unwrap();

        assert!(manager.begin_download().is_err(), "nothing generated yet");

        for batch in 0..3 {
            let result = manager
                .generate_next_batch(&mut generator, &input, &mut usage, |_| {})
                .unwrap();
            assert_eq!(result.status, BatchStatus::Complete);
            assert_eq!(manager.session().unwrap().status, SessionStatus::Ready);

            assert!(
                manager
                    .generate_next_batch(&mut generator, &input, &mut usage, |_| {})
                    .is_err(),
                "batch {batch} already generated"
            );

            let combinations = manager.begin_download().unwrap();
            assert_eq!(combinations.len(), if batch < 2 { 4 } else { 2 });
            assert!(manager.is_busy());
            manager.finish_download(true).unwrap();
        }

        let session = manager.session().unwrap();
        assert_eq!(session.status, SessionStatus::Completed);
        assert!(session.is_finished());
        assert_eq!(session.completed_batches, vec![0, 1, 2]);
        assert_eq!(session.generated_hashes.len(), 10);
        assert_eq!(manager.history().len(), 10);
        assert!(manager
            .generate_next_batch(&mut generator, &input, &mut usage, |_| {})
            .is_err());
    }

    #[test]
    fn test_failed_download_returns_to_ready() {
        let catalog = catalog();
        let rules = RuleSet::new();
        let input = GenerationInput {
            catalog: &catalog,
            rules: &rules,
            rarity_mode: RarityMode::Weighted,
        };
        let mut generator = CombinationGenerator::new(GenerationOptions::default(), Some(5));
        let mut usage = TraitUsageStats::new();
        let mut manager = SessionManager::new(MemorySessionStore::new(DAY));
        manager.start(&catalog, &request(4, 4)).unwrap();
        manager
            .generate_next_batch(&mut generator, &input, &mut usage, |_| {})
            .unwrap();

        let first = manager.begin_download().unwrap();
        let session = manager.finish_download(false).unwrap();
        assert_eq!(session.status, SessionStatus::Ready);
        assert!(session.completed_batches.is_empty());
        assert_eq!(manager.begin_download().unwrap(), first);
    }

    #[test]
    fn test_restore_pauses_and_resume_picks_state() {
        let catalog = catalog();
        let rules = RuleSet::new();
        let input = GenerationInput {
            catalog: &catalog,
            rules: &rules,
            rarity_mode: RarityMode::Weighted,
        };
        let mut generator = CombinationGenerator::new(GenerationOptions::default(), Some(5));
        let mut usage = TraitUsageStats::new();
        let mut manager = SessionManager::new(MemorySessionStore::new(DAY));
        manager.start(&catalog, &request(8, 4)).unwrap();
        manager
            .generate_next_batch(&mut generator, &input, &mut usage, |_| {})
            .unwrap();

        let store = manager.store().clone();
        let mut restored = SessionManager::new(store);
        let session = restored.restore().unwrap();
        assert_eq!(session.status, SessionStatus::Paused);
        assert_eq!(restored.history().len(), 4);

        assert!(restored.begin_download().is_err());
        assert_eq!(restored.resume().unwrap(), SessionStatus::Ready);
        assert_eq!(restored.begin_download().unwrap().len(), 4);
    }

    #[test]
    fn test_restore_ignores_corrupt_snapshot() {
        let mut store = MemorySessionStore::new(DAY);
        store.insert_with_timestamp(SESSION_KEY, "{broken", now_millis());
        store.insert_with_timestamp(HISTORY_KEY, "[1, 2", now_millis());
        let mut manager = SessionManager::new(store);
        assert!(manager.restore().is_none());
        assert!(manager.history().is_empty());
    }

    #[test]
    fn test_restore_keeps_completed_status() {
        let mut session = Session::new(4, 4, "Done", 256, false);
        session.status = SessionStatus::Completed;
        session.completed_batches = vec![0];
        let mut store = MemorySessionStore::new(DAY);
        store.insert_with_timestamp(SESSION_KEY, &serde_json::to_string(&session).unwrap(), now_millis());

        let mut manager = SessionManager::new(store);
        assert_eq!(manager.restore().unwrap().status, SessionStatus::Completed);
    }

    #[test]
    fn test_cancel_keeps_history() {
        let catalog = catalog();
        let rules = RuleSet::new();
        let input = GenerationInput {
            catalog: &catalog,
            rules: &rules,
            rarity_mode: RarityMode::Weighted,
        };
        let mut generator = CombinationGenerator::new(GenerationOptions::default(), Some(5));
        let mut usage = TraitUsageStats::new();
        let mut manager = SessionManager::new(MemorySessionStore::new(DAY));
        manager.start(&catalog, &request(8, 4)).unwrap();
        manager
            .generate_next_batch(&mut generator, &input, &mut usage, |_| {})
            .unwrap();

        manager.cancel().unwrap();
        assert!(manager.session().is_none());
        assert!(!manager.store().contains(SESSION_KEY));
        assert!(manager.store().contains(HISTORY_KEY));
        assert_eq!(manager.history().len(), 4);
        assert!(manager.cancel_token().is_cancelled());

        manager.start(&catalog, &request(4, 4)).unwrap();
        assert!(!manager.cancel_token().is_cancelled(), "new session resets the token");
        let result = manager
            .generate_next_batch(&mut generator, &input, &mut usage, |_| {})
            .unwrap();
        for combination in &result.combinations {
            assert_eq!(
                manager.history().iter().filter(|h| **h == combination.hash()).count(),
                1
            );
        }
        assert_eq!(manager.history().len(), 8);

        manager.clear_history().unwrap();
        assert!(manager.history().is_empty());
        assert!(!manager.store().contains(HISTORY_KEY));
    }

    #[test]
    fn test_cancelled_batch_discards_session() {
        let catalog = catalog();
        let rules = RuleSet::new();
        let input = GenerationInput {
            catalog: &catalog,
            rules: &rules,
            rarity_mode: RarityMode::Weighted,
        };
        let mut generator = CombinationGenerator::new(GenerationOptions::default(), Some(5));
        let mut usage = TraitUsageStats::new();
        let mut manager = SessionManager::new(MemorySessionStore::new(DAY));
        manager.start(&catalog, &request(8, 8)).unwrap();
        let token = manager.cancel_token();

        let result = manager
            .generate_next_batch(&mut generator, &input, &mut usage, |progress| {
                if progress.produced == 3 {
                    token.cancel();
                }
            })
            .unwrap();
        assert_eq!(result.status, BatchStatus::Cancelled);
        assert_eq!(result.combinations.len(), 3);
        assert!(manager.session().is_none());
        assert!(manager.history().is_empty());

        // Two layers per accepted combination.
        let mut recorded = 0;
        for layer in catalog.layers() {
            for item in &layer.items {
                recorded += usage.count(layer.id, item.id);
            }
        }
        assert_eq!(recorded, 6, "usage of accepted combinations survives the cancel");
        for combination in &result.combinations {
            for (layer_id, item_id) in combination.iter() {
                assert!(usage.count(layer_id, item_id) >= 1);
            }
        }
    }

    #[test]
    fn test_history_outlives_session_ttl() {
        let day_old = now_millis() - 25 * 60 * 60 * 1000;
        let mut store = MemorySessionStore::new(DAY);
        let session = Session::new(4, 4, "Old", 256, false);
        store.insert_with_timestamp(SESSION_KEY, &serde_json::to_string(&session).unwrap(), day_old);
        store.insert_with_timestamp(HISTORY_KEY, r#"["1:10|2:20","1:11|2:21"]"#, day_old);

        let mut manager = SessionManager::new(store);
        assert!(manager.restore().is_none(), "stale session expires");
        assert_eq!(manager.history().len(), 2, "history never expires");
        assert!(manager.history().contains("1:10|2:20"));
    }

    #[test]
    fn test_scoped_managers_do_not_share_state() {
        let catalog = catalog();
        let rules = RuleSet::new();
        let input = GenerationInput {
            catalog: &catalog,
            rules: &rules,
            rarity_mode: RarityMode::Weighted,
        };
        let mut generator = CombinationGenerator::new(GenerationOptions::default(), Some(5));
        let mut usage = TraitUsageStats::new();
        let mut first = SessionManager::scoped(MemorySessionStore::new(DAY), "first");
        assert_eq!(first.scope(), Some("first"));
        first.start(&catalog, &request(4, 4)).unwrap();
        first
            .generate_next_batch(&mut generator, &input, &mut usage, |_| {})
            .unwrap();
        assert_eq!(first.session().unwrap().scope.as_deref(), Some("first"));
        assert!(first.store().contains(&format!("{SESSION_KEY}-first")));
        assert!(first.store().contains(first.history_key()));
        assert!(!first.store().contains(SESSION_KEY));

        let mut second = SessionManager::scoped(first.store().clone(), "second");
        assert!(second.restore().is_none());
        assert!(second.history().is_empty());

        let mut again = SessionManager::scoped(first.store().clone(), "first");
        assert!(again.restore().is_some());
        assert_eq!(again.history().len(), 4);
    }

    #[test]
    fn test_restore_ignores_session_of_other_scope() {
        let mut session = Session::new(4, 4, "Elsewhere", 256, false);
        session.scope = Some("other".to_string());
        let mut store = MemorySessionStore::new(DAY);
        store.insert_with_timestamp(
            &format!("{SESSION_KEY}-mine"),
            &serde_json::to_string(&session).unwrap(),
            now_millis(),
        );

        let mut manager = SessionManager::scoped(store, "mine");
        assert!(manager.restore().is_none());
    }
}
