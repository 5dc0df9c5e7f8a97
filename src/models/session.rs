//! Resumable batch-generation session snapshot.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Combination, PairUsage, QuotaState};

/// Session status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// Combinations for the current batch are being generated.
    Generating,
    /// The current batch is generated and waiting to be exported.
    Ready,
    /// The current batch is being rendered and archived.
    Downloading,
    /// The last batch finished exporting.
    Completed,
    /// Interrupted; must be resumed explicitly.
    Paused,
}

impl SessionStatus {
    /// Whether an interrupted process would leave work half-done in this state.
    #[must_use]
    pub const fn is_in_progress(self) -> bool {
        matches!(self, Self::Generating | Self::Ready | Self::Downloading)
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Generating => write!(f, "generating"),
            Self::Ready => write!(f, "ready"),
            Self::Downloading => write!(f, "downloading"),
            Self::Completed => write!(f, "completed"),
            Self::Paused => write!(f, "paused"),
        }
    }
}

/// Persisted state of a long export split into batches.
///
/// Field names are part of the on-disk format and must stay stable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// Unique session identifier
    pub id: String,
    /// Total number of combinations requested
    pub total_count: usize,
    /// Combinations per batch
    pub batch_size: usize,
    /// Collection name used for metadata
    pub collection_name: String,
    /// Output image edge length in pixels
    pub image_size: u32,
    /// Whether rules are applied during generation
    pub use_rules: bool,
    /// Identifies the project the session was started for
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    /// Zero-based index of the batch being worked on
    pub current_batch: usize,
    /// `ceil(total_count / batch_size)`
    pub total_batches: usize,
    /// Indices of fully exported batches
    #[serde(default)]
    pub completed_batches: Vec<usize>,
    /// Hashes produced within this session
    #[serde(default)]
    pub generated_hashes: Vec<String>,
    /// Current status
    pub status: SessionStatus,
    /// Combinations of the current batch, once generated
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_batch_data: Option<Vec<Combination>>,
    /// Remaining exact-count quotas
    #[serde(default)]
    pub quotas: QuotaState,
    /// Rule pairing counters
    #[serde(default)]
    pub pair_usage: PairUsage,
    /// Last save time in milliseconds since the Unix epoch
    pub timestamp: i64,
}

impl Session {
    /// Creates a new session in the `generating` state.
    #[must_use]
    pub fn new(
        total_count: usize,
        batch_size: usize,
        collection_name: impl Into<String>,
        image_size: u32,
        use_rules: bool,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            total_count,
            batch_size,
            collection_name: collection_name.into(),
            image_size,
            use_rules,
            scope: None,
            current_batch: 0,
            total_batches: total_batches(total_count, batch_size),
            completed_batches: Vec::new(),
            generated_hashes: Vec::new(),
            status: SessionStatus::Generating,
            current_batch_data: None,
            quotas: QuotaState::new(),
            pair_usage: PairUsage::new(),
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// Whether every batch has been exported.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.completed_batches.len() >= self.total_batches
    }

    /// Size of the current batch (the last one may be short).
    #[must_use]
    pub fn current_batch_size(&self) -> usize {
        let start = self.current_batch * self.batch_size;
        self.total_count.saturating_sub(start).min(self.batch_size)
    }

    /// Index of the first item of the current batch within the collection.
    #[must_use]
    pub const fn current_batch_offset(&self) -> usize {
        self.current_batch * self.batch_size
    }

    /// Refreshes the save timestamp.
    pub fn touch(&mut self) {
        self.timestamp = chrono::Utc::now().timestamp_millis();
    }
}

/// Number of batches needed for `total` items.
#[must_use]
pub const fn total_batches(total: usize, batch_size: usize) -> usize {
    if batch_size == 0 {
        return 0;
    }
    total.div_ceil(batch_size)
}
