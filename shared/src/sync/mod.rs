//! Moving world state from server to client.
//!
//! [`delta`] turns full entity sets into change sets against a per-receiver
//! baseline and back; [`interpolation`] buffers received states so display can
//! blend between them.

pub mod delta;
pub mod interpolation;

pub use delta::{apply, diff, Baseline, DeltaDecoder, DeltaEncoder, EntityTable};
pub use interpolation::SnapshotBuffer;

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SyncError {
    /// The delta was built against a tick this receiver no longer holds.
    /// Recover by asking the sender for a full snapshot.
    #[error("no baseline for tick {baseline} (delta for tick {tick})")]
    MissingBaseline { tick: u64, baseline: u64 },
}
