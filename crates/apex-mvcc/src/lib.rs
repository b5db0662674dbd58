//! # apex-mvcc
//!
//! Multi-version state for speculative parallel execution.
//!
//! Every [`AccessKey`](apex_types::AccessKey) owns a [`VersionChain`]: an
//! arena of versions linked in tid order and anchored by a committed dummy
//! that stands for the pre-batch snapshot. Chains are sharded by key, so
//! workers touching different keys never contend.
//!
//! Features:
//! - [`VersionStore`]: lazily created chains, one lock per chain
//! - [`StateView`]: the single get/set capability every executor sees
//! - [`SnapshotState`]: read-only pre-batch state with a prefetch cache
//! - [`GroupView`] / [`MvccView`]: per-worker and per-transaction MVCC views
//! - [`TrackingView`], [`BufferedState`], [`MergedState`]: dry-run,
//!   sequential and fallback views

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod buffered;
pub mod chain;
pub mod error;
pub mod footprint;
pub mod group_view;
pub mod merged;
pub mod snapshot;
pub mod store;
pub mod tracking;
pub mod version;
pub mod view;

pub use buffered::BufferedState;
pub use chain::{VersionChain, VersionRef};
pub use error::{MvccError, MvccResult};
pub use footprint::{LocalWriteBuffer, ReadView, TxFootprint, WriteView};
pub use group_view::{GroupView, MvccView};
pub use merged::{MergedState, MergedView};
pub use snapshot::SnapshotState;
pub use store::VersionStore;
pub use tracking::TrackingView;
pub use version::{Producer, Status, VersionInfo};
pub use view::{InMemorySource, OverlaySource, StateSource, StateView};
