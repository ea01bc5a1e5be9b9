// Project persistence boundary
// The sequencer only guarantees its state can be expressed as a plain
// serializable snapshot; file formats belong to the persistence collaborator.

pub mod snapshot;

pub use snapshot::{SnapshotError, StoreSnapshot};
