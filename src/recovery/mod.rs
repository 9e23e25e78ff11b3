//! Known-plaintext recovery of the 64-byte TopSpeed key.
//!
//! Building blocks, leaves first:
//!
//! - [`CandidateRange`]: partitionable enumeration of 32-bit key words.
//! - [`PartialKey`]: sixteen key slots with validity flags; the cross and
//!   self scans live on it.
//! - [`KeyRecoveryEngine`]: corroborates scan results across several known
//!   blocks, slot by slot, until a complete [`Key`](crate::crypto::Key)
//!   reproduces every plaintext.

pub mod engine;
pub mod partial_key;
pub mod range;
pub mod scan;

pub use engine::{verify, KeyRecoveryEngine, KnownBlock};
pub use partial_key::{read_candidates, write_candidates, PartialKey};
pub use range::{CandidateRange, Candidates, KEY_SPACE};
pub use scan::{ScanMode, ScanResults};
