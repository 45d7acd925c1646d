//! Chronological photo maps: album loading, capture-time ordering, gated display URLs and
//! toolkit independent render plans.

pub mod album;
pub mod catalog;
pub mod chronology;
pub mod extract;
pub mod gate;
pub mod photo;
pub mod sequence;
pub mod stats;
mod store;
pub mod view;

pub use chronology::{resolve_date, DateResolver};
pub use photo::{AlbumId, PhotoRecord};
pub use sequence::{sequence, Sequencer};
