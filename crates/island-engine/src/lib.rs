//! Vector island engine facade: builds per-world islands from a corpus and
//! scores free text against them.

pub mod engine;
pub mod scorer;

pub use engine::{CancelFlag, IslandEngine};
pub use scorer::{classify, confidence, iw_score, score_vector};
