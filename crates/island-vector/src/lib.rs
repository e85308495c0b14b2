//! Island vector layer: nearest-neighbour indexing, threshold calibration,
//! the immutable island artifact, and its in-memory and LanceDB-backed stores.

pub mod archive;
pub mod artifact;
pub mod calibrate;
pub mod distance;
pub mod index;
pub mod schema;
pub mod store;
pub mod table;

pub use archive::IslandArchive;
pub use artifact::{corpus_digest, IslandArtifact, IslandMetadata};
pub use calibrate::{calibrate, Calibration};
pub use distance::{l2_distance, l2_normalize, EmbeddingMatrix};
pub use index::{IndexKind, Neighbor, VectorIndex};
pub use store::ArtifactStore;
