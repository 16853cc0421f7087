pub mod cues;
pub mod episodes;
pub mod segments;

pub use cues::{CueRepository, PgCueRepository};
pub use episodes::{EpisodeRepository, PgEpisodeRepository};
pub use segments::{PgSegmentRepository, SegmentRepository};
