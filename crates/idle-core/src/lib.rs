pub mod candidates;
pub mod key;
pub mod sample;

pub use candidates::CandidateSet;
pub use key::{EntityKey, LabelSchema};
pub use sample::SampleSet;
