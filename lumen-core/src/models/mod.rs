pub mod analysis;
pub mod record;

pub use analysis::{AnalysisResult, BoundingBox};
pub use record::{Comment, SavedRecord};
