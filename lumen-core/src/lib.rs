pub mod classifier;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod store;
pub mod summary;

pub use classifier::{
    create_gateway, ClassificationError, ClassificationGateway, ClassifierBackend, Prediction,
    RemoteClassifier, SimulatedClassifier,
};
pub use config::LumenConfig;
pub use error::{LumenError, ValidationError};
pub use models::{AnalysisResult, BoundingBox, Comment, SavedRecord};
pub use store::{BlobStore, FsBlobStore, RecordStore, StorageError};
pub use summary::{summarize, summarize_at, DashboardSummary, Window};
