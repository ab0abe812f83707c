pub mod config;
pub mod engine;
pub mod error;
pub mod inventory;
pub mod metadata;
pub mod progress;
pub mod reconcile;
pub mod remote;
pub mod scanner;
pub mod upload;
pub mod validator;

pub use config::AppConfig;
pub use engine::{ImportEngine, ImportOptions, ImportResult};
pub use error::Error;
pub use metadata::AssociationRule;
pub use progress::{ProgressReporter, SilentReporter};
pub use reconcile::{Comparison, ImportMode};
pub use remote::{GirderClient, MemoryStore, RemoteStore};
pub use validator::BidsValidator;
