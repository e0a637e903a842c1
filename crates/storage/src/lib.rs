pub mod backend;
pub mod error;
mod path;

pub use crate::backend::FileStore;
pub use crate::path::validate as validate_path;
use std::sync::Arc;

pub type FilesHandle = Arc<dyn FileStore + Send + Sync>;
