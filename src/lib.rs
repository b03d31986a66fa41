pub mod engine;
pub mod error;
pub mod inference;
pub mod utils;

pub use crate::engine::inference_engine::{ExecutionProvider, SessionConfig};
pub use crate::error::{SamError, SamResult};
pub use crate::inference::sam::variant::ModelVariant;
pub use crate::inference::sam::{InstanceMap, MaskResult, Sam};
pub use crate::utils::graph::{Box, Point};
