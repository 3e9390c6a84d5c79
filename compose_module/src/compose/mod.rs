mod errors;
mod gemini;
mod prompt;
mod types;

pub use errors::ComposeError;
pub use gemini::GeminiClient;
pub use types::{ComposeOutput, ComposeParams, GeminiConfig, ImageInput, ModelInfo};
