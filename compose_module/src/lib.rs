pub mod compose;

pub use compose::{
    ComposeError, ComposeOutput, ComposeParams, GeminiClient, GeminiConfig, ImageInput,
    ModelInfo,
};
