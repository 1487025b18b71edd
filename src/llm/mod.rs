//! Text generation backends.
pub mod any;
pub mod claude;
pub mod error;
pub mod groq;
pub mod http;
pub mod mock;
pub mod provider;

pub use any::Backend;
pub use error::LlmError;
pub use mock::MockGenerator;
pub use provider::{GenerationParams, Generator, Message, Role};
