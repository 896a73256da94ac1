//! Chat sessions: transcript ownership and reply streaming

mod chat;
mod consumer;
mod transcript;

pub use chat::{ChatSession, SessionOptions};
pub use consumer::{ResponseStream, StreamEvent};
pub use transcript::Transcript;
