//! Inference backend layer
//!
//! Probing, resolution, request building and the [`ChatBackend`] trait with
//! its Ollama and OpenAI-compatible implementations.

mod backend;
mod error;
mod mock;
mod ndjson;
mod ollama;
mod openai_compatible;
mod probe;
mod request;
mod resolver;
mod types;

pub use backend::{BackendConnector, ChatBackend, FragmentStream, HttpConnector, StreamChunk};
pub use error::ChatError;
pub use mock::{MockBackend, MockConnector, MockProbe, MockReply};
pub use ndjson::decode_lines;
pub use ollama::{is_vision_model, OllamaBackend};
pub use openai_compatible::OpenAiCompatibleBackend;
pub use probe::{HttpProbe, TransportProbe, MAX_PROBE_TIMEOUT, PROBE_PATH};
pub use request::{
    sniff_mime, ImageUrl, OllamaMessage, OpenAiContent, OpenAiContentPart, OpenAiMessage,
    RequestBuilder, WireMessages,
};
pub use resolver::{BackendResolver, EnvironmentSignals};
pub use types::{
    normalize_model_name, BackendDescriptor, BackendKind, Capabilities, ModelHandle, ProbeOutcome,
    Provisioning, Role, Turn,
};
