//! Request builder
//!
//! Projects a transcript into the message list a backend expects. Ollama and
//! OpenAI-style providers disagree on how images travel:
//!
//! - Ollama: `{"role", "content", "images": ["<base64>", ...]}` (a list)
//! - OpenAI: `content` becomes a list of parts with one
//!   `{"type": "image_url", "image_url": {"url": "data:<mime>;base64,..."}}`
//!
//! Images are dropped, with a warning, when the selected model cannot take them.
//! SVG attachments are always dropped the same way: both APIs only decode
//! raster formats.

use super::types::{BackendKind, Capabilities, Role, Turn};
use bytes::Bytes;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Serialize;
use tracing::warn;

/// A message in Ollama's `/api/chat` format
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OllamaMessage {
    pub role: Role,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub images: Option<Vec<String>>,
}

/// A message in OpenAI's `/chat/completions` format
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OpenAiMessage {
    pub role: Role,
    pub content: OpenAiContent,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum OpenAiContent {
    Text(String),
    Parts(Vec<OpenAiContentPart>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OpenAiContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageUrl {
    pub url: String,
}

/// Messages ready to be sent, in the shape of one backend family
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum WireMessages {
    Ollama(Vec<OllamaMessage>),
    OpenAi(Vec<OpenAiMessage>),
}

impl WireMessages {
    pub fn len(&self) -> usize {
        match self {
            WireMessages::Ollama(messages) => messages.len(),
            WireMessages::OpenAi(messages) => messages.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of messages that carry an image
    pub fn attachment_count(&self) -> usize {
        match self {
            WireMessages::Ollama(messages) => {
                messages.iter().filter(|m| m.images.is_some()).count()
            }
            WireMessages::OpenAi(messages) => messages
                .iter()
                .filter(|m| matches!(m.content, OpenAiContent::Parts(_)))
                .count(),
        }
    }
}

pub struct RequestBuilder;

impl RequestBuilder {
    /// Builds the full conversation, in transcript order, for `kind`
    pub fn build(turns: &[Turn], kind: BackendKind, capabilities: Capabilities) -> WireMessages {
        let dropped = turns.iter().filter(|t| t.has_image()).count();
        if dropped > 0 && !capabilities.multimodal {
            warn!(
                "Sending {} image attachment(s) as text only: the selected {} model does not accept images",
                dropped, kind
            );
        }
        let vector = turns
            .iter()
            .filter_map(Turn::image)
            .filter(|bytes| looks_like_svg(bytes))
            .count();
        if vector > 0 && capabilities.multimodal {
            warn!(
                "Sending {} SVG attachment(s) as text only: the {} backend accepts raster images only",
                vector, kind
            );
        }

        if kind.is_ollama() {
            WireMessages::Ollama(
                turns
                    .iter()
                    .map(|turn| Self::ollama_message(turn, capabilities.multimodal))
                    .collect(),
            )
        } else {
            WireMessages::OpenAi(
                turns
                    .iter()
                    .map(|turn| Self::openai_message(turn, capabilities.multimodal))
                    .collect(),
            )
        }
    }

    fn ollama_message(turn: &Turn, multimodal: bool) -> OllamaMessage {
        let images = Self::raster_image(turn, multimodal).map(|bytes| vec![STANDARD.encode(bytes)]);

        OllamaMessage {
            role: turn.role(),
            content: turn.text().to_string(),
            images,
        }
    }

    fn openai_message(turn: &Turn, multimodal: bool) -> OpenAiMessage {
        let content = match Self::raster_image(turn, multimodal) {
            Some(bytes) => OpenAiContent::Parts(vec![
                OpenAiContentPart::Text {
                    text: turn.text().to_string(),
                },
                OpenAiContentPart::ImageUrl {
                    image_url: ImageUrl {
                        url: format!("data:{};base64,{}", sniff_mime(bytes), STANDARD.encode(bytes)),
                    },
                },
            ]),
            None => OpenAiContent::Text(turn.text().to_string()),
        };

        OpenAiMessage {
            role: turn.role(),
            content,
        }
    }

    fn raster_image(turn: &Turn, multimodal: bool) -> Option<&Bytes> {
        turn.image().filter(|bytes| multimodal && !looks_like_svg(bytes))
    }
}

/// Guesses an image MIME type from its leading bytes
pub fn sniff_mime(bytes: &[u8]) -> &'static str {
    if bytes.starts_with(b"\x89PNG\r\n\x1a\n") {
        "image/png"
    } else if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        "image/jpeg"
    } else if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
        "image/gif"
    } else if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        "image/webp"
    } else if looks_like_svg(bytes) {
        "image/svg+xml"
    } else {
        "application/octet-stream"
    }
}

fn looks_like_svg(bytes: &[u8]) -> bool {
    let head = String::from_utf8_lossy(&bytes[..bytes.len().min(256)]);
    let head = head.trim_start();
    head.starts_with("<svg") || (head.starts_with("<?xml") && head.contains("<svg"))
}
