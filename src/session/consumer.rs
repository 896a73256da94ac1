//! Streaming response consumer
//!
//! Turns a backend's fragment stream into [`StreamEvent`]s: any number of
//! fragments, then exactly one `Completed` or `Failed`. The accumulated text
//! becomes the assistant turn only when the backend signals completion.
//! Dropping the stream early closes the connection and records nothing.

use super::chat::ChatSession;
use crate::llm::{ChatError, FragmentStream, StreamChunk, Turn};
use futures_util::stream::{self, BoxStream, Stream, StreamExt};
use std::pin::Pin;
use std::task::{Context, Poll};
use tracing::{debug, warn, Instrument, Span};

/// One observable step of a reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// Text to display immediately
    Fragment(String),
    /// The reply finished; the turn has been appended to the transcript
    Completed(Turn),
    /// The reply failed; nothing was appended
    Failed(ChatError),
}

impl StreamEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, StreamEvent::Fragment(_))
    }
}

enum Phase {
    Connecting,
    Streaming(FragmentStream),
    Finished,
}

struct Consumer<'a> {
    session: &'a mut ChatSession,
    phase: Phase,
    accumulator: String,
}

impl Consumer<'_> {
    async fn step(&mut self) -> Option<StreamEvent> {
        loop {
            match &mut self.phase {
                Phase::Connecting => match self.session.open_request().await {
                    Ok(fragments) => {
                        debug!("Response headers received, streaming");
                        self.phase = Phase::Streaming(fragments);
                    }
                    Err(e) => return Some(self.fail(e)),
                },
                Phase::Streaming(fragments) => {
                    let next = fragments.next().await;
                    return Some(match next {
                        Some(Ok(StreamChunk::Fragment(text))) => {
                            self.accumulator.push_str(&text);
                            StreamEvent::Fragment(text)
                        }
                        Some(Ok(StreamChunk::Done)) => self.complete(),
                        Some(Err(e)) => self.fail(e),
                        None => self.fail(ChatError::stream_failed(
                            "response ended before the backend signalled completion",
                        )),
                    });
                }
                Phase::Finished => return None,
            }
        }
    }

    fn complete(&mut self) -> StreamEvent {
        self.phase = Phase::Finished;
        let turn = Turn::assistant(std::mem::take(&mut self.accumulator));
        debug!("Reply complete ({} chars)", turn.text().len());
        self.session.record_reply(turn.clone());
        StreamEvent::Completed(turn)
    }

    fn fail(&mut self, error: ChatError) -> StreamEvent {
        self.phase = Phase::Finished;
        warn!(
            "Reply failed after {} chars: {}",
            self.accumulator.len(),
            error
        );
        self.accumulator.clear();
        self.session.mark_for_recheck();
        StreamEvent::Failed(error)
    }
}

/// The reply to one [`ChatSession::submit`]
///
/// Lazy: nothing is sent until the stream is first polled. Not restartable;
/// after the terminal event it yields `None`.
pub struct ResponseStream<'a> {
    inner: BoxStream<'a, StreamEvent>,
}

impl<'a> ResponseStream<'a> {
    pub(super) fn new(session: &'a mut ChatSession, span: Span) -> Self {
        let consumer = Consumer {
            session,
            phase: Phase::Connecting,
            accumulator: String::new(),
        };

        let inner = stream::unfold(consumer, move |mut consumer| {
            let span = span.clone();
            async move {
                let event = consumer.step().instrument(span).await;
                event.map(|event| (event, consumer))
            }
        })
        .boxed();

        Self { inner }
    }

    /// Drains the stream and returns the finished turn
    pub async fn complete(mut self) -> Result<Turn, ChatError> {
        while let Some(event) = self.inner.next().await {
            match event {
                StreamEvent::Fragment(_) => {}
                StreamEvent::Completed(turn) => return Ok(turn),
                StreamEvent::Failed(e) => return Err(e),
            }
        }
        Err(ChatError::stream_failed("response stream already finished"))
    }
}

impl Stream for ResponseStream<'_> {
    type Item = StreamEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.poll_next_unpin(cx)
    }
}
