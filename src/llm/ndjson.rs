//! Newline-delimited JSON decoding
//!
//! Ollama streams `/api/chat` and `/api/pull` as one JSON object per line.
//! Lines may be split across network chunks, and the final line may lack its
//! trailing newline.

use super::error::ChatError;
use bytes::Bytes;
use futures_util::stream::{self, BoxStream, Stream, StreamExt};
use serde::de::DeserializeOwned;

/// Decodes a byte stream into JSON objects, one per line
///
/// A malformed line or transport error ends the stream with an error item.
pub fn decode_lines<S, E, T>(body: S) -> BoxStream<'static, Result<T, ChatError>>
where
    S: Stream<Item = Result<Bytes, E>> + Send + Unpin + 'static,
    E: std::fmt::Display,
    T: DeserializeOwned + Send + 'static,
{
    stream::try_unfold(
        (body, Vec::<u8>::new(), false),
        |(mut body, mut buf, mut eof)| async move {
            loop {
                if let Some(line_end) = buf.iter().position(|&b| b == b'\n') {
                    let line: Vec<u8> = buf.drain(..=line_end).collect();
                    match parse_line::<T>(&line) {
                        Ok(Some(item)) => return Ok(Some((item, (body, buf, eof)))),
                        Ok(None) => continue,
                        Err(e) => return Err(e),
                    }
                }

                if eof {
                    if buf.is_empty() {
                        return Ok(None);
                    }
                    let rest = std::mem::take(&mut buf);
                    return match parse_line::<T>(&rest) {
                        Ok(Some(item)) => Ok(Some((item, (body, buf, eof)))),
                        Ok(None) => Ok(None),
                        Err(e) => Err(e),
                    };
                }

                match body.next().await {
                    Some(Ok(chunk)) => buf.extend_from_slice(&chunk),
                    Some(Err(e)) => {
                        return Err(ChatError::stream_failed(format!(
                            "connection dropped: {}",
                            e
                        )))
                    }
                    None => eof = true,
                }
            }
        },
    )
    .boxed()
}

fn parse_line<T: DeserializeOwned>(line: &[u8]) -> Result<Option<T>, ChatError> {
    let text = String::from_utf8_lossy(line);
    let text = text.trim();
    if text.is_empty() {
        return Ok(None);
    }
    serde_json::from_str::<T>(text).map(Some).map_err(|e| {
        ChatError::stream_failed(format!(
            "malformed response line ({}): {}",
            e,
            text.chars().take(200).collect::<String>()
        ))
    })
}
