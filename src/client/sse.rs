//! Server-sent event decoding for the streamed completion body.

use futures::stream::{Stream, StreamExt};

use crate::core::error::GptError;

const DATA_PREFIX: &str = "data: ";
const DONE_SENTINEL: &str = "data: [DONE]";

struct DecodeState {
    buffer: String,
    done: bool,
}

/// Decode a byte-chunk stream into the JSON payloads of its `data:` lines.
///
/// Chunks do not align with line boundaries, so lines are reassembled through
/// an internal buffer. `data: [DONE]` ends the sequence; blank keep-alive
/// lines and comments are skipped. A source that ends without the sentinel
/// ends the sequence normally.
pub fn decode_sse<S, E>(source: S) -> impl Stream<Item = Result<String, GptError>>
where
    S: Stream<Item = Result<Vec<u8>, E>>,
    GptError: From<E>,
{
    source
        .scan(
            DecodeState {
                buffer: String::new(),
                done: false,
            },
            |state, item| {
                if state.done {
                    return futures::future::ready(None);
                }
                let chunk = match item {
                    Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
                    Err(err) => {
                        state.done = true;
                        return futures::future::ready(Some(vec![Err(GptError::from(err))]));
                    }
                };
                state.buffer.push_str(&chunk);

                let mut payloads = Vec::new();
                while let Some(line_end) = state.buffer.find('\n') {
                    let line: String = state.buffer.drain(..=line_end).collect();
                    let line = line.trim();
                    if line == DONE_SENTINEL {
                        state.done = true;
                        break;
                    }
                    if let Some(payload) = line.strip_prefix(DATA_PREFIX) {
                        payloads.push(Ok(payload.to_string()));
                    }
                }
                futures::future::ready(Some(payloads))
            },
        )
        .map(futures::stream::iter)
        .flatten()
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    fn chunks(parts: &[&str]) -> impl Stream<Item = Result<Vec<u8>, GptError>> {
        let owned: Vec<Result<Vec<u8>, GptError>> = parts
            .iter()
            .map(|part| Ok(part.as_bytes().to_vec()))
            .collect();
        stream::iter(owned)
    }

    async fn collect(parts: &[&str]) -> Vec<String> {
        decode_sse(chunks(parts))
            .map(|payload| payload.unwrap())
            .collect()
            .await
    }

    #[tokio::test]
    async fn yields_payloads_until_sentinel() {
        let payloads = collect(&[
            "data: {\"a\": 1}\n",
            "data: {\"b\": 2}\n",
            "data: [DONE]\n",
            "\n",
        ])
        .await;
        assert_eq!(payloads, vec!["{\"a\": 1}", "{\"b\": 2}"]);
    }

    #[tokio::test]
    async fn nothing_after_sentinel_in_same_chunk() {
        let payloads = collect(&["data: {\"a\": 1}\ndata: [DONE]\ndata: {\"b\": 2}\n"]).await;
        assert_eq!(payloads, vec!["{\"a\": 1}"]);
    }

    #[tokio::test]
    async fn reassembles_lines_across_chunk_boundaries() {
        let payloads = collect(&["data: {\"a\"", ": 1}\nda", "ta: {\"b\": 2}\n"]).await;
        assert_eq!(payloads, vec!["{\"a\": 1}", "{\"b\": 2}"]);
    }

    #[tokio::test]
    async fn skips_blank_and_comment_lines() {
        let payloads = collect(&["\n", ": keep-alive\n", "data: {\"a\": 1}\n", "\n"]).await;
        assert_eq!(payloads, vec!["{\"a\": 1}"]);
    }

    #[tokio::test]
    async fn source_end_without_sentinel_is_a_normal_end() {
        let payloads = collect(&["data: {\"a\": 1}\n", "data: {\"b\": 2}\n"]).await;
        assert_eq!(payloads, vec!["{\"a\": 1}", "{\"b\": 2}"]);
    }

    #[tokio::test]
    async fn source_errors_propagate() {
        let source = stream::iter(vec![
            Ok("data: {\"a\": 1}\n".as_bytes().to_vec()),
            Err(GptError::Network("connection reset".to_string())),
        ]);
        let items: Vec<Result<String, GptError>> = decode_sse(source).collect().await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_deref().unwrap(), "{\"a\": 1}");
        assert!(matches!(items[1], Err(GptError::Network(_))));
    }
}
