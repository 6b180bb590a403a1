//! The per-run push channel: newline-delimited JSON over a long-lived
//! streaming HTTP response. Inbound only; the client never sends anything
//! back on it.

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::StreamExt;
use tracing::debug;

use crate::error::{ApiError, Result};
use crate::traits::{ProgressFeed, PushSubscription};
use crate::types::PushMessage;

/// Opens one NDJSON event stream per active run.
///
/// Uses a dedicated `reqwest::Client` without a request timeout: the events
/// response stays open for the lifetime of the run.
pub struct HttpProgressFeed {
    client: reqwest::Client,
    base_url: String,
}

impl HttpProgressFeed {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl ProgressFeed for HttpProgressFeed {
    async fn subscribe(&self, run_id: &str) -> Result<Box<dyn PushSubscription>> {
        let url = format!("{}/simulations/{}/events", self.base_url, run_id);
        let resp = self.client.get(&url).send().await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(ApiError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let stream = resp
            .bytes_stream()
            .map(|chunk| chunk.map_err(ApiError::from))
            .boxed();
        Ok(Box::new(NdjsonSubscription::new(stream)))
    }
}

/// Splits a byte stream into lines and decodes each as a [`PushMessage`].
///
/// Malformed lines are dropped without closing the channel; a transport
/// error or end of stream ends the subscription for good.
pub(crate) struct NdjsonSubscription {
    stream: BoxStream<'static, Result<Bytes>>,
    buffer: Vec<u8>,
    closed: bool,
}

impl NdjsonSubscription {
    pub(crate) fn new(stream: BoxStream<'static, Result<Bytes>>) -> Self {
        Self {
            stream,
            buffer: Vec::new(),
            closed: false,
        }
    }
}

#[async_trait]
impl PushSubscription for NdjsonSubscription {
    async fn next(&mut self) -> Option<PushMessage> {
        loop {
            // Drain complete lines already buffered before reading more.
            if let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = self.buffer.drain(..=pos).collect();
                let line = &line[..line.len() - 1];
                if line.is_empty() {
                    continue;
                }
                match serde_json::from_slice::<PushMessage>(line) {
                    Ok(msg) => return Some(msg),
                    Err(e) => {
                        debug!(error = %e, "Dropping undecodable push payload");
                        continue;
                    }
                }
            }

            if self.closed {
                return None;
            }

            match self.stream.next().await {
                Some(Ok(chunk)) => self.buffer.extend_from_slice(&chunk),
                Some(Err(e)) => {
                    // Connection is gone; flush whatever trailing line exists.
                    debug!(error = %e, "Push channel transport error");
                    self.closed = true;
                    if !self.buffer.is_empty() && !self.buffer.ends_with(b"\n") {
                        self.buffer.push(b'\n');
                    }
                }
                None => {
                    self.closed = true;
                    if !self.buffer.is_empty() && !self.buffer.ends_with(b"\n") {
                        self.buffer.push(b'\n');
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    fn subscription(chunks: Vec<&'static str>) -> NdjsonSubscription {
        let items: Vec<Result<Bytes>> = chunks
            .into_iter()
            .map(|c| Ok(Bytes::from_static(c.as_bytes())))
            .collect();
        NdjsonSubscription::new(stream::iter(items).boxed())
    }

    #[tokio::test]
    async fn yields_messages_in_arrival_order() {
        let mut sub = subscription(vec![
            "{\"progress\": 0.1}\n{\"progress\": 0.2}\n",
            "{\"progress\": 0.3}\n",
        ]);

        assert_eq!(sub.next().await.unwrap().progress, Some(0.1));
        assert_eq!(sub.next().await.unwrap().progress, Some(0.2));
        assert_eq!(sub.next().await.unwrap().progress, Some(0.3));
        assert!(sub.next().await.is_none());
    }

    #[tokio::test]
    async fn reassembles_lines_split_across_chunks() {
        let mut sub = subscription(vec!["{\"progress\"", ": 0.5, \"current_step\": 130}", "\n"]);

        let msg = sub.next().await.unwrap();
        assert_eq!(msg.progress, Some(0.5));
        assert_eq!(msg.current_step, Some(130));
        assert!(sub.next().await.is_none());
    }

    #[tokio::test]
    async fn drops_malformed_lines_without_closing() {
        let mut sub = subscription(vec!["not json\n\n{\"progress\": 0.9}\n"]);

        assert_eq!(sub.next().await.unwrap().progress, Some(0.9));
        assert!(sub.next().await.is_none());
    }

    #[tokio::test]
    async fn flushes_trailing_line_when_the_stream_ends() {
        let mut sub = subscription(vec!["{\"progress\": 1.0, \"status\": \"completed\"}"]);

        let msg = sub.next().await.unwrap();
        assert_eq!(msg.progress, Some(1.0));
        assert!(sub.next().await.is_none());
        // Closed stays closed.
        assert!(sub.next().await.is_none());
    }
}
