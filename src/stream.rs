//! Caller-facing streaming types.
//!
//! The orchestrator is the only producer of a [`ChatStream`]: it pushes
//! [`StreamChunk`]s into a bounded channel and the caller drains it. Dropping
//! the stream closes the channel, which stops the producer at its next send.

use futures::stream::{self, Stream, StreamExt};
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::mpsc;

use crate::client::DeltaStream;
pub use crate::model::StreamChunk;

pub const CHANNEL_CAPACITY: usize = 32;

/// Ordered reply chunks, ending with exactly one completion chunk.
#[derive(Debug)]
pub struct ChatStream {
    receiver: mpsc::Receiver<StreamChunk>,
}

impl ChatStream {
    /// Commit to a vendor stream whose first delta has already been read.
    ///
    /// Spawns the producer task. Errors after the first delta end the stream
    /// early; they are logged and never reach the caller.
    pub(crate) fn spawn(model_used: String, first: String, mut deltas: DeltaStream) -> Self {
        let (sender, receiver) = mpsc::channel(CHANNEL_CAPACITY);

        tokio::spawn(async move {
            if sender
                .send(StreamChunk::delta(&model_used, first))
                .await
                .is_err()
            {
                return;
            }

            while let Some(item) = deltas.next().await {
                match item {
                    Ok(delta) if delta.is_empty() => continue,
                    Ok(delta) => {
                        if sender.send(StreamChunk::delta(&model_used, delta)).await.is_err() {
                            tracing::debug!(model = %model_used, "stream consumer went away");
                            return;
                        }
                    }
                    Err(e) => {
                        tracing::warn!(model = %model_used, error = %e, "vendor stream failed after first chunk");
                        break;
                    }
                }
            }

            let _ = sender.send(StreamChunk::complete(model_used)).await;
        });

        Self { receiver }
    }

    /// A stream that only carries the completion chunk.
    pub(crate) fn empty(model_used: String) -> Self {
        let (sender, receiver) = mpsc::channel(1);
        // Capacity is 1 and the channel is fresh, so this cannot fail.
        let _ = sender.try_send(StreamChunk::complete(model_used));
        Self { receiver }
    }
}

impl Stream for ChatStream {
    type Item = StreamChunk;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

/// Replay a finished reply word by word with a fixed pause between words.
/// Whitespace is kept, so the deltas concatenate back to `text`.
pub fn pseudo_stream(text: String, delay: Duration) -> DeltaStream {
    let words: Vec<String> = text
        .split_inclusive(char::is_whitespace)
        .map(str::to_string)
        .collect();

    stream::iter(words.into_iter().enumerate())
        .then(move |(i, word)| async move {
            if i > 0 && !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            Ok(word)
        })
        .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ClientError;
    use futures::TryStreamExt;

    #[tokio::test]
    async fn test_pseudo_stream_is_lossless() {
        let text = "Hello  wide\nworld!".to_string();
        let words: Vec<String> = pseudo_stream(text.clone(), Duration::ZERO)
            .try_collect()
            .await
            .unwrap();
        assert_eq!(words, vec!["Hello ", " ", "wide\n", "world!"]);
        assert_eq!(words.concat(), text);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pseudo_stream_waits_between_words() {
        let start = tokio::time::Instant::now();
        let count = pseudo_stream("a b c".to_string(), Duration::from_millis(20))
            .count()
            .await;
        assert_eq!(count, 3);
        assert!(start.elapsed() >= Duration::from_millis(40));
    }

    #[tokio::test]
    async fn test_spawned_stream_ends_with_one_completion() {
        let rest = stream::iter(vec![Ok("b".to_string()), Ok(String::new()), Ok("c".to_string())]).boxed();
        let chunks: Vec<StreamChunk> = ChatStream::spawn("m".into(), "a".into(), rest).collect().await;

        assert_eq!(
            chunks,
            vec![
                StreamChunk::delta("m", "a"),
                StreamChunk::delta("m", "b"),
                StreamChunk::delta("m", "c"),
                StreamChunk::complete("m"),
            ]
        );
    }

    #[tokio::test]
    async fn test_mid_stream_error_still_completes() {
        let rest = stream::iter(vec![
            Ok("b".to_string()),
            Err(ClientError::Stream("reset".into())),
            Ok("never".to_string()),
        ])
        .boxed();
        let chunks: Vec<StreamChunk> = ChatStream::spawn("m".into(), "a".into(), rest).collect().await;

        assert_eq!(chunks.len(), 3);
        assert!(chunks[2].is_complete && chunks[2].content_delta.is_empty());
        assert_eq!(chunks.iter().filter(|c| c.is_complete).count(), 1);
    }
}
