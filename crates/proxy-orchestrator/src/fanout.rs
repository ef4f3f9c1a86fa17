use std::time::Duration;

use futures_util::StreamExt;
use proxy_providers::DeltaStream;
use tokio::sync::mpsc;

const KEEPALIVE_TIMEOUT: Duration = Duration::from_secs(15);

/// One unit of progress from `fan_out` — every upstream delta broken into
/// characters (§4.7 step 8), a keepalive when the 15s window lapses
/// without a frame, or the terminal outcome.
pub enum FanOutItem {
    Delta(char),
    Done(String),
    Error(String),
    Keepalive,
}

/// Aborts the producer task when the consumer is dropped — the safe
/// equivalent of a cancellation-token guard (§4.7 step 10), reached with a
/// plain `JoinHandle` rather than pulling in `tokio-util` for one token.
struct AbortOnDrop(tokio::task::JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// §4.7 steps 8-10 and §5's producer/consumer fan-out, shared by the
/// conversation-bound stream (`stream::run_stream`, which persists the
/// result) and the stateless one-shot completions endpoint (which doesn't).
/// A dedicated task drains `upstream` into an unbounded channel; this
/// stream consumes it with a 15s per-item timeout.
pub fn fan_out(upstream: DeltaStream) -> impl futures_util::Stream<Item = FanOutItem> {
    async_stream::stream! {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let producer = tokio::spawn(async move {
            let mut upstream = upstream;
            while let Some(item) = upstream.next().await {
                if tx.send(item).is_err() {
                    return;
                }
            }
        });
        let _guard = AbortOnDrop(producer);

        let mut collected = String::new();
        loop {
            match tokio::time::timeout(KEEPALIVE_TIMEOUT, rx.recv()).await {
                Ok(Some(Ok(text))) => {
                    for ch in text.chars() {
                        collected.push(ch);
                        yield FanOutItem::Delta(ch);
                    }
                }
                Ok(Some(Err(e))) => {
                    yield FanOutItem::Error(proxy_core::ProxyError::from(e).to_string());
                    return;
                }
                Ok(None) => break,
                Err(_) => yield FanOutItem::Keepalive,
            }
        }
        yield FanOutItem::Done(collected);
    }
}
