//! Progress reporting
//!
//! Workers publish [`Event`]s through a [`ProgressSink`] backed by a broadcast
//! channel. Sending never blocks: with no subscriber the event is dropped, and a
//! subscriber that falls behind skips the events it missed. Progress therefore has
//! no influence on the pipelines themselves.

use crate::types::Event;
use std::io::Write;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// Default number of buffered events per subscriber
pub const DEFAULT_CAPACITY: usize = 256;

const SPINNER_FRAMES: [&str; 10] = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];
const SPINNER_INTERVAL: Duration = Duration::from_millis(80);

/// Fire-and-forget publisher of progress events (cheap to clone)
#[derive(Clone, Debug)]
pub struct ProgressSink {
    tx: broadcast::Sender<Event>,
}

impl Default for ProgressSink {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl ProgressSink {
    /// Create a sink buffering up to `capacity` events per subscriber
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Subscribe to events published after this call
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    /// Publish an event without waiting for any consumer
    pub fn emit(&self, event: Event) {
        // Err only means nobody is listening
        self.tx.send(event).ok();
    }
}

/// Renders progress events as a single spinner status line on stderr
pub struct ConsoleReporter;

impl ConsoleReporter {
    /// Spawn the renderer; it exits once every sink clone is dropped
    pub fn spawn(mut rx: broadcast::Receiver<Event>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut message = String::new();
            let mut frame = 0usize;
            let mut ticker = tokio::time::interval(SPINNER_INTERVAL);

            loop {
                tokio::select! {
                    received = rx.recv() => match received {
                        Ok(event) => message = event.status_line(),
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::trace!(skipped, "progress renderer lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                    _ = ticker.tick() => {
                        let spinner = SPINNER_FRAMES[frame % SPINNER_FRAMES.len()];
                        frame = frame.wrapping_add(1);
                        render(&format!("\r\x1b[2K\x1b[36m{spinner}\x1b[0m {message}"));
                    }
                }
            }

            if message.is_empty() {
                render("\r\x1b[2K");
            } else {
                render(&format!("\r\x1b[2K{message}\n"));
            }
        })
    }
}

fn render(line: &str) {
    let mut stderr = std::io::stderr().lock();
    stderr.write_all(line.as_bytes()).ok();
    stderr.flush().ok();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PipelineOutcome;

    fn finished(completed: usize) -> Event {
        Event::ItemFinished {
            id: format!("item-{completed}"),
            outcome: PipelineOutcome::Succeeded,
            completed,
            total: 10,
        }
    }

    #[test]
    fn test_emit_without_subscribers_does_not_fail() {
        let sink = ProgressSink::new(4);
        for i in 0..100 {
            sink.emit(finished(i));
        }
    }

    #[tokio::test]
    async fn test_slow_subscriber_drops_instead_of_blocking() {
        let sink = ProgressSink::new(2);
        let mut rx = sink.subscribe();

        // More events than capacity; emit must return immediately every time
        for i in 1..=5 {
            sink.emit(finished(i));
        }

        match rx.recv().await {
            Err(broadcast::error::RecvError::Lagged(skipped)) => assert_eq!(skipped, 3),
            other => panic!("expected lag, got {:?}", other),
        }
        match rx.recv().await.unwrap() {
            Event::ItemFinished { completed, .. } => assert_eq!(completed, 4),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_console_reporter_exits_when_sink_dropped() {
        let sink = ProgressSink::new(8);
        let handle = ConsoleReporter::spawn(sink.subscribe());
        sink.emit(finished(1));
        drop(sink);

        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
