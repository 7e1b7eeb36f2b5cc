//! Keyword debouncing for interactive searches.
//!
//! Values pushed into a [`DebounceInput`] are forwarded only after the input
//! has been quiet for the window; intermediate values are dropped. Closing the
//! input flushes the value still waiting.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::sleep;

pub struct DebounceInput<T> {
    tx: mpsc::UnboundedSender<T>,
}

impl<T> DebounceInput<T> {
    /// Returns false once the debounce task is gone.
    pub fn push(&self, value: T) -> bool {
        self.tx.send(value).is_ok()
    }
}

pub fn debounce<T: Send + 'static>(window: Duration) -> (DebounceInput<T>, mpsc::Receiver<T>) {
    let (in_tx, mut in_rx) = mpsc::unbounded_channel::<T>();
    let (out_tx, out_rx) = mpsc::channel::<T>(8);

    tokio::spawn(async move {
        while let Some(first) = in_rx.recv().await {
            let mut latest = first;
            loop {
                tokio::select! {
                    next = in_rx.recv() => match next {
                        Some(value) => latest = value,
                        None => {
                            let _ = out_tx.send(latest).await;
                            return;
                        }
                    },
                    _ = sleep(window) => {
                        if out_tx.send(latest).await.is_err() {
                            return;
                        }
                        break;
                    }
                }
            }
        }
    });

    (DebounceInput { tx: in_tx }, out_rx)
}
