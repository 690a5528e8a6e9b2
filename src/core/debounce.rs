//! Last-write-wins debouncing.

use std::time::Duration;

use tokio::sync::mpsc;

/// Sending half of a debouncer.
///
/// Values pushed in quick succession collapse into the last one, which is
/// emitted once no new value has arrived for the configured delay.
#[derive(Debug, Clone)]
pub struct Debouncer<T> {
    tx: mpsc::UnboundedSender<T>,
}

impl<T: Send + 'static> Debouncer<T> {
    /// Spawn a debouncer on the current runtime.
    #[must_use]
    pub fn spawn(delay: Duration) -> (Self, mpsc::UnboundedReceiver<T>) {
        let (tx, mut rx) = mpsc::unbounded_channel::<T>();
        let (out_tx, out_rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            while let Some(mut latest) = rx.recv().await {
                loop {
                    tokio::select! {
                        next = rx.recv() => match next {
                            Some(value) => latest = value,
                            None => {
                                let _ = out_tx.send(latest);
                                return;
                            }
                        },
                        () = tokio::time::sleep(delay) => break,
                    }
                }
                if out_tx.send(latest).is_err() {
                    return;
                }
            }
        });

        (Self { tx }, out_rx)
    }

    /// Push a new value, superseding any pending one.
    pub fn push(&self, value: T) {
        if self.tx.send(value).is_err() {
            tracing::debug!("debouncer task has stopped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn emits_only_last_value() {
        let (debouncer, mut rx) = Debouncer::spawn(Duration::from_millis(300));
        debouncer.push("r");
        debouncer.push("ru");
        tokio::time::sleep(Duration::from_millis(100)).await;
        debouncer.push("rust");

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(rx.try_recv().ok(), Some("rust"));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn holds_value_until_quiet() {
        let (debouncer, mut rx) = Debouncer::spawn(Duration::from_millis(200));
        debouncer.push("a");
        tokio::time::sleep(Duration::from_millis(100)).await;

        let mut recv = tokio_test::task::spawn(rx.recv());
        tokio_test::assert_pending!(recv.poll());
        drop(recv);

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(rx.try_recv().ok(), Some("a"));
    }

    #[tokio::test(start_paused = true)]
    async fn separate_bursts_emit_separately() {
        let (debouncer, mut rx) = Debouncer::spawn(Duration::from_millis(50));
        debouncer.push(1);
        tokio::time::sleep(Duration::from_millis(100)).await;
        debouncer.push(2);
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(rx.recv().await, Some(1));
        assert_eq!(rx.recv().await, Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn flushes_pending_value_on_drop() {
        let (debouncer, mut rx) = Debouncer::spawn(Duration::from_secs(10));
        debouncer.push("last");
        drop(debouncer);
        assert_eq!(rx.recv().await, Some("last"));
        assert_eq!(rx.recv().await, None);
    }
}
