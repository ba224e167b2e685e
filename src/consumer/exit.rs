//! Single-shot exit signal
//!
//! Any number of parties (write path, deadline timer, disconnect watch) may
//! race to end a session. The first [`ExitSender::send`] consumes the slot;
//! later sends return `false` and the value is dropped.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::error::Result;

/// Create a connected sender/receiver pair
pub fn exit_signal() -> (ExitSender, ExitReceiver) {
    let (tx, rx) = oneshot::channel();
    (
        ExitSender {
            slot: Arc::new(Mutex::new(Some(tx))),
        },
        ExitReceiver { rx },
    )
}

/// Cloneable, non-blocking sending half
#[derive(Clone)]
pub struct ExitSender {
    slot: Arc<Mutex<Option<oneshot::Sender<Result<()>>>>>,
}

impl ExitSender {
    /// Push the session outcome. Returns `true` only for the winning send.
    pub fn send(&self, result: Result<()>) -> bool {
        match self.slot.lock().take() {
            Some(tx) => tx.send(result).is_ok(),
            None => false,
        }
    }

    /// Whether a value has already been sent
    pub fn is_spent(&self) -> bool {
        self.slot.lock().is_none()
    }
}

impl std::fmt::Debug for ExitSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExitSender")
            .field("spent", &self.is_spent())
            .finish()
    }
}

/// Receiving half, awaited once by the session
#[derive(Debug)]
pub struct ExitReceiver {
    rx: oneshot::Receiver<Result<()>>,
}

impl ExitReceiver {
    /// Wait for the first outcome. If every sender is dropped without
    /// sending, the session ends cleanly.
    pub async fn wait(self) -> Result<()> {
        self.rx.await.unwrap_or(Ok(()))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::error::Error;

    #[tokio::test]
    async fn test_first_send_wins() {
        let (tx, rx) = exit_signal();
        assert!(tx.send(Err(Error::ClientWrite("broken pipe".into()))));
        assert!(!tx.send(Ok(())));
        assert!(tx.is_spent());

        assert!(matches!(rx.wait().await, Err(Error::ClientWrite(_))));
    }

    #[tokio::test]
    async fn test_dropped_senders_mean_clean_exit() {
        let (tx, rx) = exit_signal();
        drop(tx);
        assert!(rx.wait().await.is_ok());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_senders_deliver_one_value() {
        let (tx, rx) = exit_signal();
        let winners = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..32)
            .map(|i| {
                let tx = tx.clone();
                let winners = Arc::clone(&winners);
                tokio::spawn(async move {
                    let result = if i % 2 == 0 {
                        Ok(())
                    } else {
                        Err(Error::ClientWrite(format!("writer {}", i)))
                    };
                    if tx.send(result) {
                        winners.fetch_add(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(winners.load(Ordering::SeqCst), 1);
        let _ = rx.wait().await;
        assert!(tx.is_spent());
    }
}
