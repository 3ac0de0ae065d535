//! Keyed debouncing for bursty event sources.
//!
//! Audit view events fire on every focus change; only the last event per
//! resource within the quiet window should be delivered. Entries are keyed
//! by a composite id and the final payload is never lost: dropping the
//! debouncer flushes everything still pending.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;

struct Pending<T> {
    payload: T,
    generation: u64,
}

/// Debounces payloads per key, emitting the most recent payload for a key
/// once the key has been quiet for the configured delay.
pub struct KeyedDebouncer<T> {
    delay: Duration,
    pending: Arc<Mutex<HashMap<String, Pending<T>>>>,
    tx: mpsc::UnboundedSender<T>,
    next_generation: Mutex<u64>,
}

impl<T: Clone + Send + 'static> KeyedDebouncer<T> {
    pub fn new(delay: Duration) -> (Self, mpsc::UnboundedReceiver<T>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                delay,
                pending: Arc::new(Mutex::new(HashMap::new())),
                tx,
                next_generation: Mutex::new(0),
            },
            rx,
        )
    }

    /// Schedule `payload` under `key`, superseding any payload already
    /// pending for that key and restarting its quiet window.
    pub fn schedule(&self, key: impl Into<String>, payload: T) {
        let key = key.into();
        let generation = {
            let mut counter = self.next_generation.lock().expect("generation lock");
            *counter += 1;
            *counter
        };

        {
            let mut pending = self.pending.lock().expect("pending lock");
            pending.insert(
                key.clone(),
                Pending {
                    payload,
                    generation,
                },
            );
        }

        let pending = Arc::clone(&self.pending);
        let tx = self.tx.clone();
        let delay = self.delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let fired = {
                let mut pending = pending.lock().expect("pending lock");
                match pending.get(&key) {
                    // A later schedule() superseded this timer; let its task fire.
                    Some(entry) if entry.generation != generation => None,
                    Some(_) => pending.remove(&key).map(|entry| entry.payload),
                    None => None,
                }
            };
            if let Some(payload) = fired {
                let _ = tx.send(payload);
            }
        });
    }

    /// Emit every pending payload immediately, cancelling their timers.
    pub fn flush(&self) {
        let drained: Vec<T> = {
            let mut pending = self.pending.lock().expect("pending lock");
            pending.drain().map(|(_, entry)| entry.payload).collect()
        };
        for payload in drained {
            let _ = self.tx.send(payload);
        }
    }

    pub fn pending_len(&self) -> usize {
        self.pending.lock().expect("pending lock").len()
    }
}

impl<T> Drop for KeyedDebouncer<T> {
    fn drop(&mut self) {
        // Flush without requiring T: Clone in the Drop bound.
        let drained: Vec<T> = {
            let mut pending = self.pending.lock().expect("pending lock");
            pending.drain().map(|(_, entry)| entry.payload).collect()
        };
        for payload in drained {
            let _ = self.tx.send(payload);
        }
    }
}
