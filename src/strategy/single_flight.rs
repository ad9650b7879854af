//! Per-key load coalescing.
//!
//! Concurrent callers for the same key share one in-flight computation; the
//! first to arrive runs it, the rest wait for its outcome. Entries are
//! removed as soon as the flight lands, so later misses start a new flight.

use std::future::Future;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::OnceCell;

use crate::error::Result;

/// Outcome shared with every caller of one flight.
#[derive(Debug, Clone)]
pub struct Flight {
    /// Encoded value
    pub bytes: Vec<u8>,
    /// True when the flight found the entry already cached
    pub from_cache: bool,
}

type Slot = Arc<OnceCell<Result<Flight>>>;

#[derive(Debug, Default)]
pub struct SingleFlight {
    flights: DashMap<String, Slot>,
}

impl SingleFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `work` unless a flight for `key` is already airborne, in which
    /// case `work` is dropped unpolled and that flight's outcome is returned.
    pub async fn run<Fut>(&self, key: &str, work: Fut) -> Result<Flight>
    where
        Fut: Future<Output = Result<Flight>>,
    {
        let slot = self
            .flights
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone();

        let outcome = slot.get_or_init(|| work).await.clone();

        self.flights
            .remove_if(key, |_, current| Arc::ptr_eq(current, &slot));
        outcome
    }

    /// Number of keys with a flight in progress.
    pub fn in_flight(&self) -> usize {
        self.flights.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CacheError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_concurrent_calls_share_one_execution() {
        let flights = Arc::new(SingleFlight::new());
        let runs = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let flights = flights.clone();
            let runs = runs.clone();
            handles.push(tokio::spawn(async move {
                flights
                    .run("k", async move {
                        runs.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Ok(Flight {
                            bytes: b"v".to_vec(),
                            from_cache: false,
                        })
                    })
                    .await
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap().bytes, b"v".to_vec());
        }
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(flights.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_errors_are_shared_and_not_cached() {
        let flights = SingleFlight::new();

        let first = flights
            .run("k", async { Err(CacheError::loader(anyhow::anyhow!("boom"))) })
            .await;
        assert!(matches!(first, Err(CacheError::LoaderFailure(_))));

        let second = flights
            .run("k", async {
                Ok(Flight {
                    bytes: b"ok".to_vec(),
                    from_cache: false,
                })
            })
            .await;
        assert_eq!(second.unwrap().bytes, b"ok".to_vec());
    }
}
