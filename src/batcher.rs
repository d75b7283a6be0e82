//! Batches BLE advertisements for the `BluetoothLERawAdvertisementsResponse`
//! wire message.
//!
//! Grounded on `advertisement_batcher.py`'s `AdvertisementBatcher`, with
//! its coroutine-driven timer re-expressed as an explicit single flush
//! timer (`tokio::time::Sleep`) per the re-architecture note on
//! coroutine-driven timers: one timer per batcher, reset on every
//! flush, never a new task per advertisement.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::proto::messages::BluetoothLEAdvertisementResponse;

/// Optimal batch size for the underlying WiFi MTU.
pub const FLUSH_BATCH_SIZE: usize = 16;
/// Maximum time to hold a partial batch before flushing it anyway.
pub const FLUSH_TIMEOUT: Duration = Duration::from_millis(100);

/// A single flushed batch, always non-empty and never longer than
/// [`FLUSH_BATCH_SIZE`].
pub type Batch = Vec<BluetoothLEAdvertisementResponse>;

/// Pure batching state machine: holds the pending advertisements and
/// decides when they're ready to flush. Owns no timer and spawns
/// nothing, so it can be driven directly in tests.
pub struct Batcher {
    pending: Vec<BluetoothLEAdvertisementResponse>,
    /// Retired batches kept around for reuse, bounded to avoid
    /// unbounded growth (mirrors the source's advertisement pool).
    pool: Vec<BluetoothLEAdvertisementResponse>,
}

impl Default for Batcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Batcher {
    pub fn new() -> Self {
        Self {
            pending: Vec::with_capacity(FLUSH_BATCH_SIZE),
            pool: Vec::new(),
        }
    }

    /// Append one advertisement. Returns `Some(batch)` if the batch is
    /// now full and must be flushed immediately; the caller is
    /// responsible for resetting its timer either way.
    pub fn add(&mut self, advertisement: BluetoothLEAdvertisementResponse) -> Option<Batch> {
        self.pending.push(advertisement);
        if self.pending.len() >= FLUSH_BATCH_SIZE {
            Some(self.take())
        } else {
            None
        }
    }

    /// Flush whatever is pending, regardless of size. Returns `None`
    /// if there was nothing to flush.
    pub fn force_flush(&mut self) -> Option<Batch> {
        if self.pending.is_empty() {
            None
        } else {
            Some(self.take())
        }
    }

    /// Drop the pending batch without emitting it.
    pub fn clear(&mut self) {
        self.pending.clear();
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    fn take(&mut self) -> Batch {
        let batch = std::mem::replace(&mut self.pending, Vec::with_capacity(FLUSH_BATCH_SIZE));
        self.pool.extend(batch.iter().cloned());
        if self.pool.len() > FLUSH_BATCH_SIZE * 2 {
            let excess = self.pool.len() - FLUSH_BATCH_SIZE;
            self.pool.drain(0..excess);
        }
        batch
    }
}

/// Drives a [`Batcher`] against an advertisement channel, flushing on
/// size or on timeout, whichever comes first. One instance per
/// subscriber-facing advertisement stream; run with
/// [`BatcherTask::run`] inside a dedicated task.
pub struct BatcherTask {
    batcher: Batcher,
    advertisements: mpsc::Receiver<BluetoothLEAdvertisementResponse>,
    batches: mpsc::Sender<Batch>,
    flush: mpsc::Receiver<()>,
}

impl BatcherTask {
    /// `flush` lets an owner outside the advertisement stream force an
    /// immediate flush (the coordinator does this once the last
    /// subscriber unsubscribes). A closed `flush` sender is fine; the
    /// task just stops selecting on it.
    pub fn new(
        advertisements: mpsc::Receiver<BluetoothLEAdvertisementResponse>,
        batches: mpsc::Sender<Batch>,
        flush: mpsc::Receiver<()>,
    ) -> Self {
        Self {
            batcher: Batcher::new(),
            advertisements,
            batches,
            flush,
        }
    }

    /// Run until the advertisement channel closes. Exits quietly if
    /// the batch receiver is dropped; a disconnected subscriber never
    /// blocks the coordinator.
    pub async fn run(mut self) {
        let mut flush_open = true;
        // Anchored to the last flush, not to the last event handled:
        // only a branch that actually flushes (or attempts to, on
        // timeout) moves this forward.
        let mut deadline = Instant::now() + FLUSH_TIMEOUT;
        loop {
            tokio::select! {
                maybe_adv = self.advertisements.recv() => {
                    match maybe_adv {
                        Some(adv) => {
                            if let Some(batch) = self.batcher.add(adv) {
                                if self.batches.send(batch).await.is_err() {
                                    return;
                                }
                                deadline = Instant::now() + FLUSH_TIMEOUT;
                            }
                        }
                        None => {
                            if let Some(batch) = self.batcher.force_flush() {
                                let _ = self.batches.send(batch).await;
                            }
                            return;
                        }
                    }
                }
                _ = tokio::time::sleep_until(deadline) => {
                    if let Some(batch) = self.batcher.force_flush() {
                        if self.batches.send(batch).await.is_err() {
                            return;
                        }
                    }
                    deadline = Instant::now() + FLUSH_TIMEOUT;
                }
                maybe_flush = self.flush.recv(), if flush_open => {
                    match maybe_flush {
                        Some(()) => {
                            if let Some(batch) = self.batcher.force_flush() {
                                if self.batches.send(batch).await.is_err() {
                                    return;
                                }
                            }
                            deadline = Instant::now() + FLUSH_TIMEOUT;
                        }
                        None => flush_open = false,
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn advertisement(address: u64) -> BluetoothLEAdvertisementResponse {
        BluetoothLEAdvertisementResponse {
            address,
            rssi: -60,
            address_type: 0,
            data: vec![1, 2, 3],
        }
    }

    #[test]
    fn flushes_exactly_at_batch_size() {
        let mut batcher = Batcher::new();
        for i in 0..FLUSH_BATCH_SIZE as u64 - 1 {
            assert!(batcher.add(advertisement(i)).is_none());
        }
        let batch = batcher.add(advertisement(999)).expect("batch should be full");
        assert_eq!(batch.len(), FLUSH_BATCH_SIZE);
        assert_eq!(batcher.pending_len(), 0);
    }

    #[test]
    fn preserves_arrival_order() {
        let mut batcher = Batcher::new();
        for i in 0..FLUSH_BATCH_SIZE as u64 {
            batcher.add(advertisement(i));
        }
        let batch = batcher.force_flush();
        assert!(batch.is_none(), "batch was already flushed at size limit");
    }

    #[test]
    fn force_flush_on_partial_batch_preserves_order() {
        let mut batcher = Batcher::new();
        batcher.add(advertisement(1));
        batcher.add(advertisement(2));
        batcher.add(advertisement(3));
        let batch = batcher.force_flush().unwrap();
        assert_eq!(
            batch.iter().map(|a| a.address).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
    }

    #[test]
    fn force_flush_on_empty_batch_is_none() {
        let mut batcher = Batcher::new();
        assert!(batcher.force_flush().is_none());
    }

    #[test]
    fn clear_drops_pending_without_emitting() {
        let mut batcher = Batcher::new();
        batcher.add(advertisement(1));
        batcher.clear();
        assert_eq!(batcher.pending_len(), 0);
        assert!(batcher.force_flush().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn task_flushes_on_timeout() {
        let (adv_tx, adv_rx) = mpsc::channel(32);
        let (batch_tx, mut batch_rx) = mpsc::channel(8);
        let (_flush_tx, flush_rx) = mpsc::channel(1);
        let task = BatcherTask::new(adv_rx, batch_tx, flush_rx);
        tokio::spawn(task.run());

        adv_tx.send(advertisement(1)).await.unwrap();
        adv_tx.send(advertisement(2)).await.unwrap();
        adv_tx.send(advertisement(3)).await.unwrap();

        tokio::time::advance(FLUSH_TIMEOUT + Duration::from_millis(5)).await;

        let batch = batch_rx.recv().await.unwrap();
        assert_eq!(batch.len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn task_flushes_on_size_without_waiting_for_timeout() {
        let (adv_tx, adv_rx) = mpsc::channel(32);
        let (batch_tx, mut batch_rx) = mpsc::channel(8);
        let (_flush_tx, flush_rx) = mpsc::channel(1);
        let task = BatcherTask::new(adv_rx, batch_tx, flush_rx);
        tokio::spawn(task.run());

        for i in 0..FLUSH_BATCH_SIZE as u64 {
            adv_tx.send(advertisement(i)).await.unwrap();
        }

        let batch = batch_rx.recv().await.unwrap();
        assert_eq!(batch.len(), FLUSH_BATCH_SIZE);
    }

    #[tokio::test(start_paused = true)]
    async fn external_flush_signal_forces_a_partial_batch_out() {
        let (adv_tx, adv_rx) = mpsc::channel(32);
        let (batch_tx, mut batch_rx) = mpsc::channel(8);
        let (flush_tx, flush_rx) = mpsc::channel(1);
        let task = BatcherTask::new(adv_rx, batch_tx, flush_rx);
        tokio::spawn(task.run());

        adv_tx.send(advertisement(1)).await.unwrap();
        adv_tx.send(advertisement(2)).await.unwrap();
        flush_tx.send(()).await.unwrap();

        let batch = batch_rx.recv().await.unwrap();
        assert_eq!(batch.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn trickle_below_batch_size_still_flushes_on_the_original_deadline() {
        let (adv_tx, adv_rx) = mpsc::channel(32);
        let (batch_tx, mut batch_rx) = mpsc::channel(8);
        let (_flush_tx, flush_rx) = mpsc::channel(1);
        let task = BatcherTask::new(adv_rx, batch_tx, flush_rx);
        tokio::spawn(task.run());

        // Each arrival is well inside the flush timeout, so no arrival
        // triggers a flush on its own; the deadline must still fire
        // relative to the last flush (here, task start), not reset by
        // these arrivals.
        for i in 0..5u64 {
            adv_tx.send(advertisement(i)).await.unwrap();
            tokio::time::advance(Duration::from_millis(10)).await;
        }
        tokio::time::advance(FLUSH_TIMEOUT).await;

        let batch = batch_rx.recv().await.unwrap();
        assert_eq!(batch.len(), 5);
    }
}
