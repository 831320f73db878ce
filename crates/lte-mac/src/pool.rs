use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, unbounded, Receiver, Sender};

use crate::registry::UeRegistry;
use crate::ue::UeContext;

/// Fixed-capacity pool of pre-constructed session records. Acquisition is
/// non-blocking and never allocates; construction happens at startup and on a
/// background refill thread, off the real-time path.
pub struct UePool {
    free_rx: Receiver<UeContext>,
    refill_tx: Option<Sender<usize>>,
    worker: Option<JoinHandle<()>>,
}

impl UePool {
    /// Builds `prealloc` records synchronously before returning, then keeps a
    /// refill thread alive for the lifetime of the pool. The registry is only
    /// used for identifier allocation here.
    pub fn new(registry: Arc<UeRegistry>, cell_prbs: Vec<usize>, pool_size: usize, prealloc: usize) -> Self {
        let (free_tx, free_rx) = bounded::<UeContext>(pool_size);
        let (refill_tx, refill_rx) = unbounded::<usize>();

        for _ in 0..prealloc.min(pool_size) {
            let rnti = registry.allocate_rnti();
            free_tx
                .try_send(UeContext::new(rnti, &cell_prbs))
                .expect("prealloc exceeds pool capacity");
        }
        tracing::info!("UePool: preallocated {} of {} session records", prealloc.min(pool_size), pool_size);

        let worker = thread::Builder::new()
            .name("ue-pool-refill".into())
            .spawn(move || {
                while let Ok(n) = refill_rx.recv() {
                    for _ in 0..n {
                        let rnti = registry.allocate_rnti();
                        let ue = UeContext::new(rnti, &cell_prbs);
                        if free_tx.try_send(ue).is_err() {
                            tracing::info!("UePool: pool full, skipping refill");
                            break;
                        }
                        tracing::debug!("UePool: refilled one record (rnti=0x{:x})", rnti);
                    }
                }
                tracing::debug!("UePool: refill thread exiting");
            })
            .expect("failed to spawn ue-pool-refill thread");

        UePool {
            free_rx,
            refill_tx: Some(refill_tx),
            worker: Some(worker),
        }
    }

    /// Pop a pre-built record. Never blocks; None means the pool is drained
    /// and the triggering event must be ignored.
    pub fn try_acquire(&self) -> Option<UeContext> {
        self.free_rx.try_recv().ok()
    }

    /// Ask the background thread to construct `n` replacement records
    pub fn request_refill(&self, n: usize) {
        if let Some(tx) = &self.refill_tx {
            let _ = tx.send(n);
        }
    }

    pub fn nof_pooled(&self) -> usize {
        self.free_rx.len()
    }
}

impl Drop for UePool {
    fn drop(&mut self) {
        // Close the request channel so the refill thread unblocks and exits
        self.refill_tx.take();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}
