use std::sync::Arc;

use lte_config::{SharedConfig, StackConfig};
use lte_core::{Rnti, Tti};
use lte_mac::{task_channel, Mac, TaskQueue, TaskWorker};

use super::mocks::{MockPhy, MockRlc, MockRrc, MockSched};

/// Default config for testing. Small pool and population limits so the
/// capacity paths are easy to reach; modify as needed before passing it to
/// the MacTest constructor.
pub fn default_test_config() -> StackConfig {
    let mut cfg = StackConfig::new();
    cfg.mac.max_nof_ues = 4;
    cfg.mac.ue_pool_size = 4;
    cfg.mac.nof_prealloc_ues = 2;
    cfg
}

/// Quick setup of the MAC with mock collaborators for end-to-end testing.
/// The test itself plays both the real-time context (calling the per-TTI
/// pipelines) and the control-plane context (draining the task worker).
pub struct MacTest {
    pub mac: Mac,
    pub sched: Arc<MockSched>,
    pub phy: Arc<MockPhy>,
    pub rrc: Arc<MockRrc>,
    pub rlc: Arc<MockRlc>,
    tasks: TaskQueue,
    worker: TaskWorker,
}

impl MacTest {
    pub fn new(cfg: StackConfig) -> Self {
        let shared = SharedConfig::from_config(cfg);
        let sched = Arc::new(MockSched::new());
        let phy = Arc::new(MockPhy::default());
        let rrc = Arc::new(MockRrc::default());
        let rlc = Arc::new(MockRlc::default());
        let (tasks, worker) = task_channel();

        let mac = Mac::new(
            &shared,
            sched.clone(),
            phy.clone(),
            rrc.clone(),
            rlc.clone(),
            tasks.clone(),
        )
        .expect("MAC init failed");

        MacTest {
            mac,
            sched,
            phy,
            rrc,
            rlc,
            tasks,
            worker,
        }
    }

    /// Run one random-access detection to completion and return the admitted
    /// identifier
    pub fn admit_user(&mut self, tti: Tti, cc: usize) -> Rnti {
        self.mac.rach_detected(tti, cc, 11, 40);
        self.worker.drain();
        *self
            .sched
            .registered
            .lock()
            .unwrap()
            .last()
            .expect("admission did not reach the scheduler")
    }

    /// Drain the deferred task pipeline, as the control-plane thread would
    pub fn drain(&mut self) {
        self.worker.drain();
    }

    /// Advance the control-plane TTI clock and run everything that came due
    pub fn tick(&mut self, tti: Tti) {
        self.tasks.tick(tti);
        self.worker.drain();
    }
}
