//! MAC orchestration layer of the LTEstation eNodeB stack
//!
//! Once per TTI this crate turns per-user scheduling decisions into concrete
//! transmit/receive instructions for the physical layer, while managing the
//! lifecycle of user sessions keyed by RNTI. The scheduling algorithm itself,
//! the PHY codec and the RRC/RLC layers are consumed through the traits in
//! `lte-ifaces`.

pub mod mac;
pub mod mch;
pub mod metrics;
pub mod pool;
pub mod registry;
pub mod ta;
pub mod task_queue;
pub mod ue;

pub use mac::Mac;
pub use mch::{MchCfg, MchScheduler};
pub use metrics::{MacMetrics, UeMetrics};
pub use registry::UeRegistry;
pub use task_queue::{task_channel, TaskQueue, TaskWorker};
pub use ue::UeContext;
