use lte_core::Rnti;

/// PHY-facing notifications originated by the MAC. The per-TTI schedule
/// results are pulled by the PHY through `Mac::get_dl_sched`/`get_ul_sched`;
/// this trait carries the remaining push-style calls.
pub trait PhyInterface: Send + Sync {
    /// The identifier is free: no in-flight exchange can reference it anymore.
    /// Must be idempotent; a stale notification for an already-released
    /// identifier is a no-op.
    fn rem_rnti(&self, rnti: Rnti);

    /// Last data subframe of the current multicast schedule period
    fn set_mch_period_stop(&self, stop: u32);
}
