use lte_core::{LcId, Rnti};

/// Upper-layer logical-channel data source
pub trait RlcInterface: Send + Sync {
    /// Pull up to `max_bytes` from the given logical channel queue
    fn read_pdu(&self, rnti: Rnti, lc_id: LcId, max_bytes: usize) -> Vec<u8>;

    /// Pull a pending paging payload, up to `max_bytes`
    fn read_pdu_pcch(&self, max_bytes: usize) -> Vec<u8>;

    /// Deliver a reassembled uplink payload
    fn write_pdu(&self, rnti: Rnti, lc_id: LcId, payload: &[u8]);
}
