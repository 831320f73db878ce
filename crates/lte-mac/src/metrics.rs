use lte_core::Rnti;

/// Per-session counters, reset on read
#[derive(Debug, Clone, Copy, Default)]
pub struct UeMetrics {
    pub rnti: Rnti,
    /// Acknowledged downlink transmissions / bytes
    pub tx_pkts: u64,
    pub tx_errors: u64,
    pub tx_brate: u64,
    /// CRC-passed uplink receptions / bytes
    pub rx_pkts: u64,
    pub rx_errors: u64,
    pub rx_brate: u64,
    /// TTIs this session was active for since the last read
    pub nof_tti: u64,
    pub dl_cqi_last: u8,
    pub dl_ri_last: u8,
    pub dl_pmi_last: u8,
    pub ul_snr_last_db: f32,
}

#[derive(Debug, Clone, Default)]
pub struct MacMetrics {
    pub ues: Vec<UeMetrics>,
    /// Random-access detections per carrier since startup
    pub cc_rach_counter: Vec<u64>,
}
