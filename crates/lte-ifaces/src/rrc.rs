use lte_core::{CarrierIdx, Rnti};

use crate::sched::UeCfg;

/// Narrow contract towards the radio-resource-control layer. Bearer and
/// security configuration stay on the RRC side; the MAC only reports
/// admissions and activity and pulls prebuilt system-information payloads.
pub trait RrcInterface: Send + Sync {
    fn add_user(&self, rnti: Rnti, cfg: &UeCfg) -> Result<(), &'static str>;

    /// Downlink activity report, used for inactivity supervision
    fn set_activity_user(&self, rnti: Rnti);

    /// Prebuilt system-information payload for the given SI message index
    fn read_pdu_bcch_dlsch(&self, cc: CarrierIdx, index: usize) -> Option<Vec<u8>>;
}
