use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use lte_core::{CarrierIdx, LcId, Rnti, Tti};
use lte_ifaces::{
    BearerCfg, PhyInterface, RachInfo, RlcInterface, RrcInterface, SchedDlResult, SchedInterface,
    SchedUlResult, UeCfg,
};

/// Scheduling decision service double: hands out scripted per-(TTI, carrier)
/// results and records every forwarded event for later inspection.
#[derive(Default)]
pub struct MockSched {
    dl_script: Mutex<HashMap<CarrierIdx, VecDeque<SchedDlResult>>>,
    ul_script: Mutex<HashMap<CarrierIdx, VecDeque<SchedUlResult>>>,

    pub registered: Mutex<Vec<Rnti>>,
    pub removed: Mutex<Vec<Rnti>>,
    pub rach_info: Mutex<Vec<(CarrierIdx, RachInfo)>>,
    pub acks: Mutex<Vec<(Rnti, usize, bool)>>,
    pub crcs: Mutex<Vec<(Rnti, bool)>>,
    pub srs: Mutex<Vec<Rnti>>,
    pub mac_buffer_state: Mutex<Vec<(Rnti, LcId, u32)>>,
    pub rlc_buffer_state: Mutex<Vec<(Rnti, LcId, usize)>>,

    /// When set, `ue_cfg` refuses and admission must roll back
    pub refuse_ue_cfg: AtomicBool,
    /// Byte count returned for acked transmissions
    pub ack_bytes: AtomicUsize,
}

impl MockSched {
    pub fn new() -> Self {
        let sched = MockSched::default();
        sched.ack_bytes.store(128, Ordering::SeqCst);
        sched
    }

    /// Script the next downlink result for one carrier
    pub fn push_dl(&self, cc: CarrierIdx, result: SchedDlResult) {
        self.dl_script.lock().unwrap().entry(cc).or_default().push_back(result);
    }

    /// Script the next uplink result for one carrier
    pub fn push_ul(&self, cc: CarrierIdx, result: SchedUlResult) {
        self.ul_script.lock().unwrap().entry(cc).or_default().push_back(result);
    }
}

impl SchedInterface for MockSched {
    fn dl_sched(&self, _tti: Tti, cc: CarrierIdx) -> SchedDlResult {
        self.dl_script
            .lock()
            .unwrap()
            .get_mut(&cc)
            .and_then(|q| q.pop_front())
            .unwrap_or_default()
    }

    fn ul_sched(&self, _tti: Tti, cc: CarrierIdx) -> SchedUlResult {
        self.ul_script
            .lock()
            .unwrap()
            .get_mut(&cc)
            .and_then(|q| q.pop_front())
            .unwrap_or_default()
    }

    fn ue_cfg(&self, rnti: Rnti, _cfg: &UeCfg) -> Result<(), &'static str> {
        if self.refuse_ue_cfg.load(Ordering::SeqCst) {
            return Err("refused by test");
        }
        self.registered.lock().unwrap().push(rnti);
        Ok(())
    }

    fn ue_rem(&self, rnti: Rnti) {
        self.removed.lock().unwrap().push(rnti);
    }

    fn bearer_ue_cfg(&self, _rnti: Rnti, _lc_id: LcId, _cfg: &BearerCfg) -> Result<(), &'static str> {
        Ok(())
    }

    fn bearer_ue_rem(&self, _rnti: Rnti, _lc_id: LcId) -> Result<(), &'static str> {
        Ok(())
    }

    fn phy_config_enabled(&self, _rnti: Rnti, _enabled: bool) {}

    fn dl_rlc_buffer_state(&self, rnti: Rnti, lc_id: LcId, tx_queue: usize, _retx_queue: usize) {
        self.rlc_buffer_state.lock().unwrap().push((rnti, lc_id, tx_queue));
    }

    fn dl_mac_buffer_state(&self, rnti: Rnti, lc_id: LcId, nof_pdus: u32) {
        self.mac_buffer_state.lock().unwrap().push((rnti, lc_id, nof_pdus));
    }

    fn dl_rach_info(&self, cc: CarrierIdx, info: RachInfo) {
        self.rach_info.lock().unwrap().push((cc, info));
    }

    fn dl_ack_info(&self, _tti: Tti, rnti: Rnti, _cc: CarrierIdx, tb: usize, ack: bool) -> usize {
        self.acks.lock().unwrap().push((rnti, tb, ack));
        if ack {
            self.ack_bytes.load(Ordering::SeqCst)
        } else {
            0
        }
    }

    fn ul_crc_info(&self, _tti: Tti, rnti: Rnti, _cc: CarrierIdx, crc: bool) {
        self.crcs.lock().unwrap().push((rnti, crc));
    }

    fn ul_sr_info(&self, _tti: Tti, rnti: Rnti) {
        self.srs.lock().unwrap().push(rnti);
    }

    fn dl_cqi_info(&self, _tti: Tti, _rnti: Rnti, _cc: CarrierIdx, _cqi: u8) {}
    fn dl_ri_info(&self, _tti: Tti, _rnti: Rnti, _cc: CarrierIdx, _ri: u8) {}
    fn dl_pmi_info(&self, _tti: Tti, _rnti: Rnti, _cc: CarrierIdx, _pmi: u8) {}
    fn ul_snr_info(&self, _tti: Tti, _rnti: Rnti, _cc: CarrierIdx, _snr_db: f32) {}
}

/// Records the PHY-facing notifications
#[derive(Default)]
pub struct MockPhy {
    pub removed: Mutex<Vec<Rnti>>,
    pub mch_stops: Mutex<Vec<u32>>,
}

impl PhyInterface for MockPhy {
    fn rem_rnti(&self, rnti: Rnti) {
        self.removed.lock().unwrap().push(rnti);
    }

    fn set_mch_period_stop(&self, stop: u32) {
        self.mch_stops.lock().unwrap().push(stop);
    }
}

/// Records admissions and serves canned system-information payloads
#[derive(Default)]
pub struct MockRrc {
    pub added: Mutex<Vec<Rnti>>,
    pub activity: Mutex<Vec<Rnti>>,
    pub refuse_add: AtomicBool,
}

impl RrcInterface for MockRrc {
    fn add_user(&self, rnti: Rnti, _cfg: &UeCfg) -> Result<(), &'static str> {
        if self.refuse_add.load(Ordering::SeqCst) {
            return Err("refused by test");
        }
        self.added.lock().unwrap().push(rnti);
        Ok(())
    }

    fn set_activity_user(&self, rnti: Rnti) {
        self.activity.lock().unwrap().push(rnti);
    }

    fn read_pdu_bcch_dlsch(&self, _cc: CarrierIdx, index: usize) -> Option<Vec<u8>> {
        Some(vec![0xb0 | index as u8; 16])
    }
}

/// Serves configurable downlink payloads and records reassembled uplink ones
pub struct MockRlc {
    /// Bytes handed out per `read_pdu` call; 0 simulates empty queues
    pub dl_payload_len: AtomicUsize,
    pub pcch_payload: Mutex<Vec<u8>>,
    pub written: Mutex<Vec<(Rnti, LcId, Vec<u8>)>>,
}

impl Default for MockRlc {
    fn default() -> Self {
        MockRlc {
            dl_payload_len: AtomicUsize::new(16),
            pcch_payload: Mutex::new(Vec::new()),
            written: Mutex::new(Vec::new()),
        }
    }
}

impl RlcInterface for MockRlc {
    fn read_pdu(&self, _rnti: Rnti, _lc_id: LcId, max_bytes: usize) -> Vec<u8> {
        let len = self.dl_payload_len.load(Ordering::SeqCst);
        vec![0x5a; max_bytes.min(len)]
    }

    fn read_pdu_pcch(&self, max_bytes: usize) -> Vec<u8> {
        let payload = self.pcch_payload.lock().unwrap();
        payload[..payload.len().min(max_bytes)].to_vec()
    }

    fn write_pdu(&self, rnti: Rnti, lc_id: LcId, payload: &[u8]) {
        self.written.lock().unwrap().push((rnti, lc_id, payload.to_vec()));
    }
}
