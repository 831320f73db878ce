use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use lte_core::{
    new_rx_handle, new_tx_handle, CarrierIdx, LcId, PduBufferHandle, Rnti, SoftbufferRxHandle,
    SoftbufferTxHandle, Tti, MAX_TB, NOF_HARQ_PROC,
};
use lte_ifaces::RlcInterface;

use crate::metrics::UeMetrics;
use crate::ta::TaFsm;

/// Reception buffers for TTIs older than this are stale and dropped
const RX_BUFFER_MAX_AGE_TTIS: i32 = 16;
/// Maximum simultaneously reserved reception buffers per session
const MAX_RX_BUFFERS: usize = 16;
/// Bound on the pending reassembly queue
const MAX_PENDING_PDUS: usize = 32;

/// MAC subheader + command byte accounted per queued timing-advance command
const TA_CMD_BYTES: usize = 2;
/// Midpoint "no change" step, written until the PHY-measured value is applied
const TA_CMD_NEUTRAL: u8 = 31;

struct PendingPdu {
    tti: Tti,
    cc: CarrierIdx,
    nof_bytes: usize,
    data: PduBufferHandle,
}

/// Per-RNTI session state. Owned exclusively by the pool, the registry or the
/// pending-removal set; never by more than one of them.
pub struct UeContext {
    rnti: Rnti,
    /// Transmit soft buffers, indexed [carrier][harq pid][transport block]
    softbuffer_tx: Vec<Vec<[SoftbufferTxHandle; MAX_TB]>>,
    /// Receive soft buffers, indexed [carrier][harq pid]
    softbuffer_rx: Vec<Vec<SoftbufferRxHandle>>,
    /// Reception buffers reserved for expected uplink transmissions,
    /// keyed by (raw TTI, carrier)
    rx_buffers: HashMap<(u32, CarrierIdx), PduBufferHandle>,
    /// CRC-passed receptions waiting for the control-plane processing pass
    pending_rx: VecDeque<PendingPdu>,
    /// Configured logical channels, pulled from in configured order
    bearers: Vec<LcId>,
    pending_ta_cmds: u32,
    ta: TaFsm,
    last_tti: Tti,
    metrics: UeMetrics,
}

impl UeContext {
    /// Constructed off the real-time path, during pool refill. `cell_prbs`
    /// holds the bandwidth of every configured carrier.
    pub fn new(rnti: Rnti, cell_prbs: &[usize]) -> Self {
        let softbuffer_tx = cell_prbs
            .iter()
            .map(|&prb| {
                (0..NOF_HARQ_PROC)
                    .map(|_| [new_tx_handle(prb), new_tx_handle(prb)])
                    .collect()
            })
            .collect();
        let softbuffer_rx = cell_prbs
            .iter()
            .map(|&prb| (0..NOF_HARQ_PROC).map(|_| new_rx_handle(prb)).collect())
            .collect();

        UeContext {
            rnti,
            softbuffer_tx,
            softbuffer_rx,
            rx_buffers: HashMap::new(),
            pending_rx: VecDeque::new(),
            bearers: Vec::new(),
            pending_ta_cmds: 0,
            ta: TaFsm::new(),
            last_tti: Tti::default(),
            metrics: UeMetrics { rnti, ..Default::default() },
        }
    }

    pub fn rnti(&self) -> Rnti {
        self.rnti
    }

    /// Wipe session state for identifier reuse (handover takes over an
    /// existing record under a new configuration)
    pub fn reset(&mut self) {
        for cc in &self.softbuffer_tx {
            for pid in cc {
                for tb in pid {
                    tb.lock().expect("softbuffer lock poisoned").reset();
                }
            }
        }
        for cc in &self.softbuffer_rx {
            for pid in cc {
                pid.lock().expect("softbuffer lock poisoned").reset_tbs(0);
            }
        }
        self.rx_buffers.clear();
        self.pending_rx.clear();
        self.bearers.clear();
        self.pending_ta_cmds = 0;
        self.ta = TaFsm::new();
    }

    ///////// Soft-buffer bindings /////////

    pub fn get_tx_softbuffer(&self, cc: CarrierIdx, pid: usize, tb: usize) -> Option<SoftbufferTxHandle> {
        Some(Arc::clone(self.softbuffer_tx.get(cc)?.get(pid)?.get(tb)?))
    }

    pub fn get_rx_softbuffer(&self, cc: CarrierIdx, tti: Tti) -> Option<SoftbufferRxHandle> {
        let pid = tti.raw() as usize % NOF_HARQ_PROC;
        Some(Arc::clone(self.softbuffer_rx.get(cc)?.get(pid)?))
    }

    /// Reserve a reception data buffer for the given (TTI, carrier). Fails
    /// when the per-session buffer budget is exhausted; the caller counts the
    /// grant as failed and continues.
    pub fn request_rx_buffer(&mut self, tti: Tti, cc: CarrierIdx, nof_bytes: usize) -> Option<PduBufferHandle> {
        if self.rx_buffers.len() >= MAX_RX_BUFFERS {
            tracing::warn!("rnti=0x{:x}: rx buffer budget exhausted ({})", self.rnti, MAX_RX_BUFFERS);
            return None;
        }
        let handle: PduBufferHandle = Arc::new(Mutex::new(vec![0u8; nof_bytes]));
        self.rx_buffers.insert((tti.raw(), cc), Arc::clone(&handle));
        Some(handle)
    }

    ///////// Uplink PDU reassembly /////////

    /// Queue a correctly-received PDU for the control-plane processing pass
    pub fn push_pdu(&mut self, tti: Tti, cc: CarrierIdx, nof_bytes: usize) -> bool {
        let Some(data) = self.rx_buffers.remove(&(tti.raw(), cc)) else {
            tracing::warn!("rnti=0x{:x}: push_pdu without reserved buffer, tti {} cc {}", self.rnti, tti, cc);
            return false;
        };
        if self.pending_rx.len() >= MAX_PENDING_PDUS {
            tracing::warn!("rnti=0x{:x}: pending PDU queue full, dropping oldest", self.rnti);
            self.pending_rx.pop_front();
        }
        self.pending_rx.push_back(PendingPdu { tti, cc, nof_bytes, data });
        true
    }

    /// Drop the reserved buffer of a reception that failed its CRC
    pub fn deallocate_pdu(&mut self, tti: Tti, cc: CarrierIdx) {
        if self.rx_buffers.remove(&(tti.raw(), cc)).is_none() {
            tracing::debug!("rnti=0x{:x}: deallocate_pdu without reserved buffer, tti {}", self.rnti, tti);
        }
    }

    /// Forward all queued receptions upward. Returns true if anything was
    /// processed.
    pub fn process_pdus(&mut self, rlc: &dyn RlcInterface) -> bool {
        let mut processed = false;
        let lc_id = self.bearers.first().copied().unwrap_or(0);
        while let Some(pdu) = self.pending_rx.pop_front() {
            let data = pdu.data.lock().expect("pdu buffer lock poisoned");
            let len = pdu.nof_bytes.min(data.len());
            tracing::debug!(
                "rnti=0x{:x}: processing PDU tti {} cc {} len {}",
                self.rnti,
                pdu.tti,
                pdu.cc,
                len
            );
            rlc.write_pdu(self.rnti, lc_id, &data[..len]);
            processed = true;
        }
        processed
    }

    /// Drop reservation state the physical layer can no longer deliver for
    pub fn clear_old_buffers(&mut self, now: Tti) {
        self.rx_buffers
            .retain(|&(raw, _), _| Tti::new(raw).age(now) <= RX_BUFFER_MAX_AGE_TTIS);
    }

    ///////// Downlink PDU generation /////////

    /// Build a transport-block payload: pending control-plane commands first,
    /// then logical-channel data pulled from RLC. Returns None if nothing was
    /// available, in which case the grant must not be counted.
    pub fn generate_pdu(&mut self, tbs: usize, rlc: &dyn RlcInterface) -> Option<Vec<u8>> {
        let mut payload = Vec::with_capacity(tbs);

        while self.pending_ta_cmds > 0 && payload.len() + TA_CMD_BYTES <= tbs {
            payload.push(lte_ifaces::LCID_TA_CMD as u8);
            payload.push(TA_CMD_NEUTRAL);
            self.pending_ta_cmds -= 1;
        }

        for &lc_id in &self.bearers {
            let remaining = tbs - payload.len();
            if remaining == 0 {
                break;
            }
            let sdu = rlc.read_pdu(self.rnti, lc_id, remaining);
            payload.extend_from_slice(&sdu);
        }

        if payload.is_empty() { None } else { Some(payload) }
    }

    ///////// Bearers /////////

    pub fn add_bearer(&mut self, lc_id: LcId) {
        if !self.bearers.contains(&lc_id) {
            self.bearers.push(lc_id);
        }
    }

    pub fn rem_bearer(&mut self, lc_id: LcId) {
        self.bearers.retain(|&l| l != lc_id);
    }

    ///////// Timing advance /////////

    pub fn start_ta(&mut self) {
        self.ta.start();
    }

    /// Feed a timing-offset measurement; returns the number of TA commands
    /// that became pending
    pub fn set_ta_us(&mut self, ta_us: f32) -> u32 {
        let n = self.ta.push_measurement(ta_us);
        self.pending_ta_cmds += n;
        n
    }

    /// Per-TTI session timer logic, run by the uplink pipeline
    pub fn tic(&mut self) {
        self.ta.tick();
    }

    pub fn set_tti(&mut self, tti: Tti) {
        self.last_tti = tti;
    }

    ///////// Metrics /////////

    pub fn metrics_tx(&mut self, ack: bool, nof_bytes: usize) {
        if ack {
            self.metrics.tx_pkts += 1;
            self.metrics.tx_brate += nof_bytes as u64;
        } else {
            self.metrics.tx_errors += 1;
        }
    }

    pub fn metrics_rx(&mut self, crc: bool, nof_bytes: usize) {
        if crc {
            self.metrics.rx_pkts += 1;
            self.metrics.rx_brate += nof_bytes as u64;
        } else {
            self.metrics.rx_errors += 1;
        }
    }

    pub fn metrics_cnt(&mut self) {
        self.metrics.nof_tti += 1;
    }

    pub fn metrics_dl_cqi(&mut self, cqi: u8) {
        self.metrics.dl_cqi_last = cqi;
    }

    pub fn metrics_dl_ri(&mut self, ri: u8) {
        self.metrics.dl_ri_last = ri;
    }

    pub fn metrics_dl_pmi(&mut self, pmi: u8) {
        self.metrics.dl_pmi_last = pmi;
    }

    pub fn metrics_ul_snr(&mut self, snr_db: f32) {
        self.metrics.ul_snr_last_db = snr_db;
    }

    /// Copy out and reset the accumulating counters
    pub fn metrics_read(&mut self) -> UeMetrics {
        let out = self.metrics;
        self.metrics = UeMetrics {
            rnti: self.rnti,
            dl_cqi_last: out.dl_cqi_last,
            dl_ri_last: out.dl_ri_last,
            dl_pmi_last: out.dl_pmi_last,
            ul_snr_last_db: out.ul_snr_last_db,
            ..Default::default()
        };
        out
    }
}
