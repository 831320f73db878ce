use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use lte_config::{SharedConfig, StackConfig};
use lte_core::{
    assert_warn, new_tx_handle, BitBuffer, CarrierIdx, LcId, MacError, Rnti, SoftbufferTxHandle,
    Tti, FDD_HARQ_DELAY_DL_TTIS, FDD_HARQ_DELAY_UL_TTIS, MAX_TB, M_RNTI, NOF_HARQ_PROC, P_RNTI,
    SI_RNTI,
};
use lte_ifaces::{
    BcType, BearerCfg, DlPdu, DlSchedResult, PhyInterface, RachInfo, RarGrant, RlcInterface,
    RrcInterface, SchedInterface, UeCfg, UlReservation, UlSchedResult, LCID_CON_RES, LCID_TA_CMD,
};
use lte_pdus::RarPdu;

use crate::mch::{MchCfg, MchScheduler};
use crate::metrics::MacMetrics;
use crate::pool::UePool;
use crate::registry::{UeRegistry, UeState};
use crate::task_queue::TaskQueue;
use crate::ue::UeContext;

/// Number of system-information messages with dedicated common soft buffers
pub const NOF_BCCH_DLSCH_MSG: usize = 3;

/// Acked payloads above this size count as user activity towards RRC
/// (status-only exchanges stay below it)
const DL_ACTIVITY_MIN_BYTES: usize = 64;

/// Msg3 size requested in RAR grants, in bytes
const RAR_MSG3_SIZE: usize = 7;

/// Common soft buffers of one carrier. Broadcast, paging and RAR channels
/// have no retransmission state, so these are shared across all sessions and
/// separate from the per-user banks.
struct CommonBuffers {
    bcch_softbuffer_tx: Vec<SoftbufferTxHandle>,
    pcch_softbuffer_tx: SoftbufferTxHandle,
    rar_softbuffer_tx: SoftbufferTxHandle,
}

/// Pre-sized RAR assembly buffers of one carrier, one per RAR slot
struct RarSlots {
    slots: Vec<BitBuffer>,
}

/// RA-RNTI addressing a RAR transmission in this TTI
fn ra_rnti(tti: Tti) -> Rnti {
    1 + tti.subframe() as Rnti
}

/// The MAC orchestration layer. Shared across the real-time (per-TTI),
/// event and control-plane contexts; membership synchronization lives in the
/// registry, everything else is either immutable or behind its own mutex.
pub struct Mac {
    cfg: Arc<StackConfig>,
    cell_prbs: Vec<usize>,

    sched: Arc<dyn SchedInterface>,
    phy: Arc<dyn PhyInterface>,
    rrc: Arc<dyn RrcInterface>,
    rlc: Arc<dyn RlcInterface>,

    registry: Arc<UeRegistry>,
    pool: UePool,
    tasks: TaskQueue,

    common_buffers: Vec<CommonBuffers>,
    rar_buffers: Mutex<Vec<RarSlots>>,

    mch: Mutex<MchScheduler>,
    mcch_payload: Mutex<Vec<u8>>,

    detected_rachs: Mutex<Vec<u64>>,
    started: AtomicBool,
}

/// Removal shared by the control API and the admission-failure path: move the
/// record out of the active set now, notify the scheduler, and only release
/// the physical-layer resources once no in-flight HARQ exchange can still
/// reference the identifier.
fn ue_rem_deferred(
    registry: &Arc<UeRegistry>,
    sched: &Arc<dyn SchedInterface>,
    phy: &Arc<dyn PhyInterface>,
    tasks: &TaskQueue,
    rnti: Rnti,
) -> Result<(), MacError> {
    registry.begin_removal(rnti).inspect_err(|_| {
        tracing::error!("User rnti=0x{:x} not found", rnti);
    })?;
    sched.ue_rem(rnti);

    let registry = Arc::clone(registry);
    let phy = Arc::clone(phy);
    tasks.defer(FDD_HARQ_DELAY_DL_TTIS + FDD_HARQ_DELAY_UL_TTIS, rnti, move || {
        phy.rem_rnti(rnti);
        if registry.finish_removal(rnti) {
            tracing::info!("User rnti=0x{:x} removed from MAC/PHY", rnti);
        }
    });
    Ok(())
}

impl Mac {
    pub fn new(
        shared_cfg: &SharedConfig,
        sched: Arc<dyn SchedInterface>,
        phy: Arc<dyn PhyInterface>,
        rrc: Arc<dyn RrcInterface>,
        rlc: Arc<dyn RlcInterface>,
        tasks: TaskQueue,
    ) -> Result<Self, MacError> {
        let cfg = shared_cfg.config();
        cfg.validate().map_err(|reason| MacError::InvalidConfig { reason })?;

        let cell_prbs: Vec<usize> = cfg.cells.iter().map(|c| c.nof_prb).collect();

        // Common soft buffers and RAR slot buffers, one set per carrier.
        // Allocation happens here, before the component reports started.
        let common_buffers = cell_prbs
            .iter()
            .map(|&prb| CommonBuffers {
                bcch_softbuffer_tx: (0..NOF_BCCH_DLSCH_MSG).map(|_| new_tx_handle(prb)).collect(),
                pcch_softbuffer_tx: new_tx_handle(prb),
                rar_softbuffer_tx: new_tx_handle(prb),
            })
            .collect();
        let rar_buffers = cell_prbs
            .iter()
            .map(|_| RarSlots {
                slots: (0..cfg.mac.nof_rar_slots)
                    .map(|_| BitBuffer::new(cfg.mac.rar_payload_len * 8))
                    .collect(),
            })
            .collect();

        let registry = Arc::new(UeRegistry::new(cfg.mac.max_nof_ues));
        let pool = UePool::new(
            Arc::clone(&registry),
            cell_prbs.clone(),
            cfg.mac.ue_pool_size,
            cfg.mac.nof_prealloc_ues,
        );

        let nof_cc = cfg.cells.len();
        tracing::info!(
            "MAC initialized: {} carrier(s), max {} UEs, pool size {}",
            nof_cc,
            cfg.mac.max_nof_ues,
            cfg.mac.ue_pool_size
        );

        Ok(Mac {
            cfg,
            cell_prbs,
            sched,
            phy,
            rrc,
            rlc,
            registry,
            pool,
            tasks,
            common_buffers,
            rar_buffers: Mutex::new(rar_buffers),
            mch: Mutex::new(MchScheduler::new()),
            mcch_payload: Mutex::new(Vec::new()),
            detected_rachs: Mutex::new(vec![0; nof_cc]),
            started: AtomicBool::new(true),
        })
    }

    pub fn stop(&self) {
        if self.started.swap(false, Ordering::SeqCst) {
            self.registry.clear();
            tracing::info!("MAC stopped");
        }
    }

    pub fn registry(&self) -> &Arc<UeRegistry> {
        &self.registry
    }

    /// Event-path session check: Active proceeds, Draining is silently
    /// ignored (a late acknowledgement racing the removal grace period),
    /// Unknown is reported to the caller.
    fn classify_for_event(&self, rnti: Rnti, ctx: &'static str) -> Result<bool, MacError> {
        match self.registry.classify(rnti) {
            UeState::Active => Ok(true),
            UeState::Draining => {
                tracing::trace!("{}: rnti=0x{:x} draining, event ignored", ctx, rnti);
                Ok(false)
            }
            UeState::Unknown => {
                tracing::warn!("{}: user rnti=0x{:x} not found", ctx, rnti);
                Err(MacError::NotFound { rnti })
            }
        }
    }

    /********************************************************
     * RLC interface
     *******************************************************/

    pub fn rlc_buffer_state(
        &self,
        rnti: Rnti,
        lc_id: LcId,
        tx_queue: usize,
        retx_queue: usize,
    ) -> Result<(), MacError> {
        if rnti == M_RNTI {
            let mut mch = self.mch.lock().expect("mch lock poisoned");
            assert_warn!(mch.set_buffer_state(lc_id, tx_queue), "unknown multicast lcid {}", lc_id);
            return Ok(());
        }
        if !self.classify_for_event(rnti, "rlc_buffer_state")? {
            return Ok(());
        }
        self.sched.dl_rlc_buffer_state(rnti, lc_id, tx_queue, retx_queue);
        Ok(())
    }

    pub fn bearer_ue_cfg(&self, rnti: Rnti, lc_id: LcId, cfg: &BearerCfg) -> Result<(), MacError> {
        self.registry.with_ue(rnti, |ue| ue.add_bearer(lc_id)).inspect_err(|_| {
            tracing::error!("bearer_ue_cfg: user rnti=0x{:x} not found", rnti);
        })?;
        self.sched
            .bearer_ue_cfg(rnti, lc_id, cfg)
            .map_err(|reason| MacError::SchedulerReject { reason })
    }

    pub fn bearer_ue_rem(&self, rnti: Rnti, lc_id: LcId) -> Result<(), MacError> {
        self.registry.with_ue(rnti, |ue| ue.rem_bearer(lc_id)).inspect_err(|_| {
            tracing::error!("bearer_ue_rem: user rnti=0x{:x} not found", rnti);
        })?;
        self.sched
            .bearer_ue_rem(rnti, lc_id)
            .map_err(|reason| MacError::SchedulerReject { reason })
    }

    pub fn phy_config_enabled(&self, rnti: Rnti, enabled: bool) {
        self.sched.phy_config_enabled(rnti, enabled);
    }

    /********************************************************
     * Control-plane (RRC-facing) interface
     *******************************************************/

    /// Update session configuration. Arms the timing-advance tracking and
    /// registers the configuration with the scheduler.
    pub fn ue_cfg(&self, rnti: Rnti, cfg: Option<&UeCfg>) -> Result<(), MacError> {
        self.registry.with_ue(rnti, |ue| ue.start_ta()).inspect_err(|_| {
            tracing::error!("ue_cfg: user rnti=0x{:x} not found", rnti);
        })?;

        if let Some(cfg) = cfg {
            self.sched.ue_cfg(rnti, cfg).map_err(|reason| {
                tracing::error!("Registering new UE rnti=0x{:x} to SCHED", rnti);
                MacError::SchedulerReject { reason }
            })?;
        }
        Ok(())
    }

    /// Logically remove a session. The record moves to the pending-removal
    /// set immediately (lookups fail from now on); physical-layer resources
    /// are reclaimed after the HARQ round-trip grace period.
    pub fn ue_rem(&self, rnti: Rnti) -> Result<(), MacError> {
        ue_rem_deferred(&self.registry, &self.sched, &self.phy, &self.tasks, rnti)
    }

    /// Called after Msg3. A changed C-RNTI corresponds to an older user
    /// taking over the record (handover); an unchanged one schedules the
    /// contention-resolution message.
    pub fn ue_set_crnti(&self, temp_crnti: Rnti, crnti: Rnti, cfg: &UeCfg) -> Result<(), MacError> {
        if temp_crnti != crnti {
            self.registry.with_ue(crnti, |ue| ue.reset())?;
        } else {
            self.sched.dl_mac_buffer_state(crnti, LCID_CON_RES, 1);
        }
        self.ue_cfg(crnti, Some(cfg))
    }

    pub fn get_metrics(&self) -> MacMetrics {
        let mut metrics = MacMetrics::default();
        self.registry.for_each_active(|_, ue| metrics.ues.push(ue.metrics_read()));
        metrics.cc_rach_counter = self.detected_rachs.lock().expect("rach counter lock poisoned").clone();
        metrics
    }

    /// Install the multicast configuration and payload, and admit the
    /// reserved multicast session.
    pub fn write_mcch(&self, cfg: &MchCfg, mcch_payload: &[u8]) -> Result<(), MacError> {
        if cfg.mtch_lcids.is_empty() || cfg.sched_period_sfs == 0 {
            return Err(MacError::InvalidConfig { reason: "empty multicast configuration" });
        }
        self.mch.lock().expect("mch lock poisoned").configure(cfg);
        *self.mcch_payload.lock().expect("mcch payload lock poisoned") = mcch_payload.to_vec();

        self.registry.insert(UeContext::new(M_RNTI, &self.cell_prbs));
        if self.rrc.add_user(M_RNTI, &UeCfg::default()).is_err() {
            tracing::warn!("write_mcch: RRC refused multicast session");
        }
        Ok(())
    }

    /********************************************************
     * PHY interface
     *******************************************************/

    pub fn ack_info(&self, tti_rx: Tti, rnti: Rnti, cc: CarrierIdx, tb: usize, ack: bool) -> Result<(), MacError> {
        if !self.classify_for_event(rnti, "ack_info")? {
            return Ok(());
        }

        let nof_bytes = self.sched.dl_ack_info(tti_rx, rnti, cc, tb, ack);
        // The session may have raced into removal; then the ack is late and
        // ignored like any other draining-state event
        if self.registry.with_ue(rnti, |ue| ue.metrics_tx(ack, nof_bytes)).is_err() {
            return Ok(());
        }

        if ack && nof_bytes > DL_ACTIVITY_MIN_BYTES {
            self.rrc.set_activity_user(rnti);
            tracing::info!("DL activity rnti=0x{:x}, n_bytes={}", rnti, nof_bytes);
        }
        Ok(())
    }

    pub fn crc_info(&self, tti_rx: Tti, rnti: Rnti, cc: CarrierIdx, nof_bytes: usize, crc: bool) -> Result<(), MacError> {
        if !self.classify_for_event(rnti, "crc_info")? {
            return Ok(());
        }
        let _ = self.registry.with_ue(rnti, |ue| {
            ue.set_tti(tti_rx);
            ue.metrics_rx(crc, nof_bytes);
        });
        self.sched.ul_crc_info(tti_rx, rnti, cc, crc);
        Ok(())
    }

    /// Reception outcome for a reserved uplink buffer: queue it for the
    /// control-plane processing pass on good CRC, drop it otherwise.
    pub fn push_pdu(&self, tti_rx: Tti, rnti: Rnti, cc: CarrierIdx, nof_bytes: usize, crc: bool) -> Result<(), MacError> {
        if !self.classify_for_event(rnti, "push_pdu")? {
            return Ok(());
        }

        let pushed = self
            .registry
            .with_ue(rnti, |ue| {
                if crc {
                    tracing::info!("Pushing PDU rnti=0x{:x}, tti_rx={}, nof_bytes={}", rnti, tti_rx, nof_bytes);
                    ue.push_pdu(tti_rx, cc, nof_bytes)
                } else {
                    tracing::debug!("Discarding PDU rnti=0x{:x}, tti_rx={}, nof_bytes={}", rnti, tti_rx, nof_bytes);
                    ue.deallocate_pdu(tti_rx, cc);
                    false
                }
            })
            .unwrap_or(false);

        if pushed {
            let registry = Arc::clone(&self.registry);
            let rlc = Arc::clone(&self.rlc);
            self.tasks.enqueue("process_pdus", move || {
                registry.for_each_active(|_, ue| {
                    ue.process_pdus(rlc.as_ref());
                });
            });
        }
        Ok(())
    }

    pub fn ta_info(&self, _tti: Tti, rnti: Rnti, ta_us: f32) -> Result<(), MacError> {
        if !self.classify_for_event(rnti, "ta_info")? {
            return Ok(());
        }
        let nof_ta_cmds = self.registry.with_ue(rnti, |ue| ue.set_ta_us(ta_us)).unwrap_or(0);
        if nof_ta_cmds > 0 {
            self.sched.dl_mac_buffer_state(rnti, LCID_TA_CMD, nof_ta_cmds);
        }
        Ok(())
    }

    pub fn sr_detected(&self, tti: Tti, rnti: Rnti) -> Result<(), MacError> {
        if !self.classify_for_event(rnti, "sr_detected")? {
            return Ok(());
        }
        self.sched.ul_sr_info(tti, rnti);
        Ok(())
    }

    pub fn cqi_info(&self, tti: Tti, rnti: Rnti, cc: CarrierIdx, cqi: u8) -> Result<(), MacError> {
        if !self.classify_for_event(rnti, "cqi_info")? {
            return Ok(());
        }
        self.sched.dl_cqi_info(tti, rnti, cc, cqi);
        let _ = self.registry.with_ue(rnti, |ue| ue.metrics_dl_cqi(cqi));
        Ok(())
    }

    pub fn ri_info(&self, tti: Tti, rnti: Rnti, cc: CarrierIdx, ri: u8) -> Result<(), MacError> {
        if !self.classify_for_event(rnti, "ri_info")? {
            return Ok(());
        }
        self.sched.dl_ri_info(tti, rnti, cc, ri);
        let _ = self.registry.with_ue(rnti, |ue| ue.metrics_dl_ri(ri));
        Ok(())
    }

    pub fn pmi_info(&self, tti: Tti, rnti: Rnti, cc: CarrierIdx, pmi: u8) -> Result<(), MacError> {
        if !self.classify_for_event(rnti, "pmi_info")? {
            return Ok(());
        }
        self.sched.dl_pmi_info(tti, rnti, cc, pmi);
        let _ = self.registry.with_ue(rnti, |ue| ue.metrics_dl_pmi(pmi));
        Ok(())
    }

    pub fn snr_info(&self, tti_rx: Tti, rnti: Rnti, cc: CarrierIdx, snr_db: f32) -> Result<(), MacError> {
        if !self.classify_for_event(rnti, "snr_info")? {
            return Ok(());
        }
        self.sched.ul_snr_info(tti_rx, rnti, cc, snr_db);
        let _ = self.registry.with_ue(rnti, |ue| ue.metrics_ul_snr(snr_db));
        Ok(())
    }

    /********************************************************
     * Session admission
     *******************************************************/

    /// Take a pre-built record from the pool and admit it. Non-blocking:
    /// capacity problems are transient errors the caller ignores.
    pub fn allocate_ue(&self) -> Result<Rnti, MacError> {
        if self.registry.is_full() {
            tracing::warn!(
                "Maximum number of connected UEs {} reached. Ignoring PRACH",
                self.registry.max_nof_ues()
            );
            return Err(MacError::RegistryFull {
                max_nof_ues: self.registry.max_nof_ues(),
            });
        }

        let Some(ue) = self.pool.try_acquire() else {
            tracing::error!("Ignoring RACH attempt. UE pool empty.");
            return Err(MacError::PoolExhausted);
        };
        let rnti = ue.rnti();
        self.registry.insert(ue);

        // Build one replacement record in the background
        self.pool.request_refill(1);
        Ok(rnti)
    }

    /// Admission entry used by handover preparation: allocate and register
    /// with the scheduler so the new user can RX/TX SRB0.
    pub fn reserve_new_crnti(&self, cfg: &UeCfg) -> Result<Rnti, MacError> {
        let rnti = self.allocate_ue()?;
        self.sched.ue_cfg(rnti, cfg).map_err(|reason| {
            tracing::error!("Registering new user rnti=0x{:x} to SCHED", rnti);
            MacError::SchedulerReject { reason }
        })?;
        Ok(rnti)
    }

    /// Random-access detection from the PHY. Admits a session synchronously
    /// (pool pop + registry insert) and completes the slower registration
    /// steps on the control-plane context.
    pub fn rach_detected(&self, tti: Tti, cc: CarrierIdx, preamble_idx: u8, time_adv: u16) {
        let rnti = match self.allocate_ue() {
            Ok(rnti) => rnti,
            Err(_) => return,
        };

        {
            let mut rachs = self.detected_rachs.lock().expect("rach counter lock poisoned");
            if cc < rachs.len() {
                rachs[cc] += 1;
            }
        }

        let sched = Arc::clone(&self.sched);
        let rrc = Arc::clone(&self.rrc);
        let phy = Arc::clone(&self.phy);
        let registry = Arc::clone(&self.registry);
        let tasks = self.tasks.clone();
        self.tasks.enqueue("rach_admission", move || {
            let rar_info = RachInfo {
                preamble_idx,
                ta_cmd: time_adv,
                temp_crnti: rnti,
                msg3_size: RAR_MSG3_SIZE,
                prach_tti: tti,
            };

            // Register with the scheduler so the new user can RX/TX SRB0
            let ue_cfg = UeCfg { supported_carriers: vec![cc] };
            if sched.ue_cfg(rnti, &ue_cfg).is_err() {
                tracing::error!("Registering new user rnti=0x{:x} to SCHED", rnti);
                let _ = ue_rem_deferred(&registry, &sched, &phy, &tasks, rnti);
                return;
            }

            if rrc.add_user(rnti, &ue_cfg).is_err() {
                let _ = ue_rem_deferred(&registry, &sched, &phy, &tasks, rnti);
                return;
            }

            sched.dl_rach_info(cc, rar_info);

            tracing::info!(
                "RACH: tti={}, cc={}, preamble={}, offset={}, temp_crnti=0x{:x}",
                tti,
                cc,
                preamble_idx,
                time_adv,
                rnti
            );
        });
    }

    /********************************************************
     * Per-TTI pipelines
     *******************************************************/

    /// Downlink pipeline: one result per carrier. A failing grant never
    /// aborts the TTI; remaining grants and carriers are still serviced.
    pub fn get_dl_sched(&self, tti_tx_dl: Tti) -> Vec<DlSchedResult> {
        if !self.started.load(Ordering::SeqCst) {
            return Vec::new();
        }

        let nof_cc = self.cfg.cells.len();
        let mut results = Vec::with_capacity(nof_cc);

        for cc in 0..nof_cc {
            // Run scheduler with current info; the registry lock is not held
            let sched_result = self.sched.dl_sched(tti_tx_dl, cc);
            let mut dl_res = DlSchedResult {
                pdsch: Vec::new(),
                cfi: sched_result.cfi,
            };

            {
                let maps = self.registry.read();

                // Copy data grants
                for data in &sched_result.data {
                    let Some(cell) = maps.get_active(data.rnti) else {
                        // Scheduling raced with removal; drop this grant only
                        tracing::warn!("Invalid DL scheduling result. User 0x{:x} does not exist", data.rnti);
                        continue;
                    };
                    let mut ue = cell.lock().expect("session lock poisoned");

                    let mut pdu = DlPdu::new(data.rnti);
                    let mut tb_count = 0;
                    for tb in 0..MAX_TB {
                        if data.tbs[tb] == 0 {
                            continue;
                        }
                        // If the Tx soft-buffer is not given, skip this block
                        let Some(softbuffer) = ue.get_tx_softbuffer(cc, data.pid, tb) else {
                            continue;
                        };
                        pdu.softbuffer_tx[tb] = Some(softbuffer);

                        if data.newtx[tb] {
                            match ue.generate_pdu(data.tbs[tb], self.rlc.as_ref()) {
                                Some(payload) => {
                                    pdu.payload[tb] = Some(payload);
                                    tb_count += 1;
                                }
                                None => {
                                    tracing::error!("PDU was not generated (rnti=0x{:04x}, tb={})", data.rnti, tb);
                                }
                            }
                        } else {
                            // Retransmission, coded bits already in the buffer
                            tb_count += 1;
                        }
                    }

                    // Count the grant if at least one TB produced data
                    if tb_count > 0 {
                        dl_res.pdsch.push(pdu);
                    }
                }

                // No more uses of the shared registry beyond here
            }

            // Materialize RAR grants
            for (rar_idx, rar) in sched_result.rar.iter().enumerate() {
                match self.assemble_rar(cc, rar_idx, &rar.grants, rar.tbs) {
                    Ok(payload) => {
                        let mut pdu = DlPdu::new(ra_rnti(tti_tx_dl));
                        pdu.softbuffer_tx[0] = Some(Arc::clone(&self.common_buffers[cc].rar_softbuffer_tx));
                        pdu.payload[0] = Some(payload);
                        dl_res.pdsch.push(pdu);
                    }
                    Err(e) => {
                        tracing::error!(
                            "Assembling RAR: {:?} (cc={}, rar_idx={}, nof_grants={})",
                            e,
                            cc,
                            rar_idx,
                            rar.grants.len()
                        );
                    }
                }
            }

            // Broadcast and paging grants from prebuilt upper-layer payloads
            for bc in &sched_result.bc {
                match bc.bc_type {
                    BcType::Bcch { index } => {
                        if index >= NOF_BCCH_DLSCH_MSG {
                            tracing::warn!("BCCH grant with invalid SI index {}", index);
                            continue;
                        }
                        let Some(payload) = self.rrc.read_pdu_bcch_dlsch(cc, index) else {
                            tracing::warn!("BCCH grant but no SI payload for index {}", index);
                            continue;
                        };
                        let mut pdu = DlPdu::new(SI_RNTI);
                        pdu.softbuffer_tx[0] =
                            Some(Arc::clone(&self.common_buffers[cc].bcch_softbuffer_tx[index]));
                        pdu.payload[0] = Some(payload);
                        dl_res.pdsch.push(pdu);
                    }
                    BcType::Pcch => {
                        let max = bc.tbs.min(self.cfg.mac.pcch_payload_len);
                        let payload = self.rlc.read_pdu_pcch(max);
                        if payload.is_empty() {
                            tracing::debug!("PCCH grant but no pending paging payload");
                            continue;
                        }
                        let mut pdu = DlPdu::new(P_RNTI);
                        pdu.softbuffer_tx[0] = Some(Arc::clone(&self.common_buffers[cc].pcch_softbuffer_tx));
                        pdu.payload[0] = Some(payload);
                        dl_res.pdsch.push(pdu);
                    }
                }
            }

            results.push(dl_res);
        }

        // Count this TTI for all active users
        self.registry.for_each_active(|_, ue| ue.metrics_cnt());

        results
    }

    /// Uplink pipeline: reserve reception soft-buffers and data buffers for
    /// the expected transmissions of this TTI.
    pub fn get_ul_sched(&self, tti_tx_ul: Tti) -> Vec<UlSchedResult> {
        if !self.started.load(Ordering::SeqCst) {
            return Vec::new();
        }

        // Execute per-session FSMs (e.g. TA) before any grant processing
        self.registry.for_each_active(|_, ue| ue.tic());

        let nof_cc = self.cfg.cells.len();
        let mut results = Vec::with_capacity(nof_cc);

        for cc in 0..nof_cc {
            let sched_result = self.sched.ul_sched(tti_tx_ul, cc);
            let mut ul_res = UlSchedResult::default();

            {
                let maps = self.registry.read();

                for grant in &sched_result.pusch {
                    if grant.tbs == 0 {
                        tracing::warn!("Grant for rnti=0x{:x} has zero TBS", grant.rnti);
                        continue;
                    }
                    let Some(cell) = maps.get_active(grant.rnti) else {
                        tracing::warn!("Invalid UL scheduling result. User 0x{:x} does not exist", grant.rnti);
                        continue;
                    };
                    let mut ue = cell.lock().expect("session lock poisoned");

                    let pid = tti_tx_ul.raw() as usize % NOF_HARQ_PROC;
                    // If the Rx soft-buffer is not given, abort this reception
                    let Some(softbuffer_rx) = ue.get_rx_softbuffer(cc, tti_tx_ul) else {
                        continue;
                    };
                    if grant.current_tx_nb == 0 {
                        softbuffer_rx
                            .lock()
                            .expect("softbuffer lock poisoned")
                            .reset_tbs(grant.tbs * 8);
                    }

                    let Some(data) = ue.request_rx_buffer(tti_tx_ul, cc, grant.tbs) else {
                        tracing::error!(
                            "Grant for rnti=0x{:x} could not be allocated due to lack of buffers",
                            grant.rnti
                        );
                        continue;
                    };
                    ul_res.pusch.push(UlReservation {
                        rnti: grant.rnti,
                        pid,
                        current_tx_nb: grant.current_tx_nb,
                        needs_pdcch: grant.needs_pdcch,
                        softbuffer_rx,
                        data,
                    });
                }

                // No more uses of the shared registry beyond here
            }

            // Copy PHICH actions verbatim
            ul_res.phich = sched_result.phich.clone();
            results.push(ul_res);
        }

        // Clear old buffers from all users for the completed reception TTI
        self.registry.for_each_active(|_, ue| ue.clear_old_buffers(tti_tx_ul));

        // Advance the control-plane TTI clock (enqueue only, never execute)
        self.tasks.tick(tti_tx_ul);

        results
    }

    /// Encode a RAR grant set into the pre-sized per-(carrier, slot) buffer
    /// and copy out the serialized bytes. Pure and non-blocking.
    pub fn assemble_rar(
        &self,
        cc: CarrierIdx,
        rar_idx: usize,
        grants: &[RarGrant],
        pdu_len: usize,
    ) -> Result<Vec<u8>, MacError> {
        let mut rar_buffers = self.rar_buffers.lock().expect("rar buffer lock poisoned");
        let slots = rar_buffers
            .get_mut(cc)
            .ok_or(MacError::EncodingFailed { reason: "carrier index out of range" })?;
        let slot = slots
            .slots
            .get_mut(rar_idx)
            .ok_or(MacError::EncodingFailed { reason: "RAR slot index out of range" })?;

        if pdu_len * 8 > slot.get_len() {
            return Err(MacError::EncodingFailed { reason: "pdu budget exceeds slot capacity" });
        }
        if RarPdu::encoded_len(grants.len()) > pdu_len {
            return Err(MacError::EncodingFailed { reason: "grants do not fit byte budget" });
        }

        let written = RarPdu::write_grants(grants, slot)
            .map_err(|_| MacError::EncodingFailed { reason: "grant field encoding failed" })?;
        Ok(slot.as_bytes()[..written].to_vec())
    }

    /********************************************************
     * Multicast scheduling
     *******************************************************/

    /// Multicast pipeline step for one subframe. On the control subframe the
    /// schedule period is recomputed and announced; on data subframes the
    /// owning channel's queue is drained into a PDU. Returns None while
    /// multicast is unconfigured.
    pub fn get_mch_sched(&self, tti: Tti, is_mcch: bool) -> Option<DlSchedResult> {
        if !self.started.load(Ordering::SeqCst) {
            return None;
        }

        let mut dl_res = DlSchedResult { pdsch: Vec::new(), cfi: 1 };

        if is_mcch {
            let mut mch = self.mch.lock().expect("mch lock poisoned");
            if !mch.is_configured() {
                return None;
            }
            let bytes_per_sf = mch.data_bytes_per_sf();
            let sched_info = mch.build_schedule(bytes_per_sf);
            let period_stop = mch.period_stop();
            drop(mch);

            self.phy.set_mch_period_stop(period_stop);
            tracing::info!("MCH sched info: {} channels, period stop {}, tti {}", sched_info.entries.len(), period_stop, tti);

            // Control PDU: scheduling info followed by the MCCH payload
            let mut buf = BitBuffer::new(sched_info.encoded_len() * 8);
            let mut payload = match sched_info.to_bitbuf(&mut buf) {
                Ok(len) => buf.as_bytes()[..len].to_vec(),
                Err(e) => {
                    tracing::error!("Encoding MCH scheduling info: {:?}", e);
                    return Some(dl_res);
                }
            };
            payload.extend_from_slice(&self.mcch_payload.lock().expect("mcch payload lock poisoned"));

            let mut pdu = DlPdu::new(M_RNTI);
            pdu.softbuffer_tx[0] = self
                .registry
                .with_ue(M_RNTI, |ue| ue.get_tx_softbuffer(0, tti.raw() as usize % NOF_HARQ_PROC, 0))
                .ok()
                .flatten();
            let len = payload.len();
            pdu.payload[0] = Some(payload);
            let _ = self.registry.with_ue(M_RNTI, |ue| ue.metrics_tx(true, len));
            dl_res.pdsch.push(pdu);
        } else {
            let mut mch = self.mch.lock().expect("mch lock poisoned");
            if !mch.is_configured() {
                return None;
            }
            let bytes_per_sf = mch.data_bytes_per_sf();
            let step = mch.advance_data_subframe(bytes_per_sf);
            drop(mch);

            if let Some((lc_id, budget)) = step {
                let payload = self.rlc.read_pdu(M_RNTI, lc_id, budget);
                if !payload.is_empty() {
                    let mut pdu = DlPdu::new(M_RNTI);
                    pdu.softbuffer_tx[0] = self
                        .registry
                        .with_ue(M_RNTI, |ue| ue.get_tx_softbuffer(0, tti.raw() as usize % NOF_HARQ_PROC, 0))
                        .ok()
                        .flatten();
                    let len = payload.len();
                    pdu.payload[0] = Some(payload);
                    let _ = self.registry.with_ue(M_RNTI, |ue| ue.metrics_tx(true, len));
                    dl_res.pdsch.push(pdu);
                }
            }
        }

        // Count this TTI for all active users
        self.registry.for_each_active(|_, ue| ue.metrics_cnt());

        Some(dl_res)
    }
}
