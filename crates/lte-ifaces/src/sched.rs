use lte_core::{CarrierIdx, LcId, PduBufferHandle, Rnti, SoftbufferRxHandle, SoftbufferTxHandle, Tti, MAX_TB};

/// Contention-resolution identity control element
pub const LCID_CON_RES: LcId = 0b11100;
/// Timing-advance command control element
pub const LCID_TA_CMD: LcId = 0b11101;

/// Downlink data grant produced by the scheduling decision service.
/// Valid only for the TTI it was produced for.
#[derive(Debug, Clone)]
pub struct DlSchedData {
    pub rnti: Rnti,
    /// HARQ process id
    pub pid: usize,
    /// Transport block size in bytes, 0 = TB not enabled
    pub tbs: [usize; MAX_TB],
    /// True if the TB carries new data (a PDU must be generated)
    pub newtx: [bool; MAX_TB],
}

/// One uplink grant inside a Random Access Response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RarGrant {
    /// Echo of the detected preamble, 0..64
    pub preamble_idx: u8,
    /// Timing advance command, 11 bits
    pub ta_cmd: u16,
    /// Identifier assigned for the rest of the random-access procedure
    pub temp_crnti: Rnti,
    /// Packed uplink resource grant, 20 bits
    pub ul_grant: u32,
}

/// Random-access-response grant set for one RAR slot
#[derive(Debug, Clone)]
pub struct DlSchedRar {
    /// Byte budget of the RAR transport block
    pub tbs: usize,
    pub grants: Vec<RarGrant>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BcType {
    /// System information, index selects the SI message
    Bcch { index: usize },
    /// Paging
    Pcch,
}

/// Broadcast/paging grant
#[derive(Debug, Clone)]
pub struct DlSchedBc {
    pub bc_type: BcType,
    pub tbs: usize,
}

/// Scheduler output for one (TTI, carrier) on the downlink
#[derive(Debug, Clone, Default)]
pub struct SchedDlResult {
    pub data: Vec<DlSchedData>,
    pub rar: Vec<DlSchedRar>,
    pub bc: Vec<DlSchedBc>,
    /// Control-channel format indicator
    pub cfi: u8,
}

impl Default for DlSchedData {
    fn default() -> Self {
        Self {
            rnti: lte_core::INVALID_RNTI,
            pid: 0,
            tbs: [0; MAX_TB],
            newtx: [false; MAX_TB],
        }
    }
}

/// Uplink grant produced by the scheduling decision service
#[derive(Debug, Clone, Copy)]
pub struct UlSchedGrant {
    pub rnti: Rnti,
    /// Transport block size in bytes
    pub tbs: usize,
    /// 0 for the first transmission attempt of this process
    pub current_tx_nb: u32,
    pub needs_pdcch: bool,
}

/// ACK/NACK indication to transmit on the PHICH
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhichInd {
    pub rnti: Rnti,
    pub ack: bool,
}

/// Scheduler output for one (TTI, carrier) on the uplink
#[derive(Debug, Clone, Default)]
pub struct SchedUlResult {
    pub pusch: Vec<UlSchedGrant>,
    pub phich: Vec<PhichInd>,
}

/// Random-access detection forwarded to the scheduler so it can produce the
/// corresponding RAR grant in a following TTI.
#[derive(Debug, Clone, Copy)]
pub struct RachInfo {
    pub preamble_idx: u8,
    pub ta_cmd: u16,
    pub temp_crnti: Rnti,
    pub msg3_size: usize,
    pub prach_tti: Tti,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BearerDirection {
    #[default]
    Idle,
    Ul,
    Dl,
    Both,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BearerCfg {
    pub direction: BearerDirection,
}

/// Session configuration registered with the scheduler on admission and on
/// later reconfiguration.
#[derive(Debug, Clone, Default)]
pub struct UeCfg {
    /// Carriers the session is active on; the first entry is the primary
    pub supported_carriers: Vec<CarrierIdx>,
}

/// The scheduling decision service. Decides which user gets which resource;
/// consumed as an opaque collaborator. Never called with the registry lock
/// held.
pub trait SchedInterface: Send + Sync {
    fn dl_sched(&self, tti: Tti, cc: CarrierIdx) -> SchedDlResult;
    fn ul_sched(&self, tti: Tti, cc: CarrierIdx) -> SchedUlResult;

    fn ue_cfg(&self, rnti: Rnti, cfg: &UeCfg) -> Result<(), &'static str>;
    fn ue_rem(&self, rnti: Rnti);
    fn bearer_ue_cfg(&self, rnti: Rnti, lc_id: LcId, cfg: &BearerCfg) -> Result<(), &'static str>;
    fn bearer_ue_rem(&self, rnti: Rnti, lc_id: LcId) -> Result<(), &'static str>;
    fn phy_config_enabled(&self, rnti: Rnti, enabled: bool);

    /// Downlink queue occupancy reported by RLC
    fn dl_rlc_buffer_state(&self, rnti: Rnti, lc_id: LcId, tx_queue: usize, retx_queue: usize);
    /// MAC-internal buffer state (e.g. pending timing-advance commands)
    fn dl_mac_buffer_state(&self, rnti: Rnti, lc_id: LcId, nof_pdus: u32);

    fn dl_rach_info(&self, cc: CarrierIdx, info: RachInfo);
    /// Returns the number of bytes whose transmission the ACK confirms
    fn dl_ack_info(&self, tti: Tti, rnti: Rnti, cc: CarrierIdx, tb: usize, ack: bool) -> usize;
    fn ul_crc_info(&self, tti: Tti, rnti: Rnti, cc: CarrierIdx, crc: bool);
    fn ul_sr_info(&self, tti: Tti, rnti: Rnti);
    fn dl_cqi_info(&self, tti: Tti, rnti: Rnti, cc: CarrierIdx, cqi: u8);
    fn dl_ri_info(&self, tti: Tti, rnti: Rnti, cc: CarrierIdx, ri: u8);
    fn dl_pmi_info(&self, tti: Tti, rnti: Rnti, cc: CarrierIdx, pmi: u8);
    fn ul_snr_info(&self, tti: Tti, rnti: Rnti, cc: CarrierIdx, snr_db: f32);
}

/// One downlink allocation handed to the PHY: resolved identifier, bound
/// transmit soft-buffers and the payload per transport block.
#[derive(Debug, Clone)]
pub struct DlPdu {
    pub rnti: Rnti,
    pub softbuffer_tx: [Option<SoftbufferTxHandle>; MAX_TB],
    pub payload: [Option<Vec<u8>>; MAX_TB],
}

impl DlPdu {
    pub fn new(rnti: Rnti) -> Self {
        Self {
            rnti,
            softbuffer_tx: [None, None],
            payload: [None, None],
        }
    }
}

/// Per-carrier downlink result of one TTI
#[derive(Debug, Clone, Default)]
pub struct DlSchedResult {
    pub pdsch: Vec<DlPdu>,
    pub cfi: u8,
}

/// One uplink reception reservation handed to the PHY
#[derive(Debug, Clone)]
pub struct UlReservation {
    pub rnti: Rnti,
    pub pid: usize,
    pub current_tx_nb: u32,
    pub needs_pdcch: bool,
    pub softbuffer_rx: SoftbufferRxHandle,
    /// Reserved reception data buffer, sized to the granted transport block
    pub data: PduBufferHandle,
}

/// Per-carrier uplink result of one TTI
#[derive(Debug, Clone, Default)]
pub struct UlSchedResult {
    pub pusch: Vec<UlReservation>,
    pub phich: Vec<PhichInd>,
}
