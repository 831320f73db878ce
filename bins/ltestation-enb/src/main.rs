use clap::Parser;
use rand::Rng;

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use lte_config::{toml_config, SharedConfig};
use lte_core::{debug, CarrierIdx, LcId, Rnti, Tti};
use lte_ifaces::{
    BearerCfg, DlSchedRar, PhyInterface, RachInfo, RarGrant, RlcInterface, RrcInterface,
    SchedDlResult, SchedInterface, SchedUlResult, UeCfg, UlSchedGrant,
};
use lte_mac::{task_channel, Mac};

/// Load configuration file
fn load_config_from_toml(cfg_path: &str) -> SharedConfig {
    match toml_config::from_file(cfg_path) {
        Ok(c) => c,
        Err(e) => {
            println!("Failed to load configuration from {}: {}", cfg_path, e);
            std::process::exit(1);
        }
    }
}

/// Minimal FIFO scheduler stub: answers every forwarded random access with a
/// RAR grant in the next downlink TTI and hands registered users a small
/// periodic uplink grant. Stands in for the real scheduling decision service.
struct DemoSched {
    pending_rar: Mutex<Vec<(CarrierIdx, RachInfo)>>,
    users: Mutex<HashSet<Rnti>>,
}

impl DemoSched {
    fn new() -> Self {
        Self {
            pending_rar: Mutex::new(Vec::new()),
            users: Mutex::new(HashSet::new()),
        }
    }
}

impl SchedInterface for DemoSched {
    fn dl_sched(&self, _tti: Tti, cc: CarrierIdx) -> SchedDlResult {
        let mut result = SchedDlResult { cfi: 1, ..Default::default() };

        let mut pending = self.pending_rar.lock().unwrap();
        let mut rest = Vec::new();
        let mut grants = Vec::new();
        for (rar_cc, info) in pending.drain(..) {
            if rar_cc == cc {
                grants.push(RarGrant {
                    preamble_idx: info.preamble_idx,
                    ta_cmd: info.ta_cmd,
                    temp_crnti: info.temp_crnti,
                    ul_grant: 0x1234,
                });
            } else {
                rest.push((rar_cc, info));
            }
        }
        *pending = rest;

        if !grants.is_empty() {
            result.rar.push(DlSchedRar { tbs: 64, grants });
        }
        result
    }

    fn ul_sched(&self, tti: Tti, _cc: CarrierIdx) -> SchedUlResult {
        let mut result = SchedUlResult::default();
        if tti.raw() % 20 == 0 {
            for &rnti in self.users.lock().unwrap().iter() {
                result.pusch.push(UlSchedGrant {
                    rnti,
                    tbs: 32,
                    current_tx_nb: 0,
                    needs_pdcch: true,
                });
            }
        }
        result
    }

    fn ue_cfg(&self, rnti: Rnti, _cfg: &UeCfg) -> Result<(), &'static str> {
        self.users.lock().unwrap().insert(rnti);
        Ok(())
    }

    fn ue_rem(&self, rnti: Rnti) {
        self.users.lock().unwrap().remove(&rnti);
    }

    fn bearer_ue_cfg(&self, _rnti: Rnti, _lc_id: LcId, _cfg: &BearerCfg) -> Result<(), &'static str> {
        Ok(())
    }

    fn bearer_ue_rem(&self, _rnti: Rnti, _lc_id: LcId) -> Result<(), &'static str> {
        Ok(())
    }

    fn phy_config_enabled(&self, _rnti: Rnti, _enabled: bool) {}

    fn dl_rlc_buffer_state(&self, _rnti: Rnti, _lc_id: LcId, _tx_queue: usize, _retx_queue: usize) {}

    fn dl_mac_buffer_state(&self, _rnti: Rnti, _lc_id: LcId, _nof_pdus: u32) {}

    fn dl_rach_info(&self, cc: CarrierIdx, info: RachInfo) {
        self.pending_rar.lock().unwrap().push((cc, info));
    }

    fn dl_ack_info(&self, _tti: Tti, _rnti: Rnti, _cc: CarrierIdx, _tb: usize, ack: bool) -> usize {
        if ack { 128 } else { 0 }
    }

    fn ul_crc_info(&self, _tti: Tti, _rnti: Rnti, _cc: CarrierIdx, _crc: bool) {}
    fn ul_sr_info(&self, _tti: Tti, _rnti: Rnti) {}
    fn dl_cqi_info(&self, _tti: Tti, _rnti: Rnti, _cc: CarrierIdx, _cqi: u8) {}
    fn dl_ri_info(&self, _tti: Tti, _rnti: Rnti, _cc: CarrierIdx, _ri: u8) {}
    fn dl_pmi_info(&self, _tti: Tti, _rnti: Rnti, _cc: CarrierIdx, _pmi: u8) {}
    fn ul_snr_info(&self, _tti: Tti, _rnti: Rnti, _cc: CarrierIdx, _snr_db: f32) {}
}

struct DemoPhy;

impl PhyInterface for DemoPhy {
    fn rem_rnti(&self, rnti: Rnti) {
        tracing::info!("PHY released rnti=0x{:x}", rnti);
    }
    fn set_mch_period_stop(&self, _stop: u32) {}
}

struct DemoRrc;

impl RrcInterface for DemoRrc {
    fn add_user(&self, rnti: Rnti, _cfg: &UeCfg) -> Result<(), &'static str> {
        tracing::info!("RRC admitted rnti=0x{:x}", rnti);
        Ok(())
    }
    fn set_activity_user(&self, _rnti: Rnti) {}
    fn read_pdu_bcch_dlsch(&self, _cc: CarrierIdx, _index: usize) -> Option<Vec<u8>> {
        Some(vec![0u8; 32])
    }
}

struct DemoRlc;

impl RlcInterface for DemoRlc {
    fn read_pdu(&self, _rnti: Rnti, _lc_id: LcId, max_bytes: usize) -> Vec<u8> {
        vec![0x5a; max_bytes.min(16)]
    }
    fn read_pdu_pcch(&self, _max_bytes: usize) -> Vec<u8> {
        Vec::new()
    }
    fn write_pdu(&self, rnti: Rnti, lc_id: LcId, payload: &[u8]) {
        tracing::debug!("RLC rx rnti=0x{:x} lcid {} len {}", rnti, lc_id, payload.len());
    }
}

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "LTEstation eNodeB MAC",
    long_about = "Runs the LTEstation MAC layer against stub collaborators using the provided TOML configuration"
)]
struct Args {
    /// Config file (required)
    #[arg(help = "TOML config with MAC/cell parameters")]
    config: String,

    /// Probability per TTI of a simulated random-access detection
    #[arg(long, default_value_t = 0.005)]
    rach_prob: f64,
}

fn main() {
    let args = Args::parse();
    let cfg = load_config_from_toml(&args.config);
    let _log_guard = debug::setup_logging_default(cfg.config().debug_log.clone());

    let sched = Arc::new(DemoSched::new());
    let (tasks, mut worker) = task_channel();
    let mac = Arc::new(
        Mac::new(
            &cfg,
            sched,
            Arc::new(DemoPhy),
            Arc::new(DemoRrc),
            Arc::new(DemoRlc),
            tasks,
        )
        .expect("MAC initialization failed"),
    );

    // Set up Ctrl+C handler for graceful shutdown
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })
    .expect("failed to set Ctrl+C handler");

    // Control-plane context: drains the deferred task pipeline
    let ctrl_running = Arc::clone(&running);
    let ctrl = thread::spawn(move || {
        worker.run(&ctrl_running);
    });

    // Real-time context: fixed-period TTI driver
    let mut tti = Tti::default();
    let mut rng = rand::rng();
    while running.load(Ordering::SeqCst) {
        let dl = mac.get_dl_sched(tti);
        let _ul = mac.get_ul_sched(tti);

        for (cc, res) in dl.iter().enumerate() {
            for pdu in &res.pdsch {
                tracing::debug!(
                    "tti {} cc {} -> pdsch rnti=0x{:x} payload {} bytes",
                    tti,
                    cc,
                    pdu.rnti,
                    pdu.payload[0].as_ref().map_or(0, |p| p.len())
                );
            }
        }

        if rng.random_bool(args.rach_prob) {
            let preamble = rng.random_range(0..64) as u8;
            let ta = rng.random_range(0..128) as u16;
            mac.rach_detected(tti, 0, preamble, ta);
        }

        tti = tti.add(1);
        thread::sleep(Duration::from_millis(1));
    }

    let metrics = mac.get_metrics();
    tracing::info!(
        "shutdown: {} sessions, {:?} RACHs detected",
        metrics.ues.len(),
        metrics.cc_rach_counter
    );

    mac.stop();
    ctrl.join().expect("control thread panicked");
}
