mod common;

use std::sync::atomic::Ordering;

use lte_core::{debug, BitBuffer, Tti, P_RNTI, SI_RNTI};
use lte_ifaces::{BcType, BearerCfg, DlSchedBc, DlSchedData, DlSchedRar, RarGrant, SchedDlResult};
use lte_pdus::RarPdu;

use common::{default_test_config, MacTest};

fn data_grant(rnti: u16, tbs: usize) -> DlSchedData {
    DlSchedData {
        rnti,
        pid: 0,
        tbs: [tbs, 0],
        newtx: [true, false],
    }
}

#[test]
fn test_stale_grant_dropped_others_serviced() {
    debug::setup_logging_verbose();
    let mut t = MacTest::new(default_test_config());
    let a = t.admit_user(Tti::new(0), 0);
    let b = t.admit_user(Tti::new(1), 0);
    t.mac.bearer_ue_cfg(a, 3, &BearerCfg::default()).unwrap();
    t.mac.bearer_ue_cfg(b, 3, &BearerCfg::default()).unwrap();

    // A grant for a user that raced into removal sits between two valid ones
    let mut res = SchedDlResult { cfi: 2, ..Default::default() };
    res.data.push(data_grant(a, 32));
    res.data.push(data_grant(0x4d2, 32));
    res.data.push(data_grant(b, 32));
    t.sched.push_dl(0, res);

    let dl = t.mac.get_dl_sched(Tti::new(200));
    assert_eq!(dl.len(), 1);
    assert_eq!(dl[0].cfi, 2);

    // Exactly the stale grant was dropped
    let rntis: Vec<u16> = dl[0].pdsch.iter().map(|p| p.rnti).collect();
    assert_eq!(rntis, vec![a, b]);
    for pdu in &dl[0].pdsch {
        assert!(pdu.softbuffer_tx[0].is_some());
        assert!(pdu.payload[0].is_some());
    }
}

#[test]
fn test_retransmission_binds_buffer_without_payload() {
    debug::setup_logging_verbose();
    let mut t = MacTest::new(default_test_config());
    let rnti = t.admit_user(Tti::new(0), 0);

    let mut res = SchedDlResult { cfi: 1, ..Default::default() };
    res.data.push(DlSchedData {
        rnti,
        pid: 2,
        tbs: [32, 0],
        newtx: [false, false],
    });
    t.sched.push_dl(0, res);

    let dl = t.mac.get_dl_sched(Tti::new(10));
    assert_eq!(dl[0].pdsch.len(), 1);
    assert!(dl[0].pdsch[0].softbuffer_tx[0].is_some());
    // Coded bits are already in the soft buffer, no new payload
    assert!(dl[0].pdsch[0].payload[0].is_none());
}

#[test]
fn test_grant_without_data_is_not_counted() {
    debug::setup_logging_verbose();
    let mut t = MacTest::new(default_test_config());
    let rnti = t.admit_user(Tti::new(0), 0);
    t.mac.bearer_ue_cfg(rnti, 3, &BearerCfg::default()).unwrap();

    // RLC has nothing buffered and no control elements are pending
    t.rlc.dl_payload_len.store(0, Ordering::SeqCst);

    let mut res = SchedDlResult::default();
    res.data.push(data_grant(rnti, 32));
    t.sched.push_dl(0, res);

    let dl = t.mac.get_dl_sched(Tti::new(10));
    assert!(dl[0].pdsch.is_empty());
}

#[test]
fn test_rar_grants_materialized_bit_exact() {
    debug::setup_logging_verbose();
    let mut t = MacTest::new(default_test_config());

    let grants = vec![
        RarGrant { preamble_idx: 11, ta_cmd: 40, temp_crnti: 0x46, ul_grant: 0x5ad },
        RarGrant { preamble_idx: 63, ta_cmd: 2047, temp_crnti: 0xea5f, ul_grant: (1 << 20) - 1 },
    ];
    let mut res = SchedDlResult::default();
    res.rar.push(DlSchedRar { tbs: 64, grants: grants.clone() });
    t.sched.push_dl(0, res);

    let tti = Tti::new(203);
    let dl = t.mac.get_dl_sched(tti);
    assert_eq!(dl[0].pdsch.len(), 1);
    let pdu = &dl[0].pdsch[0];
    // RA-RNTI derives from the transmit subframe
    assert_eq!(pdu.rnti, 1 + tti.subframe() as u16);
    assert!(pdu.softbuffer_tx[0].is_some());

    // The receiver-side decode reproduces every grant field
    let payload = pdu.payload[0].as_ref().unwrap();
    let mut rx = BitBuffer::from_bytes(payload);
    let decoded = RarPdu::from_bitbuf(&mut rx).unwrap();
    assert_eq!(decoded.grants, grants);
}

#[test]
fn test_rar_budget_failure_is_isolated() {
    debug::setup_logging_verbose();
    let mut t = MacTest::new(default_test_config());
    let rnti = t.admit_user(Tti::new(0), 0);
    t.mac.bearer_ue_cfg(rnti, 3, &BearerCfg::default()).unwrap();

    let mut res = SchedDlResult::default();
    // 3 bytes cannot hold even one subheader + payload pair
    res.rar.push(DlSchedRar {
        tbs: 3,
        grants: vec![RarGrant { preamble_idx: 1, ta_cmd: 0, temp_crnti: 0x46, ul_grant: 0 }],
    });
    res.data.push(data_grant(rnti, 32));
    t.sched.push_dl(0, res);

    // The failed RAR does not abort the TTI; the data grant still goes out
    let dl = t.mac.get_dl_sched(Tti::new(10));
    assert_eq!(dl[0].pdsch.len(), 1);
    assert_eq!(dl[0].pdsch[0].rnti, rnti);
}

#[test]
fn test_bcch_and_pcch_from_common_buffers() {
    debug::setup_logging_verbose();
    let t = MacTest::new(default_test_config());
    *t.rlc.pcch_payload.lock().unwrap() = vec![0xcc; 24];

    let mut res = SchedDlResult::default();
    res.bc.push(DlSchedBc { bc_type: BcType::Bcch { index: 1 }, tbs: 32 });
    res.bc.push(DlSchedBc { bc_type: BcType::Bcch { index: 7 }, tbs: 32 });
    res.bc.push(DlSchedBc { bc_type: BcType::Pcch, tbs: 32 });
    t.sched.push_dl(0, res);

    let dl = t.mac.get_dl_sched(Tti::new(10));
    // The out-of-range SI index was skipped, the rest were served
    let rntis: Vec<u16> = dl[0].pdsch.iter().map(|p| p.rnti).collect();
    assert_eq!(rntis, vec![SI_RNTI, P_RNTI]);
    assert_eq!(dl[0].pdsch[0].payload[0].as_ref().unwrap().len(), 16);
    assert_eq!(dl[0].pdsch[1].payload[0].as_ref().unwrap(), &vec![0xcc; 24]);
    for pdu in &dl[0].pdsch {
        assert!(pdu.softbuffer_tx[0].is_some());
    }
}

#[test]
fn test_all_carriers_serviced() {
    debug::setup_logging_verbose();
    let mut cfg = default_test_config();
    cfg.cells.push(lte_config::CfgCell { cell_id: 2, nof_prb: 50 });
    let mut t = MacTest::new(cfg);
    let rnti = t.admit_user(Tti::new(0), 0);
    t.mac.bearer_ue_cfg(rnti, 3, &BearerCfg::default()).unwrap();

    // Only the second carrier has traffic this TTI
    let mut res = SchedDlResult::default();
    res.data.push(DlSchedData {
        rnti,
        pid: 0,
        tbs: [32, 0],
        newtx: [true, false],
    });
    t.sched.push_dl(1, res);

    let dl = t.mac.get_dl_sched(Tti::new(10));
    assert_eq!(dl.len(), 2);
    assert!(dl[0].pdsch.is_empty());
    assert_eq!(dl[1].pdsch.len(), 1);
}
