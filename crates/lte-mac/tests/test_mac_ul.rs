mod common;

use lte_core::{debug, Tti, NOF_HARQ_PROC};
use lte_ifaces::{BearerCfg, PhichInd, SchedUlResult, UlSchedGrant};

use common::{default_test_config, MacTest};

fn ul_grant(rnti: u16, tbs: usize, current_tx_nb: u32) -> UlSchedGrant {
    UlSchedGrant {
        rnti,
        tbs,
        current_tx_nb,
        needs_pdcch: current_tx_nb == 0,
    }
}

#[test]
fn test_reservation_binds_softbuffer_and_data() {
    debug::setup_logging_verbose();
    let mut t = MacTest::new(default_test_config());
    let rnti = t.admit_user(Tti::new(0), 0);

    let mut res = SchedUlResult::default();
    res.pusch.push(ul_grant(rnti, 32, 0));
    res.phich.push(PhichInd { rnti, ack: false });
    t.sched.push_ul(0, res);

    let tti = Tti::new(35);
    let ul = t.mac.get_ul_sched(tti);
    assert_eq!(ul.len(), 1);
    assert_eq!(ul[0].pusch.len(), 1);

    let r = &ul[0].pusch[0];
    assert_eq!(r.rnti, rnti);
    assert_eq!(r.pid, 35 % NOF_HARQ_PROC);
    assert!(r.needs_pdcch);
    // First transmission attempt arms the soft buffer for this TBS
    assert_eq!(r.softbuffer_rx.lock().unwrap().expected_tbs_bits(), 32 * 8);
    // The reception data buffer matches the granted transport block
    assert_eq!(r.data.lock().unwrap().len(), 32);

    // PHICH indications are copied verbatim
    assert_eq!(ul[0].phich, vec![PhichInd { rnti, ack: false }]);
}

#[test]
fn test_unknown_rnti_and_zero_tbs_dropped() {
    debug::setup_logging_verbose();
    let mut t = MacTest::new(default_test_config());
    let rnti = t.admit_user(Tti::new(0), 0);

    let mut res = SchedUlResult::default();
    res.pusch.push(ul_grant(0x4d2, 32, 0));
    res.pusch.push(ul_grant(rnti, 0, 0));
    res.pusch.push(ul_grant(rnti, 16, 0));
    t.sched.push_ul(0, res);

    // Only the valid, non-empty grant survives
    let ul = t.mac.get_ul_sched(Tti::new(10));
    assert_eq!(ul[0].pusch.len(), 1);
    assert_eq!(ul[0].pusch[0].data.lock().unwrap().len(), 16);
}

#[test]
fn test_buffer_exhaustion_counts_grant_failed() {
    debug::setup_logging_verbose();
    let mut t = MacTest::new(default_test_config());
    let rnti = t.admit_user(Tti::new(0), 0);

    // One reservation per TTI until the per-session buffer budget is gone;
    // the cleanup pass retains them all inside the retention window
    for raw in 0..16 {
        let mut res = SchedUlResult::default();
        res.pusch.push(ul_grant(rnti, 8, 0));
        t.sched.push_ul(0, res);
        let ul = t.mac.get_ul_sched(Tti::new(raw));
        assert_eq!(ul[0].pusch.len(), 1, "tti {}", raw);
    }

    // The 17th concurrent reservation fails, non-fatally
    let mut res = SchedUlResult::default();
    res.pusch.push(ul_grant(rnti, 8, 0));
    t.sched.push_ul(0, res);
    let ul = t.mac.get_ul_sched(Tti::new(16));
    assert!(ul[0].pusch.is_empty());
}

#[test]
fn test_stale_reservations_expire() {
    debug::setup_logging_verbose();
    let mut t = MacTest::new(default_test_config());
    let rnti = t.admit_user(Tti::new(0), 0);

    let mut res = SchedUlResult::default();
    res.pusch.push(ul_grant(rnti, 8, 0));
    t.sched.push_ul(0, res);
    assert_eq!(t.mac.get_ul_sched(Tti::new(10))[0].pusch.len(), 1);

    // Idle TTIs age the reservation past the retention window
    for raw in 11..40 {
        t.mac.get_ul_sched(Tti::new(raw));
    }

    // The buffer is gone, so the reception outcome finds nothing to queue
    t.mac.push_pdu(Tti::new(10), rnti, 0, 8, true).unwrap();
    t.drain();
    assert!(t.rlc.written.lock().unwrap().is_empty());
}

#[test]
fn test_reception_outcome_forwards_to_rlc() {
    debug::setup_logging_verbose();
    let mut t = MacTest::new(default_test_config());
    let rnti = t.admit_user(Tti::new(0), 0);
    t.mac.bearer_ue_cfg(rnti, 3, &BearerCfg::default()).unwrap();

    let mut res = SchedUlResult::default();
    res.pusch.push(ul_grant(rnti, 8, 0));
    t.sched.push_ul(0, res);
    let tti = Tti::new(40);
    let ul = t.mac.get_ul_sched(tti);

    // The PHY fills the reserved buffer with the decoded transport block
    let payload = [1u8, 2, 3, 4, 5, 6, 7, 8];
    ul[0].pusch[0].data.lock().unwrap().copy_from_slice(&payload);

    t.mac.push_pdu(tti, rnti, 0, 8, true).unwrap();
    t.drain();

    let written = t.rlc.written.lock().unwrap();
    assert_eq!(written.len(), 1);
    assert_eq!(written[0].0, rnti);
    assert_eq!(written[0].1, 3);
    assert_eq!(written[0].2, payload.to_vec());
}

#[test]
fn test_bad_crc_discards_reception() {
    debug::setup_logging_verbose();
    let mut t = MacTest::new(default_test_config());
    let rnti = t.admit_user(Tti::new(0), 0);

    let mut res = SchedUlResult::default();
    res.pusch.push(ul_grant(rnti, 8, 0));
    t.sched.push_ul(0, res);
    let tti = Tti::new(50);
    t.mac.get_ul_sched(tti);

    t.mac.push_pdu(tti, rnti, 0, 8, false).unwrap();
    t.drain();
    assert!(t.rlc.written.lock().unwrap().is_empty());

    // The buffer was released: a duplicate outcome finds nothing
    t.mac.push_pdu(tti, rnti, 0, 8, true).unwrap();
    t.drain();
    assert!(t.rlc.written.lock().unwrap().is_empty());
}

#[test]
fn test_crc_result_forwarded_to_scheduler() {
    debug::setup_logging_verbose();
    let mut t = MacTest::new(default_test_config());
    let rnti = t.admit_user(Tti::new(0), 0);

    t.mac.crc_info(Tti::new(8), rnti, 0, 32, true).unwrap();
    t.mac.crc_info(Tti::new(9), rnti, 0, 32, false).unwrap();
    assert_eq!(t.sched.crcs.lock().unwrap().as_slice(), &[(rnti, true), (rnti, false)]);
}
