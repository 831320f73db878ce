use lte_core::LcId;
use lte_pdus::MchSchedInfo;

/// Multicast configuration installed by the RRC-equivalent layer together
/// with the MCCH payload.
#[derive(Debug, Clone)]
pub struct MchCfg {
    /// Schedule period length in subframes
    pub sched_period_sfs: u32,
    /// Multicast traffic channels, in announcement order
    pub mtch_lcids: Vec<LcId>,
    /// Net payload bytes available in one data subframe
    pub data_bytes_per_sf: usize,
}

#[derive(Debug)]
struct MtchChannel {
    lc_id: LcId,
    buffered_bytes: usize,
    /// Cumulative stop boundary within the current schedule period
    stop_sf: u32,
}

/// Proportional-allocation scheduler for multicast logical channels over a
/// repeating schedule period. All state is explicit: the subframe counter is
/// a field, recomputed boundaries live in the channel records, and each
/// scheduling step is a plain method call.
#[derive(Debug, Default)]
pub struct MchScheduler {
    channels: Vec<MtchChannel>,
    sched_period_sfs: u32,
    data_bytes_per_sf: usize,
    /// Data subframe counter within the current period, starts at 1 after a
    /// control subframe
    cur_sf: u32,
    configured: bool,
}

impl MchScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_configured(&self) -> bool {
        self.configured
    }

    pub fn data_bytes_per_sf(&self) -> usize {
        self.data_bytes_per_sf
    }

    pub fn configure(&mut self, cfg: &MchCfg) {
        self.channels = cfg
            .mtch_lcids
            .iter()
            .map(|&lc_id| MtchChannel {
                lc_id,
                buffered_bytes: 0,
                stop_sf: 0,
            })
            .collect();
        self.sched_period_sfs = cfg.sched_period_sfs;
        self.data_bytes_per_sf = cfg.data_bytes_per_sf;
        self.cur_sf = 1;
        self.configured = true;
        tracing::info!(
            "MchScheduler: configured, period {} sfs, {} channels",
            cfg.sched_period_sfs,
            self.channels.len()
        );
    }

    /// Buffer occupancy report from the upper layer
    pub fn set_buffer_state(&mut self, lc_id: LcId, bytes: usize) -> bool {
        match self.channels.iter_mut().find(|c| c.lc_id == lc_id) {
            Some(ch) => {
                ch.buffered_bytes = bytes;
                true
            }
            None => false,
        }
    }

    /// Schedule-period boundary: recompute every channel's stop boundary from
    /// the current buffer occupancies and reset the subframe counter.
    ///
    /// When the aggregate demand reaches the period capacity, subframes are
    /// shared proportionally to buffered bytes; otherwise each channel gets
    /// exactly the subframes its queue consumes. Zero buffered bytes across
    /// all channels yields an empty schedule: no stop boundaries, no data
    /// PDUs this period, not an error.
    pub fn build_schedule(&mut self, bytes_per_sf: usize) -> MchSchedInfo {
        self.cur_sf = 1;

        let total_bytes: usize = self.channels.iter().map(|c| c.buffered_bytes).sum();
        for ch in &mut self.channels {
            ch.stop_sf = 0;
        }

        if total_bytes == 0 || bytes_per_sf == 0 {
            tracing::debug!("MchScheduler: no multicast traffic buffered, empty schedule");
            return MchSchedInfo::default();
        }

        let avail_bytes = self.sched_period_sfs as usize * bytes_per_sf;
        let mut last_stop: u32 = 0;

        if total_bytes >= avail_bytes {
            // Demand exceeds the period: share subframes proportionally
            for ch in &mut self.channels {
                let ratio = ch.buffered_bytes as f64 / total_bytes as f64;
                let assigned = (self.sched_period_sfs as f64 * ratio).floor() as u32;
                ch.stop_sf = last_stop + assigned;
                last_stop = ch.stop_sf;
            }
        } else {
            // Ample capacity: assign exactly what each queue consumes
            for ch in &mut self.channels {
                let assigned = ch.buffered_bytes.div_ceil(bytes_per_sf) as u32;
                ch.stop_sf = (last_stop + assigned).min(self.sched_period_sfs);
                last_stop = ch.stop_sf;
            }
        }

        MchSchedInfo {
            entries: self.channels.iter().map(|c| (c.lc_id, c.stop_sf)).collect(),
        }
    }

    /// Final stop boundary of the current period, 0 for an empty schedule
    pub fn period_stop(&self) -> u32 {
        self.channels.iter().map(|c| c.stop_sf).max().unwrap_or(0)
    }

    /// Data subframe step: advance the counter and return the logical channel
    /// owning this subframe plus its byte budget. None once the counter has
    /// passed the final boundary (or the owning queue is empty).
    pub fn advance_data_subframe(&mut self, bytes_per_sf: usize) -> Option<(LcId, usize)> {
        let sf = self.cur_sf;
        self.cur_sf += 1;

        if sf > self.period_stop() {
            return None;
        }
        let ch = self.channels.iter().find(|c| sf <= c.stop_sf)?;
        let budget = ch.buffered_bytes.min(bytes_per_sf);
        if budget == 0 {
            return None;
        }
        Some((ch.lc_id, budget))
    }
}
