/// Timing-advance state machine of one session.
///
/// Disarmed until the session completes initial configuration (measurements
/// during the random-access exchange are unreliable). Once started it
/// accumulates per-reception timing offsets; when enough measurements have
/// been collected and their average exceeds the correction threshold, one TA
/// command is emitted and the window restarts.
#[derive(Debug)]
pub struct TaFsm {
    state: TaState,
    acc_us: f32,
    nof_meas: u32,
    window_ttis: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TaState {
    Idle,
    Measure,
}

/// Minimum measurements before a command may be emitted
const TA_MIN_NOF_MEAS: u32 = 8;
/// Average offset that warrants a correction, in microseconds
const TA_THRESHOLD_US: f32 = 0.5;
/// Measurements older than this are discarded
const TA_WINDOW_TTIS: u32 = 200;

impl TaFsm {
    pub fn new() -> Self {
        TaFsm {
            state: TaState::Idle,
            acc_us: 0.0,
            nof_meas: 0,
            window_ttis: 0,
        }
    }

    pub fn start(&mut self) {
        self.state = TaState::Measure;
        self.reset_window();
    }

    pub fn is_running(&self) -> bool {
        self.state == TaState::Measure
    }

    /// Feed one timing-offset measurement. Returns the number of TA commands
    /// that became pending (0 or 1).
    pub fn push_measurement(&mut self, ta_us: f32) -> u32 {
        if self.state != TaState::Measure {
            return 0;
        }
        self.acc_us += ta_us;
        self.nof_meas += 1;

        if self.nof_meas >= TA_MIN_NOF_MEAS {
            let avg = self.acc_us / self.nof_meas as f32;
            if avg.abs() >= TA_THRESHOLD_US {
                tracing::debug!("TA correction due: avg {:.2}us over {} measurements", avg, self.nof_meas);
                self.reset_window();
                return 1;
            }
        }
        0
    }

    /// Per-TTI tick; expires stale measurement windows
    pub fn tick(&mut self) {
        if self.state != TaState::Measure {
            return;
        }
        self.window_ttis += 1;
        if self.window_ttis >= TA_WINDOW_TTIS {
            self.reset_window();
        }
    }

    fn reset_window(&mut self) {
        self.acc_us = 0.0;
        self.nof_meas = 0;
        self.window_ttis = 0;
    }
}

impl Default for TaFsm {
    fn default() -> Self {
        Self::new()
    }
}
