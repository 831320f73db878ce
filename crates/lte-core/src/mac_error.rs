use crate::rnti::Rnti;

/// MAC-level failure taxonomy. Transient-capacity and inconsistency cases on
/// the per-TTI pipelines are logged and skipped rather than surfaced; these
/// variants are returned from the control-plane and assembly surfaces where
/// the caller has to react.
#[derive(Debug, PartialEq, Eq)]
pub enum MacError {
    /// The pre-built session pool had no record available. Transient; the
    /// triggering random access is ignored.
    PoolExhausted,
    /// The registry is at its configured maximum population. Transient.
    RegistryFull { max_nof_ues: usize },
    /// Control-plane operation on an identifier that is not active.
    NotFound { rnti: Rnti },
    /// RAR assembly could not fit the requested grants into the byte budget,
    /// or targeted a slot outside the configured range.
    EncodingFailed { reason: &'static str },
    /// The scheduling decision service refused a registration
    SchedulerReject { reason: &'static str },
    /// Rejected at initialization. Fatal; the component must not start.
    InvalidConfig { reason: &'static str },
}
