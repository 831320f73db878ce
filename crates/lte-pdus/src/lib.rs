//! Binary MAC PDU assembly for the LTEstation eNodeB stack
//!
//! Field widths and ordering in this crate are a device compatibility
//! surface: they must match the receiving side bit-for-bit.

pub mod mch_sched_info;
pub mod rar;

pub use mch_sched_info::MchSchedInfo;
pub use rar::RarPdu;
