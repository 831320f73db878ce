//! Core utilities for the LTEstation eNodeB stack
//!
//! This crate provides fundamental types and utilities used across the stack:
//! - Rnti handles and their reserved values
//! - Tti wrapping subframe arithmetic
//! - Soft-buffer storage for HARQ transmit/receive state
//! - BitBuffer for bit-level PDU manipulation
//! - Error taxonomy and debug utilities

pub mod bitbuffer;
pub mod debug;
pub mod mac_error;
pub mod pdu_error;
pub mod rnti;
pub mod softbuffer;
pub mod tti;

// Re-export commonly used items
pub use bitbuffer::BitBuffer;
pub use mac_error::MacError;
pub use pdu_error::PduError;
pub use rnti::*;
pub use softbuffer::*;
pub use tti::*;

/// Logical channel identifier within one session (MAC LCID space)
pub type LcId = u32;

/// eNB-side carrier index. Carriers are configured at init time; all per-TTI
/// result vectors are indexed by this value.
pub type CarrierIdx = usize;
