//! Collaborator contracts for the LTEstation MAC
//!
//! The MAC consumes a scheduling decision service and talks to the PHY, RRC
//! and RLC layers through the narrow traits defined here. The per-TTI grant
//! descriptor structs exchanged over these seams live here too.

pub mod phy;
pub mod rlc;
pub mod rrc;
pub mod sched;

pub use phy::PhyInterface;
pub use rlc::RlcInterface;
pub use rrc::RrcInterface;
pub use sched::*;
