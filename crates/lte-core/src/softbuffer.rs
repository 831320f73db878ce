use std::sync::{Arc, Mutex};

/// Number of HARQ processes per carrier (FDD)
pub const NOF_HARQ_PROC: usize = 8;

/// Maximum transport blocks per grant
pub const MAX_TB: usize = 2;

/// Soft-bit storage per physical resource block. Sized for the worst-case
/// rate-matching buffer of one PRB; exact occupancy is up to the PHY.
const CODED_BYTES_PER_PRB: usize = 2400;

/// Transmit-side soft buffer: holds the pending-transmit coded bits of one
/// HARQ process across retransmission attempts.
#[derive(Debug)]
pub struct SoftbufferTx {
    bits: Vec<u8>,
}

impl SoftbufferTx {
    pub fn new(nof_prb: usize) -> Self {
        SoftbufferTx {
            bits: vec![0; nof_prb * CODED_BYTES_PER_PRB],
        }
    }

    pub fn reset(&mut self) {
        self.bits.fill(0);
    }

    pub fn capacity_bytes(&self) -> usize {
        self.bits.len()
    }

    pub fn bits_mut(&mut self) -> &mut [u8] {
        &mut self.bits
    }
}

/// Receive-side soft buffer: accumulates combined-received coded bits of one
/// HARQ process. `expected_tbs_bits` is reset on the first transmission
/// attempt of each new transport block.
#[derive(Debug)]
pub struct SoftbufferRx {
    bits: Vec<u8>,
    expected_tbs_bits: usize,
}

impl SoftbufferRx {
    pub fn new(nof_prb: usize) -> Self {
        SoftbufferRx {
            bits: vec![0; nof_prb * CODED_BYTES_PER_PRB],
            expected_tbs_bits: 0,
        }
    }

    /// Clear combining state and arm the buffer for a transport block of the
    /// given size.
    pub fn reset_tbs(&mut self, tbs_bits: usize) {
        self.bits.fill(0);
        self.expected_tbs_bits = tbs_bits;
    }

    pub fn expected_tbs_bits(&self) -> usize {
        self.expected_tbs_bits
    }

    pub fn capacity_bytes(&self) -> usize {
        self.bits.len()
    }

    pub fn bits_mut(&mut self) -> &mut [u8] {
        &mut self.bits
    }
}

/// Shared handle to a transmit soft buffer. The MAC hands clones of these to
/// the PHY-facing schedule results; the underlying storage stays alive for as
/// long as any binding does, which is what makes the delayed session teardown
/// safe.
pub type SoftbufferTxHandle = Arc<Mutex<SoftbufferTx>>;
pub type SoftbufferRxHandle = Arc<Mutex<SoftbufferRx>>;

pub fn new_tx_handle(nof_prb: usize) -> SoftbufferTxHandle {
    Arc::new(Mutex::new(SoftbufferTx::new(nof_prb)))
}

pub fn new_rx_handle(nof_prb: usize) -> SoftbufferRxHandle {
    Arc::new(Mutex::new(SoftbufferRx::new(nof_prb)))
}

/// Shared handle to a reception data buffer. Handed to the PHY with an uplink
/// reservation; the session keeps the same handle so the received bytes can be
/// processed once the CRC result arrives.
pub type PduBufferHandle = Arc<Mutex<Vec<u8>>>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rx_reset_tbs() {
        let mut sb = SoftbufferRx::new(6);
        sb.bits_mut()[0] = 0xff;
        sb.reset_tbs(1000);
        assert_eq!(sb.expected_tbs_bits(), 1000);
        assert_eq!(sb.capacity_bytes(), 6 * CODED_BYTES_PER_PRB);
        assert_eq!(sb.bits_mut()[0], 0);
    }
}
