use lte_core::{BitBuffer, LcId, PduError};

/// MCH Scheduling Information control element: one 16-bit entry per multicast
/// logical channel announcing where in the schedule period its allocation
/// stops.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MchSchedInfo {
    /// (logical channel id, cumulative stop subframe) pairs
    pub entries: Vec<(LcId, u32)>,
}

impl MchSchedInfo {
    pub fn encoded_len(&self) -> usize {
        self.entries.len() * 2
    }

    /// Encode as lcid(5) stop(11) pairs
    pub fn to_bitbuf(&self, buf: &mut BitBuffer) -> Result<usize, PduError> {
        let needed_bits = self.entries.len() * 16;
        if needed_bits > buf.get_len_remaining() {
            return Err(PduError::CapacityExceeded {
                needed_bits,
                available_bits: buf.get_len_remaining(),
            });
        }
        for &(lcid, stop) in &self.entries {
            if lcid >= 32 {
                return Err(PduError::InvalidValue { field: "lcid", value: lcid as u64 });
            }
            if stop >= 1 << 11 {
                return Err(PduError::InvalidValue { field: "stop_sf", value: stop as u64 });
            }
            buf.write_field(5, lcid as u64);
            buf.write_field(11, stop as u64);
        }
        Ok(needed_bits / 8)
    }

    /// Decode entries until the buffer window ends
    pub fn from_bitbuf(buf: &mut BitBuffer) -> Result<Self, PduError> {
        if buf.get_len_remaining() % 16 != 0 {
            return Err(PduError::InconsistentLength {
                expected: buf.get_len_remaining() / 16 * 16,
                found: buf.get_len_remaining(),
            });
        }
        let mut entries = Vec::new();
        while buf.get_len_remaining() > 0 {
            let lcid = buf.read_field(5, "lcid")? as LcId;
            let stop = buf.read_field(11, "stop_sf")? as u32;
            entries.push((lcid, stop));
        }
        Ok(MchSchedInfo { entries })
    }
}
