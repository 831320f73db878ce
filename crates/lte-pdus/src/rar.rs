use lte_core::{assert_warn, BitBuffer, PduError};
use lte_ifaces::RarGrant;

/// One E/T/RAPID subheader per grant
const SUBHEADER_BITS: usize = 8;
/// R(1) + timing advance(11) + packed uplink grant(20) + temporary C-RNTI(16)
const PAYLOAD_BITS: usize = 48;

/// Random Access Response MAC PDU.
///
/// Wire layout: all subheaders first, each `E(1) T(1) RAPID(6)` with `T = 1`
/// and `E` set on every subheader except the last; then one 48-bit payload
/// per grant: `R(1) = 0, ta_cmd(11), ul_grant(20), temp_crnti(16)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RarPdu {
    pub grants: Vec<RarGrant>,
}

impl RarPdu {
    /// Serialized size of a PDU carrying `nof_grants` grants, in bytes
    pub fn encoded_len(nof_grants: usize) -> usize {
        nof_grants * (SUBHEADER_BITS + PAYLOAD_BITS) / 8
    }

    /// Encode `grants` into `buf` starting at position 0. Does not allocate;
    /// `buf` is the caller's pre-sized slot buffer. Returns the number of
    /// bytes written.
    pub fn write_grants(grants: &[RarGrant], buf: &mut BitBuffer) -> Result<usize, PduError> {
        if grants.is_empty() {
            return Err(PduError::InvalidValue { field: "nof_grants", value: 0 });
        }
        let needed_bits = grants.len() * (SUBHEADER_BITS + PAYLOAD_BITS);
        if needed_bits > buf.get_len() {
            return Err(PduError::CapacityExceeded {
                needed_bits,
                available_bits: buf.get_len(),
            });
        }

        // Range-check before touching the buffer, so a failed encode leaves
        // the slot content untouched
        for g in grants {
            if g.preamble_idx >= 64 {
                return Err(PduError::InvalidValue {
                    field: "preamble_idx",
                    value: g.preamble_idx as u64,
                });
            }
            if g.ta_cmd >= 1 << 11 {
                return Err(PduError::InvalidValue { field: "ta_cmd", value: g.ta_cmd as u64 });
            }
            if g.ul_grant >= 1 << 20 {
                return Err(PduError::InvalidValue { field: "ul_grant", value: g.ul_grant as u64 });
            }
        }

        buf.seek(0);
        for (i, g) in grants.iter().enumerate() {
            let last = i == grants.len() - 1;
            buf.write_field(1, if last { 0 } else { 1 }); // E
            buf.write_field(1, 1); // T: RAPID follows
            buf.write_field(6, g.preamble_idx as u64);
        }
        for g in grants {
            buf.write_field(1, 0); // R
            buf.write_field(11, g.ta_cmd as u64);
            buf.write_field(20, g.ul_grant as u64);
            buf.write_field(16, g.temp_crnti as u64);
        }

        Ok(needed_bits / 8)
    }

    /// Receiver-side decode, walking the subheader chain via the E bit.
    pub fn from_bitbuf(buf: &mut BitBuffer) -> Result<Self, PduError> {
        let mut rapids = Vec::new();
        loop {
            let ext = buf.read_field(1, "ext")?;
            let type_bit = buf.read_field(1, "type")?;
            if type_bit != 1 {
                // Backoff-indicator subheaders are not produced by this stack
                return Err(PduError::InvalidValue { field: "type", value: type_bit });
            }
            rapids.push(buf.read_field(6, "rapid")? as u8);
            if ext == 0 {
                break;
            }
        }

        let mut grants = Vec::with_capacity(rapids.len());
        for rapid in rapids {
            let reserved = buf.read_field(1, "reserved")?;
            assert_warn!(reserved == 0, "reserved bit set in RAR payload");
            grants.push(RarGrant {
                preamble_idx: rapid,
                ta_cmd: buf.read_field(11, "ta_cmd")? as u16,
                ul_grant: buf.read_field(20, "ul_grant")? as u32,
                temp_crnti: buf.read_field(16, "temp_crnti")? as u16,
            });
        }
        Ok(RarPdu { grants })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_grants() -> Vec<RarGrant> {
        vec![
            RarGrant {
                preamble_idx: 7,
                ta_cmd: 31,
                temp_crnti: 0x4601,
                ul_grant: 0x12345,
            },
            RarGrant {
                preamble_idx: 63,
                ta_cmd: 2047,
                temp_crnti: 0xea5f,
                ul_grant: (1 << 20) - 1,
            },
            RarGrant {
                preamble_idx: 0,
                ta_cmd: 0,
                temp_crnti: 70,
                ul_grant: 0,
            },
        ]
    }

    #[test]
    fn test_roundtrip() {
        let grants = test_grants();
        let mut buf = BitBuffer::new(RarPdu::encoded_len(grants.len()) * 8);
        let written = RarPdu::write_grants(&grants, &mut buf).unwrap();
        assert_eq!(written, 3 * 7);

        let mut rx = BitBuffer::from_bytes(&buf.as_bytes()[..written]);
        let decoded = RarPdu::from_bitbuf(&mut rx).unwrap();
        assert_eq!(decoded.grants, grants);
    }

    #[test]
    fn test_subheader_chain_bits() {
        let grants = test_grants();
        let mut buf = BitBuffer::new(RarPdu::encoded_len(grants.len()) * 8);
        RarPdu::write_grants(&grants, &mut buf).unwrap();
        let bytes = buf.as_bytes();
        // First two subheaders carry E=1, the final one E=0; T is always set
        assert_eq!(bytes[0], 0b11_000111);
        assert_eq!(bytes[1], 0b11_111111);
        assert_eq!(bytes[2], 0b01_000000);
    }

    #[test]
    fn test_budget_too_small() {
        let grants = test_grants();
        let mut buf = BitBuffer::new(2 * 7 * 8); // room for two grants only
        let err = RarPdu::write_grants(&grants, &mut buf).unwrap_err();
        assert!(matches!(err, PduError::CapacityExceeded { .. }));
    }

    #[test]
    fn test_field_range_checks() {
        let mut g = test_grants();
        g[0].ta_cmd = 2048;
        let mut buf = BitBuffer::new(RarPdu::encoded_len(g.len()) * 8);
        assert!(matches!(
            RarPdu::write_grants(&g, &mut buf),
            Err(PduError::InvalidValue { field: "ta_cmd", .. })
        ));
    }
}
