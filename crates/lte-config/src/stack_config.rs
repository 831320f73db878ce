use std::sync::Arc;

/// MAC-layer sizing parameters
#[derive(Debug, Clone)]
pub struct CfgMac {
    /// Admission is refused once this many sessions are active
    pub max_nof_ues: usize,
    /// Capacity of the pre-built session pool
    pub ue_pool_size: usize,
    /// Number of session records built at startup
    pub nof_prealloc_ues: usize,
    /// RAR slots per carrier per TTI
    pub nof_rar_slots: usize,
    /// Byte capacity of one serialized RAR PDU
    pub rar_payload_len: usize,
    /// Byte capacity of the paging payload buffer
    pub pcch_payload_len: usize,
}

impl Default for CfgMac {
    fn default() -> Self {
        Self {
            max_nof_ues: 64,
            ue_pool_size: 16,
            nof_prealloc_ues: 10,
            nof_rar_slots: 8,
            rar_payload_len: 128,
            pcch_payload_len: 128,
        }
    }
}

/// Per-carrier cell parameters
#[derive(Debug, Clone)]
pub struct CfgCell {
    /// Physical cell identity, 0..504
    pub cell_id: u16,
    /// Downlink/uplink bandwidth in physical resource blocks
    pub nof_prb: usize,
}

impl Default for CfgCell {
    fn default() -> Self {
        Self { cell_id: 1, nof_prb: 25 }
    }
}

#[derive(Debug, Clone)]
pub struct StackConfig {
    pub debug_log: Option<String>,
    pub mac: CfgMac,
    /// One entry per configured carrier
    pub cells: Vec<CfgCell>,
}

impl StackConfig {
    pub fn new() -> Self {
        StackConfig {
            debug_log: None,
            mac: CfgMac::default(),
            cells: vec![CfgCell::default()],
        }
    }

    /// Validate that all required configuration fields are properly set.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.cells.is_empty() {
            return Err("at least one cell must be configured");
        }
        for cell in &self.cells {
            if !(6..=110).contains(&cell.nof_prb) {
                return Err("cell nof_prb must be in 6..=110");
            }
            if cell.cell_id >= 504 {
                return Err("cell_id must be below 504");
            }
        }
        if self.mac.max_nof_ues == 0 {
            return Err("max_nof_ues must be nonzero");
        }
        if self.mac.ue_pool_size == 0 {
            return Err("ue_pool_size must be nonzero");
        }
        if self.mac.nof_prealloc_ues > self.mac.ue_pool_size {
            return Err("nof_prealloc_ues exceeds ue_pool_size");
        }
        if self.mac.nof_rar_slots == 0 || self.mac.rar_payload_len < 8 {
            return Err("RAR slot/payload sizing too small");
        }
        Ok(())
    }
}

impl Default for StackConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Global shared configuration, immutable after construction. Cheap to clone;
/// every component keeps its own handle.
#[derive(Clone)]
pub struct SharedConfig {
    cfg: Arc<StackConfig>,
}

impl SharedConfig {
    pub fn from_config(cfg: StackConfig) -> Self {
        // Check config for validity before returning the SharedConfig object
        match cfg.validate() {
            Ok(_) => {}
            Err(e) => panic!("Invalid stack configuration: {}", e),
        }

        Self { cfg: Arc::new(cfg) }
    }

    /// Access immutable config.
    pub fn config(&self) -> Arc<StackConfig> {
        Arc::clone(&self.cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_valid() {
        assert!(StackConfig::new().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_sizing() {
        let mut cfg = StackConfig::new();
        cfg.cells[0].nof_prb = 3;
        assert!(cfg.validate().is_err());

        let mut cfg = StackConfig::new();
        cfg.mac.nof_prealloc_ues = cfg.mac.ue_pool_size + 1;
        assert!(cfg.validate().is_err());

        let mut cfg = StackConfig::new();
        cfg.cells.clear();
        assert!(cfg.validate().is_err());
    }
}
