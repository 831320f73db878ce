use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use serde::Deserialize;
use toml::Value;

use super::stack_config::{CfgCell, SharedConfig, StackConfig};

/// Build `SharedConfig` from a TOML configuration file
pub fn from_toml_str(toml_str: &str) -> Result<SharedConfig, Box<dyn std::error::Error>> {
    let root: TomlConfigRoot = toml::from_str(toml_str)?;

    // Various sanity checks
    let expected_config_version = "0.3";
    if !root.config_version.eq(expected_config_version) {
        return Err(format!(
            "Unrecognized config_version: {}, expect {}",
            root.config_version, expected_config_version
        )
        .into());
    }
    if !root.extra.is_empty() {
        return Err(format!("Unrecognized top-level fields: {:?}", sorted_keys(&root.extra)).into());
    }
    if let Some(ref mac) = root.mac {
        if !mac.extra.is_empty() {
            return Err(format!("Unrecognized fields: mac::{:?}", sorted_keys(&mac.extra)).into());
        }
    }
    for cell in &root.cells {
        if !cell.extra.is_empty() {
            return Err(format!("Unrecognized fields in cell: {:?}", sorted_keys(&cell.extra)).into());
        }
    }

    // Build config from required and optional values
    let mut cfg = StackConfig::new();
    cfg.debug_log = root.debug_log;

    if let Some(mac) = root.mac {
        apply_mac_patch(&mut cfg, mac);
    }
    if !root.cells.is_empty() {
        cfg.cells = root.cells.into_iter().map(cell_from_dto).collect();
    }

    if let Err(e) = cfg.validate() {
        return Err(format!("Invalid configuration: {}", e).into());
    }
    Ok(SharedConfig::from_config(cfg))
}

/// Build `SharedConfig` from any reader.
pub fn from_reader<R: Read>(reader: R) -> Result<SharedConfig, Box<dyn std::error::Error>> {
    let mut contents = String::new();
    let mut reader = BufReader::new(reader);
    reader.read_to_string(&mut contents)?;
    from_toml_str(&contents)
}

/// Build `SharedConfig` from a file path.
pub fn from_file<P: AsRef<Path>>(path: P) -> Result<SharedConfig, Box<dyn std::error::Error>> {
    let f = File::open(path)?;
    let r = BufReader::new(f);
    let cfg = from_reader(r)?;
    Ok(cfg)
}

fn apply_mac_patch(cfg: &mut StackConfig, src: MacDto) {
    if let Some(v) = src.max_nof_ues {
        cfg.mac.max_nof_ues = v;
    }
    if let Some(v) = src.ue_pool_size {
        cfg.mac.ue_pool_size = v;
    }
    if let Some(v) = src.nof_prealloc_ues {
        cfg.mac.nof_prealloc_ues = v;
    }
    if let Some(v) = src.nof_rar_slots {
        cfg.mac.nof_rar_slots = v;
    }
    if let Some(v) = src.rar_payload_len {
        cfg.mac.rar_payload_len = v;
    }
}

fn cell_from_dto(src: CellDto) -> CfgCell {
    let mut cell = CfgCell::default();
    if let Some(v) = src.cell_id {
        cell.cell_id = v;
    }
    if let Some(v) = src.nof_prb {
        cell.nof_prb = v;
    }
    cell
}

fn sorted_keys(map: &HashMap<String, Value>) -> Vec<&String> {
    let mut keys: Vec<&String> = map.keys().collect();
    keys.sort();
    keys
}

#[derive(Debug, Deserialize)]
struct TomlConfigRoot {
    config_version: String,
    debug_log: Option<String>,
    mac: Option<MacDto>,
    #[serde(default, rename = "cell")]
    cells: Vec<CellDto>,
    #[serde(flatten)]
    extra: HashMap<String, Value>,
}

#[derive(Debug, Deserialize)]
struct MacDto {
    max_nof_ues: Option<usize>,
    ue_pool_size: Option<usize>,
    nof_prealloc_ues: Option<usize>,
    nof_rar_slots: Option<usize>,
    rar_payload_len: Option<usize>,
    #[serde(flatten)]
    extra: HashMap<String, Value>,
}

#[derive(Debug, Deserialize)]
struct CellDto {
    cell_id: Option<u16>,
    nof_prb: Option<usize>,
    #[serde(flatten)]
    extra: HashMap<String, Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config() {
        let toml = r#"
            config_version = "0.3"

            [[cell]]
            cell_id = 42
            nof_prb = 50
        "#;
        let cfg = from_toml_str(toml).unwrap();
        assert_eq!(cfg.config().cells.len(), 1);
        assert_eq!(cfg.config().cells[0].cell_id, 42);
        assert_eq!(cfg.config().cells[0].nof_prb, 50);
    }

    #[test]
    fn test_unknown_field_rejected() {
        let toml = r#"
            config_version = "0.3"
            frobnicate = true
        "#;
        assert!(from_toml_str(toml).is_err());
    }

    #[test]
    fn test_wrong_version_rejected() {
        let toml = r#"config_version = "9.9""#;
        assert!(from_toml_str(toml).is_err());
    }
}
