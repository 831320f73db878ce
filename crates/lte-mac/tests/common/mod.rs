pub mod mac_test;
pub mod mocks;

pub use mac_test::{default_test_config, MacTest};
