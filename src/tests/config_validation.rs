//! Configuration parsing and validation tests

use crate::config::{ConfigError, LoadConfig, DEFAULT_ROUTING_ADDRESS};
use crate::group::ScenarioKind;
use alloy_primitives::U256;
use std::io::Write;
use std::time::Duration;

const MINIMAL: &str = r#"
[chain]
chain_id = 1337

[rpc]
endpoint = "http://127.0.0.1:8551"
"#;

fn parse(content: &str) -> LoadConfig {
    LoadConfig::from_toml_str(content).unwrap()
}

#[test]
fn test_minimal_config_defaults() {
    let config = parse(MINIMAL);
    config.validate().unwrap();

    assert_eq!(config.chain.gas_price, 25_000_000_000);
    assert_eq!(config.chain.routing_address, DEFAULT_ROUTING_ADDRESS);
    assert_eq!(config.rpc.pool_capacity, 64);
    assert_eq!(config.accounts.signed, 100);
    assert_eq!(config.accounts.active_percent, 100);
    assert_eq!(config.accounts.seed, None);
    assert_eq!(config.funding.branching_factor, 4);
    assert!(config.scenarios.is_empty());
    assert_eq!(config.charge_value().unwrap(), U256::ZERO);
}

#[test]
fn test_gas_reserve_defaults_to_transfer_cost() {
    let config = parse(MINIMAL);
    assert_eq!(
        config.gas_reserve().unwrap(),
        U256::from(25_000_000_000u64) * U256::from(21_000u64)
    );
}

#[test]
fn test_full_config() {
    let config = parse(
        r#"
scenarios = ["transferTxTC", "transferUnsignedTx", "gaslessOnlyApproveTC"]

[chain]
chain_id = 8217
gas_price = 0
routing_address = "0x0000000000000000000000000000000000002000"
session_ttl_secs = 60

[rpc]
endpoint = "http://node:8551"
request_timeout_ms = 2500
pool_capacity = 8

[accounts]
signed = 10
unsigned = 5
newly_created = 2
snapshot_dir = "/tmp/snapshots"
active_percent = 20
seed = 42

[funding]
rich_private_key = "0x0101010101010101010101010101010101010101010101010101010101010101"
charge_value = "0xde0b6b3a7640000"
gas_reserve = "0"
branching_factor = 8
retry_backoff_ms = 50
inclusion_timeout_ms = 1000
poll_interval_ms = 10
tokens = ["USDT", "BTC"]
token_charge_value = "1000"
"#,
    );
    config.validate().unwrap();

    assert_eq!(
        config.scenarios,
        vec![
            ScenarioKind::TransferTx,
            ScenarioKind::TransferUnsignedTx,
            ScenarioKind::GaslessOnlyApprove
        ]
    );
    assert_eq!(config.charge_value().unwrap(), U256::from(1_000_000_000_000_000_000u64));
    assert_eq!(config.token_charge_value().unwrap(), U256::from(1_000));
    assert_eq!(config.gas_reserve().unwrap(), U256::ZERO);
    assert_eq!(config.accounts.seed, Some(42));
    assert!(config.rich_private_key().is_ok());

    let chain = config.chain_config();
    assert_eq!(chain.chain_id, 8217);
    assert_eq!(chain.gas_price, 0);
    assert_eq!(chain.session_ttl, Duration::from_secs(60));
    assert_eq!(chain.routing_address.to_string().to_lowercase(), "0x0000000000000000000000000000000000002000");

    let policy = config.retry_policy();
    assert_eq!(policy.backoff, Duration::from_millis(50));
    assert_eq!(policy.inclusion_timeout, Duration::from_secs(1));
    assert_eq!(policy.poll_interval, Duration::from_millis(10));
}

#[test]
fn test_out_of_range_values_rejected() {
    let cases = [
        ("chain.chain_id", MINIMAL.replace("chain_id = 1337", "chain_id = 0")),
        (
            "accounts.active_percent",
            format!("{MINIMAL}\n[accounts]\nactive_percent = 101\n"),
        ),
        (
            "funding.branching_factor",
            format!("{MINIMAL}\n[funding]\nbranching_factor = 1\n"),
        ),
        (
            "rpc.pool_capacity",
            MINIMAL.replace("endpoint = ", "pool_capacity = 0\nendpoint = "),
        ),
    ];

    for (field, content) in cases {
        match parse(&content).validate() {
            Err(ConfigError::Invalid { field: got, .. }) => assert_eq!(got, field),
            other => panic!("expected invalid {field}, got {other:?}"),
        }
    }
}

#[test]
fn test_bad_amount_rejected() {
    let config = parse(&format!("{MINIMAL}\n[funding]\ncharge_value = \"lots\"\n"));
    assert!(matches!(
        config.validate(),
        Err(ConfigError::InvalidAmount {
            field: "funding.charge_value",
            ..
        })
    ));
}

#[test]
fn test_unknown_scenario_is_parse_error() {
    let content = format!("scenarios = [\"noSuchTC\"]\n{MINIMAL}");
    assert!(matches!(
        LoadConfig::from_toml_str(&content),
        Err(ConfigError::Parse(_))
    ));
}

#[test]
fn test_missing_rich_key() {
    let config = parse(MINIMAL);
    assert!(matches!(
        config.rich_private_key(),
        Err(ConfigError::MissingRichKey)
    ));
}

#[test]
fn test_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(MINIMAL.as_bytes()).unwrap();

    let config = LoadConfig::from_file(file.path()).unwrap();
    assert_eq!(config.chain.chain_id, 1337);

    let missing = LoadConfig::from_file("/nonexistent/load-tester.toml");
    assert!(matches!(missing, Err(ConfigError::Io { .. })));
}
