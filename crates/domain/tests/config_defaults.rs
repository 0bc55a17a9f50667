use presence_domain::config::Config;

#[test]
fn default_port_is_3010() {
    let config = Config::default();
    assert_eq!(config.server.port, 3010);
}

#[test]
fn default_sync_interval_is_60s() {
    let config = Config::default();
    assert_eq!(config.registry.sync_interval_ms, 60_000);
}

#[test]
fn default_base_domain_is_office_xyz() {
    let config = Config::default();
    assert_eq!(config.registry.base_domain, "office.xyz");
}

#[test]
fn explicit_toml_overrides_defaults() {
    let toml_str = r#"
[server]
port = 4000

[registry]
sync_interval_ms = 10000
base_domain = "custom.example"
"#;
    let config: Config = toml::from_str(toml_str).unwrap();
    assert_eq!(config.server.port, 4000);
    assert_eq!(config.registry.sync_interval_ms, 10_000);
    assert_eq!(config.registry.base_domain, "custom.example");
}
