//! Configuration loading tests

use mesa_engine::OutstationConfig;

const CONFIG_YAML: &str = r#"
points_file: /etc/mesa/points.json
functions_file: /etc/mesa/functions.yaml
outstation:
  port: 20001
  link_remote_addr: 3
point_topic: custom/point
"#;

#[test]
fn defaults_stand_alone() {
    let config = OutstationConfig::default();
    assert_eq!(config.outstation.host, "0.0.0.0");
    assert_eq!(config.outstation.port, 20000);
    assert_eq!(config.outstation.link_local_addr, 10);
    assert_eq!(config.outstation.link_remote_addr, 1);
    assert_eq!(config.outstation.database_sizes, 10);
    assert_eq!(config.outstation.event_buffers, 10);
    assert!(config.outstation.allow_unsolicited);
    assert_eq!(config.point_topic, "mesa/point");
    assert_eq!(config.function_topic, "mesa/function");
    assert_eq!(config.outstation_status_topic, "mesa/outstation_status");
    assert!(config.points_file.is_none());
}

#[test]
fn file_overrides_merge_with_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("outstation.yaml");
    std::fs::write(&path, CONFIG_YAML).unwrap();

    let config = OutstationConfig::from_file(&path).unwrap();
    assert_eq!(config.points_file.as_deref(), Some("/etc/mesa/points.json"));
    assert_eq!(config.outstation.port, 20001);
    assert_eq!(config.outstation.link_remote_addr, 3);
    // Untouched fields keep their defaults.
    assert_eq!(config.outstation.host, "0.0.0.0");
    assert_eq!(config.point_topic, "custom/point");
    assert_eq!(config.function_topic, "mesa/function");
}

#[test]
fn environment_takes_precedence_over_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("outstation.yaml");
    std::fs::write(&path, CONFIG_YAML).unwrap();

    std::env::set_var("MESA_OUTSTATION__PORT", "20500");
    let config = OutstationConfig::from_file(&path).unwrap();
    std::env::remove_var("MESA_OUTSTATION__PORT");

    assert_eq!(config.outstation.port, 20500);
    assert_eq!(config.outstation.link_remote_addr, 3);
}
