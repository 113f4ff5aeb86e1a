use super::{load_settings_from, Settings};

use std::{
    collections::HashMap,
    env, fs,
    path::Path,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

fn no_env(_key: &str) -> Option<String> {
    None
}

fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let vars: HashMap<String, String> = pairs
        .iter()
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect();
    move |key: &str| vars.get(key).cloned()
}

fn temp_settings_file(tag: &str, contents: &str) -> std::path::PathBuf {
    let suffix = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock")
        .as_nanos();
    let path = env::temp_dir().join(format!("command_server_settings_{tag}_{suffix}.toml"));
    fs::write(&path, contents).expect("write settings");
    path
}

#[test]
fn missing_file_yields_defaults() {
    let settings = load_settings_from(Path::new("/nonexistent/command_server.toml"), no_env);
    assert_eq!(settings, Settings::default());
}

#[test]
fn file_values_then_env_overrides() {
    let path = temp_settings_file(
        "layered",
        "bind_addr = \"0.0.0.0:9000\"\nadvance_interval_ms = 250\n",
    );

    let settings = load_settings_from(&path, no_env);
    assert_eq!(settings.bind_addr, "0.0.0.0:9000");
    assert_eq!(settings.advance_interval, Duration::from_millis(250));

    let settings = load_settings_from(
        &path,
        env_from(&[
            ("COMMAND_SERVER_BIND", "127.0.0.1:9100"),
            ("APP__ADVANCE_INTERVAL_MS", "500"),
        ]),
    );
    assert_eq!(settings.bind_addr, "127.0.0.1:9100");
    assert_eq!(settings.advance_interval, Duration::from_millis(500));

    let settings = load_settings_from(
        &path,
        env_from(&[
            ("COMMAND_SERVER_BIND", "127.0.0.1:9100"),
            ("APP__BIND_ADDR", "127.0.0.1:9200"),
        ]),
    );
    assert_eq!(settings.bind_addr, "127.0.0.1:9200");

    fs::remove_file(path).expect("cleanup");
}

#[test]
fn invalid_values_fall_back() {
    let path = temp_settings_file("invalid", "advance_interval_ms = \"soon\"\n");
    let settings = load_settings_from(
        &path,
        env_from(&[("COMMAND_SERVER_ADVANCE_INTERVAL_MS", "fast")]),
    );
    assert_eq!(settings, Settings::default());

    let settings = load_settings_from(
        Path::new("/nonexistent/command_server.toml"),
        env_from(&[("APP__ADVANCE_INTERVAL_MS", "0")]),
    );
    assert_eq!(settings.advance_interval, Settings::default().advance_interval);

    fs::remove_file(path).expect("cleanup");
}
