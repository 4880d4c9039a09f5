use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::json;

use crate::opt::validator;
use crate::source::DataSet;
use crate::{Config, Error, ErrorHandler, Opt, SourceError};

fn payload(value: &serde_json::Value) -> DataSet {
    DataSet::new("test", "json", serde_json::to_vec(value).unwrap())
}

fn capture_errors(config: &Config) -> Arc<Mutex<Vec<String>>> {
    let reported = Arc::new(Mutex::new(Vec::new()));
    let sink = reported.clone();
    config.set_error_handler(ErrorHandler::new(move |err| {
        sink.lock().push(err.to_string());
    }));
    reported
}

#[test]
fn test_merge_first_wins_until_forced() {
    let config = Config::new();
    let server = config.group("server").unwrap();
    server.register(Opt::int("port")).unwrap();

    config
        .load_data_set(&payload(&json!({"server": {"port": 1}})), false)
        .unwrap();
    assert_eq!(server.get_int("port").unwrap(), 1);

    // Case 1: a later unforced load loses.
    config
        .load_data_set(&payload(&json!({"server": {"port": 2}})), false)
        .unwrap();
    assert_eq!(server.get_int("port").unwrap(), 1);

    // Case 2: a forced load wins.
    config
        .load_data_set(&payload(&json!({"server": {"port": 2}})), true)
        .unwrap();
    assert_eq!(server.get_int("port").unwrap(), 2);
}

#[test]
fn test_overwrite_defaults_even_unforced() {
    let config = Config::new();
    let server = config.group("server").unwrap();
    server.register(Opt::int("port").with_default(8080)).unwrap();

    // A registered default does not count as set, so first-wins still
    // lets the first real payload through.
    config
        .load_data_set(&payload(&json!({"server": {"port": 1}})), false)
        .unwrap();
    assert_eq!(server.get_int("port").unwrap(), 1);
}

#[test]
fn test_apply_first_wins_per_key_not_per_payload() {
    let config = Config::new();
    let server = config.group("server").unwrap();
    server
        .register_all([
            Opt::int("port").with_default(8080),
            Opt::str("host").with_default("0.0.0.0"),
        ])
        .unwrap();

    // Case 1: the first payload names only the port; numeric text
    // coerces into the declared int kind and the host stays unset.
    config
        .load_data_set(&payload(&json!({"server": {"port": "9090"}})), false)
        .unwrap();
    assert_eq!(server.get_int("port").unwrap(), 9090);
    assert_eq!(server.get_str("host").unwrap(), "0.0.0.0");
    assert!(server.has_opt_and_is_not_set("host"));

    // Case 2: a later unforced payload still lands on the unset host.
    config
        .load_data_set(&payload(&json!({"server": {"host": "127.0.0.1"}})), false)
        .unwrap();
    assert_eq!(server.get_str("host").unwrap(), "127.0.0.1");

    // Case 3: the port is past first-wins and keeps its value.
    config
        .load_data_set(&payload(&json!({"server": {"port": "1111"}})), false)
        .unwrap();
    assert_eq!(server.get_int("port").unwrap(), 9090);
}

#[test]
fn test_store_leftover_args_first_wins() {
    let config = Config::new();
    let server = config.group("server").unwrap();
    server.register(Opt::int("port")).unwrap();

    let first = payload(&json!({"server": {"port": 1}})).with_args(vec!["input.txt".into()]);
    config.load_data_set(&first, false).unwrap();
    assert_eq!(config.args(), ["input.txt"]);

    // Case 1: an unforced payload cannot replace stored arguments.
    let second = payload(&json!({"server": {"port": 2}})).with_args(vec!["other.txt".into()]);
    config.load_data_set(&second, false).unwrap();
    assert_eq!(config.args(), ["input.txt"]);

    // Case 2: a forced one can.
    config.load_data_set(&second, true).unwrap();
    assert_eq!(config.args(), ["other.txt"]);

    // Case 3: an empty payload short-circuits before arguments are
    // looked at.
    let data_less = DataSet::new("cli", "json", Vec::new()).with_args(vec!["lost".into()]);
    config.load_data_set(&data_less, true).unwrap();
    assert_eq!(config.args(), ["other.txt"]);
}

#[test]
fn test_merge_toml_end_to_end() {
    let config = Config::new();
    let server = config.group("server").unwrap();
    server
        .register_all([
            Opt::int("port").with_default(8080),
            Opt::str("host").with_default("localhost"),
            Opt::duration("timeout"),
            Opt::str_list("tags"),
        ])
        .unwrap();

    let ds = DataSet::new(
        "file:app.toml",
        "toml",
        br#"
[server]
port = 9090
host = "example.com"
timeout = "90s"
tags = ["edge", "canary"]
"#
        .to_vec(),
    );
    config.load_data_set(&ds, false).unwrap();

    assert_eq!(server.get_int("port").unwrap(), 9090);
    assert_eq!(server.get_str("host").unwrap(), "example.com");
    assert_eq!(
        server.get_duration("timeout").unwrap(),
        Duration::from_secs(90)
    );
    assert_eq!(server.get_str_list("tags").unwrap(), ["edge", "canary"]);
}

#[test]
fn test_split_comma_strings_into_lists() {
    let config = Config::new();
    let server = config.group("server").unwrap();
    server.register(Opt::str_list("tags")).unwrap();

    config
        .load_data_set(&payload(&json!({"server": {"tags": "edge, canary"}})), false)
        .unwrap();
    assert_eq!(server.get_str_list("tags").unwrap(), ["edge", "canary"]);
}

#[test]
fn test_skip_unknown_groups_silently() {
    let config = Config::new();
    let reported = capture_errors(&config);
    let server = config.group("server").unwrap();
    server.register(Opt::int("port")).unwrap();

    config
        .load_data_set(
            &payload(&json!({
                "server": {"port": 2},
                "unknown": {"key": 1},
            })),
            false,
        )
        .unwrap();

    assert_eq!(server.get_int("port").unwrap(), 2);
    assert!(reported.lock().is_empty(), "got: {:?}", reported.lock());
}

#[test]
fn test_report_unknown_options_and_continue() {
    let config = Config::new();
    let reported = capture_errors(&config);
    let server = config.group("server").unwrap();
    server.register(Opt::int("port")).unwrap();

    config
        .load_data_set(
            &payload(&json!({"server": {"nope": 1, "port": 2}})),
            false,
        )
        .unwrap();

    assert_eq!(server.get_int("port").unwrap(), 2);
    let reported = reported.lock();
    assert_eq!(reported.len(), 1, "got: {reported:?}");
    assert!(reported[0].contains("no option"), "got: {}", reported[0]);
}

#[test]
fn test_report_frozen_options_and_continue() {
    let config = Config::new();
    let reported = capture_errors(&config);
    let server = config.group("server").unwrap();
    let db = config.group("db").unwrap();
    server.register(Opt::int("port").with_default(8080)).unwrap();
    db.register(Opt::str("url")).unwrap();

    server.freeze(["port"]).unwrap();
    config
        .load_data_set(
            &payload(&json!({
                "server": {"port": 1},
                "db": {"url": "postgres://prod"},
            })),
            false,
        )
        .unwrap();

    assert_eq!(server.get_int("port").unwrap(), 8080);
    assert_eq!(db.get_str("url").unwrap(), "postgres://prod");
    let reported = reported.lock();
    assert_eq!(reported.len(), 1, "got: {reported:?}");
    assert!(reported[0].contains("frozen"), "got: {}", reported[0]);
}

#[test]
fn test_abort_on_an_invalid_value() {
    let config = Config::new();
    let server = config.group("server").unwrap();
    server
        .register_all([
            Opt::str("host"),
            Opt::int("port")
                .with_default(8080)
                .with_validator(validator::int_range(1, 65535)),
        ])
        .unwrap();

    // Keys merge in sorted order, so the valid host lands before the
    // invalid port aborts the load.
    let err = config
        .load_data_set(
            &payload(&json!({"server": {"port": 70000, "host": "example.com"}})),
            false,
        )
        .unwrap_err();
    assert!(matches!(err, Error::Value(_)), "got: {err}");
    assert_eq!(server.get_str("host").unwrap(), "example.com");
    assert_eq!(server.get_int("port").unwrap(), 8080);
}

#[test]
fn test_empty_and_null_payloads_merge_to_nothing() {
    let config = Config::new();
    let server = config.group("server").unwrap();
    server.register(Opt::int("port").with_default(8080)).unwrap();

    config
        .load_data_set(&DataSet::new("test", "json", Vec::new()), false)
        .unwrap();
    config
        .load_data_set(&DataSet::new("test", "json", b"null".to_vec()), false)
        .unwrap();
    assert_eq!(server.get_int("port").unwrap(), 8080);
}

#[test]
fn test_unknown_formats_and_broken_payloads_fail() {
    let config = Config::new();

    let err = config
        .load_data_set(&DataSet::new("test", "ini", b"a=1".to_vec()), false)
        .unwrap_err();
    assert!(
        matches!(err, Error::Source(SourceError::NoDecoder { .. })),
        "got: {err}"
    );

    let err = config
        .load_data_set(&DataSet::new("test", "json", b"{broken".to_vec()), false)
        .unwrap_err();
    assert!(
        matches!(err, Error::Source(SourceError::Decode { .. })),
        "got: {err}"
    );
    assert!(err.to_string().contains("7 bytes"), "got: {err}");

    // Decodable but not a map.
    let err = config
        .load_data_set(&DataSet::new("test", "json", b"[1, 2]".to_vec()), false)
        .unwrap_err();
    assert!(
        matches!(err, Error::Source(SourceError::Decode { .. })),
        "got: {err}"
    );
}

#[test]
fn test_lock_watched_keys_against_later_loads() {
    let config = Config::new();
    let server = config.group("server").unwrap();
    server.register(Opt::int("port").with_default(8080)).unwrap();

    // A watch push takes the lock for its keys.
    assert!(config.apply_push(&payload(&json!({"server": {"port": 5}}))));
    assert_eq!(server.get_int("port").unwrap(), 5);

    // Even a forced static load yields to the lock.
    config
        .load_data_set(&payload(&json!({"server": {"port": 9}})), true)
        .unwrap();
    assert_eq!(server.get_int("port").unwrap(), 5);

    // A direct set still overwrites.
    server.set("port", 7).unwrap();
    assert_eq!(server.get_int("port").unwrap(), 7);

    // Closing releases the locks; the forced load now lands.
    config.close();
    config
        .load_data_set(&payload(&json!({"server": {"port": 9}})), true)
        .unwrap();
    assert_eq!(server.get_int("port").unwrap(), 9);
}

#[test]
fn test_pushes_after_close_are_dropped() {
    let config = Config::new();
    let server = config.group("server").unwrap();
    server.register(Opt::int("port").with_default(8080)).unwrap();

    config.close();

    // Case 1: a watcher tick that was already past its exit check when
    // close() ran delivers late; the push is rejected and takes no lock.
    assert!(!config.apply_push(&payload(&json!({"server": {"port": 5}}))));
    assert_eq!(server.get_int("port").unwrap(), 8080);

    // Case 2: the close-time unlock stood, so a forced static load
    // still lands.
    config
        .load_data_set(&payload(&json!({"server": {"port": 9}})), true)
        .unwrap();
    assert_eq!(server.get_int("port").unwrap(), 9);
}

#[test]
fn test_report_failed_pushes_instead_of_merging() {
    let config = Config::new();
    let reported = capture_errors(&config);

    let merged = config.apply_push(&DataSet::new("test", "json", b"{broken".to_vec()));
    assert!(!merged);
    let reported = reported.lock();
    assert_eq!(reported.len(), 1, "got: {reported:?}");
    assert!(reported[0].contains("failed to decode"), "got: {}", reported[0]);
}
