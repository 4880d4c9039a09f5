use serial_test::serial;

use crate::source::{EnvSource, Source};
use crate::{Config, Opt};

fn read_blocking(source: &EnvSource) -> crate::source::DataSet {
    tokio::runtime::Runtime::new()
        .expect("runtime should build")
        .block_on(source.read())
        .expect("env read should succeed")
}

#[test]
#[serial]
fn test_map_prefixed_vars_onto_dotted_keys() {
    temp_env::with_vars(
        vec![
            ("APP__SERVER__PORT", Some("9090")),
            ("APP__SERVER__MAX_CONN", Some("100")),
            ("APP__DEBUG", Some("true")),
            ("OTHER__SERVER__PORT", Some("1")),
            ("APP_SINGLE", Some("ignored")),
        ],
        || {
            let ds = read_blocking(&EnvSource::new("APP"));
            assert_eq!(ds.source(), "env:APP");
            assert_eq!(ds.format(), "json");

            let map: serde_json::Value =
                serde_json::from_slice(ds.data()).expect("payload should be JSON");
            // Double underscores split path segments, single ones survive,
            // keys come out lowercased.
            assert_eq!(map["server.port"], "9090");
            assert_eq!(map["server.max_conn"], "100");
            assert_eq!(map["debug"], "true");
            assert!(map.get("other.server.port").is_none());
            assert!(map.get("single").is_none());
        },
    );
}

#[test]
#[serial]
fn test_normalize_the_prefix() {
    let source = EnvSource::new(" app__ ");
    assert_eq!(source.id(), "env:APP");
}

#[test]
#[serial]
fn test_merge_env_vars_into_registered_options() {
    temp_env::with_vars(
        vec![
            ("MYAPP__SERVER__PORT", Some("7070")),
            ("MYAPP__SERVER__TIMEOUT", Some("30s")),
            ("MYAPP__UNRELATED__KEY", Some("x")),
        ],
        || {
            tokio::runtime::Runtime::new()
                .expect("runtime should build")
                .block_on(async {
                    let config = Config::new();
                    let server = config.group("server").expect("group should be created");
                    server
                        .register(Opt::int("port").with_default(8080))
                        .expect("registration should succeed");
                    server
                        .register(Opt::duration("timeout"))
                        .expect("registration should succeed");

                    config
                        .load_source_without_watch(&EnvSource::new("MYAPP"), true)
                        .await
                        .expect("merge should succeed");

                    assert_eq!(server.get_int("port").expect("port should be set"), 7070);
                    assert_eq!(
                        server
                            .get_duration("timeout")
                            .expect("timeout should be set"),
                        std::time::Duration::from_secs(30)
                    );
                    // The key without a registered group merges to nothing.
                    assert!(!config.has_group("unrelated"));
                });
        },
    );
}
