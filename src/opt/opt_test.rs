use std::time::Duration;

use serde_json::json;

use crate::errors::ValueError;
use crate::opt::validator;
use crate::{Opt, Value, ValueKind};

#[test]
fn test_names_and_aliases_are_normalized() {
    let opt = Opt::int(" Port ").with_alias("Listen-Port");
    assert_eq!(opt.name(), "port");
    assert_eq!(opt.aliases(), ["listen-port"]);
    assert!(opt.check_name().is_ok());
}

#[test]
fn test_builder_records_declaration_fields() {
    let opt = Opt::str("host")
        .with_default("localhost")
        .with_help("bind address")
        .with_cli(true);
    assert_eq!(opt.kind(), ValueKind::Str);
    assert_eq!(opt.help(), "bind address");
    assert_eq!(opt.default(), Some(&Value::Str("localhost".into())));
    assert!(opt.is_cli());
    assert!(!Opt::str("host").is_cli());
}

#[test]
fn test_default_is_coerced_into_the_declared_kind() {
    // A bare number on a duration option means seconds.
    let opt = Opt::duration("timeout").with_default(30);
    assert_eq!(
        opt.normalized_default().unwrap(),
        Some(Value::Duration(Duration::from_secs(30)))
    );

    let opt = Opt::int("workers").with_default("4");
    assert_eq!(opt.normalized_default().unwrap(), Some(Value::Int(4)));

    let opt = Opt::int("workers");
    assert_eq!(opt.normalized_default().unwrap(), None);
}

#[test]
fn test_default_must_pass_validators() {
    let opt = Opt::int("port")
        .with_default(80)
        .with_validator(validator::int_range(1024, 65535));
    let err = opt.normalized_default().unwrap_err();
    assert!(matches!(err, ValueError::Invalid { .. }), "got: {err}");
}

#[test]
fn test_custom_parser_replaces_builtin_coercion() {
    let opt = Opt::int("len").with_parser(|raw| {
        let s = raw.as_str().ok_or("expected a string")?;
        Ok(Value::Int(s.len() as i64))
    });
    assert_eq!(opt.parse(&json!("abc")).unwrap(), Value::Int(3));

    let err = opt.parse(&json!(12)).unwrap_err();
    assert!(matches!(err, ValueError::Parse { .. }), "got: {err}");
}

#[test]
fn test_parser_output_must_match_the_declared_kind() {
    let opt = Opt::int("n").with_parser(|_| Ok(Value::Str("oops".into())));
    let err = opt.parse(&json!(1)).unwrap_err();
    assert!(
        err.to_string().contains("parser produced string"),
        "got: {err}"
    );
}

#[test]
fn test_validators_run_after_parsing() {
    let opt = Opt::uint("retries")
        .with_validator(validator::uint_range(0, 5))
        .with_validator(|v| {
            if v.as_uint() == Some(4) {
                return Err("four is unlucky".into());
            }
            Ok(())
        });
    assert_eq!(opt.parse_and_validate(&json!("3")).unwrap(), Value::Uint(3));
    assert!(opt.parse_and_validate(&json!(9)).is_err());
    assert!(opt.parse_and_validate(&json!(4)).is_err());
}

#[test]
fn test_check_name_rejects_unregisterable_names() {
    assert!(Opt::int("").check_name().is_err());
    assert!(Opt::int("a.b").check_name().is_err());
    assert!(Opt::int("sp ace").check_name().is_err());
    assert!(Opt::int("ok").with_alias("has.dot").check_name().is_err());
    assert!(Opt::int("max_conn-2").check_name().is_ok());
}
