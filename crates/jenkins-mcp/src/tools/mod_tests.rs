use super::*;
use crate::tools::test_support::scripted_app;

#[derive(serde::Deserialize, Debug)]
struct FlagArgs {
    #[serde(default)]
    flag: bool,
}

#[test]
fn test_missing_arguments_parse_as_empty_object() {
    let flags: FlagArgs = parse_args(Value::Null).unwrap();
    assert!(!flags.flag);
}

#[test]
fn test_wrong_argument_type_is_validation_error() {
    let err = parse_args::<FlagArgs>(json!({"flag": "yes"})).unwrap_err();
    assert_eq!(err.kind(), "validation_error");
}

#[test]
fn test_error_payload_includes_attempts_only_for_upstream() {
    let upstream = AppError::TransientUpstream {
        operation: "list_jobs".into(),
        attempts: 4,
        message: "timed out".into(),
    };
    let body = error_payload(&upstream);
    assert_eq!(body["error"]["kind"], "transient_upstream_error");
    assert_eq!(body["error"]["attempts"], 4);

    let body = error_payload(&AppError::validation("bad"));
    assert_eq!(body["error"]["message"], "Invalid input: bad");
    assert!(body["error"].get("attempts").is_none());
}

#[test]
fn test_tool_content_marks_errors() {
    let ok = tool_content(&json!({"a": 1}), false);
    assert_eq!(ok["content"][0]["type"], "text");
    assert!(ok.get("isError").is_none());

    let failed = tool_content(&json!({"error": {}}), true);
    assert_eq!(failed["isError"], true);
    let text = failed["content"][0]["text"].as_str().unwrap();
    assert!(serde_json::from_str::<Value>(text).is_ok());
}

#[tokio::test]
async fn test_unknown_tool_is_none() {
    let (app, _client) = scripted_app();
    assert!(call_tool(&app, "rm_rf", Value::Null).await.is_none());
}

#[tokio::test]
async fn test_every_listed_tool_is_dispatched() {
    let (app, _client) = scripted_app();
    for tool in crate::tool_defs::get_tools() {
        // Empty arguments either succeed or fail validation/upstream, but the
        // name must be known.
        let outcome = call_tool(&app, tool.name, json!({})).await;
        assert!(outcome.is_some(), "{} is listed but not dispatched", tool.name);
    }
}

#[test]
fn test_build_args_accept_camel_case_and_reject_build_zero() {
    let args: BuildArgs = parse_args(json!({"jobName": "team/app", "buildNumber": 3})).unwrap();
    assert_eq!(args.job_name, "team/app");
    assert!(validate_build(&args.job_name, args.build_number).is_ok());

    let err = validate_build("team/app", 0).unwrap_err();
    assert_eq!(err.kind(), "validation_error");
    assert!(validate_build("", 3).is_err());
}
