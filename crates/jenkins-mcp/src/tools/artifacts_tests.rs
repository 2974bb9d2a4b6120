use super::*;
use crate::tools::test_support::{build, scripted_app};
use jmcp_client::ClientCall;

#[tokio::test]
async fn test_list_build_artifacts_cached_permanently() {
    let (app, client) = scripted_app();
    client.add_artifact("deploy", 4, "target/app.jar", "PK");
    client.add_artifact("deploy", 4, "reports/junit.xml", "<testsuite/>");

    let first = list_build_artifacts(&app, json!({"job_name": "deploy", "build_number": 4}))
        .await
        .unwrap();
    list_build_artifacts(&app, json!({"job_name": "deploy", "build_number": 4}))
        .await
        .unwrap();

    assert_eq!(first["count"], 2);
    assert_eq!(first["artifacts"][1]["file_name"], "junit.xml");
    assert_eq!(
        client.count_calls(|c| matches!(c, ClientCall::ListArtifacts(..))),
        1
    );
    assert_eq!(app.cache.tier_stats(CacheTier::Permanent).size, 1);
}

#[tokio::test]
async fn test_download_artifact_returns_text() {
    let (app, client) = scripted_app();
    client.add_artifact("deploy", 4, "reports/summary.txt", "all green\n");

    let result = download_build_artifact(
        &app,
        json!({
            "job_name": "deploy",
            "build_number": 4,
            "artifact_path": "reports/summary.txt"
        }),
    )
    .await
    .unwrap();
    assert_eq!(result["content"], "all green\n");
    assert_eq!(result["truncated"], false);
    assert_eq!(result["build_number"], 4);
}

#[tokio::test]
async fn test_download_artifact_size_limit_validated() {
    let (app, client) = scripted_app();
    for bad in [json!(0), json!(-1.5), json!(500)] {
        let err = download_build_artifact(
            &app,
            json!({
                "job_name": "deploy",
                "build_number": 4,
                "artifact_path": "a.txt",
                "max_size_mb": bad
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind(), "validation_error");
    }
    assert!(client.calls().is_empty());
}

#[test]
fn test_max_bytes_converts_megabytes() {
    assert_eq!(max_bytes(None).unwrap(), 1024 * 1024);
    assert_eq!(max_bytes(Some(0.5)).unwrap(), 512 * 1024);
}

#[tokio::test]
async fn test_search_artifacts_across_recent_builds() {
    let (app, client) = scripted_app();
    for number in [1, 2, 3] {
        client.set_build_status(build("deploy", number, "SUCCESS", false));
        client.add_artifact("deploy", number, "target/app.jar", "PK");
        client.add_artifact("deploy", number, "logs/build.log", "ok");
    }

    let result = search_build_artifacts(
        &app,
        json!({"job_name": "deploy", "pattern": "*.jar", "max_builds": 2}),
    )
    .await
    .unwrap();

    assert_eq!(result["count"], 2);
    assert_eq!(result["matches"][0]["build_number"], 3);
    assert_eq!(result["matches"][1]["build_number"], 2);
    assert_eq!(result["matches"][0]["relative_path"], "target/app.jar");
}

#[tokio::test]
async fn test_search_artifacts_with_regex() {
    let (app, client) = scripted_app();
    client.set_build_status(build("deploy", 1, "SUCCESS", false));
    client.add_artifact("deploy", 1, "dist/app-1.2.0.tar.gz", "x");
    client.add_artifact("deploy", 1, "dist/app-latest.tar.gz", "x");

    let result = search_build_artifacts(
        &app,
        json!({"jobName": "deploy", "pattern": r"app-\d+\.\d+\.\d+", "useRegex": true}),
    )
    .await
    .unwrap();
    assert_eq!(result["count"], 1);
    assert_eq!(result["matches"][0]["file_name"], "app-1.2.0.tar.gz");
}

#[tokio::test]
async fn test_search_artifacts_rejects_invalid_input() {
    let (app, client) = scripted_app();
    let bad_regex = search_build_artifacts(
        &app,
        json!({"job_name": "deploy", "pattern": "(", "use_regex": true}),
    )
    .await
    .unwrap_err();
    assert_eq!(bad_regex.kind(), "validation_error");

    let too_many = search_build_artifacts(
        &app,
        json!({"job_name": "deploy", "pattern": "*", "max_builds": 51}),
    )
    .await
    .unwrap_err();
    assert_eq!(too_many.kind(), "validation_error");
    assert!(client.calls().is_empty());
}
