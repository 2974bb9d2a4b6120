use super::*;
use crate::tools::test_support::{job, scripted_app};
use jmcp_client::ClientCall;
use jmcp_core::UpstreamErrorKind;

fn summary(full_name: &str, color: Option<&str>, is_folder: bool) -> JobSummary {
    JobSummary {
        name: full_name.rsplit('/').next().unwrap().to_string(),
        full_name: full_name.to_string(),
        url: None,
        color: color.map(String::from),
        is_folder,
    }
}

#[tokio::test]
async fn test_trigger_job_normalizes_params() {
    let (app, client) = scripted_app();
    let result = trigger_job(
        &app,
        json!({
            "job_name": "deploy",
            "params": {"TARGETS": ["linux", "mac"], "DRY_RUN": false, "TAG": null}
        }),
    )
    .await
    .unwrap();

    assert_eq!(result["status"], "Triggered");
    assert_eq!(result["queue_url"], "http://jenkins.test/queue/item/1/");
    assert_eq!(
        result["processed_params"],
        json!({"DRY_RUN": "false", "TARGETS": "linux,mac"})
    );
    let sent = client.calls();
    match &sent[0] {
        ClientCall::TriggerJob { params, .. } => assert_eq!(params["TARGETS"], "linux,mac"),
        other => panic!("unexpected call {other:?}"),
    }
}

#[tokio::test]
async fn test_trigger_job_accepts_camel_case_name() {
    let (app, client) = scripted_app();
    trigger_job(&app, json!({"jobName": "team/build"})).await.unwrap();
    assert_eq!(client.trigger_order(), vec!["team/build".to_string()]);
}

#[tokio::test]
async fn test_trigger_job_rejects_empty_name_without_calling_upstream() {
    let (app, client) = scripted_app();
    let err = trigger_job(&app, json!({"job_name": "  "})).await.unwrap_err();
    assert_eq!(err.kind(), "validation_error");
    assert!(client.calls().is_empty());
}

#[tokio::test]
async fn test_trigger_job_timeout_is_not_retried() {
    let (app, client) = scripted_app();
    client.fail_times("trigger_job", "deploy", UpstreamErrorKind::Timeout, 1);

    let err = trigger_job(&app, json!({"job_name": "deploy"}))
        .await
        .unwrap_err();
    assert_eq!(err.attempts(), Some(1));
    assert_eq!(client.count_calls(|c| c.is_trigger_of("deploy")), 1);
}

#[tokio::test(start_paused = true)]
async fn test_trigger_job_retries_service_unavailable() {
    let (app, client) = scripted_app();
    client.fail_times("trigger_job", "deploy", UpstreamErrorKind::Status(503), 2);

    let result = trigger_job(&app, json!({"job_name": "deploy"}))
        .await
        .unwrap();
    assert_eq!(result["attempts"], 3);
}

#[tokio::test]
async fn test_trigger_job_invalidates_dynamic_entries_of_that_job_only() {
    let (app, _client) = scripted_app();
    app.cache
        .put(CacheTier::Dynamic, cache_key("build_status", "deploy", &["7"]), json!(1));
    app.cache
        .put(CacheTier::Dynamic, cache_key("build_status", "deploy-docs", &["7"]), json!(2));
    app.cache
        .put(CacheTier::SemiStatic, cache_key("job_info", "deploy", &[]), json!(3));

    trigger_job(&app, json!({"job_name": "deploy"})).await.unwrap();

    let key = cache_key("build_status", "deploy", &["7"]);
    assert!(app.cache.get(CacheTier::Dynamic, &key).is_none());
    let other = cache_key("build_status", "deploy-docs", &["7"]);
    assert!(app.cache.get(CacheTier::Dynamic, &other).is_some());
    let info = cache_key("job_info", "deploy", &[]);
    assert!(app.cache.get(CacheTier::SemiStatic, &info).is_some());
}

#[tokio::test]
async fn test_get_job_info_is_served_from_cache() {
    let (app, client) = scripted_app();
    client.add_job(job("deploy"));

    let first = get_job_info(&app, json!({"job_name": "deploy"})).await.unwrap();
    let second = get_job_info(&app, json!({"job_name": "deploy"})).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(first["parameters"][0]["name"], "BRANCH");
    assert_eq!(
        client.count_calls(|c| matches!(c, ClientCall::GetJobInfo(_))),
        1
    );
    assert_eq!(app.cache.tier_stats(CacheTier::SemiStatic).hits, 1);
}

#[tokio::test]
async fn test_get_job_info_not_found_is_permanent() {
    let (app, client) = scripted_app();
    let err = get_job_info(&app, json!({"job_name": "ghost"}))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "permanent_upstream_error");
    assert_eq!(err.attempts(), Some(1));
    assert_eq!(client.calls().len(), 1);
}

#[tokio::test]
async fn test_list_jobs_reports_status_and_count() {
    let (app, client) = scripted_app();
    client.add_job_summary(summary("api", Some("blue"), false));
    client.add_job_summary(summary("web", Some("red_anime"), false));

    let result = list_jobs(&app, json!({})).await.unwrap();
    assert_eq!(result["count"], 2);
    assert_eq!(result["jobs"][1]["status"], "failure");
    assert_eq!(result["jobs"][1]["building"], true);

    let building = list_jobs(&app, json!({"building_only": true})).await.unwrap();
    assert_eq!(building["count"], 1);
    assert_eq!(building["jobs"][0]["full_name"], "web");
}

#[tokio::test]
async fn test_list_jobs_cache_key_depends_on_filter() {
    let (app, client) = scripted_app();
    client.add_job_summary(summary("api", Some("blue"), false));

    list_jobs(&app, json!({})).await.unwrap();
    list_jobs(&app, json!({})).await.unwrap();
    list_jobs(&app, json!({"status": "failure"})).await.unwrap();

    assert_eq!(
        client.count_calls(|c| matches!(c, ClientCall::ListJobs(_))),
        2
    );
}

#[tokio::test]
async fn test_search_jobs_glob_and_substring() {
    let (app, client) = scripted_app();
    client.add_job_summary(summary("team", None, true));
    client.add_job_summary(summary("team/deploy-api", Some("blue"), false));
    client.add_job_summary(summary("team/deploy-web", Some("blue"), false));
    client.add_job_summary(summary("team/Lint", Some("blue"), false));

    let globbed = search_jobs(&app, json!({"pattern": "deploy-*"})).await.unwrap();
    assert_eq!(globbed["count"], 2);

    let substring = search_jobs(&app, json!({"pattern": "lint"})).await.unwrap();
    assert_eq!(substring["count"], 1);
    assert_eq!(substring["jobs"][0]["full_name"], "team/Lint");
}

#[tokio::test]
async fn test_search_jobs_rejects_bad_pattern() {
    let (app, client) = scripted_app();
    let err = search_jobs(&app, json!({"pattern": "[unclosed"}))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "validation_error");
    assert!(client.calls().is_empty());
}
