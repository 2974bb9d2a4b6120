use serde_json::{Value, json};
use tracing::{info, warn};

use jmcp_cache::{GLOBAL_SCOPE, cache_key};
use jmcp_core::CacheTier;

use super::ToolResult;
use crate::app::App;

pub(super) async fn get_queue_info(app: &App) -> ToolResult {
    let client = app.client.as_ref();
    let items = app
        .cached_read(
            &[CacheTier::Short],
            &cache_key("queue", GLOBAL_SCOPE, &[]),
            move || client.get_queue(),
            |_| CacheTier::Short,
        )
        .await?;
    let count = items.as_array().map_or(0, Vec::len);
    Ok(json!({ "items": items, "count": count }))
}

pub(super) async fn server_info(app: &App) -> ToolResult {
    let client = app.client.as_ref();
    let info = app
        .cached_read(
            &[CacheTier::Static],
            &cache_key("server_info", GLOBAL_SCOPE, &[]),
            move || client.get_server_info(),
            |_| CacheTier::Static,
        )
        .await?;
    Ok(info)
}

/// Body of the `status://health` resource. Bypasses cache and retries: a
/// single live call that must come back from something reporting a Jenkins
/// version.
pub(crate) async fn health_check(app: &App) -> Value {
    match app.client.get_server_info().await {
        Ok(info) if info.version.is_some() => {
            info!(version = ?info.version, "health check ok");
            json!({ "status": "ok", "version": info.version })
        }
        Ok(_) => {
            warn!("health check: endpoint did not identify as Jenkins");
            json!({
                "status": "error",
                "details": "Endpoint did not respond like a Jenkins instance."
            })
        }
        Err(e) => {
            warn!(error = %e, "health check failed");
            json!({
                "status": "error",
                "details": format!("Failed to connect to Jenkins: {e}")
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::test_support::scripted_app;
    use jmcp_client::ClientCall;
    use jmcp_core::models::{QueueItem, ServerInfo};
    use jmcp_core::{UpstreamError, UpstreamErrorKind};

    #[tokio::test]
    async fn test_server_info_cached_in_static_tier() {
        let (app, client) = scripted_app();
        let first = server_info(&app).await.unwrap();
        let second = server_info(&app).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first["version"], "2.440.3");
        assert_eq!(client.count_calls(|c| *c == ClientCall::GetServerInfo), 1);
        assert_eq!(app.cache.tier_stats(CacheTier::Static).size, 1);
    }

    #[tokio::test]
    async fn test_queue_info_lists_items() {
        let (app, client) = scripted_app();
        client.set_queue(vec![QueueItem {
            id: 12,
            job_name: Some("deploy".into()),
            why: Some("Waiting for next available executor".into()),
            blocked: false,
            stuck: false,
            in_queue_since: Some(1_700_000_000_000),
            url: Some("queue/item/12/".into()),
        }]);
        let result = get_queue_info(&app).await.unwrap();
        assert_eq!(result["count"], 1);
        assert_eq!(result["items"][0]["job_name"], "deploy");
    }

    #[tokio::test]
    async fn test_health_requires_version_header() {
        let (app, client) = scripted_app();
        assert_eq!(health_check(&app).await["status"], "ok");

        client.set_server_info(ServerInfo {
            version: None,
            url: "http://proxy.test/".into(),
            mode: None,
            num_executors: None,
            quieting_down: false,
        });
        let body = health_check(&app).await;
        assert_eq!(body["status"], "error");
    }

    #[tokio::test]
    async fn test_health_reports_connection_failure_without_retry() {
        let (app, client) = scripted_app();
        client.fail_next(
            "get_server_info",
            "*",
            UpstreamError::new(UpstreamErrorKind::Connect, "get_server_info", "refused"),
        );
        let body = health_check(&app).await;
        assert_eq!(body["status"], "error");
        assert!(
            body["details"]
                .as_str()
                .unwrap()
                .starts_with("Failed to connect to Jenkins")
        );
        assert_eq!(client.count_calls(|c| *c == ClientCall::GetServerInfo), 1);
    }
}
