use std::sync::Arc;

use serde_json::Value;

use jmcp_client::ScriptedClient;
use jmcp_config::AppConfig;
use jmcp_core::models::{BuildStatus, JobInfo, JobParameter};

use crate::app::App;

pub(crate) fn scripted_app() -> (App, Arc<ScriptedClient>) {
    scripted_app_with(AppConfig::default())
}

pub(crate) fn scripted_app_with(config: AppConfig) -> (App, Arc<ScriptedClient>) {
    let client = Arc::new(ScriptedClient::new());
    let app = App::with_client(config, client.clone()).expect("default config is valid");
    (app, client)
}

pub(crate) fn job(name: &str) -> JobInfo {
    JobInfo {
        name: name.to_string(),
        url: Some(format!("http://jenkins.test/job/{name}/")),
        description: Some(format!("{name} pipeline")),
        buildable: true,
        in_queue: false,
        parameters: vec![JobParameter {
            name: "BRANCH".into(),
            param_type: "StringParameterDefinition".into(),
            default_value: Some(Value::String("main".into())),
            description: None,
            choices: None,
        }],
        last_build_number: Some(42),
        last_completed_build_number: Some(41),
    }
}

pub(crate) fn build(job_name: &str, number: u64, status: &str, building: bool) -> BuildStatus {
    BuildStatus {
        job_name: job_name.to_string(),
        build_number: number,
        status: status.to_string(),
        building,
        timestamp: Some(1_700_000_000_000),
        duration: if building { None } else { Some(61_000) },
        url: Some(format!("http://jenkins.test/job/{job_name}/{number}/")),
    }
}
