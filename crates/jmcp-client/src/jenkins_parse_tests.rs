use super::*;
use serde_json::json;

#[test]
fn test_job_info_extracts_parameter_definitions() {
    let data = json!({
        "url": "https://ci/job/deploy/",
        "description": "",
        "buildable": true,
        "inQueue": false,
        "lastBuild": {"number": 12},
        "lastCompletedBuild": {"number": 11},
        "property": [
            {"_class": "jenkins.model.BuildDiscarderProperty"},
            {
                "_class": "hudson.model.ParametersDefinitionProperty",
                "parameterDefinitions": [
                    {
                        "name": "BRANCH",
                        "type": "StringParameterDefinition",
                        "defaultParameterValue": {"value": "main"},
                        "description": "Branch to build"
                    },
                    {
                        "name": "ENV",
                        "type": "ChoiceParameterDefinition",
                        "defaultParameterValue": {"value": "staging"},
                        "choices": ["staging", "prod"]
                    }
                ]
            }
        ]
    });

    let info = parse_job_info("deploy", &data);
    assert_eq!(info.name, "deploy");
    assert!(info.buildable);
    assert_eq!(info.description, None);
    assert_eq!(info.last_build_number, Some(12));
    assert_eq!(info.last_completed_build_number, Some(11));
    assert_eq!(info.parameters.len(), 2);
    assert_eq!(info.parameters[0].name, "BRANCH");
    assert_eq!(info.parameters[0].default_value, Some(json!("main")));
    assert_eq!(info.parameters[0].description.as_deref(), Some("Branch to build"));
    assert_eq!(
        info.parameters[1].choices.as_deref(),
        Some(&["staging".to_string(), "prod".to_string()][..])
    );
}

#[test]
fn test_job_info_without_parameters() {
    let info = parse_job_info("plain", &json!({"buildable": false}));
    assert!(info.parameters.is_empty());
    assert!(!info.buildable);
    assert_eq!(info.last_build_number, None);
}

#[test]
fn test_build_status_result_or_building() {
    let done = parse_build_status("deploy", 3, &json!({"result": "FAILURE", "building": false}));
    assert_eq!(done.status, "FAILURE");
    assert!(done.is_final());

    let running = parse_build_status("deploy", 4, &json!({"result": null, "building": true}));
    assert_eq!(running.status, "BUILDING");
    assert!(!running.is_final());

    let odd = parse_build_status("deploy", 5, &json!({}));
    assert_eq!(odd.status, "UNKNOWN");
}

#[test]
fn test_job_list_marks_folders_and_builds_full_names() {
    let data = json!({
        "jobs": [
            {"_class": "hudson.model.FreeStyleProject", "name": "api", "color": "blue"},
            {"_class": "com.cloudbees.hudson.plugins.folder.Folder", "name": "nested"},
            {"name": "explicit", "fullName": "team/explicit", "color": "red_anime"}
        ]
    });
    let jobs = parse_job_list("team", &data);
    assert_eq!(jobs.len(), 3);
    assert_eq!(jobs[0].full_name, "team/api");
    assert!(!jobs[0].is_folder);
    assert!(jobs[1].is_folder);
    assert_eq!(jobs[2].full_name, "team/explicit");
    assert!(jobs[2].is_building());

    let root = parse_job_list("", &json!({"jobs": [{"name": "top"}]}));
    assert_eq!(root[0].full_name, "top");
}

#[test]
fn test_pipeline_stages() {
    let data = json!({
        "status": "IN_PROGRESS",
        "stages": [
            {"id": "6", "name": "Build", "status": "SUCCESS", "durationMillis": 1200},
            {"id": 9, "name": "Test", "status": "IN_PROGRESS"}
        ]
    });
    let pipeline = parse_pipeline("deploy", 8, &data);
    assert_eq!(pipeline.stages.len(), 2);
    assert_eq!(pipeline.stages[1].id, "9");
    assert_eq!(pipeline.stages[0].duration_millis, Some(1200));
    assert!(!pipeline.is_final());
}

#[test]
fn test_artifacts_skip_incomplete_entries() {
    let data = json!({
        "artifacts": [
            {"fileName": "app.jar", "relativePath": "target/app.jar"},
            {"fileName": "broken"}
        ]
    });
    let artifacts = parse_artifacts(&data);
    assert_eq!(artifacts.len(), 1);
    assert_eq!(artifacts[0].relative_path, "target/app.jar");
}

#[test]
fn test_queue_items() {
    let data = json!({
        "items": [
            {
                "id": 42,
                "task": {"name": "deploy"},
                "why": "Waiting for next available executor",
                "blocked": false,
                "stuck": true,
                "inQueueSince": 1700000000000_i64,
                "url": "queue/item/42/"
            }
        ]
    });
    let items = parse_queue(&data);
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].job_name.as_deref(), Some("deploy"));
    assert!(items[0].stuck);
}

#[test]
fn test_server_info_prefers_header_version() {
    let data = json!({"mode": "NORMAL", "numExecutors": 4, "quietingDown": false});
    let info = parse_server_info("https://ci", Some("2.440".into()), &data);
    assert_eq!(info.version.as_deref(), Some("2.440"));
    assert_eq!(info.num_executors, Some(4));

    let fallback = parse_server_info("https://ci", None, &json!({"jenkinsVersion": "2.1"}));
    assert_eq!(fallback.version.as_deref(), Some("2.1"));
}

#[test]
fn test_builds_respect_limit() {
    let data = json!({"builds": [{"number": 9}, {"number": 8}, {"number": 7}]});
    let builds = parse_builds(&data, 2);
    assert_eq!(
        builds.iter().map(|b| b.number).collect::<Vec<_>>(),
        vec![9, 8]
    );
}

#[test]
fn test_queue_item_executable() {
    assert_eq!(
        queue_item_executable(&json!({"executable": {"number": 31}})),
        Some(31)
    );
    assert_eq!(queue_item_executable(&json!({"executable": null})), None);
}

#[test]
fn test_queue_item_id_from_url() {
    assert_eq!(queue_item_id("https://ci/queue/item/42/"), Some(42));
    assert_eq!(queue_item_id("https://ci/queue/item/7"), Some(7));
    assert_eq!(queue_item_id("https://ci/job/deploy/42/"), None);
    assert_eq!(queue_item_id("nonsense"), None);
}
