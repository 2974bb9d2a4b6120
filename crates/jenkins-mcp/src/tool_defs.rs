use serde::Serialize;
use serde_json::{Value, json};

/// MCP tool definition
#[derive(Serialize)]
pub(crate) struct McpToolDef {
    pub name: &'static str,
    pub description: &'static str,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

fn job_name_prop() -> Value {
    json!({
        "type": "string",
        "description": "Job name; folder jobs use slashes, e.g. 'team/service/deploy'"
    })
}

fn build_number_prop() -> Value {
    json!({
        "type": "integer",
        "minimum": 1,
        "description": "Build number"
    })
}

fn job_build_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "job_name": job_name_prop(),
            "build_number": build_number_prop()
        },
        "required": ["job_name", "build_number"]
    })
}

fn job_filter_props() -> serde_json::Map<String, Value> {
    let props = json!({
        "folder": {
            "type": "string",
            "description": "Only list jobs inside this folder"
        },
        "recursive": {
            "type": "boolean",
            "description": "Descend into sub-folders (default false)"
        },
        "status": {
            "type": "string",
            "description": "Last result: success, failure, unstable, aborted, disabled, not_built"
        },
        "building_only": {
            "type": "boolean",
            "description": "Only jobs with a build in progress"
        }
    });
    match props {
        Value::Object(map) => map,
        _ => serde_json::Map::new(),
    }
}

/// All tools exposed over MCP, in listing order.
pub(crate) fn get_tools() -> Vec<McpToolDef> {
    let mut search_job_props = job_filter_props();
    search_job_props.insert(
        "pattern".into(),
        json!({
            "type": "string",
            "description": "Glob (e.g. 'deploy-*') or case-insensitive substring"
        }),
    );

    vec![
        McpToolDef {
            name: "trigger_job",
            description: "Trigger a Jenkins job, optionally with build parameters. Array values \
                          are sent comma-separated (multi-select parameters).",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "job_name": job_name_prop(),
                    "params": {
                        "type": "object",
                        "description": "Build parameters by name"
                    }
                },
                "required": ["job_name"]
            }),
        },
        McpToolDef {
            name: "get_job_info",
            description: "Describe a job: parameters, last builds, queue state",
            input_schema: json!({
                "type": "object",
                "properties": { "job_name": job_name_prop() },
                "required": ["job_name"]
            }),
        },
        McpToolDef {
            name: "get_build_status",
            description: "Result and timing of one build",
            input_schema: job_build_schema(),
        },
        McpToolDef {
            name: "get_console_log",
            description: "Console output of a build, starting at a byte offset. Pass the \
                          returned log_size as start to continue a running build's log.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "job_name": job_name_prop(),
                    "build_number": build_number_prop(),
                    "start": {
                        "type": "integer",
                        "minimum": 0,
                        "description": "Byte offset to read from (default 0)"
                    }
                },
                "required": ["job_name", "build_number"]
            }),
        },
        McpToolDef {
            name: "list_jobs",
            description: "List jobs, optionally scoped to a folder and filtered by status",
            input_schema: json!({
                "type": "object",
                "properties": job_filter_props()
            }),
        },
        McpToolDef {
            name: "search_jobs",
            description: "Find jobs whose full name matches a glob or substring",
            input_schema: json!({
                "type": "object",
                "properties": search_job_props,
                "required": ["pattern"]
            }),
        },
        McpToolDef {
            name: "get_queue_info",
            description: "Items currently waiting in the build queue",
            input_schema: json!({ "type": "object", "properties": {} }),
        },
        McpToolDef {
            name: "server_info",
            description: "Jenkins version and controller settings",
            input_schema: json!({ "type": "object", "properties": {} }),
        },
        McpToolDef {
            name: "get_pipeline_status",
            description: "Stage-by-stage status of a pipeline build",
            input_schema: job_build_schema(),
        },
        McpToolDef {
            name: "list_build_artifacts",
            description: "Artifacts archived by a build",
            input_schema: job_build_schema(),
        },
        McpToolDef {
            name: "download_build_artifact",
            description: "Read a text artifact of a build, up to a size limit",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "job_name": job_name_prop(),
                    "build_number": build_number_prop(),
                    "artifact_path": {
                        "type": "string",
                        "description": "Relative path as reported by list_build_artifacts"
                    },
                    "max_size_mb": {
                        "type": "number",
                        "exclusiveMinimum": 0,
                        "description": "Download limit in MiB (default 1)"
                    }
                },
                "required": ["job_name", "build_number", "artifact_path"]
            }),
        },
        McpToolDef {
            name: "search_build_artifacts",
            description: "Search artifacts of a job's recent builds by name",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "job_name": job_name_prop(),
                    "pattern": {
                        "type": "string",
                        "description": "Glob on the artifact path, or a regex with use_regex"
                    },
                    "max_builds": {
                        "type": "integer",
                        "minimum": 1,
                        "maximum": 50,
                        "description": "How many recent builds to scan (default 10)"
                    },
                    "use_regex": {
                        "type": "boolean",
                        "description": "Treat pattern as a regular expression"
                    }
                },
                "required": ["job_name", "pattern"]
            }),
        },
        McpToolDef {
            name: "batch_trigger_jobs",
            description: "Trigger several jobs as one tracked operation. Lower priority values \
                          run first (1 = highest, 10 = lowest, default 5).",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "operations": {
                        "type": "array",
                        "minItems": 1,
                        "items": {
                            "type": "object",
                            "properties": {
                                "job_name": job_name_prop(),
                                "params": { "type": "object" },
                                "priority": {
                                    "type": "integer",
                                    "minimum": 1,
                                    "maximum": 10
                                }
                            },
                            "required": ["job_name"]
                        }
                    },
                    "max_concurrent": {
                        "type": "integer",
                        "minimum": 1,
                        "description": "Triggers in flight at once (default 5)"
                    },
                    "fail_fast": {
                        "type": "boolean",
                        "description": "Stop dispatching after the first failure"
                    },
                    "wait_for_completion": {
                        "type": "boolean",
                        "description": "Return only once every trigger has finished"
                    }
                },
                "required": ["operations"]
            }),
        },
        McpToolDef {
            name: "batch_monitor_jobs",
            description: "Current state of a batch operation",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "operation_id": { "type": "string", "description": "Operation UUID" }
                },
                "required": ["operation_id"]
            }),
        },
        McpToolDef {
            name: "batch_cancel_jobs",
            description: "Cancel a batch operation. Pending triggers are dropped; with \
                          cancel_running_builds, queued or running builds are stopped on a \
                          best-effort basis.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "operation_id": { "type": "string", "description": "Operation UUID" },
                    "cancel_running_builds": {
                        "type": "boolean",
                        "description": "Also stop builds already handed to Jenkins"
                    }
                },
                "required": ["operation_id"]
            }),
        },
        McpToolDef {
            name: "batch_list_operations",
            description: "Summaries of the batch operations still retained",
            input_schema: json!({ "type": "object", "properties": {} }),
        },
        McpToolDef {
            name: "get_cache_statistics",
            description: "Hit/miss counters and occupancy of every cache tier",
            input_schema: json!({ "type": "object", "properties": {} }),
        },
        McpToolDef {
            name: "clear_cache",
            description: "Drop cached responses: everything, one tier, or one job",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "cache_type": {
                        "type": "string",
                        "enum": ["static", "semi_static", "dynamic", "permanent", "short"]
                    },
                    "job_name": job_name_prop()
                }
            }),
        },
        McpToolDef {
            name: "warm_cache",
            description: "Prefetch common responses (server_info, list_jobs, get_queue_info \
                          by default)",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "operations": {
                        "type": "array",
                        "items": {
                            "type": "string",
                            "enum": ["server_info", "list_jobs", "get_queue_info"]
                        }
                    }
                }
            }),
        },
        McpToolDef {
            name: "summarize_build_log",
            description: "Build an LLM prompt summarizing a build's console log, with the \
                          suggested sampling settings. No model is called.",
            input_schema: job_build_schema(),
        },
    ]
}
