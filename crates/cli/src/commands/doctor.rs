use crewflow_core::config::{AppConfig, LoadOptions};
use crewflow_core::domain::request::RequestKind;
use crewflow_db::repositories::{SqlWorkflowConfigRepository, WorkflowConfigRepository};
use crewflow_db::connect;
use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(json_output: bool) -> String {
    let report = build_report();

    if json_output {
        return serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        });
    }

    render_human(&report)
}

fn build_report() -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });
            checks.extend(database_checks(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            checks.push(DoctorCheck {
                name: "database_connectivity",
                status: CheckStatus::Skipped,
                details: "skipped because configuration did not load".to_string(),
            });
            checks.push(DoctorCheck {
                name: "workflow_config_presence",
                status: CheckStatus::Skipped,
                details: "skipped because configuration did not load".to_string(),
            });
        }
    }

    let all_pass = checks.iter().all(|check| check.status == CheckStatus::Pass);
    let overall_status = if all_pass { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_pass {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn database_checks(config: &AppConfig) -> Vec<DoctorCheck> {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return vec![DoctorCheck {
                name: "database_connectivity",
                status: CheckStatus::Fail,
                details: format!("failed to initialize async runtime: {error}"),
            }];
        }
    };

    runtime.block_on(async {
        let mut checks = Vec::new();

        let pool = match connect(&config.database).await {
            Ok(pool) => {
                checks.push(DoctorCheck {
                    name: "database_connectivity",
                    status: CheckStatus::Pass,
                    details: format!("connected using `{}`", config.database.url),
                });
                pool
            }
            Err(error) => {
                checks.push(DoctorCheck {
                    name: "database_connectivity",
                    status: CheckStatus::Fail,
                    details: format!("failed to connect to database: {error}"),
                });
                checks.push(DoctorCheck {
                    name: "workflow_config_presence",
                    status: CheckStatus::Skipped,
                    details: "skipped because the database is unreachable".to_string(),
                });
                return checks;
            }
        };

        let repo = SqlWorkflowConfigRepository::new(pool.clone());
        let mut configured = 0usize;
        let mut query_error = None;
        for kind in RequestKind::ALL {
            match repo.get(kind).await {
                Ok(Some(_)) => configured += 1,
                Ok(None) => {}
                Err(error) => {
                    query_error = Some(error.to_string());
                    break;
                }
            }
        }

        checks.push(match query_error {
            Some(error) => DoctorCheck {
                name: "workflow_config_presence",
                status: CheckStatus::Fail,
                details: format!("could not query workflow_config (migrations pending?): {error}"),
            },
            None if configured > 0 => DoctorCheck {
                name: "workflow_config_presence",
                status: CheckStatus::Pass,
                details: format!("{configured} workflow configuration(s) present"),
            },
            None => DoctorCheck {
                name: "workflow_config_presence",
                status: CheckStatus::Fail,
                details: "no workflow configurations found; run `crewflow seed` or configure kinds"
                    .to_string(),
            },
        });

        pool.close().await;
        checks
    })
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
