use connecthub_core::config::{AppConfig, LoadOptions};
use connecthub_db::{connect_with_config, migrations::MIGRATOR, DbPool};
use serde::Serialize;

use crate::commands::CommandResult;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Warn,
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

pub fn run(json_output: bool) -> CommandResult {
    let report = build_report();
    let exit_code = if report.overall_status == CheckStatus::Fail { 1 } else { 0 };

    let output = if json_output {
        serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        })
    } else {
        render_human(&report)
    };

    CommandResult { exit_code, output }
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
            checks.push(check_gateway_secret(&config));
            checks.extend(check_database(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            for name in ["gateway_secret", "database_connectivity", "schema_migrations"] {
                checks.push(DoctorCheck {
                    name,
                    status: CheckStatus::Skipped,
                    details: "skipped because configuration did not load".to_string(),
                });
            }
        }
    }

    let overall_status = overall(&checks);
    let summary = match overall_status {
        CheckStatus::Pass => "doctor: all readiness checks passed".to_string(),
        CheckStatus::Warn => "doctor: ready with warnings".to_string(),
        _ => "doctor: one or more readiness checks failed".to_string(),
    };

    DoctorReport { overall_status, summary, checks }
}

fn overall(checks: &[DoctorCheck]) -> CheckStatus {
    if checks.iter().any(|check| matches!(check.status, CheckStatus::Fail | CheckStatus::Skipped)) {
        CheckStatus::Fail
    } else if checks.iter().any(|check| check.status == CheckStatus::Warn) {
        CheckStatus::Warn
    } else {
        CheckStatus::Pass
    }
}

/// Without a shared secret every caller that can reach the port may claim any `x-user-id`.
fn check_gateway_secret(config: &AppConfig) -> DoctorCheck {
    match config.auth.gateway_secret {
        Some(_) => DoctorCheck {
            name: "gateway_secret",
            status: CheckStatus::Pass,
            details: "identity headers require a matching x-gateway-secret".to_string(),
        },
        None => DoctorCheck {
            name: "gateway_secret",
            status: CheckStatus::Warn,
            details: "auth.gateway_secret is unset; x-user-id is trusted as sent".to_string(),
        },
    }
}

fn check_database(config: &AppConfig) -> Vec<DoctorCheck> {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return vec![
                DoctorCheck {
                    name: "database_connectivity",
                    status: CheckStatus::Fail,
                    details: format!("failed to initialize async runtime: {error}"),
                },
                skipped_schema_check(),
            ];
        }
    };

    runtime.block_on(async {
        let pool = match connect_with_config(&config.database).await {
            Ok(pool) => pool,
            Err(error) => {
                return vec![
                    DoctorCheck {
                        name: "database_connectivity",
                        status: CheckStatus::Fail,
                        details: format!("failed to connect to database: {error}"),
                    },
                    skipped_schema_check(),
                ];
            }
        };

        let checks = vec![
            DoctorCheck {
                name: "database_connectivity",
                status: CheckStatus::Pass,
                details: format!("connected using `{}`", config.database.url),
            },
            check_schema(&pool).await,
        ];
        pool.close().await;
        checks
    })
}

async fn check_schema(pool: &DbPool) -> DoctorCheck {
    let expected = MIGRATOR.iter().count() as i64;
    // A fresh database has no migration table yet; that reads as zero applied.
    let applied = count_applied_migrations(pool).await.unwrap_or(0);

    if applied >= expected {
        DoctorCheck {
            name: "schema_migrations",
            status: CheckStatus::Pass,
            details: format!("{applied} of {expected} migrations applied"),
        }
    } else {
        DoctorCheck {
            name: "schema_migrations",
            status: CheckStatus::Fail,
            details: format!(
                "{applied} of {expected} migrations applied; run `connecthub migrate`"
            ),
        }
    }
}

async fn count_applied_migrations(pool: &DbPool) -> Option<i64> {
    sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM _sqlx_migrations WHERE success = 1")
        .fetch_one(pool)
        .await
        .ok()
}

fn skipped_schema_check() -> DoctorCheck {
    DoctorCheck {
        name: "schema_migrations",
        status: CheckStatus::Skipped,
        details: "skipped because the database is unreachable".to_string(),
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Warn => "warn",
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

#[cfg(test)]
mod tests {
    use super::{overall, render_human, CheckStatus, DoctorCheck, DoctorReport};

    fn check(status: CheckStatus) -> DoctorCheck {
        DoctorCheck { name: "sample", status, details: "details".to_string() }
    }

    #[test]
    fn warnings_do_not_fail_the_report() {
        assert_eq!(overall(&[check(CheckStatus::Pass), check(CheckStatus::Warn)]), CheckStatus::Warn);
        assert_eq!(overall(&[check(CheckStatus::Pass)]), CheckStatus::Pass);
    }

    #[test]
    fn skipped_checks_fail_the_report() {
        assert_eq!(
            overall(&[check(CheckStatus::Fail), check(CheckStatus::Skipped)]),
            CheckStatus::Fail
        );
    }

    #[test]
    fn human_output_marks_each_check() {
        let report = DoctorReport {
            overall_status: CheckStatus::Warn,
            summary: "doctor: ready with warnings".to_string(),
            checks: vec![check(CheckStatus::Warn)],
        };

        assert_eq!(render_human(&report), "doctor: ready with warnings\n- [warn] sample: details");
    }
}
