use crate::commands::{load_config, runtime, CommandResult};
use connecthub_db::{connect_with_config, migrations, DemoMarketplace};

pub fn run() -> CommandResult {
    let config = match load_config("seed") {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    let runtime = match runtime("seed") {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    let result = runtime.block_on(async {
        let pool = connect_with_config(&config.database)
            .await
            .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;

        let run_result = async {
            migrations::run_pending(&pool)
                .await
                .map_err(|error| ("migration", error.to_string(), 5u8))?;

            // Rows from a previous seed are replaced, never duplicated.
            DemoMarketplace::clean(&pool)
                .await
                .map_err(|error| ("seed_execution", error.to_string(), 5u8))?;
            let seeded = DemoMarketplace::load(&pool)
                .await
                .map_err(|error| ("seed_execution", error.to_string(), 5u8))?;

            let verification = DemoMarketplace::verify(&pool)
                .await
                .map_err(|error| ("seed_verification", error.to_string(), 6u8))?;
            if !verification.all_present {
                let failed = verification
                    .checks
                    .iter()
                    .filter_map(|(check, passed)| (!passed).then_some(*check))
                    .collect::<Vec<_>>();
                return Err(("seed_verification", verification_failure_message(&failed), 6u8));
            }

            Ok::<_, (&'static str, String, u8)>(seeded.tables_seeded)
        }
        .await;

        pool.close().await;
        run_result
    });

    match result {
        Ok(tables) => CommandResult::success("seed", summary_message(&tables)),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("seed", error_class, message, exit_code)
        }
    }
}

fn summary_message(tables: &[(&str, i64)]) -> String {
    let lines = tables
        .iter()
        .map(|(table, rows)| format!("  - {table}: {rows}"))
        .collect::<Vec<_>>();
    format!(
        "demo marketplace loaded (owner `{}`, customer `{}`):\n{}",
        DemoMarketplace::OWNER_ID,
        DemoMarketplace::CUSTOMER_ID,
        lines.join("\n")
    )
}

fn verification_failure_message(failed_checks: &[&str]) -> String {
    if failed_checks.is_empty() {
        "some demo rows failed to load".to_string()
    } else {
        format!("seed verification failed for checks: {}", failed_checks.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::{summary_message, verification_failure_message};

    #[test]
    fn verification_error_message_targets_failed_checks() {
        assert_eq!(
            verification_failure_message(&["reviews", "qr-demo-quoted"]),
            "seed verification failed for checks: reviews, qr-demo-quoted"
        );
    }

    #[test]
    fn verification_error_message_falls_back_to_generic_when_no_labels() {
        assert_eq!(verification_failure_message(&[]), "some demo rows failed to load");
    }

    #[test]
    fn summary_lists_every_table() {
        let message = summary_message(&[("businesses", 4), ("messages", 3)]);

        assert!(message.starts_with("demo marketplace loaded (owner `owner-demo-001`"));
        assert!(message.contains("  - businesses: 4\n  - messages: 3"));
    }
}
