use crate::commands::CommandResult;
use crewflow_core::config::{AppConfig, LoadOptions};
use crewflow_db::{connect, migrations, BaselineSeedDataset};

pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "seed",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                "seed",
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            );
        }
    };

    let result = runtime.block_on(async {
        let pool = connect(&config.database)
            .await
            .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;

        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), 5u8))?;

        let seeded = BaselineSeedDataset::load(&pool)
            .await
            .map_err(|error| ("seed_load", error.to_string(), 6u8))?;

        let verification = BaselineSeedDataset::verify(&pool)
            .await
            .map_err(|error| ("seed_verify", error.to_string(), 7u8))?;
        if !verification.all_present {
            let failed: Vec<&str> = verification
                .checks
                .iter()
                .filter(|(_, passed)| !passed)
                .map(|(label, _)| *label)
                .collect();
            return Err((
                "seed_contract",
                format!("seed verification failed for: {}", failed.join(", ")),
                8u8,
            ));
        }

        pool.close().await;
        Ok::<_, (&'static str, String, u8)>(seeded)
    });

    match result {
        Ok(seeded) => CommandResult::success(
            "seed",
            format!(
                "seeded {} workflow configs, {} users, {} employees",
                seeded.config_kinds.len(),
                seeded.user_ids.len(),
                seeded.employee_ids.len()
            ),
        ),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("seed", error_class, message, exit_code)
        }
    }
}
