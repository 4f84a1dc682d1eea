use crate::commands::CommandResult;
use crewflow_core::config::{AppConfig, LoadOptions};
use crewflow_db::migrations::MigrationRun;
use crewflow_db::{connect, migrations};

pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "migrate",
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
                "migrate",
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            );
        }
    };

    match runtime.block_on(apply(&config)) {
        Ok(run) => CommandResult::success("migrate", describe(&run)),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("migrate", error_class, message, exit_code)
        }
    }
}

async fn apply(config: &AppConfig) -> Result<MigrationRun, (&'static str, String, u8)> {
    let pool = connect(&config.database).await.map_err(|error| {
        ("db_connect", format!("cannot open `{}`: {error}", config.database.url), 4u8)
    })?;

    let run = migrations::run_pending(&pool)
        .await
        .map_err(|error| ("migration_apply", error.to_string(), 5u8))?;

    pool.close().await;
    Ok(run)
}

fn describe(run: &MigrationRun) -> String {
    let version = match run.current_version {
        Some(version) => version.to_string(),
        None => "none".to_string(),
    };
    if run.newly_applied.is_empty() {
        return format!("database already up to date (schema version {version})");
    }
    let applied: Vec<String> = run.newly_applied.iter().map(ToString::to_string).collect();
    format!(
        "applied {} migration(s) [{}], schema version now {version}",
        applied.len(),
        applied.join(", ")
    )
}
