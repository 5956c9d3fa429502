use carseek_core::config::{AppConfig, LoadOptions};
use carseek_db::{connect_with_settings, migrations, SqliteVehicleRepository, VehicleRepository};

use crate::commands::CommandResult;

pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "brands",
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
                "brands",
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            );
        }
    };

    let result = runtime.block_on(async {
        let pool = connect_with_settings(
            &config.database.url,
            config.database.max_connections,
            config.database.timeout_secs,
        )
        .await
        .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;
        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), 5u8))?;

        let repo = SqliteVehicleRepository::new(pool.clone());
        let listing = repo
            .brand_min_prices()
            .await
            .map_err(|error| ("query", error.to_string(), 5u8))?;

        pool.close().await;
        Ok::<_, (&'static str, String, u8)>(listing)
    });

    match result {
        Ok(listing) if listing.is_empty() => CommandResult {
            exit_code: 0,
            output: "inventory is empty; run `carseek seed` first".to_string(),
        },
        Ok(listing) => {
            let lines: Vec<String> = listing
                .iter()
                .map(|entry| format!("- {} from ${:.0}", entry.brand, entry.min_price))
                .collect();
            CommandResult {
                exit_code: 0,
                output: format!("available brands (cheapest first):\n{}", lines.join("\n")),
            }
        }
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("brands", error_class, message, exit_code)
        }
    }
}
