use std::io::{self, BufRead, Write};
use std::sync::Arc;

use carseek_agent::{HttpLlmClient, WorkflowRuntime};
use carseek_core::config::{AppConfig, LoadOptions};
use carseek_core::{InMemoryTraceSink, SessionRecord};
use carseek_db::{connect_with_settings, migrations, SqliteQueryExecutor};

use crate::commands::CommandResult;

pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "chat",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };
    init_logging(&config);

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                "chat",
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            );
        }
    };

    let setup = runtime.block_on(async {
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

        let llm = HttpLlmClient::from_config(&config.llm)
            .map_err(|error| ("llm_init", error.to_string(), 4u8))?;
        let workflow = WorkflowRuntime::new(
            Arc::new(llm),
            Arc::new(SqliteQueryExecutor::new(pool.clone())),
            Arc::new(InMemoryTraceSink::default()),
            config.workflow.clone(),
        )
        .map_err(|error| ("prompt_catalog", error.to_string(), 5u8))?;

        Ok::<_, (&'static str, String, u8)>((pool, workflow))
    });

    let (pool, workflow) = match setup {
        Ok(setup) => setup,
        Err((error_class, message, exit_code)) => {
            return CommandResult::failure("chat", error_class, message, exit_code);
        }
    };

    println!("CarSeek vehicle search assistant. Describe the car you are looking for.");
    println!("Commands: /reset starts a new conversation, /quit exits.");

    let mut session = SessionRecord::new();
    let stdin = io::stdin();
    loop {
        print!("you> ");
        if io::stdout().flush().is_err() {
            break;
        }

        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) => break,
            Ok(_) => {}
            Err(error) => {
                tracing::error!(event_name = "chat.stdin_failed", error = %error, "stdin read failed");
                break;
            }
        }

        let message = line.trim();
        match message {
            "" => continue,
            "/quit" | "/exit" => break,
            "/reset" => {
                session.reset();
                println!("carseek> Starting fresh. What are you looking for?");
                continue;
            }
            _ => {}
        }

        let reply = runtime.block_on(workflow.run_turn(&mut session, message));
        println!("carseek> {reply}");
    }

    runtime.block_on(pool.close());
    CommandResult { exit_code: 0, output: String::new() }
}

fn init_logging(config: &AppConfig) {
    use carseek_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}
