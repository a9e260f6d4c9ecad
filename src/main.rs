//! MySQL Datastore - Main entry point.
//!
//! Runs migrations, connection checks and single statements against the
//! database described by command-line flags and `DB_*` environment variables.

use clap::Parser;
use mysql_datastore::config::{Command, Config};
use mysql_datastore::db::Client;
use mysql_datastore::models::QueryParam;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize the tracing subscriber for logging.
fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.json_logs {
        subscriber.with(fmt::layer().json()).init();
    } else {
        subscriber
            .with(fmt::layer().with_target(true).with_thread_ids(false))
            .init();
    }
}

fn parse_params(raw: Option<&str>) -> Result<Vec<QueryParam>, serde_json::Error> {
    match raw {
        Some(raw) => serde_json::from_str(raw),
        None => Ok(Vec::new()),
    }
}

async fn run(client: &Client, command: &Command) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Command::Migrate => client.migrate().await?,
        Command::CleanUp => client.clean_up().await?,
        Command::Check => {
            let (alive, err) = client.conn_check().await;
            if let Some(e) = err {
                return Err(e.into());
            }
            println!("{}", if alive { "ok" } else { "unreachable" });
        }
        Command::Stats => {
            let stats = client.get_stats().await?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        Command::Exec { sql, params } => {
            let params = parse_params(params.as_deref())?;
            let result = client.exec(sql, &params).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse configuration from command line and environment
    let config = Config::parse();

    init_tracing(&config);

    info!(
        command = ?config.command,
        "Starting mysql-datastore v{}",
        env!("CARGO_PKG_VERSION")
    );

    let client = Client::new(config.database.clone());
    let result = run(&client, &config.command).await;
    client.close().await;

    if let Err(e) = result {
        error!(error = %e, "Command failed");
        return Err(e);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_params() {
        let params = parse_params(Some(r#"[1, "alice", null, true]"#)).unwrap();
        assert_eq!(
            params,
            vec![
                QueryParam::Int(1),
                QueryParam::String("alice".to_string()),
                QueryParam::Null,
                QueryParam::Bool(true),
            ]
        );
        assert!(parse_params(None).unwrap().is_empty());
        assert!(parse_params(Some("{not json")).is_err());
    }
}
