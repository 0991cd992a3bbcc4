use std::path::PathBuf;
use structopt::StructOpt;

use techshield::config::Config;
use techshield::models::LoginEvent;
use techshield::persistence::{AlertFilter, SqliteStateStore, StateStore};
use techshield::pipeline::Pipeline;

/// Tech Shield command line interface
#[derive(StructOpt, Debug)]
#[structopt(name = "shield", about = "Suspicious-login detection CLI")]
pub enum Cli {
    /// Generate a default configuration file
    Config {
        /// Output path for the configuration file
        #[structopt(short, long, default_value = "config.toml")]
        output: PathBuf,
    },
    /// Replay login events from a JSON-lines file through the detectors
    Replay {
        /// Path to a file with one JSON login event per line
        #[structopt(short, long)]
        file: PathBuf,
        /// Configuration file for detector thresholds
        #[structopt(short, long)]
        config: Option<PathBuf>,
    },
    /// List alerts stored in a database
    Alerts {
        /// Path to the sqlite database
        #[structopt(short, long, default_value = "techshield.db")]
        db: PathBuf,
        /// Filter by status (active or resolved)
        #[structopt(short, long)]
        status: Option<String>,
        /// Maximum number of alerts to display
        #[structopt(short, long, default_value = "20")]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::from_args();

    match cli {
        Cli::Config { output } => {
            let config = Config::default();
            config.to_file(&output)?;
            println!("Default configuration written to: {:?}", output);
        }
        Cli::Replay { file, config } => {
            if !file.exists() {
                eprintln!("File not found: {:?}", file);
                std::process::exit(1);
            }
            let config = match config {
                Some(ref path) => Config::from_file(path)?,
                None => Config::default(),
            };

            // In-memory replay: no collaborators, no persistence
            let pipeline = Pipeline::new(&config, None, None, None, None, None);
            let contents = std::fs::read_to_string(&file)?;

            let mut replayed = 0usize;
            let mut raised = 0usize;
            for (number, line) in contents.lines().enumerate() {
                if line.trim().is_empty() {
                    continue;
                }
                let event: LoginEvent = match serde_json::from_str(line) {
                    Ok(event) => event,
                    Err(e) => {
                        eprintln!("line {}: skipping malformed event: {}", number + 1, e);
                        continue;
                    }
                };
                replayed += 1;
                match pipeline.handle_event(&event).await {
                    Ok(alerts) => {
                        for alert in alerts {
                            raised += 1;
                            println!(
                                "[{}] {} - subject: {}, address: {}: {}",
                                alert.severity,
                                alert.kind,
                                alert.subject,
                                alert.source_addr,
                                alert.summary
                            );
                        }
                    }
                    Err(e) => eprintln!("line {}: event rejected: {}", number + 1, e),
                }
            }
            println!("\nReplayed {} event(s), {} alert(s) raised", replayed, raised);
        }
        Cli::Alerts { db, status, limit } => {
            if !db.exists() {
                eprintln!("Database not found: {:?}", db);
                std::process::exit(1);
            }
            let store = SqliteStateStore::new(&db)?;
            let filter = AlertFilter {
                status: status.as_deref().map(str::parse).transpose()?,
                ..Default::default()
            };

            let alerts = store.get_alerts(&filter)?;
            let display_count = std::cmp::min(limit, alerts.len());
            println!("{} alert(s) (showing {}):\n", alerts.len(), display_count);
            for alert in alerts.iter().take(display_count) {
                println!(
                    "  [{}] {} {} - subject: {}, address: {}, repeats: {}, actions: {}",
                    alert.severity,
                    alert.kind,
                    alert.id,
                    alert.subject,
                    alert.source_addr,
                    alert.repeat_count,
                    alert.actions.len()
                );
            }
        }
    }

    Ok(())
}
