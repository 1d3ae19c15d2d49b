//! respipe - RESP pipeline probe
//!
//! Sends commands to a RESP server through the pipelining client, either one
//! at a time or as a large pipelined batch.

mod config;

use clap::{Parser, Subcommand};
use colored::Colorize;
use config::Config;
use respipe_client::{connect, Command, Reply, TcpClient};
use std::path::PathBuf;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "respipe")]
#[command(about = "Pipelining probe for RESP servers")]
#[command(version)]
struct Cli {
    /// YAML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Server address (host:port)
    #[arg(short, long)]
    addr: Option<String>,

    /// Enable TLS connection
    #[arg(long)]
    tls: bool,

    /// Skip server certificate verification (INSECURE)
    #[arg(long, short = 'k')]
    insecure: bool,

    /// Maximum commands per write batch
    #[arg(long)]
    batch_limit: Option<usize>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Send one command and print its reply
    Exec {
        /// Command name
        name: String,

        /// Command arguments
        args: Vec<String>,
    },

    /// Pipeline `PING <i>` commands and check the replies echo in order
    Bench {
        /// Number of commands
        #[arg(short = 'n', long, default_value_t = 10_000)]
        count: usize,
    },
}

impl Cli {
    fn apply(&self, config: &mut Config) {
        if let Some(addr) = &self.addr {
            config.connection.addr = addr.clone();
        }
        if self.tls || self.insecure {
            config.tls.enabled = true;
        }
        if self.insecure {
            config.tls.insecure = true;
        }
        if let Some(limit) = self.batch_limit {
            config.pipeline.batch_limit = limit;
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref()).map_err(|e| {
        tracing::error!("Failed to load config: {}", e);
        e
    })?;
    cli.apply(&mut config);
    config.validate()?;

    tracing::debug!("Connecting to {}", config.connection.addr);
    let client = connect(config.connection_config()).await.map_err(|e| {
        eprintln!("{}: {}", "Connection failed".red(), e);
        e
    })?;

    let result = match cli.command {
        Commands::Exec { name, args } => exec(&client, name, args).await,
        Commands::Bench { count } => bench(&client, count).await,
    };

    client.close().await?;
    result
}

async fn exec(
    client: &TcpClient,
    name: String,
    args: Vec<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    client.send(Command::new(name).args(args));

    match client.read().await? {
        Some(reply) if reply.is_error() => println!("{}", reply.to_string().red()),
        Some(reply) => println!("{}", reply),
        None => eprintln!("{}", "Connection closed".red()),
    }
    Ok(())
}

async fn bench(client: &TcpClient, count: usize) -> Result<(), Box<dyn std::error::Error>> {
    let start = Instant::now();
    client.send_batch((0..count).map(|i| Command::new("PING").arg(i)));

    let replies = client.read_all().await?;
    let elapsed = start.elapsed();

    let mismatched = replies
        .iter()
        .enumerate()
        .filter(|(i, reply)| !echoes(reply, *i))
        .count();

    if replies.len() != count || mismatched > 0 {
        println!(
            "{}: {} of {} replies received, {} out of order",
            "Mismatch".red(),
            replies.len(),
            count,
            mismatched
        );
        return Err("pipeline replies did not echo in order".into());
    }

    let rate = count as f64 / elapsed.as_secs_f64().max(f64::EPSILON);
    tracing::info!(count, elapsed_ms = elapsed.as_millis() as u64, "pipeline complete");
    println!(
        "{} {} commands in {:.2?} ({:.0} cmd/s)",
        "OK".green(),
        count,
        elapsed,
        rate
    );
    Ok(())
}

fn echoes(reply: &Reply, i: usize) -> bool {
    reply.as_str().and_then(|s| s.parse::<usize>().ok()) == Some(i)
}
