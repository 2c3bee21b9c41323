use std::{error::Error, process::ExitCode, time::Duration};

use clap::Parser;
use log::{error, info, Level, Metadata, Record};
use raptor::{ClientConfig, RconSession};
use tokio::io::{AsyncBufReadExt, BufReader};

struct SimpleLogger {
    level: Level,
}

impl log::Log for SimpleLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            eprintln!("{} - {}", record.level(), record.args());
        }
    }

    fn flush(&self) {}
}

/// Send commands to a Minecraft or Source server over rcon.
#[derive(Parser, Debug)]
#[command(name = "raptor", version)]
struct Args {
    /// Server host name or address
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Rcon port
    #[arg(short, long, default_value_t = 25575)]
    port: u16,

    /// Rcon password
    #[arg(long, env = "RCON_PASSWORD", hide_env_values = true)]
    password: String,

    /// Seconds to wait for the server before giving up
    #[arg(long, default_value_t = 10)]
    timeout: u64,

    /// More output (-v info, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Commands to run; read from stdin if none are given
    commands: Vec<String>,
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => Level::Warn,
        1 => Level::Info,
        2 => Level::Debug,
        _ => Level::Trace,
    };
    let logger: &'static SimpleLogger = Box::leak(Box::new(SimpleLogger { level }));
    let _ = log::set_logger(logger).map(|()| log::set_max_level(level.to_level_filter()));
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose);

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{}", err);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<(), Box<dyn Error>> {
    let timeout = Duration::from_secs(args.timeout);
    let config = ClientConfig::default()
        .with_connect_timeout(timeout)
        .with_read_timeout(timeout);

    let session = RconSession::connect_with(&args.host, args.port, &args.password, &config).await?;
    info!("connected to {}:{}", args.host, args.port);

    if !args.commands.is_empty() {
        for command in &args.commands {
            println!("{}", session.send_command(command).await?);
        }
    } else {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Some(line) = lines.next_line().await? {
            let command = line.trim();
            if command.is_empty() {
                continue;
            }
            if command == "exit" || command == "quit" {
                break;
            }

            match session.send_command(command).await {
                Ok(response) => println!("{}", response),
                Err(err) if err.is_fatal() => return Err(err.into()),
                Err(err) => error!("{}", err),
            }
        }
    }

    session.close().await?;
    info!("bye");
    Ok(())
}
