use clap::Parser as _;
use poolex_heatpump_tools::commands;
use tracing_subscriber::{layer::SubscriberExt as _, util::SubscriberInitExt as _};

const LOG_FILTER_VARIABLE: &str = "POOLEX_HEATPUMP_LOG";

#[derive(clap::Parser)]
#[clap(version, about)]
enum Commands {
    Datapoints(commands::datapoints::Args),
    Status(commands::status::Args),
    Set(commands::set::Args),
}

fn end<E: std::error::Error>(r: Result<(), E>) {
    std::process::exit(match r {
        Ok(_) => 0,
        Err(e) => {
            eprintln!("error: {e}");
            let mut cause = e.source();
            while let Some(e) = cause {
                eprintln!("  because: {e}");
                cause = e.source();
            }
            1
        }
    });
}

fn main() {
    let filter_description =
        std::env::var(LOG_FILTER_VARIABLE).unwrap_or_else(|_| "warn".to_string());
    let filter = match filter_description.parse::<tracing_subscriber::filter::targets::Targets>() {
        Ok(filter) => filter,
        Err(e) => {
            eprintln!("error: {LOG_FILTER_VARIABLE} is not a valid filter: {e}");
            std::process::exit(2);
        }
    };
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
    match Commands::parse() {
        Commands::Datapoints(args) => end(commands::datapoints::run(args)),
        Commands::Status(args) => end(commands::status::run(args)),
        Commands::Set(args) => end(commands::set::run(args)),
    }
}
