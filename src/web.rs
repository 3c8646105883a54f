#![cfg(not(tarpaulin_include))]

use clap::Parser;
use log::info;
use valuecalc::app;
use valuecalc::config::Config;
use valuecalc::loader;
use valuecalc::solution::Solution;

#[derive(Parser, Debug)]
#[command(name = "website", about = "Value calculator web server")]
struct Args {
    #[command(flatten)]
    config: Config,

    /// Solution to serve at startup (.json or .bin.gz)
    #[arg(long)]
    solution: Option<std::path::PathBuf>,
}

/// Main entry point for the web application
///
/// Starts with an empty solution unless `--solution` names one to load.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let solution = match &args.solution {
        Some(path) => loader::load_solution(path)?,
        None => Solution::default(),
    };
    info!("serving solution '{}' ({})", solution.name, solution.id);

    app::run(solution, args.config).await
}
