use clap::Parser;
use std::path::PathBuf;
use valuecalc::config::Config;

#[derive(Parser)]
struct Cli {
    #[command(flatten)]
    config: Config,
}

#[test]
fn test_defaults() {
    let cli = Cli::try_parse_from(["website"]).unwrap();
    assert_eq!(cli.config, Config::default());
    assert_eq!(cli.config.addr().unwrap().to_string(), "127.0.0.1:3000");
    assert_eq!(cli.config.level_manager().max_passes(), 100);
}

#[test]
fn test_flags() {
    let cli = Cli::try_parse_from([
        "website",
        "--host",
        "0.0.0.0",
        "--port",
        "8080",
        "--max-passes",
        "7",
        "--data-dir",
        "/var/lib/valuecalc",
    ])
    .unwrap();
    assert_eq!(cli.config.port, 8080);
    assert_eq!(cli.config.level_manager().max_passes(), 7);
    assert_eq!(cli.config.addr().unwrap().to_string(), "0.0.0.0:8080");
    assert_eq!(
        cli.config.snapshot_path("nightly.bin.gz"),
        Some(PathBuf::from("/var/lib/valuecalc/nightly.bin.gz"))
    );
}

#[test]
fn test_snapshot_path_drops_directories() {
    let config = Config::default();
    assert_eq!(
        config.snapshot_path("../../etc/passwd"),
        Some(PathBuf::from("./passwd"))
    );
    assert_eq!(config.snapshot_path(".."), None);
}
