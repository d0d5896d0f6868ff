//! Unit tests for CLI argument parsing

use clap::Parser;
use sync_extractor::cli::run::PhaseArg;
use sync_extractor::cli::{Cli, Commands};

#[test]
fn test_run_defaults() {
    let cli = Cli::try_parse_from(["sync-extractor", "run"]).unwrap();
    let Commands::Run(args) = cli.command else {
        panic!("expected run command");
    };

    assert_eq!(args.phase, PhaseArg::DataStart);
    assert_eq!(args.page_size, 100);
    assert_eq!(args.quota, 100);
    assert_eq!(args.window_ms, 120_000);
    assert_eq!(args.safety_margin, 5);
    assert_eq!(args.state.to_str(), Some("state/checkpoint.json"));
    assert!(cli.metrics_addr.is_none());
}

#[test]
fn test_global_metrics_addr() {
    let cli = Cli::try_parse_from([
        "sync-extractor",
        "state",
        "--reset",
        "--metrics-addr",
        "127.0.0.1:9090",
    ])
    .unwrap();

    assert_eq!(cli.metrics_addr.map(|a| a.port()), Some(9090));
    let Commands::State(args) = cli.command else {
        panic!("expected state command");
    };
    assert!(args.reset);
}

#[test]
fn test_unknown_phase_rejected() {
    assert!(Cli::try_parse_from(["sync-extractor", "run", "--phase", "attachments"]).is_err());
}
