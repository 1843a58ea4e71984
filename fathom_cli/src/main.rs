mod demo;

use fathom_core::{HarnessConfig, Supervisor, SwarmKind};

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[clap(author, version, about = "Run property tests over generated inputs", long_about = None)]
struct Cli {
    #[clap(short, long, value_parser)]
    config_file: Option<PathBuf>,
    /// Default filter when RUST_LOG is unset.
    #[clap(long, default_value = "info")]
    log_level: String,

    #[clap(long, alias = "input-which-test")]
    which_test: Option<String>,
    #[clap(long, value_parser)]
    input_test_file: Option<PathBuf>,
    #[clap(long, value_parser)]
    input_test_dir: Option<PathBuf>,
    #[clap(long, value_parser)]
    input_test_files_dir: Option<PathBuf>,
    #[clap(long)]
    input_stdin: bool,
    #[clap(short, long, value_parser)]
    output_test_dir: Option<PathBuf>,

    #[clap(long, overrides_with = "no_fork")]
    fork: bool,
    #[clap(long)]
    no_fork: bool,
    #[clap(long)]
    fuzz: bool,
    #[clap(long)]
    fuzz_save_passing: bool,
    #[clap(short, long)]
    timeout: Option<u64>,
    #[clap(short, long)]
    seed: Option<u64>,
    #[clap(long)]
    status_interval: Option<u64>,

    #[clap(long)]
    take_over: bool,
    #[clap(long)]
    abort_on_fail: bool,
    #[clap(long)]
    exit_on_fail: bool,
    #[clap(long)]
    verbose_reads: bool,

    #[clap(long)]
    list_tests: bool,
    /// Wildcard over test names, e.g. `range_*`.
    #[clap(long)]
    test_filter: Option<String>,
    #[clap(long)]
    boring_only: bool,
    #[clap(long)]
    run_disabled: bool,

    #[clap(long)]
    input_size: Option<usize>,
    #[clap(long)]
    max_swarm_configs: Option<usize>,
    #[clap(long)]
    search_budget: Option<u64>,
    /// Route plain choices through swarm configs: pure, mixed or prob.
    #[clap(long)]
    default_swarm: Option<SwarmKind>,
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: Option<PathBuf>) -> Result<HarnessConfig, anyhow::Error> {
    match path {
        Some(config_path) => {
            info!("Loading configuration from specified path: {config_path:?}");
            HarnessConfig::load_from_file(&config_path)
        }
        None => {
            let default_config_path = PathBuf::from("fathom.toml");
            if default_config_path.exists() {
                info!("No config file specified, loading default: {default_config_path:?}");
                HarnessConfig::load_from_file(&default_config_path)
            } else {
                Ok(HarnessConfig::default())
            }
        }
    }
}

/// Flags win over file values; absent flags leave the file alone.
fn apply_flags(config: &mut HarnessConfig, cli: Cli) {
    if cli.which_test.is_some() {
        config.which_test = cli.which_test;
    }
    if cli.input_test_file.is_some() {
        config.input_test_file = cli.input_test_file;
    }
    if cli.input_test_dir.is_some() {
        config.input_test_dir = cli.input_test_dir;
    }
    if cli.input_test_files_dir.is_some() {
        config.input_test_files_dir = cli.input_test_files_dir;
    }
    if cli.output_test_dir.is_some() {
        config.output_test_dir = cli.output_test_dir;
    }
    if cli.fork {
        config.fork = Some(true);
    } else if cli.no_fork {
        config.fork = Some(false);
    }
    if let Some(timeout) = cli.timeout {
        config.timeout_secs = timeout;
    }
    if cli.seed.is_some() {
        config.seed = cli.seed;
    }
    if cli.status_interval.is_some() {
        config.status_interval_secs = cli.status_interval;
    }
    if cli.test_filter.is_some() {
        config.test_filter = cli.test_filter;
    }
    if let Some(size) = cli.input_size {
        config.input_size = size;
    }
    if let Some(max) = cli.max_swarm_configs {
        config.max_swarm_configs = max;
    }
    if let Some(budget) = cli.search_budget {
        config.search_budget = budget;
    }
    if cli.default_swarm.is_some() {
        config.default_swarm = cli.default_swarm;
    }

    config.input_stdin |= cli.input_stdin;
    config.fuzz |= cli.fuzz;
    config.fuzz_save_passing |= cli.fuzz_save_passing;
    config.take_over |= cli.take_over;
    config.abort_on_fail |= cli.abort_on_fail;
    config.exit_on_fail |= cli.exit_on_fail;
    config.verbose_reads |= cli.verbose_reads;
    config.list_tests |= cli.list_tests;
    config.boring_only |= cli.boring_only;
    config.run_disabled |= cli.run_disabled;
}

fn main() -> Result<ExitCode, anyhow::Error> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    let mut config = load_config(cli.config_file.clone())?;
    apply_flags(&mut config, cli);

    if config.verbose_reads {
        warn!("Byte-level read tracing is on; set RUST_LOG=trace to see it");
    }

    let mut supervisor = Supervisor::new(config, demo::registry())?;
    let summary = supervisor.run()?;
    Ok(ExitCode::from(summary.failures().min(255) as u8))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn flags_override_file_values() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "which-test = \"range_apis\"\nseed = 3\nfork = true").unwrap();
        let mut config = load_config(Some(file.path().to_path_buf())).unwrap();

        let cli = Cli::parse_from([
            "fathom",
            "--which-test",
            "lucky_number",
            "--no-fork",
            "--fuzz",
            "--default-swarm",
            "prob",
        ]);
        apply_flags(&mut config, cli);
        assert_eq!(config.which_test.as_deref(), Some("lucky_number"));
        assert_eq!(config.seed, Some(3));
        assert_eq!(config.fork, Some(false));
        assert!(config.fuzz);
        assert_eq!(config.default_swarm, Some(SwarmKind::Prob));
    }

    #[test]
    fn absent_flags_keep_defaults() {
        let mut config = HarnessConfig::default();
        apply_flags(&mut config, Cli::parse_from(["fathom"]));
        assert_eq!(config.fork, None);
        assert_eq!(config.timeout_secs, 3600);
        assert!(!config.fuzz);
    }

    #[cfg(unix)]
    #[test]
    fn take_over_flag_replays_saved_cases_in_children() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("lucky.fail"), [0, 0, 0x7a, 0x69]).unwrap();
        std::fs::write(dir.path().join("other.pass"), [0, 0, 0x7a, 0x6a]).unwrap();
        let dir_arg = dir.path().to_string_lossy().into_owned();

        let mut config = HarnessConfig::default();
        let cli = Cli::parse_from([
            "fathom",
            "--take-over",
            "--which-test",
            "lucky_number",
            "--input-test-dir",
            dir_arg.as_str(),
        ]);
        apply_flags(&mut config, cli);
        assert!(config.take_over);

        let mut supervisor = Supervisor::new(config, demo::registry()).unwrap();
        let summary = supervisor.run().unwrap();
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.passed, 1);
    }

    #[test]
    fn bad_swarm_kind_is_rejected() {
        assert!(Cli::try_parse_from(["fathom", "--default-swarm", "wide"]).is_err());
    }
}
