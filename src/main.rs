use brrtgate::logging::{init_logging_with_config, LogConfig};

fn main() -> anyhow::Result<()> {
    let _log_guard = init_logging_with_config(&LogConfig::quiet_cli().with_env())?;
    brrtgate::cli::run_cli()
}
