mod cmd;
mod exit;
mod logging;
mod output;

use clap::Parser;

use crate::cmd::Command;
use crate::logging::{init_logging, LogFormat, LogLevel, LOG_FILTER_ENV};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "chronolink", version, about = "Harness-test master/slave CLI")]
struct Cli {
    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Minimum level for chronolink's own crates (stderr).
    #[arg(
        long,
        value_name = "LEVEL",
        default_value = "info",
        env = "CHRONOLINK_LOG_LEVEL",
        global = true
    )]
    log_level: LogLevel,

    /// Extra tracing filter directives, e.g. `chronolink_frame=trace`.
    #[arg(long, value_name = "DIRECTIVES", env = LOG_FILTER_ENV, global = true)]
    log_filter: Option<String>,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level, cli.log_filter.as_deref());

    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    let result = cmd::run(cli.command, format);

    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}
