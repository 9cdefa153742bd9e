use clap::Parser;
use color_eyre::Result;
use tracing_subscriber::EnvFilter;
use wheelwright_core::{outcome_from_error, CommandContext, GlobalOptions};

mod cli;
mod dispatch;
mod output;
mod style;

use cli::WheelwrightCli;
use dispatch::dispatch_command;
use output::{emit_output, OutputOptions};

fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = WheelwrightCli::parse();
    init_tracing(cli.quiet, cli.trace, cli.verbose)?;

    let global = GlobalOptions {
        quiet: cli.quiet,
        verbose: cli.verbose,
        trace: cli.trace,
        json: cli.json,
    };
    let opts = OutputOptions {
        quiet: cli.quiet,
        json: cli.json,
        no_color: cli.no_color,
    };

    let outcome = match CommandContext::new(&global) {
        Ok(ctx) => dispatch_command(&ctx, &cli.command),
        Err(err) => outcome_from_error(&err),
    };
    let code = emit_output(&opts, cli.command.name(), &outcome)?;

    if code == 0 {
        Ok(())
    } else {
        std::process::exit(code);
    }
}

fn init_tracing(quiet: bool, trace: bool, verbose: u8) -> Result<()> {
    let level = if trace {
        "trace"
    } else if quiet {
        "warn"
    } else {
        match verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = EnvFilter::try_from_env("WHEELWRIGHT_LOG").unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "wheelwright_core={level},wheelwright_cli={level},wheelwright={level}"
        ))
    });
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(true)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}
