// SPDX-FileCopyrightText: 2021-2025 Robin Vobruba <hoijui.quaero@gmail.com>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

mod cli;

use clap::ArgMatches;
use opendata_crawler::{adapters, crawler::Crawler, settings, shutdown, BoxResult};
use std::{path::PathBuf, process::ExitCode};
use tracing::instrument;
use tracing_subscriber::{filter::LevelFilter, EnvFilter};

#[allow(clippy::print_stdout)]
fn print_version_and_exit(quiet: bool) {
    if !quiet {
        print!("{} ", clap::crate_name!());
    }
    println!("{}", opendata_crawler::VERSION);
    std::process::exit(0);
}

/// Logs to stderr; `RUST_LOG` takes precedence over the CLI flags.
fn setup_logging(log_level: LevelFilter) {
    let filter = EnvFilter::builder()
        .with_default_directive(log_level.into())
        .from_env_lossy();
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn overrides(args: &ArgMatches) -> settings::Overrides {
    settings::Overrides {
        config_file: args.get_one::<PathBuf>(cli::A_L_CONFIG).cloned(),
        domain: args.get_one::<String>(cli::A_L_DOMAIN).cloned(),
        path: args.get_one::<PathBuf>(cli::A_L_PATH).cloned(),
        portal: args.get_one::<String>(cli::A_L_PORTAL).cloned(),
        save_meta: args.get_flag(cli::A_L_SAVE_META).then_some(true),
        formats: args
            .get_many::<String>(cli::A_L_FORMATS)
            .map(|formats| formats.cloned().collect()),
    }
}

/// Returns whether the crawl ran to its end.
#[instrument(skip_all)]
async fn run(args: &ArgMatches) -> BoxResult<bool> {
    let run_settings = settings::load(overrides(args))?;

    run_settings.layout.bootstrap().await?;
    let lock = run_settings.layout.lock().await?;

    let (trigger, shutdown) = shutdown::channel();
    tokio::spawn(async move {
        match shutdown::escalate_on_signals(&trigger, tokio::signal::ctrl_c).await {
            Ok(()) => std::process::exit(130),
            Err(err) => tracing::error!("Failed to listen for Ctrl-C: {err}"),
        }
    });

    let adapter = adapters::create_for(
        run_settings.partial(),
        run_settings.portal.as_deref(),
        &run_settings.portals,
    )
    .await?;
    let mut crawler = Crawler::new(run_settings, adapter, shutdown).await?;
    let res = crawler.run().await;
    lock.release()?;
    let report = res?;

    tracing::info!("Summary:\n{report}");
    Ok(!report.interrupted)
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = cli::args_matcher().get_matches();

    let quiet = args.get_flag(cli::A_L_QUIET);
    let version = args.get_flag(cli::A_L_VERSION);
    if version {
        print_version_and_exit(quiet);
    }

    let verbose = args.get_flag(cli::A_L_VERBOSE);

    let log_level = if verbose {
        LevelFilter::TRACE
    } else if quiet {
        LevelFilter::WARN
    } else {
        LevelFilter::INFO
    };
    setup_logging(log_level);

    match run(&args).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => {
            tracing::warn!("The crawl was interrupted; run it again to resume");
            ExitCode::FAILURE
        }
        Err(err) => {
            tracing::error!("{err}");
            ExitCode::FAILURE
        }
    }
}
