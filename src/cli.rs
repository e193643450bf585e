// SPDX-FileCopyrightText: 2021-2025 Robin Vobruba <hoijui.quaero@gmail.com>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

use clap::{command, value_parser, Arg, ArgAction, Command, ValueHint};
use std::path::PathBuf;

pub const A_L_VERSION: &str = "version";
pub const A_S_VERSION: char = 'V';
pub const A_L_QUIET: &str = "quiet";
pub const A_S_QUIET: char = 'q';
pub const A_L_VERBOSE: &str = "verbose";
pub const A_S_VERBOSE: char = 'v';
pub const A_L_DOMAIN: &str = "domain";
pub const A_S_DOMAIN: char = 'd';
pub const A_L_PATH: &str = "path";
pub const A_S_PATH: char = 'p';
pub const A_L_SAVE_META: &str = "save-meta";
pub const A_S_SAVE_META: char = 'm';
pub const A_L_FORMATS: &str = "formats";
pub const A_S_FORMATS: char = 'f';
pub const A_L_PORTAL: &str = "portal";
pub const A_L_CONFIG: &str = "config";
pub const A_S_CONFIG: char = 'c';

fn arg_version() -> Arg {
    Arg::new(A_L_VERSION)
        .help(
            "Print version information and exit. \
May be combined with -q,--quiet, \
to really only output the version string.",
        )
        .short(A_S_VERSION)
        .long(A_L_VERSION)
        .action(ArgAction::SetTrue)
}

fn arg_quiet() -> Arg {
    Arg::new(A_L_QUIET)
        .help("Only log warnings and errors")
        .short(A_S_QUIET)
        .long(A_L_QUIET)
        .action(ArgAction::SetTrue)
        .conflicts_with(A_L_VERBOSE)
}

fn arg_verbose() -> Arg {
    Arg::new(A_L_VERBOSE)
        .help("Log everything, down to trace level")
        .short(A_S_VERBOSE)
        .long(A_L_VERBOSE)
        .action(ArgAction::SetTrue)
}

fn arg_domain() -> Arg {
    Arg::new(A_L_DOMAIN)
        .help("Base URL of the Open Data portal to crawl, e.g. https://data.europa.eu")
        .num_args(1)
        .value_name("URL")
        .value_hint(ValueHint::Url)
        .short(A_S_DOMAIN)
        .long(A_L_DOMAIN)
        .required_unless_present(A_L_VERSION)
}

fn arg_path() -> Arg {
    Arg::new(A_L_PATH)
        .help(
            "Directory to store the crawled data in; \
a sub-directory named after the portal domain is created within it. \
Defaults to the current working directory.",
        )
        .num_args(1)
        .value_name("DIR")
        .value_hint(ValueHint::DirPath)
        .value_parser(value_parser!(PathBuf))
        .short(A_S_PATH)
        .long(A_L_PATH)
}

fn arg_save_meta() -> Arg {
    Arg::new(A_L_SAVE_META)
        .help("Store the metadata of every dataset as a JSON file")
        .short(A_S_SAVE_META)
        .long(A_L_SAVE_META)
        .action(ArgAction::SetTrue)
}

fn arg_formats() -> Arg {
    Arg::new(A_L_FORMATS)
        .help(
            "Only download resources in these formats (case-insensitive), \
e.g. 'csv pdf' or 'csv,pdf'. \
All other resources are recorded in the metadata, but not downloaded.",
        )
        .num_args(1..)
        .value_delimiter(',')
        .value_name("FORMAT")
        .short(A_S_FORMATS)
        .long(A_L_FORMATS)
        .action(ArgAction::Append)
}

fn arg_portal() -> Arg {
    Arg::new(A_L_PORTAL)
        .help("Type of the portal (e.g. 'data-europa'); detected if not given")
        .num_args(1)
        .value_name("TYPE")
        .long(A_L_PORTAL)
}

fn arg_config() -> Arg {
    Arg::new(A_L_CONFIG)
        .help("Configuration file to use instead of ./opendata-crawler.{toml,yaml,json}")
        .num_args(1)
        .value_name("FILE")
        .value_hint(ValueHint::FilePath)
        .value_parser(value_parser!(PathBuf))
        .short(A_S_CONFIG)
        .long(A_L_CONFIG)
}

fn args() -> [Arg; 9] {
    [
        arg_version(),
        arg_quiet(),
        arg_verbose(),
        arg_domain(),
        arg_path(),
        arg_save_meta(),
        arg_formats(),
        arg_portal(),
        arg_config(),
    ]
}

#[must_use]
pub fn args_matcher() -> Command {
    command!()
        .about(clap::crate_description!())
        .help_expected(true)
        .disable_version_flag(true)
        .args(args())
}
