pub mod config;
pub mod daemon;

use clap::{Arg, ArgMatches, Command};

pub use config::{PlcConfig, VariableEntry};

/// Parse command line arguments and return ArgMatches.
pub fn parse_args() -> ArgMatches {
    command().get_matches()
}

pub fn command() -> Command {
    Command::new("s5link")
        .about("Poll a serial PLC and forward value changes")
        .arg(
            Arg::new("config")
                .long("config")
                .short('c')
                .help("Configuration file (JSON, or TOML with a .toml extension)")
                .required(true),
        )
        .arg(
            Arg::new("mode")
                .long("mode")
                .short('m')
                .help("How values are forwarded: all, all-split or single")
                .value_parser(["all", "all-split", "single"])
                .default_value("all"),
        )
        .arg(
            Arg::new("variable")
                .long("variable")
                .short('v')
                .help("Variable forwarded in single mode"),
        )
        .arg(
            Arg::new("diff")
                .long("diff")
                .short('d')
                .help("Only forward values that changed")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("log-file")
                .long("log-file")
                .help("Also write logs to this file"),
        )
}
