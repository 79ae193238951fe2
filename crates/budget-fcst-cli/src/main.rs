use std::process::ExitCode;

use budget_fcst_cli::{config_error_json, logging, run, usage_json, Cli};
use clap::error::ErrorKind;
use clap::Parser;

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            e.exit()
        }
        Err(e) => {
            eprintln!("{e}");
            println!("{}", usage_json());
            return ExitCode::from(1);
        }
    };

    logging::init(cli.verbose);

    match run(&cli) {
        Ok(output) => {
            println!("{output}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "invalid configuration");
            println!("{}", config_error_json(&e));
            ExitCode::from(1)
        }
    }
}
