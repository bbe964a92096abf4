use std::{error::Error, io, process::ExitCode};

use clap::Parser;
use fileserve::{
    FileClient,
    cli::{Action, CliError, execute, prompt},
};

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Address of the file server
    address: String,
    #[command(subcommand)]
    action: Option<Action>,
}

fn main() -> Result<ExitCode, Box<dyn Error>> {
    // Initialize env_logger; For logging to STDOUT/STDERR
    env_logger::init();

    let cli = Cli::parse();
    let mut client = FileClient::connect(cli.address.as_str())?;

    if let Some(action) = cli.action {
        return match execute(&mut client, &action) {
            Ok(out) => {
                println!("{out}");
                Ok(ExitCode::SUCCESS)
            }
            Err(e) => {
                eprintln!("error: {e}");
                Ok(ExitCode::FAILURE)
            }
        };
    }

    let mut stdio = io::stdin().lock();
    let mut stdout = io::stdout().lock();

    loop {
        let action = match prompt(&mut stdio, &mut stdout) {
            Ok(Some(action)) => action,
            Ok(None) => break,
            Err(CliError::Usage(e)) => {
                eprintln!("{e}");
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        match execute(&mut client, &action) {
            Ok(out) => println!("{out}"),
            Err(e) => eprintln!("error: {e}"),
        }
    }

    Ok(ExitCode::SUCCESS)
}
