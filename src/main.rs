use std::process;

use clap::Parser;
use tracing::error;

use fachpi::cli::{print_logo, Args};
use fachpi::logger;

async fn run(args: Args) -> anyhow::Result<()> {
    args.validate()?;
    logger::init_tracing(args.log_level.as_deref())?;
    if !args.no_logo {
        print_logo();
    }
    args.mode.run(&args).await
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let code = match run(args).await {
        Ok(()) => 0,
        Err(err) => {
            error!("{:#}", err);
            eprintln!("error: {:#}", err);
            1
        }
    };
    // A blocking stdin read cannot be cancelled, so leave without waiting for the runtime.
    process::exit(code);
}
