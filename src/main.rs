//! Shellgrid - a grid of shell commands rebuilt when their input files change

mod cli;
mod config;
mod runtime;

use std::env;

use cli::CliArgs;
use config::Config;
use runtime::App;

#[tokio::main]
async fn main() {
    let args = match cli::parse_args(env::args().skip(1)) {
        Ok(args) => args,
        Err(e) => {
            eprintln!("Error: {}", e);
            cli::print_usage();
            std::process::exit(1);
        }
    };
    if args.help {
        cli::print_usage();
        return;
    }

    runtime::init_tracing(args.verbose);

    let (config, warnings) = config::load_config(args.config.as_ref());
    for warning in warnings {
        eprintln!("Warning: {}", warning);
    }

    match run(args, config).await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

async fn run(args: CliArgs, config: Config) -> anyhow::Result<i32> {
    let data_file = args.file.unwrap_or_else(|| config.data_file.clone());
    let app = App::open(&config, data_file)?;

    if args.check {
        return Ok(app.check().await);
    }
    if args.once {
        app.run_once(args.all).await?;
        return Ok(0);
    }
    app.serve().await?;
    Ok(0)
}
