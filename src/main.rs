use clap::Parser;

use focusbuddy_lib::cli::Cli;

#[tokio::main]
async fn main() {
    focusbuddy_lib::init_logging();

    if let Err(e) = focusbuddy_lib::run(Cli::parse()).await {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
