use buddy_bot::cli::{self, Args, Command};
use clap::Parser;

fn initialize_logger(debug: bool) -> buddy_bot::Result<()> {
    let filter = if debug {
        simplelog::LevelFilter::Debug
    } else {
        simplelog::LevelFilter::Info
    };

    let config = simplelog::ConfigBuilder::new()
        .add_filter_allow_str("buddy_bot")
        .build();

    simplelog::TermLogger::init(
        filter,
        config,
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    )?;

    Ok(())
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    let args = Args::parse();

    initialize_logger(args.debug)?;

    match args.command.clone() {
        Command::Update { no_cleanup } => {
            cli::update::execute(&args, no_cleanup).await?
        }
        Command::Cleanup => cli::cleanup::execute(&args).await?,
        Command::Scan { out_file } => {
            cli::scan::execute(&args, out_file).await?
        }
    }

    Ok(())
}
