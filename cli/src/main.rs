mod commands;
mod terminal;

use commands::{CommandLine, transfer};
use terminal::{logging, print};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let commands = CommandLine::parse_args();

    logging::init_logging(commands.verbose, commands.quiet);

    let cfg = commands.to_config();

    print::banner(cfg.quiet);
    print::header("getting ready for transfer", cfg.quiet);

    transfer::transfer(&commands, &cfg).await
}
