mod commands;
mod shell;
mod terminal;

use commands::CommandLine;
use terminal::{logging, print};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CommandLine::parse_args();

    logging::init();

    let config = args.to_config();
    let (node, events) = lanlink_core::node::spawn(&args.name, config).await?;

    if !args.quiet {
        print::banner(node.name(), node.config());
    }
    shell::run(node, events).await
}
