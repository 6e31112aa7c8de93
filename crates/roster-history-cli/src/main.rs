use anyhow::Result;
use clap::Parser;

fn main() -> Result<()> {
    let cli = roster_history_cli::Cli::parse();
    roster_history_cli::init_tracing(cli.verbose());
    roster_history_cli::run_cli(cli)
}
