use clap::Parser;
use gpr_defect_agent_lib::cli::Cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    gpr_defect_agent_lib::run(Cli::parse()).await
}
