use crate::demo::{run_demo, run_insights, DemoArgs, InsightsArgs};
use crate::server;
use clap::{Args, Parser, Subcommand};
use leadmarket::error::AppError;

#[derive(Parser, Debug)]
#[command(
    name = "Lead Marketplace Engine",
    about = "Run and demonstrate the lead marketplace engine from the command line",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Run an end-to-end CLI demo covering scoring, distribution, and access
    Demo(DemoArgs),
    /// Generate a demand insights report from synthetic submissions
    Insights(InsightsArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Demo(args) => run_demo(args),
        Command::Insights(args) => run_insights(args),
    }
}
