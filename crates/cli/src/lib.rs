pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "crewflow",
    about = "Crewflow operator CLI",
    long_about = "Operate the Crewflow approval workflow engine: migrations, seed data, \
                  config inspection, readiness checks, and request lifecycle commands.",
    after_help = "Examples:\n  crewflow doctor --json\n  crewflow submit --kind leave --employee emp-001 --requested-by emp-001\n  crewflow act REQ-... --user u-mgr --action approve"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Load deterministic baseline fixtures and verify the seed contract")]
    Seed,
    #[command(
        about = "Inspect effective configuration values with source attribution"
    )]
    Config,
    #[command(about = "Validate config, database connectivity, and workflow configuration")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Submit a new request and print its frozen approval chain")]
    Submit(commands::request::SubmitArgs),
    #[command(about = "Approve, reject, or forward a request as a given user")]
    Act(commands::request::ActArgs),
    #[command(about = "Show one request with its change history and audit trail")]
    Show {
        #[arg(help = "Request id, e.g. REQ-6f9c...")]
        request_id: String,
    },
    #[command(about = "List requests, optionally filtered by status key")]
    List {
        #[arg(long, help = "Status key filter, e.g. pending or manager_approved")]
        status: Option<String>,
        #[arg(long, default_value_t = 50)]
        limit: u32,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Seed => commands::seed::run(),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => {
            commands::CommandResult { exit_code: 0, output: commands::doctor::run(json) }
        }
        Command::Submit(args) => commands::request::submit(args),
        Command::Act(args) => commands::request::act(args),
        Command::Show { request_id } => commands::request::show(&request_id),
        Command::List { status, limit } => commands::request::list(status.as_deref(), limit),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
