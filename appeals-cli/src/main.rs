use anyhow::{Context, Result};
use appeals_core::{AppealFilter, AppealId, AppealStatus, AppealsClient, DEFAULT_SERVER_URL};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use serde::Serialize;

/// Command line client for the appeals service
#[derive(Parser, Debug)]
#[command(name = "appeals")]
#[command(about = "Submit, inspect and resolve appeals", long_about = None)]
struct Cli {
    /// Base URL of the appeals server
    #[arg(long, global = true, env = "APPEALS_SERVER_URL", default_value = DEFAULT_SERVER_URL)]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Submit a new appeal
    Submit(SubmitArgs),
    /// List appeals, newest first
    List(ListArgs),
    /// Show a single appeal
    Get(IdArgs),
    /// Show the audit responses recorded for an appeal
    Responses(IdArgs),
    /// Start working on a new appeal
    Take(IdArgs),
    /// Complete an appeal that is in progress
    Complete(CompleteArgs),
    /// Cancel a new or in-progress appeal
    Cancel(CancelArgs),
    /// Cancel every appeal that is in progress
    CancelAllInWork(CancelAllArgs),
}

#[derive(Parser, Debug)]
struct SubmitArgs {
    /// Short subject of the appeal
    #[arg(long)]
    topic: String,

    /// Full text of the appeal
    #[arg(long)]
    message: String,
}

#[derive(Parser, Debug)]
struct ListArgs {
    /// Only appeals submitted on this day (YYYY-MM-DD, UTC)
    #[arg(long)]
    date: Option<NaiveDate>,

    /// Start of an inclusive day range; needs --end-date
    #[arg(long, requires = "end_date")]
    start_date: Option<NaiveDate>,

    /// End of an inclusive day range; needs --start-date
    #[arg(long, requires = "start_date")]
    end_date: Option<NaiveDate>,

    /// Only appeals in this status (New, InProgress, Completed, Cancelled)
    #[arg(long)]
    status: Option<AppealStatus>,
}

impl From<ListArgs> for AppealFilter {
    fn from(args: ListArgs) -> Self {
        AppealFilter {
            date: args.date,
            start_date: args.start_date,
            end_date: args.end_date,
            status: args.status,
        }
    }
}

#[derive(Parser, Debug)]
struct IdArgs {
    /// Appeal id
    id: i64,
}

#[derive(Parser, Debug)]
struct CompleteArgs {
    /// Appeal id
    id: i64,

    /// How the appeal was resolved
    #[arg(long)]
    solution: Option<String>,
}

#[derive(Parser, Debug)]
struct CancelArgs {
    /// Appeal id
    id: i64,

    /// Why the appeal is cancelled
    #[arg(long)]
    reason: Option<String>,
}

#[derive(Parser, Debug)]
struct CancelAllArgs {
    /// Reason recorded on every cancelled appeal
    #[arg(long)]
    reason: Option<String>,
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value).context("Failed to render response")?;
    println!("{}", rendered);
    Ok(())
}

fn run(client: &AppealsClient, command: Commands) -> Result<()> {
    match command {
        Commands::Submit(args) => print_json(&client.submit(&args.topic, &args.message)?),
        Commands::List(args) => print_json(&client.list(&args.into())?),
        Commands::Get(args) => print_json(&client.get(AppealId(args.id))?),
        Commands::Responses(args) => print_json(&client.responses(AppealId(args.id))?),
        Commands::Take(args) => print_json(&client.take(AppealId(args.id))?),
        Commands::Complete(args) => {
            print_json(&client.complete(AppealId(args.id), args.solution)?)
        }
        Commands::Cancel(args) => print_json(&client.cancel(AppealId(args.id), args.reason)?),
        Commands::CancelAllInWork(args) => {
            let result = client.cancel_all_in_work(args.reason)?;
            eprintln!("{}", result.message);
            print_json(&result.appeals)
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let client = AppealsClient::new(cli.server);
    run(&client, cli.command)
}
