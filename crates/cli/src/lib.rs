pub mod commands;

use clap::{Args, Parser, Subcommand};
use std::process::ExitCode;

use surplus_core::config::{AppConfig, LoadOptions};
use surplus_core::domain::actor::{Actor, Role};
use surplus_core::domain::listing::{FoodCategory, NewListing};

use crate::commands::{parse_instant, CommandResult};

#[derive(Debug, Parser)]
#[command(
    name = "surplus",
    about = "Surplus food donation operator CLI",
    long_about = "Manage donation listings and requests, record impact, and generate impact reports.",
    after_help = "Examples:\n  surplus migrate\n  surplus --actor bakery-7 --role donor listing create --title Bagels --amount 4 --unit kg --pickup 'Back door'\n  surplus --actor pantry-2 --role recipient request submit <listing-id>\n  surplus --role analyst report generate monthly --start 2024-03-01"
)]
pub struct Cli {
    #[command(flatten)]
    identity: Identity,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Args)]
struct Identity {
    #[arg(long, global = true, default_value = "operator", help = "Acting user id")]
    actor: String,
    #[arg(
        long,
        global = true,
        default_value = "admin",
        help = "Acting role: admin|food_donor|recipient_org|data_analyst"
    )]
    role: String,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Inspect effective configuration values with source attribution")]
    Config,
    #[command(about = "Validate config, DB connectivity and schema readiness")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(subcommand, about = "Create, list and expire donation listings")]
    Listing(ListingCommand),
    #[command(subcommand, about = "Submit and move donation requests through their lifecycle")]
    Request(RequestCommand),
    #[command(subcommand, about = "Generate, list and export impact reports")]
    Report(ReportCommand),
    #[command(subcommand, about = "Inspect recorded impact")]
    Impact(ImpactCommand),
}

#[derive(Debug, Subcommand)]
enum ListingCommand {
    Create {
        #[arg(long)]
        title: String,
        #[arg(long)]
        description: Option<String>,
        #[arg(long, default_value = "other")]
        category: String,
        #[arg(long)]
        amount: f64,
        #[arg(long, help = "kg|lbs|servings|items")]
        unit: String,
        #[arg(long, help = "RFC3339 instant or YYYY-MM-DD")]
        expires_at: Option<String>,
        #[arg(long = "pickup")]
        pickup_location: String,
    },
    List {
        #[arg(long)]
        status: Option<String>,
        #[arg(long)]
        donor: Option<String>,
    },
    Expire {
        #[arg(long, help = "Sweep as of this instant instead of now")]
        now: Option<String>,
    },
}

#[derive(Debug, Subcommand)]
enum RequestCommand {
    Submit {
        listing_id: String,
        #[arg(long)]
        message: Option<String>,
        #[arg(long)]
        quantity: Option<f64>,
    },
    Approve {
        request_id: String,
    },
    Reject {
        request_id: String,
    },
    Complete {
        request_id: String,
    },
    List,
}

#[derive(Debug, Subcommand)]
enum ReportCommand {
    Generate {
        #[arg(help = "weekly|monthly|custom")]
        report_type: String,
        #[arg(long)]
        start: String,
        #[arg(long)]
        end: Option<String>,
    },
    List,
    Export {
        report_id: String,
    },
}

#[derive(Debug, Subcommand)]
enum ImpactCommand {
    Totals,
}

fn init_logging(config: &AppConfig) {
    use surplus_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);
    let builder = tracing_subscriber::fmt()
        .with_target(false)
        .with_max_level(log_level)
        .with_writer(std::io::stderr);

    let _ = match config.logging.format {
        Compact => builder.compact().try_init(),
        Pretty => builder.pretty().try_init(),
        Json => builder.json().try_init(),
    };
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    if let Ok(config) = AppConfig::load(LoadOptions::default()) {
        init_logging(&config);
    }

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Config => CommandResult { exit_code: 0, output: commands::config::run() },
        Command::Doctor { json } => {
            CommandResult { exit_code: 0, output: commands::doctor::run(json) }
        }
        Command::Listing(command) => match cli.identity.actor() {
            Ok(actor) => run_listing(&actor, command),
            Err(failure) => failure,
        },
        Command::Request(command) => match cli.identity.actor() {
            Ok(actor) => run_request(&actor, command),
            Err(failure) => failure,
        },
        Command::Report(command) => match cli.identity.actor() {
            Ok(actor) => run_report(&actor, command),
            Err(failure) => failure,
        },
        Command::Impact(ImpactCommand::Totals) => commands::impact::totals(),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}

impl Identity {
    fn actor(&self) -> Result<Actor, CommandResult> {
        self.role
            .parse::<Role>()
            .map(|role| Actor::new(self.actor.clone(), role))
            .map_err(|error| CommandResult::failure("identity", "validation", error.to_string(), 6))
    }
}

fn run_listing(actor: &Actor, command: ListingCommand) -> CommandResult {
    match command {
        ListingCommand::Create {
            title,
            description,
            category,
            amount,
            unit,
            expires_at,
            pickup_location,
        } => {
            let Some(category) = FoodCategory::parse(&category) else {
                return CommandResult::failure(
                    "listing create",
                    "validation",
                    format!(
                        "unknown category `{category}` (expected prepared|fresh_produce|packaged|baked_goods|other)"
                    ),
                    6,
                );
            };
            let expires_at = match expires_at.map(|raw| parse_instant("expires_at", &raw)).transpose()
            {
                Ok(expires_at) => expires_at,
                Err(error) => {
                    return CommandResult::from_application_error("listing create", &error);
                }
            };
            commands::listing::create(
                actor,
                NewListing {
                    title,
                    description,
                    category,
                    amount,
                    unit,
                    expires_at,
                    pickup_location,
                },
            )
        }
        ListingCommand::List { status, donor } => {
            commands::listing::list(status.as_deref(), donor.as_deref())
        }
        ListingCommand::Expire { now } => commands::listing::expire(actor, now.as_deref()),
    }
}

fn run_request(actor: &Actor, command: RequestCommand) -> CommandResult {
    match command {
        RequestCommand::Submit { listing_id, message, quantity } => {
            commands::request::submit(actor, &listing_id, message, quantity)
        }
        RequestCommand::Approve { request_id } => commands::request::approve(actor, &request_id),
        RequestCommand::Reject { request_id } => commands::request::reject(actor, &request_id),
        RequestCommand::Complete { request_id } => commands::request::complete(actor, &request_id),
        RequestCommand::List => commands::request::list(actor),
    }
}

fn run_report(actor: &Actor, command: ReportCommand) -> CommandResult {
    match command {
        ReportCommand::Generate { report_type, start, end } => {
            commands::report::generate(actor, &report_type, &start, end.as_deref())
        }
        ReportCommand::List => commands::report::list(),
        ReportCommand::Export { report_id } => commands::report::export(&report_id),
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::{Cli, Command, RequestCommand};

    #[test]
    fn identity_flags_are_global() {
        let cli = Cli::try_parse_from([
            "surplus",
            "request",
            "approve",
            "req-1",
            "--actor",
            "bakery-7",
            "--role",
            "donor",
        ])
        .expect("parse");

        assert_eq!(cli.identity.actor, "bakery-7");
        let actor = cli.identity.actor().expect("role");
        assert_eq!(actor.role.as_str(), "food_donor");
        assert!(matches!(
            cli.command,
            Command::Request(RequestCommand::Approve { ref request_id }) if request_id == "req-1"
        ));
    }

    #[test]
    fn unknown_roles_fail_with_validation_exit_code() {
        let cli = Cli::try_parse_from(["surplus", "--role", "mayor", "request", "list"])
            .expect("parse");
        let failure = cli.identity.actor().expect_err("unknown role");
        assert_eq!(failure.exit_code, 6);
    }
}
