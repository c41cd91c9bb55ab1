use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde::Serialize;
use uuid::Uuid;

use crate::application::{Coordinator, NewService};
use crate::config::Config;
use crate::domain::{
    Actor, BankDetails, Cents, ConsultantBalance, ConsultationService, Recipient, ServiceEdit,
    ServiceStatus, WithdrawalDecision, WithdrawalRequest, WithdrawalStatus, format_cents,
    parse_cents,
};
use crate::storage::{Repository, ServiceFilter, WithdrawalFilter};

/// Counsel - consultant earnings and service moderation
#[derive(Parser)]
#[command(name = "counsel")]
#[command(about = "Settle consultant withdrawals and moderate consultation services")]
#[command(version)]
pub struct Cli {
    /// Database file path (defaults to COUNSEL_DATABASE or counsel.db)
    #[arg(long, global = true)]
    pub database: Option<String>,

    /// Who is acting: "admin", "system", or a consultant UUID
    #[arg(long = "as", global = true, default_value = "admin", value_parser = parse_actor)]
    pub actor: Actor,

    /// Print results as JSON
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new database
    Init,

    /// Show a consultant's balance
    Balance {
        /// Consultant UUID (defaults to the acting consultant)
        consultant: Option<String>,
    },

    /// Credit an earning to a consultant
    Earning {
        /// Consultant UUID
        consultant: String,

        /// Amount earned (e.g., "150.00" or "150")
        amount: String,

        /// Hold the funds as pending until released
        #[arg(long)]
        pending: bool,
    },

    /// Move pending funds to available
    Release {
        /// Consultant UUID
        consultant: String,

        /// Amount to release
        amount: String,
    },

    /// Withdrawal request commands
    #[command(subcommand)]
    Withdraw(WithdrawCommands),

    /// Consultation service commands
    #[command(subcommand)]
    Service(ServiceCommands),

    /// Notification inbox of the acting party
    #[command(subcommand)]
    Inbox(InboxCommands),
}

#[derive(Subcommand)]
pub enum WithdrawCommands {
    /// Request a payout of available funds
    Submit {
        /// Amount to withdraw
        amount: String,

        /// Bank name
        #[arg(long)]
        bank: String,

        /// Account holder name
        #[arg(long)]
        holder: String,

        /// IBAN or account number
        #[arg(long)]
        iban: String,
    },

    /// Approve a pending request and settle the funds
    Approve {
        /// Withdrawal request ID
        id: String,

        /// Internal notes
        #[arg(short, long)]
        notes: Option<String>,
    },

    /// Reject a pending request
    Reject {
        /// Withdrawal request ID
        id: String,

        /// Reason shown to the consultant
        #[arg(short, long)]
        reason: String,

        /// Internal notes
        #[arg(short, long)]
        notes: Option<String>,
    },

    /// Replace the admin notes on a request
    Annotate {
        /// Withdrawal request ID
        id: String,

        /// New notes (omit to clear)
        notes: Option<String>,
    },

    /// List withdrawal requests
    List {
        /// Filter by consultant UUID
        #[arg(long)]
        consultant: Option<String>,

        /// Filter by status: pending, approved, rejected
        #[arg(long)]
        status: Option<String>,
    },

    /// Show one withdrawal request
    Show {
        /// Withdrawal request ID
        id: String,
    },
}

#[derive(Subcommand)]
pub enum ServiceCommands {
    /// Submit a new service for moderation
    Create {
        /// Service title
        #[arg(short, long)]
        title: String,

        /// Description
        #[arg(short, long, default_value = "")]
        description: String,

        /// Price per session
        #[arg(short, long)]
        price: String,

        /// Session length in minutes
        #[arg(long, default_value = "60")]
        duration: i64,
    },

    /// Approve a pending service
    Approve { id: String },

    /// Reject a pending service
    Reject {
        id: String,

        /// Reason shown to the consultant
        #[arg(short, long)]
        reason: String,
    },

    /// Hide an active service from the public listing
    Draft {
        id: String,

        /// Reason shown to the consultant
        #[arg(short, long)]
        reason: String,
    },

    /// Make a draft or rejected service active again
    Republish { id: String },

    /// Change a service's content
    Edit {
        id: String,

        #[arg(short, long)]
        title: Option<String>,

        #[arg(short, long)]
        description: Option<String>,

        #[arg(short, long)]
        price: Option<String>,

        #[arg(long)]
        duration: Option<i64>,
    },

    /// Delete a service
    Delete { id: String },

    /// Show one service
    Show { id: String },

    /// List services
    List {
        /// Filter by consultant UUID
        #[arg(long)]
        consultant: Option<String>,

        /// Filter by status: pending, active, rejected, draft
        #[arg(long)]
        status: Option<String>,
    },

    /// List services visible to customers
    Public,
}

#[derive(Subcommand)]
pub enum InboxCommands {
    /// List notifications, newest first
    List {
        /// Only unread notifications
        #[arg(long)]
        unread: bool,
    },

    /// Mark a notification read
    Read { id: String },
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        let config = Config::from_env()?;
        let database = self
            .database
            .clone()
            .unwrap_or_else(|| config.database_path.clone());

        if matches!(self.command, Commands::Init) {
            Repository::init(&format!("sqlite:{}?mode=rwc", database)).await?;
            println!("Database initialized: {}", database);
            return Ok(());
        }

        let repo = Arc::new(Repository::connect(&format!("sqlite:{}", database)).await?);
        let coordinator = Coordinator::with_repository(repo.clone(), config.policy, repo.clone());
        let actor = self.actor;
        let json = self.json;

        match self.command {
            Commands::Init => {}

            Commands::Balance { consultant } => {
                let consultant_id = match consultant {
                    Some(id) => parse_id(&id, "consultant")?,
                    None => match actor {
                        Actor::Consultant(id) => id,
                        _ => bail!("Specify a consultant UUID"),
                    },
                };
                let balance = coordinator.balance(&actor, consultant_id).await?;
                output(json, &balance, print_balance)?;
            }

            Commands::Earning {
                consultant,
                amount,
                pending,
            } => {
                let consultant_id = parse_id(&consultant, "consultant")?;
                let amount_cents = parse_amount(&amount)?;
                let balance = coordinator
                    .record_earning(&actor, consultant_id, amount_cents, !pending)
                    .await?;
                output(json, &balance, print_balance)?;
            }

            Commands::Release { consultant, amount } => {
                let consultant_id = parse_id(&consultant, "consultant")?;
                let amount_cents = parse_amount(&amount)?;
                let balance = coordinator
                    .release_pending(&actor, consultant_id, amount_cents)
                    .await?;
                output(json, &balance, print_balance)?;
            }

            Commands::Withdraw(cmd) => run_withdraw_command(&coordinator, &actor, json, cmd).await?,

            Commands::Service(cmd) => run_service_command(&coordinator, &actor, json, cmd).await?,

            Commands::Inbox(cmd) => run_inbox_command(&repo, &actor, json, cmd).await?,
        }

        Ok(())
    }
}

async fn run_withdraw_command(
    coordinator: &Coordinator,
    actor: &Actor,
    json: bool,
    cmd: WithdrawCommands,
) -> Result<()> {
    match cmd {
        WithdrawCommands::Submit {
            amount,
            bank,
            holder,
            iban,
        } => {
            let Actor::Consultant(consultant_id) = *actor else {
                bail!("Withdrawals are requested by a consultant: pass --as <consultant-uuid>");
            };
            let amount_cents = parse_amount(&amount)?;
            let request = coordinator
                .submit_withdrawal(
                    actor,
                    consultant_id,
                    amount_cents,
                    BankDetails::new(bank, holder, iban),
                )
                .await?;
            output(json, &request, print_withdrawal)?;
        }

        WithdrawCommands::Approve { id, notes } => {
            let id = parse_id(&id, "withdrawal request")?;
            let request = coordinator
                .decide_withdrawal(actor, id, WithdrawalDecision::Approve, notes)
                .await?;
            output(json, &request, print_withdrawal)?;
        }

        WithdrawCommands::Reject { id, reason, notes } => {
            let id = parse_id(&id, "withdrawal request")?;
            let request = coordinator
                .decide_withdrawal(actor, id, WithdrawalDecision::Reject { reason }, notes)
                .await?;
            output(json, &request, print_withdrawal)?;
        }

        WithdrawCommands::Annotate { id, notes } => {
            let id = parse_id(&id, "withdrawal request")?;
            let request = coordinator.annotate_withdrawal(actor, id, notes).await?;
            output(json, &request, print_withdrawal)?;
        }

        WithdrawCommands::List { consultant, status } => {
            let filter = WithdrawalFilter {
                consultant_id: consultant
                    .map(|c| parse_id(&c, "consultant"))
                    .transpose()?,
                status: status
                    .map(|s| {
                        WithdrawalStatus::from_str(&s)
                            .with_context(|| format!("Unknown withdrawal status '{}'", s))
                    })
                    .transpose()?,
            };
            let requests = coordinator.list_withdrawals(actor, filter).await?;
            output(json, &requests, |requests| print_withdrawal_table(requests))?;
        }

        WithdrawCommands::Show { id } => {
            let id = parse_id(&id, "withdrawal request")?;
            let request = coordinator.get_withdrawal(actor, id).await?;
            output(json, &request, print_withdrawal)?;
        }
    }
    Ok(())
}

async fn run_service_command(
    coordinator: &Coordinator,
    actor: &Actor,
    json: bool,
    cmd: ServiceCommands,
) -> Result<()> {
    match cmd {
        ServiceCommands::Create {
            title,
            description,
            price,
            duration,
        } => {
            let Actor::Consultant(consultant_id) = *actor else {
                bail!("Services are created by a consultant: pass --as <consultant-uuid>");
            };
            let new = NewService {
                title,
                description,
                price_cents: parse_amount(&price)?,
                duration_minutes: duration,
            };
            let service = coordinator.create_service(actor, consultant_id, new).await?;
            output(json, &service, print_service)?;
        }

        ServiceCommands::Approve { id } => {
            let service = coordinator
                .approve_service(actor, parse_id(&id, "service")?)
                .await?;
            output(json, &service, print_service)?;
        }

        ServiceCommands::Reject { id, reason } => {
            let service = coordinator
                .reject_service(actor, parse_id(&id, "service")?, &reason)
                .await?;
            output(json, &service, print_service)?;
        }

        ServiceCommands::Draft { id, reason } => {
            let service = coordinator
                .convert_service_to_draft(actor, parse_id(&id, "service")?, &reason)
                .await?;
            output(json, &service, print_service)?;
        }

        ServiceCommands::Republish { id } => {
            let service = coordinator
                .republish_service(actor, parse_id(&id, "service")?)
                .await?;
            output(json, &service, print_service)?;
        }

        ServiceCommands::Edit {
            id,
            title,
            description,
            price,
            duration,
        } => {
            let edit = ServiceEdit {
                title,
                description,
                price_cents: price.map(|p| parse_amount(&p)).transpose()?,
                duration_minutes: duration,
            };
            let service = coordinator
                .edit_service(actor, parse_id(&id, "service")?, edit)
                .await?;
            output(json, &service, print_service)?;
        }

        ServiceCommands::Delete { id } => {
            let service = coordinator
                .delete_service(actor, parse_id(&id, "service")?)
                .await?;
            if json {
                print_json(&service)?;
            } else {
                println!("Deleted service '{}' ({})", service.title, service.id);
            }
        }

        ServiceCommands::Show { id } => {
            let service = coordinator
                .get_service(actor, parse_id(&id, "service")?)
                .await?;
            output(json, &service, print_service)?;
        }

        ServiceCommands::List { consultant, status } => {
            let filter = ServiceFilter {
                consultant_id: consultant
                    .map(|c| parse_id(&c, "consultant"))
                    .transpose()?,
                status: status
                    .map(|s| {
                        ServiceStatus::from_str(&s)
                            .with_context(|| format!("Unknown service status '{}'", s))
                    })
                    .transpose()?,
            };
            let services = coordinator.list_services(actor, filter).await?;
            output(json, &services, |services| print_service_table(services))?;
        }

        ServiceCommands::Public => {
            let services = coordinator.list_public_services().await?;
            output(json, &services, |services| print_service_table(services))?;
        }
    }
    Ok(())
}

async fn run_inbox_command(
    repo: &Repository,
    actor: &Actor,
    json: bool,
    cmd: InboxCommands,
) -> Result<()> {
    let recipient = match *actor {
        Actor::Admin => Recipient::Admin,
        Actor::Consultant(id) => Recipient::Consultant(id),
        Actor::System => bail!("The system actor has no inbox"),
    };

    match cmd {
        InboxCommands::List { unread } => {
            let entries = repo.list_notifications(recipient, unread).await?;
            if json {
                print_json(&entries)?;
            } else if entries.is_empty() {
                println!("No notifications.");
            } else {
                for entry in entries {
                    let n = &entry.notification;
                    println!(
                        "{} {} [{}] {}",
                        if entry.read { " " } else { "*" },
                        n.created_at.format("%Y-%m-%d %H:%M"),
                        n.severity,
                        n.title
                    );
                    println!("    {}", n.message);
                    println!("    id: {}", n.id);
                }
            }
        }

        InboxCommands::Read { id } => {
            let id = parse_id(&id, "notification")?;
            if repo.mark_notification_read(recipient, id).await? {
                println!("Marked read: {}", id);
            } else {
                println!("Nothing to mark: {} is not in your unread inbox", id);
            }
        }
    }
    Ok(())
}

fn parse_actor(s: &str) -> Result<Actor, String> {
    Actor::from_str(s)
        .ok_or_else(|| format!("'{}' is not 'admin', 'system' or a consultant UUID", s))
}

fn parse_id(s: &str, what: &str) -> Result<Uuid> {
    Uuid::parse_str(s).with_context(|| format!("Invalid {} ID (expected UUID): {}", what, s))
}

fn parse_amount(s: &str) -> Result<Cents> {
    parse_cents(s).context("Invalid amount format. Use '50.00' or '50'")
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn output<T: Serialize + ?Sized>(json: bool, value: &T, human: impl FnOnce(&T)) -> Result<()> {
    if json {
        print_json(value)
    } else {
        human(value);
        Ok(())
    }
}

fn print_balance(balance: &ConsultantBalance) {
    println!("Consultant: {}", balance.consultant_id);
    println!("Available:  {:>12}", format_cents(balance.available));
    println!("Pending:    {:>12}", format_cents(balance.pending));
    println!("Withdrawn:  {:>12}", format_cents(balance.withdrawn));
}

fn print_withdrawal(request: &WithdrawalRequest) {
    println!("Withdrawal: {}", request.id);
    println!("Consultant: {}", request.consultant_id);
    println!("Amount:     {}", format_cents(request.amount_cents));
    println!("Status:     {}", request.status);
    println!(
        "Bank:       {} / {} / {}",
        request.bank.bank_name, request.bank.account_holder, request.bank.iban
    );
    println!(
        "Created:    {}",
        request.created_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    if let Some(processed_at) = request.processed_at {
        println!(
            "Processed:  {}",
            processed_at.format("%Y-%m-%d %H:%M:%S UTC")
        );
    }
    if let Some(reason) = &request.rejection_reason {
        println!("Reason:     {}", reason);
    }
    if let Some(notes) = &request.admin_notes {
        println!("Notes:      {}", notes);
    }
}

fn print_withdrawal_table(requests: &[WithdrawalRequest]) {
    if requests.is_empty() {
        println!("No withdrawal requests found.");
        return;
    }
    println!(
        "{:<12} {:>12} {:<10} {:<38} ID",
        "DATE", "AMOUNT", "STATUS", "CONSULTANT"
    );
    println!("{}", "-".repeat(110));
    for request in requests {
        println!(
            "{:<12} {:>12} {:<10} {:<38} {}",
            request.created_at.format("%Y-%m-%d"),
            format_cents(request.amount_cents),
            request.status,
            request.consultant_id,
            request.id
        );
    }
}

fn print_service(service: &ConsultationService) {
    println!("Service:    {}", service.id);
    println!("Title:      {}", service.title);
    println!("Consultant: {}", service.consultant_id);
    println!("Price:      {}", format_cents(service.price_cents));
    println!("Duration:   {} min", service.duration_minutes);
    println!("Status:     {}", service.status);
    if let Some(reason) = &service.rejection_reason {
        println!("Reason:     {}", reason);
    }
    if !service.description.is_empty() {
        println!();
        println!("{}", service.description);
    }
}

fn print_service_table(services: &[ConsultationService]) {
    if services.is_empty() {
        println!("No services found.");
        return;
    }
    println!(
        "{:<30} {:>10} {:>6} {:<9} ID",
        "TITLE", "PRICE", "MIN", "STATUS"
    );
    println!("{}", "-".repeat(96));
    for service in services {
        println!(
            "{:<30} {:>10} {:>6} {:<9} {}",
            truncate(&service.title, 30),
            format_cents(service.price_cents),
            service.duration_minutes,
            service.status,
            service.id
        );
    }
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_len - 3).collect();
        format!("{}...", head)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_actor() {
        assert_eq!(parse_actor("admin"), Ok(Actor::Admin));
        assert_eq!(parse_actor("SYSTEM"), Ok(Actor::System));
        let id = Uuid::new_v4();
        assert_eq!(parse_actor(&id.to_string()), Ok(Actor::Consultant(id)));
        assert!(parse_actor("root").is_err());
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("a very long service title", 10), "a very ...");
    }

    #[test]
    fn test_cli_parses_global_actor() {
        let id = Uuid::new_v4();
        let cli = Cli::try_parse_from([
            "counsel",
            "withdraw",
            "submit",
            "150.00",
            "--bank",
            "First Bank",
            "--holder",
            "Dana Smith",
            "--iban",
            "DE89370400440532013000",
            "--as",
            &id.to_string(),
        ])
        .unwrap();
        assert_eq!(cli.actor, Actor::Consultant(id));
        assert!(matches!(
            cli.command,
            Commands::Withdraw(WithdrawCommands::Submit { .. })
        ));
    }
}
