use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use clap::{ArgGroup, Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod api;
mod bulk;
mod clearance;
mod config;
mod db;
mod error;
#[cfg(test)]
mod fake;
mod feed;
mod import;
mod models;
mod permits;
mod report;
mod roles;
mod sms;

use api::{ApiClient, RequirementStore};
use clearance::SignOutcome;
use config::{ApiConfig, FeedConfig};
use error::ApiError;
use feed::FeedEvent;
use models::{RequirementKey, RequirementStatus, StudentRequirement};
use roles::{AuthContext, RouteDecision, View};

#[derive(Parser)]
#[command(name = "clearance-desk")]
#[command(about = "Student clearance desk for admins, clearing officers and students", long_about = None)]
struct Cli {
    /// Base URL of the clearance backend
    #[arg(long, global = true, env = "CLEARANCE_API_URL", default_value = "http://localhost:5000/api")]
    api_url: String,
    #[arg(long, global = true, env = "CLEARANCE_API_TOKEN", hide_env_values = true)]
    api_token: Option<String>,
    /// Role of the signed-in user; omit to act as a guest
    #[arg(long, global = true, env = "CLEARANCE_ROLE")]
    role: Option<String>,
    /// Id of the signed-in user; students may only open their own records
    #[arg(long, global = true, env = "CLEARANCE_USER_ID")]
    user_id: Option<String>,
    #[arg(long, global = true, env = "CLEARANCE_HTTP_TIMEOUT_MS", default_value_t = config::DEFAULT_HTTP_TIMEOUT_MS)]
    http_timeout_ms: u64,
    #[arg(long, global = true, env = "CLEARANCE_FEED_POLL_MS", default_value_t = config::DEFAULT_FEED_POLL_MS)]
    feed_poll_ms: u64,
    /// Emit logs as JSON lines
    #[arg(long, global = true, env = "CLEARANCE_LOG_JSON")]
    log_json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the notification schema
    InitDb,
    /// Load sample notifications
    Seed,
    /// Show where a guest-only page sends the current user
    Guard {
        #[arg(long, default_value = "/")]
        path: String,
    },
    /// List requirement definitions
    Requirements,
    /// Show clearance progress for one student
    Status {
        #[arg(long)]
        student: String,
    },
    /// Set the status of a student's requirement, creating it if needed
    Sign {
        #[arg(long)]
        student: String,
        #[arg(long)]
        co_id: String,
        #[arg(long)]
        requirement: String,
        #[arg(long, default_value = "signed")]
        status: RequirementStatus,
        /// Signing role; defaults to --role
        #[arg(long)]
        signed_by: Option<String>,
    },
    /// Mark every outstanding requirement as missing after a deadline
    Sweep {
        #[arg(long)]
        co_id: Option<String>,
        #[arg(long)]
        requirement: Option<String>,
        #[arg(long)]
        dry_run: bool,
    },
    /// Bulk-create student requirements from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Issue a QR examination permit to a fully cleared student
    IssuePermit {
        #[arg(long)]
        student: String,
        #[arg(long)]
        exam_period: Option<String>,
    },
    /// Look up a permit by its QR payload
    ScanPermit {
        #[arg(long)]
        code: String,
    },
    /// Text every student who still has unsigned requirements
    SmsReminders {
        /// CSV with student_id,number columns
        #[arg(long)]
        contacts: PathBuf,
        #[arg(long)]
        dry_run: bool,
    },
    /// Generate a markdown clearance report
    #[command(group(
        ArgGroup::new("scope")
            .args(["student", "co_id"])
            .multiple(false)
    ))]
    Report {
        #[arg(long)]
        student: Option<String>,
        #[arg(long)]
        co_id: Option<String>,
        #[arg(long, default_value = "clearance-report.md")]
        out: PathBuf,
    },
    /// Post a notification to a user
    Notify {
        #[arg(long)]
        user: String,
        #[arg(long)]
        title: String,
        #[arg(long)]
        message: String,
    },
    /// Follow a user's notifications until interrupted
    Watch {
        #[arg(long)]
        user: String,
    },
    /// Mark all of a user's notifications as read
    MarkRead {
        #[arg(long)]
        user: String,
    },
}

fn init_tracing(log_json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);
    let ctx = AuthContext::new(cli.role.is_some(), cli.role.as_deref())
        .with_user_id(cli.user_id.as_deref());
    let api = ApiClient::new(&ApiConfig::new(
        &cli.api_url,
        cli.api_token.clone(),
        cli.http_timeout_ms,
    ))
    .context("failed to build HTTP client")?;
    let feed_config = FeedConfig::new(cli.feed_poll_ms);

    match cli.command {
        Commands::InitDb => {
            let pool = connect_db().await?;
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            let pool = connect_db().await?;
            db::seed(&pool).await?;
            println!("Seed notifications inserted.");
        }
        Commands::Guard { path } => match roles::guest_guard(&ctx, &path) {
            RouteDecision::Render => println!("{path}: render"),
            RouteDecision::Redirect(to) => println!("{path}: redirect to {to}"),
        },
        Commands::Requirements => {
            authorize(&ctx, View::Requirements)?;
            let Some(requirements) = report_failure(api.list_requirements().await) else {
                return Ok(());
            };
            if requirements.is_empty() {
                println!("No requirements defined.");
            }
            for req in requirements {
                let deadline = req
                    .deadline
                    .map(|d| format!(" (due {d})"))
                    .unwrap_or_default();
                println!("- {} [{}]{}", req.name, req.id, deadline);
            }
        }
        Commands::Status { student } => {
            authorize(&ctx, View::Requirements)?;
            authorize_student(&ctx, &student)?;
            let Some(all) = fetch_all(&api).await else {
                return Ok(());
            };
            let stats = clearance::clearance_stats(&student, &all);
            if stats.total == 0 {
                println!("No requirements recorded for {student}.");
                return Ok(());
            }
            println!(
                "{student}: {}/{} signed, {} incomplete, {} missing. {}",
                stats.signed,
                stats.total,
                stats.incomplete,
                stats.missing,
                if stats.is_cleared {
                    "Fully cleared."
                } else {
                    "Not yet cleared."
                }
            );
            for record in all.iter().filter(|r| r.student_id == student) {
                println!("  - {} by {}: {}", requirement_label(record), record.signed_by, record.status);
            }
        }
        Commands::Sign {
            student,
            co_id,
            requirement,
            status,
            signed_by,
        } => {
            authorize(&ctx, View::SignRequirements)?;
            let signed_by = signed_by
                .or_else(|| cli.role.clone())
                .context("--signed-by is required when no role is set")?;
            let Some(all) = fetch_all(&api).await else {
                return Ok(());
            };
            let key = RequirementKey {
                student_id: student,
                co_id,
                requirement_id: requirement,
                signed_by: signed_by.to_ascii_lowercase(),
            };
            match report_failure(clearance::sign_requirement(&api, &all, &key, status).await) {
                Some(SignOutcome::Created(r)) => println!("Created {} as {}.", r.id, r.status),
                Some(SignOutcome::Updated(r)) => println!("Updated {} to {}.", r.id, r.status),
                Some(SignOutcome::Unchanged(r)) => println!("{} is already {}.", r.id, r.status),
                None => {}
            }
        }
        Commands::Sweep {
            co_id,
            requirement,
            dry_run,
        } => {
            authorize(&ctx, View::SignRequirements)?;
            let Some(all) = fetch_all(&api).await else {
                return Ok(());
            };
            let scoped: Vec<StudentRequirement> = all
                .into_iter()
                .filter(|r| co_id.as_deref().map_or(true, |co| r.co_id == co))
                .filter(|r| requirement.as_deref().map_or(true, |req| r.requirement_id == req))
                .collect();
            let pending = scoped
                .iter()
                .filter(|r| r.status != RequirementStatus::Missing)
                .count();
            if dry_run {
                println!("{pending} of {} requirements would be marked missing.", scoped.len());
                return Ok(());
            }
            let outcome = clearance::bulk_sweep_to_missing(&api, &scoped).await;
            println!(
                "Marked {} requirements missing ({} failed).",
                outcome.updated, outcome.failed
            );
        }
        Commands::Import { csv } => {
            authorize(&ctx, View::SignRequirements)?;
            let file = std::fs::File::open(&csv)
                .with_context(|| format!("failed to open {}", csv.display()))?;
            let rows = import::read_requirement_rows(file)?;
            let Some(all) = fetch_all(&api).await else {
                return Ok(());
            };
            let plan = clearance::plan_bulk_create(&all, rows);
            let outcome = clearance::bulk_create(&api, &plan).await;
            println!(
                "Created {} requirements from {} ({} duplicates skipped, {} failed).",
                outcome.updated,
                csv.display(),
                plan.duplicates,
                outcome.failed
            );
        }
        Commands::IssuePermit {
            student,
            exam_period,
        } => {
            authorize(&ctx, View::Permits)?;
            authorize_student(&ctx, &student)?;
            let Some(all) = fetch_all(&api).await else {
                return Ok(());
            };
            if let Some(permit) = report_failure(
                permits::issue_permit(&api, &student, exam_period.as_deref(), &all).await,
            ) {
                println!(
                    "Permit {} issued to {} at {}. QR: {}",
                    permit.id, permit.student_id, permit.issued_at, permit.qr_code
                );
            }
        }
        Commands::ScanPermit { code } => {
            authorize(&ctx, View::ScanPermits)?;
            if let Some(permit) = report_failure(permits::lookup_permit(&api, &code).await) {
                let period = permit.exam_period.as_deref().unwrap_or("any period");
                println!(
                    "Valid permit {} for {} ({period}), issued {}.",
                    permit.id, permit.student_id, permit.issued_at
                );
            }
        }
        Commands::SmsReminders { contacts, dry_run } => {
            authorize(&ctx, View::Sms)?;
            let file = std::fs::File::open(&contacts)
                .with_context(|| format!("failed to open {}", contacts.display()))?;
            let directory = import::read_contacts(file)?;
            let Some(all) = fetch_all(&api).await else {
                return Ok(());
            };
            let batch = sms::build_reminders(&all, &directory);
            for student in batch.without_number.iter() {
                println!("No usable number for {student}; skipped.");
            }
            if dry_run {
                for message in batch.messages.iter() {
                    println!("{}: {}", message.number, message.message);
                }
                return Ok(());
            }
            let outcome = sms::send_bulk(&api, &batch.messages).await;
            println!("Sent {} reminders ({} failed).", outcome.updated, outcome.failed);
        }
        Commands::Report {
            student,
            co_id,
            out,
        } => {
            authorize(&ctx, View::Analytics)?;
            let Some(all) = fetch_all(&api).await else {
                return Ok(());
            };
            let scoped: Vec<StudentRequirement> = all
                .into_iter()
                .filter(|r| student.as_deref().map_or(true, |s| r.student_id == s))
                .filter(|r| co_id.as_deref().map_or(true, |co| r.co_id == co))
                .collect();
            let report = report::build_report(
                student.as_deref().or(co_id.as_deref()),
                Utc::now(),
                &scoped,
            );
            write_report(&out, &report)?;
            println!("Report written to {}.", out.display());
        }
        Commands::Notify {
            user,
            title,
            message,
        } => {
            authorize(&ctx, View::Users)?;
            let pool = connect_db().await?;
            let notification = db::insert_notification(&pool, &user, &title, &message).await?;
            println!("Notification {} sent to {}.", notification.id, notification.user_id);
        }
        Commands::Watch { user } => {
            authorize(&ctx, View::Notifications)?;
            authorize_student(&ctx, &user)?;
            let pool = connect_db().await?;
            watch(pool, user, feed_config).await;
        }
        Commands::MarkRead { user } => {
            authorize(&ctx, View::Notifications)?;
            authorize_student(&ctx, &user)?;
            let pool = connect_db().await?;
            let updated = db::mark_all_read(&pool, &user).await?;
            println!("Marked {updated} notifications read.");
        }
    }

    Ok(())
}

async fn connect_db() -> anyhow::Result<PgPool> {
    let database_url = std::env::var("DATABASE_URL")
        .context("DATABASE_URL must be set to the notification Postgres instance")?;

    PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")
}

fn authorize(ctx: &AuthContext, view: View) -> anyhow::Result<()> {
    match roles::protected_guard(ctx, view) {
        RouteDecision::Render => Ok(()),
        RouteDecision::Redirect(to) => {
            let role = ctx.role.as_deref().unwrap_or("guest");
            anyhow::bail!("{role} cannot open {view:?}; redirected to {to}")
        }
    }
}

fn authorize_student(ctx: &AuthContext, student_id: &str) -> anyhow::Result<()> {
    match roles::student_records_guard(ctx, student_id) {
        RouteDecision::Render => Ok(()),
        RouteDecision::Redirect(to) => {
            anyhow::bail!("records of {student_id} are not visible to this user; redirected to {to}")
        }
    }
}

fn write_report(out: &Path, report: &str) -> anyhow::Result<()> {
    std::fs::write(out, report)
        .with_context(|| format!("failed to write report to {}", out.display()))
}

/// Logs a failed call and shows the user-facing message. `None` means the
/// operation failed, not that the result was empty.
fn report_failure<T>(result: Result<T, ApiError>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(err) => {
            error!(error = %err, "request failed");
            eprintln!("{}", err.user_message());
            None
        }
    }
}

async fn fetch_all(api: &ApiClient) -> Option<Vec<StudentRequirement>> {
    report_failure(api.list_student_requirements().await)
}

fn requirement_label(record: &StudentRequirement) -> &str {
    record
        .requirement
        .as_ref()
        .map(|r| r.name.as_str())
        .unwrap_or(record.requirement_id.as_str())
}

async fn watch(pool: PgPool, user: String, feed_config: FeedConfig) {
    let source = Arc::new(db::PgNotificationSource::new(pool));
    let mut subscription = feed::subscribe(source, user.clone(), feed_config.poll_interval);
    info!(user = %user, "watching notifications; press Ctrl-C to stop");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = subscription.next() => match event {
                Some(FeedEvent::Arrived(n)) => println!("[new] {}: {}", n.title, n.message),
                Some(FeedEvent::Unread(count)) => println!("{count} unread"),
                None => break,
            },
        }
    }

    subscription.unsubscribe().await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_come_from_flags_with_defaults() {
        let cli = Cli::try_parse_from(["clearance-desk", "requirements"]).expect("parse");
        assert_eq!(cli.http_timeout_ms, config::DEFAULT_HTTP_TIMEOUT_MS);
        assert_eq!(cli.feed_poll_ms, config::DEFAULT_FEED_POLL_MS);

        let cli = Cli::try_parse_from([
            "clearance-desk",
            "watch",
            "--user",
            "2021-0001",
            "--feed-poll-ms",
            "750",
            "--log-json",
        ])
        .expect("parse");
        assert_eq!(cli.feed_poll_ms, 750);
        assert!(cli.log_json);
    }

    #[test]
    fn malformed_numbers_are_rejected() {
        let parsed = Cli::try_parse_from([
            "clearance-desk",
            "requirements",
            "--http-timeout-ms",
            "fifteen",
        ]);
        assert!(parsed.is_err());
    }

    #[test]
    fn students_cannot_query_other_students() {
        let ctx = AuthContext::new(true, Some("student")).with_user_id(Some("2021-0001"));
        assert!(authorize_student(&ctx, "2021-0001").is_ok());
        let err = authorize_student(&ctx, "2021-0002").expect_err("other student");
        assert!(err.to_string().contains("2021-0002"));
    }

    #[test]
    fn report_write_failure_names_the_path() {
        let out = std::env::temp_dir()
            .join("clearance-desk-missing-dir")
            .join("nested")
            .join("report.md");
        let err = write_report(&out, "# Clearance Status Report").expect_err("missing dir");
        assert!(err.to_string().contains("failed to write report to"));
        assert!(err.to_string().contains("report.md"));
    }
}
