use std::path::PathBuf;

use anyhow::Context;
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uuid::Uuid;

mod aggregate;
mod codec;
mod config;
mod db;
mod identity;
mod import;
mod models;
mod report;
mod service;
mod status;
mod store;
mod validation;

use crate::config::Settings;
use crate::db::PgStore;
use crate::identity::{IdentityError, IdentityProvider, ProfileDirectory, Session};
use crate::models::{GradeSheetStatus, PanelGrades, SheetDetails, User, UserRole};
use crate::service::{AccountSync, GradingService, NewUser};
use crate::store::{DocumentStore, UserFilter};

#[derive(Parser)]
#[command(name = "defense-grading")]
#[command(about = "Thesis defense panel grading for course advisers and panelists", long_about = None)]
struct Cli {
    #[command(flatten)]
    settings: Settings,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct SheetArgs {
    #[arg(long)]
    group: String,
    /// Student name; repeat in display order
    #[arg(long = "proponent")]
    proponents: Vec<String>,
    /// Candidate title; repeat for each proposal
    #[arg(long = "title")]
    titles: Vec<String>,
    #[arg(long)]
    selected_title: Option<String>,
    #[arg(long)]
    program: String,
    #[arg(long)]
    date: NaiveDate,
    #[arg(long)]
    venue: String,
    /// Email of the first panelist
    #[arg(long)]
    panel1: Option<String>,
    /// Email of the second panelist
    #[arg(long)]
    panel2: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Sign in with a password through the identity provider
    Login {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    /// Print how to stay signed out; no session outlives a single run
    Logout,
    /// Load realistic seed data
    Seed,
    /// Import grading groups from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Grade sheets visible to the signed-in user
    Dashboard,
    /// Every grade sheet, optionally filtered by status
    Masterlist {
        #[arg(long, value_parser = parse_status)]
        status: Option<GradeSheetStatus>,
    },
    /// Show one grade sheet in full
    Show {
        #[arg(long)]
        sheet: Uuid,
    },
    /// Create a grade sheet for a group
    CreateSheet(SheetArgs),
    /// Replace a grade sheet's details
    EditSheet {
        #[arg(long)]
        sheet: Uuid,
        #[command(flatten)]
        details: SheetArgs,
    },
    /// Pick the defended title, or clear it when omitted
    SelectTitle {
        #[arg(long)]
        sheet: Uuid,
        #[arg(long)]
        title: Option<String>,
    },
    /// Delete a grade sheet and its grades
    DeleteSheet {
        #[arg(long)]
        sheet: Uuid,
    },
    /// Save your panel grades for a sheet
    Grade {
        #[arg(long)]
        sheet: Uuid,
        /// criterion=score; repeat per criterion
        #[arg(long = "score", value_parser = parse_score)]
        scores: Vec<(String, f64)>,
        #[arg(long)]
        comments: Option<String>,
        /// Finalize the grades; they cannot be edited afterwards
        #[arg(long)]
        submit: bool,
    },
    /// Generate a markdown masterlist report
    Report {
        #[arg(long, default_value = "masterlist.md")]
        out: PathBuf,
    },
    /// List known defense venues
    Venues,
    /// Record a venue unless it already exists
    AddVenue {
        #[arg(long)]
        name: String,
    },
    /// List user profiles
    Users,
    /// Create a user profile
    AddUser {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long, value_parser = parse_role)]
        role: UserRole,
        /// Also create an identity-provider account with this password
        #[arg(long)]
        password: Option<String>,
    },
    /// Change a profile's name, email or role
    UpdateUser {
        #[arg(long)]
        id: Uuid,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        email: Option<String>,
        #[arg(long, value_parser = parse_role)]
        role: Option<UserRole>,
    },
    /// Delete a profile; its panel seats become unassigned
    DeleteUser {
        #[arg(long)]
        id: Uuid,
    },
    /// Change the operator's password at the identity provider
    ChangePassword {
        #[arg(long)]
        old: String,
        #[arg(long)]
        new: String,
    },
}

fn parse_score(raw: &str) -> Result<(String, f64), String> {
    let (criterion, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected criterion=score, got `{raw}`"))?;
    let criterion = criterion.trim();
    if criterion.is_empty() {
        return Err("criterion name must not be empty".to_string());
    }
    let value: f64 = value
        .trim()
        .parse()
        .map_err(|_| format!("`{value}` is not a number"))?;
    if !value.is_finite() {
        return Err(format!("score for `{criterion}` must be a finite number"));
    }
    Ok((criterion.to_string(), value))
}

fn normalize(raw: &str) -> String {
    raw.trim().to_ascii_uppercase().replace('-', "_")
}

fn parse_role(raw: &str) -> Result<UserRole, String> {
    UserRole::parse(&normalize(raw)).ok_or_else(|| {
        format!("unknown role `{raw}` (expected admin, course-adviser or panel)")
    })
}

fn parse_status(raw: &str) -> Result<GradeSheetStatus, String> {
    GradeSheetStatus::parse(&normalize(raw)).ok_or_else(|| format!("unknown status `{raw}`"))
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

async fn user_by_email<S: DocumentStore>(store: &S, email: &str) -> anyhow::Result<User> {
    store
        .list_users(&UserFilter::by_email(email), 1, 0)
        .await?
        .into_iter()
        .next()
        .with_context(|| format!("no user profile for {email}"))
}

async fn sheet_details<S: DocumentStore>(store: &S, args: SheetArgs) -> anyhow::Result<SheetDetails> {
    let panel1_id = match args.panel1.as_deref() {
        Some(email) => Some(user_by_email(store, email).await?.id),
        None => None,
    };
    let panel2_id = match args.panel2.as_deref() {
        Some(email) => Some(user_by_email(store, email).await?.id),
        None => None,
    };

    Ok(SheetDetails {
        group_name: args.group,
        proponents: args.proponents,
        proposed_titles: args.titles,
        selected_title: args.selected_title,
        program: args.program,
        date: args.date,
        venue: args.venue,
        panel1_id,
        panel2_id,
    })
}

fn report_account_sync(sync: &AccountSync) {
    match sync {
        AccountSync::Done => println!("Identity provider account updated."),
        AccountSync::Skipped => {}
        AccountSync::Unsupported(op) => println!(
            "Note: {op} is not available here; finish it in the identity provider console."
        ),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let policy = cli
        .settings
        .policy()
        .context("invalid grading configuration")?;

    let pool = db::connect(cli.settings.database_url()?, cli.settings.max_connections).await?;

    match cli.command {
        Commands::InitDb => {
            db::init_db(&pool).await?;
            println!("Schema ready.");
            return Ok(());
        }
        Commands::Seed => {
            db::seed(&pool).await?;
            println!("Seed data inserted.");
            return Ok(());
        }
        _ => {}
    }

    let service = GradingService::new(PgStore::new(pool), policy);
    let identity = ProfileDirectory::new(service.store(), cli.settings.operator.clone());
    match &cli.command {
        Commands::Login { email, password } => {
            match identity.create_session(email, password).await {
                Ok(session) => println!("Signed in as {}.", session.user.name),
                Err(IdentityError::Unsupported(op)) => println!(
                    "{op} is handled by your identity provider; pass --as <email> or set GRADING_OPERATOR."
                ),
                Err(err) => return Err(err.into()),
            }
            return Ok(());
        }
        Commands::Logout => {
            identity.delete_session().await?;
            println!(
                "No session is kept between runs. Unset GRADING_OPERATOR and drop --as to stay signed out."
            );
            return Ok(());
        }
        _ => {}
    }

    let session: Session = identity
        .current_session()
        .await
        .context("sign in with --as <email> or GRADING_OPERATOR")?;

    match cli.command {
        Commands::InitDb | Commands::Seed | Commands::Login { .. } | Commands::Logout => {}
        Commands::Import { csv } => {
            let created = import::import_groups(&service, &session, &csv).await?;
            println!("Created {created} grade sheets from {}.", csv.display());
        }
        Commands::Dashboard => {
            let sheets = service.dashboard(&session).await?;
            let users = service.panelists_of(&sheets).await?;
            if sheets.is_empty() {
                println!("No grade sheets assigned to you.");
                return Ok(());
            }
            println!("Grade sheets for {} ({}):", session.user.name, session.user.role);
            for sheet in &sheets {
                println!("{}", report::sheet_line(sheet, &users));
            }
        }
        Commands::Masterlist { status } => {
            let sheets = service.masterlist(&session, status).await?;
            let users = service.users(&session).await?;
            if sheets.is_empty() {
                println!("No grade sheets match.");
                return Ok(());
            }
            for sheet in &sheets {
                println!("{}", report::sheet_line(sheet, &users));
            }
        }
        Commands::Show { sheet } => {
            let sheet = service.sheet(&session, sheet).await?;
            let users = service.panelists_of(std::slice::from_ref(&sheet)).await?;
            print!("{}", report::sheet_detail(&sheet, &users));
        }
        Commands::CreateSheet(args) => {
            let details = sheet_details(service.store(), args).await?;
            let sheet = service.create_sheet(&session, details).await?;
            println!("Created grade sheet {} for {}.", sheet.id, sheet.group_name);
        }
        Commands::EditSheet { sheet, details } => {
            let details = sheet_details(service.store(), details).await?;
            let sheet = service.update_details(&session, sheet, details).await?;
            println!("Updated {} ({}).", sheet.group_name, sheet.status);
        }
        Commands::SelectTitle { sheet, title } => {
            let sheet = service.select_title(&session, sheet, title).await?;
            match &sheet.selected_title {
                Some(title) => println!("{} will defend \"{title}\".", sheet.group_name),
                None => println!("Cleared the selected title for {}.", sheet.group_name),
            }
        }
        Commands::DeleteSheet { sheet } => {
            service.delete_sheet(&session, sheet).await?;
            println!("Deleted grade sheet {sheet}.");
        }
        Commands::Grade {
            sheet,
            scores,
            comments,
            submit,
        } => {
            let grades = PanelGrades {
                title_defense_scores: scores.into_iter().collect(),
                comments,
                submitted: false,
            };
            let sheet = service
                .save_grades(&session, sheet, grades, submit)
                .await
                .context("grades were not saved; nothing was changed, try again")?;
            let verb = if submit { "Submitted" } else { "Saved" };
            println!("{verb} grades for {}. Sheet is now {}.", sheet.group_name, sheet.status);
        }
        Commands::Report { out } => {
            let sheets = service.masterlist(&session, None).await?;
            let users = service.users(&session).await?;
            std::fs::write(&out, report::build_report(&sheets, &users))?;
            println!("Report written to {}.", out.display());
        }
        Commands::Venues => {
            let venues = service.venues().await?;
            if venues.is_empty() {
                println!("No venues recorded.");
            }
            for venue in venues {
                println!("- {venue}");
            }
        }
        Commands::AddVenue { name } => {
            if service.add_venue(&session, &name).await? {
                println!("Added venue {}.", name.trim());
            } else {
                println!("Venue {} already exists.", name.trim());
            }
        }
        Commands::Users => {
            for user in service.users(&session).await? {
                println!("- {} <{}> {} {}", user.name, user.email, user.role, user.id);
            }
        }
        Commands::AddUser {
            name,
            email,
            role,
            password,
        } => {
            let (user, sync) = service
                .add_user(
                    &session,
                    &identity,
                    NewUser { name, email, role },
                    password.as_deref(),
                )
                .await?;
            println!("Created profile {} for {}.", user.id, user.email);
            report_account_sync(&sync);
        }
        Commands::UpdateUser {
            id,
            name,
            email,
            role,
        } => {
            let mut user = service
                .store()
                .get_user(id)
                .await?
                .with_context(|| format!("user {id} not found"))?;
            if let Some(name) = name {
                user.name = name;
            }
            if let Some(email) = email {
                user.email = email;
            }
            if let Some(role) = role {
                user.role = role;
            }
            let sync = service.update_user(&session, &identity, user).await?;
            println!("Updated profile {id}.");
            report_account_sync(&sync);
        }
        Commands::DeleteUser { id } => {
            let sync = service.delete_user(&session, &identity, id).await?;
            println!("Deleted profile {id}.");
            report_account_sync(&sync);
        }
        Commands::ChangePassword { old, new } => {
            match identity.update_password(&old, &new).await {
                Ok(()) => println!("Password changed."),
                Err(IdentityError::Unsupported(op)) => {
                    println!("{op} is handled by your identity provider, not this tool.")
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    Ok(())
}
