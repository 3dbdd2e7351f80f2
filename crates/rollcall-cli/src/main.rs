use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use rollcall_core::analytics::{self, DaySummary};
use rollcall_core::credentials::{CredentialStore, Role};
use rollcall_core::dataset::Dataset;
use rollcall_core::detector::FaceDetector;
use rollcall_core::embedder::FaceEmbedder;
use rollcall_core::enroll;
use rollcall_core::paths::DataPaths;
use rollcall_core::AttendanceLog;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "rollcall", about = "Rollcall attendance tracker CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Rebuild the encoding store from the dataset (runs locally)
    Encode,
    /// Working-hours report from the attendance ledger
    Report {
        /// Start date (YYYY-MM-DD), inclusive
        #[arg(long)]
        from: Option<NaiveDate>,
        /// End date (YYYY-MM-DD), inclusive
        #[arg(long)]
        to: Option<NaiveDate>,
        /// Restrict to one person
        #[arg(long)]
        employee: Option<String>,
    },
    /// Month-by-month attendance trend
    Trend {
        /// Restrict to one person
        #[arg(long)]
        employee: Option<String>,
    },
    /// Day-by-day timeline for one person, absences included
    Timeline {
        /// Person name
        employee: String,
        /// Start date (YYYY-MM-DD), inclusive
        #[arg(long)]
        from: NaiveDate,
        /// End date (YYYY-MM-DD), inclusive
        #[arg(long)]
        to: NaiveDate,
    },
    /// Show recent raw ledger entries
    Log {
        /// Number of entries to show
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// List enrolled people
    People,
    /// Add a reference image for a person (creates the person if new)
    Add {
        /// Person name
        name: String,
        /// Path to a face image
        #[arg(long)]
        image: PathBuf,
    },
    /// Remove a person's reference images (ledger history is kept)
    Remove {
        /// Person name
        name: String,
    },
    /// Manage operator accounts
    User {
        #[command(subcommand)]
        command: UserCommands,
    },
    /// Show daemon status
    Status,
    /// Control the recognition session
    Session {
        #[command(subcommand)]
        command: SessionCommands,
    },
    /// List available camera devices
    Devices,
}

#[derive(Subcommand)]
enum UserCommands {
    /// Add or update an operator account
    Add {
        username: String,
        #[arg(long)]
        password: String,
        /// "admin" or "user"
        #[arg(long, default_value = "user")]
        role: String,
    },
    /// List operator accounts
    List,
}

#[derive(Subcommand)]
enum SessionCommands {
    /// Start camera recognition
    Start,
    /// Stop camera recognition
    Stop,
}

#[zbus::proxy(
    interface = "org.rollcall.Attendance1",
    default_service = "org.rollcall.Attendance1",
    default_path = "/org/rollcall/Attendance1"
)]
trait Attendance {
    async fn start_session(&self) -> zbus::Result<()>;
    async fn stop_session(&self) -> zbus::Result<()>;
    async fn status(&self) -> zbus::Result<String>;
    async fn add_person(&self, name: &str, image: Vec<u8>) -> zbus::Result<u32>;
    async fn remove_person(&self, name: &str) -> zbus::Result<bool>;
    async fn list_people(&self) -> zbus::Result<String>;
    async fn reencode(&self) -> zbus::Result<u32>;
}

async fn daemon_proxy() -> Result<AttendanceProxy<'static>> {
    let connection = zbus::Connection::session()
        .await
        .context("cannot reach the session bus")?;
    AttendanceProxy::new(&connection)
        .await
        .context("cannot reach rollcalld; is the daemon running?")
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let paths = DataPaths::resolve(None);

    match cli.command {
        Commands::Encode => run_encode(&paths)?,
        Commands::Report { from, to, employee } => run_report(&paths, from, to, employee)?,
        Commands::Trend { employee } => run_trend(&paths, employee)?,
        Commands::Timeline { employee, from, to } => run_timeline(&paths, &employee, from, to)?,
        Commands::Log { limit } => run_log(&paths, limit)?,
        Commands::People => {
            let raw = daemon_proxy().await?.list_people().await?;
            let people: serde_json::Value = serde_json::from_str(&raw)?;
            let Some(entries) = people.as_array() else {
                bail!("unexpected daemon reply: {raw}");
            };
            if entries.is_empty() {
                println!("No people enrolled");
            }
            for entry in entries {
                println!(
                    "{}  ({} images)",
                    entry["name"].as_str().unwrap_or("?"),
                    entry["images"]
                );
            }
        }
        Commands::Add { name, image } => {
            let bytes = std::fs::read(&image)
                .with_context(|| format!("cannot read image {}", image.display()))?;
            let count = daemon_proxy().await?.add_person(&name, bytes).await?;
            println!("Added image for {name}; store now holds {count} encodings");
        }
        Commands::Remove { name } => {
            if daemon_proxy().await?.remove_person(&name).await? {
                println!("Removed {name} (attendance history kept)");
            } else {
                println!("No such person: {name}");
            }
        }
        Commands::User { command } => run_user(&paths, command)?,
        Commands::Status => {
            let raw = daemon_proxy().await?.status().await?;
            let status: serde_json::Value = serde_json::from_str(&raw)?;
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        Commands::Session { command } => {
            let proxy = daemon_proxy().await?;
            match command {
                SessionCommands::Start => {
                    proxy.start_session().await?;
                    println!("Recognition session started");
                }
                SessionCommands::Stop => {
                    proxy.stop_session().await?;
                    println!("Recognition session stopped");
                }
            }
        }
        Commands::Devices => {
            let devices = rollcall_hw::Camera::list_devices();
            if devices.is_empty() {
                println!("No V4L2 capture devices found");
            }
            for d in devices {
                println!("{}  {} ({}, {})", d.path, d.name, d.driver, d.bus);
            }
        }
    }

    Ok(())
}

/// Load both models and rebuild the encoding store from the dataset.
/// This is also what the daemon spawns as its re-encoding subprocess.
fn run_encode(paths: &DataPaths) -> Result<()> {
    let mut detector = FaceDetector::load(&paths.detector_model())?;
    let mut embedder = FaceEmbedder::load(&paths.embedder_model())?;
    let dataset = Dataset::new(&paths.dataset_dir);

    let report = enroll::rebuild_store(
        &dataset,
        &paths.encodings_file,
        &mut detector,
        &mut embedder,
    )?;

    println!(
        "Encoded {} images across {} people ({} skipped) -> {}",
        report.encoded,
        report.people,
        report.skipped,
        paths.encodings_file.display()
    );
    Ok(())
}

fn load_summaries(
    paths: &DataPaths,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
    employee: Option<&str>,
) -> Result<Vec<DaySummary>> {
    let records = AttendanceLog::new(&paths.ledger_file).read_all()?;
    let summaries = analytics::daily_summaries(&records)
        .into_iter()
        .filter(|s| from.map_or(true, |d| s.date >= d))
        .filter(|s| to.map_or(true, |d| s.date <= d))
        .filter(|s| employee.map_or(true, |e| s.name == e))
        .collect();
    Ok(summaries)
}

fn run_report(
    paths: &DataPaths,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
    employee: Option<String>,
) -> Result<()> {
    let summaries = load_summaries(paths, from, to, employee.as_deref())?;
    if summaries.is_empty() {
        println!("No attendance records in range");
        return Ok(());
    }

    println!(
        "{:<12} {:<20} {:>8} {:>8} {:>9}  {}",
        "Date", "Name", "In", "Out", "Worked", "Status"
    );
    for s in &summaries {
        println!(
            "{:<12} {:<20} {:>8} {:>8} {:>9}  {}",
            s.date,
            s.name,
            s.first_in.map_or("-".into(), |t| t.to_string()),
            s.last_out.map_or("-".into(), |t| t.to_string()),
            analytics::format_hours(s.worked_secs),
            s.status
        );
    }

    let counts = analytics::status_distribution(&summaries);
    println!(
        "\n{} full days, {} half days, {} absent",
        counts.full_day, counts.half_day, counts.absent
    );
    Ok(())
}

fn run_trend(paths: &DataPaths, employee: Option<String>) -> Result<()> {
    let summaries = load_summaries(paths, None, None, employee.as_deref())?;
    if summaries.is_empty() {
        println!("No attendance records");
        return Ok(());
    }

    for (month, counts) in analytics::monthly_trend(&summaries) {
        println!(
            "{month}: {} full, {} half, {} absent",
            counts.full_day, counts.half_day, counts.absent
        );
    }
    Ok(())
}

fn run_timeline(
    paths: &DataPaths,
    employee: &str,
    from: NaiveDate,
    to: NaiveDate,
) -> Result<()> {
    let summaries = load_summaries(paths, None, None, None)?;
    for day in analytics::employee_timeline(&summaries, employee, from, to) {
        println!(
            "{}  {:>9}  {}",
            day.date,
            analytics::format_hours(day.worked_secs),
            day.status
        );
    }
    Ok(())
}

fn run_log(paths: &DataPaths, limit: usize) -> Result<()> {
    let records = AttendanceLog::new(&paths.ledger_file).read_all()?;
    if records.is_empty() {
        println!("Ledger is empty");
        return Ok(());
    }

    let start = records.len().saturating_sub(limit);
    for r in &records[start..] {
        println!("{} {}  {:<20} {}", r.date, r.time, r.name, r.status);
    }
    Ok(())
}

fn run_user(paths: &DataPaths, command: UserCommands) -> Result<()> {
    let mut store = CredentialStore::load(&paths.users_file)?;
    match command {
        UserCommands::Add { username, password, role } => {
            let role = match role.to_ascii_lowercase().as_str() {
                "admin" => Role::Admin,
                "user" => Role::User,
                other => bail!("unknown role {other:?}, expected admin or user"),
            };
            store.upsert(&username, &password, role)?;
            println!("Saved account {username} ({role})");
        }
        UserCommands::List => {
            let names = store.usernames();
            if names.is_empty() {
                println!("No operator accounts");
            }
            for name in names {
                println!("{name}");
            }
        }
    }
    Ok(())
}
