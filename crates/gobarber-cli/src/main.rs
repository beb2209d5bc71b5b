//! gobarber - book barber appointments from the terminal.
//!
//! A thin front end over `gobarber-core`: it restores the stored session,
//! runs one command and exits. `watch` keeps the process alive so the
//! session can be observed renewing itself.

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::{Local, NaiveDate, TimeZone, Utc};
use gobarber_core::models::split_by_period;
use gobarber_core::store::open_store;
use gobarber_core::utils::{is_business_day, next_valid_day, parse_day};
use gobarber_core::{
    ApiClient, AuthFacade, Config, NewAppointment, ProfileUpdate, Session, SignInCredentials,
};
use tracing::{debug, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

// ============================================================================
// Constants
// ============================================================================

/// Fallback data directory when the platform has none
const FALLBACK_DATA_DIR: &str = "./.gobarber";

/// Log file prefix inside the data directory
const LOG_FILE_PREFIX: &str = "gobarber.log";

const USAGE: &str = "\
Usage: gobarber <command> [args]

Commands:
  login [email]                      Sign in (prompts for the password)
  logout                             Sign out and forget stored credentials
  whoami                             Show the signed-in user
  providers                          List barbers
  availability <provider> [date]     Show free hours (date: YYYY-MM-DD, default next weekday)
  book <provider> <date> <hour>      Book an appointment
  profile <name> <email> [--password]
                                     Update your profile
  watch                              Stay signed in and print session changes until Ctrl-C
";

/// Initialize the tracing subscriber for logging.
/// Returns the file writer guard, which must outlive the program.
fn init_tracing(log_dir: &Path) -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = if std::fs::create_dir_all(log_dir).is_ok() {
        let appender = tracing_appender::rolling::daily(log_dir, LOG_FILE_PREFIX);
        let (writer, guard) = tracing_appender::non_blocking(appender);
        (
            Some(fmt::layer().with_writer(writer).with_ansi(false)),
            Some(guard),
        )
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first().map(String::as_str) else {
        print!("{}", USAGE);
        return Ok(());
    };
    if matches!(command, "help" | "--help" | "-h") {
        print!("{}", USAGE);
        return Ok(());
    }

    let mut config = Config::load().unwrap_or_else(|e| {
        eprintln!("Warning: could not load config ({}), using defaults", e);
        Config::default()
    });
    let data_dir = config
        .data_dir()
        .unwrap_or_else(|_| PathBuf::from(FALLBACK_DATA_DIR));
    let _log_guard = init_tracing(&data_dir.join("logs"));
    info!(api = %config.api_base_url, storage = ?config.storage, "gobarber starting");

    let client = ApiClient::new(&config.api_base_url).context("Failed to create API client")?;
    let auth = AuthFacade::new(client, open_store(config.storage, &data_dir));
    auth.restore().await;

    let rest = &args[1..];
    match command {
        "login" => login(&auth, &mut config, rest.first()).await,
        "logout" => logout(&auth).await,
        "whoami" => whoami(&auth),
        "providers" => providers(&auth).await,
        "availability" => availability(&auth, rest).await,
        "book" => book(&auth, rest).await,
        "profile" => profile(&auth, rest).await,
        "watch" => watch(&auth).await,
        other => bail!("Unknown command: {}\n\n{}", other, USAGE),
    }
}

fn require_session(auth: &AuthFacade) -> Result<()> {
    if !auth.is_authenticated() {
        bail!("Not signed in. Run `gobarber login` first.");
    }
    Ok(())
}

fn prompt(label: &str) -> Result<String> {
    print!("{}", label);
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

async fn login(auth: &AuthFacade, config: &mut Config, email: Option<&String>) -> Result<()> {
    let email = match email.cloned().or_else(|| config.last_email.clone()) {
        Some(email) => email,
        None => prompt("E-mail: ")?,
    };
    let password = rpassword::prompt_password(format!("Password for {}: ", email))
        .context("Failed to read password")?;

    let credentials = SignInCredentials::new(email.clone(), password);
    if let Err(reason) = credentials.validate() {
        bail!(reason);
    }

    let user = auth.sign_in(&credentials).await?;

    config.last_email = Some(email);
    if let Err(e) = config.save() {
        debug!(error = %e, "Failed to save config");
    }

    println!("Welcome, {}!", user.first_name());
    Ok(())
}

async fn logout(auth: &AuthFacade) -> Result<()> {
    if !auth.is_authenticated() {
        println!("Not signed in.");
        return Ok(());
    }
    auth.sign_out().await?;
    println!("Signed out.");
    Ok(())
}

fn whoami(auth: &AuthFacade) -> Result<()> {
    match auth.current_user() {
        Some(user) => {
            println!("{} <{}>", user.name, user.email);
            if let Some(avatar) = user.avatar_url {
                println!("avatar: {}", avatar);
            }
        }
        None => println!("Not signed in."),
    }
    Ok(())
}

async fn providers(auth: &AuthFacade) -> Result<()> {
    require_session(auth)?;
    let providers = auth.api().list_providers().await?;
    if providers.is_empty() {
        println!("No barbers available.");
    }
    for provider in providers {
        println!("{:<38} {}", provider.id, provider.name);
    }
    Ok(())
}

async fn availability(auth: &AuthFacade, args: &[String]) -> Result<()> {
    require_session(auth)?;
    let Some(provider_id) = args.first() else {
        bail!("Usage: gobarber availability <provider> [YYYY-MM-DD]");
    };
    let day = match args.get(1) {
        Some(input) => parse_day(input).with_context(|| format!("Invalid date: {}", input))?,
        None => next_valid_day(Local::now().date_naive()),
    };

    let slots = auth.api().provider_day_availability(provider_id, day).await?;
    let periods = split_by_period(&slots);

    println!("{}", day.format("%A, %d %B %Y"));
    for (label, period) in [("Morning", &periods.morning), ("Afternoon", &periods.afternoon)] {
        let hours: Vec<String> = period
            .iter()
            .map(|slot| {
                if slot.available {
                    slot.hour_display()
                } else {
                    format!("({})", slot.hour_display())
                }
            })
            .collect();
        println!("  {:<10} {}", label, hours.join(" "));
    }
    Ok(())
}

async fn book(auth: &AuthFacade, args: &[String]) -> Result<()> {
    require_session(auth)?;
    let [provider_id, day, hour] = args else {
        bail!("Usage: gobarber book <provider> <YYYY-MM-DD> <hour>");
    };
    let day: NaiveDate = parse_day(day).with_context(|| format!("Invalid date: {}", day))?;
    let hour: u32 = hour.parse().with_context(|| format!("Invalid hour: {}", hour))?;
    if !is_business_day(day) {
        bail!("Appointments are only available Monday to Friday");
    }

    let slots = auth.api().provider_day_availability(provider_id, day).await?;
    if !slots.iter().any(|slot| slot.hour == hour && slot.available) {
        bail!("{:02}:00 is not available on {}", hour, day);
    }

    let local = day
        .and_hms_opt(hour, 0, 0)
        .with_context(|| format!("Invalid hour: {}", hour))?;
    let date = Local
        .from_local_datetime(&local)
        .single()
        .context("Ambiguous local time")?
        .with_timezone(&Utc);
    let appointment = auth
        .api()
        .create_appointment(&NewAppointment {
            provider_id: provider_id.clone(),
            date,
        })
        .await?;

    println!(
        "Booked for {}",
        appointment.date.with_timezone(&Local).format("%A, %d %B %Y at %H:%M")
    );
    Ok(())
}

async fn profile(auth: &AuthFacade, args: &[String]) -> Result<()> {
    require_session(auth)?;
    let (name, email) = match args {
        [name, email, ..] => (name, email),
        _ => bail!("Usage: gobarber profile <name> <email> [--password]"),
    };

    let mut update = ProfileUpdate::new(name.clone(), email.clone());
    if args.iter().any(|a| a == "--password") {
        let old = rpassword::prompt_password("Current password: ")?;
        let new = rpassword::prompt_password("New password: ")?;
        let confirm = rpassword::prompt_password("Confirm new password: ")?;
        if new != confirm {
            bail!("Passwords do not match");
        }
        update = update.with_password_change(&old, &new);
    }

    let user = auth.save_profile(&update).await?;
    println!("Profile updated: {} <{}>", user.name, user.email);
    Ok(())
}

fn describe(session: &Session) -> String {
    match (session.user(), session.issued_at()) {
        (Some(user), Some(issued_at)) => format!(
            "{} signed in, token issued {}",
            user.email,
            issued_at.with_timezone(&Local).format("%H:%M:%S")
        ),
        _ => "signed out".to_string(),
    }
}

async fn watch(auth: &AuthFacade) -> Result<()> {
    require_session(auth)?;
    let mut changes = auth.subscribe();
    println!("{}", describe(&changes.borrow_and_update()));

    loop {
        tokio::select! {
            changed = changes.changed() => {
                if changed.is_err() {
                    break;
                }
                let session = changes.borrow_and_update().clone();
                println!("{}", describe(&session));
                if !session.is_authenticated() {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }
    Ok(())
}
