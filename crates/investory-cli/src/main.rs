//! Investory CLI - account and session management from the terminal.
//!
//! Signs in and out, registers accounts, runs the recovery flows, and sends
//! arbitrary authenticated requests through the session core so expired
//! credentials are refreshed transparently.

use std::io::{self, Write};
use std::process::ExitCode;

use anyhow::{anyhow, bail, Context, Result};
use tokio::sync::broadcast;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use investory_core::models::RegisterRequest;
use investory_core::{ApiError, ApiRequest, Config, SessionClient, SessionSignal};

/// Log file prefix inside the cache directory
const LOG_FILE_PREFIX: &str = "investory.log";

/// Password read from the environment instead of prompting (scripts, CI)
const ENV_PASSWORD: &str = "INVESTORY_PASSWORD";

const USAGE: &str = "\
Usage: investory <command> [args]

Commands:
  login [login-id]                       Sign in (password prompted or $INVESTORY_PASSWORD)
  logout                                 Sign out and clear the stored session
  whoami                                 Show the current session
  profile                                Fetch the profile and update the stored session
  register <login-id> <email> <nickname> [birth-year]
  available [--login-id <id>] [--email <email>]
  verify-email <email>                   Request an email verification code
  confirm-email <verification-id> <code>
  find-id <name> <email>
  find-password <login-id> <email>
  reset-password <token>                 New password is prompted
  get <path>                             Authenticated GET, prints the response data";

/// Initialize the tracing subscriber for logging.
///
/// Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug).
/// Logs go to stderr and to a daily file in the cache directory.
fn init_tracing(config: &Config) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match config.cache_dir() {
        Ok(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(fmt::layer().with_ansi(false).with_writer(writer)), Some(guard))
        }
        Err(_) => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let mut config = match Config::load() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Warning: failed to load config ({:#}), using defaults", e);
            Config::default()
        }
    };

    let _log_guard = init_tracing(&config);

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first().map(String::as_str) else {
        println!("{}", USAGE);
        return ExitCode::SUCCESS;
    };
    if matches!(command, "-h" | "--help" | "help") {
        println!("{}", USAGE);
        return ExitCode::SUCCESS;
    }

    let client = match SessionClient::from_config(&config) {
        Ok(client) => client,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            return ExitCode::FAILURE;
        }
    };
    let mut signals = client.subscribe_signals();

    info!(command, "Running command");
    let result = run(&client, &mut config, command, &args[1..]).await;

    report_redirects(&mut signals);

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            match e.downcast_ref::<ApiError>() {
                Some(api_err) => print_api_error(api_err),
                None => eprintln!("Error: {:#}", e),
            }
            ExitCode::FAILURE
        }
    }
}

/// Print a notice for every session the core cleared while the command ran
fn report_redirects(signals: &mut broadcast::Receiver<SessionSignal>) {
    while let Ok(SessionSignal::RedirectRequired { reason }) = signals.try_recv() {
        warn!(?reason, "Session expired");
        eprintln!("Your session has expired. Run `investory login` to sign in again.");
    }
}

async fn run(client: &SessionClient, config: &mut Config, command: &str, args: &[String]) -> Result<()> {
    let service = client.service();

    match command {
        "login" => {
            let login_id = match args.first() {
                Some(id) => id.clone(),
                None => prompt_login_id(config.last_login_id.as_deref())?,
            };
            let password = read_password("Password: ")?;

            let session = client.login(&login_id, &password).await?;

            config.last_login_id = Some(login_id);
            if let Err(e) = config.save() {
                warn!(error = %e, "Failed to save config");
            }

            let name = session.user.as_ref().map(|u| u.display_name()).unwrap_or("you");
            println!("Signed in. Welcome, {}!", name);
        }
        "logout" => {
            client.logout().await?;
            println!("Signed out.");
        }
        "whoami" => {
            let session = client.session();
            match session.user {
                Some(ref user) if session.is_authenticated => {
                    println!("{} ({}) <{}>", user.display_name(), user.login_id, user.email);
                    if let Some(ref wmti) = user.wmti_type {
                        println!("Investor type: {}", wmti);
                    }
                    if !session.can_refresh() {
                        println!("No refresh token: you will need to sign in again when the session expires.");
                    }
                }
                _ => println!("Not signed in."),
            }
        }
        "profile" => {
            let profile = client.refresh_profile().await?;
            println!("{}", serde_json::to_string_pretty(&profile)?);
        }
        "register" => {
            let [login_id, email, nickname, rest @ ..] = args else {
                bail!("register needs <login-id> <email> <nickname>\n\n{}", USAGE);
            };
            let birth_year = rest
                .first()
                .map(|y| y.parse::<i32>().context("birth-year must be a number"))
                .transpose()?;
            let password = read_password("Choose a password: ")?;
            let confirm = read_password("Repeat password: ")?;
            if password != confirm {
                bail!("Passwords do not match");
            }

            let registration = RegisterRequest {
                login_id: login_id.clone(),
                email: email.clone(),
                password,
                nickname: nickname.clone(),
                gender: None,
                birth_year,
            };
            let ack = service.register(&registration).await?;
            println!("{}", ack.message.as_deref().unwrap_or("Registered."));
        }
        "available" => {
            let login_id = flag_value(args, "--login-id");
            let email = flag_value(args, "--email");
            if login_id.is_none() && email.is_none() {
                bail!("available needs --login-id and/or --email");
            }
            let availability = service.check_availability(login_id, email).await?;
            if let Some(free) = availability.login_id_available {
                println!("login id: {}", if free { "available" } else { "taken" });
            }
            if let Some(free) = availability.email_available {
                println!("email: {}", if free { "available" } else { "taken" });
            }
            if availability.all_available() {
                println!("Good to register.");
            }
        }
        "verify-email" => {
            let email = positional(args, 0, "email")?;
            let ticket = service.request_email_verification(email).await?;
            println!("Verification sent. Id: {}", ticket.verification_id);
        }
        "confirm-email" => {
            let id = positional(args, 0, "verification-id")?;
            let code = positional(args, 1, "code")?;
            let ack = service.confirm_email_verification(id, code).await?;
            println!("{}", ack.message.as_deref().unwrap_or("Email verified."));
        }
        "find-id" => {
            let name = positional(args, 0, "name")?;
            let email = positional(args, 1, "email")?;
            let ack = service.find_id(name, email).await?;
            println!("{}", ack.message.as_deref().unwrap_or("Check your email for your login id."));
        }
        "find-password" => {
            let login_id = positional(args, 0, "login-id")?;
            let email = positional(args, 1, "email")?;
            let ack = service.find_password(login_id, email).await?;
            println!("{}", ack.message.as_deref().unwrap_or("Check your email for a reset link."));
        }
        "reset-password" => {
            let token = positional(args, 0, "token")?;
            let password = read_password("New password: ")?;
            let ack = service.reset_password(token, &password).await?;
            println!("{}", ack.message.as_deref().unwrap_or("Password changed."));
        }
        "get" => {
            let path = positional(args, 0, "path")?;
            let data = client.request_json(ApiRequest::get(path)).await?;
            println!("{}", serde_json::to_string_pretty(&data)?);
        }
        other => bail!("Unknown command: {}\n\n{}", other, USAGE),
    }

    Ok(())
}

/// User-facing messages for the error kinds a form would surface
fn print_api_error(err: &ApiError) {
    match err {
        ApiError::InvalidCredentials => eprintln!("Invalid login id or password."),
        ApiError::Validation { message, fields } => {
            eprintln!("{}", message);
            for field in fields {
                eprintln!("  {}: {}", field.field, field.reason.as_deref().unwrap_or("invalid"));
            }
        }
        ApiError::Conflict { message, .. } => eprintln!("{}", message),
        err if err.is_session_terminal() => {
            eprintln!("Your session could not be renewed. Run `investory login` to sign in again.")
        }
        ApiError::Unauthorized => eprintln!("Not signed in. Run `investory login` first."),
        ApiError::NetworkTimeout => eprintln!("Connection timed out. Please try again."),
        ApiError::NetworkError(_) => eprintln!("Unable to connect to server. Check your internet connection."),
        other => eprintln!("Error: {}", other),
    }
}

fn positional<'a>(args: &'a [String], index: usize, name: &str) -> Result<&'a str> {
    args.get(index)
        .map(String::as_str)
        .ok_or_else(|| anyhow!("Missing <{}>\n\n{}", name, USAGE))
}

fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .map(String::as_str)
}

fn prompt_login_id(last: Option<&str>) -> Result<String> {
    match last {
        Some(last) => print!("Login id [{}]: ", last),
        None => print!("Login id: "),
    }
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    let input = input.trim();

    match (input.is_empty(), last) {
        (true, Some(last)) => Ok(last.to_string()),
        (true, None) => bail!("Login id required"),
        (false, _) => Ok(input.to_string()),
    }
}

fn read_password(prompt: &str) -> Result<String> {
    if let Ok(password) = std::env::var(ENV_PASSWORD) {
        return Ok(password);
    }
    let password = rpassword::prompt_password(prompt)?;
    if password.is_empty() {
        bail!("Password required");
    }
    Ok(password)
}
