//! Command-line interface parsing and handling
//!
//! This module parses command-line arguments and dispatches into the
//! console, authentication, and configuration flows.

use std::error::Error;
use std::io::{BufRead, Write};

use clap::{Parser, Subcommand};

use crate::auth::SessionManager;
use crate::core::config::Config;
use crate::core::context::SessionContext;
use crate::records::RecordsClient;
use crate::ui::console::run_console;

#[derive(Parser)]
#[command(name = "virtualis")]
#[command(about = "Terminal clinical console for the Virtualis hospital backend")]
#[command(
    long_about = "Virtualis is a full-screen terminal console for clinicians: browse the \
census, chat with the ALIS assistant with streaming responses, and review staged orders \
awaiting signature.\n\n\
Authentication:\n\
  Use 'virtualis auth' to sign in; the session is kept in your system keyring.\n\n\
Environment Variables (override the config file):\n\
  VIRTUALIS_BACKEND_URL    Backend base URL\n\
  VIRTUALIS_ANON_KEY       Publishable API key\n\
  VIRTUALIS_ACCESS_TOKEN   Pre-issued access token (skips the keyring)\n\n\
Controls:\n\
  Type              Enter your message in the input field\n\
  Enter             Send the message\n\
  1-9               Press an ALIS action button (demo mode)\n\
  Ctrl+D            Toggle demo mode\n\
  Esc               Cancel the in-flight response\n\
  Up/Down/Mouse     Scroll through the transcript\n\
  Ctrl+C            Quit"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Hospital to select at startup (overrides the configured default)
    #[arg(long, global = true, value_name = "HOSPITAL_ID")]
    pub hospital: Option<String>,

    /// Start in demo mode with the given scenario (day1, day2)
    #[arg(long, global = true, value_name = "SCENARIO", num_args = 0..=1, default_missing_value = "day1")]
    pub demo: Option<String>,

    /// Patient chart to open, attached as conversation context
    #[arg(long, global = true, value_name = "PATIENT_ID")]
    pub patient: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Sign in to the backend and store the session
    Auth,
    /// Sign out and clear the stored session
    Deauth,
    /// Start the console (default)
    Console,
    /// Print the patient census for the selected hospital
    Census,
    /// Print staged orders awaiting signature
    Orders,
    /// Set configuration values
    Set {
        /// Configuration key to set (backend-url, default-hospital, demo, scenario)
        key: String,
        /// Value to set for the key
        value: String,
    },
}

pub fn main() -> Result<(), Box<dyn Error>> {
    tokio::runtime::Runtime::new()
        .expect("failed to start async runtime")
        .block_on(async_main())
}

async fn async_main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let mut config = Config::load()?;

    match args.command.unwrap_or(Commands::Console) {
        Commands::Auth => {
            let backend_url = config.resolve_backend_url()?;
            let manager = SessionManager::new(backend_url, config.resolve_anon_key());
            let (email, password) = prompt_credentials()?;
            match manager.sign_in(&email, &password).await {
                Ok(session) => {
                    println!(
                        "Signed in as {}.",
                        session.user.email.as_deref().unwrap_or(&session.user.id)
                    );
                    Ok(())
                }
                Err(e) => {
                    eprintln!("Sign-in failed: {e}");
                    std::process::exit(1);
                }
            }
        }
        Commands::Deauth => {
            let backend_url = config.resolve_backend_url()?;
            let manager = SessionManager::new(backend_url, config.resolve_anon_key());
            match manager.resume().await {
                Ok(session) => manager.sign_out(&session).await?,
                Err(_) => manager.forget()?,
            }
            println!("Signed out.");
            Ok(())
        }
        Commands::Set { key, value } => {
            match key.as_str() {
                "backend-url" => config.backend_url = Some(value.clone()),
                "default-hospital" => config.default_hospital = Some(value.clone()),
                "demo" => config.demo = Some(value == "true" || value == "on"),
                "scenario" => config.default_scenario = Some(value.clone()),
                other => {
                    eprintln!("Unknown configuration key: {other}");
                    std::process::exit(2);
                }
            }
            config.save()?;
            println!("Set {key} to: {value}");
            Ok(())
        }
        Commands::Console => {
            if let Some(scenario) = &args.demo {
                config.demo = Some(true);
                config.default_scenario = Some(scenario.clone());
            }
            run(config, args.hospital, args.patient).await
        }
        Commands::Census => {
            let (context, records, _http) = sign_in_context(&config, args.hospital).await?;
            let Some(hospital_id) = context.selected_hospital() else {
                return Err("no hospital selected".into());
            };
            let patients = records.list_patients(hospital_id).await?;
            let presence = records.list_presence(hospital_id).await.unwrap_or_default();
            for patient in &patients {
                println!(
                    "{:<6} {:<4} {:<28} MRN {}",
                    patient.unit.as_deref().unwrap_or("-"),
                    patient.bed.as_deref().unwrap_or("-"),
                    patient.display_name(),
                    patient.mrn
                );
            }
            println!(
                "{} patients, {} staff online",
                patients.len(),
                presence.len()
            );
            Ok(())
        }
        Commands::Orders => {
            let (context, records, _http) = sign_in_context(&config, args.hospital).await?;
            let Some(hospital_id) = context.selected_hospital() else {
                return Err("no hospital selected".into());
            };
            let orders = records.list_staged_orders(hospital_id).await?;
            for order in &orders {
                println!(
                    "{:<10} {:<9} {:<36} patient {}",
                    order.order_type, order.priority, order.name, order.patient_id
                );
            }
            println!("{} orders awaiting signature", orders.len());
            Ok(())
        }
    }
}

async fn sign_in_context(
    config: &Config,
    hospital: Option<String>,
) -> Result<(SessionContext, RecordsClient, reqwest::Client), Box<dyn Error>> {
    let backend_url = config.resolve_backend_url()?;
    let manager = SessionManager::new(backend_url.clone(), config.resolve_anon_key());
    let session = manager.resume().await?;

    let http = reqwest::Client::new();
    let records = RecordsClient::new(
        http.clone(),
        backend_url,
        config.resolve_anon_key(),
        session.access_token.clone(),
    );

    // Auth resolves before the hospital list loads; the context enforces
    // that ordering.
    let default_hospital = hospital.as_deref().or(config.default_hospital.as_deref());
    let context = SessionContext::initialize(session, &records, default_hospital).await?;
    Ok((context, records, http))
}

async fn run(
    config: Config,
    hospital: Option<String>,
    patient: Option<String>,
) -> Result<(), Box<dyn Error>> {
    let (mut context, records, http) = sign_in_context(&config, hospital).await?;
    context.select_patient(patient);

    // The chart ride-along: the conversation carries a snapshot of the
    // open patient so ALIS answers from real data.
    let patient_context = match context.selected_patient() {
        Some(patient_id) => match records.get_patient_chart(patient_id).await {
            Ok(chart) => Some(chart_context(&context, &chart)),
            Err(e) => {
                tracing::warn!(error = %e, "patient chart unavailable; continuing without context");
                None
            }
        },
        None => None,
    };

    run_console(context, config, http, patient_context).await
}

fn chart_context(
    context: &SessionContext,
    chart: &crate::records::types::PatientChart,
) -> serde_json::Value {
    let latest_vitals = chart.vitals.first().map(|v| {
        serde_json::json!({
            "heart_rate": v.heart_rate,
            "respiratory_rate": v.respiratory_rate,
            "temperature_c": v.temperature_c,
            "spo2": v.spo2,
            "recorded_at": v.recorded_at,
        })
    });
    let recent_labs: Vec<_> = chart
        .labs
        .iter()
        .take(10)
        .map(|lab| {
            serde_json::json!({
                "test": lab.test_name,
                "value": lab.value,
                "unit": lab.unit,
                "flag": lab.abnormal_flag,
            })
        })
        .collect();
    let active_medications: Vec<_> = chart
        .medications
        .iter()
        .map(|m| format!("{} {} {} {}", m.medication_name, m.dose, m.route, m.frequency))
        .collect();

    serde_json::json!({
        "patient_id": chart.patient.id,
        "hospital_id": context.selected_hospital(),
        "name": chart.patient.display_name(),
        "mrn": chart.patient.mrn,
        "unit": chart.patient.unit,
        "latest_vitals": latest_vitals,
        "recent_labs": recent_labs,
        "active_medications": active_medications,
        "recent_notes": chart.notes.len(),
        "imaging_studies": chart.imaging.len(),
    })
}

fn prompt_credentials() -> Result<(String, String), Box<dyn Error>> {
    let stdin = std::io::stdin();
    let mut line = String::new();

    print!("Email: ");
    std::io::stdout().flush()?;
    stdin.lock().read_line(&mut line)?;
    let email = line.trim().to_string();

    line.clear();
    print!("Password: ");
    std::io::stdout().flush()?;
    stdin.lock().read_line(&mut line)?;
    let password = line.trim().to_string();

    if email.is_empty() || password.is_empty() {
        return Err("email and password are required".into());
    }
    Ok((email, password))
}
