use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use human_gate::analyzer::PatternAnalyzer;
use human_gate::clock::{SystemClock, TokioTimer};
use human_gate::config::Config;
use human_gate::engine::{StaticAgent, VerificationEngine};
use human_gate::events::{EventHistory, EventRecorder};
use human_gate::form::{FormOutcome, VerificationForm, VERIFICATION_PATH};
use human_gate::gate::{GateDecision, RouteGate};
use human_gate::input::{InputSurface, RawInput};
use human_gate::otp::OtpService;
use human_gate::session::{SessionStatus, VerificationSessionController};
use human_gate::storage::FileStore;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) human-gate-cli";

#[derive(Parser)]
#[command(name = "human-gate")]
#[command(author = "AEGIS Team")]
#[command(version = "0.1.0")]
#[command(about = "Terminal front end for the human verification gate", long_about = None)]
struct Cli {
    /// TOML configuration file (defaults are used when omitted)
    #[arg(long)]
    config: Option<PathBuf>,

    /// JSON file holding the stored code and cookies between runs
    #[arg(long, default_value = "human-gate-state.json")]
    state_file: PathBuf,

    /// Agent string checked for bot signatures
    #[arg(long, env = "HUMAN_GATE_USER_AGENT", default_value = DEFAULT_USER_AGENT)]
    user_agent: String,

    /// Submit this code instead of prompting for it
    #[arg(long)]
    code: Option<String>,

    /// Number of attempts allowed when prompting
    #[arg(long, default_value_t = 3)]
    attempts: u32,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => Config::default(),
    };
    config.validate()?;

    let clock = Arc::new(SystemClock);
    let timer = Arc::new(TokioTimer);
    let store = Arc::new(
        FileStore::open(&cli.state_file, clock.clone())
            .with_context(|| format!("Failed to open state file {}", cli.state_file.display()))?,
    );

    let surface = Arc::new(InputSurface::new());
    let history = Arc::new(EventHistory::with_capacity(config.recorder.capacity));
    let recorder = EventRecorder::new(Arc::clone(&surface), Arc::clone(&history), clock.clone());
    let otp = Arc::new(OtpService::with_config(store.clone(), config.otp.clone()));
    let engine = VerificationEngine::new(
        Arc::clone(&otp),
        Arc::clone(&history),
        Arc::new(StaticAgent(cli.user_agent.clone())),
        timer.clone(),
        PatternAnalyzer::with_config(config.analyzer.clone()),
        &config.engine,
    )?;
    let controller = Arc::new(VerificationSessionController::new(
        otp,
        engine,
        recorder,
        store,
        config.session.clone(),
    ));

    let status = controller.bootstrap()?;
    if status == SessionStatus::Verified {
        println!("{}", "✓ Already verified as human".green().bold());
        return Ok(());
    }

    let gate = RouteGate::new(timer, Duration::from_millis(config.session.redirect_delay_ms));
    gate.settle().await;
    if let GateDecision::Redirect(path) = gate.evaluate(&controller.context(), "/") {
        println!("{} {}", "→ Redirecting to".dimmed(), path);
    }

    controller.initiate();
    let mut form = VerificationForm::mount(Arc::clone(&controller));
    if gate.evaluate(&controller.context(), VERIFICATION_PATH) == GateDecision::ShowForm {
        println!();
        println!("{}", "Human Verification".bold());
        println!("Your verification code: {}", form.display_code().cyan().bold());
    }

    let result = match cli.code {
        Some(code) => submit_code(&controller, &surface, &mut form, &code).await,
        None => prompt_loop(&controller, &surface, &mut form, cli.attempts).await,
    };

    controller.shutdown();
    result
}

/// Feed `code` through the input surface and the form, then report the outcome
async fn submit_code(
    controller: &VerificationSessionController,
    surface: &InputSurface,
    form: &mut VerificationForm,
    code: &str,
) -> Result<()> {
    for ch in code.chars() {
        surface.dispatch(&RawInput::KeyPress { key: ch.to_string() });
    }
    form.set_input(code.trim());

    if !form.can_submit() || form.submit().await == FormOutcome::Ignored {
        println!("{}", "Enter the full 6-digit code".yellow());
        return Ok(());
    }

    let context = controller.context();
    if context.is_verified {
        println!("{}", "✓ Verification successful!".green().bold());
    } else if let Some(message) = context.error {
        println!("{} {}", "✗".red().bold(), message.red());
    }
    Ok(())
}

async fn prompt_loop(
    controller: &VerificationSessionController,
    surface: &InputSurface,
    form: &mut VerificationForm,
    attempts: u32,
) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    for _ in 0..attempts.max(1) {
        print!("Enter code: ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };

        submit_code(controller, surface, form, &line).await?;
        if controller.context().is_verified {
            return Ok(());
        }
    }

    println!("{}", "Verification not completed".yellow());
    Ok(())
}
