mod cli;
mod config;
mod profile;
mod storage;

use std::fs;

use crate::{
    cli::{ConfigCommand, SetArgs},
    profile::Profile,
};
use clap::Parser;
use color_eyre::Result;
use docustream_core::{ResetOutcome, SecureKeyProvider, StoreContext, MASTER_ALIAS};
use docustream_storage::Document;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Probe document written and removed by `health`.
const HEALTH_PROBE_FILE: &str = "health-probe";

/// Entry point wiring the CLI to the profile store.
fn main() -> Result<()> {
    color_eyre::install()?;
    init_tracing();

    let cli = cli::Cli::parse();
    let config = config::load()?;
    match cli.command.unwrap_or(cli::Command::Show) {
        cli::Command::Show => show(&storage::profile_from_config(&config)?)?,
        cli::Command::Set(args) => set(&storage::profile_from_config(&config)?, &args)?,
        cli::Command::Raw => println!("{}", storage::profile_from_config(&config)?.raw_contents()?),
        cli::Command::Reset => reset(&storage::profile_from_config(&config)?)?,
        cli::Command::Version => print_version(),
        cli::Command::Health => run_health_check(&config)?,
        cli::Command::Config(ConfigCommand::Init) => init_config(&config)?,
    }

    Ok(())
}

fn init_tracing() {
    // RUST_LOG wins; otherwise info.
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = tracing_subscriber::fmt::layer().with_target(false);
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}

fn print_version() {
    println!("docustream {}", env!("CARGO_PKG_VERSION"));
}

fn show(store: &Document<Profile>) -> Result<()> {
    println!("{}", store.get()?.render());
    Ok(())
}

fn set(store: &Document<Profile>, args: &SetArgs) -> Result<()> {
    let updated = update_profile(store, args)?;
    println!("{}", updated.render());
    Ok(())
}

/// Read-modify-write of the profile with the fields given on the command line.
fn update_profile(store: &Document<Profile>, args: &SetArgs) -> Result<Profile> {
    let avatar = args.avatar.as_ref().map(fs::read).transpose()?;
    let mut profile = store.get()?;
    profile.apply(args, avatar);
    store.set(&profile)?;
    Ok(profile)
}

fn reset(store: &Document<Profile>) -> Result<()> {
    let outcome = store.reset()?;
    println!("{}", describe_reset(&outcome));
    Ok(())
}

fn describe_reset(outcome: &ResetOutcome) -> String {
    match outcome {
        ResetOutcome::File { removed: true } => "Profile removed".to_string(),
        ResetOutcome::File { removed: false } => "Profile could not be removed".to_string(),
        ResetOutcome::Keys {
            aliases,
            complete: true,
        } => format!("Profile and key material removed ({aliases} keystore aliases)"),
        ResetOutcome::Keys { .. } => format!(
            "Reset incomplete (code {}); some files could not be removed",
            outcome.code()
        ),
    }
}

/// Runs a quick health check of the storage path and the keystore.
fn run_health_check(config: &config::Config) -> Result<()> {
    let context = storage::context_from_config(config)?;
    let provider = storage::provider_from_config(config, &context);
    run_store_health(&context, provider.as_ref())?;
    println!("Storage: ok");
    Ok(())
}

/// Plain probe document plus a keystore wrap/unwrap. Never wipes keystore aliases.
fn run_store_health(context: &StoreContext, provider: &dyn SecureKeyProvider) -> Result<()> {
    let probe = Document::<String>::builder(context)
        .file_name(HEALTH_PROBE_FILE)
        .build()?;
    let payload = "ok".to_string();
    probe.set(&payload)?;
    let round_trip = probe.get()?;
    probe.reset()?;
    if round_trip != payload {
        color_eyre::eyre::bail!("storage round-trip failed");
    }

    provider.ensure_key_pair(MASTER_ALIAS)?;
    let wrapped = provider.wrap(payload.as_bytes(), MASTER_ALIAS)?;
    if provider.unwrap(&wrapped, MASTER_ALIAS)? != payload.as_bytes() {
        color_eyre::eyre::bail!("keystore round-trip failed");
    }
    info!("health probe passed");
    Ok(())
}

fn init_config(config: &config::Config) -> Result<()> {
    let path = config::write_default_if_missing(config)?;
    println!("Config initialized at {}", path.display());
    Ok(())
}
