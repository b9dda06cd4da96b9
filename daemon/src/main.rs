//! Identity-verification daemon: runs the periodic jobs and exposes the
//! operator commands (fraud review, rate-limit resets, profile lookup).

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use idv_service::{Collaborators, IdvService, Job, Scheduler, ServiceConfig, ShutdownController};
use idv_store::IdvStore;
use idv_store_lmdb::{LmdbStore, DEFAULT_MAP_SIZE};
use idv_types::{Profile, ProfileId, RateLimitType, UserId};
use idv_utils::LogFormat;

#[derive(Parser)]
#[command(name = "idv-daemon", about = "Identity-verification workflow daemon")]
struct Cli {
    /// Path to a TOML configuration file. File settings are the base;
    /// CLI flags and env vars override them.
    #[arg(long, env = "IDV_CONFIG")]
    config: Option<PathBuf>,

    /// Directory holding the LMDB environment.
    #[arg(long, env = "IDV_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Log level: "trace", "debug", "info", "warn", "error".
    #[arg(long, env = "IDV_LOG_LEVEL")]
    log_level: Option<String>,

    /// Log format: "human" or "json".
    #[arg(long, env = "IDV_LOG_FORMAT")]
    log_format: Option<String>,

    /// Hex secret for keyed digests of SSNs and phone numbers.
    #[arg(long, env = "IDV_FINGERPRINT_SECRET", hide_env_values = true)]
    fingerprint_secret: Option<String>,

    /// Hex server key wrapping sealed PII.
    #[arg(long, env = "IDV_SERVER_KEY", hide_env_values = true)]
    server_key: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Subcommand)]
enum Command {
    /// Run the periodic jobs until SIGINT or SIGTERM.
    Run,
    /// Resolve fraud reviews.
    Fraud {
        #[command(subcommand)]
        action: FraudAction,
    },
    /// Inspect or clear attempt counters.
    RateLimit {
        #[command(subcommand)]
        action: RateLimitAction,
    },
    /// Inspect profiles.
    Profile {
        #[command(subcommand)]
        action: ProfileAction,
    },
    /// Poll the in-person proofer once.
    PollInPerson,
    /// Expire stale mailed codes once.
    ExpireGpo,
}

#[derive(clap::Subcommand)]
enum RateLimitAction {
    /// Clear a user's attempt counter for one operation type.
    Reset {
        #[arg(long)]
        user: u64,
        /// One of: idv_doc_auth, idv_resolution, proof_ssn, proof_address,
        /// phone_otp, phone_confirmation, verify_gpo_key, gpo_letter,
        /// verify_personal_key.
        #[arg(long)]
        kind: String,
    },
}

#[derive(clap::Subcommand)]
enum ProfileAction {
    /// Print a profile's state.
    Show {
        #[arg(long)]
        id: u64,
    },
}

#[derive(clap::Subcommand)]
enum FraudAction {
    /// Clear the review hold and activate when nothing else blocks.
    Pass {
        #[arg(long)]
        profile: u64,
        #[arg(long)]
        reason: String,
    },
    /// Reject the profile and block further attempts.
    Reject {
        #[arg(long)]
        profile: u64,
        #[arg(long)]
        reason: String,
    },
    /// Undo a rejection.
    Reverse {
        #[arg(long)]
        profile: u64,
        #[arg(long)]
        reason: String,
    },
    /// Auto-reject holds older than the review window.
    Sweep,
}

fn load_config(cli: &Cli) -> anyhow::Result<ServiceConfig> {
    let mut config = match cli.config {
        Some(ref path) => ServiceConfig::from_toml_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => ServiceConfig::default(),
    };

    if let Some(ref dir) = cli.data_dir {
        config.data_dir = dir.clone();
    }
    if let Some(ref level) = cli.log_level {
        config.log_level = level.clone();
    }
    if let Some(ref format) = cli.log_format {
        config.log_format =
            LogFormat::parse(format).with_context(|| format!("unknown log format {format:?}"))?;
    }
    if let Some(ref secret) = cli.fingerprint_secret {
        config.fingerprint_secret = secret.clone();
    }
    if let Some(ref key) = cli.server_key {
        config.server_key = key.clone();
    }
    Ok(config)
}

fn parse_rate_limit(kind: &str) -> anyhow::Result<RateLimitType> {
    RateLimitType::ALL
        .into_iter()
        .find(|t| t.as_str() == kind)
        .with_context(|| format!("unknown rate-limit type {kind:?}"))
}

fn print_profile(profile: &Profile) {
    println!("{}", profile.id);
    println!("  user:        {}", profile.user_id);
    println!("  state:       {:?}", profile.state());
    println!("  active:      {}", profile.active);
    println!("  deactivated: {}", profile.deactivation_reason);
    if let Some(at) = profile.fraud_review_pending_at {
        println!("  review since {at}");
    }
    if let Some(at) = profile.fraud_rejection_at {
        println!("  rejected at  {at}");
    }
    if let Some(reason) = profile.reason_not_to_activate() {
        println!("  blocked by:  {reason}");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;

    idv_utils::init_logging(config.log_format, &config.log_level)
        .context("installing the tracing subscriber")?;

    let store: Arc<dyn IdvStore> = Arc::new(
        LmdbStore::open(&config.data_dir, DEFAULT_MAP_SIZE)
            .with_context(|| format!("opening store at {}", config.data_dir.display()))?,
    );
    let service = Arc::new(IdvService::new(&config, store, Collaborators::mock(&config))?);

    match cli.command {
        Command::Run => {
            tracing::info!(
                data_dir = %config.data_dir.display(),
                mode = ?config.execution_mode,
                "starting identity-verification daemon"
            );
            let shutdown = ShutdownController::new();
            let scheduler = Scheduler::new(Arc::clone(&service), &config.params);
            let handles = scheduler.spawn(&shutdown);

            shutdown.wait_for_signal().await;
            tracing::info!("shutdown signal received, stopping jobs");
            for handle in handles {
                if let Err(e) = handle.await {
                    tracing::warn!(error = %e, "job task ended abnormally");
                }
            }
            tracing::info!("daemon exited cleanly");
        }
        Command::Fraud { action } => match action {
            FraudAction::Pass { profile, reason } => {
                print_profile(&service.fraud_pass(ProfileId::new(profile), &reason)?);
            }
            FraudAction::Reject { profile, reason } => {
                print_profile(&service.fraud_reject(ProfileId::new(profile), &reason)?);
            }
            FraudAction::Reverse { profile, reason } => {
                print_profile(&service.fraud_reverse(ProfileId::new(profile), &reason)?);
            }
            FraudAction::Sweep => {
                let scheduler = Scheduler::new(Arc::clone(&service), &config.params);
                let swept = scheduler.run_once(Job::FraudSweep).await?;
                println!("rejected {swept} expired review(s)");
            }
        },
        Command::RateLimit {
            action: RateLimitAction::Reset { user, kind },
        } => {
            let kind = parse_rate_limit(&kind)?;
            service.reset_rate_limit(UserId::new(user), kind)?;
            println!("reset {kind} for {}", UserId::new(user));
        }
        Command::Profile {
            action: ProfileAction::Show { id },
        } => {
            print_profile(&service.profile(ProfileId::new(id))?);
        }
        Command::PollInPerson => {
            let report = service.poll_in_person().await?;
            println!(
                "passed {}, closed {}, activated {}",
                report.passed.len(),
                report.closed.len(),
                report.activated.len()
            );
            for (stat, count) in &report.stats {
                println!("  {stat}: {count}");
            }
        }
        Command::ExpireGpo => {
            let scheduler = Scheduler::new(Arc::clone(&service), &config.params);
            let expired = scheduler.run_once(Job::GpoExpiry).await?;
            println!("expired {expired} mailed code(s)");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_names_parse() {
        for kind in RateLimitType::ALL {
            assert_eq!(parse_rate_limit(kind.as_str()).unwrap(), kind);
        }
        assert!(parse_rate_limit("sms").is_err());
    }

    #[test]
    fn flags_override_file_values() {
        let cli = Cli::parse_from([
            "idv-daemon",
            "--data-dir",
            "/tmp/idv",
            "--log-format",
            "json",
            "profile",
            "show",
            "--id",
            "7",
        ]);
        let config = load_config(&cli).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/tmp/idv"));
        assert_eq!(config.log_format, LogFormat::Json);
        assert!(matches!(
            cli.command,
            Command::Profile {
                action: ProfileAction::Show { id: 7 }
            }
        ));
    }

    #[test]
    fn unknown_log_format_is_refused() {
        let cli = Cli::parse_from(["idv-daemon", "--log-format", "xml", "run"]);
        assert!(load_config(&cli).is_err());
    }
}
