//! Command-line access to the Ceritain backend.

pub mod auth;
pub mod errors;

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use crate::types::{Participant, Voice};

/// Ceritain call CLI
#[derive(Parser, Debug)]
#[command(name = "ceritain-call", version, about = "Ceritain realtime call tooling")]
pub struct Cli {
    /// Config file (defaults to the platform config directory)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Bearer token; overrides the saved login
    #[arg(long, global = true, env = "CERITAIN_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Saved login management
    Auth(AuthArgs),
    /// Show the current token balance
    Balance,
    /// Issue a realtime session credential
    Session(SessionArgs),
    /// Report a speaking duration for billing
    ReportUsage(ReportUsageArgs),
}

/// Arguments for the `auth` subcommand group.
#[derive(Parser, Debug)]
pub struct AuthArgs {
    #[command(subcommand)]
    pub command: AuthCommands,
}

/// Auth subcommands for login, status, and logout.
#[derive(Subcommand, Debug)]
pub enum AuthCommands {
    /// Save a bearer token for later commands
    Login(LoginArgs),
    /// Show the saved login
    Status,
    /// Forget the saved login
    Logout,
}

/// Arguments for `ceritain-call auth login`.
#[derive(Parser, Debug)]
pub struct LoginArgs {
    /// Bearer token issued by the Ceritain API
    #[arg(long)]
    pub token: String,

    /// Account email
    #[arg(long)]
    pub email: String,

    /// Account id
    #[arg(long, default_value = "")]
    pub id: String,

    /// Display name
    #[arg(long)]
    pub name: Option<String>,
}

/// Arguments for the `session` subcommand.
#[derive(Parser, Debug)]
pub struct SessionArgs {
    /// Persona prompt (defaults to the configured prompt)
    #[arg(short, long)]
    pub prompt: Option<String>,

    /// Voice (alloy, echo, fable, onyx, nova, shimmer)
    #[arg(short, long)]
    pub voice: Option<Voice>,
}

/// Arguments for the `report-usage` subcommand.
#[derive(Parser, Debug)]
pub struct ReportUsageArgs {
    #[arg(long, value_enum)]
    pub participant: ParticipantArg,

    /// Whole seconds spoken
    #[arg(long)]
    pub seconds: u64,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParticipantArg {
    User,
    Ai,
}

impl From<ParticipantArg> for Participant {
    fn from(value: ParticipantArg) -> Self {
        match value {
            ParticipantArg::User => Participant::User,
            ParticipantArg::Ai => Participant::Ai,
        }
    }
}

impl Cli {
    /// Parse CLI arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_usage_parses_participant_and_seconds() {
        let cli = Cli::try_parse_from([
            "ceritain-call",
            "report-usage",
            "--participant",
            "ai",
            "--seconds",
            "4",
        ])
        .unwrap();
        match cli.command {
            Commands::ReportUsage(args) => {
                assert_eq!(Participant::from(args.participant), Participant::Ai);
                assert_eq!(args.seconds, 4);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn session_voice_parses_lowercase() {
        let cli = Cli::try_parse_from(["ceritain-call", "session", "--voice", "nova"]).unwrap();
        match cli.command {
            Commands::Session(args) => assert_eq!(args.voice, Some(Voice::Nova)),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn global_token_flag_is_accepted_after_subcommand() {
        let cli = Cli::try_parse_from(["ceritain-call", "balance", "--token", "tok"]).unwrap();
        assert_eq!(cli.token.as_deref(), Some("tok"));
    }
}
