use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// CLI surface for the sample profile store.
#[derive(Parser, Debug)]
#[command(
    name = "docustream",
    about = "Encrypted single-document profile store",
    version,
    propagate_version = true
)]
pub struct Cli {
    /// Optional subcommand; defaults to `show` when absent.
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Print the stored profile.
    Show,
    /// Update profile fields; unspecified fields keep their value.
    Set(SetArgs),
    /// Print the on-disk contents (ciphertext when encrypted).
    Raw,
    /// Delete the profile and, when encrypted, all key material.
    Reset,
    /// Print version and exit.
    Version,
    /// Run a health check against storage and the keystore.
    Health,
    /// Manage CLI configuration.
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Args, Debug, Clone, Default, PartialEq, Eq)]
pub struct SetArgs {
    #[arg(long)]
    pub name: Option<String>,
    #[arg(long, allow_negative_numbers = true)]
    pub age: Option<i32>,
    #[arg(long)]
    pub color: Option<String>,
    /// Image file stored as the avatar.
    #[arg(long, value_name = "FILE")]
    pub avatar: Option<PathBuf>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum ConfigCommand {
    /// Create a default config file if one does not exist.
    Init,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_show_when_missing_subcommand() {
        let cli = Cli::try_parse_from(["docustream"]).expect("parse should succeed");
        assert_eq!(cli.command, None);
    }

    #[test]
    fn parses_show_and_raw() {
        let cli = Cli::try_parse_from(["docustream", "show"]).expect("parse should succeed");
        assert_eq!(cli.command, Some(Command::Show));
        let cli = Cli::try_parse_from(["docustream", "raw"]).expect("parse should succeed");
        assert_eq!(cli.command, Some(Command::Raw));
    }

    #[test]
    fn parses_set_with_partial_fields() {
        let cli = Cli::try_parse_from(["docustream", "set", "--name", "bob", "--age", "30"])
            .expect("parse should succeed");
        assert_eq!(
            cli.command,
            Some(Command::Set(SetArgs {
                name: Some("bob".into()),
                age: Some(30),
                color: None,
                avatar: None,
            }))
        );
    }

    #[test]
    fn parses_set_avatar_path() {
        let cli = Cli::try_parse_from(["docustream", "set", "--avatar", "me.jpg"])
            .expect("parse should succeed");
        let Some(Command::Set(args)) = cli.command else {
            panic!("expected set");
        };
        assert_eq!(args.avatar, Some(PathBuf::from("me.jpg")));
    }

    #[test]
    fn rejects_non_numeric_age() {
        assert!(Cli::try_parse_from(["docustream", "set", "--age", "old"]).is_err());
    }

    #[test]
    fn parses_reset_and_health() {
        let cli = Cli::try_parse_from(["docustream", "reset"]).expect("parse should succeed");
        assert_eq!(cli.command, Some(Command::Reset));
        let cli = Cli::try_parse_from(["docustream", "health"]).expect("parse should succeed");
        assert_eq!(cli.command, Some(Command::Health));
    }

    #[test]
    fn parses_config_init_subcommand() {
        let cli =
            Cli::try_parse_from(["docustream", "config", "init"]).expect("parse should succeed");
        assert_eq!(cli.command, Some(Command::Config(ConfigCommand::Init)));
    }
}
