//! CLI argument parsing and subcommand dispatch.

use anyhow::Context;
use chrono::{Duration, Utc};
use clap::{Parser, Subcommand};

use recipe_core::schema::DataSchema;
use recipe_core::Config;

use crate::auth::identity;
use crate::startup;

/// One year.
const MAX_TOKEN_TTL_MINUTES: i64 = 365 * 24 * 60;

/// GraphQL recipe-suggestion API backed by Bedrock.
#[derive(Parser, Debug)]
#[command(name = "recipe-server", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the HTTP server (default).
    Serve,
    /// Print the schema document.
    Schema,
    /// Issue a new API key. The plaintext key is printed once.
    IssueKey {
        #[arg(long)]
        description: Option<String>,
    },
    /// List API keys with their expiry and status.
    ListKeys,
    /// Revoke an API key by id.
    RevokeKey { id: String },
    /// Mint an identity token for `subject` (needs AUTH_JWT_SECRET).
    IssueToken {
        subject: String,
        #[arg(
            long,
            default_value_t = 60,
            value_parser = clap::value_parser!(i64).range(1..=MAX_TOKEN_TTL_MINUTES)
        )]
        ttl_minutes: i64,
    },
}

/// Run a non-serving subcommand. Returns `Ok(false)` when the caller should
/// start the server instead.
pub fn dispatch(config: &Config, command: &Command) -> anyhow::Result<bool> {
    match command {
        Command::Serve => return Ok(false),
        Command::Schema => {
            let schema =
                DataSchema::recipe().with_api_key_expiry(config.auth.api_key_expires_in_days);
            print!("{}", schema.to_sdl());
        }
        Command::IssueKey { description } => {
            config.auth.validate()?;
            let mut store = startup::open_key_store(config)?;
            let issued = store.issue(description.clone())?;
            println!("id:      {}", issued.record.id);
            println!("key:     {}", issued.key);
            println!("expires: {}", issued.record.expires_at.to_rfc3339());
        }
        Command::ListKeys => {
            let store = startup::open_key_store(config)?;
            let now = Utc::now();
            for record in store.list() {
                let status = if record.revoked {
                    "revoked"
                } else if record.is_active_at(now) {
                    "active"
                } else {
                    "expired"
                };
                println!(
                    "{}  {:8}  expires {}  {}",
                    record.id,
                    status,
                    record.expires_at.to_rfc3339(),
                    record.description.as_deref().unwrap_or("")
                );
            }
        }
        Command::RevokeKey { id } => {
            let mut store = startup::open_key_store(config)?;
            store.revoke(id)?;
            println!("revoked {}", id);
        }
        Command::IssueToken {
            subject,
            ttl_minutes,
        } => {
            let secret = config
                .auth
                .jwt_secret
                .as_deref()
                .context("AUTH_JWT_SECRET must be set to issue identity tokens")?;
            let ttl = Duration::try_minutes(*ttl_minutes)
                .filter(|_| (1..=MAX_TOKEN_TTL_MINUTES).contains(ttl_minutes))
                .with_context(|| {
                    format!("--ttl-minutes must be between 1 and {}", MAX_TOKEN_TTL_MINUTES)
                })?;
            let token =
                identity::issue_token(secret, subject, config.auth.jwt_issuer.as_deref(), ttl)?;
            println!("{}", token);
        }
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_subcommands() {
        let cli = Cli::try_parse_from(["recipe-server"]).unwrap();
        assert!(cli.command.is_none());

        let cli = Cli::try_parse_from(["recipe-server", "issue-key", "--description", "web"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Command::IssueKey { description: Some(ref d) }) if d == "web"
        ));

        let cli = Cli::try_parse_from(["recipe-server", "issue-token", "alice", "--ttl-minutes", "5"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Command::IssueToken { ref subject, ttl_minutes: 5 }) if subject == "alice"
        ));

        assert!(Cli::try_parse_from(["recipe-server", "revoke-key"]).is_err());
    }

    #[test]
    fn token_ttl_is_bounded() {
        for bad in ["0", "-5", "9223372036854775807", "525601"] {
            assert!(
                Cli::try_parse_from(["recipe-server", "issue-token", "alice", "--ttl-minutes", bad])
                    .is_err(),
                "{bad}"
            );
        }
        assert!(Cli::try_parse_from(["recipe-server", "issue-token", "alice", "--ttl-minutes", "525600"]).is_ok());

        let mut config = Config::for_profile("");
        config.auth.jwt_secret = Some("s".into());
        let cmd = Command::IssueToken {
            subject: "bob".into(),
            ttl_minutes: i64::MAX,
        };
        assert!(dispatch(&config, &cmd).is_err());
    }

    #[test]
    fn issue_list_revoke_round_trip_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::for_profile("");
        config.storage.data_dir = dir.path().to_path_buf();
        config.auth.api_key_expires_in_days = 30;

        assert!(dispatch(&config, &Command::IssueKey { description: None }).unwrap());
        let store = startup::open_key_store(&config).unwrap();
        assert_eq!(store.list().len(), 1);
        let id = store.list()[0].id.clone();

        assert!(dispatch(&config, &Command::RevokeKey { id: id.clone() }).unwrap());
        let store = startup::open_key_store(&config).unwrap();
        assert!(store.list()[0].revoked);

        assert!(dispatch(&config, &Command::RevokeKey { id: "missing".into() }).is_err());
    }

    #[test]
    fn serve_defers_to_caller() {
        let config = Config::for_profile("");
        assert!(!dispatch(&config, &Command::Serve).unwrap());
    }

    #[test]
    fn token_requires_secret() {
        let mut config = Config::for_profile("");
        config.auth.jwt_secret = None;
        let cmd = Command::IssueToken {
            subject: "bob".into(),
            ttl_minutes: 5,
        };
        assert!(dispatch(&config, &cmd).is_err());
    }
}
