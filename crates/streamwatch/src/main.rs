//! streamwatch: Twitch go-live announcements for Discord
//!
//! Main binary with subcommands:
//! - `daemon`: Poll Helix and announce channels that go live
//! - `subscribe` / `unsubscribe`: Manage webhook registrations
//! - `channels` / `tracked`: Inspect the subscription store

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use miette::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod daemon;
mod manage;

#[derive(Parser)]
#[command(name = "streamwatch")]
#[command(about = "Announces Twitch broadcasts to Discord webhooks", long_about = None)]
struct Cli {
    /// SQLite database holding subscriptions and cached metadata
    #[arg(long, global = true, env = "STREAMWATCH_DB", default_value = "streamwatch.db")]
    db: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the polling loop until interrupted
    Daemon {
        /// Twitch application client ID
        #[arg(long, env = "STREAMWATCH_CLIENT_ID")]
        client_id: String,

        /// App access token sent as a bearer token
        #[arg(long, env = "STREAMWATCH_ACCESS_TOKEN")]
        access_token: Option<String>,

        /// Poll interval in seconds
        #[arg(
            long,
            env = "STREAMWATCH_UPDATE_INTERVAL",
            default_value = "60",
            value_parser = clap::value_parser!(u64).range(1..)
        )]
        update_interval: u64,

        /// Helix API base URL
        #[arg(
            long,
            env = "STREAMWATCH_HELIX_URL",
            default_value = streamwatch_helix::DEFAULT_HELIX_URL
        )]
        helix_url: String,

        /// Discord API base URL
        #[arg(
            long,
            env = "STREAMWATCH_DISCORD_URL",
            default_value = streamwatch_notify::DEFAULT_DISCORD_API_URL
        )]
        discord_url: String,

        /// Upper bound on webhook deliveries in flight
        #[arg(
            long,
            env = "STREAMWATCH_MAX_CONCURRENT_DELIVERIES",
            default_value = "16",
            value_parser = clap::value_parser!(u64).range(1..)
        )]
        max_concurrent_deliveries: u64,

        /// Per-delivery HTTP timeout in seconds
        #[arg(
            long,
            env = "STREAMWATCH_DELIVERY_TIMEOUT",
            default_value = "10",
            value_parser = clap::value_parser!(u64).range(1..)
        )]
        delivery_timeout: u64,
    },

    /// Register a Discord webhook for a channel
    Subscribe {
        /// Twitch login to watch
        channel: String,

        /// Context that owns the webhook (e.g. a Discord guild ID)
        owner: String,

        /// Discord webhook ID
        webhook_id: String,

        /// Discord webhook token
        token: String,
    },

    /// Remove the webhook an owner registered for a channel
    Unsubscribe {
        channel: String,
        owner: String,
    },

    /// List the channels an owner is subscribed to
    Channels { owner: String },

    /// List every tracked channel with its subscriber count
    Tracked,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "streamwatch=info".to_string()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Daemon {
            client_id,
            access_token,
            update_interval,
            helix_url,
            discord_url,
            max_concurrent_deliveries,
            delivery_timeout,
        } => {
            daemon::run_with_config(daemon::DaemonConfig {
                db_path: cli.db,
                client_id,
                access_token,
                update_interval,
                helix_url,
                discord_url,
                max_concurrent_deliveries: max_concurrent_deliveries as usize,
                delivery_timeout,
            })
            .await
        }

        Commands::Subscribe {
            channel,
            owner,
            webhook_id,
            token,
        } => {
            let store = manage::open(&cli.db)?;
            manage::subscribe(&store, &channel, &owner, &webhook_id, &token).await
        }

        Commands::Unsubscribe { channel, owner } => {
            let store = manage::open(&cli.db)?;
            manage::unsubscribe(&store, &channel, &owner).await
        }

        Commands::Channels { owner } => {
            let store = manage::open(&cli.db)?;
            for channel in manage::channels(&store, &owner).await? {
                println!("{}", channel);
            }
            Ok(())
        }

        Commands::Tracked => {
            let store = manage::open(&cli.db)?;
            for channel in manage::tracked(&store).await? {
                println!("{}\t{}", channel.name, channel.ref_count);
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_daemon_defaults() {
        let cli = Cli::try_parse_from(["streamwatch", "daemon", "--client-id", "abc"]).unwrap();
        assert_eq!(cli.db, PathBuf::from("streamwatch.db"));

        match cli.command {
            Commands::Daemon {
                client_id,
                access_token,
                update_interval,
                max_concurrent_deliveries,
                delivery_timeout,
                ..
            } => {
                assert_eq!(client_id, "abc");
                assert_eq!(access_token, None);
                assert_eq!(update_interval, 60);
                assert_eq!(max_concurrent_deliveries, 16);
                assert_eq!(delivery_timeout, 10);
            }
            _ => panic!("expected daemon command"),
        }
    }

    #[test]
    fn test_zero_interval_is_rejected() {
        let result = Cli::try_parse_from([
            "streamwatch",
            "daemon",
            "--client-id",
            "abc",
            "--update-interval",
            "0",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_subscribe_positional_args() {
        let cli = Cli::try_parse_from([
            "streamwatch",
            "--db",
            "/tmp/x.db",
            "subscribe",
            "voxel",
            "guild-1",
            "123",
            "secret",
        ])
        .unwrap();

        assert_eq!(cli.db, PathBuf::from("/tmp/x.db"));
        match cli.command {
            Commands::Subscribe {
                channel,
                owner,
                webhook_id,
                token,
            } => {
                assert_eq!(
                    (channel.as_str(), owner.as_str(), webhook_id.as_str(), token.as_str()),
                    ("voxel", "guild-1", "123", "secret")
                );
            }
            _ => panic!("expected subscribe command"),
        }
    }
}
