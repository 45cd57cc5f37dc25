//! Configuration for bcached

use bcache_core::Entry;
use clap::Parser;
use std::net::SocketAddr;
use std::str::FromStr;

/// bcached - bcache replicated cache node
#[derive(Parser, Debug, Clone)]
#[command(name = "bcached")]
#[command(about = "Gossip-replicated bounded key/value cache node")]
pub struct Config {
    /// UDP listen address for gossip traffic
    #[arg(short, long, default_value = "0.0.0.0:9200", env = "BCACHE_LISTEN")]
    pub listen: SocketAddr,

    /// Static peer list (comma-separated addresses)
    #[arg(long, value_delimiter = ',', env = "BCACHE_PEERS")]
    pub peers: Vec<SocketAddr>,

    /// Nickname the peer name is derived from (defaults to the listen address)
    #[arg(long, env = "BCACHE_NICKNAME")]
    pub nickname: Option<String>,

    /// Maximum number of keys held locally
    #[arg(long, default_value = "10000", env = "BCACHE_MAX_KEYS")]
    pub max_keys: usize,

    /// Gossip round interval in milliseconds
    #[arg(long, default_value = "1000", env = "BCACHE_GOSSIP_INTERVAL_MS")]
    pub gossip_interval_ms: u64,

    /// Peers contacted per full-state round
    #[arg(long, default_value = "3", env = "BCACHE_FANOUT")]
    pub fanout: usize,

    /// Seed writes applied at startup: key=value or key=value@expiry
    #[arg(long = "set")]
    pub seeds: Vec<Seed>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Log format (json or pretty)
    #[arg(long, default_value = "pretty")]
    pub log_format: String,
}

impl Config {
    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.max_keys == 0 {
            anyhow::bail!("max-keys must be at least 1");
        }
        if self.fanout == 0 {
            anyhow::bail!("fanout must be at least 1");
        }
        if self.gossip_interval_ms == 0 {
            anyhow::bail!("gossip interval cannot be zero");
        }
        if !matches!(self.log_format.as_str(), "json" | "pretty") {
            anyhow::bail!("unknown log format: {}", self.log_format);
        }
        Ok(())
    }

    /// Nickname used to derive the local peer name
    pub fn nickname(&self) -> String {
        self.nickname
            .clone()
            .unwrap_or_else(|| self.listen.to_string())
    }
}

/// A `--set` seed write
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Seed {
    pub key: String,
    pub entry: Entry,
}

impl FromStr for Seed {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (key, rest) = s
            .split_once('=')
            .ok_or_else(|| format!("expected key=value, got {:?}", s))?;
        if key.is_empty() {
            return Err("seed key cannot be empty".to_string());
        }
        let entry = match rest.rsplit_once('@') {
            Some((value, expiry)) => {
                let expiry = expiry
                    .parse::<i64>()
                    .map_err(|e| format!("invalid expiry {:?}: {}", expiry, e))?;
                Entry::new(value, expiry)
            }
            None => Entry::persistent(rest),
        };
        Ok(Self {
            key: key.to_string(),
            entry,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Config {
        Config::try_parse_from(std::iter::once("bcached").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_defaults_validate() {
        let config = parse(&[]);
        assert_eq!(config.max_keys, 10000);
        assert!(config.peers.is_empty());
        assert!(config.validate().is_ok());
        assert_eq!(config.nickname(), "0.0.0.0:9200");
    }

    #[test]
    fn test_peers_and_seeds() {
        let config = parse(&[
            "--peers",
            "127.0.0.1:1,127.0.0.1:2",
            "--set",
            "a=1",
            "--set",
            "b=x=y@1700000000",
        ]);
        assert_eq!(config.peers.len(), 2);
        assert_eq!(
            config.seeds,
            vec![
                Seed {
                    key: "a".into(),
                    entry: Entry::persistent("1")
                },
                Seed {
                    key: "b".into(),
                    entry: Entry::new("x=y", 1_700_000_000)
                },
            ]
        );
    }

    #[test]
    fn test_operational_flags_read_env() {
        use clap::CommandFactory;

        let command = Config::command();
        for (id, var) in [
            ("listen", "BCACHE_LISTEN"),
            ("peers", "BCACHE_PEERS"),
            ("max_keys", "BCACHE_MAX_KEYS"),
            ("gossip_interval_ms", "BCACHE_GOSSIP_INTERVAL_MS"),
            ("fanout", "BCACHE_FANOUT"),
        ] {
            let arg = command
                .get_arguments()
                .find(|arg| arg.get_id() == id)
                .unwrap();
            assert_eq!(arg.get_env(), Some(std::ffi::OsStr::new(var)), "{}", id);
        }
    }

    #[test]
    fn test_invalid_values() {
        assert!(parse(&["--max-keys", "0"]).validate().is_err());
        assert!(parse(&["--fanout", "0"]).validate().is_err());
        assert!(parse(&["--log-format", "xml"]).validate().is_err());
        assert!("novalue".parse::<Seed>().is_err());
        assert!("=v".parse::<Seed>().is_err());
        assert!("k=v@soon".parse::<Seed>().is_err());
    }
}
