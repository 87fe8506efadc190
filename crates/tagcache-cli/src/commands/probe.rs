use std::time::Instant;

use anyhow::Result;
use colored::Colorize;
use tagcache::tier::RemoteTier;
use tagcache::{CacheConfig, TierKind};

use crate::output::{print_error, print_success, print_warning};

/// Try the remote tier the same way startup does and report the outcome.
pub async fn probe(config: &CacheConfig) -> Result<bool> {
    println!("{}: {}", "Local capacity".cyan(), config.local.capacity);
    println!(
        "{}: {}s (expiry x{})",
        "Stale age".cyan(),
        config.ttl.default_stale_secs,
        config.ttl.expire_multiplier
    );

    if !config.remote.enabled {
        tracing::info!(tier = %selected_tier(config, false), "remote tier disabled");
        print_warning("Remote tier disabled; the local tier would be used");
        return Ok(true);
    }

    println!("{}: {}", "Redis".cyan(), config.remote.url);
    println!("{}: {}", "Key prefix".cyan(), config.remote.key_prefix);

    let started = Instant::now();
    match RemoteTier::connect(&config.remote).await {
        Ok(remote) => {
            let connected_in = started.elapsed();
            let ping_started = Instant::now();
            remote.ping().await?;
            tracing::info!(
                tier = %selected_tier(config, true),
                url = %config.remote.url,
                connect_ms = connected_in.as_millis() as u64,
                "remote tier reachable"
            );
            print_success(&format!(
                "Remote tier reachable (connect {} ms, ping {} ms)",
                connected_in.as_millis(),
                ping_started.elapsed().as_millis()
            ));
            Ok(true)
        }
        Err(e) => {
            tracing::info!(
                tier = %selected_tier(config, false),
                url = %config.remote.url,
                error = %e,
                "remote tier unavailable"
            );
            print_error(&format!(
                "Remote tier unavailable after {} ms: {e}",
                started.elapsed().as_millis()
            ));
            match config.remote.probe_interval_secs {
                Some(secs) => print_warning(&format!(
                    "Instances would run on the local tier and retry every {secs}s"
                )),
                None => print_warning("Instances would run on the local tier until restarted"),
            }
            Ok(false)
        }
    }
}

/// The tier an instance with `config` would start on.
fn selected_tier(config: &CacheConfig, connected: bool) -> TierKind {
    if config.remote.enabled && connected {
        TierKind::Remote
    } else {
        TierKind::Local
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selected_tier() {
        let mut config = CacheConfig::default();
        assert_eq!(selected_tier(&config, true), TierKind::Local);

        config.remote.enabled = true;
        assert_eq!(selected_tier(&config, true), TierKind::Remote);
        assert_eq!(selected_tier(&config, false), TierKind::Local);
    }

    #[tokio::test]
    async fn test_disabled_remote_reports_success() {
        assert!(probe(&CacheConfig::default()).await.unwrap());
    }

    #[tokio::test]
    async fn test_refused_remote_reports_failure() {
        let mut config = CacheConfig::default();
        config.remote.enabled = true;
        config.remote.url = "redis://127.0.0.1:1".to_string();
        config.remote.connect_timeout_ms = 300;
        assert!(!probe(&config).await.unwrap());
    }
}
