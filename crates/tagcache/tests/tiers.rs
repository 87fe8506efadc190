//! Tier selection and graceful degradation when Redis is unreachable or stalls.

use std::collections::BTreeSet;
use std::time::{Duration, Instant};

use tagcache::config::{CacheConfig, RemoteConfig};
use tagcache::tier::LocalTier;
use tagcache::{Cache, CacheEntry, CacheOptions, CacheTier, TierKind, TierSelector, TtlPolicy};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::{TcpListener, TcpStream};

fn entry(key: &str, tags: &[&str]) -> CacheEntry {
    CacheEntry::new(
        key,
        key.as_bytes().to_vec(),
        tags.iter().map(|t| t.to_string()).collect::<BTreeSet<_>>(),
        Duration::from_secs(60),
        Duration::from_secs(90),
    )
}

fn config_for(url: String, connect_timeout_ms: u64) -> CacheConfig {
    CacheConfig {
        remote: RemoteConfig {
            enabled: true,
            url,
            connect_timeout_ms,
            op_timeout_ms: 100,
            ..RemoteConfig::default()
        },
        ..CacheConfig::default()
    }
}

#[tokio::test]
async fn test_local_tier_lru_order() {
    let tier = LocalTier::with_capacity(2);
    tier.set(entry("a", &["t"])).await.unwrap();
    tier.set(entry("b", &["t"])).await.unwrap();
    assert!(tier.get("a").await.unwrap().is_some());
    tier.set(entry("c", &[])).await.unwrap();

    assert!(tier.get("b").await.unwrap().is_none());
    assert!(tier.get("a").await.unwrap().is_some());
    assert!(tier.get("c").await.unwrap().is_some());

    assert_eq!(tier.delete_by_tag("t").await.unwrap(), 1);
    assert_eq!(tier.len(), 1);
    assert_eq!(tier.stats().evictions, 1);
}

#[tokio::test]
async fn test_disabled_remote_selects_local() {
    let selector = TierSelector::init(&CacheConfig::default()).await;
    assert_eq!(selector.active_kind(), TierKind::Local);
    assert_eq!(selector.local_stats().map(|s| s.capacity), Some(1000));
}

#[tokio::test]
async fn test_refused_connection_falls_back_to_local() {
    let selector = TierSelector::init(&config_for("redis://127.0.0.1:1".into(), 500)).await;
    assert_eq!(selector.active_kind(), TierKind::Local);

    selector.set(entry("fallback", &["x"])).await;
    assert!(selector.get("fallback").await.is_some());
}

#[tokio::test]
async fn test_silent_server_times_out_within_connect_timeout() {
    // Accepts TCP connections but never answers PING.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let started = Instant::now();
    let selector = TierSelector::init(&config_for(format!("redis://{addr}"), 200)).await;
    assert!(started.elapsed() < Duration::from_secs(3));
    assert_eq!(selector.active_kind(), TierKind::Local);

    let cache = Cache::new(selector.clone(), TtlPolicy::default());
    let options = CacheOptions::new().tag("surveys-s1-responses");
    let value: u32 = cache
        .cached("count:s1", &options, || async { Ok::<_, String>(42) })
        .await
        .unwrap();
    assert_eq!(value, 42);

    let report = cache.revalidate_tags(["surveys-s1-responses"]).await;
    assert!(report.is_complete());
    assert_eq!(report.removed_entries(), 1);
    drop(listener);
}

/// Fake Redis that completes the connection handshake and answers pool
/// health checks, then stops replying on a connection after its first data
/// command.
async fn spawn_stalling_redis() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            tokio::spawn(serve_until_stalled(socket));
        }
    });
    format!("redis://{addr}")
}

async fn read_command(reader: &mut BufReader<OwnedReadHalf>) -> Option<Vec<String>> {
    let mut line = String::new();
    if reader.read_line(&mut line).await.ok()? == 0 {
        return None;
    }
    let count: usize = line.trim_end().strip_prefix('*')?.parse().ok()?;
    let mut args = Vec::with_capacity(count);
    for _ in 0..count {
        line.clear();
        reader.read_line(&mut line).await.ok()?;
        let len: usize = line.trim_end().strip_prefix('$')?.parse().ok()?;
        let mut buf = vec![0; len + 2];
        reader.read_exact(&mut buf).await.ok()?;
        buf.truncate(len);
        args.push(String::from_utf8_lossy(&buf).into_owned());
    }
    Some(args)
}

async fn serve_until_stalled(socket: TcpStream) {
    let (read, mut write) = socket.into_split();
    let mut reader = BufReader::new(read);
    while let Some(args) = read_command(&mut reader).await {
        let command = args.first().map(|c| c.to_ascii_uppercase());
        let reply = match (command.as_deref(), args.get(1)) {
            (Some("CLIENT") | Some("SELECT"), _) => "+OK\r\n".to_string(),
            // deadpool recycles with `PING <n>` and expects `<n>` back.
            (Some("PING"), Some(arg)) => format!("${}\r\n{arg}\r\n", arg.len()),
            (Some("PING"), None) => "+PONG\r\n".to_string(),
            _ => break,
        };
        if write.write_all(reply.as_bytes()).await.is_err() {
            return;
        }
    }
    // Keep the connection open and unanswered.
    let _ = tokio::io::copy(&mut reader, &mut tokio::io::sink()).await;
    drop(write);
}

#[tokio::test]
async fn test_connected_but_stalled_redis_is_bounded_per_call() {
    let url = spawn_stalling_redis().await;
    let mut config = config_for(url, 1000);
    config.remote.op_timeout_ms = 200;

    let selector = TierSelector::init(&config).await;
    assert_eq!(selector.active_kind(), TierKind::Remote);

    // First data command on the pooled connection: the server goes silent.
    let started = Instant::now();
    let err = selector.delete_by_tag("surveys-s1").await.unwrap_err();
    assert!(err.is_timeout(), "expected a timeout, got {err}");
    assert!(started.elapsed() < Duration::from_secs(1));

    let started = Instant::now();
    assert!(selector.get("survey:s1").await.is_none());
    assert!(started.elapsed() < Duration::from_secs(1));

    let started = Instant::now();
    selector.set(entry("survey:s1", &["surveys-s1"])).await;
    assert!(started.elapsed() < Duration::from_secs(1));

    // A read and a write, each bounded by the op timeout.
    let cache = Cache::new(selector.clone(), TtlPolicy::default());
    let started = Instant::now();
    let value: u32 = cache
        .cached("count:s1", &CacheOptions::new().tag("surveys-s1"), || async {
            Ok::<_, String>(7)
        })
        .await
        .unwrap();
    assert_eq!(value, 7);
    assert!(started.elapsed() < Duration::from_secs(2));
}
