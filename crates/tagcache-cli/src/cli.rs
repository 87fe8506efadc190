use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "tagcache")]
#[command(about = "Inspect the cache tiers and invalidate tags")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to a TOML config file (defaults to ./tagcache.toml when present)
    #[arg(short, long, global = true, env = "TAGCACHE_CONFIG")]
    pub config: Option<String>,

    /// Log level (overrides logging.level; RUST_LOG wins over both)
    #[arg(long, global = true)]
    pub log_level: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Check which tier would be selected and whether Redis answers
    Probe,
    /// Print the tags an entity kind produces for the given ids
    Tags(KindArgs),
    /// Invalidate every tag an entity kind produces for the given ids
    Revalidate(KindArgs),
    /// List the known entity kinds and their id fields
    Kinds,
}

#[derive(clap::Args)]
pub struct KindArgs {
    /// Entity kind (e.g. response, survey)
    pub kind: String,
    /// Identifiers as field=value pairs (e.g. --id id=r1 --id environmentId=e1)
    #[arg(long = "id", value_name = "FIELD=VALUE")]
    pub ids: Vec<String>,
}
