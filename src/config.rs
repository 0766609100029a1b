use std::path::PathBuf;

use crate::cli::SyncArgs;
use crate::url::AWS_S3_HOST;

/// Resolved sync configuration.
pub struct Config {
    pub bucket_name: String,
    pub domain: String,
    pub region: String,
    pub protocol: String,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    /// Download root; fetched objects land here keyed by object key.
    pub directory: PathBuf,
    /// Node store path override.
    pub state_db: Option<PathBuf>,
    pub dry_run: bool,
    pub no_progress_bar: bool,
    pub sweep: bool,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("bucket_name", &self.bucket_name)
            .field("domain", &self.domain)
            .field("region", &self.region)
            .field("protocol", &self.protocol)
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("directory", &self.directory)
            .field("dry_run", &self.dry_run)
            .finish_non_exhaustive()
    }
}

fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}

/// Resolve the node store path: an explicit override, or `nodes.db` under
/// the download root.
pub fn resolve_state_db(directory: &str, state_db: Option<&str>) -> PathBuf {
    match state_db {
        Some(path) => expand_tilde(path),
        None => expand_tilde(directory).join("nodes.db"),
    }
}

impl Config {
    pub fn from_cli(args: SyncArgs) -> anyhow::Result<Self> {
        if args.bucket_name.trim().is_empty() {
            anyhow::bail!("bucket name must not be empty");
        }
        // Credentials only work as a pair; half a pair would silently fall
        // back to the default provider chain.
        if args.access_key_id.is_some() != args.secret_access_key.is_some() {
            anyhow::bail!("access key id and secret access key must be provided together");
        }

        Ok(Self {
            bucket_name: args.bucket_name,
            domain: args.domain,
            region: args.region,
            protocol: args.protocol,
            access_key_id: args.access_key_id,
            secret_access_key: args.secret_access_key,
            state_db: args.state_db.as_deref().map(expand_tilde),
            directory: expand_tilde(&args.directory),
            dry_run: args.dry_run,
            no_progress_bar: args.no_progress_bar,
            sweep: args.sweep,
        })
    }

    /// Whether the configured endpoint is AWS S3 proper (as opposed to a
    /// third-party implementation of the protocol).
    pub fn is_aws_domain(&self) -> bool {
        self.domain.contains(AWS_S3_HOST)
    }

    pub fn state_db_path(&self) -> PathBuf {
        self.state_db
            .clone()
            .unwrap_or_else(|| self.directory.join("nodes.db"))
    }
}
