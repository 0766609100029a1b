use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[command(
    name = "s3-image-source",
    about = "Source images from an S3-compatible bucket into a local content graph"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run one sync pass against the bucket
    Sync(SyncArgs),

    /// Summarize the node store
    Status(StatusArgs),
}

#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Bucket to source images from
    #[arg(short = 'b', long)]
    pub bucket_name: String,

    /// Endpoint host: the AWS S3 host, or a CDN/MinIO/Spaces front
    #[arg(long, default_value = "s3.amazonaws.com")]
    pub domain: String,

    /// AWS region, used for virtual-hosted object URLs
    #[arg(long, default_value = "us-east-1")]
    pub region: String,

    /// URL scheme for object fetches
    #[arg(long, default_value = "https")]
    pub protocol: String,

    /// Storage access key (without it, the default credential chain applies)
    #[arg(long, env = "AWS_ACCESS_KEY_ID")]
    pub access_key_id: Option<String>,

    /// Storage secret key.
    /// WARNING: passing via --secret-access-key is visible in process
    /// listings. Prefer the environment variable.
    #[arg(long, env = "AWS_SECRET_ACCESS_KEY", hide_env_values = true)]
    pub secret_access_key: Option<String>,

    /// Local directory downloads land in
    #[arg(short = 'd', long, default_value = "images")]
    pub directory: String,

    /// Node store path (default: <directory>/nodes.db)
    #[arg(long)]
    pub state_db: Option<String>,

    /// List and partition only; fetch and register nothing
    #[arg(long)]
    pub dry_run: bool,

    /// Disable the progress bar
    #[arg(long)]
    pub no_progress_bar: bool,

    /// After the pass, delete nodes it neither created nor touched
    #[arg(long)]
    pub sweep: bool,

    /// Log level
    #[arg(long, value_enum, default_value = "info")]
    pub log_level: LogLevel,
}

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Local directory downloads land in
    #[arg(short = 'd', long, default_value = "images")]
    pub directory: String,

    /// Node store path (default: <directory>/nodes.db)
    #[arg(long)]
    pub state_db: Option<String>,

    /// Log level
    #[arg(long, value_enum, default_value = "warn")]
    pub log_level: LogLevel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_filter(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}
