pub mod transfer;

use std::path::PathBuf;

use clap::{ArgAction, Parser};
use transfer_common::config::{Config, DEFAULT_RETRIES};
use transfer_common::storage::PathRule;

#[derive(Parser, Debug)]
#[command(name = "bucket-transfer")]
#[command(version)]
#[command(about = "Move objects between Google Cloud Storage buckets with server-side rewrites.")]
pub struct CommandLine {
    /// GCP project where objects are stored
    #[arg(short = 'p', long = "project", env = "GOOGLE_CLOUD_PROJECT")]
    pub project: String,

    /// JSON file with a list of {id, node: {bucket, path}} records to transfer
    #[arg(short = 'j', long = "json-input")]
    pub json_input: PathBuf,

    /// Name of the bucket objects will be moved to
    #[arg(short = 'b', long = "target-bucket")]
    pub target_bucket: String,

    /// File the new object metadata is appended to (JSON Lines)
    #[arg(short = 'm', long = "meta-outfile")]
    pub meta_outfile: PathBuf,

    /// Delete each source object once its copy is verified
    #[arg(short = 'd', long = "delete-source")]
    pub delete_source: bool,

    /// Strip leading path components for a source bucket, as BUCKET:COUNT
    #[arg(long = "strip", value_name = "BUCKET:COUNT")]
    pub strip: Vec<PathRule>,

    /// Continue with the next object after a failed transfer
    #[arg(long)]
    pub keep_going: bool,

    /// Service account key file
    #[arg(long, env = "GOOGLE_APPLICATION_CREDENTIALS")]
    pub credentials: Option<PathBuf>,

    /// OAuth2 access token, takes precedence over --credentials
    #[arg(long, env = "GOOGLE_OAUTH_ACCESS_TOKEN", hide_env_values = true)]
    pub access_token: Option<String>,

    /// Send requests without credentials (emulators)
    #[arg(long)]
    pub anonymous: bool,

    /// Bill requests to the project, for requester-pays buckets
    #[arg(long)]
    pub requester_pays: bool,

    /// Storage API endpoint
    #[arg(long, env = "STORAGE_EMULATOR_HOST")]
    pub endpoint: Option<String>,

    /// Attempts per request on 429 and 5xx responses
    #[arg(long, default_value_t = DEFAULT_RETRIES)]
    pub retries: u32,

    /// Hide the progress bar
    #[arg(long)]
    pub no_progress: bool,

    /// Less output (-q hides logs, -qq also hides the per-object listing, -qqq prints only errors)
    #[arg(short, long, action = ArgAction::Count)]
    pub quiet: u8,

    /// More log output (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,
}

impl CommandLine {
    pub fn parse_args() -> Self {
        Self::parse()
    }

    pub fn to_config(&self) -> Config {
        Config {
            project: self.project.clone(),
            manifest: self.json_input.clone(),
            target_bucket: self.target_bucket.clone(),
            meta_outfile: self.meta_outfile.clone(),
            delete_source: self.delete_source,
            path_rules: self.strip.clone(),
            keep_going: self.keep_going,
            retries: self.retries,
            requester_pays: self.requester_pays,
            endpoint: self.endpoint.clone(),
            quiet: self.quiet,
        }
    }
}
