use std::path::PathBuf;
use std::sync::atomic::AtomicBool;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};

use depgate::threadfix::{Client, FindingTracker, TrackerConfig};
use depgate::thresholds::{ThresholdLimits, Thresholds};
use depgate::{cli, db, scan};

/// depgate — Dependency-Check report gating and ThreadFix finding submission.
///
/// The `publish` exit code is the verdict: 0 stable, 1 unstable, 2 failed.
#[derive(Parser)]
#[command(name = "depgate", version, about)]
struct Cli {
    /// Path to the SQLite build-history database (default: ./.depgate.db)
    #[arg(long, global = true, default_value = ".depgate.db")]
    db: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate a report against the thresholds, record the build, and
    /// optionally push every finding to ThreadFix.
    Publish {
        /// Report file, or a workspace directory to scan with --pattern.
        input: PathBuf,

        /// Name to record this build under.
        #[arg(long)]
        build: String,

        /// Glob pattern for report files when INPUT is a directory.
        #[arg(long, default_value = scan::DEFAULT_PATTERN)]
        pattern: String,

        /// Evaluate new-scope thresholds against raw count deltas instead of
        /// the identity-based new warning set.
        #[arg(long)]
        use_delta_values: bool,

        /// Use the most recent stable build as the reference instead of the
        /// most recent build.
        #[arg(long)]
        use_stable_reference: bool,

        /// ThreadFix application id. When set, findings are submitted after
        /// the build is recorded (requires tracker connection options).
        #[arg(long)]
        app_id: Option<String>,

        #[command(flatten)]
        tracker: TrackerArgs,

        #[command(flatten)]
        thresholds: ThresholdArgs,
    },

    /// Probe the ThreadFix teams endpoint and report connectivity.
    CheckConnection {
        #[command(flatten)]
        tracker: TrackerArgs,
    },

    /// Re-push a stored build's findings to ThreadFix.
    Submit {
        /// Build name to submit.
        #[arg(long)]
        build: String,

        /// ThreadFix application id.
        #[arg(long)]
        app_id: String,

        #[command(flatten)]
        tracker: TrackerArgs,
    },

    /// List stored builds with their verdicts.
    Builds {
        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },

    /// List a stored build's warnings.
    Warnings {
        /// Build name.
        #[arg(long)]
        build: String,

        /// Only warnings that were new in that build.
        #[arg(long)]
        new_only: bool,

        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Delete a build from the history.
    Delete {
        /// Build name to delete.
        name: String,
    },
}

/// ThreadFix connection options. Flags take precedence over the
/// THREADFIX_URL / THREADFIX_API_KEY environment variables.
#[derive(Args)]
struct TrackerArgs {
    /// ThreadFix base URL, e.g. https://threadfix.example.com
    #[arg(long)]
    url: Option<String>,

    /// ThreadFix API key.
    #[arg(long)]
    api_key: Option<String>,
}

impl TrackerArgs {
    /// Resolve to a config, or `None` when no tracker is configured at all.
    fn resolve(&self) -> Result<Option<TrackerConfig>> {
        let url = self
            .url
            .clone()
            .or_else(|| std::env::var("THREADFIX_URL").ok());
        let api_key = self
            .api_key
            .clone()
            .or_else(|| std::env::var("THREADFIX_API_KEY").ok());
        match (url, api_key) {
            (Some(url), Some(api_key)) => Ok(Some(TrackerConfig::new(&url, &api_key)?)),
            (None, None) => Ok(None),
            (Some(_), None) => bail!("ThreadFix URL given but no API key (--api-key or THREADFIX_API_KEY)"),
            (None, Some(_)) => bail!("ThreadFix API key given but no URL (--url or THREADFIX_URL)"),
        }
    }

    fn require(&self) -> Result<TrackerConfig> {
        self.resolve()?
            .context("ThreadFix connection is not configured (--url/--api-key or THREADFIX_URL/THREADFIX_API_KEY)")
    }
}

/// The sixteen optional threshold limits, one per verdict × scope × priority.
#[derive(Args)]
struct ThresholdArgs {
    #[arg(long)]
    unstable_total_all: Option<u64>,
    #[arg(long)]
    unstable_total_high: Option<u64>,
    #[arg(long)]
    unstable_total_normal: Option<u64>,
    #[arg(long)]
    unstable_total_low: Option<u64>,

    #[arg(long)]
    unstable_new_all: Option<u64>,
    #[arg(long)]
    unstable_new_high: Option<u64>,
    #[arg(long)]
    unstable_new_normal: Option<u64>,
    #[arg(long)]
    unstable_new_low: Option<u64>,

    #[arg(long)]
    failed_total_all: Option<u64>,
    #[arg(long)]
    failed_total_high: Option<u64>,
    #[arg(long)]
    failed_total_normal: Option<u64>,
    #[arg(long)]
    failed_total_low: Option<u64>,

    #[arg(long)]
    failed_new_all: Option<u64>,
    #[arg(long)]
    failed_new_high: Option<u64>,
    #[arg(long)]
    failed_new_normal: Option<u64>,
    #[arg(long)]
    failed_new_low: Option<u64>,
}

impl ThresholdArgs {
    fn into_thresholds(self) -> Thresholds {
        Thresholds {
            unstable_total: ThresholdLimits {
                all: self.unstable_total_all,
                high: self.unstable_total_high,
                normal: self.unstable_total_normal,
                low: self.unstable_total_low,
            },
            unstable_new: ThresholdLimits {
                all: self.unstable_new_all,
                high: self.unstable_new_high,
                normal: self.unstable_new_normal,
                low: self.unstable_new_low,
            },
            failed_total: ThresholdLimits {
                all: self.failed_total_all,
                high: self.failed_total_high,
                normal: self.failed_total_normal,
                low: self.failed_total_low,
            },
            failed_new: ThresholdLimits {
                all: self.failed_new_all,
                high: self.failed_new_high,
                normal: self.failed_new_normal,
                low: self.failed_new_low,
            },
        }
    }
}

fn main() -> Result<()> {
    let args = Cli::parse();

    match args.command {
        Commands::Publish {
            input,
            build,
            pattern,
            use_delta_values,
            use_stable_reference,
            app_id,
            tracker,
            thresholds,
        } => {
            let mut conn = open_db(&args.db)?;
            // The tracker is only engaged when an application id is given.
            let client = match &app_id {
                Some(_) => Some(Client::new(tracker.require()?)),
                None => None,
            };
            let cancel = AtomicBool::new(false);
            let tracker: Option<(&dyn FindingTracker, &str)> = match (&client, &app_id) {
                (Some(client), Some(app_id)) => Some((client, app_id.as_str())),
                _ => None,
            };
            let opts = cli::PublishOptions {
                input: &input,
                pattern: &pattern,
                build_name: &build,
                thresholds: thresholds.into_thresholds(),
                use_delta_values,
                use_stable_reference,
                tracker,
                cancel: &cancel,
            };
            let (out, verdict) = cli::cmd_publish(&mut conn, &opts)?;
            print!("{}", out);
            std::process::exit(verdict.exit_code());
        }
        Commands::CheckConnection { tracker } => {
            let client = Client::new(tracker.require()?);
            print!("{}", cli::cmd_check_connection(&client));
        }
        Commands::Submit {
            build,
            app_id,
            tracker,
        } => {
            let conn = open_db(&args.db)?;
            let client = Client::new(tracker.require()?);
            let cancel = AtomicBool::new(false);
            print!("{}", cli::cmd_submit(&conn, &build, &client, &app_id, &cancel)?);
        }
        Commands::Builds { json } => {
            let conn = open_db(&args.db)?;
            print!("{}", cli::cmd_builds(&conn, json)?);
        }
        Commands::Warnings {
            build,
            new_only,
            json,
        } => {
            let conn = open_db(&args.db)?;
            print!("{}", cli::cmd_warnings(&conn, &build, new_only, json)?);
        }
        Commands::Delete { name } => {
            let mut conn = open_db(&args.db)?;
            print!("{}", cli::cmd_delete(&mut conn, &name)?);
        }
    }

    Ok(())
}

fn open_db(path: &std::path::Path) -> Result<rusqlite::Connection> {
    let conn = db::open(path).context("Failed to open database")?;
    db::init_schema(&conn).context("Failed to initialize schema")?;
    Ok(conn)
}
