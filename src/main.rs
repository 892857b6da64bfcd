use anyhow::Context;
use clap::Parser;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use navidrome_popularity::catalog::LoftyTagReader;
use navidrome_popularity::config::{CommitMode, Config, LastfmConfig, PolicyKind, DEFAULT_TOP_LIMIT, DEFAULT_WORKERS};
use navidrome_popularity::error::RunError;
use navidrome_popularity::lastfm::LastfmClient;
use navidrome_popularity::models::RunStats;
use navidrome_popularity::pipeline::{Pipeline, RunOutcome};
use navidrome_popularity::progress::set_log_only;

const EXIT_SUCCESS: u8 = 0;
const EXIT_FATAL: u8 = 1;
const EXIT_NO_TRACKS: u8 = 2;

#[derive(Parser)]
#[command(name = "navidrome-popularity")]
#[command(about = "Rewrite Navidrome play counts from Last.fm top tracks")]
struct Args {
    /// Path to navidrome.db
    #[arg(long, env = "NAVIDROME_DB")]
    db_file: PathBuf,

    /// Root of the local music library
    #[arg(long, env = "MUSIC_FOLDER")]
    music_folder: PathBuf,

    /// Navidrome user whose play counts are rewritten
    #[arg(long, env = "NAVIDROME_USER")]
    user: String,

    #[arg(long, env = "LASTFM_API_KEY", hide_env_values = true)]
    lastfm_api_key: Option<String>,

    #[arg(long, env = "LASTFM_API_SECRET", hide_env_values = true)]
    lastfm_api_secret: Option<String>,

    /// overwrite: rank-weighted play counts; boost: add --boost-increment to matches
    #[arg(long, value_enum, default_value = "overwrite")]
    policy: PolicyKind,

    #[arg(long, default_value = "1")]
    boost_increment: i64,

    /// atomic: one transaction per run; incremental: commit after each track
    #[arg(long, value_enum, default_value = "atomic")]
    commit: CommitMode,

    /// Prefix of the library as Navidrome sees it (e.g. /music/)
    #[arg(long)]
    library_prefix: Option<String>,

    /// Top tracks requested per artist
    #[arg(long, default_value_t = DEFAULT_TOP_LIMIT)]
    limit: u32,

    /// Concurrent Last.fm requests
    #[arg(long, default_value_t = DEFAULT_WORKERS)]
    workers: usize,

    /// Hide progress bars and log progress lines instead
    #[arg(long)]
    log_only: bool,

    #[arg(short, long)]
    verbose: bool,

    /// Write run statistics as JSON to this file
    #[arg(long)]
    stats_json: Option<PathBuf>,
}

impl Args {
    fn into_config(self) -> Config {
        let mut config = Config::new(
            self.db_file,
            self.music_folder,
            self.user,
            LastfmConfig::new(self.lastfm_api_key, self.lastfm_api_secret),
        );
        config.policy = self.policy.with_increment(self.boost_increment);
        config.commit_mode = self.commit;
        config.library_prefix = self.library_prefix;
        config.top_limit = self.limit;
        config.workers = self.workers;
        config
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr).with_target(false))
        .init();
}

fn main() -> ExitCode {
    // A missing .env is fine; credentials may come from flags or the shell.
    let _ = dotenvy::dotenv();

    let args = Args::parse();
    init_tracing(args.verbose);
    set_log_only(args.log_only);

    ExitCode::from(run(args))
}

/// Run once and return the exit status. The summary is printed on every
/// path, including the early credential failure.
fn run(args: Args) -> u8 {
    let stats_json = args.stats_json.clone();
    let config = args.into_config();

    println!("Opening music folder: {:?}", config.music_folder);
    println!("Target database: {:?}", config.db_file);

    let client = match LastfmClient::new(config.lastfm.clone()) {
        Ok(client) => client,
        Err(e) => {
            tracing::error!("{}", RunError::Credentials(e));
            eprintln!("Provide them with --lastfm-api-key/--lastfm-api-secret or in a .env file.");
            report(&RunStats::default(), stats_json.as_deref());
            return EXIT_FATAL;
        }
    };

    let reader = LoftyTagReader;
    let mut pipeline = Pipeline::new(&config, &client, &reader);
    let result = pipeline.run();
    report(pipeline.stats(), stats_json.as_deref());

    match result {
        Ok(RunOutcome::Completed) => EXIT_SUCCESS,
        Ok(RunOutcome::NoTracks) => EXIT_NO_TRACKS,
        Err(e) => {
            tracing::error!("Fatal: {:#}", anyhow::Error::new(e));
            EXIT_FATAL
        }
    }
}

fn report(stats: &RunStats, stats_json: Option<&Path>) {
    stats.print_summary();
    if let Some(path) = stats_json {
        if let Err(e) = stats
            .write_to_file(path)
            .with_context(|| format!("Failed to write stats to {}", path.display()))
        {
            tracing::warn!("{:#}", e);
        }
    }
}
