use crate::{
    config::Config,
    executor::Executor,
    factory,
    gitlab::{self, GitLabClient},
    ledger::Ledger,
    runner::QueueRunner,
    service::MossClient,
    util::{ensure_dir, now_rfc3339},
};
use anyhow::{Context, Result, anyhow, bail};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "moss-batch")]
#[command(about = "Durable, resumable MOSS submission batches")]
pub struct Args {
    /// Path to config TOML.
    #[arg(short, long)]
    pub config: PathBuf,

    /// Override the configured output directory.
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Clone the configured GitLab groups and base repositories.
    #[arg(long)]
    pub clone: bool,

    /// Run the comparison batch.
    #[arg(long)]
    pub run: bool,

    /// Resume the previous batch from its ledger instead of building a new
    /// one. Only meaningful together with --run.
    #[arg(long, requires = "run")]
    pub resume: bool,

    /// Override log level (trace/debug/info/warn/error).
    #[arg(long)]
    pub log_level: Option<String>,
}

pub fn dispatch(args: Args) -> Result<()> {
    if !args.clone && !args.run {
        bail!("nothing to do: pass --clone, --run, or both");
    }

    let cfg = Config::load(&args.config)?;
    let output_dir = args
        .output
        .clone()
        .unwrap_or_else(|| PathBuf::from(&cfg.paths.output));
    let files_dir = PathBuf::from(&cfg.paths.files);

    let log_path = resolve_log_path(&cfg, &output_dir);
    let _guard = init_logging(&args, &cfg, log_path.as_deref())?;

    ensure_dir(&output_dir)?;
    ensure_dir(&files_dir)?;

    if args.clone {
        let url = if cfg.gitlab.url.is_empty() {
            std::env::var("GITLAB_URL").with_context(|| "GITLAB_URL is not set")?
        } else {
            cfg.gitlab.url.clone()
        };
        let token = std::env::var("GITLAB_TOKEN").with_context(|| "GITLAB_TOKEN is not set")?;
        let client = GitLabClient::new(url, token);
        gitlab::clone_pass(&cfg, &client, &files_dir, &output_dir)?;
    }

    if args.run {
        let user_id = std::env::var("MOSS_USER_ID").with_context(|| "MOSS_USER_ID is not set")?;
        run_batch(&cfg, &output_dir, &files_dir, user_id, args.resume)?;
    }

    Ok(())
}

fn run_batch(
    cfg: &Config,
    output_dir: &Path,
    files_dir: &Path,
    user_id: String,
    resume: bool,
) -> Result<()> {
    let ledger_path = output_dir.join("state.json");
    let ledger = if resume {
        let ledger = Ledger::load(ledger_path)?;
        info!(
            "resuming from {}: {} tasks known, {} enqueued",
            ledger.path().display(),
            ledger.len(),
            ledger.pending_len()
        );
        ledger
    } else {
        let mut ledger = Ledger::create(ledger_path)?;
        for task in factory::build_tasks(cfg, output_dir, files_dir)? {
            ledger.add_task(task)?;
        }
        info!("built {} tasks", ledger.len());
        ledger
    };

    let client = MossClient::new(user_id);
    let executor = Executor::new(client, cfg.moss.clone(), cfg.batch.download_connections);
    let cooldown = Duration::from_secs(cfg.batch.cooldown_seconds);
    let mut runner = QueueRunner::new(ledger, executor, cooldown);

    let started = now_rfc3339();
    let summary = runner.run()?;
    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "started": started,
            "finished": now_rfc3339(),
            "summary": summary,
        }))?
    );
    Ok(())
}

fn init_logging(args: &Args, cfg: &Config, file_path: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let level = args
        .log_level
        .as_deref()
        .unwrap_or(cfg.logging.level.as_str());

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let stdout_layer = if cfg.logging.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .boxed()
    };

    let (file_layer, guard) = if let Some(path) = file_path {
        let parent = path.parent().unwrap_or_else(|| Path::new("."));
        ensure_dir(parent)?;
        let file = std::fs::File::create(path)
            .with_context(|| format!("create log file: {}", path.display()))?;
        let (non_blocking, guard) = tracing_appender::non_blocking(file);
        let layer = tracing_subscriber::fmt::layer()
            .with_writer(non_blocking)
            .with_ansi(false)
            .with_target(true)
            .boxed();
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stdout_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow!("failed to init logging: {e}"))?;

    Ok(guard)
}

fn resolve_log_path(cfg: &Config, output_dir: &Path) -> Option<PathBuf> {
    if !cfg.logging.write_to_file {
        return None;
    }
    if !cfg.logging.file_path.is_empty() {
        return Some(PathBuf::from(&cfg.logging.file_path));
    }
    Some(output_dir.join("moss-batch.log"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resume_is_only_accepted_together_with_run() {
        assert!(Args::try_parse_from(["moss-batch", "--config", "b.toml", "--resume"]).is_err());

        let args = Args::try_parse_from(["moss-batch", "--config", "b.toml", "--run", "--resume"])
            .unwrap();
        assert!(args.run);
        assert!(args.resume);
        assert!(!args.clone);
    }

    #[test]
    fn dispatch_refuses_an_invocation_with_nothing_to_do() {
        // Bails before the config file is ever opened.
        let args = Args::try_parse_from(["moss-batch", "--config", "b.toml"]).unwrap();
        let err = dispatch(args).unwrap_err();
        assert!(err.to_string().contains("nothing to do"));
    }
}
