//! shroud - parallel in-place file encryption.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::Parser;
use owo_colors::{OwoColorize, Stream::Stderr};
use tracing::{Level, warn};

use shroud::cli::{Cli, Commands, TransformArgs};
use shroud::keys::LEGACY_PREFIX;
use shroud::logging::{self, LogConfig};
use shroud::pool::{Action, Pool, PoolConfig, TASK_STR_LEN, Task};

fn main() {
    let cli = Cli::parse();

    if cli.no_color {
        owo_colors::set_override(false);
    }

    logging::init(
        LogConfig::new()
            .with_level(log_level(&cli))
            .with_env_overrides(),
    );

    let result = match &cli.command {
        Commands::Encrypt(args) => cmd_transform(Action::Encrypt, args),
        Commands::Decrypt(args) => cmd_transform(Action::Decrypt, args),
        Commands::Completions(args) => {
            args.generate();
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!(
            "{}: {}",
            "error"
                .if_supports_color(Stderr, |text| text.red())
                .if_supports_color(Stderr, |text| text.bold()),
            e
        );
        for cause in e.chain().skip(1) {
            eprintln!(
                "  {}: {}",
                "caused by".if_supports_color(Stderr, |text| text.yellow()),
                cause
            );
        }
        std::process::exit(1);
    }
}

/// Map the verbosity flags to a base log level.
fn log_level(cli: &Cli) -> Level {
    if cli.quiet {
        Level::ERROR
    } else {
        match cli.verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    }
}

/// Run one transform command: build the pool, submit a task per input file,
/// then drain and reap the workers.
fn cmd_transform(action: Action, args: &TransformArgs) -> Result<()> {
    if args.workers == 0 {
        bail!("at least one worker is required");
    }

    let files = collect_input_files(&args.paths).context("collecting input files")?;
    if files.is_empty() {
        bail!("no input files found");
    }

    let key_field = match &args.key {
        Some(key) if args.legacy => format!("{LEGACY_PREFIX}{key}"),
        Some(key) => key.clone(),
        None => String::new(),
    };

    let mut pool = Pool::new(PoolConfig {
        worker_count: args.workers,
        namespace: args.queue_tag.clone(),
    })
    .context("creating worker pool")?;

    for file in files {
        let task = Task::work(action, file, key_field.clone());
        let encoded_len = task.encode().len();
        if encoded_len >= TASK_STR_LEN {
            if let Task::Work { path, .. } = &task {
                warn!(path = %path.display(), "skipping: encoded task exceeds the slot size");
            }
            continue;
        }
        pool.submit(task).context("submitting task")?;
    }

    pool.terminate().context("stopping workers")?;
    pool.join().context("waiting for workers")?;
    Ok(())
}

/// Collect regular files from the given paths, walking directories
/// recursively. Sidecar `.lock` files are never task inputs. The result is
/// sorted so submission order is deterministic.
fn collect_input_files(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    fn walk(path: &Path, out: &mut Vec<PathBuf>) -> io::Result<()> {
        let meta = fs::metadata(path)?;
        if meta.is_dir() {
            for entry in fs::read_dir(path)? {
                walk(&entry?.path(), out)?;
            }
        } else if meta.is_file() {
            let is_sidecar = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.ends_with(".lock"));
            let has_comma = path.to_string_lossy().contains(',');
            if has_comma {
                warn!(path = %path.display(), "skipping: commas in paths cannot be encoded");
            } else if !is_sidecar {
                out.push(path.to_path_buf());
            }
        }
        Ok(())
    }

    let mut files = Vec::new();
    for path in paths {
        walk(path, &mut files).with_context(|| format!("reading {}", path.display()))?;
    }
    files.sort();
    Ok(files)
}
