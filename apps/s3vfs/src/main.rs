//! s3vfs - command-line access to a virtual file system over S3.
//!
//! Each invocation runs one command in a fresh storage scope.
//!
//! # Usage
//!
//! ```text
//! S3VFS_BUCKET=site s3vfs ls /docs --recursive
//! s3vfs --memory put ./report.pdf /docs/report.pdf
//! ```
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `S3VFS_BUCKET` | *(unset)* | Default bucket |
//! | `S3VFS_ENDPOINT` | *(unset)* | Custom endpoint (MinIO, LocalStack) |
//! | `S3VFS_LOCAL_ROOT` | `.` | Local root for unmigrated content |
//! | `LOG_LEVEL` | `info` | Log level filter |
//! | `RUST_LOG` | *(unset)* | Fine-grained tracing filter (overrides `LOG_LEVEL`) |

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use s3vfs_aws::AccountInfo;
use s3vfs_core::config::VfsConfig;
use s3vfs_core::directory::SearchOption;
use s3vfs_core::storage::{S3Storage, StorageScope};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "s3vfs")]
#[command(version)]
#[command(about = "File-system style access to S3-compatible object storage")]
#[command(arg_required_else_help = true)]
struct Cli {
    /// Use an in-memory object store instead of connecting to S3.
    #[arg(long, global = true)]
    memory: bool,

    /// Override the default bucket.
    #[arg(long, global = true)]
    bucket: Option<String>,

    /// Override the local root.
    #[arg(long, global = true)]
    local_root: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List a directory.
    Ls {
        /// Directory path.
        #[arg(default_value = "/")]
        path: String,
        /// File-name pattern (`*`, `?`).
        #[arg(long, default_value = "*")]
        pattern: String,
        /// Descend into subdirectories.
        #[arg(short, long)]
        recursive: bool,
    },
    /// Print a file.
    Cat {
        /// File path.
        path: String,
    },
    /// Upload a local file.
    Put {
        /// Local source file.
        source: PathBuf,
        /// Destination path.
        path: String,
    },
    /// Remove a file or directory.
    Rm {
        /// Path to remove.
        path: String,
        /// Remove directories with their contents.
        #[arg(short, long)]
        recursive: bool,
    },
    /// Move a file or directory.
    Mv {
        /// Source path.
        src: String,
        /// Destination path.
        dst: String,
    },
    /// Copy a file.
    Cp {
        /// Source path.
        src: String,
        /// Destination path.
        dst: String,
        /// Replace an existing destination.
        #[arg(short, long)]
        force: bool,
    },
    /// Create a directory.
    Mkdir {
        /// Directory path.
        path: String,
    },
    /// Show attributes of a file.
    Stat {
        /// File path.
        path: String,
    },
    /// Set the advisory lock flag.
    Lock {
        /// File path.
        path: String,
    },
    /// Clear the advisory lock flag.
    Unlock {
        /// File path.
        path: String,
    },
    /// Print the download URL of a file.
    Url {
        /// File path.
        path: String,
    },
    /// Lower-case mixed-case keys uploaded by external tools.
    Import {
        /// Directory path.
        #[arg(default_value = "/")]
        path: String,
    },
}

/// Initialize the tracing subscriber.
///
/// Uses `RUST_LOG` if set, otherwise falls back to the `LOG_LEVEL` config value.
fn init_tracing(log_level: &str) -> Result<()> {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        EnvFilter::try_new(log_level)
            .with_context(|| format!("invalid log level filter: {log_level}"))?
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .init();

    Ok(())
}

async fn open_storage(cli: &Cli, mut config: VfsConfig) -> Result<S3Storage> {
    if let Some(bucket) = &cli.bucket {
        config.bucket = Some(bucket.clone());
    }
    if let Some(root) = &cli.local_root {
        config.local_root.clone_from(root);
    }

    if cli.memory {
        info!("using in-memory object store");
        return Ok(S3Storage::in_memory(config)?);
    }
    let account = AccountInfo::connect(config)
        .await
        .context("failed to connect to the object store")?;
    Ok(account.into_storage()?)
}

async fn run(scope: &StorageScope, command: Command, out: &mut Vec<u8>) -> Result<()> {
    use std::io::Write;

    let dirs = scope.directory();
    let files = scope.file();

    match command {
        Command::Ls {
            path,
            pattern,
            recursive,
        } => {
            let option = if recursive {
                SearchOption::AllDirectories
            } else {
                SearchOption::TopDirectoryOnly
            };
            for dir in dirs.enumerate_directories(&path, &pattern, option).await? {
                writeln!(out, "{dir}/")?;
            }
            for file in dirs.enumerate_files(&path, &pattern, option).await? {
                writeln!(out, "{file}")?;
            }
        }
        Command::Cat { path } => out.extend_from_slice(&files.read_all_bytes(&path).await?),
        Command::Put { source, path } => {
            let mut input = tokio::fs::File::open(&source)
                .await
                .with_context(|| format!("failed to open {}", source.display()))?;
            let mut writer = files.create(&path).await?;
            let copied = tokio::io::copy(&mut input, &mut writer).await?;
            writer.close().await?;
            writeln!(out, "{path}: {copied} bytes")?;
        }
        Command::Rm { path, recursive } => {
            if files.exists(&path).await? {
                files.delete(&path).await?;
            } else {
                dirs.delete(&path, recursive).await?;
            }
        }
        Command::Mv { src, dst } => {
            if files.exists(&src).await? {
                files.move_file(&src, &dst).await?;
            } else {
                dirs.move_directory(&src, &dst).await?;
            }
        }
        Command::Cp { src, dst, force } => files.copy(&src, &dst, force).await?,
        Command::Mkdir { path } => dirs.create_directory(&path).await?,
        Command::Stat { path } => {
            let modified = files.get_last_write_time(&path).await?;
            writeln!(out, "path:     {path}")?;
            writeln!(out, "modified: {}", modified.to_rfc3339())?;
            if let Some(info) = scope.object_info(&path) {
                writeln!(out, "key:      {}", info.location())?;
                writeln!(out, "size:     {}", info.length().await?)?;
                writeln!(out, "locked:   {}", info.is_locked().await?)?;
            }
        }
        Command::Lock { path } => object(scope, &path)?.lock().await?,
        Command::Unlock { path } => object(scope, &path)?.unlock().await?,
        Command::Url { path } => writeln!(out, "{}", files.get_file_url(&path))?,
        Command::Import { path } => {
            let renamed = dirs.prepare_files_for_import(&path).await?;
            writeln!(out, "renamed {renamed} object(s)")?;
        }
    }
    Ok(())
}

fn object(scope: &StorageScope, path: &str) -> Result<s3vfs_core::S3ObjectInfo> {
    scope
        .object_info(path)
        .with_context(|| format!("{path} is not stored in a bucket"))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = VfsConfig::from_env();
    init_tracing(&config.log_level)?;

    let storage = open_storage(&cli, config).await?;
    debug!(command = ?cli.command, "running command");

    let mut out = Vec::new();
    run(&storage.scope(), cli.command, &mut out).await?;

    let mut stdout = tokio::io::stdout();
    stdout.write_all(&out).await?;
    stdout.flush().await?;
    Ok(())
}
