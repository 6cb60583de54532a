/*!
 * miniofs CLI - store and fetch files in MinIO / S3 buckets
 */

use anyhow::{anyhow, bail, Context};
use clap::{Parser, Subcommand};
use futures::TryStreamExt;
use miniofs::{
    config::{LogLevel, MinioConfig},
    logging,
    management::StorageManagement,
    protocol::s3::{ClientFactory, MemoryClientFactory, MemoryObjectStore},
    storage::{FileRef, FileStorage, FileStorageLocator, MinioFileStorage, DEFAULT_STORAGE_NAME},
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncWrite, AsyncWriteExt};

const EXIT_SUCCESS: i32 = 0;
const EXIT_FAILURE: i32 = 1;

#[derive(Parser)]
#[command(name = "miniofs")]
#[command(version, about = "Store and fetch files in MinIO or S3-compatible buckets", long_about = None)]
struct Cli {
    /// TOML configuration file (defaults to MINIOFS_* environment variables)
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Name the storage is registered under
    #[arg(long, default_value = DEFAULT_STORAGE_NAME, global = true)]
    storage_name: String,

    /// Log level
    #[arg(long, value_enum, default_value = "warn", global = true)]
    log_level: LogLevel,

    /// Write logs to this file as JSON lines
    #[arg(long, value_name = "FILE", global = true)]
    log_file: Option<PathBuf>,

    /// Use a throwaway in-process object store instead of a server
    #[arg(long, global = true)]
    in_memory: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload a file and print its reference
    Save {
        /// File to upload
        path: PathBuf,

        /// Stored file name (defaults to the file's own name)
        #[arg(long)]
        name: Option<String>,
    },

    /// Download a stored file
    Open {
        /// Reference printed by `save`
        reference: String,

        /// Write to this file instead of stdout
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// Delete a stored file
    Remove {
        /// Reference printed by `save`
        reference: String,
    },

    /// Print whether a stored file is present
    Exists {
        /// Reference printed by `save`
        reference: String,
    },

    /// Validate the configuration and build a client
    CheckConfig {
        /// Print the active settings as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() {
    let code = match run().await {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            EXIT_FAILURE
        }
    };
    std::process::exit(code);
}

async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Err(e) = logging::init_logging(cli.log_level, cli.log_file.as_deref()) {
        eprintln!("Warning: Failed to initialize logging: {}", e);
    }

    let config = load_config(cli.config.as_deref())?;
    let minio = Arc::new(build_storage(&cli, config)?);

    let locator = Arc::new(FileStorageLocator::new());
    locator.register(minio.clone());

    if let Commands::CheckConfig { json } = cli.command {
        let status = StorageManagement::new(locator).refresh_default()?;
        let settings = minio
            .active_settings()
            .ok_or_else(|| anyhow!("storage was not initialized"))?;

        if json {
            let report = serde_json::json!({
                "status": status,
                "storage": minio.storage_name(),
                "endpoint_url": settings.endpoint_url,
                "bucket": settings.bucket,
                "region": settings.region_or_default(),
                "part_size": settings.part_size,
                "static_credentials": settings.credentials.is_static(),
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        } else {
            println!("{}", status);
            println!("endpoint:    {}", settings.endpoint_url);
            println!("bucket:      {}", settings.bucket);
            println!("region:      {}", settings.region_or_default());
            println!("part size:   {}", settings.part_size);
            println!("credentials: {:?}", settings.credentials);
        }
        return Ok(());
    }

    minio.init()?;

    match cli.command {
        Commands::Save { path, name } => {
            let name = match name {
                Some(name) => name,
                None => path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .ok_or_else(|| anyhow!("{} has no file name", path.display()))?,
            };
            let file = tokio::fs::File::open(&path)
                .await
                .with_context(|| format!("Cannot open {}", path.display()))?;

            let reference = minio.save(&name, Box::new(file)).await?;
            println!("{}", reference);
        }
        Commands::Open { reference, output } => {
            let reference = parse_reference(&reference)?;
            let storage = locator.get_by_name(reference.storage_name())?;
            let stream = storage.open(&reference).await?;

            match output {
                Some(path) => {
                    let mut file = tokio::fs::File::create(&path)
                        .await
                        .with_context(|| format!("Cannot create {}", path.display()))?;
                    copy_stream(stream, &mut file).await?;
                }
                None => copy_stream(stream, &mut tokio::io::stdout()).await?,
            }
        }
        Commands::Remove { reference } => {
            let reference = parse_reference(&reference)?;
            locator
                .get_by_name(reference.storage_name())?
                .remove(&reference)
                .await?;
        }
        Commands::Exists { reference } => {
            let reference = parse_reference(&reference)?;
            let present = locator
                .get_by_name(reference.storage_name())?
                .exists(&reference)
                .await?;
            println!("{}", present);
        }
        Commands::CheckConfig { .. } => {}
    }

    Ok(())
}

fn load_config(path: Option<&Path>) -> anyhow::Result<MinioConfig> {
    let config = match path {
        Some(path) => MinioConfig::from_file(path)?,
        None => MinioConfig::from_env()?,
    };
    Ok(config)
}

fn build_storage(cli: &Cli, config: MinioConfig) -> anyhow::Result<MinioFileStorage> {
    if cli.in_memory {
        let store = Arc::new(MemoryObjectStore::new());
        store.create_bucket(&config.bucket);
        let factory: Arc<dyn ClientFactory> = Arc::new(MemoryClientFactory::new(store));
        return Ok(MinioFileStorage::with_factory(
            &cli.storage_name,
            config,
            factory,
        ));
    }

    #[cfg(feature = "s3-native")]
    {
        Ok(MinioFileStorage::new(&cli.storage_name, config))
    }

    #[cfg(not(feature = "s3-native"))]
    {
        bail!("built without the s3-native feature; use --in-memory")
    }
}

fn parse_reference(raw: &str) -> anyhow::Result<FileRef> {
    let reference: FileRef = raw.parse()?;
    if reference.file_name().is_empty() {
        bail!("reference '{}' has an empty file name", raw);
    }
    Ok(reference)
}

async fn copy_stream<W>(mut stream: miniofs::storage::ReadStream, out: &mut W) -> anyhow::Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(chunk) = stream.try_next().await? {
        out.write_all(&chunk).await?;
    }
    out.flush().await?;
    Ok(())
}
