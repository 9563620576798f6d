use std::{
    io::{self, Write},
    path::PathBuf,
    process::ExitCode,
    sync::Arc,
    time::{Duration, SystemTime},
};

use bucketfs::{
    adapters::{gcs::GcsStore, s3::S3Store, ObjectStore},
    util::object::{self, Provider},
    FileInfo, Filesystem, FsError, ObjectFs,
};
use clap::{Parser, Subcommand};
use google_cloud_storage::client::{Client, ClientConfig};
use tracing::{error, info, span, Level};

#[derive(Parser)]
#[command(name = "bucketfs", version, about = "File operations against an object store bucket")]
struct Cli {
    /// Bucket URI, `s3://bucket` or `gs://bucket`
    bucket: String,

    /// Give up on any single store call after this many seconds
    #[arg(long)]
    timeout_secs: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Upload stdin, or a local file, to PATH
    Put {
        path: String,
        #[arg(long)]
        from: Option<PathBuf>,
    },
    /// Print the object at PATH
    Cat { path: String },
    /// Show metadata for the object at PATH
    Stat { path: String },
    /// List objects under PATH
    Ls {
        #[arg(default_value = "")]
        path: String,
        /// Entries per listing call, 0 lists everything at once
        #[arg(long, default_value_t = 0)]
        page_size: i64,
    },
    /// Delete the object at PATH
    Rm { path: String },
    /// Print a time-limited URL for PATH
    SignUrl {
        path: String,
        #[arg(long)]
        identity: String,
        #[arg(long)]
        key_file: PathBuf,
    },
}

async fn connect(bucket_uri: &str) -> Result<Arc<dyn ObjectStore>, FsError> {
    let provider = object::parse_provider_from_uri(bucket_uri)?;
    let bucket = object::parse_bucket_from_uri(bucket_uri)?;

    match provider {
        Provider::AWS => {
            let config = aws_config::load_from_env().await;
            let client = aws_sdk_s3::Client::new(&config);
            Ok(Arc::new(S3Store::new(client, bucket)))
        }
        Provider::GCS => {
            let config = ClientConfig::default()
                .with_auth()
                .await
                .map_err(|err| FsError::Config {
                    message: format!("failed to load gcs credentials, {}", err),
                })?;
            Ok(Arc::new(GcsStore::new(Client::new(config), bucket)))
        }
    }
}

fn print_info(out: &mut impl Write, info: &FileInfo) -> io::Result<()> {
    let modified = info
        .modified_time
        .and_then(|t| t.duration_since(SystemTime::UNIX_EPOCH).ok())
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|| "-".to_string());
    let kind = if info.is_dir { "dir" } else { "file" };

    writeln!(out, "{}\t{}\t{}\t{}", kind, info.size, modified, info.name)
}

fn run(fs: &ObjectFs, command: Command) -> Result<(), FsError> {
    let stdout = io::stdout();
    let mut out = stdout.lock();

    match command {
        Command::Put { path, from } => {
            let mut file = fs.create(&path)?;
            match from {
                Some(local) => {
                    let mut input = std::fs::File::open(&local).map_err(|err| FsError::Config {
                        message: format!("failed to open: {}, {}", local.display(), err),
                    })?;
                    io::copy(&mut input, &mut file)?;
                }
                None => {
                    io::copy(&mut io::stdin().lock(), &mut file)?;
                }
            }
            file.close()
        }
        Command::Cat { path } => {
            let mut handle = fs.open(&path)?;
            io::copy(&mut handle, &mut out)?;
            handle.close()
        }
        Command::Stat { path } => {
            let info = fs.stat(&path)?;
            print_info(&mut out, &info)?;
            Ok(())
        }
        Command::Ls { path, page_size } => {
            let mut handle = fs.open(&path)?;
            if !handle.is_dir() {
                print_info(&mut out, &handle.stat())?;
                return handle.close();
            }

            loop {
                let batch = handle.readdir(page_size)?;
                if batch.is_empty() {
                    break;
                }
                for entry in &batch {
                    print_info(&mut out, entry)?;
                }
            }
            Ok(())
        }
        Command::Rm { path } => fs.remove(&path),
        Command::SignUrl {
            path,
            identity,
            key_file,
        } => {
            let key = std::fs::read(&key_file).map_err(|err| FsError::Config {
                message: format!("failed to read key file: {}, {}", key_file.display(), err),
            })?;
            let url = fs.signed_url(&path, &identity, &key)?;
            writeln!(out, "{}", url)?;
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt().json().with_writer(io::stderr).init();

    let cli = Cli::parse();
    info!(bucket = %cli.bucket, timeout_secs = ?cli.timeout_secs, "args");

    let store = match connect(&cli.bucket).await {
        Err(err) => {
            error!(error_message=%err, error_group="connect");
            eprintln!("bucketfs: {}", err);
            return ExitCode::FAILURE;
        }
        Ok(store) => store,
    };

    let span = span!(Level::INFO, "main", context = "main");
    let _e = span.enter();

    let mut fs = ObjectFs::new(store);
    if let Some(secs) = cli.timeout_secs {
        fs = fs.with_timeout(Duration::from_secs(secs));
    }

    match run(&fs, cli.command) {
        Err(err) => {
            error!(error_message=%err, error_group="command");
            eprintln!("bucketfs: {}", err);
            ExitCode::FAILURE
        }
        Ok(()) => ExitCode::SUCCESS,
    }
}
