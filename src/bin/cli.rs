//! mapkv CLI
//!
//! Command-line access to a store file, without a server.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use mapkv::{transfer, Engine, Options};
use tracing_subscriber::{fmt, EnvFilter};

/// mapkv CLI
#[derive(Parser, Debug)]
#[command(name = "mapkv-cli")]
#[command(about = "CLI for mapkv store files")]
#[command(version)]
struct Args {
    /// Data file (holds the index too unless --index is given)
    data: PathBuf,

    /// Separate index file
    #[arg(short, long, global = true)]
    index: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Set a key-value pair
    Put {
        /// The key to set
        key: String,

        /// The value to set
        value: String,
    },

    /// Get a value by key
    Get {
        /// The key to get
        key: String,
    },

    /// Delete a key
    Del {
        /// The key to delete
        key: String,
    },

    /// List live pairs in index order
    Iter {
        /// Start at the bucket of this key
        #[arg(long)]
        from: Option<String>,
    },

    /// Show index occupancy and data size
    Stat,

    /// Dump live pairs as hex lines
    Export {
        /// Output file (stdout if omitted)
        file: Option<PathBuf>,
    },

    /// Load hex line pairs
    Import {
        /// Input file (stdin if omitted)
        file: Option<PathBuf>,
    },

    /// Walk the raw data log in append order
    Scan,
}

impl Commands {
    fn writes(&self) -> bool {
        matches!(
            self,
            Commands::Put { .. } | Commands::Del { .. } | Commands::Import { .. }
        )
    }
}

fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    fmt().with_env_filter(filter).with_writer(io::stderr).init();

    let args = Args::parse();
    if let Err(e) = run(args) {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> mapkv::Result<()> {
    let options = Options::builder().read_only(!args.command.writes()).build();
    let mut engine = Engine::open(&args.data, args.index.as_deref(), &options)?;

    let stdout = io::stdout();
    let mut out = stdout.lock();

    match args.command {
        Commands::Put { key, value } => {
            engine.put(key.as_bytes(), value.as_bytes())?;
        }
        Commands::Get { key } => match engine.get(key.as_bytes())? {
            Some(value) => {
                out.write_all(&value)?;
                writeln!(out)?;
            }
            None => {
                eprintln!("(not found)");
                std::process::exit(2);
            }
        },
        Commands::Del { key } => {
            engine.del(key.as_bytes())?;
        }
        Commands::Iter { from } => {
            let entries = match from {
                Some(key) => engine.entries_from(key.as_bytes())?,
                None => engine.entries(),
            };
            for entry in entries {
                let (key, value) = entry?;
                writeln!(
                    out,
                    "{}\t{}",
                    String::from_utf8_lossy(&key),
                    String::from_utf8_lossy(&value)
                )?;
            }
        }
        Commands::Stat => {
            let stat = engine.stat()?;
            writeln!(out, "file_size:    {}", stat.file_size)?;
            writeln!(out, "table_max:    {}", stat.table_max)?;
            writeln!(out, "table_min:    {}", stat.table_min)?;
            writeln!(out, "table_total:  {}", stat.table_total)?;
            writeln!(out, "table_size:   {}", stat.table_size)?;
            writeln!(out, "bucket_total: {}", stat.bucket_total)?;
            writeln!(out, "bucket_size:  {}", stat.bucket_size)?;
            writeln!(out, "data_size:    {}", stat.data_size)?;
        }
        Commands::Export { file } => {
            let count = match file {
                Some(path) => transfer::export(&engine, BufWriter::new(File::create(path)?))?,
                None => transfer::export(&engine, &mut out)?,
            };
            eprintln!("exported {} records", count);
        }
        Commands::Import { file } => {
            let count = match file {
                Some(path) => transfer::import(&mut engine, BufReader::new(File::open(path)?))?,
                None => transfer::import(&mut engine, io::stdin().lock())?,
            };
            eprintln!("imported {} records", count);
        }
        Commands::Scan => {
            for entry in engine.scan_log()? {
                let entry = entry?;
                writeln!(
                    out,
                    "{:>10}  {}\t{}",
                    entry.offset,
                    String::from_utf8_lossy(&entry.key),
                    String::from_utf8_lossy(&entry.value)
                )?;
            }
        }
    }

    out.flush()?;
    engine.close()
}
