//! replistore CLI Client
//!
//! Command-line interface for interacting with a replistore cluster.

use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use replistore::{Client, Result};
use tracing_subscriber::{fmt, EnvFilter};

/// replistore CLI
#[derive(Parser, Debug)]
#[command(name = "replistore-cli")]
#[command(about = "CLI for a replistore cluster")]
struct Args {
    /// Controller address
    #[arg(short, long, default_value = "127.0.0.1:3000")]
    controller: String,

    /// Read timeout in milliseconds (should exceed the controller's)
    #[arg(short, long, default_value = "5000")]
    timeout_ms: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Store a local file
    Store {
        /// Local file to upload
        path: PathBuf,

        /// Name to store it under (defaults to the file name)
        #[arg(short, long)]
        name: Option<String>,
    },

    /// Load a file and write it to stdout
    Load {
        /// The file to load
        name: String,

        /// Write to this local file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Remove a file
    Remove {
        /// The file to remove
        name: String,
    },

    /// List stored files
    List,
}

fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

    let args = Args::parse();

    if let Err(e) = run(args) {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<()> {
    let mut client = Client::connect(
        args.controller.as_str(),
        Duration::from_millis(args.timeout_ms),
    )?;

    match args.command {
        Commands::Store { path, name } => {
            let name = match name {
                Some(n) => n,
                None => path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default(),
            };
            let data = std::fs::read(&path)?;
            client.store(&name, &data)?;
            println!("stored {} ({} bytes)", name, data.len());
        }
        Commands::Load { name, output: Some(path) } => {
            let mut file = std::fs::File::create(&path)?;
            match client.load_to(&name, &mut file) {
                Ok(size) => println!("loaded {} ({} bytes) to {}", name, size, path.display()),
                Err(e) => {
                    drop(file);
                    let _ = std::fs::remove_file(&path);
                    return Err(e);
                }
            }
        }
        Commands::Load { name, output: None } => {
            let data = client.load(&name)?;
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(&data)?;
            stdout.flush()?;
        }
        Commands::Remove { name } => {
            client.remove(&name)?;
            println!("removed {}", name);
        }
        Commands::List => {
            for name in client.list()? {
                println!("{}", name);
            }
        }
    }

    Ok(())
}
