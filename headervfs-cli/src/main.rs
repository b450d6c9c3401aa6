//! Developer CLI for `headervfs`.
//!
//! `header` subcommands read and edit the reserved header region with plain
//! file I/O. `info` compares the physical and logical sizes of a database.
//! `exec` runs SQL through the registered `headervfs` VFS.

mod region;

use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use eyre::{Result, WrapErr};
use headervfs::{Connection, StepResult, Value, HEADER_LEN, VFS_NAME};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "headervfs", version, about = "Inspect and use headervfs databases")]
struct Cli {
    /// Database file.
    #[arg(long, global = true, env = "HEADERVFS_DB", value_name = "PATH")]
    db: Option<PathBuf>,

    /// Log at debug level (overridden by `RUST_LOG`).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Read or edit the reserved header region.
    #[command(subcommand)]
    Header(HeaderCommand),
    /// Show physical and logical sizes.
    Info,
    /// Run SQL through the headervfs VFS and print result rows.
    Exec(ExecArgs),
}

#[derive(Subcommand)]
enum HeaderCommand {
    /// Hex dump of the header region.
    Show {
        /// Print every line, including all-zero ones.
        #[arg(long)]
        all: bool,
    },
    /// Overwrite bytes inside the header region.
    Write(WriteArgs),
    /// Zero the header region.
    Clear,
}

#[derive(Args)]
struct WriteArgs {
    /// Byte offset inside the header.
    #[arg(long, default_value_t = 0)]
    offset: usize,

    /// Bytes to write, as hex.
    #[arg(long, conflicts_with = "text", required_unless_present = "text")]
    hex: Option<String>,

    /// Bytes to write, as UTF-8 text.
    #[arg(long)]
    text: Option<String>,
}

#[derive(Args)]
struct ExecArgs {
    /// A single SQL statement. Result rows are printed tab-separated.
    sql: String,

    /// Open the database read-only.
    #[arg(long)]
    read_only: bool,

    /// Print column names before the first row.
    #[arg(long)]
    headers: bool,
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .with_writer(std::io::stderr)
        .try_init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let db = cli
        .db
        .ok_or_else(|| eyre::eyre!("no database given: pass --db or set HEADERVFS_DB"))?;

    match cli.cmd {
        Command::Header(cmd) => header_cmd(&db, cmd),
        Command::Info => info_cmd(&db),
        Command::Exec(args) => exec_cmd(&db, &args),
    }
}

fn header_cmd(db: &Path, cmd: HeaderCommand) -> Result<()> {
    match cmd {
        HeaderCommand::Show { all } => {
            let header = region::read_header(db)?;
            print!("{}", region::hexdump(&header, !all));
        }
        HeaderCommand::Write(args) => {
            let bytes = match (args.hex, args.text) {
                (Some(hex), _) => hex::decode(hex.trim()).wrap_err("decoding --hex")?,
                (None, Some(text)) => text.into_bytes(),
                (None, None) => eyre::bail!("pass --hex or --text"),
            };
            region::write_header(db, args.offset, &bytes)?;
            println!("wrote {} bytes at header offset {}", bytes.len(), args.offset);
        }
        HeaderCommand::Clear => {
            region::clear_header(db)?;
            println!("cleared {HEADER_LEN} header bytes");
        }
    }
    Ok(())
}

fn info_cmd(db: &Path) -> Result<()> {
    let layout = region::inspect(db)?;
    println!("path:      {}", db.display());
    println!("header:    {HEADER_LEN} bytes");
    println!("physical:  {} bytes", layout.physical);
    println!("logical:   {} bytes", layout.logical);
    println!(
        "content:   {}",
        if layout.has_magic {
            "SQLite database"
        } else if layout.logical == 0 {
            "empty"
        } else {
            "unrecognised"
        }
    );
    Ok(())
}

fn exec_cmd(db: &Path, args: &ExecArgs) -> Result<()> {
    headervfs::register().wrap_err("registering headervfs")?;
    let conn = Connection::open_with_vfs(db, args.read_only, Some(VFS_NAME))
        .wrap_err_with(|| format!("opening {} through {VFS_NAME}", db.display()))?;

    let mut stmt = conn.prepare(&args.sql).wrap_err("preparing SQL")?;
    let mut first = true;
    while stmt.step().wrap_err("running SQL")? == StepResult::Row {
        if first && args.headers {
            let names: Vec<String> = (0..stmt.column_count()).map(|i| stmt.column_name(i)).collect();
            println!("{}", names.join("\t"));
        }
        first = false;
        let row: Vec<String> = stmt.row_values().iter().map(Value::to_string).collect();
        println!("{}", row.join("\t"));
    }
    tracing::debug!(changes = conn.changes(), "statement finished");
    Ok(())
}
