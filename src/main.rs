use clap::Parser;
use std::fs::OpenOptions;
use std::path::PathBuf;
use tinydb::query::statement::SelectStatement;
use tinydb::storage::node;
use tinydb::{executor, Table};
use tracing_subscriber::EnvFilter;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(
    name = "tinydb",
    version = VERSION,
    about = "Tiny single-table database engine."
)]
struct Cli {
    /// Path to the database file. Created when it does not exist.
    #[arg(env = "TINYDB_FILE")]
    file: PathBuf,
    /// Print the B-tree structure.
    #[arg(long)]
    tree: bool,
    /// Print the storage layout constants.
    #[arg(long)]
    constants: bool,
    /// Recompute and print the table statistics.
    #[arg(long)]
    stats: bool,
}

fn main() {
    let file = OpenOptions::new()
        .append(true)
        .create(true)
        .open("tinydb.log")
        .expect("Failed to open log file");

    tracing_subscriber::fmt()
        .with_writer(file)
        .with_ansi(false)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")),
        )
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(&cli) {
        println!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<(), tinydb::Error> {
    let mut table = Table::open(&cli.file)?;

    if cli.constants {
        print!("{}", node::constants_summary());
    }
    if cli.stats {
        table.analyze()?;
        print!("{}", table.statistics());
    }
    if cli.tree {
        print!("{}", table.render_tree()?);
    }
    if !cli.constants && !cli.stats && !cli.tree {
        let rows = executor::execute_select(&mut table, SelectStatement { where_clause: None })?;
        let mut count = 0usize;
        for row in rows {
            let row = row?;
            println!("({}, {}, {})", row.id, row.username, row.email);
            count += 1;
        }
        println!("({} rows)", count);
    }

    table.close()
}
