//! CLI tool for wmi-perf (wmiperf)

#[cfg(feature = "cli")]
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

#[cfg(feature = "cli")]
use wmilib::{
    check::CheckSpec,
    config::WmiConfig,
    discovery::{discover_wmi_table_instances, discover_wmi_table_total},
    levels::{get_levels_quadruple, render},
    parser::{parse_wmi_table, WmiSection},
    section::{parse_agent_output, split_line},
    table::RowRef,
    value_store::{FileValueStore, GetRateError, MemoryValueStore, ValueStore},
    WmiError,
};

#[cfg(feature = "cli")]
#[derive(Parser)]
#[command(name = "wmiperf")]
#[command(about = "Inspect WMI performance-counter sections of Windows agent output", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Agent section to read (default: the first one)
    #[arg(short, long, global = true)]
    section: Option<String>,

    /// Read the file as one raw section split on this separator
    #[arg(long, global = true)]
    separator: Option<char>,

    /// Output format (json or text)
    #[arg(short, long, default_value = "text", global = true)]
    format: String,

    /// More log output (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

/// Row selection shared by the value commands
#[cfg(feature = "cli")]
#[derive(clap::Args)]
struct Cell {
    /// Agent output or raw section file
    file: PathBuf,
    /// Sub-table name (empty for single-table sections)
    #[arg(long, default_value = "")]
    table: String,
    /// Row key
    #[arg(long, conflicts_with = "total")]
    row: Option<String>,
    /// Use the aggregate (_Total) row
    #[arg(long)]
    total: bool,
    /// Column name
    #[arg(long)]
    column: String,
}

#[cfg(feature = "cli")]
#[derive(Subcommand)]
enum Commands {
    /// List the tables of a section
    Tables {
        /// Agent output or raw section file
        file: PathBuf,
    },
    /// Print one cell
    Get {
        #[command(flatten)]
        cell: Cell,
    },
    /// Discover per-instance or total services
    Discover {
        /// Agent output or raw section file
        file: PathBuf,
        /// Tables every item must appear in (default: all)
        #[arg(long = "require")]
        require: Vec<String>,
        /// Discover the total service instead of instances
        #[arg(long)]
        total: bool,
    },
    /// Compute the raw average of a counter and its _Base column
    Average {
        #[command(flatten)]
        cell: Cell,
        /// Multiply the ratio (100 for percentages)
        #[arg(long, default_value = "1.0")]
        factor: f64,
    },
    /// Compute the per-second rate of a counter against the stored sample
    Persec {
        #[command(flatten)]
        cell: Cell,
        /// Counter state file (overrides the configuration)
        #[arg(long)]
        store: Option<PathBuf>,
    },
    /// Print a sample configuration
    Config,
}

#[cfg(feature = "cli")]
fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => WmiConfig::from_toml_file(&path.to_string_lossy())?,
        None => WmiConfig::default(),
    };

    let level = match cli.verbose {
        0 => config.log_level.to_filter(),
        1 => log::LevelFilter::Info,
        _ => log::LevelFilter::Debug,
    };
    env_logger::Builder::new().filter_level(level).init();
    log::debug!("wmiperf {}", wmilib::VERSION);

    match &cli.command {
        Commands::Tables { file } => {
            let section = load_section(&cli, &config, file)?;
            handle_tables(&section, &cli.format)?;
        }
        Commands::Get { cell } => {
            let section = load_section(&cli, &config, &cell.file)?;
            let table = lookup_table(&section, &cell.table)?;
            let value = table.get(cell.row_ref()?, cell.column.as_str(), false)?;
            println!("{}", value.unwrap_or(""));
        }
        Commands::Discover {
            file,
            require,
            total,
        } => {
            let section = load_section(&cli, &config, file)?;
            let required: Vec<&str> = require.iter().map(String::as_str).collect();
            let required = if required.is_empty() {
                None
            } else {
                Some(required.as_slice())
            };
            let services = if *total {
                discover_wmi_table_total(&section, required, None)
            } else {
                discover_wmi_table_instances(&section, required, None)
            };
            if cli.format == "json" {
                println!("{}", serde_json::to_string_pretty(&services)?);
            } else {
                for service in &services {
                    println!("{}", service.item.as_deref().unwrap_or("<total>"));
                }
            }
        }
        Commands::Average { cell, factor } => {
            let section = load_section(&cli, &config, &cell.file)?;
            let table = lookup_table(&section, &cell.table)?;
            let average = wmilib::wmi_calculate_raw_average(
                table,
                cell.row_ref()?,
                &cell.column,
                *factor,
            )?;
            println!("{}", average);
        }
        Commands::Persec { cell, store } => {
            let section = load_section(&cli, &config, &cell.file)?;
            handle_persec(&cli, &config, &section, cell, store.as_deref())?;
        }
        Commands::Config => {
            print!("{}", WmiConfig::sample_toml());
        }
    }

    Ok(())
}

#[cfg(feature = "cli")]
impl Cell {
    fn row_ref(&self) -> Result<RowRef<'_>, Box<dyn std::error::Error>> {
        match (&self.row, self.total) {
            (_, true) => Ok(RowRef::TOTAL),
            (Some(row), false) => Ok(RowRef::from(row)),
            (None, false) => Err("either --row or --total is required".into()),
        }
    }
}

/// Read `file` and parse the selected section into tables
///
/// Files with `<<<name>>>` headers are agent output; anything else is one raw
/// section split on `--separator` (or the configured separator).
#[cfg(feature = "cli")]
fn load_section(
    cli: &Cli,
    config: &WmiConfig,
    file: &Path,
) -> Result<WmiSection, Box<dyn std::error::Error>> {
    let text = std::fs::read_to_string(file)
        .map_err(|e| format!("Cannot read {}: {}", file.display(), e))?;
    let key = config.key_field.as_deref();

    if text.lines().any(|line| line.starts_with("<<<")) {
        let sections = parse_agent_output(&text);
        let raw = match &cli.section {
            Some(name) => sections
                .iter()
                .find(|s| &s.name == name)
                .ok_or_else(|| format!("Section {} not found in {}", name, file.display()))?,
            None => sections
                .first()
                .ok_or_else(|| format!("No sections in {}", file.display()))?,
        };
        log::info!("Reading section {} ({} lines)", raw.name, raw.lines.len());
        return Ok(raw.to_wmi_section(key));
    }

    let separator = cli.separator.or(config.separator);
    let lines: Vec<Vec<String>> = text
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| split_line(line.trim_end_matches('\r'), separator))
        .collect();
    Ok(parse_wmi_table(&lines, key))
}

#[cfg(feature = "cli")]
fn lookup_table<'s>(
    section: &'s WmiSection,
    name: &str,
) -> Result<&'s wmilib::WmiTable, Box<dyn std::error::Error>> {
    section.get(name).ok_or_else(|| {
        let known: Vec<&str> = section.keys().map(String::as_str).collect();
        format!("Table {:?} not found, known tables: {}", name, known.join(", ")).into()
    })
}

#[cfg(feature = "cli")]
fn handle_tables(section: &WmiSection, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    if format == "json" {
        let summary: Vec<serde_json::Value> = section
            .values()
            .map(|table| {
                serde_json::json!({
                    "name": table.name(),
                    "rows": table.row_count(),
                    "timed_out": table.timed_out(),
                    "timestamp": table.timestamp(),
                    "frequency": table.frequency(),
                    "columns": table.headers(),
                    "instances": table.row_labels(),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    for table in section.values() {
        let name = if table.name().is_empty() {
            "<default>"
        } else {
            table.name()
        };
        println!(
            "[{}] {} rows{}",
            name,
            table.row_count(),
            if table.timed_out() { " (timed out)" } else { "" }
        );
        println!("    columns: {}", table.headers().join(", "));
    }
    Ok(())
}

#[cfg(feature = "cli")]
fn handle_persec(
    cli: &Cli,
    config: &WmiConfig,
    section: &WmiSection,
    cell: &Cell,
    store_path: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let table = lookup_table(section, &cell.table)?;
    let spec = CheckSpec::new(&cell.column)
        .with_render(render::per_second)
        .with_levels(get_levels_quadruple(config.levels_for(&cell.column)));

    let mut file_store = match store_path.or(config.value_store.as_deref()) {
        Some(path) => Some(FileValueStore::open(path)?),
        None => None,
    };
    let mut memory_store = MemoryValueStore::new();
    let store: &mut dyn ValueStore = match file_store.as_mut() {
        Some(store) => store,
        None => {
            log::warn!("No value store configured, rates cannot span runs");
            &mut memory_store
        }
    };

    let result =
        wmilib::check_wmi_raw_persec(store, Some(table), cell.row_ref()?, &cell.column, &spec);
    if let Some(store) = &file_store {
        store.save()?;
    }

    match result {
        Ok(Some(result)) => {
            if cli.format == "json" {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("{} - {}{}", result.state, result.summary, result.state.marker());
            }
        }
        Ok(None) => println!("No data for this item"),
        Err(WmiError::Rate(GetRateError::Initialized { .. })) => {
            println!("Counter initialized, run again for a rate")
        }
        Err(e) => return Err(e.into()),
    }
    Ok(())
}

#[cfg(not(feature = "cli"))]
fn main() {
    eprintln!("CLI features not enabled. Please compile with --features cli");
    std::process::exit(1);
}
