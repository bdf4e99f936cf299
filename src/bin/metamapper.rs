//! metamapper CLI - convert source documents with declarative mappings

use clap::{Parser, Subcommand};
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process;
use tracing_subscriber::EnvFilter;

use metamapper::runtime::ConversionStats;
use metamapper::{
    write_fields, Engine, EngineConfig, MappingDefinition, OutputFormat, SourceFormat,
    SurfaceSyntax, Variables,
};

const DEFAULT_CONFIG: &str = "metamapper.yaml";

#[derive(Parser)]
#[command(name = "metamapper")]
#[command(version, about = "Declarative mapping engine for JSON, YAML and XML sources", long_about = None)]
struct Cli {
    /// Engine configuration file (default: ./metamapper.yaml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert a source document into field assignments
    Convert {
        /// Mapping file, or a reference such as `mapping:3` or `module:xml/ead.xml`
        #[arg(short, long)]
        mapping: String,

        /// Source document; `-` reads stdin
        #[arg(short, long)]
        source: PathBuf,

        /// Source format (json, yaml, xml); detected when omitted
        #[arg(short, long)]
        format: Option<SourceFormat>,

        /// Pipeline variable, repeatable
        #[arg(long = "var", value_name = "NAME=VALUE", value_parser = parse_var)]
        vars: Vec<(String, String)>,

        /// Output layout (ndjson, json)
        #[arg(short, long, default_value = "ndjson")]
        output: OutputFormat,

        /// Print conversion statistics to stderr
        #[arg(long)]
        stats: bool,
    },

    /// Parse and validate a mapping without converting anything
    Validate {
        /// Mapping file, or a mapping reference
        #[arg(short, long)]
        mapping: String,

        /// Print the normalized mapping as JSON
        #[arg(long)]
        print: bool,
    },

    /// Print the mapping vocabulary as JSON, for editors
    Schema,
}

fn parse_var(s: &str) -> Result<(String, String), String> {
    let (name, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=VALUE, got '{}'", s))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("variable name missing in '{}'", s));
    }
    Ok((name.to_string(), value.to_string()))
}

fn main() {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Convert {
            mapping,
            source,
            format,
            vars,
            output,
            stats,
        } => load_engine(cli.config.as_deref()).and_then(|engine| {
            convert(&engine, &mapping, &source, format, vars, output, stats)
        }),
        Commands::Validate { mapping, print } => {
            load_engine(cli.config.as_deref()).and_then(|engine| validate(&engine, &mapping, print))
        }
        Commands::Schema => print_schema(),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn load_engine(config: Option<&Path>) -> Result<Engine, String> {
    let default = Path::new(DEFAULT_CONFIG);
    let path = config.or_else(|| default.exists().then_some(default));
    let config = EngineConfig::load(path).map_err(|e| e.to_string())?;
    if let Some(path) = path {
        tracing::debug!("Using configuration from {}", path.display());
    }
    Ok(Engine::new(config))
}

/// A mapping argument is a file when one exists at that path, a reference otherwise.
fn load_mapping(engine: &Engine, mapping: &str) -> Result<MappingDefinition, String> {
    let path = Path::new(mapping);
    if path.is_file() {
        let text = fs::read_to_string(path)
            .map_err(|e| format!("Failed to read mapping {}: {}", path.display(), e))?;
        let hint = path
            .extension()
            .and_then(|e| e.to_str())
            .and_then(SurfaceSyntax::from_extension);
        engine
            .parse_mapping(&text, hint)
            .map_err(|e| format!("{}: {}", path.display(), e))
    } else {
        engine.load_mapping(mapping).map_err(|e| e.to_string())
    }
}

fn read_source(source: &Path) -> Result<Vec<u8>, String> {
    if source == Path::new("-") {
        let mut bytes = Vec::new();
        io::stdin()
            .read_to_end(&mut bytes)
            .map_err(|e| format!("Failed to read stdin: {}", e))?;
        Ok(bytes)
    } else {
        fs::read(source).map_err(|e| format!("Failed to read source {}: {}", source.display(), e))
    }
}

fn convert(
    engine: &Engine,
    mapping: &str,
    source: &Path,
    format: Option<SourceFormat>,
    vars: Vec<(String, String)>,
    output: OutputFormat,
    stats: bool,
) -> Result<(), String> {
    let mapping = load_mapping(engine, mapping)?;
    let bytes = read_source(source)?;
    let variables: Variables = vars.into_iter().collect();

    let conversion = engine
        .convert_bytes(&bytes, format, &mapping, &variables)
        .map_err(|e| e.to_string())?;

    for skipped in &conversion.skipped {
        tracing::warn!("{}", skipped);
    }
    if stats {
        let stats = ConversionStats::from(&conversion);
        let json = serde_json::to_string(&stats).map_err(|e| e.to_string())?;
        eprintln!("{}", json);
    }

    let stdout = io::stdout();
    write_fields(stdout.lock(), &conversion.fields, output).map_err(|e| e.to_string())?;
    if output == OutputFormat::Json {
        println!();
    }
    Ok(())
}

fn validate(engine: &Engine, mapping: &str, print: bool) -> Result<(), String> {
    let definition = load_mapping(engine, mapping)?;

    if print {
        let json = serde_json::to_string_pretty(&definition).map_err(|e| e.to_string())?;
        println!("{}", json);
        return Ok(());
    }

    println!("✓ {} is valid", mapping);
    if let Some(label) = definition.label() {
        println!("  label:  {}", label);
    }
    println!("  maps:   {}", definition.maps.len());
    println!("  tables: {}", definition.tables.len());
    if definition.is_empty() {
        println!("  (no map entries, conversions will produce no fields)");
    }
    Ok(())
}

fn print_schema() -> Result<(), String> {
    let json = serde_json::to_string_pretty(&metamapper::schema::hints()).map_err(|e| e.to_string())?;
    println!("{}", json);
    Ok(())
}
