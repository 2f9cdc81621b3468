use clap::{Parser as ClapParser, Subcommand};
use formula_sql::CompilerOptions;
use formula_sql::cli::{self, CheckOptions, CliError, CompileOptions};
use std::io::{self, Read};
use std::path::PathBuf;

#[derive(ClapParser)]
#[command(name = "formula-sql")]
#[command(about = "Compile spreadsheet-style formulas into a single PostgreSQL query")]
#[command(version)]
struct Cli {
    /// Log compiler stages to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile named formulas into one SELECT
    Compile {
        /// Fields as name=formula
        #[arg(required = true)]
        fields: Vec<String>,

        /// Schema JSON file (reads from stdin if not provided)
        #[arg(short, long)]
        schema: Option<PathBuf>,

        /// Print query, aliases and clauses as JSON
        #[arg(long)]
        json: bool,

        /// Longest relationship path accepted by aggregates
        #[arg(long, default_value_t = formula_sql::compiler::DEFAULT_MAX_CHAIN_DEPTH)]
        max_depth: usize,
    },

    /// Type-check a single formula
    Check {
        formula: String,

        /// Schema JSON file (reads from stdin if not provided)
        #[arg(short, long)]
        schema: Option<PathBuf>,

        /// Longest relationship path accepted by aggregates
        #[arg(long, default_value_t = formula_sql::compiler::DEFAULT_MAX_CHAIN_DEPTH)]
        max_depth: usize,
    },

    /// List available functions
    Functions,

    /// Show details for one function
    Function { name: String },
}

fn main() {
    let cli = Cli::parse();

    if cli.verbose {
        let _ = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::TRACE)
            .with_writer(io::stderr)
            .try_init();
    }

    let result = match cli.command {
        Commands::Compile {
            fields,
            schema,
            json,
            max_depth,
        } => run_compile(fields, schema, json, max_depth),
        Commands::Check {
            formula,
            schema,
            max_depth,
        } => run_check(formula, schema, max_depth),
        Commands::Functions => {
            print!("{}", cli::functions_overview());
            Ok(())
        }
        Commands::Function { name } => {
            cli::function_reference(&name).map(|page| print!("{}", page))
        }
    };

    if let Err(e) = result {
        eprintln!("{}", e);
        std::process::exit(1);
    }
}

fn read_schema(path: Option<PathBuf>) -> Result<String, CliError> {
    match path {
        Some(path) => Ok(std::fs::read_to_string(path)?),
        None if !atty::is(atty::Stream::Stdin) => {
            let mut buffer = String::new();
            io::stdin().read_to_string(&mut buffer)?;
            Ok(buffer)
        }
        None => Err(CliError::NoSchema),
    }
}

fn run_compile(
    fields: Vec<String>,
    schema: Option<PathBuf>,
    json: bool,
    max_depth: usize,
) -> Result<(), CliError> {
    let options = CompileOptions {
        schema: read_schema(schema)?,
        fields: fields
            .iter()
            .map(|arg| cli::parse_field(arg))
            .collect::<Result<_, _>>()?,
        compiler: CompilerOptions {
            max_chain_depth: max_depth,
        },
    };

    let output = cli::execute_compile(&options)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&output.to_json())?);
    } else {
        println!("{}", output.assembled.query);
    }
    Ok(())
}

fn run_check(formula: String, schema: Option<PathBuf>, max_depth: usize) -> Result<(), CliError> {
    let options = CheckOptions {
        schema: read_schema(schema)?,
        formula,
        compiler: CompilerOptions {
            max_chain_depth: max_depth,
        },
    };

    let report = cli::execute_check(&options)?;
    println!("OK: {}", report.return_type);
    println!("  id: {}", report.semantic_id);
    println!("  joins: {}, aggregates: {}", report.joins, report.aggregates);
    Ok(())
}
