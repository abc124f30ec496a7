//! blockflow CLI: run, validate, and explain YAML plans.

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use blockflow_core::config::EngineConfig;
use blockflow_core::dag::PNode;
use blockflow_core::schema::format_types;
use blockflow_exec::Engine;
use blockflow_io::{read_csv_table, CsvReadOptions, CsvWriter, CsvWriterOptions, JsonlWriter, QuoteLevel};
use blockflow_lambda::{LambdaClient, LambdaConfig, StreamTransport, Transport};
use blockflow_planner::{explain, optimize, parse_yaml_plan, PlanDocument, PlanEnv};

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

#[derive(Parser)]
#[command(name = "blockflow")]
#[command(about = "blockflow: lazily evaluated, block-streaming plan execution", long_about = None)]
struct Cli {
    /// Verbose logging (RUST_LOG still wins when set)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a plan and write its output
    Run {
        #[command(flatten)]
        plan: PlanArgs,

        /// Output file (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[arg(long, value_enum, default_value_t = Format::Csv)]
        format: Format,

        /// CSV quote level: minimal, all, nonnumeric, none
        #[arg(long, default_value = "nonnumeric")]
        quote_level: String,

        /// String written for undefined values
        #[arg(long, default_value = "")]
        na_value: String,

        #[arg(long, default_value = ",")]
        delimiter: String,

        /// Omit the CSV header line
        #[arg(long)]
        no_header: bool,

        /// Rows per block (overrides plan and environment)
        #[arg(long)]
        block_size: Option<usize>,

        /// Lambda request timeout in milliseconds
        #[arg(long)]
        lambda_timeout_ms: Option<u64>,
    },

    /// Check that a plan builds and passes type and length inference
    Validate {
        #[command(flatten)]
        plan: PlanArgs,
    },

    /// Print the plan with node tags, types, and lengths
    Explain {
        #[command(flatten)]
        plan: PlanArgs,
    },
}

#[derive(clap::Args)]
struct PlanArgs {
    /// Path to the plan YAML file
    #[arg(short, long)]
    plan: PathBuf,

    /// Skip the rewrite rules
    #[arg(long)]
    no_optimize: bool,

    /// Unix socket of a running lambda evaluator
    #[arg(long)]
    lambda_socket: Option<PathBuf>,

    /// TCP address of a running lambda evaluator
    #[arg(long, conflicts_with = "lambda_socket")]
    lambda_tcp: Option<String>,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Csv,
    Jsonl,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let outcome: CliResult<()> = match cli.command {
        Commands::Run {
            plan,
            output,
            format,
            quote_level,
            na_value,
            delimiter,
            no_header,
            block_size,
            lambda_timeout_ms,
        } => match QuoteLevel::parse(&quote_level) {
            None => Err(format!("unknown quote level '{}'", quote_level).into()),
            Some(quote_level) => {
                let csv = CsvWriterOptions {
                    delimiter,
                    quote_level,
                    na_value,
                    header: !no_header,
                    ..Default::default()
                };
                let overrides = CliOverrides {
                    block_size,
                    lambda_timeout_ms,
                };
                run_plan(&plan, &overrides, output.as_deref(), format, &csv)
            }
        },
        Commands::Validate { plan } => validate_plan(&plan),
        Commands::Explain { plan } => explain_plan(&plan),
    };

    if let Err(e) = outcome {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn init_logging(verbose: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("blockflow=debug,blockflow_exec=debug,blockflow_lambda=debug")
        } else {
            EnvFilter::new("warn")
        }
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[derive(Debug, Default)]
struct CliOverrides {
    block_size: Option<usize>,
    lambda_timeout_ms: Option<u64>,
}

/// Environment, then the plan's `config:` section, then flags.
fn resolve_config(doc: &PlanDocument, cli: &CliOverrides) -> CliResult<EngineConfig> {
    let mut cfg = doc.config.apply(EngineConfig::from_env());
    if let Some(b) = cli.block_size {
        cfg.block_size = b;
    }
    if let Some(t) = cli.lambda_timeout_ms {
        cfg.lambda_request_timeout_ms = t;
    }
    cfg.validate()?;
    Ok(cfg)
}

struct Loaded {
    doc: PlanDocument,
    cfg: EngineConfig,
    root: PNode,
}

fn load(args: &PlanArgs, cli: &CliOverrides) -> CliResult<Loaded> {
    let text = fs::read_to_string(&args.plan)?;
    let doc = parse_yaml_plan(&text)?;
    let cfg = resolve_config(&doc, cli)?;

    let base = args.plan.parent().unwrap_or_else(|| Path::new("."));
    let mut env = PlanEnv {
        tables: load_tables(&doc, base)?,
        evaluator: None,
    };
    if let Some(transport) = connect_evaluator(args)? {
        env.evaluator = Some(Arc::new(LambdaClient::negotiate(
            None,
            transport,
            &LambdaConfig::from_engine(&cfg),
        )?));
    }

    let built = doc.build(&env)?;
    let root = if args.no_optimize {
        built
    } else {
        optimize(&built)?
    };
    Ok(Loaded { doc, cfg, root })
}

fn load_tables(
    doc: &PlanDocument,
    base: &Path,
) -> CliResult<HashMap<String, Arc<blockflow_core::table::MemoryTable>>> {
    let mut tables = HashMap::new();
    for (name, decl) in doc.file_tables() {
        let Some(rel) = &decl.path else { continue };
        let path = if rel.is_absolute() {
            rel.clone()
        } else {
            base.join(rel)
        };
        let delimiter = match decl.delimiter {
            None => b',',
            Some(c) => u8::try_from(c)
                .map_err(|_| format!("table '{}': delimiter must be one byte", name))?,
        };
        let opts = CsvReadOptions {
            delimiter,
            header: decl.header,
            types: decl.type_tags(name)?,
            ..Default::default()
        };
        let loaded = read_csv_table(&path, &opts)?;
        debug!(table = name, path = %path.display(), rows = loaded.table.num_rows(), "table loaded");
        tables.insert(name.to_string(), Arc::new(loaded.table));
    }
    Ok(tables)
}

fn connect_evaluator(args: &PlanArgs) -> CliResult<Option<Arc<dyn Transport>>> {
    if let Some(sock) = &args.lambda_socket {
        return Ok(Some(connect_unix(sock)?));
    }
    if let Some(addr) = &args.lambda_tcp {
        return Ok(Some(Arc::new(StreamTransport::connect_tcp(addr.as_str())?)));
    }
    Ok(None)
}

#[cfg(unix)]
fn connect_unix(path: &Path) -> CliResult<Arc<dyn Transport>> {
    Ok(Arc::new(StreamTransport::connect_unix(path)?))
}

#[cfg(not(unix))]
fn connect_unix(_path: &Path) -> CliResult<Arc<dyn Transport>> {
    Err("unix sockets are not supported on this platform".into())
}

enum Sink {
    Csv(CsvWriter<Box<dyn Write>>),
    Jsonl(JsonlWriter<Box<dyn Write>>),
}

impl Sink {
    fn open(output: Option<&Path>, format: Format, csv: &CsvWriterOptions) -> CliResult<Self> {
        let out: Box<dyn Write> = match output {
            Some(p) => Box::new(fs::File::create(p)?),
            None => Box::new(std::io::stdout().lock()),
        };
        Ok(match format {
            Format::Csv => Sink::Csv(CsvWriter::to_writer(out, csv)?),
            Format::Jsonl => Sink::Jsonl(JsonlWriter::to_writer(out, None)),
        })
    }

    fn write(&mut self, block: &blockflow_core::block::RowBlock) -> CliResult<()> {
        match self {
            Sink::Csv(w) => w.write_block(block)?,
            Sink::Jsonl(w) => w.write_block(block)?,
        }
        Ok(())
    }

    fn finish(self) -> CliResult<()> {
        let mut out = match self {
            Sink::Csv(w) => w.finish()?,
            Sink::Jsonl(w) => w.into_inner()?,
        };
        out.flush()?;
        Ok(())
    }
}

fn run_plan(
    args: &PlanArgs,
    cli: &CliOverrides,
    output: Option<&Path>,
    format: Format,
    csv: &CsvWriterOptions,
) -> CliResult<()> {
    let Loaded { cfg, root, .. } = load(args, cli)?;
    let engine = Engine::new(cfg)?;
    let prepared = engine.prepare(&root)?;

    let mut sink = Sink::open(output, format, csv)?;
    let mut stream = engine.stream(&prepared)?;
    let mut rows = 0usize;
    while let Some(block) = stream.next_block()? {
        rows += block.num_rows();
        sink.write(&block)?;
    }
    sink.finish()?;

    let stats = stream.finish();
    info!(
        rows,
        stages = stats.stages.len(),
        elapsed_ms = stats.elapsed.as_millis() as u64,
        "plan executed"
    );
    eprintln!("✓ Plan executed: {} rows in {}ms", rows, stats.elapsed.as_millis());
    Ok(())
}

fn validate_plan(args: &PlanArgs) -> CliResult<()> {
    let Loaded { cfg, root, .. } = load(args, &CliOverrides::default())?;
    let engine = Engine::new(cfg)?;
    let prepared = engine.prepare(&root)?;
    let rows = match prepared.length() {
        Some(n) => n.to_string(),
        None => "unknown".into(),
    };
    println!(
        "✓ Plan is valid: {} nodes, types {}, rows {}",
        prepared.distinct_nodes(),
        format_types(prepared.types()),
        rows
    );
    Ok(())
}

fn explain_plan(args: &PlanArgs) -> CliResult<()> {
    let Loaded { doc, cfg, root } = load(args, &CliOverrides::default())?;
    println!("Plan: {}", args.plan.display());
    println!("Block size: {} rows", cfg.block_size);
    println!("Declared nodes: {}", doc.nodes.len());
    println!();
    print!("{}", explain(&root)?);
    Ok(())
}
