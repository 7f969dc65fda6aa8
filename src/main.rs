use anyhow::{Context, bail};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use xpjson::diagnostics::error_message;
use xpjson::serialize::dump_value_to_string;
use xpjson::walk::{MapSummary, StatsCollector, TimelineBuilder, fill_ids};
use xpjson::{
    Catalog, Document, LoadOptions, NodeKind, PlanSchema, SchemaCache, Settings, dump_document_to_path,
    load_document_path, load_schema_path,
};

pub type Result<T> = anyhow::Result<T>;

#[derive(Parser)]
#[command(name = "xpjson")]
#[command(about = "XPJSON plan, schema and library tool", long_about = None)]
struct Cli {
    /// Platform settings file (JSON).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Do not report fields unknown to the schema.
    #[arg(long, global = true)]
    no_unknown_field_warnings: bool,

    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Args)]
struct SchemaSource {
    /// PlanSchema document to validate against.
    #[arg(long, conflicts_with = "platform")]
    schema: Option<PathBuf>,

    /// Platform name from the settings file.
    #[arg(long)]
    platform: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Load and validate a document.
    Validate {
        doc: PathBuf,
        #[command(flatten)]
        source: SchemaSource,
    },
    /// Write a document with defaults filled in, in canonical form.
    Simplify {
        doc: PathBuf,
        out: PathBuf,
        #[command(flatten)]
        source: SchemaSource,
    },
    /// Fill missing plan, station, segment and command ids.
    FillIds {
        plan: PathBuf,
        out: PathBuf,
        /// Renumber ids that are already set.
        #[arg(long)]
        overwrite: bool,
        #[command(flatten)]
        source: SchemaSource,
    },
    /// Print derived data for a plan as JSON.
    Export {
        plan: PathBuf,
        #[arg(long, value_enum)]
        format: ExportFormat,
        #[arg(short = 'o', long)]
        out: Option<PathBuf>,
        #[command(flatten)]
        source: SchemaSource,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ExportFormat {
    Stats,
    Summary,
    Timeline,
}

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "xpjson=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", error_message(format!("{:#}", e)));
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let settings = match &cli.config {
        Some(path) => Some(
            Settings::from_path(path)
                .with_context(|| format!("reading settings {}", path.display()))?,
        ),
        None => None,
    };
    let mut opts = settings
        .as_ref()
        .map(Settings::load_options)
        .unwrap_or_default();
    if cli.no_unknown_field_warnings {
        opts = opts.warn_unknown_fields(false);
    }
    let ctx = RunContext { settings, opts };

    match cli.cmd {
        Commands::Validate { doc, source } => {
            let loaded = ctx.load(&doc, &source, false)?;
            println!(
                "{}: valid {} '{}' ({} warnings)",
                doc.display(),
                loaded.kind(),
                loaded.root.id().unwrap_or("-"),
                loaded.diagnostics.len()
            );
        }
        Commands::Simplify { doc, out, source } => {
            let loaded = ctx.load(&doc, &source, true)?;
            dump_document_to_path(&loaded, &out)
                .with_context(|| format!("writing {}", out.display()))?;
            println!("Wrote {}", out.display());
        }
        Commands::FillIds {
            plan,
            out,
            overwrite,
            source,
        } => {
            let loaded = ctx.load_plan(&plan, &source)?;
            let filled = fill_ids(&loaded, overwrite)
                .with_context(|| format!("filling ids in {}", plan.display()))?;
            dump_document_to_path(&filled, &out)
                .with_context(|| format!("writing {}", out.display()))?;
            println!("Wrote {}", out.display());
        }
        Commands::Export {
            plan,
            format,
            out,
            source,
        } => {
            let loaded = ctx.load_plan(&plan, &source)?;
            let schema = loaded
                .schema
                .as_deref()
                .context("plan was loaded without a schema")?;
            let value = match format {
                ExportFormat::Stats => {
                    serde_json::to_value(StatsCollector::collect(&loaded.root, schema)?)?
                }
                ExportFormat::Summary => MapSummary::collect(&loaded.root, schema)?,
                ExportFormat::Timeline => {
                    serde_json::to_value(TimelineBuilder::collect(&loaded.root, schema)?)?
                }
            };
            let text = dump_value_to_string(&value)?;
            match out {
                Some(out) => {
                    std::fs::write(&out, format!("{}\n", text))
                        .with_context(|| format!("writing {}", out.display()))?;
                    println!("Wrote {}", out.display());
                }
                None => println!("{}", text),
            }
        }
    }

    Ok(())
}

struct RunContext {
    settings: Option<Settings>,
    opts: LoadOptions,
}

impl RunContext {
    fn schema(&self, source: &SchemaSource) -> Result<Option<Arc<PlanSchema>>> {
        if let Some(path) = &source.schema {
            let schema = load_schema_path(path, &self.opts)
                .with_context(|| format!("loading schema {}", path.display()))?;
            return Ok(Some(schema));
        }
        let Some(name) = &source.platform else {
            return Ok(None);
        };
        let Some(settings) = &self.settings else {
            bail!("--platform {} needs --config", name);
        };
        let catalog = Catalog::new(settings.clone(), Arc::new(SchemaCache::new()));
        let schema = catalog
            .schema(name)
            .with_context(|| format!("loading platform {}", name))?;
        Ok(Some(schema))
    }

    fn load(&self, path: &Path, source: &SchemaSource, fill_defaults: bool) -> Result<Document> {
        let schema = self.schema(source)?;
        let opts = self.opts.fill_defaults(fill_defaults);
        load_document_path(path, schema, &opts).with_context(|| format!("loading {}", path.display()))
    }

    fn load_plan(&self, path: &Path, source: &SchemaSource) -> Result<Document> {
        let doc = self.load(path, source, false)?;
        if doc.kind() != NodeKind::Plan {
            bail!("{} is a {}, not a Plan", path.display(), doc.kind());
        }
        Ok(doc)
    }
}
