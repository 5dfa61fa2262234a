mod display;
mod manifest;
mod pipeline;

use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use arrow::ipc::writer::FileWriter;
use arrow::record_batch::RecordBatch;
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand, ValueEnum};
use provisio_consolidate::{AmendmentSource, BaseDocument, Consolidation, consolidate, publish};
use provisio_core::schema::{directives_to_batch, nodes_to_batch, provenance_to_batch};
use provisio_core::{ComputationStatus, ContentClass, PipelineConfig};
use provisio_parse::ParseOutput;
use provisio_store::{DuckStore, ParseRecord, Recorded, VersionStore};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use pipeline::{Source, load_amendments};

#[derive(Parser, Debug)]
#[command(name = "provisio")]
#[command(version, about = "Parse legal documents and consolidate their amendments", long_about = None)]
struct Cli {
    /// Pipeline configuration (TOML).
    #[arg(long, global = true, env = "PROVISIO_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Parse documents into provision trees
    Parse {
        #[arg(required = true)]
        files: Vec<PathBuf>,
        #[arg(long, value_enum)]
        class: Option<ClassArg>,
        /// Record the results in a DuckDB file
        #[arg(long)]
        db: Option<PathBuf>,
        #[arg(long)]
        json: bool,
    },
    /// Extract amendment directives from an amending document
    Extract {
        file: PathBuf,
        #[arg(long)]
        doc_id: Option<String>,
        #[arg(long, value_enum)]
        class: Option<ClassArg>,
        #[arg(long)]
        json: bool,
    },
    /// Consolidate a base document with its amendments
    Consolidate {
        #[command(flatten)]
        input: ConsolidateInput,
        /// Publish the snapshot into a DuckDB file
        #[arg(long)]
        db: Option<PathBuf>,
        #[arg(long)]
        json: bool,
        /// Print the consolidated text after the card
        #[arg(long)]
        show_text: bool,
    },
    /// List the current snapshots of a document
    History {
        #[arg(long)]
        db: PathBuf,
        #[arg(long)]
        doc_id: String,
        #[arg(long)]
        json: bool,
    },
    /// Write nodes, directives and provenance as Arrow IPC files
    Export {
        #[command(flatten)]
        input: ConsolidateInput,
        #[arg(long)]
        out: PathBuf,
    },
}

#[derive(Args, Debug)]
struct ConsolidateInput {
    /// Base document
    #[arg(long)]
    base: PathBuf,
    /// Document id of the base; defaults to the file stem
    #[arg(long)]
    doc_id: Option<String>,
    #[arg(long, value_enum)]
    class: Option<ClassArg>,
    /// TOML list of amending documents
    #[arg(long)]
    manifest: Option<PathBuf>,
    /// Leave out amendments effective after this date
    #[arg(long)]
    as_of: Option<NaiveDate>,
    /// Fail the run on the first directive that cannot be applied
    #[arg(long)]
    strict: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ClassArg {
    Html,
    Text,
}

impl From<ClassArg> for ContentClass {
    fn from(arg: ClassArg) -> Self {
        match arg {
            ClassArg::Html => ContentClass::Html,
            ClassArg::Text => ContentClass::Text,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Command::Parse {
            files,
            class,
            db,
            json,
        } => cmd_parse(&config, files, class.map(Into::into), db.as_deref(), json).await,
        Command::Extract {
            file,
            doc_id,
            class,
            json,
        } => cmd_extract(&config, &file, doc_id.as_deref(), class.map(Into::into), json),
        Command::Consolidate {
            input,
            db,
            json,
            show_text,
        } => cmd_consolidate(&config, &input, db.as_deref(), json, show_text),
        Command::History { db, doc_id, json } => cmd_history(&db, &doc_id, json),
        Command::Export { input, out } => cmd_export(&config, &input, &out),
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<PipelineConfig> {
    let Some(path) = path else {
        return Ok(PipelineConfig::default());
    };
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    let config = PipelineConfig::from_toml_str(&raw)
        .with_context(|| format!("parsing config {}", path.display()))?;
    info!(path = %path.display(), "config loaded");
    Ok(config)
}

fn open_store(path: &Path) -> anyhow::Result<DuckStore> {
    DuckStore::open_persistent(path).with_context(|| format!("opening store {}", path.display()))
}

// ── parse ──

async fn cmd_parse(
    config: &PipelineConfig,
    files: Vec<PathBuf>,
    class: Option<ContentClass>,
    db: Option<&Path>,
    json: bool,
) -> anyhow::Result<()> {
    let mut handles = Vec::with_capacity(files.len());
    for path in &files {
        let source = Source::from_path(path, None, class)?;
        let parser = config.parser.clone();
        handles.push(tokio::task::spawn_blocking(move || source.parse(&parser)));
    }
    let mut outputs: Vec<ParseOutput> = Vec::with_capacity(handles.len());
    for handle in handles {
        outputs.push(handle.await.context("parse task panicked")??);
    }

    if let Some(db) = db {
        let store = open_store(db)?;
        for out in &outputs {
            let outcome = store.record_parse(ParseRecord {
                result: out.result.clone(),
                nodes: out.nodes.clone(),
            })?;
            match outcome {
                Recorded::Inserted => info!(document_id = %out.result.document_id, "parse stored"),
                Recorded::Unchanged => info!(document_id = %out.result.document_id, "parse unchanged"),
                Recorded::Superseded { previous } => {
                    info!(document_id = %out.result.document_id, %previous, "parse superseded")
                }
            }
        }
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&outputs)?);
    } else {
        for out in &outputs {
            display::print_parse_card(out);
        }
    }
    Ok(())
}

// ── extract ──

fn cmd_extract(
    config: &PipelineConfig,
    file: &Path,
    doc_id: Option<&str>,
    class: Option<ContentClass>,
    json: bool,
) -> anyhow::Result<()> {
    let source = Source::from_path(file, doc_id, class)?;
    let (_, extraction) = source.extract(&config.parser.normalizer, &config.extractor)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&extraction)?);
    } else {
        display::print_extraction(&source.document_id, &extraction);
    }
    Ok(())
}

// ── consolidate ──

struct Run {
    base: ParseOutput,
    amendments: Vec<AmendmentSource>,
    consolidation: Option<Consolidation>,
}

/// Parse the base, load the manifest and replay it. Without a manifest
/// only the base is parsed unless `always` asks for a snapshot anyway.
fn run_pipeline(
    config: &PipelineConfig,
    input: &ConsolidateInput,
    always: bool,
) -> anyhow::Result<Run> {
    let source = Source::from_path(&input.base, input.doc_id.as_deref(), input.class.map(Into::into))?;
    let base = source.parse(&config.parser)?;
    if !base.result.is_usable() {
        bail!(
            "base document {} did not parse ({} warnings)",
            source.document_id,
            base.result.warnings.len()
        );
    }
    let amendments = match &input.manifest {
        Some(manifest) => {
            load_amendments(manifest, &config.parser.normalizer, &config.extractor)?
        }
        None => Vec::new(),
    };
    if !always && input.manifest.is_none() {
        return Ok(Run {
            base,
            amendments,
            consolidation: None,
        });
    }

    let mut settings = config.consolidation.clone();
    settings.strict |= input.strict;
    if input.as_of.is_some() {
        settings.as_of = input.as_of;
    }
    let document = BaseDocument::from(base.clone());
    let consolidation = consolidate(&source.document_id, &document, &amendments, &settings)
        .with_context(|| format!("consolidating {}", source.document_id))?;
    Ok(Run {
        base,
        amendments,
        consolidation: Some(consolidation),
    })
}

fn cmd_consolidate(
    config: &PipelineConfig,
    input: &ConsolidateInput,
    db: Option<&Path>,
    json: bool,
    show_text: bool,
) -> anyhow::Result<()> {
    let Run {
        base,
        consolidation,
        ..
    } = run_pipeline(config, input, true)?;
    let run = consolidation.context("consolidation produced no snapshot")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&run)?);
    } else {
        display::print_consolidation_card(&run, show_text);
    }

    if run.snapshot.status == ComputationStatus::Failed {
        bail!(
            "snapshot {} failed with {} directive failures",
            run.snapshot.id,
            run.failures.len()
        );
    }
    if let Some(db) = db {
        let store = open_store(db)?;
        store.record_parse(ParseRecord {
            result: base.result,
            nodes: base.nodes,
        })?;
        let plan = publish(&store, &run.snapshot)?;
        if !json {
            println!(
                "published {} ({} windows closed, {} superseded)",
                run.snapshot.id,
                plan.truncate.len(),
                plan.supersede.len()
            );
        }
    }
    Ok(())
}

// ── history ──

fn cmd_history(db: &Path, doc_id: &str, json: bool) -> anyhow::Result<()> {
    let store = open_store(db)?;
    if json {
        let snapshots = store.snapshots(doc_id)?;
        println!("{}", serde_json::to_string_pretty(&snapshots)?);
        return Ok(());
    }
    let sql = format!(
        "SELECT id, effective_date, coalesce(valid_until, 'open') AS valid_until, status, \
         left(content_hash, 12) AS content_hash \
         FROM snapshots WHERE document_id = '{}' AND superseded_by IS NULL \
         ORDER BY effective_date",
        doc_id.replace('\'', "''")
    );
    println!("=== {doc_id} ===");
    display::print_table(&store.query_arrow(&sql)?)
}

// ── export ──

fn write_ipc(dir: &Path, name: &str, batch: &RecordBatch) -> anyhow::Result<()> {
    let path = dir.join(name);
    let file = File::create(&path).with_context(|| format!("creating {}", path.display()))?;
    let mut writer = FileWriter::try_new(file, &batch.schema())?;
    writer.write(batch)?;
    writer.finish()?;
    info!(path = %path.display(), rows = batch.num_rows(), "wrote");
    Ok(())
}

fn cmd_export(config: &PipelineConfig, input: &ConsolidateInput, out: &Path) -> anyhow::Result<()> {
    std::fs::create_dir_all(out).with_context(|| format!("creating {}", out.display()))?;
    let run = run_pipeline(config, input, false)?;

    let mut written = vec!["nodes.arrow"];
    match &run.consolidation {
        Some(c) => {
            write_ipc(out, "nodes.arrow", &nodes_to_batch(&c.snapshot.id, &c.nodes)?)?;
            write_ipc(
                out,
                "provenance.arrow",
                &provenance_to_batch(&c.snapshot.id, &c.provenance)?,
            )?;
            let directives: Vec<_> = run
                .amendments
                .iter()
                .flat_map(|a| a.directives.iter().cloned())
                .collect();
            write_ipc(out, "directives.arrow", &directives_to_batch(&directives)?)?;
            written.extend(["provenance.arrow", "directives.arrow"]);
            if c.snapshot.status == ComputationStatus::Failed {
                warn!(snapshot_id = %c.snapshot.id, "exported a failed snapshot");
            }
        }
        None => {
            write_ipc(
                out,
                "nodes.arrow",
                &nodes_to_batch(&run.base.result.id, &run.base.nodes)?,
            )?;
        }
    }
    for name in written {
        println!("{}", out.join(name).display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::ipc::reader::FileReader;

    const BASE: &str = "\
REGULATION (EU) 2024/101
of 3 March 2024

Article 1
Subject matter

This Regulation lays down rules on rates.

Article 2
Definitions

The rate is 20%.

Article 3
Entry into force

This Regulation shall apply from 1 January 2025.
";

    const AMENDING: &str = "\
Regulation (EU) 2024/101 is amended as follows:

(1) Article 3 is deleted.
";

    fn fixture(dir: &Path) -> ConsolidateInput {
        std::fs::write(dir.join("base.txt"), BASE).unwrap();
        std::fs::write(dir.join("amend.txt"), AMENDING).unwrap();
        std::fs::write(
            dir.join("amendments.toml"),
            "[[amendment]]\ndocument_id = \"amend\"\npath = \"amend.txt\"\neffective_date = \"2025-06-01\"\n",
        )
        .unwrap();
        ConsolidateInput {
            base: dir.join("base.txt"),
            doc_id: None,
            class: None,
            manifest: Some(dir.join("amendments.toml")),
            as_of: None,
            strict: false,
        }
    }

    fn rows(path: &Path) -> usize {
        let reader = FileReader::try_new(File::open(path).unwrap(), None).unwrap();
        reader.map(|b| b.unwrap().num_rows()).sum()
    }

    #[test]
    fn cli_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn pipeline_applies_the_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let input = fixture(dir.path());
        let run = run_pipeline(&PipelineConfig::default(), &input, true).unwrap();
        let c = run.consolidation.unwrap();
        assert_eq!(c.snapshot.document_id, "base");
        assert_eq!(c.snapshot.status, ComputationStatus::Complete);
        assert_eq!(c.tombstones.len(), 1);
        assert_eq!(c.tombstones[0].path, "/article:3");
        assert_eq!(c.snapshot.contributing_documents, vec!["base", "amend"]);
    }

    #[test]
    fn as_of_leaves_later_amendments_out() {
        let dir = tempfile::tempdir().unwrap();
        let mut input = fixture(dir.path());
        input.as_of = NaiveDate::from_ymd_opt(2025, 1, 1);
        let c = run_pipeline(&PipelineConfig::default(), &input, true)
            .unwrap()
            .consolidation
            .unwrap();
        assert!(c.tombstones.is_empty());
        assert_eq!(c.snapshot.contributing_documents, vec!["base"]);
    }

    #[test]
    fn export_writes_ipc_files() {
        let dir = tempfile::tempdir().unwrap();
        let input = fixture(dir.path());
        let out = dir.path().join("out");
        cmd_export(&PipelineConfig::default(), &input, &out).unwrap();

        let nodes = rows(&out.join("nodes.arrow"));
        let base = run_pipeline(&PipelineConfig::default(), &input, true).unwrap();
        assert_eq!(nodes, base.consolidation.unwrap().nodes.len());
        assert!(rows(&out.join("provenance.arrow")) > 0);
        assert_eq!(rows(&out.join("directives.arrow")), 1);
    }

    #[test]
    fn export_without_manifest_writes_base_nodes() {
        let dir = tempfile::tempdir().unwrap();
        let mut input = fixture(dir.path());
        input.manifest = None;
        let out = dir.path().join("out");
        cmd_export(&PipelineConfig::default(), &input, &out).unwrap();
        assert!(rows(&out.join("nodes.arrow")) > 0);
        assert!(!out.join("provenance.arrow").exists());
    }

    #[test]
    fn config_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("provisio.toml");
        std::fs::write(&path, "[consolidation]\nstrict = true\n").unwrap();
        let config = load_config(Some(&path)).unwrap();
        assert!(config.consolidation.strict);
        assert_eq!(load_config(None).unwrap(), PipelineConfig::default());
    }
}
