//! PDF Binder CLI tool
//!
//! Merges PDFs into one numbered document and renders a table of contents
//! into a DOCX template.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process;

use anyhow::{bail, Context};
use clap::{ArgAction, Args, Parser, Subcommand};
use glob::glob;
use serde::Serialize;
use tempfile::NamedTempFile;

use pdf_binder::assembly::{assemble, AssemblyOutput, AssemblyRequest};
use pdf_binder::config::{LayoutOptions, Manifest};
use pdf_binder::docx::DocxTemplate;
use pdf_binder::layout::PageNumberPosition;
use pdf_binder::pagination::{plan_entries, BlankPageRule};
use pdf_binder::pdf::{extract_metadata, LopdfBackend};
use pdf_binder::registry::{EntryId, EntryRegistry};
use pdf_binder::Error;

const DEFAULT_PDF_OUTPUT: &str = "merged_document_with_catalog.pdf";
const DEFAULT_DOCX_OUTPUT: &str = "generated_document.docx";

/// PDF Binder - Merge PDFs with page numbers and build a table of contents
#[derive(Parser)]
#[command(name = "pdf-binder")]
#[command(author, version, about, long_about = None)]
#[command(after_help = "EXAMPLES:
    # Merge numbered PDFs in order, padding odd documents with a blank page
    pdf-binder merge -o binder.pdf \"[0-9]*.pdf\"

    # Show where each document will start
    pdf-binder plan --no-blank-pages *.pdf

    # Merge and render the table of contents from a manifest
    pdf-binder build --manifest course.json --template toc.docx")]
struct Cli {
    /// More log output (-v info, -vv debug); RUST_LOG overrides
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show information about a PDF file
    Info {
        /// PDF file to inspect
        input: PathBuf,
    },

    /// Print the pagination plan without writing anything
    Plan {
        #[command(flatten)]
        inputs: InputArgs,

        #[command(flatten)]
        layout: LayoutArgs,

        /// Print the plan as JSON
        #[arg(long)]
        json: bool,
    },

    /// Merge PDF files into one, with blank pages and page numbers
    Merge {
        #[command(flatten)]
        inputs: InputArgs,

        #[command(flatten)]
        layout: LayoutArgs,

        /// Output PDF file path
        #[arg(short, long, default_value = DEFAULT_PDF_OUTPUT)]
        output: PathBuf,

        /// Open the output file after creation
        #[arg(long)]
        open: bool,
    },

    /// Render the table of contents into a DOCX template
    Toc {
        #[command(flatten)]
        inputs: InputArgs,

        #[command(flatten)]
        layout: LayoutArgs,

        /// DOCX template with {title} and {#entries}{title} {page}{/entries} tags
        #[arg(long)]
        template: PathBuf,

        /// Output DOCX file path
        #[arg(short, long, default_value = DEFAULT_DOCX_OUTPUT)]
        output: PathBuf,
    },

    /// Merge PDFs and render the table of contents in one step
    Build {
        #[command(flatten)]
        inputs: InputArgs,

        #[command(flatten)]
        layout: LayoutArgs,

        /// DOCX template for the table of contents
        #[arg(long)]
        template: PathBuf,

        /// Output PDF file path
        #[arg(short, long, default_value = DEFAULT_PDF_OUTPUT)]
        output: PathBuf,

        /// Output DOCX file path
        #[arg(long, default_value = DEFAULT_DOCX_OUTPUT)]
        toc_output: PathBuf,

        /// Open the merged PDF after creation
        #[arg(long)]
        open: bool,
    },
}

#[derive(Args)]
struct InputArgs {
    /// Input PDF files (in order). Supports glob patterns like "*.pdf"
    #[arg(required_unless_present = "manifest")]
    inputs: Vec<String>,

    /// JSON manifest listing documents, titles and layout
    #[arg(long, conflicts_with = "inputs")]
    manifest: Option<PathBuf>,
}

#[derive(Args)]
struct LayoutArgs {
    /// Where page numbers go
    #[arg(long, value_enum)]
    position: Option<PageNumberPosition>,

    /// Do not pad documents with blank pages
    #[arg(long)]
    no_blank_pages: bool,

    /// Which documents get a blank page after them
    #[arg(long, value_enum)]
    blank_page_rule: Option<BlankPageRule>,

    /// Do not stamp page numbers
    #[arg(long)]
    no_page_numbers: bool,

    /// Page-number font size in points
    #[arg(long)]
    font_size: Option<f32>,

    /// Heading passed to the table-of-contents template
    #[arg(long)]
    toc_title: Option<String>,
}

impl LayoutArgs {
    /// Command-line flags win over the manifest's layout section
    fn apply(&self, mut options: LayoutOptions) -> LayoutOptions {
        if let Some(position) = self.position {
            options.page_number_position = position;
        }
        if self.no_blank_pages {
            options.insert_empty_page_after_odd_count = false;
        }
        if let Some(rule) = self.blank_page_rule {
            options.blank_page_rule = rule;
        }
        if self.no_page_numbers {
            options.add_page_numbers = false;
        }
        if let Some(size) = self.font_size {
            options.font_size = size;
        }
        if let Some(title) = &self.toc_title {
            options.toc_title = title.clone();
        }
        options
    }
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Commands::Info { input } => cmd_info(&input),
        Commands::Plan { inputs, layout, json } => cmd_plan(&inputs, &layout, json),
        Commands::Merge {
            inputs,
            layout,
            output,
            open,
        } => cmd_merge(&inputs, &layout, &output, open),
        Commands::Toc {
            inputs,
            layout,
            template,
            output,
        } => cmd_toc(&inputs, &layout, &template, &output),
        Commands::Build {
            inputs,
            layout,
            template,
            output,
            toc_output,
            open,
        } => cmd_build(&inputs, &layout, &template, &output, &toc_output, open),
    };

    if let Err(e) = result {
        tracing::debug!(error = ?e, "command failed");
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        _ => tracing::Level::DEBUG,
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()),
        )
        .init();
}

/// Expand glob patterns in input paths
///
/// Matches of one pattern are sorted; patterns keep their command-line order.
fn expand_globs(patterns: &[String]) -> pdf_binder::Result<Vec<PathBuf>> {
    let mut paths = Vec::new();

    for pattern in patterns {
        // Check if pattern contains glob characters
        if pattern.contains('*') || pattern.contains('?') || pattern.contains('[') {
            let entries = glob(pattern).map_err(|e| Error::InvalidGlob(format!("{pattern}: {e}")))?;
            let mut matched = Vec::new();
            for entry in entries {
                match entry {
                    Ok(path) => matched.push(path),
                    Err(e) => tracing::warn!(pattern = %pattern, error = %e, "glob error"),
                }
            }
            if matched.is_empty() {
                return Err(Error::NoFilesMatched(pattern.clone()));
            }
            matched.sort();
            paths.extend(matched);
        } else {
            // No glob characters, treat as literal path
            paths.push(PathBuf::from(pattern));
        }
    }

    Ok(paths)
}

/// Manifest from `--manifest`, or one built from the input paths
fn load_manifest(inputs: &InputArgs) -> anyhow::Result<Manifest> {
    match &inputs.manifest {
        Some(path) => Manifest::load(path)
            .with_context(|| format!("Failed to load manifest {}", path.display())),
        None => {
            let paths = expand_globs(&inputs.inputs)?;
            if paths.is_empty() {
                bail!("No input files provided");
            }
            Ok(Manifest::from_paths(paths))
        }
    }
}

fn prepare(inputs: &InputArgs, layout: &LayoutArgs) -> anyhow::Result<(EntryRegistry<PathBuf>, LayoutOptions)> {
    let manifest = load_manifest(inputs)?;
    let options = layout.apply(manifest.layout.clone().unwrap_or_default());
    let registry = manifest
        .build_registry()
        .context("Failed to read input PDFs")?;
    tracing::info!(documents = registry.len(), "registered input documents");
    Ok((registry, options))
}

fn run(
    registry: &EntryRegistry<PathBuf>,
    request: &AssemblyRequest<'_>,
) -> anyhow::Result<AssemblyOutput> {
    let output = assemble(registry, request, LopdfBackend::new(), &DocxTemplate)?;
    Ok(output)
}

/// Write every artifact, or none of them
///
/// Each artifact goes to a temporary file next to its target first. The
/// targets are only replaced once all temporary files were written.
fn write_artifacts(artifacts: &[(&Path, &[u8])]) -> anyhow::Result<()> {
    let mut staged = Vec::with_capacity(artifacts.len());
    for &(path, bytes) in artifacts {
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut file =
            NamedTempFile::new_in(dir).with_context(|| format!("Failed to write {}", path.display()))?;
        file.write_all(bytes)
            .and_then(|()| file.flush())
            .with_context(|| format!("Failed to write {}", path.display()))?;
        staged.push((path, file));
    }

    for (path, file) in staged {
        file.persist(path)
            .map_err(|e| e.error)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        eprintln!("Output: {}", path.display());
    }
    Ok(())
}

/// Open a file with the system default application
fn open_file(path: &Path) -> anyhow::Result<()> {
    #[cfg(target_os = "macos")]
    {
        std::process::Command::new("open").arg(path).spawn()?;
    }
    #[cfg(target_os = "linux")]
    {
        std::process::Command::new("xdg-open").arg(path).spawn()?;
    }
    #[cfg(target_os = "windows")]
    {
        std::process::Command::new("cmd")
            .args(["/C", "start", "", &path.display().to_string()])
            .spawn()?;
    }
    Ok(())
}

/// Show information about a PDF
fn cmd_info(input: &Path) -> anyhow::Result<()> {
    let metadata = extract_metadata(input)?;

    println!("File: {}", input.display());
    println!("Pages: {}", metadata.page_count);

    if let Some(title) = metadata.title {
        println!("Title: {}", title);
    }
    if let Some(author) = metadata.author {
        println!("Author: {}", author);
    }

    Ok(())
}

#[derive(Serialize)]
struct PlanRow<'a> {
    id: EntryId,
    title: &'a str,
    start_page: u32,
    page_count: u32,
    blank_after: bool,
}

#[derive(Serialize)]
struct PlanReport<'a> {
    total_pages: u32,
    blank_pages: u32,
    entries: Vec<PlanRow<'a>>,
}

/// Print where each document lands
fn cmd_plan(inputs: &InputArgs, layout: &LayoutArgs, json: bool) -> anyhow::Result<()> {
    let (registry, options) = prepare(inputs, layout)?;
    let plan = plan_entries(registry.entries(), options.blank_pages())?;

    let report = PlanReport {
        total_pages: plan.total_pages(),
        blank_pages: plan.blank_pages(),
        entries: registry
            .iter()
            .zip(plan.slots())
            .map(|(entry, slot)| PlanRow {
                id: entry.id(),
                title: &entry.title,
                start_page: slot.start_page,
                page_count: slot.page_count,
                blank_after: slot.blank_after,
            })
            .collect(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("{:>5}  {:>5}  {:<5}  Title", "Start", "Pages", "Blank");
    for row in &report.entries {
        println!(
            "{:>5}  {:>5}  {:<5}  {}",
            row.start_page,
            row.page_count,
            if row.blank_after { "yes" } else { "" },
            row.title
        );
    }
    println!(
        "Total: {} pages ({} blank)",
        report.total_pages, report.blank_pages
    );
    Ok(())
}

/// Merge PDFs into one numbered document
fn cmd_merge(inputs: &InputArgs, layout: &LayoutArgs, output: &Path, open: bool) -> anyhow::Result<()> {
    let (registry, options) = prepare(inputs, layout)?;
    eprintln!("Merging {} PDF files...", registry.len());

    let request = AssemblyRequest {
        options,
        merge_pdf: true,
        generate_catalog: false,
        catalog_template: None,
    };
    let result = run(&registry, &request)?;

    if let Some(pdf) = &result.pdf {
        write_artifacts(&[(output, pdf.as_slice())])?;
    }
    if open {
        open_file(output)?;
    }
    Ok(())
}

/// Render the table of contents only
fn cmd_toc(inputs: &InputArgs, layout: &LayoutArgs, template: &Path, output: &Path) -> anyhow::Result<()> {
    let template_bytes =
        std::fs::read(template).with_context(|| format!("Failed to read template {}", template.display()))?;
    let (registry, options) = prepare(inputs, layout)?;

    let request = AssemblyRequest {
        options,
        merge_pdf: false,
        generate_catalog: true,
        catalog_template: Some(&template_bytes),
    };
    let result = run(&registry, &request)?;

    if let Some(docx) = &result.catalog {
        write_artifacts(&[(output, docx.as_slice())])?;
    }
    Ok(())
}

/// Merge PDFs and render the table of contents in one step
fn cmd_build(
    inputs: &InputArgs,
    layout: &LayoutArgs,
    template: &Path,
    output: &Path,
    toc_output: &Path,
    open: bool,
) -> anyhow::Result<()> {
    let template_bytes =
        std::fs::read(template).with_context(|| format!("Failed to read template {}", template.display()))?;
    let (registry, options) = prepare(inputs, layout)?;
    eprintln!("Merging {} PDF files...", registry.len());

    let request = AssemblyRequest {
        options,
        merge_pdf: true,
        generate_catalog: true,
        catalog_template: Some(&template_bytes),
    };
    let result = run(&registry, &request)?;

    let mut artifacts: Vec<(&Path, &[u8])> = Vec::new();
    if let Some(pdf) = &result.pdf {
        artifacts.push((output, pdf.as_slice()));
    }
    if let Some(docx) = &result.catalog {
        artifacts.push((toc_output, docx.as_slice()));
    }
    write_artifacts(&artifacts)?;
    if open {
        open_file(output)?;
    }
    Ok(())
}
