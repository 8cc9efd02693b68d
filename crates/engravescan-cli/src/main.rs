//! engravescan CLI: command-line harness for engine-code forensic analysis.

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use engravescan::{
    code_similarity, high_risk_positions, load_image, Analysis, CodeNormalizer, CodeParser,
    ContributionCombine, ExternalOpinion, InspectConfig, InspectionRequest, Inspector,
    PrefixCatalog, RawGlyph, ReferenceContext, ReferenceLibrary,
};

type CliError = Box<dyn std::error::Error>;
type CliResult<T> = Result<T, CliError>;

#[derive(Parser)]
#[command(name = "engravescan")]
#[command(
    about = "Assess engraved engine serial numbers for signs of tampering (code parsing, engraving type, glyph verification)"
)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze an image with its OCR glyphs and write the analysis JSON.
    Analyze(CliAnalyzeArgs),

    /// Print prefix catalog statistics, optionally exporting it as JSON.
    CatalogInfo {
        /// Catalog JSON to inspect instead of the embedded one.
        #[arg(long)]
        catalog: Option<PathBuf>,

        /// Write the catalog as versioned JSON to this path.
        #[arg(long)]
        export: Option<PathBuf>,
    },

    /// Normalize and parse a code string without an image.
    ParseCode {
        /// Raw code text as read by OCR.
        #[arg(long)]
        code: String,

        /// Second reading to compare against (e.g. the registered code).
        #[arg(long)]
        compare: Option<String>,

        /// Catalog JSON to use instead of the embedded one.
        #[arg(long)]
        catalog: Option<PathBuf>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliCombine {
    Max,
    Sum,
}

impl CliCombine {
    fn to_core(self) -> ContributionCombine {
        match self {
            Self::Max => ContributionCombine::Max,
            Self::Sum => ContributionCombine::Sum,
        }
    }
}

#[derive(Debug, Clone, Args)]
struct CliAnalyzeArgs {
    /// Path to the input image.
    #[arg(long)]
    image: PathBuf,

    /// OCR glyphs JSON: one list of glyphs, or a list of passes.
    #[arg(long)]
    glyphs: PathBuf,

    /// Claimed manufacture year.
    #[arg(long)]
    year: i32,

    /// External opinion JSON to include in scoring.
    #[arg(long)]
    opinion: Option<PathBuf>,

    /// Inspection config JSON (partial documents are fine).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Prefix catalog JSON (defaults to the embedded catalog).
    #[arg(long)]
    catalog: Option<PathBuf>,

    /// Directory of `<CHAR>.png` reference glyph templates.
    #[arg(long)]
    templates: Option<PathBuf>,

    /// Reference prefix images laid out as `<year|default>/<PREFIX>.png`.
    #[arg(long)]
    references: Option<PathBuf>,

    /// Genuine prefix crop to compare against (overrides --references).
    #[arg(long)]
    reference_image: Option<PathBuf>,

    /// Override the first year expected to be laser-marked.
    #[arg(long)]
    transition_year: Option<i32>,

    /// Override how evidence classes are combined.
    #[arg(long, value_enum)]
    combine: Option<CliCombine>,

    /// Path to write the analysis JSON (stdout when omitted).
    #[arg(long)]
    out: Option<PathBuf>,
}

/// Glyph file layouts accepted by `analyze`.
#[derive(serde::Deserialize)]
#[serde(untagged)]
enum GlyphInput {
    Passes(Vec<Vec<RawGlyph>>),
    Single(Vec<RawGlyph>),
}

impl GlyphInput {
    fn into_passes(self) -> Vec<Vec<RawGlyph>> {
        match self {
            Self::Passes(passes) => passes,
            Self::Single(glyphs) => vec![glyphs],
        }
    }
}

fn main() -> CliResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Analyze(args) => run_analyze(&args),
        Commands::CatalogInfo { catalog, export } => {
            run_catalog_info(catalog.as_deref(), export.as_deref())
        }
        Commands::ParseCode {
            code,
            compare,
            catalog,
        } => run_parse_code(&code, compare.as_deref(), catalog.as_deref()),
    }
}

fn load_catalog(path: Option<&Path>) -> CliResult<PrefixCatalog> {
    match path {
        Some(p) => PrefixCatalog::from_json_file(p)
            .map_err(|e| -> CliError { format!("failed to load catalog {}: {}", p.display(), e).into() }),
        None => Ok(PrefixCatalog::default()),
    }
}

// ── catalog-info ──────────────────────────────────────────────────────

fn run_catalog_info(catalog: Option<&Path>, export: Option<&Path>) -> CliResult<()> {
    let catalog = load_catalog(catalog)?;

    println!("engravescan prefix catalog");
    println!("  entries:        {}", catalog.len());
    println!(
        "  families:       {}",
        catalog.families().iter().cloned().collect::<Vec<_>>().join(" ")
    );
    if let (Some(first), Some(last)) = (catalog.entries().first(), catalog.entries().last()) {
        println!(
            "  longest:        {} ({}, {} cc)",
            first.prefix, first.model, first.displacement_cc
        );
        println!(
            "  shortest:       {} ({}, {} cc)",
            last.prefix, last.model, last.displacement_cc
        );
    }

    if let Some(path) = export {
        std::fs::write(path, catalog.to_json_string()?)?;
        tracing::info!("Catalog written to {}", path.display());
    }
    Ok(())
}

// ── parse-code ────────────────────────────────────────────────────────

/// Uppercase alphanumerics only, as the OCR stage would hand them over.
fn clean_code(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

fn run_parse_code(code: &str, compare: Option<&str>, catalog: Option<&Path>) -> CliResult<()> {
    let catalog = load_catalog(catalog)?;
    let config = InspectConfig::default();
    let normalizer = CodeNormalizer::new(&catalog, &config.normalizer);
    let parser = CodeParser::new(&catalog, &config.parser);

    let normalized = normalizer.normalize_text(&clean_code(code));
    let parsed = parser.parse(&normalized);

    println!("Input:        {}", code);
    println!("Normalized:   {}", normalized);
    println!("Valid:        {}", parsed.valid);
    println!("Confidence:   {:.2}", parsed.confidence);
    println!("Prefix:       {}", parsed.prefix.as_deref().unwrap_or("-"));
    println!("Serial:       {}", parsed.serial.as_deref().unwrap_or("-"));
    if let Some(info) = &parsed.model_info {
        println!("Model:        {} ({} cc)", info.model, info.displacement_cc);
    }
    for issue in &parsed.issues {
        println!("Issue:        {}", issue);
    }
    if let Some(canonical) = parsed.canonical() {
        let risky: Vec<String> = high_risk_positions(&canonical)
            .into_iter()
            .map(|(i, c)| format!("{}@{}", c, i + 1))
            .collect();
        println!("High-risk:    {}", risky.join(" "));
    }
    if let Some(other) = compare {
        let other_norm = normalizer.normalize_text(&clean_code(other));
        println!(
            "Similarity:   {:.3} vs {}",
            code_similarity(&normalized, &other_norm),
            other_norm
        );
    }
    Ok(())
}

// ── analyze ───────────────────────────────────────────────────────────

fn build_config(args: &CliAnalyzeArgs) -> CliResult<InspectConfig> {
    let mut config = match &args.config {
        Some(path) => InspectConfig::from_json_file(path)?,
        None => InspectConfig::default(),
    };
    if let Some(year) = args.transition_year {
        config.transition_year = year;
    }
    if let Some(combine) = args.combine {
        config.risk.combine = combine.to_core();
    }
    config.validate()?;
    Ok(config)
}

fn run_analyze(args: &CliAnalyzeArgs) -> CliResult<()> {
    let config = build_config(args)?;
    let mut context = ReferenceContext::load(
        args.catalog.as_deref(),
        args.templates.as_deref(),
        &config.verifier,
    )?;
    if let Some(dir) = &args.references {
        context = context.with_references(ReferenceLibrary::from_dir(dir)?);
    }
    let inspector = Inspector::with_context(config, Arc::new(context));

    tracing::info!("Loading image: {}", args.image.display());
    let bytes = std::fs::read(&args.image).map_err(|e| -> CliError {
        format!("Failed to read image {}: {}", args.image.display(), e).into()
    })?;
    let glyphs: GlyphInput = serde_json::from_str(&std::fs::read_to_string(&args.glyphs)?)
        .map_err(|e| -> CliError {
            format!("Invalid glyph file {}: {}", args.glyphs.display(), e).into()
        })?;

    let mut request = InspectionRequest::with_passes(glyphs.into_passes(), args.year);
    if let Some(path) = &args.opinion {
        let opinion = ExternalOpinion::from_json_str(&std::fs::read_to_string(path)?)?;
        request = request.with_opinion(opinion);
    }
    if let Some(path) = &args.reference_image {
        request = request.with_reference_image(load_image(&std::fs::read(path)?)?);
    }

    let analysis = inspector.analyze_bytes(&bytes, &request);
    match &analysis {
        Analysis::Completed(report) => tracing::info!(
            "Code {} scored {} ({:?})",
            report.code.canonical().unwrap_or_else(|| report.code.cleaned.clone()),
            report.assessment.score,
            report.assessment.verdict
        ),
        Analysis::Inconclusive { reason } => tracing::warn!("Inconclusive: {}", reason),
    }

    let json = serde_json::to_string_pretty(&analysis)?;
    match &args.out {
        Some(path) => {
            std::fs::write(path, &json)?;
            tracing::info!("Results written to {}", path.display());
        }
        None => println!("{}", json),
    }
    Ok(())
}
