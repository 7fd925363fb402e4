use anyhow::{anyhow, bail, Result};
use clap::{CommandFactory, Parser, Subcommand, ValueHint};
use clap_complete::{generate, Shell};
use console::style;
use dialoguer::{theme::ColorfulTheme, Input, Select};
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use std::io;
use std::path::PathBuf;
use tracing::{info, warn};

use antibody_identification::output::render_text;
use antibody_identification::{
    AnalysisStatus, AntibodyIdentifier, AutoControl, Case, CaseDiscovery, CaseParser, CaseReport,
    PanelParser, ReactionGrade, Reactions, ReportFormat, ReportGenerator, Settings, ANTIGEN_ORDER,
    PANEL_SIZE, REACTION_GRADES,
};

/// Red-cell alloantibody identification from reaction panels
#[derive(Parser, Debug)]
#[command(
    name = "antibody-identification",
    version,
    about = "Identify red-cell alloantibodies from an 11-cell reaction panel",
    long_about = r#"
Rule-out / rule-in antibody identification:
- Excludes specificities using non-reactive cells with homozygous antigen expression
- Matches surviving candidates against every reactive cell
- Suspends alloantibody logic when the autocontrol is positive

Reads panel sheets as .xlsx/.xls workbooks or CSV/TSV, and case files as CSV/TSV
(text files optionally .gz, .bz2 or .xz).
"#
)]
#[command(arg_required_else_help = true)]
struct Cli {
    /// Panel sheet (antigram): 11 rows, one column per antigen
    #[arg(short, long, value_name = "FILE", value_hint = ValueHint::FilePath)]
    panel: Option<PathBuf>,

    /// Reactions for cells 1-11, e.g. "Neg,2+,w+,..."
    #[arg(short, long, value_name = "GRADES")]
    reactions: Option<String>,

    /// Autocontrol result for --reactions
    #[arg(short = 'a', long, value_enum, default_value = "negative")]
    autocontrol: AutoControl,

    /// Case identifier used for --reactions and interactive mode
    #[arg(long, default_value = "patient")]
    case_id: String,

    /// Case file (cell,reaction rows plus optional AC row)
    #[arg(long, value_name = "FILE", value_hint = ValueHint::FilePath)]
    case: Option<PathBuf>,

    /// Case files or directories for batch analysis
    #[arg(short, long, value_name = "PATHS", num_args = 1.., value_hint = ValueHint::AnyPath)]
    cases: Vec<PathBuf>,

    /// Recursive search for case files
    #[arg(short = 'R', long, help = "Recursively search directories")]
    recursive: bool,

    /// Interactive mode with prompts for reactions and autocontrol
    #[arg(short, long, help = "Interactive mode with default values")]
    interactive: bool,

    /// Number of threads (0 = auto-detect)
    #[arg(
        short,
        long,
        default_value = "0",
        help = "Number of threads (0 = auto)"
    )]
    threads: usize,

    /// Output format (overrides the settings file)
    #[arg(short, long, value_enum)]
    format: Option<ReportFormat>,

    /// Output directory for reports (overrides the settings file)
    #[arg(short, long, value_hint = ValueHint::DirPath)]
    output: Option<PathBuf>,

    /// Settings file (TOML)
    #[arg(long, value_name = "FILE", value_hint = ValueHint::FilePath)]
    config: Option<PathBuf>,

    /// Report every surviving candidate when no cell reacted
    #[arg(long)]
    allow_vacuous_matches: bool,

    /// Enable verbose logging
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Generate shell completions
    #[arg(long, value_enum, value_name = "SHELL")]
    completions: Option<Shell>,

    /// Subcommands
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate shell completions
    Completions { shell: Shell },
    /// List panel antigens and their allele partners
    Antigens,
    /// Write a blank 11-cell panel sheet to fill in
    Template {
        #[arg(value_hint = ValueHint::FilePath)]
        path: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Handle shell completions
    if let Some(shell) = cli.completions {
        generate_completions(shell);
        return Ok(());
    }

    match &cli.command {
        Some(Commands::Completions { shell }) => {
            generate_completions(*shell);
            return Ok(());
        }
        Some(Commands::Antigens) => {
            list_antigens();
            return Ok(());
        }
        Some(Commands::Template { path }) => {
            PanelParser::new().write_template(path)?;
            println!(
                "{} Blank panel sheet written to: {}",
                style("✓").green().bold(),
                style(path.display()).cyan()
            );
            return Ok(());
        }
        None => {}
    }

    // Initialize logging
    init_logging(cli.verbose);

    let settings = match &cli.config {
        Some(path) => Settings::load(path)?,
        None => Settings::default(),
    };

    let config = if cli.interactive {
        run_interactive_mode(&cli, &settings)?
    } else {
        AppConfig::from_cli(&cli, &settings)?
    };

    init_thread_pool(config.threads)?;

    info!("Starting antibody identification...");
    info!("Using {} threads", rayon::current_num_threads());

    run_analysis(config)
}

fn generate_completions(shell: Shell) {
    let mut cmd = Cli::command();
    let name = cmd.get_name().to_string();
    generate(shell, &mut cmd, name, &mut io::stdout());
}

fn list_antigens() {
    println!("{}", style("Panel Antigens:").bold().cyan());
    println!();

    for antigen in ANTIGEN_ORDER {
        let partner = antigen
            .partner()
            .map(|p| p.symbol().to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "  {:<4} partner {:<4} {}",
            style(antigen.symbol()).green().bold(),
            style(partner).yellow(),
            style(antigen.antibody_name()).dim()
        );
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(format!("antibody_identification={}", level))
        .with_writer(io::stderr)
        .init();
}

fn init_thread_pool(threads: usize) -> Result<()> {
    let num_threads = if threads == 0 {
        num_cpus::get()
    } else {
        threads
    };

    rayon::ThreadPoolBuilder::new()
        .num_threads(num_threads)
        .build_global()
        .map_err(|e| anyhow!("Failed to initialize thread pool: {}", e))?;

    Ok(())
}

fn run_interactive_mode(cli: &Cli, settings: &Settings) -> Result<AppConfig> {
    println!(
        "{}",
        style("╔══════════════════════════════════════════════════════════════╗").red()
    );
    println!(
        "{}",
        style("║     Antibody Identification - Interactive Mode               ║")
            .red()
            .bold()
    );
    println!(
        "{}",
        style("╚══════════════════════════════════════════════════════════════╝").red()
    );
    println!();

    let theme = ColorfulTheme::default();

    let panel: String = match &cli.panel {
        Some(path) => Input::with_theme(&theme)
            .with_prompt("Panel sheet")
            .default(path.display().to_string())
            .interact_text()?,
        None => Input::with_theme(&theme)
            .with_prompt("Panel sheet")
            .interact_text()?,
    };

    let case_id: String = Input::with_theme(&theme)
        .with_prompt("Patient / file number")
        .default(cli.case_id.clone())
        .interact_text()?;

    let grade_labels: Vec<&str> = REACTION_GRADES.iter().map(|g| g.label()).collect();
    let mut grades: Vec<ReactionGrade> = Vec::with_capacity(PANEL_SIZE);
    for cell in 1..=PANEL_SIZE {
        let idx = Select::with_theme(&theme)
            .with_prompt(format!("Cell {}", cell))
            .default(0)
            .items(&grade_labels)
            .interact()?;
        grades.push(REACTION_GRADES[idx]);
    }

    let ac_idx = Select::with_theme(&theme)
        .with_prompt("Auto control")
        .default(0)
        .items(&vec!["Negative", "Positive"])
        .interact()?;
    let autocontrol = if ac_idx == 1 {
        AutoControl::Positive
    } else {
        AutoControl::Negative
    };

    let formats = vec!["Text", "HTML", "CSV", "JSON", "TSV", "All formats"];
    let format_idx = Select::with_theme(&theme)
        .with_prompt("Select output format")
        .default(0)
        .items(&formats)
        .interact()?;

    let format = match format_idx {
        0 => ReportFormat::Text,
        1 => ReportFormat::Html,
        2 => ReportFormat::Csv,
        3 => ReportFormat::Json,
        4 => ReportFormat::Tsv,
        5 => ReportFormat::All,
        _ => ReportFormat::Text,
    };

    let output: String = Input::with_theme(&theme)
        .with_prompt("Output directory")
        .default(settings.report.output_dir.display().to_string())
        .interact_text()?;

    let mut config = AppConfig::from_cli(cli, settings)?;
    config.panel = Some(PathBuf::from(panel));
    config.inline_case = Some(Case::new(case_id, Reactions::new(grades)?, autocontrol));
    config.case = None;
    config.cases = Vec::new();
    config.format = format;
    config.output = PathBuf::from(output);
    Ok(config)
}

fn run_analysis(config: AppConfig) -> Result<()> {
    let panel_path = config
        .panel
        .clone()
        .ok_or_else(|| anyhow!("A panel sheet is required (--panel FILE)"))?;

    let panel = PanelParser::new().parse(&panel_path)?;
    info!("Loaded panel sheet {}", panel_path.display());

    let mut cases = Vec::new();
    if let Some(case) = config.inline_case.clone() {
        cases.push(case);
    }
    if let Some(path) = &config.case {
        cases.push(CaseParser::new().parse(path)?);
    }

    if !config.cases.is_empty() {
        let discovery = CaseDiscovery::new(config.recursive);
        let files = discovery.discover(&config.cases)?;
        info!("Found {} case files", files.len());

        let pb = ProgressBar::new(files.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
                .progress_chars("#>-"),
        );
        pb.set_message("Reading case files...");

        let parser = CaseParser::new();
        let parsed: Vec<Case> = files
            .par_iter()
            .filter_map(|path| {
                let result = parser.parse(path);
                pb.inc(1);
                match result {
                    Ok(case) => Some(case),
                    Err(e) => {
                        warn!("Failed to parse {}: {:#}", path.display(), e);
                        None
                    }
                }
            })
            .collect();
        pb.finish_and_clear();

        info!("Successfully parsed {} case files", parsed.len());
        cases.extend(parsed);
    }

    if cases.is_empty() {
        bail!("No reactions to analyze: use --reactions, --case, --cases or --interactive");
    }

    let identifier = AntibodyIdentifier::new(&config.settings.analysis);
    let reports = identifier.identify_batch(&panel, &cases);

    if reports.len() == 1 {
        print_report(&reports[0]);
    } else {
        print_summary(&reports);
    }

    let generator = ReportGenerator::new(&config.output)?;
    let written = generator.generate(&reports, config.format)?;

    println!(
        "\n{} {} report file(s) saved to: {}",
        style("✓").green().bold(),
        written.len(),
        style(config.output.display()).cyan()
    );

    Ok(())
}

fn styled_status(status: AnalysisStatus) -> console::StyledObject<&'static str> {
    let label = status.label();
    match status {
        AnalysisStatus::Identified => style(label).green().bold(),
        AnalysisStatus::Ambiguous => style(label).yellow().bold(),
        AnalysisStatus::Suspended => style(label).red().bold(),
        AnalysisStatus::InconclusiveNoCandidates | AnalysisStatus::InconclusiveNoMatches => {
            style(label).dim().bold()
        }
    }
}

fn print_report(report: &CaseReport) {
    println!();
    println!(
        "{} {}",
        style("Result:").bold(),
        styled_status(report.result.status)
    );
    println!("{}", render_text(report));
}

fn print_summary(reports: &[CaseReport]) {
    println!();
    println!("{}", style("Batch summary:").bold().cyan());
    for report in reports {
        let matches = if report.result.status.is_identified() {
            report.result.antibody_names().join(" + ")
        } else {
            "-".to_string()
        };
        println!(
            "  {:<24} {:<32} {}",
            report.case_id,
            styled_status(report.result.status),
            matches
        );
    }
}

#[derive(Debug)]
struct AppConfig {
    panel: Option<PathBuf>,
    inline_case: Option<Case>,
    case: Option<PathBuf>,
    cases: Vec<PathBuf>,
    recursive: bool,
    threads: usize,
    format: ReportFormat,
    output: PathBuf,
    settings: Settings,
}

impl AppConfig {
    /// CLI flags take precedence over the settings file
    fn from_cli(cli: &Cli, settings: &Settings) -> Result<Self> {
        let mut settings = settings.clone();
        if cli.allow_vacuous_matches {
            settings.analysis.allow_vacuous_matches = true;
        }

        let inline_case = match &cli.reactions {
            Some(list) => Some(Case::new(
                cli.case_id.clone(),
                Reactions::from_list(list)?,
                cli.autocontrol,
            )),
            None => None,
        };

        Ok(Self {
            panel: cli.panel.clone(),
            inline_case,
            case: cli.case.clone(),
            cases: cli.cases.clone(),
            recursive: cli.recursive,
            threads: cli.threads,
            format: cli.format.unwrap_or(settings.report.format),
            output: cli
                .output
                .clone()
                .unwrap_or_else(|| settings.report.output_dir.clone()),
            settings,
        })
    }
}
