//! `findings`: validate agent output, build exam and patient finding lists, score
//! predictions.
//!
//! Logging goes to stderr and is controlled with `RUST_LOG`
//! (default `findings=info`).

mod render;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use findings_agent::{
    extract_validated, make_extraction_prompt, vocabulary, AgentError, RecordedAgent, SYSTEM_PROMPT,
};
use findings_core::efl::{read_source_rows, EflBuilder, EflConfig, ReportIdStrategy};
use findings_core::evaluate::{evaluate, parse_label_lines};
use findings_core::io::{
    load_efl_documents, read_json, read_text, write_efl_documents, write_json_pretty, write_text,
};
use findings_core::ipl::{aggregate, IplConfig};
use findings_core::models::{EflPatientInfo, ReportExtraction};
use findings_core::validation::validate_extraction;

/// Exit status when an extraction fails verbatim validation.
const EXIT_INVALID: u8 = 2;

#[derive(Parser)]
#[command(name = "findings", version)]
#[command(about = "Radiology finding extraction, exam/patient finding lists and evaluation")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Json,
    Table,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a recorded agent response against its report
    Validate {
        /// Radiology report text file
        report: PathBuf,
        /// Raw agent response containing a ReportExtraction JSON object
        extraction: PathBuf,
        /// Exam description for context (e.g. modality, body part)
        #[arg(long)]
        exam_type: Option<String>,
        /// Agent calls to make while the result fails validation
        #[arg(long, default_value_t = 1)]
        max_attempts: u32,
        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Json)]
        format: OutputFormat,
    },
    /// Print the prompt an extraction agent should receive for a report
    Prompt {
        /// Radiology report text file
        report: PathBuf,
        /// Exam description for context (e.g. modality, body part)
        #[arg(long)]
        exam_type: Option<String>,
        /// Print the system prompt and allowed values instead
        #[arg(long)]
        system: bool,
    },
    /// Print a human-readable summary of an extraction
    Summarize {
        /// ReportExtraction JSON file
        extraction: PathBuf,
        /// Report text; when given, validation status is included
        #[arg(long)]
        report: Option<PathBuf>,
    },
    /// Generate one Exam Finding List per exam from a finding table (CSV)
    Efl {
        table: PathBuf,
        output_dir: PathBuf,
        #[arg(long, default_value = "MRN0000001")]
        patient_mrn: String,
        /// Date of birth (YYYY-MM-DD)
        #[arg(long, default_value = "1961-01-01")]
        patient_dob: String,
        /// Years added to every exam date
        #[arg(long, default_value_t = 15, allow_hyphen_values = true)]
        year_shift: i32,
        /// Derive report ids from patient, study and exam code instead of random UUIDs
        #[arg(long)]
        derived_ids: bool,
    },
    /// Aggregate a directory of EFL files into an Imaging Problem List
    Ipl {
        efl_dir: PathBuf,
        output_file: PathBuf,
        #[arg(long, default_value = "John Doe")]
        patient_name: String,
    },
    /// Score predicted finding labels against gold labels (JSONL)
    Evaluate {
        gold: PathBuf,
        predictions: PathBuf,
        /// Print the report as JSON instead of tables
        #[arg(long)]
        json: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_tracing() {
        eprintln!("Error: {:#}", e);
        return ExitCode::FAILURE;
    }

    match run(cli.command) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_tracing() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("findings=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
    Ok(())
}

fn run(command: Commands) -> anyhow::Result<ExitCode> {
    match command {
        Commands::Validate {
            report,
            extraction,
            exam_type,
            max_attempts,
            output,
            format,
        } => {
            let is_valid = validate(
                &report,
                &extraction,
                exam_type.as_deref(),
                max_attempts,
                output.as_deref(),
                format,
            )?;
            if is_valid {
                Ok(ExitCode::SUCCESS)
            } else {
                Ok(ExitCode::from(EXIT_INVALID))
            }
        }
        Commands::Prompt {
            report,
            exam_type,
            system,
        } => {
            println!("{}", prompt_text(&report, exam_type.as_deref(), system)?);
            Ok(ExitCode::SUCCESS)
        }
        Commands::Summarize { extraction, report } => {
            summarize(&extraction, report.as_deref())?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Efl {
            table,
            output_dir,
            patient_mrn,
            patient_dob,
            year_shift,
            derived_ids,
        } => {
            let config = EflConfig {
                patient: EflPatientInfo {
                    patient_identifier: patient_mrn,
                    patient_dob,
                },
                year_shift,
                report_ids: if derived_ids {
                    ReportIdStrategy::Derived
                } else {
                    ReportIdStrategy::Random
                },
            };
            generate_efls(&table, &output_dir, config)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Ipl {
            efl_dir,
            output_file,
            patient_name,
        } => {
            generate_ipl(&efl_dir, &output_file, IplConfig { patient_name })?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Evaluate {
            gold,
            predictions,
            json,
        } => {
            score(&gold, &predictions, json)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Returns whether the extraction passed verbatim validation.
fn validate(
    report_path: &Path,
    extraction_path: &Path,
    exam_type: Option<&str>,
    max_attempts: u32,
    output: Option<&Path>,
    format: OutputFormat,
) -> anyhow::Result<bool> {
    let report_text = read_text(report_path)?;
    let agent = RecordedAgent::from_file(extraction_path)?;
    let result = match extract_validated(&agent, &report_text, exam_type, max_attempts) {
        Ok(result) => result,
        Err(e @ (AgentError::JsonParse(_) | AgentError::InvalidFormat(_))) => {
            return Err(anyhow::Error::new(e).context(format!(
                "{} does not hold a valid extraction. Allowed values:\n{}",
                extraction_path.display(),
                vocabulary()
            )));
        }
        Err(e) => {
            return Err(anyhow::Error::new(e).context(format!(
                "Error during extraction from {}",
                extraction_path.display()
            )));
        }
    };

    let text = match format {
        OutputFormat::Json => {
            let mut value = serde_json::to_value(&result.extraction)?;
            if let serde_json::Value::Object(map) = &mut value {
                map.insert(
                    "_validation".to_string(),
                    serde_json::to_value(&result.validation)?,
                );
            }
            serde_json::to_string_pretty(&value)?
        }
        OutputFormat::Table => render::render_summary(&result.extraction, Some(&result.validation)),
    };

    match output {
        Some(path) => {
            write_text(path, &text)?;
            println!("Output written to {}", path.display());
        }
        None => println!("{}", text),
    }

    Ok(result.validation.is_valid)
}

fn prompt_text(report_path: &Path, exam_type: Option<&str>, system: bool) -> anyhow::Result<String> {
    if system {
        return Ok(format!("{}\n\nAllowed values:\n{}", SYSTEM_PROMPT, vocabulary()));
    }
    let report_text = read_text(report_path)?;
    Ok(make_extraction_prompt(&report_text, exam_type))
}

fn summarize(extraction_path: &Path, report_path: Option<&Path>) -> anyhow::Result<()> {
    let extraction: ReportExtraction = read_json(extraction_path)?;
    let validation = match report_path {
        Some(path) => Some(validate_extraction(&read_text(path)?, &extraction)),
        None => None,
    };
    println!("{}", render::render_summary(&extraction, validation.as_ref()));
    Ok(())
}

fn generate_efls(table: &Path, output_dir: &Path, config: EflConfig) -> anyhow::Result<()> {
    let input = read_text(table)?;
    let rows = read_source_rows(&input)
        .with_context(|| format!("Failed to read finding table {}", table.display()))?;
    tracing::info!("Read {} rows from {}", rows.len(), table.display());

    let batch = EflBuilder::new(config).build(&rows);
    write_efl_documents(output_dir, &batch.documents)?;

    println!();
    println!("Total files created: {}", batch.documents.len());
    println!("Total findings: {}", batch.total_findings());
    if !batch.skipped_rows.is_empty() {
        println!("Rows skipped: {}", batch.skipped_rows.len());
    }
    Ok(())
}

fn generate_ipl(efl_dir: &Path, output_file: &Path, config: IplConfig) -> anyhow::Result<()> {
    let documents = load_efl_documents(efl_dir)?;
    let build = aggregate(&documents, &config)
        .with_context(|| format!("Failed to aggregate EFL files in {}", efl_dir.display()))?;
    write_json_pretty(output_file, &build.document)?;

    println!();
    println!(
        "Generated IPL with {} unique finding types",
        build.document.findings.len()
    );
    println!("Total observations: {}", build.total_observations());
    println!("Written to: {}", output_file.display());
    Ok(())
}

fn score(gold_path: &Path, predictions_path: &Path, json: bool) -> anyhow::Result<()> {
    let gold = parse_label_lines(&read_text(gold_path)?)
        .with_context(|| format!("Failed to parse gold labels {}", gold_path.display()))?;
    let predictions = parse_label_lines(&read_text(predictions_path)?).with_context(|| {
        format!("Failed to parse predictions {}", predictions_path.display())
    })?;

    let report = evaluate(&gold, &predictions)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", render::render_evaluation(&report));
    }
    Ok(())
}
