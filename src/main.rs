use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use serde_sarif::sarif::Invocation;
use tracing::{debug, info};

use detguard::analysis::{AnalysisConfiguration, Analyzer};
use detguard::loader::load_inputs;
use detguard::logging::LogArgs;
use detguard::report::build_sarif;

/// CLI arguments for detguard execution.
#[derive(Parser, Debug)]
#[command(
    name = "detguard",
    about = "Checks that JVM classes only reach deterministic code, with SARIF output.",
    version
)]
struct Cli {
    #[arg(long, value_name = "PATH")]
    input: PathBuf,
    #[arg(long, value_name = "PATH")]
    classpath: Vec<PathBuf>,
    /// JSON analysis configuration.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Additional allow-list entry; a trailing `*` matches a prefix.
    #[arg(long = "allow", value_name = "NAME")]
    allow: Vec<String>,
    /// Treat annotations as class references.
    #[arg(long)]
    derive_annotations: bool,
    #[arg(long, value_name = "PATH")]
    output: Option<PathBuf>,
    #[arg(long)]
    quiet: bool,
    #[arg(long)]
    timing: bool,
    #[command(flatten)]
    log: LogArgs,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    cli.log.init()?;
    run(cli)
}

fn run(cli: Cli) -> Result<()> {
    if !cli.input.exists() {
        anyhow::bail!("input not found: {}", cli.input.display());
    }
    for entry in &cli.classpath {
        if !entry.exists() {
            anyhow::bail!("classpath entry not found: {}", entry.display());
        }
    }

    let started_at = Instant::now();
    let configuration = load_configuration(&cli)?;
    let loaded = load_inputs(&cli.input, &cli.classpath)?;
    let class_count = loaded.classes.len();

    let mut hierarchy = configuration.new_hierarchy();
    hierarchy.extend(loaded.classes);
    let analyzer = Analyzer::new(configuration);
    let outcome = analyzer.analyze(&hierarchy, &loaded.unit);
    if let Ok(report) = &outcome {
        debug!(profile = ?report.profile, "execution ceilings");
    }
    if let Err(failure) = &outcome {
        if !cli.quiet {
            eprintln!("rejected: {failure}");
            for location in &failure.trail {
                eprintln!("  reached from {location}");
            }
        }
    }

    let sarif = build_sarif(&outcome, loaded.artifacts, build_invocation());
    let mut writer = output_writer(cli.output.as_deref())?;
    serde_json::to_writer_pretty(&mut writer, &sarif)
        .context("failed to serialize SARIF output")?;
    writer
        .write_all(b"\n")
        .context("failed to write SARIF output")?;

    if cli.timing && !cli.quiet {
        let references = outcome.as_ref().map_or(0, |report| report.reference_count());
        eprintln!(
            "timing: total_ms={} classes={} unit={} references={}",
            started_at.elapsed().as_millis(),
            class_count,
            loaded.unit.len(),
            references
        );
    }
    info!(rejected = outcome.is_err(), "done");

    Ok(())
}

fn load_configuration(cli: &Cli) -> Result<AnalysisConfiguration> {
    let mut configuration = match &cli.config {
        Some(path) => AnalysisConfiguration::from_path(path)?,
        None => AnalysisConfiguration::default(),
    };
    configuration.policy.allow_list.extend(cli.allow.iter().cloned());
    configuration.derive_annotation_references |= cli.derive_annotations;
    Ok(configuration)
}

fn output_writer(output: Option<&Path>) -> Result<Box<dyn Write>> {
    match output {
        Some(path) if path == Path::new("-") => Ok(Box::new(io::stdout())),
        Some(path) => Ok(Box::new(
            File::create(path).with_context(|| format!("failed to open {}", path.display()))?,
        )),
        None => Ok(Box::new(io::stdout())),
    }
}

fn build_invocation() -> Invocation {
    let arguments: Vec<String> = std::env::args().collect();
    let command_line = arguments.join(" ");

    Invocation::builder()
        .execution_successful(true)
        .arguments(arguments)
        .command_line(command_line)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn flags_extend_configuration_file() {
        let dir = tempdir().expect("create temp dir");
        let config = dir.path().join("config.json");
        fs::write(&config, r#"{"allow_list": ["java/lang/Math"]}"#).expect("write config");
        let config_arg = config.to_string_lossy().to_string();

        let cli = Cli::try_parse_from([
            "detguard",
            "--input",
            "app.json",
            "--config",
            config_arg.as_str(),
            "--allow",
            "java/time/*",
            "--derive-annotations",
            "-vv",
        ])
        .expect("parse arguments");
        let configuration = load_configuration(&cli).expect("load configuration");

        assert_eq!(vec!["java/lang/Math", "java/time/*"], configuration.policy.allow_list);
        assert!(configuration.derive_annotation_references);
        assert_eq!(2, cli.log.verbose);
    }

    #[test]
    fn run_writes_sarif_with_rejection() {
        let dir = tempdir().expect("create temp dir");
        let input = dir.path().join("app.json");
        let output = dir.path().join("out.sarif");
        fs::write(
            &input,
            r#"{"classes": [{
                "name": "com/example/App",
                "members": [{
                    "name": "roll",
                    "signature": "()I",
                    "body": [{"op": "type", "line": 3, "name": "java/util/Random"}]
                }]
            }]}"#,
        )
        .expect("write input");
        let input_arg = input.to_string_lossy().to_string();
        let output_arg = output.to_string_lossy().to_string();
        let cli = Cli::try_parse_from([
            "detguard",
            "--input",
            input_arg.as_str(),
            "--output",
            output_arg.as_str(),
            "--quiet",
        ])
        .expect("parse arguments");

        run(cli).expect("run analysis");

        let sarif: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&output).expect("read output"))
                .expect("parse SARIF");
        let result = &sarif["runs"][0]["results"][0];
        assert_eq!(result["ruleId"], "NOT_ALLOW_LISTED");
        assert_eq!(
            result["locations"][0]["logicalLocations"][0]["name"],
            "com/example/App.roll()I"
        );
        assert_eq!(
            sarif["runs"][0]["artifacts"][0]["location"]["uri"],
            input_arg.as_str()
        );
    }

    #[test]
    fn missing_input_fails_before_analysis() {
        let cli = Cli::try_parse_from(["detguard", "--input", "/nonexistent/app.json"])
            .expect("parse arguments");

        let error = run(cli).expect_err("missing input");

        assert!(error.to_string().contains("input not found"));
    }
}
