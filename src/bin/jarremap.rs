//! Remaps jars with MCP mappings from the command line.

use std::error::Error;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use crossbeam_channel::Receiver;
use jarremap::{Direction, MappingSyntax, ProgressEvent, RunReport, RunRequest, Side};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "jarremap", version)]
#[command(about = "Renames classes, fields and methods in jars using MCP mappings")]
struct Args {
    /// JSON run request, replaces the other options
    #[arg(long, conflicts_with_all = ["input", "output", "mcp_dir", "classpath"])]
    config: Option<PathBuf>,

    /// Input jar, zip or class directory, may be repeated
    #[arg(short, long, required_unless_present = "config")]
    input: Vec<PathBuf>,

    /// Output jar
    #[arg(short, long, required_unless_present = "config")]
    output: Option<PathBuf>,

    /// MCP directory or its conf directory
    #[arg(long, required_unless_present = "config")]
    mcp_dir: Option<PathBuf>,

    /// client, server, universal or universal_old
    #[arg(long, default_value = "universal")]
    side: Side,

    /// deobfuscate or reobfuscate
    #[arg(long, default_value = "deobfuscate")]
    direction: Direction,

    /// Classpath entry used to resolve inherited members, may be repeated.
    /// Defaults to the side's jars in the MCP directory.
    #[arg(long)]
    classpath: Vec<PathBuf>,

    /// Mapping line grammar: srg or columns
    #[arg(long, default_value = "srg", value_parser = parse_syntax)]
    syntax: MappingSyntax,

    /// Number of rewriting threads
    #[arg(long)]
    threads: Option<usize>,

    /// Print the run report as JSON
    #[arg(long)]
    json: bool,
}

fn parse_syntax(s: &str) -> Result<MappingSyntax, String> {
    match s {
        "srg" => Ok(MappingSyntax::Srg),
        "columns" => Ok(MappingSyntax::Columns),
        other => Err(format!("unknown mapping syntax `{other}`")),
    }
}

impl Args {
    fn request(&self) -> Result<RunRequest, Box<dyn Error>> {
        if let Some(config) = &self.config {
            return Ok(RunRequest::from_json_file(config)?);
        }
        let (Some(output), Some(mapping_dir)) = (&self.output, &self.mcp_dir) else {
            return Err("--output and --mcp-dir are required without --config".into());
        };
        Ok(RunRequest {
            inputs: self.input.clone(),
            output: output.clone(),
            mapping_dir: mapping_dir.clone(),
            side: self.side,
            direction: self.direction,
            classpath: self.classpath.clone(),
            syntax: self.syntax,
            threads: self.threads,
        })
    }
}

fn print_progress(receiver: Receiver<ProgressEvent>) {
    let mut stderr = io::stderr().lock();
    let mut max = 0;
    let mut label = String::new();
    for event in receiver {
        match event {
            ProgressEvent::Start { max: new_max, label: new_label } => {
                max = new_max;
                label = new_label;
            }
            ProgressEvent::Set(processed) => {
                let _ = write!(stderr, "\r{label} {processed}/{max}");
            }
        }
    }
    if max > 0 {
        let _ = writeln!(stderr);
    }
}

fn print_report(report: &RunReport, json: bool) -> Result<(), Box<dyn Error>> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }
    println!(
        "wrote {}: {} classes remapped, {} files copied",
        report.output.display(),
        report.units,
        report.copied
    );
    for failure in &report.failures {
        println!("  failed {}: {}", failure.entry, failure.reason);
    }
    Ok(())
}

fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();
    let request = match args.request() {
        Ok(request) => request,
        Err(err) => {
            eprintln!("error: {err}");
            return ExitCode::FAILURE;
        }
    };

    let (sender, receiver) = crossbeam_channel::bounded(256);
    let handle = jarremap::spawn_run(request, sender);
    print_progress(receiver);

    match handle.join() {
        Ok(report) => {
            if let Err(err) = print_report(&report, args.json) {
                eprintln!("error: {err}");
                return ExitCode::FAILURE;
            }
            if report.is_clean() {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(2)
            }
        }
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}
