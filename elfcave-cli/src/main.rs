use std::fmt;
use std::path::PathBuf;

use anyhow::{anyhow, Context};
use clap::Parser;
use colored::Colorize;
use elfcave_core::{
    determine_class, find_largest_zero_run, is_elf, AllocConfig, ElfClass, ElfView, InspectError,
    MappedBuffer, DEFAULT_ALLOC_TRIES,
};

mod report;

use report::Report;

/// ELF code-cave finder
#[derive(Parser)]
#[command(
    name = "elfcave",
    about = "Map an ELF64 binary, locate its header tables and find its largest code cave",
    version,
    author
)]
struct Cli {
    /// Path to binary file
    #[arg(required = true)]
    path: PathBuf,

    /// Inspect a private heap copy instead of a shared mapping
    #[arg(long)]
    copy: bool,

    /// Allocation attempts for the heap copy
    #[arg(long, value_name = "N", default_value_t = DEFAULT_ALLOC_TRIES)]
    alloc_tries: u32,

    /// Unmap without flushing the mapping back to the file
    #[arg(long)]
    no_sync: bool,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,
}

/// Inspection stage a failure belongs to. Each has its own exit status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Arguments,
    Map,
    NotRegularFile,
    NotElf,
    UnsupportedClass,
    Header,
    Cave,
    Cleanup,
}

impl Stage {
    fn status(self) -> i32 {
        match self {
            Stage::Arguments => -1,
            Stage::Map => -2,
            Stage::NotRegularFile => -3,
            Stage::NotElf => -4,
            Stage::UnsupportedClass => -5,
            Stage::Header => -6,
            Stage::Cave => -7,
            Stage::Cleanup => -8,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Arguments => "usage",
            Stage::Map => "map",
            Stage::NotRegularFile => "file type",
            Stage::NotElf => "format",
            Stage::UnsupportedClass => "class",
            Stage::Header => "headers",
            Stage::Cave => "code cave",
            Stage::Cleanup => "cleanup",
        };
        write!(f, "{}", name)
    }
}

struct Failure {
    stage: Stage,
    error: anyhow::Error,
}

impl Failure {
    fn new(stage: Stage, error: impl Into<anyhow::Error>) -> Self {
        Self {
            stage,
            error: error.into(),
        }
    }

    fn report(&self) {
        eprintln!(
            "{} {:#}",
            format!("error[{}]:", self.stage).red().bold(),
            self.error
        );
    }
}

fn main() {
    env_logger::init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            if err.use_stderr() {
                std::process::exit(Stage::Arguments.status());
            }
            return;
        }
    };

    let status = match run(&cli) {
        Ok(()) => 0,
        Err(failure) => {
            failure.report();
            failure.stage.status()
        }
    };
    std::process::exit(status);
}

fn run(cli: &Cli) -> Result<(), Failure> {
    let config = AllocConfig {
        max_tries: cli.alloc_tries,
    };
    let opened = if cli.copy {
        MappedBuffer::read_file(&cli.path, &config)
    } else {
        MappedBuffer::open_and_map(&cli.path)
    };
    let buffer = opened.map_err(|e| {
        let stage = match e {
            InspectError::NotRegularFile { .. } => Stage::NotRegularFile,
            _ => Stage::Map,
        };
        Failure::new(stage, e)
    })?;

    let mut report = Report::new(&cli.path, &buffer);
    let failure = inspect(&buffer, &mut report);

    if let Err(e) = report.print(cli.json) {
        log::error!("unable to print report: {e:#}");
    }

    let cleanup = release(buffer, !cli.no_sync)
        .with_context(|| format!("unable to release '{}'", cli.path.display()))
        .map_err(|e| Failure::new(Stage::Cleanup, e));

    match (failure, cleanup) {
        (Some(failure), Err(cleanup)) => {
            cleanup.report();
            Err(failure)
        }
        (Some(failure), Ok(())) => Err(failure),
        (None, cleanup) => cleanup,
    }
}

/// Runs every stage against the buffer, recording what it learns in `report`.
///
/// The cave scan does not depend on the headers and always runs; the first
/// failing stage is returned.
fn inspect(buffer: &MappedBuffer, report: &mut Report) -> Option<Failure> {
    let mut failure = None;

    if !is_elf(buffer) {
        failure = Some(Failure::new(
            Stage::NotElf,
            anyhow!("'{}' does not appear to be an ELF file", report.path),
        ));
    } else {
        match determine_class(buffer) {
            Ok(ElfClass::SixtyFourBit) => {
                report.class = Some(ElfClass::SixtyFourBit.to_string());
                match ElfView::resolve(buffer) {
                    Ok(view) => report.record_headers(&view),
                    Err(e) => failure = Some(Failure::new(Stage::Header, e)),
                }
            }
            Ok(class) => {
                report.class = Some(class.to_string());
                failure = Some(Failure::new(
                    Stage::UnsupportedClass,
                    anyhow!("This ELF binary class ({class}) is not supported"),
                ));
            }
            Err(e @ InspectError::UnsupportedClass(_)) => {
                failure = Some(Failure::new(
                    Stage::UnsupportedClass,
                    anyhow::Error::new(e).context("This ELF binary class is not supported"),
                ));
            }
            Err(e) => failure = Some(Failure::new(Stage::NotElf, e)),
        }
    }

    let cave = find_largest_zero_run(buffer);
    match cave.offset() {
        Some(offset) => report.record_cave(buffer, offset, cave.len()),
        None => {
            failure.get_or_insert_with(|| {
                Failure::new(Stage::Cave, anyhow!("no code cave found in '{}'", report.path))
            });
        }
    }

    failure
}

fn release(mut buffer: MappedBuffer, sync: bool) -> elfcave_core::Result<()> {
    if buffer.is_mapped() {
        buffer.unmap(sync)?;
    }
    buffer.release()
}
