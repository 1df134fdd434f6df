use std::io::{self, BufRead, Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use pdx_smoosh::diff::{self, DifferenceKind};
use pdx_smoosh::error::SyntaxError;
use pdx_smoosh::merge::Conflict;
use pdx_smoosh::{
    builder, normalize, parser, serialize, store, KeepMaster, PreferCandidate, Resolution, ResolutionSurface,
    SmooshOptions, Smoosher,
};

/// Merge Paradox script mods into a single mod
#[derive(Parser, Debug)]
#[command(name = "smoosh")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Merge every mod in SOURCE_DIR into SOURCE_DIR/TARGET_MOD
    Run {
        /// Directory holding the .mod descriptors
        source_dir: PathBuf,
        /// Name of the mod to create
        target_mod: String,
        /// Empty the target mod first if it already has files
        #[arg(long)]
        clean: bool,
        /// How conflicting keys are resolved
        #[arg(long, value_enum, default_value = "prompt", env = "SMOOSH_RESOLVE")]
        resolve: ResolveMode,
    },
    /// Compare two script files
    Diff {
        original: PathBuf,
        candidate: PathBuf,
        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },
    /// Print a script file (or stdin) in canonical form
    Fmt { file: Option<PathBuf> },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ResolveMode {
    /// Ask on the terminal for every conflict
    Prompt,
    /// Keep what the first mod wrote
    Master,
    /// Let later mods win
    Candidate,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(EnvFilter::from_default_env().add_directive("pdx_smoosh=info".parse()?))
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run {
            source_dir,
            target_mod,
            clean,
            resolve,
        } => {
            let options = SmooshOptions {
                source_dir,
                target_mod,
                clean,
            };
            match resolve {
                ResolveMode::Prompt => run(options, PromptResolver::new()),
                ResolveMode::Master => run(options, KeepMaster),
                ResolveMode::Candidate => run(options, PreferCandidate),
            }
        }
        Commands::Diff {
            original,
            candidate,
            format,
        } => diff_files(&original, &candidate, format),
        Commands::Fmt { file } => fmt(file.as_deref()),
    }
}

fn run<R: ResolutionSurface>(options: SmooshOptions, resolver: R) -> Result<()> {
    let summary = Smoosher::new(options, resolver).run()?;
    if summary.failed > 0 || summary.skipped_mods > 0 {
        eprintln!(
            "{} file(s) and {} mod(s) were skipped, see the log above",
            summary.failed, summary.skipped_mods
        );
    }
    Ok(())
}

fn load(path: &Path) -> Result<pdx_smoosh::tree::Document> {
    let text = store::load_text(path).with_context(|| format!("reading {}", path.display()))?;
    let name = path.display().to_string();
    pdx_smoosh::parse_document(&text, &name, &name)?
        .with_context(|| format!("{} has no content", path.display()))
}

fn diff_files(original: &Path, candidate: &Path, format: OutputFormat) -> Result<()> {
    let left = load(original)?;
    let right = load(candidate)?;
    let record = diff::compare(&left, &right);

    match format {
        OutputFormat::Json => {
            let report = serde_json::json!({
                "original": original.display().to_string(),
                "candidate": candidate.display().to_string(),
                "conflicts": record.conflict_count(),
                "record": record,
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        OutputFormat::Text => {
            for d in record.differences() {
                let marker = match d.kind {
                    DifferenceKind::Addition => '+',
                    DifferenceKind::Deletion => '-',
                    DifferenceKind::Change => '~',
                };
                let mut path: Vec<&str> = d
                    .original
                    .as_ref()
                    .or(d.candidate.as_ref())
                    .map(|side| side.path.iter().map(String::as_str).collect())
                    .unwrap_or_default();
                path.push(&d.key);
                let left = d.original.as_ref().and_then(|s| s.value.as_deref()).unwrap_or("");
                let right = d.candidate.as_ref().and_then(|s| s.value.as_deref()).unwrap_or("");
                println!("{} {} {} {}", marker, path.join("."), left, right);
            }
            println!("{}", record.summary());
        }
    }
    Ok(())
}

fn fmt(file: Option<&Path>) -> Result<()> {
    let (input, name) = match file {
        Some(path) => (store::load_text(path)?, path.display().to_string()),
        None => {
            let mut input = String::new();
            io::stdin().read_to_string(&mut input)?;
            (input, "<stdin>".to_string())
        }
    };

    let Some(normalized) = normalize::normalize(&input) else {
        return Ok(());
    };
    let groups = match parser::parse(&normalized) {
        Ok(groups) => groups,
        Err(err) => {
            report_syntax_error(&normalized, &err);
            std::process::exit(1);
        }
    };
    let doc = builder::build(&groups, &name, "")?;
    serialize::write_to(&doc, io::stdout().lock())?;
    Ok(())
}

/// Print the offending line with the error span underlined.
fn report_syntax_error(text: &str, err: &SyntaxError) {
    let lines: Vec<&str> = text.lines().collect();
    let line_text = lines.get(err.begin.line).unwrap_or(&"");

    eprintln!("ERROR AT LINE {}:", err.begin.line + 1);
    eprintln!("{}", line_text);

    let start_col = err.begin.column;
    let line_len = line_text.chars().count();
    let end_col = if err.begin.line == err.end.line && err.end.column > err.begin.column {
        err.end.column
    } else if start_col < line_len {
        // Point error or multi-line span: underline to end of line
        line_len
    } else {
        start_col + 1
    };

    let mut underline = " ".repeat(start_col);
    underline.push('^');
    if end_col > start_col + 1 {
        underline.push_str(&"_".repeat(end_col - start_col - 1));
    }

    eprintln!("{}", underline);
    eprintln!("{}", err.message());
    eprintln!();
}

/// Terminal resolution: both sides are printed and the user picks one or
/// types a replacement.
struct PromptResolver {
    input: io::StdinLock<'static>,
}

impl PromptResolver {
    fn new() -> Self {
        PromptResolver {
            input: io::stdin().lock(),
        }
    }

    fn read_line(&mut self) -> io::Result<Option<String>> {
        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim_end_matches(|c: char| c == '\r' || c == '\n').to_string()))
    }

    /// Lines up to one holding a single `.`.
    fn read_block(&mut self) -> io::Result<String> {
        let mut text = String::new();
        while let Some(line) = self.read_line()? {
            if line == "." {
                break;
            }
            text.push_str(&line);
            text.push('\n');
        }
        Ok(text)
    }
}

impl ResolutionSurface for PromptResolver {
    fn resolve(&mut self, conflict: &Conflict) -> pdx_smoosh::error::Result<Resolution> {
        let mut out = io::stdout().lock();
        writeln!(out, "=== Conflict on '{}' ===", conflict.key)?;
        writeln!(
            out,
            "--- original [{}] from {}",
            conflict.original.entry_type, conflict.original.source
        )?;
        write!(out, "{}", conflict.original.text)?;
        writeln!(
            out,
            "--- candidate [{}] from {}",
            conflict.candidate.entry_type, conflict.candidate.source
        )?;
        write!(out, "{}", conflict.candidate.text)?;

        loop {
            write!(out, "keep [o]riginal, take [c]andidate, or [e]dit? ")?;
            out.flush()?;
            // End of input keeps the master untouched.
            let Some(answer) = self.read_line()? else {
                return Ok(Resolution::UseOriginal);
            };
            match answer.trim() {
                "o" => return Ok(Resolution::UseOriginal),
                "c" => return Ok(Resolution::UseCandidate),
                "e" => {
                    writeln!(out, "Enter the resolved text, end with a line holding only '.':")?;
                    out.flush()?;
                    return Ok(Resolution::Custom(self.read_block()?));
                }
                _ => continue,
            }
        }
    }
}
