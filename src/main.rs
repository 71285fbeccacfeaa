//! Command-line entry point: load a grammar and a corpus, run EM, print or
//! save the re-estimated grammar.

use anyhow::{Context, Result};
use clap::Parser;
use pcfg_em::{EmTrainer, Grammar, Signature};
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about = "Re-estimate PCFG rule probabilities with the Inside-Outside algorithm", long_about = None)]
struct Cli {
    /// Path to the grammar file (CNF, one rule per line)
    #[arg(short, long)]
    grammar: PathBuf,

    /// Path to the training corpus (one sentence per line)
    #[arg(short, long)]
    corpus: PathBuf,

    /// Write the re-estimated grammar to this path
    #[arg(short, long)]
    save: Option<PathBuf>,

    /// Print the re-estimated grammar to stdout
    #[arg(short, long)]
    out: bool,

    /// Number of training iterations
    #[arg(short, long, default_value_t = 3, conflicts_with = "threshold")]
    iterations: usize,

    /// Train until the per-iteration delta falls to this value
    #[arg(short, long)]
    threshold: Option<f64>,

    /// Verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    env_logger::Builder::from_default_env()
        .filter_level(level)
        .init();

    let mut signature = Signature::new();

    let grammar_file = File::open(&cli.grammar)
        .with_context(|| format!("cannot open grammar file {}", cli.grammar.display()))?;
    let grammar = Grammar::from_reader(BufReader::new(grammar_file), &mut signature)
        .with_context(|| format!("cannot load grammar from {}", cli.grammar.display()))?;
    log::debug!("loaded grammar:\n{}", grammar.display(&signature));

    let corpus_file = File::open(&cli.corpus)
        .with_context(|| format!("cannot open corpus file {}", cli.corpus.display()))?;
    let mut trainer = EmTrainer::new(grammar, BufReader::new(corpus_file), &signature)
        .with_context(|| format!("cannot read corpus from {}", cli.corpus.display()))?;

    let report = match cli.threshold {
        Some(threshold) => trainer.train_to_threshold(threshold),
        None => trainer.train(cli.iterations),
    };
    if report.aborted {
        log::warn!("training aborted: no usable sentence in the corpus");
    } else {
        log::info!(
            "training finished after {} iterations (delta {:.6e})",
            report.iterations,
            report.delta
        );
    }

    let grammar = trainer.into_grammar();

    if cli.out {
        let stdout = io::stdout();
        let mut handle = stdout.lock();
        grammar.write_to(&signature, &mut handle)?;
        handle.flush()?;
    }

    if let Some(path) = &cli.save {
        let file = File::create(path)
            .with_context(|| format!("cannot write grammar to {}", path.display()))?;
        let mut writer = BufWriter::new(file);
        grammar.write_to(&signature, &mut writer)?;
        writer.flush()?;
    }

    Ok(())
}
