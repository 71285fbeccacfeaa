//! Expectation-maximization training loop.
//!
//! Each iteration runs the E-step over every valid corpus sentence,
//! accumulating expected nonterminal and rule counts from inside/outside
//! values, then the M-step rewrites every rule probability as its normalized
//! expected share. The grammar is read-only during an iteration and mutated
//! only between iterations.

use crate::cache::{InsideOutsideCache, MAX_SENTENCE_LEN};
use crate::grammar::Grammar;
use crate::inside_outside::InsideOutsideCalculator;
use crate::signature::{Signature, Symbol};
use log::{debug, info, warn};
use rustc_hash::FxHashMap;
use std::io::{self, BufRead};
use thiserror::Error;

/// Errors from corpus ingestion.
#[derive(Error, Debug)]
pub enum TrainError {
    #[error("i/o error reading corpus: {0}")]
    Io(#[from] io::Error),
}

/// One corpus sentence: interned tokens plus a validity flag. Invalid
/// sentences (unresolvable token, over-long) are kept but never trained on.
#[derive(Clone, Debug)]
pub struct Sentence {
    pub tokens: Vec<Symbol>,
    pub valid: bool,
}

/// Knobs for a training run.
#[derive(Clone, Debug)]
pub struct TrainerConfig {
    /// Prune zero-probability rules after the first iteration. The first
    /// pass is what drives dead rules' expected counts to 0; pruning then
    /// shrinks every later iteration without changing any value.
    pub prune_after_first: bool,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        TrainerConfig { prune_after_first: true }
    }
}

/// Outcome of a training run.
#[derive(Clone, Debug, PartialEq)]
pub struct TrainingReport {
    /// Iterations actually run.
    pub iterations: usize,
    /// Delta (summed absolute probability change) of the last iteration.
    pub delta: f64,
    /// True when no valid sentence contributed and the grammar was left
    /// untouched.
    pub aborted: bool,
}

/// Re-estimates a grammar's rule probabilities from a raw-text corpus.
pub struct EmTrainer {
    grammar: Grammar,
    sentences: Vec<Sentence>,
    config: TrainerConfig,
    iterations_done: usize,
}

impl EmTrainer {
    /// Read the corpus (one sentence per line, tab/space tokens) and bind it
    /// to the grammar. Tokens are resolved against the signature without
    /// interning; an unknown token invalidates its sentence.
    pub fn new<R: BufRead>(
        grammar: Grammar,
        corpus: R,
        signature: &Signature,
    ) -> Result<Self, TrainError> {
        Self::with_config(grammar, corpus, signature, TrainerConfig::default())
    }

    pub fn with_config<R: BufRead>(
        grammar: Grammar,
        corpus: R,
        signature: &Signature,
        config: TrainerConfig,
    ) -> Result<Self, TrainError> {
        let mut sentences = Vec::new();

        for (line_no, line) in corpus.lines().enumerate() {
            let line = line?;
            let raw: Vec<&str> = line.split(['\t', ' ']).filter(|t| !t.is_empty()).collect();
            if raw.is_empty() {
                continue;
            }

            let mut tokens = Vec::with_capacity(raw.len());
            let mut valid = true;
            for word in &raw {
                match signature.lookup(word) {
                    Some(sym) if grammar.in_vocabulary(sym) && !grammar.is_nonterminal(sym) => {
                        tokens.push(sym)
                    }
                    _ => {
                        info!(
                            "sentence in line {} ignored, token '{}' cannot be resolved",
                            line_no + 1,
                            word
                        );
                        valid = false;
                        break;
                    }
                }
            }
            if tokens.len() > MAX_SENTENCE_LEN {
                warn!(
                    "sentence in line {} ignored, longer than {} tokens",
                    line_no + 1,
                    MAX_SENTENCE_LEN
                );
                valid = false;
            }

            sentences.push(Sentence { tokens, valid });
        }

        let valid_count = sentences.iter().filter(|s| s.valid).count();
        info!(
            "read {} sentences ({} usable for training)",
            sentences.len(),
            valid_count
        );

        Ok(EmTrainer { grammar, sentences, config, iterations_done: 0 })
    }

    /// The grammar in its current training state.
    pub fn grammar(&self) -> &Grammar {
        &self.grammar
    }

    /// Give the trained grammar back to the caller.
    pub fn into_grammar(self) -> Grammar {
        self.grammar
    }

    /// The ingested corpus.
    pub fn sentences(&self) -> &[Sentence] {
        &self.sentences
    }

    /// Run exactly `n` iterations.
    pub fn train(&mut self, n: usize) -> TrainingReport {
        let mut report = TrainingReport { iterations: 0, delta: 0.0, aborted: false };
        for _ in 0..n {
            report = self.step();
            if report.aborted {
                break;
            }
        }
        report
    }

    /// Run until the per-iteration delta falls to `threshold` or below.
    /// Callers pass a positive threshold; there is no iteration cap.
    pub fn train_to_threshold(&mut self, threshold: f64) -> TrainingReport {
        loop {
            let report = self.step();
            if report.aborted || report.delta <= threshold {
                return report;
            }
        }
    }

    fn step(&mut self) -> TrainingReport {
        let (delta, contributed) = self.run_iteration();
        self.iterations_done += 1;
        let aborted = contributed == 0;
        if self.config.prune_after_first && self.iterations_done == 1 && !aborted {
            self.grammar.clean_grammar();
        }
        TrainingReport { iterations: self.iterations_done, delta, aborted }
    }

    /// One E-step over the corpus followed by one M-step over the grammar.
    /// Returns the summed absolute probability change across all rules.
    pub fn train_iteration(&mut self) -> f64 {
        self.run_iteration().0
    }

    fn run_iteration(&mut self) -> (f64, usize) {
        // Expected counts, keyed by nonterminal and by rule arena index.
        let mut exp_symbol: FxHashMap<Symbol, f64> = FxHashMap::default();
        let mut exp_rule: FxHashMap<usize, f64> = FxHashMap::default();
        let mut contributed = 0usize;

        for sentence in self.sentences.iter().filter(|s| s.valid) {
            let len = sentence.tokens.len();
            let mut cache = InsideOutsideCache::new();
            let mut calc =
                InsideOutsideCalculator::new(&self.grammar, &sentence.tokens, &mut cache);

            // Pi: the likelihood of the whole sentence under the current
            // model. An unparseable sentence contributes nothing.
            let pi = calc.sentence_prob();
            if pi == 0.0 {
                debug!("sentence has zero probability under the current grammar, skipped");
                continue;
            }
            contributed += 1;

            // Expected occurrence count of each nonterminal: sum of the
            // posterior span marginals alpha * beta / pi.
            for &nt in self.grammar.nonterminals() {
                let mut score = 0.0;
                for p in 0..len {
                    for q in p..len {
                        score += calc.outside(nt, p, q) * calc.inside(nt, p, q);
                    }
                }
                if score != 0.0 {
                    *exp_symbol.entry(nt).or_insert(0.0) += score / pi;
                }
            }

            // Expected application count of each rule.
            for (idx, rule) in self.grammar.rules().iter().enumerate() {
                let score = match rule.arity() {
                    2 => {
                        let (left, right) = (rule.rhs[0], rule.rhs[1]);
                        let mut score = 0.0;
                        for p in 0..len {
                            for q in p + 1..len {
                                let alpha = calc.outside(rule.lhs, p, q);
                                if alpha == 0.0 {
                                    continue;
                                }
                                let mut inner = 0.0;
                                for d in p..q {
                                    inner += calc.inside(left, p, d)
                                        * calc.inside(right, d + 1, q);
                                }
                                score += rule.prob * alpha * inner;
                            }
                        }
                        score
                    }
                    _ => {
                        let terminal = rule.rhs[0];
                        let mut score = 0.0;
                        for h in 0..len {
                            if sentence.tokens[h] == terminal {
                                score += calc.outside(rule.lhs, h, h)
                                    * calc.inside(rule.lhs, h, h);
                            }
                        }
                        score
                    }
                };
                if score != 0.0 {
                    *exp_rule.entry(idx).or_insert(0.0) += score / pi;
                }
            }
        }

        if contributed == 0 {
            warn!("no sentence contributed to this iteration, grammar left unchanged");
            return (0.0, 0);
        }

        // M-step: each rule's new probability is its share of its LHS's
        // expected count.
        let mut delta = 0.0;
        for idx in 0..self.grammar.len() {
            let rule = self.grammar.rule(idx);
            let old = rule.prob;
            let symbol_expectation = exp_symbol.get(&rule.lhs).copied().unwrap_or(0.0);
            let new = if symbol_expectation > 0.0 {
                exp_rule.get(&idx).copied().unwrap_or(0.0) / symbol_expectation
            } else {
                0.0
            };
            delta += (old - new).abs();
            self.grammar.set_rule_prob(idx, new);
        }

        info!(
            "iteration {}: delta {:.6e}, {} rules, {}/{} sentences contributed",
            self.iterations_done + 1,
            delta,
            self.grammar.len(),
            contributed,
            self.sentences.iter().filter(|s| s.valid).count()
        );
        (delta, contributed)
    }
}
