//! PCFG storage, indexing and validation.
//!
//! Rules live in one sorted `Vec<Rule>` arena. Every index stores integer
//! handles into that arena:
//!
//! - `lhs_index`: nonterminal -> contiguous half-open range of rules
//! - `first_rhs_index` / `second_rhs_index`: nonterminal -> binary rules
//!   having it as the first / second child
//!
//! Indices are rebuilt only at well-defined points (load, pruning), never
//! while a training iteration is reading the grammar.

use crate::rule::Rule;
use crate::signature::{Signature, Symbol};
use log::{info, warn};
use rustc_hash::{FxHashMap, FxHashSet};
use std::fmt;
use std::io::{self, BufRead, Write};
use std::ops::Range;
use thiserror::Error;

/// Absolute tolerance for the stochasticity check.
pub const STOCHASTIC_EPS: f64 = 1e-6;

/// Errors from loading or validating a grammar.
#[derive(Error, Debug)]
pub enum GrammarError {
    #[error("i/o error reading grammar: {0}")]
    Io(#[from] io::Error),
    #[error("grammar has no start symbol line")]
    MissingStartSymbol,
    #[error("start symbol line '{0}' is not a single symbol")]
    InvalidStartSymbol(String),
    #[error("grammar has no rules")]
    Empty,
    #[error("start symbol '{0}' has no rules")]
    StartNotNonterminal(String),
    #[error("rule '{0}' violates CNF")]
    NotCnf(String),
}

/// A probabilistic context-free grammar in Chomsky Normal Form.
#[derive(Clone, Debug)]
pub struct Grammar {
    start: Symbol,
    rules: Vec<Rule>,
    nonterminals: FxHashSet<Symbol>,
    vocabulary: FxHashSet<Symbol>,
    lhs_index: FxHashMap<Symbol, Range<usize>>,
    first_rhs_index: FxHashMap<Symbol, Vec<usize>>,
    second_rhs_index: FxHashMap<Symbol, Vec<usize>>,
}

impl Grammar {
    /// Read a grammar from a text stream.
    ///
    /// The first non-blank, non-`#` line is the start symbol; every further
    /// non-blank, non-`#` line is a rule. Lines that fail to parse are logged
    /// and skipped. After reading, the grammar is sorted, indexed, checked
    /// for CNF and normalized.
    pub fn from_reader<R: BufRead>(
        reader: R,
        signature: &mut Signature,
    ) -> Result<Grammar, GrammarError> {
        let mut start = None;
        let mut rules = Vec::new();

        for (line_no, line) in reader.lines().enumerate() {
            let line = line?;
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }

            if start.is_none() {
                if trimmed.split(['\t', ' ']).filter(|t| !t.is_empty()).count() != 1 {
                    return Err(GrammarError::InvalidStartSymbol(trimmed.to_string()));
                }
                start = Some(signature.intern(trimmed));
                continue;
            }

            match Rule::parse(trimmed, signature) {
                Ok(rule) => rules.push(rule),
                Err(e) => warn!("line {}: rule ignored: {}", line_no + 1, e),
            }
        }

        let start = start.ok_or(GrammarError::MissingStartSymbol)?;
        if rules.is_empty() {
            return Err(GrammarError::Empty);
        }

        let mut grammar = Grammar {
            start,
            rules,
            nonterminals: FxHashSet::default(),
            vocabulary: FxHashSet::default(),
            lhs_index: FxHashMap::default(),
            first_rhs_index: FxHashMap::default(),
            second_rhs_index: FxHashMap::default(),
        };
        grammar.rebuild();

        if !grammar.lhs_index.contains_key(&start) {
            return Err(GrammarError::StartNotNonterminal(
                signature.resolve_id(start).to_string(),
            ));
        }
        grammar.check_cnf(signature)?;
        grammar.normalize_probabilities(signature);
        info!(
            "loaded grammar: {} rules, {} nonterminals, start '{}'",
            grammar.rules.len(),
            grammar.nonterminals.len(),
            signature.resolve_id(start)
        );
        Ok(grammar)
    }

    /// The designated start symbol.
    pub fn start_symbol(&self) -> Symbol {
        self.start
    }

    /// All rules, in canonical order.
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// A rule by its arena index.
    pub fn rule(&self, idx: usize) -> &Rule {
        &self.rules[idx]
    }

    /// Overwrite a rule's probability. Only the trainer's M-step calls this,
    /// strictly between iterations.
    pub fn set_rule_prob(&mut self, idx: usize, prob: f64) {
        self.rules[idx].prob = prob;
    }

    /// The set of nonterminals (symbols appearing as an LHS).
    pub fn nonterminals(&self) -> &FxHashSet<Symbol> {
        &self.nonterminals
    }

    pub fn is_nonterminal(&self, sym: Symbol) -> bool {
        self.nonterminals.contains(&sym)
    }

    /// Whether the symbol appears anywhere in the rules.
    pub fn in_vocabulary(&self, sym: Symbol) -> bool {
        self.vocabulary.contains(&sym)
    }

    /// All rules expanding `lhs`, as one contiguous slice.
    pub fn rules_for(&self, lhs: Symbol) -> &[Rule] {
        match self.lhs_index.get(&lhs) {
            Some(range) => &self.rules[range.clone()],
            None => &[],
        }
    }

    /// Arena indices of the rules expanding `lhs`.
    pub fn rule_indices_for(&self, lhs: Symbol) -> Range<usize> {
        self.lhs_index.get(&lhs).cloned().unwrap_or(0..0)
    }

    /// Arena indices of binary rules with `sym` as the first RHS child.
    pub fn rules_with_first(&self, sym: Symbol) -> &[usize] {
        self.first_rhs_index.get(&sym).map(|v| v.as_slice()).unwrap_or(&[])
    }

    /// Arena indices of binary rules with `sym` as the second RHS child.
    pub fn rules_with_second(&self, sym: Symbol) -> &[usize] {
        self.second_rhs_index.get(&sym).map(|v| v.as_slice()).unwrap_or(&[])
    }

    /// Sort the rules canonically and rebuild every index and symbol set.
    fn rebuild(&mut self) {
        self.rules.sort();

        self.nonterminals.clear();
        self.vocabulary.clear();
        for rule in &self.rules {
            self.nonterminals.insert(rule.lhs);
            self.vocabulary.insert(rule.lhs);
            self.vocabulary.extend(rule.rhs.iter().copied());
        }
        // The start symbol is a nonterminal by definition, rules or not.
        self.nonterminals.insert(self.start);
        self.vocabulary.insert(self.start);

        self.lhs_index.clear();
        let mut run_start = 0;
        for i in 1..=self.rules.len() {
            if i == self.rules.len() || self.rules[i].lhs != self.rules[run_start].lhs {
                self.lhs_index.insert(self.rules[run_start].lhs, run_start..i);
                run_start = i;
            }
        }

        self.first_rhs_index.clear();
        self.second_rhs_index.clear();
        for (i, rule) in self.rules.iter().enumerate() {
            if rule.arity() == 2 {
                self.first_rhs_index.entry(rule.rhs[0]).or_default().push(i);
                self.second_rhs_index.entry(rule.rhs[1]).or_default().push(i);
            }
        }
    }

    /// Reject grammars outside CNF: arity must be 1 with a terminal child or
    /// 2 with two nonterminal children. Chain rules in particular are
    /// outside the inside-outside recursions' domain.
    fn check_cnf(&self, signature: &Signature) -> Result<(), GrammarError> {
        for rule in &self.rules {
            let ok = match rule.arity() {
                1 => !self.is_nonterminal(rule.rhs[0]),
                2 => self.is_nonterminal(rule.rhs[0]) && self.is_nonterminal(rule.rhs[1]),
                _ => false,
            };
            if !ok {
                return Err(GrammarError::NotCnf(rule.display(signature).to_string()));
            }
        }
        Ok(())
    }

    /// Whether every rule is a preterminal or binary rule over the right
    /// symbol kinds.
    pub fn is_cnf(&self) -> bool {
        self.rules.iter().all(|r| match r.arity() {
            1 => !self.is_nonterminal(r.rhs[0]),
            2 => self.is_nonterminal(r.rhs[0]) && self.is_nonterminal(r.rhs[1]),
            _ => false,
        })
    }

    /// Rescale each LHS's rules to sum to 1 where they do not already.
    pub fn normalize_probabilities(&mut self, signature: &Signature) {
        let lhs_list: Vec<(Symbol, Range<usize>)> = self
            .lhs_index
            .iter()
            .map(|(s, r)| (*s, r.clone()))
            .collect();

        for (lhs, range) in lhs_list {
            let sum: f64 = self.rules[range.clone()].iter().map(|r| r.prob).sum();
            if (sum - 1.0).abs() > STOCHASTIC_EPS && sum > 0.0 {
                warn!(
                    "probabilities for '{}' sum to {}, renormalizing",
                    signature.resolve_id(lhs),
                    sum
                );
                for rule in &mut self.rules[range] {
                    rule.prob /= sum;
                }
            }
        }
    }

    /// Whether every nonterminal's rules sum to 1 within tolerance.
    pub fn is_proper(&self) -> bool {
        self.lhs_index.values().all(|range| {
            let sum: f64 = self.rules[range.clone()].iter().map(|r| r.prob).sum();
            (sum - 1.0).abs() <= STOCHASTIC_EPS
        })
    }

    /// Drop rules whose probability fell to exactly 0 and rebuild the
    /// indices. The EM update can zero out rules; removing them shrinks
    /// later iterations without changing any computed value. Idempotent.
    pub fn clean_grammar(&mut self) {
        let before = self.rules.len();
        self.rules.retain(|r| r.prob != 0.0);
        self.rebuild();
        if self.rules.len() != before {
            info!("pruned {} dead rules, {} remain", before - self.rules.len(), self.rules.len());
        }
    }

    /// Number of rules.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Terminal symbols: everything in the vocabulary that never appears as
    /// an LHS.
    pub fn terminals(&self) -> impl Iterator<Item = Symbol> + '_ {
        self.vocabulary
            .iter()
            .copied()
            .filter(move |s| !self.nonterminals.contains(s))
    }

    /// Write the grammar in its input format: start symbol line, then one
    /// rule per line in canonical order. Rules with probability exactly 0
    /// are omitted.
    pub fn write_to<W: Write>(&self, signature: &Signature, out: &mut W) -> io::Result<()> {
        writeln!(out, "{}", signature.resolve_id(self.start))?;
        for rule in &self.rules {
            if rule.prob != 0.0 {
                writeln!(out, "{}", rule.display(signature))?;
            }
        }
        Ok(())
    }

    /// Render the grammar as its formal quadruple: terminal alphabet,
    /// nonterminals, start symbol, rules.
    pub fn display<'a>(&'a self, signature: &'a Signature) -> GrammarDisplay<'a> {
        GrammarDisplay { grammar: self, signature }
    }
}

/// Display adapter pairing a grammar with the signature naming its symbols.
pub struct GrammarDisplay<'a> {
    grammar: &'a Grammar,
    signature: &'a Signature,
}

impl fmt::Display for GrammarDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = |s: Symbol| self.signature.resolve_id(s);

        let mut terminals: Vec<&str> = self.grammar.terminals().map(name).collect();
        terminals.sort_unstable();
        let mut nonterminals: Vec<&str> =
            self.grammar.nonterminals().iter().map(|&s| name(s)).collect();
        nonterminals.sort_unstable();

        writeln!(f, "({{{}}},", terminals.join(", "))?;
        writeln!(f, " {{{}}},", nonterminals.join(", "))?;
        writeln!(f, " {},", name(self.grammar.start))?;
        writeln!(f, " {{")?;
        for rule in &self.grammar.rules {
            writeln!(f, "  {}", rule.display(self.signature))?;
        }
        write!(f, " }})")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn load(text: &str, sig: &mut Signature) -> Grammar {
        Grammar::from_reader(Cursor::new(text), sig).unwrap()
    }

    const TOY: &str = "\
# toy grammar
S
S --> NP VP [1.0]
NP --> Det N [1.0]
VP --> V NP [1.0]
Det --> the [1.0]
N --> dog [0.5]
N --> cat [0.5]
V --> saw [1.0]
";

    #[test]
    fn test_load_toy_grammar() {
        let mut sig = Signature::new();
        let g = load(TOY, &mut sig);

        assert_eq!(g.len(), 7);
        assert_eq!(g.start_symbol(), sig.lookup("S").unwrap());
        assert_eq!(g.nonterminals().len(), 6);
        assert!(g.is_cnf());
        assert!(g.is_proper());
    }

    #[test]
    fn test_lhs_ranges_are_contiguous() {
        let mut sig = Signature::new();
        let g = load(TOY, &mut sig);

        let n = sig.lookup("N").unwrap();
        let rules = g.rules_for(n);
        assert_eq!(rules.len(), 2);
        assert!(rules.iter().all(|r| r.lhs == n));

        let range = g.rule_indices_for(n);
        assert_eq!(range.len(), 2);

        // A symbol with no rules yields an empty slice.
        let the = sig.lookup("the").unwrap();
        assert!(g.rules_for(the).is_empty());
    }

    #[test]
    fn test_rhs_indices() {
        let mut sig = Signature::new();
        let g = load(TOY, &mut sig);

        let np = sig.lookup("NP").unwrap();
        // NP is the first child of S --> NP VP and the second of VP --> V NP.
        let first = g.rules_with_first(np);
        assert_eq!(first.len(), 1);
        assert_eq!(g.rule(first[0]).rhs[0], np);

        let second = g.rules_with_second(np);
        assert_eq!(second.len(), 1);
        assert_eq!(g.rule(second[0]).rhs[1], np);

        // Preterminal rules never land in the RHS indices.
        let the = sig.lookup("the").unwrap();
        assert!(g.rules_with_first(the).is_empty());
        assert!(g.rules_with_second(the).is_empty());
    }

    #[test]
    fn test_unnormalized_grammar_is_rescaled() {
        let mut sig = Signature::new();
        let g = load(
            "S\nS --> A B [0.5]\nS --> A C [0.7]\nA --> a [1.0]\nB --> b [1.0]\nC --> c [1.0]\n",
            &mut sig,
        );

        assert!(g.is_proper());
        let s = sig.lookup("S").unwrap();
        let probs: Vec<f64> = g.rules_for(s).iter().map(|r| r.prob).collect();
        assert!((probs.iter().sum::<f64>() - 1.0).abs() <= STOCHASTIC_EPS);
        assert!(probs.iter().any(|&p| (p - 0.5 / 1.2).abs() < 1e-12));
        assert!(probs.iter().any(|&p| (p - 0.7 / 1.2).abs() < 1e-12));
    }

    #[test]
    fn test_bad_rule_lines_are_skipped() {
        let mut sig = Signature::new();
        let g = load(
            "S\nS --> A B [1.0]\nno arrow here [0.5]\nA --> a [1.0]\nB --> b [1.0]\n",
            &mut sig,
        );
        assert_eq!(g.len(), 3);
    }

    #[test]
    fn test_chain_rule_rejected() {
        let mut sig = Signature::new();
        let res = Grammar::from_reader(
            Cursor::new("S\nS --> NP [1.0]\nNP --> a [1.0]\n"),
            &mut sig,
        );
        assert!(matches!(res, Err(GrammarError::NotCnf(_))));
    }

    #[test]
    fn test_high_arity_rule_rejected() {
        let mut sig = Signature::new();
        let res = Grammar::from_reader(
            Cursor::new("S\nS --> A B C [1.0]\nA --> a [1.0]\nB --> b [1.0]\nC --> c [1.0]\n"),
            &mut sig,
        );
        assert!(matches!(res, Err(GrammarError::NotCnf(_))));
    }

    #[test]
    fn test_start_without_rules_rejected() {
        let mut sig = Signature::new();
        let res = Grammar::from_reader(Cursor::new("S\nNP --> a [1.0]\n"), &mut sig);
        assert!(matches!(res, Err(GrammarError::StartNotNonterminal(_))));
    }

    #[test]
    fn test_missing_start_rejected() {
        let mut sig = Signature::new();
        let res = Grammar::from_reader(Cursor::new("# only a comment\n"), &mut sig);
        assert!(matches!(res, Err(GrammarError::MissingStartSymbol)));
    }

    #[test]
    fn test_clean_grammar_prunes_and_is_idempotent() {
        let mut sig = Signature::new();
        let mut g = load(TOY, &mut sig);

        let n = sig.lookup("N").unwrap();
        let range = g.rule_indices_for(n);
        g.set_rule_prob(range.start, 0.0);
        g.clean_grammar();

        assert_eq!(g.len(), 6);
        assert_eq!(g.rules_for(n).len(), 1);
        // Indices must be coherent after the rebuild.
        let np = sig.lookup("NP").unwrap();
        assert_eq!(g.rules_with_first(np).len(), 1);

        let snapshot: Vec<Rule> = g.rules().to_vec();
        g.clean_grammar();
        assert_eq!(g.rules(), snapshot.as_slice());
    }

    #[test]
    fn test_terminals_exclude_nonterminals() {
        let mut sig = Signature::new();
        let g = load(TOY, &mut sig);

        let mut terminals: Vec<&str> = g.terminals().map(|s| sig.resolve_id(s)).collect();
        terminals.sort_unstable();
        assert_eq!(terminals, vec!["cat", "dog", "saw", "the"]);
    }

    #[test]
    fn test_display_quadruple() {
        let mut sig = Signature::new();
        let g = load("S\nS --> a [1.0]\n", &mut sig);

        let rendered = format!("{}", g.display(&sig));
        assert!(rendered.starts_with("({a},"));
        assert!(rendered.contains("{S},"));
        assert!(rendered.contains("S --> a [1]"));
    }

    #[test]
    fn test_write_round_trip() {
        let mut sig = Signature::new();
        let g = load(TOY, &mut sig);

        let mut buf = Vec::new();
        g.write_to(&sig, &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();

        let mut sig2 = Signature::new();
        let g2 = load(&text, &mut sig2);
        assert_eq!(g2.len(), g.len());
        assert!(g2.is_proper());
        assert_eq!(sig2.resolve_id(g2.start_symbol()), "S");
    }

    #[test]
    fn test_write_omits_zero_probability_rules() {
        let mut sig = Signature::new();
        let mut g = load(TOY, &mut sig);

        let n = sig.lookup("N").unwrap();
        let range = g.rule_indices_for(n);
        g.set_rule_prob(range.start, 0.0);

        let mut buf = Vec::new();
        g.write_to(&sig, &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert_eq!(text.lines().count(), 1 + 6);
    }
}
