//! Probabilistic production rules.
//!
//! A rule is a production `LHS --> RHS [p]` where the right-hand side has
//! length 1 (a preterminal rule rewriting to a terminal) or length 2 (a
//! binary rule rewriting to two nonterminals). Rules carry their probability
//! as a plain `f64`; the grammar rewrites it between training iterations.

use crate::signature::{Signature, Symbol};
use log::warn;
use ordered_float::OrderedFloat;
use std::cmp::Ordering;
use std::fmt;
use thiserror::Error;

/// Errors from parsing a rule line.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RuleParseError {
    #[error("too few components in rule '{0}'")]
    TooFewComponents(String),
    #[error("missing arrow in rule '{0}'")]
    MissingArrow(String),
    #[error("missing left-hand side in rule '{0}'")]
    MissingLhs(String),
    #[error("malformed probability '{0}'")]
    MalformedProbability(String),
    #[error("probability {0} outside [0, 1]")]
    ProbabilityOutOfRange(f64),
}

/// A production rule with a mutable probability.
#[derive(Clone, Debug, PartialEq)]
pub struct Rule {
    pub lhs: Symbol,
    pub rhs: Vec<Symbol>,
    pub prob: f64,
}

impl Rule {
    pub fn new(lhs: Symbol, rhs: Vec<Symbol>, prob: f64) -> Self {
        Rule { lhs, rhs, prob }
    }

    /// Parse a line like `S --> NP VP [0.3]`, interning every symbol.
    ///
    /// Tokens are separated by tabs or spaces and both `-->` and `->` arrows
    /// are accepted. A rule without a trailing `[p]` defaults to probability
    /// 1.0 with a warning.
    pub fn parse(line: &str, signature: &mut Signature) -> Result<Rule, RuleParseError> {
        let mut tokens: Vec<&str> = line.split(['\t', ' ']).filter(|t| !t.is_empty()).collect();

        if tokens.len() < 3 {
            return Err(RuleParseError::TooFewComponents(line.to_string()));
        }
        if tokens[0] == "-->" || tokens[0] == "->" {
            return Err(RuleParseError::MissingLhs(line.to_string()));
        }
        if tokens[1] != "-->" && tokens[1] != "->" {
            return Err(RuleParseError::MissingArrow(line.to_string()));
        }

        let prob = match *tokens.last().unwrap() {
            t if t.starts_with('[') && t.ends_with(']') => {
                let body = &t[1..t.len() - 1];
                let p: f64 = body
                    .parse()
                    .map_err(|_| RuleParseError::MalformedProbability(t.to_string()))?;
                if !(0.0..=1.0).contains(&p) {
                    return Err(RuleParseError::ProbabilityOutOfRange(p));
                }
                tokens.pop();
                if tokens.len() < 3 {
                    return Err(RuleParseError::TooFewComponents(line.to_string()));
                }
                p
            }
            _ => {
                warn!("rule '{}' has no probability, defaulting to 1.0", line.trim());
                1.0
            }
        };

        let lhs = signature.intern(tokens[0]);
        let rhs = tokens[2..].iter().map(|t| signature.intern(t)).collect();

        Ok(Rule { lhs, rhs, prob })
    }

    /// Length of the right-hand side.
    pub fn arity(&self) -> usize {
        self.rhs.len()
    }

    /// Render the rule with its symbols resolved against a signature.
    pub fn display<'a>(&'a self, signature: &'a Signature) -> RuleDisplay<'a> {
        RuleDisplay { rule: self, signature }
    }
}

// Canonical rule order: lhs first, then rhs, then probability. Sorting by
// this order makes every LHS occupy one contiguous run in the rule vector.
impl PartialOrd for Rule {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Eq for Rule {}

impl Ord for Rule {
    fn cmp(&self, other: &Self) -> Ordering {
        self.lhs
            .cmp(&other.lhs)
            .then_with(|| self.rhs.cmp(&other.rhs))
            .then_with(|| OrderedFloat(self.prob).cmp(&OrderedFloat(other.prob)))
    }
}

/// Display adapter pairing a rule with the signature that names its symbols.
pub struct RuleDisplay<'a> {
    rule: &'a Rule,
    signature: &'a Signature,
}

impl fmt::Display for RuleDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -->", self.signature.resolve_id(self.rule.lhs))?;
        for &sym in &self.rule.rhs {
            write!(f, " {}", self.signature.resolve_id(sym))?;
        }
        write!(f, " [{}]", self.rule.prob)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_binary_rule() {
        let mut sig = Signature::new();
        let rule = Rule::parse("S --> NP VP [0.3]", &mut sig).unwrap();

        assert_eq!(rule.lhs, sig.lookup("S").unwrap());
        assert_eq!(rule.arity(), 2);
        assert_eq!(rule.rhs[0], sig.lookup("NP").unwrap());
        assert_eq!(rule.rhs[1], sig.lookup("VP").unwrap());
        assert!((rule.prob - 0.3).abs() < 1e-12);
    }

    #[test]
    fn test_parse_preterminal_rule_tabs() {
        let mut sig = Signature::new();
        let rule = Rule::parse("Det\t-->\tthe\t[1.0]", &mut sig).unwrap();

        assert_eq!(rule.arity(), 1);
        assert_eq!(sig.resolve_id(rule.rhs[0]), "the");
    }

    #[test]
    fn test_parse_short_arrow() {
        let mut sig = Signature::new();
        let rule = Rule::parse("NP -> Det N [0.5]", &mut sig).unwrap();
        assert_eq!(rule.arity(), 2);
    }

    #[test]
    fn test_parse_missing_probability_defaults() {
        let mut sig = Signature::new();
        let rule = Rule::parse("S --> NP VP", &mut sig).unwrap();
        assert_eq!(rule.prob, 1.0);
    }

    #[test]
    fn test_parse_failures() {
        let mut sig = Signature::new();

        assert!(matches!(
            Rule::parse("S NP VP [0.3]", &mut sig),
            Err(RuleParseError::MissingArrow(_))
        ));
        assert!(matches!(
            Rule::parse("--> NP VP [0.3]", &mut sig),
            Err(RuleParseError::MissingLhs(_))
        ));
        assert!(matches!(
            Rule::parse("S -->", &mut sig),
            Err(RuleParseError::TooFewComponents(_))
        ));
        assert!(matches!(
            Rule::parse("S --> [0.3]", &mut sig),
            Err(RuleParseError::TooFewComponents(_))
        ));
        assert!(matches!(
            Rule::parse("S --> NP VP [zero]", &mut sig),
            Err(RuleParseError::MalformedProbability(_))
        ));
        assert!(matches!(
            Rule::parse("S --> NP VP [1.5]", &mut sig),
            Err(RuleParseError::ProbabilityOutOfRange(_))
        ));
    }

    #[test]
    fn test_canonical_order_groups_lhs() {
        let mut sig = Signature::new();
        let mut rules = vec![
            Rule::parse("VP --> V NP [0.7]", &mut sig).unwrap(),
            Rule::parse("S --> NP VP [1.0]", &mut sig).unwrap(),
            Rule::parse("VP --> V PP [0.3]", &mut sig).unwrap(),
            Rule::parse("NP --> Det N [1.0]", &mut sig).unwrap(),
        ];
        rules.sort();

        let lhs_run: Vec<Symbol> = rules.iter().map(|r| r.lhs).collect();
        let mut deduped = lhs_run.clone();
        deduped.dedup();
        // No LHS appears in two separate runs after sorting.
        assert_eq!(deduped.len(), 3);
    }

    #[test]
    fn test_display_round_trip() {
        let mut sig = Signature::new();
        let rule = Rule::parse("S --> NP VP [0.25]", &mut sig).unwrap();

        let rendered = format!("{}", rule.display(&sig));
        assert_eq!(rendered, "S --> NP VP [0.25]");

        let reparsed = Rule::parse(&rendered, &mut sig).unwrap();
        assert_eq!(reparsed, rule);
    }
}
