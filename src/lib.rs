//! pcfg-em: Inside-Outside re-estimation of PCFG rule probabilities.
//!
//! This crate provides:
//! - Symbol interning (strings to dense `u32` ids)
//! - PCFG rules and an indexed grammar in Chomsky Normal Form
//! - Memoized inside/outside probability computation per sentence
//! - An EM trainer re-estimating rule probabilities from raw text
//!
//! The algorithm is the Inside-Outside procedure of Manning & Schuetze,
//! "Foundations of Statistical Natural Language Processing", ch. 11.3.

pub mod cache;
pub mod grammar;
pub mod inside_outside;
pub mod rule;
pub mod signature;
pub mod trainer;

// Re-exports for convenience
pub use cache::{InsideOutsideCache, MAX_SENTENCE_LEN};
pub use grammar::{Grammar, GrammarError, STOCHASTIC_EPS};
pub use inside_outside::InsideOutsideCalculator;
pub use rule::{Rule, RuleParseError};
pub use signature::{Signature, Symbol};
pub use trainer::{EmTrainer, Sentence, TrainError, TrainerConfig, TrainingReport};
