//! Inside and outside probabilities for one sentence under a fixed grammar.
//!
//! For a sentence `w_0 .. w_{m-1}` and nonterminal `N`:
//!
//! - inside `beta(N, i, j)` is the probability that `N` derives `w_i .. w_j`
//! - outside `alpha(N, i, j)` is the probability that the start symbol
//!   derives `w_0 .. w_{i-1} N w_{j+1} .. w_{m-1}`
//!
//! Both are the memoized recursions of Manning & Schuetze, ch. 11.3. The
//! recursion on spans strictly shrinks (inside) or grows (outside), so the
//! mutual recursion terminates at the single-token and whole-sentence base
//! cases. Values accumulate as `f64`; underflow to 0 on long sentences with
//! low-entropy grammars is expected and harmless.

use crate::cache::InsideOutsideCache;
use crate::grammar::Grammar;
use crate::signature::Symbol;

/// Computes inside/outside values for one sentence. Borrows the grammar,
/// the sentence and a fresh cache; owns none of them.
pub struct InsideOutsideCalculator<'a> {
    grammar: &'a Grammar,
    sentence: &'a [Symbol],
    cache: &'a mut InsideOutsideCache,
}

impl<'a> InsideOutsideCalculator<'a> {
    pub fn new(
        grammar: &'a Grammar,
        sentence: &'a [Symbol],
        cache: &'a mut InsideOutsideCache,
    ) -> Self {
        InsideOutsideCalculator { grammar, sentence, cache }
    }

    /// The inside probability of the start symbol over the whole sentence,
    /// i.e. the likelihood the grammar assigns to the sentence.
    pub fn sentence_prob(&mut self) -> f64 {
        let start = self.grammar.start_symbol();
        self.inside(start, 0, self.sentence.len() - 1)
    }

    /// Inside probability beta(symbol, begin, end).
    ///
    /// Spans are token indices with `begin <= end < m`; anything else is a
    /// caller bug.
    pub fn inside(&mut self, symbol: Symbol, begin: usize, end: usize) -> f64 {
        debug_assert!(begin <= end && end < self.sentence.len());

        if let Some(cached) = self.cache.inside(symbol, begin, end) {
            return cached;
        }

        let score = if begin == end {
            // Base case: single token, sum the matching preterminal rules.
            let terminal = self.sentence[begin];
            self.grammar
                .rules_for(symbol)
                .iter()
                .filter(|r| r.arity() == 1 && r.rhs[0] == terminal)
                .map(|r| r.prob)
                .sum()
        } else {
            // Inductive case: binary rules over every split point.
            let grammar = self.grammar;
            let mut score = 0.0;
            for idx in grammar.rule_indices_for(symbol) {
                let rule = grammar.rule(idx);
                if rule.arity() != 2 {
                    continue;
                }
                let (prob, left, right) = (rule.prob, rule.rhs[0], rule.rhs[1]);
                for split in begin..end {
                    score += prob
                        * self.inside(left, begin, split)
                        * self.inside(right, split + 1, end);
                }
            }
            score
        };

        self.cache.store_inside(symbol, begin, end, score);
        score
    }

    /// Outside probability alpha(symbol, begin, end).
    pub fn outside(&mut self, symbol: Symbol, begin: usize, end: usize) -> f64 {
        let len = self.sentence.len();
        debug_assert!(begin <= end && end < len);

        if let Some(cached) = self.cache.outside(symbol, begin, end) {
            return cached;
        }

        // Base case: the whole-sentence span belongs to the start symbol.
        if begin == 0 && end == len - 1 {
            let score = if symbol == self.grammar.start_symbol() { 1.0 } else { 0.0 };
            self.cache.store_outside(symbol, begin, end, score);
            return score;
        }

        let grammar = self.grammar;

        // Contribution as left child: parents P --> symbol B extend the span
        // to the right.
        let mut score_left = 0.0;
        for &idx in grammar.rules_with_first(symbol) {
            let rule = grammar.rule(idx);
            let (prob, parent, sibling) = (rule.prob, rule.lhs, rule.rhs[1]);
            for split in end + 1..len {
                score_left += self.outside(parent, begin, split)
                    * prob
                    * self.inside(sibling, end + 1, split);
            }
        }

        // Contribution as right child: parents P --> A symbol extend the
        // span to the left.
        let mut score_right = 0.0;
        for &idx in grammar.rules_with_second(symbol) {
            let rule = grammar.rule(idx);
            let (prob, parent, sibling) = (rule.prob, rule.lhs, rule.rhs[0]);
            for split in 0..begin {
                score_right += self.outside(parent, split, end)
                    * prob
                    * self.inside(sibling, split, begin - 1);
            }
        }

        let score = score_left + score_right;
        self.cache.store_outside(symbol, begin, end, score);
        score
    }
}
