//! Benchmark of one EM iteration over increasing sentence lengths.
//!
//! Run with: cargo bench --bench train_bench
//!
//! The inside/outside recursions are cubic in sentence length per rule, so
//! the table below should show roughly cubic growth.

use std::io::Cursor;
use std::time::Instant;

use pcfg_em::{EmTrainer, Grammar, Signature};

/// PP-attachment style grammar: ambiguity grows fast with sentence length.
const GRAMMAR: &str = "\
S
S --> NP VP [1.0]
NP --> Det N [0.7]
NP --> NP PP [0.3]
VP --> V NP [0.6]
VP --> VP PP [0.4]
PP --> P NP [1.0]
Det --> the [1.0]
N --> man [0.5]
N --> telescope [0.5]
V --> saw [1.0]
P --> with [1.0]
";

/// "the man saw the man with the telescope with the telescope ..."
fn sentence(n: usize) -> String {
    let mut words = vec!["the", "man", "saw", "the", "man"];
    while words.len() + 3 <= n {
        words.push("with");
        words.push("the");
        words.push("telescope");
    }
    words.truncate(n);
    words.join(" ")
}

fn bench_iteration(n: usize, repetitions: usize) -> f64 {
    let mut total_time = 0.0;

    for _ in 0..repetitions {
        let mut signature = Signature::new();
        let grammar = Grammar::from_reader(Cursor::new(GRAMMAR), &mut signature).unwrap();
        let corpus = sentence(n);
        let mut trainer =
            EmTrainer::new(grammar, Cursor::new(corpus), &signature).unwrap();

        let start = Instant::now();
        trainer.train_iteration();
        total_time += start.elapsed().as_secs_f64();
    }

    total_time / repetitions as f64
}

fn main() {
    println!("EM iteration wall-clock by sentence length");
    println!();
    println!("{:>8} {:>15}", "Length", "Iteration (ms)");
    println!("{:-<8} {:-<15}", "", "");

    for (n, repetitions) in [(5, 200), (8, 100), (11, 50), (14, 20), (17, 10), (20, 5)] {
        let time = bench_iteration(n, repetitions);
        println!("{:>8} {:>15.4}", n, time * 1000.0);
    }
}
