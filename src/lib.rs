//! Computational core for a Dasher-style, information-theoretic continuous-gesture
//! text entry widget.
//!
//! A language model induces a recursive tiling of the unit square: every prefix
//! occupies a square whose side equals its joint probability, and the
//! next-token distribution carves that square into vertically stacked child
//! squares, right-aligned so a gap appears on the left. This crate is the
//! math/algorithmic core that makes the widget correct and fast: a polymorphic
//! CDF view over language models ([`cdf`]), a byte-level-to-codepoint adapter
//! ([`codepoint`]), a model interpolator ([`interpolate`]), a cursor
//! normaliser ([`cursor`]), a scene builder ([`scene`]), and a generation-based
//! trie cache ([`cache`]). Canvas rendering, mouse input, networking, and UI
//! are explicitly out of scope; external LM backends are seen only through the
//! [`model::ByteModel`] trait.

pub mod cache;
pub mod cdf;
pub mod codepoint;
pub mod cursor;
pub mod error;
pub mod interpolate;
pub mod model;
pub mod rat;
pub mod scene;
pub mod stream;
pub mod workers;

pub use error::{Error, Result};

/// A probability in `[0, 1]`. Kept as `f64`: the cursor normaliser and scene
/// ascent need `1e-9` position-preservation precision (spec §8, property 2),
/// which `f32` cannot hold across more than a handful of nesting levels.
pub type Probability = f64;

/// Trait required of every type used as a token: cloneable, comparable for
/// cache/map keys, and `Send + Sync` so it can cross the suspension points a
/// byte-level model query represents.
pub trait Token: Clone + Eq + std::hash::Hash + Send + Sync + 'static {}
impl<T: Clone + Eq + std::hash::Hash + Send + Sync + 'static> Token for T {}

/// Trait used for randomised construction in property-style tests, mirroring
/// the teacher repo's own `Arbitrary` trait.
pub trait Arbitrary {
    fn random() -> Self;
}

impl Arbitrary for TokenProb<char> {
    fn random() -> Self {
        use rand::Rng;
        const ALPHABET: &[char] = &['a', 'b', 'c', 'd', 'e'];
        let mut rng = rand::rng();
        let token = ALPHABET[rng.random_range(0..ALPHABET.len())];
        TokenProb { token, probability: rng.random_range(0.0..1.0) }
    }
}

/// Draws `n` random tokens from a small fixed alphabet with random relative
/// weights, renormalised to sum to exactly 1 — the `Vec<TokenProb<char>>>`
/// shape every [`crate::cdf::PlainModel`] test double in this crate consumes.
pub fn random_distribution(n: usize) -> Vec<TokenProb<char>> {
    use rand::Rng;
    const ALPHABET: &[char] = &['a', 'b', 'c', 'd', 'e', 'f', 'g', 'h'];
    let mut rng = rand::rng();
    let n = n.min(ALPHABET.len()).max(1);
    let weights: Vec<Probability> = (0..n).map(|_| rng.random_range(0.01..1.0)).collect();
    let total: Probability = weights.iter().sum();
    ALPHABET
        .iter()
        .take(n)
        .zip(weights.iter())
        .map(|(&token, &w)| TokenProb { token, probability: w / total })
        .collect()
}

/// `0 ≤ start ≤ end ≤ 1` extent of one token within a prefix's conditional
/// distribution. The extent of `(prefix, token)` is a property of that pair
/// alone (spec §3: "for any two queries with the same prefix, each returned
/// token has identical `(start, end)`").
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TokenProb<T> {
    pub token: T,
    pub probability: Probability,
}

/// Position-preservation / UTF-8-safety tolerance used throughout the crate.
pub const POSITION_EPSILON: Probability = 1e-9;

/// Tolerance for a distribution's probabilities summing to 1 (spec §3 and
/// §7's `InvalidDistribution` kind use the same band).
pub const DISTRIBUTION_SUM_TOLERANCE: Probability = 1e-6;

/// Default cursor-normaliser / scene-builder descent bound (spec §4.I, §4.J).
pub const DEFAULT_MAX_DEPTH: usize = 100;

/// Default trie-cache sweep cadence (spec §4.C).
pub const DEFAULT_PRUNE_INTERVAL: u64 = 20_000;

/// Default trie-cache eviction age (spec §4.C).
pub const DEFAULT_MAX_AGE: u64 = 40_000;

/// Initializes the ambient `log` backend with a terminal logger, the way the
/// teacher repo's top-level `init()` wires `simplelog`. Only available with
/// the `native` feature: a WASM-hosted renderer brings its own logger (or
/// none) and never calls this.
#[cfg(feature = "native")]
pub fn init() {
    let config = simplelog::ConfigBuilder::new()
        .set_location_level(log::LevelFilter::Off)
        .set_target_level(log::LevelFilter::Off)
        .set_thread_level(log::LevelFilter::Off)
        .build();
    simplelog::TermLogger::init(
        log::LevelFilter::Info,
        config,
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    )
    .expect("init logger");
}
