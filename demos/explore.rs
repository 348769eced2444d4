//! Interactive exploration CLI, the way the teacher repo's `analysis::cli`
//! drives its domain logic from a small argument struct.
//!
//! Wraps a toy in-memory byte model (uniform over printable ASCII plus a
//! couple of accented letters, so the UTF-8 adapter has multi-byte sequences
//! to exercise) and walks it through `normalise` + `build_scene`, printing
//! the resulting tiling. This is a development aid, not part of the crate's
//! public contract.

use async_trait::async_trait;
use clap::Parser;
use dasher_core::codepoint::adapt_byte_model;
use dasher_core::codepoint::utf8::Utf8LegalityFilter;
use dasher_core::cursor::{normalise, Cursor};
use dasher_core::model::{ByteModel, Distribution};
use dasher_core::scene::build_scene;
use dasher_core::{Probability, Result};
use futures::StreamExt;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Text already entered, used as the cursor's prefix
    #[arg(long, default_value = "")]
    prefix: String,
    /// Cursor x in the prefix's local square
    #[arg(long, default_value_t = 0.5)]
    x: Probability,
    /// Cursor y in the prefix's local square
    #[arg(long, default_value_t = 0.5)]
    y: Probability,
    /// Minimum rendered extent height
    #[arg(long, default_value_t = 0.01)]
    min_height: Probability,
}

const ALPHABET: &[char] = &['e', 't', 'a', 'o', 'i', 'n', ' ', '.', 'é', 'è'];

/// A stationary, order-0 toy model: every prefix sees the same lead-byte
/// distribution over [`ALPHABET`], skewed toward the front so the tree has
/// visible structure instead of a uniform fan-out. The one thing it does
/// condition on is a dangling UTF-8 lead byte, so the codepoint adapter's
/// continuation expansion (component F) has something to walk into for `é`
/// and `è`.
struct ToyModel;

#[async_trait]
impl ByteModel for ToyModel {
    async fn predict(&self, prefix: &[u8], _min_prob: Probability) -> Result<Distribution> {
        if prefix.last() == Some(&0xC3) {
            let mut probabilities = [0.0; 256];
            probabilities[0xA8] = 0.5; // è
            probabilities[0xA9] = 0.5; // é
            return Distribution::new(probabilities);
        }
        let weights: Vec<Probability> = (0..ALPHABET.len())
            .map(|i| 1.0 / (i as Probability + 1.0))
            .collect();
        let total: Probability = weights.iter().sum();
        let mut probabilities = [0.0; 256];
        let mut buf = [0u8; 4];
        for (&c, w) in ALPHABET.iter().zip(weights.iter()) {
            let bytes = c.encode_utf8(&mut buf).as_bytes();
            probabilities[bytes[0] as usize] += w / total;
        }
        Distribution::new(probabilities)
    }
}

fn print_prefix(indent: usize, token: char, y0: Probability, y1: Probability) {
    println!("{}{:?} [{:.4}, {:.4}]", "  ".repeat(indent), token, y0, y1);
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dasher_core::init();
    let args = Args::parse();

    let model = adapt_byte_model(Utf8LegalityFilter::new(ToyModel));
    let prefix: Vec<char> = args.prefix.chars().collect();
    let cursor = Cursor::new(prefix, args.x, args.y);

    let normalised = normalise(&model, cursor, None).await?;
    log::info!(
        "normalised cursor: prefix={:?} x={:.4} y={:.4}",
        normalised.prefix.iter().collect::<String>(),
        normalised.x,
        normalised.y
    );

    let scene = build_scene(&model, &normalised, args.min_height, None).await?;
    println!("prefix: {:?} (depth {})", normalised.prefix.iter().collect::<String>(), scene.prefix_length);

    let mut children = scene.children;
    while let Some(node) = children.next().await {
        let node = node?;
        print_prefix(0, node.token, node.y0, node.y1);
        let mut grandchildren = node.children;
        while let Some(child) = grandchildren.next().await {
            let child = child?;
            print_prefix(1, child.token, child.y0, child.y1);
        }
    }
    Ok(())
}
