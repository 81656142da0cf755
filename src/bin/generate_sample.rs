use std::fs::File;
use std::path::Path;

use anyhow::{Context, Result};
use flate2::write::GzEncoder;
use flate2::Compression;

use mnist_unpickle::converter::DEFAULT_INPUT;
use mnist_unpickle::data::model::{Elements, MnistDataset, NdArray, Split, IMAGE_WIDTH};

const SIDE: usize = 28;

/// Seven-segment masks for digits 0-9, bits a..g from least significant.
const SEGMENTS: [u8; 10] = [
    0b011_1111, 0b000_0110, 0b101_1011, 0b100_1111, 0b110_0110,
    0b110_1101, 0b111_1101, 0b000_0111, 0b111_1111, 0b110_1111,
];

/// xoshiro256** seeded through splitmix64; enough for reproducible noise.
struct Rng([u64; 4]);

impl Rng {
    fn seeded(mut seed: u64) -> Self {
        let mut state = [0u64; 4];
        for word in &mut state {
            seed = seed.wrapping_add(0x9e37_79b9_7f4a_7c15);
            let mut z = seed;
            z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
            z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
            *word = z ^ (z >> 31);
        }
        Rng(state)
    }

    fn next_u64(&mut self) -> u64 {
        let s = &mut self.0;
        let out = s[1].wrapping_mul(5).rotate_left(7).wrapping_mul(9);
        let t = s[1] << 17;
        s[2] ^= s[0];
        s[3] ^= s[1];
        s[1] ^= s[2];
        s[0] ^= s[3];
        s[2] ^= t;
        s[3] = s[3].rotate_left(45);
        out
    }

    /// Uniform in `[0, 1)`.
    fn unit(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Uniform in `0..n`.
    fn index(&mut self, n: usize) -> usize {
        (self.next_u64() % n as u64) as usize
    }
}

/// Segment rectangles (x0, y0, x1, y1) inside a 12×20 glyph box.
fn segment_rect(segment: usize) -> (usize, usize, usize, usize) {
    match segment {
        0 => (0, 0, 12, 2),   // a: top
        1 => (10, 0, 12, 10), // b: upper right
        2 => (10, 10, 12, 20), // c: lower right
        3 => (0, 18, 12, 20), // d: bottom
        4 => (0, 10, 2, 20),  // e: lower left
        5 => (0, 0, 2, 10),   // f: upper left
        _ => (0, 9, 12, 11),  // g: middle
    }
}

/// A noisy, slightly shifted seven-segment rendering of `digit`.
fn render_digit(digit: usize, rng: &mut Rng) -> Vec<f32> {
    let mut pixels = vec![0f64; IMAGE_WIDTH];
    let left = 6 + rng.index(5);
    let top = 2 + rng.index(5);
    let ink = 0.7 + 0.3 * rng.unit();

    for segment in 0..7 {
        if SEGMENTS[digit] & (1 << segment) == 0 {
            continue;
        }
        let (x0, y0, x1, y1) = segment_rect(segment);
        for y in top + y0..top + y1 {
            for x in left + x0..left + x1 {
                pixels[y * SIDE + x] = ink;
            }
        }
    }

    pixels
        .into_iter()
        .map(|p| (p + 0.1 * (rng.unit() - 0.5)).clamp(0.0, 1.0) as f32)
        .collect()
}

fn generate_split(count: usize, rng: &mut Rng) -> Result<Split> {
    let mut images = Vec::with_capacity(count * IMAGE_WIDTH);
    let mut labels = Vec::with_capacity(count);
    for _ in 0..count {
        let digit = rng.index(10);
        images.extend(render_digit(digit, rng));
        labels.push(digit as i64);
    }
    let split = Split::new(
        NdArray::new(vec![count, IMAGE_WIDTH], Elements::F32(images))?,
        NdArray::new(vec![count], Elements::I64(labels))?,
    )?;
    Ok(split)
}

fn main() -> Result<()> {
    env_logger::init();
    let mut rng = Rng::seeded(42);

    let dataset = MnistDataset {
        training: generate_split(500, &mut rng)?,
        validation: generate_split(100, &mut rng)?,
        test: generate_split(100, &mut rng)?,
    };

    let output_path = Path::new(DEFAULT_INPUT);
    if let Some(dir) = output_path.parent() {
        std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    }
    let file = File::create(output_path)
        .with_context(|| format!("creating {}", output_path.display()))?;
    dataset
        .write_pickle(GzEncoder::new(file, Compression::default()))
        .and_then(|encoder| encoder.finish())
        .with_context(|| format!("writing {}", output_path.display()))?;

    println!(
        "Wrote {} / {} / {} images ({IMAGE_WIDTH} pixels each) to {}",
        dataset.training.len(),
        dataset.validation.len(),
        dataset.test.len(),
        output_path.display()
    );
    Ok(())
}
