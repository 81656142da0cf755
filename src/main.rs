use std::io::{self, BufWriter};

use mnist_unpickle::converter::Converter;

fn main() -> anyhow::Result<()> {
    // Logs go to stderr; stdout carries only the JSON lines.
    env_logger::init();

    let stdout = io::stdout();
    Converter::default().run(BufWriter::new(stdout.lock()))
}
