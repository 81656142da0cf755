//! Line-delimited JSON output, one object per split.
use std::io::{self, Write};

use serde::Serialize;
use serde_json::ser::Formatter;

use crate::data::model::{MnistDataset, Split};

/// Compact JSON with the `", "` / `": "` separators of Python's `json.dumps`.
struct PythonFormatter;

impl Formatter for PythonFormatter {
    fn begin_array_value<W: ?Sized + Write>(&mut self, writer: &mut W, first: bool) -> io::Result<()> {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_key<W: ?Sized + Write>(&mut self, writer: &mut W, first: bool) -> io::Result<()> {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_value<W: ?Sized + Write>(&mut self, writer: &mut W) -> io::Result<()> {
        writer.write_all(b": ")
    }
}

/// Writes `{"images": [...], "values": [...]}` for one split, without a newline.
pub fn write_split<W: Write>(split: &Split, out: &mut W) -> serde_json::Result<()> {
    let mut ser = serde_json::Serializer::with_formatter(out, PythonFormatter);
    split.serialize(&mut ser)
}

/// The JSON object for one split as a string.
pub fn serialize_split(split: &Split) -> serde_json::Result<String> {
    let mut buf = Vec::new();
    write_split(split, &mut buf)?;
    String::from_utf8(buf).map_err(serde::ser::Error::custom)
}

/// Three lines: training, validation, test.
pub fn write_dataset<W: Write>(dataset: &MnistDataset, mut out: W) -> io::Result<()> {
    for (name, split) in dataset.splits() {
        write_split(split, &mut out)?;
        out.write_all(b"\n")?;
        log::debug!("wrote {name} ({} pairs)", split.len());
    }
    out.flush()
}
