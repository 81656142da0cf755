use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;

use super::model::{MnistDataset, ModelError};
use super::pickle;

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("cannot read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{} is not a pickled MNIST dataset: {source}", .path.display())]
    Deserialization {
        path: PathBuf,
        #[source]
        source: DecodeError,
    },
    #[error("unsupported file extension: .{0}")]
    UnsupportedFormat(String),
}

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error(transparent)]
    Pickle(#[from] pickle::Error),
    #[error(transparent)]
    Structure(#[from] ModelError),
}

// ---------------------------------------------------------------------------
// Public entry-point
// ---------------------------------------------------------------------------

/// Load the MNIST splits from a pickle file.  Dispatch by extension.
///
/// Supported formats:
/// * `.gz`              – gzip-compressed pickle (`mnist.pkl.gz`)
/// * `.pkl` / `.pickle` – uncompressed pickle
///
/// The file is read to completion and closed before this returns.
pub fn load_file(path: &Path) -> Result<MnistDataset, LoadError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    let file = match ext.as_str() {
        "gz" | "pkl" | "pickle" => File::open(path).map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?,
        other => return Err(LoadError::UnsupportedFormat(other.to_string())),
    };
    log::info!("loading {}", path.display());

    let decoded = if ext == "gz" {
        decode(&mut BufReader::new(GzDecoder::new(file)))
    } else {
        decode(&mut BufReader::new(file))
    };
    decoded.map_err(|source| match source {
        DecodeError::Pickle(pickle::Error::Io(source)) if !is_corrupt_data(&source) => {
            LoadError::Io {
                path: path.to_path_buf(),
                source,
            }
        }
        source => LoadError::Deserialization {
            path: path.to_path_buf(),
            source,
        },
    })
}

/// Read errors that describe the bytes themselves: a truncated stream, or a
/// gzip header/deflate block that flate2 cannot decode. Anything else is the
/// file system failing to deliver the bytes.
fn is_corrupt_data(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::UnexpectedEof | io::ErrorKind::InvalidData | io::ErrorKind::InvalidInput
    )
}

fn decode<R: BufRead>(reader: &mut R) -> Result<MnistDataset, DecodeError> {
    let object = pickle::load(reader)?;
    Ok(MnistDataset::from_object(object)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::{Elements, NdArray, Split};
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;
    use tempfile::tempdir;

    fn tiny_dataset() -> MnistDataset {
        let split = |value: f32, label: i64| {
            Split::new(
                NdArray::new(vec![1, 4], Elements::F32(vec![value; 4])).unwrap(),
                NdArray::new(vec![1], Elements::I64(vec![label])).unwrap(),
            )
            .unwrap()
        };
        MnistDataset {
            training: split(0.0, 0),
            validation: split(1.0, 9),
            test: split(0.5, 4),
        }
    }

    #[test]
    fn loads_gzipped_and_plain_pickles() {
        let dir = tempdir().unwrap();
        let dataset = tiny_dataset();

        let gz_path = dir.path().join("mnist.pkl.gz");
        let enc = GzEncoder::new(File::create(&gz_path).unwrap(), Compression::default());
        dataset.write_pickle(enc).unwrap().finish().unwrap();
        assert_eq!(load_file(&gz_path).unwrap(), dataset);

        let pkl_path = dir.path().join("mnist.pkl");
        dataset.write_pickle(File::create(&pkl_path).unwrap()).unwrap();
        assert_eq!(load_file(&pkl_path).unwrap(), dataset);
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let dir = tempdir().unwrap();
        let err = load_file(&dir.path().join("absent.pkl.gz")).unwrap_err();
        assert!(matches!(err, LoadError::Io { .. }), "{err}");
    }

    #[test]
    fn unreadable_path_is_an_io_error() {
        // Opening a directory succeeds on Linux; the first read fails.
        let dir = tempdir().unwrap();
        let path = dir.path().join("mnist.pkl.gz");
        std::fs::create_dir(&path).unwrap();
        let err = load_file(&path).unwrap_err();
        assert!(matches!(err, LoadError::Io { .. }), "{err}");
    }

    #[test]
    fn truncated_gzip_is_a_deserialization_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("mnist.pkl.gz");
        let mut enc = GzEncoder::new(Vec::new(), Compression::default());
        tiny_dataset().write_pickle(&mut enc).unwrap();
        let gz = enc.finish().unwrap();
        std::fs::write(&path, &gz[..gz.len() / 2]).unwrap();
        let err = load_file(&path).unwrap_err();
        assert!(matches!(err, LoadError::Deserialization { .. }), "{err}");
    }

    #[test]
    fn garbage_is_a_deserialization_error() {
        let dir = tempdir().unwrap();

        let not_gzip = dir.path().join("junk.pkl.gz");
        std::fs::write(&not_gzip, b"definitely not gzip").unwrap();
        let err = load_file(&not_gzip).unwrap_err();
        assert!(matches!(err, LoadError::Deserialization { .. }), "{err}");

        // Valid gzip + pickle, wrong structure: a 2-tuple of ints.
        let wrong_shape = dir.path().join("pair.pkl.gz");
        let mut enc = GzEncoder::new(File::create(&wrong_shape).unwrap(), Compression::default());
        enc.write_all(&[0x80, 2, b'K', 1, b'K', 2, 0x86, b'.']).unwrap();
        enc.finish().unwrap();
        let err = load_file(&wrong_shape).unwrap_err();
        assert!(
            matches!(
                err,
                LoadError::Deserialization {
                    source: DecodeError::Structure(_),
                    ..
                }
            ),
            "{err}"
        );
    }

    #[test]
    fn rejects_unknown_extensions() {
        let err = load_file(Path::new("mnist.csv")).unwrap_err();
        assert_eq!(err.to_string(), "unsupported file extension: .csv");
    }
}
