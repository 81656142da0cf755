use std::io::{self, Write};
use std::ops::Range;
use std::rc::Rc;

use serde::ser::{Serialize, SerializeSeq, SerializeStruct, Serializer};

use super::numpy::Pickler;
use super::pickle::Object;

/// Pixels per flattened 28×28 MNIST image.
pub const IMAGE_WIDTH: usize = 784;
/// Digit classes 0 through 9.
pub const CLASSES: i64 = 10;

#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("shape {shape:?} holds {expected} elements but {actual} were given")]
    ShapeMismatch {
        shape: Vec<usize>,
        expected: usize,
        actual: usize,
    },
    #[error("shape {0:?} has more elements than fit in memory")]
    ShapeOverflow(Vec<usize>),
    #[error("{0}")]
    Structure(String),
}

/// Number of elements in an array of this shape, or `None` if it overflows.
///
/// Every non-zero dimension takes part in the product, so the sizes of
/// sub-arrays are bounded by it too, even when another axis is empty.
pub fn element_count(shape: &[usize]) -> Option<usize> {
    let nonzero = shape
        .iter()
        .try_fold(1usize, |acc, &dim| acc.checked_mul(dim.max(1)))?;
    Some(if shape.contains(&0) { 0 } else { nonzero })
}

// ---------------------------------------------------------------------------
// Elements / NdArray – decoded numpy arrays
// ---------------------------------------------------------------------------

/// Flat array storage, kept in the element type found on disk.
/// Narrow integer types other than `u1` are widened to `i64`.
#[derive(Debug, Clone, PartialEq)]
pub enum Elements {
    F32(Vec<f32>),
    F64(Vec<f64>),
    I64(Vec<i64>),
    U8(Vec<u8>),
}

impl Elements {
    pub fn len(&self) -> usize {
        match self {
            Elements::F32(v) => v.len(),
            Elements::F64(v) => v.len(),
            Elements::I64(v) => v.len(),
            Elements::U8(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether `tolist()` would produce Python ints.
    pub fn is_integer(&self) -> bool {
        matches!(self, Elements::I64(_) | Elements::U8(_))
    }

    pub fn get_f64(&self, i: usize) -> Option<f64> {
        match self {
            Elements::F32(v) => v.get(i).map(|&x| x as f64),
            Elements::F64(v) => v.get(i).copied(),
            Elements::I64(v) => v.get(i).map(|&x| x as f64),
            Elements::U8(v) => v.get(i).map(|&x| x as f64),
        }
    }

    pub fn get_i64(&self, i: usize) -> Option<i64> {
        match self {
            Elements::I64(v) => v.get(i).copied(),
            Elements::U8(v) => v.get(i).map(|&x| x as i64),
            Elements::F32(_) | Elements::F64(_) => None,
        }
    }

    /// Whether no element is NaN or infinite.
    pub fn all_finite(&self) -> bool {
        match self {
            Elements::F32(v) => v.iter().all(|x| x.is_finite()),
            Elements::F64(v) => v.iter().all(|x| x.is_finite()),
            Elements::I64(_) | Elements::U8(_) => true,
        }
    }

    /// New storage with `out[i] = self[indices[i]]`.
    pub fn gather(&self, indices: &[usize]) -> Elements {
        fn pick<T: Copy>(v: &[T], indices: &[usize]) -> Vec<T> {
            indices.iter().map(|&i| v[i]).collect()
        }
        match self {
            Elements::F32(v) => Elements::F32(pick(v, indices)),
            Elements::F64(v) => Elements::F64(pick(v, indices)),
            Elements::I64(v) => Elements::I64(pick(v, indices)),
            Elements::U8(v) => Elements::U8(pick(v, indices)),
        }
    }
}

/// A C-ordered n-dimensional array.
#[derive(Debug, Clone, PartialEq)]
pub struct NdArray {
    pub shape: Vec<usize>,
    pub elements: Elements,
}

impl NdArray {
    pub fn new(shape: Vec<usize>, elements: Elements) -> Result<Self, ModelError> {
        let Some(expected) = element_count(&shape) else {
            return Err(ModelError::ShapeOverflow(shape));
        };
        if expected != elements.len() {
            return Err(ModelError::ShapeMismatch {
                shape,
                expected,
                actual: elements.len(),
            });
        }
        Ok(Self { shape, elements })
    }

    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    /// Length of the first axis.
    pub fn rows(&self) -> usize {
        self.shape.first().copied().unwrap_or(1)
    }

    /// Number of elements per entry of the first axis.
    pub fn row_len(&self) -> usize {
        self.shape.iter().skip(1).product()
    }
}

/// Serializes like numpy's `tolist()`: nested lists following the shape,
/// floats as (widened) f64, integers as integers.
impl Serialize for NdArray {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if self.shape.is_empty() {
            return Item(&self.elements, 0).serialize(serializer);
        }
        Nested {
            shape: &self.shape,
            elements: &self.elements,
            offset: 0,
        }
        .serialize(serializer)
    }
}

struct Item<'a>(&'a Elements, usize);

impl Serialize for Item<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let Item(elements, i) = *self;
        match elements {
            Elements::F32(v) => serializer.serialize_f64(v[i] as f64),
            Elements::F64(v) => serializer.serialize_f64(v[i]),
            Elements::I64(v) => serializer.serialize_i64(v[i]),
            Elements::U8(v) => serializer.serialize_u8(v[i]),
        }
    }
}

struct Flat<'a>(&'a Elements, Range<usize>);

impl Serialize for Flat<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.1.len()))?;
        for i in self.1.clone() {
            seq.serialize_element(&Item(self.0, i))?;
        }
        seq.end()
    }
}

/// The sub-array starting at `offset` with the given (non-empty) `shape`.
struct Nested<'a> {
    shape: &'a [usize],
    elements: &'a Elements,
    offset: usize,
}

impl Serialize for Nested<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let (&len, inner) = match self.shape.split_first() {
            Some(split) => split,
            None => return Item(self.elements, self.offset).serialize(serializer),
        };
        if inner.is_empty() {
            return Flat(self.elements, self.offset..self.offset + len).serialize(serializer);
        }
        let stride: usize = inner.iter().product();
        let mut seq = serializer.serialize_seq(Some(len))?;
        for row in 0..len {
            seq.serialize_element(&Nested {
                shape: inner,
                elements: self.elements,
                offset: self.offset + row * stride,
            })?;
        }
        seq.end()
    }
}

// ---------------------------------------------------------------------------
// Split – one (images, labels) pair
// ---------------------------------------------------------------------------

/// One dataset split: `labels[i]` is the digit shown in `images[i]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Split {
    /// 2-D, one flattened image per row.
    pub images: NdArray,
    /// 1-D integer labels, one per image row.
    pub labels: NdArray,
}

impl Split {
    pub fn new(images: NdArray, labels: NdArray) -> Result<Self, ModelError> {
        if images.ndim() != 2 {
            return Err(ModelError::Structure(format!(
                "images must be 2-D, got shape {:?}",
                images.shape
            )));
        }
        if labels.ndim() != 1 {
            return Err(ModelError::Structure(format!(
                "labels must be 1-D, got shape {:?}",
                labels.shape
            )));
        }
        if !labels.elements.is_integer() {
            return Err(ModelError::Structure(
                "labels must have an integer dtype".to_string(),
            ));
        }
        // JSON has no NaN or Infinity.
        if !images.elements.all_finite() {
            return Err(ModelError::Structure(
                "images contain NaN or infinite values".to_string(),
            ));
        }
        if images.rows() != labels.rows() {
            return Err(ModelError::Structure(format!(
                "{} images but {} labels",
                images.rows(),
                labels.rows()
            )));
        }
        Ok(Self { images, labels })
    }

    /// Number of (image, label) pairs.
    pub fn len(&self) -> usize {
        self.labels.rows()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn image_width(&self) -> usize {
        self.images.row_len()
    }

    pub fn image(&self, i: usize) -> Option<Vec<f64>> {
        if i >= self.len() {
            return None;
        }
        let width = self.image_width();
        (i * width..(i + 1) * width)
            .map(|j| self.images.elements.get_f64(j))
            .collect()
    }

    pub fn label(&self, i: usize) -> Option<i64> {
        self.labels.elements.get_i64(i)
    }

    /// Index-aligned `(image, label)` pairs.
    pub fn pairs(&self) -> impl Iterator<Item = (Vec<f64>, i64)> + '_ {
        (0..self.len()).filter_map(|i| Some((self.image(i)?, self.label(i)?)))
    }

    /// Labels outside `0..CLASSES`.
    fn stray_labels(&self) -> usize {
        (0..self.len())
            .filter_map(|i| self.label(i))
            .filter(|l| !(0..CLASSES).contains(l))
            .count()
    }
}

/// `{"images": [[...], ...], "values": [...]}`
impl Serialize for Split {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("Split", 2)?;
        s.serialize_field("images", &self.images)?;
        s.serialize_field("values", &self.labels)?;
        s.end()
    }
}

// ---------------------------------------------------------------------------
// MnistDataset – the unpickled (training, validation, test) tuple
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct MnistDataset {
    pub training: Split,
    pub validation: Split,
    pub test: Split,
}

impl MnistDataset {
    /// Validates the unpickled object: a 3-tuple of `(images, labels)` 2-tuples.
    pub fn from_object(obj: Object) -> Result<Self, ModelError> {
        let [training, validation, test] = sequence::<3>(obj, "dataset")?;
        let dataset = Self {
            training: split_from_object(training, "training")?,
            validation: split_from_object(validation, "validation")?,
            test: split_from_object(test, "test")?,
        };
        for (name, split) in dataset.splits() {
            log::info!(
                "{name}: {} images of width {}",
                split.len(),
                split.image_width()
            );
            if split.image_width() != IMAGE_WIDTH {
                log::warn!(
                    "{name}: images have {} pixels, MNIST images have {IMAGE_WIDTH}",
                    split.image_width()
                );
            }
            let stray = split.stray_labels();
            if stray > 0 {
                log::warn!("{name}: {stray} labels outside 0..{CLASSES}");
            }
        }
        Ok(dataset)
    }

    /// The splits in output order.
    pub fn splits(&self) -> [(&'static str, &Split); 3] {
        [
            ("training", &self.training),
            ("validation", &self.validation),
            ("test", &self.test),
        ]
    }

    /// Pickles the dataset in the layout `from_object` accepts.
    pub fn write_pickle<W: Write>(&self, out: W) -> io::Result<W> {
        let mut pickler = Pickler::new(out);
        pickler.start()?;
        pickler.mark()?;
        for (_, split) in self.splits() {
            pickler.mark()?;
            pickler.array(&split.images)?;
            pickler.array(&split.labels)?;
            pickler.tuple()?;
        }
        pickler.tuple()?;
        pickler.finish()
    }
}

fn sequence<const N: usize>(obj: Object, what: &str) -> Result<[Object; N], ModelError> {
    let items = match obj {
        Object::Tuple(items) | Object::List(items) => items,
        other => {
            return Err(ModelError::Structure(format!(
                "{what} must be a {}-tuple, got {}",
                N,
                other.kind()
            )))
        }
    };
    let len = items.len();
    items.try_into().map_err(|_| {
        ModelError::Structure(format!("{what} must be a {}-tuple, got {len} items", N))
    })
}

fn split_from_object(obj: Object, name: &str) -> Result<Split, ModelError> {
    let [images, labels] = sequence::<2>(obj, name)?;
    let images = array(images, name, "images")?;
    let labels = array(labels, name, "labels")?;
    Split::new(images, labels).map_err(|e| ModelError::Structure(format!("{name}: {e}")))
}

fn array(obj: Object, name: &str, what: &str) -> Result<NdArray, ModelError> {
    match obj {
        Object::Array(array) => Ok(Rc::try_unwrap(array).unwrap_or_else(|shared| (*shared).clone())),
        other => Err(ModelError::Structure(format!(
            "{name} {what} must be a numpy array, got {}",
            other.kind()
        ))),
    }
}
