//! numpy objects inside pickles: `dtype`, `ndarray` reconstruction, and a
//! [`Pickler`] that writes arrays the way numpy itself pickles them.
use std::collections::HashMap;
use std::io::{self, Write};
use std::rc::Rc;

use byteorder::{BigEndian, ByteOrder, LittleEndian, WriteBytesExt};

use super::model::{element_count, Elements, NdArray};
use super::pickle::{Error, Object, OpCode, Result};

/// Modules that host `_reconstruct`, numpy 1.x and 2.x respectively.
const RECONSTRUCT_MODULES: [&str; 2] = ["numpy.core.multiarray", "numpy._core.multiarray"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endian {
    Little,
    Big,
}

/// Element types that can be decoded from raw array data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scalar {
    F32,
    F64,
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
}

impl Scalar {
    fn parse(code: &str) -> Option<Self> {
        let scalar = match code {
            "f4" => Self::F32,
            "f8" => Self::F64,
            "i1" => Self::I8,
            "i2" => Self::I16,
            "i4" => Self::I32,
            "i8" => Self::I64,
            "u1" => Self::U8,
            "u2" => Self::U16,
            "u4" => Self::U32,
            "u8" => Self::U64,
            _ => return None,
        };
        Some(scalar)
    }

    /// numpy type string, e.g. `f4`.
    pub fn code(self) -> &'static str {
        match self {
            Self::F32 => "f4",
            Self::F64 => "f8",
            Self::I8 => "i1",
            Self::I16 => "i2",
            Self::I32 => "i4",
            Self::I64 => "i8",
            Self::U8 => "u1",
            Self::U16 => "u2",
            Self::U32 => "u4",
            Self::U64 => "u8",
        }
    }

    /// Item size in bytes.
    pub fn size(self) -> usize {
        match self {
            Self::I8 | Self::U8 => 1,
            Self::I16 | Self::U16 => 2,
            Self::F32 | Self::I32 | Self::U32 => 4,
            Self::F64 | Self::I64 | Self::U64 => 8,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DType {
    pub scalar: Scalar,
    pub endian: Endian,
}

impl DType {
    pub fn new(scalar: Scalar, endian: Endian) -> Self {
        Self { scalar, endian }
    }

    /// Parses a numpy type string such as `f4` or `>i8`.
    pub fn parse(code: &str) -> Result<Self> {
        let (endian, scalar_code) = match code.as_bytes().first() {
            Some(b'>') => (Endian::Big, &code[1..]),
            Some(b'<' | b'|' | b'=') => (Endian::Little, &code[1..]),
            _ => (Endian::Little, code),
        };
        let scalar =
            Scalar::parse(scalar_code).ok_or_else(|| Error::UnsupportedDType(code.to_string()))?;
        Ok(Self::new(scalar, endian))
    }

    /// Interprets the arguments of `numpy.dtype(type_str, align, copy)`.
    pub fn from_reduce_args(args: &Object) -> Result<Self> {
        let code = match args {
            Object::Tuple(items) => items.first().and_then(Object::as_str),
            _ => None,
        }
        .ok_or_else(|| {
            Error::Malformed(format!(
                "numpy.dtype expects a type string, got {}",
                args.kind()
            ))
        })?;
        Self::parse(code)
    }

    /// Applies the `__setstate__` tuple `(version, byteorder, ...)`.
    pub fn with_state(self, state: &Object) -> Result<Self> {
        let order = match state {
            Object::Tuple(items) => items.get(1).and_then(Object::as_str),
            _ => None,
        }
        .ok_or_else(|| Error::Malformed(format!("invalid dtype state {}", state.kind())))?;
        let endian = match order {
            ">" => Endian::Big,
            "<" => Endian::Little,
            // Single-byte types and native order carry no byte order of their own.
            "|" | "=" => self.endian,
            other => return Err(Error::Malformed(format!("unknown byte order '{other}'"))),
        };
        Ok(Self { endian, ..self })
    }

    fn byte_order_str(self) -> &'static str {
        match (self.scalar.size(), self.endian) {
            (1, _) => "|",
            (_, Endian::Little) => "<",
            (_, Endian::Big) => ">",
        }
    }
}

/// Whether `obj` is the empty array produced by `_reconstruct(ndarray, (0,), b'b')`,
/// waiting for its BUILD state.
pub fn is_array_reconstruct(obj: &Object) -> bool {
    match obj {
        Object::Reduce { callable, .. } => matches!(
            callable.as_ref(),
            Object::Class { module_name, class_name }
                if class_name == "_reconstruct"
                    && RECONSTRUCT_MODULES.contains(&module_name.as_str())
        ),
        _ => false,
    }
}

/// Builds an array from the `ndarray.__setstate__` tuple
/// `(version, shape, dtype, is_fortran, rawdata)`; old pickles omit `version`.
pub fn array_from_state(state: Object) -> Result<NdArray> {
    let mut fields = match state {
        Object::Tuple(fields) => fields,
        other => {
            return Err(Error::Malformed(format!(
                "ndarray state must be a tuple, got {}",
                other.kind()
            )))
        }
    };
    if fields.len() == 5 {
        fields.remove(0);
    }
    let [shape, dtype, fortran, raw]: [Object; 4] = fields
        .try_into()
        .map_err(|_| Error::Malformed("unexpected ndarray state length".to_string()))?;

    let shape = Vec::<usize>::try_from(shape)
        .map_err(|o| Error::Malformed(format!("invalid ndarray shape entry {}", o.kind())))?;
    let dtype = match dtype {
        Object::DType(dtype) => dtype,
        other => {
            return Err(Error::Malformed(format!(
                "expected a dtype, got {}",
                other.kind()
            )))
        }
    };
    let fortran = match fortran {
        Object::Bool(b) => b,
        Object::Int(i) => i != 0,
        other => {
            return Err(Error::Malformed(format!(
                "invalid fortran flag {}",
                other.kind()
            )))
        }
    };
    let raw: Rc<[u8]> = match raw {
        Object::Bytes(raw) => raw,
        // Python 3 loading a Python 2 pickle with encoding='latin1'.
        Object::Unicode(text) => latin1_bytes(&text)?.into(),
        Object::List(_) => {
            return Err(Error::Malformed(
                "object arrays are not supported".to_string(),
            ))
        }
        other => {
            return Err(Error::Malformed(format!(
                "invalid ndarray data {}",
                other.kind()
            )))
        }
    };

    let count = element_count(&shape)
        .ok_or_else(|| Error::Malformed(format!("ndarray shape {shape:?} overflows")))?;
    let expected = count.checked_mul(dtype.scalar.size());
    if expected != Some(raw.len()) {
        return Err(Error::Malformed(format!(
            "ndarray of shape {shape:?} and dtype {} needs {} bytes, found {}",
            dtype.scalar.code(),
            count.saturating_mul(dtype.scalar.size()),
            raw.len()
        )));
    }

    let elements = match dtype.endian {
        Endian::Little => decode::<LittleEndian>(dtype.scalar, &raw)?,
        Endian::Big => decode::<BigEndian>(dtype.scalar, &raw)?,
    };
    let elements = if fortran && shape.len() > 1 {
        elements.gather(&fortran_offsets(&shape, count))
    } else {
        elements
    };
    NdArray::new(shape, elements).map_err(|e| Error::Malformed(e.to_string()))
}

fn decode<O: ByteOrder>(scalar: Scalar, raw: &[u8]) -> Result<Elements> {
    let chunks = raw.chunks_exact(scalar.size());
    let elements = match scalar {
        Scalar::F32 => Elements::F32(chunks.map(O::read_f32).collect()),
        Scalar::F64 => Elements::F64(chunks.map(O::read_f64).collect()),
        Scalar::I8 => Elements::I64(raw.iter().map(|&b| b as i8 as i64).collect()),
        Scalar::I16 => Elements::I64(chunks.map(|c| O::read_i16(c) as i64).collect()),
        Scalar::I32 => Elements::I64(chunks.map(|c| O::read_i32(c) as i64).collect()),
        Scalar::I64 => Elements::I64(chunks.map(O::read_i64).collect()),
        Scalar::U8 => Elements::U8(raw.to_vec()),
        Scalar::U16 => Elements::I64(chunks.map(|c| O::read_u16(c) as i64).collect()),
        Scalar::U32 => Elements::I64(chunks.map(|c| O::read_u32(c) as i64).collect()),
        Scalar::U64 => Elements::I64(
            chunks
                .map(|c| {
                    let v = O::read_u64(c);
                    i64::try_from(v)
                        .map_err(|_| Error::Malformed(format!("u8 value {v} exceeds i64")))
                })
                .collect::<Result<_>>()?,
        ),
    };
    Ok(elements)
}

/// For each element in C order, its offset in Fortran-ordered storage.
/// `count` is the checked element count of `shape`.
fn fortran_offsets(shape: &[usize], count: usize) -> Vec<usize> {
    let mut strides = Vec::with_capacity(shape.len());
    let mut acc = 1;
    for &dim in shape {
        strides.push(acc);
        acc *= dim;
    }
    (0..count)
        .map(|mut linear| {
            let mut offset = 0;
            for (dim, stride) in shape.iter().zip(&strides).rev() {
                offset += (linear % dim) * stride;
                linear /= dim;
            }
            offset
        })
        .collect()
}

/// `_codecs.encode(text, 'latin1')`: how Python 3 pickles byte strings at protocol 2.
pub fn latin1_encode(args: &Object) -> Result<Object> {
    let (text, encoding) = match args {
        Object::Tuple(items) if items.len() == 2 => (items[0].as_str(), items[1].as_str()),
        Object::Tuple(items) if items.len() == 1 => (items[0].as_str(), Some("utf-8")),
        _ => (None, None),
    };
    match (text, encoding) {
        (Some(text), Some("latin1" | "latin-1" | "iso-8859-1")) => {
            Ok(Object::Bytes(latin1_bytes(text)?.into()))
        }
        (Some(text), Some("utf-8" | "utf8")) => Ok(Object::Bytes(text.as_bytes().into())),
        _ => Err(Error::Malformed(format!(
            "unsupported _codecs.encode arguments {}",
            args.kind()
        ))),
    }
}

fn latin1_bytes(text: &str) -> Result<Vec<u8>> {
    text.chars()
        .map(|c| {
            u8::try_from(c)
                .map_err(|_| Error::Malformed(format!("character {c:?} is not latin-1")))
        })
        .collect()
}

fn encode<O: ByteOrder>(elements: &Elements) -> (Scalar, Vec<u8>) {
    fn fill<T: Copy>(values: &[T], size: usize, write: impl Fn(&mut [u8], T)) -> Vec<u8> {
        let mut buf = vec![0u8; values.len() * size];
        for (chunk, &v) in buf.chunks_exact_mut(size).zip(values) {
            write(chunk, v);
        }
        buf
    }
    match elements {
        Elements::F32(v) => (Scalar::F32, fill(v, 4, O::write_f32)),
        Elements::F64(v) => (Scalar::F64, fill(v, 8, O::write_f64)),
        Elements::I64(v) => (Scalar::I64, fill(v, 8, O::write_i64)),
        Elements::U8(v) => (Scalar::U8, v.clone()),
    }
}

/// Writes protocol 2 pickles laid out the way numpy (under Python 2) emits them.
///
/// The caller drives the outer structure with [`mark`](Self::mark) and
/// [`tuple`](Self::tuple); arrays are written with [`array`](Self::array).
pub struct Pickler<W: Write> {
    out: W,
    endian: Endian,
    next_memo: u32,
    dtypes: HashMap<DType, u32>,
}

impl<W: Write> Pickler<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            endian: Endian::Little,
            next_memo: 0,
            dtypes: HashMap::new(),
        }
    }

    /// Byte order used for array data.
    pub fn with_endian(mut self, endian: Endian) -> Self {
        self.endian = endian;
        self
    }

    pub fn start(&mut self) -> io::Result<()> {
        self.out.write_all(&[OpCode::Proto as u8, 2])
    }

    pub fn mark(&mut self) -> io::Result<()> {
        self.op(OpCode::Mark)
    }

    /// Closes the innermost [`mark`](Self::mark) into a tuple.
    pub fn tuple(&mut self) -> io::Result<()> {
        self.op(OpCode::Tuple)
    }

    pub fn array(&mut self, array: &NdArray) -> io::Result<()> {
        let (scalar, raw) = match self.endian {
            Endian::Little => encode::<LittleEndian>(&array.elements),
            Endian::Big => encode::<BigEndian>(&array.elements),
        };

        self.global(RECONSTRUCT_MODULES[0], "_reconstruct")?;
        self.global("numpy", "ndarray")?;
        self.int(0)?;
        self.op(OpCode::Tuple1)?;
        self.bytes(b"b")?;
        self.op(OpCode::Tuple3)?;
        self.op(OpCode::Reduce)?;
        self.put()?;

        self.mark()?;
        self.int(1)?;
        self.mark()?;
        for &dim in &array.shape {
            self.int(dim as i64)?;
        }
        self.tuple()?;
        self.dtype(DType::new(scalar, self.endian))?;
        self.op(OpCode::NewFalse)?;
        self.bytes(&raw)?;
        self.tuple()?;
        self.op(OpCode::Build)
    }

    pub fn finish(mut self) -> io::Result<W> {
        self.op(OpCode::Stop)?;
        self.out.flush()?;
        Ok(self.out)
    }

    fn op(&mut self, op: OpCode) -> io::Result<()> {
        self.out.write_u8(op as u8)
    }

    fn global(&mut self, module_name: &str, class_name: &str) -> io::Result<()> {
        self.op(OpCode::Global)?;
        writeln!(self.out, "{module_name}")?;
        writeln!(self.out, "{class_name}")
    }

    fn int(&mut self, value: i64) -> io::Result<()> {
        match value {
            0..=0xff => {
                self.op(OpCode::BinInt1)?;
                self.out.write_u8(value as u8)
            }
            0x100..=0xffff => {
                self.op(OpCode::BinInt2)?;
                self.out.write_u16::<LittleEndian>(value as u16)
            }
            v if i32::try_from(v).is_ok() => {
                self.op(OpCode::BinInt)?;
                self.out.write_i32::<LittleEndian>(value as i32)
            }
            _ => {
                self.op(OpCode::Long1)?;
                self.out.write_u8(8)?;
                self.out.write_i64::<LittleEndian>(value)
            }
        }
    }

    /// A Python 2 `str`.
    fn bytes(&mut self, data: &[u8]) -> io::Result<()> {
        if data.len() < 256 {
            self.op(OpCode::ShortBinString)?;
            self.out.write_u8(data.len() as u8)?;
        } else {
            let len = i32::try_from(data.len())
                .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "array data over 2 GiB"))?;
            self.op(OpCode::BinString)?;
            self.out.write_i32::<LittleEndian>(len)?;
        }
        self.out.write_all(data)
    }

    fn put(&mut self) -> io::Result<u32> {
        let id = self.next_memo;
        self.next_memo += 1;
        if id < 256 {
            self.op(OpCode::BinPut)?;
            self.out.write_u8(id as u8)?;
        } else {
            self.op(OpCode::LongBinPut)?;
            self.out.write_u32::<LittleEndian>(id)?;
        }
        Ok(id)
    }

    fn get(&mut self, id: u32) -> io::Result<()> {
        if id < 256 {
            self.op(OpCode::BinGet)?;
            self.out.write_u8(id as u8)
        } else {
            self.op(OpCode::LongBinGet)?;
            self.out.write_u32::<LittleEndian>(id)
        }
    }

    /// Repeated dtypes are referenced through the memo, as numpy's pickles do.
    fn dtype(&mut self, dtype: DType) -> io::Result<()> {
        if let Some(&id) = self.dtypes.get(&dtype) {
            return self.get(id);
        }
        self.global("numpy", "dtype")?;
        self.bytes(dtype.scalar.code().as_bytes())?;
        self.int(0)?;
        self.int(1)?;
        self.op(OpCode::Tuple3)?;
        self.op(OpCode::Reduce)?;
        let id = self.put()?;

        self.mark()?;
        self.int(3)?;
        self.bytes(dtype.byte_order_str().as_bytes())?;
        self.op(OpCode::None)?;
        self.op(OpCode::None)?;
        self.op(OpCode::None)?;
        self.int(-1)?;
        self.int(-1)?;
        self.int(0)?;
        self.tuple()?;
        self.op(OpCode::Build)?;
        self.dtypes.insert(dtype, id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::pickle;

    fn pickle_arrays(arrays: &[&NdArray], endian: Endian) -> Vec<u8> {
        let mut pickler = Pickler::new(Vec::new()).with_endian(endian);
        pickler.start().unwrap();
        pickler.mark().unwrap();
        for array in arrays {
            pickler.array(array).unwrap();
        }
        pickler.tuple().unwrap();
        pickler.finish().unwrap()
    }

    fn unpickle_arrays(bytes: &[u8]) -> Vec<NdArray> {
        match pickle::load(&mut &bytes[..]).unwrap() {
            Object::Tuple(items) => items
                .into_iter()
                .map(|item| match item {
                    Object::Array(array) => (*array).clone(),
                    other => panic!("expected an array, got {other:?}"),
                })
                .collect(),
            other => panic!("expected a tuple, got {other:?}"),
        }
    }

    #[test]
    fn parses_type_strings() {
        assert_eq!(
            DType::parse("f4").unwrap(),
            DType::new(Scalar::F32, Endian::Little)
        );
        assert_eq!(
            DType::parse(">i8").unwrap(),
            DType::new(Scalar::I64, Endian::Big)
        );
        assert!(matches!(
            DType::parse("c16"),
            Err(Error::UnsupportedDType(code)) if code == "c16"
        ));
    }

    #[test]
    fn big_endian_arrays_with_shared_dtype() {
        // Both arrays reuse the memoized f4 dtype, which was memoized before its BUILD
        // switched it to big endian.
        let a = NdArray::new(vec![2, 2], Elements::F32(vec![0.5, -1.0, 2.25, 3.0])).unwrap();
        let b = NdArray::new(vec![3], Elements::F32(vec![1.0, 2.0, 3.0])).unwrap();
        let bytes = pickle_arrays(&[&a, &b], Endian::Big);
        assert_eq!(unpickle_arrays(&bytes), vec![a, b]);
    }

    #[test]
    fn integer_and_byte_arrays() {
        let labels = NdArray::new(vec![4], Elements::I64(vec![0, 9, -3, 1 << 40])).unwrap();
        let pixels = NdArray::new(vec![1, 3], Elements::U8(vec![0, 128, 255])).unwrap();
        let bytes = pickle_arrays(&[&labels, &pixels], Endian::Little);
        assert_eq!(unpickle_arrays(&bytes), vec![labels, pixels]);
    }

    #[test]
    fn fortran_order_is_relaid_in_c_order() {
        let dtype = DType::new(Scalar::U8, Endian::Little);
        // [[1, 2, 3], [4, 5, 6]] stored column major
        let state = Object::Tuple(vec![
            Object::Int(1),
            Object::Tuple(vec![Object::Int(2), Object::Int(3)]),
            Object::DType(dtype),
            Object::Bool(true),
            Object::Bytes(vec![1u8, 4, 2, 5, 3, 6].into()),
        ]);
        let array = array_from_state(state).unwrap();
        assert_eq!(array.shape, vec![2, 3]);
        assert_eq!(array.elements, Elements::U8(vec![1, 2, 3, 4, 5, 6]));
    }

    #[test]
    fn state_without_version_and_latin1_text_data() {
        let dtype = DType::new(Scalar::U16, Endian::Little);
        let state = Object::Tuple(vec![
            Object::Tuple(vec![Object::Int(2)]),
            Object::DType(dtype),
            Object::Int(0),
            Object::Unicode("\u{1}\u{0}\u{ff}\u{0}".to_string()),
        ]);
        let array = array_from_state(state).unwrap();
        assert_eq!(array.elements, Elements::I64(vec![1, 255]));
    }

    #[test]
    fn python3_protocol2_bytes_via_codecs() {
        let args = Object::Tuple(vec![
            Object::Unicode("\u{0}\u{80}".to_string()),
            Object::Unicode("latin1".to_string()),
        ]);
        assert_eq!(
            latin1_encode(&args).unwrap(),
            Object::Bytes(vec![0u8, 0x80].into())
        );
    }

    #[test]
    fn raw_data_length_must_match_shape() {
        let state = Object::Tuple(vec![
            Object::Int(1),
            Object::Tuple(vec![Object::Int(3)]),
            Object::DType(DType::new(Scalar::F32, Endian::Little)),
            Object::Bool(false),
            Object::Bytes(vec![0u8; 8].into()),
        ]);
        let err = array_from_state(state).unwrap_err();
        assert!(err.to_string().contains("needs 12 bytes, found 8"), "{err}");
    }

    #[test]
    fn overflowing_shape_is_malformed() {
        // 4 * 2^62 elements wraps to 0 in release builds, which would match empty data.
        let state = Object::Tuple(vec![
            Object::Int(1),
            Object::Tuple(vec![Object::Int(4), Object::Int(1 << 62)]),
            Object::DType(DType::new(Scalar::F32, Endian::Little)),
            Object::Bool(true),
            Object::Bytes(Vec::new().into()),
        ]);
        let err = array_from_state(state).unwrap_err();
        assert!(err.to_string().contains("overflows"), "{err}");
    }

    // Python 2.7 `cPickle.dumps(pair, 2)` of numpy's `__reduce__` tuples for
    // `(np.zeros((1, 784), 'f4'), np.array([7]))`, split around the 3136 zero
    // bytes of image data.
    const PY2_HEAD: &[u8] = b"\
        \x80\x02cnumpy.core.multiarray\n_reconstruct\nq\x01cnumpy\nndarray\nq\
        \x02K\x00\x85U\x01b\x87Rq\x03(K\x01K\x01M\x10\x03\x86q\x04cnumpy\ndtype\
        \nq\x05U\x02f4q\x06K\x00K\x01\x87Rq\x07(K\x03U\x01<NNNJ\xff\xff\xff\xffJ\
        \xff\xff\xff\xffK\x00tb\x89T@\x0c\x00\x00";
    const PY2_TAIL: &[u8] = b"\
        q\x08tbh\x01h\x02K\x00\x85U\x01b\x87Rq\t(K\x01K\x01\x85q\nh\x05U\x02i8q\
        \x0bK\x00K\x01\x87Rq\x0c(K\x03U\x01<NNNJ\xff\xff\xff\xffJ\xff\xff\xff\
        \xffK\x00tb\x89U\x08\x07\x00\x00\x00\x00\x00\x00\x00q\x0dtb\x86.";

    // Python 3.11 `pickle.dumps(pair, 2)` of the same reduce layout, as a
    // re-pickle after `encoding='latin1'` produces: strings are BINUNICODE and
    // raw data goes through `_codecs.encode`. Images [[0.0, 0.5, 1.0, 0.25]],
    // labels [7].
    const PY3_LATIN1: &[u8] = b"\
        \x80\x02cnumpy.core.multiarray\n_reconstruct\nq\x00cnumpy\nndarray\nq\
        \x01K\x00\x85q\x02c_codecs\nencode\nq\x03X\x01\x00\x00\x00bq\x04X\x06\
        \x00\x00\x00latin1q\x05\x86q\x06Rq\x07\x87q\x08Rq\t(K\x01K\x01K\x04\x86q\
        \ncnumpy\ndtype\nq\x0bX\x02\x00\x00\x00f4q\x0c\x89\x88\x87q\x0dRq\x0e(K\
        \x03X\x01\x00\x00\x00<q\x0fNNNJ\xff\xff\xff\xffJ\xff\xff\xff\xffK\x00tq\
        \x10b\x89h\x03X\x12\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00?\x00\x00\xc2\
        \x80?\x00\x00\xc2\x80>q\x11h\x05\x86q\x12Rq\x13tq\x14bh\x00h\x01K\x00\
        \x85q\x15h\x07\x87q\x16Rq\x17(K\x01K\x01\x85q\x18h\x0bX\x02\x00\x00\x00i\
        8q\x19\x89\x88\x87q\x1aRq\x1b(K\x03h\x0fNNNJ\xff\xff\xff\xffJ\xff\xff\
        \xff\xffK\x00tq\x1cb\x89h\x03X\x08\x00\x00\x00\x07\x00\x00\x00\x00\x00\
        \x00\x00q\x1dh\x05\x86q\x1eRq\x1ftq\x20b\x86q!.";

    #[test]
    fn python2_cpickle_arrays() {
        let mut bytes = PY2_HEAD.to_vec();
        bytes.extend(std::iter::repeat(0u8).take(3136));
        bytes.extend_from_slice(PY2_TAIL);
        assert_eq!(
            unpickle_arrays(&bytes),
            vec![
                NdArray::new(vec![1, 784], Elements::F32(vec![0.0; 784])).unwrap(),
                NdArray::new(vec![1], Elements::I64(vec![7])).unwrap(),
            ]
        );
    }

    #[test]
    fn python3_latin1_repickle() {
        assert_eq!(
            unpickle_arrays(PY3_LATIN1),
            vec![
                NdArray::new(vec![1, 4], Elements::F32(vec![0.0, 0.5, 1.0, 0.25])).unwrap(),
                NdArray::new(vec![1], Elements::I64(vec![7])).unwrap(),
            ]
        );
    }
}
