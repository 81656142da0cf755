// Just enough pickle support to read numpy arrays out of a pickled tuple.
// Objects that numpy needs for array reconstruction are interpreted in `numpy`;
// everything else is kept as an opaque `Reduce`.
use std::collections::HashMap;
use std::io::{self, BufRead, Read};
use std::rc::Rc;

use byteorder::{BigEndian, LittleEndian, ReadBytesExt};

use super::model::NdArray;
use super::numpy::{self, DType};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("reading pickle stream: {0}")]
    Io(#[from] std::io::Error),
    #[error("unknown op-code 0x{0:02x}")]
    UnknownOpCode(u8),
    #[error("unexpected empty stack")]
    EmptyStack,
    #[error("marker object not found")]
    MissingMark,
    #[error("missing object in memo {0}")]
    MissingMemo(u32),
    #[error("unsupported dtype '{0}'")]
    UnsupportedDType(String),
    #[error("{0}")]
    Malformed(String),
}

// https://github.com/python/cpython/blob/main/Lib/pickletools.py
#[repr(u8)]
#[derive(Debug, Eq, PartialEq, Clone, Copy)]
pub enum OpCode {
    Proto = 0x80,
    Frame = 0x95,
    Stop = b'.',
    Mark = b'(',
    Pop = b'0',
    PopMark = b'1',
    Dup = b'2',
    None = b'N',
    NewTrue = 0x88,
    NewFalse = 0x89,
    Int = b'I',
    BinInt = b'J',
    BinInt1 = b'K',
    BinInt2 = b'M',
    Long = b'L',
    Long1 = 0x8a,
    Long4 = 0x8b,
    Float = b'F',
    BinFloat = b'G',
    String = b'S',
    BinString = b'T',
    ShortBinString = b'U',
    BinBytes = b'B',
    ShortBinBytes = b'C',
    BinBytes8 = 0x8e,
    Unicode = b'V',
    BinUnicode = b'X',
    ShortBinUnicode = 0x8c,
    BinUnicode8 = 0x8d,
    EmptyTuple = b')',
    Tuple = b't',
    Tuple1 = 0x85,
    Tuple2 = 0x86,
    Tuple3 = 0x87,
    EmptyList = b']',
    List = b'l',
    Append = b'a',
    Appends = b'e',
    EmptyDict = b'}',
    Dict = b'd',
    SetItem = b's',
    SetItems = b'u',
    Global = b'c',
    StackGlobal = 0x93,
    Reduce = b'R',
    NewObj = 0x81,
    Build = b'b',
    Put = b'p',
    BinPut = b'q',
    LongBinPut = b'r',
    Memoize = 0x94,
    Get = b'g',
    BinGet = b'h',
    LongBinGet = b'j',
}

impl TryFrom<u8> for OpCode {
    type Error = u8;
    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            0x80 => Ok(Self::Proto),
            0x95 => Ok(Self::Frame),
            b'.' => Ok(Self::Stop),
            b'(' => Ok(Self::Mark),
            b'0' => Ok(Self::Pop),
            b'1' => Ok(Self::PopMark),
            b'2' => Ok(Self::Dup),
            b'N' => Ok(Self::None),
            0x88 => Ok(Self::NewTrue),
            0x89 => Ok(Self::NewFalse),
            b'I' => Ok(Self::Int),
            b'J' => Ok(Self::BinInt),
            b'K' => Ok(Self::BinInt1),
            b'M' => Ok(Self::BinInt2),
            b'L' => Ok(Self::Long),
            0x8a => Ok(Self::Long1),
            0x8b => Ok(Self::Long4),
            b'F' => Ok(Self::Float),
            b'G' => Ok(Self::BinFloat),
            b'S' => Ok(Self::String),
            b'T' => Ok(Self::BinString),
            b'U' => Ok(Self::ShortBinString),
            b'B' => Ok(Self::BinBytes),
            b'C' => Ok(Self::ShortBinBytes),
            0x8e => Ok(Self::BinBytes8),
            b'V' => Ok(Self::Unicode),
            b'X' => Ok(Self::BinUnicode),
            0x8c => Ok(Self::ShortBinUnicode),
            0x8d => Ok(Self::BinUnicode8),
            b')' => Ok(Self::EmptyTuple),
            b't' => Ok(Self::Tuple),
            0x85 => Ok(Self::Tuple1),
            0x86 => Ok(Self::Tuple2),
            0x87 => Ok(Self::Tuple3),
            b']' => Ok(Self::EmptyList),
            b'l' => Ok(Self::List),
            b'a' => Ok(Self::Append),
            b'e' => Ok(Self::Appends),
            b'}' => Ok(Self::EmptyDict),
            b'd' => Ok(Self::Dict),
            b's' => Ok(Self::SetItem),
            b'u' => Ok(Self::SetItems),
            b'c' => Ok(Self::Global),
            0x93 => Ok(Self::StackGlobal),
            b'R' => Ok(Self::Reduce),
            0x81 => Ok(Self::NewObj),
            b'b' => Ok(Self::Build),
            b'p' => Ok(Self::Put),
            b'q' => Ok(Self::BinPut),
            b'r' => Ok(Self::LongBinPut),
            0x94 => Ok(Self::Memoize),
            b'g' => Ok(Self::Get),
            b'h' => Ok(Self::BinGet),
            b'j' => Ok(Self::LongBinGet),
            value => Err(value),
        }
    }
}

/// A decoded Python object.
///
/// Byte strings and arrays sit behind `Rc` so that memo copies stay cheap.
#[derive(Debug, Clone, PartialEq)]
pub enum Object {
    Mark,
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    /// Python 2 `str` and Python 3 `bytes`.
    Bytes(Rc<[u8]>),
    Unicode(String),
    Tuple(Vec<Object>),
    List(Vec<Object>),
    Dict(Vec<(Object, Object)>),
    Class {
        module_name: String,
        class_name: String,
    },
    Reduce {
        callable: Box<Object>,
        args: Box<Object>,
    },
    DType(DType),
    Array(Rc<NdArray>),
}

impl Object {
    /// Text content of a `str`, accepting Python 2 byte strings as long as they are UTF-8.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Object::Unicode(s) => Some(s),
            Object::Bytes(b) => std::str::from_utf8(b).ok(),
            _ => None,
        }
    }

    /// Short type name used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Object::Mark => "mark",
            Object::None => "None",
            Object::Bool(_) => "bool",
            Object::Int(_) => "int",
            Object::Float(_) => "float",
            Object::Bytes(_) => "bytes",
            Object::Unicode(_) => "str",
            Object::Tuple(_) => "tuple",
            Object::List(_) => "list",
            Object::Dict(_) => "dict",
            Object::Class { .. } => "class",
            Object::Reduce { .. } => "reduced object",
            Object::DType(_) => "numpy.dtype",
            Object::Array(_) => "numpy.ndarray",
        }
    }
}

impl TryFrom<Object> for usize {
    type Error = Object;
    fn try_from(value: Object) -> std::result::Result<Self, Self::Error> {
        match value {
            Object::Int(s) if s >= 0 => Ok(s as usize),
            other => Err(other),
        }
    }
}

impl<T: TryFrom<Object, Error = Object>> TryFrom<Object> for Vec<T> {
    type Error = Object;
    fn try_from(value: Object) -> std::result::Result<Self, Self::Error> {
        match value {
            Object::Tuple(values) | Object::List(values) => {
                // On failure this reports the first element that did not convert,
                // not the whole sequence.
                values
                    .into_iter()
                    .map(|v| T::try_from(v))
                    .collect::<std::result::Result<Vec<T>, Self::Error>>()
            }
            other => Err(other),
        }
    }
}

/// Callables that get interpreted at REDUCE time instead of being kept opaque.
enum Reconstructor {
    DType,
    Latin1Encode,
}

impl Reconstructor {
    fn lookup(module_name: &str, class_name: &str) -> Option<Self> {
        match (module_name, class_name) {
            ("numpy", "dtype") => Some(Self::DType),
            ("_codecs", "encode") => Some(Self::Latin1Encode),
            _ => None,
        }
    }
}

/// A stack entry. `id` identifies the underlying Python object so that
/// in-place mutations can be mirrored into memo copies.
#[derive(Debug, Clone)]
struct Slot {
    id: u64,
    obj: Object,
}

#[derive(Debug, Default)]
pub struct Stack {
    stack: Vec<Slot>,
    memo: HashMap<u32, Slot>,
    next_id: u64,
    protocol: u8,
}

impl Stack {
    pub fn empty() -> Self {
        Self {
            stack: Vec::with_capacity(512),
            ..Default::default()
        }
    }

    /// Protocol announced by the PROTO op-code, 0 when absent.
    pub fn protocol(&self) -> u8 {
        self.protocol
    }

    pub fn read_loop<R: BufRead>(&mut self, r: &mut R) -> Result<()> {
        loop {
            if self.read(r)? {
                break;
            }
        }
        Ok(())
    }

    pub fn finalize(mut self) -> Result<Object> {
        // Dropping the memo first leaves the result as the sole owner of its arrays.
        self.memo.clear();
        self.pop()
    }

    fn push(&mut self, obj: Object) {
        let id = self.next_id;
        self.next_id += 1;
        self.stack.push(Slot { id, obj })
    }

    fn pop(&mut self) -> Result<Object> {
        self.stack.pop().map(|slot| slot.obj).ok_or(Error::EmptyStack)
    }

    fn last_mut(&mut self) -> Result<&mut Slot> {
        self.stack.last_mut().ok_or(Error::EmptyStack)
    }

    /// Propagates an in-place change of the top object to its memo copies.
    fn sync_memo(&mut self) {
        if let Some(top) = self.stack.last() {
            for slot in self.memo.values_mut() {
                if slot.id == top.id {
                    slot.obj = top.obj.clone();
                }
            }
        }
    }

    fn memo_get(&mut self, id: u32) -> Result<()> {
        let slot = self.memo.get(&id).ok_or(Error::MissingMemo(id))?.clone();
        self.stack.push(slot);
        Ok(())
    }

    fn memo_put(&mut self, id: u32) -> Result<()> {
        let slot = self.stack.last().ok_or(Error::EmptyStack)?.clone();
        self.memo.insert(id, slot);
        Ok(())
    }

    fn pop_to_marker(&mut self) -> Result<Vec<Object>> {
        let mark_idx = self
            .stack
            .iter()
            .rposition(|slot| matches!(slot.obj, Object::Mark))
            .ok_or(Error::MissingMark)?;
        let objs = self
            .stack
            .split_off(mark_idx + 1)
            .into_iter()
            .map(|slot| slot.obj)
            .collect();
        self.stack.pop();
        Ok(objs)
    }

    fn reduce(&mut self) -> Result<()> {
        let args = self.pop()?;
        let callable = self.pop()?;
        let reconstructor = match &callable {
            Object::Class {
                module_name,
                class_name,
            } => Reconstructor::lookup(module_name, class_name),
            _ => None,
        };
        let reduced = match reconstructor {
            Some(Reconstructor::DType) => Object::DType(DType::from_reduce_args(&args)?),
            Some(Reconstructor::Latin1Encode) => numpy::latin1_encode(&args)?,
            None => Object::Reduce {
                callable: Box::new(callable),
                args: Box::new(args),
            },
        };
        self.push(reduced);
        Ok(())
    }

    fn build(&mut self) -> Result<()> {
        let state = self.pop()?;
        let top = self.last_mut()?;
        let obj = std::mem::replace(&mut top.obj, Object::None);
        top.obj = match (obj, state) {
            (Object::Dict(mut items), Object::Dict(extra)) => {
                items.extend(extra);
                Object::Dict(items)
            }
            (Object::DType(dtype), state) => Object::DType(dtype.with_state(&state)?),
            (obj, state) if numpy::is_array_reconstruct(&obj) => {
                Object::Array(Rc::new(numpy::array_from_state(state)?))
            }
            (obj, state) => {
                log::debug!("ignoring BUILD state {} for {}", state.kind(), obj.kind());
                obj
            }
        };
        self.sync_memo();
        Ok(())
    }

    fn append(&mut self, mut values: Vec<Object>) -> Result<()> {
        let top = self.last_mut()?;
        match &mut top.obj {
            Object::List(items) => items.append(&mut values),
            other => {
                return Err(Error::Malformed(format!(
                    "cannot append to a {}",
                    other.kind()
                )))
            }
        }
        self.sync_memo();
        Ok(())
    }

    fn set_items(&mut self, objs: Vec<Object>) -> Result<()> {
        if objs.len() % 2 != 0 {
            return Err(Error::Malformed(
                "setitems: not an even number of objects".to_string(),
            ));
        }
        let top = self.last_mut()?;
        match &mut top.obj {
            Object::Dict(d) => {
                let mut objs = objs.into_iter();
                while let (Some(key), Some(value)) = (objs.next(), objs.next()) {
                    d.push((key, value))
                }
            }
            other => {
                return Err(Error::Malformed(format!(
                    "expected a dict, got {}",
                    other.kind()
                )))
            }
        }
        self.sync_memo();
        Ok(())
    }

    /// Executes one op-code. Returns `true` once STOP is reached.
    pub fn read<R: BufRead>(&mut self, r: &mut R) -> Result<bool> {
        let op_code = match OpCode::try_from(r.read_u8()?) {
            Ok(op_code) => op_code,
            Err(op_code) => return Err(Error::UnknownOpCode(op_code)),
        };
        match op_code {
            OpCode::Proto => {
                self.protocol = r.read_u8()?;
                log::debug!("pickle protocol {}", self.protocol);
            }
            // Frames only group op-codes for buffered reads.
            OpCode::Frame => {
                r.read_u64::<LittleEndian>()?;
            }
            OpCode::Stop => return Ok(true),
            OpCode::Mark => self.push(Object::Mark),
            OpCode::Pop => {
                self.pop()?;
            }
            OpCode::PopMark => {
                self.pop_to_marker()?;
            }
            OpCode::Dup => {
                let top = self.stack.last().ok_or(Error::EmptyStack)?.clone();
                self.stack.push(top);
            }
            OpCode::None => self.push(Object::None),
            OpCode::NewTrue => self.push(Object::Bool(true)),
            OpCode::NewFalse => self.push(Object::Bool(false)),
            OpCode::Int => {
                let line = read_line(r)?;
                let obj = match line.as_str() {
                    "00" => Object::Bool(false),
                    "01" => Object::Bool(true),
                    text => Object::Int(parse_decimal(text)?),
                };
                self.push(obj)
            }
            OpCode::BinInt => {
                let arg = r.read_i32::<LittleEndian>()?;
                self.push(Object::Int(arg as i64))
            }
            OpCode::BinInt1 => {
                let arg = r.read_u8()?;
                self.push(Object::Int(arg as i64))
            }
            OpCode::BinInt2 => {
                let arg = r.read_u16::<LittleEndian>()?;
                self.push(Object::Int(arg as i64))
            }
            OpCode::Long => {
                let line = read_line(r)?;
                let value = parse_decimal(line.trim_end_matches('L'))?;
                self.push(Object::Int(value))
            }
            OpCode::Long1 => {
                let len = r.read_u8()? as usize;
                let value = read_long(r, len)?;
                self.push(Object::Int(value))
            }
            OpCode::Long4 => {
                let len = read_len(r.read_i32::<LittleEndian>()? as i64)?;
                let value = read_long(r, len)?;
                self.push(Object::Int(value))
            }
            OpCode::Float => {
                let line = read_line(r)?;
                let value = line
                    .parse::<f64>()
                    .map_err(|_| Error::Malformed(format!("invalid FLOAT literal '{line}'")))?;
                self.push(Object::Float(value))
            }
            OpCode::BinFloat => {
                let value = r.read_f64::<BigEndian>()?;
                self.push(Object::Float(value))
            }
            OpCode::String => {
                let line = read_to_newline(r)?;
                let data = unescape_string_literal(&line)?;
                self.push(Object::Bytes(data.into()))
            }
            OpCode::BinString => {
                let len = read_len(r.read_i32::<LittleEndian>()? as i64)?;
                let data = read_bytes(r, len)?;
                self.push(Object::Bytes(data.into()))
            }
            OpCode::ShortBinString | OpCode::ShortBinBytes => {
                let len = r.read_u8()? as usize;
                let data = read_bytes(r, len)?;
                self.push(Object::Bytes(data.into()))
            }
            OpCode::BinBytes => {
                let len = r.read_u32::<LittleEndian>()? as usize;
                let data = read_bytes(r, len)?;
                self.push(Object::Bytes(data.into()))
            }
            OpCode::BinBytes8 => {
                let len = read_len_u64(r.read_u64::<LittleEndian>()?)?;
                let data = read_bytes(r, len)?;
                self.push(Object::Bytes(data.into()))
            }
            OpCode::Unicode => {
                let line = read_to_newline(r)?;
                let data = decode_raw_unicode_escape(&line)?;
                self.push(Object::Unicode(data))
            }
            OpCode::BinUnicode => {
                let len = r.read_u32::<LittleEndian>()? as usize;
                let data = read_utf8(r, len)?;
                self.push(Object::Unicode(data))
            }
            OpCode::ShortBinUnicode => {
                let len = r.read_u8()? as usize;
                let data = read_utf8(r, len)?;
                self.push(Object::Unicode(data))
            }
            OpCode::BinUnicode8 => {
                let len = read_len_u64(r.read_u64::<LittleEndian>()?)?;
                let data = read_utf8(r, len)?;
                self.push(Object::Unicode(data))
            }
            OpCode::EmptyTuple => self.push(Object::Tuple(vec![])),
            OpCode::Tuple => {
                let objs = self.pop_to_marker()?;
                self.push(Object::Tuple(objs))
            }
            OpCode::Tuple1 => {
                let obj = self.pop()?;
                self.push(Object::Tuple(vec![obj]))
            }
            OpCode::Tuple2 => {
                let obj2 = self.pop()?;
                let obj1 = self.pop()?;
                self.push(Object::Tuple(vec![obj1, obj2]))
            }
            OpCode::Tuple3 => {
                let obj3 = self.pop()?;
                let obj2 = self.pop()?;
                let obj1 = self.pop()?;
                self.push(Object::Tuple(vec![obj1, obj2, obj3]))
            }
            OpCode::EmptyList => self.push(Object::List(vec![])),
            OpCode::List => {
                let objs = self.pop_to_marker()?;
                self.push(Object::List(objs))
            }
            OpCode::Append => {
                let value = self.pop()?;
                self.append(vec![value])?
            }
            OpCode::Appends => {
                let values = self.pop_to_marker()?;
                self.append(values)?
            }
            OpCode::EmptyDict => self.push(Object::Dict(vec![])),
            OpCode::Dict => {
                let objs = self.pop_to_marker()?;
                self.push(Object::Dict(vec![]));
                self.set_items(objs)?
            }
            OpCode::SetItem => {
                let value = self.pop()?;
                let key = self.pop()?;
                self.set_items(vec![key, value])?
            }
            OpCode::SetItems => {
                let objs = self.pop_to_marker()?;
                self.set_items(objs)?
            }
            OpCode::Global => {
                let module_name = read_line(r)?;
                let class_name = read_line(r)?;
                self.push(Object::Class {
                    module_name,
                    class_name,
                })
            }
            OpCode::StackGlobal => {
                let class_name = self.pop()?;
                let module_name = self.pop()?;
                match (module_name.as_str(), class_name.as_str()) {
                    (Some(module_name), Some(class_name)) => self.push(Object::Class {
                        module_name: module_name.to_string(),
                        class_name: class_name.to_string(),
                    }),
                    _ => {
                        return Err(Error::Malformed(format!(
                            "STACK_GLOBAL expects two strings, got {} and {}",
                            module_name.kind(),
                            class_name.kind()
                        )))
                    }
                }
            }
            // NEWOBJ leaves (cls, args) on the stack just like REDUCE's (callable, args).
            OpCode::Reduce | OpCode::NewObj => self.reduce()?,
            OpCode::Build => self.build()?,
            OpCode::Put => {
                let id = parse_memo_id(&read_line(r)?)?;
                self.memo_put(id)?
            }
            OpCode::BinPut => {
                let arg = r.read_u8()?;
                self.memo_put(arg as u32)?
            }
            OpCode::LongBinPut => {
                let arg = r.read_u32::<LittleEndian>()?;
                self.memo_put(arg)?
            }
            OpCode::Memoize => {
                let id = self.memo.len() as u32;
                self.memo_put(id)?
            }
            OpCode::Get => {
                let id = parse_memo_id(&read_line(r)?)?;
                self.memo_get(id)?
            }
            OpCode::BinGet => {
                let arg = r.read_u8()?;
                self.memo_get(arg as u32)?
            }
            OpCode::LongBinGet => {
                let arg = r.read_u32::<LittleEndian>()?;
                self.memo_get(arg)?
            }
        }
        Ok(false)
    }
}

/// Runs a whole pickle stream and returns the object it encodes.
pub fn load<R: BufRead>(r: &mut R) -> Result<Object> {
    let mut stack = Stack::empty();
    stack.read_loop(r)?;
    log::info!("decoded pickle (protocol {})", stack.protocol());
    stack.finalize()
}

fn read_to_newline<R: BufRead>(r: &mut R) -> Result<Vec<u8>> {
    let mut data: Vec<u8> = Vec::with_capacity(32);
    r.read_until(b'\n', &mut data)?;
    if data.pop() != Some(b'\n') {
        return Err(Error::Malformed("line is missing its newline".to_string()));
    }
    if data.last() == Some(&b'\r') {
        data.pop();
    }
    Ok(data)
}

fn read_line<R: BufRead>(r: &mut R) -> Result<String> {
    let data = read_to_newline(r)?;
    String::from_utf8(data).map_err(|e| Error::Malformed(format!("non UTF-8 text line: {e}")))
}

/// Reads `len` bytes. The buffer grows with the data actually read, so a bogus
/// length in a corrupt stream ends in an error rather than a huge allocation.
fn read_bytes<R: BufRead>(r: &mut R, len: usize) -> Result<Vec<u8>> {
    let mut data = Vec::new();
    r.by_ref().take(len as u64).read_to_end(&mut data)?;
    if data.len() != len {
        return Err(Error::Io(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("expected {len} bytes, stream ended after {}", data.len()),
        )));
    }
    Ok(data)
}

fn read_utf8<R: BufRead>(r: &mut R, len: usize) -> Result<String> {
    let data = read_bytes(r, len)?;
    String::from_utf8(data).map_err(|e| Error::Malformed(format!("invalid UTF-8 string: {e}")))
}

fn read_len(len: i64) -> Result<usize> {
    usize::try_from(len).map_err(|_| Error::Malformed(format!("negative length {len}")))
}

fn read_len_u64(len: u64) -> Result<usize> {
    usize::try_from(len).map_err(|_| Error::Malformed(format!("length {len} does not fit in memory")))
}

/// Little-endian two's complement integer of `len` bytes, as written by LONG1/LONG4.
fn read_long<R: BufRead>(r: &mut R, len: usize) -> Result<i64> {
    if len > 8 {
        return Err(Error::Malformed(format!(
            "{len}-byte integer does not fit in 64 bits"
        )));
    }
    let data = read_bytes(r, len)?;
    let negative = data.last().is_some_and(|b| b & 0x80 != 0);
    let mut bytes = [if negative { 0xff } else { 0 }; 8];
    bytes[..len].copy_from_slice(&data);
    Ok(i64::from_le_bytes(bytes))
}

fn parse_decimal(text: &str) -> Result<i64> {
    text.parse::<i64>()
        .map_err(|_| Error::Malformed(format!("invalid integer literal '{text}'")))
}

fn parse_memo_id(text: &str) -> Result<u32> {
    text.parse::<u32>()
        .map_err(|_| Error::Malformed(format!("invalid memo key '{text}'")))
}

fn hex_value(digits: &[u8]) -> Option<u32> {
    let text = std::str::from_utf8(digits).ok()?;
    u32::from_str_radix(text, 16).ok()
}

/// Decodes the `repr()` of a Python 2 `str`, as written by the STRING op-code.
fn unescape_string_literal(line: &[u8]) -> Result<Vec<u8>> {
    let body = line
        .strip_prefix(b"'")
        .and_then(|s| s.strip_suffix(b"'"))
        .or_else(|| line.strip_prefix(b"\"").and_then(|s| s.strip_suffix(b"\"")))
        .ok_or_else(|| Error::Malformed("STRING literal is not quoted".to_string()))?;

    let mut out = Vec::with_capacity(body.len());
    let mut i = 0;
    while i < body.len() {
        if body[i] != b'\\' {
            out.push(body[i]);
            i += 1;
            continue;
        }
        match body.get(i + 1) {
            Some(b'n') => out.push(b'\n'),
            Some(b'r') => out.push(b'\r'),
            Some(b't') => out.push(b'\t'),
            Some(b'\\') => out.push(b'\\'),
            Some(b'\'') => out.push(b'\''),
            Some(b'"') => out.push(b'"'),
            Some(b'x') => {
                let value = body
                    .get(i + 2..i + 4)
                    .and_then(hex_value)
                    .ok_or_else(|| Error::Malformed("bad \\x escape in STRING".to_string()))?;
                out.push(value as u8);
                i += 2;
            }
            Some(&other) => {
                out.push(b'\\');
                out.push(other);
            }
            None => return Err(Error::Malformed("dangling escape in STRING".to_string())),
        }
        i += 2;
    }
    Ok(out)
}

/// Decodes Python's `raw-unicode-escape` codec used by the UNICODE op-code.
fn decode_raw_unicode_escape(raw: &[u8]) -> Result<String> {
    let mut out = String::with_capacity(raw.len());
    let mut i = 0;
    while i < raw.len() {
        let width = match (raw[i], raw.get(i + 1)) {
            (b'\\', Some(b'u')) => 4,
            (b'\\', Some(b'U')) => 8,
            (byte, _) => {
                out.push(byte as char);
                i += 1;
                continue;
            }
        };
        let code = raw
            .get(i + 2..i + 2 + width)
            .and_then(hex_value)
            .and_then(char::from_u32)
            .ok_or_else(|| Error::Malformed("bad unicode escape in UNICODE".to_string()))?;
        out.push(code);
        i += 2 + width;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(bytes: &[u8]) -> Result<Object> {
        load(&mut &bytes[..])
    }

    #[test]
    fn protocol_zero_tuple() {
        // pickle.dumps((1, 'ab', None), protocol=0) from Python 2
        let obj = decode(b"(I1\nS'ab'\np0\nNtp1\n.").unwrap();
        assert_eq!(
            obj,
            Object::Tuple(vec![
                Object::Int(1),
                Object::Bytes(b"ab".to_vec().into()),
                Object::None,
            ])
        );
    }

    #[test]
    fn protocol_zero_bools_and_longs() {
        let obj = decode(b"(I00\nI01\nL12345678901L\nF0.5\nt.").unwrap();
        assert_eq!(
            obj,
            Object::Tuple(vec![
                Object::Bool(false),
                Object::Bool(true),
                Object::Int(12_345_678_901),
                Object::Float(0.5),
            ])
        );
    }

    #[test]
    fn string_escapes() {
        let obj = decode(b"S'a\\x00\\'b\\n'\n.").unwrap();
        assert_eq!(obj, Object::Bytes(b"a\x00'b\n".to_vec().into()));
    }

    #[test]
    fn raw_unicode_escape() {
        let obj = decode(b"Vcaf\\u00e9\n.").unwrap();
        assert_eq!(obj, Object::Unicode("caf\u{e9}".to_string()));
    }

    #[test]
    fn binary_scalars() {
        let mut bytes = vec![0x80, 2, b'('];
        bytes.extend([b'J', 0xff, 0xff, 0xff, 0xff]); // -1
        bytes.extend([0x8a, 2, 0x00, 0x80]); // -32768
        bytes.push(b'G');
        bytes.extend(1.5f64.to_be_bytes());
        bytes.extend([0x8c, 2, b'h', b'i']);
        bytes.extend([b't', b'.']);
        let obj = decode(&bytes).unwrap();
        assert_eq!(
            obj,
            Object::Tuple(vec![
                Object::Int(-1),
                Object::Int(-32768),
                Object::Float(1.5),
                Object::Unicode("hi".to_string()),
            ])
        );
    }

    #[test]
    fn memo_sees_mutations_made_after_put() {
        // l = []; (l, l) with l filled after memoization, protocol 2 layout
        let bytes = [
            0x80, 2, b']', b'q', 0, b'(', b'K', 1, b'K', 2, b'e', b'h', 0, 0x86, b'.',
        ];
        let obj = decode(&bytes).unwrap();
        let list = Object::List(vec![Object::Int(1), Object::Int(2)]);
        assert_eq!(obj, Object::Tuple(vec![list.clone(), list]));
    }

    #[test]
    fn dict_keeps_insertion_order() {
        let bytes = [
            b'}', b'(', b'K', 1, b'K', 10, b'K', 2, b'K', 20, b'u', b'.',
        ];
        let obj = decode(&bytes).unwrap();
        assert_eq!(
            obj,
            Object::Dict(vec![
                (Object::Int(1), Object::Int(10)),
                (Object::Int(2), Object::Int(20)),
            ])
        );
    }

    #[test]
    fn unknown_globals_stay_opaque() {
        let obj = decode(b"cfoo\nBar\n)R.").unwrap();
        assert_eq!(
            obj,
            Object::Reduce {
                callable: Box::new(Object::Class {
                    module_name: "foo".to_string(),
                    class_name: "Bar".to_string(),
                }),
                args: Box::new(Object::Tuple(vec![])),
            }
        );
    }

    #[test]
    fn errors() {
        assert!(matches!(decode(&[0xff]), Err(Error::UnknownOpCode(0xff))));
        assert!(matches!(decode(b"t."), Err(Error::MissingMark)));
        assert!(matches!(decode(b"h\x07."), Err(Error::MissingMemo(7))));
        assert!(matches!(decode(b"."), Err(Error::EmptyStack)));
        // Truncated: BINUNICODE announces more bytes than available.
        assert!(matches!(
            decode(b"X\x10\x00\x00\x00abc"),
            Err(Error::Io(_))
        ));
        // No STOP at all.
        assert!(matches!(decode(b"K\x01"), Err(Error::Io(_))));
    }

    #[test]
    fn oversized_lengths_fail_without_allocating() {
        let truncated = |err: Result<Object>| {
            matches!(err, Err(Error::Io(e)) if e.kind() == io::ErrorKind::UnexpectedEof)
        };
        // BINBYTES8 announcing 2^50 bytes.
        let mut bytes8 = vec![0x80, 4, 0x8e];
        bytes8.extend_from_slice(&(1u64 << 50).to_le_bytes());
        assert!(truncated(decode(&bytes8)));
        // BINSTRING and BINUNICODE announcing 2 GiB.
        assert!(truncated(decode(b"T\xff\xff\xff\x7fabc")));
        assert!(truncated(decode(b"X\xff\xff\xff\xffabc")));
    }
}
