//! Request framing and response serialization.
//!
//! A request frame is `LE32 len` followed by `len` bytes: `LE32 argc`, then
//! `argc` occurrences of `(LE32 size, size bytes)`. A response frame is
//! `LE32 len` followed by exactly `len` bytes carrying one tagged [`Value`].

/// Maximum total frame size, including the 4-byte length prefix.
pub const K_MAX_MSG: usize = 4096 + 4;
/// Maximum number of arguments in a request.
pub const K_MAX_ARGS: usize = 1024;

/// Error codes carried in [`Value::Err`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrCode {
    Unknown = 1,
    TooBig = 2,
    Type = 3,
    Arg = 4,
}

/// A tagged value as carried in a response frame (and recursively inside
/// `Value::Arr`).
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Nil,
    Err(ErrCode, String),
    Str(Vec<u8>),
    Int(i64),
    Dbl(f64),
    Arr(Vec<Value>),
}

impl Value {
    pub fn str(s: impl Into<Vec<u8>>) -> Self {
        Value::Str(s.into())
    }

    pub fn err(code: ErrCode, msg: impl Into<String>) -> Self {
        Value::Err(code, msg.into())
    }
}

const TAG_NIL: u8 = 0;
const TAG_ERR: u8 = 1;
const TAG_STR: u8 = 2;
const TAG_INT: u8 = 3;
const TAG_DBL: u8 = 4;
const TAG_ARR: u8 = 5;

/// Appends `value`'s tagged encoding to `out`.
pub fn encode_value(out: &mut Vec<u8>, value: &Value) {
    match value {
        Value::Nil => out.push(TAG_NIL),
        Value::Err(code, msg) => {
            out.push(TAG_ERR);
            out.extend_from_slice(&(*code as u32).to_le_bytes());
            out.extend_from_slice(&(msg.len() as u32).to_le_bytes());
            out.extend_from_slice(msg.as_bytes());
        }
        Value::Str(s) => {
            out.push(TAG_STR);
            out.extend_from_slice(&(s.len() as u32).to_le_bytes());
            out.extend_from_slice(s);
        }
        Value::Int(n) => {
            out.push(TAG_INT);
            out.extend_from_slice(&n.to_le_bytes());
        }
        Value::Dbl(d) => {
            out.push(TAG_DBL);
            out.extend_from_slice(&d.to_le_bytes());
        }
        Value::Arr(items) => {
            out.push(TAG_ARR);
            out.extend_from_slice(&(items.len() as u32).to_le_bytes());
            for item in items {
                encode_value(out, item);
            }
        }
    }
}

/// Serializes a complete response frame: the value's encoding, preceded by
/// its LE32 length. If the encoded value would exceed [`K_MAX_MSG`] (minus
/// the 4-byte prefix) it is rewritten in place as `ERR 2BIG` first.
pub fn encode_response(value: &Value) -> Vec<u8> {
    let mut body = Vec::new();
    encode_value(&mut body, value);
    if body.len() > K_MAX_MSG - 4 {
        body.clear();
        encode_value(&mut body, &Value::err(ErrCode::TooBig, "response is too big"));
    }
    let mut frame = Vec::with_capacity(4 + body.len());
    frame.extend_from_slice(&(body.len() as u32).to_le_bytes());
    frame.extend_from_slice(&body);
    frame
}

/// Parses one framed argv from `payload` (the bytes following the request's
/// length prefix, i.e. `len` bytes). Returns an error on a malformed frame:
/// too many arguments, a truncated argument, or trailing bytes left over
/// after the declared argument count is consumed.
pub fn parse_request(payload: &[u8]) -> Result<Vec<Vec<u8>>, ()> {
    if payload.len() < 4 {
        return Err(());
    }
    let argc = u32::from_le_bytes(payload[0..4].try_into().unwrap()) as usize;
    if argc > K_MAX_ARGS {
        return Err(());
    }
    let mut pos = 4usize;
    let mut out = Vec::with_capacity(argc);
    for _ in 0..argc {
        if pos + 4 > payload.len() {
            return Err(());
        }
        let size = u32::from_le_bytes(payload[pos..pos + 4].try_into().unwrap()) as usize;
        pos += 4;
        if pos + size > payload.len() {
            return Err(());
        }
        out.push(payload[pos..pos + size].to_vec());
        pos += size;
    }
    if pos != payload.len() {
        return Err(());
    }
    Ok(out)
}
