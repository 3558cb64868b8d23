//! Command dispatch: maps one parsed argv to a [`Value`]
//! reply, executed against the [`KeySpace`].

use crate::keyspace::{Entry, EntryValue, KeySpace};
use crate::wire::{ErrCode, Value};

/// Executes one command against `ks` and returns its reply.
pub fn dispatch(ks: &mut KeySpace, argv: &[Vec<u8>]) -> Value {
    let Some(verb) = argv.first() else {
        return Value::err(ErrCode::Unknown, "empty command");
    };
    let verb = verb.to_ascii_lowercase();
    match (verb.as_slice(), argv.len()) {
        (b"keys", 1) => do_keys(ks),
        (b"get", 2) => do_get(ks, &argv[1]),
        (b"set", 3) => do_set(ks, &argv[1], &argv[2]),
        (b"del", 2) => do_del(ks, &argv[1]),
        (b"zadd", 4) => do_zadd(ks, &argv[1], &argv[2], &argv[3]),
        (b"zrem", 3) => do_zrem(ks, &argv[1], &argv[2]),
        (b"zscore", 3) => do_zscore(ks, &argv[1], &argv[2]),
        (b"zquery", 6) => do_zquery(ks, &argv[1], &argv[2], &argv[3], &argv[4], &argv[5]),
        _ => Value::err(ErrCode::Unknown, "unknown command"),
    }
}

fn do_keys(ks: &mut KeySpace) -> Value {
    Value::Arr(ks.keys().into_iter().map(Value::Str).collect())
}

fn do_get(ks: &mut KeySpace, key: &[u8]) -> Value {
    match ks.get(key) {
        None => Value::Nil,
        Some(entry) => match &entry.value {
            EntryValue::Str(v) => Value::Str(v.clone()),
            EntryValue::ZSet(_) => Value::err(ErrCode::Type, "expect string"),
        },
    }
}

fn do_set(ks: &mut KeySpace, key: &[u8], val: &[u8]) -> Value {
    if let Some(entry) = ks.get_mut(key) {
        return match &mut entry.value {
            EntryValue::Str(v) => {
                *v = val.to_vec();
                Value::Nil
            }
            EntryValue::ZSet(_) => Value::err(ErrCode::Type, "expect string"),
        };
    }
    ks.insert(Entry { key: key.to_vec(), value: EntryValue::Str(val.to_vec()) });
    Value::Nil
}

fn do_del(ks: &mut KeySpace, key: &[u8]) -> Value {
    Value::Int(ks.remove(key).is_some() as i64)
}

fn parse_finite_f64(bytes: &[u8]) -> Option<f64> {
    let s = std::str::from_utf8(bytes).ok()?;
    let v: f64 = s.parse().ok()?;
    v.is_finite().then_some(v)
}

fn parse_i64(bytes: &[u8]) -> Option<i64> {
    std::str::from_utf8(bytes).ok()?.parse().ok()
}

fn do_zadd(ks: &mut KeySpace, key: &[u8], score: &[u8], member: &[u8]) -> Value {
    let Some(score) = parse_finite_f64(score) else {
        return Value::err(ErrCode::Arg, "expect fp number");
    };
    match ks.zset_or_create(key) {
        Err(()) => Value::err(ErrCode::Type, "expect zset"),
        Ok(zset) => Value::Int(zset.add(member, score) as i64),
    }
}

/// Looks `key` up as a ZSet entry. `Ok(None)` means the key is absent;
/// `Err(())` means it exists but is not a ZSet.
fn lookup_zset<'a>(ks: &'a mut KeySpace, key: &[u8]) -> Result<Option<&'a mut crate::zset::ZSet>, ()> {
    match ks.get_mut(key) {
        None => Ok(None),
        Some(entry) => match &mut entry.value {
            EntryValue::ZSet(z) => Ok(Some(z)),
            EntryValue::Str(_) => Err(()),
        },
    }
}

fn do_zrem(ks: &mut KeySpace, key: &[u8], member: &[u8]) -> Value {
    match lookup_zset(ks, key) {
        Err(()) => Value::err(ErrCode::Type, "expect zset"),
        Ok(None) => Value::Nil,
        Ok(Some(zset)) => Value::Int(zset.pop(member) as i64),
    }
}

fn do_zscore(ks: &mut KeySpace, key: &[u8], member: &[u8]) -> Value {
    match lookup_zset(ks, key) {
        Err(()) => Value::err(ErrCode::Type, "expect zset"),
        Ok(None) => Value::Nil,
        Ok(Some(zset)) => match zset.lookup(member) {
            None => Value::Nil,
            Some((score, _)) => Value::Dbl(score),
        },
    }
}

fn do_zquery(
    ks: &mut KeySpace,
    key: &[u8],
    score: &[u8],
    name: &[u8],
    offset: &[u8],
    limit: &[u8],
) -> Value {
    let Some(score) = parse_finite_f64(score) else {
        return Value::err(ErrCode::Arg, "expect fp number");
    };
    let Some(offset) = parse_i64(offset) else {
        return Value::err(ErrCode::Arg, "expect int");
    };
    let Some(limit) = parse_i64(limit) else {
        return Value::err(ErrCode::Arg, "expect int");
    };
    match lookup_zset(ks, key) {
        Err(()) => Value::err(ErrCode::Type, "expect zset"),
        Ok(None) => Value::Arr(Vec::new()),
        Ok(Some(zset)) => {
            let mut out = Vec::new();
            for (s, n) in zset.range(score, name, offset, limit) {
                out.push(Value::Str(n));
                out.push(Value::Dbl(s));
            }
            Value::Arr(out)
        }
    }
}
