//! End-to-end tests: each spawns a server on an ephemeral port and drives
//! it over a real `TcpStream`, exercising the wire protocol exactly as a
//! client would.

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::thread;
use std::time::Duration;
use tinykv::config::Config;
use tinykv::keyspace::KeySpace;
use tinykv::server;
use tinykv::wire::{encode_value, ErrCode, Value};

/// Binds on an ephemeral port, spawns the event loop on a background
/// thread, and returns the address clients should connect to. The thread
/// is intentionally leaked — it dies with the test process.
fn spawn_server() -> SocketAddr {
    let cfg = Config::with_addr("127.0.0.1:0".parse().unwrap());
    let mut bound = server::bind(&cfg).expect("bind");
    assert_eq!(bound.len(), 1, "with_addr disables the IPv6 listener");
    let (listener, addr) = bound.remove(0);
    thread::spawn(move || {
        server::serve(vec![listener], KeySpace::new()).expect("server loop");
    });
    // Give the event loop a moment to reach its first poll() call.
    thread::sleep(Duration::from_millis(50));
    addr
}

fn frame_request(args: &[&[u8]]) -> Vec<u8> {
    let mut payload = Vec::new();
    payload.extend_from_slice(&(args.len() as u32).to_le_bytes());
    for a in args {
        payload.extend_from_slice(&(a.len() as u32).to_le_bytes());
        payload.extend_from_slice(a);
    }
    let mut frame = Vec::new();
    frame.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    frame.extend_from_slice(&payload);
    frame
}

fn read_one_response(stream: &mut TcpStream) -> Value {
    let mut len_buf = [0u8; 4];
    read_exact_retrying(stream, &mut len_buf);
    let len = u32::from_le_bytes(len_buf) as usize;
    let mut body = vec![0u8; len];
    read_exact_retrying(stream, &mut body);
    decode_value(&body, &mut 0)
}

fn read_exact_retrying(stream: &mut TcpStream, buf: &mut [u8]) {
    stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
    stream.read_exact(buf).expect("read response");
}

fn decode_value(buf: &[u8], pos: &mut usize) -> Value {
    let tag = buf[*pos];
    *pos += 1;
    match tag {
        0 => Value::Nil,
        1 => {
            let code = u32::from_le_bytes(buf[*pos..*pos + 4].try_into().unwrap());
            *pos += 4;
            let mlen = u32::from_le_bytes(buf[*pos..*pos + 4].try_into().unwrap()) as usize;
            *pos += 4;
            let msg = String::from_utf8(buf[*pos..*pos + mlen].to_vec()).unwrap();
            *pos += mlen;
            let code = match code {
                1 => ErrCode::Unknown,
                2 => ErrCode::TooBig,
                3 => ErrCode::Type,
                4 => ErrCode::Arg,
                _ => panic!("unknown error code {code}"),
            };
            Value::Err(code, msg)
        }
        2 => {
            let slen = u32::from_le_bytes(buf[*pos..*pos + 4].try_into().unwrap()) as usize;
            *pos += 4;
            let s = buf[*pos..*pos + slen].to_vec();
            *pos += slen;
            Value::Str(s)
        }
        3 => {
            let n = i64::from_le_bytes(buf[*pos..*pos + 8].try_into().unwrap());
            *pos += 8;
            Value::Int(n)
        }
        4 => {
            let d = f64::from_le_bytes(buf[*pos..*pos + 8].try_into().unwrap());
            *pos += 8;
            Value::Dbl(d)
        }
        5 => {
            let n = u32::from_le_bytes(buf[*pos..*pos + 4].try_into().unwrap()) as usize;
            *pos += 4;
            let mut items = Vec::with_capacity(n);
            for _ in 0..n {
                items.push(decode_value(buf, pos));
            }
            Value::Arr(items)
        }
        t => panic!("unknown tag {t}"),
    }
}

fn roundtrip(stream: &mut TcpStream, args: &[&[u8]]) -> Value {
    stream.write_all(&frame_request(args)).expect("write request");
    read_one_response(stream)
}

#[test]
fn set_get_del_scenario() {
    let addr = spawn_server();
    let mut s = TcpStream::connect(addr).unwrap();
    assert_eq!(roundtrip(&mut s, &[b"set", b"foo", b"bar"]), Value::Nil);
    assert_eq!(roundtrip(&mut s, &[b"get", b"foo"]), Value::str("bar"));
    assert_eq!(roundtrip(&mut s, &[b"del", b"foo"]), Value::Int(1));
    assert_eq!(roundtrip(&mut s, &[b"get", b"foo"]), Value::Nil);
}

#[test]
fn missing_key_scenario() {
    let addr = spawn_server();
    let mut s = TcpStream::connect(addr).unwrap();
    assert_eq!(roundtrip(&mut s, &[b"get", b"missing"]), Value::Nil);
    assert_eq!(roundtrip(&mut s, &[b"del", b"missing"]), Value::Int(0));
}

#[test]
fn zset_scenario() {
    let addr = spawn_server();
    let mut s = TcpStream::connect(addr).unwrap();
    assert_eq!(roundtrip(&mut s, &[b"zadd", b"s", b"1.5", b"a"]), Value::Int(1));
    assert_eq!(roundtrip(&mut s, &[b"zadd", b"s", b"2.5", b"b"]), Value::Int(1));
    assert_eq!(roundtrip(&mut s, &[b"zadd", b"s", b"1.5", b"a"]), Value::Int(0));
    assert_eq!(roundtrip(&mut s, &[b"zscore", b"s", b"a"]), Value::Dbl(1.5));
    assert_eq!(
        roundtrip(&mut s, &[b"zquery", b"s", b"0", b"", b"0", b"10"]),
        Value::Arr(vec![Value::str("a"), Value::Dbl(1.5), Value::str("b"), Value::Dbl(2.5)])
    );
}

#[test]
fn zquery_skips_offset_scenario() {
    let addr = spawn_server();
    let mut s = TcpStream::connect(addr).unwrap();
    roundtrip(&mut s, &[b"zadd", b"s", b"1.5", b"a"]);
    roundtrip(&mut s, &[b"zadd", b"s", b"2.5", b"b"]);
    roundtrip(&mut s, &[b"zadd", b"s", b"3", b"c"]);
    roundtrip(&mut s, &[b"zrem", b"s", b"b"]);
    assert_eq!(
        roundtrip(&mut s, &[b"zquery", b"s", b"0", b"", b"1", b"10"]),
        Value::Arr(vec![Value::str("c"), Value::Dbl(3.0)])
    );
}

#[test]
fn set_against_zset_is_type_error() {
    let addr = spawn_server();
    let mut s = TcpStream::connect(addr).unwrap();
    roundtrip(&mut s, &[b"zadd", b"k", b"1", b"x"]);
    assert_eq!(
        roundtrip(&mut s, &[b"set", b"k", b"v"]),
        Value::err(ErrCode::Type, "expect string")
    );
}

#[test]
fn pipelined_requests_answer_in_order() {
    let addr = spawn_server();
    let mut s = TcpStream::connect(addr).unwrap();
    let mut batch = Vec::new();
    batch.extend_from_slice(&frame_request(&[b"set", b"a", b"1"]));
    batch.extend_from_slice(&frame_request(&[b"set", b"b", b"2"]));
    batch.extend_from_slice(&frame_request(&[b"get", b"a"]));
    s.write_all(&batch).unwrap();

    assert_eq!(read_one_response(&mut s), Value::Nil);
    assert_eq!(read_one_response(&mut s), Value::Nil);
    assert_eq!(read_one_response(&mut s), Value::str("1"));
}

#[test]
fn unknown_command_over_the_wire() {
    let addr = spawn_server();
    let mut s = TcpStream::connect(addr).unwrap();
    assert_eq!(
        roundtrip(&mut s, &[b"frobnicate", b"x"]),
        Value::err(ErrCode::Unknown, "unknown command")
    );
}

#[test]
fn oversized_length_prefix_ends_the_connection() {
    let addr = spawn_server();
    let mut s = TcpStream::connect(addr).unwrap();
    let huge_len: u32 = (tinykv::wire::K_MAX_MSG as u32) + 1;
    s.write_all(&huge_len.to_le_bytes()).unwrap();
    s.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
    let mut buf = [0u8; 1];
    let n = s.read(&mut buf).unwrap_or(0);
    assert_eq!(n, 0, "server should close the connection on an oversized frame");
}

#[test]
fn many_concurrent_connections_are_served() {
    let addr = spawn_server();
    let mut handles = Vec::new();
    for i in 0..16 {
        handles.push(thread::spawn(move || {
            let mut s = TcpStream::connect(addr).unwrap();
            let key = format!("k{i}");
            let val = format!("v{i}");
            assert_eq!(roundtrip(&mut s, &[b"set", key.as_bytes(), val.as_bytes()]), Value::Nil);
            assert_eq!(roundtrip(&mut s, &[b"get", key.as_bytes()]), Value::str(val));
        }));
    }
    for h in handles {
        h.join().unwrap();
    }
}

fn decode_value_entry(out: &mut Vec<u8>, v: &Value) {
    encode_value(out, v)
}

#[test]
fn encoder_helper_is_linked() {
    // Smoke-tests that `tinykv::wire` re-exports what this file's manual
    // decoder mirrors, so the two don't silently drift apart.
    let mut out = Vec::new();
    decode_value_entry(&mut out, &Value::Int(42));
    let mut pos = 0;
    assert_eq!(decode_value(&out, &mut pos), Value::Int(42));
}
