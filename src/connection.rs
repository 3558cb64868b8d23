//! Per-connection state machine: REQ/RES/END, pipelined
//! framing over fixed-capacity read/write buffers.

use crate::command;
use crate::keyspace::KeySpace;
use crate::wire::{self, K_MAX_MSG};
use mio::net::TcpStream;
use std::io::{self, Read, Write};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    Req,
    Res,
    End,
}

/// Outcome of one readiness-driven pass over a connection, telling the
/// event loop what to poll for next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interest {
    Read,
    Write,
    Done,
}

pub struct Connection {
    pub socket: TcpStream,
    pub state: ConnState,
    rbuf: Vec<u8>,
    read_used: usize,
    wbuf: Vec<u8>,
    write_used: usize,
    write_sent: usize,
}

impl Connection {
    pub fn new(socket: TcpStream) -> Self {
        Self {
            socket,
            state: ConnState::Req,
            rbuf: vec![0; K_MAX_MSG * 2],
            read_used: 0,
            wbuf: vec![0; K_MAX_MSG],
            write_used: 0,
            write_sent: 0,
        }
    }

    pub fn interest(&self) -> Interest {
        match self.state {
            ConnState::Req => Interest::Read,
            ConnState::Res => Interest::Write,
            ConnState::End => Interest::Done,
        }
    }

    /// Drives the state machine once in response to a readiness event.
    /// Read never runs while the write buffer is non-empty, and vice versa.
    pub fn advance(&mut self, ks: &mut KeySpace) {
        match self.state {
            ConnState::Req => self.state_req(ks),
            ConnState::Res => self.state_res(),
            ConnState::End => {}
        }
    }

    fn state_req(&mut self, ks: &mut KeySpace) {
        loop {
            if !self.try_fill_buffer(ks) {
                break;
            }
        }
    }

    fn state_res(&mut self) {
        while self.try_flush_buffer() {}
    }

    /// Reads as much as is available into the read buffer, then parses and
    /// answers every full frame it can. Returns `true` to keep looping in
    /// [`Self::state_req`] (more bytes may be pending without another poll
    /// return); `false` once the read would block, EOF'd, or errored.
    fn try_fill_buffer(&mut self, ks: &mut KeySpace) -> bool {
        if self.read_used == self.rbuf.len() {
            // Buffer saturated by an in-flight frame larger than any valid
            // request can be; treat as a framing error.
            self.state = ConnState::End;
            return false;
        }
        match self.socket.read(&mut self.rbuf[self.read_used..]) {
            Ok(0) => {
                if self.read_used > 0 {
                    tracing::debug!("unexpected eof with {} bytes pending", self.read_used);
                } else {
                    tracing::debug!("connection closed cleanly");
                }
                self.state = ConnState::End;
                false
            }
            Ok(n) => {
                self.read_used += n;
                while self.try_one_request(ks) {}
                false
            }
            Err(e) if would_block_or_interrupted(&e) => false,
            Err(e) => {
                tracing::debug!("read error: {e}");
                self.state = ConnState::End;
                false
            }
        }
    }

    /// Parses and answers one framed request from the head of the read
    /// buffer, if a complete frame is present. Returns `true` if the
    /// connection should keep trying to pull further requests out of
    /// whatever bytes remain (pipelining).
    fn try_one_request(&mut self, ks: &mut KeySpace) -> bool {
        if self.read_used < 4 {
            return false;
        }
        let len = u32::from_le_bytes(self.rbuf[0..4].try_into().unwrap()) as usize;
        if 4 + len > K_MAX_MSG {
            tracing::debug!("message too long: {len}");
            self.state = ConnState::End;
            return false;
        }
        if 4 + len > self.read_used {
            return false; // incomplete frame, wait for more bytes
        }
        let argv = match wire::parse_request(&self.rbuf[4..4 + len]) {
            Ok(argv) => argv,
            Err(()) => {
                tracing::debug!("bad request framing");
                self.state = ConnState::End;
                return false;
            }
        };
        let reply = command::dispatch(ks, &argv);
        let frame = wire::encode_response(&reply);
        self.wbuf[..frame.len()].copy_from_slice(&frame);
        self.write_used = frame.len();

        let consumed = 4 + len;
        let remaining = self.read_used - consumed;
        self.rbuf.copy_within(consumed..self.read_used, 0);
        self.read_used = remaining;

        self.state = ConnState::Res;
        // Opportunistic synchronous drain: if the reply goes out in one
        // shot we re-enter REQ without round-tripping through poll.
        self.state_res();
        self.state == ConnState::Req
    }

    /// Sends as much of the write buffer as the socket accepts right now.
    /// Returns `true` to keep looping (more was sent and more remains).
    fn try_flush_buffer(&mut self) -> bool {
        match self.socket.write(&self.wbuf[self.write_sent..self.write_used]) {
            Ok(0) => false,
            Ok(n) => {
                self.write_sent += n;
                if self.write_sent == self.write_used {
                    self.write_sent = 0;
                    self.write_used = 0;
                    self.state = ConnState::Req;
                    false
                } else {
                    true
                }
            }
            Err(e) if would_block_or_interrupted(&e) => false,
            Err(e) => {
                tracing::debug!("write error: {e}");
                self.state = ConnState::End;
                false
            }
        }
    }
}

fn would_block_or_interrupted(e: &io::Error) -> bool {
    matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted)
}
