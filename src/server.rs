//! The event loop: single-threaded, level-triggered
//! readiness polling over one or more listen sockets and many client
//! connections.

use crate::config::{Config, TICK};
use crate::connection::{Connection, Interest};
use crate::error::ServerError;
use crate::keyspace::KeySpace;
use mio::net::TcpListener;
use mio::{Events, Interest as MioInterest, Poll, Token};
use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::net::SocketAddr;
use slab::Slab;

/// Binds one non-blocking listen socket: `SO_REUSEADDR` set before `bind`,
/// backlog 10. Returns the listener and the address it ended up bound to
/// (tests pass port 0 and read this back for the real port).
fn bind_one(addr: SocketAddr) -> Result<(TcpListener, SocketAddr), ServerError> {
    let domain = if addr.is_ipv6() { Domain::IPV6 } else { Domain::IPV4 };
    let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP)).map_err(ServerError::Bind)?;
    socket.set_reuse_address(true).map_err(ServerError::Bind)?;
    socket.set_nonblocking(true).map_err(ServerError::Bind)?;
    socket.bind(&addr.into()).map_err(ServerError::Bind)?;
    socket.listen(crate::config::BACKLOG).map_err(ServerError::Listen)?;
    let local_addr = socket.local_addr().map_err(ServerError::Bind)?;
    let local_addr = local_addr.as_socket().expect("bound to an IP socket");
    let std_listener: std::net::TcpListener = socket.into();
    Ok((TcpListener::from_std(std_listener), local_addr))
}

/// Binds every address `cfg` names — the IPv4 any-address always, the IPv6
/// any-address too when configured — so the server covers both families.
pub fn bind(cfg: &Config) -> Result<Vec<(TcpListener, SocketAddr)>, ServerError> {
    let mut listeners = vec![bind_one(cfg.bind_addr)?];
    if let Some(addr6) = cfg.bind_addr_v6 {
        listeners.push(bind_one(addr6)?);
    }
    Ok(listeners)
}

/// Runs the server forever (until a fatal I/O error). `ks` lets callers
/// (and tests) seed or inspect the key space, though normally the loop
/// owns it outright for its whole lifetime.
pub fn run(cfg: Config, ks: KeySpace) -> Result<(), ServerError> {
    let bound = bind(&cfg)?;
    for (_, addr) in &bound {
        tracing::info!(%addr, "listening");
    }
    let listeners = bound.into_iter().map(|(l, _)| l).collect();
    serve(listeners, ks)
}

/// Drives the event loop over already-bound listeners. Split out from
/// [`run`] so tests can bind to an ephemeral port and learn its address
/// before handing the listener off to the loop.
pub fn serve(mut listeners: Vec<TcpListener>, mut ks: KeySpace) -> Result<(), ServerError> {
    let mut poll = Poll::new().map_err(ServerError::Poll)?;
    for (i, listener) in listeners.iter_mut().enumerate() {
        poll.registry()
            .register(listener, Token(i), MioInterest::READABLE)
            .map_err(ServerError::Poll)?;
    }
    let conn_token_base = listeners.len();

    let mut conns: Slab<Connection> = Slab::new();
    let mut events = Events::with_capacity(1024);

    loop {
        for (token, conn) in conns.iter_mut() {
            let interest = match conn.interest() {
                Interest::Read => MioInterest::READABLE,
                Interest::Write => MioInterest::WRITABLE,
                Interest::Done => continue,
            };
            // Re-registering every tick is simplest and matches the
            // reference's "rebuild the poll set every iteration"; mio
            // tolerates re-registering the same token with new interest
            // via reregister.
            let _ = poll
                .registry()
                .reregister(&mut conn.socket, Token(conn_token_base + token), interest);
        }

        match poll.poll(&mut events, Some(TICK)) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(ServerError::Poll(e)),
        }

        for event in events.iter() {
            let raw = event.token().0;
            if raw < conn_token_base {
                accept_one(&mut listeners[raw], &mut poll, &mut conns, conn_token_base);
                continue;
            }
            let idx = raw - conn_token_base;
            if !conns.contains(idx) {
                continue;
            }
            conns[idx].advance(&mut ks);
            if conns[idx].state == crate::connection::ConnState::End {
                let mut conn = conns.remove(idx);
                let _ = poll.registry().deregister(&mut conn.socket);
                tracing::debug!(token = idx, "connection closed");
            }
        }
    }
}

/// Accepts at most one pending connection off `listener`. Any further
/// pending connections are picked up on the next poll iteration rather
/// than drained in a loop here.
fn accept_one(
    listener: &mut TcpListener,
    poll: &mut Poll,
    conns: &mut Slab<Connection>,
    conn_token_base: usize,
) {
    match listener.accept() {
        Ok((stream, addr)) => {
            tracing::debug!(%addr, "accepted connection");
            let mut conn = Connection::new(stream);
            let entry = conns.vacant_entry();
            let token = Token(conn_token_base + entry.key());
            if poll
                .registry()
                .register(&mut conn.socket, token, MioInterest::READABLE)
                .is_ok()
            {
                entry.insert(conn);
            }
        }
        Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
        Err(e) => tracing::warn!("accept error: {e}"),
    }
}
