//! Real-network binding of the transport interface.
//!
//! One tokio socket per bound port, each with a reader task feeding a single
//! inbound channel; the driver loop serializes delivery into the peer, which
//! is the same contract the simulator provides. Timestamps come from the
//! wall clock so a host suspend trips the peer's wakeup path.

use std::{
    cmp::Ordering,
    collections::{BinaryHeap, HashMap},
    net::{Ipv4Addr, SocketAddr, SocketAddrV4},
    sync::Arc,
    time::{SystemTime, UNIX_EPOCH},
};

use anyhow::{Context, Result};
use tokio::{
    net::UdpSocket,
    sync::mpsc,
    time::{Duration, Instant, sleep_until},
};
use tracing::{debug, info, warn};

use crate::{
    config::Config,
    peer::Peer,
    transport::{BindError, Timer, Transport},
    types::SwarmId,
};

const MAX_DATAGRAM: usize = 2048;
const INBOUND_QUEUE: usize = 256;

struct Datagram {
    port: u16,
    data: Vec<u8>,
    src: SocketAddrV4,
}

struct TimerEntry {
    at: Instant,
    seq: u64,
    timer: Timer,
    repeat: u64,
}

impl PartialEq for TimerEntry {
    fn eq(&self, other: &Self) -> bool {
        self.at == other.at && self.seq == other.seq
    }
}

impl Eq for TimerEntry {}

impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimerEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed: BinaryHeap pops its maximum, we want the next deadline.
        other
            .at
            .cmp(&self.at)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

struct Driver {
    local_ip: Ipv4Addr,
    bind_addr: Ipv4Addr,
    sockets: HashMap<u16, Arc<UdpSocket>>,
    inbound_tx: mpsc::Sender<Datagram>,
    timers: BinaryHeap<TimerEntry>,
    seq: u64,
}

impl Transport for Driver {
    fn send(&mut self, payload: &[u8], to: SocketAddrV4, from_port: u16) {
        let Some(socket) = self.sockets.get(&from_port) else {
            warn!(from_port, "send from unbound port dropped");
            return;
        };
        // Best effort: a full send buffer loses the datagram, which UDP
        // semantics already tolerate.
        if let Err(e) = socket.try_send_to(payload, SocketAddr::V4(to)) {
            debug!(%to, error = %e, "datagram send failed");
        }
    }

    fn set_timer(&mut self, timer: Timer, delay: u64, repeat: u64) {
        let entry = TimerEntry {
            at: Instant::now() + Duration::from_millis(delay),
            seq: self.seq,
            timer,
            repeat,
        };
        self.seq += 1;
        self.timers.push(entry);
    }

    fn bind(&mut self, port: u16) -> Result<u16, BindError> {
        if port != 0 && self.sockets.contains_key(&port) {
            return Err(BindError::InUse(port));
        }
        let std_socket = std::net::UdpSocket::bind((self.bind_addr, port)).map_err(|e| {
            match e.kind() {
                std::io::ErrorKind::AddrInUse => BindError::InUse(port),
                _ => BindError::Io(e),
            }
        })?;
        std_socket.set_nonblocking(true)?;
        let bound_port = match std_socket.local_addr()? {
            SocketAddr::V4(addr) => addr.port(),
            SocketAddr::V6(addr) => addr.port(),
        };
        let socket = Arc::new(UdpSocket::from_std(std_socket)?);
        self.sockets.insert(bound_port, socket.clone());
        tokio::spawn(pump(socket, bound_port, self.inbound_tx.clone()));
        debug!(port = bound_port, "bound udp socket");
        Ok(bound_port)
    }

    fn local_addr(&self) -> Ipv4Addr {
        self.local_ip
    }
}

/// Reader loop for one socket; exits when the driver goes away.
async fn pump(socket: Arc<UdpSocket>, port: u16, tx: mpsc::Sender<Datagram>) {
    let mut buf = [0u8; MAX_DATAGRAM];
    loop {
        match socket.recv_from(&mut buf).await {
            Ok((len, SocketAddr::V4(src))) => {
                let datagram = Datagram {
                    port,
                    data: buf[..len].to_vec(),
                    src,
                };
                if tx.send(datagram).await.is_err() {
                    return;
                }
            }
            // v4-only protocol; anything else is noise.
            Ok((_, SocketAddr::V6(_))) => {}
            Err(e) => {
                debug!(port, error = %e, "recv error");
            }
        }
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Best-effort LAN address discovery: route a dummy UDP connect and read the
/// chosen source address. No packet leaves the host.
fn detect_local_ip() -> Ipv4Addr {
    let fallback = Ipv4Addr::LOCALHOST;
    let Ok(probe) = std::net::UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)) else {
        return fallback;
    };
    if probe.connect(("8.8.8.8", 53)).is_err() {
        return fallback;
    }
    match probe.local_addr() {
        Ok(SocketAddr::V4(addr)) => *addr.ip(),
        _ => fallback,
    }
}

/// Run a peer against the real network until a shutdown signal arrives.
/// Fails fast when the reserved ports cannot be bound.
pub async fn run(cfg: Config, bind_addr: Ipv4Addr, swarms: Vec<SwarmId>) -> Result<()> {
    let (inbound_tx, mut inbound_rx) = mpsc::channel(INBOUND_QUEUE);
    let local_ip = match bind_addr.is_unspecified() {
        true => detect_local_ip(),
        false => bind_addr,
    };
    let mut driver = Driver {
        local_ip,
        bind_addr,
        sockets: HashMap::new(),
        inbound_tx,
        timers: BinaryHeap::new(),
        seq: 0,
    };

    let mut peer = Peer::new(cfg, now_ms(), &mut driver).context("binding reserved ports")?;
    for swarm in swarms {
        peer.join(swarm, now_ms(), &mut driver);
    }
    info!(id = %peer.id(), %local_ip, "peer running");

    // Armed once and polled across loop iterations, like the timer deadline.
    let stop = stop_requested();
    tokio::pin!(stop);

    loop {
        let next_deadline = driver.timers.peek().map(|e| e.at);
        tokio::select! {
            maybe = inbound_rx.recv() => {
                let Some(datagram) = maybe else { break };
                peer.on_message(
                    &datagram.data,
                    datagram.src,
                    datagram.port,
                    now_ms(),
                    &mut driver,
                );
            }
            _ = sleep_until(next_deadline.unwrap_or_else(Instant::now)), if next_deadline.is_some() => {
                let due = Instant::now();
                while driver.timers.peek().is_some_and(|e| e.at <= due) {
                    let entry = driver.timers.pop().expect("peeked entry exists");
                    if entry.repeat > 0 {
                        let next = TimerEntry {
                            at: due + Duration::from_millis(entry.repeat),
                            seq: driver.seq,
                            timer: entry.timer.clone(),
                            repeat: entry.repeat,
                        };
                        driver.seq += 1;
                        driver.timers.push(next);
                    }
                    peer.on_timer(entry.timer, now_ms(), &mut driver);
                }
            }
            _ = &mut stop => {
                info!("shutdown signal received");
                break;
            }
        }
    }
    Ok(())
}

/// Resolves when the process is asked to stop: Ctrl-C everywhere, SIGTERM on
/// Unix.
async fn stop_requested() {
    let interrupt = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut terminate =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("infallible: installing SIGTERM handler on a supported Unix platform");
        tokio::select! {
            _ = interrupt => {}
            _ = terminate.recv() => {}
        }
    }

    #[cfg(not(unix))]
    {
        let _ = interrupt.await;
    }
}
