//! Connection driver.
//!
//! Two background tasks run for the lifetime of a connection: a read
//! loop that blocks on the socket and feeds completed frames into a
//! queue, and a flush loop that blocks on a data-ready signal and drains
//! the outbound ring into the socket. Neither touches game state — only
//! raw bytes and channels. All protocol handling happens when the
//! foreground driver drains the queue once per tick.
//!
//! Both loops stop on any I/O error or explicit close; a lost connection
//! is reported exactly once through the same queue.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Context;
use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Notify};
use tokio::time;
use tracing::{debug, error, info};

use sync_shared::wire::{encode_frame, encode_named, FrameDecoder, SendRing, WireError};

/// What the background loops hand to the foreground driver.
#[derive(Debug)]
pub enum ConnEvent {
    /// One complete inbound frame (name + payload, §router).
    Frame(Bytes),
    /// The connection died. Delivered at most once.
    Lost,
}

struct Shared {
    ring: Mutex<SendRing>,
    data_ready: Notify,
    close_signal: Notify,
    connected: AtomicBool,
}

impl Shared {
    /// First caller wins; everyone else finds `connected` already false.
    fn notify_lost(&self, tx: &mpsc::UnboundedSender<ConnEvent>) {
        if self.connected.swap(false, Ordering::AcqRel) {
            let _ = tx.send(ConnEvent::Lost);
            // Wake the other loop so it can observe the shutdown.
            self.data_ready.notify_one();
            self.close_signal.notify_one();
        }
    }
}

/// One TCP connection to the server.
pub struct Connection {
    shared: Arc<Shared>,
    events: mpsc::UnboundedReceiver<ConnEvent>,
}

impl Connection {
    /// Connects with a timeout racing the connect attempt.
    pub async fn connect(
        addr: &str,
        connect_timeout: Duration,
        send_buffer_size: usize,
    ) -> anyhow::Result<Self> {
        let stream = time::timeout(connect_timeout, TcpStream::connect(addr))
            .await
            .context("connect timeout")?
            .context("tcp connect")?;
        stream.set_nodelay(true).context("set nodelay")?;
        info!(addr = %addr, "connected to server");

        let (rd, wr) = stream.into_split();
        let shared = Arc::new(Shared {
            ring: Mutex::new(SendRing::new(send_buffer_size)),
            data_ready: Notify::new(),
            close_signal: Notify::new(),
            connected: AtomicBool::new(true),
        });
        let (tx, rx) = mpsc::unbounded_channel();

        tokio::spawn(recv_loop(rd, Arc::clone(&shared), tx.clone()));
        tokio::spawn(flush_loop(wr, Arc::clone(&shared), tx));

        Ok(Self { shared, events: rx })
    }

    pub fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::Acquire)
    }

    /// Queues a named message for the flush loop. Never blocks; filling
    /// the ring faster than it flushes is caller misuse and errors out.
    pub fn send(&self, name: &str, payload: &[u8]) -> Result<(), WireError> {
        let framed = encode_frame(&encode_named(name, payload));
        {
            let mut ring = self.shared.ring.lock().expect("send ring poisoned");
            ring.push(&framed)?;
        }
        self.shared.data_ready.notify_one();
        Ok(())
    }

    /// Non-blocking: next queued event, if any.
    pub fn poll(&mut self) -> Option<ConnEvent> {
        self.events.try_recv().ok()
    }

    /// Explicit close. Pending outbound bytes are still flushed; no lost
    /// notification is raised.
    pub fn close(&self) {
        self.shared.connected.store(false, Ordering::Release);
        self.shared.close_signal.notify_one();
        self.shared.data_ready.notify_one();
    }
}

async fn recv_loop(
    mut rd: OwnedReadHalf,
    shared: Arc<Shared>,
    tx: mpsc::UnboundedSender<ConnEvent>,
) {
    let mut decoder = FrameDecoder::new();
    let mut buf = [0u8; 2048];

    loop {
        let n = tokio::select! {
            res = rd.read(&mut buf) => match res {
                Ok(0) => {
                    debug!("server closed the stream");
                    break;
                }
                Ok(n) => n,
                Err(e) => {
                    if shared.connected.load(Ordering::Acquire) {
                        error!(error = %e, "socket read failed");
                    }
                    break;
                }
            },
            _ = shared.close_signal.notified() => break,
        };

        match decoder.push(&buf[..n]) {
            Ok(frames) => {
                for frame in frames {
                    if tx.send(ConnEvent::Frame(frame)).is_err() {
                        return;
                    }
                }
            }
            Err(e) => {
                error!(error = %e, "frame decode failed");
                break;
            }
        }
    }

    shared.notify_lost(&tx);
}

async fn flush_loop(
    mut wr: OwnedWriteHalf,
    shared: Arc<Shared>,
    tx: mpsc::UnboundedSender<ConnEvent>,
) {
    'run: loop {
        shared.data_ready.notified().await;

        loop {
            let pending = {
                let mut ring = shared.ring.lock().expect("send ring poisoned");
                ring.drain()
            };
            if pending.is_empty() {
                break;
            }
            if let Err(e) = wr.write_all(&pending).await {
                if shared.connected.load(Ordering::Acquire) {
                    error!(error = %e, "socket write failed");
                }
                break 'run;
            }
        }

        if !shared.connected.load(Ordering::Acquire) {
            break;
        }
    }

    shared.notify_lost(&tx);
}
