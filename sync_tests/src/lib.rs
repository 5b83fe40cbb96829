//! Test support.
//!
//! A scripted stub server: it speaks the real wire protocol over a real
//! socket but only ever does what the test tells it to. No gameplay
//! logic lives here — canned replies drive the client under test.

use std::collections::VecDeque;

use anyhow::{bail, Context};
use bytes::Bytes;
use serde::Serialize;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::debug;

use sync_client::combat::{AttrSet, SkillInfo};
use sync_client::entity::{COMPONENT_COMBAT, COMPONENT_MOVEMENT, OWN_NAME};
use sync_shared::messages::encode_payload;
use sync_shared::movement::MovementSample;
use sync_shared::serial::{write_seq, NetState, NetWriter};
use sync_shared::sync_array::{encode_ops, SyncOp};
use sync_shared::wire::{encode_frame, encode_named, split_named, FrameDecoder};

/// Listener end of the stub.
pub struct StubServer {
    listener: TcpListener,
}

impl StubServer {
    /// Binds to an ephemeral local port; returns the address to dial.
    pub async fn bind() -> anyhow::Result<(Self, String)> {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .context("stub bind")?;
        let addr = listener.local_addr().context("stub local_addr")?.to_string();
        Ok((Self { listener }, addr))
    }

    pub async fn accept(&self) -> anyhow::Result<StubConn> {
        let (stream, addr) = self.listener.accept().await.context("stub accept")?;
        debug!(peer = %addr, "stub accepted client");
        Ok(StubConn {
            stream,
            decoder: FrameDecoder::new(),
            pending: VecDeque::new(),
        })
    }
}

/// One accepted client connection, scripted by the test.
pub struct StubConn {
    stream: TcpStream,
    decoder: FrameDecoder,
    pending: VecDeque<Bytes>,
}

impl StubConn {
    /// Receives the next named message.
    pub async fn recv(&mut self) -> anyhow::Result<(String, Vec<u8>)> {
        loop {
            if let Some(frame) = self.pending.pop_front() {
                let (name, payload) = split_named(&frame)?;
                return Ok((name.to_string(), payload.to_vec()));
            }

            let mut buf = [0u8; 2048];
            let n = self.stream.read(&mut buf).await.context("stub read")?;
            if n == 0 {
                bail!("client closed the connection");
            }
            self.pending.extend(self.decoder.push(&buf[..n])?);
        }
    }

    /// Receives until `name` arrives, dropping everything else (pings,
    /// movement uploads) on the floor.
    pub async fn expect(&mut self, name: &str) -> anyhow::Result<Vec<u8>> {
        loop {
            let (got, payload) = self.recv().await?;
            if got == name {
                return Ok(payload);
            }
            debug!(got = %got, waiting_for = %name, "stub skipping message");
        }
    }

    pub async fn send_raw(&mut self, name: &str, payload: &[u8]) -> anyhow::Result<()> {
        let frame = encode_frame(&encode_named(name, payload));
        self.stream.write_all(&frame).await.context("stub write")?;
        Ok(())
    }

    pub async fn send<T: Serialize>(&mut self, name: &str, msg: &T) -> anyhow::Result<()> {
        let payload = encode_payload(msg)?;
        self.send_raw(name, &payload).await
    }

    /// Writes raw bytes with no framing at all — for exercising the
    /// client's resumable decoder with pathological splits.
    pub async fn send_bytes(&mut self, bytes: &[u8]) -> anyhow::Result<()> {
        self.stream.write_all(bytes).await.context("stub write")?;
        Ok(())
    }
}

/// Builds an entity full-serialize blob the way the server would.
pub fn entity_full_blob(
    eid: i32,
    name: &str,
    attrs: &AttrSet,
    skills: Option<&[SkillInfo]>,
    movement: Option<&MovementSample>,
) -> Vec<u8> {
    let mut w = NetWriter::new();
    w.write_i32(eid);
    w.write_string(name);

    w.write_string(COMPONENT_COMBAT);
    let mut cw = NetWriter::new();
    attrs.write_full(&mut cw);
    if let Some(skills) = skills {
        write_seq(&mut cw, skills);
    }
    w.write_blob(&cw.into_vec());

    if let Some(sample) = movement {
        w.write_string(COMPONENT_MOVEMENT);
        let mut mw = NetWriter::new();
        sample.write_full(&mut mw);
        w.write_blob(&mw.into_vec());
    }

    w.into_vec()
}

/// Builds an entity delta-serialize blob.
///
/// `attr_dirty` selects attribute fields from `attrs`; `skill_ops` go
/// into the skill sync-array frame (pass `None` for a simulate-role
/// entity, whose combat payload carries no skill list).
pub fn entity_delta_blob(
    renamed: Option<&str>,
    attrs: &AttrSet,
    attr_dirty: u32,
    skill_ops: Option<&[SyncOp<SkillInfo>]>,
    movement: Option<&MovementSample>,
) -> Vec<u8> {
    let mut w = NetWriter::new();
    match renamed {
        Some(name) => {
            w.write_u32(OWN_NAME);
            w.write_string(name);
        }
        None => w.write_u32(0),
    }

    w.write_string(COMPONENT_COMBAT);
    let mut cw = NetWriter::new();
    attrs.write_delta(&mut cw, attr_dirty);
    if let Some(ops) = skill_ops {
        let frame = encode_ops(ops);
        // encode_ops already emits the u32 byte length header.
        let mut buf = cw.into_vec();
        buf.extend_from_slice(&frame);
        w.write_blob(&buf);
    } else {
        w.write_blob(&cw.into_vec());
    }

    if let Some(sample) = movement {
        w.write_string(COMPONENT_MOVEMENT);
        let mut mw = NetWriter::new();
        sample.write_full(&mut mw);
        w.write_blob(&mw.into_vec());
    }

    w.into_vec()
}
