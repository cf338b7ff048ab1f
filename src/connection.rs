/*
The transport session: one lazily dialed TCP stream to the collector.

Frames are a 4-byte big-endian length prefix followed by a JSON object. The
collector answers every frame with a frame of its own; event frames are
acknowledged with `{"ok": true}` or `{"ok": false, "error": "..."}`.

All frame IO is funneled through a single mutex so overlapping sends can't
interleave two frames on the stream. No retry or reconnect loop lives here;
a dead stream is dropped and the next send re-dials.
*/

use std::{
    io::{Read, Write},
    net::{Shutdown, TcpStream, ToSocketAddrs},
    sync::{Arc, Mutex},
    time::Duration,
};

use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

use crate::{error::TransportError, internal_metrics::InternalMetrics, payload::Payload};

// Caps both outgoing events and collector responses; a frame larger than
// this means the stream is desynced or the caller is misusing the client
const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

pub(crate) struct Connection {
    host: String,
    port: u16,
    timeout: Duration,
    stream: Mutex<Option<TcpStream>>,
    metrics: Arc<InternalMetrics>,
}

#[derive(Deserialize)]
struct Ack {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
}

impl Connection {
    // Stores the endpoint without dialing; failures surface on first use
    pub fn connect(
        host: impl Into<String>,
        port: u16,
        timeout: Duration,
        metrics: Arc<InternalMetrics>,
    ) -> Self {
        Connection {
            host: host.into(),
            port,
            timeout,
            stream: Mutex::new(None),
            metrics,
        }
    }

    pub fn send(&self, payload: &Payload) -> Result<(), TransportError> {
        let response = self.transact(payload)?;

        let ack: Ack = serde_json::from_value(response).map_err(|e| {
            TransportError::new("the collector sent an unintelligible acknowledgement", e)
        })?;

        if ack.ok {
            Ok(())
        } else {
            Err(TransportError::msg(format!(
                "the collector rejected the frame: {}",
                ack.error.unwrap_or_else(|| "no reason given".to_owned())
            )))
        }
    }

    pub fn roundtrip(&self, payload: &Payload) -> Result<serde_json::Value, TransportError> {
        self.transact(payload)
    }

    pub fn is_connected(&self) -> bool {
        self.lock().is_some()
    }

    pub fn close(&self) {
        if let Some(stream) = self.lock().take() {
            let _ = stream.shutdown(Shutdown::Both);

            log::debug!("closed the connection to {}:{}", self.host, self.port);
        }
    }

    fn transact(&self, payload: &impl Serialize) -> Result<serde_json::Value, TransportError> {
        let frame = encode_frame(payload)?;

        let mut guard = self.lock();

        let mut stream = match guard.take() {
            Some(stream) => stream,
            None => self.dial()?,
        };

        stream
            .write_all(&frame)
            .map_err(|e| TransportError::new("failed to write the frame", e))?;

        let response = read_frame(&mut stream)?;

        // The stream only goes back in the slot after a full exchange; a
        // failed one may be desynced mid-frame, so it drops and the next
        // send re-dials
        *guard = Some(stream);

        Ok(response)
    }

    fn dial(&self) -> Result<TcpStream, TransportError> {
        match self.try_dial() {
            Ok(stream) => {
                self.metrics.transport_conn_established.increment();

                log::debug!("connected to the collector at {}:{}", self.host, self.port);

                Ok(stream)
            }
            Err(e) => {
                self.metrics.transport_conn_failed.increment();

                Err(e)
            }
        }
    }

    fn try_dial(&self) -> Result<TcpStream, TransportError> {
        let addrs = (self.host.as_str(), self.port)
            .to_socket_addrs()
            .map_err(|e| TransportError::new("failed to resolve the collector address", e))?;

        let mut last_err = None;

        for addr in addrs {
            match TcpStream::connect_timeout(&addr, self.timeout) {
                Ok(stream) => {
                    stream
                        .set_read_timeout(Some(self.timeout))
                        .and_then(|()| stream.set_write_timeout(Some(self.timeout)))
                        .and_then(|()| stream.set_nodelay(true))
                        .map_err(|e| {
                            TransportError::new("failed to configure the collector stream", e)
                        })?;

                    return Ok(stream);
                }
                Err(e) => last_err = Some(e),
            }
        }

        Err(match last_err {
            Some(e) => TransportError::new("failed to connect to the collector", e),
            None => TransportError::msg("the collector address did not resolve"),
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<TcpStream>> {
        // A panic while holding the lock leaves no partial frame behind;
        // the stream itself may be mid-frame, so recover and let the next
        // IO error drop it
        self.stream.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn encode_frame(payload: &impl Serialize) -> Result<Bytes, TransportError> {
    let body = serde_json::to_vec(payload)
        .map_err(|e| TransportError::new("failed to encode the frame", e))?;

    if body.len() > MAX_FRAME_LEN {
        return Err(TransportError::msg("the frame exceeds the maximum length"));
    }

    let mut frame = BytesMut::with_capacity(4 + body.len());
    frame.put_u32(body.len() as u32);
    frame.put_slice(&body);

    Ok(frame.freeze())
}

fn read_frame(stream: &mut TcpStream) -> Result<serde_json::Value, TransportError> {
    let mut len = [0u8; 4];
    stream
        .read_exact(&mut len)
        .map_err(|e| TransportError::new("failed to read the response frame", e))?;

    let len = u32::from_be_bytes(len) as usize;

    if len > MAX_FRAME_LEN {
        return Err(TransportError::msg(
            "the response frame exceeds the maximum length",
        ));
    }

    let mut body = vec![0u8; len];
    stream
        .read_exact(&mut body)
        .map_err(|e| TransportError::new("failed to read the response frame", e))?;

    serde_json::from_slice(&body)
        .map_err(|e| TransportError::new("failed to decode the response frame", e))
}
