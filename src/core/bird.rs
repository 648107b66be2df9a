// Copyright (c) 2026 Routelens
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//     http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! BIRD control-socket client.
//!
//! The protocol is line-oriented over a Unix-domain stream socket. Each
//! response line may carry a 4-digit status code followed by one byte; if
//! present, those 5 leading bytes are stripped. A leading status digit of
//! `0`, `8` or `9` terminates the response. Lines without a status prefix
//! are continuation lines: their first byte is a marker and is dropped.
//!
//! Reads are buffered but bounded: a line longer than 1024 bytes is closed
//! at the limit with a synthetic newline. I/O errors mid-response are
//! written into the output stream; the stream doubles as the error channel.

use async_trait::async_trait;
use std::path::PathBuf;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;

/// Hard bound on a single response line, newline included.
pub const MAX_LINE_SIZE: usize = 1024;

/// BIRD client errors.
#[derive(Debug, Error)]
pub enum BirdError {
    /// The control socket cannot be dialed.
    #[error("connect to bird socket: {0}")]
    Connect(String),
    /// Writing the query or the output sink failed.
    #[error("bird io: {0}")]
    Io(String),
}

/// A writable sink for streamed BIRD output.
pub type BirdSink = dyn AsyncWrite + Unpin + Send;

/// Capability to execute one BIRD query and stream the response.
///
/// Tests substitute an in-memory emulator; production uses [`BirdClient`].
#[async_trait]
pub trait BirdBackend: Send + Sync {
    /// Run `query` in restricted mode (read-only commands). The only entry
    /// exposed to proxy handlers.
    async fn call_restricted(&self, query: &str, out: &mut BirdSink) -> Result<(), BirdError>;

    /// Run `query` without the restricted-mode preamble.
    async fn call_unrestricted(&self, query: &str, out: &mut BirdSink) -> Result<(), BirdError>;
}

/// BIRD client over a Unix-domain control socket. One dial per request.
#[derive(Clone, Debug)]
pub struct BirdClient {
    socket_path: PathBuf,
}

impl BirdClient {
    /// Create a client for the given socket path.
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self { socket_path: socket_path.into() }
    }

    async fn call(&self, query: &str, restricted: bool, out: &mut BirdSink) -> Result<(), BirdError> {
        let stream = UnixStream::connect(&self.socket_path)
            .await
            .map_err(|e| BirdError::Connect(e.to_string()))?;
        let (read_half, write_half) = stream.into_split();
        let reader = BufReader::new(read_half);
        run_query(reader, write_half, query, restricted, out).await
    }
}

#[async_trait]
impl BirdBackend for BirdClient {
    async fn call_restricted(&self, query: &str, out: &mut BirdSink) -> Result<(), BirdError> {
        self.call(query, true, out).await
    }

    async fn call_unrestricted(&self, query: &str, out: &mut BirdSink) -> Result<(), BirdError> {
        self.call(query, false, out).await
    }
}

/// Drive one query over an already-connected reader/writer pair.
///
/// Split out from [`BirdClient`] so tests can exercise the exact framing
/// over in-memory streams.
pub async fn run_query<R, W>(
    mut reader: R,
    mut writer: W,
    query: &str,
    restricted: bool,
    out: &mut BirdSink,
) -> Result<(), BirdError>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    // Initial greeting, discarded. The continue flag is meaningless for
    // the greeting and confirmation lines (their status digit is 0).
    read_line_into(&mut reader, out, false).await?;

    if restricted {
        write_line(&mut writer, "restrict").await?;
        // One confirmation line, discarded.
        read_line_into(&mut reader, out, false).await?;
    }

    write_line(&mut writer, query).await?;

    // Stream response lines until a terminal status code.
    while read_line_into(&mut reader, out, true).await? {}
    Ok(())
}

async fn write_line<W: AsyncWrite + Unpin>(writer: &mut W, s: &str) -> Result<(), BirdError> {
    writer
        .write_all(format!("{s}\n").as_bytes())
        .await
        .map_err(|e| BirdError::Io(e.to_string()))
}

/// Read one framed line and emit it. Returns whether more lines follow.
///
/// `emit` is false for the greeting and restrict-confirmation reads, whose
/// content is discarded. Read errors are written into `out` and end the
/// stream.
async fn read_line_into<R: AsyncBufRead + Unpin>(
    reader: &mut R,
    out: &mut BirdSink,
    emit: bool,
) -> Result<bool, BirdError> {
    let line = match read_bounded_line(reader).await {
        Ok(line) => line,
        Err(e) => {
            // The output stream is also the error channel.
            out.write_all(e.to_string().as_bytes())
                .await
                .map_err(|e| BirdError::Io(e.to_string()))?;
            return Ok(false);
        }
    };
    emit_line(&line, out, emit).await
}

/// Read up to `MAX_LINE_SIZE - 1` content bytes; always newline-terminated.
async fn read_bounded_line<R: AsyncBufRead + Unpin>(reader: &mut R) -> std::io::Result<Vec<u8>> {
    let mut line: Vec<u8> = Vec::with_capacity(80);
    loop {
        if line.len() >= MAX_LINE_SIZE - 1 {
            break;
        }
        let (consumed, done) = {
            let buf = reader.fill_buf().await?;
            if buf.is_empty() {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "EOF",
                ));
            }
            let room = MAX_LINE_SIZE - 1 - line.len();
            let window = &buf[..buf.len().min(room)];
            match window.iter().position(|&b| b == b'\n') {
                Some(idx) => {
                    line.extend_from_slice(&window[..idx]);
                    (idx + 1, true)
                }
                None => {
                    line.extend_from_slice(window);
                    (window.len(), false)
                }
            }
        };
        reader.consume(consumed);
        if done {
            break;
        }
    }
    line.push(b'\n');
    Ok(line)
}

/// Strip the status prefix and write the payload. Returns whether the
/// response continues.
async fn emit_line(line: &[u8], out: &mut BirdSink, emit: bool) -> Result<bool, BirdError> {
    // Content length, newline excluded.
    let pos = line.len() - 1;
    let has_status = pos > 4 && line[..4].iter().all(|b| b.is_ascii_digit());
    if has_status {
        if emit && pos > 6 {
            out.write_all(&line[5..])
                .await
                .map_err(|e| BirdError::Io(e.to_string()))?;
        }
        Ok(!matches!(line[0], b'0' | b'8' | b'9'))
    } else {
        if emit {
            out.write_all(&line[1..])
                .await
                .map_err(|e| BirdError::Io(e.to_string()))?;
        }
        Ok(true)
    }
}
