#![forbid(unsafe_code)]

//! End-to-end BIRD client tests against a scripted emulator speaking the
//! control-socket protocol over a real Unix socket.

use routelens::core::bird::{BirdBackend, BirdClient, BirdError};
use std::io::Cursor;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixListener;

/// Serve one connection: greeting immediately, a confirmation when
/// `restrict` arrives, then `response` for the first real query.
async fn spawn_emulator(path: PathBuf, response: &'static str) {
    let listener = UnixListener::bind(&path).expect("bind unix socket");
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.expect("accept");
        let (read_half, mut write_half) = stream.into_split();
        let mut reader = BufReader::new(read_half);

        write_half
            .write_all(b"0001 BIRD 2.0 ready.\n")
            .await
            .expect("greeting");

        let mut line = String::new();
        loop {
            line.clear();
            if reader.read_line(&mut line).await.unwrap_or(0) == 0 {
                return;
            }
            if line.trim_end() == "restrict" {
                write_half
                    .write_all(b"0016 Access restricted\n")
                    .await
                    .expect("confirmation");
                continue;
            }
            write_half
                .write_all(response.as_bytes())
                .await
                .expect("response");
            return;
        }
    });
}

#[tokio::test]
async fn restricted_query_streams_framed_output() {
    let dir = tempfile::tempdir().expect("tempdir");
    let socket = dir.path().join("bird.ctl");
    spawn_emulator(
        socket.clone(),
        "2002-name proto\n 1.2.3.4/32 via 10.0.0.1\n0000 \n",
    )
    .await;

    let client = BirdClient::new(&socket);
    let mut out = Cursor::new(Vec::new());
    client
        .call_restricted("show protocols", &mut out)
        .await
        .expect("call");

    assert_eq!(
        String::from_utf8(out.into_inner()).unwrap(),
        "name proto\n1.2.3.4/32 via 10.0.0.1\n"
    );
}

#[tokio::test]
async fn unrestricted_query_skips_the_preamble() {
    let dir = tempfile::tempdir().expect("tempdir");
    let socket = dir.path().join("bird.ctl");
    spawn_emulator(socket.clone(), "1000 BIRD 2.0.12\n0000 \n").await;

    let client = BirdClient::new(&socket);
    let mut out = Cursor::new(Vec::new());
    client
        .call_unrestricted("show status", &mut out)
        .await
        .expect("call");

    assert_eq!(String::from_utf8(out.into_inner()).unwrap(), "BIRD 2.0.12\n");
}

#[tokio::test]
async fn emulator_closing_mid_response_puts_the_error_in_the_output() {
    let dir = tempfile::tempdir().expect("tempdir");
    let socket = dir.path().join("bird.ctl");
    // No terminal status line: the emulator closes after one payload line.
    spawn_emulator(socket.clone(), "2002-only line\n").await;

    let client = BirdClient::new(&socket);
    let mut out = Cursor::new(Vec::new());
    client
        .call_restricted("show protocols", &mut out)
        .await
        .expect("call");

    let text = String::from_utf8(out.into_inner()).unwrap();
    assert!(text.starts_with("only line\n"), "{text}");
    assert!(text.len() > "only line\n".len(), "error text missing: {text}");
}

#[tokio::test]
async fn missing_socket_is_a_connect_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let client = BirdClient::new(dir.path().join("nope.ctl"));
    let mut out = Cursor::new(Vec::new());
    let err = client.call_restricted("show protocols", &mut out).await;
    assert!(matches!(err, Err(BirdError::Connect(_))));
}
