//! End-to-end tests for the byte-stream bridge over real I/O adapters.
//!
//! - multi-megabyte body: byte count and chunk ordering
//! - chunked transform through a tee
//! - host resource released exactly once on every exit path

use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use fetchbridge_stream::{tee, AsyncReadReader, BlockingReader, BridgeState, ByteStreamBridge};
use futures_util::StreamExt;

fn numbered_chunks(chunk_size: usize, total_chunks: usize) -> Vec<u8> {
    let mut data = Vec::with_capacity(chunk_size * total_chunks);
    for i in 0..total_chunks {
        let mut chunk = vec![0u8; chunk_size];
        chunk[0..4].copy_from_slice(&(i as u32).to_le_bytes());
        data.extend_from_slice(&chunk);
    }
    data
}

// ── Large body through a blocking reader ────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn blocking_reader_4mb_correct_byte_count_and_chunk_ordering() {
    let chunk_size = 1024;
    let total_chunks = 4 * 1024;
    let data = numbered_chunks(chunk_size, total_chunks);

    let closes = Arc::new(AtomicUsize::new(0));
    let counter = closes.clone();
    let reader = BlockingReader::new(Cursor::new(data)).on_close(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    let mut stream = ByteStreamBridge::new(reader).into_byte_stream();
    let mut body = Vec::new();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.expect("chunk should be Ok");
        assert!(chunk.len() <= fetchbridge_stream::DEFAULT_CHUNK_SIZE);
        body.extend_from_slice(&chunk);
    }

    assert_eq!(body.len(), chunk_size * total_chunks);
    for i in 0..total_chunks {
        let offset = i * chunk_size;
        let chunk_id = u32::from_le_bytes(body[offset..offset + 4].try_into().unwrap());
        assert_eq!(chunk_id, i as u32, "chunk {i} out of order");
    }
    assert_eq!(closes.load(Ordering::SeqCst), 1);
}

// ── Caller-supplied views ───────────────────────────────────────────

#[tokio::test]
async fn read_into_odd_sized_views_reassembles_input() {
    let data: Vec<u8> = (0u32..100_000).map(|i| b'a' + (i % 26) as u8).collect();
    let mut bridge = ByteStreamBridge::new(AsyncReadReader::new(Cursor::new(data.clone())));

    let mut out = Vec::new();
    let mut view = vec![0u8; 1_337];
    loop {
        let n = bridge.read_into(&mut view).await.unwrap();
        if n == 0 {
            break;
        }
        out.extend_from_slice(&view[..n]);
    }
    assert_eq!(out, data);
    assert_eq!(bridge.state(), BridgeState::Closed);
}

// ── Tee + transform ─────────────────────────────────────────────────

#[tokio::test]
async fn tee_branches_transform_independently() {
    let data: Vec<u8> = (0u32..256 * 1024).map(|i| b'a' + (i % 26) as u8).collect();
    let expected_upper: Vec<u8> = data.iter().map(|b| b.to_ascii_uppercase()).collect();

    let source = ByteStreamBridge::with_chunk_size(AsyncReadReader::new(Cursor::new(data.clone())), 4096);
    let (left, right) = tee(source.into_byte_stream());

    let upper = left
        .map(|chunk| Bytes::from(chunk.unwrap().iter().map(|b| b.to_ascii_uppercase()).collect::<Vec<_>>()))
        .fold(Vec::new(), |mut acc, chunk| async move {
            acc.extend_from_slice(&chunk);
            acc
        });
    let plain = right.fold(Vec::new(), |mut acc, chunk| async move {
        acc.extend_from_slice(&chunk.unwrap());
        acc
    });

    let (upper, plain) = tokio::join!(upper, plain);
    assert_eq!(upper, expected_upper);
    assert_eq!(plain, data);
}

// ── Release accounting ──────────────────────────────────────────────

#[tokio::test]
async fn early_cancel_releases_once() {
    let closes = Arc::new(AtomicUsize::new(0));
    let counter = closes.clone();
    let reader = AsyncReadReader::new(Cursor::new(vec![7u8; 64 * 1024]))
        .with_chunk_size(1024)
        .on_close(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

    let mut bridge = ByteStreamBridge::new(reader);
    assert_eq!(bridge.pull().await.unwrap().unwrap().len(), 1024);
    bridge.cancel();
    assert_eq!(bridge.state(), BridgeState::Canceled);
    assert!(bridge.pull().await.unwrap().is_none());
    drop(bridge);
    assert_eq!(closes.load(Ordering::SeqCst), 1);
}
