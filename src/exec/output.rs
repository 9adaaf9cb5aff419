/// Bounded output collection.
///
/// One collector thread per stream reads up to the byte ceiling, then keeps
/// draining (and discarding) so the child never blocks on a full pipe while
/// the watchdog decides its fate. Truncation is published through a shared
/// flag the wait loop polls, and recorded in the stream's integrity marker.
use crate::types::StreamIntegrity;
use std::io::Read;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

/// Collected bytes plus how the stream ended.
#[derive(Debug)]
pub struct CollectedStream {
    pub data: Vec<u8>,
    pub integrity: StreamIntegrity,
}

impl CollectedStream {
    pub fn empty() -> Self {
        Self {
            data: Vec::new(),
            integrity: StreamIntegrity::Complete,
        }
    }

    pub fn into_lossy_string(self) -> (String, StreamIntegrity) {
        (
            String::from_utf8_lossy(&self.data).to_string(),
            self.integrity,
        )
    }
}

/// Spawn a collector for one child stream. `limit_hit` is shared with the
/// wait loop so an output-ceiling breach can terminate the child early.
pub fn spawn_collector<R: Read + Send + 'static>(
    stream: R,
    limit: usize,
    limit_hit: Arc<AtomicBool>,
) -> JoinHandle<CollectedStream> {
    std::thread::spawn(move || collect_stream(stream, limit, &limit_hit))
}

fn collect_stream<R: Read>(
    mut stream: R,
    limit: usize,
    limit_hit: &AtomicBool,
) -> CollectedStream {
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 4096];
    let mut integrity = StreamIntegrity::Complete;

    loop {
        match stream.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => {
                if integrity == StreamIntegrity::TruncatedByLimit {
                    // Past the ceiling: drain and discard.
                    continue;
                }
                if buffer.len() + n > limit {
                    let remaining = limit.saturating_sub(buffer.len());
                    buffer.extend_from_slice(&chunk[..remaining]);
                    integrity = StreamIntegrity::TruncatedByLimit;
                    limit_hit.store(true, Ordering::Release);
                } else {
                    buffer.extend_from_slice(&chunk[..n]);
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(_) => {
                if integrity == StreamIntegrity::Complete {
                    integrity = StreamIntegrity::ReadError;
                }
                break;
            }
        }
    }

    CollectedStream {
        data: buffer,
        integrity,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_output_is_collected_completely() {
        let flag = Arc::new(AtomicBool::new(false));
        let handle = spawn_collector(&b"hello\n"[..], 1024, flag.clone());
        let collected = handle.join().unwrap();
        assert_eq!(collected.data, b"hello\n");
        assert_eq!(collected.integrity, StreamIntegrity::Complete);
        assert!(!flag.load(Ordering::Acquire));
    }

    #[test]
    fn output_over_the_ceiling_is_truncated_and_flagged() {
        let payload = vec![b'x'; 10_000];
        let flag = Arc::new(AtomicBool::new(false));
        let handle = spawn_collector(std::io::Cursor::new(payload), 100, flag.clone());
        let collected = handle.join().unwrap();
        assert_eq!(collected.data.len(), 100);
        assert_eq!(collected.integrity, StreamIntegrity::TruncatedByLimit);
        assert!(flag.load(Ordering::Acquire));
    }

    #[test]
    fn exact_limit_is_not_truncation() {
        let payload = vec![b'y'; 100];
        let flag = Arc::new(AtomicBool::new(false));
        let handle = spawn_collector(std::io::Cursor::new(payload), 100, flag.clone());
        let collected = handle.join().unwrap();
        assert_eq!(collected.data.len(), 100);
        assert_eq!(collected.integrity, StreamIntegrity::Complete);
        assert!(!flag.load(Ordering::Acquire));
    }
}
