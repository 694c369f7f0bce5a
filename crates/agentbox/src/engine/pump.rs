//! Output pump.
//!
//! A dedicated thread drains the child's combined output line by line into a
//! bounded channel, so a chatty child never blocks on a full pipe while the
//! supervisor is busy. The stream always ends with [`PumpItem::End`].

use super::completion::CompletionDetector;
use crate::error::{EngineError, EngineResult};
use crossbeam_channel::{bounded, Receiver, Sender};
use std::io::{BufRead, BufReader, Read};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// Queue depth between the pump and the supervisor.
pub const CHANNEL_CAPACITY: usize = 1024;

/// Extra time allowed after a completion marker for trailing lines to flush.
pub const COMPLETION_GRACE: Duration = Duration::from_millis(300);

const JOIN_POLL: Duration = Duration::from_millis(10);

/// One unit handed from the pump to the supervisor.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PumpItem {
    /// A decoded line with its terminator and surrounding whitespace removed.
    Line(String),
    /// End of stream. Sent exactly once, after the last line.
    End,
}

/// Counters owned by the pump thread and handed back when it is joined.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PumpStats {
    /// Non-empty lines read from the child.
    pub raw_lines: u64,
    /// Whether reading stopped because of a completion marker.
    pub completed: bool,
}

/// Handle to a running pump thread.
#[derive(Debug)]
pub struct OutputPump {
    handle: Option<JoinHandle<PumpStats>>,
}

impl OutputPump {
    /// Start draining `output` on a new thread.
    pub fn spawn<R>(
        output: R,
        detector: CompletionDetector,
        capacity: usize,
    ) -> EngineResult<(Self, Receiver<PumpItem>)>
    where
        R: Read + Send + 'static,
    {
        let (tx, rx) = bounded(capacity);
        let handle = thread::Builder::new()
            .name("agentbox-pump".to_string())
            .spawn(move || pump_lines(output, &detector, &tx))
            .map_err(|source| EngineError::WorkerSpawn {
                name: "output pump",
                source,
            })?;
        Ok((
            Self {
                handle: Some(handle),
            },
            rx,
        ))
    }

    /// Wait up to `limit` for the thread to finish.
    ///
    /// Returns `None` when the thread is still blocked after `limit` (it is
    /// then left detached) or when it panicked.
    pub fn join_bounded(&mut self, limit: Duration) -> Option<PumpStats> {
        join_thread_bounded(self.handle.take()?, limit)
    }
}

/// Join `handle` if it finishes within `limit`, otherwise leave it detached.
pub(super) fn join_thread_bounded<T>(handle: JoinHandle<T>, limit: Duration) -> Option<T> {
    let deadline = Instant::now() + limit;
    while !handle.is_finished() {
        if Instant::now() >= deadline {
            let name = handle.thread().name().unwrap_or("worker").to_string();
            debug!(thread = %name, "thread did not finish in time; detaching it");
            return None;
        }
        thread::sleep(JOIN_POLL);
    }
    handle.join().ok()
}

fn pump_lines<R: Read>(output: R, detector: &CompletionDetector, tx: &Sender<PumpItem>) -> PumpStats {
    let mut stats = PumpStats::default();
    let mut reader = BufReader::new(output);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) => break,
            Ok(_) => {}
            Err(err) => {
                trace!(error = %err, "output read failed; treating as end of stream");
                break;
            }
        }
        let line = String::from_utf8_lossy(&buf).trim().to_string();
        if !line.is_empty() {
            stats.raw_lines += 1;
        }
        let complete = !line.is_empty() && detector.is_complete(&line);
        if tx.send(PumpItem::Line(line)).is_err() {
            // The supervisor is gone; nobody will read further output.
            break;
        }
        if complete {
            debug!("completion marker seen; draining for the grace window");
            stats.completed = true;
            thread::sleep(COMPLETION_GRACE);
            drain_available(&mut reader, &mut buf, &mut stats, tx);
            break;
        }
    }

    // A dropped receiver is fine here: the sentinel only matters to a live reader.
    let _ = tx.send(PumpItem::End);
    stats
}

/// Forward lines that are already buffered without blocking on the pipe.
fn drain_available<R: Read>(
    reader: &mut BufReader<R>,
    buf: &mut Vec<u8>,
    stats: &mut PumpStats,
    tx: &Sender<PumpItem>,
) {
    while let Some(pos) = reader.buffer().iter().position(|&b| b == b'\n') {
        buf.clear();
        buf.extend_from_slice(reader.buffer().get(..pos).unwrap_or_default());
        reader.consume(pos + 1);
        let line = String::from_utf8_lossy(buf).trim().to_string();
        if !line.is_empty() {
            stats.raw_lines += 1;
        }
        if tx.send(PumpItem::Line(line)).is_err() {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const TYPES: &[&str] = &["result"];

    fn collect(rx: &Receiver<PumpItem>) -> Vec<PumpItem> {
        rx.iter().collect()
    }

    #[test]
    fn forwards_every_line_then_end() {
        let input = Cursor::new(b"first\n\n  second  \r\nthird".to_vec());
        let (mut pump, rx) =
            OutputPump::spawn(input, CompletionDetector::new(TYPES), 8).unwrap();
        let items = collect(&rx);
        assert_eq!(
            items,
            vec![
                PumpItem::Line("first".into()),
                PumpItem::Line(String::new()),
                PumpItem::Line("second".into()),
                PumpItem::Line("third".into()),
                PumpItem::End,
            ]
        );
        let stats = pump.join_bounded(Duration::from_secs(5)).unwrap();
        assert_eq!(stats.raw_lines, 3);
        assert!(!stats.completed);
    }

    #[test]
    fn invalid_utf8_is_replaced_not_fatal() {
        let input = Cursor::new(vec![b'a', 0xff, b'b', b'\n']);
        let (_pump, rx) = OutputPump::spawn(input, CompletionDetector::new(TYPES), 8).unwrap();
        let items = collect(&rx);
        assert_eq!(items.len(), 2);
        match &items[0] {
            PumpItem::Line(line) => assert_eq!(line, "a\u{fffd}b"),
            PumpItem::End => panic!("expected a line"),
        }
    }

    #[test]
    fn stops_after_completion_marker() {
        // Lines already buffered next to the marker still come through.
        let input = Cursor::new(
            b"{\"type\":\"assistant\"}\n{\"type\":\"result\"}\ntrailing\n".to_vec(),
        );
        let (mut pump, rx) =
            OutputPump::spawn(input, CompletionDetector::new(TYPES), 8).unwrap();
        let items = collect(&rx);
        assert_eq!(items.last(), Some(&PumpItem::End));
        assert!(items.contains(&PumpItem::Line("trailing".into())));
        let stats = pump.join_bounded(Duration::from_secs(5)).unwrap();
        assert!(stats.completed);
        assert_eq!(stats.raw_lines, 3);
    }

    #[test]
    fn dropped_receiver_stops_the_pump() {
        let input = Cursor::new("line\n".repeat(10_000).into_bytes());
        let (mut pump, rx) =
            OutputPump::spawn(input, CompletionDetector::new(TYPES), 1).unwrap();
        drop(rx);
        let stats = pump.join_bounded(Duration::from_secs(5)).unwrap();
        assert!(stats.raw_lines < 10_000);
    }

    #[test]
    fn join_is_single_shot() {
        let (mut pump, rx) =
            OutputPump::spawn(Cursor::new(Vec::new()), CompletionDetector::new(TYPES), 1).unwrap();
        assert_eq!(collect(&rx), vec![PumpItem::End]);
        assert!(pump.join_bounded(Duration::from_secs(5)).is_some());
        assert!(pump.join_bounded(Duration::from_secs(5)).is_none());
    }
}
