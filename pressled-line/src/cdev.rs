//! Linux GPIO character device backend
//!
//! Outputs are plain requested lines. Inputs are requested with kernel edge
//! detection; a reader thread waits on the request fd with a short `poll`
//! timeout so dropping the handle can stop it, and reads each event with its
//! kernel timestamp.

use std::os::unix::io::AsRawFd;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use gpiod::{Chip, Input, Lines, Options, Output};
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::LineError;
use crate::types::{
    Edge, EdgeDetect, EdgeEvent, Level, LineDirection, LineInfo, EDGE_CHANNEL_CAPACITY,
};
use crate::{InputLine, LineProvider, OutputLine};

/// How long the reader waits for an event before rechecking its stop flag
const STOP_CHECK_MS: libc::c_int = 100;

const EBUSY: i32 = 16;
const ENOENT: i32 = 2;
const EINVAL: i32 = 22;

/// A GPIO chip opened through `/dev/gpiochipN`
pub struct CdevChip {
    name: String,
    chip: Mutex<Chip>,
}

impl CdevChip {
    /// Open a chip by name (`gpiochip0`) or device path
    pub fn open(name: &str) -> Result<Self, LineError> {
        let path = if name.contains('/') {
            PathBuf::from(name)
        } else {
            PathBuf::from("/dev").join(name)
        };
        let chip = Chip::new(&path).map_err(|e| LineError::Io(format!("{}: {e}", path.display())))?;
        debug!("Opened {}", path.display());
        Ok(Self {
            name: name.to_string(),
            chip: Mutex::new(chip),
        })
    }

    fn map_request_error(&self, offset: u32, err: std::io::Error) -> LineError {
        match err.raw_os_error() {
            Some(EBUSY) => LineError::Busy {
                offset,
                owner: "another consumer".to_string(),
            },
            Some(ENOENT) | Some(EINVAL) => LineError::NotFound {
                chip: self.name.clone(),
                offset,
            },
            _ => LineError::Io(err.to_string()),
        }
    }

    fn info(&self, offset: u32, consumer: &str, direction: LineDirection) -> LineInfo {
        LineInfo {
            chip: self.name.clone(),
            offset,
            consumer: consumer.to_string(),
            direction,
        }
    }
}

impl LineProvider for CdevChip {
    fn chip_name(&self) -> &str {
        &self.name
    }

    fn request_output(
        &self,
        offset: u32,
        consumer: &str,
        initial: Level,
    ) -> Result<Box<dyn OutputLine>, LineError> {
        let opts = Options::output([offset])
            .values([initial.is_high()])
            .consumer(consumer);
        let lines = self
            .chip
            .lock()
            .request_lines(opts)
            .map_err(|e| self.map_request_error(offset, e))?;
        Ok(Box::new(CdevOutput {
            info: self.info(offset, consumer, LineDirection::Output),
            lines: Mutex::new(lines),
        }))
    }

    fn request_input(
        &self,
        offset: u32,
        consumer: &str,
        detect: EdgeDetect,
    ) -> Result<Box<dyn InputLine>, LineError> {
        let opts = Options::input([offset])
            .edge(kernel_detect(detect))
            .consumer(consumer);
        let lines = self
            .chip
            .lock()
            .request_lines(opts)
            .map_err(|e| self.map_request_error(offset, e))?;
        CdevInput::spawn(self.info(offset, consumer, LineDirection::Input), lines)
            .map(|input| Box::new(input) as Box<dyn InputLine>)
    }
}

struct CdevOutput {
    info: LineInfo,
    lines: Mutex<Lines<Output>>,
}

impl OutputLine for CdevOutput {
    fn info(&self) -> &LineInfo {
        &self.info
    }

    fn set_level(&self, level: Level) -> Result<(), LineError> {
        self.lines.lock().set_values([level.is_high()])?;
        Ok(())
    }

    fn level(&self) -> Result<Level, LineError> {
        let [high] = self.lines.lock().get_values([false; 1])?;
        Ok(Level::from(high))
    }
}

struct CdevInput {
    info: LineInfo,
    lines: Arc<Mutex<Lines<Input>>>,
    edges: broadcast::Sender<EdgeEvent>,
    stop: Arc<AtomicBool>,
    reader: Option<JoinHandle<()>>,
}

impl CdevInput {
    fn spawn(info: LineInfo, lines: Lines<Input>) -> Result<Self, LineError> {
        let fd = lines.as_raw_fd();
        let lines = Arc::new(Mutex::new(lines));
        let (edges, _) = broadcast::channel(EDGE_CHANNEL_CAPACITY);
        let stop = Arc::new(AtomicBool::new(false));

        let reader = {
            let lines = Arc::clone(&lines);
            let edges = edges.clone();
            let stop = Arc::clone(&stop);
            let offset = info.offset;
            std::thread::Builder::new()
                .name(format!("gpio-line-{offset}"))
                .spawn(move || read_edges(offset, fd, lines, edges, stop))?
        };

        Ok(Self {
            info,
            lines,
            edges,
            stop,
            reader: Some(reader),
        })
    }
}

fn kernel_detect(detect: EdgeDetect) -> gpiod::EdgeDetect {
    match detect {
        EdgeDetect::Rising => gpiod::EdgeDetect::Rising,
        EdgeDetect::Falling => gpiod::EdgeDetect::Falling,
        EdgeDetect::Both => gpiod::EdgeDetect::Both,
    }
}

fn edge_from(edge: gpiod::Edge) -> Edge {
    match edge {
        gpiod::Edge::Rising => Edge::Rising,
        gpiod::Edge::Falling => Edge::Falling,
    }
}

/// Current CLOCK_MONOTONIC reading, the clock line events are stamped with
fn monotonic_now() -> Duration {
    let mut ts = libc::timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };
    // SAFETY: `ts` is a valid, writable timespec
    unsafe { libc::clock_gettime(libc::CLOCK_MONOTONIC, &mut ts) };
    Duration::new(ts.tv_sec as u64, ts.tv_nsec as u32)
}

/// Map a kernel event time onto the tokio clock
///
/// `now` and `mono_now` are read together; an event stamped in the future
/// (clock skew) maps to `now`.
fn event_instant(now: Instant, mono_now: Duration, event_time: Duration) -> Instant {
    let age = mono_now.saturating_sub(event_time);
    now.checked_sub(age).unwrap_or(now)
}

/// Wait up to `timeout_ms` for the request fd to become readable
fn wait_readable(fd: libc::c_int, timeout_ms: libc::c_int) -> std::io::Result<bool> {
    let mut pfd = libc::pollfd {
        fd,
        events: libc::POLLIN,
        revents: 0,
    };
    // SAFETY: one valid pollfd; the fd outlives this thread (joined on drop)
    let ret = unsafe { libc::poll(&mut pfd, 1, timeout_ms) };
    match ret {
        0 => Ok(false),
        n if n > 0 => Ok(pfd.revents & libc::POLLIN != 0),
        _ => {
            let err = std::io::Error::last_os_error();
            if err.kind() == std::io::ErrorKind::Interrupted {
                Ok(false)
            } else {
                Err(err)
            }
        }
    }
}

fn read_edges(
    offset: u32,
    fd: libc::c_int,
    lines: Arc<Mutex<Lines<Input>>>,
    edges: broadcast::Sender<EdgeEvent>,
    stop: Arc<AtomicBool>,
) {
    while !stop.load(Ordering::Acquire) {
        match wait_readable(fd, STOP_CHECK_MS) {
            Ok(false) => continue,
            Ok(true) => {}
            Err(e) => {
                warn!("Line {offset}: poll failed: {e}");
                break;
            }
        }
        let event = lines.lock().read_event();
        match event {
            Ok(event) => {
                let timestamp = event_instant(Instant::now(), monotonic_now(), event.time);
                let _ = edges.send(EdgeEvent {
                    offset,
                    edge: edge_from(event.edge),
                    timestamp,
                });
            }
            Err(e) => {
                warn!("Line {offset}: event read failed: {e}");
                break;
            }
        }
    }
    debug!("Line {offset}: edge reader stopped");
}

impl InputLine for CdevInput {
    fn info(&self) -> &LineInfo {
        &self.info
    }

    fn level(&self) -> Result<Level, LineError> {
        let [high] = self.lines.lock().get_values([false; 1])?;
        Ok(Level::from(high))
    }

    fn subscribe_edges(&self) -> broadcast::Receiver<EdgeEvent> {
        self.edges.subscribe()
    }
}

impl Drop for CdevInput {
    fn drop(&mut self) {
        // The reader notices within one poll timeout; the request itself is
        // closed when the last `Arc` to the lines goes away after the join
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.reader.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edge_mapping() {
        assert_eq!(edge_from(gpiod::Edge::Rising), Edge::Rising);
        assert_eq!(edge_from(gpiod::Edge::Falling), Edge::Falling);
        assert!(matches!(
            kernel_detect(EdgeDetect::Falling),
            gpiod::EdgeDetect::Falling
        ));
        assert!(matches!(kernel_detect(EdgeDetect::Both), gpiod::EdgeDetect::Both));
    }

    #[test]
    fn test_event_instant() {
        let now = Instant::now();
        let mono = Duration::from_secs(1_000);

        let earlier = event_instant(now, mono, mono - Duration::from_millis(3));
        assert_eq!(now - earlier, Duration::from_millis(3));

        // Stamped after the clock read
        assert_eq!(event_instant(now, mono, mono + Duration::from_millis(1)), now);
    }

    #[test]
    fn test_monotonic_clock_advances() {
        let a = monotonic_now();
        let b = monotonic_now();
        assert!(b >= a);
        assert!(a > Duration::ZERO);
    }
}
