//! Unix socket daemon serving the control surface
//!
//! Each connection keeps its own endpoint handles, so read offsets behave
//! like per-open file descriptors: a second `read` of the same endpoint on
//! one connection returns an empty `data` reply.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use pressled_core::{ControlError, DeviceHandle, Driver, EndpointId};
use pressled_line::SimChip;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::Notify;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::protocol::{
    decode_bytes, encode_line, Request, Response, MAX_READ_LEN, MAX_REQUEST_LEN,
};

/// Serves one driver over a Unix socket
pub struct ControlServer {
    driver: Arc<Driver>,
    sim: Option<SimChip>,
    shutdown: Arc<Notify>,
}

impl ControlServer {
    /// `sim` enables the `press` request
    pub fn new(driver: Arc<Driver>, sim: Option<SimChip>) -> Self {
        Self {
            driver,
            sim,
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Notify this to stop accepting and close every connection
    pub fn shutdown_handle(&self) -> Arc<Notify> {
        Arc::clone(&self.shutdown)
    }

    /// Bind `path`, replacing a stale socket file
    pub fn bind(path: &Path) -> std::io::Result<UnixListener> {
        if path.exists() {
            debug!("Removing stale socket {}", path.display());
            std::fs::remove_file(path)?;
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        UnixListener::bind(path)
    }

    /// Accept connections until shutdown is notified
    pub async fn serve(self, listener: UnixListener) {
        let mut connections = JoinSet::new();
        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, _)) => {
                        let driver = Arc::clone(&self.driver);
                        let sim = self.sim.clone();
                        connections.spawn(async move {
                            if let Err(e) = handle_connection(driver, sim, stream).await {
                                debug!("Connection ended: {}", e);
                            }
                        });
                    }
                    Err(e) => warn!("Accept failed: {}", e),
                },
                Some(_) = connections.join_next(), if !connections.is_empty() => {}
                _ = self.shutdown.notified() => break,
            }
        }
        info!("Control server stopping, {} connections open", connections.len());
        connections.shutdown().await;
    }
}

async fn handle_connection(
    driver: Arc<Driver>,
    sim: Option<SimChip>,
    stream: UnixStream,
) -> std::io::Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = Vec::new();
    let mut handles: HashMap<EndpointId, DeviceHandle> = HashMap::new();
    debug!("Client connected");

    loop {
        line.clear();
        // Room for the cap plus its newline; a full read without one is oversize
        let n = (&mut reader)
            .take(MAX_REQUEST_LEN as u64 + 1)
            .read_until(b'\n', &mut line)
            .await?;
        if n == 0 {
            break;
        }
        let response = if !line.ends_with(b"\n") && line.len() > MAX_REQUEST_LEN {
            discard_line(&mut reader).await?;
            warn!("Dropped request line over {MAX_REQUEST_LEN} bytes");
            Response::from(ControlError::TransferFault(format!(
                "request longer than {MAX_REQUEST_LEN} bytes"
            )))
        } else if line.iter().all(u8::is_ascii_whitespace) {
            continue;
        } else {
            match decode_bytes::<Request>(&line) {
                Ok(request) => handle_request(&driver, sim.as_ref(), &mut handles, request)
                    .await
                    .unwrap_or_else(Response::from),
                Err(e) => Response::from(ControlError::TransferFault(format!("bad request: {e}"))),
            }
        };
        let out = encode_line(&response)?;
        writer.write_all(out.as_bytes()).await?;
    }
    debug!("Client disconnected");
    Ok(())
}

/// Skip the rest of the current line without buffering it
async fn discard_line<R: AsyncBufRead + Unpin>(reader: &mut R) -> std::io::Result<()> {
    loop {
        let buf = reader.fill_buf().await?;
        if buf.is_empty() {
            return Ok(());
        }
        match buf.iter().position(|&b| b == b'\n') {
            Some(i) => {
                reader.consume(i + 1);
                return Ok(());
            }
            None => {
                let len = buf.len();
                reader.consume(len);
            }
        }
    }
}

fn handle_for<'a>(
    driver: &Driver,
    handles: &'a mut HashMap<EndpointId, DeviceHandle>,
    endpoint: &str,
) -> Result<&'a mut DeviceHandle, ControlError> {
    let id: EndpointId = endpoint.parse()?;
    Ok(match handles.entry(id) {
        Entry::Occupied(e) => e.into_mut(),
        Entry::Vacant(v) => v.insert(driver.open(id)?),
    })
}

async fn handle_request(
    driver: &Driver,
    sim: Option<&SimChip>,
    handles: &mut HashMap<EndpointId, DeviceHandle>,
    request: Request,
) -> Result<Response, ControlError> {
    match request {
        Request::List => Ok(Response::Endpoints {
            endpoints: driver.endpoints().iter().map(|e| e.to_string()).collect(),
        }),
        Request::Read { endpoint, len } => {
            let handle = handle_for(driver, handles, &endpoint)?;
            let mut buf = vec![0u8; len.min(MAX_READ_LEN)];
            let n = handle.read(&mut buf).await?;
            let text = std::str::from_utf8(&buf[..n])
                .map_err(|e| ControlError::TransferFault(e.to_string()))?
                .to_string();
            Ok(Response::Data { text })
        }
        Request::Write { endpoint, data } => {
            let handle = handle_for(driver, handles, &endpoint)?;
            let len = handle.write(data.as_bytes()).await?;
            Ok(Response::Written { len })
        }
        Request::Control { endpoint, opcode } => {
            let handle = handle_for(driver, handles, &endpoint)?;
            let value = handle.ioctl(opcode).await?;
            Ok(Response::Value { value })
        }
        Request::Press { times, interval_ms } => {
            let chip = sim.ok_or_else(|| {
                ControlError::UnsupportedOperation("press needs the simulated chip".to_string())
            })?;
            let config = driver.config();
            if times > u32::from(config.max_presses) {
                return Err(ControlError::InvalidCommand(format!(
                    "press count {times} exceeds max_presses {}",
                    config.max_presses
                )));
            }
            let button = config.button.offset;
            for i in 0..times {
                if i > 0 {
                    tokio::time::sleep(Duration::from_millis(interval_ms)).await;
                }
                chip.tap(button);
            }
            Ok(Response::Ok)
        }
    }
}
