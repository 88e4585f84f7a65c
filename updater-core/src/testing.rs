//! In-memory fakes for the platform, transport and flash seams.
//!
//! Every fake hands out a cloneable log handle so tests can inspect calls
//! after the fake itself has been moved into a session.

use std::collections::HashMap;
use std::sync::mpsc::{Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::events::{EventSink, Phase, UpdateEvent};
use crate::flasher::{FlashError, FlashState, FlashUpdate, FlashWriter, ESP_IMAGE_MAGIC};
use crate::platform::{Clock, HeapProbe, MemorySnapshot, Restarter, StatusLed, Watchdog};
use crate::transport::{ConnectionProfile, HttpClient, HttpResponse, TransportError};

/// A plausible image: correct magic byte followed by filler.
pub fn firmware_image(len: usize) -> Vec<u8> {
    let mut image: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
    if let Some(first) = image.first_mut() {
        *first = ESP_IMAGE_MAGIC;
    }
    image
}

pub fn manifest_body(model: &str, version: &str, url: &str) -> Vec<u8> {
    serde_json::json!({ "model": model, "version": version, "url": url })
        .to_string()
        .into_bytes()
}

// ── HTTP ──────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct FakeRoute {
    status: u16,
    body: Vec<u8>,
    content_length: Option<u64>,
    fail_after: Option<usize>,
}

impl FakeRoute {
    pub fn ok(body: Vec<u8>) -> Self {
        Self {
            status: 200,
            content_length: Some(body.len() as u64),
            body,
            fail_after: None,
        }
    }

    pub fn status(status: u16) -> Self {
        Self {
            status,
            body: Vec::new(),
            content_length: Some(0),
            fail_after: None,
        }
    }

    pub fn without_length(mut self) -> Self {
        self.content_length = None;
        self
    }

    pub fn with_announced_length(mut self, len: u64) -> Self {
        self.content_length = Some(len);
        self
    }

    /// Reads fail once `bytes` have been delivered.
    pub fn failing_after(mut self, bytes: usize) -> Self {
        self.fail_after = Some(bytes);
        self
    }
}

#[derive(Debug, Clone)]
pub struct RequestRecord {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub profile: ConnectionProfile,
}

impl RequestRecord {
    pub fn has_header(&self, name: &str, value: &str) -> bool {
        self.headers.iter().any(|(n, v)| n == name && v == value)
    }
}

#[derive(Default)]
struct ClientRecord {
    requests: Vec<RequestRecord>,
    bytes_read: usize,
    open: usize,
}

#[derive(Clone, Default)]
pub struct ClientLog(Arc<Mutex<ClientRecord>>);

impl ClientLog {
    pub fn requests(&self) -> Vec<RequestRecord> {
        self.0.lock().unwrap().requests.clone()
    }

    pub fn urls(&self) -> Vec<String> {
        self.requests().into_iter().map(|r| r.url).collect()
    }

    pub fn bytes_read(&self) -> usize {
        self.0.lock().unwrap().bytes_read
    }

    pub fn all_closed(&self) -> bool {
        self.0.lock().unwrap().open == 0
    }
}

#[derive(Default)]
pub struct FakeClient {
    routes: HashMap<String, FakeRoute>,
    log: ClientLog,
}

impl FakeClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(mut self, url: &str, route: FakeRoute) -> Self {
        self.routes.insert(url.to_string(), route);
        self
    }

    pub fn log(&self) -> ClientLog {
        self.log.clone()
    }
}

impl HttpClient for FakeClient {
    type Response = FakeResponse;

    fn get(
        &mut self,
        url: &str,
        headers: &[(&str, &str)],
        profile: &ConnectionProfile,
    ) -> Result<FakeResponse, TransportError> {
        let mut record = self.log.0.lock().unwrap();
        record.requests.push(RequestRecord {
            url: url.to_string(),
            headers: headers
                .iter()
                .map(|(n, v)| (n.to_string(), v.to_string()))
                .collect(),
            profile: *profile,
        });

        let route = self
            .routes
            .get(url)
            .cloned()
            .ok_or_else(|| TransportError::Connect(format!("no route to {}", url)))?;
        record.open += 1;

        Ok(FakeResponse {
            route,
            pos: 0,
            log: self.log.clone(),
        })
    }
}

pub struct FakeResponse {
    route: FakeRoute,
    pos: usize,
    log: ClientLog,
}

impl HttpResponse for FakeResponse {
    fn status(&self) -> u16 {
        self.route.status
    }

    fn content_length(&self) -> Option<u64> {
        self.route.content_length
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        if let Some(limit) = self.route.fail_after {
            if self.pos >= limit {
                return Err(TransportError::Read("connection reset".into()));
            }
        }

        let limit = self.route.fail_after.unwrap_or(usize::MAX);
        let end = (self.pos + buf.len()).min(self.route.body.len()).min(limit);
        let n = end - self.pos;
        buf[..n].copy_from_slice(&self.route.body[self.pos..end]);
        self.pos = end;
        self.log.0.lock().unwrap().bytes_read += n;
        Ok(n)
    }
}

impl Drop for FakeResponse {
    fn drop(&mut self) {
        self.log.0.lock().unwrap().open -= 1;
    }
}

// ── Flash ─────────────────────────────────────────────────────

#[derive(Default)]
struct FlashRecord {
    begins: usize,
    written: Vec<u8>,
    completed: bool,
    aborted: bool,
}

#[derive(Clone, Default)]
pub struct FlashLog(Arc<Mutex<FlashRecord>>);

impl FlashLog {
    pub fn begins(&self) -> usize {
        self.0.lock().unwrap().begins
    }

    pub fn written(&self) -> Vec<u8> {
        self.0.lock().unwrap().written.clone()
    }

    pub fn completed(&self) -> bool {
        self.0.lock().unwrap().completed
    }

    pub fn aborted(&self) -> bool {
        self.0.lock().unwrap().aborted
    }
}

pub struct FakeFlash {
    capacity: u64,
    fail_begin: bool,
    fail_writes: bool,
    fail_complete: bool,
    gate: Option<(Sender<()>, Receiver<()>)>,
    log: FlashLog,
}

impl FakeFlash {
    pub fn new(capacity: u64) -> Self {
        Self {
            capacity,
            fail_begin: false,
            fail_writes: false,
            fail_complete: false,
            gate: None,
            log: FlashLog::default(),
        }
    }

    /// Erase fails; no update session is opened.
    pub fn failing_begin(mut self) -> Self {
        self.fail_begin = true;
        self
    }

    pub fn failing_writes(mut self) -> Self {
        self.fail_writes = true;
        self
    }

    /// Every byte lands but the image is refused when finalized.
    pub fn failing_complete(mut self) -> Self {
        self.fail_complete = true;
        self
    }

    /// The first write signals `entered`, then blocks until `release` fires.
    pub fn gated(mut self, entered: Sender<()>, release: Receiver<()>) -> Self {
        self.gate = Some((entered, release));
        self
    }

    pub fn log(&self) -> FlashLog {
        self.log.clone()
    }
}

impl FlashWriter for FakeFlash {
    type Update<'a> = FakeUpdate<'a> where Self: 'a;

    fn capacity(&self) -> u64 {
        self.capacity
    }

    fn begin(&mut self, _image_size: u64) -> Result<FakeUpdate<'_>, FlashError> {
        self.log.0.lock().unwrap().begins += 1;
        if self.fail_begin {
            return Err(FlashError("erase failed".into()));
        }
        Ok(FakeUpdate { flash: self })
    }
}

pub struct FakeUpdate<'a> {
    flash: &'a mut FakeFlash,
}

impl FlashUpdate for FakeUpdate<'_> {
    fn write(&mut self, chunk: &[u8]) -> Result<(), FlashError> {
        if let Some((entered, release)) = self.flash.gate.take() {
            let _ = entered.send(());
            let _ = release.recv();
        }
        if self.flash.fail_writes {
            return Err(FlashError("flash write failed".into()));
        }
        self.flash.log.0.lock().unwrap().written.extend_from_slice(chunk);
        Ok(())
    }

    fn complete(self) -> Result<(), FlashError> {
        if self.flash.fail_complete {
            return Err(FlashError("image validation failed".into()));
        }
        self.flash.log.0.lock().unwrap().completed = true;
        Ok(())
    }

    fn abort(self) {
        self.flash.log.0.lock().unwrap().aborted = true;
    }
}

// ── Device ────────────────────────────────────────────────────

struct DeviceRecord {
    now: Duration,
    tick: Duration,
    free_heap: u32,
    heap_reads: usize,
    watchdog_enabled: bool,
    disables: usize,
    yields: usize,
    feeds: usize,
    feeds_while_disabled: usize,
    led_updating: bool,
    led_history: Vec<bool>,
    restarts: Vec<Duration>,
}

#[derive(Clone)]
pub struct DeviceLog(Arc<Mutex<DeviceRecord>>);

impl DeviceLog {
    pub fn heap_reads(&self) -> usize {
        self.0.lock().unwrap().heap_reads
    }

    pub fn watchdog_enabled(&self) -> bool {
        self.0.lock().unwrap().watchdog_enabled
    }

    pub fn watchdog_disables(&self) -> usize {
        self.0.lock().unwrap().disables
    }

    pub fn yields(&self) -> usize {
        self.0.lock().unwrap().yields
    }

    /// Feeds that reached an armed watchdog
    pub fn feeds(&self) -> usize {
        self.0.lock().unwrap().feeds
    }

    pub fn feeds_while_disabled(&self) -> usize {
        self.0.lock().unwrap().feeds_while_disabled
    }

    pub fn led_updating(&self) -> bool {
        self.0.lock().unwrap().led_updating
    }

    pub fn led_history(&self) -> Vec<bool> {
        self.0.lock().unwrap().led_history.clone()
    }

    pub fn restarts(&self) -> Vec<Duration> {
        self.0.lock().unwrap().restarts.clone()
    }
}

pub struct FakeDevice {
    log: DeviceLog,
}

impl FakeDevice {
    pub fn new(free_heap: u32) -> Self {
        Self {
            log: DeviceLog(Arc::new(Mutex::new(DeviceRecord {
                now: Duration::ZERO,
                tick: Duration::from_millis(1),
                free_heap,
                heap_reads: 0,
                watchdog_enabled: true,
                disables: 0,
                yields: 0,
                feeds: 0,
                feeds_while_disabled: 0,
                led_updating: false,
                led_history: Vec::new(),
                restarts: Vec::new(),
            }))),
        }
    }

    /// How far the clock advances on every read
    pub fn with_tick(self, tick: Duration) -> Self {
        self.log.0.lock().unwrap().tick = tick;
        self
    }

    pub fn log(&self) -> DeviceLog {
        self.log.clone()
    }
}

impl Clock for FakeDevice {
    fn uptime(&self) -> Duration {
        let mut record = self.log.0.lock().unwrap();
        let tick = record.tick;
        record.now += tick;
        record.now
    }
}

impl HeapProbe for FakeDevice {
    fn memory(&self) -> MemorySnapshot {
        let mut record = self.log.0.lock().unwrap();
        record.heap_reads += 1;
        MemorySnapshot::from_heap(record.free_heap, record.free_heap / 2)
    }
}

impl Watchdog for FakeDevice {
    fn disable(&mut self) {
        let mut record = self.log.0.lock().unwrap();
        record.watchdog_enabled = false;
        record.disables += 1;
    }

    fn enable(&mut self) {
        self.log.0.lock().unwrap().watchdog_enabled = true;
    }

    fn feed(&mut self) {
        let mut record = self.log.0.lock().unwrap();
        if record.watchdog_enabled {
            record.feeds += 1;
        } else {
            record.feeds_while_disabled += 1;
        }
    }

    fn yield_now(&mut self) {
        self.log.0.lock().unwrap().yields += 1;
    }
}

impl StatusLed for FakeDevice {
    fn set_updating(&mut self, active: bool) {
        let mut record = self.log.0.lock().unwrap();
        record.led_updating = active;
        record.led_history.push(active);
    }
}

impl Restarter for FakeDevice {
    fn restart(&mut self, delay: Duration) {
        self.log.0.lock().unwrap().restarts.push(delay);
    }
}

// ── Events ────────────────────────────────────────────────────

#[derive(Clone, Default)]
pub struct RecordingSink(Arc<Mutex<Vec<UpdateEvent>>>);

impl RecordingSink {
    pub fn events(&self) -> Vec<UpdateEvent> {
        self.0.lock().unwrap().clone()
    }

    pub fn phases(&self) -> Vec<Phase> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                UpdateEvent::Phase(phase) => Some(phase),
                _ => None,
            })
            .collect()
    }

    pub fn flash_states(&self) -> Vec<FlashState> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                UpdateEvent::Flash(state) => Some(state),
                _ => None,
            })
            .collect()
    }

    pub fn last_progress(&self) -> Option<(u64, u64)> {
        self.events().into_iter().rev().find_map(|e| match e {
            UpdateEvent::Progress { written, total } => Some((written, total)),
            _ => None,
        })
    }
}

impl EventSink for RecordingSink {
    fn notify(&mut self, event: UpdateEvent) {
        self.0.lock().unwrap().push(event);
    }
}
