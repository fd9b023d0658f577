//! In-memory stand-ins for the device and the remote store, shared by the
//! unit tests in this crate.

use async_trait::async_trait;
use image::{DynamicImage, ImageOutputFormat, Rgb, RgbImage};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Notify;

use crate::device::{CaptureSurface, Fix, Geolocator, PositionOptions, RawCapture};
use crate::gateway::{AttendanceGateway, GatewayError, RecordQuery, Row};
use crate::idempotency::{ClientToken, TokenSource, ACTOR_FIELD, TOKEN_FIELD};
use crate::location::LocationError;
use crate::photo::PhotoAsset;
use crate::types::NewCheckin;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

// ---------------------------------------------------------------------------
// Images
// ---------------------------------------------------------------------------

fn gradient(w: u32, h: u32) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_fn(w, h, |x, y| {
        Rgb([(x * 25) as u8, (y * 25) as u8, 128])
    }))
}

pub fn sample_png(w: u32, h: u32) -> Vec<u8> {
    let mut buf = Vec::new();
    gradient(w, h)
        .write_to(&mut buf, ImageOutputFormat::Png)
        .unwrap();
    buf
}

pub fn sample_jpeg(w: u32, h: u32) -> Vec<u8> {
    let mut buf = Vec::new();
    gradient(w, h)
        .write_to(&mut buf, ImageOutputFormat::Jpeg(90))
        .unwrap();
    buf
}

/// Splice an APP1 EXIF segment carrying only an orientation tag right
/// after the JPEG SOI marker.
pub fn with_orientation(jpeg: &[u8], orientation: u8) -> Vec<u8> {
    let tiff: [u8; 26] = [
        b'M', b'M', 0x00, 0x2A, 0x00, 0x00, 0x00, 0x08, // header, IFD0 at 8
        0x00, 0x01, // one entry
        0x01, 0x12, 0x00, 0x03, 0x00, 0x00, 0x00, 0x01, // Orientation, SHORT, count 1
        0x00, orientation, 0x00, 0x00, // value
        0x00, 0x00, 0x00, 0x00, // no next IFD
    ];
    let mut app1 = Vec::new();
    app1.extend_from_slice(b"Exif\0\0");
    app1.extend_from_slice(&tiff);
    let len = (app1.len() + 2) as u16;

    let mut out = Vec::new();
    out.extend_from_slice(&jpeg[..2]);
    out.extend_from_slice(&[0xFF, 0xE1]);
    out.extend_from_slice(&len.to_be_bytes());
    out.extend_from_slice(&app1);
    out.extend_from_slice(&jpeg[2..]);
    out
}

// ---------------------------------------------------------------------------
// ScriptedCapture
// ---------------------------------------------------------------------------

/// Hands out queued captures in order; an empty queue means "closed".
pub struct ScriptedCapture {
    queue: Mutex<VecDeque<Option<RawCapture>>>,
    gate: Option<Arc<Notify>>,
    opened: AtomicUsize,
}

impl ScriptedCapture {
    pub fn new(queue: Vec<Option<RawCapture>>) -> Self {
        Self {
            queue: Mutex::new(queue.into()),
            gate: None,
            opened: AtomicUsize::new(0),
        }
    }

    /// `n` small JPEG captures.
    pub fn photos(n: usize) -> Self {
        Self::new(
            (0..n)
                .map(|i| {
                    Some(RawCapture {
                        bytes: sample_jpeg(8, 4),
                        media_type: Some("image/jpeg".into()),
                        file_name: format!("capture-{i}.jpg"),
                    })
                })
                .collect(),
        )
    }

    /// Block each capture until the gate is notified.
    pub fn with_gate(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CaptureSurface for ScriptedCapture {
    async fn capture(&self) -> Option<RawCapture> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        lock(&self.queue).pop_front().flatten()
    }
}

// ---------------------------------------------------------------------------
// ScriptedGeolocator
// ---------------------------------------------------------------------------

/// Returns scripted results in order, then `PositionUnavailable`.
pub struct ScriptedGeolocator {
    script: Mutex<VecDeque<Result<Fix, LocationError>>>,
    calls: Mutex<Vec<PositionOptions>>,
    delay: Option<Duration>,
    gate: Option<Arc<Notify>>,
}

impl ScriptedGeolocator {
    pub fn new(script: Vec<Result<Fix, LocationError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            calls: Mutex::new(Vec::new()),
            delay: None,
            gate: None,
        }
    }

    pub fn fix(lat: f64, lng: f64, accuracy: f64) -> Self {
        Self::new(vec![Ok(Fix {
            lat,
            lng,
            accuracy: Some(accuracy),
        })])
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_gate(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn calls(&self) -> Vec<PositionOptions> {
        lock(&self.calls).clone()
    }
}

#[async_trait]
impl Geolocator for ScriptedGeolocator {
    async fn current_position(&self, opts: PositionOptions) -> Result<Fix, LocationError> {
        lock(&self.calls).push(opts);
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        lock(&self.script)
            .pop_front()
            .unwrap_or(Err(LocationError::PositionUnavailable))
    }
}

// ---------------------------------------------------------------------------
// MemoryGateway
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Query,
    QueryStructured,
    Create(NewCheckin),
    Attach(String),
    Fetch(String),
}

#[derive(Default)]
struct Faults {
    query: bool,
    structured: bool,
    create: bool,
    create_blip: bool,
    attach: bool,
    fetch: bool,
}

/// A record store held in memory, with switchable failures.
pub struct MemoryGateway {
    records: Mutex<Vec<Row>>,
    calls: Mutex<Vec<Call>>,
    faults: Mutex<Faults>,
    create_gate: Mutex<Option<Arc<Notify>>>,
    attached: Mutex<Vec<Vec<u8>>>,
}

impl Default for MemoryGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
            faults: Mutex::new(Faults::default()),
            create_gate: Mutex::new(None),
            attached: Mutex::new(Vec::new()),
        }
    }

    fn next_name(records: &[Row]) -> String {
        format!("HR-EMP-CHK-{:05}", records.len() + 1)
    }

    /// Seed a record as if an earlier attempt had created it.
    pub fn insert_existing(&self, actor: &str, token: &str) -> String {
        let mut records = lock(&self.records);
        let name = Self::next_name(&records);
        records.push(to_row(json!({
            "name": name,
            ACTOR_FIELD: actor,
            TOKEN_FIELD: token,
        })));
        name
    }

    pub fn set_fail_query(&self, on: bool) {
        lock(&self.faults).query = on;
    }

    pub fn set_fail_structured(&self, on: bool) {
        lock(&self.faults).structured = on;
    }

    pub fn set_fail_create(&self, on: bool) {
        lock(&self.faults).create = on;
    }

    /// The record is stored but the caller sees a transport error.
    pub fn set_create_blip(&self, on: bool) {
        lock(&self.faults).create_blip = on;
    }

    pub fn set_fail_attach(&self, on: bool) {
        lock(&self.faults).attach = on;
    }

    pub fn set_fail_fetch(&self, on: bool) {
        lock(&self.faults).fetch = on;
    }

    /// Hold every create until the gate is notified.
    pub fn set_create_gate(&self, gate: Arc<Notify>) {
        *lock(&self.create_gate) = Some(gate);
    }

    pub fn calls(&self) -> Vec<Call> {
        lock(&self.calls).clone()
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        lock(&self.calls).iter().filter(|c| pred(c)).count()
    }

    pub fn record_count(&self) -> usize {
        lock(&self.records).len()
    }

    /// Bytes of every uploaded photo, in upload order.
    pub fn attached(&self) -> Vec<Vec<u8>> {
        lock(&self.attached).clone()
    }

    pub fn record(&self, name: &str) -> Option<Row> {
        lock(&self.records)
            .iter()
            .find(|r| r.get("name").and_then(Value::as_str) == Some(name))
            .cloned()
    }

    fn record_call(&self, call: Call) {
        lock(&self.calls).push(call);
    }

    fn matching(&self, query: &RecordQuery) -> Vec<Row> {
        lock(&self.records)
            .iter()
            .filter(|row| {
                query
                    .filters
                    .iter()
                    .all(|f| row.get(&f.field).and_then(Value::as_str) == Some(f.value.as_str()))
            })
            .take(query.limit as usize)
            .map(|row| {
                query
                    .fields
                    .iter()
                    .filter_map(|k| row.get(k).map(|v| (k.clone(), v.clone())))
                    .collect()
            })
            .collect()
    }
}

fn to_row(v: Value) -> Row {
    match v {
        Value::Object(row) => row,
        _ => Row::new(),
    }
}

#[async_trait]
impl AttendanceGateway for MemoryGateway {
    async fn create(&self, record: &NewCheckin) -> Result<String, GatewayError> {
        self.record_call(Call::Create(record.clone()));
        let gate = lock(&self.create_gate).clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        let (fail, blip) = {
            let f = lock(&self.faults);
            (f.create, f.create_blip)
        };
        if fail {
            return Err(GatewayError::Status {
                status: 417,
                message: None,
            });
        }

        let name = {
            let mut records = lock(&self.records);
            let name = Self::next_name(&records);
            records.push(to_row(json!({
                "name": name,
                ACTOR_FIELD: record.actor,
                "log_type": record.action.as_str(),
                "custom_site_supervisor": record.scope,
                TOKEN_FIELD: record.token.as_str(),
                "latitude": record.lat,
                "longitude": record.lng,
                "custom_lat": record.lat,
                "custom_lng": record.lng,
                "location": record.combined_location(),
            })));
            name
        };

        if blip {
            return Err(GatewayError::Transport("connection reset by peer".into()));
        }
        Ok(name)
    }

    async fn query(&self, query: &RecordQuery) -> Result<Vec<Row>, GatewayError> {
        self.record_call(Call::Query);
        if lock(&self.faults).query {
            return Err(GatewayError::Status {
                status: 417,
                message: Some(format!("Field not permitted in query: {TOKEN_FIELD}")),
            });
        }
        Ok(self.matching(query))
    }

    async fn query_structured(&self, query: &RecordQuery) -> Result<Vec<Row>, GatewayError> {
        self.record_call(Call::QueryStructured);
        if lock(&self.faults).structured {
            return Err(GatewayError::Transport("timed out".into()));
        }
        Ok(self.matching(query))
    }

    async fn attach_file(&self, record_id: &str, photo: &PhotoAsset) -> Result<(), GatewayError> {
        self.record_call(Call::Attach(record_id.to_string()));
        if lock(&self.faults).attach {
            return Err(GatewayError::Status {
                status: 500,
                message: None,
            });
        }
        let mut records = lock(&self.records);
        if let Some(row) = records
            .iter_mut()
            .find(|r| r.get("name").and_then(Value::as_str) == Some(record_id))
        {
            row.insert("attachment".into(), Value::String(photo.file_name().into()));
        }
        lock(&self.attached).push(photo.bytes().to_vec());
        Ok(())
    }

    async fn fetch(&self, record_id: &str, fields: &[&str]) -> Result<Row, GatewayError> {
        self.record_call(Call::Fetch(record_id.to_string()));
        if lock(&self.faults).fetch {
            return Err(GatewayError::Transport("connection refused".into()));
        }
        let row = self.record(record_id).ok_or(GatewayError::Status {
            status: 404,
            message: None,
        })?;
        Ok(fields
            .iter()
            .filter_map(|k| row.get(*k).map(|v| (k.to_string(), v.clone())))
            .collect())
    }
}

// ---------------------------------------------------------------------------
// FixedTokens
// ---------------------------------------------------------------------------

/// Hands out the given tokens in order, then `fixed-<n>`.
pub struct FixedTokens {
    queue: Mutex<VecDeque<String>>,
    minted: AtomicUsize,
}

impl FixedTokens {
    pub fn new(tokens: &[&str]) -> Self {
        Self {
            queue: Mutex::new(tokens.iter().map(|t| t.to_string()).collect()),
            minted: AtomicUsize::new(0),
        }
    }

    pub fn minted(&self) -> usize {
        self.minted.load(Ordering::SeqCst)
    }
}

impl TokenSource for FixedTokens {
    fn next_token(&self) -> ClientToken {
        let n = self.minted.fetch_add(1, Ordering::SeqCst);
        lock(&self.queue)
            .pop_front()
            .unwrap_or_else(|| format!("fixed-{n}"))
            .into()
    }
}
