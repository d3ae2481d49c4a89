//! Fake devices for unit tests.
//!
//! Each fake answers requests the way its firmware generation does, so the
//! engine can be driven end to end through a [`MockExecutor`].

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{Local, NaiveDate};
use serde_json::{Value, json};

use crate::cache::{DeviceCaches, ParsingMode};
use crate::config::ClientConfig;
use crate::device::DeviceAddress;
use crate::events::tests::RecordingObserver;
use crate::protocol::constants::{
    LEGACY_CYCLE_DATA_PATH, LEGACY_INDEX_PATH, MODERN_ARCHIVE_PATH, MODERN_CYCLE_DATA_PATH,
};
use crate::protocol::identifier::{CycleFileName, pad_cycle_number};
use crate::transport::{
    AdaptiveTransport, HttpRequest, HttpResponse, Method, MockExecutor, TransportError,
};

pub(crate) fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap()
}

/// Local noon of `date` as Unix seconds.
pub(crate) fn local_noon(date: NaiveDate) -> i64 {
    date.and_hms_opt(12, 0, 0)
        .unwrap()
        .and_local_timezone(Local)
        .earliest()
        .unwrap()
        .timestamp()
}

/// Adaptive transport over a strict mock answering with `responder`.
///
/// The device starts out in Standard parsing mode so request timeouts are the
/// configured ones; use [`Rig::unlearned`] to exercise detection. The lenient
/// mock has no responder and times out.
pub(crate) struct Rig {
    pub transport: AdaptiveTransport,
    pub config: ClientConfig,
    pub address: DeviceAddress,
    pub strict: MockExecutor,
    pub lenient: MockExecutor,
    pub caches: Arc<DeviceCaches>,
    pub observer: Arc<RecordingObserver>,
}

impl Rig {
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&DeviceAddress, &HttpRequest) -> Result<HttpResponse, TransportError>
            + Send
            + Sync
            + 'static,
    {
        let rig = Self::build(
            MockExecutor::new("strict").with_responder(responder),
            MockExecutor::new("lenient"),
        );
        rig.caches
            .set_parsing_mode(&rig.address, ParsingMode::Standard);
        rig
    }

    /// Nothing learned yet, and a device whose framing the strict executor
    /// rejects: only the lenient mock answers with `responder`.
    pub fn unlearned<F>(responder: F) -> Self
    where
        F: Fn(&DeviceAddress, &HttpRequest) -> Result<HttpResponse, TransportError>
            + Send
            + Sync
            + 'static,
    {
        let strict = MockExecutor::new("strict").with_responder(|_, _| {
            Err(TransportError::MalformedResponse(
                "invalid HTTP status line".into(),
            ))
        });
        Self::build(strict, MockExecutor::new("lenient").with_responder(responder))
    }

    fn build(strict: MockExecutor, lenient: MockExecutor) -> Self {
        let caches = Arc::new(DeviceCaches::new());
        let observer = Arc::new(RecordingObserver::default());
        let transport = AdaptiveTransport::new(
            Box::new(strict.clone()),
            Box::new(lenient.clone()),
            caches.clone(),
            observer.clone(),
        );
        Self {
            transport,
            config: ClientConfig::default(),
            address: DeviceAddress::new("10.0.0.9", 80),
            strict,
            lenient,
            caches,
            observer,
        }
    }
}

fn query_param<'a>(path: &'a str, name: &str) -> Option<&'a str> {
    let (_, query) = path.split_once('?')?;
    query
        .split('&')
        .find_map(|pair| pair.strip_prefix(name)?.strip_prefix('='))
}

fn not_found() -> Result<HttpResponse, TransportError> {
    Ok(HttpResponse::new(404))
}

fn json_ok(value: Value) -> Result<HttpResponse, TransportError> {
    Ok(HttpResponse::ok(value.to_string()))
}

fn no_such_cycle() -> Result<HttpResponse, TransportError> {
    json_ok(json!({"succeeded": false}))
}

/// nginx unit serving the archive page and `.cpt` telemetry.
#[derive(Debug, Clone, Default)]
pub(crate) struct FakeModernDevice {
    records: Vec<(NaiveDate, u32, String)>,
}

impl FakeModernDevice {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(mut self, date: NaiveDate, cycle: u32, serial: &str) -> Self {
        self.records.push((date, cycle, serial.to_string()));
        self
    }

    pub fn archive_page(&self) -> String {
        let info: Vec<Value> = self
            .records
            .iter()
            .enumerate()
            .map(|(i, (date, cycle, serial))| {
                json!({
                    "records_id": i + 1,
                    "cycle_start_time": local_noon(*date),
                    "file_name": format!("S{}_{}_{}.txt", date.format("%Y%m%d"), pad_cycle_number(*cycle), serial),
                    "cycle_number": cycle.to_string(),
                    "cycle_id": format!("{}", 9000 + i),
                })
            })
            .collect();
        format!(
            "<html><head><script>\nvar cyclesInfo = {};\n</script></head><body><div id=\"cyclesInfo\"></div></body></html>",
            Value::Array(info)
        )
    }

    pub fn responder(
        self,
    ) -> impl Fn(&DeviceAddress, &HttpRequest) -> Result<HttpResponse, TransportError>
    + Send
    + Sync
    + 'static {
        move |_, request| {
            let route = request.path.split('?').next().unwrap_or_default();
            match (request.method, route) {
                (Method::Head, "/") => {
                    Ok(HttpResponse::new(200).with_header("Server", "nginx/1.18.0"))
                }
                (Method::Head, MODERN_ARCHIVE_PATH) => Ok(HttpResponse::new(200)),
                (Method::Get, MODERN_ARCHIVE_PATH) => Ok(HttpResponse::ok(self.archive_page())),
                (Method::Get, MODERN_CYCLE_DATA_PATH) => {
                    let Some(file) =
                        query_param(&request.path, "filename").and_then(CycleFileName::parse)
                    else {
                        return no_such_cycle();
                    };
                    let found = self.records.iter().find(|(date, cycle, serial)| {
                        *date == file.date
                            && pad_cycle_number(*cycle) == file.cycle_number
                            && file.serial.as_deref() == Some(serial.as_str())
                    });
                    match found {
                        Some((date, cycle, _)) => json_ok(json!({
                            "succeeded": true,
                            "date": date.format("%Y-%m-%d").to_string(),
                            "number": cycle,
                            "runmode": 1,
                            "display_units": "C/kPa",
                            "status": "PASS",
                            "x_axis_points": 3,
                            "temp": "20.1,121.3,134.2",
                            "pressure": "101,210,216",
                            "log": format!("STATIM 6000\r\nCYCLE NO. {}\r\n", cycle),
                        })),
                        None => no_such_cycle(),
                    }
                }
                _ => not_found(),
            }
        }
    }
}

#[derive(Debug, Clone)]
enum IndexShape {
    /// Years, months and days, built from the known cycles.
    Full,
    /// Year and months only.
    Skeleton { year: i32, months: Vec<u32> },
    /// Served verbatim.
    Raw(Value),
}

/// MQX unit serving the CGI endpoints and optional directory listings.
#[derive(Debug, Clone)]
pub(crate) struct FakeLegacyDevice {
    cycles: BTreeMap<u32, NaiveDate>,
    index: IndexShape,
    listings: HashMap<String, String>,
}

impl FakeLegacyDevice {
    pub fn new() -> Self {
        Self {
            cycles: BTreeMap::new(),
            index: IndexShape::Full,
            listings: HashMap::new(),
        }
    }

    pub fn cycle(mut self, number: u32, date: NaiveDate) -> Self {
        self.cycles.insert(number, date);
        self
    }

    pub fn full_index(mut self) -> Self {
        self.index = IndexShape::Full;
        self
    }

    pub fn skeleton_index(mut self, year: i32, months: &[u32]) -> Self {
        self.index = IndexShape::Skeleton {
            year,
            months: months.to_vec(),
        };
        self
    }

    pub fn raw_index(mut self, index: Value) -> Self {
        self.index = IndexShape::Raw(index);
        self
    }

    pub fn listing(mut self, path: &str, body: &str) -> Self {
        self.listings.insert(path.to_string(), body.to_string());
        self
    }

    fn index_body(&self) -> Value {
        match &self.index {
            IndexShape::Skeleton { year, months } => json!([{
                "year": year.to_string(),
                "months": months.iter().map(|m| json!({"month": format!("{:02}", m)})).collect::<Vec<_>>(),
            }]),
            IndexShape::Raw(index) => index.clone(),
            IndexShape::Full => {
                let mut tree: BTreeMap<String, BTreeMap<String, BTreeMap<String, Vec<String>>>> =
                    BTreeMap::new();
                for (number, date) in &self.cycles {
                    tree.entry(date.format("%Y").to_string())
                        .or_default()
                        .entry(date.format("%m").to_string())
                        .or_default()
                        .entry(date.format("%d").to_string())
                        .or_default()
                        .push(number.to_string());
                }
                let years: Vec<Value> = tree
                    .into_iter()
                    .map(|(year, months)| {
                        let months: Vec<Value> = months
                            .into_iter()
                            .map(|(month, days)| {
                                let days: Vec<Value> = days
                                    .into_iter()
                                    .map(|(day, cycles)| json!({"day": day, "cycles": cycles}))
                                    .collect();
                                json!({"month": month, "days": days})
                            })
                            .collect();
                        json!({"year": year, "months": months})
                    })
                    .collect();
                Value::Array(years)
            }
        }
    }

    fn cycle_data(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        let body: Value = match request.body.as_deref().map(serde_json::from_slice::<Value>) {
            Some(Ok(body)) => body,
            _ => return Ok(HttpResponse::new(400)),
        };
        let number = body["cycle"].as_str().and_then(|c| c.parse::<u32>().ok());
        match number.and_then(|n| self.cycles.get(&n).map(|d| (n, *d))) {
            Some((number, date)) => json_ok(json!({
                "succeeded": true,
                "date": date.format("%m/%d/%Y 10:32:00").to_string(),
                "number": number.to_string(),
                "runmode": "2",
                "display_units": "C/kPa",
                "status": "PASS",
                "x_axis_points": "3",
                "temp": "20.1 121.3 134.2",
                "pressure": "101 210 216",
                "log": format!("ELARA11\nCYCLE NO. {}\n", number),
            })),
            None => no_such_cycle(),
        }
    }

    pub fn responder(
        self,
    ) -> impl Fn(&DeviceAddress, &HttpRequest) -> Result<HttpResponse, TransportError>
    + Send
    + Sync
    + 'static {
        move |_, request| {
            let route = request.path.split('?').next().unwrap_or_default();
            match (request.method, route) {
                (Method::Head, "/") => {
                    Ok(HttpResponse::new(200).with_header("Server", "MQX HTTPSRV/2.0"))
                }
                (Method::Post, LEGACY_INDEX_PATH) => json_ok(self.index_body()),
                (Method::Post, LEGACY_CYCLE_DATA_PATH) => self.cycle_data(request),
                (Method::Get, path) => match self.listings.get(path) {
                    Some(body) => Ok(HttpResponse::ok(body.clone())),
                    None => not_found(),
                },
                _ => not_found(),
            }
        }
    }
}
