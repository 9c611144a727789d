// In-memory device double for tests that run on a paused clock and
// therefore cannot use real sockets.
#![allow(dead_code, clippy::unwrap_used)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue, SET_COOKIE, WWW_AUTHENTICATE};
use secrecy::SecretString;

use tieline_api::wire::{MATRIX_PATH, PROBE_PATH};
use tieline_api::{Error, HttpRequest, HttpResponse, Transport};
use tieline_core::{Device, DeviceConfig};

pub const FEATURES_XML: &str = r#"<result><matrix-features><inputs><input id="in1"/><input id="in3"/></inputs><outputs><output id="hpl"/></outputs></matrix-features></result>"#;

/// One request as the device saw it.
#[derive(Debug, Clone)]
pub struct Seen {
    pub method: String,
    pub path: String,
    pub nc: Option<u32>,
    pub csrf: Option<String>,
    pub body: Option<String>,
}

#[derive(Default)]
pub struct FakeDevice {
    pub nonce: Mutex<String>,
    pub token: Mutex<String>,
    pub reject_credentials: AtomicBool,
    pub meter_unreachable: AtomicBool,
    pub meter_statuses: Mutex<VecDeque<u16>>,
    pub matrix_statuses: Mutex<VecDeque<u16>>,
    pub seen: Mutex<Vec<Seen>>,
}

impl FakeDevice {
    pub fn new() -> Arc<Self> {
        let device = Self::default();
        *device.nonce.lock().unwrap() = "abc123".into();
        *device.token.lock().unwrap() = "XYZ".into();
        Arc::new(device)
    }

    pub fn queue_meter(&self, statuses: &[u16]) {
        self.meter_statuses.lock().unwrap().extend(statuses);
    }

    pub fn queue_matrix(&self, statuses: &[u16]) {
        self.matrix_statuses.lock().unwrap().extend(statuses);
    }

    pub fn seen(&self) -> Vec<Seen> {
        self.seen.lock().unwrap().clone()
    }

    pub fn count(&self, path_prefix: &str) -> usize {
        self.seen()
            .iter()
            .filter(|s| s.path.starts_with(path_prefix))
            .count()
    }

    /// Unauthenticated probes, i.e. challenge round-trips started.
    pub fn challenges(&self) -> usize {
        self.seen()
            .iter()
            .filter(|s| s.path == PROBE_PATH && s.nc.is_none())
            .count()
    }

    pub fn all_nc(&self) -> Vec<u32> {
        self.seen().iter().filter_map(|s| s.nc).collect()
    }

    fn challenge(&self) -> HttpResponse {
        let mut headers = HeaderMap::new();
        let value = format!(
            r#"Digest realm="tieline", nonce="{}", qop="auth""#,
            self.nonce.lock().unwrap()
        );
        headers.insert(WWW_AUTHENTICATE, HeaderValue::from_str(&value).unwrap());
        response(401, headers, "")
    }

    fn with_cookie(&self, status: u16) -> HttpResponse {
        let mut headers = HeaderMap::new();
        let cookie = format!("csrfCookie={}; Path=/", self.token.lock().unwrap());
        headers.append(SET_COOKIE, HeaderValue::from_static("lang=en; Path=/"));
        headers.append(SET_COOKIE, HeaderValue::from_str(&cookie).unwrap());
        response(status, headers, "")
    }
}

fn response(status: u16, headers: HeaderMap, body: &str) -> HttpResponse {
    HttpResponse {
        status,
        headers,
        body: body.into(),
    }
}

fn nc_of(headers: &HeaderMap) -> Option<u32> {
    let auth = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let nc = auth.split(", ").find_map(|p| p.strip_prefix("nc="))?;
    u32::from_str_radix(nc, 16).ok()
}

#[async_trait]
impl Transport for FakeDevice {
    async fn request(
        &self,
        _host: &str,
        _port: u16,
        request: HttpRequest,
    ) -> Result<HttpResponse, Error> {
        let nc = nc_of(&request.headers);
        self.seen.lock().unwrap().push(Seen {
            method: request.method.to_string(),
            path: request.path.clone(),
            nc,
            csrf: request
                .headers
                .get("x-csrf-token")
                .and_then(|v| v.to_str().ok())
                .map(String::from),
            body: request.body.clone(),
        });

        if request.path == PROBE_PATH {
            if nc.is_none() || self.reject_credentials.load(Ordering::SeqCst) {
                return Ok(self.challenge());
            }
            return Ok(self.with_cookie(200));
        }

        if nc.is_none() {
            return Ok(self.challenge());
        }

        if request.path.starts_with("/api/ppm") {
            if self.meter_unreachable.load(Ordering::SeqCst) {
                return Err(Error::Transport {
                    message: "connection reset by peer".into(),
                });
            }
            let status = self.meter_statuses.lock().unwrap().pop_front().unwrap_or(200);
            return Ok(response(status, HeaderMap::new(), "{}"));
        }

        if request.path == MATRIX_PATH {
            let status = self.matrix_statuses.lock().unwrap().pop_front().unwrap_or(200);
            return Ok(response(status, HeaderMap::new(), ""));
        }

        Ok(response(200, HeaderMap::new(), FEATURES_XML))
    }
}

pub fn config() -> DeviceConfig {
    DeviceConfig {
        keepalive_interval: Duration::from_secs(60),
        ..DeviceConfig::new("10.0.0.5", "admin", SecretString::from("pw".to_owned()))
    }
}

pub fn device(fake: &Arc<FakeDevice>) -> Device {
    Device::with_transport(config(), Arc::clone(fake) as Arc<dyn Transport>)
}
