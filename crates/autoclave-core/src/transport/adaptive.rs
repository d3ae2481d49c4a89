//! Executor selection by learned per-device parsing mode.
//!
//! A device whose mode is unknown gets one strict attempt under a short
//! timeout. Broken framing or a stall sends the request once more through
//! the lenient executor. Whichever executor succeeds is remembered for the
//! rest of the process; if both fail nothing is remembered.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use super::traits::{HttpRequest, HttpResponse, RequestExecutor, TransportError};
use crate::cache::{DeviceCaches, ParsingMode};
use crate::device::DeviceAddress;
use crate::events::{DeviceEvent, DeviceObserver};
use crate::protocol::DETECTION_TIMEOUT;

pub struct AdaptiveTransport {
    strict: Box<dyn RequestExecutor>,
    lenient: Box<dyn RequestExecutor>,
    caches: Arc<DeviceCaches>,
    observer: Arc<dyn DeviceObserver>,
    detection_timeout: Duration,
}

impl AdaptiveTransport {
    pub fn new(
        strict: Box<dyn RequestExecutor>,
        lenient: Box<dyn RequestExecutor>,
        caches: Arc<DeviceCaches>,
        observer: Arc<dyn DeviceObserver>,
    ) -> Self {
        Self {
            strict,
            lenient,
            caches,
            observer,
            detection_timeout: DETECTION_TIMEOUT,
        }
    }

    pub fn with_detection_timeout(mut self, timeout: Duration) -> Self {
        self.detection_timeout = timeout;
        self
    }

    pub fn caches(&self) -> &DeviceCaches {
        &self.caches
    }

    pub fn observer(&self) -> &dyn DeviceObserver {
        self.observer.as_ref()
    }

    pub fn detection_timeout(&self) -> Duration {
        self.detection_timeout
    }

    /// Issue `request` through the executor this device needs.
    pub fn execute(
        &self,
        address: &DeviceAddress,
        request: &HttpRequest,
        timeout: Duration,
    ) -> Result<HttpResponse, TransportError> {
        match self.caches.parsing_mode(address) {
            ParsingMode::Standard => self.strict.execute(address, request, timeout),
            ParsingMode::Lenient => self.lenient.execute(address, request, timeout),
            ParsingMode::Unlearned => self.detect(address, request, timeout),
        }
    }

    fn detect(
        &self,
        address: &DeviceAddress,
        request: &HttpRequest,
        timeout: Duration,
    ) -> Result<HttpResponse, TransportError> {
        let strict_timeout = self.detection_timeout.min(timeout);
        let strict_err = match self.strict.execute(address, request, strict_timeout) {
            Ok(response) => {
                self.learn(address, ParsingMode::Standard);
                return Ok(response);
            }
            Err(e) => e,
        };

        if !strict_err.warrants_lenient_retry() {
            return Err(strict_err);
        }

        debug!(
            address = %address,
            error = %strict_err,
            executor = self.lenient.name(),
            "Strict attempt failed, retrying leniently"
        );

        match self.lenient.execute(address, request, timeout) {
            Ok(response) => {
                self.learn(address, ParsingMode::Lenient);
                Ok(response)
            }
            Err(e) => {
                warn!(address = %address, error = %e, "Lenient retry failed; parsing mode left unlearned");
                Err(e)
            }
        }
    }

    fn learn(&self, address: &DeviceAddress, mode: ParsingMode) {
        self.caches.set_parsing_mode(address, mode);
        self.observer.on_event(&DeviceEvent::ParsingModeLearned {
            address: address.clone(),
            mode,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::NullObserver;
    use crate::transport::MockExecutor;

    struct Rig {
        transport: AdaptiveTransport,
        strict: MockExecutor,
        lenient: MockExecutor,
        caches: Arc<DeviceCaches>,
    }

    fn rig() -> Rig {
        let strict = MockExecutor::new("strict");
        let lenient = MockExecutor::new("lenient");
        let caches = Arc::new(DeviceCaches::new());
        let transport = AdaptiveTransport::new(
            Box::new(strict.clone()),
            Box::new(lenient.clone()),
            caches.clone(),
            Arc::new(NullObserver),
        );
        Rig {
            transport,
            strict,
            lenient,
            caches,
        }
    }

    fn addr() -> DeviceAddress {
        DeviceAddress::new("10.0.0.4", 80)
    }

    const FULL: Duration = Duration::from_secs(15);

    #[test]
    fn test_strict_success_sticks() {
        let r = rig();
        r.strict.queue_response(HttpResponse::ok("a"));
        r.strict.queue_response(HttpResponse::ok("b"));
        r.strict.queue_error(TransportError::MalformedResponse("bad".into()));

        r.transport.execute(&addr(), &HttpRequest::get("/"), FULL).unwrap();
        assert_eq!(r.caches.parsing_mode(&addr()), ParsingMode::Standard);
        assert_eq!(r.strict.requests()[0].timeout, Duration::from_secs(3));

        r.transport.execute(&addr(), &HttpRequest::get("/"), FULL).unwrap();
        assert_eq!(r.strict.requests()[1].timeout, FULL);

        // Once Standard, a framing error is surfaced rather than retried.
        assert!(r.transport.execute(&addr(), &HttpRequest::get("/"), FULL).is_err());
        assert_eq!(r.lenient.request_count(), 0);
    }

    #[test]
    fn test_malformed_falls_back_and_sticks() {
        let r = rig();
        r.strict
            .queue_error(TransportError::MalformedResponse("invalid status line".into()));
        r.lenient.queue_response(HttpResponse::ok("[]"));
        r.lenient.queue_response(HttpResponse::ok("[]"));

        let resp = r.transport.execute(&addr(), &HttpRequest::get("/"), FULL).unwrap();
        assert_eq!(resp.text(), "[]");
        assert_eq!(r.caches.parsing_mode(&addr()), ParsingMode::Lenient);
        assert_eq!(r.lenient.requests()[0].timeout, FULL);

        r.transport.execute(&addr(), &HttpRequest::get("/"), FULL).unwrap();
        assert_eq!(r.strict.request_count(), 1);
        assert_eq!(r.lenient.request_count(), 2);
    }

    #[test]
    fn test_double_failure_learns_nothing() {
        let r = rig();
        r.strict.queue_error(TransportError::timeout(Duration::from_secs(3)));
        r.lenient.queue_error(TransportError::timeout(FULL));

        let err = r
            .transport
            .execute(&addr(), &HttpRequest::head("/"), FULL)
            .unwrap_err();
        assert!(matches!(err, TransportError::Timeout { timeout_ms: 15000 }));
        assert_eq!(r.caches.parsing_mode(&addr()), ParsingMode::Unlearned);

        // Next call goes through detection again.
        r.strict.queue_response(HttpResponse::ok(""));
        r.transport.execute(&addr(), &HttpRequest::head("/"), FULL).unwrap();
        assert_eq!(r.caches.parsing_mode(&addr()), ParsingMode::Standard);
    }

    #[test]
    fn test_connection_failure_skips_lenient() {
        let r = rig();
        r.strict.disconnect();

        let err = r
            .transport
            .execute(&addr(), &HttpRequest::head("/"), FULL)
            .unwrap_err();
        assert!(matches!(err, TransportError::ConnectionFailed { .. }));
        assert_eq!(r.lenient.request_count(), 0);
        assert_eq!(r.caches.parsing_mode(&addr()), ParsingMode::Unlearned);
    }

    #[test]
    fn test_modes_are_per_address() {
        let r = rig();
        let other = DeviceAddress::new("10.0.0.5", 80);
        r.caches.set_parsing_mode(&other, ParsingMode::Lenient);
        r.lenient.queue_response(HttpResponse::ok(""));
        r.strict.queue_response(HttpResponse::ok(""));

        r.transport.execute(&other, &HttpRequest::head("/"), FULL).unwrap();
        r.transport.execute(&addr(), &HttpRequest::head("/"), FULL).unwrap();
        assert_eq!(r.lenient.requests()[0].address, other);
        assert_eq!(r.strict.requests()[0].address, addr());
    }
}
