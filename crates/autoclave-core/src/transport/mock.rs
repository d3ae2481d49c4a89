//! Mock request executor for testing.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::traits::{HttpRequest, HttpResponse, RequestExecutor, TransportError};
use crate::device::DeviceAddress;

/// Computes a response from the request; used for stateful fake devices.
pub type Responder =
    dyn Fn(&DeviceAddress, &HttpRequest) -> Result<HttpResponse, TransportError> + Send + Sync;

/// A request captured by the mock.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub address: DeviceAddress,
    pub request: HttpRequest,
    pub timeout: Duration,
}

/// Mock executor for unit testing protocol logic.
///
/// Queued results are returned first, in order; once the queue is empty the
/// responder (if any) answers. Clones share queue, responder and log, so a
/// test can keep a handle after moving the executor into a transport.
#[derive(Clone)]
pub struct MockExecutor {
    label: &'static str,
    /// Queued results to return on next execute.
    queue: Arc<Mutex<VecDeque<Result<HttpResponse, TransportError>>>>,
    responder: Option<Arc<Responder>>,
    /// Captured requests.
    log: Arc<Mutex<Vec<RecordedRequest>>>,
    /// Whether the device is "reachable".
    connected: Arc<Mutex<bool>>,
}

impl MockExecutor {
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            queue: Arc::new(Mutex::new(VecDeque::new())),
            responder: None,
            log: Arc::new(Mutex::new(Vec::new())),
            connected: Arc::new(Mutex::new(true)),
        }
    }

    /// Answer every request not served from the queue with `responder`.
    pub fn with_responder<F>(mut self, responder: F) -> Self
    where
        F: Fn(&DeviceAddress, &HttpRequest) -> Result<HttpResponse, TransportError>
            + Send
            + Sync
            + 'static,
    {
        self.responder = Some(Arc::new(responder));
        self
    }

    /// Queue a response to be returned by the next execute.
    pub fn queue_response(&self, response: HttpResponse) {
        self.queue.lock().unwrap().push_back(Ok(response));
    }

    /// Queue a failure to be returned by the next execute.
    pub fn queue_error(&self, error: TransportError) {
        self.queue.lock().unwrap().push_back(Err(error));
    }

    /// Get all captured requests.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.log.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.log.lock().unwrap().len()
    }

    /// Clear captured requests.
    pub fn clear_requests(&self) {
        self.log.lock().unwrap().clear();
    }

    /// Simulate the device dropping off the network.
    pub fn disconnect(&self) {
        *self.connected.lock().unwrap() = false;
    }

    pub fn reconnect(&self) {
        *self.connected.lock().unwrap() = true;
    }
}

impl Default for MockExecutor {
    fn default() -> Self {
        Self::new("mock")
    }
}

impl RequestExecutor for MockExecutor {
    fn execute(
        &self,
        address: &DeviceAddress,
        request: &HttpRequest,
        timeout: Duration,
    ) -> Result<HttpResponse, TransportError> {
        self.log.lock().unwrap().push(RecordedRequest {
            address: address.clone(),
            request: request.clone(),
            timeout,
        });

        if !*self.connected.lock().unwrap() {
            return Err(TransportError::ConnectionFailed {
                address: address.to_string(),
                message: "connection refused".into(),
            });
        }

        if let Some(queued) = self.queue.lock().unwrap().pop_front() {
            return queued;
        }

        match &self.responder {
            Some(responder) => responder(address, request),
            None => Err(TransportError::timeout(timeout)),
        }
    }

    fn name(&self) -> &'static str {
        self.label
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr() -> DeviceAddress {
        DeviceAddress::new("10.0.0.2", 80)
    }

    #[test]
    fn test_mock_queue_then_responder() {
        let mock = MockExecutor::default().with_responder(|_, req| {
            Ok(HttpResponse::ok(req.path.clone().into_bytes()))
        });
        mock.queue_response(HttpResponse::new(404));

        let t = Duration::from_secs(1);
        let first = mock.execute(&addr(), &HttpRequest::get("/a"), t).unwrap();
        assert_eq!(first.status, 404);

        let second = mock.execute(&addr(), &HttpRequest::get("/b"), t).unwrap();
        assert_eq!(second.text(), "/b");
        assert_eq!(mock.request_count(), 2);
    }

    #[test]
    fn test_mock_empty_times_out() {
        let mock = MockExecutor::default();
        let err = mock
            .execute(&addr(), &HttpRequest::head("/"), Duration::from_secs(3))
            .unwrap_err();
        assert!(matches!(err, TransportError::Timeout { timeout_ms: 3000 }));
    }

    #[test]
    fn test_mock_disconnect() {
        let mock = MockExecutor::default();
        mock.queue_response(HttpResponse::new(200));
        mock.disconnect();

        let err = mock
            .execute(&addr(), &HttpRequest::head("/"), Duration::from_secs(1))
            .unwrap_err();
        assert!(matches!(err, TransportError::ConnectionFailed { .. }));

        mock.reconnect();
        let clone = mock.clone();
        assert!(clone.execute(&addr(), &HttpRequest::head("/"), Duration::from_secs(1)).is_ok());
        assert_eq!(mock.request_count(), 2);
    }
}
