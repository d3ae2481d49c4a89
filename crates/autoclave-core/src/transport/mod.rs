//! Transport layer module.

pub mod adaptive;
pub mod lenient;
pub mod mock;
pub mod strict;
pub mod traits;

pub use adaptive::AdaptiveTransport;
pub use lenient::LenientExecutor;
pub use mock::{MockExecutor, RecordedRequest};
pub use strict::StrictExecutor;
pub use traits::{HttpRequest, HttpResponse, Method, RequestExecutor, TransportError};
