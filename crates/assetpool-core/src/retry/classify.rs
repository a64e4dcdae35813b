//! Map fetch failures onto [`ErrorKind`].

use super::error::FetchError;
use super::policy::ErrorKind;

pub fn classify_http_status(code: u32) -> ErrorKind {
    match code {
        408 => ErrorKind::Timeout,
        429 | 503 => ErrorKind::Throttled,
        500..=599 => ErrorKind::Http5xx(code as u16),
        _ => ErrorKind::Other,
    }
}

pub fn classify_curl_error(e: &curl::Error) -> ErrorKind {
    let dropped = e.is_couldnt_connect()
        || e.is_couldnt_resolve_host()
        || e.is_couldnt_resolve_proxy()
        || e.is_ssl_connect_error()
        || e.is_partial_file()
        || e.is_got_nothing()
        || e.is_send_error()
        || e.is_recv_error();
    if e.is_operation_timedout() {
        ErrorKind::Timeout
    } else if dropped {
        ErrorKind::Connection
    } else {
        ErrorKind::Other
    }
}

/// Storage failures are local and never worth another request.
pub fn classify(e: &FetchError) -> ErrorKind {
    match e {
        FetchError::Curl(ce) => classify_curl_error(ce),
        FetchError::Http(code) => classify_http_status(*code),
        FetchError::Storage(_) => ErrorKind::Other,
    }
}
