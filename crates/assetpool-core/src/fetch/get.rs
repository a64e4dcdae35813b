//! Blocking GET of a whole file into the local store.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::retry::{self, FetchError, RetryDecision, RetryPolicy};

use super::FetchOptions;

/// Path for the partial file: appends `.part` to the final path
/// (e.g. `abc.png` → `abc.png.part`).
pub fn temp_path(final_path: &Path) -> PathBuf {
    let mut o = final_path.as_os_str().to_owned();
    o.push(".part");
    PathBuf::from(o)
}

/// Download `url` to `dest` once. The body is written to `dest.part` and
/// renamed over `dest` only after a 2xx response completed, so a failed or
/// interrupted transfer never leaves a truncated file at `dest`.
pub fn download_to_path(url: &str, dest: &Path, opts: &FetchOptions) -> Result<u64, FetchError> {
    let part = temp_path(dest);
    let result = fetch_into(url, &part, opts);
    match result {
        Ok(bytes) => {
            fs::rename(&part, dest).map_err(FetchError::Storage)?;
            Ok(bytes)
        }
        Err(e) => {
            let _ = fs::remove_file(&part);
            Err(e)
        }
    }
}

/// Like [`download_to_path`], retrying transient failures per `opts.retry`.
/// Blocking: the backoff sleeps the calling thread.
pub fn download_with_retry(url: &str, dest: &Path, opts: &FetchOptions) -> Result<u64, FetchError> {
    retry_download(url, &opts.retry, || download_to_path(url, dest, opts))
}

fn retry_download<F>(url: &str, policy: &RetryPolicy, mut attempt_once: F) -> Result<u64, FetchError>
where
    F: FnMut() -> Result<u64, FetchError>,
{
    let mut attempt = 1u32;
    loop {
        let err = match attempt_once() {
            Ok(bytes) => return Ok(bytes),
            Err(e) => e,
        };
        let kind = retry::classify(&err);
        let RetryDecision::RetryAfter(delay) = policy.decide(attempt, kind) else {
            tracing::debug!(url, attempt, ?kind, "giving up on asset: {}", err);
            return Err(err);
        };
        tracing::debug!(
            url,
            attempt,
            ?kind,
            delay_ms = delay.as_millis() as u64,
            "asset fetch failed, retrying: {}",
            err
        );
        std::thread::sleep(delay);
        attempt += 1;
    }
}

fn fetch_into(url: &str, part: &Path, opts: &FetchOptions) -> Result<u64, FetchError> {
    if let Some(parent) = part.parent() {
        fs::create_dir_all(parent).map_err(FetchError::Storage)?;
    }
    let mut file = fs::File::create(part).map_err(FetchError::Storage)?;
    let mut written: u64 = 0;
    let mut storage_error: Option<std::io::Error> = None;

    let mut easy = curl::easy::Easy::new();
    easy.url(url).map_err(FetchError::Curl)?;
    easy.follow_location(true).map_err(FetchError::Curl)?;
    easy.fail_on_error(false).map_err(FetchError::Curl)?;
    easy.connect_timeout(opts.connect_timeout).map_err(FetchError::Curl)?;
    // Abort transfers that stall below 1 KiB/s for 30s; hard cap from config.
    easy.low_speed_limit(1024).map_err(FetchError::Curl)?;
    easy.low_speed_time(std::time::Duration::from_secs(30))
        .map_err(FetchError::Curl)?;
    easy.timeout(opts.transfer_timeout).map_err(FetchError::Curl)?;

    {
        let mut transfer = easy.transfer();
        transfer
            .write_function(|data| match file.write_all(data) {
                Ok(()) => {
                    written += data.len() as u64;
                    Ok(data.len())
                }
                Err(e) => {
                    storage_error = Some(e);
                    Ok(0)
                }
            })
            .map_err(FetchError::Curl)?;
        if let Err(e) = transfer.perform() {
            drop(transfer);
            if e.is_write_error() {
                if let Some(io_err) = storage_error.take() {
                    return Err(FetchError::Storage(io_err));
                }
            }
            return Err(FetchError::Curl(e));
        }
    }

    let code = easy.response_code().map_err(FetchError::Curl)?;
    if !(200..300).contains(&code) {
        return Err(FetchError::Http(code));
    }
    file.sync_all().map_err(FetchError::Storage)?;
    Ok(written)
}
