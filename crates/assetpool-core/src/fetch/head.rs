//! Blocking "does this URL work" check.

use std::time::Duration;

/// Statuses some servers return for HEAD even when GET would succeed.
const HEAD_REJECTED: &[u32] = &[405, 501];

fn configure(easy: &mut curl::easy::Easy, url: &str, connect_timeout: Duration) -> Result<(), curl::Error> {
    easy.url(url)?;
    easy.follow_location(true)?;
    easy.connect_timeout(connect_timeout)?;
    easy.timeout(connect_timeout.saturating_mul(2))?;
    Ok(())
}

fn head_status(url: &str, connect_timeout: Duration) -> Result<u32, curl::Error> {
    let mut easy = curl::easy::Easy::new();
    configure(&mut easy, url, connect_timeout)?;
    easy.nobody(true)?;
    easy.perform()?;
    easy.response_code()
}

/// One-byte ranged GET for servers that refuse HEAD. The body is discarded.
fn range_get_status(url: &str, connect_timeout: Duration) -> Result<u32, curl::Error> {
    let mut easy = curl::easy::Easy::new();
    configure(&mut easy, url, connect_timeout)?;
    easy.range("0-0")?;
    {
        let mut transfer = easy.transfer();
        transfer.write_function(|data| Ok(data.len()))?;
        transfer.perform()?;
    }
    easy.response_code()
}

/// True if `url` answers with a 2xx status (following redirects).
///
/// Runs in the current thread; call from `spawn_blocking` in async code.
pub fn url_works(url: &str, connect_timeout: Duration) -> Result<bool, curl::Error> {
    let mut code = head_status(url, connect_timeout)?;
    if HEAD_REJECTED.contains(&code) {
        tracing::debug!(url, code, "HEAD rejected, retrying with ranged GET");
        code = range_get_status(url, connect_timeout)?;
    }
    Ok((200..300).contains(&code))
}
