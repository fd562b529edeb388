//! Shared HTTP plumbing for provider clients.
//!
//! Every call carries a deadline from the provider config. Non-streaming
//! calls bound the whole exchange. Streaming calls bound the time until
//! response headers arrive and then each silence between body reads, so a
//! long generation survives but a stalled one does not.

use bytes::Bytes;
use futures::{Stream, StreamExt};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use serde_json::Value;
use std::time::Duration;

use crate::error::{LlmError, classify_http_error};
use crate::observability::mask_sensitive_value;
use crate::types::ByteStream;

/// Build the shared HTTP client used by every provider instance.
pub fn build_http_client(connect_timeout: Duration) -> Result<reqwest::Client, LlmError> {
    reqwest::Client::builder()
        .connect_timeout(connect_timeout)
        .build()
        .map_err(|e| LlmError::ConfigurationError(format!("failed to build HTTP client: {e}")))
}

pub fn bearer_headers(api_key: &str) -> Result<HeaderMap, LlmError> {
    let mut headers = json_headers();
    headers.insert(AUTHORIZATION, header_value(&format!("Bearer {api_key}"))?);
    Ok(headers)
}

pub fn json_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers
}

pub fn insert_header(headers: &mut HeaderMap, name: &'static str, value: &str) -> Result<(), LlmError> {
    headers.insert(HeaderName::from_static(name), header_value(value)?);
    Ok(())
}

fn header_value(value: &str) -> Result<HeaderValue, LlmError> {
    let mut v = HeaderValue::from_str(value)
        .map_err(|_| LlmError::ConfigurationError("credential contains invalid header characters".to_string()))?;
    v.set_sensitive(true);
    Ok(v)
}

fn log_dispatch(provider_id: &str, method: &str, url: &str, headers: &HeaderMap) {
    let auth = headers
        .get(AUTHORIZATION)
        .or_else(|| headers.get("x-api-key"))
        .or_else(|| headers.get("x-goog-api-key"))
        .and_then(|v| v.to_str().ok())
        .map(mask_sensitive_value);
    tracing::debug!(provider = provider_id, method, url, auth = ?auth, "dispatching request");
}

async fn check_status(provider_id: &str, resp: reqwest::Response) -> Result<reqwest::Response, LlmError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let headers = resp.headers().clone();
    let body = resp.text().await.unwrap_or_default();
    let err = classify_http_error(provider_id, status.as_u16(), &body, &headers);
    tracing::warn!(provider = provider_id, status = status.as_u16(), error = %err, "upstream returned an error");
    Err(err)
}

/// POST a JSON body and parse a JSON response, all within `deadline`.
pub async fn post_json(
    http: &reqwest::Client,
    provider_id: &str,
    url: &str,
    headers: HeaderMap,
    body: &Value,
    deadline: Duration,
) -> Result<Value, LlmError> {
    log_dispatch(provider_id, "POST", url, &headers);
    let exchange = async {
        let resp = http.post(url).headers(headers).json(body).send().await?;
        let resp = check_status(provider_id, resp).await?;
        let text = resp.text().await?;
        serde_json::from_str::<Value>(&text)
            .map_err(|e| LlmError::ParseError(format!("failed to parse response JSON: {e}")))
    };
    tokio::time::timeout(deadline, exchange)
        .await
        .map_err(|_| LlmError::TimeoutError(format!("{provider_id} did not answer within {}ms", deadline.as_millis())))?
}

/// GET a JSON document within `deadline`.
pub async fn get_json(
    http: &reqwest::Client,
    provider_id: &str,
    url: &str,
    headers: HeaderMap,
    deadline: Duration,
) -> Result<Value, LlmError> {
    log_dispatch(provider_id, "GET", url, &headers);
    let exchange = async {
        let resp = http.get(url).headers(headers).send().await?;
        let resp = check_status(provider_id, resp).await?;
        Ok::<Value, LlmError>(resp.json::<Value>().await?)
    };
    tokio::time::timeout(deadline, exchange)
        .await
        .map_err(|_| LlmError::TimeoutError(format!("{provider_id} did not answer within {}ms", deadline.as_millis())))?
}

/// POST a streaming request and hand back the raw body as a byte stream.
///
/// `deadline` bounds the wait for response headers and then every gap
/// between body reads. A body that stays silent longer ends with
/// [`LlmError::TimeoutError`], which drops the connection.
pub async fn post_stream(
    http: &reqwest::Client,
    provider_id: &str,
    url: &str,
    headers: HeaderMap,
    body: &Value,
    deadline: Duration,
) -> Result<ByteStream, LlmError> {
    log_dispatch(provider_id, "POST", url, &headers);
    let open = async {
        let resp = http.post(url).headers(headers).json(body).send().await?;
        check_status(provider_id, resp).await
    };
    let resp = tokio::time::timeout(deadline, open)
        .await
        .map_err(|_| LlmError::TimeoutError(format!("{provider_id} did not start streaming within {}ms", deadline.as_millis())))??;
    Ok(idle_bounded(provider_id, resp.bytes_stream(), deadline))
}

fn idle_bounded<S>(provider_id: &str, body: S, idle: Duration) -> ByteStream
where
    S: Stream<Item = reqwest::Result<Bytes>> + Send + 'static,
{
    let provider_id = provider_id.to_string();
    Box::pin(async_stream::stream! {
        let mut body = Box::pin(body);
        loop {
            match tokio::time::timeout(idle, body.next()).await {
                Ok(Some(read)) => yield read.map_err(LlmError::from),
                Ok(None) => break,
                Err(_) => {
                    tracing::warn!(provider = %provider_id, idle = ?idle, "stream stalled, closing connection");
                    yield Err(LlmError::TimeoutError(format!(
                        "{provider_id} sent nothing for {}ms mid-stream",
                        idle.as_millis()
                    )));
                    break;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn silent_body_ends_with_timeout() {
        let body = futures::stream::iter(vec![Ok(Bytes::from_static(b"data: {}\n\n"))])
            .chain(futures::stream::pending());
        let out: Vec<_> = idle_bounded("openai", body, Duration::from_millis(300)).collect().await;
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].as_ref().unwrap().as_ref(), b"data: {}\n\n");
        assert!(matches!(&out[1], Err(LlmError::TimeoutError(m)) if m.contains("300ms")));
    }

    #[tokio::test(start_paused = true)]
    async fn steady_body_is_not_cut_off() {
        let reads = futures::stream::unfold(0u32, |n| async move {
            if n == 5 {
                return None;
            }
            tokio::time::sleep(Duration::from_millis(200)).await;
            Some((Ok(Bytes::from_static(b"x")), n + 1))
        });
        let out: Vec<_> = idle_bounded("openai", reads, Duration::from_millis(300)).collect().await;
        assert_eq!(out.len(), 5);
        assert!(out.iter().all(Result::is_ok));
    }
}
