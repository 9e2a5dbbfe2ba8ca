//! Thin PostgREST client: one place where HTTP failures become `StoreError`.

use std::time::Duration;

use reqwest::{header, RequestBuilder, Response, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use tracing::debug;

use tsb_core::store::{StoreError, StoreResult};

pub(crate) type Query<'a> = [(&'a str, String)];

#[derive(Clone)]
pub(crate) struct Rest {
    http: reqwest::Client,
    base: String,
}

impl Rest {
    pub(crate) fn new(url: &str, api_key: &str, timeout: Duration) -> StoreResult<Self> {
        let mut headers = header::HeaderMap::new();
        let key = header::HeaderValue::from_str(api_key.trim())
            .map_err(|e| StoreError::Unavailable(format!("invalid api key header: {e}")))?;
        let bearer = header::HeaderValue::from_str(&format!("Bearer {}", api_key.trim()))
            .map_err(|e| StoreError::Unavailable(format!("invalid authorization header: {e}")))?;
        headers.insert("apikey", key);
        headers.insert(header::AUTHORIZATION, bearer);

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| StoreError::Unavailable(format!("http client build error: {e}")))?;
        Ok(Self {
            http,
            base: format!("{}/rest/v1", url.trim_end_matches('/')),
        })
    }

    fn url(&self, table: &str) -> String {
        format!("{}/{table}", self.base)
    }

    pub(crate) async fn select<T: DeserializeOwned>(
        &self,
        table: &str,
        query: &Query<'_>,
    ) -> StoreResult<Vec<T>> {
        let resp = send(table, self.http.get(self.url(table)).query(query)).await?;
        resp.json()
            .await
            .map_err(|e| StoreError::Decode(format!("{table}: {e}")))
    }

    /// Plain insert, or an upsert when `on_conflict` names the key column.
    pub(crate) async fn insert<B: Serialize + ?Sized>(
        &self,
        table: &str,
        body: &B,
        on_conflict: Option<&str>,
    ) -> StoreResult<()> {
        let mut req = self.http.post(self.url(table)).json(body);
        req = match on_conflict {
            Some(column) => req
                .query(&[("on_conflict", column)])
                .header("Prefer", "return=minimal,resolution=merge-duplicates"),
            None => req.header("Prefer", "return=minimal"),
        };
        send(table, req).await.map(|_| ())
    }

    /// Insert that leaves an existing row with the same key untouched.
    pub(crate) async fn insert_ignoring_duplicates<B: Serialize + ?Sized>(
        &self,
        table: &str,
        body: &B,
        on_conflict: &str,
    ) -> StoreResult<()> {
        let req = self
            .http
            .post(self.url(table))
            .query(&[("on_conflict", on_conflict)])
            .header("Prefer", "return=minimal,resolution=ignore-duplicates")
            .json(body);
        send(table, req).await.map(|_| ())
    }

    pub(crate) async fn update<B: Serialize + ?Sized>(
        &self,
        table: &str,
        query: &Query<'_>,
        body: &B,
    ) -> StoreResult<()> {
        let req = self
            .http
            .patch(self.url(table))
            .query(query)
            .header("Prefer", "return=minimal")
            .json(body);
        send(table, req).await.map(|_| ())
    }

    pub(crate) async fn delete(&self, table: &str, query: &Query<'_>) -> StoreResult<()> {
        send(table, self.http.delete(self.url(table)).query(query))
            .await
            .map(|_| ())
    }

    /// Exact row count for a filter, read from `Content-Range`.
    pub(crate) async fn count(&self, table: &str, query: &Query<'_>) -> StoreResult<u64> {
        let req = self
            .http
            .get(self.url(table))
            .query(query)
            .query(&[("select", "id"), ("limit", "1")])
            .header("Prefer", "count=exact");
        let resp = send(table, req).await?;
        let range = resp
            .headers()
            .get(header::CONTENT_RANGE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        parse_content_range_total(range)
            .ok_or_else(|| StoreError::Decode(format!("{table}: bad content-range {range:?}")))
    }
}

async fn send(table: &str, req: RequestBuilder) -> StoreResult<Response> {
    let resp = req
        .send()
        .await
        .map_err(|e| StoreError::Unavailable(format!("{table}: {e}")))?;
    let status = resp.status();
    debug!(table, status = status.as_u16(), "store request");
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    let body: String = body.chars().take(200).collect();
    Err(if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        StoreError::Unavailable(format!("{table}: {status} {body}"))
    } else {
        StoreError::Rejected {
            status: status.as_u16(),
            body,
        }
    })
}

/// `0-0/42` → 42, `*/0` → 0.
pub(crate) fn parse_content_range_total(range: &str) -> Option<u64> {
    range.rsplit_once('/')?.1.trim().parse().ok()
}

/// `eq.` filter value.
pub(crate) fn eq(value: impl std::fmt::Display) -> String {
    format!("eq.{value}")
}

/// `in.(...)` filter; values are double-quoted so commas and parentheses
/// inside them survive.
pub(crate) fn in_list<'a>(values: impl IntoIterator<Item = &'a str>) -> String {
    let quoted: Vec<String> = values
        .into_iter()
        .map(|v| format!("\"{}\"", v.replace('\\', "\\\\").replace('"', "\\\"")))
        .collect();
    format!("in.({})", quoted.join(","))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_range_totals() {
        assert_eq!(parse_content_range_total("0-0/42"), Some(42));
        assert_eq!(parse_content_range_total("*/0"), Some(0));
        assert_eq!(parse_content_range_total("0-24/*"), None);
        assert_eq!(parse_content_range_total(""), None);
    }

    #[test]
    fn in_list_quotes_values() {
        assert_eq!(in_list(["alice", "@alice"]), r#"in.("alice","@alice")"#);
        assert_eq!(in_list(["a,b", "say \"hi\""]), r#"in.("a,b","say \"hi\"")"#);
    }

    #[test]
    fn base_url_drops_trailing_slash() {
        let rest = Rest::new("https://x.supabase.co/", "key", Duration::from_secs(1)).unwrap();
        assert_eq!(rest.url("chat_groups"), "https://x.supabase.co/rest/v1/chat_groups");
    }
}
