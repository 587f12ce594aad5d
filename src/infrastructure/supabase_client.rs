use crate::domain::models::{EntryId, EntryRow, EntryUpdate, NewEntry};
use crate::infrastructure::config::RemoteConfig;
use crate::infrastructure::entry_store::EntryStore;
use crate::infrastructure::error::InfraError;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use url::Url;

const ENTRIES_TABLE: &str = "time_entries";

/// PostgREST access to the `time_entries` table, authorized as one signed-in
/// user.
#[derive(Debug, Clone)]
pub struct SupabaseEntryStore {
    client: Client,
    endpoint: Url,
    anon_key: String,
    access_token: String,
}

#[derive(Debug, serde::Serialize)]
struct InsertEntryRequest<'a> {
    user_id: &'a str,
    day: &'a str,
    check_in: &'a str,
    check_out: &'a str,
    total_minutes: i64,
}

#[derive(Debug, serde::Deserialize)]
struct ReturnedRow {
    id: EntryId,
}

impl SupabaseEntryStore {
    pub fn new(config: &RemoteConfig, access_token: impl Into<String>) -> Result<Self, InfraError> {
        Ok(Self {
            client: Client::new(),
            endpoint: Self::table_endpoint(&config.url, ENTRIES_TABLE)?,
            anon_key: config.anon_key.clone(),
            access_token: access_token.into(),
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    fn table_endpoint(base_url: &str, table: &str) -> Result<Url, InfraError> {
        let mut url = Url::parse(base_url)
            .map_err(|error| InfraError::InvalidConfig(format!("invalid remote url: {error}")))?;
        {
            let mut segments = url.path_segments_mut().map_err(|_| {
                InfraError::InvalidConfig("remote url cannot be a base".to_string())
            })?;
            segments.pop_if_empty();
            segments.push("rest");
            segments.push("v1");
            segments.push(table);
        }
        Ok(url)
    }

    fn ensure_non_empty(value: &str, field: &str) -> Result<(), InfraError> {
        if value.trim().is_empty() {
            return Err(InfraError::Store(format!("{field} must not be empty")));
        }
        Ok(())
    }

    fn store_http_error(status: StatusCode, body: &str) -> InfraError {
        let message = if body.trim().is_empty() {
            format!("entry store error: http {}", status.as_u16())
        } else {
            format!("entry store error: http {}; body={body}", status.as_u16())
        };
        InfraError::Store(message)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("apikey", &self.anon_key)
            .bearer_auth(&self.access_token)
    }

    async fn send(&self, request: RequestBuilder, action: &str) -> Result<String, InfraError> {
        let response = self
            .authorized(request)
            .send()
            .await
            .map_err(|error| InfraError::Store(format!("network error while {action}: {error}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|error| InfraError::Store(format!("failed reading response while {action}: {error}")))?;

        if !status.is_success() {
            return Err(Self::store_http_error(status, &body));
        }
        Ok(body)
    }

    fn parse_returned_rows(body: &str, action: &str) -> Result<Vec<ReturnedRow>, InfraError> {
        serde_json::from_str(body).map_err(|error| {
            InfraError::Store(format!("invalid {action} payload: {error}; body={body}"))
        })
    }

    fn parse_inserted_id(body: &str) -> Result<EntryId, InfraError> {
        Self::parse_returned_rows(body, "insert")?
            .into_iter()
            .next()
            .map(|row| row.id)
            .filter(|id| !id.as_str().trim().is_empty())
            .ok_or_else(|| InfraError::Store("insert response did not include id".to_string()))
    }

    /// PostgREST answers a PATCH that matched nothing with success, so the
    /// returned representation is the only proof the row still exists.
    fn ensure_updated(body: &str, id: &EntryId) -> Result<(), InfraError> {
        let rows = if body.trim().is_empty() {
            Vec::new()
        } else {
            Self::parse_returned_rows(body, "update")?
        };
        if rows.iter().any(|row| &row.id == id) {
            Ok(())
        } else {
            Err(InfraError::Store(format!("no entry with id {id}")))
        }
    }
}

#[async_trait]
impl EntryStore for SupabaseEntryStore {
    async fn fetch_entries(&self, user_id: &str) -> Result<Vec<EntryRow>, InfraError> {
        Self::ensure_non_empty(user_id, "user id")?;

        let request = self
            .client
            .get(self.endpoint.clone())
            .query(&[("user_id", format!("eq.{user_id}")), ("select", "*".to_string())]);
        let body = self.send(request, "fetching entries").await?;

        serde_json::from_str(&body).map_err(|error| {
            InfraError::Store(format!("invalid entries payload: {error}; body={body}"))
        })
    }

    async fn insert_entry(&self, user_id: &str, entry: &NewEntry) -> Result<EntryId, InfraError> {
        Self::ensure_non_empty(user_id, "user id")?;

        let payload = [InsertEntryRequest {
            user_id,
            day: entry.day.as_str(),
            check_in: &entry.check_in,
            check_out: &entry.check_out,
            total_minutes: entry.total_minutes,
        }];
        let request = self
            .client
            .post(self.endpoint.clone())
            .header("Prefer", "return=representation")
            .json(&payload);
        let body = self.send(request, "inserting entry").await?;
        Self::parse_inserted_id(&body)
    }

    async fn update_entry(&self, id: &EntryId, update: &EntryUpdate) -> Result<(), InfraError> {
        Self::ensure_non_empty(id.as_str(), "entry id")?;

        let request = self
            .client
            .patch(self.endpoint.clone())
            .query(&[("id", format!("eq.{id}"))])
            .header("Prefer", "return=representation")
            .json(update);
        let body = self.send(request, "updating entry").await?;
        Self::ensure_updated(&body, id)
    }

    async fn delete_entries(&self, user_id: &str) -> Result<(), InfraError> {
        Self::ensure_non_empty(user_id, "user id")?;

        let request = self
            .client
            .delete(self.endpoint.clone())
            .query(&[("user_id", format!("eq.{user_id}"))]);
        self.send(request, "deleting entries").await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn remote_config(url: &str) -> RemoteConfig {
        RemoteConfig {
            url: url.to_string(),
            anon_key: "anon".to_string(),
        }
    }

    #[test]
    fn table_endpoint_is_built_under_rest_v1() {
        let store = SupabaseEntryStore::new(&remote_config("https://project.supabase.co"), "token")
            .expect("store");
        assert_eq!(
            store.endpoint().as_str(),
            "https://project.supabase.co/rest/v1/time_entries"
        );

        let trailing = SupabaseEntryStore::new(&remote_config("https://project.supabase.co/"), "token")
            .expect("store");
        assert_eq!(
            trailing.endpoint().as_str(),
            "https://project.supabase.co/rest/v1/time_entries"
        );
    }

    #[test]
    fn invalid_remote_url_is_a_config_error() {
        let result = SupabaseEntryStore::new(&remote_config("not a url"), "token");
        assert!(matches!(result, Err(InfraError::InvalidConfig(_))));
    }

    #[test]
    fn inserted_id_is_read_from_representation() {
        let numeric = SupabaseEntryStore::parse_inserted_id(r#"[{"id": 12, "day": "Monday"}]"#)
            .expect("numeric id");
        assert_eq!(numeric, EntryId::new("12"));

        let empty = SupabaseEntryStore::parse_inserted_id("[]");
        assert!(matches!(empty, Err(InfraError::Store(_))));
    }

    #[test]
    fn update_must_return_the_patched_row() {
        let id = EntryId::new("7");
        SupabaseEntryStore::ensure_updated(r#"[{"id": 7, "day": "Monday"}]"#, &id)
            .expect("row returned");

        for body in ["", "[]", r#"[{"id": 8}]"#] {
            let result = SupabaseEntryStore::ensure_updated(body, &id);
            assert!(matches!(result, Err(InfraError::Store(message)) if message.contains("no entry")));
        }
    }

    /// Serves exactly one canned HTTP response and returns the raw request.
    fn serve_once(response: &'static str) -> (String, std::thread::JoinHandle<String>) {
        use std::io::{Read, Write};

        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind listener");
        let url = format!("http://{}", listener.local_addr().expect("local addr"));
        let handle = std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().expect("accept");
            let mut request = Vec::new();
            let mut buffer = [0u8; 4096];
            loop {
                let read = stream.read(&mut buffer).expect("read request");
                if read == 0 {
                    break;
                }
                request.extend_from_slice(&buffer[..read]);
                let text = String::from_utf8_lossy(&request);
                if let Some(header_end) = text.find("\r\n\r\n") {
                    let content_length = text[..header_end]
                        .lines()
                        .find_map(|line| {
                            let (name, value) = line.split_once(':')?;
                            if !name.eq_ignore_ascii_case("content-length") {
                                return None;
                            }
                            value.trim().parse::<usize>().ok()
                        })
                        .unwrap_or(0);
                    if request.len() >= header_end + 4 + content_length {
                        break;
                    }
                }
            }
            stream.write_all(response.as_bytes()).expect("write response");
            String::from_utf8_lossy(&request).into_owned()
        });
        (url, handle)
    }

    fn sample_update() -> EntryUpdate {
        EntryUpdate {
            check_in: "11:15".to_string(),
            check_out: "20:30".to_string(),
            total_minutes: 0,
        }
    }

    #[tokio::test]
    async fn update_of_vanished_row_is_an_error() {
        let (url, server) = serve_once("HTTP/1.1 204 No Content\r\nConnection: close\r\n\r\n");
        let store = SupabaseEntryStore::new(&remote_config(&url), "token").expect("store");

        let result = store
            .update_entry(&EntryId::new("deleted-row"), &sample_update())
            .await;
        assert!(matches!(result, Err(InfraError::Store(message)) if message.contains("deleted-row")));

        let request = server.join().expect("server thread");
        assert!(request.starts_with("PATCH /rest/v1/time_entries?id=eq.deleted-row"));
        assert!(request.to_ascii_lowercase().contains("prefer: return=representation"));
    }

    #[tokio::test]
    async fn update_succeeds_when_row_is_returned() {
        let (url, server) = serve_once(
            "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: 25\r\nConnection: close\r\n\r\n[{\"id\":5,\"day\":\"Monday\"}]",
        );
        let store = SupabaseEntryStore::new(&remote_config(&url), "token").expect("store");

        store
            .update_entry(&EntryId::new("5"), &sample_update())
            .await
            .expect("update acknowledged");
        server.join().expect("server thread");
    }

    #[tokio::test]
    async fn empty_user_id_is_rejected_before_any_request() {
        let store = SupabaseEntryStore::new(&remote_config("http://127.0.0.1:9"), "token")
            .expect("store");
        let result = store.fetch_entries("  ").await;
        assert!(matches!(result, Err(InfraError::Store(message)) if message.contains("user id")));
    }
}
