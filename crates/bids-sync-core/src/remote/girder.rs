use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::{Certificate, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::fs::{self, File};
use std::io::Read;
use std::path::Path;
use tracing::{debug, info, trace, warn};

use super::{EntityRef, RemoteFile, RemoteFolder, RemoteItem, RemoteStore};
use crate::config::ConnectionSettings;
use crate::error::{Error, Result};

const TOKEN_HEADER: &str = "Girder-Token";
const PAGE_SIZE: usize = 500;
const USER_AGENT: &str = concat!("bids-sync/", env!("CARGO_PKG_VERSION"));

/// Blocking client for the Girder REST API (v1).
pub struct GirderClient {
    client: Client,
    api_url: Url,
    token: String,
    chunk_size: usize,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(rename = "authToken")]
    auth_token: AuthToken,
}

#[derive(Debug, Deserialize)]
struct AuthToken {
    token: String,
}

impl GirderClient {
    /// Check the server answers, then trade the API key for a session token.
    pub fn connect(settings: &ConnectionSettings) -> Result<Self> {
        let api_url = normalize_api_url(&settings.api_url)?;
        let client = build_http_client(settings)?;

        check_connection(&client, &api_url)?;

        let mut token_url = join(&api_url, "api_key/token")?;
        token_url
            .query_pairs_mut()
            .append_pair("key", &settings.api_key);
        let response = client.post(token_url).send()?;
        let token: TokenResponse = check_status(response)
            .map_err(|e| Error::Connection(format!("Failed to authenticate: {}", e)))?
            .json()?;
        debug!("Authenticated against {}", api_url);

        Ok(Self {
            client,
            api_url,
            token: token.auth_token.token,
            chunk_size: settings.chunk_size.max(1),
        })
    }

    fn url(&self, path: &str, params: &[(&str, &str)]) -> Result<Url> {
        let mut url = join(&self.api_url, path)?;
        if !params.is_empty() {
            url.query_pairs_mut().extend_pairs(params);
        }
        Ok(url)
    }

    fn send(&self, request: RequestBuilder) -> Result<Response> {
        let response = request.header(TOKEN_HEADER, &self.token).send()?;
        check_status(response)
    }

    fn get_json<T: DeserializeOwned>(&self, path: &str, params: &[(&str, &str)]) -> Result<T> {
        let url = self.url(path, params)?;
        trace!("GET {}", url);
        Ok(self.send(self.client.get(url))?.json()?)
    }

    fn post_json<T: DeserializeOwned>(&self, path: &str, params: &[(&str, &str)]) -> Result<T> {
        let url = self.url(path, params)?;
        trace!("POST {}", url);
        Ok(self.send(self.client.post(url))?.json()?)
    }

    /// Follow `limit`/`offset` pagination until a short page comes back.
    fn get_paged<T: DeserializeOwned>(&self, path: &str, params: &[(&str, &str)]) -> Result<Vec<T>> {
        let mut results = Vec::new();
        let mut offset = 0usize;
        let limit = PAGE_SIZE.to_string();

        loop {
            let offset_param = offset.to_string();
            let mut page_params = params.to_vec();
            page_params.push(("limit", limit.as_str()));
            page_params.push(("offset", offset_param.as_str()));

            let page: Vec<T> = self.get_json(path, &page_params)?;
            let received = page.len();
            results.extend(page);
            if received < PAGE_SIZE {
                break;
            }
            offset += received;
        }

        Ok(results)
    }
}

impl RemoteStore for GirderClient {
    fn get_folder(&self, id: &str) -> Result<RemoteFolder> {
        self.get_json(&format!("folder/{}", id), &[])
    }

    fn list_folders(&self, parent: &str, name: Option<&str>) -> Result<Vec<RemoteFolder>> {
        let mut params = vec![
            ("parentType", "folder"),
            ("parentId", parent),
            ("sort", "lowerName"),
            ("sortdir", "1"),
        ];
        if let Some(name) = name {
            params.push(("name", name));
        }
        self.get_paged("folder", &params)
    }

    fn create_folder(&self, parent: &str, name: &str, reuse_existing: bool) -> Result<RemoteFolder> {
        self.post_json(
            "folder",
            &[
                ("parentType", "folder"),
                ("parentId", parent),
                ("name", name),
                ("reuseExisting", bool_param(reuse_existing)),
            ],
        )
    }

    fn list_items(&self, folder: &str) -> Result<Vec<RemoteItem>> {
        self.get_paged(
            "item",
            &[("folderId", folder), ("sort", "lowerName"), ("sortdir", "1")],
        )
    }

    fn create_item(&self, folder: &str, name: &str, reuse_existing: bool) -> Result<RemoteItem> {
        self.post_json(
            "item",
            &[
                ("folderId", folder),
                ("name", name),
                ("reuseExisting", bool_param(reuse_existing)),
            ],
        )
    }

    fn list_files(&self, item: &str) -> Result<Vec<RemoteFile>> {
        self.get_paged(&format!("item/{}/files", item), &[])
    }

    fn download_file(&self, id: &str) -> Result<Vec<u8>> {
        let url = self.url(&format!("file/{}/download", id), &[])?;
        trace!("GET {}", url);
        Ok(self.send(self.client.get(url))?.bytes()?.to_vec())
    }

    /// Chunked upload: `POST /file` opens the upload, `POST /file/chunk` sends each chunk.
    fn upload_file(&self, item: &str, local_path: &Path, name: &str) -> Result<RemoteFile> {
        let size = fs::metadata(local_path)?.len();
        let size_param = size.to_string();
        let upload: Value = self.post_json(
            "file",
            &[
                ("parentType", "item"),
                ("parentId", item),
                ("name", name),
                ("size", size_param.as_str()),
            ],
        )?;

        // Zero-byte uploads are finalized immediately and return the file document.
        if size == 0 {
            return Ok(serde_json::from_value(upload)?);
        }

        let upload_id = upload
            .get("_id")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::Remote {
                status: 200,
                message: format!("Upload for '{}' returned no id", name),
            })?
            .to_string();

        let mut file = File::open(local_path)?;
        let mut offset = 0u64;
        let mut last_response = Value::Null;

        while offset < size {
            let mut chunk = Vec::with_capacity(self.chunk_size.min((size - offset) as usize));
            (&mut file)
                .take(self.chunk_size as u64)
                .read_to_end(&mut chunk)?;
            if chunk.is_empty() {
                return Err(Error::Io(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    format!("{} shrank during upload", local_path.display()),
                )));
            }

            let offset_param = offset.to_string();
            let url = self.url(
                "file/chunk",
                &[("uploadId", upload_id.as_str()), ("offset", offset_param.as_str())],
            )?;
            trace!("POST {} ({} bytes)", url, chunk.len());
            offset += chunk.len() as u64;
            last_response = self
                .send(
                    self.client
                        .post(url)
                        .header("Content-Type", "application/octet-stream")
                        .body(chunk),
                )?
                .json()?;
        }

        Ok(serde_json::from_value(last_response)?)
    }

    fn delete_file(&self, id: &str) -> Result<()> {
        let url = self.url(&format!("file/{}", id), &[])?;
        self.send(self.client.delete(url))?;
        Ok(())
    }

    fn add_metadata(&self, entity: &EntityRef, metadata: &Map<String, Value>) -> Result<()> {
        let url = self.url(&format!("{}/{}/metadata", entity.kind, entity.id), &[])?;
        trace!("PUT {}", url);
        self.send(self.client.put(url).json(metadata))?;
        Ok(())
    }

    fn delete(&self, entity: &EntityRef) -> Result<()> {
        let url = self.url(&format!("{}/{}", entity.kind, entity.id), &[])?;
        trace!("DELETE {}", url);
        self.send(self.client.delete(url))?;
        Ok(())
    }
}

fn bool_param(value: bool) -> &'static str {
    if value {
        "true"
    } else {
        "false"
    }
}

fn build_http_client(settings: &ConnectionSettings) -> Result<Client> {
    let mut builder = Client::builder().user_agent(USER_AGENT);

    if !settings.verify_ssl {
        warn!("SSL certificate verification is disabled");
        builder = builder.danger_accept_invalid_certs(true);
    }

    if let Some(ca_cert) = &settings.ca_cert {
        let pem = fs::read(ca_cert)?;
        builder = builder.add_root_certificate(Certificate::from_pem(&pem)?);
        debug!("Using CA certificate {}", ca_cert.display());
    }

    Ok(builder.build()?)
}

/// The server root must answer `200 OK` before any API call is attempted.
fn check_connection(client: &Client, api_url: &Url) -> Result<()> {
    let base = base_url(api_url);
    let response = client
        .get(base.clone())
        .send()
        .map_err(|e| Error::Connection(format!("{}: {}", base, e)))?;

    if response.status() != StatusCode::OK {
        return Err(Error::Connection(format!(
            "{} answered with status {}",
            base,
            response.status()
        )));
    }

    info!("Girder connection successful.");
    Ok(())
}

fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().unwrap_or_default();
    let message = serde_json::from_str::<Value>(&body)
        .ok()
        .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
        .unwrap_or(body);
    Err(classify_failure(status.as_u16(), message))
}

/// Girder reports a missing entity as `400 Invalid <kind> id (...)` as well as 404.
pub(crate) fn classify_failure(status: u16, message: String) -> Error {
    let invalid_id = status == 400 && message.starts_with("Invalid ") && message.contains(" id");
    if status == 404 || invalid_id {
        Error::NotFound(message)
    } else {
        Error::Remote { status, message }
    }
}

/// Parse an API URL, defaulting to `http://` and ensuring a trailing slash
/// so relative endpoint paths join below it.
pub fn normalize_api_url(raw: &str) -> Result<Url> {
    let trimmed = raw.trim();
    let with_scheme = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("http://{}", trimmed)
    };

    let mut url = Url::parse(&with_scheme)
        .map_err(|e| Error::Connection(format!("Invalid API URL '{}': {}", raw, e)))?;
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

/// `scheme://host[:port]/` of an API URL.
pub fn base_url(api_url: &Url) -> Url {
    let mut base = api_url.clone();
    base.set_path("/");
    base.set_query(None);
    base.set_fragment(None);
    base
}

fn join(api_url: &Url, path: &str) -> Result<Url> {
    api_url
        .join(path)
        .map_err(|e| Error::Connection(format!("Invalid endpoint '{}': {}", path, e)))
}
