//! Catalog publishing
//!
//! Finished product shots are attached to the matching record of an Odoo catalog
//! through its JSON-RPC endpoint. Credentials come from an operator-maintained secret
//! file; without one, publishing stays off.

use crate::error::{PhotoPrepError, Result};
use crate::services::ImageIOService;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use image::DynamicImage;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Longest identifier (exclusive) that may be published
const MAX_IDENTIFIER_LEN: usize = 10;

/// Whether `identifier` may be sent to the catalog: non-empty, ASCII digits only, under 10 chars
#[must_use]
pub fn is_publishable_identifier(identifier: &str) -> bool {
    !identifier.is_empty()
        && identifier.len() < MAX_IDENTIFIER_LEN
        && identifier.bytes().all(|b| b.is_ascii_digit())
}

/// Connection settings for the catalog
#[derive(Clone, PartialEq, Eq)]
pub struct CatalogConfig {
    pub url: String,
    pub database: String,
    pub username: String,
    pub password: String,
    /// Model holding product records, searched by `default_code`
    pub product_model: String,
    /// Model holding image records linked through `product_id`
    pub image_model: String,
}

impl fmt::Debug for CatalogConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CatalogConfig")
            .field("url", &self.url)
            .field("database", &self.database)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("product_model", &self.product_model)
            .field("image_model", &self.image_model)
            .finish()
    }
}

/// On-disk layout of the secret file
#[derive(Debug, Default, Serialize, Deserialize)]
struct SecretFile {
    #[serde(default)]
    odoo_url: String,
    #[serde(default)]
    odoo_db: String,
    #[serde(default)]
    odoo_username: String,
    #[serde(default)]
    odoo_password: String,
}

impl CatalogConfig {
    pub const DEFAULT_PRODUCT_MODEL: &'static str = "product.import";
    pub const DEFAULT_IMAGE_MODEL: &'static str = "product.import.image";

    pub fn new(
        url: impl Into<String>,
        database: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            database: database.into(),
            username: username.into(),
            password: password.into(),
            product_model: Self::DEFAULT_PRODUCT_MODEL.to_string(),
            image_model: Self::DEFAULT_IMAGE_MODEL.to_string(),
        }
    }

    /// `~/.shiny/secret.json`
    #[must_use]
    pub fn default_secret_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".shiny").join("secret.json"))
    }

    /// Read catalog credentials from `path`
    ///
    /// A missing file is not an error: an empty template is written for the operator
    /// to fill in and `None` is returned. A file without a database name also yields
    /// `None`. Unparseable JSON is an input error.
    pub fn load_or_create_template(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            log::error!(
                "Secret file not found at {}. Creating template file",
                path.display()
            );
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).map_err(|e| {
                    PhotoPrepError::file_io_error("create secret directory", parent, &e)
                })?;
            }
            let template = serde_json::to_string_pretty(&SecretFile::default())
                .map_err(|e| PhotoPrepError::internal(format!("Failed to render template: {e}")))?;
            fs::write(path, template)
                .map_err(|e| PhotoPrepError::file_io_error("write secret template", path, &e))?;
            return Ok(None);
        }

        let contents = fs::read_to_string(path)
            .map_err(|e| PhotoPrepError::file_io_error("read secret file", path, &e))?;
        let secrets: SecretFile = serde_json::from_str(&contents).map_err(|e| {
            PhotoPrepError::invalid_input(format!(
                "Secret file {} is not valid JSON: {e}",
                path.display()
            ))
        })?;

        if secrets.odoo_db.is_empty() {
            log::info!("No catalog database configured in {}; publishing disabled", path.display());
            return Ok(None);
        }

        Ok(Some(Self::new(
            secrets.odoo_url,
            secrets.odoo_db,
            secrets.odoo_username,
            secrets.odoo_password,
        )))
    }
}

/// Attaches a product image to a catalog record
pub trait CatalogPublisher: Send + Sync {
    /// Attach `image` to the record whose external code is `identifier`
    ///
    /// Returns the id of the new image record. No record is `NotFound`; transport
    /// and RPC failures are `Catalog` errors.
    fn publish(&self, identifier: &str, image: &DynamicImage) -> Result<i64>;
}

#[derive(Debug, Deserialize)]
struct RpcErrorData {
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    #[serde(default)]
    message: String,
    #[serde(default)]
    data: Option<RpcErrorData>,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcError>,
}

/// Odoo JSON-RPC publisher
#[derive(Debug)]
pub struct OdooPublisher {
    client: Client,
    config: CatalogConfig,
    next_id: AtomicU64,
}

impl OdooPublisher {
    pub fn new(config: CatalogConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| PhotoPrepError::provisioning(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            config,
            next_id: AtomicU64::new(1),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/jsonrpc", self.config.url.trim_end_matches('/'))
    }

    fn call(&self, service: &str, method: &str, args: Value) -> Result<Value> {
        let body = json!({
            "jsonrpc": "2.0",
            "method": "call",
            "params": { "service": service, "method": method, "args": args },
            "id": self.next_id.fetch_add(1, Ordering::Relaxed),
        });

        let response: RpcResponse = self
            .client
            .post(self.endpoint())
            .json(&body)
            .send()
            .and_then(reqwest::blocking::Response::error_for_status)
            .and_then(reqwest::blocking::Response::json)
            .map_err(|e| PhotoPrepError::catalog(format!("{service}.{method} request failed: {e}")))?;

        if let Some(error) = response.error {
            let detail = error.data.map(|d| d.message).unwrap_or_default();
            return Err(PhotoPrepError::catalog(format!(
                "{service}.{method} failed: {} {detail}",
                error.message
            )));
        }
        response
            .result
            .ok_or_else(|| PhotoPrepError::catalog(format!("{service}.{method} returned no result")))
    }

    fn authenticate(&self) -> Result<i64> {
        let result = self.call(
            "common",
            "authenticate",
            json!([
                self.config.database,
                self.config.username,
                self.config.password,
                {}
            ]),
        )?;
        result.as_i64().ok_or_else(|| {
            PhotoPrepError::catalog(format!(
                "Authentication rejected for user '{}'",
                self.config.username
            ))
        })
    }

    fn execute_kw(&self, uid: i64, model: &str, method: &str, args: Value) -> Result<Value> {
        self.call(
            "object",
            "execute_kw",
            json!([
                self.config.database,
                uid,
                self.config.password,
                model,
                method,
                args
            ]),
        )
    }
}

impl CatalogPublisher for OdooPublisher {
    fn publish(&self, identifier: &str, image: &DynamicImage) -> Result<i64> {
        let uid = self.authenticate()?;

        let found = self.execute_kw(
            uid,
            &self.config.product_model,
            "search",
            json!([[["default_code", "=", identifier]]]),
        )?;
        // Several matches are not expected; the first one wins
        let product_id = found
            .as_array()
            .and_then(|ids| ids.first())
            .and_then(Value::as_i64)
            .ok_or_else(|| {
                PhotoPrepError::not_found(format!("No product found with SKU: {identifier}"))
            })?;

        let image_data = BASE64.encode(ImageIOService::encode_jpeg(image)?);
        let created = self.execute_kw(
            uid,
            &self.config.image_model,
            "create",
            json!([{ "image_data": image_data, "product_id": product_id }]),
        )?;

        let record_id = created
            .as_i64()
            .or_else(|| created.as_array().and_then(|ids| ids.first()).and_then(Value::as_i64))
            .ok_or_else(|| {
                PhotoPrepError::catalog(format!("Unexpected create result: {created}"))
            })?;

        log::info!("Attached image record {record_id} to product {product_id} (SKU {identifier})");
        Ok(record_id)
    }
}
