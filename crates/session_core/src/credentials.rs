//! Loading of the local credentials file.
//!
//! Two formats are understood:
//!
//! * a JSON object, either a service-account key (`client_email`,
//!   `private_key`, ...) or an access key pair (`access_key_id`,
//!   `secret_access_key`),
//! * a delimited table whose header row names an `Access Key Id` and a
//!   `Secret Access Key` column, as exported by most S3-compatible consoles.

use crate::error::AssetStoreError;
use serde_json::{Map, Value};
use std::fmt;
use std::path::Path;

/// File read when the caller does not name one.
pub const DEFAULT_CREDENTIALS_FILE: &str = "modmanager.json";

const ACCESS_KEY_HEADER: &str = "access key id";
const SECRET_KEY_HEADER: &str = "secret access key";

#[derive(Clone)]
pub struct AccessKeyCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
}

impl fmt::Debug for AccessKeyCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessKeyCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .finish()
    }
}

#[derive(Clone)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    pub project_id: Option<String>,
    raw: String,
}

impl ServiceAccountKey {
    /// The key file exactly as it was read.
    pub fn raw_json(&self) -> &str {
        &self.raw
    }
}

impl fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("client_email", &self.client_email)
            .field("project_id", &self.project_id)
            .field("private_key", &"<redacted>")
            .finish()
    }
}

/// An opaque secret, exchanged once for a connected storage backend.
#[derive(Debug, Clone)]
pub enum Credentials {
    AccessKey(AccessKeyCredentials),
    ServiceAccount(ServiceAccountKey),
}

/// Reads credentials from `path`, or from [`DEFAULT_CREDENTIALS_FILE`].
pub fn load_credentials(path: Option<&Path>) -> Result<Credentials, AssetStoreError> {
    let path = path.unwrap_or(Path::new(DEFAULT_CREDENTIALS_FILE));
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(AssetStoreError::CredentialsNotFound(path.to_path_buf()));
        }
        Err(e) => return Err(AssetStoreError::Io(e)),
    };
    parse_credentials(&contents)
}

pub fn parse_credentials(contents: &str) -> Result<Credentials, AssetStoreError> {
    let contents = contents.trim_start_matches('\u{feff}').trim();
    if contents.starts_with('{') {
        parse_json(contents)
    } else {
        parse_table(contents)
    }
}

fn parse_json(contents: &str) -> Result<Credentials, AssetStoreError> {
    let value: Value = serde_json::from_str(contents)
        .map_err(|e| AssetStoreError::CredentialsMalformed(format!("invalid JSON: {e}")))?;
    let Value::Object(obj) = value else {
        return Err(AssetStoreError::CredentialsMalformed(
            "expected a JSON object".into(),
        ));
    };

    if let (Some(client_email), Some(private_key)) =
        (string_field(&obj, &["client_email"]), string_field(&obj, &["private_key"]))
    {
        if let Some(kind) = string_field(&obj, &["type"])
            && kind != "service_account"
        {
            return Err(AssetStoreError::CredentialsMalformed(format!(
                "unsupported credential type '{kind}'"
            )));
        }
        return Ok(Credentials::ServiceAccount(ServiceAccountKey {
            client_email,
            private_key,
            project_id: string_field(&obj, &["project_id"]),
            raw: contents.to_string(),
        }));
    }

    let access_key_id = string_field(&obj, &["access_key_id", "AccessKeyId"]);
    let secret_access_key = string_field(&obj, &["secret_access_key", "SecretAccessKey"]);
    match (access_key_id, secret_access_key) {
        (Some(access_key_id), Some(secret_access_key)) => {
            Ok(Credentials::AccessKey(AccessKeyCredentials {
                access_key_id,
                secret_access_key,
            }))
        }
        _ => Err(AssetStoreError::CredentialsMalformed(
            "expected either service-account fields (client_email, private_key) \
             or an access key pair (access_key_id, secret_access_key)"
                .into(),
        )),
    }
}

fn string_field(obj: &Map<String, Value>, names: &[&str]) -> Option<String> {
    names
        .iter()
        .find_map(|name| obj.get(*name))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn parse_table(contents: &str) -> Result<Credentials, AssetStoreError> {
    let mut lines = contents.lines().map(str::trim).filter(|l| !l.is_empty());
    let header = lines
        .next()
        .ok_or_else(|| AssetStoreError::CredentialsMalformed("credentials file is empty".into()))?;
    let delimiter = if header.contains(',') { ',' } else { '\t' };

    let columns: Vec<String> = split_row(header, delimiter)
        .map(|c| c.to_ascii_lowercase())
        .collect();
    let column = |name: &str| {
        columns.iter().position(|c| c == name).ok_or_else(|| {
            AssetStoreError::CredentialsMalformed(format!("missing '{name}' column"))
        })
    };
    let access_idx = column(ACCESS_KEY_HEADER)?;
    let secret_idx = column(SECRET_KEY_HEADER)?;

    let row: Vec<String> = lines
        .next()
        .map(|l| split_row(l, delimiter).collect())
        .ok_or_else(|| AssetStoreError::CredentialsMalformed("no credential row".into()))?;
    let cell = |idx: usize, name: &str| {
        row.get(idx)
            .filter(|v| !v.is_empty())
            .cloned()
            .ok_or_else(|| AssetStoreError::CredentialsMalformed(format!("empty '{name}' value")))
    };

    Ok(Credentials::AccessKey(AccessKeyCredentials {
        access_key_id: cell(access_idx, ACCESS_KEY_HEADER)?,
        secret_access_key: cell(secret_idx, SECRET_KEY_HEADER)?,
    }))
}

fn split_row(line: &str, delimiter: char) -> impl Iterator<Item = String> + '_ {
    line.split(delimiter)
        .map(|cell| cell.trim().trim_matches('"').trim().to_string())
}
