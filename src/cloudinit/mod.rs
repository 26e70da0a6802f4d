//! Boot-configuration (userdata) documents and bootstrap-script merging
//!
//! A host's first-boot configuration is either an interpreter script
//! (`#!` prefix) or a structured `#cloud-config` document; anything else
//! is rejected rather than guessed, since a mis-detected format would
//! corrupt the host's bootstrap sequence. Merging injects a custom install
//! script as a compressed `write_files` entry plus a `runcmd` invocation,
//! and always produces a structured document.

use std::io::{Read, Write};
use std::path::PathBuf;

use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use flate2::{Compression, read::GzDecoder, write::GzEncoder};
use serde::Serialize;
use serde_yaml::{Mapping, Value};
use tracing::debug;

use crate::MachinistError;

/// Marker prefix of a structured cloud-config document.
pub const CLOUD_CONFIG_MARKER: &str = "#cloud-config";
/// Marker prefix of an interpreter-script userdata file.
pub const SCRIPT_MARKER: &str = "#!";

/// Where the injected install script lands on the provisioned host.
pub const INSTALL_SCRIPT_PATH: &str = "/usr/local/custom_script/install.sh";
const INSTALL_SCRIPT_MODE: &str = "0644";
const PAYLOAD_ENCODING: &str = "gzip+b64";

const WRITE_FILES_KEY: &str = "write_files";
const RUNCMD_KEY: &str = "runcmd";

/// One `write_files` directive.
#[derive(Debug, Clone, Serialize)]
pub struct WriteFileEntry {
    pub encoding: String,
    pub content: String,
    pub path: String,
    pub permissions: String,
}

/// An ordered cloud-config mapping.
///
/// Only the `write_files` and `runcmd` sections are interpreted, and both
/// are append-only: a non-list value at either key is a structural error,
/// never overwritten.
#[derive(Debug, Clone, Default)]
pub struct CloudConfigDoc {
    map: Mapping,
}

impl CloudConfigDoc {
    /// The minimal empty document.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a structured document, with or without its `#cloud-config`
    /// marker line.
    pub fn parse(data: &[u8]) -> Result<Self, MachinistError> {
        let body = data
            .strip_prefix(CLOUD_CONFIG_MARKER.as_bytes())
            .unwrap_or(data);
        if body.iter().all(|byte| byte.is_ascii_whitespace()) {
            return Ok(Self::new());
        }

        match serde_yaml::from_slice(body)? {
            Value::Null => Ok(Self::new()),
            Value::Mapping(map) => Ok(Self { map }),
            _ => Err(MachinistError::MalformedCloudConfig(
                "document root is not a mapping".to_string(),
            )),
        }
    }

    /// Append one directive to the `write_files` section.
    pub fn append_write_file(&mut self, entry: WriteFileEntry) -> Result<(), MachinistError> {
        let value = serde_yaml::to_value(entry)?;
        self.append_to(WRITE_FILES_KEY, value)
    }

    /// Append one shell command to the `runcmd` section.
    pub fn append_runcmd(&mut self, command: &str) -> Result<(), MachinistError> {
        self.append_to(RUNCMD_KEY, Value::from(command))
    }

    fn append_to(&mut self, key: &'static str, value: Value) -> Result<(), MachinistError> {
        let key_value = Value::from(key);
        match self.map.get_mut(&key_value) {
            Some(Value::Sequence(entries)) => {
                entries.push(value);
                Ok(())
            }
            Some(_) => Err(MachinistError::MalformedCloudConfig(format!(
                "{key} is not a list"
            ))),
            None => {
                self.map.insert(key_value, Value::Sequence(vec![value]));
                Ok(())
            }
        }
    }

    /// The `write_files` entries, if the section is present.
    pub fn write_files(&self) -> Result<Option<&Vec<Value>>, MachinistError> {
        self.section(WRITE_FILES_KEY)
    }

    /// The `runcmd` entries, if the section is present.
    pub fn runcmd(&self) -> Result<Option<&Vec<Value>>, MachinistError> {
        self.section(RUNCMD_KEY)
    }

    fn section(&self, key: &'static str) -> Result<Option<&Vec<Value>>, MachinistError> {
        match self.map.get(&Value::from(key)) {
            None => Ok(None),
            Some(Value::Sequence(entries)) => Ok(Some(entries)),
            Some(_) => Err(MachinistError::MalformedCloudConfig(format!(
                "{key} is not a list"
            ))),
        }
    }

    /// Serialize behind the `#cloud-config` marker line.
    pub fn to_bytes(&self) -> Result<Vec<u8>, MachinistError> {
        let yaml = serde_yaml::to_string(&Value::Mapping(self.map.clone()))?;

        let mut out = Vec::with_capacity(CLOUD_CONFIG_MARKER.len() + 1 + yaml.len());
        out.extend_from_slice(CLOUD_CONFIG_MARKER.as_bytes());
        out.push(b'\n');
        out.extend_from_slice(yaml.as_bytes());
        Ok(out)
    }
}

/// Merge a custom install script into existing userdata.
///
/// The script lands as a `gzip+b64` `write_files` entry executed by a
/// matching `runcmd` entry:
///
/// - absent userdata is treated as the minimal empty document;
/// - script-format userdata is concatenated with the install script into a
///   single payload in a fresh document;
/// - structured userdata keeps all of its content and gains the two new
///   entries;
/// - any other prefix fails with `UnsupportedUserdataFormat`.
pub fn merge_userdata(existing: Option<&[u8]>, script: &[u8]) -> Result<Vec<u8>, MachinistError> {
    let script_body = strip_interpreter_line(script);

    let (mut doc, payload) = match existing {
        Some(data) if data.starts_with(SCRIPT_MARKER.as_bytes()) => {
            let body = strip_interpreter_line(data);
            let payload = [body, b"\n\n".as_slice(), script_body].concat();
            (CloudConfigDoc::new(), payload)
        }
        Some(data) if data.starts_with(CLOUD_CONFIG_MARKER.as_bytes()) => {
            (CloudConfigDoc::parse(data)?, script_body.to_vec())
        }
        Some(_) => return Err(MachinistError::UnsupportedUserdataFormat),
        None => (CloudConfigDoc::new(), script_body.to_vec()),
    };

    doc.append_write_file(WriteFileEntry {
        encoding: PAYLOAD_ENCODING.to_string(),
        content: gzip_base64(&payload)?,
        path: INSTALL_SCRIPT_PATH.to_string(),
        permissions: INSTALL_SCRIPT_MODE.to_string(),
    })?;
    doc.append_runcmd(&format!("sh {INSTALL_SCRIPT_PATH}"))?;

    doc.to_bytes()
}

/// Merge and write the result to a fresh temporary file, returning its
/// path. The file is created only after the merge has fully succeeded.
pub fn write_merged(existing: Option<&[u8]>, script: &[u8]) -> Result<PathBuf, MachinistError> {
    let merged = merge_userdata(existing, script)?;

    let mut file = tempfile::Builder::new()
        .prefix("modified-user-data-")
        .suffix(".yaml")
        .tempfile()?;
    file.write_all(&merged)?;
    let (_, path) = file.keep().map_err(|keep| MachinistError::Io(keep.error))?;

    debug!("merged userdata written to {}", path.display());
    Ok(path)
}

/// Gzip-compress then base64-encode `data` (cloud-init `gzip+b64`).
pub fn gzip_base64(data: &[u8]) -> Result<String, MachinistError> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    let compressed = encoder.finish()?;
    Ok(BASE64.encode(compressed))
}

/// Inverse of [`gzip_base64`].
pub fn gunzip_base64(content: &str) -> Result<Vec<u8>, MachinistError> {
    let compressed = BASE64
        .decode(content)
        .map_err(|e| MachinistError::InvalidData(format!("invalid base64: {e}")))?;

    let mut decoder = GzDecoder::new(compressed.as_slice());
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|e| MachinistError::InvalidData(format!("invalid gzip payload: {e}")))?;
    Ok(out)
}

fn strip_interpreter_line(data: &[u8]) -> &[u8] {
    if !data.starts_with(SCRIPT_MARKER.as_bytes()) {
        return data;
    }
    match data.iter().position(|&byte| byte == b'\n') {
        Some(newline) => &data[newline + 1..],
        None => &[],
    }
}
