//! Input resolution: turn an item's configured source into bytes or text.
//!
//! Four sources exist. Binary, URL and path all produce a [`FilePayload`]
//! (bytes, filename, optional MIME type) for the file endpoint; text is
//! passed through untouched for the text endpoint.
//!
//! Filenames for downloads come from the `Content-Disposition` header when
//! it yields one, else the last URL path segment, else `downloaded-file`.
//! Path reads never sniff the content type; the server does its own
//! detection and `application/octet-stream` is sent.

use crate::context::NodeContext;
use crate::error::ExtractError;
use crate::transport::{HttpRequest, HttpTransport};
use once_cell::sync::Lazy;
use regex::Regex;
use std::borrow::Cow;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use url::Url;

/// Filename used when binary data carries none.
pub const DEFAULT_BINARY_FILENAME: &str = "file";

/// Filename used when a download yields none.
pub const DEFAULT_DOWNLOAD_FILENAME: &str = "downloaded-file";

/// MIME type sent for files read from disk.
pub const OCTET_STREAM: &str = "application/octet-stream";

/// Where an item's payload comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputSource {
    /// Named binary attachment on the item.
    Binary { field: String },
    /// File to download.
    Url(String),
    /// Local file; `~` and `~/...` expand to the home directory.
    Path(String),
    /// Raw text for the text endpoint.
    Text(String),
}

/// A file ready to upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePayload {
    pub bytes: Vec<u8>,
    pub file_name: String,
    /// `None` omits the part's `Content-Type` line.
    pub mime_type: Option<String>,
}

/// Output of the resolver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedInput {
    File(FilePayload),
    Text(String),
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Resolve `source` for item `item_index`.
pub async fn resolve_input(
    source: &InputSource,
    item_index: usize,
    ctx: &dyn NodeContext,
    transport: &dyn HttpTransport,
) -> Result<ResolvedInput, ExtractError> {
    match source {
        InputSource::Binary { field } => {
            let binary = ctx.binary_field(item_index, field).await?;
            debug!(
                "Item {}: binary field '{}' ({} bytes)",
                item_index,
                field,
                binary.data.len()
            );
            Ok(ResolvedInput::File(FilePayload {
                bytes: binary.data,
                file_name: binary
                    .file_name
                    .filter(|n| !n.is_empty())
                    .unwrap_or_else(|| DEFAULT_BINARY_FILENAME.to_string()),
                mime_type: binary.mime_type.filter(|m| !m.is_empty()),
            }))
        }
        InputSource::Url(url) => download(url, transport).await.map(ResolvedInput::File),
        InputSource::Path(path) => read_path(path).await.map(ResolvedInput::File),
        InputSource::Text(text) => Ok(ResolvedInput::Text(text.clone())),
    }
}

/// Download `url` in full.
///
/// Any transport failure or non-2xx status becomes
/// [`ExtractError::FileDownloadError`].
pub async fn download(url: &str, transport: &dyn HttpTransport) -> Result<FilePayload, ExtractError> {
    info!("Downloading file from: {}", url);

    let response = transport
        .send(HttpRequest::get(url))
        .await
        .map_err(|e| ExtractError::FileDownloadError { reason: e.message })?;

    if !response.is_success() {
        return Err(ExtractError::FileDownloadError {
            reason: format!("Request failed with status code {}", response.status.as_u16()),
        });
    }

    let disposition = response.header("content-disposition");
    let file_name = download_filename(url, disposition.as_deref());
    let mime_type = response
        .header("content-type")
        .filter(|m| !m.is_empty())
        .map(Cow::into_owned);

    debug!(
        "Downloaded '{}' ({} bytes, {:?})",
        file_name,
        response.body.len(),
        mime_type
    );

    Ok(FilePayload {
        bytes: response.body,
        file_name,
        mime_type,
    })
}

/// Read a local file, expanding a leading `~`.
pub async fn read_path(path: &str) -> Result<FilePayload, ExtractError> {
    let resolved = expand_tilde(path);
    debug!("Reading file: {}", resolved.display());

    let bytes = tokio::fs::read(&resolved)
        .await
        .map_err(|e| ExtractError::FileReadError {
            path: resolved.clone(),
            reason: e.to_string(),
        })?;

    let file_name = resolved
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| DEFAULT_BINARY_FILENAME.to_string());

    Ok(FilePayload {
        bytes,
        file_name,
        mime_type: Some(OCTET_STREAM.to_string()),
    })
}

// ── Filenames ────────────────────────────────────────────────────────────

/// Pick a filename for a download: header, then URL, then the fixed default.
pub fn download_filename(url: &str, content_disposition: Option<&str>) -> String {
    content_disposition
        .and_then(filename_from_content_disposition)
        .or_else(|| filename_from_url(url))
        .unwrap_or_else(|| DEFAULT_DOWNLOAD_FILENAME.to_string())
}

static RE_FILENAME_KEY: Lazy<Regex> = Lazy::new(|| Regex::new(r"filename[^;=\n]*=").unwrap());

/// Extract the filename parameter from a `Content-Disposition` value.
///
/// Matches `filename[^;=\n]*=((['"]).*?\2|[^;\n]*)`: after the key, either a
/// quoted run ending at the same quote on the same line, or everything up to
/// `;` or newline. All `'` and `"` are then removed. `filename*=` values are
/// therefore taken literally, charset prefix included.
pub fn filename_from_content_disposition(header: &str) -> Option<String> {
    let key = RE_FILENAME_KEY.find(header)?;
    let rest = &header[key.end()..];
    let raw = quoted_value(rest).unwrap_or_else(|| unquoted_value(rest));

    let name: String = raw.chars().filter(|c| *c != '"' && *c != '\'').collect();
    (!name.is_empty()).then_some(name)
}

fn quoted_value(rest: &str) -> Option<&str> {
    let quote = rest.chars().next().filter(|c| *c == '"' || *c == '\'')?;
    let line_end = rest
        .find(|c| matches!(c, '\n' | '\r' | '\u{2028}' | '\u{2029}'))
        .unwrap_or(rest.len());
    let close = rest[1..line_end].find(quote)? + 1;
    Some(&rest[..=close])
}

fn unquoted_value(rest: &str) -> &str {
    let end = rest.find([';', '\n']).unwrap_or(rest.len());
    &rest[..end]
}

/// Last path segment of `url`, if non-empty.
pub fn filename_from_url(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let last = parsed.path_segments()?.next_back()?;
    (!last.is_empty()).then(|| last.to_string())
}

// ── Paths ────────────────────────────────────────────────────────────────

/// Expand `~` / `~/...` to the current user's home directory.
pub fn expand_tilde(path: &str) -> PathBuf {
    expand_tilde_with(path, dirs::home_dir().as_deref())
}

/// [`expand_tilde`] with an explicit home directory.
///
/// Paths like `~user/x` are left alone, as is everything when `home` is
/// unknown.
pub fn expand_tilde_with(path: &str, home: Option<&Path>) -> PathBuf {
    match home {
        Some(home) if path == "~" => home.to_path_buf(),
        Some(home) => match path.strip_prefix("~/") {
            Some(rest) => home.join(rest),
            None => PathBuf::from(path),
        },
        None => PathBuf::from(path),
    }
}
