//! Call options as a host hands them over (camelCase JSON).

use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::Value;

use crate::transfer::constants::{
    DEFAULT_FILE_FIELD, DEFAULT_HEIGHT_HEADER, DEFAULT_SIZE_HEADER, DEFAULT_WIDTH_HEADER,
};
use crate::transfer::{
    FieldMap, HttpMethod, RequestSpec, ResizeOptions, ResponseType, deserialize_lenient_fields,
};

fn default_true() -> bool {
    true
}

/// Options of a plain request.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpOptions {
    pub url: String,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub headers: IndexMap<String, String>,
    #[serde(default)]
    pub params: FieldMap,
    /// Request payload; only sent for POST, PUT, PATCH and DELETE.
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub connect_timeout: Option<u64>,
    #[serde(default)]
    pub read_timeout: Option<u64>,
    #[serde(default)]
    pub disable_redirects: bool,
    #[serde(default = "default_true")]
    pub should_encode_url_params: bool,
    #[serde(default)]
    pub response_type: ResponseType,
}

impl HttpOptions {
    /// Creates GET options for `url` with every other option at its default.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: None,
            headers: IndexMap::new(),
            params: FieldMap::new(),
            data: None,
            connect_timeout: None,
            read_timeout: None,
            disable_redirects: false,
            should_encode_url_params: true,
            response_type: ResponseType::default(),
        }
    }

    /// The method to use: `forced` when given, else the `method` option,
    /// else GET.
    #[must_use]
    pub fn resolve_method(&self, forced: Option<HttpMethod>) -> HttpMethod {
        forced.unwrap_or_else(|| HttpMethod::parse(self.method.as_deref().unwrap_or_default()))
    }

    /// Builds the request description for these options.
    #[must_use]
    pub fn request_spec(&self, method: HttpMethod) -> RequestSpec {
        RequestSpec {
            method,
            url: self.url.clone(),
            headers: self.headers.clone(),
            params: self.params.clone(),
            connect_timeout_ms: positive(self.connect_timeout),
            read_timeout_ms: positive(self.read_timeout),
            disable_redirects: self.disable_redirects,
            should_encode: self.should_encode_url_params,
        }
    }
}

/// Options of a file upload.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadOptions {
    pub url: String,
    /// Defaults to POST.
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub headers: IndexMap<String, String>,
    #[serde(default)]
    pub params: FieldMap,
    #[serde(default)]
    pub file_path: Option<String>,
    #[serde(default)]
    pub file_directory: Option<String>,
    /// Form fields sent ahead of the file; a `key` field is always sent first.
    /// Entries that are `null` or objects are dropped.
    #[serde(default, deserialize_with = "deserialize_lenient_fields")]
    pub data: FieldMap,
    #[serde(default)]
    pub resize: Option<ResizeOptions>,
    #[serde(default)]
    pub id: Option<String>,
    /// Form field name of the file part; defaults to `file`.
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub width_header: Option<String>,
    #[serde(default)]
    pub height_header: Option<String>,
    #[serde(default)]
    pub size_header: Option<String>,
    #[serde(default)]
    pub connect_timeout: Option<u64>,
    #[serde(default)]
    pub read_timeout: Option<u64>,
    #[serde(default)]
    pub response_type: ResponseType,
}

impl UploadOptions {
    /// Creates upload options for `url` and `file_path` with defaults.
    pub fn new(url: impl Into<String>, file_path: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: None,
            headers: IndexMap::new(),
            params: FieldMap::new(),
            file_path: Some(file_path.into()),
            file_directory: None,
            data: FieldMap::new(),
            resize: None,
            id: None,
            name: None,
            width_header: None,
            height_header: None,
            size_header: None,
            connect_timeout: None,
            read_timeout: None,
            response_type: ResponseType::default(),
        }
    }

    #[must_use]
    pub fn request_spec(&self) -> RequestSpec {
        let method = self
            .method
            .as_deref()
            .map_or(HttpMethod::Post, HttpMethod::parse);
        RequestSpec {
            method,
            url: self.url.clone(),
            headers: self.headers.clone(),
            params: self.params.clone(),
            connect_timeout_ms: positive(self.connect_timeout),
            read_timeout_ms: positive(self.read_timeout),
            disable_redirects: false,
            should_encode: true,
        }
    }

    #[must_use]
    pub fn field_name(&self) -> &str {
        self.name.as_deref().unwrap_or(DEFAULT_FILE_FIELD)
    }

    /// Width, height and size field names, with defaults applied.
    #[must_use]
    pub fn dimension_fields(&self) -> (&str, &str, &str) {
        (
            self.width_header.as_deref().unwrap_or(DEFAULT_WIDTH_HEADER),
            self.height_header.as_deref().unwrap_or(DEFAULT_HEIGHT_HEADER),
            self.size_header.as_deref().unwrap_or(DEFAULT_SIZE_HEADER),
        )
    }
}

/// Options of a download to a local file.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadOptions {
    pub url: String,
    /// Defaults to GET.
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub headers: IndexMap<String, String>,
    #[serde(default)]
    pub params: FieldMap,
    #[serde(default)]
    pub file_path: Option<String>,
    #[serde(default)]
    pub file_directory: Option<String>,
    #[serde(default)]
    pub connect_timeout: Option<u64>,
    #[serde(default)]
    pub read_timeout: Option<u64>,
}

impl DownloadOptions {
    pub fn new(url: impl Into<String>, file_path: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: None,
            headers: IndexMap::new(),
            params: FieldMap::new(),
            file_path: Some(file_path.into()),
            file_directory: None,
            connect_timeout: None,
            read_timeout: None,
        }
    }

    #[must_use]
    pub fn request_spec(&self) -> RequestSpec {
        RequestSpec {
            method: HttpMethod::parse(self.method.as_deref().unwrap_or_default()),
            url: self.url.clone(),
            headers: self.headers.clone(),
            params: self.params.clone(),
            connect_timeout_ms: positive(self.connect_timeout),
            read_timeout_ms: positive(self.read_timeout),
            disable_redirects: false,
            should_encode: true,
        }
    }
}

/// Timeouts of zero mean "not set".
fn positive(value: Option<u64>) -> Option<u64> {
    value.filter(|ms| *ms > 0)
}
