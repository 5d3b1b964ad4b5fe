//! Response normalization: API JSON → output record payload.
//!
//! Field presence follows JavaScript-style truthiness, because the service's
//! responses use empty strings and `null` interchangeably for "absent":
//! `filename: ""` is not copied, `extracted_data: null` becomes `{}`.

use crate::config::OutputOptions;
use crate::error::ExtractError;
use crate::transport::HttpResponse;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

/// Code reported when an error response carries none.
pub const UNKNOWN_ERROR_CODE: &str = "unknown_error";

/// Parsed body of an extraction call.
///
/// All fields are kept as raw JSON so unexpected types never fail parsing;
/// the normalizer copies them through verbatim.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiResponse {
    pub status: Option<Value>,
    pub error_code: Option<Value>,
    pub filename: Option<Value>,
    pub file_type: Option<Value>,
    pub extracted_data: Option<Value>,
    pub raw_response: Option<Value>,
}

impl ApiResponse {
    pub fn is_error(&self) -> bool {
        self.status.as_ref().and_then(Value::as_str) == Some("error")
    }

    /// `error_code`, or `unknown_error` when absent.
    pub fn error_code(&self) -> String {
        match self.error_code.as_ref().filter(|v| truthy(v)) {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => UNKNOWN_ERROR_CODE.to_string(),
        }
    }

    /// Fail with [`ExtractError::ApiError`] on an error response.
    pub fn into_result(self) -> Result<Self, ExtractError> {
        if self.is_error() {
            Err(ExtractError::ApiError {
                code: self.error_code(),
            })
        } else {
            Ok(self)
        }
    }
}

/// Interpret the raw HTTP exchange of an extraction call.
///
/// A structured error body wins over the HTTP status; any other non-2xx is
/// [`ExtractError::HttpStatus`]; a 2xx body that is not a JSON object is
/// [`ExtractError::InvalidResponse`].
pub fn parse_api_response(response: &HttpResponse) -> Result<ApiResponse, ExtractError> {
    let parsed = serde_json::from_slice::<ApiResponse>(&response.body);

    if !response.is_success() {
        if let Ok(body) = &parsed {
            if body.is_error() {
                return Err(ExtractError::ApiError {
                    code: body.error_code(),
                });
            }
        }
        return Err(ExtractError::HttpStatus {
            status: response.status.as_u16(),
            body: snippet(&response.body),
        });
    }

    let body = parsed.map_err(|e| ExtractError::InvalidResponse(e.to_string()))?;
    body.into_result()
}

/// Build the output payload for a successful response.
///
/// With metadata, `status` is copied and `filename` / `file_type` when
/// present. Extracted data always lands under the configured field; with
/// `simplify` off, a present `raw_response` is copied under that literal key.
pub fn normalize(response: &ApiResponse, options: &OutputOptions) -> Map<String, Value> {
    let mut out = Map::new();

    if options.include_metadata {
        if let Some(status) = &response.status {
            out.insert("status".into(), status.clone());
        }
        if let Some(filename) = response.filename.as_ref().filter(|v| truthy(v)) {
            out.insert("filename".into(), filename.clone());
        }
        if let Some(file_type) = response.file_type.as_ref().filter(|v| truthy(v)) {
            out.insert("file_type".into(), file_type.clone());
        }
    }

    let extracted = response
        .extracted_data
        .as_ref()
        .filter(|v| truthy(v))
        .cloned()
        .unwrap_or_else(|| Value::Object(Map::new()));
    out.insert(options.output_field_name.clone(), extracted);

    if !options.simplify {
        if let Some(raw) = response.raw_response.as_ref().filter(|v| truthy(v)) {
            out.insert("raw_response".into(), raw.clone());
        }
    }

    debug!("Normalized output with {} keys", out.len());
    out
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn snippet(body: &[u8]) -> String {
    let text = String::from_utf8_lossy(body);
    let mut out: String = text.chars().take(200).collect();
    if text.chars().count() > 200 {
        out.push('…');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(v: Value) -> ApiResponse {
        serde_json::from_value(v).unwrap()
    }

    #[test]
    fn default_options_with_metadata() {
        let resp = parse(json!({
            "status": "ok",
            "extracted_data": {"total": 42},
            "filename": "a.pdf"
        }));
        let out = normalize(&resp, &OutputOptions::default());
        assert_eq!(
            Value::Object(out),
            json!({"status": "ok", "filename": "a.pdf", "extracted_data": {"total": 42}})
        );
    }

    #[test]
    fn metadata_can_be_disabled() {
        let resp = parse(json!({
            "status": "ok",
            "filename": "a.pdf",
            "file_type": "pdf",
            "extracted_data": {"x": 1}
        }));
        let options = OutputOptions {
            include_metadata: false,
            ..OutputOptions::default()
        };
        assert_eq!(
            Value::Object(normalize(&resp, &options)),
            json!({"extracted_data": {"x": 1}})
        );
    }

    #[test]
    fn missing_extracted_data_becomes_empty_object() {
        let resp = parse(json!({"status": "ok", "extracted_data": null, "filename": ""}));
        let out = normalize(&resp, &OutputOptions::default());
        assert_eq!(Value::Object(out), json!({"status": "ok", "extracted_data": {}}));
    }

    #[test]
    fn raw_response_only_without_simplify() {
        let resp = parse(json!({
            "status": "ok",
            "extracted_data": {"a": 1},
            "raw_response": "model text"
        }));

        let simplified = normalize(&resp, &OutputOptions::default());
        assert!(!simplified.contains_key("raw_response"));

        let options = OutputOptions {
            simplify: false,
            output_field_name: "invoice".into(),
            include_metadata: false,
        };
        let full = normalize(&resp, &options);
        assert_eq!(
            Value::Object(full),
            json!({"invoice": {"a": 1}, "raw_response": "model text"})
        );
    }

    #[test]
    fn error_response_carries_code() {
        let err = parse(json!({"status": "error", "error_code": "invalid_schema"}))
            .into_result()
            .unwrap_err();
        assert!(err.to_string().contains("invalid_schema"));
        assert!(err.hint().is_some());

        let err = parse(json!({"status": "error"})).into_result().unwrap_err();
        assert!(err.to_string().contains("unknown_error"));
    }

    #[test]
    fn structured_error_wins_over_http_status() {
        let resp = HttpResponse::new(
            400,
            &[],
            br#"{"status":"error","error_code":"insufficient_credits"}"#.to_vec(),
        );
        let err = parse_api_response(&resp).unwrap_err();
        assert!(matches!(err, ExtractError::ApiError { ref code } if code == "insufficient_credits"));
    }

    #[test]
    fn non_json_failure_is_http_status() {
        let resp = HttpResponse::new(502, &[], b"Bad Gateway".to_vec());
        let err = parse_api_response(&resp).unwrap_err();
        assert!(matches!(err, ExtractError::HttpStatus { status: 502, .. }));
    }

    #[test]
    fn non_json_success_is_invalid_response() {
        let resp = HttpResponse::new(200, &[], b"<html>".to_vec());
        assert!(matches!(
            parse_api_response(&resp),
            Err(ExtractError::InvalidResponse(_))
        ));
    }

    #[test]
    fn ok_body_parses() {
        let resp = HttpResponse::new(200, &[], br#"{"status":"ok","extracted_data":{"n":1}}"#.to_vec());
        let body = parse_api_response(&resp).unwrap();
        assert_eq!(body.extracted_data, Some(json!({"n": 1})));
    }
}
