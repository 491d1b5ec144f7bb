//! Response helpers shared by the built-in routes and API components.

use http::{header, HeaderValue, Response, StatusCode};
use serde::Serialize;

/// Standard content types
pub mod content_type {
    pub const TEXT_PLAIN: &str = "text/plain";
    pub const APPLICATION_JSON: &str = "application/json";
}

pub struct ResponseBuilder;

impl ResponseBuilder {
    /// 200 with an empty body
    pub fn ok_empty() -> Response<Vec<u8>> {
        Self::success_http(Vec::new(), None)
    }

    /// 204 with an empty body
    pub fn no_content() -> Response<Vec<u8>> {
        Response::builder()
            .status(StatusCode::NO_CONTENT)
            .body(Vec::new())
            .unwrap_or_else(|e| {
                log::error!("Failed to build no-content response: {}", e);
                Response::new(Vec::new())
            })
    }

    pub fn success_http(body: Vec<u8>, content_type: Option<&str>) -> Response<Vec<u8>> {
        let mut builder = Response::builder().status(StatusCode::OK);

        if let Some(ct) = content_type {
            match HeaderValue::from_str(ct) {
                Ok(header_value) => {
                    builder = builder.header(header::CONTENT_TYPE, header_value);
                }
                Err(e) => {
                    log::error!("Invalid content type '{}': {}", ct, e);
                }
            }
        }

        builder.body(body).unwrap_or_else(|e| {
            log::error!("Failed to build success response: {}", e);
            Self::error_http(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
        })
    }

    pub fn error_http(status: StatusCode, message: &str) -> Response<Vec<u8>> {
        let mut resp = Response::new(message.as_bytes().to_vec());
        *resp.status_mut() = status;
        resp.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static(content_type::TEXT_PLAIN),
        );
        resp
    }

    pub fn success_json<T: Serialize>(data: &T) -> Response<Vec<u8>> {
        match serde_json::to_vec(data) {
            Ok(json_body) => Self::success_http(json_body, Some(content_type::APPLICATION_JSON)),
            Err(e) => {
                log::error!("Failed to serialize JSON response: {}", e);
                Self::error_http(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "JSON serialization failed",
                )
            }
        }
    }
}

/// Common error response helpers
pub struct CommonErrors;

impl CommonErrors {
    pub fn not_found() -> Response<Vec<u8>> {
        ResponseBuilder::error_http(StatusCode::NOT_FOUND, "Not Found")
    }

    pub fn method_not_allowed() -> Response<Vec<u8>> {
        ResponseBuilder::error_http(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed")
    }
}
