//! Response conversion.
//!
//! The engine buffers the whole response, so conversion is a move of the
//! status, headers and body. Hyper drops the body of HEAD responses.
//! Responses committed outside the pipeline (errors, redirects) only get
//! their `Content-Type` header here.

use axum::body::Body;
use axum::http::{header, HeaderValue};
use axum::response::IntoResponse;

use crate::rest::Response;

impl IntoResponse for Response {
    fn into_response(mut self) -> axum::response::Response {
        if !self.headers.contains_key(header::CONTENT_TYPE) {
            if let Some(value) = self.content_type_header().and_then(|v| HeaderValue::from_str(&v).ok()) {
                self.headers.insert(header::CONTENT_TYPE, value);
            }
        }

        let mut response = axum::response::Response::new(Body::from(self.body));
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}
