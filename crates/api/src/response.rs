//! JSON response envelope.
//!
//! Every endpoint answers with
//! `{ "success": bool, "message": string, "data": T | null }`. List endpoints
//! put a [`Paginated`] value in `data`.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

use crate::db::Page;

/// The response envelope.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub message: String,
    pub data: Option<T>,
    #[serde(skip)]
    status: StatusCode,
}

impl<T: Serialize> ApiResponse<T> {
    /// A 200 response carrying `data`.
    pub fn ok(message: impl Into<String>, data: T) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: Some(data),
            status: StatusCode::OK,
        }
    }

    /// A 201 response carrying the created resource.
    pub fn created(message: impl Into<String>, data: T) -> Self {
        Self {
            status: StatusCode::CREATED,
            ..Self::ok(message, data)
        }
    }
}

impl ApiResponse<()> {
    /// A 200 response with `data: null`.
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: None,
            status: StatusCode::OK,
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        (self.status, Json(self)).into_response()
    }
}

/// One page of a list.
#[derive(Debug, Serialize)]
pub struct Paginated<T> {
    pub items: Vec<T>,
    pub page: i64,
    pub per_page: i64,
    pub total: i64,
}

impl<T> Paginated<T> {
    /// Wrap a page of rows and the total row count.
    #[must_use]
    pub fn new(items: Vec<T>, page: Page, total: i64) -> Self {
        Self {
            items,
            page: page.page,
            per_page: page.per_page,
            total,
        }
    }
}

/// `?page=&per_page=` query parameters.
#[derive(Debug, Default, Clone, Copy, Deserialize)]
pub struct PageQuery {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

impl From<PageQuery> for Page {
    fn from(q: PageQuery) -> Self {
        Self::new(q.page, q.per_page)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_shape() {
        let body = serde_json::to_value(ApiResponse::ok("Fetched", vec![1, 2])).unwrap();
        assert_eq!(
            body,
            serde_json::json!({ "success": true, "message": "Fetched", "data": [1, 2] })
        );
    }

    #[test]
    fn test_message_only_has_null_data() {
        let body = serde_json::to_value(ApiResponse::message("Deleted")).unwrap();
        assert_eq!(body["data"], serde_json::Value::Null);
        assert_eq!(body["success"], true);
    }

    #[test]
    fn test_created_status() {
        let response = ApiResponse::created("Created", 7).into_response();
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    #[test]
    fn test_paginated_shape() {
        let page = Page::new(Some(2), Some(10));
        let body = serde_json::to_value(Paginated::new(vec!["a"], page, 11)).unwrap();
        assert_eq!(
            body,
            serde_json::json!({ "items": ["a"], "page": 2, "per_page": 10, "total": 11 })
        );
    }
}
