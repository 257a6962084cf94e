use std::collections::HashMap;

use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use serde_json::Value;

use crate::{butterfly::ButterflyError, store::StoreError};

#[derive(Debug)]
pub enum ServerError {
    StoreError {
        action: &'static str,
        error: StoreError,
    },
}

impl Serialize for ServerError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::ser::Serializer,
    {
        use serde::ser::SerializeMap;
        match self {
            ServerError::StoreError { action, error } => {
                let mut map = serializer.serialize_map(Some(2))?;
                map.serialize_entry("action", action)?;
                map.serialize_entry("message", &error.to_string())?;
                map.end()
            }
        }
    }
}

#[derive(Debug)]
pub enum AppError {
    ServerError {
        error: ServerError,

        #[cfg(debug_assertions)]
        backtrace: Option<backtrace::Backtrace>,
    },
    WithStatus(String, StatusCode),
}

#[derive(Serialize)]
struct ErrorResponse {
    code: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    msg: Option<String>,

    #[cfg(debug_assertions)]
    #[serde(skip_serializing_if = "Option::is_none")]
    debug_info: Option<HashMap<&'static str, Value>>,
}

fn status_code_name(status: StatusCode) -> &'static str {
    match status {
        StatusCode::BAD_REQUEST => "BAD_REQUEST",
        StatusCode::NOT_FOUND => "NOT_FOUND",
        StatusCode::UNPROCESSABLE_ENTITY => "UNPROCESSABLE_ENTITY",
        _ => "ERR",
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status_code, error_response) = match self {
            AppError::ServerError {
                error,
                #[cfg(debug_assertions)]
                backtrace,
            } => {
                tracing::error!(?error, "Store error while handling request");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    #[cfg(debug_assertions)]
                    {
                        let frames_info = backtrace
                            .as_ref()
                            .map(filter_backtrace)
                            .unwrap_or_default();
                        ErrorResponse {
                            code: "STORE_ERR".into(),
                            msg: Some("Store error".into()),
                            debug_info: Some(HashMap::from([
                                (
                                    "backtrace",
                                    serde_json::to_value(&frames_info).unwrap_or_default(),
                                ),
                                ("error", serde_json::to_value(&error).unwrap_or_default()),
                            ])),
                        }
                    },
                    #[cfg(not(debug_assertions))]
                    ErrorResponse {
                        code: "SERVER_ERR".into(),
                        msg: Some("Internal server error".into()),
                    },
                )
            }
            AppError::WithStatus(msg, status) => (
                status,
                ErrorResponse {
                    code: status_code_name(status).into(),
                    msg: Some(msg),
                    #[cfg(debug_assertions)]
                    debug_info: None,
                },
            ),
        };

        (status_code, Json(error_response)).into_response()
    }
}

impl From<ButterflyError> for AppError {
    fn from(e: ButterflyError) -> Self {
        let (action, error) = match e {
            ButterflyError::NotFound { .. } => {
                return AppError::WithStatus(e.to_string(), StatusCode::NOT_FOUND);
            }
            ButterflyError::Store { action, source } => (action, source),
            ButterflyError::Fetch(source) => ("fetch butterfly", source),
        };

        AppError::ServerError {
            error: ServerError::StoreError { action, error },

            #[cfg(debug_assertions)]
            backtrace: Some(backtrace::Backtrace::new()),
        }
    }
}

impl From<(&'static str, StatusCode)> for AppError {
    fn from((msg, status): (&'static str, StatusCode)) -> Self {
        AppError::WithStatus(msg.into(), status)
    }
}

impl From<(String, StatusCode)> for AppError {
    fn from((msg, status): (String, StatusCode)) -> Self {
        AppError::WithStatus(msg, status)
    }
}

#[derive(Serialize, Debug)]
struct FrameInfo {
    name: String,
    loc: String,
}

fn filter_backtrace(backtrace: &backtrace::Backtrace) -> Vec<FrameInfo> {
    const MODULE_PREFIX: &str = concat!(env!("CARGO_PKG_NAME"), "::");
    let mut frames_info: Vec<FrameInfo> = Vec::new();

    for frame in backtrace.frames() {
        for symbol in frame.symbols() {
            if let (Some(name), Some(filename), Some(lineno)) = (
                symbol.name().map(|n| n.to_string()),
                symbol.filename().map(|f| f.to_owned()),
                symbol.lineno(),
            ) {
                if name.contains(MODULE_PREFIX) {
                    frames_info.push(FrameInfo {
                        name,
                        loc: format!("{}:{}", filename.display(), lineno),
                    });
                }
            }
        }
    }

    frames_info
}
