use std::fmt;

use serde::{Deserialize, Serialize};

/// Structured error information extracted from driver errors.
///
/// Serialized as compact JSON so that a failed run reports exactly one line.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct ErrorInfo {
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub(crate) error_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) code: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) message: Option<String>,
}

impl ErrorInfo {
    /// Server error code, if the failure came from a command reply.
    pub fn code(&self) -> Option<i32> {
        self.code
    }

    /// Convert error info to compact JSON string (single line).
    pub fn to_json_compact(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Format driver errors as compact JSON wrapped in an `error` field.
pub fn format_mongodb_error(
    f: &mut fmt::Formatter<'_>,
    error: &mongodb::error::Error,
) -> fmt::Result {
    let info = extract_error_info(error);
    let wrapper = serde_json::json!({ "error": info });
    let json_output = serde_json::to_string(&wrapper).map_err(|_| fmt::Error)?;
    write!(f, "Store error: {json_output}")
}

/// Extract structured information from a driver error.
pub fn extract_error_info(error: &mongodb::error::Error) -> ErrorInfo {
    use mongodb::error::ErrorKind;

    let mut info = ErrorInfo::default();

    match error.kind.as_ref() {
        ErrorKind::Command(command_error) => {
            info.error_type = Some("store.command_error".to_string());
            info.code = Some(command_error.code);
            info.message = Some(command_error.message.clone());
            info.name = get_error_name(command_error.code);
        }
        ErrorKind::Authentication { message, .. } => {
            info.error_type = Some("store.authentication_error".to_string());
            info.message = Some(message.clone());
        }
        ErrorKind::InvalidArgument { message, .. } => {
            info.error_type = Some("store.invalid_argument".to_string());
            info.message = Some(message.clone());
        }
        ErrorKind::ServerSelection { message, .. } => {
            info.error_type = Some("store.server_selection_error".to_string());
            info.message = Some(message.clone());
        }
        _ => {
            info.message = Some(error.to_string().replace('\n', " "));
        }
    }

    info
}

/// Human-readable name for the server codes an export run is likely to hit.
fn get_error_name(code: i32) -> Option<String> {
    let name = match code {
        13 => "Unauthorized",
        18 => "AuthenticationFailed",
        26 => "NamespaceNotFound",
        43 => "CursorNotFound",
        50 => "MaxTimeMSExpired",
        59 => "CommandNotFound",
        115 => "CommandNotSupported",
        16500 => "RequestRateTooLarge",
        _ => return None,
    };

    Some(name.to_string())
}
