use crate::ledger::LedgerError;
use crate::registry::RegistryError;
use serde_json::json;

/// HTTP status a host should use when relaying a failure with this code.
pub fn status_for(code: &str) -> u16 {
    match code {
        "bad_params" | "bad_json" | "class_expired" => 400,
        "unauthorized" => 401,
        "forbidden" => 403,
        "not_found" | "invalid_code" | "not_implemented" => 404,
        "already_marked" | "code_taken" | "email_taken" | "roll_number_taken" | "no_workspace" => {
            409
        }
        _ => 500,
    }
}

pub fn ok(id: &str, result: serde_json::Value) -> serde_json::Value {
    json!({
        "id": id,
        "ok": true,
        "status": 200,
        "result": result
    })
}

pub fn created(id: &str, result: serde_json::Value) -> serde_json::Value {
    json!({
        "id": id,
        "ok": true,
        "status": 201,
        "result": result
    })
}

pub fn err(
    id: &str,
    code: &str,
    message: impl Into<String>,
    details: Option<serde_json::Value>,
) -> serde_json::Value {
    let mut error = json!({
        "code": code,
        "message": message.into(),
        "status": status_for(code),
    });
    if let Some(d) = details {
        error["details"] = d;
    }
    json!({
        "id": id,
        "ok": false,
        "error": error,
    })
}

#[derive(Debug)]
pub struct HandlerErr {
    pub code: &'static str,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl HandlerErr {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn bad_params(message: impl Into<String>) -> Self {
        Self::new("bad_params", message)
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn response(self, id: &str) -> serde_json::Value {
        err(id, self.code, self.message, self.details)
    }
}

impl From<rusqlite::Error> for HandlerErr {
    fn from(e: rusqlite::Error) -> Self {
        HandlerErr::new("db_query_failed", e.to_string())
    }
}

impl From<LedgerError> for HandlerErr {
    fn from(e: LedgerError) -> Self {
        let message = e.to_string();
        match e {
            LedgerError::UnknownCode(code) => {
                HandlerErr::new("invalid_code", message).with_details(json!({ "code": code }))
            }
            LedgerError::AlreadyMarked { code, .. } => {
                HandlerErr::new("already_marked", message).with_details(json!({ "code": code }))
            }
            LedgerError::ClassExpired(code) => {
                HandlerErr::new("class_expired", message).with_details(json!({ "code": code }))
            }
            LedgerError::EmailTaken(_) => HandlerErr::new("email_taken", message),
            LedgerError::Storage(op, inner) => HandlerErr::new(op.error_code(), inner.to_string()),
        }
    }
}

impl From<RegistryError> for HandlerErr {
    fn from(e: RegistryError) -> Self {
        let message = e.to_string();
        match e {
            RegistryError::NotFound(id) => {
                HandlerErr::new("not_found", message).with_details(json!({ "classId": id }))
            }
            RegistryError::CodeTaken(code) => {
                HandlerErr::new("code_taken", message).with_details(json!({ "code": code }))
            }
            RegistryError::CodeExhausted(_) => HandlerErr::new("code_exhausted", message),
            RegistryError::Storage(op, inner) => HandlerErr::new(op.error_code(), inner.to_string())
                .with_details(json!({ "table": "makeup_classes" })),
        }
    }
}
