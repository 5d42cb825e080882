use serde_json::{json, Value};

use crate::grades::GradeError;
use crate::store::StoreError;

pub fn ok(id: &str, result: Value) -> Value {
    json!({
        "id": id,
        "ok": true,
        "result": result
    })
}

pub fn err(id: &str, code: &str, message: impl Into<String>, details: Option<Value>) -> Value {
    let mut error = json!({
        "code": code,
        "message": message.into(),
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
    pub details: Option<Value>,
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

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn response(self, id: &str) -> Value {
        err(id, self.code, self.message, self.details)
    }
}

impl From<StoreError> for HandlerErr {
    fn from(e: StoreError) -> Self {
        let message = e.to_string();
        match e {
            StoreError::NotFound { table, id } => HandlerErr::new("not_found", message)
                .with_details(json!({ "table": table, "id": id })),
            StoreError::Validation(errors) => HandlerErr::new("validation_failed", message)
                .with_details(json!({ "fieldErrors": errors })),
            StoreError::Remote(_) | StoreError::Unsupported(_) => {
                HandlerErr::new("remote_failure", message)
            }
            StoreError::PartialWrite { table, failures } => {
                HandlerErr::new("partial_write_failed", message)
                    .with_details(json!({ "table": table, "failures": failures }))
            }
            StoreError::Conflict { table, .. } => {
                HandlerErr::new("conflict", message).with_details(json!({ "table": table }))
            }
            StoreError::Timeout { waited_ms, .. } => HandlerErr::new("timeout", message)
                .with_details(json!({ "waitedMs": waited_ms })),
        }
    }
}

impl From<GradeError> for HandlerErr {
    fn from(e: GradeError) -> Self {
        HandlerErr::new("invalid_grade_scale", e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{FieldError, Table};

    #[test]
    fn validation_errors_carry_field_details() {
        let e: HandlerErr = StoreError::Validation(vec![FieldError {
            field: "email".into(),
            message: "Email is invalid".into(),
        }])
        .into();
        let resp = e.response("7");
        assert_eq!(resp["ok"], false);
        assert_eq!(resp["error"]["code"], "validation_failed");
        assert_eq!(resp["error"]["details"]["fieldErrors"][0]["field"], "email");
    }

    #[test]
    fn store_errors_map_to_stable_codes() {
        let code = |e: StoreError| HandlerErr::from(e).code;
        assert_eq!(
            code(StoreError::NotFound {
                table: Table::Students,
                id: "x".into()
            }),
            "not_found"
        );
        assert_eq!(code(StoreError::remote("down")), "remote_failure");
        assert_eq!(
            code(StoreError::Conflict {
                table: Table::Attendance,
                key: "k".into()
            }),
            "conflict"
        );
        assert_eq!(
            code(StoreError::Timeout {
                what: "k".into(),
                waited_ms: 5
            }),
            "timeout"
        );
        assert_eq!(
            HandlerErr::from(GradeError::NonPositiveMax(0.0)).code,
            "invalid_grade_scale"
        );
    }
}
