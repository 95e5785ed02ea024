//! Credentials derived by a function named in the stack outputs.

use std::fmt;

use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use super::{Credentials, screaming_snake_case};
use crate::{cloud::CredentialDelegate, error::BrokerError};

const BIND_FUNCTION_OUTPUT: &str = "BindLambda";
const REQUEST_TYPE_KEY: &str = "RequestType";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindRequestType {
    Bind,
    Unbind,
}

impl fmt::Display for BindRequestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BindRequestType::Bind => "bind",
            BindRequestType::Unbind => "unbind",
        })
    }
}

#[derive(Debug, Error)]
pub enum DelegateError {
    #[error(
        "the template metadata has BindViaLambda set to true, but no BindLambda is defined in template output"
    )]
    MissingFunction,

    #[error("non string value for BindLambda in the cloudformation template")]
    NonStringFunction,

    #[error(
        "the template metadata has BindViaLambda set to true, but the BindLambda output from cloudformation is an empty string"
    )]
    EmptyFunction,

    #[error("{0}")]
    Invoke(#[from] BrokerError),

    /// The function ran and reported its own failure.
    #[error("error in lambda function building binding: {kind} {message}")]
    Function { kind: String, message: String },
}

/// Runs the bind function against `credentials` and returns its response.
///
/// The function name is read from the `BindLambda` output (or its
/// screaming-snake form), and the request type is added to the payload.
pub async fn invoke_bind_function(
    delegate: &dyn CredentialDelegate,
    mut credentials: Credentials,
    request_type: BindRequestType,
) -> Result<Credentials, DelegateError> {
    let function = credentials
        .get(BIND_FUNCTION_OUTPUT)
        .or_else(|| credentials.get(&screaming_snake_case(BIND_FUNCTION_OUTPUT)))
        .ok_or(DelegateError::MissingFunction)?;
    let function = match function {
        Value::String(name) if name.is_empty() => return Err(DelegateError::EmptyFunction),
        Value::String(name) => name.clone(),
        _ => return Err(DelegateError::NonStringFunction),
    };

    credentials.insert(
        REQUEST_TYPE_KEY.to_string(),
        Value::String(request_type.to_string()),
    );
    debug!(function = %function, request_type = %request_type, "invoking bind function");
    let response = delegate.invoke(&function, &credentials).await?;

    if let Some(message) = response.get("errorMessage") {
        return Err(DelegateError::Function {
            kind: display(response.get("errorType")),
            message: display(Some(message)),
        });
    }
    Ok(response)
}

fn display(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => "<nil>".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cloud::FakeCloud;
    use serde_json::json;

    fn creds(value: Value) -> Credentials {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[tokio::test]
    async fn invokes_named_function_with_request_type() {
        let cloud = FakeCloud::new();
        cloud.set_delegate_response(creds(json!({"USERNAME": "generated"})));

        let out = invoke_bind_function(
            &cloud,
            creds(json!({"BIND_LAMBDA": "arn:aws:lambda:fn", "INSTANCE_ID": "i"})),
            BindRequestType::Bind,
        )
        .await
        .unwrap();

        assert_eq!(out["USERNAME"], "generated");
        let calls = cloud.delegate_calls();
        assert_eq!(calls[0].0, "arn:aws:lambda:fn");
        assert_eq!(calls[0].1["RequestType"], "bind");
        assert_eq!(calls[0].1["INSTANCE_ID"], "i");
    }

    #[tokio::test]
    async fn function_name_problems_are_reported() {
        let cloud = FakeCloud::new();
        let err = invoke_bind_function(&cloud, Credentials::new(), BindRequestType::Bind)
            .await
            .unwrap_err();
        assert!(matches!(err, DelegateError::MissingFunction));

        let err = invoke_bind_function(&cloud, creds(json!({"BindLambda": ""})), BindRequestType::Bind)
            .await
            .unwrap_err();
        assert!(matches!(err, DelegateError::EmptyFunction));

        let err = invoke_bind_function(&cloud, creds(json!({"BindLambda": 7})), BindRequestType::Unbind)
            .await
            .unwrap_err();
        assert!(matches!(err, DelegateError::NonStringFunction));
        assert!(cloud.delegate_calls().is_empty());
    }

    #[tokio::test]
    async fn function_error_payload_becomes_error() {
        let cloud = FakeCloud::new();
        cloud.set_delegate_response(creds(json!({
            "errorType": "KeyError",
            "errorMessage": "'RoleName'",
        })));
        let err = invoke_bind_function(&cloud, creds(json!({"BindLambda": "fn"})), BindRequestType::Unbind)
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "error in lambda function building binding: KeyError 'RoleName'"
        );
    }
}
