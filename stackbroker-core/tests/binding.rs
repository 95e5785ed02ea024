mod common;

use common::{Harness, harness, object};
use serde_json::json;
use stackbroker_core::{
    broker::{BindRequest, ProvisionRequest, UnbindRequest},
    cloud::{PolicyManager, StackOutput, fake::FakeOp},
    store::DataStore,
};

const READ_POLICY: &str = "arn:aws:iam::123456789012:policy/bucket-read";

fn bucket_outputs() -> Vec<StackOutput> {
    vec![
        StackOutput::new("BucketName", "b"),
        StackOutput::new("BucketAccessKeyId", "ssm:/p/k"),
        StackOutput::new("BucketSecretAccessKey", "ssm:/p/s"),
        StackOutput::new("PolicyArnReadOnly", READ_POLICY),
    ]
}

async fn bucket_harness() -> Harness {
    let h = harness(&[], bucket_outputs()).await;
    h.cloud.set_secret("/p/k", "A");
    h.cloud.set_secret("/p/s", "B");
    provision(&h, "s3", "i-1", json!({"BucketName": "b", "req_param": "r"})).await;
    h
}

async fn provision(h: &Harness, service: &str, instance_id: &str, params: serde_json::Value) {
    h.broker
        .provision(&ProvisionRequest {
            instance_id: instance_id.into(),
            service_id: h.service_id(service),
            plan_id: h.plan_id(service, "default"),
            parameters: object(params),
            accepts_incomplete: true,
            ..ProvisionRequest::default()
        })
        .await
        .expect("provision should be accepted");
}

fn bind_request(h: &Harness, service: &str, binding_id: &str, params: serde_json::Value) -> BindRequest {
    BindRequest {
        instance_id: "i-1".into(),
        binding_id: binding_id.into(),
        service_id: h.service_id(service),
        parameters: object(params),
    }
}

fn unbind_request(h: &Harness, service: &str, binding_id: &str) -> UnbindRequest {
    UnbindRequest {
        instance_id: "i-1".into(),
        binding_id: binding_id.into(),
        service_id: h.service_id(service),
    }
}

#[tokio::test]
async fn bind_maps_outputs_and_resolves_secrets() {
    let h = bucket_harness().await;
    let outcome = h.broker.bind(&bind_request(&h, "s3", "b-1", json!({}))).await.unwrap();

    assert!(!outcome.exists);
    assert_eq!(
        serde_json::Value::Object(outcome.credentials),
        json!({
            "BUCKET_NAME": "b",
            "BUCKET_ACCESS_KEY_ID": "A",
            "BUCKET_SECRET_ACCESS_KEY": "B",
        })
    );
    let stored = h.store.get_service_binding("b-1").await.unwrap().unwrap();
    assert_eq!(stored.instance_id, "i-1");
    assert!(stored.policy_arn.is_none());
}

#[tokio::test]
async fn bind_with_role_attaches_scoped_policy() {
    let h = bucket_harness().await;
    let request = bind_request(&h, "s3", "b-1", json!({"rolename": "app-role", "SCOPE": "ReadOnly"}));
    h.broker.bind(&request).await.unwrap();

    assert!(h.cloud.is_attached("app-role", READ_POLICY));
    let stored = h.store.get_service_binding("b-1").await.unwrap().unwrap();
    assert_eq!(stored.policy_arn.as_deref(), Some(READ_POLICY));
    assert_eq!(stored.role_name.as_deref(), Some("app-role"));
}

#[tokio::test]
async fn repeated_bind_recomputes_credentials() {
    let h = bucket_harness().await;
    let request = bind_request(&h, "s3", "b-1", json!({"RoleName": "app-role", "Scope": "ReadOnly"}));
    h.broker.bind(&request).await.unwrap();

    h.cloud.set_secret("/p/s", "rotated");
    let again = h.broker.bind(&request).await.unwrap();
    assert!(again.exists);
    assert_eq!(again.credentials["BUCKET_SECRET_ACCESS_KEY"], "rotated");
    assert_eq!(h.cloud.calls(FakeOp::AttachRolePolicy), 1, "policy attached once");
}

#[tokio::test]
async fn bind_conflicts_on_different_attributes() {
    let h = bucket_harness().await;
    h.broker
        .bind(&bind_request(&h, "s3", "b-1", json!({"RoleName": "app-role", "Scope": "ReadOnly"})))
        .await
        .unwrap();

    let err = h
        .broker
        .bind(&bind_request(&h, "s3", "b-1", json!({"RoleName": "other-role", "Scope": "ReadOnly"})))
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), 409);
    assert_eq!(
        err.to_string(),
        "Service binding b-1 already exists but with different attributes."
    );
}

#[tokio::test]
async fn bind_rejects_unsupported_params_and_scopes() {
    let h = bucket_harness().await;

    let err = h
        .broker
        .bind(&bind_request(&h, "s3", "b-1", json!({"Color": "blue"})))
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), 400);
    assert_eq!(err.to_string(), "The parameter Color is not supported.");

    let err = h
        .broker
        .bind(&bind_request(&h, "s3", "b-1", json!({"RoleName": "app-role", "Scope": "Full"})))
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), 400);
    assert!(
        err.to_string()
            .ends_with("does not support binding with scope 'Full': output not found: PolicyArnFull"),
        "{err}"
    );
    assert!(h.store.get_service_binding("b-1").await.unwrap().is_none());
}

#[tokio::test]
async fn bind_to_unknown_instance_is_a_client_error() {
    let h = bucket_harness().await;
    let mut request = bind_request(&h, "s3", "b-1", json!({}));
    request.instance_id = "i-missing".into();
    let err = h.broker.bind(&request).await.unwrap_err();
    assert_eq!(err.status_code(), 400);
    assert_eq!(err.to_string(), "The service instance i-missing was not found.");
}

#[tokio::test]
async fn unresolvable_secret_fails_bind() {
    let h = harness(&[], vec![StackOutput::new("Password", "ssm:/missing")]).await;
    provision(&h, "s3", "i-1", json!({"BucketName": "b", "req_param": "r"})).await;

    let err = h.broker.bind(&bind_request(&h, "s3", "b-1", json!({}))).await.unwrap_err();
    assert_eq!(err.status_code(), 500);
    assert!(err.to_string().starts_with("Failed to get the credentials from CloudFormation stack"));
    assert!(err.to_string().ends_with("invalid parameters: [/missing]"), "{err}");
}

#[tokio::test]
async fn unbind_detaches_policy_and_deletes_binding() {
    let h = bucket_harness().await;
    h.broker
        .bind(&bind_request(&h, "s3", "b-1", json!({"RoleName": "app-role", "Scope": "ReadOnly"})))
        .await
        .unwrap();

    h.broker.unbind(&unbind_request(&h, "s3", "b-1")).await.unwrap();
    assert!(!h.cloud.is_attached("app-role", READ_POLICY));
    assert!(h.store.get_service_binding("b-1").await.unwrap().is_none());

    let err = h.broker.unbind(&unbind_request(&h, "s3", "b-1")).await.unwrap_err();
    assert_eq!(err.status_code(), 410);
    assert_eq!(err.to_string(), "The service binding b-1 was not found.");
}

#[tokio::test]
async fn unbind_tolerates_already_detached_policy() {
    let h = bucket_harness().await;
    h.broker
        .bind(&bind_request(&h, "s3", "b-1", json!({"RoleName": "app-role", "Scope": "ReadOnly"})))
        .await
        .unwrap();
    h.cloud
        .detach_role_policy("app-role", READ_POLICY)
        .await
        .unwrap();

    h.broker.unbind(&unbind_request(&h, "s3", "b-1")).await.unwrap();
    assert!(h.store.get_service_binding("b-1").await.unwrap().is_none());
}

#[tokio::test]
async fn unbind_surfaces_other_detach_failures() {
    let h = bucket_harness().await;
    h.broker
        .bind(&bind_request(&h, "s3", "b-1", json!({"RoleName": "app-role", "Scope": "ReadOnly"})))
        .await
        .unwrap();
    h.cloud.fail_next(FakeOp::DetachRolePolicy);

    let err = h.broker.unbind(&unbind_request(&h, "s3", "b-1")).await.unwrap_err();
    assert_eq!(err.status_code(), 500);
    assert!(err.to_string().starts_with(&format!(
        "Failed to detach the policy {READ_POLICY} from role app-role"
    )));
    assert!(h.store.get_service_binding("b-1").await.unwrap().is_some(), "binding kept");
}

async fn lambda_harness() -> Harness {
    let h = harness(&[], vec![StackOutput::new("BindLambda", "arn:aws:lambda:us-east-1:1:function:bind")]).await;
    provision(&h, "iamuser", "i-1", json!({})).await;
    h
}

#[tokio::test]
async fn bind_via_function_replaces_credentials() {
    let h = lambda_harness().await;
    h.cloud
        .set_delegate_response(object(json!({"USERNAME": "u-1", "PASSWORD": "p"})));

    let outcome = h
        .broker
        .bind(&bind_request(&h, "iamuser", "b-1", json!({})))
        .await
        .unwrap();
    assert_eq!(serde_json::Value::Object(outcome.credentials), json!({"USERNAME": "u-1", "PASSWORD": "p"}));

    let calls = h.cloud.delegate_calls();
    assert_eq!(calls.len(), 1);
    let (function, payload) = &calls[0];
    assert_eq!(function, "arn:aws:lambda:us-east-1:1:function:bind");
    assert_eq!(payload["RequestType"], "bind");
    assert_eq!(payload["INSTANCE_ID"], "i-1");
    assert_eq!(payload["BINDING_ID"], "b-1");
    assert_eq!(payload["BIND_LAMBDA"], "arn:aws:lambda:us-east-1:1:function:bind");
}

#[tokio::test]
async fn unbind_via_function_runs_before_delete() {
    let h = lambda_harness().await;
    h.broker
        .bind(&bind_request(&h, "iamuser", "b-1", json!({})))
        .await
        .unwrap();

    h.broker.unbind(&unbind_request(&h, "iamuser", "b-1")).await.unwrap();
    let calls = h.cloud.delegate_calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[1].1["RequestType"], "unbind");
    assert_eq!(calls[1].1["BINDING_ID"], "b-1");
    assert!(h.store.get_service_binding("b-1").await.unwrap().is_none());
}

#[tokio::test]
async fn function_errors_fail_bind_and_unbind() {
    let h = lambda_harness().await;
    h.broker
        .bind(&bind_request(&h, "iamuser", "b-1", json!({})))
        .await
        .unwrap();

    h.cloud.set_delegate_response(object(json!({
        "errorType": "ValueError",
        "errorMessage": "boom",
    })));
    let err = h
        .broker
        .bind(&bind_request(&h, "iamuser", "b-2", json!({})))
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), 500);
    assert_eq!(err.to_string(), "error in lambda function building binding: ValueError boom");
    assert!(h.store.get_service_binding("b-2").await.unwrap().is_none());

    let err = h.broker.unbind(&unbind_request(&h, "iamuser", "b-1")).await.unwrap_err();
    assert_eq!(
        err.to_string(),
        "Error running lambda function for unbind from: error in lambda function building binding: ValueError boom"
    );
    assert!(h.store.get_service_binding("b-1").await.unwrap().is_some());
}
