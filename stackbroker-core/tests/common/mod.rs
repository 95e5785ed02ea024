#![allow(dead_code)]

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use async_trait::async_trait;
use serde_json::{Map, Value};
use stackbroker_core::{
    Broker, BrokerError, BrokerOptions,
    broker::TemplateSource,
    catalog::CatalogBuilder,
    cloud::{FakeCloud, StackOutput},
    overrides::{EnvOverrides, OverrideEngine},
    store::{DataStore, LockWait, MemoryStore},
};
use stackbroker_model::{AccountScope, ServiceBinding, ServiceDefinition, ServiceInstance};

pub const ACCOUNT_ID: &str = "123456789012";
pub const BROKER_ID: &str = "brokerA";

pub const S3_TEMPLATE: &str = r#"
Description: "Amazon S3 bucket (qs-1nt0fs937)"
Parameters:
  BucketName:
    Type: String
    Description: Name of the bucket
  req_param:
    Type: String
  Size:
    Type: Number
    Default: 20
  Versioning:
    Type: String
    Default: Enabled
    AllowedValues: [Enabled, Suspended]
Metadata:
  AWS::ServiceBroker::Specification:
    Name: s3
    Bindable: true
    UpdatableParameters: [Size]
    ServicePlans:
      default:
        Description: Bucket with versioning
      unversioned:
        Description: Bucket without versioning
        ParameterValues:
          Versioning: Suspended
"#;

pub const LAMBDA_TEMPLATE: &str = r#"
Description: Users minted by a function
Parameters:
  Prefix:
    Type: String
    Default: app
Metadata:
  AWS::ServiceBroker::Specification:
    Name: iamuser
    Bindable: true
    BindViaLambda: true
    ServicePlans:
      default:
        Description: default
"#;

/// Memory store whose instance writes can be switched off.
pub struct GatedStore {
    inner: Arc<MemoryStore>,
    refuse_instance_writes: AtomicBool,
}

impl GatedStore {
    pub fn new(inner: Arc<MemoryStore>) -> Self {
        Self {
            inner,
            refuse_instance_writes: AtomicBool::new(false),
        }
    }

    pub fn refuse_instance_writes(&self) {
        self.refuse_instance_writes.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl DataStore for GatedStore {
    async fn put_service_definition(
        &self,
        definition: &ServiceDefinition,
    ) -> stackbroker_core::Result<()> {
        self.inner.put_service_definition(definition).await
    }

    async fn get_service_definition(
        &self,
        id: &str,
    ) -> stackbroker_core::Result<Option<ServiceDefinition>> {
        self.inner.get_service_definition(id).await
    }

    async fn get_service_instance(
        &self,
        id: &str,
    ) -> stackbroker_core::Result<Option<ServiceInstance>> {
        self.inner.get_service_instance(id).await
    }

    async fn put_service_instance(&self, instance: &ServiceInstance) -> stackbroker_core::Result<()> {
        if self.refuse_instance_writes.load(Ordering::SeqCst) {
            return Err(BrokerError::Store("write refused".into()));
        }
        self.inner.put_service_instance(instance).await
    }

    async fn delete_service_instance(&self, id: &str) -> stackbroker_core::Result<()> {
        self.inner.delete_service_instance(id).await
    }

    async fn get_service_binding(
        &self,
        id: &str,
    ) -> stackbroker_core::Result<Option<ServiceBinding>> {
        self.inner.get_service_binding(id).await
    }

    async fn put_service_binding(&self, binding: &ServiceBinding) -> stackbroker_core::Result<()> {
        self.inner.put_service_binding(binding).await
    }

    async fn delete_service_binding(&self, id: &str) -> stackbroker_core::Result<()> {
        self.inner.delete_service_binding(id).await
    }

    async fn get_param(&self, name: &str) -> stackbroker_core::Result<Option<String>> {
        self.inner.get_param(name).await
    }

    async fn put_param(&self, name: &str, value: &str) -> stackbroker_core::Result<()> {
        self.inner.put_param(name, value).await
    }

    async fn lock(&self, name: &str) -> stackbroker_core::Result<bool> {
        self.inner.lock(name).await
    }

    async fn is_locked(&self, name: &str) -> stackbroker_core::Result<bool> {
        self.inner.is_locked(name).await
    }

    async fn unlock(&self, name: &str) -> stackbroker_core::Result<()> {
        self.inner.unlock(name).await
    }

    fn lock_wait(&self) -> LockWait {
        self.inner.lock_wait()
    }
}

pub struct Harness {
    pub broker: Broker,
    pub store: Arc<MemoryStore>,
    pub gate: Arc<GatedStore>,
    pub cloud: FakeCloud,
    pub scope: AccountScope,
}

impl Harness {
    pub fn service_id(&self, name: &str) -> String {
        self.scope.service_id(name)
    }

    pub fn plan_id(&self, service: &str, plan: &str) -> String {
        self.scope.plan_id(service, plan)
    }

    pub async fn service(&self, name: &str) -> ServiceDefinition {
        self.store
            .get_service_definition(&self.service_id(name))
            .await
            .unwrap()
            .expect("service should be registered")
    }
}

pub async fn harness(overrides: &[(&str, &str)], outputs: Vec<StackOutput>) -> Harness {
    let scope = AccountScope::new(ACCOUNT_ID, BROKER_ID).unwrap();
    let store = Arc::new(MemoryStore::new(scope));
    let builder = CatalogBuilder::new(scope, "us-east-1");
    for (name, body) in [("s3", S3_TEMPLATE), ("iamuser", LAMBDA_TEMPLATE)] {
        let definition = builder.build(name, body.as_bytes());
        assert!(!definition.is_blank(), "{name} template should convert");
        store.put_service_definition(&definition).await.unwrap();
    }

    let cloud = FakeCloud::new().with_outputs(outputs);
    let source = EnvOverrides::from_vars(overrides.iter().map(|(k, v)| (*k, *v)));
    let engine = OverrideEngine::new(BROKER_ID, Arc::new(source), false);
    let gate = Arc::new(GatedStore::new(Arc::clone(&store)));
    let broker = Broker::new(
        Arc::clone(&gate) as Arc<dyn DataStore>,
        Arc::new(cloud.clone()),
        engine,
        BrokerOptions {
            broker_id: BROKER_ID.to_string(),
            templates: TemplateSource {
                bucket: "awsservicebroker".into(),
                region: "us-east-1".into(),
                key: "templates/latest/".into(),
                filter: "-main.yaml".into(),
            },
        },
    );

    Harness {
        broker,
        store,
        gate,
        cloud,
        scope,
    }
}

pub fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        other => panic!("expected a JSON object, got {other}"),
    }
}
