#![allow(dead_code)]

use std::sync::Arc;

use axum::http::{HeaderName, HeaderValue};
use axum_test::{TestRequest, TestServer};
use base64::{Engine, engine::general_purpose::STANDARD};
use chrono::{TimeZone, Utc};
use stackbroker_core::{
    cloud::{FakeCloud, StackOutput},
    overrides::EnvOverrides,
    store::{DataStore, MemoryStore},
    templates::{MemoryTemplates, TemplateRepository},
};
use stackbroker_model::AccountScope;
use stackbroker_server::{
    AppState, create_app,
    infra::{
        bootstrap::{self, Backends},
        config::{AuthConfig, Config, ConfigLoader, sources::EnvConfig},
    },
};

pub const ACCOUNT_ID: &str = "123456789012";
pub const BROKER_ID: &str = "brokerA";
pub const USERNAME: &str = "platform";
pub const PASSWORD: &str = "s3cret";

pub const S3_TEMPLATE: &str = r#"
Description: "Amazon S3 bucket (qs-1nt0fs937)"
Parameters:
  BucketName:
    Type: String
  req_param:
    Type: String
  Size:
    Type: Number
    Default: 20
Metadata:
  AWS::ServiceBroker::Specification:
    Name: s3
    Bindable: true
    UpdatableParameters: [Size]
    ServicePlans:
      default:
        Description: Bucket with defaults
"#;

pub struct TestApp {
    pub server: TestServer,
    pub state: AppState,
    pub cloud: FakeCloud,
    pub store: Arc<MemoryStore>,
    pub templates: Arc<MemoryTemplates>,
    pub scope: AccountScope,
}

impl TestApp {
    pub fn service_id(&self) -> String {
        self.scope.service_id("s3")
    }

    pub fn plan_id(&self) -> String {
        self.scope.plan_id("s3", "default")
    }
}

pub struct TestOptions<'a> {
    pub auth: Option<(&'a str, &'a str)>,
    pub overrides: &'a [(&'a str, &'a str)],
    pub prescribe: bool,
    pub outputs: Vec<StackOutput>,
}

impl Default for TestOptions<'_> {
    fn default() -> Self {
        Self {
            auth: None,
            overrides: &[],
            prescribe: false,
            outputs: Vec::new(),
        }
    }
}

fn test_config(options: &TestOptions<'_>) -> Config {
    let file = tempfile::NamedTempFile::new().expect("temp config file");
    let env = EnvConfig {
        broker_id: Some(BROKER_ID.to_string()),
        account_id: Some(ACCOUNT_ID.to_string()),
        prescribe_overrides: Some(options.prescribe),
        ..EnvConfig::default()
    };
    let mut config = ConfigLoader::new()
        .with_config_path(file.path())
        .load_with_env(env)
        .expect("test config should load")
        .config;
    config.auth = match options.auth {
        Some((user, pass)) => AuthConfig::new(user, pass),
        None => AuthConfig::default(),
    };
    config
}

/// Builds the app over in-memory backends and runs one catalog sync.
pub async fn spawn_app(options: TestOptions<'_>) -> TestApp {
    let config = test_config(&options);
    let scope = AccountScope::new(ACCOUNT_ID, BROKER_ID).unwrap();
    let store = Arc::new(MemoryStore::new(scope));
    let cloud = FakeCloud::new().with_outputs(options.outputs);
    let templates = Arc::new(MemoryTemplates::new());
    templates.put(
        "s3",
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
        S3_TEMPLATE,
    );

    let backends = Backends {
        scope,
        store: Arc::clone(&store) as Arc<dyn DataStore>,
        cloud: Arc::new(cloud.clone()),
        templates: Arc::clone(&templates) as Arc<dyn TemplateRepository>,
        overrides: Arc::new(EnvOverrides::from_vars(
            options.overrides.iter().map(|(k, v)| (*k, *v)),
        )),
    };
    let state = bootstrap::assemble(&config, backends);
    state
        .catalog
        .sync_once()
        .await
        .expect("initial sync should succeed");

    let server = TestServer::new(create_app(state.clone())).expect("test server should start");

    TestApp {
        server,
        state,
        cloud,
        store,
        templates,
        scope,
    }
}

pub fn api_version(request: TestRequest) -> TestRequest {
    request.add_header(
        HeaderName::from_static("x-broker-api-version"),
        HeaderValue::from_static("2.13"),
    )
}

pub fn basic_auth(request: TestRequest, user: &str, pass: &str) -> TestRequest {
    let encoded = STANDARD.encode(format!("{user}:{pass}"));
    request.add_header(
        HeaderName::from_static("authorization"),
        HeaderValue::from_str(&format!("Basic {encoded}")).unwrap(),
    )
}
