use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::Utc;
use stackbroker_core::{
    BrokerError,
    cloud::FakeCloud,
    overrides::EnvOverrides,
    store::{DataStore, MemoryStore},
    templates::{MemoryTemplates, TemplateListing, TemplateRepository},
};
use stackbroker_model::AccountScope;
use stackbroker_server::{
    AppState,
    infra::{
        bootstrap::{self, Backends},
        config::{ConfigLoader, sources::EnvConfig},
        startup::{ProdStartupHooks, StartupHooks},
    },
};

mod common;

struct MissingBucket;

#[async_trait]
impl TemplateRepository for MissingBucket {
    async fn list_templates(&self) -> stackbroker_core::Result<Vec<TemplateListing>> {
        Err(BrokerError::BucketInaccessible)
    }

    async fn get_template(&self, name: &str) -> stackbroker_core::Result<Vec<u8>> {
        Err(BrokerError::Template(format!("template {name} not found")))
    }
}

fn state_with(templates: Arc<dyn TemplateRepository>) -> (AppState, Arc<MemoryStore>) {
    let file = tempfile::NamedTempFile::new().unwrap();
    let env = EnvConfig {
        broker_id: Some(common::BROKER_ID.into()),
        ..EnvConfig::default()
    };
    let config = ConfigLoader::new()
        .with_config_path(file.path())
        .load_with_env(env)
        .unwrap()
        .config;

    let scope = AccountScope::new(common::ACCOUNT_ID, common::BROKER_ID).unwrap();
    let store = Arc::new(MemoryStore::new(scope));
    let state = bootstrap::assemble(
        &config,
        Backends {
            scope,
            store: Arc::clone(&store) as Arc<dyn DataStore>,
            cloud: Arc::new(FakeCloud::new()),
            templates,
            overrides: Arc::new(EnvOverrides::default()),
        },
    );
    (state, store)
}

#[tokio::test]
async fn startup_publishes_the_catalog_before_serving() {
    let templates = Arc::new(MemoryTemplates::new());
    templates.put("s3", Utc::now(), common::S3_TEMPLATE);
    let (state, store) = state_with(templates);

    ProdStartupHooks::new(Duration::from_secs(600))
        .run(&state)
        .await
        .expect("startup should succeed");

    let catalog = state.catalog.catalog();
    assert_eq!(catalog.len(), 1);
    assert_eq!(catalog[0].name, "s3");
    assert!(
        store.get_param("catalogLastSync").await.unwrap().is_some(),
        "sync time should be recorded"
    );
}

#[tokio::test]
async fn unreadable_bucket_is_fatal_at_startup() {
    let (state, _) = state_with(Arc::new(MissingBucket));

    let err = ProdStartupHooks::new(Duration::from_secs(600))
        .run(&state)
        .await
        .expect_err("startup must fail");
    let chain = format!("{err:#}");
    assert!(chain.contains("cannot read the template bucket"), "{chain}");
    assert!(chain.contains("Cannot access S3 Bucket"), "{chain}");
    assert!(state.catalog.catalog().is_empty());
}

#[tokio::test(start_paused = true)]
async fn poller_picks_up_new_templates() {
    let templates = Arc::new(MemoryTemplates::new());
    templates.put("s3", Utc::now(), common::S3_TEMPLATE);
    let (state, _) = state_with(Arc::clone(&templates) as Arc<dyn TemplateRepository>);

    ProdStartupHooks::new(Duration::from_secs(60))
        .run(&state)
        .await
        .unwrap();
    assert_eq!(state.catalog.catalog().len(), 1);

    templates.put(
        "s3copy",
        Utc::now(),
        common::S3_TEMPLATE.replace("Name: s3", "Name: s3copy"),
    );
    tokio::time::sleep(Duration::from_secs(61)).await;
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }

    let names: Vec<String> = state.catalog.catalog().into_iter().map(|s| s.name).collect();
    assert_eq!(names.len(), 2, "{names:?}");
}
