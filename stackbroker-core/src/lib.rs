//! # Stackbroker Core
//!
//! Engine of the stackbroker Open Service Broker: every catalog service is a
//! stack template, every service instance is a running stack, and every
//! binding is a set of credentials mapped from the stack's outputs.
//!
//! ## Overview
//!
//! - **Catalog**: templates are listed from a [`templates::TemplateRepository`],
//!   converted by the [`catalog::CatalogBuilder`] and kept current by the
//!   [`sync::CatalogSynchronizer`]
//! - **Overrides**: operator-supplied parameter values resolved per broker,
//!   cluster, namespace and service by the [`overrides::OverrideEngine`]
//! - **State machine**: provision, update, deprovision, last operation, bind
//!   and unbind on the [`broker::Broker`]
//! - **Persistence**: the [`store::DataStore`] trait with in-memory and Redis
//!   backends
//! - **Cloud**: capability traits in [`cloud`] with AWS SDK adapters and an
//!   in-process fake
//!
//! ## Feature Flags
//!
//! - `aws` (default): AWS SDK clients and the S3 template repository
//!
//! ## Examples
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use stackbroker_core::{
//!     broker::{Broker, BrokerOptions, LastOperationRequest, TemplateSource},
//!     cloud::FakeCloud,
//!     overrides::{EnvOverrides, OverrideEngine},
//!     store::MemoryStore,
//! };
//! use stackbroker_model::AccountScope;
//!
//! async fn poll(instance_id: &str) -> Result<(), Box<dyn std::error::Error>> {
//!     let scope = AccountScope::new("123456789012", "aws-service-broker")?;
//!     let overrides = OverrideEngine::new(
//!         "aws-service-broker",
//!         Arc::new(EnvOverrides::from_env()),
//!         false,
//!     );
//!     let broker = Broker::new(
//!         Arc::new(MemoryStore::new(scope)),
//!         Arc::new(FakeCloud::new()),
//!         overrides,
//!         BrokerOptions {
//!             broker_id: "aws-service-broker".into(),
//!             templates: TemplateSource {
//!                 bucket: "awsservicebroker".into(),
//!                 region: "us-east-1".into(),
//!                 key: "templates/latest/".into(),
//!                 filter: "-main.yaml".into(),
//!             },
//!         },
//!     );
//!
//!     let status = broker
//!         .last_operation(&LastOperationRequest {
//!             instance_id: instance_id.to_string(),
//!             originating_platform: None,
//!         })
//!         .await?;
//!     println!("{instance_id}: {:?}", status.state);
//!     Ok(())
//! }
//! ```

#![allow(missing_docs)]

/// Provisioning state machine and stack conventions
pub mod broker;

/// Template to catalog service conversion
pub mod catalog;

/// Cloud capability traits and implementations
pub mod cloud;

/// Stack output to binding credential mapping
pub mod credentials;

/// Error types and HTTP status mapping
pub mod error;

/// Scoped parameter overrides
pub mod overrides;

/// Record persistence and named locks
pub mod store;

/// Periodic catalog reconciliation
pub mod sync;

/// Template repositories
pub mod templates;

pub use broker::{Broker, BrokerOptions};
pub use error::{BrokerError, Result};
pub use sync::CatalogSynchronizer;
