#![doc = include_str!("../README.md")]
//!
//! # Module Structure
//!
//! - [`error`]: Domain error types (`ComposeError`)
//! - [`config`]: Lifecycle configuration (`ComposeConfig`, builder)
//! - [`docker`]: Runtime API abstraction (`RuntimeClient` trait, `BollardRuntimeClient`)
//! - [`image`]: Image references and on-demand pulls (`ImageReference`)
//! - [`auth`]: Registry credentials (`CredentialStore`)
//! - [`project`]: Declared services and shared context (`Project`, `Service`)
//! - [`resolver`]: Relationship resolution (`DependencyResolver`, `LinkTable`)
//! - [`container`]: Per-instance lifecycle (`ContainerHandle`)
//! - [`logs`]: Log forwarding (`LogStreamer`, `LogTask`, `LogSink`)
//!
//! # Architecture
//!
//! ```text
//! ContainerHandle::up()
//!        |
//!   create()  --find_by_name--> existing? done
//!        |                      missing image? pull, retry once
//!   DependencyResolver.populate(host_config)
//!        |
//!   RuntimeClient.start()
//!        |
//!   LogStreamer::spawn() --> LogTask (detached)
//! ```

pub mod auth;
pub mod config;
pub mod container;
pub mod docker;
pub mod error;
pub mod image;
pub mod logs;
pub mod project;
pub mod resolver;

// --- Public API Re-exports ---

// Project / lifecycle
pub use container::{ContainerHandle, ContainerState};
pub use project::{Context, Project, ProjectBuilder, Service};

// Configuration
pub use config::{ComposeConfig, ComposeConfigBuilder};

// Error
pub use error::ComposeError;

// Runtime API
pub use docker::{
    BollardRuntimeClient, ContainerSummary, CreateRequest, LogOptions, LogStream, RuntimeClient,
    RuntimeContainer,
};

// Images and credentials
pub use auth::{CredentialStore, RegistryCredential};
pub use image::ImageReference;

// Dependency resolution
pub use resolver::{DependencyResolver, LinkTable, Resolution};

// Logs
pub use logs::{LogSink, LogSinkFactory, LogStreamer, LogTask, PrefixedSinkFactory};
