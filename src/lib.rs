// OCP bastion helper library
// Public modules are exported for the integration tests

pub mod config;
pub mod error;
pub mod handlers;
pub mod models;
pub mod services;
pub mod validation;

use anyhow::{Context, Result};
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

// Main exported types
pub use config::Config;
pub use error::AppError;

use handlers::{
    action_handler, cluster_handler, config_handler, health_handler, mirror_handler, release_handler,
    ssh_key_handler, upload_handler,
};
use models::{ClusterRecord, MirrorRegistryConfig};
use services::{
    ActionDispatcher, CommandRunner, ConfigGenerator, JsonStore, MirrorService, PrivilegedWriter,
    ReleaseService, SshKeyService, TemplateRenderer,
};

const MAX_UPLOAD_BYTES: usize = 32 * 1024 * 1024;

// Application state shared by every handler
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub runner: Arc<dyn CommandRunner>,
    pub cluster_store: JsonStore<ClusterRecord>,
    pub mirror_store: JsonStore<MirrorRegistryConfig>,
    pub dispatcher: ActionDispatcher,
    pub ssh_keys: SshKeyService,
    pub releases: ReleaseService,
    pub mirror: MirrorService,
    pub generator: ConfigGenerator,
}

impl AppState {
    /// Wires every service against `runner`; tests pass a recording runner here.
    pub fn new(config: Config, runner: Arc<dyn CommandRunner>) -> Result<Self> {
        let renderer = match &config.templates_dir {
            Some(dir) => TemplateRenderer::with_overrides(dir),
            None => TemplateRenderer::from_embedded(),
        };
        let renderer = Arc::new(renderer.context("Failed to load templates")?);

        let http = reqwest::Client::builder()
            .user_agent(concat!("ocp-bastion-helper/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to build HTTP client")?;

        let config = Arc::new(config);
        let cluster_store = JsonStore::new(config.cluster_info_path());
        let mirror_store = JsonStore::new(config.mirror_registry_path());
        let writer = PrivilegedWriter::new(
            runner.clone(),
            config.staging_dir(),
            config.file_owner.clone(),
            config.selinux_relabel,
        );
        let releases = ReleaseService::new(&config, runner.clone(), http);
        let dispatcher = ActionDispatcher::new(
            config.clone(),
            runner.clone(),
            writer,
            renderer.clone(),
            cluster_store.clone(),
            mirror_store.clone(),
            releases.clone(),
        );

        Ok(Self {
            ssh_keys: SshKeyService::new(runner.clone(), config.key_dir.clone()),
            mirror: MirrorService::new(&config, runner.clone(), renderer.clone()),
            generator: ConfigGenerator::new(renderer, config.create_config_dir.clone()),
            config,
            runner,
            cluster_store,
            mirror_store,
            dispatcher,
            releases,
        })
    }
}

/// Every route of the service, with tracing and permissive CORS.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler::health_check))
        // Cluster data
        .route("/upload", post(upload_handler::upload_workbook))
        .route("/upload-nodes", post(upload_handler::upload_nodes))
        .route("/upload-csv", post(upload_handler::upload_csv))
        .route("/api/load-cluster-info", get(cluster_handler::load_cluster_info))
        // Mirror registry
        .route("/configure-mirror", post(mirror_handler::configure_mirror))
        .route("/api/load-mirror-secret", get(mirror_handler::load_mirror_secret))
        .route("/api/mirror-pull-secret", get(mirror_handler::mirror_pull_secret))
        .route("/api/get-mirror-ca", get(mirror_handler::get_mirror_ca))
        .route("/api/apply-pull-secret", post(mirror_handler::apply_pull_secret))
        .route("/api/list-operators", post(mirror_handler::list_operators))
        .route("/api/generate-imageset", post(mirror_handler::generate_imageset))
        .route("/api/run-mirror", post(mirror_handler::run_mirror))
        // SSH keys and generated configs
        .route("/generate-ssh-key", post(ssh_key_handler::generate_ssh_key))
        .route("/api/get-ssh-key/:key_name", get(ssh_key_handler::get_ssh_key))
        .route("/generate-install-config", post(config_handler::generate_install_config))
        .route("/generate-agent-config", post(config_handler::generate_agent_config))
        // Installer tooling
        .route("/api/get-ocp-versions", get(release_handler::get_ocp_versions))
        .route("/api/execute-command", post(release_handler::execute_command))
        // Bastion actions
        .route("/api/configure", post(action_handler::execute_action))
        .route("/api/execute-action", post(action_handler::execute_action))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(
                    CorsLayer::new()
                        .allow_origin(Any)
                        .allow_methods(Any)
                        .allow_headers(Any),
                ),
        )
        .with_state(state)
}
