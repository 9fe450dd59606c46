//! Shared utilities for integration tests: a seeded gate on an ephemeral port.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use camp_gate::config::GateConfig;
use camp_gate::pipeline::Collaborators;
use camp_gate::tenancy::{Membership, MemoryDirectory, Role, Tenant, TenantId, User, UserId};
use camp_gate::{GateServer, Shutdown};

pub const PASSWORD: &str = "s3cret-pass";

/// alpha (1) and bravo (2) are owned by user 1; charlie (3) is owned by
/// user 1 and only reachable from 10.0.0.0/24. User 2 edits bravo.
pub fn seeded_directory() -> Arc<MemoryDirectory> {
    let hash = bcrypt::hash(PASSWORD, 4).unwrap();
    let dir = Arc::new(MemoryDirectory::new());
    for (id, email) in [(1, "owner@example.org"), (2, "editor@example.org")] {
        dir.insert_user(User {
            id: UserId(id),
            email: email.into(),
            password_hash: hash.clone(),
            is_global_admin: false,
        });
    }
    for (id, sub, allowed) in [(1, "alpha", vec![]), (2, "bravo", vec![]), (3, "charlie", vec!["10.0.0.0/24".to_string()])] {
        dir.insert_tenant(Tenant {
            id: TenantId(id),
            subdomain: sub.into(),
            custom_domain: None,
            owner_user_id: UserId(1),
            allowed_ips: allowed,
        })
        .unwrap();
    }
    dir.upsert_membership(Membership {
        tenant_id: TenantId(2),
        user_id: UserId(2),
        role: Role::Editor,
    });
    dir
}

pub fn base_config() -> GateConfig {
    let mut config = GateConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.tenancy.base_domain = "example.org".into();
    config.session.secret = Some("integration-secret".into());
    config
}

pub struct TestGate {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
    pub config_tx: mpsc::UnboundedSender<GateConfig>,
    pub handle: JoinHandle<Result<(), std::io::Error>>,
    pub client: reqwest::Client,
}

impl TestGate {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

pub async fn start_gate(config: GateConfig, directory: Arc<MemoryDirectory>) -> TestGate {
    let server = GateServer::new(config, Collaborators::from_memory(directory)).unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let (config_tx, config_updates) = mpsc::unbounded_channel();
    let server_shutdown = shutdown.subscribe();
    let handle = tokio::spawn(async move { server.run(listener, config_updates, server_shutdown).await });

    // Give the accept loop a moment to start.
    tokio::time::sleep(Duration::from_millis(50)).await;

    TestGate {
        addr,
        shutdown,
        config_tx,
        handle,
        client: reqwest::Client::new(),
    }
}

/// Value of the cookie `name` among a response's `Set-Cookie` headers.
pub fn set_cookie_value(res: &reqwest::Response, name: &str) -> Option<String> {
    res.headers()
        .get_all(reqwest::header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(|v| v.split(';').next())
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.to_string())
}
