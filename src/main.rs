use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;

use thiserror::Error;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::notify::{HttpNotifier, Notifier};
use crate::realtime::gateway::Gateway;
use crate::realtime::registry::RoomRegistry;
use crate::sla::SlaMonitor;
use crate::store::pg::{db_pool, PgTicketStore, PgUserDirectory};
use crate::store::{TicketStore, UserDirectory};

mod constants;
mod notify;
mod realtime;
mod server;
mod sla;
mod store;
mod util;

#[derive(Debug, Error)]
enum RunnerErr {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Env(#[from] util::env::EnvError),

    #[error(transparent)]
    Store(#[from] store::StoreError),
}

type Result<T> = core::result::Result<T, RunnerErr>;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let env = util::env::env().await?;
    let pool = db_pool().await?;

    let tickets: Arc<dyn TicketStore> = Arc::new(PgTicketStore::new(pool));
    let users: Arc<dyn UserDirectory> = Arc::new(PgUserDirectory::new(pool));
    let notifier: Arc<dyn Notifier> = Arc::new(HttpNotifier::new(
        &env.mail_relay_url,
        &env.mail_sender,
    ));

    let gateway = Gateway::new(RoomRegistry::new(), tickets.clone(), users.clone());
    let monitor = SlaMonitor::new(tickets, users, notifier, env.sla_scan_interval);
    let monitor_handle = monitor.spawn();

    let app = server::router(gateway, &env.cors_allow_origins);
    let bind_addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), env.server_port);
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;

    tracing::info!(addr = %bind_addr, "helpdesk realtime server listening");
    axum::serve(listener, app).await?;

    monitor_handle.abort();
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("helpdesk_relay=debug,tower_http=debug,sqlx=info,info")
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_line_number(true),
        )
        .init();
}
