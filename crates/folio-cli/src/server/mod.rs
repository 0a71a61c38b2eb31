//! `folio serve`: the HTTP surface for admins, external parties and the
//! payment gateway.

mod error;
mod handlers;
mod router;
mod state;

use std::net::SocketAddr;

use folio_engine::Desk;
use tokio::net::TcpListener;

use router::create_router;
use state::AppState;

pub async fn serve(desk: Desk, listen: SocketAddr, admin_token: &str) -> anyhow::Result<()> {
    let app = create_router(AppState::new(desk, admin_token));
    let listener = TcpListener::bind(listen).await?;
    tracing::info!(%listen, "folio listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("folio shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "could not listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "could not listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received Ctrl+C, shutting down"),
        _ = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
}
