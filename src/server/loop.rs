// Server loop module
// Accepts connections until the shutdown future resolves

use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;

use super::connection::accept_connection;
use crate::config;
use crate::logger;

/// Accept connections on `listener` until `shutdown` completes.
///
/// The listener is dropped (closing the socket) before returning the
/// shutdown reason. Connections already being served keep their own tasks.
pub async fn start_server_loop<F>(
    listener: TcpListener,
    state: Arc<config::AppState>,
    shutdown: F,
) -> &'static str
where
    F: Future<Output = &'static str>,
{
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            accept_result = listener.accept() => {
                match accept_result {
                    Ok((stream, peer_addr)) => accept_connection(stream, peer_addr, &state),
                    Err(e) => logger::log_error(&format!("Failed to accept connection: {e}")),
                }
            }

            reason = &mut shutdown => {
                drop(listener);
                return reason;
            }
        }
    }
}
