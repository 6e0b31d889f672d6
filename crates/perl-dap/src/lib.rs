//! Debug Adapter Protocol server for Perl, speaking Content-Length framed
//! JSON over stdio and driving `perl -d` through [`perl_dbg`].

pub mod handles;
pub mod protocol;
pub mod server;
pub mod transport;

pub async fn run_server() {
    tracing::info!("perl DAP server starting on stdio");
    server::run().await;
}
