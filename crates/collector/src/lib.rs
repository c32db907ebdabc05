#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! Score stream collector: receives live progress streams and keeps the latest
//! record per player.

use std::future::Future;

use scorestream_proto::score_service_server::ScoreServiceServer;
use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::Server;

/// Latest progress per player.
pub mod board;
/// gRPC service implementation.
pub mod service;

pub use board::{PlayerRecord, ProgressBoard};
pub use service::ScoreCollector;

/// Serves `collector` on an already bound listener until `shutdown` resolves.
pub async fn serve(
    listener: TcpListener,
    collector: ScoreCollector,
    shutdown: impl Future<Output = ()> + Send,
) -> Result<(), tonic::transport::Error> {
    Server::builder()
        .add_service(ScoreServiceServer::new(collector))
        .serve_with_incoming_shutdown(TcpListenerStream::new(listener), shutdown)
        .await
}
