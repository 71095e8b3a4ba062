use std::sync::Arc;

use warp::{Filter, Rejection, Reply};

use crate::orchestrator::Orchestrator;

mod ws;

pub use ws::handle_socket;

pub fn routes(
    orchestrator: Arc<Orchestrator>,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path("ws")
        .and(warp::path::end())
        .and(warp::ws())
        .and(with_orchestrator(orchestrator))
        .map(|socket: warp::ws::Ws, orchestrator: Arc<Orchestrator>| {
            socket.on_upgrade(move |websocket| handle_socket(websocket, orchestrator))
        })
}

fn with_orchestrator(
    orchestrator: Arc<Orchestrator>,
) -> impl Filter<Extract = (Arc<Orchestrator>,), Error = std::convert::Infallible> + Clone {
    warp::any().map(move || orchestrator.clone())
}
