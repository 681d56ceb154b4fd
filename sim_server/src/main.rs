//! WebSocket control server for the trajectory tracking simulator.
//!
//! The simulator connects to port 4567 and streams telemetry events. Every
//! event runs one control cycle and is answered with a steer event, held
//! back by the configured actuation delay to mimic the real control loop.

mod messages;
mod protocol;

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
    routing::get,
    Router,
};
use log::{info, warn};
use tokio::time::sleep;

use controller::{Config, TrackingController};

use crate::messages::{Steer, Telemetry};
use crate::protocol::Event;

#[tokio::main]
async fn main() {
    env_logger::init();

    let config = Arc::new(Config::load());
    let addr = format!("0.0.0.0:{}", config.server.port);
    info!("waiting for the simulator on ws://{}", addr);

    let app = Router::new()
        .route("/", get(ws_handler))
        .with_state(config);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("unable to bind the server port");
    axum::serve(listener, app).await.expect("server failed");
}

async fn ws_handler(ws: WebSocketUpgrade, State(config): State<Arc<Config>>) -> Response {
    ws.on_upgrade(move |socket| handle_connection(socket, config))
}

/// Drives one simulator session. The controller lives as long as the
/// connection so the fallback can hold the last commanded steering.
async fn handle_connection(mut socket: WebSocket, config: Arc<Config>) {
    info!("simulator connected");
    let mut controller = TrackingController::from_config(&config);
    let actuation_delay = Duration::from_millis(config.server.actuation_delay_ms);

    while let Some(received) = socket.recv().await {
        let message = match received {
            Ok(message) => message,
            Err(e) => {
                warn!("socket error: {}", e);
                break;
            }
        };
        let frame = match message {
            Message::Text(frame) => frame,
            Message::Close(_) => break,
            _ => continue,
        };

        let response = match protocol::decode(&frame) {
            Some(Event::Telemetry(payload)) => {
                let telemetry: Telemetry = match serde_json::from_value(payload) {
                    Ok(telemetry) => telemetry,
                    Err(e) => {
                        warn!("unreadable telemetry payload: {}", e);
                        if socket.send(Message::Text(protocol::manual())).await.is_err() {
                            break;
                        }
                        continue;
                    }
                };

                let cycle_start = Instant::now();
                let output = controller.control_cycle(&telemetry.into_frame());
                info!(
                    "cycle took {:?}: steering {:.4} throttle {:.4} cte {:.3}",
                    cycle_start.elapsed(),
                    output.steering_angle,
                    output.throttle,
                    output.cte
                );
                if output.cte.abs() > 1.0 {
                    warn!("large cross track error: {:.3}", output.cte);
                }

                sleep(actuation_delay).await;
                protocol::encode("steer", &Steer::from_output(&output))
            }
            Some(Event::Manual) => protocol::manual(),
            None => continue,
        };

        if socket.send(Message::Text(response)).await.is_err() {
            break;
        }
    }
    info!("simulator disconnected");
}
