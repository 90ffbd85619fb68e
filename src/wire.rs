use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::net::TcpStream;
use tokio_util::codec::{Framed, LinesCodec};

use crate::engine::{Engine, EngineError};
use crate::model::*;
use crate::observability;

/// One request per line, JSON-encoded, discriminated by `op`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    CheckAvailability,
    MakeReservation {
        user_id: UserId,
        start: DateTime<Utc>,
    },
    /// `user_id` present means an owner-checked cancel; absent is the
    /// attendant surface.
    CancelReservation {
        session_id: SessionId,
        #[serde(default)]
        user_id: Option<UserId>,
    },
    EnterWalkIn {
        user_id: UserId,
    },
    EnterWithReservation {
        session_id: SessionId,
        user_id: UserId,
    },
    Exit {
        session_id: SessionId,
        #[serde(default)]
        user_id: Option<UserId>,
    },
    Extend {
        session_id: SessionId,
        hours: i64,
        #[serde(default)]
        user_id: Option<UserId>,
    },
    RecoverCode {
        user_id: UserId,
    },
    History {
        user_id: UserId,
    },
    ActiveSessions,
    RegisterSubscriber {
        actor_id: UserId,
        subscriber: NewSubscriber,
    },
    UpdateSubscriber {
        user_id: UserId,
        update: ContactUpdate,
    },
}

/// One reply per request line. Errors carry the human-readable reason
/// string verbatim.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Reply {
    Ok(serde_json::Value),
    Err { reason: String },
}

impl Reply {
    fn from_result(result: Result<serde_json::Value, EngineError>) -> Self {
        match result {
            Ok(value) => Reply::Ok(value),
            Err(err) => Reply::Err {
                reason: err.to_string(),
            },
        }
    }
}

/// Serve one framed connection until the peer hangs up.
pub async fn process_connection(stream: TcpStream, engine: Arc<Engine>) {
    let peer = stream.peer_addr().ok();
    let mut framed = Framed::new(stream, LinesCodec::new());

    while let Some(line) = framed.next().await {
        let line = match line {
            Ok(line) => line,
            Err(err) => {
                tracing::debug!(?peer, %err, "connection read failed");
                return;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        let reply = match serde_json::from_str::<Request>(&line) {
            Ok(request) => {
                let op = observability::op_label(&request);
                let started = Instant::now();
                let result = dispatch(&engine, request).await;
                let status = if result.is_ok() { "ok" } else { "err" };
                metrics::counter!(observability::OPS_TOTAL, "op" => op, "status" => status)
                    .increment(1);
                metrics::histogram!(observability::OP_DURATION_SECONDS, "op" => op)
                    .record(started.elapsed().as_secs_f64());
                Reply::from_result(result)
            }
            Err(err) => Reply::Err {
                reason: format!("malformed request: {err}"),
            },
        };
        let encoded = match serde_json::to_string(&reply) {
            Ok(encoded) => encoded,
            Err(err) => {
                tracing::error!(%err, "reply serialization failed");
                return;
            }
        };
        if let Err(err) = framed.send(encoded).await {
            tracing::debug!(?peer, %err, "connection write failed");
            return;
        }
    }
}

async fn dispatch(engine: &Engine, request: Request) -> Result<serde_json::Value, EngineError> {
    match request {
        Request::CheckAvailability => to_value(engine.check_availability().await),
        Request::MakeReservation { user_id, start } => {
            to_value(engine.make_reservation(user_id, start).await?)
        }
        Request::CancelReservation {
            session_id,
            user_id,
        } => {
            match user_id {
                Some(user_id) => engine.cancel_reservation_owned(session_id, user_id).await?,
                None => engine.cancel_reservation(session_id).await?,
            }
            Ok(json!({ "cancelled": session_id }))
        }
        Request::EnterWalkIn { user_id } => to_value(engine.enter_walk_in(user_id).await?),
        Request::EnterWithReservation {
            session_id,
            user_id,
        } => to_value(engine.enter_with_reservation(session_id, user_id).await?),
        Request::Exit {
            session_id,
            user_id,
        } => match user_id {
            Some(user_id) => to_value(engine.exit_owned(session_id, user_id).await?),
            None => to_value(engine.exit(session_id).await?),
        },
        Request::Extend {
            session_id,
            hours,
            user_id,
        } => match user_id {
            Some(user_id) => to_value(engine.extend_owned(session_id, user_id, hours).await?),
            None => to_value(engine.extend(session_id, hours).await?),
        },
        Request::RecoverCode { user_id } => {
            let session_id = engine.recover_code(user_id).await?;
            Ok(json!({ "session_id": session_id }))
        }
        Request::History { user_id } => to_value(engine.history(user_id).await?),
        Request::ActiveSessions => to_value(engine.active_sessions().await),
        Request::RegisterSubscriber {
            actor_id,
            subscriber,
        } => to_value(engine.register_subscriber(actor_id, &subscriber)?),
        Request::UpdateSubscriber { user_id, update } => {
            to_value(engine.update_subscriber(user_id, &update)?)
        }
    }
}

fn to_value<T: Serialize>(value: T) -> Result<serde_json::Value, EngineError> {
    // Payload types are plain data; encoding them cannot fail in practice.
    Ok(serde_json::to_value(value).unwrap_or(serde_json::Value::Null))
}
