//! HTTP surface of the session authority: session-event submission, portal
//! login, and a session listing page.
//!
//! This layer owns parsing and validation of the untrusted transport
//! input; the engine receives only already-parsed arguments.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Html;
use axum::routing::{get, post};
use axum::{Form, Router};
use chrono::Utc;
use serde::Deserialize;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::sync::Arc;
use tokio::net::TcpListener;
use tollgate_core::{MacAddress, SessionEngine, SessionError, SessionSource};
use tracing::{info, warn};

#[derive(Deserialize)]
struct SessionEventForm {
    action: String,
    source: String,
    mac: String,
    ipv4: Option<String>,
    ipv6: Option<String>,
}

#[derive(Deserialize)]
struct LoginForm {
    user: String,
    mac: String,
}

fn bad_request(msg: String) -> (StatusCode, String) {
    (StatusCode::BAD_REQUEST, msg)
}

/// HTML forms submit empty strings for fields the user left blank.
fn optional<T: std::str::FromStr>(
    field: &str,
    value: &Option<String>,
) -> Result<Option<T>, (StatusCode, String)> {
    match value.as_deref() {
        None | Some("") => Ok(None),
        Some(text) => text
            .parse()
            .map(Some)
            .map_err(|_| bad_request(format!("invalid {field}: {text:?}"))),
    }
}

async fn session_event(
    State(engine): State<Arc<SessionEngine>>,
    Form(form): Form<SessionEventForm>,
) -> Result<&'static str, (StatusCode, String)> {
    let source: SessionSource = form
        .source
        .parse()
        .map_err(|e: String| bad_request(e))?;
    let mac: MacAddress = form
        .mac
        .parse()
        .map_err(|_| bad_request(format!("invalid mac: {:?}", form.mac)))?;
    let ipv4: Option<Ipv4Addr> = optional("ipv4", &form.ipv4)?;
    let ipv6: Option<Ipv6Addr> = optional("ipv6", &form.ipv6)?;
    let now = Utc::now().naive_utc();
    match form.action.as_str() {
        "start" => {
            engine
                .address_session_started(source, mac, now, ipv4, ipv6)
                .await;
            Ok("Success")
        }
        "end" => {
            engine
                .address_session_ended(source, mac, now, ipv4, ipv6)
                .await;
            Ok("Success")
        }
        other => Err(bad_request(format!("invalid action: {other:?}"))),
    }
}

async fn login(
    State(engine): State<Arc<SessionEngine>>,
    Form(form): Form<LoginForm>,
) -> Result<&'static str, (StatusCode, String)> {
    let mac: MacAddress = form
        .mac
        .parse()
        .map_err(|_| bad_request(format!("invalid mac: {:?}", form.mac)))?;
    info!("login request for {}/{}", form.user, mac);
    match engine.login(&form.user, mac, Utc::now().naive_utc()).await {
        Ok(_) => Ok("Success"),
        Err(e @ SessionError::AlreadyLoggedIn { .. }) => {
            warn!("{}", e);
            Err((StatusCode::CONFLICT, e.to_string()))
        }
        Err(e @ SessionError::Enforcement(_)) => {
            warn!("login for {}/{} failed: {}", form.user, mac, e);
            Err((StatusCode::BAD_GATEWAY, e.to_string()))
        }
    }
}

fn cell<T: std::fmt::Display>(value: &Option<T>) -> String {
    match value {
        Some(v) => v.to_string(),
        None => String::new(),
    }
}

async fn list_sessions(State(engine): State<Arc<SessionEngine>>) -> Html<String> {
    let mut page = String::from(
        "<html>\n<head><title>Session list</title></head>\n<body>\n  <table>\n    <tr>\n      \
         <th>User</th><th>MAC</th><th>Start</th><th>End</th><th>Source</th>\
         <th>IPv4</th><th>IPv6</th><th>Start</th><th>End</th>\n    </tr>\n",
    );
    for row in engine.list_sessions().await {
        page.push_str(&format!(
            "    <tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td>\
             <td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>\n",
            cell(&row.user),
            row.mac,
            cell(&row.user_start),
            cell(&row.user_end),
            row.source,
            cell(&row.ipv4),
            cell(&row.ipv6),
            row.addr_start,
            cell(&row.addr_end),
        ));
    }
    page.push_str("  </table>\n</body>\n</html>\n");
    Html(page)
}

fn router(engine: Arc<SessionEngine>) -> Router {
    Router::new()
        .route("/", get(list_sessions))
        .route("/session", post(session_event))
        .route("/login", post(login))
        .with_state(engine)
}

pub async fn run_server(listener: TcpListener, engine: Arc<SessionEngine>) -> std::io::Result<()> {
    info!("session API listening on {}", listener.local_addr()?);
    axum::serve(listener, router(engine)).await
}
