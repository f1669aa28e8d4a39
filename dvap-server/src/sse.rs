//! Server-Sent-Events endpoint for debugger notifications
//!
//! `GET /health` answers `OK`; every other GET opens a `text/event-stream`
//! that pops the shared [`EventQueue`] at most once per poll interval.

use std::convert::Infallible;
use std::time::Duration;

use futures::stream;
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Full, StreamBody};
use hyper::body::{Bytes, Frame};
use hyper::header::{HeaderValue, CACHE_CONTROL, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::accept::AcceptBackoff;
use crate::events::EventQueue;

type EventBody = UnsyncBoxBody<Bytes, Infallible>;

const ACCEPT_BACKOFF_MAX: Duration = Duration::from_secs(1);

/// Serve the event stream until shutdown is signalled
pub async fn run_event_server(
    listener: TcpListener,
    queue: EventQueue,
    poll_interval: Duration,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    match listener.local_addr() {
        Ok(addr) => info!("Event stream listening on http://{}/", addr),
        Err(e) => warn!("Event listener has no local address: {}", e),
    }

    let mut backoff = AcceptBackoff::new("Event stream", ACCEPT_BACKOFF_MAX);

    loop {
        tokio::select! {
            accept_result = listener.accept() => {
                let (stream, remote_addr) = match accept_result {
                    Ok(conn) => {
                        backoff.reset();
                        conn
                    }
                    Err(e) => {
                        tokio::time::sleep(backoff.failed(&e)).await;
                        continue;
                    }
                };

                debug!("Event stream connection from {}", remote_addr);
                let io = TokioIo::new(stream);
                let queue = queue.clone();

                tokio::spawn(async move {
                    let service = service_fn(move |req| {
                        let queue = queue.clone();
                        async move { handle_request(req, queue, poll_interval).await }
                    });

                    if let Err(e) = http1::Builder::new()
                        .serve_connection(io, service)
                        .await
                    {
                        if !e.is_incomplete_message() {
                            debug!("Event stream to {} closed: {}", remote_addr, e);
                        }
                    }
                });
            }

            _ = shutdown_rx.recv() => {
                info!("Shutdown signal received, stopping event stream");
                break;
            }
        }
    }
}

async fn handle_request<B>(
    req: Request<B>,
    queue: EventQueue,
    poll_interval: Duration,
) -> Result<Response<EventBody>, Infallible> {
    match (req.method(), req.uri().path()) {
        (&Method::GET, "/health") => Ok(serve_health()),
        (&Method::GET, _) => Ok(serve_events(queue, poll_interval)),
        _ => Ok(method_not_allowed()),
    }
}

fn serve_events(queue: EventQueue, poll_interval: Duration) -> Response<EventBody> {
    let events = stream::unfold(queue, move |queue| async move {
        loop {
            tokio::time::sleep(poll_interval).await;
            let Some(notification) = queue.pop() else {
                continue;
            };
            match notification.to_sse_event() {
                Ok(event) => {
                    let frame: Result<_, Infallible> = Ok(Frame::data(Bytes::from(event)));
                    return Some((frame, queue));
                }
                Err(e) => warn!(
                    "Dropping unserializable {:?} notification: {}",
                    notification.method, e
                ),
            }
        }
    });

    let mut response = Response::new(StreamBody::new(events).boxed_unsync());
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/event-stream"));
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    response
}

fn serve_health() -> Response<EventBody> {
    let mut response = Response::new(full("OK"));
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
    response
}

fn method_not_allowed() -> Response<EventBody> {
    let mut response = Response::new(full("Method Not Allowed"));
    *response.status_mut() = StatusCode::METHOD_NOT_ALLOWED;
    response
}

fn full(body: &'static str) -> EventBody {
    Full::new(Bytes::from_static(body.as_bytes())).boxed_unsync()
}
