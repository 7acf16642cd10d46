use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use futures::stream::{FuturesUnordered, StreamExt};
use http_body_util::combinators::BoxBody;
use http_body_util::BodyExt;
use hyper::body::Incoming;
use hyper::server::conn::http1 as http;
use hyper::service::service_fn;
use hyper::Request;
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::time::Instant;

use armoire_proto::codec::BodyIn;
use armoire_proto::dist::Distributor;
use armoire_proto::lock::{LockConfig, LockManager};
use armoire_proto::mem::MemProvider;
use armoire_proto::path::DavPath;

use crate::config::{Backend, Config};

pub struct Server {
    bind_addr: SocketAddr,
    dist: Arc<Distributor>,
    sweep_interval: Duration,
}

pub fn new(config: Config) -> Result<Server> {
    let locks = Arc::new(LockManager::new(LockConfig {
        max_timeout_seconds: config.locks.max_timeout_seconds,
        default_timeout_seconds: config.locks.default_timeout_seconds,
        sweep_interval_ms: config.locks.sweep_interval_ms,
    }));

    let mut dist = Distributor::new(locks, config.pretty_print);
    for mount in &config.mounts {
        let prefix = DavPath::parse(&mount.prefix)
            .map_err(|_| anyhow::anyhow!("invalid mount prefix: {}", mount.prefix))?;
        match mount.backend {
            Backend::Memory => dist.mount(prefix, Arc::new(MemProvider::new())),
        }
    }

    Ok(Server {
        bind_addr: config.bind_addr,
        dist: Arc::new(dist),
        // lock expiry is swept at most once per second
        sweep_interval: Duration::from_millis(config.locks.sweep_interval_ms.max(1000)),
    })
}

impl Server {
    pub async fn run(self, mut must_exit: watch::Receiver<bool>) -> Result<()> {
        let tcp = TcpListener::bind(self.bind_addr).await?;
        tracing::info!("DAV server listening on {:#}", self.bind_addr);

        let sweeper = {
            let dist = self.dist.clone();
            let mut exit = must_exit.clone();
            let period = self.sweep_interval;
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(period);
                loop {
                    tokio::select! {
                        _ = ticker.tick() => dist.sweep_locks(Instant::now()),
                        _ = exit.changed() => break,
                    }
                }
            })
        };

        let mut connections = FuturesUnordered::new();
        while !*must_exit.borrow() {
            let wait_conn_finished = async {
                if connections.is_empty() {
                    futures::future::pending().await
                } else {
                    connections.next().await
                }
            };
            let (socket, remote_addr) = tokio::select! {
                a = tcp.accept() => a?,
                _ = wait_conn_finished => continue,
                _ = must_exit.changed() => continue,
            };
            tracing::info!("Accepted connection from {}", remote_addr);
            let stream = TokioIo::new(socket);

            let dist = self.dist.clone();
            let conn = tokio::spawn(async move {
                match http::Builder::new()
                    .serve_connection(
                        stream,
                        service_fn(move |req: Request<Incoming>| {
                            let dist = dist.clone();
                            async move {
                                let req = req.map(incoming_body);
                                Ok::<_, std::convert::Infallible>(dist.dispatch(req).await)
                            }
                        }),
                    )
                    .await
                {
                    Err(e) => tracing::warn!(err=?e, "connection failed"),
                    Ok(()) => tracing::trace!("connection terminated with success"),
                }
            });
            connections.push(conn);
        }
        drop(tcp);

        tracing::info!("Server shutting down, draining remaining connections...");
        while connections.next().await.is_some() {}
        sweeper.abort();

        Ok(())
    }
}

fn incoming_body(body: Incoming) -> BodyIn {
    BoxBody::new(body.map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e)))
}
