//! Proxy controller
//!
//! A [`Proxy`] owns one listening socket, accepts clients on it, dials the
//! upstream for each of them and hands the resulting pair to a
//! [`LinkFactory`].
//!
//! Client <-> relay <-> Upstream
//!
//! Lifecycle transitions run inside a controller task that processes one
//! [`ProxyMessage`] at a time. While enabled, each run has two more tasks:
//!
//! - the accept loop, which owns the listener;
//! - the free blocker, which waits for the run's tomb to be killed, kills
//!   the accept loop's tomb to wake the pending `accept()`, waits for the
//!   loop to drop the listener and exit, and only then marks the run's tomb
//!   as done.
//!
//! `stop` waits on the run's tomb, so it returns only once nothing of the
//! run is left.

use log::{debug, error, info, warn};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;

use super::link::{Direction, LinkContext, LinkFactory};
use super::message::{ProxyMessage, ProxySnapshot, ProxyStatus};
use super::registry::ConnectionRegistry;
use super::tomb::{Exit, Tomb};
use crate::common::{
    bind_listener, canonical_addr, resolve_socket_addr, LogScope, RelayError, Result,
};
use crate::config::{ProxyConfig, RelaySettings};

/// Handle to a proxy controller
///
/// Cheap to clone; every clone talks to the same controller. The controller
/// stops the proxy and exits once the last handle is dropped.
#[derive(Debug, Clone)]
pub struct Proxy {
    name: Arc<str>,
    sender: mpsc::Sender<ProxyMessage>,
    registry: ConnectionRegistry,
}

impl Proxy {
    /// Create a proxy in the disabled state
    ///
    /// `config.enabled` is not acted upon; call [`Proxy::start`] or
    /// [`Proxy::update`] to start listening. Must be called from within a
    /// tokio runtime.
    pub fn new(config: ProxyConfig, links: Arc<dyn LinkFactory>, settings: &RelaySettings) -> Self {
        let (sender, receiver) = mpsc::channel(32);
        let name: Arc<str> = Arc::from(config.name.as_str());
        let registry = ConnectionRegistry::new();

        let controller = Controller {
            scope: LogScope::new(&config.name, &config.listen, &config.upstream),
            name: Arc::clone(&name),
            listen: config.listen,
            upstream: config.upstream,
            status: ProxyStatus::Disabled,
            error: None,
            run: None,
            registry: registry.clone(),
            links,
            connect_timeout: settings.connect_timeout(),
        };
        tokio::spawn(controller.run(receiver));

        Self { name, sender, registry }
    }

    /// Proxy name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Start listening
    ///
    /// Returns once the listener is bound, or with the bind error.
    ///
    /// # Errors
    ///
    /// `AlreadyStarted` if the proxy is enabled, `Bind` or
    /// `AddressResolution` if the listener could not be created.
    pub async fn start(&self) -> Result<()> {
        let (response, receiver) = oneshot::channel();
        self.send(ProxyMessage::Start { response }).await?;
        receiver.await.map_err(|_| controller_gone())?
    }

    /// Stop listening and close every connection
    ///
    /// A no-op when the proxy is not enabled. Returns once the accept loop
    /// has exited and the registered connections are closed.
    pub async fn stop(&self) {
        let (response, receiver) = oneshot::channel();
        if self.send(ProxyMessage::Stop { response }).await.is_ok() {
            let _ = receiver.await;
        }
    }

    /// Apply a desired configuration
    ///
    /// Changed addresses restart the proxy with the new addresses; the
    /// enabled flag then starts or stops it. Disabling also clears a failed
    /// status. Runs as one transition: no other
    /// operation on this proxy interleaves with it.
    pub async fn update(&self, desired: ProxyConfig) -> Result<()> {
        let (response, receiver) = oneshot::channel();
        self.send(ProxyMessage::Update { desired, response }).await?;
        receiver.await.map_err(|_| controller_gone())?
    }

    /// Whether `other` has a different listen or upstream address
    ///
    /// `other.listen` is resolved first, so `localhost:80` and
    /// `127.0.0.1:80` compare equal.
    pub async fn differs(&self, other: &ProxyConfig) -> Result<bool> {
        let (response, receiver) = oneshot::channel();
        self.send(ProxyMessage::Differs { other: other.clone(), response }).await?;
        receiver.await.map_err(|_| controller_gone())?
    }

    /// Consistent view of the proxy
    pub async fn snapshot(&self) -> Result<ProxySnapshot> {
        let (response, receiver) = oneshot::channel();
        self.send(ProxyMessage::Snapshot { response }).await?;
        receiver.await.map_err(|_| controller_gone())
    }

    /// Deregister a closed connection
    ///
    /// Removing an unknown name is a no-op.
    pub fn remove_connection(&self, name: &str) {
        self.registry.remove(name);
    }

    /// Number of registered connections
    pub fn connection_count(&self) -> usize {
        self.registry.len()
    }

    async fn send(&self, message: ProxyMessage) -> Result<()> {
        self.sender.send(message).await.map_err(|_| controller_gone())
    }
}

fn controller_gone() -> RelayError {
    RelayError::Other("Proxy controller is no longer running".to_string())
}

/// Signals of one run: the controller's tomb and the accept loop's tomb
struct Run {
    tomb: Tomb,
    accept: Tomb,
}

/// State owned by the controller task
struct Controller {
    name: Arc<str>,
    listen: String,
    upstream: String,
    status: ProxyStatus,
    error: Option<String>,
    run: Option<Run>,
    scope: LogScope,
    registry: ConnectionRegistry,
    links: Arc<dyn LinkFactory>,
    connect_timeout: Option<Duration>,
}

impl Controller {
    async fn run(mut self, mut receiver: mpsc::Receiver<ProxyMessage>) {
        loop {
            let accept = self.run.as_ref().map(|run| run.accept.clone());

            let message = match accept {
                Some(accept) => tokio::select! {
                    biased;
                    exit = accept.wait() => {
                        self.handle_loop_exit(exit).await;
                        continue;
                    }
                    message = receiver.recv() => message,
                },
                None => receiver.recv().await,
            };

            match message {
                Some(message) => self.handle(message).await,
                None => break,
            }
        }

        self.stop().await;
        debug!("{} Proxy controller stopped", self.scope);
    }

    async fn handle(&mut self, message: ProxyMessage) {
        match message {
            ProxyMessage::Start { response } => {
                let _ = response.send(self.start().await);
            }
            ProxyMessage::Stop { response } => {
                self.stop().await;
                let _ = response.send(());
            }
            ProxyMessage::Update { desired, response } => {
                let _ = response.send(self.update(desired).await);
            }
            ProxyMessage::Differs { other, response } => {
                let _ = response.send(self.differs(&other).await);
            }
            ProxyMessage::Snapshot { response } => {
                let _ = response.send(self.snapshot());
            }
        }
    }

    fn is_enabled(&self) -> bool {
        self.status == ProxyStatus::Enabled
    }

    async fn start(&mut self) -> Result<()> {
        if self.is_enabled() {
            return Err(RelayError::AlreadyStarted(self.name.to_string()));
        }

        // Fresh signals for every run; nothing from a previous run leaks in.
        let run = Run {
            tomb: Tomb::new(),
            accept: Tomb::new(),
        };
        let (started, bound) = oneshot::channel();

        let accept_loop = AcceptLoop {
            name: Arc::clone(&self.name),
            listen: self.listen.clone(),
            upstream: self.upstream.clone(),
            scope: self.scope.clone(),
            tomb: run.tomb.clone(),
            accept: run.accept.clone(),
            registry: self.registry.clone(),
            links: Arc::clone(&self.links),
            connect_timeout: self.connect_timeout,
        };
        tokio::spawn(accept_loop.serve(started));

        let addr = match bound.await {
            Ok(Ok(addr)) => addr,
            Ok(Err(e)) => {
                self.status = ProxyStatus::Disabled;
                return Err(e);
            }
            Err(_) => {
                self.status = ProxyStatus::Disabled;
                return Err(RelayError::Other("Accept loop exited before binding".to_string()));
            }
        };

        self.listen = addr.to_string();
        self.scope = self.scope.rebind(&self.listen, &self.upstream);
        self.status = ProxyStatus::Enabled;
        self.error = None;
        self.run = Some(run);

        info!("{} Started proxy", self.scope);
        Ok(())
    }

    async fn stop(&mut self) {
        if self.run.is_none() {
            if self.status == ProxyStatus::Failed {
                self.status = ProxyStatus::Disabled;
                self.error = None;
            }
            return;
        }

        self.status = ProxyStatus::Disabled;
        self.shutdown_run().await;

        info!("{} Terminated proxy", self.scope);
    }

    /// Kill the current run and wait until it is gone, then close connections
    async fn shutdown_run(&mut self) -> Exit {
        let Some(run) = self.run.take() else {
            return Exit::Clean;
        };

        run.tomb.kill("Shutting down from stop()");
        let exit = run.tomb.wait().await; // Wait until we stop accepting new connections

        let closed = self.registry.close_all();
        if closed > 0 {
            debug!("{} Closed {} connections", self.scope, closed);
        }
        exit
    }

    async fn handle_loop_exit(&mut self, exit: Exit) {
        let exit = match self.shutdown_run().await {
            Exit::Clean => exit,
            failed => failed,
        };

        match exit {
            Exit::Failed(reason) => {
                error!("{} Proxy failed: {}", self.scope, reason);
                self.status = ProxyStatus::Failed;
                self.error = Some(reason);
            }
            Exit::Clean => {
                warn!("{} Accept loop exited unexpectedly", self.scope);
                self.status = ProxyStatus::Disabled;
            }
        }
    }

    async fn update(&mut self, desired: ProxyConfig) -> Result<()> {
        let listen = canonical_addr(&desired.listen).await?;

        if self.listen != listen || self.upstream != desired.upstream {
            self.stop().await;

            self.listen = listen;
            self.upstream = desired.upstream;
            self.scope = self.scope.rebind(&self.listen, &self.upstream);
            info!("{} Updated proxy addresses", self.scope);
        }

        if !desired.enabled {
            // Also clears a failed run.
            self.stop().await;
        } else if !self.is_enabled() {
            return self.start().await;
        }
        Ok(())
    }

    async fn differs(&self, other: &ProxyConfig) -> Result<bool> {
        let listen = canonical_addr(&other.listen).await?;
        Ok(self.listen != listen || self.upstream != other.upstream)
    }

    fn snapshot(&self) -> ProxySnapshot {
        ProxySnapshot {
            name: self.name.to_string(),
            listen: self.listen.clone(),
            upstream: self.upstream.clone(),
            enabled: self.is_enabled(),
            status: self.status,
            error: self.error.clone(),
            connections: self.registry.len(),
        }
    }
}

/// Everything one run of the accept loop needs
struct AcceptLoop {
    name: Arc<str>,
    listen: String,
    upstream: String,
    scope: LogScope,
    tomb: Tomb,
    accept: Tomb,
    registry: ConnectionRegistry,
    links: Arc<dyn LinkFactory>,
    connect_timeout: Option<Duration>,
}

impl AcceptLoop {
    /// Bind, report the outcome once, then accept until killed
    async fn serve(mut self, started: oneshot::Sender<Result<SocketAddr>>) {
        let (listener, addr) = match self.listen().await {
            Ok(bound) => bound,
            Err(e) => {
                let _ = started.send(Err(e));
                return;
            }
        };

        tokio::spawn(free_blocker(self.tomb.clone(), self.accept.clone()));

        if started.send(Ok(addr)).is_err() {
            // Nobody will ever stop this run; end it ourselves.
            self.tomb.kill("Controller went away during start");
        }

        let exit = self.accept_clients(listener).await;
        self.accept.done(exit);
    }

    /// Bind the listener and log under the address actually bound
    async fn listen(&mut self) -> Result<(TcpListener, SocketAddr)> {
        let addr = resolve_socket_addr(&self.listen).await?;
        let bind_error = |source: std::io::Error| RelayError::Bind {
            addr: self.listen.clone(),
            source,
        };

        let listener = bind_listener(addr).map_err(bind_error)?;
        let local = listener.local_addr().map_err(bind_error)?;

        self.listen = local.to_string();
        self.scope = self.scope.rebind(&self.listen, &self.upstream);
        Ok((listener, local))
    }

    /// Accept loop; the listener is closed when this returns
    async fn accept_clients(&self, listener: TcpListener) -> Exit {
        loop {
            let accepted = tokio::select! {
                biased;
                _ = self.accept.dying() => return Exit::Clean,
                accepted = listener.accept() => accepted,
            };

            match accepted {
                Ok((client, peer)) => {
                    info!("{} Accepted client {}", self.scope, peer);
                    self.connect(client, peer).await;
                }
                Err(e) => {
                    // A shutdown in progress explains the error.
                    if self.accept.is_dying() {
                        return Exit::Clean;
                    }
                    warn!("{} Error while accepting client: {}", self.scope, e);
                    return Exit::Failed(RelayError::Accept(e).to_string());
                }
            }
        }
    }

    /// Pair one client with a fresh upstream connection
    async fn connect(&self, client: TcpStream, peer: SocketAddr) {
        let dialed = tokio::select! {
            biased;
            _ = self.accept.dying() => {
                debug!("{} Dropping client {} during shutdown", self.scope, peer);
                return;
            }
            dialed = self.dial() => dialed,
        };

        let upstream = match dialed {
            Ok(upstream) => upstream,
            Err(e) => {
                error!("{} client={} {}", self.scope, peer, e);
                drop(client);
                return;
            }
        };

        let _ = client.set_nodelay(true);
        let _ = upstream.set_nodelay(true);

        let name = peer.to_string();
        let upstream_name = format!("{}{}", name, Direction::Upstream);
        let downstream_name = format!("{}{}", name, Direction::Downstream);

        let registered = self
            .registry
            .insert(upstream_name.clone(), &upstream)
            .and_then(|_| self.registry.insert(downstream_name.clone(), &client));
        if let Err(e) = registered {
            error!("{} Unable to register client {}: {}", self.scope, peer, e);
            self.registry.remove(&upstream_name);
            return;
        }

        let (client_read, client_write) = client.into_split();
        let (upstream_read, upstream_write) = upstream.into_split();
        let ctx = LinkContext::new(Arc::clone(&self.name), self.registry.clone());

        self.links.start_link(
            ctx.clone(),
            upstream_name,
            client_read,
            upstream_write,
            Direction::Upstream,
        );
        self.links.start_link(
            ctx,
            downstream_name,
            upstream_read,
            client_write,
            Direction::Downstream,
        );
    }

    async fn dial(&self) -> Result<TcpStream> {
        let dial_error = |source: std::io::Error| RelayError::UpstreamDial {
            upstream: self.upstream.clone(),
            source,
        };

        let connect = TcpStream::connect(self.upstream.as_str());
        match self.connect_timeout {
            Some(limit) => match timeout(limit, connect).await {
                Ok(result) => result.map_err(dial_error),
                Err(_) => Err(dial_error(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    "Connection timed out",
                ))),
            },
            None => connect.await.map_err(dial_error),
        }
    }
}

/// Unblock the accept loop once the run is killed
///
/// Marks the run's tomb done only after the accept loop has exited, carrying
/// the loop's exit along.
async fn free_blocker(tomb: Tomb, accept: Tomb) {
    tomb.dying().await;

    // Tell the accept loop the shutdown is deliberate, which also wakes its
    // pending accept().
    accept.kill(tomb.reason().unwrap_or_else(|| "Shutting down".to_string()));

    // Wait for the accept loop to finish processing
    let exit = accept.wait().await;
    tomb.done(exit);
}
