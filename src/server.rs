//! gRPC server construction and the Flight service implementation.
//!
//! Every handler runs the same admission sequence before touching the
//! catalog: recover-from-panic wraps the handler body, then
//! authentication (unless no authenticator is configured), then catalog
//! routing via the `airport-catalog` header, then catalog authorization
//! (when the authenticator also authorizes catalogs), then transaction-ID
//! extraction into the request context.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, RwLock};
use std::thread;

use arrow_flight::flight_service_server::{FlightService, FlightServiceServer};
use arrow_flight::{
    Action, ActionType, Criteria, Empty, FlightData, FlightDescriptor, FlightInfo,
    HandshakeRequest, HandshakeResponse, PollInfo, PutResult, SchemaResult, Ticket,
};
use futures::stream::{self, BoxStream};
use futures::StreamExt;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::metadata::MetadataMap;
use tonic::transport::{Certificate, Identity, Server, ServerTlsConfig};
use tonic::{Request, Response, Status, Streaming};

use crate::actions::{self, ActionEnv};
use crate::auth::Authenticator;
use crate::catalog::{Catalog, RequestContext};
use crate::discovery;
use crate::dml;
use crate::error::{recover, AirportError};
use crate::logging::LogCategory;
use crate::scan;
use crate::transaction::TransactionCoordinator;
use crate::wire::parse_bearer;

pub(crate) const AUTHORIZATION_HEADER: &str = "authorization";
pub(crate) const CATALOG_HEADER: &str = "airport-catalog";
pub(crate) const TRANSACTION_HEADER: &str = "x-transaction-id";
pub(crate) const TRANSACTION_HEADER_ALT: &str = "airport-transaction-id";

// ---------------------------------------------------------------------------
// Catalog registry
// ---------------------------------------------------------------------------

/// Read-mostly map from catalog name to catalog.  Reads resolve and clone
/// the `Arc`; add/remove take the write lock.  Removal does not wait for
/// in-flight calls, which keep their cloned reference until they finish.
pub struct CatalogRegistry {
    default_catalog: String,
    catalogs: RwLock<HashMap<String, Arc<dyn Catalog>>>,
}

impl CatalogRegistry {
    pub fn new(default_catalog: Arc<dyn Catalog>) -> Self {
        let name = default_catalog.name().to_string();
        let mut catalogs: HashMap<String, Arc<dyn Catalog>> = HashMap::new();
        catalogs.insert(name.clone(), default_catalog);
        Self {
            default_catalog: name,
            catalogs: RwLock::new(catalogs),
        }
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn Catalog>, AirportError> {
        let catalogs = self
            .catalogs
            .read()
            .map_err(|_| AirportError::internal("catalog map lock poisoned"))?;
        catalogs
            .get(name)
            .cloned()
            .ok_or_else(|| AirportError::not_found(format!("unknown catalog '{name}'")))
    }

    pub fn resolve(&self, requested: Option<&str>) -> Result<Arc<dyn Catalog>, AirportError> {
        self.get(requested.unwrap_or(&self.default_catalog))
    }

    pub fn add(&self, catalog: Arc<dyn Catalog>) -> Result<(), AirportError> {
        let mut catalogs = self
            .catalogs
            .write()
            .map_err(|_| AirportError::internal("catalog map lock poisoned"))?;
        let name = catalog.name().to_string();
        if catalogs.contains_key(&name) {
            return Err(AirportError::already_exists(format!(
                "catalog '{name}' is already registered"
            )));
        }
        catalogs.insert(name, catalog);
        Ok(())
    }

    pub fn remove(&self, name: &str) -> Result<(), AirportError> {
        if name == self.default_catalog {
            return Err(AirportError::failed_precondition(
                "the default catalog cannot be removed",
            ));
        }
        let mut catalogs = self
            .catalogs
            .write()
            .map_err(|_| AirportError::internal("catalog map lock poisoned"))?;
        catalogs
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| AirportError::not_found(format!("unknown catalog '{name}'")))
    }

    pub fn names(&self) -> Vec<String> {
        self.catalogs
            .read()
            .map(|catalogs| catalogs.keys().cloned().collect())
            .unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// TLS options
// ---------------------------------------------------------------------------

/// How the server treats client certificates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClientAuthMode {
    /// No client certificates are requested.
    #[default]
    None,
    /// Certificates are requested but a missing one is accepted.
    Request,
    /// A certificate must be presented; any chain is accepted.
    RequireAny,
    /// A missing certificate is accepted; a presented one is verified.
    VerifyIfGiven,
    /// A certificate must be presented and verify against the CA pool.
    RequireAndVerify,
}

impl ClientAuthMode {
    /// Whether a connection without a client certificate is accepted.
    fn is_optional(&self) -> bool {
        matches!(
            self,
            ClientAuthMode::None | ClientAuthMode::Request | ClientAuthMode::VerifyIfGiven
        )
    }
}

#[derive(Debug, Clone)]
pub struct TlsOptions {
    pub cert: Vec<u8>,
    pub key: Vec<u8>,
    pub client_ca: Option<Vec<u8>>,
    pub client_auth: ClientAuthMode,
}

impl TlsOptions {
    /// Load a server identity from PEM files.
    pub fn from_pem_files(cert_path: &str, key_path: &str) -> Result<Self, AirportError> {
        let cert = std::fs::read(cert_path).map_err(|e| {
            AirportError::invalid_argument(format!("failed to read certificate {cert_path}: {e}"))
        })?;
        let key = std::fs::read(key_path).map_err(|e| {
            AirportError::invalid_argument(format!("failed to read key {key_path}: {e}"))
        })?;
        validate_pem(&cert, "server certificate")?;
        validate_pem(&key, "private key")?;
        Ok(Self {
            cert,
            key,
            client_ca: None,
            client_auth: ClientAuthMode::None,
        })
    }

    /// Add a client CA pool from a PEM file and select the auth mode.
    pub fn with_client_ca_file(
        mut self,
        ca_path: &str,
        mode: ClientAuthMode,
    ) -> Result<Self, AirportError> {
        let ca = std::fs::read(ca_path).map_err(|e| {
            AirportError::invalid_argument(format!("failed to read CA bundle {ca_path}: {e}"))
        })?;
        validate_pem(&ca, "CA certificate")?;
        let parsed = rustls_pemfile::certs(&mut ca.as_slice())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| {
                AirportError::invalid_argument(format!("CA bundle {ca_path} is not parseable: {e}"))
            })?;
        if parsed.is_empty() {
            return Err(AirportError::invalid_argument(format!(
                "CA bundle {ca_path} contains no certificates"
            )));
        }
        self.client_ca = Some(ca);
        self.client_auth = mode;
        Ok(self)
    }

    fn to_server_tls(&self) -> ServerTlsConfig {
        let identity = Identity::from_pem(self.cert.clone(), self.key.clone());
        let mut config = ServerTlsConfig::new().identity(identity);
        if let Some(ca) = &self.client_ca {
            config = config.client_ca_root(Certificate::from_pem(ca.clone()));
            config = config.client_auth_optional(self.client_auth.is_optional());
        }
        config
    }
}

fn validate_pem(data: &[u8], label: &str) -> Result<(), AirportError> {
    let text = std::str::from_utf8(data)
        .map_err(|_| AirportError::invalid_argument(format!("{label} is not valid UTF-8")))?;
    if !text.contains("-----BEGIN ") {
        return Err(AirportError::invalid_argument(format!(
            "{label} is not valid PEM"
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Service state and builder
// ---------------------------------------------------------------------------

struct ServiceState {
    catalogs: Arc<CatalogRegistry>,
    authenticator: Option<Arc<dyn Authenticator>>,
    coordinator: Option<Arc<dyn TransactionCoordinator>>,
    location: Option<String>,
}

/// The Arrow Flight service exposing the configured catalogs.
#[derive(Clone)]
pub struct AirportFlightService {
    state: Arc<ServiceState>,
}

/// Builder for an [`AirportServer`].
pub struct AirportServerBuilder {
    catalogs: Vec<Arc<dyn Catalog>>,
    authenticator: Option<Arc<dyn Authenticator>>,
    coordinator: Option<Arc<dyn TransactionCoordinator>>,
    location: Option<String>,
    tls: Option<TlsOptions>,
}

impl AirportServerBuilder {
    /// Start from the default catalog; calls without an `airport-catalog`
    /// header are routed to it.
    pub fn new(default_catalog: Arc<dyn Catalog>) -> Self {
        Self {
            catalogs: vec![default_catalog],
            authenticator: None,
            coordinator: None,
            location: None,
            tls: None,
        }
    }

    /// Register an additional catalog, addressable via `airport-catalog`.
    pub fn with_catalog(mut self, catalog: Arc<dyn Catalog>) -> Self {
        self.catalogs.push(catalog);
        self
    }

    pub fn with_authenticator(mut self, authenticator: Arc<dyn Authenticator>) -> Self {
        self.authenticator = Some(authenticator);
        self
    }

    pub fn with_transaction_coordinator(
        mut self,
        coordinator: Arc<dyn TransactionCoordinator>,
    ) -> Self {
        self.coordinator = Some(coordinator);
        self
    }

    /// Location advertised in flight endpoints, e.g. `grpc://host:port`.
    /// Without it, endpoints tell the client to reuse its connection.
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn with_tls(mut self, tls: TlsOptions) -> Self {
        self.tls = Some(tls);
        self
    }

    pub fn build(self) -> Result<AirportServer, AirportError> {
        let mut catalogs = self.catalogs.into_iter();
        let default_catalog = catalogs
            .next()
            .ok_or_else(|| AirportError::invalid_argument("a default catalog is required"))?;
        let registry = CatalogRegistry::new(default_catalog);
        for catalog in catalogs {
            registry.add(catalog)?;
        }

        Ok(AirportServer {
            state: Arc::new(ServiceState {
                catalogs: Arc::new(registry),
                authenticator: self.authenticator,
                coordinator: self.coordinator,
                location: self.location,
            }),
            tls: self.tls,
        })
    }
}

/// A configured server, ready to serve on an address or listener.
pub struct AirportServer {
    state: Arc<ServiceState>,
    tls: Option<TlsOptions>,
}

impl AirportServer {
    pub fn builder(default_catalog: Arc<dyn Catalog>) -> AirportServerBuilder {
        AirportServerBuilder::new(default_catalog)
    }

    pub fn service(&self) -> AirportFlightService {
        AirportFlightService {
            state: Arc::clone(&self.state),
        }
    }

    /// Catalogs can be added while the server runs.
    pub fn add_catalog(&self, catalog: Arc<dyn Catalog>) -> Result<(), AirportError> {
        self.state.catalogs.add(catalog)
    }

    /// Removal does not drain: in-flight calls finish on their cloned
    /// reference.
    pub fn remove_catalog(&self, name: &str) -> Result<(), AirportError> {
        self.state.catalogs.remove(name)
    }

    pub fn catalog_names(&self) -> Vec<String> {
        self.state.catalogs.names()
    }

    fn grpc_builder(&self) -> Result<Server, AirportError> {
        let mut builder = Server::builder();
        if let Some(tls) = &self.tls {
            builder = builder
                .tls_config(tls.to_server_tls())
                .map_err(|e| AirportError::internal(format!("TLS configuration error: {e}")))?;
        }
        Ok(builder)
    }

    /// Serve until `shutdown` fires.
    pub async fn serve_with_shutdown(
        &self,
        addr: SocketAddr,
        shutdown: oneshot::Receiver<()>,
    ) -> Result<(), AirportError> {
        crate::airport_info!(Server, "serving on {addr}");
        self.grpc_builder()?
            .add_service(FlightServiceServer::new(self.service()))
            .serve_with_shutdown(addr, async {
                let _ = shutdown.await;
            })
            .await
            .map_err(|e| AirportError::internal(format!("server error: {e}")))
    }

    /// Serve on an already-bound listener; used to serve ephemeral ports.
    pub async fn serve_with_listener(&self, listener: TcpListener) -> Result<(), AirportError> {
        let addr = listener
            .local_addr()
            .map_err(|e| AirportError::internal(format!("listener has no address: {e}")))?;
        crate::airport_info!(Server, "serving on {addr}");
        self.grpc_builder()?
            .add_service(FlightServiceServer::new(self.service()))
            .serve_with_incoming(TcpListenerStream::new(listener))
            .await
            .map_err(|e| AirportError::internal(format!("server error: {e}")))
    }
}

// ---------------------------------------------------------------------------
// Admission
// ---------------------------------------------------------------------------

fn header_str<'a>(metadata: &'a MetadataMap, key: &str) -> Option<&'a str> {
    metadata.get(key).and_then(|v| v.to_str().ok())
}

impl AirportFlightService {
    /// Authenticate, route, authorize and extract the transaction ID.
    async fn admit(
        &self,
        metadata: &MetadataMap,
    ) -> Result<(RequestContext, Arc<dyn Catalog>), AirportError> {
        let mut ctx = RequestContext::default();

        if let Some(authenticator) = &self.state.authenticator {
            let token = match header_str(metadata, AUTHORIZATION_HEADER) {
                Some(header) => Some(parse_bearer(header)?),
                None => None,
            };
            let identity = authenticator.authenticate(token).await?;
            ctx.peer_identity = Some(identity);
        }

        let requested = header_str(metadata, CATALOG_HEADER);
        let catalog = self.state.catalogs.resolve(requested)?;
        ctx.catalog = catalog.name().to_string();

        if let (Some(authenticator), Some(identity)) =
            (&self.state.authenticator, ctx.peer_identity.as_deref())
        {
            if let Some(authorizer) = authenticator.as_catalog_authorizer() {
                authorizer.authorize_catalog(identity, &ctx.catalog).await?;
            }
        }

        ctx.transaction_id = header_str(metadata, TRANSACTION_HEADER)
            .or_else(|| header_str(metadata, TRANSACTION_HEADER_ALT))
            .map(|v| v.to_string());

        Ok((ctx, catalog))
    }

    fn action_env(&self, ctx: RequestContext, catalog: Arc<dyn Catalog>) -> ActionEnv {
        ActionEnv {
            ctx,
            catalog,
            catalogs: Arc::clone(&self.state.catalogs),
            coordinator: self.state.coordinator.clone(),
            location: self.state.location.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Flight service implementation
// ---------------------------------------------------------------------------

#[tonic::async_trait]
impl FlightService for AirportFlightService {
    type HandshakeStream = BoxStream<'static, Result<HandshakeResponse, Status>>;
    type ListFlightsStream = BoxStream<'static, Result<FlightInfo, Status>>;
    type DoGetStream = BoxStream<'static, Result<FlightData, Status>>;
    type DoPutStream = BoxStream<'static, Result<PutResult, Status>>;
    type DoActionStream = BoxStream<'static, Result<arrow_flight::Result, Status>>;
    type ListActionsStream = BoxStream<'static, Result<ActionType, Status>>;
    type DoExchangeStream = BoxStream<'static, Result<FlightData, Status>>;

    /// Acknowledge with the advertised location so clients can log where
    /// they landed.  Token validation happens per-call on the
    /// `authorization` header, not here.
    async fn handshake(
        &self,
        _request: Request<Streaming<HandshakeRequest>>,
    ) -> Result<Response<Self::HandshakeStream>, Status> {
        let payload = self
            .state
            .location
            .clone()
            .unwrap_or_else(|| "airport".to_string());
        let response = HandshakeResponse {
            protocol_version: 1,
            payload: payload.into_bytes().into(),
        };
        Ok(Response::new(stream::once(async { Ok(response) }).boxed()))
    }

    async fn list_flights(
        &self,
        request: Request<Criteria>,
    ) -> Result<Response<Self::ListFlightsStream>, Status> {
        let location = self.state.location.clone();
        let flights = recover(LogCategory::Discovery, async {
            let (ctx, catalog) = self.admit(request.metadata()).await?;
            discovery::list_flights(&ctx, &catalog, location.as_deref()).await
        })
        .await
        .map_err(Status::from)?;

        crate::airport_debug!(Discovery, "returning {} flight(s)", flights.len());
        Ok(Response::new(
            stream::iter(flights.into_iter().map(Ok)).boxed(),
        ))
    }

    async fn get_flight_info(
        &self,
        request: Request<FlightDescriptor>,
    ) -> Result<Response<FlightInfo>, Status> {
        let location = self.state.location.clone();
        let info = recover(LogCategory::Discovery, async {
            let (ctx, catalog) = self.admit(request.metadata()).await?;
            let descriptor = request.get_ref();
            discovery::get_flight_info(&ctx, &catalog, descriptor, location.as_deref()).await
        })
        .await
        .map_err(Status::from)?;

        Ok(Response::new(info))
    }

    async fn poll_flight_info(
        &self,
        _request: Request<FlightDescriptor>,
    ) -> Result<Response<PollInfo>, Status> {
        Err(Status::unimplemented("PollFlightInfo is not supported"))
    }

    async fn get_schema(
        &self,
        request: Request<FlightDescriptor>,
    ) -> Result<Response<SchemaResult>, Status> {
        let schema = recover(LogCategory::Discovery, async {
            let (ctx, catalog) = self.admit(request.metadata()).await?;
            discovery::get_schema(&ctx, &catalog, request.get_ref()).await
        })
        .await
        .map_err(Status::from)?;

        Ok(Response::new(schema))
    }

    async fn do_get(
        &self,
        request: Request<Ticket>,
    ) -> Result<Response<Self::DoGetStream>, Status> {
        let flight_data = recover(LogCategory::Scan, async {
            let (ctx, catalog) = self.admit(request.metadata()).await?;
            scan::do_get(&ctx, &catalog, &request.get_ref().ticket).await
        })
        .await
        .map_err(Status::from)?;

        Ok(Response::new(flight_data))
    }

    async fn do_put(
        &self,
        request: Request<Streaming<FlightData>>,
    ) -> Result<Response<Self::DoPutStream>, Status> {
        let metadata = request.metadata().clone();
        let (ctx, catalog) = recover(LogCategory::Dml, self.admit(&metadata))
            .await
            .map_err(Status::from)?;
        let input = request.into_inner();

        let results = dml::do_put(
            ctx,
            catalog,
            self.state.coordinator.clone(),
            &metadata,
            input,
        )
        .await?;

        Ok(Response::new(results))
    }

    async fn do_exchange(
        &self,
        request: Request<Streaming<FlightData>>,
    ) -> Result<Response<Self::DoExchangeStream>, Status> {
        let metadata = request.metadata().clone();
        let (ctx, catalog) = recover(LogCategory::Dml, self.admit(&metadata))
            .await
            .map_err(Status::from)?;
        let input = request.into_inner();

        let reply = dml::do_exchange(
            ctx,
            catalog,
            self.state.coordinator.clone(),
            &metadata,
            input,
        )
        .await?;

        Ok(Response::new(reply))
    }

    async fn do_action(
        &self,
        request: Request<Action>,
    ) -> Result<Response<Self::DoActionStream>, Status> {
        let body = recover(LogCategory::Actions, async {
            let (ctx, catalog) = self.admit(request.metadata()).await?;
            let env = self.action_env(ctx, catalog);
            let action = request.get_ref();
            actions::dispatch(&env, &action.r#type, &action.body).await
        })
        .await
        .map_err(Status::from)?;

        let result = arrow_flight::Result { body: body.into() };
        Ok(Response::new(stream::once(async { Ok(result) }).boxed()))
    }

    async fn list_actions(
        &self,
        _request: Request<Empty>,
    ) -> Result<Response<Self::ListActionsStream>, Status> {
        let actions = actions::action_types();
        Ok(Response::new(
            stream::iter(actions.into_iter().map(Ok)).boxed(),
        ))
    }
}

// ---------------------------------------------------------------------------
// Server registry
// ---------------------------------------------------------------------------

pub struct ServerHandle {
    thread_handle: Option<thread::JoinHandle<Result<(), AirportError>>>,
    shutdown_tx: oneshot::Sender<()>,
    start_time: std::time::SystemTime,
    tls_enabled: bool,
}

/// Registry of servers started by [`start_server`], keyed by `host:port`.
/// Lets an embedding process start and stop listeners by address without
/// holding handles itself.
pub struct ServerRegistry {
    servers: RwLock<HashMap<String, ServerHandle>>,
}

impl ServerRegistry {
    pub fn new() -> Self {
        Self {
            servers: RwLock::new(HashMap::new()),
        }
    }

    pub fn instance() -> &'static ServerRegistry {
        static INSTANCE: std::sync::OnceLock<ServerRegistry> = std::sync::OnceLock::new();
        INSTANCE.get_or_init(ServerRegistry::new)
    }

    fn server_key(host: &str, port: u16) -> String {
        format!("{}:{}", host, port)
    }

    /// Atomically check availability and reserve a slot before spawning.
    fn reserve(
        &self,
        host: &str,
        port: u16,
        shutdown_tx: oneshot::Sender<()>,
        tls_enabled: bool,
    ) -> Result<(), AirportError> {
        let mut servers = self
            .servers
            .write()
            .map_err(|_| AirportError::internal("server registry lock poisoned"))?;
        let key = Self::server_key(host, port);
        if servers.contains_key(&key) {
            return Err(AirportError::already_exists(format!(
                "a server is already running on {host}:{port}"
            )));
        }
        servers.insert(
            key,
            ServerHandle {
                thread_handle: None,
                shutdown_tx,
                start_time: std::time::SystemTime::now(),
                tls_enabled,
            },
        );
        Ok(())
    }

    fn set_thread_handle(
        &self,
        host: &str,
        port: u16,
        handle: thread::JoinHandle<Result<(), AirportError>>,
    ) {
        if let Ok(mut servers) = self.servers.write() {
            let key = Self::server_key(host, port);
            if let Some(entry) = servers.get_mut(&key) {
                entry.thread_handle = Some(handle);
            }
        }
    }

    fn deregister(&self, host: &str, port: u16) {
        if let Ok(mut servers) = self.servers.write() {
            servers.remove(&Self::server_key(host, port));
        }
    }

    pub fn stop_server(&self, host: &str, port: u16) -> Result<(), AirportError> {
        let handle = {
            let mut servers = self
                .servers
                .write()
                .map_err(|_| AirportError::internal("server registry lock poisoned"))?;
            servers.remove(&Self::server_key(host, port))
        };

        match handle {
            Some(handle) => {
                let _ = handle.shutdown_tx.send(());
                if let Some(thread) = handle.thread_handle {
                    let _ = thread.join();
                }
                crate::airport_info!(Server, "server on {host}:{port} stopped");
                Ok(())
            }
            None => Err(AirportError::not_found(format!(
                "no server is running on {host}:{port}"
            ))),
        }
    }

    pub fn servers_info(&self) -> Vec<(String, u16, u64, bool)> {
        let servers = match self.servers.read() {
            Ok(servers) => servers,
            Err(_) => return Vec::new(),
        };
        let mut info = Vec::new();
        for (key, handle) in servers.iter() {
            if let Some((host, port)) = key.rsplit_once(':') {
                let port = port.parse::<u16>().unwrap_or(0);
                let uptime = handle
                    .start_time
                    .elapsed()
                    .map(|d| d.as_secs())
                    .unwrap_or(0);
                info.push((host.to_string(), port, uptime, handle.tls_enabled));
            }
        }
        info
    }
}

impl Default for ServerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Start a server on a dedicated thread with its own runtime and register
/// it for later [`ServerRegistry::stop_server`].
pub fn start_server(server: AirportServer, host: &str, port: u16) -> Result<(), AirportError> {
    let tls_enabled = server.tls.is_some();
    crate::airport_info!(Server, "starting server on {host}:{port} (tls={tls_enabled})");

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    ServerRegistry::instance().reserve(host, port, shutdown_tx, tls_enabled)?;

    let addr: SocketAddr = format!("{host}:{port}")
        .parse()
        .map_err(|e| {
            ServerRegistry::instance().deregister(host, port);
            AirportError::invalid_argument(format!("invalid address {host}:{port}: {e}"))
        })?;

    let thread_result = thread::Builder::new()
        .name(format!("airport-server-{host}:{port}"))
        .spawn(move || -> Result<(), AirportError> {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .map_err(|e| AirportError::internal(format!("failed to build runtime: {e}")))?;
            let result = runtime.block_on(server.serve_with_shutdown(addr, shutdown_rx));
            if let Err(err) = &result {
                crate::airport_error!(Server, "server on {addr} exited: {err}");
            }
            result
        });

    match thread_result {
        Ok(handle) => {
            ServerRegistry::instance().set_thread_handle(host, port, handle);
            Ok(())
        }
        Err(e) => {
            ServerRegistry::instance().deregister(host, port);
            Err(AirportError::internal(format!(
                "failed to spawn server thread: {e}"
            )))
        }
    }
}
