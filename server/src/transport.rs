//! Bind URIs and the accept loop.

use std::{fmt, future::Future, path::PathBuf, str::FromStr};

use tokio::net::TcpListener;
#[cfg(unix)]
use tokio::net::UnixListener;
use tracing::{error, info, Instrument};

use crate::error::{ServerError, ServerResult};
use crate::handler::serve_connection;
use crate::state::AppState;

/// Where the server listens: `tcp://host:port` or `unix:///path/to.sock`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindUri {
    Tcp { host: String, port: u16 },
    Unix(PathBuf),
}

impl FromStr for BindUri {
    type Err = ServerError;

    fn from_str(uri: &str) -> Result<Self, Self::Err> {
        if let Some(addr) = uri.strip_prefix("tcp://") {
            let (host, port) = addr
                .rsplit_once(':')
                .ok_or_else(|| ServerError::Config(format!("missing port in URI: {uri}")))?;
            let port = port
                .parse::<u16>()
                .map_err(|_| ServerError::Config(format!("invalid port in URI: {uri}")))?;
            // [::1]:10200
            let host = host.trim_start_matches('[').trim_end_matches(']');
            if host.is_empty() {
                return Err(ServerError::Config(format!("missing host in URI: {uri}")));
            }
            return Ok(BindUri::Tcp {
                host: host.to_string(),
                port,
            });
        }

        if let Some(path) = uri.strip_prefix("unix://") {
            if path.is_empty() {
                return Err(ServerError::Config(format!("missing socket path in URI: {uri}")));
            }
            return Ok(BindUri::Unix(PathBuf::from(path)));
        }

        Err(ServerError::Config(format!(
            "unsupported URI '{uri}' (expected tcp://host:port or unix://path)"
        )))
    }
}

impl fmt::Display for BindUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BindUri::Tcp { host, port } if host.contains(':') => write!(f, "tcp://[{host}]:{port}"),
            BindUri::Tcp { host, port } => write!(f, "tcp://{host}:{port}"),
            BindUri::Unix(path) => write!(f, "unix://{}", path.display()),
        }
    }
}

pub enum Listener {
    Tcp(TcpListener),
    #[cfg(unix)]
    Unix { listener: UnixListener, path: PathBuf },
}

impl Listener {
    pub async fn bind(uri: &BindUri) -> ServerResult<Self> {
        match uri {
            BindUri::Tcp { host, port } => {
                let listener = TcpListener::bind((host.as_str(), *port)).await.map_err(|e| {
                    ServerError::Config(format!("Failed to bind {uri}: {e}. Try a different port."))
                })?;
                Ok(Listener::Tcp(listener))
            }
            #[cfg(unix)]
            BindUri::Unix(path) => {
                remove_stale_socket(path)?;
                let listener = UnixListener::bind(path).map_err(|e| {
                    ServerError::Config(format!("Failed to bind {uri}: {e}"))
                })?;
                Ok(Listener::Unix {
                    listener,
                    path: path.clone(),
                })
            }
            #[cfg(not(unix))]
            BindUri::Unix(_) => Err(ServerError::Config(format!(
                "unix sockets are not supported on this platform: {uri}"
            ))),
        }
    }

    /// Address actually bound, e.g. the real port after binding port 0.
    pub fn local_uri(&self) -> ServerResult<BindUri> {
        match self {
            Listener::Tcp(listener) => {
                let addr = listener.local_addr()?;
                Ok(BindUri::Tcp {
                    host: addr.ip().to_string(),
                    port: addr.port(),
                })
            }
            #[cfg(unix)]
            Listener::Unix { path, .. } => Ok(BindUri::Unix(path.clone())),
        }
    }

    /// Accept connections until `shutdown` resolves, handling each one on
    /// its own task.
    pub async fn serve<F>(self, app: AppState, shutdown: F) -> ServerResult<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutting down");
                    break;
                }
                accepted = self.accept(app.clone()) => {
                    if let Err(e) = accepted {
                        error!(error = %e, "Failed to accept connection");
                    }
                }
            }
        }

        match &self {
            #[cfg(unix)]
            Listener::Unix { path, .. } => {
                let _ = std::fs::remove_file(path);
            }
            _ => {}
        }
        Ok(())
    }

    async fn accept(&self, app: AppState) -> ServerResult<()> {
        match self {
            Listener::Tcp(listener) => {
                let (stream, peer) = listener.accept().await?;
                spawn_connection(stream, peer.to_string(), app);
            }
            #[cfg(unix)]
            Listener::Unix { listener, path } => {
                let (stream, _) = listener.accept().await?;
                spawn_connection(stream, path.display().to_string(), app);
            }
        }
        Ok(())
    }
}

/// Remove a socket file left behind by a previous run. Anything else at
/// `path` is left alone and bind reports it.
#[cfg(unix)]
fn remove_stale_socket(path: &std::path::Path) -> ServerResult<()> {
    use std::os::unix::fs::FileTypeExt;

    match std::fs::symlink_metadata(path) {
        Ok(meta) if meta.file_type().is_socket() => {
            std::fs::remove_file(path)?;
            Ok(())
        }
        Ok(_) => Err(ServerError::Config(format!(
            "{} exists and is not a socket",
            path.display()
        ))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

fn spawn_connection<S>(stream: S, peer: String, app: AppState)
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Send + 'static,
{
    let connection_id = uuid::Uuid::new_v4().to_string();
    let span = tracing::info_span!("connection", id = %connection_id, peer = %peer);
    tokio::spawn(
        async move {
            info!("Client connected");
            if let Err(e) = serve_connection(stream, app).await {
                error!(error = %e, "Connection closed with error");
            }
        }
        .instrument(span),
    );
}
