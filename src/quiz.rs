//! Quiz site reachability

use reqwest::Client;
use std::net::{IpAddr, Ipv4Addr, UdpSocket};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::OnceCell;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::QuizConfig;
use crate::error::{Result, TutorError};
use crate::router::RequestContext;

const PROBE_TIMEOUT: Duration = Duration::from_secs(2);
const PROBE_INTERVAL: Duration = Duration::from_millis(500);

/// Makes the quiz surface reachable and reports where.
/// Calling it again while already reachable must not re-provision.
#[async_trait::async_trait]
pub trait QuizLauncher: Send + Sync {
    async fn become_reachable(&self, ctx: &RequestContext) -> Result<String>;
}

/// Quiz site listening on this machine at the configured port.
/// It is reported reachable only once its landing page answers on loopback.
pub struct LocalQuizLauncher {
    config: QuizConfig,
    client: Client,
    local_ip: OnceCell<IpAddr>,
    provisions: AtomicUsize,
}

impl LocalQuizLauncher {
    pub fn new(config: QuizConfig) -> Result<Self> {
        // Loopback probes never go through a proxy
        let client = Client::builder().timeout(PROBE_TIMEOUT).no_proxy().build()?;
        Ok(Self {
            config,
            client,
            local_ip: OnceCell::new(),
            provisions: AtomicUsize::new(0),
        })
    }

    /// How many times the surface was actually provisioned
    pub fn provisions(&self) -> usize {
        self.provisions.load(Ordering::SeqCst)
    }

    /// Wait for the site once; a failed wait leaves the cell empty so the next request retries
    async fn provision(&self) -> Result<IpAddr> {
        self.local_ip
            .get_or_try_init(|| async {
                self.wait_until_ready().await?;
                self.provisions.fetch_add(1, Ordering::SeqCst);
                let ip = detect_local_ip();
                info!(ip = %ip, port = self.config.port, "quiz site reachable");
                Ok(ip)
            })
            .await
            .copied()
    }

    /// Poll the landing page on loopback until it returns a success status
    async fn wait_until_ready(&self) -> Result<()> {
        let url = format!("http://127.0.0.1:{}{}", self.config.port, self.config.path);
        let deadline = Instant::now() + Duration::from_secs(self.config.ready_timeout_secs);

        loop {
            match self.client.get(&url).send().await {
                Ok(response) if response.status().is_success() => return Ok(()),
                Ok(response) => debug!(status = %response.status(), "quiz site not ready"),
                Err(e) => debug!(error = %e, "quiz site not ready"),
            }

            if Instant::now() + PROBE_INTERVAL > deadline {
                warn!(url = %url, "quiz site failed to start");
                return Err(TutorError::ServiceUnavailable(format!("quiz site at {} is not answering", url)));
            }
            tokio::time::sleep(PROBE_INTERVAL).await;
        }
    }

    /// URL for a request arriving at `ctx.host`, falling back to the configured
    /// public host and then the local address
    pub fn url_for(&self, ctx: &RequestContext, local_ip: IpAddr) -> String {
        let host = ctx
            .host
            .as_deref()
            .filter(|h| !h.trim().is_empty())
            .or(self.config.public_host.as_deref());

        match host {
            Some(host) => {
                let hostname = strip_port(host.trim());
                if is_domain(hostname) {
                    format!("{}://{}{}", ctx.scheme, hostname, self.config.path)
                } else {
                    format!("{}://{}:{}{}", ctx.scheme, hostname, self.config.port, self.config.path)
                }
            }
            None => format!("http://{}:{}{}", local_ip, self.config.port, self.config.path),
        }
    }
}

#[async_trait::async_trait]
impl QuizLauncher for LocalQuizLauncher {
    async fn become_reachable(&self, ctx: &RequestContext) -> Result<String> {
        let local_ip = self.provision().await?;
        let url = self.url_for(ctx, local_ip);
        debug!(url = %url, "quiz url");
        Ok(url)
    }
}

/// Drop a trailing `:port`, keeping bracketed IPv6 literals intact
fn strip_port(host: &str) -> &str {
    if host.starts_with('[') {
        match host.find(']') {
            Some(end) => &host[..=end],
            None => host,
        }
    } else if host.matches(':').count() == 1 {
        host.split(':').next().unwrap_or(host)
    } else {
        host
    }
}

/// Hostnames with letters are served through a proxy on the default port.
/// Bracketed IPv6 literals are addresses even when they contain hex letters.
fn is_domain(hostname: &str) -> bool {
    !hostname.starts_with('[') && hostname.chars().any(|c| c.is_alphabetic())
}

/// Outbound interface address, found by connecting a UDP socket (no packet is sent)
fn detect_local_ip() -> IpAddr {
    let probe = || -> std::io::Result<IpAddr> {
        let socket = UdpSocket::bind("0.0.0.0:0")?;
        socket.connect("8.8.8.8:80")?;
        Ok(socket.local_addr()?.ip())
    };
    probe().unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
}
