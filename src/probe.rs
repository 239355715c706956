use anyhow::{Context, Result};
use hickory_resolver::config::ResolverConfig;
use hickory_resolver::name_server::TokioConnectionProvider;
use hickory_resolver::TokioResolver;
use std::future::Future;
use std::net::IpAddr;
use std::time::Duration;
use surge_ping::{Client as PingClient, Config as PingConfig, PingIdentifier, PingSequence, ICMP};
use tracing::{debug, info, warn};

/// Single reachability probe.
///
/// Returns the round-trip time as text (`"7.445 ms"`) or an empty string when
/// the host did not answer within `timeout`. Network failures are never errors.
pub trait Prober {
    async fn probe(&self, address: &str, timeout: Duration) -> String;
}

pub fn format_latency(rtt: Duration) -> String {
    format!("{:.3} ms", rtt.as_secs_f64() * 1000.0)
}

/// Runs `ping` under `timeout` and renders its answer. Empty addresses are
/// never pinged.
async fn bounded_probe<F, Fut>(address: &str, timeout: Duration, ping: F) -> String
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Option<Duration>>,
{
    if address.is_empty() {
        return String::new();
    }
    match tokio::time::timeout(timeout, ping()).await {
        Ok(Some(rtt)) => format_latency(rtt),
        Ok(None) => String::new(),
        Err(_) => {
            debug!(%address, ?timeout, "probe timed out");
            String::new()
        }
    }
}

pub struct PingProber {
    v4: PingClient,
    v6: Option<PingClient>,
    dns_resolver: TokioResolver,
}

impl PingProber {
    pub fn new() -> Result<Self> {
        let v4 = PingClient::new(&PingConfig::default())
            .context("Failed to create ICMPv4 Ping Client")?;

        let v6 = match PingClient::new(&PingConfig::builder().kind(ICMP::V6).build()) {
            Ok(client) => Some(client),
            Err(e) => {
                debug!(error = %e, "ICMPv6 unavailable, IPv6 targets will report unreachable");
                None
            }
        };

        let dns_resolver = match TokioResolver::builder_tokio() {
            Ok(builder) => builder.build(),
            Err(e) => {
                warn!(error = %e, "system resolver config unusable, falling back to Cloudflare");
                TokioResolver::builder_with_config(
                    ResolverConfig::cloudflare(),
                    TokioConnectionProvider::default(),
                )
                .build()
            }
        };
        info!("ICMP prober ready");

        Ok(Self { v4, v6, dns_resolver })
    }

    async fn resolve(&self, address: &str) -> Result<IpAddr> {
        if let Ok(ip) = address.parse::<IpAddr>() {
            return Ok(ip);
        }
        let lookup = self
            .dns_resolver
            .lookup_ip(address)
            .await
            .with_context(|| format!("failed to resolve {}", address))?;
        lookup
            .iter()
            .next()
            .with_context(|| format!("{} has no IP address", address))
    }

    async fn ping(&self, address: &str, timeout: Duration) -> Option<Duration> {
        let ip = match self.resolve(address).await {
            Ok(ip) => ip,
            Err(e) => {
                debug!(%address, "probe skipped: {:#}", e);
                return None;
            }
        };

        let client = match ip {
            IpAddr::V4(_) => &self.v4,
            IpAddr::V6(_) => self.v6.as_ref()?,
        };

        let payload = [0u8; 56];
        let mut pinger = client.pinger(ip, PingIdentifier(rand::random())).await;
        pinger.timeout(timeout);

        match pinger.ping(PingSequence(0), &payload).await {
            Ok((_, rtt)) => Some(rtt),
            Err(e) => {
                debug!(%address, error = %e, "no echo reply");
                None
            }
        }
    }
}

impl Prober for PingProber {
    async fn probe(&self, address: &str, timeout: Duration) -> String {
        // Bounds name resolution as well as the echo itself.
        bounded_probe(address, timeout, || self.ping(address, timeout)).await
    }
}
