use clap::Parser;
use redzone::{
    config::{Config, parse_http_bind_addr},
    http_server::HttpServer,
    plugin::{Handler, RedisPlugin},
    server::{run_tcp_server, run_udp_server},
    store::RecordStore,
    zone_cache::ZoneNameCache,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Authoritative DNS server for zones stored in Redis
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Address for the DNS listeners (UDP and TCP)
    #[arg(short, long)]
    bind: Option<SocketAddr>,

    /// Address for the health endpoints, or "off"
    #[arg(long)]
    http_bind: Option<String>,

    /// Redis URL holding the zones
    #[arg(short, long)]
    redis_url: Option<String>,

    /// Zone list refresh interval in seconds
    #[arg(long)]
    refresh_interval: Option<u64>,

    /// Log filter used when RUST_LOG is not set
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

impl Args {
    fn apply(self, config: &mut Config) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        if let Some(bind) = self.bind {
            config.bind_addr = bind;
        }
        if let Some(http_bind) = self.http_bind {
            config.http_bind_addr = parse_http_bind_addr(&http_bind)?;
        }
        if let Some(url) = self.redis_url {
            config.redis.url = url;
        }
        if let Some(secs) = self.refresh_interval {
            config.zone_refresh_interval = Duration::from_secs(secs);
        }
        config.validate()?;
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(args.log_level.as_str()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            return Err(e.into());
        }
    };
    args.apply(&mut config)?;

    info!("Starting redzone with config: {:?}", config);

    let store: Arc<dyn RecordStore> = Arc::new(config.redis.connect().await?);

    let zones = Arc::new(ZoneNameCache::new(Arc::clone(&store)));
    if let Err(e) = zones.start().await {
        error!("{}", e);
        std::process::exit(1);
    }
    let refresh_handle = zones.spawn_refresh(config.zone_refresh_interval);

    let plugin = Arc::new(RedisPlugin::new(
        Arc::clone(&store),
        Arc::clone(&zones),
        config.plugin_settings(),
    ));
    let handler: Arc<dyn Handler> = plugin.clone();

    let (shutdown_tx, _) = broadcast::channel(1);

    let udp_server = tokio::spawn(run_udp_server(
        config.bind_addr,
        Arc::clone(&handler),
        shutdown_tx.subscribe(),
    ));
    let tcp_server = tokio::spawn(run_tcp_server(
        config.bind_addr,
        Arc::clone(&handler),
        config.tcp_idle_timeout,
        shutdown_tx.subscribe(),
    ));

    let http_server = config.http_bind_addr.map(|http_addr| {
        let server = HttpServer::new(Arc::clone(&plugin), http_addr);
        tokio::spawn(server.start(shutdown_tx.subscribe()))
    });

    tokio::signal::ctrl_c().await?;
    info!("Received shutdown signal, stopping");

    refresh_handle.abort();
    if shutdown_tx.send(()).is_err() {
        warn!("No running servers to notify of shutdown");
    }

    for (name, task) in [("UDP", udp_server), ("TCP", tcp_server)] {
        match task.await {
            Ok(Ok(())) => info!("{} server stopped", name),
            Ok(Err(e)) => error!("{} server error: {}", name, e),
            Err(e) => error!("{} server task failed: {}", name, e),
        }
    }
    if let Some(task) = http_server {
        match task.await {
            Ok(Ok(())) => info!("HTTP server stopped"),
            Ok(Err(e)) => error!("HTTP server error: {}", e),
            Err(e) => error!("HTTP server task failed: {}", e),
        }
    }

    Ok(())
}
