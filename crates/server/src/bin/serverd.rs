use std::process;

use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

use durable_streams_server::server::start_server;
use durable_streams_server::types::ServerOptions;

#[derive(Parser, Debug)]
#[clap(author, version, about = "Durable streams server", long_about = None)]
struct Opts {
    /// Host to bind to
    #[arg(long, default_value = "127.0.0.1", env = "DURABLE_STREAMS_HOST")]
    host: String,

    /// Port to listen on (0 for auto-assign)
    #[arg(long, default_value_t = 4437, env = "DURABLE_STREAMS_PORT")]
    port: u16,

    /// Long-poll timeout in milliseconds
    #[arg(long, default_value_t = 30_000)]
    long_poll_timeout_ms: u64,

    /// CDN cursor interval in seconds
    #[arg(long, default_value_t = 20)]
    cursor_interval_seconds: u64,

    /// Seconds of inactivity before per-stream producer state is collected
    #[arg(long, default_value_t = 7 * 24 * 3600)]
    producer_idle_seconds: u64,

    /// Disable gzip/deflate response compression
    #[arg(long, default_value_t = false)]
    no_compression: bool,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let opts = match Opts::try_parse() {
        Ok(opts) => opts,
        Err(e) => {
            let _ = e.print();
            process::exit(e.exit_code());
        }
    };

    let options = ServerOptions {
        host: opts.host,
        port: opts.port,
        long_poll_timeout_ms: opts.long_poll_timeout_ms,
        cursor_interval_seconds: opts.cursor_interval_seconds,
        producer_idle_seconds: opts.producer_idle_seconds,
        compression: !opts.no_compression,
        ..Default::default()
    };

    if let Err(e) = start_server(options).await {
        error!(error = %e, "server exited with error");
        process::exit(1);
    }
}
