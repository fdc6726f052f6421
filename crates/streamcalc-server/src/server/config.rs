use anyhow::bail;
use clap::Parser;
use core::time::Duration;

/// Runtime configuration for the `streamcalc-server` binary.
///
/// These settings control buffering between a call's halves, the server-side
/// call budget and the pacing of the demonstration greeter methods. All values
/// are parsed from CLI arguments or environment variables, with defaults
/// suitable for local use.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "streamcalc-server",
    version,
    about = "A gRPC service exercising every streaming interaction shape"
)]
pub struct CliArgs {
    /// Address to listen on (TCP or Unix socket path; use --uds for Unix socket).
    ///
    /// Example: "0.0.0.0:50051" or "/tmp/streamcalc.sock"
    ///
    /// Environment variable: `SERVER_ADDR`
    #[arg(long, env = "SERVER_ADDR", default_value_t = String::from("0.0.0.0:50051"))]
    pub server_addr: String,

    /// Listen on a Unix socket instead of TCP. If set, `SERVER_ADDR` must be a file path.
    #[arg(short, long, default_value_t = false)]
    pub uds: bool,

    /// Capacity of the outbound half of every streaming response.
    ///
    /// A producer that gets this far ahead of the client waits for it to
    /// catch up. Lower values increase backpressure responsiveness; higher
    /// values enable deeper pipelining.
    ///
    /// Environment variable: `STREAM_BUFFER_SIZE`
    #[arg(long, env = "STREAM_BUFFER_SIZE", default_value_t = 8)]
    pub stream_buffer_size: usize,

    /// Capacity of the handoff between the inbound and outbound halves of a
    /// bidirectional call.
    ///
    /// Environment variable: `HANDOFF_BUFFER_SIZE`
    #[arg(long, env = "HANDOFF_BUFFER_SIZE", default_value_t = 4)]
    pub handoff_buffer_size: usize,

    /// Server-side budget for every call, in milliseconds. A caller's
    /// `grpc-timeout` can only shorten it. `0` disables it.
    ///
    /// Environment variable: `DEFAULT_TIMEOUT_MS`
    #[arg(long, env = "DEFAULT_TIMEOUT_MS", default_value_t = 0)]
    pub default_timeout_ms: u64,

    /// Number of greetings sent by `GreetManyTimes`.
    ///
    /// Environment variable: `GREET_REPEAT`
    #[arg(long, env = "GREET_REPEAT", default_value_t = 10)]
    pub greet_repeat: u32,

    /// Pause between two `GreetManyTimes` greetings, in milliseconds.
    ///
    /// Environment variable: `GREET_INTERVAL_MS`
    #[arg(long, env = "GREET_INTERVAL_MS", default_value_t = 1000)]
    pub greet_interval_ms: u64,

    /// How long `GreetWithDeadline` takes to answer, in milliseconds.
    ///
    /// Environment variable: `SLOW_GREET_MS`
    #[arg(long, env = "SLOW_GREET_MS", default_value_t = 3000)]
    pub slow_greet_ms: u64,

    /// Seconds in-flight calls get to finish once shutdown begins. Calls still
    /// running afterwards are aborted.
    ///
    /// Environment variable: `SHUTDOWN_TIMEOUT`
    #[arg(long, env = "SHUTDOWN_TIMEOUT", default_value_t = 3)]
    pub shutdown_timeout: u64,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub server_addr: String,
    pub uds: bool,
    pub stream_buffer_size: usize,
    pub handoff_buffer_size: usize,
    pub default_timeout: Option<Duration>,
    pub greet_repeat: u32,
    pub greet_interval: Duration,
    pub slow_greet: Duration,
    pub shutdown_timeout: Duration,
}

impl TryFrom<CliArgs> for ServerConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        if args.stream_buffer_size == 0 {
            bail!("STREAM_BUFFER_SIZE must be greater than 0");
        }

        if args.handoff_buffer_size == 0 {
            bail!("HANDOFF_BUFFER_SIZE must be greater than 0");
        }

        if args.uds && args.server_addr.parse::<std::net::SocketAddr>().is_ok() {
            bail!(
                "SERVER_ADDR ({}) must be a socket file path when --uds is set",
                args.server_addr
            );
        }

        let default_timeout =
            (args.default_timeout_ms > 0).then(|| Duration::from_millis(args.default_timeout_ms));

        Ok(Self {
            server_addr: args.server_addr,
            uds: args.uds,
            stream_buffer_size: args.stream_buffer_size,
            handoff_buffer_size: args.handoff_buffer_size,
            default_timeout,
            greet_repeat: args.greet_repeat,
            greet_interval: Duration::from_millis(args.greet_interval_ms),
            slow_greet: Duration::from_millis(args.slow_greet_ms),
            shutdown_timeout: Duration::from_secs(args.shutdown_timeout),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> anyhow::Result<ServerConfig> {
        let args = CliArgs::try_parse_from(
            std::iter::once("streamcalc-server").chain(args.iter().copied()),
        )?;
        ServerConfig::try_from(args)
    }

    #[test]
    fn flags_override_defaults() {
        let config = parse(&[
            "--stream-buffer-size",
            "2",
            "--default-timeout-ms",
            "1500",
            "--greet-interval-ms",
            "5",
        ])
        .unwrap();
        assert_eq!(config.stream_buffer_size, 2);
        assert_eq!(config.default_timeout, Some(Duration::from_millis(1500)));
        assert_eq!(config.greet_interval, Duration::from_millis(5));
    }

    #[test]
    fn zero_timeout_means_none() {
        let config = parse(&["--default-timeout-ms", "0"]).unwrap();
        assert_eq!(config.default_timeout, None);
    }

    #[test]
    fn rejects_empty_buffers() {
        assert!(parse(&["--stream-buffer-size", "0"]).is_err());
        assert!(parse(&["--handoff-buffer-size", "0"]).is_err());
    }

    #[test]
    fn uds_requires_a_path() {
        assert!(parse(&["--uds", "--server-addr", "127.0.0.1:50051"]).is_err());
        assert!(parse(&["--uds", "--server-addr", "/tmp/streamcalc.sock"]).is_ok());
    }
}
