use std::fs;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use chronolink_node::{
    forward_queue, BackendInterface, BackendResponse, ChannelConfig, DeviceOrchestrator,
    OrchestratorConfig, ReliableCommandChannel, Uplink,
};
use chronolink_transport::{StagedTransmitter, Transport, UnixDomainSocket};
use serde_json::Value;
use tracing::info;

use crate::cmd::MasterArgs;
use crate::exit::{
    io_error, node_error, transport_error, CliError, CliResult, FAILURE, INTERNAL, SUCCESS, USAGE,
};
use crate::output::{print_response, OutputFormat};

pub fn run(args: MasterArgs, format: OutputFormat) -> CliResult<i32> {
    let response_timeout = parse_duration(&args.response_timeout)?;
    let linger = args.linger.as_deref().map(parse_duration).transpose()?;
    let requests = load_requests(&args)?;

    let link = UnixDomainSocket::connect(&args.path)
        .map_err(|err| transport_error("connect failed", err))?;
    let channel = ReliableCommandChannel::with_config(
        link,
        ChannelConfig {
            response_timeout,
            retry_times: args.retries,
            ..ChannelConfig::default()
        },
    );

    let config = OrchestratorConfig {
        forward_timeout: forward_timeout(response_timeout, args.retries),
        ..OrchestratorConfig::default()
    };
    let (forwarder, receiver) = forward_queue(config.queue_capacity);
    let mut orchestrator = DeviceOrchestrator::new(channel, config.clone());
    if let Some(path) = &args.uplink {
        let link = UnixDomainSocket::connect(path)
            .map_err(|err| transport_error("uplink connect failed", err))?;
        let uplink: Uplink = Arc::new(StagedTransmitter::new(
            Box::new(link) as Box<dyn Transport>
        ));
        orchestrator = orchestrator.with_uplink(uplink);
    }
    let worker = orchestrator
        .spawn(receiver)
        .map_err(|err| node_error("orchestrator start failed", err))?;
    let backend = BackendInterface::new(forwarder, config);

    let mut failed = 0usize;
    for request in &requests {
        let response = match serde_json::from_str::<Value>(request) {
            Ok(value) => backend.handle_value(value),
            Err(err) => BackendResponse::error("", format!("malformed request: {err}")),
        };
        if !response.is_ok() {
            failed += 1;
        }
        print_response(&response, format);
    }

    if let Some(linger) = linger {
        let running = Arc::new(AtomicBool::new(true));
        install_ctrlc_handler(running.clone())?;
        info!(?linger, "keeping test cycle alive");
        let until = Instant::now() + linger;
        while running.load(Ordering::SeqCst) && Instant::now() < until {
            thread::sleep(Duration::from_millis(50));
        }
    }

    drop(backend);
    match worker.join() {
        Ok(result) => result.map_err(|err| node_error("orchestrator failed", err))?,
        Err(_) => return Err(CliError::new(INTERNAL, "orchestrator thread panicked")),
    }

    Ok(if failed == 0 { SUCCESS } else { FAILURE })
}

/// Requests from `--request`, or the non-empty, non-`#` lines of `--file`.
fn load_requests(args: &MasterArgs) -> CliResult<Vec<String>> {
    if let Some(request) = &args.request {
        return Ok(vec![request.clone()]);
    }
    if let Some(path) = &args.file {
        let text = fs::read_to_string(path)
            .map_err(|err| io_error(&format!("failed reading {}", path.display()), err))?;
        return Ok(text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(str::to_string)
            .collect());
    }
    Err(CliError::new(USAGE, "either --request or --file is required"))
}

/// Reply wait for one forwarded command: every attempt against a batch of
/// silent devices, with a 5 s floor.
fn forward_timeout(response_timeout: Duration, retries: u32) -> Duration {
    let per_device = response_timeout.saturating_mul(retries.saturating_add(1));
    per_device
        .saturating_mul(8)
        .max(OrchestratorConfig::default().forward_timeout)
}

fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        _ => Ok(Duration::from_secs(value)),
    }
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::path::PathBuf;

    use super::*;

    fn args(request: Option<&str>, file: Option<PathBuf>) -> MasterArgs {
        MasterArgs {
            path: PathBuf::from("/tmp/medium.sock"),
            request: request.map(str::to_string),
            file,
            uplink: None,
            response_timeout: "500ms".to_string(),
            retries: 3,
            linger: None,
        }
    }

    #[test]
    fn parse_duration_seconds_and_millis() {
        assert_eq!(parse_duration("2s").unwrap(), Duration::from_secs(2));
        assert_eq!(parse_duration("150ms").unwrap(), Duration::from_millis(150));
        assert_eq!(parse_duration("3").unwrap(), Duration::from_secs(3));
    }

    #[test]
    fn parse_duration_rejects_invalid_values() {
        assert!(parse_duration("0s").is_err());
        assert!(parse_duration("bad").is_err());
        assert_eq!(parse_duration("").unwrap_err().code, USAGE);
    }

    #[test]
    fn forward_timeout_covers_retries() {
        assert_eq!(
            forward_timeout(Duration::from_millis(500), 3),
            Duration::from_secs(16)
        );
        assert_eq!(
            forward_timeout(Duration::from_millis(10), 0),
            Duration::from_secs(5)
        );
    }

    #[test]
    fn request_file_skips_blank_and_comment_lines() {
        let path = std::env::temp_dir().join(format!(
            "chronolink-requests-{}-{}.jsonl",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .expect("time should be after epoch")
                .as_nanos()
        ));
        let mut file = fs::File::create(&path).expect("request file");
        writeln!(file, "# query first").expect("write");
        writeln!(file, r#"{{"inst":"DEV_QUERY","params":["*"]}}"#).expect("write");
        writeln!(file).expect("write");
        writeln!(file, r#"  {{"inst":"DEV_CTRL","ctrl":0}}  "#).expect("write");
        drop(file);

        let requests = load_requests(&args(None, Some(path.clone()))).expect("requests");
        assert_eq!(
            requests,
            vec![
                r#"{"inst":"DEV_QUERY","params":["*"]}"#.to_string(),
                r#"{"inst":"DEV_CTRL","ctrl":0}"#.to_string(),
            ]
        );
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn single_request_is_used_verbatim() {
        let requests = load_requests(&args(Some("{}"), None)).expect("requests");
        assert_eq!(requests, vec!["{}".to_string()]);
    }

    #[test]
    fn missing_request_file_is_reported() {
        let err = load_requests(&args(None, Some(PathBuf::from("/nonexistent/req.jsonl"))))
            .expect_err("missing file");
        assert_eq!(err.code, FAILURE);
    }
}
