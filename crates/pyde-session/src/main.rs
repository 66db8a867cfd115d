//! pyde-console: terminal front-end for an interpreter worker.
//!
//! Reads one submission per stdin line, sends it to the worker, and prints
//! the streamed stdout/stderr until the worker reports the turn complete.

use std::io::Write;
use std::net::IpAddr;
use std::process;
use std::time::Duration;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};

use pyde_session::config::{self, parse_poll_interval, parse_value};
use pyde_session::{
    CommandSpawner, Console, OutputStream, Session, SessionConfig, SessionError, TranscriptEntry,
    TranscriptSink, UdpTransport, WorkerSpawner, logging,
};

const USAGE: &str = "\
Usage: pyde-console [options] [--worker-cmd <program> [args...]]

Options:
  --worker-port <port>       Port the worker listens on [default: 3000]
  --receive-port <port>      Port this console listens on [default: 3001]
  --host <addr>              Address both processes use [default: 127.0.0.1]
  --poll-interval-ms <ms>    How often to drain worker messages [default: 100]
  --json                     Print transcript entries as JSON lines
  --worker-cmd <program> ... Launch the worker (consumes the remaining arguments)

Commands:
  :history                   List previous submissions
  :rerun <n>                 Submit previous submission <n> again";

#[derive(Debug, Default)]
struct Options {
    worker_port: Option<u16>,
    receive_port: Option<u16>,
    host: Option<IpAddr>,
    poll_interval: Option<Duration>,
    worker_command: Option<Vec<String>>,
    json: bool,
}

impl Options {
    fn apply(self, mut config: SessionConfig) -> SessionConfig {
        if let Some(port) = self.worker_port {
            config = config.with_worker_port(port);
        }
        if let Some(port) = self.receive_port {
            config = config.with_receive_port(port);
        }
        if let Some(host) = self.host {
            config = config.with_host(host);
        }
        if let Some(interval) = self.poll_interval {
            config = config.with_poll_interval(interval);
        }
        if let Some(command) = self.worker_command {
            config = config.with_worker_command(command);
        }
        config
    }
}

fn main() {
    let args: Vec<String> = std::env::args().collect();

    let options = match parse_args(&args) {
        Ok(options) => options,
        Err(msg) => {
            if !msg.is_empty() {
                eprintln!("error: {msg}");
                eprintln!();
            }
            eprintln!("{USAGE}");
            process::exit(2);
        }
    };

    logging::init_tracing();

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("error: failed to create runtime: {e}");
            process::exit(1);
        }
    };

    if let Err(e) = runtime.block_on(run(options)) {
        eprintln!("error: {e:#}");
        process::exit(1);
    }
}

fn parse_args(args: &[String]) -> Result<Options, String> {
    let mut options = Options::default();

    let mut i = 1; // skip argv[0]
    while i < args.len() {
        let flag = args[i].as_str();
        match flag {
            "--worker-port" => {
                let value = next_value(args, &mut i, flag)?;
                options.worker_port = Some(parse_value(flag, value).map_err(|e| e.to_string())?);
            }
            "--receive-port" => {
                let value = next_value(args, &mut i, flag)?;
                options.receive_port = Some(parse_value(flag, value).map_err(|e| e.to_string())?);
            }
            "--host" => {
                let value = next_value(args, &mut i, flag)?;
                options.host = Some(parse_value(flag, value).map_err(|e| e.to_string())?);
            }
            "--poll-interval-ms" => {
                let value = next_value(args, &mut i, flag)?;
                options.poll_interval =
                    Some(parse_poll_interval(flag, value).map_err(|e| e.to_string())?);
            }
            "--json" => options.json = true,
            "--worker-cmd" => {
                let command = args[i + 1..].to_vec();
                if command.is_empty() {
                    return Err("--worker-cmd requires a program".to_string());
                }
                options.worker_command = Some(command);
                break;
            }
            "--help" | "-h" => return Err(String::new()),
            other => return Err(format!("unknown argument: {other}")),
        }
        i += 1;
    }

    Ok(options)
}

fn next_value<'a>(args: &'a [String], i: &mut usize, flag: &str) -> Result<&'a str, String> {
    *i += 1;
    args.get(*i)
        .map(String::as_str)
        .ok_or_else(|| format!("{flag} requires a value"))
}

async fn run(options: Options) -> anyhow::Result<()> {
    let json = options.json;
    let config = options.apply(SessionConfig::from_env()?);
    tracing::info!(
        worker_port = config.worker_port,
        receive_port = config.receive_port,
        host = %config.host,
        "pyde-console {}",
        env!("CARGO_PKG_VERSION")
    );

    // Held for the whole session; dropping it kills the worker.
    let _worker = match &config.worker_command {
        Some(command) => Some(CommandSpawner::from_command_line(command)?.spawn()?),
        None => None,
    };

    let transport = UdpTransport::bind_console(config.host, config.receive_port)
        .await
        .with_context(|| format!("cannot listen on port {}", config.receive_port))?;
    let session = Session::new(transport, TerminalSink::new(json), &config);
    let mut console = Console::new(session);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        if !console.is_locked() {
            prompt(json);
        }

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted");
                break;
            }

            _ = console.session_mut().tick() => {
                console.session_mut().poll()?;
            }

            line = lines.next_line(), if !console.is_locked() => {
                match line.context("reading stdin")? {
                    Some(line) => handle_line(&mut console, &line)?,
                    None => break,
                }
            }
        }
    }

    if console.is_locked() {
        tracing::warn!("Exiting with a submission still in flight");
    }
    Ok(())
}

fn handle_line(
    console: &mut Console<UdpTransport, TerminalSink>,
    line: &str,
) -> anyhow::Result<()> {
    if line.trim() == ":history" {
        for submission in console.session().history().iter() {
            eprintln!("[{}] {}", submission.index, submission.text);
        }
        return Ok(());
    }

    if let Some(rest) = line.trim().strip_prefix(":rerun") {
        let index: usize = match config::parse_value(":rerun", rest) {
            Ok(index) => index,
            Err(e) => {
                eprintln!("{e}");
                return Ok(());
            }
        };
        if let Err(e) = console.insert_previous(index, true) {
            eprintln!("{e}");
            return Ok(());
        }
    } else {
        console.input_mut().set(line);
    }

    match console.submit() {
        Ok(_) | Err(SessionError::EmptySubmission) => Ok(()),
        Err(SessionError::Transport(e)) => {
            // Usually the worker is not listening yet; keep the session alive.
            eprintln!("error: {e}");
            console.input_mut().clear();
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

fn prompt(json: bool) {
    if json {
        return;
    }
    eprint!(">>> ");
    let _ = std::io::stderr().flush();
}

/// Transcript sink that writes straight to the terminal.
struct TerminalSink {
    json: bool,
}

impl TerminalSink {
    fn new(json: bool) -> Self {
        Self { json }
    }

    fn emit_json(&self, entry: &TranscriptEntry) {
        match serde_json::to_string(entry) {
            Ok(line) => println!("{line}"),
            Err(e) => tracing::error!(error = %e, "Failed to serialize transcript entry"),
        }
    }
}

impl TranscriptSink for TerminalSink {
    fn append_submission(&mut self, text: &str, index: usize) {
        if self.json {
            self.emit_json(&TranscriptEntry::Submission {
                index,
                text: text.to_string(),
            });
        }
        // The terminal already echoed what was typed.
    }

    fn append_output(&mut self, text: &str, stream: OutputStream) {
        if self.json {
            self.emit_json(&TranscriptEntry::Output {
                stream,
                text: text.to_string(),
            });
            return;
        }
        match stream {
            OutputStream::Stdout => {
                print!("{text}");
                let _ = std::io::stdout().flush();
            }
            OutputStream::Stderr => {
                eprint!("{text}");
                let _ = std::io::stderr().flush();
            }
        }
    }

    fn append_completion_marker(&mut self) {
        if self.json {
            self.emit_json(&TranscriptEntry::CompletionMarker);
        }
    }

    fn set_locked(&mut self, locked: bool) {
        tracing::trace!(locked, "Input lock changed");
    }

    fn flash_input_fail(&mut self) {
        if !self.json {
            // Terminal bell.
            eprint!("\x07");
            let _ = std::io::stderr().flush();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        std::iter::once("pyde-console")
            .chain(list.iter().copied())
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn no_arguments_gives_empty_options() {
        let options = parse_args(&args(&[])).unwrap();
        assert!(options.worker_port.is_none());
        assert!(!options.json);
    }

    #[test]
    fn flags_override_config() {
        let options = parse_args(&args(&[
            "--worker-port",
            "4000",
            "--receive-port",
            "4001",
            "--poll-interval-ms",
            "20",
            "--json",
        ]))
        .unwrap();
        assert!(options.json);

        let config = options.apply(SessionConfig::default());
        assert_eq!(config.worker_port, 4000);
        assert_eq!(config.receive_port, 4001);
        assert_eq!(config.poll_interval, Duration::from_millis(20));
    }

    #[test]
    fn worker_cmd_consumes_remaining_arguments() {
        let options =
            parse_args(&args(&["--json", "--worker-cmd", "python3", "-u", "worker.py"])).unwrap();
        assert_eq!(
            options.worker_command,
            Some(vec![
                "python3".to_string(),
                "-u".to_string(),
                "worker.py".to_string()
            ])
        );
    }

    #[test]
    fn bad_values_are_errors() {
        assert!(parse_args(&args(&["--worker-port", "nope"])).is_err());
        assert!(parse_args(&args(&["--worker-port"])).is_err());
        assert!(parse_args(&args(&["--worker-cmd"])).is_err());
        assert!(parse_args(&args(&["--verbose"])).is_err());
    }

    #[test]
    fn help_is_an_empty_error() {
        assert_eq!(parse_args(&args(&["--help"])).unwrap_err(), "");
    }
}
