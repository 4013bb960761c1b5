// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// USSD relay desktop host.
//
// Entry point. Initialises logging and config, wires a simulated device into
// the plugin, then serves the method and event endpoints as JSON lines over
// stdin/stdout. Logs go to stderr.

mod protocol;

use std::path::PathBuf;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use ussd_bridge::stub::{IssuedRequest, StubBridge, StubModem, StubProfile};
use ussd_bridge::{PluginHandle, UssdPlugin};
use ussd_core::types::MethodResponse;
use ussd_core::{BridgeConfig, UssdError};

use protocol::{HostInput, HostOutput, SimulatedCallback, method_call};

const CONFIG_ENV: &str = "USSD_BRIDGE_CONFIG";

/// Command-line options.
#[derive(Debug, Default)]
struct Options {
    config: Option<PathBuf>,
    /// Simulate the dialer-only platform instead of Android.
    ios: bool,
}

impl Options {
    fn parse(mut args: impl Iterator<Item = String>) -> Result<Self, String> {
        let mut options = Self::default();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--config" => {
                    let path = args.next().ok_or("--config needs a path")?;
                    options.config = Some(PathBuf::from(path));
                }
                "--platform" => match args.next().as_deref() {
                    Some("android") => options.ios = false,
                    Some("ios") => options.ios = true,
                    other => return Err(format!("unknown platform: {other:?}")),
                },
                other => return Err(format!("unknown argument: {other}")),
            }
        }
        if options.config.is_none() {
            options.config = std::env::var_os(CONFIG_ENV).map(PathBuf::from);
        }
        Ok(options)
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let options = match Options::parse(std::env::args().skip(1)) {
        Ok(options) => options,
        Err(e) => {
            tracing::error!(error = %e, "usage: ussd-host [--config PATH] [--platform android|ios]");
            std::process::exit(2);
        }
    };

    let config = match &options.config {
        Some(path) => BridgeConfig::load_or_default(path),
        None => BridgeConfig::default(),
    };

    let profile = if options.ios {
        StubProfile::ios("17.4")
    } else {
        StubProfile {
            min_sdk_version: config.min_sdk_version,
            ..StubProfile::default()
        }
    };

    tracing::info!(
        method_channel = %config.method_channel,
        event_channel = %config.event_channel,
        platform = %profile.platform,
        "USSD host starting"
    );

    let (bridge, modem) = StubBridge::simulated(profile);
    let (plugin, handle) = UssdPlugin::new(Box::new(bridge), config);
    let plugin_task = tokio::spawn(plugin.run());

    let (out, out_rx) = mpsc::unbounded_channel();
    let printer = tokio::spawn(print_lines(out_rx));

    if let Err(e) = serve(&handle, modem, out).await {
        tracing::error!(error = %e, "stdin read failed");
    }

    handle.detach();
    if let Err(e) = plugin_task.await {
        tracing::error!(error = %e, "plugin task failed");
    }
    if let Err(e) = printer.await {
        tracing::error!(error = %e, "printer task failed");
    }
    tracing::info!("USSD host stopped");
}

/// Read stdin until EOF, dispatching each line.
async fn serve(
    handle: &PluginHandle,
    mut modem: StubModem,
    out: mpsc::UnboundedSender<HostOutput>,
) -> std::io::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut latest: Option<IssuedRequest> = None;
    let mut listener: Option<tokio::task::JoinHandle<()>> = None;

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let input = match HostInput::parse(line) {
            Ok(input) => input,
            Err(e) => {
                emit(&out, HostOutput::Error {
                    message: format!("bad input line: {e}"),
                });
                continue;
            }
        };

        match input {
            HostInput::Call {
                id,
                method,
                arguments,
            } => {
                let pending = handle.invoke_deferred(method_call(method.clone(), arguments));
                let out = out.clone();
                tokio::spawn(async move {
                    let response = pending.await.unwrap_or_else(|_| {
                        MethodResponse::from_error(&UssdError::SessionClosed)
                    });
                    emit(&out, HostOutput::response(id, method, response));
                });
                // Let the plugin record the request before the next line.
                tokio::task::yield_now().await;
            }
            HostInput::Simulate {
                simulate,
                text,
                code,
            } => {
                while let Some(request) = modem.try_next_request() {
                    latest = Some(request);
                }
                let fired = match (&latest, simulate) {
                    (Some(request), SimulatedCallback::Response) => {
                        request.respond(text.as_deref().unwrap_or_default())
                    }
                    (Some(request), SimulatedCallback::Failure) => {
                        request.fail(code.unwrap_or(ussd_core::human_errors::USSD_RETURN_FAILURE))
                    }
                    (None, _) => false,
                };
                if !fired {
                    emit(&out, HostOutput::Error {
                        message: "no USSD session to answer".into(),
                    });
                }
            }
            HostInput::Listen { listen: true } => {
                let mut events = handle.listen();
                let out = out.clone();
                if let Some(previous) = listener.take() {
                    previous.abort();
                }
                listener = Some(tokio::spawn(async move {
                    while let Some(outcome) = events.next().await {
                        emit(&out, HostOutput::event(outcome.to_response()));
                    }
                }));
            }
            HostInput::Listen { listen: false } => {
                handle.cancel();
            }
        }
    }

    Ok(())
}

fn emit(out: &mpsc::UnboundedSender<HostOutput>, line: HostOutput) {
    if out.send(line).is_err() {
        tracing::debug!("stdout printer gone, line dropped");
    }
}

async fn print_lines(mut lines: mpsc::UnboundedReceiver<HostOutput>) {
    while let Some(line) = lines.recv().await {
        match serde_json::to_string(&line) {
            Ok(json) => println!("{json}"),
            Err(e) => tracing::error!(error = %e, "could not serialise output line"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> impl Iterator<Item = String> {
        list.iter().map(|s| s.to_string()).collect::<Vec<_>>().into_iter()
    }

    #[test]
    fn parses_config_and_platform() {
        let options = Options::parse(args(&["--config", "bridge.json", "--platform", "ios"])).unwrap();
        assert_eq!(options.config, Some(PathBuf::from("bridge.json")));
        assert!(options.ios);
    }

    #[test]
    fn rejects_unknown_arguments() {
        assert!(Options::parse(args(&["--verbose"])).is_err());
        assert!(Options::parse(args(&["--platform", "symbian"])).is_err());
        assert!(Options::parse(args(&["--config"])).is_err());
    }
}
