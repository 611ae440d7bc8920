//! CLI command handling
//!
//! Dispatches CLI commands to the daemon and formats output.

mod spawn;

use colored::Colorize;
use serde_json::Value;

use crate::cdp::TargetInfo;
use crate::commands::Commands;
use crate::common::{logging, Error, Result};
use crate::intercept::headers::{HeadersPatch, PatchHeaderEntry};
use crate::intercept::{ExchangeId, TargetId};
use crate::ipc::protocol::{
    BodyFetched, Command, Event, RequestIntercepted, RequestPatch, ResponseIntercepted,
    ResponsePatch, StatusResult,
};
use crate::ipc::DaemonClient;

/// Dispatch a CLI command
pub async fn dispatch(command: Commands) -> Result<()> {
    match command {
        Commands::Daemon => Err(Error::Internal(
            "daemon mode is handled by the entry point".to_string(),
        )),

        Commands::Targets => {
            let mut client = connect_spawning().await?;
            let result = client.send_command(Command::ListTargets).await?;
            let targets: Vec<TargetInfo> = serde_json::from_value(result["targets"].clone())?;

            if targets.is_empty() {
                println!("No tabs found");
            }
            for target in &targets {
                let marker = if target.attached { "*" } else { " " };
                println!("{} {}  {}", marker, target.target_id.bold(), target.title);
                println!("    {}", target.url.dimmed());
            }
            Ok(())
        }

        Commands::Watch { target, json } => watch(TargetId::new(target), json).await,

        Commands::Continue {
            exchange_id,
            url,
            method,
            headers,
            body,
        } => {
            let patch = RequestPatch {
                url,
                method,
                headers: parse_headers(&headers)?,
                body,
            };
            let patch = (patch != RequestPatch::default()).then_some(patch);

            let mut client = DaemonClient::connect().await?;
            let result = client
                .send_command(Command::ContinueRequest {
                    exchange_id: ExchangeId::new(exchange_id.as_str()),
                    patch,
                })
                .await?;
            print_resolution(&exchange_id, "continued", &result);
            Ok(())
        }

        Commands::Respond {
            exchange_id,
            status,
            headers,
            body,
        } => {
            let patch = ResponsePatch {
                status,
                headers: parse_headers(&headers)?,
                body,
            };
            let patch = (patch != ResponsePatch::default()).then_some(patch);

            let mut client = DaemonClient::connect().await?;
            let result = client
                .send_command(Command::ContinueResponse {
                    exchange_id: ExchangeId::new(exchange_id.as_str()),
                    patch,
                })
                .await?;
            print_resolution(&exchange_id, "fulfilled", &result);
            Ok(())
        }

        Commands::Block { exchange_id } => {
            let mut client = DaemonClient::connect().await?;
            let result = client
                .send_command(Command::Block {
                    exchange_id: ExchangeId::new(exchange_id.as_str()),
                })
                .await?;
            print_resolution(&exchange_id, "blocked", &result);
            Ok(())
        }

        Commands::Body {
            target,
            exchange_id,
        } => {
            let mut client = DaemonClient::connect().await?;
            let result = client
                .send_command(Command::FetchBody {
                    target: TargetId::new(target),
                    exchange_id: ExchangeId::new(exchange_id),
                })
                .await?;
            let body: BodyFetched = serde_json::from_value(result)?;

            if !body.available {
                println!("{}", "Body not available".yellow());
            } else if body.is_binary_encoded {
                println!("{}", "[base64-encoded]".dimmed());
                println!("{}", body.body);
            } else {
                println!("{}", body.body);
            }
            Ok(())
        }

        Commands::Detach { target } => {
            let mut client = DaemonClient::connect().await?;
            let result = client
                .send_command(Command::Detach {
                    target: TargetId::new(target.as_str()),
                })
                .await?;
            if result["was_attached"].as_bool().unwrap_or(false) {
                println!("Detached from {}", target);
            } else {
                println!("{} was not attached", target);
            }
            Ok(())
        }

        Commands::Status => {
            match DaemonClient::connect().await {
                Ok(mut client) => {
                    let result = client.send_command(Command::Status).await?;
                    let status: StatusResult = serde_json::from_value(result)?;
                    print_status(&status);
                }
                Err(Error::DaemonNotRunning) => {
                    println!("Daemon: not running");
                }
                Err(e) => return Err(e),
            }
            Ok(())
        }

        Commands::Stop => {
            match DaemonClient::connect().await {
                Ok(mut client) => {
                    client.send_command(Command::Shutdown).await?;
                    println!("Daemon stopped");
                }
                Err(Error::DaemonNotRunning) => println!("Daemon is not running"),
                Err(e) => return Err(e),
            }
            Ok(())
        }

        Commands::Logs { lines } => {
            let path = logging::daemon_log_path()
                .ok_or_else(|| Error::Config("Could not determine log directory".to_string()))?;
            let content = std::fs::read_to_string(&path).map_err(|e| Error::FileRead {
                path: path.display().to_string(),
                error: e.to_string(),
            })?;

            let all: Vec<&str> = content.lines().collect();
            let start = all.len().saturating_sub(lines);
            for line in &all[start..] {
                println!("{}", line);
            }
            Ok(())
        }
    }
}

async fn connect_spawning() -> Result<DaemonClient> {
    spawn::ensure_daemon_running().await?;
    DaemonClient::connect().await
}

/// Attach and stream events until the session ends or Ctrl+C
async fn watch(target: TargetId, json: bool) -> Result<()> {
    let mut client = connect_spawning().await?;

    let result = client
        .send_command(Command::Attach {
            target: target.clone(),
        })
        .await?;
    if result["already_attached"].as_bool().unwrap_or(false) {
        eprintln!(
            "{} {} is already being intercepted; events go to the first watcher",
            "!".yellow(),
            target
        );
    }

    loop {
        let event = tokio::select! {
            event = client.next_event() => event?,
            _ = tokio::signal::ctrl_c() => {
                client.send_command(Command::Detach { target: target.clone() }).await?;
                eprintln!("Detached from {}", target);
                return Ok(());
            }
        };

        if json {
            println!("{}", serde_json::to_string(&event)?);
        } else {
            print_event(&event);
        }

        match &event {
            Event::Detached { target: t, .. } if *t == target => return Ok(()),
            Event::AttachFailed { target: t, error } if *t == target => {
                return Err(Error::attach_failed(t.as_str(), error));
            }
            _ => {}
        }
    }
}

/// Parse repeated `Name: value` arguments into a patch header list
fn parse_headers(raw: &[String]) -> Result<Option<HeadersPatch>> {
    if raw.is_empty() {
        return Ok(None);
    }

    let entries = raw
        .iter()
        .map(|header| {
            let (name, value) = header.split_once(':').ok_or_else(|| {
                Error::MalformedData(format!("Header '{}' is not in 'Name: value' form", header))
            })?;
            Ok(PatchHeaderEntry {
                name: name.trim().to_string(),
                value: Value::String(value.trim().to_string()),
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(Some(HeadersPatch::List(entries)))
}

fn print_event(event: &Event) {
    match event {
        Event::Attached { target } => {
            println!("{} Intercepting {}", "✓".green(), target.to_string().bold());
        }
        Event::AttachFailed { target, error } => {
            println!("{} Could not attach to {}: {}", "✗".red(), target, error);
        }
        Event::Detached { target, reason } => {
            println!("{} Detached from {} ({})", "■".yellow(), target, reason);
        }
        Event::RequestIntercepted(request) => print_request(request),
        Event::ResponseIntercepted(response) => print_response(response),
        Event::BodyFetched(body) => {
            println!(
                "{} body for {} ({} bytes{})",
                "·".dimmed(),
                body.exchange_id,
                body.body.len(),
                if body.is_binary_encoded { ", base64" } else { "" }
            );
        }
    }
}

fn print_request(request: &RequestIntercepted) {
    println!(
        "{} {} {} {}",
        "→".cyan().bold(),
        request.exchange_id.to_string().bold(),
        request.method.cyan(),
        request.url
    );
    println!(
        "    {} · {} headers{}",
        request.resource_category.dimmed(),
        request.headers_list.len(),
        match &request.body {
            Some(body) => format!(" · {} byte body", body.len()),
            None => String::new(),
        }
    );
}

fn print_response(response: &ResponseIntercepted) {
    let status = format!("{} {}", response.status, response.status_text);
    let status = match response.status {
        200..=299 => status.green(),
        300..=399 => status.cyan(),
        400..=599 => status.red(),
        _ => status.yellow(),
    };
    println!(
        "{} {} {} {}",
        "←".magenta().bold(),
        response.exchange_id.to_string().bold(),
        status,
        response.url
    );
    println!(
        "    {} · {} headers",
        response.resource_category.dimmed(),
        response.headers.len()
    );
}

fn print_resolution(exchange_id: &str, action: &str, result: &Value) {
    if result["dispatched"].as_bool().unwrap_or(false) {
        println!("{} {} {}", "✓".green(), exchange_id, action);
    } else {
        println!(
            "{} {} is not paused (already resolved or its tab was detached)",
            "!".yellow(),
            exchange_id
        );
    }
}

fn print_status(status: &StatusResult) {
    println!("Daemon: running");

    if status.sessions.is_empty() {
        println!("Sessions: none");
    } else {
        println!("Sessions:");
        for session in &status.sessions {
            println!(
                "  {} (channel #{}, since {}){}",
                session.target.to_string().bold(),
                session.channel,
                session.created_at.format("%H:%M:%S"),
                if session.active { "" } else { " inactive" }
            );
        }
    }

    if status.pending.is_empty() {
        println!("Paused: none");
    } else {
        println!("Paused:");
        for exchange in &status.pending {
            let status = exchange
                .status
                .map(|s| format!(" {}", s))
                .unwrap_or_default();
            println!(
                "  {} [{}{}] {} {}",
                exchange.exchange_id.to_string().bold(),
                exchange.direction,
                status,
                exchange.method,
                exchange.url.dimmed()
            );
        }
    }
}
