/// Headless host loop.
///
/// Reads one `ClientMessage` JSON object per stdin line and answers with
/// `HostMessage` lines on stdout. Watcher notifications for the plan are
/// fed through the session so external edits get logged, and the refreshed
/// board is pushed as `updateView`.
use std::future::pending;
use std::time::Duration;

use anyhow::Result;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::broadcast::{self, error::RecvError};

use planboard_core::config::PlanConfig;
use planboard_core::protocol::{dispatch, on_plan_event, ClientMessage, HostMessage};
use planboard_core::session::PlanSession;
use planboard_core::watcher::file_watcher::PlanWatcher;
use planboard_core::watcher::types::PlanEvent;

const CLEANUP_INTERVAL: Duration = Duration::from_secs(5);

pub async fn run(session: PlanSession, config: &PlanConfig) -> Result<()> {
    let (_watcher, events) = match session.backend().watch_target(&config.plan_path) {
        Some(target) => match PlanWatcher::new(&target, config.debounce()) {
            Ok((watcher, rx)) => {
                log::info!(
                    "[planboard.serve] Following changes through {}",
                    watcher.target().display()
                );
                (Some(watcher), Some(rx))
            }
            Err(e) => {
                log::warn!("[planboard.serve] File watcher unavailable: {}", e);
                (None, None)
            }
        },
        None => (None, None),
    };

    let stdin = BufReader::new(tokio::io::stdin());
    let stdout = tokio::io::stdout();
    tokio::select! {
        result = host_loop(session, stdin, stdout, events) => result,
        _ = tokio::signal::ctrl_c() => {
            log::info!("[planboard.serve] Interrupted, shutting down");
            Ok(())
        }
    }
}

async fn next_event(
    events: &mut Option<broadcast::Receiver<PlanEvent>>,
) -> Result<PlanEvent, RecvError> {
    match events {
        Some(rx) => rx.recv().await,
        None => pending().await,
    }
}

async fn send<W: AsyncWrite + Unpin>(output: &mut W, message: &HostMessage) -> Result<()> {
    let mut line = serde_json::to_string(message)?;
    line.push('\n');
    output.write_all(line.as_bytes()).await?;
    output.flush().await?;
    Ok(())
}

fn parse_line(line: &str) -> Result<ClientMessage, HostMessage> {
    serde_json::from_str(line).map_err(|e| {
        log::warn!("[planboard.serve] Bad message {:?}: {}", line, e);
        HostMessage::Error {
            message: format!("Invalid message: {}", e),
        }
    })
}

/// Run until input closes or the event channel shuts down.
pub async fn host_loop<R, W>(
    mut session: PlanSession,
    input: R,
    mut output: W,
    mut events: Option<broadcast::Receiver<PlanEvent>>,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = input.lines();
    let mut cleanup = tokio::time::interval(CLEANUP_INTERVAL);
    log::info!("[planboard.serve] Host loop ready on {}", session.backend().describe());

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    log::info!("[planboard.serve] Input closed");
                    break;
                };
                if line.trim().is_empty() {
                    continue;
                }
                let replies = match parse_line(&line) {
                    Ok(message) => dispatch(&mut session, message).await,
                    Err(error) => vec![error],
                };
                for reply in &replies {
                    send(&mut output, reply).await?;
                }
            }
            result = next_event(&mut events) => {
                match result {
                    Ok(event) => {
                        let reply = on_plan_event(&mut session, event).await;
                        send(&mut output, &reply).await?;
                    }
                    Err(RecvError::Lagged(n)) => {
                        log::warn!("[planboard.serve] Lagged by {} events", n);
                        let reply = on_plan_event(&mut session, PlanEvent::Changed).await;
                        send(&mut output, &reply).await?;
                    }
                    Err(RecvError::Closed) => {
                        log::info!("[planboard.serve] Event channel closed");
                        events = None;
                    }
                }
            }
            _ = cleanup.tick() => session.cleanup_expired_writes(),
        }
    }

    Ok(())
}
