use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time;
use tracing::{debug, info_span, warn, Instrument};

use crate::transport::{OpenSshTransport, Transport};
use crate::types::{millis, now, CommandResult, CommandStatus, DeviceDescriptor, TimeoutStage};

/// Bound on releasing a session; a close that overruns is abandoned and the
/// session is dropped instead.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    #[serde(with = "millis", rename = "connect_timeout_ms")]
    pub connect_timeout: Duration,
    #[serde(with = "millis", rename = "command_timeout_ms")]
    pub command_timeout: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            command_timeout: Duration::from_secs(30),
        }
    }
}

/// Runs single commands on remote hosts, one fresh session per command.
///
/// The executor never retries and never pools sessions. Every failure mode
/// ends up in the returned [`CommandResult`]; the session opened for a call
/// is closed before that call returns.
#[derive(Clone)]
pub struct Executor {
    transport: Arc<dyn Transport>,
    config: ExecutorConfig,
}

impl Executor {
    pub fn new(config: ExecutorConfig) -> Self {
        Self::with_transport(Arc::new(OpenSshTransport::default()), config)
    }

    pub fn with_transport(transport: Arc<dyn Transport>, config: ExecutorConfig) -> Self {
        Self { transport, config }
    }

    pub fn config(&self) -> ExecutorConfig {
        self.config
    }

    pub async fn execute(&self, device: &DeviceDescriptor, command: &str) -> CommandResult {
        let span = info_span!("execute", host = device.host(), command);
        self.execute_inner(device, command).instrument(span).await
    }

    /// Run each command in its own session, in order.
    pub async fn execute_all(
        &self,
        device: &DeviceDescriptor,
        commands: &[&str],
    ) -> Vec<CommandResult> {
        let mut out = Vec::with_capacity(commands.len());
        for command in commands {
            out.push(self.execute(device, command).await);
        }
        out
    }

    async fn execute_inner(&self, device: &DeviceDescriptor, command: &str) -> CommandResult {
        let connect_timeout = self.config.connect_timeout;
        let opened = time::timeout(connect_timeout, self.transport.open(device, connect_timeout)).await;
        let mut session = match opened {
            Ok(Ok(session)) => session,
            Ok(Err(e)) => {
                warn!(error = %e, "session could not be opened");
                return failed(device, command, CommandStatus::TransportFailed { reason: e.to_string() });
            }
            Err(_) => {
                warn!(timeout_ms = connect_timeout.as_millis() as u64, "session establishment timed out");
                return failed(
                    device,
                    command,
                    CommandStatus::TimedOut {
                        stage: TimeoutStage::Connect,
                    },
                );
            }
        };
        debug!("session opened");

        let ran = time::timeout(self.config.command_timeout, session.exec(command)).await;

        if time::timeout(CLOSE_TIMEOUT, session.close()).await.is_err() {
            warn!("session close timed out; dropping it");
        } else {
            debug!("session closed");
        }

        match ran {
            Ok(Ok(out)) => {
                if out.exit_code != 0 {
                    debug!(exit_code = out.exit_code, "command exited non-zero");
                }
                CommandResult {
                    host: device.host().to_string(),
                    command: command.to_string(),
                    stdout: out.stdout,
                    stderr: out.stderr,
                    status: CommandStatus::Exited {
                        code: out.exit_code,
                    },
                    observed_at: now(),
                }
            }
            Ok(Err(e)) => {
                warn!(error = %e, "command failed in transport");
                failed(device, command, CommandStatus::TransportFailed { reason: e.to_string() })
            }
            Err(_) => {
                warn!("command timed out");
                failed(
                    device,
                    command,
                    CommandStatus::TimedOut {
                        stage: TimeoutStage::Command,
                    },
                )
            }
        }
    }
}

fn failed(device: &DeviceDescriptor, command: &str, status: CommandStatus) -> CommandResult {
    CommandResult {
        host: device.host().to_string(),
        command: command.to_string(),
        stdout: String::new(),
        stderr: String::new(),
        status,
        observed_at: now(),
    }
}
