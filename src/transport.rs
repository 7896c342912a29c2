//! Remote shell transports.
//!
//! A [`Transport`] opens one authenticated [`Session`] per call. The
//! production transport drives the system OpenSSH client: a single `ssh`
//! process runs a remote `sh` that reads commands from stdin, and each
//! command is followed by marker lines on stdout and stderr so output and
//! exit status can be split out of the byte streams.

use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use secrecy::ExposeSecret;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::time;
use tracing::{debug, warn};

use crate::error::TransportError;
use crate::types::DeviceDescriptor;

/// Output of one command inside a session.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RawOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Open an authenticated session. `connect_timeout` is a hint for the
    /// underlying client; callers enforce it independently.
    async fn open(
        &self,
        device: &DeviceDescriptor,
        connect_timeout: Duration,
    ) -> Result<Box<dyn Session>, TransportError>;
}

#[async_trait]
pub trait Session: Send {
    async fn exec(&mut self, command: &str) -> Result<RawOutput, TransportError>;

    /// Release the session. Must not fail; implementations log instead.
    async fn close(self: Box<Self>);
}

/// Spawns `ssh` (or `sshpass -e ssh` when the device carries a password).
#[derive(Debug, Clone)]
pub struct OpenSshTransport {
    ssh_program: String,
    sshpass_program: String,
    strict_host_key_checking: bool,
}

impl Default for OpenSshTransport {
    fn default() -> Self {
        Self {
            ssh_program: "ssh".into(),
            sshpass_program: "sshpass".into(),
            strict_host_key_checking: false,
        }
    }
}

impl OpenSshTransport {
    pub fn with_programs(ssh: impl Into<String>, sshpass: impl Into<String>) -> Self {
        Self {
            ssh_program: ssh.into(),
            sshpass_program: sshpass.into(),
            ..Self::default()
        }
    }

    pub fn strict_host_key_checking(mut self, strict: bool) -> Self {
        self.strict_host_key_checking = strict;
        self
    }

    fn command(&self, device: &DeviceDescriptor, connect_timeout: Duration) -> Command {
        let password = device.secret().expose_secret();
        let mut cmd;
        if password.is_empty() {
            cmd = Command::new(&self.ssh_program);
            cmd.arg("-o").arg("BatchMode=yes");
        } else {
            cmd = Command::new(&self.sshpass_program);
            cmd.arg("-e").arg(&self.ssh_program);
            cmd.env("SSHPASS", password);
            cmd.arg("-o").arg("PubkeyAuthentication=no");
        }

        let checking = if self.strict_host_key_checking {
            "StrictHostKeyChecking=yes"
        } else {
            "StrictHostKeyChecking=no"
        };
        let secs = connect_timeout.as_secs().max(1);
        cmd.arg("-o")
            .arg(checking)
            .arg("-o")
            .arg(format!("ConnectTimeout={secs}"))
            .arg("-o")
            .arg("LogLevel=ERROR")
            .arg("-T")
            .arg("-p")
            .arg(device.port().to_string())
            .arg("-l")
            .arg(device.username())
            .arg("--")
            .arg(device.host())
            .arg("sh");

        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl Transport for OpenSshTransport {
    async fn open(
        &self,
        device: &DeviceDescriptor,
        connect_timeout: Duration,
    ) -> Result<Box<dyn Session>, TransportError> {
        let mut child = self
            .command(device, connect_timeout)
            .spawn()
            .map_err(|e| TransportError::Spawn(e.to_string()))?;

        let (Some(stdin), Some(stdout), Some(stderr)) =
            (child.stdin.take(), child.stdout.take(), child.stderr.take())
        else {
            return Err(TransportError::Spawn("child stdio was not captured".into()));
        };

        let mut session = OpenSshSession {
            host: device.host().to_string(),
            child,
            stdin,
            stdout: BufReader::new(stdout),
            stderr: BufReader::new(stderr),
            token: session_token(),
            seq: 0,
        };
        session.handshake().await?;
        debug!(host = device.host(), "ssh session established");
        Ok(Box::new(session))
    }
}

pub struct OpenSshSession {
    host: String,
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
    stderr: BufReader<ChildStderr>,
    token: String,
    seq: u64,
}

impl OpenSshSession {
    fn next_marker(&mut self) -> String {
        self.seq += 1;
        format!("{}_{}", self.token, self.seq)
    }

    async fn handshake(&mut self) -> Result<(), TransportError> {
        let marker = self.next_marker();
        self.stdin
            .write_all(format!("printf '%s\\n' '{marker}'\nprintf '%s\\n' '{marker}' >&2\n").as_bytes())
            .await
            .map_err(|_| TransportError::SessionClosed {
                host: self.host.clone(),
            })?;
        self.stdin.flush().await?;

        match read_until_marker(&mut self.stdout, &marker).await {
            // Drain login noise so it is not attributed to the first command.
            Ok(_) => read_until_marker(&mut self.stderr, &marker).await.map(|_| ()),
            Err(TransportError::SessionClosed { .. }) => {
                let mut diag = String::new();
                let _ = time::timeout(
                    Duration::from_secs(1),
                    self.stderr.read_to_string(&mut diag),
                )
                .await;
                Err(classify_failure(&self.host, &diag))
            }
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl Session for OpenSshSession {
    async fn exec(&mut self, command: &str) -> Result<RawOutput, TransportError> {
        let marker = self.next_marker();
        // Commands read /dev/null so they cannot swallow the marker lines.
        let script = format!(
            "{{ {command}\n}} </dev/null\nprintf '%s %d\\n' '{marker}' \"$?\"\nprintf '%s\\n' '{marker}' >&2\n"
        );
        self.stdin
            .write_all(script.as_bytes())
            .await
            .map_err(|_| TransportError::SessionClosed {
                host: self.host.clone(),
            })?;
        self.stdin.flush().await?;

        let joined = tokio::try_join!(
            read_until_marker(&mut self.stdout, &marker),
            read_until_marker(&mut self.stderr, &marker)
        );
        let ((stdout, status), (stderr, _)) = match joined {
            Ok(parts) => parts,
            Err(TransportError::SessionClosed { .. }) => {
                return Err(TransportError::SessionClosed {
                    host: self.host.clone(),
                })
            }
            Err(e) => return Err(e),
        };

        let exit_code = status.trim().parse().unwrap_or(-1);
        Ok(RawOutput {
            stdout,
            stderr,
            exit_code,
        })
    }

    async fn close(self: Box<Self>) {
        let OpenSshSession {
            host,
            mut child,
            mut stdin,
            ..
        } = *self;
        let _ = stdin.write_all(b"exit\n").await;
        drop(stdin);
        match time::timeout(Duration::from_secs(2), child.wait()).await {
            Ok(Ok(status)) => debug!(host = %host, %status, "ssh session closed"),
            Ok(Err(e)) => warn!(host = %host, error = %e, "waiting for ssh process failed"),
            Err(_) => {
                warn!(host = %host, "ssh process did not exit, killing it");
                let _ = child.kill().await;
            }
        }
    }
}

/// Read lines until one contains `marker`. Returns the text before the
/// marker and whatever follows it on the marker line.
async fn read_until_marker<R>(
    reader: &mut BufReader<R>,
    marker: &str,
) -> Result<(String, String), TransportError>
where
    R: AsyncRead + Unpin,
{
    let mut collected = String::new();
    let mut buf = Vec::new();
    loop {
        buf.clear();
        let n = reader.read_until(b'\n', &mut buf).await?;
        if n == 0 {
            return Err(TransportError::SessionClosed {
                host: String::new(),
            });
        }
        let line = String::from_utf8_lossy(&buf);
        if let Some(idx) = line.find(marker) {
            collected.push_str(&line[..idx]);
            let rest = line[idx + marker.len()..].trim().to_string();
            return Ok((collected, rest));
        }
        collected.push_str(&line);
    }
}

fn classify_failure(host: &str, diag: &str) -> TransportError {
    let detail = diag
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .last()
        .unwrap_or("connection closed")
        .to_string();
    let lower = diag.to_ascii_lowercase();
    if lower.contains("permission denied") || lower.contains("authentication failed") {
        TransportError::Authentication {
            host: host.to_string(),
            detail,
        }
    } else {
        TransportError::Connect {
            host: host.to_string(),
            detail,
        }
    }
}

fn session_token() -> String {
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    format!(
        "__fleetwatch_{}_{:x}_{}",
        std::process::id(),
        nanos,
        COUNTER.fetch_add(1, Ordering::Relaxed)
    )
}
