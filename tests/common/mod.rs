#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use fleetwatch_rs::error::TransportError;
use fleetwatch_rs::transport::{RawOutput, Session, Transport};
use fleetwatch_rs::types::{DeviceDescriptor, DeviceKind};
use secrecy::SecretString;

#[derive(Debug, Clone)]
pub enum Reply {
    Output(RawOutput),
    Error(TransportError),
    Hang,
}

impl Reply {
    pub fn ok(stdout: &str) -> Self {
        Reply::Output(RawOutput {
            stdout: stdout.to_string(),
            stderr: String::new(),
            exit_code: 0,
        })
    }

    pub fn exit(code: i32, stderr: &str) -> Self {
        Reply::Output(RawOutput {
            stdout: String::new(),
            stderr: stderr.to_string(),
            exit_code: code,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    Accept,
    Refuse,
    Hang,
}

#[derive(Default)]
pub struct Counters {
    pub opens: AtomicUsize,
    pub closes: AtomicUsize,
    /// (host, command) for every exec, in call order.
    pub execs: Mutex<Vec<(String, String)>>,
}

impl Counters {
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn exec_hosts(&self) -> Vec<String> {
        self.execs
            .lock()
            .unwrap()
            .iter()
            .map(|(h, _)| h.clone())
            .collect()
    }
}

/// Canned transport: replies are looked up by exact command text.
pub struct StubTransport {
    pub mode: OpenMode,
    pub replies: Arc<HashMap<String, Reply>>,
    pub fallback: Reply,
    pub counters: Arc<Counters>,
}

impl StubTransport {
    pub fn new(mode: OpenMode, replies: &[(&str, Reply)]) -> Self {
        Self {
            mode,
            replies: Arc::new(
                replies
                    .iter()
                    .map(|(c, r)| (c.to_string(), r.clone()))
                    .collect(),
            ),
            fallback: Reply::exit(127, "sh: command not found"),
            counters: Arc::new(Counters::default()),
        }
    }
}

struct StubSession {
    host: String,
    replies: Arc<HashMap<String, Reply>>,
    fallback: Reply,
    counters: Arc<Counters>,
}

#[async_trait]
impl Transport for StubTransport {
    async fn open(
        &self,
        device: &DeviceDescriptor,
        _connect_timeout: Duration,
    ) -> Result<Box<dyn Session>, TransportError> {
        match self.mode {
            OpenMode::Accept => {
                self.counters.opens.fetch_add(1, Ordering::SeqCst);
                Ok(Box::new(StubSession {
                    host: device.host().to_string(),
                    replies: self.replies.clone(),
                    fallback: self.fallback.clone(),
                    counters: self.counters.clone(),
                }))
            }
            OpenMode::Refuse => Err(TransportError::Authentication {
                host: device.host().to_string(),
                detail: "Permission denied (password)".into(),
            }),
            OpenMode::Hang => std::future::pending().await,
        }
    }
}

#[async_trait]
impl Session for StubSession {
    async fn exec(&mut self, command: &str) -> Result<RawOutput, TransportError> {
        self.counters
            .execs
            .lock()
            .unwrap()
            .push((self.host.clone(), command.to_string()));
        match self.replies.get(command).unwrap_or(&self.fallback).clone() {
            Reply::Output(out) => Ok(out),
            Reply::Error(e) => Err(e),
            Reply::Hang => std::future::pending().await,
        }
    }

    async fn close(self: Box<Self>) {
        self.counters.closes.fetch_add(1, Ordering::SeqCst);
    }
}

pub fn device(host: &str) -> DeviceDescriptor {
    DeviceDescriptor::new(host, 22, "ubuntu", SecretString::from("secret".to_string()), DeviceKind::Linux)
        .unwrap()
}
