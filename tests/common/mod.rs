//! Shared mock control surfaces and descriptor builders for integration
//! tests

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use unitsync::control::{
    InitSystem, InitSystemError, Notifier, ServiceFailure, ServiceStatus, SessionClient,
    SessionError, StartReply, UnitStatus,
};
use unitsync::units::{
    DaemonScope, PackageInfo, PackageServices, ServiceDescriptor, ServiceOptions,
    SocketDescriptor, TimerDescriptor,
};

static TEST_COUNTER: AtomicU32 = AtomicU32::new(0);

pub fn unique_test_dir() -> PathBuf {
    let id = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
    let dir = PathBuf::from(format!("/tmp/unitsync-test-{}-{}", std::process::id(), id));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

/// Event journal shared between mocks so tests can assert cross-surface
/// ordering (e.g. user services stop before system services)
pub type EventLog = Arc<Mutex<Vec<String>>>;

pub fn event_log() -> EventLog {
    Arc::new(Mutex::new(Vec::new()))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Start(Vec<String>),
    Stop(Vec<String>),
    Restart(Vec<String>),
    ReloadOrRestart(Vec<String>),
    Enable(Vec<String>),
    Disable(Vec<String>),
    DaemonReload,
    Status(Vec<String>),
}

#[derive(Default)]
pub struct MockInitState {
    pub calls: Mutex<Vec<Call>>,
    /// Status returned per unit name; units not listed report inactive and
    /// disabled
    pub statuses: Mutex<BTreeMap<String, UnitStatus>>,
    /// Units whose start call fails
    pub fail_start: Mutex<Vec<String>>,
    /// Units whose stop call fails
    pub fail_stop: Mutex<Vec<String>>,
    pub fail_daemon_reload: Mutex<bool>,
    pub log: Mutex<Option<(String, EventLog)>>,
}

#[derive(Clone, Default)]
pub struct MockInit(pub Arc<MockInitState>);

impl MockInit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_log(self, tag: &str, log: EventLog) -> Self {
        *self.0.log.lock().unwrap() = Some((tag.to_string(), log));
        self
    }

    pub fn set_status(&self, name: &str, active: bool, enabled: bool) {
        self.0.statuses.lock().unwrap().insert(
            name.to_string(),
            UnitStatus {
                name: name.to_string(),
                active,
                enabled,
            },
        );
    }

    pub fn fail_start_of(&self, unit: &str) {
        self.0.fail_start.lock().unwrap().push(unit.to_string());
    }

    pub fn fail_stop_of(&self, unit: &str) {
        self.0.fail_stop.lock().unwrap().push(unit.to_string());
    }

    pub fn calls(&self) -> Vec<Call> {
        self.0.calls.lock().unwrap().clone()
    }

    fn record(&self, call: Call, what: &str) {
        if let Some((tag, log)) = self.0.log.lock().unwrap().as_ref() {
            log.lock().unwrap().push(format!("{}:{}", tag, what));
        }
        self.0.calls.lock().unwrap().push(call);
    }

    fn failure(verb: &str) -> InitSystemError {
        InitSystemError::CommandFailed {
            verb: verb.to_string(),
            stderr: "mock failure".to_string(),
        }
    }
}

impl InitSystem for MockInit {
    async fn start(&self, units: &[String]) -> Result<(), InitSystemError> {
        self.record(Call::Start(units.to_vec()), &format!("start {:?}", units));
        let failing = self.0.fail_start.lock().unwrap();
        if units.iter().any(|u| failing.contains(u)) {
            return Err(Self::failure("start"));
        }
        Ok(())
    }

    async fn stop(&self, units: &[String]) -> Result<(), InitSystemError> {
        self.record(Call::Stop(units.to_vec()), &format!("stop {:?}", units));
        let failing = self.0.fail_stop.lock().unwrap();
        if units.iter().any(|u| failing.contains(u)) {
            return Err(Self::failure("stop"));
        }
        Ok(())
    }

    async fn restart(&self, units: &[String]) -> Result<(), InitSystemError> {
        self.record(Call::Restart(units.to_vec()), "restart");
        Ok(())
    }

    async fn reload_or_restart(&self, units: &[String]) -> Result<(), InitSystemError> {
        self.record(Call::ReloadOrRestart(units.to_vec()), "reload-or-restart");
        Ok(())
    }

    async fn enable_no_reload(&self, units: &[String]) -> Result<(), InitSystemError> {
        self.record(Call::Enable(units.to_vec()), "enable");
        Ok(())
    }

    async fn disable_no_reload(&self, units: &[String]) -> Result<(), InitSystemError> {
        self.record(Call::Disable(units.to_vec()), "disable");
        Ok(())
    }

    async fn daemon_reload(&self) -> Result<(), InitSystemError> {
        self.record(Call::DaemonReload, "daemon-reload");
        if *self.0.fail_daemon_reload.lock().unwrap() {
            return Err(Self::failure("daemon-reload"));
        }
        Ok(())
    }

    async fn status(&self, units: &[String]) -> Result<Vec<UnitStatus>, InitSystemError> {
        self.record(Call::Status(units.to_vec()), "status");
        let statuses = self.0.statuses.lock().unwrap();
        Ok(units
            .iter()
            .map(|name| {
                statuses.get(name).cloned().unwrap_or(UnitStatus {
                    name: name.clone(),
                    active: false,
                    enabled: false,
                })
            })
            .collect())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCall {
    Start {
        uids: Vec<u32>,
        units: Vec<String>,
        enable: bool,
    },
    Stop {
        uids: Vec<u32>,
        units: Vec<String>,
        disable: bool,
    },
    Restart {
        uids: Vec<u32>,
        units: Vec<String>,
        reload: bool,
    },
    DaemonReload(Vec<u32>),
    Status {
        uids: Vec<u32>,
        units: Vec<String>,
    },
}

#[derive(Default)]
pub struct MockSessionState {
    pub calls: Mutex<Vec<SessionCall>>,
    pub start_failures: Mutex<Vec<ServiceFailure>>,
    pub restart_failures: Mutex<Vec<ServiceFailure>>,
    /// Per-uid service statuses returned by services_status
    pub statuses: Mutex<BTreeMap<u32, Vec<ServiceStatus>>>,
    /// Artificial latency before every reply
    pub delay: Mutex<Option<Duration>>,
    pub log: Mutex<Option<(String, EventLog)>>,
}

#[derive(Clone, Default)]
pub struct MockSession(pub Arc<MockSessionState>);

impl MockSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_log(self, tag: &str, log: EventLog) -> Self {
        *self.0.log.lock().unwrap() = Some((tag.to_string(), log));
        self
    }

    pub fn set_statuses(&self, uid: u32, statuses: Vec<ServiceStatus>) {
        self.0.statuses.lock().unwrap().insert(uid, statuses);
    }

    pub fn calls(&self) -> Vec<SessionCall> {
        self.0.calls.lock().unwrap().clone()
    }

    async fn respond(&self, call: SessionCall, what: &str) {
        if let Some((tag, log)) = self.0.log.lock().unwrap().as_ref() {
            log.lock().unwrap().push(format!("{}:{}", tag, what));
        }
        self.0.calls.lock().unwrap().push(call);
        let delay = *self.0.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

impl SessionClient for MockSession {
    async fn services_start(
        &self,
        uids: &[u32],
        units: &[String],
        enable: bool,
        _disabled: &BTreeMap<u32, Vec<String>>,
    ) -> Result<StartReply, SessionError> {
        self.respond(
            SessionCall::Start {
                uids: uids.to_vec(),
                units: units.to_vec(),
                enable,
            },
            "start",
        )
        .await;
        Ok(StartReply {
            start_failures: self.0.start_failures.lock().unwrap().clone(),
            stop_failures: vec![],
        })
    }

    async fn services_stop(
        &self,
        uids: &[u32],
        units: &[String],
        disable: bool,
    ) -> Result<Vec<ServiceFailure>, SessionError> {
        self.respond(
            SessionCall::Stop {
                uids: uids.to_vec(),
                units: units.to_vec(),
                disable,
            },
            "stop",
        )
        .await;
        Ok(vec![])
    }

    async fn services_restart(
        &self,
        uids: &[u32],
        units: &[String],
        reload: bool,
    ) -> Result<Vec<ServiceFailure>, SessionError> {
        self.respond(
            SessionCall::Restart {
                uids: uids.to_vec(),
                units: units.to_vec(),
                reload,
            },
            "restart",
        )
        .await;
        Ok(self.0.restart_failures.lock().unwrap().clone())
    }

    async fn services_daemon_reload(&self, uids: &[u32]) -> Result<(), SessionError> {
        self.respond(SessionCall::DaemonReload(uids.to_vec()), "daemon-reload")
            .await;
        Ok(())
    }

    async fn services_status(
        &self,
        uids: &[u32],
        units: &[String],
    ) -> Result<BTreeMap<u32, Vec<ServiceStatus>>, SessionError> {
        self.respond(
            SessionCall::Status {
                uids: uids.to_vec(),
                units: units.to_vec(),
            },
            "status",
        )
        .await;
        let statuses = self.0.statuses.lock().unwrap();
        if uids.is_empty() {
            return Ok(statuses.clone());
        }
        Ok(statuses
            .iter()
            .filter(|(uid, _)| uids.contains(uid))
            .map(|(uid, sts)| (*uid, sts.clone()))
            .collect())
    }
}

/// Notifier capturing every message for assertions
#[derive(Clone, Default)]
pub struct RecordingNotifier(pub Arc<Mutex<Vec<String>>>);

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, message: &str) {
        self.0.lock().unwrap().push(message.to_string());
    }
}

pub fn service(unit_dir: &PathBuf, package: &str, name: &str, scope: DaemonScope) -> ServiceDescriptor {
    ServiceDescriptor {
        package: package.into(),
        name: name.into(),
        scope,
        kind: Default::default(),
        exec_start: format!("/usr/bin/{}-{}", package, name),
        exec_stop: None,
        working_directory: None,
        restart: Default::default(),
        sockets: vec![],
        timer: None,
        activates_on: vec![],
        refresh_mode: Default::default(),
        unit_dir: unit_dir.clone(),
    }
}

pub fn with_socket(mut svc: ServiceDescriptor, socket_name: &str) -> ServiceDescriptor {
    svc.sockets.push(SocketDescriptor {
        name: socket_name.into(),
        listen_stream: format!("/run/{}/{}.sock", svc.package, socket_name),
        socket_mode: None,
    });
    svc
}

pub fn with_timer(mut svc: ServiceDescriptor) -> ServiceDescriptor {
    svc.timer = Some(TimerDescriptor {
        on_calendar: vec!["daily".into()],
    });
    svc
}

pub fn package(name: &str, services: Vec<ServiceDescriptor>) -> PackageServices {
    PackageServices {
        package: PackageInfo {
            instance_name: name.into(),
            kind: Default::default(),
            services,
        },
        options: ServiceOptions::default(),
    }
}

pub fn unit_status(name: &str, active: bool, enabled: bool) -> UnitStatus {
    UnitStatus {
        name: name.into(),
        active,
        enabled,
    }
}

pub fn service_status(
    full_name: &str,
    scope: DaemonScope,
    service: UnitStatus,
    activators: Vec<UnitStatus>,
) -> ServiceStatus {
    ServiceStatus {
        name: full_name.into(),
        scope,
        service,
        activators,
    }
}
