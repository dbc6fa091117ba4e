//! systemctl-backed init-system control
//!
//! Each verb is a short-lived `systemctl` invocation; status queries go
//! through `systemctl show` so one call covers a whole unit batch.

use std::process::Output;

use tokio::process::Command;

use super::{InitSystem, InitSystemError, UnitStatus};

/// Which manager the commands address
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemctlMode {
    /// The system-wide service manager
    System,
    /// The global per-user configuration (`systemctl --global`); only
    /// enable/disable are meaningful here
    UserGlobal,
}

/// [`InitSystem`] implementation shelling out to `systemctl`
#[derive(Debug, Clone, Copy)]
pub struct SystemctlManager {
    mode: SystemctlMode,
}

impl SystemctlManager {
    pub fn system() -> Self {
        Self {
            mode: SystemctlMode::System,
        }
    }

    pub fn user_global() -> Self {
        Self {
            mode: SystemctlMode::UserGlobal,
        }
    }

    fn check_mode(&self, verb: &str) -> Result<(), InitSystemError> {
        match self.mode {
            SystemctlMode::System => Ok(()),
            // the global user configuration has no live daemon behind it
            SystemctlMode::UserGlobal if matches!(verb, "enable" | "disable") => Ok(()),
            SystemctlMode::UserGlobal => Err(InitSystemError::UnsupportedMode {
                verb: verb.to_string(),
            }),
        }
    }

    async fn run(&self, verb: &str, args: &[&str], units: &[String]) -> Result<Output, InitSystemError> {
        self.check_mode(verb)?;

        let mut cmd = Command::new("systemctl");
        if self.mode == SystemctlMode::UserGlobal {
            cmd.arg("--global");
        }
        cmd.arg(verb);
        cmd.args(args);
        cmd.args(units);

        log::debug!("systemctl {} {:?}", verb, units);
        let output = cmd.output().await?;
        if !output.status.success() {
            return Err(InitSystemError::CommandFailed {
                verb: verb.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(output)
    }
}

impl InitSystem for SystemctlManager {
    async fn start(&self, units: &[String]) -> Result<(), InitSystemError> {
        self.run("start", &[], units).await.map(|_| ())
    }

    async fn stop(&self, units: &[String]) -> Result<(), InitSystemError> {
        self.run("stop", &[], units).await.map(|_| ())
    }

    async fn restart(&self, units: &[String]) -> Result<(), InitSystemError> {
        self.run("restart", &[], units).await.map(|_| ())
    }

    async fn reload_or_restart(&self, units: &[String]) -> Result<(), InitSystemError> {
        self.run("reload-or-restart", &[], units).await.map(|_| ())
    }

    async fn enable_no_reload(&self, units: &[String]) -> Result<(), InitSystemError> {
        self.run("enable", &["--no-reload"], units).await.map(|_| ())
    }

    async fn disable_no_reload(&self, units: &[String]) -> Result<(), InitSystemError> {
        self.run("disable", &["--no-reload"], units).await.map(|_| ())
    }

    async fn daemon_reload(&self) -> Result<(), InitSystemError> {
        self.run("daemon-reload", &[], &[]).await.map(|_| ())
    }

    async fn status(&self, units: &[String]) -> Result<Vec<UnitStatus>, InitSystemError> {
        if units.is_empty() {
            return Ok(Vec::new());
        }
        let output = self
            .run(
                "show",
                &["--property=Id,ActiveState,UnitFileState"],
                units,
            )
            .await?;
        parse_show_output(units, &String::from_utf8_lossy(&output.stdout))
    }
}

/// Parse `systemctl show` output: one key=value block per unit, blocks
/// separated by a blank line, in query order.
fn parse_show_output(expected: &[String], raw: &str) -> Result<Vec<UnitStatus>, InitSystemError> {
    let mut statuses = Vec::with_capacity(expected.len());

    for block in raw.trim_end().split("\n\n") {
        let mut id = None;
        let mut active_state = "";
        let mut unit_file_state = "";
        for line in block.lines() {
            let Some((key, value)) = line.split_once('=') else {
                return Err(InitSystemError::BadStatus(format!(
                    "malformed show line {:?}",
                    line
                )));
            };
            match key {
                "Id" => id = Some(value),
                "ActiveState" => active_state = value,
                "UnitFileState" => unit_file_state = value,
                _ => {}
            }
        }

        let Some(id) = id else {
            return Err(InitSystemError::BadStatus("missing Id field".to_string()));
        };
        statuses.push(UnitStatus {
            name: id.to_string(),
            active: active_state == "active",
            enabled: matches!(unit_file_state, "enabled" | "enabled-runtime"),
        });
    }

    if statuses.len() != expected.len() {
        return Err(InitSystemError::BadStatus(format!(
            "queried {} units but got {} status blocks",
            expected.len(),
            statuses.len()
        )));
    }
    for (status, want) in statuses.iter().zip(expected) {
        if status.name != *want {
            return Err(InitSystemError::BadStatus(format!(
                "status for {:?} where {:?} was expected",
                status.name, want
            )));
        }
    }
    Ok(statuses)
}
