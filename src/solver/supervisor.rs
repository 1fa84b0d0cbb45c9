use crate::error::CoordinatorError;
use crate::solver::codec::format_job_line;
use crate::solver::instance::{classify, SolverEvent, SolverInstance};
use crate::work::WorkUnit;
use std::collections::HashMap;
use tokio::io::AsyncBufReadExt;
use tokio::sync::mpsc::UnboundedSender;

/// Spawns, monitors, and restarts one `sa-solver` subprocess per configured
/// devid; fans job lines out to all live solvers and fans solution/status
/// events in from their reader tasks.
///
/// Exclusively owned and driven by the Coordinator's event-loop task; no
/// locking is needed because the supervisor itself is never shared.
pub struct Supervisor {
    live: HashMap<String, SolverInstance>,
    events_tx: UnboundedSender<SolverEvent>,
    executable: String,
}

impl Supervisor {
    pub fn new(events_tx: UnboundedSender<SolverEvent>) -> Self {
        Self::with_executable(events_tx, "sa-solver")
    }

    /// Builds a supervisor that spawns `executable` instead of `sa-solver`.
    /// Used by tests to substitute a fake-solver script.
    pub fn with_executable(
        events_tx: UnboundedSender<SolverEvent>,
        executable: impl Into<String>,
    ) -> Self {
        Self {
            live: HashMap::new(),
            events_tx,
            executable: executable.into(),
        }
    }

    pub fn live_devids(&self) -> impl Iterator<Item = &str> {
        self.live.keys().map(String::as_str)
    }

    pub fn is_live(&self, devid: &str) -> bool {
        self.live.contains_key(devid)
    }

    /// Removes a devid from the live set, e.g. on reader-task EOF. The next
    /// dispatch attempt will notice it is missing and relaunch it.
    pub fn mark_dead(&mut self, devid: &str) {
        self.live.remove(devid);
    }

    /// Ensures every devid in `configured` has a live solver, spawning any
    /// that are missing. If `sa-solver` is not on PATH, returns
    /// `Err(CoordinatorError::SolverMissing)`: per the spec a missing solver
    /// binary is a startup-class fatal error, but the decision to terminate
    /// the process belongs to the caller (via `CoordinatorError::is_fatal`),
    /// not to the supervisor.
    pub async fn ensure_live(&mut self, configured: &[String]) -> Result<(), CoordinatorError> {
        for devid in configured {
            if self.live.contains_key(devid) {
                continue;
            }
            self.spawn_instance(devid).await?;
        }
        Ok(())
    }

    async fn spawn_instance(&mut self, devid: &str) -> Result<(), CoordinatorError> {
        match SolverInstance::spawn(devid, &self.executable).await {
            Ok((instance, mut stdout_lines, stderr)) => {
                log::info!(target: "solver", "{devid}: ready");
                self.live.insert(devid.to_string(), instance);

                let tx = self.events_tx.clone();
                let stdout_devid = devid.to_string();
                tokio::spawn(async move {
                    loop {
                        match stdout_lines.next_line().await {
                            Ok(Some(line)) => {
                                if tx.send(classify(&stdout_devid, &line)).is_err() {
                                    break;
                                }
                            }
                            Ok(None) => {
                                let _ = tx.send(SolverEvent::Died {
                                    devid: stdout_devid.clone(),
                                });
                                break;
                            }
                            Err(err) => {
                                log::warn!(target: "solver", "{stdout_devid}: stdout read error: {err}");
                                let _ = tx.send(SolverEvent::Died {
                                    devid: stdout_devid.clone(),
                                });
                                break;
                            }
                        }
                    }
                });

                let tx = self.events_tx.clone();
                let stderr_devid = devid.to_string();
                tokio::spawn(async move {
                    let mut lines = tokio::io::BufReader::new(stderr).lines();
                    while let Ok(Some(line)) = lines.next_line().await {
                        let _ = tx.send(classify(&stderr_devid, &line));
                    }
                });
                Ok(())
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                log::error!("{} binary not found on PATH", self.executable);
                Err(CoordinatorError::SolverMissing)
            }
            Err(err) => {
                log::warn!(target: "solver", "{devid}: failed to start: {err}");
                Ok(())
            }
        }
    }

    /// Writes the formatted job line to every live solver's stdin.
    /// Best-effort: a closed pipe is logged and the instance marked dead;
    /// the next dispatch trigger will relaunch it.
    pub async fn dispatch(&mut self, work: &WorkUnit) {
        let line = format_job_line(
            &work.target,
            &work.job_id,
            &work.header_prefix,
            &work.nonce_left,
        );

        let mut dead = Vec::new();
        for (devid, instance) in self.live.iter_mut() {
            if let Err(err) = instance.write_job_line(&line).await {
                log::warn!(target: "solver", "{devid}: stdin write failed: {err}");
                dead.push(devid.clone());
            }
        }
        for devid in dead {
            self.live.remove(&devid);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_with_no_live_instances() {
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        let sup = Supervisor::new(tx);
        assert_eq!(sup.live_devids().count(), 0);
    }

    #[test]
    fn mark_dead_on_unknown_devid_is_a_no_op() {
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        let mut sup = Supervisor::new(tx);
        sup.mark_dead("0.0");
        assert!(!sup.is_live("0.0"));
    }

    #[tokio::test]
    async fn ensure_live_reports_missing_solver_binary() {
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        let mut sup = Supervisor::with_executable(tx, "definitely-not-a-real-solver-binary");

        let err = sup
            .ensure_live(&["0.0".to_string()])
            .await
            .unwrap_err();

        assert!(matches!(err, CoordinatorError::SolverMissing));
        assert!(err.is_fatal());
        assert!(!sup.is_live("0.0"));
    }
}
