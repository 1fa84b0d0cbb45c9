use crate::config::Config;
use crate::error::CoordinatorError;
use crate::solver::{SolverEvent, Supervisor};
use crate::stats::{DeviceCounters, StatsWindow};
use crate::stratum::{ClientCommand, ClientEvent};
use crate::work::WorkUnit;
use std::collections::HashMap;
use std::time::Instant;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::time::{interval, Duration};

const STATS_INTERVAL: Duration = Duration::from_secs(5);

/// Merges Stratum client events and solver events, holds the current
/// `WorkUnit`, enforces the dispatch precondition, and aggregates
/// per-device throughput stats. Exclusively owns all of its state; no
/// locking is required because nothing else ever touches it.
pub struct Coordinator {
    config: Config,
    supervisor: Supervisor,

    nonce_left: Option<Vec<u8>>,
    target: Option<[u8; 32]>,
    target_ever_set: bool,
    job: Option<(String, Vec<u8>)>,
    authorized: bool,

    first_dispatch_logged: bool,
    counters: HashMap<String, DeviceCounters>,
    stats: StatsWindow,

    client_commands: UnboundedSender<ClientCommand>,
}

impl Coordinator {
    pub fn new(
        config: Config,
        supervisor: Supervisor,
        client_commands: UnboundedSender<ClientCommand>,
    ) -> Self {
        Self {
            config,
            supervisor,
            nonce_left: None,
            target: None,
            target_ever_set: false,
            job: None,
            authorized: false,
            first_dispatch_logged: false,
            counters: HashMap::new(),
            stats: StatsWindow::new(),
            client_commands,
        }
    }

    /// Drives the coordinator forever: merges client events, solver
    /// events, and the 5-second stats tick.
    pub async fn run(
        mut self,
        mut client_events: UnboundedReceiver<ClientEvent>,
        mut solver_events: UnboundedReceiver<SolverEvent>,
    ) -> ! {
        let mut stats_tick = interval(STATS_INTERVAL);
        loop {
            tokio::select! {
                Some(event) = client_events.recv() => {
                    if let Err(err) = self.handle_client_event(event).await {
                        if err.is_fatal() {
                            log::error!(target: "coordinator", "fatal error: {err}");
                            std::process::exit(1);
                        }
                        log::warn!(target: "coordinator", "{err}");
                    }
                }
                Some(event) = solver_events.recv() => {
                    self.handle_solver_event(event).await;
                }
                _ = stats_tick.tick() => {
                    self.on_stats_tick();
                }
                else => {
                    log::error!("both event channels closed unexpectedly");
                    std::process::exit(1);
                }
            }
        }
    }

    async fn handle_client_event(&mut self, event: ClientEvent) -> Result<(), CoordinatorError> {
        match event {
            ClientEvent::Subscribed { nonce_left } => {
                self.nonce_left = Some(nonce_left);
                self.try_dispatch().await?;
            }
            ClientEvent::Authorized => {
                self.authorized = true;
                self.try_dispatch().await?;
            }
            ClientEvent::TargetSet { target } => {
                self.target = Some(target);
                // Only the very first target takes effect immediately; later
                // updates are stored and apply with the next job notify.
                if !self.target_ever_set {
                    self.target_ever_set = true;
                    self.try_dispatch().await?;
                }
            }
            ClientEvent::JobSet { job_id, header_prefix } => {
                self.job = Some((job_id, header_prefix));
                self.try_dispatch().await?;
            }
            ClientEvent::ShareAccepted => {
                log::info!(target: "coordinator", "share accepted");
            }
            ClientEvent::Disconnected => {
                self.authorized = false;
            }
        }
        Ok(())
    }

    async fn handle_solver_event(&mut self, event: SolverEvent) {
        match event {
            SolverEvent::Sol {
                devid: _,
                job_id,
                ntime,
                nonce_rightpart,
                sol,
            } => {
                let _ = self.client_commands.send(ClientCommand::Submit {
                    job_id,
                    ntime,
                    nonce_rightpart,
                    sol,
                });
            }
            SolverEvent::Status {
                devid,
                sols_found,
                shares_found,
            } => {
                self.counters.insert(
                    devid,
                    DeviceCounters {
                        sols_found,
                        shares_found,
                    },
                );
            }
            SolverEvent::Msg { devid, line } => {
                log::debug!(target: "solver", "{devid}: {line}");
            }
            SolverEvent::Died { devid } => {
                log::warn!(target: "solver", "{devid}: died, will relaunch on next dispatch");
                self.supervisor.mark_dead(&devid);
            }
        }
    }

    /// Dispatches the current job to every configured solver if, and only
    /// if, all four prerequisites are satisfied: nonce_left, an authorized
    /// session, a target, and a header prefix. Propagates
    /// `CoordinatorError::SolverMissing` if `sa-solver` isn't on PATH; the
    /// caller decides whether that's fatal via `CoordinatorError::is_fatal`.
    async fn try_dispatch(&mut self) -> Result<(), CoordinatorError> {
        let (Some(nonce_left), Some(target), Some((job_id, header_prefix))) =
            (self.nonce_left.clone(), self.target, self.job.clone())
        else {
            return Ok(());
        };
        if !self.authorized {
            return Ok(());
        }

        let configured = self.config.devids();
        self.supervisor.ensure_live(&configured).await?;

        if !self.first_dispatch_logged {
            log::info!(target: "coordinator", "dispatching to {} device(s)", configured.len());
            self.first_dispatch_logged = true;
        }

        let work = WorkUnit {
            job_id,
            header_prefix,
            nonce_left,
            target,
        };
        self.supervisor.dispatch(&work).await;
        Ok(())
    }

    fn on_stats_tick(&mut self) {
        if self.job.is_none() || self.counters.is_empty() {
            return;
        }
        self.stats.push(Instant::now(), self.counters.clone());
        if let Some(snapshot) = self.stats.compute() {
            println!("{}", snapshot.format_line());
        }
    }
}
