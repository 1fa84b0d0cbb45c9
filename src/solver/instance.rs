use crate::solver::codec::{self, SolverLine, READY_BANNER};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout};

/// Event emitted by one solver instance's reader tasks, tagged with the
/// devid it came from so the supervisor/coordinator can route it.
#[derive(Debug, Clone)]
pub enum SolverEvent {
    Sol {
        devid: String,
        job_id: String,
        ntime: String,
        nonce_rightpart: String,
        sol: String,
    },
    Status {
        devid: String,
        sols_found: u64,
        shares_found: u64,
    },
    Msg {
        devid: String,
        line: String,
    },
    /// stdout reached EOF or the process otherwise died.
    Died {
        devid: String,
    },
}

/// One live `sa-solver` subprocess. Exclusively owned by the Supervisor;
/// the reader tasks hold only the stdout/stderr handles, the instance
/// itself keeps the write end of stdin and the child handle for reaping.
pub struct SolverInstance {
    pub devid: String,
    child: Child,
    stdin: ChildStdin,
}

impl SolverInstance {
    /// Spawns `<executable> --mining --use <gpu_id>` and performs the
    /// startup handshake: the first stdout line must equal the ready
    /// banner exactly. On mismatch or EOF the child is killed and an
    /// error returned; on a missing binary, `std::io::ErrorKind::NotFound`
    /// propagates to the caller, which per the spec's fatal-error policy
    /// should terminate the whole process rather than retry.
    ///
    /// `executable` defaults to `sa-solver` in production
    /// (`Supervisor::new`); tests substitute a small fake-solver script so
    /// the real GPU binary is never required to exercise the supervisor.
    ///
    /// Returns the instance plus the stdout/stderr line streams so the
    /// caller can spawn the steady-state reader tasks; those streams are
    /// owned exclusively by whichever task reads them from here on (§9).
    pub async fn spawn(
        devid: &str,
        executable: &str,
    ) -> std::io::Result<(Self, Lines<BufReader<ChildStdout>>, ChildStderr)> {
        let gpu_id = devid.split('.').next().unwrap_or(devid);

        let mut child = tokio::process::Command::new(executable)
            .args(["--mining", "--use", gpu_id])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let stdin = child.stdin.take().expect("stdin was piped");
        let stdout = child.stdout.take().expect("stdout was piped");
        let stderr = child.stderr.take().expect("stderr was piped");
        let mut stdout_lines = BufReader::new(stdout).lines();

        let banner = stdout_lines.next_line().await?;
        match banner {
            Some(line) if line == READY_BANNER => {}
            _ => {
                let _ = child.kill().await;
                return Err(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    format!("solver {devid} did not print the ready banner"),
                ));
            }
        }

        let instance = Self {
            devid: devid.to_string(),
            child,
            stdin,
        };

        Ok((instance, stdout_lines, stderr))
    }

    pub async fn write_job_line(&mut self, line: &str) -> std::io::Result<()> {
        self.stdin.write_all(line.as_bytes()).await?;
        self.stdin.flush().await
    }

    pub async fn kill(&mut self) {
        let _ = self.child.kill().await;
    }
}

pub(crate) fn classify(devid: &str, line: &str) -> SolverEvent {
    match codec::parse_line(line) {
        SolverLine::Sol {
            job_id,
            ntime,
            nonce_rightpart,
            sol,
        } => SolverEvent::Sol {
            devid: devid.to_string(),
            job_id,
            ntime,
            nonce_rightpart,
            sol,
        },
        SolverLine::Status {
            sols_found,
            shares_found,
        } => SolverEvent::Status {
            devid: devid.to_string(),
            sols_found,
            shares_found,
        },
        SolverLine::Msg(line) => SolverEvent::Msg {
            devid: devid.to_string(),
            line,
        },
    }
}
