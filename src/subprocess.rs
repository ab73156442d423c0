//! Simulator engine running as a child process.
//!
//! The child reads one JSON request per line on stdin and answers each with
//! one JSON object per line on stdout:
//!
//! ```text
//! -> {"op":"initialize","mode":1}
//! <- {"p":[...],"x":[...],"curBG":120.0}
//! -> {"op":"advance","dose":25.0,"x":[...],"p":[...]}
//! <- {"x":[...],"curBG":118.0,"reward":-1.5}
//! -> {"op":"shutdown"}
//! ```
//!
//! Any answer of the form `{"error":"..."}` is reported as an engine failure.
//! The child's stderr is inherited.

use crate::error::EnvError;
use crate::simulator::{InitMode, InitOutput, PatientParams, PatientState, Simulator, StepOutput};
use serde::{Deserialize, Serialize};
use std::{
    ffi::OsStr,
    io::{BufRead, BufReader, Write},
    process::{Child, ChildStdin, ChildStdout, Command, Stdio},
    thread,
    time::{Duration, Instant},
};

/// Time a child gets to exit on its own after shutdown before it is killed.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[derive(Serialize)]
#[serde(tag = "op", rename_all = "lowercase")]
enum Request<'a> {
    Initialize {
        mode: u8,
    },
    Advance {
        dose: f64,
        x: &'a [f64],
        p: &'a [f64],
    },
    Shutdown,
}

#[derive(Debug, Deserialize)]
struct Response {
    p: Option<Vec<f64>>,
    x: Option<Vec<f64>>,
    #[serde(rename = "curBG")]
    cur_bg: Option<f64>,
    reward: Option<f64>,
    error: Option<String>,
}

impl Response {
    fn parse(line: &str) -> Result<Self, EnvError> {
        let resp: Response = serde_json::from_str(line)
            .map_err(|err| EnvError::MalformedResponse(format!("{err} in {line:?}")))?;
        if let Some(msg) = resp.error {
            return Err(EnvError::EngineFailure(msg));
        }
        Ok(resp)
    }

    fn into_init(self) -> Result<InitOutput, EnvError> {
        Ok(InitOutput {
            params: PatientParams::new(required(self.p, "p")?),
            state: PatientState::new(required(self.x, "x")?),
            observation: required(self.cur_bg, "curBG")?,
        })
    }

    fn into_step(self) -> Result<StepOutput, EnvError> {
        Ok(StepOutput {
            state: PatientState::new(required(self.x, "x")?),
            observation: required(self.cur_bg, "curBG")?,
            reward: required(self.reward, "reward")?,
        })
    }
}

fn required<T>(field: Option<T>, name: &str) -> Result<T, EnvError> {
    field.ok_or_else(|| EnvError::MalformedResponse(format!("missing field {name:?}")))
}

/// Engine process owned by exactly one environment.
///
/// The child is started by [`SubprocessEngine::spawn`] and stopped by
/// [`Simulator::shutdown`]; if neither happens before drop, the child is
/// killed and reaped on drop.
pub struct SubprocessEngine {
    child: Child,
    stdin: Option<ChildStdin>,
    stdout: BufReader<ChildStdout>,
    line: String,
}

impl SubprocessEngine {
    /// Start `program` with `args` and connect to its stdin and stdout.
    pub fn spawn<P, I, A>(program: P, args: I) -> Result<Self, EnvError>
    where
        P: AsRef<OsStr>,
        I: IntoIterator<Item = A>,
        A: AsRef<OsStr>,
    {
        let program = program.as_ref();
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|err| EnvError::unavailable(&format!("failed to start {program:?}"), err))?;

        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        let (Some(stdin), Some(stdout)) = (stdin, stdout) else {
            child.kill().ok();
            child.wait().ok();
            return Err(EnvError::EngineUnavailable(
                "failed to capture engine pipes".into(),
            ));
        };
        log::info!("started engine {program:?} with pid {}", child.id());

        Ok(Self {
            child,
            stdin: Some(stdin),
            stdout: BufReader::new(stdout),
            line: String::new(),
        })
    }

    fn send(&mut self, req: &Request) -> Result<(), EnvError> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| EnvError::EngineUnavailable("engine already shut down".into()))?;

        let mut buf = serde_json::to_vec(req)
            .map_err(|err| EnvError::EngineUnavailable(format!("failed to encode request: {err}")))?;
        buf.push(b'\n');

        stdin
            .write_all(&buf)
            .and_then(|()| stdin.flush())
            .map_err(|err| EnvError::unavailable("failed to write request", err))
    }

    fn receive(&mut self) -> Result<Response, EnvError> {
        self.line.clear();
        let n_bytes = self
            .stdout
            .read_line(&mut self.line)
            .map_err(|err| EnvError::unavailable("failed to read response", err))?;
        if n_bytes == 0 {
            let status = match self.child.try_wait() {
                Ok(Some(status)) => format!("engine exited with {status}"),
                _ => "engine closed its output".to_string(),
            };
            return Err(EnvError::EngineUnavailable(status));
        }
        Response::parse(self.line.trim_end())
    }

    fn call(&mut self, req: &Request) -> Result<Response, EnvError> {
        self.send(req)?;
        self.receive()
    }

    fn wait_or_kill(&mut self) -> Result<(), EnvError> {
        let start = Instant::now();
        loop {
            match self.child.try_wait() {
                Ok(Some(status)) => {
                    log::info!("engine exited with {status}");
                    return Ok(());
                }
                Ok(None) if start.elapsed() < SHUTDOWN_GRACE => {
                    thread::sleep(Duration::from_millis(10));
                }
                Ok(None) => {
                    log::warn!("engine did not exit within {SHUTDOWN_GRACE:?}, killing it");
                    self.child
                        .kill()
                        .map_err(|err| EnvError::unavailable("failed to kill engine", err))?;
                    self.child
                        .wait()
                        .map_err(|err| EnvError::unavailable("failed to reap engine", err))?;
                    return Ok(());
                }
                Err(err) => return Err(EnvError::unavailable("failed to wait for engine", err)),
            }
        }
    }
}

impl Simulator for SubprocessEngine {
    fn initialize(&mut self, mode: InitMode) -> Result<InitOutput, EnvError> {
        log::debug!("initializing {mode:?} patient");
        self.call(&Request::Initialize { mode: mode.code() })?
            .into_init()
    }

    fn advance(
        &mut self,
        dose: f64,
        state: &PatientState,
        params: &PatientParams,
    ) -> Result<StepOutput, EnvError> {
        let req = Request::Advance {
            dose,
            x: state.as_slice(),
            p: params.as_slice(),
        };
        self.call(&req)?.into_step()
    }

    fn shutdown(&mut self) -> Result<(), EnvError> {
        if self.stdin.is_none() {
            return Ok(());
        }
        // The child may already be gone; closing stdin is enough either way.
        if let Err(err) = self.send(&Request::Shutdown) {
            log::debug!("shutdown request not delivered: {err}");
        }
        self.stdin = None;
        self.wait_or_kill()
    }
}

impl Drop for SubprocessEngine {
    fn drop(&mut self) {
        if self.stdin.is_some() {
            self.stdin = None;
            if let Ok(None) = self.child.try_wait() {
                self.child.kill().ok();
            }
            self.child.wait().ok();
        }
    }
}
