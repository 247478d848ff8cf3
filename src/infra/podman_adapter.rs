use crate::domain::{ContainerHandle, ContainerRuntime, ContainerSpec};
use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use std::ffi::OsStr;
use std::process::Stdio;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::process::Command;
use tokio::time::{Instant, sleep, timeout_at};
use tracing::{debug, info, warn};

const READINESS_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Drives the podman CLI (or any docker-compatible CLI named by `binary`)
#[derive(Debug, Clone)]
pub struct PodmanAdapter {
    binary: String,
    host: String,
    startup_timeout: Duration,
    client: reqwest::Client,
}

impl PodmanAdapter {
    pub fn new(binary: &str, host: &str, startup_timeout: Duration) -> Self {
        Self {
            binary: binary.to_string(),
            host: host.to_string(),
            startup_timeout,
            client: reqwest::Client::new(),
        }
    }

    /// Arguments for `podman run`, publishing every declared port on a random host port
    pub fn run_args(name: &str, spec: &ContainerSpec) -> Vec<String> {
        let mut args: Vec<String> = vec!["run".into(), "-d".into(), "--name".into(), name.into()];

        for port in &spec.ports {
            args.push("-p".into());
            args.push(format!("{port}/tcp"));
        }

        for (key, value) in &spec.environment {
            args.push("-e".into());
            args.push(format!("{key}={value}"));
        }

        args.push(spec.image.clone());
        args.extend(spec.command.iter().cloned());
        args
    }

    /// Waits until the readiness probe answers, or the startup timeout elapses
    async fn wait_until_ready(&self, handle: &ContainerHandle, spec: &ContainerSpec) -> Result<()> {
        let Some(probe) = spec.wait_for.as_ref().filter(|p| p.port > 0) else {
            return Ok(());
        };

        let external = self.mapped_port(handle, probe.port).await?;
        let path = probe.http_target().map(|(_, path)| path);
        self.poll_ready(&handle.id, external, path).await
    }

    /// Polls `external` on the engine host (HTTP GET on `path`, plain TCP
    /// otherwise) until it answers or the startup timeout elapses
    async fn poll_ready(&self, id: &str, external: u16, path: Option<&str>) -> Result<()> {
        let deadline = Instant::now() + self.startup_timeout;
        let url = path.map(|path| format!("http://{}:{}{}", self.host, external, path));

        loop {
            let attempt = async {
                match &url {
                    Some(url) => match self.client.get(url).send().await {
                        Ok(resp) => resp.status().as_u16() < 400,
                        Err(e) => {
                            debug!("Readiness probe {} failed: {}", url, e);
                            false
                        }
                    },
                    None => TcpStream::connect((self.host.as_str(), external))
                        .await
                        .is_ok(),
                }
            };

            // A backend that accepts but never answers must not outlive the deadline
            let ready = timeout_at(deadline, attempt).await.unwrap_or(false);

            if ready {
                return Ok(());
            }

            if Instant::now() >= deadline {
                bail!("container {} not ready after {:?}", id, self.startup_timeout);
            }

            sleep(READINESS_POLL_INTERVAL).await;
        }
    }

    async fn podman<I, S>(&self, args: I, context: &str) -> Result<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let output = Command::new(&self.binary)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await
            .with_context(|| context.to_string())?;

        if !output.status.success() {
            bail!(
                "{} returned status {:?} ({context}): {}",
                self.binary,
                output.status.code(),
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

impl Default for PodmanAdapter {
    fn default() -> Self {
        Self::new("podman", "127.0.0.1", Duration::from_secs(60))
    }
}

#[async_trait]
impl ContainerRuntime for PodmanAdapter {
    async fn launch(&self, name: &str, spec: &ContainerSpec) -> Result<ContainerHandle> {
        // Leftover from a previous run would make `run --name` fail
        if self
            .podman(["rm", "-f", name], &format!("removing stale container {name}"))
            .await
            .is_err()
        {
            debug!("No stale container {} to remove", name);
        }

        info!("Launching {} from {}", name, spec.image);
        let id = self
            .podman(Self::run_args(name, spec), &format!("running container {name}"))
            .await?;

        if id.is_empty() {
            bail!("{} did not report a container id for {name}", self.binary);
        }

        let handle = ContainerHandle::new(id);
        if let Err(e) = self.wait_until_ready(&handle, spec).await {
            warn!("Container {} failed readiness: {:#}", name, e);
            if let Err(rm) = self.terminate(&handle).await {
                warn!("Failed to remove unready container {}: {:#}", name, rm);
            }
            return Err(e.context(format!("waiting for container {name}")));
        }

        Ok(handle)
    }

    async fn host(&self, _handle: &ContainerHandle) -> Result<String> {
        Ok(self.host.clone())
    }

    async fn mapped_port(&self, handle: &ContainerHandle, internal_port: u16) -> Result<u16> {
        let port_spec = format!("{internal_port}/tcp");
        let output = self
            .podman(
                ["port", handle.id.as_str(), port_spec.as_str()],
                &format!("resolving port {internal_port} of {}", handle.id),
            )
            .await?;

        parse_port_output(&output)
            .with_context(|| format!("unexpected port output for {}: {output:?}", handle.id))
    }

    async fn is_running(&self, handle: &ContainerHandle) -> Result<bool> {
        let output = self
            .podman(
                [
                    "container",
                    "inspect",
                    handle.id.as_str(),
                    "--format",
                    "{{.State.Running}}",
                ],
                &format!("checking state of {}", handle.id),
            )
            .await?;

        Ok(output == "true")
    }

    async fn terminate(&self, handle: &ContainerHandle) -> Result<()> {
        self.podman(
            ["rm", "-f", handle.id.as_str()],
            &format!("removing container {}", handle.id),
        )
        .await
        .map(|_| ())
    }

    async fn is_available(&self) -> bool {
        Command::new(&self.binary)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|s| s.success())
            .unwrap_or(false)
    }
}

/// Parses `podman port` output (`0.0.0.0:41234`, possibly one line per address family)
fn parse_port_output(output: &str) -> Option<u16> {
    output
        .lines()
        .filter_map(|line| line.trim().rsplit_once(':'))
        .find_map(|(_, port)| port.parse().ok())
}
