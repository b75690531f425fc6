use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use tokio::process::{Child, Command};

const GRACE_PERIOD: Duration = Duration::from_secs(5);
const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Launches `count` worker loops as independent OS processes (re-invoking
/// this binary's own `run-worker --index N` hidden subcommand) so a
/// runaway shell command in one worker can never starve its siblings, and
/// joins them on shutdown.
pub struct Supervisor {
    exe: PathBuf,
    count: usize,
}

impl Supervisor {
    pub fn new(exe: PathBuf, count: usize) -> Self {
        Supervisor { exe, count }
    }

    /// Spawns all workers, installs `SIGINT`/`SIGTERM` handlers that set a
    /// one-shot shutdown flag, and blocks until every child has exited —
    /// either naturally or because shutdown was requested and the grace
    /// period elapsed.
    pub async fn run(&self) -> std::io::Result<()> {
        let shutdown = Arc::new(AtomicBool::new(false));
        signal_hook::flag::register(signal_hook::consts::SIGINT, shutdown.clone())
            .expect("failed to install SIGINT handler");
        signal_hook::flag::register(signal_hook::consts::SIGTERM, shutdown.clone())
            .expect("failed to install SIGTERM handler");

        let mut children: Vec<Child> = Vec::with_capacity(self.count);
        for index in 0..self.count {
            let child = Command::new(&self.exe)
                .arg("run-worker")
                .arg("--index")
                .arg(index.to_string())
                .spawn()?;
            tracing::info!(index, pid = child.id(), "started worker process");
            children.push(child);
        }

        loop {
            if shutdown.load(Ordering::SeqCst) {
                tracing::info!("shutdown signal received, stopping workers");
                break;
            }
            if all_exited(&mut children) {
                tracing::info!("all workers exited on their own");
                return Ok(());
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }

        for child in &children {
            if let Some(pid) = child.id() {
                let _ = signal::kill(Pid::from_raw(pid as i32), Signal::SIGTERM);
            }
        }

        for child in &mut children {
            match tokio::time::timeout(GRACE_PERIOD, child.wait()).await {
                Ok(_) => {}
                Err(_) => {
                    tracing::warn!(pid = child.id(), "worker did not exit within grace period, killing");
                    let _ = child.start_kill();
                    let _ = child.wait().await;
                }
            }
        }

        Ok(())
    }
}

fn all_exited(children: &mut [Child]) -> bool {
    children
        .iter_mut()
        .all(|child| matches!(child.try_wait(), Ok(Some(_))))
}
