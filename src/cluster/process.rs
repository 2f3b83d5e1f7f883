use parking_lot::Mutex;
use std::io::Read;
use std::process::{Child, Command, Stdio};
use std::sync::Arc;
use std::thread::JoinHandle;

use crate::cluster::traits::{BackgroundProcess, ProcessExit};

/// A spawned OS process whose stderr is drained on a side thread so the child
/// never stalls on a full pipe.
pub struct ChildProcess {
    child: Child,
    stderr: Arc<Mutex<String>>,
    drain: Option<JoinHandle<()>>,
}

impl ChildProcess {
    pub fn spawn(mut command: Command) -> std::io::Result<Self> {
        let mut child = command
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()?;

        let stderr = Arc::new(Mutex::new(String::new()));
        let drain = child.stderr.take().map(|mut pipe| {
            let buffer = Arc::clone(&stderr);
            std::thread::spawn(move || {
                let mut chunk = [0u8; 4096];
                loop {
                    match pipe.read(&mut chunk) {
                        Ok(0) | Err(_) => break,
                        Ok(n) => buffer.lock().push_str(&String::from_utf8_lossy(&chunk[..n])),
                    }
                }
            })
        });

        Ok(Self {
            child,
            stderr,
            drain,
        })
    }

    pub fn id(&self) -> u32 {
        self.child.id()
    }
}

impl BackgroundProcess for ChildProcess {
    fn try_wait(&mut self) -> std::io::Result<Option<ProcessExit>> {
        let Some(status) = self.child.try_wait()? else {
            return Ok(None);
        };

        // Report the exit only once its output has been fully collected.
        if let Some(drain) = self.drain.take() {
            if !drain.is_finished() {
                self.drain = Some(drain);
                return Ok(None);
            }
            let _ = drain.join();
        }

        let output = self.stderr.lock().trim().to_string();
        Ok(Some(ProcessExit {
            success: status.success(),
            code: status.code(),
            output,
        }))
    }
}
