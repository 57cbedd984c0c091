//! Model download via the external `ollama pull` command.

use std::process::Stdio;

use log::info;
use tokio::process::Command;

use crate::error::{Result, SquaredError};

/// Runs `<program> pull <model>` with the terminal attached so progress is visible.
#[derive(Debug, Clone)]
pub struct ModelPuller {
    program: String,
}

impl Default for ModelPuller {
    fn default() -> Self {
        Self::new("ollama")
    }
}

impl ModelPuller {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// The command as it is echoed before running
    pub fn command_line(&self, model: &str) -> String {
        format!("{} pull {}", self.program, model)
    }

    pub async fn pull(&self, model: &str) -> Result<()> {
        info!("Running: {}", self.command_line(model));

        let status = Command::new(&self.program)
            .arg("pull")
            .arg(model)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .await
            .map_err(|e| SquaredError::Command(format!("failed to run {}: {}", self.program, e)))?;

        if status.success() {
            Ok(())
        } else {
            Err(SquaredError::Command(format!(
                "`{}` exited with {}",
                self.command_line(model),
                status
            )))
        }
    }
}
