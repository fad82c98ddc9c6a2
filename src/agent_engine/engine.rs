//! One automation session: capture -> decide -> parse -> execute, repeated
//! until the model calls `finished()` or the step budget runs out.
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::Instrument;
use uuid::Uuid;

use crate::action::{self, Action};
use crate::agent_engine::history::TurnHistory;
use crate::config::{AppConfig, RenderConfig};
use crate::device::DeviceLink;
use crate::errors::{MobileClawError, MobileClawResult};
use crate::executor::{ActionExecutor, ExecutionResult, Invoker, RenderFrame, SettleTable};
use crate::launcher::AppLauncher;
use crate::perception::{Screenshot, ScreenshotCapture};

/// The vision-language model, seen as a text oracle.
#[async_trait]
pub trait DecisionModel: Send + Sync {
    /// Returns the raw `Thought: ... Action: ...` text for the current screen.
    async fn decide(
        &self,
        instruction: &str,
        screenshot: &Screenshot,
        history: &TurnHistory,
    ) -> MobileClawResult<String>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepPhase {
    Capture,
    Decide,
    Parse,
    Execute,
}

impl fmt::Display for StepPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StepPhase::Capture => "capture",
            StepPhase::Decide => "decide",
            StepPhase::Parse => "parse",
            StepPhase::Execute => "execute",
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StepReport {
    pub step: u32,
    pub ts: DateTime<Utc>,
    pub thought: String,
    pub response: String,
    pub action: Action,
    pub results: Vec<ExecutionResult>,
    pub finished: bool,
}

pub struct AgentEngine {
    session_id: Uuid,
    capture: ScreenshotCapture,
    model: Arc<dyn DecisionModel>,
    executor: ActionExecutor,
    render: RenderConfig,
    history: TurnHistory,
    max_steps: u32,
    steps_taken: u32,
}

impl AgentEngine {
    /// Wires capture, launcher, invoker and executor around one device link.
    pub fn new(
        link: Arc<dyn DeviceLink>,
        model: Arc<dyn DecisionModel>,
        config: &AppConfig,
    ) -> MobileClawResult<Self> {
        config.validate()?;
        // Replaced on every capture unless the render size is fixed.
        let fallback = (config.device.fallback_width, config.device.fallback_height);
        let frame = RenderFrame::from_config(&config.render, fallback)?;
        let launcher = Arc::new(AppLauncher::new(link.clone(), config.launcher.clone()));
        let invoker = Invoker::new(link.clone(), launcher, SettleTable::from_config(&config.settle));
        let executor = ActionExecutor::new(
            link.clone(),
            invoker,
            frame,
            config.executor.clone(),
            &config.device,
        );

        let session_id = Uuid::new_v4();
        tracing::info!(
            session = %session_id,
            dry_run = config.executor.dry_run,
            render_fixed = config.render.width.is_some(),
            "agent session created"
        );

        Ok(Self {
            session_id,
            capture: ScreenshotCapture::new(link, config.capture.clone()),
            model,
            executor,
            render: config.render.clone(),
            history: TurnHistory::new(config.agent.history_n),
            max_steps: config.agent.max_steps,
            steps_taken: 0,
        })
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn history(&self) -> &TurnHistory {
        &self.history
    }

    /// One full turn. History is only updated after the action executed.
    pub async fn step(&mut self, instruction: &str) -> MobileClawResult<StepReport> {
        self.steps_taken += 1;
        let step = self.steps_taken;
        let span = tracing::info_span!("step", session = %self.session_id, step);
        self.step_inner(instruction, step).instrument(span).await
    }

    async fn step_inner(&mut self, instruction: &str, step: u32) -> MobileClawResult<StepReport> {
        let screenshot = self.capture.capture().await.map_err(|e| phase_failed(StepPhase::Capture, e))?;
        let frame = RenderFrame::from_config(&self.render, screenshot.size())
            .map_err(|e| phase_failed(StepPhase::Capture, e))?;
        if frame != *self.executor.frame() {
            tracing::debug!(render_w = frame.width, render_h = frame.height, "render frame updated");
            self.executor.set_frame(frame);
        }

        let response = self
            .model
            .decide(instruction, &screenshot, &self.history)
            .await
            .map_err(|e| phase_failed(StepPhase::Decide, e))?;
        tracing::debug!(response = %response, "model output");

        let turn = action::parse(&response).map_err(|e| phase_failed(StepPhase::Parse, e))?;
        let action = turn
            .action()
            .cloned()
            .ok_or_else(|| phase_failed(StepPhase::Parse, MobileClawError::MalformedOutput("no action".into())))?;
        tracing::info!(thought = %turn.thought, action = %action, "decided");

        let results = self
            .executor
            .execute(&action)
            .await
            .map_err(|e| phase_failed(StepPhase::Execute, e))?;

        self.history.push(screenshot.png, response.clone());
        let finished = turn.is_finished();

        Ok(StepReport {
            step,
            ts: Utc::now(),
            thought: turn.thought,
            response,
            finished,
            action,
            results,
        })
    }

    /// Loops until `finished()` or `max_steps`. Any step error ends the run.
    pub async fn run(&mut self, instruction: &str) -> MobileClawResult<Vec<StepReport>> {
        let mut reports = Vec::new();
        for _ in 0..self.max_steps {
            let report = self.step(instruction).await?;
            let finished = report.finished;
            reports.push(report);
            if finished {
                tracing::info!(session = %self.session_id, steps = reports.len(), "finished() received");
                return Ok(reports);
            }
        }
        tracing::warn!(session = %self.session_id, max_steps = self.max_steps, "step budget exhausted");
        Ok(reports)
    }
}

fn phase_failed(phase: StepPhase, error: MobileClawError) -> MobileClawError {
    tracing::error!(phase = %phase, error = %error, "step failed");
    error
}
