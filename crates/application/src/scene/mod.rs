//! Scene activation and best-effort ordered execution.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use domain::command::{Command, CommandResolution, CommandSource};
use domain::condition::Condition;
use domain::device::DeviceId;
use domain::error::{CoreError, Result};
use domain::event::{CoreEvent, EventPublisher};
use domain::scene::{ActionFailure, ExecutionStatus, Scene, SceneExecution};
use domain::store::SceneStore;

use crate::command::processor::CommandProcessor;
use crate::events::EventHandler;
use crate::logic::{self, EvalContext, HouseMode, StateView, SunProvider};
use crate::state::StateManager;

/// Terminal execution snapshots kept queryable before eviction.
const RETAINED_EXECUTIONS: usize = 32;

struct ExecutionHandle {
    execution: Arc<Mutex<SceneExecution>>,
    cancel: CancellationToken,
}

/// Activates scenes and drives their executions to completion.
///
/// `activate` returns the execution id immediately; the actions run in a
/// spawned task. A failing action never aborts the rest of the scene and
/// nothing is ever rolled back.
pub struct SceneEngine {
    scenes: Arc<dyn SceneStore>,
    processor: Arc<CommandProcessor>,
    publisher: Arc<dyn EventPublisher>,
    states: Arc<StateManager>,
    mode: Arc<HouseMode>,
    sun: Arc<dyn SunProvider>,
    executions: Arc<DashMap<String, ExecutionHandle>>,
    /// Terminal execution ids, oldest first; drives eviction.
    finished: Arc<Mutex<VecDeque<String>>>,
}

impl SceneEngine {
    pub fn new(
        scenes: Arc<dyn SceneStore>,
        processor: Arc<CommandProcessor>,
        publisher: Arc<dyn EventPublisher>,
        states: Arc<StateManager>,
        mode: Arc<HouseMode>,
        sun: Arc<dyn SunProvider>,
    ) -> Self {
        Self {
            scenes,
            processor,
            publisher,
            states,
            mode,
            sun,
            executions: Arc::new(DashMap::new()),
            finished: Arc::new(Mutex::new(VecDeque::new())),
        }
    }

    /// Starts an activation. Guard conditions are AND-combined; any false
    /// condition aborts up front with zero actions issued.
    pub async fn activate(&self, scene_id: &str, trigger: CommandSource) -> Result<String> {
        let scene = self
            .scenes
            .get(scene_id)
            .await?
            .ok_or_else(|| CoreError::not_found("Scene", scene_id))?;

        if !scene.enabled {
            return Err(CoreError::validation(format!(
                "scene {} is disabled",
                scene_id
            )));
        }

        let mode = self.mode.get();
        let ctx = EvalContext {
            states: self.states.as_ref(),
            mode: &mode,
            sun: self.sun.today(),
            now: Utc::now(),
            local: chrono::Local::now().naive_local(),
        };
        if !logic::evaluate(&scene.conditions, &ctx) {
            return Err(CoreError::validation(format!(
                "scene {} conditions not met",
                scene_id
            )));
        }

        let execution = SceneExecution::new(scene.id.clone(), trigger, scene.actions.len());
        let execution_id = execution.id.clone();
        let shared = Arc::new(Mutex::new(execution));
        let cancel = CancellationToken::new();

        self.executions.insert(
            execution_id.clone(),
            ExecutionHandle {
                execution: Arc::clone(&shared),
                cancel: cancel.clone(),
            },
        );

        info!(
            scene_id = %scene.id,
            execution_id = %execution_id,
            actions = scene.actions.len(),
            trigger = %trigger.as_str(),
            "Scene activated"
        );

        let processor = Arc::clone(&self.processor);
        let publisher = Arc::clone(&self.publisher);
        let executions = Arc::clone(&self.executions);
        let finished = Arc::clone(&self.finished);
        let id = execution_id.clone();
        tokio::spawn(async move {
            run_execution(scene, shared, cancel, processor, publisher).await;
            retire(&executions, &finished, id);
        });

        Ok(execution_id)
    }

    /// Evaluates every enabled scene against one state transition and
    /// starts the ones whose conditions just became true. Returns the
    /// started execution ids.
    ///
    /// A scene fires on the edge only: conditions that already held
    /// against the device's previous properties do not re-fire on every
    /// subsequent update.
    pub async fn trigger_from_state(
        &self,
        device_id: &DeviceId,
        old: Option<&serde_json::Map<String, serde_json::Value>>,
    ) -> Vec<String> {
        let scenes = match self.scenes.list().await {
            Ok(scenes) => scenes,
            Err(e) => {
                warn!("Scene listing failed during trigger evaluation: {}", e);
                return Vec::new();
            }
        };

        let mut started = Vec::new();
        for scene in scenes {
            if !scene.enabled || !references_device(&scene.conditions, device_id) {
                continue;
            }
            if self.held_before(&scene, device_id, old) {
                continue;
            }
            match self.activate(&scene.id, CommandSource::Automation).await {
                Ok(execution_id) => {
                    info!(
                        scene_id = %scene.id,
                        execution_id = %execution_id,
                        device_id = %device_id,
                        "Scene triggered by state change"
                    );
                    started.push(execution_id);
                }
                // Conditions not met with the full current snapshot
                Err(CoreError::Validation(_)) => {}
                Err(e) => warn!(scene_id = %scene.id, "Scene trigger failed: {}", e),
            }
        }
        started
    }

    /// Did the scene's conditions already hold with the device's previous
    /// properties in place of the current ones?
    fn held_before(
        &self,
        scene: &Scene,
        device_id: &DeviceId,
        old: Option<&serde_json::Map<String, serde_json::Value>>,
    ) -> bool {
        let prior = PriorView {
            current: self.states.as_ref(),
            device_id,
            properties: old,
        };
        let mode = self.mode.get();
        let ctx = EvalContext {
            states: &prior,
            mode: &mode,
            sun: self.sun.today(),
            now: Utc::now(),
            local: chrono::Local::now().naive_local(),
        };
        logic::evaluate(&scene.conditions, &ctx)
    }

    /// Stops issuing further actions. Already-issued commands are left to
    /// resolve on their own; nothing is undone.
    pub fn cancel(&self, execution_id: &str) -> Result<()> {
        match self.executions.get(execution_id) {
            Some(handle) => {
                handle.cancel.cancel();
                info!(execution_id = %execution_id, "Scene execution cancelled");
                Ok(())
            }
            None => Err(CoreError::not_found("SceneExecution", execution_id)),
        }
    }

    /// Current snapshot of an execution. Terminal snapshots stay
    /// queryable until displaced by newer terminal executions.
    pub fn execution(&self, execution_id: &str) -> Option<SceneExecution> {
        self.executions.get(execution_id).map(|handle| {
            handle
                .execution
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .clone()
        })
    }
}

/// Records a terminal execution and evicts the oldest ones beyond the
/// retention cap. Running executions are never evicted.
fn retire(
    executions: &DashMap<String, ExecutionHandle>,
    finished: &Mutex<VecDeque<String>>,
    execution_id: String,
) {
    let mut order = finished.lock().unwrap_or_else(|e| e.into_inner());
    order.push_back(execution_id);
    while order.len() > RETAINED_EXECUTIONS {
        if let Some(evicted) = order.pop_front() {
            executions.remove(&evicted);
        }
    }
}

/// True when any condition reads state of the given device.
fn references_device(conditions: &[Condition], device_id: &DeviceId) -> bool {
    conditions.iter().any(|c| {
        matches!(c, Condition::StateCompare { device_id: d, .. } if d == device_id)
    })
}

/// Current state snapshot with one device's properties replaced by its
/// pre-transition values.
struct PriorView<'a> {
    current: &'a StateManager,
    device_id: &'a DeviceId,
    properties: Option<&'a serde_json::Map<String, serde_json::Value>>,
}

impl StateView for PriorView<'_> {
    fn property(&self, device_id: &DeviceId, property: &str) -> Option<serde_json::Value> {
        if device_id == self.device_id {
            return self.properties.and_then(|p| p.get(property)).cloned();
        }
        self.current.property(device_id, property)
    }
}

/// Event-router handler that turns state transitions into scene
/// activations with an automation source.
pub struct SceneTriggerHandler {
    engine: Arc<SceneEngine>,
}

impl SceneTriggerHandler {
    pub fn new(engine: Arc<SceneEngine>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl EventHandler for SceneTriggerHandler {
    fn name(&self) -> &str {
        "scene-triggers"
    }

    async fn handle(&self, event: CoreEvent) {
        if let CoreEvent::StateChanged {
            device_id, old, ..
        } = event
        {
            let started = self.engine.trigger_from_state(&device_id, old.as_ref()).await;
            if !started.is_empty() {
                debug!(device_id = %device_id, count = started.len(), "Scenes started from state change");
            }
        }
    }
}

struct IssuedAction {
    index: usize,
    device_id: DeviceId,
    command: String,
    rx: oneshot::Receiver<CommandResolution>,
}

async fn run_execution(
    scene: Scene,
    shared: Arc<Mutex<SceneExecution>>,
    cancel: CancellationToken,
    processor: Arc<CommandProcessor>,
    publisher: Arc<dyn EventPublisher>,
) {
    {
        let mut exec = shared.lock().unwrap_or_else(|e| e.into_inner());
        exec.status = ExecutionStatus::Running;
    }
    publish_progress(&shared, &publisher).await;

    // Consecutive parallel actions form a group; a non-parallel action
    // waits for the previous group to fully resolve before it is issued
    let mut waiting: Vec<IssuedAction> = Vec::new();
    let mut cancelled = false;

    for (index, action) in scene.actions.iter().enumerate() {
        if index > 0 && !action.parallel {
            drain(&mut waiting, &shared, &publisher).await;
        }

        if cancel.is_cancelled() {
            cancelled = true;
            break;
        }

        if action.delay_ms > 0 {
            tokio::select! {
                _ = cancel.cancelled() => {
                    cancelled = true;
                }
                _ = tokio::time::sleep(Duration::from_millis(action.delay_ms)) => {}
            }
            if cancelled {
                break;
            }
        }

        {
            let mut exec = shared.lock().unwrap_or_else(|e| e.into_inner());
            exec.current_action = Some(index);
        }

        let mut parameters = action.parameters.clone();
        if action.fade_ms > 0 {
            parameters.insert("fade_ms".to_string(), serde_json::json!(action.fade_ms));
        }
        let cmd = Command::new(
            action.device_id.clone(),
            action.command.clone(),
            parameters,
            CommandSource::Scene,
            None,
        );

        match processor.execute(cmd).await {
            Ok(rx) => waiting.push(IssuedAction {
                index,
                device_id: action.device_id.clone(),
                command: action.command.clone(),
                rx,
            }),
            Err(e) => {
                // Recorded and carried on; one failure never stops a scene
                warn!(
                    scene_id = %scene.id,
                    action_index = index,
                    device_id = %action.device_id,
                    "Scene action rejected: {}",
                    e
                );
                {
                    let mut exec = shared.lock().unwrap_or_else(|e| e.into_inner());
                    exec.actions_completed += 1;
                    exec.failures.push(ActionFailure {
                        action_index: index,
                        device_id: action.device_id.clone(),
                        command: action.command.clone(),
                        code: error_code(&e).to_string(),
                        message: e.to_string(),
                    });
                }
                publish_progress(&shared, &publisher).await;
            }
        }
    }

    // Issued commands resolve even when the activation was cancelled
    drain(&mut waiting, &shared, &publisher).await;

    let (status, failed) = {
        let mut exec = shared.lock().unwrap_or_else(|e| e.into_inner());
        exec.status = if cancelled {
            ExecutionStatus::Cancelled
        } else {
            ExecutionStatus::Completed
        };
        exec.completed_at = Some(Utc::now());
        exec.current_action = None;
        (exec.status, exec.failures.len())
    };
    publish_progress(&shared, &publisher).await;

    info!(
        scene_id = %scene.id,
        status = ?status,
        failures = failed,
        "Scene execution finished"
    );
}

async fn drain(
    waiting: &mut Vec<IssuedAction>,
    shared: &Arc<Mutex<SceneExecution>>,
    publisher: &Arc<dyn EventPublisher>,
) {
    for issued in waiting.drain(..) {
        let failure = match issued.rx.await {
            Ok(resolution) => match resolution {
                CommandResolution::Failed { code, message } => Some((code, message)),
                CommandResolution::TimedOut => Some((
                    "TIMEOUT".to_string(),
                    "no acknowledgment within deadline".to_string(),
                )),
                CommandResolution::Confirmed | CommandResolution::Unconfirmed => None,
            },
            // Tracker dropped the sender without resolving (shutdown)
            Err(_) => Some((
                "UNRESOLVED".to_string(),
                "command was never resolved".to_string(),
            )),
        };

        {
            let mut exec = shared.lock().unwrap_or_else(|e| e.into_inner());
            exec.actions_completed += 1;
            if let Some((code, message)) = failure {
                exec.failures.push(ActionFailure {
                    action_index: issued.index,
                    device_id: issued.device_id,
                    command: issued.command,
                    code,
                    message,
                });
            }
        }
        publish_progress(shared, publisher).await;
    }
}

async fn publish_progress(shared: &Arc<Mutex<SceneExecution>>, publisher: &Arc<dyn EventPublisher>) {
    let snapshot = shared.lock().unwrap_or_else(|e| e.into_inner()).clone();
    if let Err(e) = publisher.publish(CoreEvent::scene_progress(&snapshot)).await {
        warn!("Failed to publish scene progress: {}", e);
    }
}

fn error_code(error: &CoreError) -> &'static str {
    match error {
        CoreError::BridgeUnavailable(_) => "BRIDGE_UNAVAILABLE",
        CoreError::NotFound { .. } => "DEVICE_NOT_FOUND",
        CoreError::Authorization(_) => "NOT_AUTHORIZED",
        CoreError::Validation(_) | CoreError::InvalidDeviceId(_) => "INVALID_COMMAND",
        CoreError::CommandTimeout(_) => "TIMEOUT",
        CoreError::CommandFailed { .. } => "COMMAND_FAILED",
        CoreError::Storage(_) => "STORAGE_ERROR",
    }
}
