//! Render scheduling state
//!
//! Pure state machine: commands go in, effects come out. The scheduler
//! executes the effects.

use log::debug;

use super::document::PageFault;
use super::request::{RenderError, RequestId};

/// Lifecycle of a render task
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaskStatus {
    Running,
    Cancelled,
    Completed,
    Failed,
}

/// The task currently drawing on the surface
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ActiveTask {
    pub id: RequestId,
    pub page: usize,
    /// Epoch captured when the task was accepted
    pub epoch: u64,
}

/// The single successor waiting for the surface
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QueuedTask {
    pub id: RequestId,
    pub page: usize,
    pub epoch: u64,
}

/// How the worker finished a task
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TaskOutcome {
    Completed,
    Cancelled,
    Failed(PageFault),
}

/// Current render state of one viewer
#[derive(Clone, Debug, Default)]
pub struct RenderState {
    /// Pages in the loaded document, 0 when none is loaded
    pub page_count: usize,

    /// Page of the most recently committed render
    pub current_page: Option<usize>,

    /// Bumped on every accepted request and every document change
    epoch: u64,

    active: Option<ActiveTask>,
    queued: Option<QueuedTask>,
    last_status: Option<TaskStatus>,
}

impl RenderState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    #[must_use]
    pub fn active(&self) -> Option<&ActiveTask> {
        self.active.as_ref()
    }

    #[must_use]
    pub fn queued(&self) -> Option<&QueuedTask> {
        self.queued.as_ref()
    }

    /// Status of the running task, or of the last one to finish
    #[must_use]
    pub fn last_status(&self) -> Option<TaskStatus> {
        if self.active.is_some() {
            Some(TaskStatus::Running)
        } else {
            self.last_status
        }
    }

    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.active.is_none() && self.queued.is_none()
    }

    /// Current page, but only when no render is in flight or queued
    #[must_use]
    pub fn settled_page(&self) -> Option<usize> {
        if self.is_idle() {
            self.current_page
        } else {
            None
        }
    }

    /// Page the viewer is heading to: queued, else running, else current
    #[must_use]
    pub fn target_page(&self) -> Option<usize> {
        self.queued
            .map(|q| q.page)
            .or(self.active.map(|a| a.page))
            .or(self.current_page)
    }

    /// Validate a page number against the loaded document
    pub fn check_page(&self, page: usize) -> Result<(), RenderError> {
        if self.page_count == 0 {
            Err(RenderError::NoDocument)
        } else if page == 0 || page > self.page_count {
            Err(RenderError::PageOutOfRange {
                page,
                page_count: self.page_count,
            })
        } else {
            Ok(())
        }
    }

    /// Apply a command and return resulting effects
    #[must_use]
    pub fn apply(&mut self, cmd: Command) -> Vec<Effect> {
        match cmd {
            Command::Request { id, page } => self.request(id, page),
            Command::Finished { id, outcome } => self.finish(id, outcome),
            Command::SetDocument { page_count } => self.reset(page_count),
            Command::WorkerLost => self.abandon_all(),
        }
    }

    fn request(&mut self, id: RequestId, page: usize) -> Vec<Effect> {
        if let Err(error) = self.check_page(page) {
            return vec![Effect::Reject { id, error }];
        }

        self.epoch += 1;
        let epoch = self.epoch;

        match self.active {
            Some(active) => {
                let mut effects = vec![];
                if let Some(old) = self.queued.take() {
                    debug!("Dropping queued render of page {} for page {page}", old.page);
                    effects.push(Effect::Supersede(old.id));
                }
                effects.push(Effect::CancelActive(active.id));
                self.queued = Some(QueuedTask { id, page, epoch });
                effects
            }
            None => self.dispatch(id, page, epoch),
        }
    }

    fn dispatch(&mut self, id: RequestId, page: usize, epoch: u64) -> Vec<Effect> {
        self.active = Some(ActiveTask { id, page, epoch });
        vec![Effect::ClearOverlays, Effect::Dispatch { id, page }]
    }

    fn finish(&mut self, id: RequestId, outcome: TaskOutcome) -> Vec<Effect> {
        let Some(task) = self.active.filter(|a| a.id == id) else {
            debug!("Ignoring response for unknown render {id:?}");
            return vec![];
        };
        self.active = None;

        let latest = task.epoch == self.epoch;
        let mut effects = match (outcome, latest) {
            (TaskOutcome::Completed, true) => {
                self.last_status = Some(TaskStatus::Completed);
                self.current_page = Some(task.page);
                vec![Effect::Commit {
                    id,
                    page: task.page,
                }]
            }
            (TaskOutcome::Failed(fault), true) => {
                self.last_status = Some(TaskStatus::Failed);
                self.current_page = None;
                vec![Effect::Fail {
                    id,
                    page: task.page,
                    error: RenderError::Page(fault),
                }]
            }
            (TaskOutcome::Failed(fault), false) => {
                debug!("Superseded render of page {} failed: {fault}", task.page);
                self.last_status = Some(TaskStatus::Failed);
                vec![Effect::Supersede(id)]
            }
            (TaskOutcome::Completed | TaskOutcome::Cancelled, _) => {
                self.last_status = Some(TaskStatus::Cancelled);
                vec![Effect::Supersede(id)]
            }
        };

        if let Some(next) = self.queued.take() {
            effects.extend(self.dispatch(next.id, next.page, next.epoch));
        }
        effects
    }

    fn abandon_all(&mut self) -> Vec<Effect> {
        self.epoch += 1;
        self.current_page = None;
        let mut effects = vec![Effect::ClearOverlays];
        if let Some(task) = self.active.take() {
            self.last_status = Some(TaskStatus::Failed);
            effects.push(Effect::Reject {
                id: task.id,
                error: RenderError::WorkerGone,
            });
        }
        if let Some(task) = self.queued.take() {
            effects.push(Effect::Reject {
                id: task.id,
                error: RenderError::WorkerGone,
            });
        }
        effects
    }

    fn reset(&mut self, page_count: usize) -> Vec<Effect> {
        self.epoch += 1;
        self.page_count = page_count;
        self.current_page = None;

        let mut effects = vec![Effect::ClearOverlays];
        if let Some(old) = self.queued.take() {
            effects.push(Effect::Supersede(old.id));
        }
        if let Some(active) = self.active {
            effects.push(Effect::CancelActive(active.id));
        }
        effects
    }
}

/// Commands that modify render state
#[derive(Clone, Debug)]
pub enum Command {
    /// Render a page
    Request { id: RequestId, page: usize },
    /// The worker finished a task
    Finished { id: RequestId, outcome: TaskOutcome },
    /// A new document replaced the old one (0 pages = unloaded)
    SetDocument { page_count: usize },
    /// The render worker disconnected; nothing in flight will ever finish
    WorkerLost,
}

/// Effects produced by state changes
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Effect {
    /// Remove all overlays before the surface changes
    ClearOverlays,
    /// Send the task to the worker
    Dispatch { id: RequestId, page: usize },
    /// Raise the running task's cancel token
    CancelActive(RequestId),
    /// Resolve the ticket as superseded
    Supersede(RequestId),
    /// The page is now current; publish it
    Commit { id: RequestId, page: usize },
    /// The latest render failed
    Fail {
        id: RequestId,
        page: usize,
        error: RenderError,
    },
    /// The request was never accepted
    Reject { id: RequestId, error: RenderError },
}
