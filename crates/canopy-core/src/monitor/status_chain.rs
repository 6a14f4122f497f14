//! StatusProcessorChain - 子の状態から親の次の状態を決める
//!
//! # 設計原則
//! - 純粋関数（owner の状態 + 子の状態 → 次の状態）
//! - 副作用なし（遷移の実行は ApplicationBuilder に任せる）
//! - プロセッサを順に評価し、最初に Some を返したものを採用
//!
//! 子モニタが存在しない場合、その子は「終了済み・非アクティブ」として扱います。

use crate::domain::{ComponentId, Status};

/// ChildState は owner の 1 インスタンスから見た子 1 つの状態
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildState {
    pub id: ComponentId,
    /// Statuses of the child instances belonging to the owning instance.
    /// `None` when the child has no monitor.
    pub statuses: Option<Vec<Status>>,
}

impl ChildState {
    pub fn new(id: ComponentId, statuses: Option<Vec<Status>>) -> Self {
        Self { id, statuses }
    }

    fn all_terminated(&self) -> bool {
        match &self.statuses {
            None => true,
            Some(statuses) => statuses.iter().all(|s| *s == Status::Terminated),
        }
    }

    fn all_active(&self) -> bool {
        match &self.statuses {
            None => false,
            Some(statuses) => !statuses.is_empty() && statuses.iter().all(|s| *s == Status::Active),
        }
    }

    fn degraded(&self) -> bool {
        match &self.statuses {
            None => true,
            Some(statuses) => {
                statuses.iter().any(|s| *s == Status::Inactive)
                    || !statuses.iter().any(|s| *s != Status::Terminated)
            }
        }
    }
}

pub trait StatusProcessor: Send + Sync {
    fn name(&self) -> &'static str;

    fn process(&self, owner: Status, children: &[ChildState]) -> Option<Status>;
}

/// 終了中の owner は、全ての子が終了したら Terminated
pub struct TerminatedProcessor;

impl StatusProcessor for TerminatedProcessor {
    fn name(&self) -> &'static str {
        "terminated"
    }

    fn process(&self, owner: Status, children: &[ChildState]) -> Option<Status> {
        (owner == Status::Terminating && children.iter().all(ChildState::all_terminated))
            .then_some(Status::Terminated)
    }
}

/// Created / Inactive の owner は、全ての子が Active なら Active
pub struct ActiveProcessor;

impl StatusProcessor for ActiveProcessor {
    fn name(&self) -> &'static str {
        "active"
    }

    fn process(&self, owner: Status, children: &[ChildState]) -> Option<Status> {
        let waiting = matches!(owner, Status::Created | Status::Inactive);
        (waiting && !children.is_empty() && children.iter().all(ChildState::all_active))
            .then_some(Status::Active)
    }
}

/// Active の owner は、どれかの子が Inactive か消えていれば Inactive
pub struct InactiveProcessor;

impl StatusProcessor for InactiveProcessor {
    fn name(&self) -> &'static str {
        "inactive"
    }

    fn process(&self, owner: Status, children: &[ChildState]) -> Option<Status> {
        (owner == Status::Active && children.iter().any(ChildState::degraded))
            .then_some(Status::Inactive)
    }
}

pub struct StatusProcessorChain {
    processors: Vec<Box<dyn StatusProcessor>>,
}

impl StatusProcessorChain {
    pub fn new(processors: Vec<Box<dyn StatusProcessor>>) -> Self {
        Self { processors }
    }

    pub fn process(&self, owner: Status, children: &[ChildState]) -> Option<Status> {
        self.processors.iter().find_map(|p| {
            let next = p.process(owner, children)?;
            tracing::trace!(processor = p.name(), owner = %owner, next = %next, "status processor matched");
            Some(next)
        })
    }
}

impl Default for StatusProcessorChain {
    fn default() -> Self {
        Self::new(vec![
            Box::new(TerminatedProcessor),
            Box::new(ActiveProcessor),
            Box::new(InactiveProcessor),
        ])
    }
}

impl std::fmt::Debug for StatusProcessorChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.processors.iter().map(|p| p.name()))
            .finish()
    }
}
