//! Lifecycle statuses and the allowed-transition tables.
//!
//! # 遷移表
//! ```text
//! Created ──> Active <──> Inactive
//!    │          │            │
//!    └──────────┴─────┬──────┘
//!                     v
//!               Terminating ──> Terminated
//! ```
//! ApplicationStatus は Inactive を持たない（同じ表から Inactive を除いたもの）。
//! 表にない遷移は全て拒否され、呼び出し側はログだけ出して何も変更しない。

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle は各エンティティ種別のステータス型が実装する trait
pub trait Lifecycle: Copy + Eq + fmt::Debug + fmt::Display + Send + Sync + 'static {
    /// 生成直後のステータス
    fn initial() -> Self;

    /// 現在のステータスから遷移できるステータスの一覧
    fn next_states(self) -> &'static [Self];

    fn can_transition_to(self, next: Self) -> bool {
        self.next_states().contains(&next)
    }

    /// 終端状態（遷移先がない）
    fn is_terminal(self) -> bool {
        self.next_states().is_empty()
    }
}

/// Status is the kind-independent state carried by monitor events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Created,
    Active,
    Inactive,
    Terminating,
    Terminated,
}

impl Status {
    pub const ALL: [Status; 5] = [
        Status::Created,
        Status::Active,
        Status::Inactive,
        Status::Terminating,
        Status::Terminated,
    ];
}

impl Lifecycle for Status {
    fn initial() -> Self {
        Status::Created
    }

    fn next_states(self) -> &'static [Self] {
        match self {
            Status::Created => &[Status::Active, Status::Terminating],
            Status::Active => &[Status::Inactive, Status::Terminating],
            Status::Inactive => &[Status::Active, Status::Terminating],
            Status::Terminating => &[Status::Terminated],
            Status::Terminated => &[],
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Status::Created => "Created",
            Status::Active => "Active",
            Status::Inactive => "Inactive",
            Status::Terminating => "Terminating",
            Status::Terminated => "Terminated",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationStatus {
    Created,
    Active,
    Terminating,
    Terminated,
}

impl ApplicationStatus {
    pub const ALL: [ApplicationStatus; 4] = [
        ApplicationStatus::Created,
        ApplicationStatus::Active,
        ApplicationStatus::Terminating,
        ApplicationStatus::Terminated,
    ];
}

impl Lifecycle for ApplicationStatus {
    fn initial() -> Self {
        ApplicationStatus::Created
    }

    fn next_states(self) -> &'static [Self] {
        match self {
            ApplicationStatus::Created => {
                &[ApplicationStatus::Active, ApplicationStatus::Terminating]
            }
            ApplicationStatus::Active => &[ApplicationStatus::Terminating],
            ApplicationStatus::Terminating => &[ApplicationStatus::Terminated],
            ApplicationStatus::Terminated => &[],
        }
    }
}

impl fmt::Display for ApplicationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Status::from(*self).fmt(f)
    }
}

impl From<ApplicationStatus> for Status {
    fn from(status: ApplicationStatus) -> Self {
        match status {
            ApplicationStatus::Created => Status::Created,
            ApplicationStatus::Active => Status::Active,
            ApplicationStatus::Terminating => Status::Terminating,
            ApplicationStatus::Terminated => Status::Terminated,
        }
    }
}

impl TryFrom<Status> for ApplicationStatus {
    type Error = Status;

    /// アプリケーションには Inactive がないので、その場合は元の値を返す
    fn try_from(status: Status) -> Result<Self, Self::Error> {
        match status {
            Status::Created => Ok(ApplicationStatus::Created),
            Status::Active => Ok(ApplicationStatus::Active),
            Status::Terminating => Ok(ApplicationStatus::Terminating),
            Status::Terminated => Ok(ApplicationStatus::Terminated),
            Status::Inactive => Err(status),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupStatus {
    Created,
    Active,
    Inactive,
    Terminating,
    Terminated,
}

/// ClusterStatus は外部のクラスタ管理から届くステータス
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClusterStatus {
    Created,
    Active,
    Inactive,
    Terminating,
    Terminated,
}

// GroupStatus と ClusterStatus は Status と同じ表を共有する
macro_rules! mirror_status {
    ($ty:ident) => {
        impl From<$ty> for Status {
            fn from(status: $ty) -> Self {
                match status {
                    $ty::Created => Status::Created,
                    $ty::Active => Status::Active,
                    $ty::Inactive => Status::Inactive,
                    $ty::Terminating => Status::Terminating,
                    $ty::Terminated => Status::Terminated,
                }
            }
        }

        impl From<Status> for $ty {
            fn from(status: Status) -> Self {
                match status {
                    Status::Created => $ty::Created,
                    Status::Active => $ty::Active,
                    Status::Inactive => $ty::Inactive,
                    Status::Terminating => $ty::Terminating,
                    Status::Terminated => $ty::Terminated,
                }
            }
        }

        impl Lifecycle for $ty {
            fn initial() -> Self {
                $ty::Created
            }

            fn next_states(self) -> &'static [Self] {
                match self {
                    $ty::Created => &[$ty::Active, $ty::Terminating],
                    $ty::Active => &[$ty::Inactive, $ty::Terminating],
                    $ty::Inactive => &[$ty::Active, $ty::Terminating],
                    $ty::Terminating => &[$ty::Terminated],
                    $ty::Terminated => &[],
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                Status::from(*self).fmt(f)
            }
        }
    };
}

mirror_status!(GroupStatus);
mirror_status!(ClusterStatus);

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::created_to_active(Status::Created, Status::Active, true)]
    #[case::created_to_terminating(Status::Created, Status::Terminating, true)]
    #[case::active_to_inactive(Status::Active, Status::Inactive, true)]
    #[case::inactive_to_active(Status::Inactive, Status::Active, true)]
    #[case::active_to_terminating(Status::Active, Status::Terminating, true)]
    #[case::inactive_to_terminating(Status::Inactive, Status::Terminating, true)]
    #[case::terminating_to_terminated(Status::Terminating, Status::Terminated, true)]
    #[case::created_to_inactive(Status::Created, Status::Inactive, false)]
    #[case::created_to_terminated(Status::Created, Status::Terminated, false)]
    #[case::active_to_created(Status::Active, Status::Created, false)]
    #[case::active_to_terminated(Status::Active, Status::Terminated, false)]
    #[case::terminating_to_active(Status::Terminating, Status::Active, false)]
    #[case::terminated_to_created(Status::Terminated, Status::Created, false)]
    #[case::self_loop(Status::Active, Status::Active, false)]
    fn group_table(#[case] from: Status, #[case] to: Status, #[case] allowed: bool) {
        assert_eq!(from.can_transition_to(to), allowed);
        assert_eq!(
            GroupStatus::from(from).can_transition_to(GroupStatus::from(to)),
            allowed
        );
        assert_eq!(
            ClusterStatus::from(from).can_transition_to(ClusterStatus::from(to)),
            allowed
        );
    }

    #[rstest]
    #[case::created_to_active(ApplicationStatus::Created, ApplicationStatus::Active, true)]
    #[case::created_to_terminating(ApplicationStatus::Created, ApplicationStatus::Terminating, true)]
    #[case::active_to_terminating(ApplicationStatus::Active, ApplicationStatus::Terminating, true)]
    #[case::terminating_to_terminated(ApplicationStatus::Terminating, ApplicationStatus::Terminated, true)]
    #[case::active_to_created(ApplicationStatus::Active, ApplicationStatus::Created, false)]
    #[case::created_to_terminated(ApplicationStatus::Created, ApplicationStatus::Terminated, false)]
    #[case::terminated_to_active(ApplicationStatus::Terminated, ApplicationStatus::Active, false)]
    fn application_table(
        #[case] from: ApplicationStatus,
        #[case] to: ApplicationStatus,
        #[case] allowed: bool,
    ) {
        assert_eq!(from.can_transition_to(to), allowed);
    }

    #[test]
    fn terminated_is_the_only_sink() {
        for status in Status::ALL {
            assert_eq!(status.is_terminal(), status == Status::Terminated);
        }
        for status in ApplicationStatus::ALL {
            assert_eq!(status.is_terminal(), status == ApplicationStatus::Terminated);
        }
    }

    #[test]
    fn application_status_has_no_inactive() {
        assert_eq!(ApplicationStatus::try_from(Status::Inactive), Err(Status::Inactive));
        assert_eq!(
            ApplicationStatus::try_from(Status::Terminating),
            Ok(ApplicationStatus::Terminating)
        );
    }
}
