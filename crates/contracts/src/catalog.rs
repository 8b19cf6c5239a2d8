// Static contract catalog
//
// The full list of RPC bindings per domain. Services build their registry
// from this list at startup; the gateway domain only calls and owns no RPC
// patterns.

use crate::identity::{AuthLogin, AuthRefresh, AuthRegister, AuthValidate, UsersFindAll, UsersFindByIds};
use crate::notifications::{NotificationsFindAll, NotificationsMarkAllRead, NotificationsMarkRead};
use crate::pattern::Domain;
use crate::rpc::ContractEntry;
use crate::tasks::{
    TasksCommentCreate, TasksCommentFindAll, TasksCreate, TasksDelete, TasksFindAll,
    TasksFindOne, TasksHistory, TasksUpdate,
};

/// Contract entries owned by `domain`.
pub fn catalog(domain: Domain) -> Vec<ContractEntry> {
    match domain {
        Domain::Identity => vec![
            ContractEntry::of::<AuthRegister>(),
            ContractEntry::of::<AuthLogin>(),
            ContractEntry::of::<AuthRefresh>(),
            ContractEntry::of::<AuthValidate>(),
            ContractEntry::of::<UsersFindAll>(),
            ContractEntry::of::<UsersFindByIds>(),
        ],
        Domain::Tasks => vec![
            ContractEntry::of::<TasksCreate>(),
            ContractEntry::of::<TasksFindAll>(),
            ContractEntry::of::<TasksFindOne>(),
            ContractEntry::of::<TasksUpdate>(),
            ContractEntry::of::<TasksDelete>(),
            ContractEntry::of::<TasksCommentCreate>(),
            ContractEntry::of::<TasksCommentFindAll>(),
            ContractEntry::of::<TasksHistory>(),
        ],
        Domain::Notifications => vec![
            ContractEntry::of::<NotificationsFindAll>(),
            ContractEntry::of::<NotificationsMarkRead>(),
            ContractEntry::of::<NotificationsMarkAllRead>(),
        ],
        Domain::Gateway => Vec::new(),
    }
}

/// Every contract entry across all domains.
pub fn full_catalog() -> Vec<ContractEntry> {
    Domain::ALL.iter().flat_map(|d| catalog(*d)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::RpcPattern;

    #[test]
    fn test_catalog_covers_every_rpc_pattern_once() {
        let entries = full_catalog();
        assert_eq!(entries.len(), RpcPattern::ALL.len());
        for pattern in RpcPattern::ALL {
            let count = entries.iter().filter(|e| e.pattern == pattern).count();
            assert_eq!(count, 1, "{pattern} should appear exactly once");
        }
    }

    #[test]
    fn test_entries_live_in_their_domain() {
        for domain in Domain::ALL {
            for entry in catalog(domain) {
                assert_eq!(entry.pattern.domain(), domain);
            }
        }
    }
}
