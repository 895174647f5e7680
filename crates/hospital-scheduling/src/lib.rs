//! # 医院排期与计费模块
//!
//! 进程内实现的资源排期器、账单台账、人员目录与临床记录。
//! 预约与手术共用同一医护资源池，排期时按固定顺序独占两个池，
//! 付款时只锁定对应账单。

pub mod calendar;
pub mod directory;
pub mod ledger;
pub mod pools;
pub mod records;
pub mod scheduler;

pub use directory::StaffDirectory;
pub use ledger::BillingLedger;
pub use pools::ResourcePools;
pub use records::ClinicalRecords;
pub use scheduler::{ResourceScheduler, SchedulingPolicy};

use std::sync::Arc;

/// 组装好的进程内存储
#[derive(Debug, Clone)]
pub struct MemoryHospital {
    pub directory: Arc<StaffDirectory>,
    pub scheduler: Arc<ResourceScheduler>,
    pub ledger: Arc<BillingLedger>,
    pub records: Arc<ClinicalRecords>,
}

impl MemoryHospital {
    pub fn new(policy: SchedulingPolicy) -> Self {
        let directory = Arc::new(StaffDirectory::new());
        let pools = Arc::new(ResourcePools::new());
        let ledger = Arc::new(BillingLedger::new());
        let scheduler = Arc::new(ResourceScheduler::new(
            pools.clone(),
            ledger.clone(),
            directory.clone(),
            policy,
        ));
        let records = Arc::new(ClinicalRecords::new(pools, ledger.clone(), directory.clone()));

        Self {
            directory,
            scheduler,
            ledger,
            records,
        }
    }
}

impl Default for MemoryHospital {
    fn default() -> Self {
        Self::new(SchedulingPolicy::default())
    }
}
