//! 存储接口
//!
//! 业务层只依赖这些 trait；进程内实现位于 `hospital-scheduling`，
//! PostgreSQL 实现位于 `hospital-database`。

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::error::Result;
use crate::models::*;

/// 凭证存储：注册与登录查询
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// 注册新主体，返回分配的标识
    async fn register(&self, registration: Registration) -> Result<PrincipalId>;

    /// 按登录名查找凭证
    async fn find_credential(&self, login: &LoginName) -> Result<Option<StoredCredential>>;
}

/// 资源排期
///
/// 实现必须在检查冲突和写入之间独占预约池与手术池（先预约池、后手术池），
/// 失败时不保留任何部分写入。
#[async_trait]
pub trait BookingStore: Send + Sync {
    async fn schedule(&self, request: BookingRequest) -> Result<BookingReceipt>;

    async fn appointments_for(&self, patient_id: PrincipalId) -> Result<Vec<AppointmentSummary>>;
}

/// 账单与付款
///
/// 同一账单的读取、汇总与写入必须是一个原子单元。
#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn bill(&self, bill_id: BillId) -> Result<Option<Bill>>;

    /// 返回付款后的剩余金额
    async fn apply_payment(&self, payment: PaymentRequest) -> Result<i64>;
}

/// 处方与报表
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn add_prescription(&self, prescription: NewPrescription) -> Result<PrescriptionId>;

    /// 有效期不早于 `today` 的处方
    async fn prescriptions_for(&self, patient_id: PrincipalId, today: NaiveDate) -> Result<Vec<Prescription>>;

    async fn daily_summary(&self, date: NaiveDate) -> Result<DailySummary>;

    async fn monthly_report(&self) -> Result<Vec<MonthlyReportEntry>>;

    /// `month_of` 所在月份付款最多的患者（至多 [`TOP_PAYING_PATIENTS`] 名），按金额降序
    async fn top_paying_patients(&self, month_of: NaiveDate) -> Result<Vec<TopPayingPatient>>;
}
