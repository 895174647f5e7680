//! 账单台账
//!
//! 每张账单由独立的 `Mutex` 保护，读取余额、校验金额和记入付款在同一把锁内完成；
//! 不同账单之间互不阻塞。

use async_trait::async_trait;
use chrono::Utc;
use hospital_core::{
    Bill, BillId, HospitalError, LedgerStore, Payment, PaymentRequest, PrincipalId, Result, TimeWindow,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

#[derive(Debug)]
struct BillAccount {
    bill: Bill,
    payments: Vec<Payment>,
}

/// 进程内账单台账
#[derive(Debug)]
pub struct BillingLedger {
    accounts: RwLock<HashMap<BillId, Arc<Mutex<BillAccount>>>>,
    next_id: AtomicI64,
}

impl BillingLedger {
    pub fn new() -> Self {
        Self {
            accounts: RwLock::new(HashMap::new()),
            next_id: AtomicI64::new(1),
        }
    }

    async fn account(&self, bill_id: BillId) -> Option<Arc<Mutex<BillAccount>>> {
        self.accounts.read().await.get(&bill_id).cloned()
    }

    /// 为患者开立新账单
    pub async fn open_bill(&self, patient_id: PrincipalId, total: i64) -> BillId {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let account = BillAccount {
            bill: Bill {
                id,
                patient_id,
                total,
                paid: 0,
            },
            payments: Vec::new(),
        };
        self.accounts.write().await.insert(id, Arc::new(Mutex::new(account)));
        debug!("Opened bill {} for patient {} with total {}", id, patient_id, total);
        id
    }

    /// 在已有账单上追加费用
    pub async fn charge(&self, bill_id: BillId, amount: i64) -> Result<i64> {
        let account = self
            .account(bill_id)
            .await
            .ok_or_else(|| HospitalError::not_found(format!("bill {} not found", bill_id)))?;
        let mut account = account.lock().await;
        account.bill.total += amount;
        debug!("Charged {} to bill {}, total now {}", amount, bill_id, account.bill.total);
        Ok(account.bill.total)
    }

    /// 时间窗口内各患者账单收到的付款总额
    pub async fn paid_by_patient(&self, period: &TimeWindow) -> BTreeMap<PrincipalId, i64> {
        let accounts: Vec<Arc<Mutex<BillAccount>>> = self.accounts.read().await.values().cloned().collect();

        let mut totals = BTreeMap::new();
        for account in accounts {
            let account = account.lock().await;
            let paid: i64 = account
                .payments
                .iter()
                .filter(|p| period.includes(p.paid_at))
                .map(|p| p.amount)
                .sum();
            if paid > 0 {
                *totals.entry(account.bill.patient_id).or_insert(0) += paid;
            }
        }
        totals
    }

    /// 账单已支付金额
    pub async fn amount_paid(&self, bill_id: BillId) -> i64 {
        match self.account(bill_id).await {
            Some(account) => account.lock().await.bill.paid,
            None => 0,
        }
    }
}

impl Default for BillingLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LedgerStore for BillingLedger {
    async fn bill(&self, bill_id: BillId) -> Result<Option<Bill>> {
        Ok(match self.account(bill_id).await {
            Some(account) => Some(account.lock().await.bill.clone()),
            None => None,
        })
    }

    async fn apply_payment(&self, payment: PaymentRequest) -> Result<i64> {
        payment.validate()?;

        let account = self
            .account(payment.bill_id)
            .await
            .ok_or_else(|| HospitalError::not_found(format!("bill {} not found", payment.bill_id)))?;
        let mut account = account.lock().await;

        let remaining = account.bill.remaining();
        if payment.amount > remaining {
            warn!(
                "Rejected payment of {} on bill {}: remaining balance is {}",
                payment.amount, payment.bill_id, remaining
            );
            return Err(HospitalError::invalid_input(format!(
                "payment of {} exceeds the remaining balance of {}",
                payment.amount, remaining
            )));
        }

        account.bill.paid += payment.amount;
        account.payments.push(Payment {
            bill_id: payment.bill_id,
            amount: payment.amount,
            method: payment.method,
            payer_id: payment.payer_id,
            paid_at: Utc::now(),
        });

        let remaining = account.bill.remaining();
        info!("Payment of {} applied to bill {}, remaining {}", payment.amount, payment.bill_id, remaining);
        Ok(remaining)
    }
}
