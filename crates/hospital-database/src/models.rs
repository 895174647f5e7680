//! 数据库模型

use chrono::{DateTime, NaiveDate, Utc};
use hospital_core::models::*;
use sqlx::FromRow;

// 数据库行模型 - 使用FromRow trait用于SQL查询

/// 账单及其已付金额
#[derive(Debug, FromRow)]
pub struct DbBill {
    pub id: i64,
    pub patient_cc: i64,
    pub total: i64,
    pub paid: i64,
}

impl From<DbBill> for Bill {
    fn from(db_bill: DbBill) -> Self {
        Bill {
            id: db_bill.id,
            patient_id: db_bill.patient_cc,
            total: db_bill.total,
            paid: db_bill.paid,
        }
    }
}

/// `schedule_appointment` 的返回行
#[derive(Debug, FromRow)]
pub struct DbScheduledAppointment {
    pub appointment_id: i64,
    pub bill_id: i64,
}

/// `schedule_surgery` 的返回行
#[derive(Debug, FromRow)]
pub struct DbScheduledSurgery {
    pub surgery_id: i64,
    pub hospitalization_id: i64,
    pub bill_id: i64,
}

#[derive(Debug, FromRow)]
pub struct DbAppointment {
    pub id: i64,
    pub doctor_id: i64,
    pub start_time: DateTime<Utc>,
}

impl From<DbAppointment> for AppointmentSummary {
    fn from(row: DbAppointment) -> Self {
        AppointmentSummary {
            id: row.id,
            doctor_id: row.doctor_id,
            start_time: row.start_time,
        }
    }
}

/// `login_employee` 的返回行
#[derive(Debug, FromRow)]
pub struct DbEmployeeLogin {
    pub emp_num: i64,
    pub user_type: String,
    pub hashcode: String,
}

/// 处方查询的单行：一张处方的一种药品
#[derive(Debug, Clone, FromRow)]
pub struct DbPrescriptionRow {
    pub id: i64,
    pub validity: NaiveDate,
    pub event_type: String,
    pub event_id: i64,
    pub patient_cc: i64,
    pub dose: i32,
    pub frequency: i32,
    pub medicine: String,
}

#[derive(Debug, FromRow)]
pub struct DbDailySummary {
    pub amount_spent: i64,
    pub surgeries: i64,
    pub prescriptions: i64,
}

impl From<DbDailySummary> for DailySummary {
    fn from(row: DbDailySummary) -> Self {
        DailySummary {
            amount_spent: row.amount_spent,
            surgeries: row.surgeries,
            prescriptions: row.prescriptions,
        }
    }
}

/// 月度报表的单行：某月某位手术量最高的医生
#[derive(Debug, Clone, FromRow)]
pub struct DbReportRow {
    pub month: String,
    pub doctor_name: String,
    pub surgeries: i64,
}

/// 付款排行的单行：患者的一次诊疗中的一名护士（无诊疗或无护士时对应列为空）
#[derive(Debug, Clone, FromRow)]
pub struct DbTopPatientRow {
    pub patient_id: i64,
    pub patient_name: String,
    pub total_amount: i64,
    pub procedure_type: Option<String>,
    pub procedure_id: Option<i64>,
    pub start_time: Option<DateTime<Utc>>,
    pub doctor_id: Option<i64>,
    pub nurse_id: Option<i64>,
}
