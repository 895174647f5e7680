//! 核心数据模型定义

use chrono::{DateTime, Datelike, Duration, Months, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use crate::error::{HospitalError, Result};

pub type PrincipalId = i64;
pub type AppointmentId = i64;
pub type SurgeryId = i64;
pub type HospitalizationId = i64;
pub type BillId = i64;
pub type PrescriptionId = i64;

/// 用户角色
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// 患者
    Patient,
    /// 助理 - 排期手术、开具处方、查看报表
    Assistant,
    /// 护士
    Nurse,
    /// 医生
    Doctor,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Patient => "patient",
            Role::Assistant => "assistant",
            Role::Nurse => "nurse",
            Role::Doctor => "doctor",
        }
    }

    /// 是否为医院员工
    pub fn is_staff(&self) -> bool {
        !matches!(self, Role::Patient)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = HospitalError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "patient" => Ok(Role::Patient),
            "assistant" => Ok(Role::Assistant),
            "nurse" => Ok(Role::Nurse),
            "doctor" => Ok(Role::Doctor),
            other => Err(HospitalError::invalid_input(format!("unknown role: {}", other))),
        }
    }
}

/// 已认证的主体，按角色区分
///
/// 患者以身份证号（cc）标识，员工以注册时分配的员工号标识。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Principal {
    Patient { cc: PrincipalId },
    Assistant { id: PrincipalId },
    Nurse { id: PrincipalId },
    Doctor { id: PrincipalId },
}

impl Principal {
    pub fn new(role: Role, id: PrincipalId) -> Self {
        match role {
            Role::Patient => Principal::Patient { cc: id },
            Role::Assistant => Principal::Assistant { id },
            Role::Nurse => Principal::Nurse { id },
            Role::Doctor => Principal::Doctor { id },
        }
    }

    pub fn role(&self) -> Role {
        match self {
            Principal::Patient { .. } => Role::Patient,
            Principal::Assistant { .. } => Role::Assistant,
            Principal::Nurse { .. } => Role::Nurse,
            Principal::Doctor { .. } => Role::Doctor,
        }
    }

    pub fn id(&self) -> PrincipalId {
        match *self {
            Principal::Patient { cc } => cc,
            Principal::Assistant { id } | Principal::Nurse { id } | Principal::Doctor { id } => id,
        }
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.role(), self.id())
    }
}

/// 半开时间窗口 `[start, end)`
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self> {
        if end <= start {
            return Err(HospitalError::invalid_input(format!(
                "end time {} must be after start time {}",
                end, start
            )));
        }
        Ok(Self { start, end })
    }

    /// 以固定时长构造窗口
    pub fn starting_at(start: DateTime<Utc>, minutes: i64) -> Result<Self> {
        let end = Duration::try_minutes(minutes)
            .and_then(|length| start.checked_add_signed(length))
            .ok_or_else(|| HospitalError::invalid_input(format!("duration of {} minutes is out of range", minutes)))?;
        Self::new(start, end)
    }

    /// `date` 所在自然月：`[当月1日 00:00, 次月1日 00:00)`
    pub fn month_of(date: NaiveDate) -> Result<Self> {
        let out_of_range = || HospitalError::invalid_input(format!("date {} is out of range", date));
        let first = date.with_day(1).ok_or_else(out_of_range)?;
        let next = first.checked_add_months(Months::new(1)).ok_or_else(out_of_range)?;
        Self::new(
            Utc.from_utc_datetime(&first.and_time(NaiveTime::MIN)),
            Utc.from_utc_datetime(&next.and_time(NaiveTime::MIN)),
        )
    }

    /// 时刻是否落在窗口内
    pub fn includes(&self, at: DateTime<Utc>) -> bool {
        self.start <= at && at < self.end
    }

    pub fn overlaps(&self, other: &TimeWindow) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// `other` 是否完全落在本窗口内（端点包含）
    pub fn contains(&self, other: &TimeWindow) -> bool {
        self.start <= other.start && other.end <= self.end
    }
}

/// 护士分配：(护士ID, 角色标签)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NurseAssignment {
    pub nurse_id: PrincipalId,
    pub role: String,
}

/// 预约/手术的种类，两者共享同一医护资源池
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum BookingKind {
    Appointment,
    Surgery,
}

/// 门诊预约
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Appointment {
    pub id: AppointmentId,
    pub patient_id: PrincipalId,
    pub doctor_id: PrincipalId,
    pub window: TimeWindow,
    pub nurses: Vec<NurseAssignment>,
    pub bill_id: BillId,
}

/// 手术
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Surgery {
    pub id: SurgeryId,
    pub patient_id: PrincipalId,
    pub doctor_id: PrincipalId,
    pub window: TimeWindow,
    pub nurses: Vec<NurseAssignment>,
    pub hospitalization_id: HospitalizationId,
}

/// 住院记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hospitalization {
    pub id: HospitalizationId,
    pub patient_id: PrincipalId,
    pub stay: TimeWindow,
    pub responsible_nurse: PrincipalId,
    pub bill_id: BillId,
}

/// 账单
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Bill {
    pub id: BillId,
    pub patient_id: PrincipalId,
    pub total: i64,
    pub paid: i64,
}

impl Bill {
    pub fn remaining(&self) -> i64 {
        self.total - self.paid
    }
}

/// 付款记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub bill_id: BillId,
    pub amount: i64,
    pub method: String,
    pub payer_id: PrincipalId,
    pub paid_at: DateTime<Utc>,
}

// ========== 排期请求 ==========

/// 门诊预约请求
#[derive(Debug, Clone)]
pub struct AppointmentRequest {
    pub patient_id: PrincipalId,
    pub doctor_id: PrincipalId,
    pub start: DateTime<Utc>,
    pub nurses: Vec<NurseAssignment>,
}

/// 手术关联的住院信息
#[derive(Debug, Clone)]
pub enum HospitalizationPlan {
    /// 挂到已有住院记录
    Existing(HospitalizationId),
    /// 同时新建住院记录及其账单
    New {
        stay: TimeWindow,
        responsible_nurse: PrincipalId,
    },
}

/// 手术排期请求
#[derive(Debug, Clone)]
pub struct SurgeryRequest {
    pub patient_id: PrincipalId,
    pub doctor_id: PrincipalId,
    pub window: TimeWindow,
    pub nurses: Vec<NurseAssignment>,
    pub hospitalization: HospitalizationPlan,
}

#[derive(Debug, Clone)]
pub enum BookingRequest {
    Appointment(AppointmentRequest),
    Surgery(SurgeryRequest),
}

impl BookingRequest {
    pub fn kind(&self) -> BookingKind {
        match self {
            BookingRequest::Appointment(_) => BookingKind::Appointment,
            BookingRequest::Surgery(_) => BookingKind::Surgery,
        }
    }

    pub fn doctor_id(&self) -> PrincipalId {
        match self {
            BookingRequest::Appointment(r) => r.doctor_id,
            BookingRequest::Surgery(r) => r.doctor_id,
        }
    }

    pub fn patient_id(&self) -> PrincipalId {
        match self {
            BookingRequest::Appointment(r) => r.patient_id,
            BookingRequest::Surgery(r) => r.patient_id,
        }
    }

    pub fn nurses(&self) -> &[NurseAssignment] {
        match self {
            BookingRequest::Appointment(r) => &r.nurses,
            BookingRequest::Surgery(r) => &r.nurses,
        }
    }

    pub fn start(&self) -> DateTime<Utc> {
        match self {
            BookingRequest::Appointment(r) => r.start,
            BookingRequest::Surgery(r) => r.window.start,
        }
    }

    /// 与存储无关的输入校验，任何写操作之前执行
    pub fn validate(&self, now: DateTime<Utc>) -> Result<()> {
        if self.doctor_id() <= 0 || self.patient_id() <= 0 {
            return Err(HospitalError::invalid_input("doctor and patient ids must be positive"));
        }
        if self.start() <= now {
            return Err(HospitalError::invalid_input(format!(
                "booking start {} must be in the future",
                self.start()
            )));
        }
        validate_nurse_assignments(self.nurses())?;

        if let BookingRequest::Surgery(surgery) = self {
            if let HospitalizationPlan::New { stay, responsible_nurse } = &surgery.hospitalization {
                if *responsible_nurse <= 0 {
                    return Err(HospitalError::invalid_input("responsible nurse id must be positive"));
                }
                if !stay.contains(&surgery.window) {
                    return Err(HospitalError::invalid_input(
                        "surgery must take place within the hospitalization stay",
                    ));
                }
            }
        }
        Ok(())
    }
}

fn validate_nurse_assignments(nurses: &[NurseAssignment]) -> Result<()> {
    let mut seen = HashSet::new();
    for nurse in nurses {
        if nurse.nurse_id <= 0 {
            return Err(HospitalError::invalid_input(format!("invalid nurse id {}", nurse.nurse_id)));
        }
        if nurse.role.trim().is_empty() {
            return Err(HospitalError::invalid_input(format!(
                "nurse {} has an empty role",
                nurse.nurse_id
            )));
        }
        if !seen.insert(nurse.nurse_id) {
            return Err(HospitalError::invalid_input(format!(
                "nurse {} assigned more than once",
                nurse.nurse_id
            )));
        }
    }
    Ok(())
}

/// 排期结果，包含本次新建的全部标识
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BookingReceipt {
    pub kind: BookingKind,
    pub booking_id: i64,
    pub bill_id: BillId,
    pub hospitalization_id: Option<HospitalizationId>,
    pub patient_id: PrincipalId,
    pub doctor_id: PrincipalId,
    pub start: DateTime<Utc>,
}

/// 付款请求
#[derive(Debug, Clone)]
pub struct PaymentRequest {
    pub bill_id: BillId,
    pub amount: i64,
    pub method: String,
    pub payer_id: PrincipalId,
}

impl PaymentRequest {
    pub fn validate(&self) -> Result<()> {
        if self.amount <= 0 {
            return Err(HospitalError::invalid_input("payment amount must be a positive integer"));
        }
        if self.method.trim().is_empty() {
            return Err(HospitalError::invalid_input("payment method is required"));
        }
        Ok(())
    }
}

// ========== 处方 ==========

/// 处方关联的就诊事件类型
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Appointment,
    Hospitalization,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SideEffect {
    pub occurrence: String,
    pub description: String,
    pub severity: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MedicineDosage {
    pub name: String,
    pub posology_dose: u32,
    pub posology_frequency: u32,
    #[serde(default)]
    pub side_effects: Vec<SideEffect>,
}

/// 新处方
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPrescription {
    #[serde(rename = "type")]
    pub event_kind: EventKind,
    pub event_id: i64,
    pub validity: NaiveDate,
    pub medicines: Vec<MedicineDosage>,
}

impl NewPrescription {
    pub fn validate(&self) -> Result<()> {
        if self.medicines.is_empty() {
            return Err(HospitalError::invalid_input("a prescription needs at least one medicine"));
        }
        for medicine in &self.medicines {
            if medicine.name.trim().is_empty() {
                return Err(HospitalError::invalid_input("medicine name is required"));
            }
            if medicine.posology_dose == 0 || medicine.posology_frequency == 0 {
                return Err(HospitalError::invalid_input(format!(
                    "invalid posology for medicine {}",
                    medicine.name
                )));
            }
            for effect in &medicine.side_effects {
                if effect.occurrence.trim().is_empty()
                    || effect.description.trim().is_empty()
                    || effect.severity.trim().is_empty()
                {
                    return Err(HospitalError::invalid_input(format!(
                        "incomplete side effect for medicine {}",
                        medicine.name
                    )));
                }
            }
        }
        Ok(())
    }
}

/// 已保存的处方
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prescription {
    pub id: PrescriptionId,
    pub event_kind: EventKind,
    pub event_id: i64,
    pub patient_id: PrincipalId,
    pub validity: NaiveDate,
    pub medicines: Vec<MedicineDosage>,
}

// ========== 注册与登录 ==========

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatientProfile {
    pub cc: PrincipalId,
    pub name: String,
    pub health_number: i64,
    pub emergency_contact: i64,
    pub birthday: NaiveDate,
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmployeeProfile {
    pub name: String,
    pub email: String,
    pub contract_id: i64,
    pub salary: i64,
    pub contract_issue_date: NaiveDate,
    pub contract_due_date: NaiveDate,
    pub birthday: NaiveDate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NurseProfile {
    #[serde(flatten)]
    pub employee: EmployeeProfile,
    #[serde(default)]
    pub superior_email: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DoctorProfile {
    #[serde(flatten)]
    pub employee: EmployeeProfile,
    pub license_id: String,
    pub license_issue_date: NaiveDate,
    pub license_due_date: NaiveDate,
    #[serde(default)]
    pub license_company: Option<String>,
    pub specialty_name: String,
}

/// 各角色的注册资料
#[derive(Debug, Clone)]
pub enum Profile {
    Patient(PatientProfile),
    Assistant(EmployeeProfile),
    Nurse(NurseProfile),
    Doctor(DoctorProfile),
}

impl Profile {
    pub fn role(&self) -> Role {
        match self {
            Profile::Patient(_) => Role::Patient,
            Profile::Assistant(_) => Role::Assistant,
            Profile::Nurse(_) => Role::Nurse,
            Profile::Doctor(_) => Role::Doctor,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Profile::Patient(p) => &p.name,
            Profile::Assistant(e) => &e.name,
            Profile::Nurse(n) => &n.employee.name,
            Profile::Doctor(d) => &d.employee.name,
        }
    }

    pub fn email(&self) -> &str {
        match self {
            Profile::Patient(p) => &p.email,
            Profile::Assistant(e) => &e.email,
            Profile::Nurse(n) => &n.employee.email,
            Profile::Doctor(d) => &d.employee.email,
        }
    }

    fn employee(&self) -> Option<&EmployeeProfile> {
        match self {
            Profile::Patient(_) => None,
            Profile::Assistant(e) => Some(e),
            Profile::Nurse(n) => Some(&n.employee),
            Profile::Doctor(d) => Some(&d.employee),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.name().trim().is_empty() {
            return Err(HospitalError::invalid_input("name is required"));
        }
        if !self.email().contains('@') {
            return Err(HospitalError::invalid_input(format!("invalid email {}", self.email())));
        }
        if let Profile::Patient(patient) = self {
            if patient.cc <= 0 {
                return Err(HospitalError::invalid_input("cc must be a positive number"));
            }
        }
        if let Some(employee) = self.employee() {
            if employee.salary < 0 {
                return Err(HospitalError::invalid_input("salary cannot be negative"));
            }
            if employee.contract_due_date < employee.contract_issue_date {
                return Err(HospitalError::invalid_input("contract due date precedes issue date"));
            }
        }
        if let Profile::Doctor(doctor) = self {
            if doctor.license_due_date < doctor.license_issue_date {
                return Err(HospitalError::invalid_input("license due date precedes issue date"));
            }
            if doctor.specialty_name.trim().is_empty() {
                return Err(HospitalError::invalid_input("specialty_name is required"));
            }
        }
        Ok(())
    }
}

/// 注册请求（密码已哈希）
#[derive(Debug, Clone)]
pub struct Registration {
    pub profile: Profile,
    pub password_hash: String,
}

/// 登录名：数字视为患者cc，其余视为员工邮箱
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginName {
    Patient(PrincipalId),
    Employee(String),
}

impl LoginName {
    pub fn parse(username: &str) -> Result<Self> {
        let username = username.trim();
        if username.is_empty() {
            return Err(HospitalError::invalid_input("username is required"));
        }
        match username.parse::<PrincipalId>() {
            Ok(cc) => Ok(LoginName::Patient(cc)),
            Err(_) => Ok(LoginName::Employee(username.to_lowercase())),
        }
    }
}

/// 凭证存储中保存的登录信息
#[derive(Debug, Clone)]
pub struct StoredCredential {
    pub principal: Principal,
    pub password_hash: String,
}

// ========== 查询结果 ==========

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppointmentSummary {
    pub id: AppointmentId,
    pub doctor_id: PrincipalId,
    pub start_time: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DailySummary {
    pub amount_spent: i64,
    pub surgeries: i64,
    pub prescriptions: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MonthlyReportEntry {
    pub month: String,
    pub doctor_name: String,
    pub surgeries: i64,
}

/// 月度付款排行取前几名患者
pub const TOP_PAYING_PATIENTS: usize = 3;

/// 患者名下的一次门诊或手术
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProcedureSummary {
    #[serde(rename = "type")]
    pub kind: BookingKind,
    pub id: i64,
    pub start_time: DateTime<Utc>,
    pub doctor_id: PrincipalId,
    pub nurses: Vec<PrincipalId>,
}

/// 当月付款最多的患者及其全部诊疗
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TopPayingPatient {
    pub patient_id: PrincipalId,
    pub patient_name: String,
    pub total_amount: i64,
    pub procedures: Vec<ProcedureSummary>,
}
