//! HTTP处理器

use axum::{
    extract::{Path, State},
    response::{IntoResponse, Json},
};
use chrono::{DateTime, NaiveDate, Utc};
use hospital_core::{
    utils::{parse_id, parse_nurse_assignments},
    AppointmentRequest, AppointmentSummary, BookingRequest, DailySummary, DoctorProfile,
    EmployeeProfile, HospitalError, HospitalizationPlan, MonthlyReportEntry, NewPrescription,
    NurseProfile, PatientProfile, PaymentRequest, Prescription, PrescriptionId, PrincipalId, Profile,
    Registration, SurgeryRequest, TimeWindow, TopPayingPatient,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::gate::{AnyPrincipal, AssistantOnly, AssistantOrPatient, Gate, PatientOnly};
use crate::password::hash_password;
use crate::response::{ApiJson, ApiResponse, ApiResult};
use crate::state::AppState;

/// 健康检查处理器
pub async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "timestamp": Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION")
    }))
}

// ========== 注册 ==========

/// 注册请求：角色资料加明文密码
#[derive(Debug, Deserialize)]
pub struct RegistrationBody<P> {
    #[serde(flatten)]
    pub profile: P,
    pub password: String,
}

async fn register_profile(state: &AppState, profile: Profile, password: String) -> ApiResult<PrincipalId> {
    if password.is_empty() {
        return Err(HospitalError::invalid_input("password is required").into());
    }
    profile.validate()?;

    let password_hash = tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| HospitalError::Internal(format!("password hashing task failed: {}", e)))??;

    let id = state
        .credentials
        .register(Registration { profile, password_hash })
        .await?;
    Ok(ApiResponse(id))
}

pub async fn register_patient(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<RegistrationBody<PatientProfile>>,
) -> ApiResult<PrincipalId> {
    info!("POST /register/patient");
    debug!("Registering patient {}", body.profile.cc);
    register_profile(&state, Profile::Patient(body.profile), body.password).await
}

pub async fn register_assistant(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<RegistrationBody<EmployeeProfile>>,
) -> ApiResult<PrincipalId> {
    info!("POST /register/assistant");
    register_profile(&state, Profile::Assistant(body.profile), body.password).await
}

pub async fn register_nurse(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<RegistrationBody<NurseProfile>>,
) -> ApiResult<PrincipalId> {
    info!("POST /register/nurse");
    register_profile(&state, Profile::Nurse(body.profile), body.password).await
}

pub async fn register_doctor(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<RegistrationBody<DoctorProfile>>,
) -> ApiResult<PrincipalId> {
    info!("POST /register/doctor");
    register_profile(&state, Profile::Doctor(body.profile), body.password).await
}

// ========== 排期 ==========

#[derive(Debug, Deserialize)]
pub struct AppointmentBody {
    pub doctor_id: PrincipalId,
    pub appointment_time: DateTime<Utc>,
    #[serde(default)]
    pub nurses: Vec<Value>,
}

#[derive(Debug, Serialize)]
pub struct AppointmentCreated {
    pub appointment_id: i64,
    pub bill_id: i64,
}

/// 预约门诊：`POST /appointment`，仅患者本人
pub async fn schedule_appointment(
    gate: Gate<PatientOnly>,
    State(state): State<AppState>,
    ApiJson(body): ApiJson<AppointmentBody>,
) -> ApiResult<AppointmentCreated> {
    info!("POST /appointment");
    debug!("Appointment request by {}: doctor {} at {}", gate.session.principal, body.doctor_id, body.appointment_time);

    let request = BookingRequest::Appointment(AppointmentRequest {
        patient_id: gate.session.principal.id(),
        doctor_id: body.doctor_id,
        start: body.appointment_time,
        nurses: parse_nurse_assignments(&body.nurses)?,
    });

    let receipt = state.bookings.schedule(request).await?;
    Ok(ApiResponse(AppointmentCreated {
        appointment_id: receipt.booking_id,
        bill_id: receipt.bill_id,
    }))
}

/// 查看患者的预约：`GET /appointments/:patient_id`
pub async fn get_appointments(
    gate: Gate<AssistantOrPatient>,
    State(state): State<AppState>,
    Path(patient_id): Path<String>,
) -> ApiResult<Vec<AppointmentSummary>> {
    info!("GET /appointments/{}", patient_id);
    let patient_id = parse_id(&patient_id, "patient_id")?;
    gate.session.ensure_patient_self(patient_id)?;

    let appointments = state.bookings.appointments_for(patient_id).await?;
    Ok(ApiResponse(appointments))
}

#[derive(Debug, Deserialize)]
pub struct SurgeryBody {
    pub patient_id: PrincipalId,
    pub doctor: PrincipalId,
    pub nurses: Vec<Value>,
    pub surgery_start: DateTime<Utc>,
    pub surgery_end: DateTime<Utc>,
    #[serde(default)]
    pub hospitalization_entry_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub hospitalization_exit_time: Option<DateTime<Utc>>,
    #[serde(default, alias = "hospitalization_responsable_nurse")]
    pub hospitalization_responsible_nurse: Option<PrincipalId>,
}

#[derive(Debug, Serialize)]
pub struct SurgeryCreated {
    pub surgery_id: i64,
    pub hospitalization_id: Option<i64>,
    pub bill_id: i64,
    pub patient_id: PrincipalId,
    pub doctor_id: PrincipalId,
    pub date: DateTime<Utc>,
}

fn required<T>(value: Option<T>, field: &str) -> Result<T, HospitalError> {
    value.ok_or_else(|| HospitalError::invalid_input(format!("{} value not in payload", field)))
}

async fn book_surgery(state: &AppState, body: SurgeryBody, hospitalization_id: Option<i64>) -> ApiResult<SurgeryCreated> {
    let window = TimeWindow::new(body.surgery_start, body.surgery_end)?;
    let hospitalization = match hospitalization_id {
        Some(id) => HospitalizationPlan::Existing(id),
        None => HospitalizationPlan::New {
            stay: TimeWindow::new(
                required(body.hospitalization_entry_time, "hospitalization_entry_time")?,
                required(body.hospitalization_exit_time, "hospitalization_exit_time")?,
            )?,
            responsible_nurse: required(
                body.hospitalization_responsible_nurse,
                "hospitalization_responsible_nurse",
            )?,
        },
    };

    let request = BookingRequest::Surgery(SurgeryRequest {
        patient_id: body.patient_id,
        doctor_id: body.doctor,
        window,
        nurses: parse_nurse_assignments(&body.nurses)?,
        hospitalization,
    });

    let receipt = state.bookings.schedule(request).await?;
    Ok(ApiResponse(SurgeryCreated {
        surgery_id: receipt.booking_id,
        hospitalization_id: receipt.hospitalization_id,
        bill_id: receipt.bill_id,
        patient_id: receipt.patient_id,
        doctor_id: receipt.doctor_id,
        date: receipt.start,
    }))
}

/// 排期手术并新建住院：`POST /surgery`
pub async fn schedule_surgery(
    _gate: Gate<AssistantOnly>,
    State(state): State<AppState>,
    ApiJson(body): ApiJson<SurgeryBody>,
) -> ApiResult<SurgeryCreated> {
    info!("POST /surgery");
    debug!("Surgery request: patient {} doctor {}", body.patient_id, body.doctor);
    book_surgery(&state, body, None).await
}

/// 在已有住院中排期手术：`POST /surgery/:hospitalization_id`
pub async fn schedule_surgery_in_hospitalization(
    _gate: Gate<AssistantOnly>,
    State(state): State<AppState>,
    Path(hospitalization_id): Path<String>,
    ApiJson(body): ApiJson<SurgeryBody>,
) -> ApiResult<SurgeryCreated> {
    info!("POST /surgery/{}", hospitalization_id);
    let hospitalization_id = parse_id(&hospitalization_id, "hospitalization_id")?;
    book_surgery(&state, body, Some(hospitalization_id)).await
}

// ========== 付款 ==========

#[derive(Debug, Deserialize)]
pub struct PaymentBody {
    pub amount: i64,
    pub payment_method: String,
}

/// 支付账单：`POST /bills/:bill_id`，仅账单所属患者
pub async fn pay_bill(
    gate: Gate<PatientOnly>,
    State(state): State<AppState>,
    Path(bill_id): Path<String>,
    ApiJson(body): ApiJson<PaymentBody>,
) -> ApiResult<i64> {
    info!("POST /bills/{}", bill_id);
    let bill_id = parse_id(&bill_id, "bill_id")?;
    let payer_id = gate.session.principal.id();

    let bill = state
        .ledger
        .bill(bill_id)
        .await?
        .ok_or_else(|| HospitalError::not_found(format!("bill {} not found", bill_id)))?;
    if bill.patient_id != payer_id {
        warn!("Patient {} tried to pay bill {} of patient {}", payer_id, bill_id, bill.patient_id);
        return Err(HospitalError::unauthorized("only the owning patient may pay this bill").into());
    }

    let remaining = state
        .ledger
        .apply_payment(PaymentRequest {
            bill_id,
            amount: body.amount,
            method: body.payment_method,
            payer_id,
        })
        .await?;
    Ok(ApiResponse(remaining))
}

// ========== 处方与报表 ==========

/// 开具处方：`POST /prescription`
pub async fn add_prescription(
    _gate: Gate<AssistantOnly>,
    State(state): State<AppState>,
    ApiJson(body): ApiJson<NewPrescription>,
) -> ApiResult<PrescriptionId> {
    info!("POST /prescription");
    debug!("Prescription for {:?} {} with {} medicines", body.event_kind, body.event_id, body.medicines.len());
    let id = state.records.add_prescription(body).await?;
    Ok(ApiResponse(id))
}

/// 查看有效处方：`GET /prescriptions/:person_id`
pub async fn get_prescriptions(
    gate: Gate<AnyPrincipal>,
    State(state): State<AppState>,
    Path(person_id): Path<String>,
) -> ApiResult<Vec<Prescription>> {
    info!("GET /prescriptions/{}", person_id);
    let person_id = parse_id(&person_id, "person_id")?;
    gate.session.ensure_patient_self(person_id)?;

    let today = Utc::now().date_naive();
    let prescriptions = state.records.prescriptions_for(person_id, today).await?;
    Ok(ApiResponse(prescriptions))
}

/// 每日汇总：`GET /daily/:date`，日期格式 YYYY-MM-DD
pub async fn daily_summary(
    _gate: Gate<AssistantOnly>,
    State(state): State<AppState>,
    Path(date): Path<String>,
) -> ApiResult<DailySummary> {
    info!("GET /daily/{}", date);
    let date = NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d")
        .map_err(|_| HospitalError::invalid_input(format!("Invalid date {}, expected YYYY-MM-DD", date)))?;

    let summary = state.records.daily_summary(date).await?;
    Ok(ApiResponse(summary))
}

/// 月度手术报表：`GET /report`
pub async fn monthly_report(
    _gate: Gate<AssistantOnly>,
    State(state): State<AppState>,
) -> ApiResult<Vec<MonthlyReportEntry>> {
    info!("GET /report");
    let report = state.records.monthly_report().await?;
    Ok(ApiResponse(report))
}

/// 本月付款最多的三名患者及其诊疗：`GET /top3`
pub async fn top_paying_patients(
    _gate: Gate<AssistantOnly>,
    State(state): State<AppState>,
) -> ApiResult<Vec<TopPayingPatient>> {
    info!("GET /top3");
    let top = state.records.top_paying_patients(Utc::now().date_naive()).await?;
    Ok(ApiResponse(top))
}
