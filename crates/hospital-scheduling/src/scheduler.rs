//! 资源排期器
//!
//! 一次排期的完整流程：
//! 1. 与存储无关的输入校验
//! 2. 确认患者、医生、护士均已注册
//! 3. 按固定顺序独占两个资源池
//! 4. 冲突检测与住院记录校验
//! 5. 写入预约/手术，并开立或追加账单
//!
//! 第 5 步之前的任何失败都不会留下写入。

use async_trait::async_trait;
use chrono::Utc;
use hospital_core::{
    Appointment, AppointmentRequest, AppointmentSummary, BookingKind, BookingReceipt, BookingRequest,
    BookingStore, HospitalError, Hospitalization, HospitalizationPlan, Principal, PrincipalId, Result,
    Surgery, SurgeryRequest, TimeWindow,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::calendar::{find_conflict, staff_of};
use crate::directory::StaffDirectory;
use crate::ledger::BillingLedger;
use crate::pools::{PoolGuard, ResourcePools};

/// 排期时长与费用
#[derive(Debug, Clone, Copy)]
pub struct SchedulingPolicy {
    pub appointment_minutes: i64,
    pub appointment_fee: i64,
    pub surgery_fee: i64,
}

impl Default for SchedulingPolicy {
    fn default() -> Self {
        Self {
            appointment_minutes: 60,
            appointment_fee: 50,
            surgery_fee: 500,
        }
    }
}

/// 进程内的资源排期器
#[derive(Debug)]
pub struct ResourceScheduler {
    pools: Arc<ResourcePools>,
    ledger: Arc<BillingLedger>,
    directory: Arc<StaffDirectory>,
    policy: SchedulingPolicy,
}

impl ResourceScheduler {
    pub fn new(
        pools: Arc<ResourcePools>,
        ledger: Arc<BillingLedger>,
        directory: Arc<StaffDirectory>,
        policy: SchedulingPolicy,
    ) -> Self {
        Self {
            pools,
            ledger,
            directory,
            policy,
        }
    }

    /// 校验请求引用的人员都已注册
    async fn ensure_participants(&self, request: &BookingRequest) -> Result<()> {
        let patient = Principal::Patient { cc: request.patient_id() };
        if !self.directory.exists(patient).await {
            return Err(HospitalError::not_found(format!("patient {} not found", request.patient_id())));
        }

        let doctor = Principal::Doctor { id: request.doctor_id() };
        if !self.directory.exists(doctor).await {
            return Err(HospitalError::not_found(format!("doctor {} not found", request.doctor_id())));
        }

        for nurse in request.nurses() {
            if !self.directory.exists(Principal::Nurse { id: nurse.nurse_id }).await {
                return Err(HospitalError::not_found(format!("nurse {} not found", nurse.nurse_id)));
            }
        }

        if let BookingRequest::Surgery(SurgeryRequest {
            hospitalization: HospitalizationPlan::New { responsible_nurse, .. },
            ..
        }) = request
        {
            if !self.directory.exists(Principal::Nurse { id: *responsible_nurse }).await {
                return Err(HospitalError::not_found(format!(
                    "responsible nurse {} not found",
                    responsible_nurse
                )));
            }
        }
        Ok(())
    }

    fn check_availability(
        pools: &PoolGuard<'_>,
        staff: &[PrincipalId],
        window: &TimeWindow,
    ) -> Result<()> {
        if let Some(conflict) = find_conflict(pools, staff, window) {
            warn!("Scheduling conflict: {}", conflict);
            return Err(HospitalError::ResourceConflict(conflict.to_string()));
        }
        Ok(())
    }

    async fn book_appointment(&self, mut pools: PoolGuard<'_>, request: AppointmentRequest) -> Result<BookingReceipt> {
        let window = TimeWindow::starting_at(request.start, self.policy.appointment_minutes)?;
        Self::check_availability(&pools, &staff_of(request.doctor_id, &request.nurses), &window)?;

        let bill_id = self.ledger.open_bill(request.patient_id, self.policy.appointment_fee).await;
        let id = pools.appointments.next_id();
        pools.appointments.insert(Appointment {
            id,
            patient_id: request.patient_id,
            doctor_id: request.doctor_id,
            window,
            nurses: request.nurses,
            bill_id,
        });

        info!("Appointment {} booked for patient {} with doctor {}", id, request.patient_id, request.doctor_id);
        Ok(BookingReceipt {
            kind: BookingKind::Appointment,
            booking_id: id,
            bill_id,
            hospitalization_id: None,
            patient_id: request.patient_id,
            doctor_id: request.doctor_id,
            start: request.start,
        })
    }

    async fn book_surgery(&self, mut pools: PoolGuard<'_>, request: SurgeryRequest) -> Result<BookingReceipt> {
        Self::check_availability(&pools, &staff_of(request.doctor_id, &request.nurses), &request.window)?;

        let existing = match &request.hospitalization {
            HospitalizationPlan::Existing(id) => {
                let hospitalization = pools
                    .surgeries
                    .hospitalization(*id)
                    .ok_or_else(|| HospitalError::not_found(format!("hospitalization {} not found", id)))?;
                if hospitalization.patient_id != request.patient_id {
                    return Err(HospitalError::invalid_input(format!(
                        "hospitalization {} belongs to another patient",
                        id
                    )));
                }
                if !hospitalization.stay.contains(&request.window) {
                    return Err(HospitalError::invalid_input(format!(
                        "surgery must take place within hospitalization {}",
                        id
                    )));
                }
                Some((hospitalization.id, hospitalization.bill_id))
            }
            HospitalizationPlan::New { .. } => None,
        };

        let (hospitalization_id, bill_id) = match (existing, &request.hospitalization) {
            (Some((hospitalization_id, bill_id)), _) => {
                self.ledger.charge(bill_id, self.policy.surgery_fee).await?;
                (hospitalization_id, bill_id)
            }
            (None, HospitalizationPlan::New { stay, responsible_nurse }) => {
                let bill_id = self.ledger.open_bill(request.patient_id, self.policy.surgery_fee).await;
                let hospitalization_id = pools.surgeries.next_hospitalization_id();
                pools.surgeries.insert_hospitalization(Hospitalization {
                    id: hospitalization_id,
                    patient_id: request.patient_id,
                    stay: *stay,
                    responsible_nurse: *responsible_nurse,
                    bill_id,
                });
                debug!("Hospitalization {} opened with bill {}", hospitalization_id, bill_id);
                (hospitalization_id, bill_id)
            }
            (None, HospitalizationPlan::Existing(id)) => {
                return Err(HospitalError::not_found(format!("hospitalization {} not found", id)))
            }
        };

        let id = pools.surgeries.next_surgery_id();
        pools.surgeries.insert_surgery(Surgery {
            id,
            patient_id: request.patient_id,
            doctor_id: request.doctor_id,
            window: request.window,
            nurses: request.nurses,
            hospitalization_id,
        });

        info!(
            "Surgery {} booked for patient {} with doctor {} (hospitalization {})",
            id, request.patient_id, request.doctor_id, hospitalization_id
        );
        Ok(BookingReceipt {
            kind: BookingKind::Surgery,
            booking_id: id,
            bill_id,
            hospitalization_id: Some(hospitalization_id),
            patient_id: request.patient_id,
            doctor_id: request.doctor_id,
            start: request.window.start,
        })
    }
}

#[async_trait]
impl BookingStore for ResourceScheduler {
    async fn schedule(&self, request: BookingRequest) -> Result<BookingReceipt> {
        debug!("Scheduling {:?} for patient {} with doctor {}", request.kind(), request.patient_id(), request.doctor_id());
        request.validate(Utc::now())?;
        self.ensure_participants(&request).await?;

        let pools = self.pools.acquire_exclusive().await;
        match request {
            BookingRequest::Appointment(request) => self.book_appointment(pools, request).await,
            BookingRequest::Surgery(request) => self.book_surgery(pools, request).await,
        }
    }

    async fn appointments_for(&self, patient_id: PrincipalId) -> Result<Vec<AppointmentSummary>> {
        let pools = self.pools.acquire_exclusive().await;
        let mut appointments: Vec<AppointmentSummary> = pools
            .appointments
            .for_patient(patient_id)
            .map(|a| AppointmentSummary {
                id: a.id,
                doctor_id: a.doctor_id,
                start_time: a.window.start,
            })
            .collect();
        appointments.sort_by_key(|a| (a.start_time, a.id));
        Ok(appointments)
    }
}
