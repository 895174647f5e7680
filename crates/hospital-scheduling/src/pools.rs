//! 预约池与手术池
//!
//! 两个池各自由一把 `tokio::sync::Mutex` 保护。凡是需要同时看到两个池的操作
//! 都必须经由 [`ResourcePools::acquire_exclusive`]，它固定先锁预约池、后锁手术池。

use hospital_core::{
    Appointment, AppointmentId, Hospitalization, HospitalizationId, PrincipalId, Surgery, SurgeryId,
};
use std::collections::BTreeMap;
use tokio::sync::{Mutex, MutexGuard};
use tracing::trace;

/// 门诊预约池
#[derive(Debug)]
pub struct AppointmentPool {
    appointments: BTreeMap<AppointmentId, Appointment>,
    next_id: AppointmentId,
}

impl AppointmentPool {
    fn new() -> Self {
        Self {
            appointments: BTreeMap::new(),
            next_id: 1,
        }
    }

    pub fn next_id(&mut self) -> AppointmentId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    pub fn insert(&mut self, appointment: Appointment) {
        self.appointments.insert(appointment.id, appointment);
    }

    pub fn get(&self, id: AppointmentId) -> Option<&Appointment> {
        self.appointments.get(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Appointment> {
        self.appointments.values()
    }

    pub fn for_patient(&self, patient_id: PrincipalId) -> impl Iterator<Item = &Appointment> {
        self.iter().filter(move |a| a.patient_id == patient_id)
    }

    pub fn len(&self) -> usize {
        self.appointments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.appointments.is_empty()
    }
}

/// 手术池，住院记录随手术一同维护
#[derive(Debug)]
pub struct SurgeryPool {
    surgeries: BTreeMap<SurgeryId, Surgery>,
    hospitalizations: BTreeMap<HospitalizationId, Hospitalization>,
    next_surgery_id: SurgeryId,
    next_hospitalization_id: HospitalizationId,
}

impl SurgeryPool {
    fn new() -> Self {
        Self {
            surgeries: BTreeMap::new(),
            hospitalizations: BTreeMap::new(),
            next_surgery_id: 1,
            next_hospitalization_id: 1,
        }
    }

    pub fn next_surgery_id(&mut self) -> SurgeryId {
        let id = self.next_surgery_id;
        self.next_surgery_id += 1;
        id
    }

    pub fn next_hospitalization_id(&mut self) -> HospitalizationId {
        let id = self.next_hospitalization_id;
        self.next_hospitalization_id += 1;
        id
    }

    pub fn insert_surgery(&mut self, surgery: Surgery) {
        self.surgeries.insert(surgery.id, surgery);
    }

    pub fn insert_hospitalization(&mut self, hospitalization: Hospitalization) {
        self.hospitalizations.insert(hospitalization.id, hospitalization);
    }

    pub fn hospitalization(&self, id: HospitalizationId) -> Option<&Hospitalization> {
        self.hospitalizations.get(&id)
    }

    pub fn surgeries(&self) -> impl Iterator<Item = &Surgery> {
        self.surgeries.values()
    }

    pub fn hospitalizations(&self) -> impl Iterator<Item = &Hospitalization> {
        self.hospitalizations.values()
    }

    pub fn len(&self) -> usize {
        self.surgeries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.surgeries.is_empty()
    }
}

/// 同时持有两个池的独占访问
pub struct PoolGuard<'a> {
    pub appointments: MutexGuard<'a, AppointmentPool>,
    pub surgeries: MutexGuard<'a, SurgeryPool>,
}

/// 共享的医护资源池
#[derive(Debug)]
pub struct ResourcePools {
    appointments: Mutex<AppointmentPool>,
    surgeries: Mutex<SurgeryPool>,
}

impl ResourcePools {
    pub fn new() -> Self {
        Self {
            appointments: Mutex::new(AppointmentPool::new()),
            surgeries: Mutex::new(SurgeryPool::new()),
        }
    }

    /// 按固定顺序（预约池 → 手术池）获取两个池的独占访问
    pub async fn acquire_exclusive(&self) -> PoolGuard<'_> {
        let appointments = self.appointments.lock().await;
        trace!("Appointment pool locked");
        let surgeries = self.surgeries.lock().await;
        trace!("Surgery pool locked");
        PoolGuard {
            appointments,
            surgeries,
        }
    }
}

impl Default for ResourcePools {
    fn default() -> Self {
        Self::new()
    }
}
