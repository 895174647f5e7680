//! 处方与统计报表

use async_trait::async_trait;
use chrono::NaiveDate;
use hospital_core::{
    BookingKind, DailySummary, EventKind, HospitalError, HospitalizationId, MonthlyReportEntry,
    NewPrescription, Prescription, PrescriptionId, Principal, PrincipalId, ProcedureSummary, RecordStore,
    Result, TimeWindow, TopPayingPatient, TOP_PAYING_PATIENTS,
};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::directory::StaffDirectory;
use crate::ledger::BillingLedger;
use crate::pools::ResourcePools;

/// 进程内的临床记录
#[derive(Debug)]
pub struct ClinicalRecords {
    pools: Arc<ResourcePools>,
    ledger: Arc<BillingLedger>,
    directory: Arc<StaffDirectory>,
    prescriptions: RwLock<BTreeMap<PrescriptionId, Prescription>>,
    next_id: AtomicI64,
}

impl ClinicalRecords {
    pub fn new(pools: Arc<ResourcePools>, ledger: Arc<BillingLedger>, directory: Arc<StaffDirectory>) -> Self {
        Self {
            pools,
            ledger,
            directory,
            prescriptions: RwLock::new(BTreeMap::new()),
            next_id: AtomicI64::new(1),
        }
    }

    /// 处方所属事件对应的患者
    async fn event_patient(&self, kind: EventKind, event_id: i64) -> Result<PrincipalId> {
        let pools = self.pools.acquire_exclusive().await;
        let patient = match kind {
            EventKind::Appointment => pools.appointments.get(event_id).map(|a| a.patient_id),
            EventKind::Hospitalization => pools.surgeries.hospitalization(event_id).map(|h| h.patient_id),
        };
        patient.ok_or_else(|| HospitalError::not_found(format!("Invalid event_id {}", event_id)))
    }
}

#[async_trait]
impl RecordStore for ClinicalRecords {
    async fn add_prescription(&self, prescription: NewPrescription) -> Result<PrescriptionId> {
        prescription.validate()?;
        let patient_id = self.event_patient(prescription.event_kind, prescription.event_id).await?;

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.prescriptions.write().await.insert(
            id,
            Prescription {
                id,
                event_kind: prescription.event_kind,
                event_id: prescription.event_id,
                patient_id,
                validity: prescription.validity,
                medicines: prescription.medicines,
            },
        );

        info!("Prescription {} added for patient {}", id, patient_id);
        Ok(id)
    }

    async fn prescriptions_for(&self, patient_id: PrincipalId, today: NaiveDate) -> Result<Vec<Prescription>> {
        let prescriptions = self.prescriptions.read().await;
        Ok(prescriptions
            .values()
            .filter(|p| p.patient_id == patient_id && p.validity >= today)
            .cloned()
            .collect())
    }

    async fn daily_summary(&self, date: NaiveDate) -> Result<DailySummary> {
        let (stays, surgeries) = {
            let pools = self.pools.acquire_exclusive().await;
            let stays: Vec<(HospitalizationId, i64)> = pools
                .surgeries
                .hospitalizations()
                .filter(|h| h.stay.start.date_naive() == date)
                .map(|h| (h.id, h.bill_id))
                .collect();
            let ids: HashSet<HospitalizationId> = stays.iter().map(|(id, _)| *id).collect();
            let surgeries = pools
                .surgeries
                .surgeries()
                .filter(|s| ids.contains(&s.hospitalization_id))
                .count() as i64;
            (stays, surgeries)
        };

        let mut amount_spent = 0;
        for (_, bill_id) in &stays {
            amount_spent += self.ledger.amount_paid(*bill_id).await;
        }

        let ids: HashSet<HospitalizationId> = stays.iter().map(|(id, _)| *id).collect();
        let prescriptions = self
            .prescriptions
            .read()
            .await
            .values()
            .filter(|p| p.event_kind == EventKind::Hospitalization && ids.contains(&p.event_id))
            .count() as i64;

        debug!("Daily summary for {}: {} hospitalizations", date, stays.len());
        Ok(DailySummary {
            amount_spent,
            surgeries,
            prescriptions,
        })
    }

    async fn monthly_report(&self) -> Result<Vec<MonthlyReportEntry>> {
        let mut counts: BTreeMap<String, BTreeMap<PrincipalId, i64>> = BTreeMap::new();
        {
            let pools = self.pools.acquire_exclusive().await;
            for surgery in pools.surgeries.surgeries() {
                let month = surgery.window.start.format("%Y-%m").to_string();
                *counts.entry(month).or_default().entry(surgery.doctor_id).or_insert(0) += 1;
            }
        }

        let mut report = Vec::with_capacity(counts.len());
        for (month, doctors) in counts {
            let Some(max) = doctors.values().copied().max() else {
                continue;
            };
            let mut names = Vec::new();
            for (doctor_id, count) in &doctors {
                if *count == max {
                    let name = self
                        .directory
                        .name_of(Principal::Doctor { id: *doctor_id })
                        .await
                        .unwrap_or_else(|| format!("doctor {}", doctor_id));
                    names.push(name);
                }
            }
            names.sort();
            report.push(MonthlyReportEntry {
                month,
                doctor_name: names.join(", "),
                surgeries: max,
            });
        }
        Ok(report)
    }

    async fn top_paying_patients(&self, month_of: NaiveDate) -> Result<Vec<TopPayingPatient>> {
        let period = TimeWindow::month_of(month_of)?;
        let mut ranked: Vec<(PrincipalId, i64)> = self.ledger.paid_by_patient(&period).await.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        ranked.truncate(TOP_PAYING_PATIENTS);

        let mut procedures: HashMap<PrincipalId, Vec<ProcedureSummary>> = HashMap::new();
        {
            let pools = self.pools.acquire_exclusive().await;
            for (patient_id, _) in &ranked {
                let mut list: Vec<ProcedureSummary> = pools
                    .appointments
                    .for_patient(*patient_id)
                    .map(|a| ProcedureSummary {
                        kind: BookingKind::Appointment,
                        id: a.id,
                        start_time: a.window.start,
                        doctor_id: a.doctor_id,
                        nurses: a.nurses.iter().map(|n| n.nurse_id).collect(),
                    })
                    .chain(
                        pools
                            .surgeries
                            .surgeries()
                            .filter(|s| s.patient_id == *patient_id)
                            .map(|s| ProcedureSummary {
                                kind: BookingKind::Surgery,
                                id: s.id,
                                start_time: s.window.start,
                                doctor_id: s.doctor_id,
                                nurses: s.nurses.iter().map(|n| n.nurse_id).collect(),
                            }),
                    )
                    .collect();
                list.sort_by_key(|p| (p.start_time, p.id));
                procedures.insert(*patient_id, list);
            }
        }

        let mut top = Vec::with_capacity(ranked.len());
        for (patient_id, total_amount) in ranked {
            let patient_name = self
                .directory
                .name_of(Principal::Patient { cc: patient_id })
                .await
                .unwrap_or_else(|| format!("patient {}", patient_id));
            top.push(TopPayingPatient {
                patient_id,
                patient_name,
                total_amount,
                procedures: procedures.remove(&patient_id).unwrap_or_default(),
            });
        }

        debug!("Top paying patients for {}: {}", month_of.format("%Y-%m"), top.len());
        Ok(top)
    }
}
