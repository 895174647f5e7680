//! 存储接口的 PostgreSQL 实现

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use hospital_core::{
    AppointmentSummary, Bill, BillId, BookingReceipt, BookingRequest, BookingStore, CredentialStore,
    DailySummary, LedgerStore, LoginName, MonthlyReportEntry, NewPrescription, PaymentRequest,
    Prescription, PrescriptionId, PrincipalId, RecordStore, Registration, Result, StoredCredential, TopPayingPatient,
};

use crate::connection::DatabasePool;
use crate::queries::HospitalQueries;

/// PostgreSQL 存储
#[derive(Debug, Clone)]
pub struct PgHospitalStore {
    pool: DatabasePool,
}

impl PgHospitalStore {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    fn queries(&self) -> HospitalQueries<'_> {
        HospitalQueries::new(&self.pool)
    }
}

#[async_trait]
impl CredentialStore for PgHospitalStore {
    async fn register(&self, registration: Registration) -> Result<PrincipalId> {
        registration.profile.validate()?;
        self.queries().register(&registration).await
    }

    async fn find_credential(&self, login: &LoginName) -> Result<Option<StoredCredential>> {
        self.queries().find_credential(login).await
    }
}

#[async_trait]
impl BookingStore for PgHospitalStore {
    async fn schedule(&self, request: BookingRequest) -> Result<BookingReceipt> {
        request.validate(Utc::now())?;
        match &request {
            BookingRequest::Appointment(appointment) => self.queries().schedule_appointment(appointment).await,
            BookingRequest::Surgery(surgery) => self.queries().schedule_surgery(surgery).await,
        }
    }

    async fn appointments_for(&self, patient_id: PrincipalId) -> Result<Vec<AppointmentSummary>> {
        self.queries().appointments_for(patient_id).await
    }
}

#[async_trait]
impl LedgerStore for PgHospitalStore {
    async fn bill(&self, bill_id: BillId) -> Result<Option<Bill>> {
        self.queries().bill(bill_id).await
    }

    async fn apply_payment(&self, payment: PaymentRequest) -> Result<i64> {
        payment.validate()?;
        self.queries().apply_payment(&payment).await
    }
}

#[async_trait]
impl RecordStore for PgHospitalStore {
    async fn add_prescription(&self, prescription: NewPrescription) -> Result<PrescriptionId> {
        prescription.validate()?;
        self.queries().add_prescription(&prescription).await
    }

    async fn prescriptions_for(&self, patient_id: PrincipalId, today: NaiveDate) -> Result<Vec<Prescription>> {
        self.queries().prescriptions_for(patient_id, today).await
    }

    async fn daily_summary(&self, date: NaiveDate) -> Result<DailySummary> {
        self.queries().daily_summary(date).await
    }

    async fn monthly_report(&self) -> Result<Vec<MonthlyReportEntry>> {
        self.queries().monthly_report().await
    }

    async fn top_paying_patients(&self, month_of: NaiveDate) -> Result<Vec<TopPayingPatient>> {
        self.queries().top_paying_patients(month_of).await
    }
}
