//! 数据库查询操作
//!
//! 领域错误由存储过程以自定义 SQLSTATE 抛出：
//! `HC409` 资源冲突、`HC404` 未找到、`HC400` 输入无效。

use chrono::NaiveDate;
use hospital_core::{
    AppointmentRequest, AppointmentSummary, Bill, BillId, BookingKind, BookingReceipt, DailySummary,
    EventKind, HospitalError, HospitalizationPlan, LoginName, MedicineDosage, MonthlyReportEntry,
    NewPrescription, NurseAssignment, PaymentRequest, Prescription, PrescriptionId, Principal,
    PrincipalId, ProcedureSummary, Profile, Registration, Result, Role, StoredCredential, SurgeryRequest,
    TimeWindow, TopPayingPatient, TOP_PAYING_PATIENTS,
};
use tracing::{debug, info};

use crate::connection::DatabasePool;
use crate::models::*;

/// 将 sqlx 错误映射为领域错误
pub fn map_db_error(error: sqlx::Error) -> HospitalError {
    match &error {
        sqlx::Error::Database(db) => classify_sqlstate(db.code().as_deref(), db.message()),
        sqlx::Error::RowNotFound => HospitalError::not_found("record not found"),
        _ => HospitalError::Database(error.to_string()),
    }
}

fn classify_sqlstate(code: Option<&str>, message: &str) -> HospitalError {
    match code {
        Some("HC409") => HospitalError::ResourceConflict(message.to_string()),
        Some("HC404") => HospitalError::NotFound(message.to_string()),
        Some("HC400") | Some("23505") => HospitalError::InvalidInput(message.to_string()),
        Some("23503") => HospitalError::NotFound(message.to_string()),
        _ => HospitalError::Database(message.to_string()),
    }
}

/// 护士分配拆成两个并列数组，对应存储过程的 `nurse_ids`、`nurse_roles`
fn nurse_arrays(nurses: &[NurseAssignment]) -> (Vec<i64>, Vec<String>) {
    nurses.iter().map(|n| (n.nurse_id, n.role.clone())).unzip()
}

/// 药品副作用拆成三个并列数组
fn side_effect_arrays(medicine: &MedicineDosage) -> (Vec<String>, Vec<String>, Vec<String>) {
    let mut occurrences = Vec::with_capacity(medicine.side_effects.len());
    let mut descriptions = Vec::with_capacity(medicine.side_effects.len());
    let mut severities = Vec::with_capacity(medicine.side_effects.len());
    for effect in &medicine.side_effects {
        occurrences.push(effect.occurrence.clone());
        descriptions.push(effect.description.clone());
        severities.push(effect.severity.clone());
    }
    (occurrences, descriptions, severities)
}

/// 剂量与频次以 INTEGER 存储
fn posology_arg(value: u32, field: &str) -> Result<i32> {
    i32::try_from(value).map_err(|_| HospitalError::invalid_input(format!("{} {} is out of range", field, value)))
}

fn event_kind_name(kind: EventKind) -> &'static str {
    match kind {
        EventKind::Appointment => "appointment",
        EventKind::Hospitalization => "hospitalization",
    }
}

/// 按处方合并逐药品的查询行，输入需按处方ID排序
fn group_prescription_rows(rows: Vec<DbPrescriptionRow>) -> Vec<Prescription> {
    let mut prescriptions: Vec<Prescription> = Vec::new();
    for row in rows {
        let medicine = MedicineDosage {
            name: row.medicine,
            posology_dose: row.dose.max(0) as u32,
            posology_frequency: row.frequency.max(0) as u32,
            side_effects: Vec::new(),
        };
        match prescriptions.last_mut() {
            Some(last) if last.id == row.id => last.medicines.push(medicine),
            _ => prescriptions.push(Prescription {
                id: row.id,
                event_kind: if row.event_type == "appointment" {
                    EventKind::Appointment
                } else {
                    EventKind::Hospitalization
                },
                event_id: row.event_id,
                patient_id: row.patient_cc,
                validity: row.validity,
                medicines: vec![medicine],
            }),
        }
    }
    prescriptions
}

/// 同月并列第一的医生合并为一条，姓名以 `, ` 连接
fn fold_report_rows(rows: Vec<DbReportRow>) -> Vec<MonthlyReportEntry> {
    let mut report: Vec<MonthlyReportEntry> = Vec::new();
    for row in rows {
        match report.last_mut() {
            Some(last) if last.month == row.month => {
                last.doctor_name.push_str(", ");
                last.doctor_name.push_str(&row.doctor_name);
            }
            _ => report.push(MonthlyReportEntry {
                month: row.month,
                doctor_name: row.doctor_name,
                surgeries: row.surgeries,
            }),
        }
    }
    report
}

/// 合并付款排行的逐行结果，输入按患者、诊疗排序
fn fold_top_patient_rows(rows: Vec<DbTopPatientRow>) -> Vec<TopPayingPatient> {
    let mut top: Vec<TopPayingPatient> = Vec::new();
    for row in rows {
        if top.last().map(|p| p.patient_id) != Some(row.patient_id) {
            top.push(TopPayingPatient {
                patient_id: row.patient_id,
                patient_name: row.patient_name,
                total_amount: row.total_amount,
                procedures: Vec::new(),
            });
        }
        let Some(patient) = top.last_mut() else {
            continue;
        };

        let (Some(kind), Some(id), Some(start_time), Some(doctor_id)) =
            (row.procedure_type, row.procedure_id, row.start_time, row.doctor_id)
        else {
            continue;
        };
        let kind = if kind == "surgery" {
            BookingKind::Surgery
        } else {
            BookingKind::Appointment
        };

        let same = matches!(patient.procedures.last(), Some(last) if last.kind == kind && last.id == id);
        if !same {
            patient.procedures.push(ProcedureSummary {
                kind,
                id,
                start_time,
                doctor_id,
                nurses: Vec::new(),
            });
        }
        if let (Some(nurse_id), Some(procedure)) = (row.nurse_id, patient.procedures.last_mut()) {
            procedure.nurses.push(nurse_id);
        }
    }
    top
}

/// 数据库查询操作接口
pub struct HospitalQueries<'a> {
    pool: &'a DatabasePool,
}

impl<'a> HospitalQueries<'a> {
    pub fn new(pool: &'a DatabasePool) -> Self {
        Self { pool }
    }

    // ========== 注册与登录 ==========

    /// 调用对应角色的注册过程
    pub async fn register(&self, registration: &Registration) -> Result<PrincipalId> {
        let pool = self.pool.pool();
        let hash = &registration.password_hash;

        let id = match &registration.profile {
            Profile::Patient(p) => {
                sqlx::query_scalar::<_, i64>("SELECT add_patient($1, $2, $3, $4, $5, $6, $7)")
                    .bind(p.cc)
                    .bind(&p.name)
                    .bind(hash)
                    .bind(p.health_number)
                    .bind(p.emergency_contact)
                    .bind(p.birthday)
                    .bind(p.email.to_lowercase())
                    .fetch_one(pool)
                    .await
            }
            Profile::Assistant(e) => {
                sqlx::query_scalar::<_, i64>("SELECT add_assistant($1, $2, $3, $4, $5, $6, $7, $8)")
                    .bind(&e.name)
                    .bind(hash)
                    .bind(e.email.to_lowercase())
                    .bind(e.contract_id)
                    .bind(e.salary)
                    .bind(e.contract_issue_date)
                    .bind(e.contract_due_date)
                    .bind(e.birthday)
                    .fetch_one(pool)
                    .await
            }
            Profile::Nurse(n) => {
                let e = &n.employee;
                sqlx::query_scalar::<_, i64>("SELECT add_nurse($1, $2, $3, $4, $5, $6, $7, $8, $9)")
                    .bind(&e.name)
                    .bind(hash)
                    .bind(e.email.to_lowercase())
                    .bind(e.contract_id)
                    .bind(e.salary)
                    .bind(e.contract_issue_date)
                    .bind(e.contract_due_date)
                    .bind(e.birthday)
                    .bind(n.superior_email.as_ref().map(|s| s.to_lowercase()))
                    .fetch_one(pool)
                    .await
            }
            Profile::Doctor(d) => {
                let e = &d.employee;
                sqlx::query_scalar::<_, i64>(
                    "SELECT add_doctor($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)",
                )
                .bind(&e.name)
                .bind(hash)
                .bind(e.email.to_lowercase())
                .bind(e.contract_id)
                .bind(e.salary)
                .bind(e.contract_issue_date)
                .bind(e.contract_due_date)
                .bind(e.birthday)
                .bind(&d.license_id)
                .bind(d.license_issue_date)
                .bind(d.license_due_date)
                .bind(&d.license_company)
                .bind(&d.specialty_name)
                .fetch_one(pool)
                .await
            }
        }
        .map_err(map_db_error)?;

        info!("Registered {} {}", registration.profile.role(), id);
        Ok(id)
    }

    /// 数字登录名查患者表，其余通过 `login_employee` 查员工
    pub async fn find_credential(&self, login: &LoginName) -> Result<Option<StoredCredential>> {
        let pool = self.pool.pool();

        match login {
            LoginName::Patient(cc) => {
                let hash = sqlx::query_scalar::<_, String>("SELECT hashcode FROM patient WHERE cc = $1")
                    .bind(cc)
                    .fetch_optional(pool)
                    .await
                    .map_err(map_db_error)?;
                Ok(hash.map(|password_hash| StoredCredential {
                    principal: Principal::Patient { cc: *cc },
                    password_hash,
                }))
            }
            LoginName::Employee(email) => {
                let row = sqlx::query_as::<_, DbEmployeeLogin>(
                    "SELECT emp_num, user_type, hashcode FROM login_employee($1)",
                )
                .bind(email)
                .fetch_optional(pool)
                .await
                .map_err(map_db_error)?;

                match row {
                    Some(row) => {
                        let role: Role = row
                            .user_type
                            .parse()
                            .map_err(|_| HospitalError::Database(format!("unknown user type {}", row.user_type)))?;
                        if !role.is_staff() {
                            return Ok(None);
                        }
                        Ok(Some(StoredCredential {
                            principal: Principal::new(role, row.emp_num),
                            password_hash: row.hashcode,
                        }))
                    }
                    None => Ok(None),
                }
            }
        }
    }

    // ========== 排期 ==========

    /// 锁定两张排期表后调用 `schedule_appointment`
    pub async fn schedule_appointment(&self, request: &AppointmentRequest) -> Result<BookingReceipt> {
        let (nurse_ids, nurse_roles) = nurse_arrays(&request.nurses);

        let mut tx = self.pool.pool().begin().await.map_err(map_db_error)?;
        lock_booking_tables(&mut tx).await?;

        let row = sqlx::query_as::<_, DbScheduledAppointment>(
            "SELECT appointment_id, bill_id FROM schedule_appointment($1, $2, $3, $4, $5)",
        )
        .bind(request.start)
        .bind(request.doctor_id)
        .bind(request.patient_id)
        .bind(&nurse_ids)
        .bind(&nurse_roles)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_db_error)?;

        tx.commit().await.map_err(map_db_error)?;

        info!("Appointment {} booked for patient {}", row.appointment_id, request.patient_id);
        Ok(BookingReceipt {
            kind: BookingKind::Appointment,
            booking_id: row.appointment_id,
            bill_id: row.bill_id,
            hospitalization_id: None,
            patient_id: request.patient_id,
            doctor_id: request.doctor_id,
            start: request.start,
        })
    }

    /// 锁定两张排期表后调用 `schedule_surgery`
    pub async fn schedule_surgery(&self, request: &SurgeryRequest) -> Result<BookingReceipt> {
        let (nurse_ids, nurse_roles) = nurse_arrays(&request.nurses);
        let (hospitalization_id, entry, exit, responsible_nurse) = match &request.hospitalization {
            HospitalizationPlan::Existing(id) => (Some(*id), None, None, None),
            HospitalizationPlan::New { stay, responsible_nurse } => {
                (None, Some(stay.start), Some(stay.end), Some(*responsible_nurse))
            }
        };

        let mut tx = self.pool.pool().begin().await.map_err(map_db_error)?;
        lock_booking_tables(&mut tx).await?;

        let row = sqlx::query_as::<_, DbScheduledSurgery>(
            "SELECT surgery_id, hospitalization_id, bill_id \
             FROM schedule_surgery($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(request.patient_id)
        .bind(request.doctor_id)
        .bind(&nurse_ids)
        .bind(&nurse_roles)
        .bind(request.window.start)
        .bind(request.window.end)
        .bind(hospitalization_id)
        .bind(entry)
        .bind(exit)
        .bind(responsible_nurse)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_db_error)?;

        tx.commit().await.map_err(map_db_error)?;

        info!(
            "Surgery {} booked for patient {} (hospitalization {})",
            row.surgery_id, request.patient_id, row.hospitalization_id
        );
        Ok(BookingReceipt {
            kind: BookingKind::Surgery,
            booking_id: row.surgery_id,
            bill_id: row.bill_id,
            hospitalization_id: Some(row.hospitalization_id),
            patient_id: request.patient_id,
            doctor_id: request.doctor_id,
            start: request.window.start,
        })
    }

    pub async fn appointments_for(&self, patient_id: PrincipalId) -> Result<Vec<AppointmentSummary>> {
        let rows = sqlx::query_as::<_, DbAppointment>(
            "SELECT id, doctor_emp_num AS doctor_id, start_time \
             FROM appointment WHERE patient_cc = $1 ORDER BY start_time, id",
        )
        .bind(patient_id)
        .fetch_all(self.pool.pool())
        .await
        .map_err(map_db_error)?;

        Ok(rows.into_iter().map(AppointmentSummary::from).collect())
    }

    // ========== 账单 ==========

    pub async fn bill(&self, bill_id: BillId) -> Result<Option<Bill>> {
        let row = sqlx::query_as::<_, DbBill>(
            "SELECT b.id, b.patient_cc, b.total, COALESCE(SUM(p.amount), 0)::BIGINT AS paid \
             FROM bill AS b LEFT JOIN payment AS p ON p.bill_id = b.id \
             WHERE b.id = $1 GROUP BY b.id",
        )
        .bind(bill_id)
        .fetch_optional(self.pool.pool())
        .await
        .map_err(map_db_error)?;

        Ok(row.map(Bill::from))
    }

    /// 行锁定账单后调用 `execute_payment`，返回剩余金额
    pub async fn apply_payment(&self, payment: &PaymentRequest) -> Result<i64> {
        let mut tx = self.pool.pool().begin().await.map_err(map_db_error)?;

        let locked = sqlx::query_scalar::<_, i64>("SELECT id FROM bill WHERE id = $1 FOR UPDATE")
            .bind(payment.bill_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(map_db_error)?;
        if locked.is_none() {
            return Err(HospitalError::not_found(format!("bill {} not found", payment.bill_id)));
        }

        let remaining = sqlx::query_scalar::<_, i64>("SELECT execute_payment($1, $2, $3, $4)")
            .bind(payment.bill_id)
            .bind(payment.amount)
            .bind(&payment.method)
            .bind(payment.payer_id)
            .fetch_one(&mut *tx)
            .await
            .map_err(map_db_error)?;

        tx.commit().await.map_err(map_db_error)?;

        info!("Payment of {} applied to bill {}, remaining {}", payment.amount, payment.bill_id, remaining);
        Ok(remaining)
    }

    // ========== 处方与报表 ==========

    pub async fn add_prescription(&self, prescription: &NewPrescription) -> Result<PrescriptionId> {
        let mut tx = self.pool.pool().begin().await.map_err(map_db_error)?;

        let id = sqlx::query_scalar::<_, i64>("SELECT add_prescription($1, $2, $3)")
            .bind(event_kind_name(prescription.event_kind))
            .bind(prescription.validity)
            .bind(prescription.event_id)
            .fetch_one(&mut *tx)
            .await
            .map_err(map_db_error)?;
        if id < 0 {
            return Err(HospitalError::not_found(format!("Invalid event_id {}", prescription.event_id)));
        }

        for medicine in &prescription.medicines {
            let dose = posology_arg(medicine.posology_dose, "posology_dose")?;
            let frequency = posology_arg(medicine.posology_frequency, "posology_frequency")?;
            let (occurrences, descriptions, severities) = side_effect_arrays(medicine);
            sqlx::query("CALL add_medicine_with_side_effects($1, $2, $3, $4, $5, $6, $7)")
                .bind(&medicine.name)
                .bind(dose)
                .bind(frequency)
                .bind(id)
                .bind(&occurrences)
                .bind(&descriptions)
                .bind(&severities)
                .execute(&mut *tx)
                .await
                .map_err(map_db_error)?;
        }

        tx.commit().await.map_err(map_db_error)?;
        info!("Prescription {} added with {} medicines", id, prescription.medicines.len());
        Ok(id)
    }

    pub async fn prescriptions_for(&self, patient_id: PrincipalId, today: NaiveDate) -> Result<Vec<Prescription>> {
        let rows = sqlx::query_as::<_, DbPrescriptionRow>(
            r#"
            SELECT p.id, p.validity,
                   CASE WHEN ap.id IS NOT NULL THEN 'appointment' ELSE 'hospitalization' END AS event_type,
                   COALESCE(ap.appointment_id, hp.hospitalization_id) AS event_id,
                   COALESCE(ap.patient_cc, hp.patient_cc) AS patient_cc,
                   md.quantity AS dose, md.frequency, md.medicine_name AS medicine
            FROM prescription AS p
            JOIN medicine_dosage AS md ON md.prescription_id = p.id
            LEFT JOIN appt_prescriptions AS ap ON ap.id = p.id
            LEFT JOIN hosp_prescriptions AS hp ON hp.id = p.id
            WHERE (ap.patient_cc = $1 OR hp.patient_cc = $1)
              AND p.validity >= $2
            ORDER BY p.id
            "#,
        )
        .bind(patient_id)
        .bind(today)
        .fetch_all(self.pool.pool())
        .await
        .map_err(map_db_error)?;

        debug!("Fetched {} prescription rows for {}", rows.len(), patient_id);
        Ok(group_prescription_rows(rows))
    }

    pub async fn daily_summary(&self, date: NaiveDate) -> Result<DailySummary> {
        let row = sqlx::query_as::<_, DbDailySummary>(
            r#"
            SELECT
                COALESCE(SUM(hms.total_amount_spent), 0)::BIGINT AS amount_spent,
                COALESCE(SUM(hc.surgery_count), 0)::BIGINT AS surgeries,
                COALESCE(SUM(hc.prescription_count), 0)::BIGINT AS prescriptions
            FROM hospitalization AS h
            LEFT JOIN hospitalization_counts AS hc ON h.id = hc.id
            LEFT JOIN hospitalization_money_spent AS hms ON h.id = hms.id
            WHERE h.entry_time::date = $1
            "#,
        )
        .bind(date)
        .fetch_one(self.pool.pool())
        .await
        .map_err(map_db_error)?;

        Ok(row.into())
    }

    pub async fn monthly_report(&self) -> Result<Vec<MonthlyReportEntry>> {
        let mut tx = self.pool.pool().begin().await.map_err(map_db_error)?;
        sqlx::query("LOCK TABLE surgery IN SHARE MODE")
            .execute(&mut *tx)
            .await
            .map_err(map_db_error)?;

        let rows = sqlx::query_as::<_, DbReportRow>(
            r#"
            SELECT dms.surgery_month::TEXT AS month, e.name AS doctor_name, dms.surgery_count::BIGINT AS surgeries
            FROM doctor_monthly_surgeries AS dms
            JOIN max_monthly_surgery_count AS month_maxs
                ON dms.surgery_month = month_maxs.surgery_month
                AND dms.surgery_count = month_maxs.max_surgery_count
            JOIN employee AS e ON dms.doctor_email = e.email
            ORDER BY dms.surgery_month, e.name
            "#,
        )
        .fetch_all(&mut *tx)
        .await
        .map_err(map_db_error)?;

        tx.commit().await.map_err(map_db_error)?;
        Ok(fold_report_rows(rows))
    }

    pub async fn top_paying_patients(&self, month_of: NaiveDate) -> Result<Vec<TopPayingPatient>> {
        let period = TimeWindow::month_of(month_of)?;
        let rows = sqlx::query_as::<_, DbTopPatientRow>(
            r#"
            WITH monthly AS (
                SELECT b.patient_cc AS patient_id, SUM(pay.amount)::BIGINT AS total_amount
                FROM payment AS pay
                JOIN bill AS b ON b.id = pay.bill_id
                WHERE pay.date_time >= $1 AND pay.date_time < $2
                GROUP BY b.patient_cc
                ORDER BY total_amount DESC, b.patient_cc
                LIMIT $3
            ),
            procedures AS (
                SELECT 'appointment' AS procedure_type, a.id AS procedure_id, a.patient_cc,
                       a.start_time, a.doctor_emp_num AS doctor_id, ar.nurse_emp_num AS nurse_id
                FROM appointment AS a
                LEFT JOIN appointment_role AS ar ON ar.appointment_id = a.id
                UNION ALL
                SELECT 'surgery', s.id, h.patient_cc, s.start_time, s.doctor_emp_num, sr.nurse_emp_num
                FROM surgery AS s
                JOIN hospitalization AS h ON h.id = s.hospitalization_id
                LEFT JOIN surgery_role AS sr ON sr.surgery_id = s.id
            )
            SELECT m.patient_id, pt.name AS patient_name, m.total_amount,
                   pr.procedure_type, pr.procedure_id, pr.start_time, pr.doctor_id, pr.nurse_id
            FROM monthly AS m
            JOIN patient AS pt ON pt.cc = m.patient_id
            LEFT JOIN procedures AS pr ON pr.patient_cc = m.patient_id
            ORDER BY m.total_amount DESC, m.patient_id, pr.start_time, pr.procedure_id, pr.procedure_type, pr.nurse_id
            "#,
        )
        .bind(period.start)
        .bind(period.end)
        .bind(TOP_PAYING_PATIENTS as i64)
        .fetch_all(self.pool.pool())
        .await
        .map_err(map_db_error)?;

        debug!("Fetched {} top-patient rows for {}", rows.len(), month_of.format("%Y-%m"));
        Ok(fold_top_patient_rows(rows))
    }
}

/// 固定顺序：先预约表、后手术表
async fn lock_booking_tables(tx: &mut sqlx::Transaction<'static, sqlx::Postgres>) -> Result<()> {
    for statement in [
        "LOCK TABLE appointment IN EXCLUSIVE MODE",
        "LOCK TABLE surgery IN EXCLUSIVE MODE",
    ] {
        sqlx::query(statement)
            .execute(&mut **tx)
            .await
            .map_err(map_db_error)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use hospital_core::{ErrorKind, SideEffect};

    #[test]
    fn test_sqlstate_mapping() {
        assert_eq!(classify_sqlstate(Some("HC409"), "busy").kind(), ErrorKind::ResourceConflict);
        assert_eq!(classify_sqlstate(Some("HC404"), "gone").kind(), ErrorKind::NotFound);
        assert_eq!(classify_sqlstate(Some("HC400"), "bad").kind(), ErrorKind::InvalidInput);
        assert_eq!(classify_sqlstate(Some("23505"), "dup").kind(), ErrorKind::InvalidInput);
        assert_eq!(classify_sqlstate(Some("23503"), "fk").kind(), ErrorKind::NotFound);
        assert_eq!(classify_sqlstate(Some("40001"), "retry").kind(), ErrorKind::InternalError);
        assert_eq!(classify_sqlstate(None, "?").kind(), ErrorKind::InternalError);

        let err = classify_sqlstate(Some("HC409"), "doctor 3 is busy");
        assert!(err.to_string().contains("doctor 3 is busy"));
    }

    #[test]
    fn test_non_database_errors() {
        assert_eq!(map_db_error(sqlx::Error::RowNotFound).kind(), ErrorKind::NotFound);
        assert_eq!(map_db_error(sqlx::Error::PoolTimedOut).kind(), ErrorKind::InternalError);
    }

    #[test]
    fn test_argument_arrays() {
        let nurses = vec![
            NurseAssignment { nurse_id: 4, role: "scrub".to_string() },
            NurseAssignment { nurse_id: 9, role: "anesthesia".to_string() },
        ];
        let (ids, roles) = nurse_arrays(&nurses);
        assert_eq!(ids, vec![4, 9]);
        assert_eq!(roles, vec!["scrub", "anesthesia"]);

        let medicine = MedicineDosage {
            name: "morphine".to_string(),
            posology_dose: 5,
            posology_frequency: 4,
            side_effects: vec![SideEffect {
                occurrence: "common".to_string(),
                description: "drowsiness".to_string(),
                severity: "moderate".to_string(),
            }],
        };
        let (occurrences, descriptions, severities) = side_effect_arrays(&medicine);
        assert_eq!(occurrences, vec!["common"]);
        assert_eq!(descriptions, vec!["drowsiness"]);
        assert_eq!(severities, vec!["moderate"]);
    }

    #[test]
    fn test_group_prescription_rows() {
        let validity = NaiveDate::from_ymd_opt(2099, 1, 1).unwrap();
        let row = |id: i64, medicine: &str| DbPrescriptionRow {
            id,
            validity,
            event_type: "hospitalization".to_string(),
            event_id: 3,
            patient_cc: 77,
            dose: 1,
            frequency: 2,
            medicine: medicine.to_string(),
        };

        let grouped = group_prescription_rows(vec![row(1, "a"), row(1, "b"), row(2, "c")]);
        assert_eq!(grouped.len(), 2);
        assert_eq!(grouped[0].medicines.len(), 2);
        assert_eq!(grouped[0].event_kind, EventKind::Hospitalization);
        assert_eq!(grouped[1].medicines[0].name, "c");
    }

    #[test]
    fn test_fold_report_rows() {
        let row = |month: &str, name: &str, surgeries: i64| DbReportRow {
            month: month.to_string(),
            doctor_name: name.to_string(),
            surgeries,
        };
        let report = fold_report_rows(vec![
            row("2099-01", "Burke", 3),
            row("2099-01", "Grey", 3),
            row("2099-02", "Shepherd", 5),
        ]);
        assert_eq!(report.len(), 2);
        assert_eq!(report[0].doctor_name, "Burke, Grey");
        assert_eq!(report[1].surgeries, 5);
    }

    #[test]
    fn test_posology_out_of_range() {
        assert_eq!(posology_arg(500, "posology_dose").unwrap(), 500);
        let err = posology_arg(u32::MAX, "posology_dose").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[test]
    fn test_fold_top_patient_rows() {
        use chrono::{TimeZone, Utc};

        let start = Utc.with_ymd_and_hms(2099, 1, 5, 9, 0, 0).unwrap();
        let row = |patient_id: i64, total: i64, procedure: Option<(&str, i64)>, nurse_id: Option<i64>| DbTopPatientRow {
            patient_id,
            patient_name: format!("Patient {}", patient_id),
            total_amount: total,
            procedure_type: procedure.map(|(kind, _)| kind.to_string()),
            procedure_id: procedure.map(|(_, id)| id),
            start_time: procedure.map(|_| start),
            doctor_id: procedure.map(|_| 7),
            nurse_id,
        };

        let top = fold_top_patient_rows(vec![
            row(1, 300, Some(("appointment", 4)), None),
            row(1, 300, Some(("surgery", 4)), Some(11)),
            row(1, 300, Some(("surgery", 4)), Some(12)),
            row(2, 100, None, None),
        ]);
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].procedures.len(), 2);
        assert_eq!(top[0].procedures[0].kind, BookingKind::Appointment);
        assert!(top[0].procedures[0].nurses.is_empty());
        assert_eq!(top[0].procedures[1].nurses, vec![11, 12]);
        assert_eq!(top[1].total_amount, 100);
        assert!(top[1].procedures.is_empty());
    }
}
