//! Web服务器

use axum::{
    routing::{get, post, put},
    Router,
};
use hospital_core::Result;
use std::net::SocketAddr;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};

use crate::auth::login_handler;
use crate::handlers::*;
use crate::state::AppState;

pub struct WebServer {
    addr: SocketAddr,
    app: Router,
}

impl WebServer {
    pub fn new(addr: SocketAddr, state: AppState) -> Self {
        let app = Self::create_app(state);
        Self { addr, app }
    }

    pub fn create_app(state: AppState) -> Router {
        Router::new()
            // 健康检查
            .route("/health", get(health))
            // 注册与登录（无需token）
            .route("/register/patient", post(register_patient))
            .route("/register/assistant", post(register_assistant))
            .route("/register/nurse", post(register_nurse))
            .route("/register/doctor", post(register_doctor))
            .route("/user", put(login_handler))
            // 排期
            .route("/appointment", post(schedule_appointment))
            .route("/appointments/:patient_id", get(get_appointments))
            .route("/surgery", post(schedule_surgery))
            .route("/surgery/:hospitalization_id", post(schedule_surgery_in_hospitalization))
            // 付款
            .route("/bills/:bill_id", post(pay_bill))
            // 处方与报表
            .route("/prescription", post(add_prescription))
            .route("/prescriptions/:person_id", get(get_prescriptions))
            .route("/daily/:date", get(daily_summary))
            .route("/report", get(monthly_report))
            .route("/top3", get(top_paying_patients))
            .with_state(state)
            // 全局中间件
            .layer(
                ServiceBuilder::new()
                    .layer(TraceLayer::new_for_http())
                    .layer(
                        CorsLayer::new()
                            .allow_origin(Any)
                            .allow_methods(Any)
                            .allow_headers(Any),
                    ),
            )
    }

    /// 启动服务，收到 Ctrl-C 后停止接收新连接并等待处理中的请求完成
    pub async fn run(self) -> Result<()> {
        info!("Starting web server on {}", self.addr);

        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        axum::serve(listener, self.app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        info!("Web server stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::TokenIssuer;
    use axum::{
        body::Body,
        http::{header, Method, Request, StatusCode},
    };
    use chrono::{Duration, TimeZone, Utc};
    use hospital_core::{BookingStore, CredentialStore, Principal, PrincipalId, Profile, Registration};
    use hospital_scheduling::{MemoryHospital, SchedulingPolicy};
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tower::ServiceExt;

    const SECRET: &str = "router-secret-router-secret-router!!";

    struct TestApp {
        app: Router,
        hospital: MemoryHospital,
        tokens: Arc<TokenIssuer>,
    }

    fn test_app() -> TestApp {
        let hospital = MemoryHospital::new(SchedulingPolicy::default());
        let tokens = Arc::new(TokenIssuer::new(SECRET, 900));
        let state = AppState {
            credentials: hospital.directory.clone(),
            bookings: hospital.scheduler.clone(),
            ledger: hospital.ledger.clone(),
            records: hospital.records.clone(),
            tokens: tokens.clone(),
        };
        TestApp {
            app: WebServer::create_app(state),
            hospital,
            tokens,
        }
    }

    impl TestApp {
        fn token(&self, principal: Principal) -> String {
            self.tokens.issue(principal).unwrap()
        }

        async fn send(&self, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
            let mut builder = Request::builder().method(method).uri(uri);
            if let Some(token) = token {
                builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
            }
            let body = match body {
                Some(value) => {
                    builder = builder.header(header::CONTENT_TYPE, "application/json");
                    Body::from(value.to_string())
                }
                None => Body::empty(),
            };

            let response = self.app.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
            let status = response.status();
            let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
            (status, serde_json::from_slice(&bytes).unwrap())
        }

        /// 直接写入目录，跳过密码哈希
        async fn seed(&self, profile: Profile) -> PrincipalId {
            self.hospital
                .directory
                .register(Registration {
                    profile,
                    password_hash: "unused".to_string(),
                })
                .await
                .unwrap()
        }
    }

    fn date(y: i32, m: u32, d: u32) -> chrono::NaiveDate {
        chrono::NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn employee(name: &str, email: &str) -> hospital_core::EmployeeProfile {
        hospital_core::EmployeeProfile {
            name: name.to_string(),
            email: email.to_string(),
            contract_id: 1,
            salary: 2000,
            contract_issue_date: date(2020, 1, 1),
            contract_due_date: date(2030, 1, 1),
            birthday: date(1985, 1, 1),
        }
    }

    fn patient_profile(cc: i64) -> Profile {
        Profile::Patient(hospital_core::PatientProfile {
            cc,
            name: format!("Patient {}", cc),
            health_number: cc,
            emergency_contact: 910000000,
            birthday: date(1990, 2, 2),
            email: format!("p{}@mail.pt", cc),
        })
    }

    fn doctor_profile(name: &str, email: &str) -> Profile {
        Profile::Doctor(hospital_core::DoctorProfile {
            employee: employee(name, email),
            license_id: "LIC".to_string(),
            license_issue_date: date(2010, 1, 1),
            license_due_date: date(2040, 1, 1),
            license_company: None,
            specialty_name: "cardiology".to_string(),
        })
    }

    fn nurse_profile(name: &str, email: &str) -> Profile {
        Profile::Nurse(hospital_core::NurseProfile {
            employee: employee(name, email),
            superior_email: None,
        })
    }

    fn future(hour: u32) -> String {
        Utc.with_ymd_and_hms(2099, 7, 1, hour, 0, 0).unwrap().to_rfc3339()
    }

    #[tokio::test]
    async fn test_health() {
        let app = test_app();
        let (status, body) = app.send(Method::GET, "/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
    }

    #[tokio::test]
    async fn test_register_then_login() {
        let app = test_app();
        let (status, body) = app
            .send(
                Method::POST,
                "/register/patient",
                None,
                Some(json!({
                    "cc": 4242, "name": "Ana", "password": "s3cret",
                    "health_number": 1, "emergency_contact": 2,
                    "birthday": "1990-01-01", "email": "ana@mail.pt"
                })),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{}", body);
        assert_eq!(body["results"], 4242);

        let (status, body) = app
            .send(Method::PUT, "/user", None, Some(json!({"username": 4242, "password": "s3cret"})))
            .await;
        assert_eq!(status, StatusCode::OK);
        let token = body["results"].as_str().unwrap();
        assert_eq!(app.tokens.verify(token).unwrap(), Principal::Patient { cc: 4242 });

        let (status, body) = app
            .send(Method::PUT, "/user", None, Some(json!({"username": "4242", "password": "nope"})))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["kind"], "Unauthorized");

        let (_, unknown) = app
            .send(Method::PUT, "/user", None, Some(json!({"username": "ghost@h.pt", "password": "nope"})))
            .await;
        assert_eq!(unknown["errors"], body["errors"]);
    }

    #[tokio::test]
    async fn test_appointment_requires_credentials() {
        let app = test_app();
        let doctor = app.seed(doctor_profile("House", "house@h.pt")).await;

        let (status, body) = app
            .send(
                Method::POST,
                "/appointment",
                None,
                Some(json!({"doctor_id": doctor, "appointment_time": future(9)})),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["kind"], "MissingCredential");
        assert!(app.hospital.scheduler.appointments_for(1).await.unwrap().is_empty());

        let (_, body) = app.send(Method::POST, "/appointment", None, Some(json!("not an object"))).await;
        assert_eq!(body["kind"], "MissingCredential");
    }

    #[tokio::test]
    async fn test_expired_token_is_rejected_before_scheduling() {
        let app = test_app();
        let doctor = app.seed(doctor_profile("House", "house@h.pt")).await;
        let cc = app.seed(patient_profile(11)).await;

        let stale = app
            .tokens
            .issue_at(Principal::Patient { cc }, Utc::now() - Duration::hours(2))
            .unwrap();
        let (_, body) = app
            .send(
                Method::POST,
                "/appointment",
                Some(&stale),
                Some(json!({"doctor_id": doctor, "appointment_time": future(9)})),
            )
            .await;
        assert_eq!(body["kind"], "Expired");
        assert!(app.hospital.scheduler.appointments_for(cc).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_appointment_and_surgery_conflict() {
        let app = test_app();
        let doctor = app.seed(doctor_profile("Grey", "grey@h.pt")).await;
        let nurse = app.seed(nurse_profile("Joy", "joy@h.pt")).await;
        let assistant = app.seed(Profile::Assistant(employee("Pam", "pam@h.pt"))).await;
        let cc = app.seed(patient_profile(21)).await;

        let assistant_token = app.token(Principal::Assistant { id: assistant });
        let (status, surgery) = app
            .send(
                Method::POST,
                "/surgery",
                Some(&assistant_token),
                Some(json!({
                    "patient_id": cc, "doctor": doctor, "nurses": [[nurse, "scrub"]],
                    "surgery_start": future(9), "surgery_end": future(10),
                    "hospitalization_entry_time": future(8),
                    "hospitalization_exit_time": future(18),
                    "hospitalization_responsable_nurse": nurse
                })),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{}", surgery);
        assert!(surgery["results"]["hospitalization_id"].is_i64());

        let patient_token = app.token(Principal::Patient { cc });
        let (status, body) = app
            .send(
                Method::POST,
                "/appointment",
                Some(&patient_token),
                Some(json!({"doctor_id": doctor, "appointment_time": Utc.with_ymd_and_hms(2099, 7, 1, 9, 30, 0).unwrap().to_rfc3339()})),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["kind"], "ResourceConflict");

        let (status, body) = app
            .send(
                Method::POST,
                "/appointment",
                Some(&patient_token),
                Some(json!({"doctor_id": doctor, "appointment_time": future(10)})),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{}", body);

        let (_, list) = app
            .send(Method::GET, &format!("/appointments/{}", cc), Some(&patient_token), None)
            .await;
        assert_eq!(list["results"].as_array().unwrap().len(), 1);

        let (_, denied) = app.send(Method::POST, "/surgery", Some(&patient_token), Some(json!({}))).await;
        assert_eq!(denied["kind"], "Unauthorized");
    }

    #[tokio::test]
    async fn test_surgery_without_stay_fields_is_invalid() {
        let app = test_app();
        let doctor = app.seed(doctor_profile("Grey", "grey@h.pt")).await;
        let assistant = app.seed(Profile::Assistant(employee("Pam", "pam@h.pt"))).await;
        let cc = app.seed(patient_profile(22)).await;

        let token = app.token(Principal::Assistant { id: assistant });
        let (_, body) = app
            .send(
                Method::POST,
                "/surgery",
                Some(&token),
                Some(json!({
                    "patient_id": cc, "doctor": doctor, "nurses": [],
                    "surgery_start": future(9), "surgery_end": future(10)
                })),
            )
            .await;
        assert_eq!(body["kind"], "InvalidInput");

        let (_, body) = app
            .send(
                Method::POST,
                "/surgery/99",
                Some(&token),
                Some(json!({
                    "patient_id": cc, "doctor": doctor, "nurses": [],
                    "surgery_start": future(9), "surgery_end": future(10)
                })),
            )
            .await;
        assert_eq!(body["kind"], "NotFound");
    }

    #[tokio::test]
    async fn test_patient_cannot_read_other_records() {
        let app = test_app();
        let token = app.token(Principal::Patient { cc: 1 });

        let (status, body) = app.send(Method::GET, "/appointments/2", Some(&token), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["kind"], "Unauthorized");

        let (_, body) = app.send(Method::GET, "/prescriptions/2", Some(&token), None).await;
        assert_eq!(body["kind"], "Unauthorized");

        let (_, body) = app.send(Method::GET, "/appointments/abc", Some(&token), None).await;
        assert_eq!(body["kind"], "InvalidInput");
    }

    #[tokio::test]
    async fn test_bill_payments() {
        let app = test_app();
        let doctor = app.seed(doctor_profile("Grey", "grey@h.pt")).await;
        let nurse = app.seed(nurse_profile("Joy", "joy@h.pt")).await;
        let assistant = app.seed(Profile::Assistant(employee("Pam", "pam@h.pt"))).await;
        let cc = app.seed(patient_profile(31)).await;
        let other = app.seed(patient_profile(32)).await;

        let assistant_token = app.token(Principal::Assistant { id: assistant });
        let (_, surgery) = app
            .send(
                Method::POST,
                "/surgery",
                Some(&assistant_token),
                Some(json!({
                    "patient_id": cc, "doctor": doctor, "nurses": [],
                    "surgery_start": future(9), "surgery_end": future(10),
                    "hospitalization_entry_time": future(8),
                    "hospitalization_exit_time": future(18),
                    "hospitalization_responsible_nurse": nurse
                })),
            )
            .await;
        let bill_id = surgery["results"]["bill_id"].as_i64().unwrap();
        let uri = format!("/bills/{}", bill_id);

        let token = app.token(Principal::Patient { cc });
        let pay = |amount: i64| json!({"amount": amount, "payment_method": "card"});

        let (_, body) = app.send(Method::POST, &uri, Some(&token), Some(pay(200))).await;
        assert_eq!(body["results"], 300);
        let (_, body) = app.send(Method::POST, &uri, Some(&token), Some(pay(250))).await;
        assert_eq!(body["results"], 50);
        let (status, body) = app.send(Method::POST, &uri, Some(&token), Some(pay(100))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["kind"], "InvalidInput");

        let intruder = app.token(Principal::Patient { cc: other });
        let (_, body) = app.send(Method::POST, &uri, Some(&intruder), Some(pay(10))).await;
        assert_eq!(body["kind"], "Unauthorized");

        let (_, body) = app.send(Method::POST, "/bills/9999", Some(&token), Some(pay(10))).await;
        assert_eq!(body["kind"], "NotFound");

        let (_, body) = app.send(Method::POST, &uri, Some(&token), Some(json!({"amount": 10}))).await;
        assert_eq!(body["kind"], "InvalidInput");

        let (_, body) = app.send(Method::POST, &uri, Some(&token), Some(pay(50))).await;
        assert_eq!(body["results"], 0);
    }

    #[tokio::test]
    async fn test_prescriptions_and_reports() {
        let app = test_app();
        let doctor = app.seed(doctor_profile("Grey", "grey@h.pt")).await;
        let nurse = app.seed(nurse_profile("Joy", "joy@h.pt")).await;
        let assistant = app.seed(Profile::Assistant(employee("Pam", "pam@h.pt"))).await;
        let cc = app.seed(patient_profile(41)).await;

        let token = app.token(Principal::Assistant { id: assistant });
        let (_, surgery) = app
            .send(
                Method::POST,
                "/surgery",
                Some(&token),
                Some(json!({
                    "patient_id": cc, "doctor": doctor, "nurses": [],
                    "surgery_start": future(9), "surgery_end": future(10),
                    "hospitalization_entry_time": future(8),
                    "hospitalization_exit_time": future(18),
                    "hospitalization_responsible_nurse": nurse
                })),
            )
            .await;
        let hospitalization_id = surgery["results"]["hospitalization_id"].as_i64().unwrap();

        let (status, body) = app
            .send(
                Method::POST,
                "/prescription",
                Some(&token),
                Some(json!({
                    "type": "hospitalization", "event_id": hospitalization_id, "validity": "2099-12-31",
                    "medicines": [{"name": "aspirin", "posology_dose": 100, "posology_frequency": 1,
                                   "side_effects": [{"occurrence": "rare", "description": "bleeding", "severity": "high"}]}]
                })),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{}", body);

        let nurse_token = app.token(Principal::Nurse { id: nurse });
        let (_, list) = app
            .send(Method::GET, &format!("/prescriptions/{}", cc), Some(&nurse_token), None)
            .await;
        assert_eq!(list["results"].as_array().unwrap().len(), 1);

        let (_, daily) = app.send(Method::GET, "/daily/2099-07-01", Some(&token), None).await;
        assert_eq!(daily["results"]["surgeries"], 1);
        assert_eq!(daily["results"]["prescriptions"], 1);

        let (_, body) = app.send(Method::GET, "/daily/07-01-2099", Some(&token), None).await;
        assert_eq!(body["kind"], "InvalidInput");

        let (_, report) = app.send(Method::GET, "/report", Some(&token), None).await;
        assert_eq!(report["results"][0]["month"], "2099-07");
        assert_eq!(report["results"][0]["doctor_name"], "Grey");

        let bill_id = surgery["results"]["bill_id"].as_i64().unwrap();
        let patient_token = app.token(Principal::Patient { cc });
        app.send(
            Method::POST,
            &format!("/bills/{}", bill_id),
            Some(&patient_token),
            Some(json!({"amount": 120, "payment_method": "card"})),
        )
        .await;

        let (status, top) = app.send(Method::GET, "/top3", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK, "{}", top);
        assert_eq!(top["results"][0]["patient_id"], cc);
        assert_eq!(top["results"][0]["total_amount"], 120);
        assert_eq!(top["results"][0]["procedures"][0]["type"], "surgery");

        let (_, denied) = app.send(Method::GET, "/top3", Some(&patient_token), None).await;
        assert_eq!(denied["kind"], "Unauthorized");
    }
}
