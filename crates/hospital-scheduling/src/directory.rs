//! 人员目录
//!
//! 保存患者与员工的注册资料和密码哈希。患者以 cc 为键，
//! 员工共用一个递增的员工号序列。

use async_trait::async_trait;
use hospital_core::{
    CredentialStore, HospitalError, LoginName, Principal, PrincipalId, Profile, Registration,
    Result, Role, StoredCredential,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use tokio::sync::RwLock;
use tracing::{debug, info};

#[derive(Debug, Clone)]
struct DirectoryEntry {
    profile: Profile,
    password_hash: String,
}

#[derive(Debug, Default)]
struct DirectoryInner {
    entries: HashMap<Principal, DirectoryEntry>,
    by_email: HashMap<String, Principal>,
}

/// 进程内的人员目录
#[derive(Debug)]
pub struct StaffDirectory {
    inner: RwLock<DirectoryInner>,
    next_employee: AtomicI64,
}

impl StaffDirectory {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(DirectoryInner::default()),
            next_employee: AtomicI64::new(1),
        }
    }

    /// 主体是否存在且角色一致
    pub async fn exists(&self, principal: Principal) -> bool {
        self.inner.read().await.entries.contains_key(&principal)
    }

    /// 主体的姓名
    pub async fn name_of(&self, principal: Principal) -> Option<String> {
        self.inner
            .read()
            .await
            .entries
            .get(&principal)
            .map(|entry| entry.profile.name().to_string())
    }
}

impl Default for StaffDirectory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CredentialStore for StaffDirectory {
    async fn register(&self, registration: Registration) -> Result<PrincipalId> {
        let profile = registration.profile;
        profile.validate()?;

        let email = profile.email().trim().to_lowercase();
        let mut inner = self.inner.write().await;

        if inner.by_email.contains_key(&email) {
            return Err(HospitalError::invalid_input(format!("email {} is already registered", email)));
        }

        if let Profile::Nurse(nurse) = &profile {
            if let Some(superior) = &nurse.superior_email {
                let superior = superior.trim().to_lowercase();
                match inner.by_email.get(&superior) {
                    Some(principal) if principal.role() == Role::Nurse => {}
                    _ => {
                        return Err(HospitalError::not_found(format!(
                            "superior nurse {} not found",
                            superior
                        )))
                    }
                }
            }
        }

        let principal = match &profile {
            Profile::Patient(patient) => {
                let principal = Principal::Patient { cc: patient.cc };
                if inner.entries.contains_key(&principal) {
                    return Err(HospitalError::invalid_input(format!(
                        "patient {} is already registered",
                        patient.cc
                    )));
                }
                principal
            }
            other => Principal::new(other.role(), self.next_employee.fetch_add(1, Ordering::SeqCst)),
        };

        inner.by_email.insert(email, principal);
        inner.entries.insert(
            principal,
            DirectoryEntry {
                profile,
                password_hash: registration.password_hash,
            },
        );

        info!("Registered {}", principal);
        Ok(principal.id())
    }

    async fn find_credential(&self, login: &LoginName) -> Result<Option<StoredCredential>> {
        let inner = self.inner.read().await;
        let principal = match login {
            LoginName::Patient(cc) => Some(Principal::Patient { cc: *cc }),
            LoginName::Employee(email) => inner
                .by_email
                .get(email)
                .copied()
                .filter(|principal| principal.role().is_staff()),
        };

        let credential = principal.and_then(|principal| {
            inner.entries.get(&principal).map(|entry| StoredCredential {
                principal,
                password_hash: entry.password_hash.clone(),
            })
        });
        debug!("Credential lookup for {:?}: found={}", login, credential.is_some());
        Ok(credential)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::NaiveDate;
    use hospital_core::{DoctorProfile, EmployeeProfile, NurseProfile, PatientProfile};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    pub(crate) fn employee(name: &str, email: &str) -> EmployeeProfile {
        EmployeeProfile {
            name: name.to_string(),
            email: email.to_string(),
            contract_id: 1,
            salary: 1000,
            contract_issue_date: date(2020, 1, 1),
            contract_due_date: date(2030, 1, 1),
            birthday: date(1980, 5, 5),
        }
    }

    pub(crate) fn patient(cc: i64) -> Registration {
        Registration {
            profile: Profile::Patient(PatientProfile {
                cc,
                name: format!("Patient {}", cc),
                health_number: cc * 10,
                emergency_contact: 912345678,
                birthday: date(1990, 1, 1),
                email: format!("patient{}@mail.pt", cc),
            }),
            password_hash: "hash".to_string(),
        }
    }

    pub(crate) fn doctor(name: &str, email: &str) -> Registration {
        Registration {
            profile: Profile::Doctor(DoctorProfile {
                employee: employee(name, email),
                license_id: "L-1".to_string(),
                license_issue_date: date(2015, 1, 1),
                license_due_date: date(2035, 1, 1),
                license_company: None,
                specialty_name: "surgery".to_string(),
            }),
            password_hash: "hash".to_string(),
        }
    }

    pub(crate) fn nurse(name: &str, email: &str) -> Registration {
        Registration {
            profile: Profile::Nurse(NurseProfile {
                employee: employee(name, email),
                superior_email: None,
            }),
            password_hash: "hash".to_string(),
        }
    }

    #[tokio::test]
    async fn test_register_and_lookup() {
        let directory = StaffDirectory::new();
        let cc = directory.register(patient(123)).await.unwrap();
        assert_eq!(cc, 123);

        let doctor_id = directory.register(doctor("House", "House@Hospital.pt")).await.unwrap();
        let nurse_id = directory.register(nurse("Joy", "joy@hospital.pt")).await.unwrap();
        assert_ne!(doctor_id, nurse_id);

        let found = directory
            .find_credential(&LoginName::parse("house@hospital.pt").unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.principal, Principal::Doctor { id: doctor_id });

        let found = directory.find_credential(&LoginName::Patient(123)).await.unwrap().unwrap();
        assert_eq!(found.principal.role(), Role::Patient);

        assert!(directory.exists(Principal::Nurse { id: nurse_id }).await);
        assert!(directory.exists(Principal::Doctor { id: doctor_id }).await);
        assert!(!directory.exists(Principal::Nurse { id: doctor_id }).await);
    }

    #[tokio::test]
    async fn test_patient_email_is_not_an_employee_login() {
        let directory = StaffDirectory::new();
        directory.register(patient(5)).await.unwrap();
        let login = LoginName::Employee("patient5@mail.pt".to_string());
        assert!(directory.find_credential(&login).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicates_are_rejected() {
        let directory = StaffDirectory::new();
        directory.register(patient(7)).await.unwrap();
        let err = directory.register(patient(7)).await.unwrap_err();
        assert_eq!(err.kind(), hospital_core::ErrorKind::InvalidInput);

        directory.register(doctor("A", "a@h.pt")).await.unwrap();
        let err = directory.register(nurse("B", "A@h.pt")).await.unwrap_err();
        assert_eq!(err.kind(), hospital_core::ErrorKind::InvalidInput);
    }

    #[tokio::test]
    async fn test_unknown_superior_is_rejected() {
        let directory = StaffDirectory::new();
        let mut registration = nurse("Junior", "junior@h.pt");
        if let Profile::Nurse(profile) = &mut registration.profile {
            profile.superior_email = Some("chief@h.pt".to_string());
        }
        let err = directory.register(registration).await.unwrap_err();
        assert_eq!(err.kind(), hospital_core::ErrorKind::NotFound);
    }
}
