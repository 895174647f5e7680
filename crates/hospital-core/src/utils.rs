//! 通用工具函数

use serde_json::Value;

use crate::error::{HospitalError, Result};
use crate::models::{NurseAssignment, PrincipalId};

/// 解析请求中的护士分配列表，每项形如 `[nurse_id, "role"]`
pub fn parse_nurse_assignments(values: &[Value]) -> Result<Vec<NurseAssignment>> {
    values
        .iter()
        .map(|value| {
            let pair = value
                .as_array()
                .filter(|pair| pair.len() == 2)
                .ok_or_else(|| HospitalError::invalid_input("Invalid nurse information"))?;

            let nurse_id = pair[0]
                .as_i64()
                .or_else(|| pair[0].as_str().and_then(|s| s.trim().parse().ok()))
                .ok_or_else(|| HospitalError::invalid_input("Invalid nurse id"))?;

            let role = pair[1]
                .as_str()
                .ok_or_else(|| HospitalError::invalid_input("Invalid nurse role"))?;

            Ok(NurseAssignment {
                nurse_id,
                role: role.to_string(),
            })
        })
        .collect()
}

/// 解析路径中的数字标识
pub fn parse_id(raw: &str, field: &str) -> Result<PrincipalId> {
    raw.trim()
        .parse::<PrincipalId>()
        .map_err(|_| HospitalError::invalid_input(format!("Invalid {}", field)))
}
