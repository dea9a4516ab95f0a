//! 通用工具函数

use crate::{IntakeError, PatientDetails, Result};

/// 校验字符串去除首尾空白后非空
pub fn require_non_empty(value: &str, field: &str) -> Result<()> {
    if value.trim().is_empty() {
        Err(IntakeError::Validation(format!("{} 不能为空", field)))
    } else {
        Ok(())
    }
}

/// 校验入队必填的患者信息（姓名、电话、邮箱；出生日期可选）
pub fn validate_patient_details(details: &PatientDetails) -> Result<()> {
    require_non_empty(&details.name, "patient name")?;
    require_non_empty(&details.phone, "patient phone")?;
    require_non_empty(&details.email, "patient email")?;
    Ok(())
}
