use std::time::Duration;

use serde::{Deserialize, Serialize};

use unitcache_core::manager::{CLOSE_TIME_LONG, CLOSE_TIME_SHORT};
use unitcache_core::types::{DataUnitInfo, DataUnitType, ExecutionInfo, ExecutionId};

// ─── Validation Constants ───────────────────────────────────────────────────

const VALID_PURPOSES: &[&str] = &["BROWSE", "DOWNLOAD"];

// ─── Validation Helpers ─────────────────────────────────────────────────────

pub fn validate_purpose(purpose: &str) -> Result<(), String> {
    if VALID_PURPOSES.contains(&purpose.to_uppercase().as_str()) {
        Ok(())
    } else {
        Err(format!(
            "Invalid purpose '{}'. Must be one of: {}",
            purpose,
            VALID_PURPOSES.join(", ")
        ))
    }
}

// ─── Request Types ──────────────────────────────────────────────────────────

fn default_data_unit_type() -> String {
    "RDF".to_string()
}

fn default_purpose() -> String {
    "BROWSE".to_string()
}

#[derive(Deserialize)]
pub struct AcquireLeaseRequest {
    pub execution_id: ExecutionId,
    pub dpu_instance_id: u64,
    pub data_unit_index: u32,
    pub data_unit_name: String,
    #[serde(default = "default_data_unit_type")]
    pub data_unit_type: String,
    #[serde(default = "default_purpose")]
    pub purpose: String,
}

impl AcquireLeaseRequest {
    pub fn validate(&self) -> Result<(), String> {
        if self.data_unit_name.is_empty() {
            return Err("data_unit_name is required".to_string());
        }
        self.data_unit_type.parse::<DataUnitType>()?;
        validate_purpose(&self.purpose)?;
        Ok(())
    }

    /// How long the data unit stays open: browsing is short, downloads long.
    pub fn time_to_close(&self) -> Duration {
        if self.purpose.eq_ignore_ascii_case("DOWNLOAD") {
            CLOSE_TIME_LONG
        } else {
            CLOSE_TIME_SHORT
        }
    }

    /// Execution context describing just the requested data unit.
    pub fn execution_info(&self) -> Result<ExecutionInfo, String> {
        let data_unit_type = self.data_unit_type.parse::<DataUnitType>()?;
        Ok(ExecutionInfo::new(self.execution_id).with_data_unit(
            self.dpu_instance_id,
            DataUnitInfo::new(self.data_unit_index, &self.data_unit_name, data_unit_type),
        ))
    }
}

// ─── Response Types ─────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(msg.into()),
        }
    }
}

#[derive(Serialize)]
pub struct LeaseResponse {
    pub lease_id: String,
    pub resource_key: String,
    pub execution_id: ExecutionId,
    pub data_unit: String,
    pub uri: String,
    pub expires_at: u64,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub active_leases: usize,
    pub version: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(purpose: &str, data_unit_type: &str) -> AcquireLeaseRequest {
        AcquireLeaseRequest {
            execution_id: 5,
            dpu_instance_id: 11,
            data_unit_index: 0,
            data_unit_name: "output".to_string(),
            data_unit_type: data_unit_type.to_string(),
            purpose: purpose.to_string(),
        }
    }

    #[test]
    fn test_validate_acquire_request() {
        assert!(request("browse", "rdf").validate().is_ok());
        assert!(request("DOWNLOAD", "FILES").validate().is_ok());
        assert!(request("export", "rdf").validate().is_err());
        assert!(request("browse", "graph").validate().is_err());

        let mut nameless = request("browse", "rdf");
        nameless.data_unit_name.clear();
        assert_eq!(
            nameless.validate(),
            Err("data_unit_name is required".to_string())
        );
    }

    #[test]
    fn test_purpose_selects_lifetime() {
        assert_eq!(request("browse", "rdf").time_to_close(), CLOSE_TIME_SHORT);
        assert_eq!(request("download", "rdf").time_to_close(), CLOSE_TIME_LONG);
    }

    #[test]
    fn test_execution_info_from_request() {
        let info = request("browse", "files").execution_info().unwrap();
        let du = info.dpu(11).and_then(|dpu| dpu.data_unit(0)).unwrap();
        assert_eq!(du.name, "output");
        assert_eq!(du.data_unit_type, DataUnitType::Files);
    }

    #[test]
    fn test_request_defaults() {
        let req: AcquireLeaseRequest = serde_json::from_str(
            r#"{"execution_id": 1, "dpu_instance_id": 2, "data_unit_index": 0, "data_unit_name": "out"}"#,
        )
        .unwrap();
        assert_eq!(req.data_unit_type, "RDF");
        assert_eq!(req.purpose, "BROWSE");
        assert!(req.validate().is_ok());
    }
}
