use serde::{Deserialize, Serialize};

/// Identifier of a pipeline execution.
pub type ExecutionId = u64;

/// Identifier of a DPU instance placed in a pipeline.
pub type DpuInstanceId = u64;

/// Kinds of data units a DPU can produce
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataUnitType {
    /// Graph data stored in the execution repository
    Rdf,
    /// Plain files under the data unit directory
    Files,
    /// Tabular data
    Relational,
}

impl std::fmt::Display for DataUnitType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DataUnitType::Rdf => write!(f, "RDF"),
            DataUnitType::Files => write!(f, "FILES"),
            DataUnitType::Relational => write!(f, "RELATIONAL"),
        }
    }
}

impl std::str::FromStr for DataUnitType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "RDF" => Ok(DataUnitType::Rdf),
            "FILES" => Ok(DataUnitType::Files),
            "RELATIONAL" => Ok(DataUnitType::Relational),
            other => Err(format!(
                "Invalid data unit type '{}'. Must be one of: RDF, FILES, RELATIONAL",
                other
            )),
        }
    }
}

/// Position of a data unit inside an execution: owning execution, producing DPU
/// and the output index on that DPU.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DataUnitRef {
    pub execution_id: ExecutionId,
    pub dpu_instance_id: DpuInstanceId,
    pub index: u32,
}

impl DataUnitRef {
    pub fn new(execution_id: ExecutionId, dpu_instance_id: DpuInstanceId, index: u32) -> Self {
        Self {
            execution_id,
            dpu_instance_id,
            index,
        }
    }

    /// Stable data unit id, unique within the whole installation.
    pub fn data_unit_id(&self) -> String {
        format!(
            "exec_{}_dpu_{}_du_{}",
            self.execution_id, self.dpu_instance_id, self.index
        )
    }

    /// URI form of [`DataUnitRef::data_unit_id`], used to name the data unit
    /// inside the shared execution repository.
    pub fn uri(&self) -> String {
        format!("urn:unitcache:dataunit:{}", self.data_unit_id())
    }
}

/// A data unit recorded in the execution context of a DPU
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataUnitInfo {
    pub index: u32,
    pub name: String,
    pub data_unit_type: DataUnitType,
}

impl DataUnitInfo {
    pub fn new(index: u32, name: impl Into<String>, data_unit_type: DataUnitType) -> Self {
        Self {
            index,
            name: name.into(),
            data_unit_type,
        }
    }
}

/// Execution context of a single DPU: the data units it produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DpuContextInfo {
    pub dpu_instance_id: DpuInstanceId,
    pub data_units: Vec<DataUnitInfo>,
}

impl DpuContextInfo {
    pub fn data_unit(&self, index: u32) -> Option<&DataUnitInfo> {
        self.data_units.iter().find(|du| du.index == index)
    }
}

/// What is known about a finished (or debugged) pipeline execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionInfo {
    pub execution_id: ExecutionId,
    pub dpus: Vec<DpuContextInfo>,
}

impl ExecutionInfo {
    pub fn new(execution_id: ExecutionId) -> Self {
        Self {
            execution_id,
            dpus: Vec::new(),
        }
    }

    /// Records `info` as an output of `dpu_instance_id`, creating the DPU context
    /// on first use.
    pub fn with_data_unit(mut self, dpu_instance_id: DpuInstanceId, info: DataUnitInfo) -> Self {
        match self
            .dpus
            .iter_mut()
            .find(|dpu| dpu.dpu_instance_id == dpu_instance_id)
        {
            Some(dpu) => dpu.data_units.push(info),
            None => self.dpus.push(DpuContextInfo {
                dpu_instance_id,
                data_units: vec![info],
            }),
        }
        self
    }

    /// Context of the given DPU, if it took part in this execution.
    pub fn dpu(&self, dpu_instance_id: DpuInstanceId) -> Option<&DpuContextInfo> {
        self.dpus
            .iter()
            .find(|dpu| dpu.dpu_instance_id == dpu_instance_id)
    }
}
