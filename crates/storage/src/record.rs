use cirrus_interchange::{ErrorInfo, Status};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// The closed set of record kinds held by the primary store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordType {
    Execution,
    Granule,
    Pdr,
}

impl RecordType {
    pub const ALL: [RecordType; 3] = [RecordType::Execution, RecordType::Granule, RecordType::Pdr];

    pub fn as_str(self) -> &'static str {
        match self {
            RecordType::Execution => "execution",
            RecordType::Granule => "granule",
            RecordType::Pdr => "pdr",
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "execution" | "executions" => Ok(RecordType::Execution),
            "granule" | "granules" => Ok(RecordType::Granule),
            "pdr" | "pdrs" => Ok(RecordType::Pdr),
            other => Err(format!("unknown record type '{}'", other)),
        }
    }
}

/// Natural identity of a record.
///
/// Granule ids are only unique within a collection, so the granule key is the
/// `(granule_id, collection_id)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "recordType", rename_all = "lowercase")]
pub enum RecordKey {
    Execution {
        arn: String,
    },
    Granule {
        #[serde(rename = "granuleId")]
        granule_id: String,
        #[serde(rename = "collectionId")]
        collection_id: String,
    },
    Pdr {
        #[serde(rename = "pdrName")]
        pdr_name: String,
    },
}

impl RecordKey {
    pub fn execution(arn: impl Into<String>) -> Self {
        RecordKey::Execution { arn: arn.into() }
    }

    pub fn granule(granule_id: impl Into<String>, collection_id: impl Into<String>) -> Self {
        RecordKey::Granule {
            granule_id: granule_id.into(),
            collection_id: collection_id.into(),
        }
    }

    pub fn pdr(pdr_name: impl Into<String>) -> Self {
        RecordKey::Pdr {
            pdr_name: pdr_name.into(),
        }
    }

    pub fn record_type(&self) -> RecordType {
        match self {
            RecordKey::Execution { .. } => RecordType::Execution,
            RecordKey::Granule { .. } => RecordType::Granule,
            RecordKey::Pdr { .. } => RecordType::Pdr,
        }
    }

    /// The id operators search by: the ARN, the granule id or the PDR name.
    pub fn natural_id(&self) -> &str {
        match self {
            RecordKey::Execution { arn } => arn,
            RecordKey::Granule { granule_id, .. } => granule_id,
            RecordKey::Pdr { pdr_name } => pdr_name,
        }
    }

    /// The owning collection, for keys that live under one.
    pub fn parent(&self) -> Option<&str> {
        match self {
            RecordKey::Granule { collection_id, .. } => Some(collection_id),
            _ => None,
        }
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordKey::Execution { arn } => write!(f, "execution {}", arn),
            RecordKey::Granule {
                granule_id,
                collection_id,
            } => write!(f, "granule {} ({})", granule_id, collection_id),
            RecordKey::Pdr { pdr_name } => write!(f, "pdr {}", pdr_name),
        }
    }
}

/// One execution of a workflow, keyed by ARN.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRecord {
    pub arn: String,
    pub name: String,
    pub status: Status,
    /// Workflow name.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub workflow_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
    /// Weak reference to the execution that started this one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_arn: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
    /// Seconds between `created_at` and the last update.
    pub duration: f64,
}

/// A file belonging to a granule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GranuleFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bucket: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
}

/// A granule, keyed by `(granule_id, collection_id)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GranuleRecord {
    pub granule_id: String,
    pub collection_id: String,
    pub status: Status,
    #[serde(default)]
    pub published: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cmr_link: Option<String>,
    #[serde(default)]
    pub files: Vec<GranuleFile>,
    /// Sum of file sizes in bytes.
    #[serde(default)]
    pub product_volume: u64,
    /// ARN of the execution that last wrote this granule.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pdr_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
    pub created_at: i64,
    pub updated_at: i64,
    pub duration: f64,
    #[serde(default)]
    pub time_to_preprocess: f64,
    #[serde(default)]
    pub time_to_archive: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processing_start_date_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processing_end_date_time: Option<String>,
}

/// Execution counters of a PDR.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PdrStats {
    pub processing: u64,
    pub completed: u64,
    pub failed: u64,
    pub total: u64,
}

impl PdrStats {
    pub fn new(processing: u64, completed: u64, failed: u64) -> Self {
        PdrStats {
            processing,
            completed,
            failed,
            total: processing + completed + failed,
        }
    }

    /// Percent of the PDR's executions that are no longer processing.
    pub fn progress(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else if self.processing == 0 {
            100.0
        } else {
            (self.total - self.processing) as f64 / self.total as f64 * 100.0
        }
    }
}

/// A product delivery record, keyed by name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PdrRecord {
    pub pdr_name: String,
    pub collection_id: String,
    pub provider: String,
    pub status: Status,
    pub progress: f64,
    pub stats: PdrStats,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution: Option<String>,
    #[serde(rename = "PANSent", default)]
    pub pan_sent: bool,
    #[serde(rename = "PANmessage", default, skip_serializing_if = "Option::is_none")]
    pub pan_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
    pub created_at: i64,
    pub updated_at: i64,
    pub duration: f64,
}

/// Any record the primary store holds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "recordType", rename_all = "lowercase")]
pub enum Record {
    Execution(ExecutionRecord),
    Granule(GranuleRecord),
    Pdr(PdrRecord),
}

impl Record {
    pub fn key(&self) -> RecordKey {
        match self {
            Record::Execution(r) => RecordKey::execution(&r.arn),
            Record::Granule(r) => RecordKey::granule(&r.granule_id, &r.collection_id),
            Record::Pdr(r) => RecordKey::pdr(&r.pdr_name),
        }
    }

    pub fn record_type(&self) -> RecordType {
        match self {
            Record::Execution(_) => RecordType::Execution,
            Record::Granule(_) => RecordType::Granule,
            Record::Pdr(_) => RecordType::Pdr,
        }
    }

    pub fn status(&self) -> Status {
        match self {
            Record::Execution(r) => r.status,
            Record::Granule(r) => r.status,
            Record::Pdr(r) => r.status,
        }
    }

    pub fn updated_at(&self) -> i64 {
        match self {
            Record::Execution(r) => r.updated_at,
            Record::Granule(r) => r.updated_at,
            Record::Pdr(r) => r.updated_at,
        }
    }

    pub fn collection_id(&self) -> Option<&str> {
        match self {
            Record::Execution(r) => r.collection_id.as_deref(),
            Record::Granule(r) => Some(&r.collection_id),
            Record::Pdr(r) => Some(&r.collection_id),
        }
    }

    pub fn provider(&self) -> Option<&str> {
        match self {
            Record::Execution(_) => None,
            Record::Granule(r) => r.provider.as_deref(),
            Record::Pdr(r) => Some(&r.provider),
        }
    }

    /// Mark the record failed with `error`, as of `now`.
    pub fn fail(&mut self, error: ErrorInfo, now: i64) {
        match self {
            Record::Execution(r) => {
                r.status = Status::Failed;
                r.error = Some(error);
                r.updated_at = now;
            }
            Record::Granule(r) => {
                r.status = Status::Failed;
                r.error = Some(error);
                r.updated_at = now;
            }
            Record::Pdr(r) => {
                r.status = Status::Failed;
                r.error = Some(error);
                r.updated_at = now;
            }
        }
    }

    /// The record body as stored and indexed: the variant's fields, untagged.
    pub fn body(&self) -> Result<Value, serde_json::Error> {
        match self {
            Record::Execution(r) => serde_json::to_value(r),
            Record::Granule(r) => serde_json::to_value(r),
            Record::Pdr(r) => serde_json::to_value(r),
        }
    }

    /// Rebuild a record of `record_type` from a body produced by [`Record::body`].
    pub fn from_body(record_type: RecordType, body: Value) -> Result<Self, serde_json::Error> {
        Ok(match record_type {
            RecordType::Execution => Record::Execution(serde_json::from_value(body)?),
            RecordType::Granule => Record::Granule(serde_json::from_value(body)?),
            RecordType::Pdr => Record::Pdr(serde_json::from_value(body)?),
        })
    }
}

impl From<ExecutionRecord> for Record {
    fn from(r: ExecutionRecord) -> Self {
        Record::Execution(r)
    }
}

impl From<GranuleRecord> for Record {
    fn from(r: GranuleRecord) -> Self {
        Record::Granule(r)
    }
}

impl From<PdrRecord> for Record {
    fn from(r: PdrRecord) -> Self {
        Record::Pdr(r)
    }
}
